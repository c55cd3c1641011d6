use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::core::AssetId;
use crate::engine::Engine;

/// Outcome of a single `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Generated,
    Failed,
    Cancelled,
}

/// Timing of a single `generate` call.
#[derive(Debug, Clone, Copy)]
pub struct Execution {
    pub start: Instant,
    pub duration: Duration,
    pub status: Status,
}

impl Execution {
    pub(crate) fn new(start: Instant, status: Status) -> Self {
        Self {
            start,
            duration: start.elapsed(),
            status,
        }
    }
}

/// Generation diagnostics and performance metrics.
///
/// Every `generate` call the engine makes is recorded here, including the
/// failed ones, so this is also the place to check how many times an asset
/// has actually been generated.
#[derive(Debug, Default)]
pub struct Diagnostics {
    executions: HashMap<AssetId, Vec<Execution>>,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, id: AssetId, execution: Execution) {
        self.executions.entry(id).or_default().push(execution);
    }

    /// Every recorded `generate` call of `id`, oldest first.
    pub fn executions(&self, id: AssetId) -> &[Execution] {
        self.executions.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn last(&self, id: AssetId) -> Option<&Execution> {
        self.executions.get(&id)?.last()
    }

    /// Number of successful `generate` calls of `id`.
    pub fn generations(&self, id: AssetId) -> usize {
        self.executions(id)
            .iter()
            .filter(|execution| execution.status == Status::Generated)
            .count()
    }

    pub fn status(&self, id: AssetId) -> Option<Status> {
        self.last(id).map(|execution| execution.status)
    }

    /// Total time spent inside `generate`, across all assets.
    pub fn total(&self) -> Duration {
        self.executions.values().flatten().map(|e| e.duration).sum()
    }

    /// Renders the resolved graph as a Mermaid diagram, color-coded by the
    /// duration of the last generation.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow or failed
    /// * **Blue**: Never generated by this engine
    pub fn render_mermaid(&self, engine: &Engine) -> String {
        let mut f = String::new();
        let _ = writeln!(f, "graph LR");

        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for execution in self.executions.values().filter_map(|all| all.last()) {
            let secs = execution.duration.as_secs_f64();
            min_time = min_time.min(secs);
            max_time = max_time.max(secs);
        }

        if min_time > max_time {
            // nothing ran
            min_time = 0.0;
            max_time = 0.0;
        }

        if (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        let ids = engine.dag().ids();

        for (index, id) in ids.iter().enumerate() {
            let name = id.name().replace('"', "\\\"");

            let (label, color) = match self.last(*id) {
                Some(execution) if execution.status == Status::Generated => {
                    let t = (execution.duration.as_secs_f64() - min_time) / (max_time - min_time);
                    (format!("{:.2?}", execution.duration), gradient(t))
                }
                Some(execution) => (format!("{:?}", execution.status), "#FF0000".to_string()),
                None => ("Cached".to_string(), "#ADD8E6".to_string()),
            };

            let _ = writeln!(f, "    {index}[\"{name}\\n{label}\"]");
            let _ = writeln!(f, "    style {index} fill:{color}");
        }

        for (source, target) in engine.dag().edges() {
            let (Ok(source), Ok(target)) = (ids.binary_search(&source), ids.binary_search(&target))
            else {
                continue;
            };
            let _ = writeln!(f, "    {source} --> {target}");
        }

        f
    }
}

/// Green (0.0) to yellow (0.5) to red (1.0).
fn gradient(t: f64) -> String {
    let (r, g) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8)
    };

    format!("#{r:02X}{g:02X}00")
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AssetId = AssetId::new("a");

    #[test]
    fn test_record_and_count() {
        let mut diagnostics = Diagnostics::default();
        assert!(diagnostics.status(A).is_none());
        assert!(diagnostics.executions(A).is_empty());

        diagnostics.record(A, Execution::new(Instant::now(), Status::Failed));
        diagnostics.record(A, Execution::new(Instant::now(), Status::Generated));

        assert_eq!(diagnostics.executions(A).len(), 2);
        assert_eq!(diagnostics.generations(A), 1);
        assert_eq!(diagnostics.status(A), Some(Status::Generated));
    }

    #[test]
    fn test_gradient() {
        assert_eq!(gradient(0.0), "#00FF00");
        assert_eq!(gradient(0.5), "#FFFF00");
        assert_eq!(gradient(1.0), "#FF0000");
    }
}
