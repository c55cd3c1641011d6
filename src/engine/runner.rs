use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cache::Cache;
use crate::cancel::Cancellation;
use crate::core::{AssetId, Dynamic};
use crate::engine::diagnostics::{Execution, Status};
use crate::engine::plan::{Pending, Plan};
use crate::engine::{Engine, Mode};
use crate::error::{Cancelled, EngineError, MissingDependency};
use crate::graph::Dag;
use crate::parents::{Parents, Visibility};

impl Engine {
    pub(super) fn run(&mut self, plan: Plan) -> Result<(), EngineError> {
        if plan.order.is_empty() {
            return Ok(());
        }

        match self.options.mode {
            Mode::Sequential => self.run_sequential(plan),
            Mode::Parallel => {
                let pool = self.thread_pool()?;
                self.run_parallel(plan, &pool)
            }
        }
    }

    /// The pool is built on first use and kept for the lifetime of the engine.
    fn thread_pool(&mut self) -> Result<Arc<ThreadPool>, EngineError> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("assetgraph-{i}"));
        if let Some(threads) = self.options.threads {
            builder = builder.num_threads(threads);
        }

        let pool = Arc::new(builder.build()?);
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Generates the plan one asset at a time, in plan order. The first
    /// failure aborts the run; everything generated before it stays cached.
    fn run_sequential(&mut self, plan: Plan) -> Result<(), EngineError> {
        let root_span = progress_span(plan.order.len());
        let _enter = root_span.enter();

        for pending in plan.order {
            let id = pending.id;
            let parents = snapshot(
                &self.cache,
                &self.dag,
                self.options.visibility,
                &pending,
                &self.cancellation,
            )?;

            let (result, execution) = generate(pending, parents, &root_span);
            self.diagnostics.record(id, execution);
            self.cache.put(id, result?)?;
            root_span.pb_inc(1);
        }

        Ok(())
    }

    /// This function executes the plan using a thread pool. Assets are
    /// generated as soon as all of their dependencies are generated.
    ///
    /// The algorithm works as follows:
    /// 1. Count the planned dependencies of every asset.
    /// 2. Spawn every asset without planned dependencies on the pool.
    /// 3. The calling thread waits for results. Each success is cached and
    ///    the counts of its dependents are decremented.
    /// 4. An asset whose count reaches zero is spawned.
    /// 5. After the first failure nothing new is spawned; assets already
    ///    running are awaited and cached if they succeed.
    ///
    /// The scheduling loop runs on the calling thread, which is the only one
    /// touching the cache. Each identity is spawned at most once, so every
    /// asset is generated at most once.
    fn run_parallel(&mut self, plan: Plan, pool: &ThreadPool) -> Result<(), EngineError> {
        let root_span = progress_span(plan.order.len());
        let _enter = root_span.enter();

        let planned: HashSet<AssetId> = plan.order.iter().map(|pending| pending.id).collect();

        let mut dependents: HashMap<AssetId, Vec<AssetId>> = HashMap::new();
        let mut counts: HashMap<AssetId, usize> = HashMap::new();
        let mut waiting: HashMap<AssetId, Pending> = HashMap::new();
        let mut ready = Vec::new();

        for pending in plan.order {
            let mut unique: Vec<_> = pending
                .dependencies
                .iter()
                .copied()
                .filter(|dependency| planned.contains(dependency))
                .collect();
            unique.sort();
            unique.dedup();

            for &dependency in &unique {
                dependents.entry(dependency).or_default().push(pending.id);
            }

            if unique.is_empty() {
                ready.push(pending);
            } else {
                counts.insert(pending.id, unique.len());
                waiting.insert(pending.id, pending);
            }
        }

        let cache = &mut self.cache;
        let dag = &self.dag;
        let visibility = self.options.visibility;
        let cancellation = &self.cancellation;
        let diagnostics = &mut self.diagnostics;
        let root_span = &root_span;

        let mut failure: Option<EngineError> = None;

        pool.in_place_scope(|s| {
            let (sender, receiver) = channel::<(AssetId, Result<Dynamic, EngineError>, Execution)>();

            let spawn = |pending: Pending, parents: Parents| {
                let sender = sender.clone();

                s.spawn(move |_| {
                    let id = pending.id;
                    let (result, execution) = generate(pending, parents, root_span);
                    // the receiver lives until every spawned asset has reported
                    let _ = sender.send((id, result, execution));
                });
            };

            let mut in_flight = 0usize;

            for pending in ready {
                match snapshot(cache, dag, visibility, &pending, cancellation) {
                    Ok(parents) => {
                        spawn(pending, parents);
                        in_flight += 1;
                    }
                    Err(err) => {
                        failure.get_or_insert(err);
                        break;
                    }
                }
            }

            while in_flight > 0 {
                let Ok((id, result, execution)) = receiver.recv() else {
                    break;
                };
                in_flight -= 1;

                diagnostics.record(id, execution);
                root_span.pb_inc(1);

                let stored = result.and_then(|asset| cache.put(id, asset));
                if let Err(err) = stored {
                    failure.get_or_insert(err);
                    continue;
                }

                if failure.is_some() {
                    continue;
                }

                for dependent in dependents.get(&id).into_iter().flatten() {
                    let Some(count) = counts.get_mut(dependent) else {
                        continue;
                    };

                    *count -= 1;
                    if *count > 0 {
                        continue;
                    }

                    let Some(pending) = waiting.remove(dependent) else {
                        continue;
                    };

                    match snapshot(cache, dag, visibility, &pending, cancellation) {
                        Ok(parents) => {
                            spawn(pending, parents);
                            in_flight += 1;
                        }
                        Err(err) => {
                            failure.get_or_insert(err);
                            break;
                        }
                    }
                }
            }
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn progress_span(total: usize) -> Span {
    let span = tracing::info_span!("generating");
    span.pb_set_length(total as u64);
    span.pb_set_style(&crate::utils::get_style_run());
    span.pb_set_message("Generating assets...");
    span
}

/// Builds the read-only view of the generated parents of `pending`.
fn snapshot(
    cache: &Cache,
    dag: &Dag,
    visibility: Visibility,
    pending: &Pending,
    cancellation: &Cancellation,
) -> Result<Parents, EngineError> {
    let visible = match visibility {
        Visibility::Direct => pending.dependencies.clone(),
        Visibility::Transitive => dag.ancestors(pending.id),
    };

    let mut parents = Parents::with_cancellation(pending.id, cancellation.clone());

    for dependency in visible {
        let asset = cache
            .get(dependency)
            .ok_or(EngineError::Unresolved(pending.id, dependency))?;

        parents.insert(dependency, asset.clone());
    }

    Ok(parents)
}

/// Runs the `generate` of a single asset and turns the outcome into either
/// the finished asset or an error attributed to it.
fn generate(
    mut pending: Pending,
    mut parents: Parents,
    root_span: &Span,
) -> (Result<Dynamic, EngineError>, Execution) {
    let id = pending.id;

    let span = tracing::info_span!(parent: root_span, "generate", asset = %id);
    span.pb_set_style(&crate::utils::get_style_asset());
    span.pb_set_message(&format!("Generating {id}"));
    let _enter = span.enter();

    let start = Instant::now();

    if parents.cancellation().is_cancelled() {
        tracing::warn!("cancelled before generation");
        let execution = Execution::new(start, Status::Cancelled);
        return (Err(EngineError::Cancelled(id)), execution);
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| pending.asset.generate(&parents)));

    let result = match outcome {
        Ok(Ok(())) => match parents.take_violation() {
            Some(missing) => Err(EngineError::MissingDependency(missing)),
            None => Ok(Dynamic::from(pending.asset)),
        },
        Ok(Err(err)) => Err(classify(id, err, parents.take_violation())),
        Err(payload) => Err(EngineError::Generation(
            id,
            anyhow::anyhow!(crate::utils::panic_message(payload.as_ref())),
        )),
    };

    let status = match &result {
        Ok(_) => Status::Generated,
        Err(EngineError::Cancelled(_)) => Status::Cancelled,
        Err(_) => Status::Failed,
    };

    let execution = Execution::new(start, status);

    match &result {
        Ok(_) => tracing::debug!(elapsed = ?execution.duration, "generated"),
        Err(err) => tracing::warn!(error = %err, "generation failed"),
    }

    (result, execution)
}

/// An undeclared lookup always wins, even if the asset reported something
/// else, because it is the root cause.
fn classify(id: AssetId, err: anyhow::Error, violation: Option<MissingDependency>) -> EngineError {
    if let Some(missing) = violation {
        return EngineError::MissingDependency(missing);
    }

    if err.is::<Cancelled>() {
        return EngineError::Cancelled(id);
    }

    EngineError::Generation(id, err)
}
