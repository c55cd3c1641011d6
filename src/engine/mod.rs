mod diagnostics;
pub(crate) mod plan;
mod runner;

use std::sync::Arc;

use camino::Utf8Path;

use crate::asset::{Asset, Instance};
use crate::blueprint::Blueprint;
use crate::cache::Cache;
use crate::cancel::Cancellation;
use crate::core::AssetId;
use crate::error::EngineError;
use crate::graph::Dag;
use crate::output::Manifest;
use crate::parents::Visibility;

pub use crate::engine::diagnostics::{Diagnostics, Execution, Status};

/// This value controls how a plan is executed once it is resolved. In
/// `Sequential` mode every asset is generated on the calling thread, one at a
/// time, in plan order. In `Parallel` mode assets whose dependencies are all
/// generated run concurrently on a thread pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Sequential,
    Parallel,
}

/// Configuration of an [`Engine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub mode: Mode,
    /// Which generated assets `generate` is allowed to look up.
    pub visibility: Visibility,
    /// Size of the thread pool in `Parallel` mode. Rayon picks a default
    /// when this is `None`.
    pub threads: Option<usize>,
}

/// Where a single identity stands within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    /// Never generated, or invalidated since.
    Unvisited,
    /// Generated and cached.
    Generated,
    /// The last attempt failed, nothing is cached.
    Failed,
}

/// The asset graph engine.
///
/// The engine owns the cache of generated assets. Every identity is generated
/// at most once per engine lifetime, no matter how many times, or through how
/// many dependents, it is requested. Instances of different installations
/// should live in different engines.
pub struct Engine {
    blueprint: Blueprint,
    options: Options,
    cache: Cache,
    dag: Dag,
    cancellation: Cancellation,
    diagnostics: Diagnostics,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Engine {
    pub fn new(blueprint: Blueprint, options: Options) -> Self {
        Self {
            blueprint,
            options,
            cache: Cache::new(),
            dag: Dag::default(),
            cancellation: Cancellation::new(),
            diagnostics: Diagnostics::default(),
            pool: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Makes sure `T` and its whole dependency closure are generated, and
    /// returns the generated instance of `T`.
    pub fn ensure<T: Asset>(&mut self) -> Result<Arc<T>, EngineError> {
        self.ensure_id(T::ID)?.downcast()
    }

    /// Makes sure the asset registered as `id` and its whole dependency
    /// closure are generated.
    ///
    /// The closure is resolved completely before anything is generated, so a
    /// cycle is reported without any side effect. When a generation fails,
    /// everything generated before the failure stays cached and a later call
    /// resumes from there.
    pub fn ensure_id(&mut self, id: AssetId) -> Result<Instance, EngineError> {
        let span = tracing::info_span!("ensure", asset = %id);
        let _enter = span.enter();

        if let Some(asset) = self.cache.get(id) {
            tracing::debug!("cache hit");
            return Ok(Instance(asset.clone()));
        }

        if self.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled(id));
        }

        let plan = plan::resolve(id, &self.blueprint, &self.cache).inspect_err(|err| {
            tracing::error!(error = %err, "resolution failed");
        })?;

        tracing::debug!(planned = ?plan.ids(), cached = self.cache.len(), "resolved");

        for pending in &plan.order {
            self.dag.record(pending.id, &pending.dependencies);
        }

        self.run(plan)?;

        self.cache
            .get(id)
            .map(|asset| Instance(asset.clone()))
            .ok_or(EngineError::Unresolved(id, id))
    }

    /// The generated instance of `T`, without generating anything.
    pub fn get<T: Asset>(&self) -> Option<Arc<T>> {
        let asset = self.cache.get(T::ID)?;
        Instance(asset.clone()).downcast().ok()
    }

    pub fn state(&self, id: AssetId) -> AssetState {
        if self.cache.contains(id) {
            return AssetState::Generated;
        }

        match self.diagnostics.status(id) {
            Some(Status::Failed | Status::Cancelled) => AssetState::Failed,
            _ => AssetState::Unvisited,
        }
    }

    /// Identities generated so far, sorted.
    pub fn generated(&self) -> Vec<AssetId> {
        self.cache.entries().into_iter().map(|(id, _)| id).collect()
    }

    /// Drops the generated instance of `id` together with every generated
    /// asset which depends on it, so that the next `ensure` generates them
    /// again. Returns the dropped identities.
    pub fn invalidate(&mut self, id: AssetId) -> Vec<AssetId> {
        let mut dropped = Vec::new();

        for dependent in self.dag.dependents(id) {
            if self.cache.remove(dependent).is_some() {
                dropped.push(dependent);
            }
        }

        tracing::info!(asset = %id, dropped = dropped.len(), "invalidated");
        dropped
    }

    /// Discards every generated asset and all recorded history.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.dag.clear();
        self.diagnostics = Diagnostics::default();
        self.cancellation = Cancellation::new();
    }

    /// Token which stops the engine from generating anything further.
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    pub fn set_cancellation(&mut self, cancellation: Cancellation) {
        self.cancellation = cancellation;
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Writes the files of every generated asset into `dir`.
    ///
    /// Two assets exposing the same file name is an error, reported before
    /// anything is written. Files are written on the engine's thread pool if
    /// it has one.
    pub fn persist(&self, dir: impl AsRef<Utf8Path>) -> Result<Manifest, EngineError> {
        let dir = dir.as_ref();
        let entries = self.cache.entries();

        match &self.pool {
            Some(pool) => pool.install(|| crate::output::persist(dir, &entries)),
            None => crate::output::persist(dir, &entries),
        }
    }

    pub(crate) fn dag(&self) -> &Dag {
        &self.dag
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("generated", &self.generated())
            .finish()
    }
}
