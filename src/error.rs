use camino::Utf8PathBuf;
use thiserror::Error;

use crate::core::AssetId;

pub use anyhow::Error as GenerationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Asset '{0}' failed to generate:\n{1}")]
    Generation(AssetId, GenerationError),

    #[error("Dependency cycle detected: {0}")]
    Cycle(Cycle),

    #[error(transparent)]
    MissingDependency(#[from] MissingDependency),

    #[error("Asset '{0}' has already been generated")]
    DuplicateGeneration(AssetId),

    #[error("Asset '{0}' is not registered")]
    Unregistered(AssetId),

    #[error("Asset '{0}' is not of type {1}")]
    TypeMismatch(AssetId, &'static str),

    #[error("Asset '{0}' was scheduled before its dependency '{1}' was generated")]
    Unresolved(AssetId, AssetId),

    #[error("Generation of asset '{0}' was cancelled")]
    Cancelled(AssetId),

    #[error("Couldn't build the thread pool.\n{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Couldn't persist asset '{0}'.\n{1}")]
    Persist(AssetId, PersistError),

    #[error("Couldn't prepare the output.\n{0}")]
    Output(PersistError),
}

impl EngineError {
    /// Identity of the asset this error is attributed to, if any.
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            EngineError::Generation(id, _)
            | EngineError::DuplicateGeneration(id)
            | EngineError::Unregistered(id)
            | EngineError::TypeMismatch(id, _)
            | EngineError::Unresolved(id, _)
            | EngineError::Cancelled(id)
            | EngineError::Persist(id, _) => Some(*id),
            EngineError::MissingDependency(missing) => Some(missing.requester),
            EngineError::Cycle(cycle) => cycle.path.first().copied(),
            EngineError::ThreadPool(_) | EngineError::Output(_) => None,
        }
    }
}

/// Raised when an asset looks up a parent it never declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Asset '{requester}' requested '{requested}' without declaring it as a dependency")]
pub struct MissingDependency {
    pub requester: AssetId,
    pub requested: AssetId,
}

#[derive(Debug, Clone, Error)]
pub enum ParentsError {
    #[error(transparent)]
    Missing(#[from] MissingDependency),

    #[error("Asset '{0}' is not of type {1}")]
    WrongType(AssetId, &'static str),
}

#[derive(Debug, Clone, Copy, Error)]
#[error("Operation was cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("File name '{0}' has to be a relative path")]
    InvalidFilename(Utf8PathBuf),

    #[error("File '{0}' is already written by asset '{1}'")]
    Conflict(Utf8PathBuf, AssetId),

    #[error("Couldn't create the directory '{0}'")]
    Directory(Utf8PathBuf, #[source] std::io::Error),
}

/// A dependency path which revisits an identity still being resolved. The
/// first and the last element of the path are the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub path: Vec<AssetId>,
}

impl Cycle {
    /// Distinct identities taking part in the cycle, sorted.
    pub fn participants(&self) -> Vec<AssetId> {
        let mut ids = self.path.clone();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.path.contains(&id)
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;

        for id in &self.path {
            if !first {
                f.write_str(" -> ")?;
            }
            write!(f, "{id}")?;
            first = false;
        }

        Ok(())
    }
}
