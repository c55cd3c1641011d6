use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Cancelled;

/// Shared flag used to abort a run.
///
/// Clones share the same flag, so a handle obtained from
/// [`Engine::cancellation`](crate::Engine::cancellation) can be moved to
/// another thread (e.g. a signal handler) and cancel a running
/// [`Engine::ensure`](crate::Engine::ensure). Once cancelled, no further
/// asset is generated. Assets doing slow external work can observe the same
/// token through [`Parents::cancellation`](crate::Parents::cancellation).
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`Cancelled`] once the token has been cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
