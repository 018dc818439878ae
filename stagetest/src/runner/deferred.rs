//! Registry of deferred (cleanup) stages, executed in LIFO order.

use futures::future::BoxFuture;
use parking_lot::Mutex;

/// Boxed stage body used for deferred stages.
pub type StageFuture = BoxFuture<'static, anyhow::Result<()>>;

type DeferredAction = Box<dyn FnOnce() -> StageFuture + Send>;

/// A registered cleanup stage.
pub(crate) struct DeferredStage {
    pub(crate) name: String,
    pub(crate) action: DeferredAction,
}

/// LIFO stack of cleanup stages.
#[derive(Default)]
pub(crate) struct DeferredStages {
    stages: Mutex<Vec<DeferredStage>>,
}

impl DeferredStages {
    pub(crate) fn push(&self, name: String, action: DeferredAction) {
        self.stages.lock().push(DeferredStage { name, action });
    }

    /// Takes the most recently registered stage.
    pub(crate) fn pop(&self) -> Option<DeferredStage> {
        self.stages.lock().pop()
    }

    pub(crate) fn pending_names(&self) -> Vec<String> {
        self.stages.lock().iter().map(|s| s.name.clone()).collect()
    }
}

impl std::fmt::Debug for DeferredStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredStages")
            .field("pending", &self.pending_names())
            .finish()
    }
}
