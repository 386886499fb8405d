//! Load-progress reporting from an engine back to whoever asked for the load.

use std::fmt;
use std::sync::Arc;

use crate::LoadProgress;

/// A cloneable callback that receives [`LoadProgress`] reports.
///
/// Engines call [`ProgressReporter::report`] as often as their runtime
/// produces updates; the receiver decides what to do with them.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Arc<dyn Fn(LoadProgress) + Send + Sync>,
}

impl ProgressReporter {
    /// Create a reporter from a callback.
    pub fn new(callback: impl Fn(LoadProgress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Forward one progress report.
    pub fn report(&self, progress: LoadProgress) {
        (self.callback)(progress);
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}
