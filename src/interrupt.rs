use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{StreamError, StreamResult};

/// Shared cancellation request, polled by the render loop once per tick.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Wires Ctrl+C to `flag`.
///
/// The first interrupt only raises the flag so the session can shut the
/// encoder down; a second one exits with status 130.
pub fn install_ctrlc_handler(flag: &CancelFlag) -> StreamResult<()> {
    let flag = flag.clone();
    ctrlc::set_handler(move || {
        if flag.0.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .map_err(|error| StreamError::Other(anyhow::anyhow!("failed to install Ctrl+C handler: {error}")))
}
