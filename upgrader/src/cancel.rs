//! Operator cancellation, observed by the driver at node boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Shared flag flipped once by the signal listener (or a test).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Spawn a helper thread that cancels `token` on the first Ctrl-C.
///
/// The in-flight collaborator call is left to finish; the driver stops at the
/// next node boundary.
pub fn install_ctrl_c(token: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create signal runtime")?;
    thread::Builder::new()
        .name("upgrader-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("cancellation requested; stopping at the next node boundary");
                        token.cancel();
                    }
                    Err(err) => debug!(%err, "ctrl-c listener unavailable"),
                }
            });
        })
        .context("spawn signal thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
