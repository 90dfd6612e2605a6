//! Ctrl-C handling for the live loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_SLICE: Duration = Duration::from_millis(50);

/// Set once an interrupt asks the loop to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown. Returns true if shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while !self.is_requested() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
        }
        true
    }
}

/// Listen for Ctrl-C on a helper thread.
///
/// The first interrupt sets `flag` so the loop can release the stream and
/// join the engine; a second one exits immediately.
pub fn install_ctrl_c(flag: ShutdownFlag) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("lookout-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
                tracing::info!("interrupt received; shutting down");
                flag.trigger();

                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("second interrupt; exiting now");
                    std::process::exit(130);
                }
            });
        })?;
    Ok(())
}
