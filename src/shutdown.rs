//! Process-wide shutdown signal (§4.8): SIGINT/SIGTERM flips a shared
//! `watch::Receiver<bool>` that every `Runner::run` call polls between ticks.

use tokio::sync::watch;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Spawns the task that waits for Ctrl+C or SIGTERM and flips the shared
/// flag exactly once; a second signal after the first is a no-op.
pub fn setup_signal_shutdown_handler(shutdown_tx: &ShutdownSender) -> tokio::task::JoinHandle<()> {
    let shutdown_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut term_signal = match signal(SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                tracing::error!(error = %err, "failed to register SIGTERM handler");
                None
            }
        };

        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    drop(shutdown_tx.send(true));
                }
                () = async {
                    if let Some(signal) = term_signal.as_mut() {
                        signal.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {
                    drop(shutdown_tx.send(true));
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                drop(shutdown_tx.send(true));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::time::Duration;

    fn run_async_test<F>(future: F) -> Result<(), String>
    where
        F: Future<Output = Result<(), String>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| format!("failed to build runtime: {err}"))?;
        runtime.block_on(future)
    }

    #[test]
    fn shutdown_channel_starts_false_and_can_be_flipped() -> Result<(), String> {
        run_async_test(async {
            let (tx, mut rx) = shutdown_channel();
            if *rx.borrow_and_update() {
                return Err("expected fresh channel to start false".to_owned());
            }
            tx.send(true)
                .map_err(|err| format!("send failed: {err}"))?;
            tokio::time::timeout(Duration::from_secs(1), rx.changed())
                .await
                .map_err(|err| format!("timed out waiting for change: {err}"))?
                .map_err(|err| format!("watch closed: {err}"))?;
            if !*rx.borrow() {
                return Err("expected flag to be true after send".to_owned());
            }
            Ok(())
        })
    }
}
