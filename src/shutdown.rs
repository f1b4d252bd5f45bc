use tokio_util::sync::CancellationToken;

/// Install a shutdown handler for ctrl-c (and SIGTERM on unix).
///
/// Returns a `CancellationToken` that is cancelled when a signal is
/// received. Background loops and the node event loop watch this token
/// and drain cleanly.
pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received ctrl-c, shutting down");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received ctrl-c, shutting down");
        }
        trigger.cancel();
    });

    token
}
