// Third Party
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the default
/// of logging each of `targets` at `level`.
pub fn init_tracing(targets: &[&str], level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = targets
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect();
        EnvFilter::new(directives.join(","))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
pub fn setup_exit_hooks(shutdown: CancellationToken) -> Result<(), anyhow::Error> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, shutting down...", signal);
            shutdown.cancel();
        }
    });
    Ok(())
}
