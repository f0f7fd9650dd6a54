//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Directive applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "prometheus_dispatch=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_DIRECTIVE`]. Does nothing if a global subscriber exists.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    install(filter);
}

/// Install a fmt subscriber with an explicit filter directive such as
/// `"prometheus_dispatch=debug"`, ignoring `RUST_LOG`.
///
/// Returns `false` if a subscriber was already installed or the directive
/// does not parse.
pub fn init_tracing_with(directive: &str) -> bool {
    EnvFilter::try_new(directive).is_ok_and(install)
}

fn install(filter: EnvFilter) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
