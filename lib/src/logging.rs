//! Logging bootstrap.
//!
//! Every `log::info!`/`log::warn!`/etc. call site dispatches through
//! whatever single `Log` implementation `env_logger` installs. `init()` is
//! called once, early, before any driver or context activity, guarded by a
//! one-shot `OnceLock` so a second call is a harmless no-op; `RUST_LOG`
//! controls the active level.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide logger. Idempotent; safe to call from every
/// crate entry point (the facade calls it from `init_config`/`init_driver`,
/// tests call it directly).
pub fn init() {
    INIT.get_or_init(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(cfg!(test))
            .try_init();
    });
}
