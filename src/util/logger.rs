//! This module provides a built-in logger implementation.
//!
//! The built-in logger implementation uses the `env_logger` crate. It is
//! enabled by the Cargo feature `builtin_env_logger`, which is on by default.
//! Embedders who run their own logging setup can disable the default feature
//! and register their own implementation with the `log` crate instead.

/// Attempt to init an `env_logger`. Does nothing if `builtin_env_logger` is
/// disabled.
pub fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    log::debug!("initialized the logger.");
                }
                Err(e) => {
                    log::debug!("failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            log::debug!("didn't initialize the built-in env_logger; the \"builtin_env_logger\" feature is not enabled.");
        }
    }
}
