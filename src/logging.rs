//! Tracing bootstrap for binaries and tests that embed the crate.
//!
//! The library itself only emits `tracing` events. Hosts that have no
//! subscriber of their own call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the caller supplies one
pub const DEFAULT_FILTER: &str = "keyhold_core=info";

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns `false` when a
/// global subscriber was already installed, in which case nothing changes.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init("keyhold_core=debug");
        assert!(!init("keyhold_core=debug"));
    }
}
