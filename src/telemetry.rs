//! Tracing subscriber setup for binaries and tests embedding the crate

use tracing_subscriber::EnvFilter;

/// Install a compact `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"trueno_adapt=debug"`).
///
/// Returns `false` if a global subscriber was already installed or the
/// filter does not parse; calling it more than once is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let Ok(filter) = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter)) else {
        return false;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let _ = init_tracing("trueno_adapt=debug");
        assert!(!init_tracing("trueno_adapt=debug"));
    }
}
