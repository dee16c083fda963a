//! Log output for the texbuild binary.
//!
//! Filter precedence: `TEXBUILD_LOG`, then `RUST_LOG`, then the level passed
//! to [`init_tracing`] applied to the texbuild crates only. Everything else
//! stays at `warn` so spawned-process plumbing does not drown the pass log.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable overriding the log filter.
pub const LOG_ENV_VAR: &str = "TEXBUILD_LOG";

/// Crates whose events follow the requested level.
const OWN_TARGETS: &[&str] = &["texbuild_core", "texbuild"];

/// Default filter directives for `level`.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        OWN_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level.as_str().to_lowercase())),
    );
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber, writing to stderr so stdout carries only
/// command output. Repeated calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_own_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,texbuild_core=debug,texbuild=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!("still logging after repeated init");
    }
}
