use std::env;

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if verbose {
        debug!("verbose logging enabled");
    }
}

pub fn env_flag() -> bool {
    env::var("MVDOSE_VERBOSE")
        .map(|value| parse_bool(value.trim()))
        .unwrap_or(false)
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_spellings() {
        for raw in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_bool(raw), "{raw} should be truthy");
        }
        for raw in ["0", "false", "", "nope"] {
            assert!(!parse_bool(raw), "{raw} should be falsy");
        }
    }
}
