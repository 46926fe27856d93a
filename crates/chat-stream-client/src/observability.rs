use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "chat-stream.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn logging_enabled() -> bool {
    std::env::var("CHAT_CLIENT_OBSERVABILITY")
        .ok()
        .and_then(|v| parse_bool_env(&v))
        .unwrap_or(true)
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("CHAT_CLIENT_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Installs the global tracing subscriber once per process.
///
/// Environment variables:
/// - `CHAT_CLIENT_OBSERVABILITY`: set to `0`/`false` to disable logging.
/// - `CHAT_CLIENT_LOG_LEVEL`: filter override (`debug`, `chat_stream_client=trace`, ...).
/// - `RUST_LOG`: used when `CHAT_CLIENT_LOG_LEVEL` is unset.
/// - `CHAT_CLIENT_JSON_LOG_PATH`: write JSONL to this file instead of the console.
///
/// Console output goes to stderr so streamed replies on stdout stay clean.
pub fn init_observability() {
    init_with_default_level("info");
}

/// Same as [`init_observability`] with a different fallback level.
pub fn init_with_default_level(default_level: &str) {
    INIT.get_or_init(|| {
        if !logging_enabled() {
            return;
        }

        let env_filter = resolve_env_filter(default_level);
        if let Ok(path_raw) = std::env::var("CHAT_CLIENT_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
                Some(parent) => {
                    let _ = std::fs::create_dir_all(parent);
                    parent.to_path_buf()
                }
                None => std::path::PathBuf::from("."),
            };
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" ON "), Some(true));
        assert_eq!(parse_bool_env("0"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
