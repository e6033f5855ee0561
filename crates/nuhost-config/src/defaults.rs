use crate::logging::LogFormat;

/// Default log filter expression used by the launcher.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Port used to derive bind URLs when neither URLs nor a port are configured.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Logical host name used when none is configured.
pub const DEFAULT_HOST_NAME: &str = "nuhost";

/// Default log filter expression used by the launcher.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format; the launcher is interactive so compact output wins.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
