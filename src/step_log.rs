//! Log lines emitted around every worker invocation.

use crate::error::Role;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Message logged before and after a worker runs.
pub(crate) const EXECUTING: &str = "executing step";
/// Suffix of the line logged once a worker returned.
pub(crate) const DONE: &str = "DONE";

/// Formats one step log line.
///
/// The template depends on whether a comment is present and whether the
/// step carries a description; without a description the raw bit is logged.
/// A comment that is empty after trimming counts as absent.
///
/// The two variants without a comment differ from the legacy layout, which
/// printed `[SM] step -> {}, handler -> {}...{}` without the `: ` and the
/// message. Log parsers written for the old lines need adjusting.
///
/// ```
/// use stepflag::{format_step_line, Role};
///
/// let line = format_step_line("executing step", "DONE", Role::Exec, Some(" order 42 "), Some("RESERVE"), 0x01);
/// assert_eq!(line, "[SM - order 42] step -> RESERVE, handler -> exec: executing step...DONE");
///
/// let line = format_step_line("executing step", "", Role::Always, None, None, 0x04);
/// assert_eq!(line, "[SM] bit -> 4, handler -> always: executing step...");
/// ```
pub fn format_step_line(
    message: &str,
    suffix: &str,
    role: Role,
    comment: Option<&str>,
    description: Option<&str>,
    bit: u64,
) -> String {
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());

    match (comment, description) {
        (Some(comment), Some(description)) => format!(
            "[SM - {}] step -> {}, handler -> {}: {}...{}",
            comment, description, role, message, suffix
        ),
        (Some(comment), None) => format!(
            "[SM - {}] bit -> {}, handler -> {}: {}...{}",
            comment, bit, role, message, suffix
        ),
        (None, Some(description)) => format!(
            "[SM] step -> {}, handler -> {}: {}...{}",
            description, role, message, suffix
        ),
        (None, None) => format!(
            "[SM] bit -> {}, handler -> {}: {}...{}",
            bit, role, message, suffix
        ),
    }
}

pub(crate) fn print(
    suffix: &str,
    role: Role,
    comment: Option<&str>,
    description: Option<&str>,
    bit: u64,
) {
    let line = format_step_line(EXECUTING, suffix, role, comment, description, bit);
    tracing::info!(role = %role, bit, "{}", line);
}

/// Installs a global `tracing` subscriber writing to stderr.
///
/// The filter is read from `STEPFLAG_LOG`, then `RUST_LOG`, and defaults to
/// `info`. Calling this more than once, or after another subscriber was
/// installed, is harmless.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("STEPFLAG_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(filter)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    });
}
