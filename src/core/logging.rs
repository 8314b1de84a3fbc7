//! Logging setup backed by flexi_logger
//!
//! The crate itself only uses the `log` facade. Applications embedding the
//! queue consumer can call [`init_logging`] once to get the crate's house
//! formats: compact text, extended text with source location, or JSON lines.

use colored::Colorize;

static LOGGER_HANDLE: std::sync::OnceLock<std::sync::Mutex<flexi_logger::LoggerHandle>> =
    std::sync::OnceLock::new();

/// Output format for [`init_logging`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `YYYY-MM-DD HH:mm:ss.fff INF message`
    Text,
    /// Text with the emitting module rendered as a path, e.g. `(queue/iterator.rs:88)`
    Extended,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Parse the names used in configuration files ("text", "ext", "json")
    pub fn parse(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            "ext" | "extended" => LogFormat::Extended,
            _ => LogFormat::Text,
        }
    }
}

/// Start the global logger
///
/// Can only succeed once per process; later calls return an error from
/// flexi_logger. Use [`reconfigure_logging`] to change the level afterwards.
pub fn init_logging(
    log_level: Option<&str>,
    log_format: Option<&str>,
    log_file: Option<&str>,
    color_enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use flexi_logger::{FileSpec, Logger};

    let level_str = log_level.unwrap_or("info");
    let format = log_format.map_or(LogFormat::Text, LogFormat::parse);

    let mut logger = Logger::try_with_str(level_str)?;

    logger = match (format, color_enabled) {
        (LogFormat::Json, _) => logger.format(json_format),
        (LogFormat::Extended, true) => logger.format(extended_color_format),
        (LogFormat::Extended, false) => logger.format(extended_format),
        (LogFormat::Text, true) => logger.format(simple_color_format),
        (LogFormat::Text, false) => logger.format(simple_format),
    };

    if let Some(file_path) = log_file {
        let file_spec = FileSpec::try_from(std::path::Path::new(file_path))?;
        logger = logger.log_to_file(file_spec);
    }

    let handle = logger.start()?;
    let _ = LOGGER_HANDLE.set(std::sync::Mutex::new(handle));

    Ok(())
}

/// Change the active log level at runtime
///
/// Only the level can change; format and file output are fixed when the
/// logger starts.
pub fn reconfigure_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let handle_mutex = LOGGER_HANDLE
        .get()
        .ok_or("Logger handle not initialised. Call init_logging first.")?;
    let mut handle = handle_mutex
        .lock()
        .map_err(|_| "Could not acquire logger handle lock")?;
    handle.parse_and_push_temp_spec(log_level)?;
    Ok(())
}

fn level_abbreviation(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    }
}

fn simple_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {} {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbreviation(record.level()),
        record.args()
    )
}

fn simple_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {} {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        colored_level(record.level()),
        record.args()
    )
}

fn extended_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level_abbreviation(record.level()),
        record.args(),
        format_target_as_path(record.target(), record.line())
    )
}

fn extended_color_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let target_formatted = format_target_as_path(record.target(), record.line());
    write!(
        w,
        "{} {} {} ({})",
        now.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        colored_level(record.level()),
        record.args(),
        target_formatted.dimmed()
    )
}

fn json_format(
    w: &mut dyn std::io::Write,
    now: &mut flexi_logger::DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let json_obj = serde_json::json!({
        "timestamp": now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": level_abbreviation(record.level()),
        "message": record.args().to_string(),
        "target": format_target_as_path(record.target(), record.line())
    });
    let line = serde_json::to_string(&json_obj).map_err(std::io::Error::other)?;
    write!(w, "{}", line)
}

fn colored_level(level: log::Level) -> colored::ColoredString {
    let abbr = level_abbreviation(level);
    match level {
        log::Level::Error => abbr.red().bold(),
        log::Level::Warn => abbr.yellow(),
        log::Level::Info => abbr.green(),
        log::Level::Debug => abbr.blue(),
        log::Level::Trace => abbr.magenta(),
    }
}

/// Render a log target as a source path: `queuestream::queue::wake` -> `queue/wake.rs`
fn format_target_as_path(target: &str, line: Option<u32>) -> String {
    let path_like = match target.strip_prefix("queuestream::") {
        Some(without_prefix) => without_prefix.replace("::", "/") + ".rs",
        None => target.replace("::", "/"),
    };

    match line {
        Some(line_num) => format!("{}:{}", path_like, line_num),
        None => path_like,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexi_logger::DeferredNow;
    use serial_test::serial;

    fn render(
        formatter: fn(
            &mut dyn std::io::Write,
            &mut DeferredNow,
            &log::Record,
        ) -> Result<(), std::io::Error>,
        target: &str,
        line: Option<u32>,
    ) -> String {
        let mut buffer = Vec::new();
        let mut now = DeferredNow::new();
        formatter(
            &mut buffer,
            &mut now,
            &log::Record::builder()
                .level(log::Level::Info)
                .target(target)
                .line(line)
                .args(format_args!("Delivered msg-0000000001"))
                .build(),
        )
        .expect("formatting succeeds");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_target_rendered_as_crate_path() {
        assert_eq!(
            format_target_as_path("queuestream::queue::iterator", Some(42)),
            "queue/iterator.rs:42"
        );
        assert_eq!(format_target_as_path("tokio::runtime", None), "tokio/runtime");
    }

    #[test]
    fn test_extended_format_includes_location() {
        let output = render(extended_format, "queuestream::queue::wake", Some(7));

        assert!(output.contains("INF Delivered msg-0000000001"));
        assert!(output.ends_with("(queue/wake.rs:7)"), "got: {}", output);
    }

    #[test]
    fn test_json_format_is_valid_json() {
        let output = render(json_format, "queuestream::broker::memory", None);
        let value: serde_json::Value = serde_json::from_str(&output).expect("valid JSON line");

        assert_eq!(value["level"], "INF");
        assert_eq!(value["message"], "Delivered msg-0000000001");
        assert_eq!(value["target"], "broker/memory.rs");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("ext"), LogFormat::Extended);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_init_then_reconfigure() {
        // Another test binary may already own the global logger
        match init_logging(Some("debug"), Some("text"), None, false) {
            Ok(()) => assert!(reconfigure_logging("trace").is_ok()),
            Err(e) => println!("Logger already initialised: {}", e),
        }
        log::debug!("logging initialised");
    }
}
