use chrono::Local;
use env_logger::{Builder, Env};
use log::Level;
use std::env;
use std::io::Write;

/// Configures the global logger.
///
/// Lines carry a local timestamp, a colored level column and the message.
/// Coloring is disabled when `NO_COLOR` is set. The default filter is
/// `info`; `RUST_LOG` overrides it.
pub fn configure_logger() {
    let no_color = env::var("NO_COLOR").is_ok();

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            let level = record.level();
            let level_display = if no_color {
                format!("[{}]", level)
            } else {
                let color = match level {
                    Level::Error => "\x1b[31m",
                    Level::Warn => "\x1b[33m",
                    Level::Info => "\x1b[32m",
                    Level::Debug => "\x1b[34m",
                    Level::Trace => "\x1b[35m",
                };
                format!("[{}{}\x1b[0m]", color, level)
            };
            writeln!(
                buf,
                "{} {:<7} {}",
                Local::now().format("%b %d %H:%M:%S"),
                level_display,
                record.args(),
            )
        })
        .init();
}
