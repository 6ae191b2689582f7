use chrono::Utc;
use log::{info, SetLoggerError};
use std::io::Write;

/// Log level taken from `LOG_LEVEL`, or `RUST_LOG` when that is unset.
pub fn level_from_env() -> String {
    std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string())
}

/// Inizializza il logger con timestamp UTC e posizione nel sorgente
pub fn init() -> Result<(), SetLoggerError> {
    let level = level_from_env();
    env_logger::Builder::new()
        .parse_filters(&level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()?;

    info!("Logger initialized at level '{}'", level);
    Ok(())
}
