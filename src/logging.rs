use anyhow::{Context, Result};
use chrono::Utc;
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Default level: `debug` when verbose, else only errors. `RUST_LOG` takes precedence.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    }
}

/// Installs the global logger, appending to `log_file` when given instead of writing to stderr.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = default_level(verbose).as_str().to_ascii_lowercase();
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(default_level(true), LevelFilter::Debug);
        assert_eq!(default_level(false), LevelFilter::Error);
    }
}
