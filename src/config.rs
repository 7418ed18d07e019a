//! `config.toml` file format and the merged run settings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::BrowserConfig;
use crate::site::{Site, SiteAccess, parse_sites};
use crate::types::{ImageFormat, Viewport};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub general: GeneralSection,
    pub browser: BrowserSection,
    pub metmaps: MetMapsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralSection {
    pub start_datetime: String,
    pub end_datetime: String,
    pub output_dir: PathBuf,
    /// Minutes between two rounds.
    pub interval: u64,
    pub sites: String,
    pub watermark: bool,
    pub user_agent: String,
    pub log: bool,
    pub log_file: PathBuf,
    pub verbose: bool,
    pub join: bool,
    /// Seconds allowed for each navigation or wait step.
    pub timeout: u64,
    pub format: ImageFormat,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            start_datetime: "now".into(),
            end_datetime: "now".into(),
            output_dir: PathBuf::from("screenshots"),
            interval: 1,
            sites: "a".into(),
            watermark: false,
            user_agent: DEFAULT_USER_AGENT.into(),
            log: false,
            log_file: PathBuf::from("error.log"),
            verbose: false,
            join: false,
            timeout: 30,
            format: ImageFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSection {
    pub executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub font: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        let viewport = Viewport::default();
        Self {
            executable: None,
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            font: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetMapsSection {
    pub username: String,
    pub password: String,
    #[serde(rename = "URL", alias = "url")]
    pub url: String,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `path` if given, else `config.toml` if it exists, else built-in defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }
}

/// Everything a run needs, after CLI flags have been applied over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub start: String,
    pub end: String,
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub sites: Vec<Site>,
    pub watermark: bool,
    pub user_agent: String,
    pub log: bool,
    pub log_file: PathBuf,
    pub verbose: bool,
    pub join: bool,
    pub format: ImageFormat,
    pub font: Option<PathBuf>,
    pub access: SiteAccess,
    pub browser: BrowserConfig,
}

impl Settings {
    pub fn from_config(file: ConfigFile) -> Result<Self> {
        let ConfigFile {
            general,
            browser,
            metmaps,
        } = file;

        if general.interval == 0 {
            anyhow::bail!("WRONG INPUT: interval has to be at least 1 minute");
        }
        let interval = general
            .interval
            .checked_mul(60)
            .map(Duration::from_secs)
            .filter(|d| chrono::Duration::from_std(*d).is_ok())
            .with_context(|| {
                format!(
                    "WRONG INPUT: interval of {} minutes is too large",
                    general.interval
                )
            })?;

        Ok(Self {
            start: general.start_datetime,
            end: general.end_datetime,
            output_dir: general.output_dir,
            interval,
            sites: parse_sites(&general.sites)?,
            watermark: general.watermark,
            user_agent: general.user_agent,
            log: general.log,
            log_file: general.log_file,
            verbose: general.verbose,
            join: general.join,
            format: general.format,
            font: browser.font,
            access: SiteAccess {
                metmaps_url: metmaps.url,
                username: metmaps.username,
                password: metmaps.password,
            },
            browser: BrowserConfig {
                executable: browser.executable,
                viewport: Viewport::new(browser.viewport_width, browser.viewport_height),
                timeout: Duration::from_secs(general.timeout.max(1)),
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_config(ConfigFile::parse("").unwrap()).unwrap();
        assert_eq!(settings.start, "now");
        assert_eq!(settings.end, "now");
        assert_eq!(settings.sites, Site::ALL.to_vec());
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.output_dir, PathBuf::from("screenshots"));
        assert_eq!(settings.format, ImageFormat::Png);
        assert_eq!(settings.browser.timeout, Duration::from_secs(30));
        assert!(!settings.join);
    }

    #[test]
    fn reads_all_sections() {
        let text = r#"
            [general]
            start_datetime = "0600"
            end_datetime = "max"
            output_dir = "/var/lib/ems"
            interval = 5
            sites = "dm"
            watermark = true
            join = true
            format = "jpeg"

            [browser]
            executable = "/usr/bin/chromium"
            viewport_width = 1600

            [metmaps]
            username = "user"
            password = "secret"
            URL = "https://metmaps.example/map"
        "#;
        let settings = Settings::from_config(ConfigFile::parse(text).unwrap()).unwrap();
        assert_eq!(settings.start, "0600");
        assert_eq!(settings.end, "max");
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.sites, vec![Site::Dwd, Site::MetMaps]);
        assert!(settings.watermark && settings.join);
        assert_eq!(settings.format, ImageFormat::Jpeg);
        assert_eq!(settings.browser.viewport, Viewport::new(1600, 720));
        assert_eq!(
            settings.browser.executable,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
        assert_eq!(settings.access.metmaps_url, "https://metmaps.example/map");
        assert_eq!(settings.access.username, "user");
    }

    #[test]
    fn rejects_unknown_keys_and_zero_interval() {
        assert!(ConfigFile::parse("[general]\nintervall = 3").is_err());
        let zero = ConfigFile::parse("[general]\ninterval = 0").unwrap();
        assert!(Settings::from_config(zero).is_err());
    }

    #[test]
    fn rejects_intervals_beyond_time_range() {
        let overflow = ConfigFile::parse("[general]\ninterval = 9223372036854775807").unwrap();
        let err = Settings::from_config(overflow).unwrap_err();
        assert!(err.to_string().starts_with("WRONG INPUT"));

        // fits in seconds but not in chrono's millisecond range
        let mut file = ConfigFile::default();
        file.general.interval = 1_000_000_000_000_000;
        assert!(Settings::from_config(file).is_err());

        let mut file = ConfigFile::default();
        file.general.interval = 1_000_000_000_000;
        assert_eq!(
            Settings::from_config(file).unwrap().interval,
            Duration::from_secs(60_000_000_000_000)
        );
    }
}
