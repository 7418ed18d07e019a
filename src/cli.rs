use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::ConfigFile;
use crate::window::select_tokens;

/// Takes screenshots of the DWD or UWZ warning maps or metmaps.eu.
#[derive(Debug, Parser)]
#[command(name = "ems-shot", version, about)]
pub struct Args {
    /// Start/end datetimes (format: YYYYMMDDhhmm OR hhmm). Start can be 'now' (next full
    /// minute), end can be 'max' or 'now' (take screenshot(s) once, immediately).
    #[arg(value_name = "START_END", num_args = 0..)]
    pub start_end: Vec<String>,

    /// Configuration file [default: config.toml, if present]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sites to screenshot ([a]ll, [u]wz, [d]wd, [m]etmaps), e.g. "ud" or "dwd,metmaps"
    #[arg(short, long)]
    pub sites: Option<String>,

    /// Recording interval in minutes
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Output directory for the screenshots
    #[arg(short, long, alias = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Login username, if needed for site
    #[arg(short, long)]
    pub username: Option<String>,

    /// Login password, if needed for site
    #[arg(short, long)]
    pub password: Option<String>,

    /// Custom user agent, to pretend we are using a different browser
    #[arg(short = 'a', long, alias = "user_agent")]
    pub user_agent: Option<String>,

    /// Custom URL for MetMaps
    #[arg(short = 'U', long = "url", alias = "URL")]
    pub url: Option<String>,

    /// Add datetime watermark
    #[arg(short, long)]
    pub watermark: bool,

    /// Append errors to the log file
    #[arg(short, long)]
    pub log: bool,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Wait for each site before starting the next one
    #[arg(short, long)]
    pub join: bool,
}

impl Args {
    /// Overrides the values of `file` with everything given on the command line.
    pub fn apply(self, file: &mut ConfigFile) -> Result<()> {
        let general = &mut file.general;

        let (start, end) = select_tokens(
            &self.start_end,
            &general.start_datetime,
            &general.end_datetime,
        )?;
        let (start, end) = (start.to_string(), end.to_string());
        general.start_datetime = start;
        general.end_datetime = end;

        if let Some(sites) = self.sites {
            general.sites = sites;
        }
        if let Some(interval) = self.interval {
            general.interval = interval;
        }
        if let Some(output_dir) = self.output_dir {
            general.output_dir = output_dir;
        }
        if let Some(user_agent) = self.user_agent {
            general.user_agent = user_agent;
        }
        general.watermark |= self.watermark;
        general.log |= self.log;
        general.verbose |= self.verbose;
        general.join |= self.join;

        let metmaps = &mut file.metmaps;
        if let Some(username) = self.username {
            metmaps.username = username;
        }
        if let Some(password) = self.password {
            metmaps.password = password;
        }
        if let Some(url) = self.url {
            metmaps.url = url;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn flags_override_file() {
        let args = Args::parse_from([
            "ems-shot", "1200", "-s", "d", "-i", "10", "-o", "out", "-w", "-j", "-U",
            "https://m.example",
        ]);
        let mut file = ConfigFile::default();
        file.general.end_datetime = "max".into();
        args.apply(&mut file).unwrap();

        assert_eq!(file.general.start_datetime, "1200");
        assert_eq!(file.general.end_datetime, "max");
        assert_eq!(file.general.sites, "d");
        assert_eq!(file.general.interval, 10);
        assert_eq!(file.general.output_dir, PathBuf::from("out"));
        assert!(file.general.watermark && file.general.join);
        assert!(!file.general.verbose);
        assert_eq!(file.metmaps.url, "https://m.example");
    }

    #[test]
    fn switches_never_turn_config_off() {
        let args = Args::parse_from(["ems-shot"]);
        let mut file = ConfigFile::default();
        file.general.watermark = true;
        args.apply(&mut file).unwrap();
        assert!(file.general.watermark);
    }

    #[test]
    fn underscore_and_uppercase_long_flags() {
        let args = Args::parse_from([
            "ems-shot",
            "--output_dir",
            "shots",
            "--user_agent",
            "curl/8",
            "--URL",
            "https://m.example",
        ]);
        assert_eq!(args.output_dir, Some(PathBuf::from("shots")));
        assert_eq!(args.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(args.url.as_deref(), Some("https://m.example"));

        let args = Args::parse_from(["ems-shot", "--output-dir", "a", "--url", "b"]);
        assert_eq!(args.output_dir, Some(PathBuf::from("a")));
        assert_eq!(args.url.as_deref(), Some("b"));
    }

    #[test]
    fn too_many_positionals() {
        let args = Args::parse_from(["ems-shot", "now", "max", "extra"]);
        assert!(args.apply(&mut ConfigFile::default()).is_err());
    }
}
