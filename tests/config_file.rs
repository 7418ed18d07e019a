use clap::Parser;
use ems_shot::cli::Args;
use ems_shot::config::{ConfigFile, Settings};
use ems_shot::site::Site;
use ems_shot::window::{self, TimeWindow};
use std::fs;
use std::time::Duration;

fn settings_from(text: &str, argv: &[&str]) -> anyhow::Result<Settings> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    fs::write(&path, text)?;

    let mut args = vec!["ems-shot", "--config", path.to_str().unwrap()];
    args.extend_from_slice(argv);
    let args = Args::parse_from(args);

    let mut file = ConfigFile::discover(args.config.as_deref())?;
    args.apply(&mut file)?;
    Settings::from_config(file)
}

#[test]
fn file_values_are_used_without_flags() {
    let settings = settings_from(
        r#"
        [general]
        sites = "u"
        interval = 15
        output_dir = "maps"
        "#,
        &[],
    )
    .unwrap();

    assert_eq!(settings.sites, vec![Site::Uwz]);
    assert_eq!(settings.interval, Duration::from_secs(15 * 60));
    assert!(settings.output_dir.ends_with("maps"));
}

#[test]
fn flags_win_over_file() {
    let settings = settings_from(
        r#"
        [general]
        sites = "u"
        end_datetime = "max"

        [metmaps]
        URL = "https://file.example"
        "#,
        &["now", "-s", "dm", "-U", "https://cli.example", "-p", "pw"],
    )
    .unwrap();

    assert_eq!(settings.sites, vec![Site::Dwd, Site::MetMaps]);
    assert_eq!(settings.start, "now");
    assert_eq!(settings.end, "max");
    assert_eq!(settings.access.metmaps_url, "https://cli.example");
    assert_eq!(settings.access.password, "pw");
}

#[test]
fn default_tokens_take_one_immediate_round() {
    let settings = settings_from("", &[]).unwrap();
    let window = window::resolve(&settings.start, &settings.end, chrono::Utc::now()).unwrap();
    assert_eq!(window, TimeWindow::Immediate);
}

#[test]
fn invalid_site_selection_is_reported() {
    let err = settings_from("", &["-s", "xyz"]).unwrap_err();
    assert!(format!("{:#}", err).contains("Unknown site"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    assert!(ConfigFile::discover(Some(std::path::Path::new("/no/such/config.toml"))).is_err());
}
