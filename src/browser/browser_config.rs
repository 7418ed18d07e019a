use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

use crate::types::Viewport;

static DEFAULT_ARGS: [&str; 20] = [
    "--no-sandbox",
    "--no-zygote",
    "--disable-dev-shm-usage",
    "--disable-features=Translate,OptimizationHints,MediaRouter,DialMediaRouteProvider",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-domain-reliability",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--disable-gpu",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-pings",
    "--hide-scrollbars",
    "--mute-audio",
    "--disable-breakpad",
    "--disable-notifications",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Launch settings of a headless browser.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium/Edge executable; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Window size; pages are additionally emulated at this size per tab.
    pub viewport: Viewport,
    /// Upper bound for every single browser step (launch, navigation, waits).
    pub timeout: Duration,
    /// Parent of the per-launch user-data directories.
    pub temp_base: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            viewport: Viewport::default(),
            timeout: Duration::from_secs(30),
            temp_base: std::env::temp_dir().join("ems-shot"),
        }
    }
}

impl BrowserConfig {
    pub(crate) fn executable_path(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(anyhow!("Browser executable {} does not exist", path.display())),
            None => default_executable(),
        }
    }

    /// Replies may take as long as the step they belong to, plus some slack.
    pub(crate) fn command_timeout(&self) -> Duration {
        self.timeout + Duration::from_secs(5)
    }

    pub(crate) fn get_browser_args(&self, user_data_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", user_data_dir.display()),
            format!(
                "--window-size={},{}",
                self.viewport.width, self.viewport.height
            ),
        ];

        args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());

        args
    }
}

fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    let apps = [
        "google-chrome-stable",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "microsoft-edge-stable",
        "chrome",
        "msedge",
        "microsoft-edge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }

        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!(
        "Could not auto detect a chrome executable. Set CHROME or [browser] executable"
    ))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_contain_profile_and_headless() {
        let config = BrowserConfig {
            viewport: Viewport::new(1024, 768),
            ..Default::default()
        };
        let args = config.get_browser_args(Path::new("/tmp/profile"));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--window-size=1024,768".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));

        let headed = BrowserConfig {
            headless: false,
            ..Default::default()
        };
        assert!(
            !headed
                .get_browser_args(Path::new("/tmp/profile"))
                .iter()
                .any(|a| a.starts_with("--headless"))
        );
    }

    #[test]
    fn missing_explicit_executable_is_an_error() {
        let config = BrowserConfig {
            executable: Some(PathBuf::from("/definitely/not/here/chrome")),
            ..Default::default()
        };
        assert!(config.executable_path().is_err());
    }
}
