mod browser_config;
mod temp_dir;

use anyhow::{Context, Result, anyhow};
use log::{debug, trace, warn};
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::{Arc, Mutex, Weak};
use temp_dir::CustomTempDir;
use tokio::sync::oneshot;
use tokio::time;

pub use browser_config::BrowserConfig;

use crate::tab::Tab;
use crate::transport::Transport;

/// The browser child process and its user-data directory.
#[derive(Debug)]
struct Process {
    child: Child,
    _temp_dir: CustomTempDir,
}

impl Drop for Process {
    /// Kill and reap the child before the temp dir is removed.
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

type SharedProcess = Arc<Mutex<Option<Process>>>;

/// Every browser process still owned by a `Browser`, for `kill_all`.
static PROCESSES: Mutex<Vec<Weak<Mutex<Option<Process>>>>> = Mutex::new(Vec::new());

fn register(process: Process) -> SharedProcess {
    let shared = Arc::new(Mutex::new(Some(process)));
    if let Ok(mut live) = PROCESSES.lock() {
        live.retain(|p| p.strong_count() > 0);
        live.push(Arc::downgrade(&shared));
    }
    shared
}

/// Kills every running browser and removes its profile directory.
///
/// Used before a hard exit, which skips all destructors.
pub(crate) fn kill_all() {
    let live = match PROCESSES.lock() {
        Ok(mut live) => std::mem::take(&mut *live),
        Err(_) => return,
    };
    for process in live.iter().filter_map(Weak::upgrade) {
        if let Ok(mut guard) = process.lock() {
            drop(guard.take());
        }
    }
}

/// A headless browser instance driven over CDP.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: SharedProcess,
    config: BrowserConfig,
}

impl Browser {
    /// Launches a new headless browser instance with default configuration.
    pub async fn new() -> Result<Self> {
        Self::launch(BrowserConfig::default()).await
    }

    /// Launches a browser with the given configuration.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let exe = config.executable_path()?;
        let temp_dir = CustomTempDir::new(&config.temp_base, "ems-shot")
            .context("Failed to create browser profile directory")?;
        let args = config.get_browser_args(temp_dir.path());

        #[cfg(windows)]
        let mut cmd = {
            use std::os::windows::process::CommandExt;
            let mut c = Command::new(&exe);
            c.creation_flags(0x08000000); // CREATE_NO_WINDOW
            c
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&exe);

        let child = cmd
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", exe.display()))?;
        debug!("spawned {} (pid {})", exe.display(), child.id());

        // owning the child from here on kills it on every early return
        let mut process = Process {
            child,
            _temp_dir: temp_dir,
        };
        let stderr = process
            .child
            .stderr
            .take()
            .context("Failed to get stderr from browser process")?;

        let ws_url = time::timeout(config.timeout, Self::wait_for_ws(stderr))
            .await
            .map_err(|_| anyhow!("Timeout waiting for the DevTools endpoint"))??;
        debug!("DevTools endpoint {}", ws_url);

        let transport = Transport::new(&ws_url, config.command_timeout())
            .await
            .context("Failed to connect to the DevTools endpoint")?;

        Ok(Self {
            transport: Arc::new(transport),
            process: register(process),
            config,
        })
    }

    /// Reads browser stderr to extract the WebSocket debugging URL.
    ///
    /// The pipe keeps being drained afterwards so the browser never blocks on a full stderr.
    async fn wait_for_ws(stderr: ChildStderr) -> Result<String> {
        let re = Regex::new(r"listening on (.*/devtools/browser/.*)$")?;
        let (tx, rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let mut tx = Some(tx);
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                if let Some(cap) = re.captures(&line)
                    && let Some(tx) = tx.take()
                {
                    let _ = tx.send(cap[1].to_string());
                } else {
                    trace!("browser: {}", line);
                }
            }
        });

        rx.await
            .map_err(|_| anyhow!("Browser exited before printing its DevTools URL"))
    }

    /// Opens a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone(), self.config.timeout).await
    }

    /// Closes the browser process and removes its profile directory.
    pub async fn close(&self) -> Result<()> {
        self.transport.shutdown().await;
        self.kill()
    }

    fn kill(&self) -> Result<()> {
        let mut process_guard = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?;
        // dropping the process kills it, waits for it and deletes the temp dir
        drop(process_guard.take());
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!("Error closing browser in Drop: {:?}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn kill_all_reaps_registered_processes() {
        let base = tempfile::tempdir().unwrap();
        let temp_dir = CustomTempDir::new(base.path(), "ems-shot").unwrap();
        let profile = temp_dir.path().to_path_buf();
        let child = Command::new("sleep").arg("30").spawn().unwrap();

        let shared = register(Process {
            child,
            _temp_dir: temp_dir,
        });
        assert!(profile.is_dir());

        kill_all();
        assert!(shared.lock().unwrap().is_none());
        assert!(!profile.exists());
    }
}
