use anyhow::{Context, Result};
use log::warn;
use rand::{Rng, thread_rng};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser user-data directory, deleted on drop.
#[derive(Debug)]
pub(crate) struct CustomTempDir {
    path: PathBuf,
}

impl CustomTempDir {
    /// Creates `<base>/<prefix>_<timestamp>_<random>`.
    pub(crate) fn new(base: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(base)
            .with_context(|| format!("Failed to create {}", base.display()))?;
        let name = format!(
            "{}_{}_{}",
            prefix,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(6)
                .map(char::from)
                .collect::<String>()
        );
        let path = base.join(name);
        std::fs::create_dir(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CustomTempDir {
    /// Chrome may still hold files briefly after being killed, so retry a few times.
    fn drop(&mut self) {
        for _ in 0..3 {
            if std::fs::remove_dir_all(&self.path).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let dir = CustomTempDir::new(base.path(), "ems-shot").unwrap();
            assert!(dir.path().is_dir());
            let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("ems-shot_"));
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn unique_names() {
        let base = tempfile::tempdir().unwrap();
        let a = CustomTempDir::new(base.path(), "x").unwrap();
        let b = CustomTempDir::new(base.path(), "x").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
