use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::browser::Browser;
use crate::config::Settings;
use crate::site::Site;
use crate::tab::Tab;
use crate::types::CaptureOptions;
use crate::watermark;

/// Captures `site` into the output directory and returns the written file.
///
/// Launches a dedicated browser that is closed again on every outcome.
pub async fn capture(site: Site, settings: Arc<Settings>, time: DateTime<Utc>) -> Result<PathBuf> {
    let browser = Browser::launch(settings.browser.clone())
        .await
        .context("Failed to launch browser")?;

    let result = async {
        let tab = browser.new_tab().await?;
        let path = capture_in_tab(site, &settings, &tab, time).await;
        if let Err(e) = tab.close().await {
            warn!("Failed to close {} tab: {:?}", site, e);
        }
        path
    }
    .await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close browser after {}: {:?}", site, e);
    }

    result.with_context(|| format!("{} screenshot failed", site))
}

async fn capture_in_tab(
    site: Site,
    settings: &Settings,
    tab: &Tab,
    time: DateTime<Utc>,
) -> Result<PathBuf> {
    tab.set_viewport(&settings.browser.viewport).await?;
    tab.set_user_agent(&settings.user_agent).await?;
    site.prepare(tab, &settings.access).await?;

    let clip = site.locate(tab, &settings.access).await?;
    let image = tab
        .screenshot(CaptureOptions::new().with_format(settings.format).with_clip(clip))
        .await
        .context("Failed to capture screenshot")?;

    let path = site.image_path(&settings.output_dir, time, settings.format);
    tokio::fs::write(&path, &image)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("saved {}", path.display());

    if settings.watermark {
        let font = settings.font.clone();
        let target = path.clone();
        let position = site.watermark_position();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let font = watermark::load_font(font.as_deref())?;
            watermark::apply(&target, position, time, &font)
        })
        .await?
        .with_context(|| format!("Failed to watermark {}", path.display()))?;
    }

    Ok(path)
}
