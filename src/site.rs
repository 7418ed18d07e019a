//! The weather-warning pages that can be captured.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::tab::Tab;
use crate::types::{BoundingBox, ClipRegion, ImageFormat};
use crate::watermark::Position;

pub const UWZ_URL: &str =
    "https://www.weatherpro.com/de/germany/berlin/berlin/iframe?mapregion=deutschland";
pub const DWD_URL: &str = "https://www.dwd.de/DE/wetter/warnungen_landkreise/warnWetter_node.html";

const UWZ_MAP_SELECTOR: &str =
    "#mapContainer .leaflet-map-pane .leaflet-overlay-pane .leaflet-zoom-animated g";
const UWZ_CLIP: ClipRegion = ClipRegion {
    x: 0.0,
    y: 0.0,
    width: 556.0,
    height: 600.0,
    scale: 1.0,
};

#[cfg(not(windows))]
const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M";
#[cfg(windows)]
const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// A capturable site, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Site {
    /// Unwetterzentrale map, via the weatherpro.com iframe.
    Uwz,
    /// Deutscher Wetterdienst district warnings.
    Dwd,
    /// metmaps.eu, behind HTTP basic auth.
    MetMaps,
}

/// Per-run inputs a site needs besides its hard-coded layout.
#[derive(Clone, Default)]
pub struct SiteAccess {
    pub metmaps_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SiteAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteAccess")
            .field("metmaps_url", &self.metmaps_url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Uwz, Site::Dwd, Site::MetMaps];

    pub fn letter(&self) -> char {
        match self {
            Site::Uwz => 'u',
            Site::Dwd => 'd',
            Site::MetMaps => 'm',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Site::Uwz => "uwz",
            Site::Dwd => "dwd",
            Site::MetMaps => "metmaps",
        }
    }

    fn from_letter(c: char) -> Option<Site> {
        Site::ALL
            .into_iter()
            .find(|s| s.letter() == c.to_ascii_lowercase())
    }

    pub fn url<'a>(&self, access: &'a SiteAccess) -> &'a str {
        match self {
            Site::Uwz => UWZ_URL,
            Site::Dwd => DWD_URL,
            Site::MetMaps => &access.metmaps_url,
        }
    }

    pub fn watermark_position(&self) -> Position {
        match self {
            Site::Uwz => Position::BottomLeft,
            Site::Dwd | Site::MetMaps => Position::BottomRight,
        }
    }

    /// `<dir>/<name>_<YYYY-MM-DD_HH:MM>.<ext>` for a capture started at `time`.
    pub fn image_path(&self, dir: &Path, time: DateTime<Utc>, format: ImageFormat) -> PathBuf {
        dir.join(format!(
            "{}_{}.{}",
            self.name(),
            time.format(FILE_TIME_FORMAT),
            format.extension()
        ))
    }

    /// Prepares the tab for this site before navigation.
    pub async fn prepare(&self, tab: &Tab, access: &SiteAccess) -> Result<()> {
        if let Site::MetMaps = self {
            if access.metmaps_url.is_empty() {
                bail!("No MetMaps URL configured");
            }
            tab.set_basic_auth(&access.metmaps_url, &access.username, &access.password)
                .await
                .context("Failed to set MetMaps credentials")?;
        }
        Ok(())
    }

    /// Navigates, waits until the relevant content has rendered and returns the region to capture.
    pub async fn locate(&self, tab: &Tab, access: &SiteAccess) -> Result<ClipRegion> {
        let url = self.url(access);
        tab.goto(url)
            .await
            .with_context(|| format!("Failed to load {}", url))?;

        match self {
            Site::Uwz => {
                tab.wait_for_selector(UWZ_MAP_SELECTOR)
                    .await
                    .context("UWZ map did not render")?;
                tab.wait_for_network_idle().await?;
                Ok(UWZ_CLIP)
            }
            Site::Dwd => {
                let app = tab.wait_for_selector("#appBox").await?.bounding_box().await?;
                let header = tab
                    .wait_for_selector("#headerBox")
                    .await?
                    .bounding_box()
                    .await?;
                let svg = tab.wait_for_selector("#svgBox").await?.bounding_box().await?;
                debug!("dwd boxes: app {:?} header {:?} svg {:?}", app, header, svg);
                Ok(dwd_clip(&app, &header, &svg))
            }
            Site::MetMaps => {
                tab.wait_for_network_idle().await?;
                let image = tab
                    .wait_for_selector("#inputimage")
                    .await
                    .context("MetMaps image not found")?
                    .bounding_box()
                    .await?;
                Ok(image.into())
            }
        }
    }
}

/// The DWD map plus the legend header above it, as wide as the whole app.
pub fn dwd_clip(app: &BoundingBox, header: &BoundingBox, svg: &BoundingBox) -> ClipRegion {
    ClipRegion::new(
        svg.x,
        svg.y - header.height,
        app.width,
        svg.height + header.height,
    )
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Site {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Site::ALL
            .into_iter()
            .find(|site| site.name() == lower)
            .or_else(|| {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Site::from_letter(c),
                    _ => None,
                }
            })
            .with_context(|| format!("Unknown site '{}'", s))
    }
}

/// Parses a site selection such as `a`, `ud`, `dwd` or `uwz,metmaps`.
///
/// The result is ordered u, d, m and free of duplicates.
pub fn parse_sites(selection: &str) -> Result<Vec<Site>> {
    let mut sites = Vec::new();

    for token in selection.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let lower = token.to_ascii_lowercase();
        if lower == "a" || lower == "all" {
            sites.extend(Site::ALL);
        } else if let Ok(site) = lower.parse::<Site>() {
            sites.push(site);
        } else {
            for c in lower.chars() {
                let site = Site::from_letter(c)
                    .with_context(|| format!("Unknown site '{}' in '{}'", c, selection))?;
                sites.push(site);
            }
        }
    }

    if sites.is_empty() {
        bail!("No sites selected");
    }
    sites.sort();
    sites.dedup();
    Ok(sites)
}
