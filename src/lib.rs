/*!
Scheduled, cropped screenshots of weather-warning maps.

Captures the UWZ (weatherpro.com) and DWD warning maps and MetMaps images with a
headless Chrome/Chromium driven over the Chrome DevTools Protocol (CDP), crops
them to the map region, optionally stamps the capture time onto them and stores
them on a fixed interval between a start and an end time.

```no_run
use ems_shot::{Browser, BrowserConfig, CaptureOptions};

# async fn demo() -> anyhow::Result<()> {
let browser = Browser::launch(BrowserConfig::default()).await?;
let tab = browser.new_tab().await?;
tab.goto("https://www.dwd.de/").await?;
let area = tab.wait_for_selector("#svgBox").await?.bounding_box().await?;
let png = tab.screenshot(CaptureOptions::new().with_clip(area.into())).await?;
std::fs::write("dwd.png", png)?;
browser.close().await?;
# Ok(())
# }
```
*/

mod browser;
mod element;
mod tab;
mod transport;
mod types;
mod utils;

pub mod capture;
pub mod cli;
pub mod config;
pub mod logging;
pub mod scheduler;
pub mod shutdown;
pub mod site;
pub mod watermark;
pub mod window;

pub use browser::{Browser, BrowserConfig};
pub use element::Element;
pub use tab::Tab;
pub use types::{BoundingBox, CaptureOptions, ClipRegion, ImageFormat, Viewport};
