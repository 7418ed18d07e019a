use crate::element::Element;
use crate::transport::{Transport, TransportResponse};
use crate::types::{CaptureOptions, ImageFormat, Viewport};
use crate::utils::{self, next_id};
use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use log::{debug, warn};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// Polls until no resource has finished loading for `QUIET` ms, or rejects after `LIMIT` ms.
const NETWORK_IDLE_JS: &str = r#"
new Promise((resolve, reject) => {
    const QUIET = 500, LIMIT = LIMIT_PLACEHOLDER, start = Date.now();
    let last = Date.now();
    const obs = new PerformanceObserver(() => { last = Date.now(); });
    obs.observe({ type: 'resource' });
    const tick = () => {
        const now = Date.now();
        if (document.readyState === 'complete' && now - last >= QUIET) {
            obs.disconnect();
            return resolve(true);
        }
        if (now - start > LIMIT) {
            obs.disconnect();
            return reject(new Error('Timeout waiting for network idle'));
        }
        setTimeout(tick, 100);
    };
    tick();
})
"#;

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
    timeout: Duration,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Tab {
    /// Creates a new blank tab and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>, timeout: Duration) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
            timeout,
            background: Mutex::new(Vec::new()),
        })
    }

    /// Sends a command to this tab's session and returns the full reply.
    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        utils::session_cmd(&self.transport, &self.session_id, method, params).await
    }

    pub async fn set_viewport(&self, viewport: &Viewport) -> Result<&Self> {
        self.send_cmd(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": false
            }),
        )
        .await?;
        Ok(self)
    }

    /// Overrides the `User-Agent` for all requests of this tab.
    pub async fn set_user_agent(&self, user_agent: &str) -> Result<&Self> {
        self.send_cmd(
            "Network.setUserAgentOverride",
            json!({ "userAgent": user_agent }),
        )
        .await?;
        Ok(self)
    }

    /// Answers HTTP basic-auth challenges from the origin of `url` with the given credentials.
    ///
    /// Requests to other origins are neither intercepted nor sent the credentials.
    pub async fn set_basic_auth(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<&Self> {
        let pattern = origin_pattern(url)?;
        let paused = self
            .transport
            .subscribe(&self.session_id, "Fetch.requestPaused")
            .await?;
        let challenged = self
            .transport
            .subscribe(&self.session_id, "Fetch.authRequired")
            .await?;

        let responder = AuthResponder {
            transport: self.transport.clone(),
            session_id: self.session_id.clone(),
            username: username.to_string(),
            password: password.to_string(),
        };
        let handle = tokio::spawn(responder.run(paused, challenged));
        self.background
            .lock()
            .map_err(|_| anyhow!("Failed to lock tab tasks"))?
            .push(handle);

        self.send_cmd(
            "Fetch.enable",
            json!({
                "handleAuthRequests": true,
                "patterns": [{ "urlPattern": pattern }]
            }),
        )
        .await?;
        debug!("answering auth challenges for {}", pattern);
        Ok(self)
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;

        if let Some(details) = result["result"].get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("script exception");
            bail!("JavaScript error: {}", text);
        }
        Ok(result["result"]["result"]["value"].clone())
    }

    /// Navigates to `url` and waits for the page load event.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        // Register listener BEFORE triggering the event to avoid race conditions
        let event_rx = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        let nav = self
            .send_cmd("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = nav["result"]["errorText"].as_str() {
            bail!("Navigation to {} failed: {}", url, error_text);
        }

        time::timeout(self.timeout, event_rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for event Page.loadEventFired"))?
            .map_err(|_| anyhow!("Event channel closed"))?;

        debug!("loaded {}", url);
        Ok(self)
    }

    /// Waits until the page has not finished loading any resource for a short quiet period.
    pub async fn wait_for_network_idle(&self) -> Result<&Self> {
        let js = NETWORK_IDLE_JS.replace("LIMIT_PLACEHOLDER", &self.timeout.as_millis().to_string());
        self.evaluate(&js).await?;
        Ok(self)
    }

    /// Finds the first element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element<'_>> {
        let data_doc = self.send_cmd("DOM.getDocument", json!({})).await?;
        let root_node_id = data_doc["result"]["root"]["nodeId"]
            .as_u64()
            .context("No root node")?;

        let data_sel = self
            .send_cmd(
                "DOM.querySelector",
                json!({ "nodeId": root_node_id, "selector": selector }),
            )
            .await?;
        let node_id = data_sel["result"]["nodeId"]
            .as_u64()
            .filter(|id| *id != 0)
            .with_context(|| format!("Element not found: {}", selector))?;

        Element::new(self, node_id).await
    }

    /// Polls until `selector` matches an element with a non-empty border box, or the tab's
    /// step timeout elapses.
    pub async fn wait_for_selector(&self, selector: &str) -> Result<Element<'_>> {
        let start = Instant::now();

        loop {
            let last_err = match self.find_element(selector).await {
                Ok(element) => {
                    let bbox = element.bounding_box().await;
                    match bbox {
                        Ok(b) if b.width > 0.0 && b.height > 0.0 => return Ok(element),
                        Ok(b) => anyhow!("Element {} is not visible yet ({:?})", selector, b),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if start.elapsed() >= self.timeout {
                return Err(last_err.context(format!(
                    "Timeout after {:?} waiting for selector {}",
                    self.timeout, selector
                )));
            }
            time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Captures the page (or the clip region of it) and returns the encoded image bytes.
    pub async fn screenshot(&self, opts: CaptureOptions) -> Result<Vec<u8>> {
        let mut params = json!({
            "format": opts.format.as_str(),
            "fromSurface": true,
            "captureBeyondViewport": opts.clip.is_some(),
        });

        if matches!(opts.format, ImageFormat::Jpeg) {
            params["quality"] = json!(opts.quality.unwrap_or(90));
        }

        if let Some(ref clip) = opts.clip {
            if clip.is_empty() {
                bail!("Refusing to capture an empty clip region {:?}", clip);
            }
            params["clip"] = json!({
                "x": clip.x,
                "y": clip.y,
                "width": clip.width,
                "height": clip.height,
                "scale": clip.scale
            });
        }

        self.activate().await?;
        let result = self.send_cmd("Page.captureScreenshot", params).await?;

        let data = result["result"]["data"]
            .as_str()
            .context("No image data received")?;
        BASE64_STANDARD
            .decode(data)
            .context("Invalid base64 image data")
    }

    pub async fn activate(&self) -> Result<&Self> {
        let TransportResponse::Response(_) = self
            .transport
            .send(json!({ "id": next_id(), "method": "Target.activateTarget", "params": { "targetId": self.target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };
        Ok(self)
    }

    pub async fn close(&self) -> Result<()> {
        self.abort_background();
        self.transport
            .send(json!({ "id": next_id(), "method": "Target.closeTarget", "params": { "targetId": self.target_id } }))
            .await?;
        Ok(())
    }

    fn abort_background(&self) {
        if let Ok(mut tasks) = self.background.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for Tab {
    fn drop(&mut self) {
        self.abort_background();
    }
}

/// Lets intercepted requests through and answers their auth challenges.
struct AuthResponder {
    transport: Arc<Transport>,
    session_id: String,
    username: String,
    password: String,
}

impl AuthResponder {
    async fn run(
        self,
        mut paused: mpsc::UnboundedReceiver<Value>,
        mut challenged: mpsc::UnboundedReceiver<Value>,
    ) {
        // a request challenged again after credentials were sent has been rejected
        let mut answered = HashSet::new();

        loop {
            let (method, params) = tokio::select! {
                Some(event) = paused.recv() => (
                    "Fetch.continueRequest",
                    json!({ "requestId": event["requestId"] }),
                ),
                Some(event) = challenged.recv() => {
                    let request_id = event["requestId"].as_str().unwrap_or_default().to_string();
                    let response = if answered.insert(request_id) {
                        json!({
                            "response": "ProvideCredentials",
                            "username": self.username,
                            "password": self.password
                        })
                    } else {
                        warn!("credentials rejected by {}", event["request"]["url"]);
                        json!({ "response": "CancelAuth" })
                    };
                    (
                        "Fetch.continueWithAuth",
                        json!({ "requestId": event["requestId"], "authChallengeResponse": response }),
                    )
                }
                else => break,
            };

            if let Err(e) =
                utils::session_cmd(&self.transport, &self.session_id, method, params).await
            {
                debug!("{} failed: {:?}", method, e);
            }
        }
    }
}

/// `scheme://host[:port]/*` for an absolute URL.
fn origin_pattern(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .with_context(|| format!("Not an absolute URL: {}", url))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    if scheme.is_empty() || host.is_empty() {
        bail!("Not an absolute URL: {}", url);
    }
    Ok(format!("{}://{}/*", scheme, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_scoped_to_origin() {
        assert_eq!(
            origin_pattern("https://metmaps.eu/map/index.php?region=de").unwrap(),
            "https://metmaps.eu/*"
        );
        assert_eq!(
            origin_pattern("http://127.0.0.1:8080").unwrap(),
            "http://127.0.0.1:8080/*"
        );
        assert_eq!(
            origin_pattern("https://user@maps.example#top").unwrap(),
            "https://maps.example/*"
        );
        assert!(origin_pattern("metmaps.eu/map").is_err());
        assert!(origin_pattern("https:///map").is_err());
    }

    #[test]
    fn network_idle_script_takes_limit() {
        let js = NETWORK_IDLE_JS.replace("LIMIT_PLACEHOLDER", "1500");
        assert!(js.contains("LIMIT = 1500"));
        assert!(!js.contains("PLACEHOLDER"));
    }
}
