use crate::tab::Tab;
use crate::types::BoundingBox;
use anyhow::{Context, Result};
use serde_json::json;

/// Represents a DOM element controlled via CDP.
pub struct Element<'a> {
    parent: &'a Tab,
    backend_node_id: u64,
}

impl<'a> Element<'a> {
    pub(crate) async fn new(parent: &'a Tab, node_id: u64) -> Result<Self> {
        let data = parent
            .send_cmd("DOM.describeNode", json!({ "nodeId": node_id, "depth": 1 }))
            .await?;
        let backend_node_id = data["result"]["node"]["backendNodeId"]
            .as_u64()
            .context("Missing backendNodeId")?;

        Ok(Self {
            parent,
            backend_node_id,
        })
    }

    /// Border box of the element in CSS pixels, relative to the main frame viewport.
    pub async fn bounding_box(&self) -> Result<BoundingBox> {
        let data = self
            .parent
            .send_cmd(
                "DOM.getBoxModel",
                json!({ "backendNodeId": self.backend_node_id }),
            )
            .await?;

        let border: Vec<f64> = data["result"]["model"]["border"]
            .as_array()
            .context("Element has no box model")?
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();

        BoundingBox::from_quad(&border).context("Malformed border quad")
    }
}
