use crate::transport::{TargetMessage, Transport, TransportResponse};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// Parses the JSON message string carried by a `TargetMessage`.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    Ok(serde_json::from_str(str_msg)?)
}

/// Turns a CDP `error` object of a session reply into an `Err`.
pub(crate) fn check_error(method: &str, data: &Value) -> Result<()> {
    match data.get("error") {
        Some(err) => Err(anyhow!(
            "{} failed: {}",
            method,
            err["message"].as_str().unwrap_or("unknown CDP error")
        )),
        None => Ok(()),
    }
}

/// Runs `method` in a target session and returns the reply, failing on a CDP error.
pub(crate) async fn session_cmd(
    transport: &Arc<Transport>,
    session_id: &str,
    method: &str,
    params: Value,
) -> Result<Value> {
    let msg_id = next_id();
    let msg = json!({
        "id": msg_id,
        "method": method,
        "params": params
    })
    .to_string();
    let res = send_and_get_msg(transport.clone(), msg_id, session_id, msg).await?;
    let data = serde_msg(&res)?;
    check_error(method, &data)?;
    Ok(data)
}

/// Sends a message to a target session and waits for the corresponding reply.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    let send_fut = transport.send(json!({
        "id": next_id(),
        "method": "Target.sendMessageToTarget",
        "params": { "sessionId": session_id, "message": msg }
    }));
    let recv_fut = transport.get_target_msg(msg_id);

    let (_, target_msg) = futures_util::try_join!(send_fut, recv_fut)?;

    match target_msg {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }

    #[test]
    fn unwraps_target_message_payload() {
        let msg = TargetMessage {
            params: json!({ "sessionId": "S1", "message": r#"{"id":7,"result":{"ok":true}}"# }),
        };
        let data = serde_msg(&msg).unwrap();
        assert_eq!(data["id"], 7);
        assert_eq!(data["result"]["ok"], true);
    }

    #[test]
    fn reports_cdp_errors() {
        let data = json!({ "id": 3, "error": { "code": -32000, "message": "No node with given id found" } });
        let err = check_error("DOM.getBoxModel", &data).unwrap_err();
        assert!(err.to_string().contains("DOM.getBoxModel failed"));
        assert!(check_error("DOM.getBoxModel", &json!({ "id": 3, "result": {} })).is_ok());
    }
}
