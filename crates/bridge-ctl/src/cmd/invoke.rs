//! Raw action invocation.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use bridge_core::config::BridgeConfig;

use super::client::{connect, finish};

/// Send `action` with the fields of a JSON object. No local validation.
pub async fn invoke(config: &BridgeConfig, action: &str, fields: Option<&str>) -> Result<()> {
    let fields = match fields {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw).context("fields must be JSON")? {
            Value::Object(map) => map,
            other => bail!("fields must be a JSON object, got {other}"),
        },
    };

    let gateway = connect(config).await?;
    let response = gateway.invoke(action, fields).await;
    finish(gateway, response).await
}
