//! signup / login commands.

use anyhow::Result;

use bridge_core::config::BridgeConfig;

use super::client::{connect, finish};

pub async fn signup(config: &BridgeConfig, name: &str, email: &str, password: &str) -> Result<()> {
    let gateway = connect(config).await?;
    let response = gateway.signup(name, email, password).await;
    finish(gateway, response).await
}

pub async fn login(config: &BridgeConfig, email: &str, password: &str) -> Result<()> {
    let gateway = connect(config).await?;
    let response = gateway.login(email, password).await;
    finish(gateway, response).await
}
