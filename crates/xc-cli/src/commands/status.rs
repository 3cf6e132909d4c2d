//! `xc status` / `xc health` — read-only calls against the operator HTTP
//! surface (§6).

use anyhow::{Context, Result};
use xc_daemon::api_types::{HealthResponse, StatusResponse};

use super::{http_client, pretty_print};

pub async fn status(base_url: &str) -> Result<()> {
    let client = http_client()?;
    let resp: StatusResponse = client
        .get(format!("{base_url}/status"))
        .send()
        .await
        .context("GET /status failed")?
        .error_for_status()
        .context("/status returned an error")?
        .json()
        .await
        .context("decode /status body")?;
    pretty_print(&serde_json::to_value(&resp)?)
}

pub async fn health(base_url: &str) -> Result<()> {
    let client = http_client()?;
    let resp = client.get(format!("{base_url}/health")).send().await.context("GET /health failed")?;
    let ok = resp.status().is_success();
    let body: HealthResponse = resp.json().await.context("decode /health body")?;
    pretty_print(&serde_json::to_value(&body)?)?;
    if !ok || !body.ok {
        anyhow::bail!("daemon reports unhealthy");
    }
    Ok(())
}
