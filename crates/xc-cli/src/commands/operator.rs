//! `xc arm|disarm|halt|flatten` — the signed operator commands from §6.
//!
//! Every command is HMAC-signed client-side with the same canonicalization
//! the Gatekeeper applies to `Intent`s (`xc_crypto::canonical_json`), so a
//! tampered or replayed CLI invocation is rejected by the daemon exactly the
//! way a forged intent would be.

use anyhow::{Context, Result};
use xc_daemon::api_types::{CommandRejectedResponse, FlattenResponse, OperatorCommandResponse};

use super::{http_client, pretty_print, resolve_secret, sign_operator_command};

pub struct OperatorArgs<'a> {
    pub base_url: &'a str,
    pub operator_id: &'a str,
    pub reason: &'a str,
    pub pin: &'a str,
    pub secret_env: &'a str,
}

async fn post_command(action: &str, args: &OperatorArgs<'_>) -> Result<serde_json::Value> {
    let secret = resolve_secret(args.secret_env)?;
    let body = sign_operator_command(&secret, action, args.operator_id, args.reason, args.pin);

    let client = http_client()?;
    let resp = client
        .post(format!("{}/{action}", args.base_url))
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST /{action} failed"))?;

    if !resp.status().is_success() {
        let rejected: CommandRejectedResponse =
            resp.json().await.context("decode rejected command response")?;
        anyhow::bail!("{action} rejected: {}", rejected.error);
    }
    resp.json().await.context("decode command response")
}

pub async fn arm(args: OperatorArgs<'_>) -> Result<()> {
    let body = post_command("arm", &args).await?;
    let resp: OperatorCommandResponse = serde_json::from_value(body)?;
    pretty_print(&serde_json::to_value(&resp)?)
}

pub async fn disarm(args: OperatorArgs<'_>) -> Result<()> {
    let body = post_command("disarm", &args).await?;
    let resp: OperatorCommandResponse = serde_json::from_value(body)?;
    pretty_print(&serde_json::to_value(&resp)?)
}

pub async fn halt(args: OperatorArgs<'_>) -> Result<()> {
    let body = post_command("halt", &args).await?;
    let resp: OperatorCommandResponse = serde_json::from_value(body)?;
    pretty_print(&serde_json::to_value(&resp)?)
}

pub async fn flatten(args: OperatorArgs<'_>) -> Result<()> {
    let body = post_command("flatten", &args).await?;
    let resp: FlattenResponse = serde_json::from_value(body)?;
    pretty_print(&serde_json::to_value(&resp)?)
}
