// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot enrollment flow.

use reqwest::StatusCode;
use serde_json::json;

use crate::agent_info::AgentInfo;
use crate::error::AgentError;
use crate::http_client::HttpClient;

/// Inputs to [`register`]: user credentials plus optional identity hints.
pub struct RegistrationRequest {
    pub user: String,
    pub password: String,
    pub name: Option<String>,
    pub ip: Option<String>,
}

/// Manager's accepted identity, returned by `POST /agents`.
#[derive(Debug, serde::Deserialize)]
pub struct RegisteredIdentity {
    pub uuid: String,
    pub key: String,
}

/// Exchanges user credentials for a signed UUID/key and persists it
/// atomically. Idempotent: re-running overwrites identity.
pub async fn register(
    http: &HttpClient,
    base_url: &str,
    agent_info: &AgentInfo,
    req: RegistrationRequest,
) -> Result<RegisteredIdentity, AgentError> {
    let auth_url = format!("{base_url}/security/user/authenticate");
    let auth_params = crate::http_client::HttpRequestParams::post(auth_url)
        .with_basic(&req.user, &req.password);
    let auth_response = http.request(&auth_params).await?;
    if auth_response.status == StatusCode::UNAUTHORIZED || auth_response.status == StatusCode::FORBIDDEN {
        return Err(AgentError::NetworkPermanent(anyhow::anyhow!("registration credentials rejected")));
    }
    if !auth_response.status.is_success() {
        return Err(AgentError::NetworkPermanent(anyhow::anyhow!(
            "authenticate returned {}",
            auth_response.status
        )));
    }
    let token = auth_response
        .body
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::NetworkPermanent(anyhow::anyhow!("authenticate response missing token")))?
        .to_string();

    let identity = agent_info.load_or_init(req.name.as_deref().unwrap_or("agent")).await?;
    let mut body = json!({
        "uuid": identity.uuid,
        "key": identity.key,
    });
    if let Some(name) = &req.name {
        body["name"] = json!(name);
    }
    if let Some(ip) = &req.ip {
        body["ip"] = json!(ip);
    }

    let agents_url = format!("{base_url}/agents");
    let agents_params = crate::http_client::HttpRequestParams::post(agents_url)
        .with_bearer(token)
        .with_body(body);
    let agents_response = http.request(&agents_params).await?;
    if !agents_response.status.is_success() {
        return Err(AgentError::NetworkPermanent(anyhow::anyhow!(
            "agent registration rejected: {}",
            agents_response.status
        )));
    }

    let accepted: RegisteredIdentity = serde_json::from_value(agents_response.body)
        .map_err(|e| AgentError::NetworkPermanent(anyhow::anyhow!("malformed registration response: {e}")))?;

    agent_info
        .set_registration(req.name.as_deref().unwrap_or(&identity.name), &accepted.uuid, &accepted.key)
        .await?;

    Ok(accepted)
}
