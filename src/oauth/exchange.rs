//! Authorization-code exchange against GitHub's token endpoint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Token exchange request body.
///
/// GitHub's `/login/oauth/access_token` endpoint accepts a JSON body and
/// returns JSON when asked via the `Accept` header.
#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// Token exchange response.
///
/// A failed exchange can still be a 200 with `error_description` set and
/// no `access_token`, so both fields are optional.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchange an authorization code for an access token.
///
/// # Returns
/// * `Ok(String)` - The access token
/// * `Err(Error::TokenExchange)` - On network failure, non-2xx status, or
///   a response without an `access_token`
pub async fn exchange_code_for_token(
    http: &reqwest::Client,
    oauth_base_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<String> {
    let token_url = format!("{}/login/oauth/access_token", oauth_base_url);
    debug!(url = %token_url, "Exchanging authorization code for token");

    let response = http
        .post(&token_url)
        .header("Accept", "application/json")
        .json(&TokenRequest {
            client_id,
            client_secret,
            code,
            redirect_uri,
        })
        .send()
        .await
        .map_err(|e| Error::TokenExchange(format!("Failed to reach token endpoint: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(Error::TokenExchange(format!(
            "Token endpoint returned {}: {}",
            status, body
        )));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::TokenExchange(format!("Failed to parse token response: {}", e)))?;

    match token_response.access_token {
        Some(token) if !token.is_empty() => {
            debug!("Token exchange successful");
            Ok(token)
        }
        _ => Err(Error::TokenExchange(
            token_response
                .error_description
                .unwrap_or_else(|| "No access token in response".to_string()),
        )),
    }
}
