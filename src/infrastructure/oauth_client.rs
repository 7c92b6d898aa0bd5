use crate::infrastructure::config::GoogleOAuthSecrets;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn exchange_authorization_code(
        &self,
        secrets: &GoogleOAuthSecrets,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;

    async fn refresh_access_token(
        &self,
        secrets: &GoogleOAuthSecrets,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;

    async fn revoke_token(&self, token: &str) -> Result<(), InfraError>;
}

/// Consent URL with offline access so a refresh token is issued.
pub fn authorization_url(secrets: &GoogleOAuthSecrets, state: &str) -> Result<String, InfraError> {
    let mut url = Url::parse(GOOGLE_AUTH_ENDPOINT)
        .map_err(|error| InfraError::OAuth(format!("invalid auth endpoint: {error}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", secrets.client_id.as_str())
        .append_pair("redirect_uri", secrets.redirect_uri.as_str())
        .append_pair("response_type", "code")
        .append_pair("scope", &secrets.scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);
    Ok(url.into())
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestOAuthClient {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponsePayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<OAuthTokenResponse, InfraError> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_ENDPOINT)
            .form(params)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;
        parse_token_response(status, &body)
    }
}

fn parse_token_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<OAuthTokenResponse, InfraError> {
    let parsed = serde_json::from_str::<TokenResponsePayload>(body).map_err(|error| {
        InfraError::OAuth(format!("invalid token response payload: {error}; body={body}"))
    })?;

    if !status.is_success() || parsed.error.is_some() {
        let code = parsed
            .error
            .unwrap_or_else(|| format!("http_{}", status.as_u16()));
        let detail = parsed.error_description.unwrap_or_else(|| body.to_string());
        return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
    }

    let access_token = parsed
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| InfraError::OAuth("token response did not include access_token".to_string()))?;

    Ok(OAuthTokenResponse {
        access_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in.unwrap_or(0).max(0),
        token_type: parsed.token_type,
        scope: parsed.scope,
    })
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn exchange_authorization_code(
        &self,
        secrets: &GoogleOAuthSecrets,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", secrets.redirect_uri.as_str()),
            ("code", authorization_code),
        ])
        .await
    }

    async fn refresh_access_token(
        &self,
        secrets: &GoogleOAuthSecrets,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke_token(&self, token: &str) -> Result<(), InfraError> {
        let response = self
            .client
            .post(GOOGLE_REVOKE_ENDPOINT)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("revoke request failed: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InfraError::OAuth(format!(
                "revoke endpoint error: http {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn secrets() -> GoogleOAuthSecrets {
        GoogleOAuthSecrets {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://127.0.0.1:8080/oauth2/callback".to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/calendar.events".to_string(),
                "openid".to_string(),
            ],
        }
    }

    #[test]
    fn authorization_url_requests_offline_access() {
        let url = authorization_url(&secrets(), "user-1").expect("url");
        let parsed = Url::parse(&url).expect("parse");
        let pairs = parsed
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect::<std::collections::HashMap<_, _>>();

        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["state"], "user-1");
        assert_eq!(
            pairs["scope"],
            "https://www.googleapis.com/auth/calendar.events openid"
        );
    }

    #[test]
    fn token_response_errors_are_reported() {
        let error = parse_token_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
        )
        .expect_err("error response");
        assert!(error.to_string().contains("invalid_grant"));

        let missing = parse_token_response(StatusCode::OK, r#"{"expires_in": 10}"#);
        assert!(matches!(missing, Err(InfraError::OAuth(_))));
    }

    #[test]
    fn token_response_clamps_negative_expiry() {
        let parsed = parse_token_response(
            StatusCode::OK,
            r#"{"access_token":"abc","expires_in":-5,"token_type":"Bearer"}"#,
        )
        .expect("token");
        assert_eq!(parsed.expires_in, 0);
        assert_eq!(parsed.refresh_token, None);
    }
}
