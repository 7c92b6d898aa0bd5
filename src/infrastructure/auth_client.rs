use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// The provider created the account but wants the address confirmed first.
    ConfirmationRequired { email: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    Global,
    Local,
}

impl SignOutScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, InfraError>;
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, InfraError>;
    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthProvider {
    client: Client,
    base_url: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<UserPayload>,
    // Sign-up without auto-confirm returns the bare user object.
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ReqwestAuthProvider {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid authBaseUrl '{base_url}': {error}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            anon_key: anon_key.into(),
        })
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("authBaseUrl cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("auth");
            segments.push("v1");
            segments.extend(path);
        }
        Ok(url)
    }

    async fn post_json(
        &self,
        url: Url,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<String, InfraError> {
        let mut request = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Integration(format!("auth request failed: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| InfraError::Integration(format!("failed reading auth response: {error}")))?;
        if !status.is_success() {
            return Err(auth_http_error(status, &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl AuthProvider for ReqwestAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, InfraError> {
        let mut url = self.endpoint(&["token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let body = self
            .post_json(
                url,
                None,
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        match parse_session_payload(&body, Utc::now())? {
            SignUpOutcome::SignedIn(session) => Ok(session),
            SignUpOutcome::ConfirmationRequired { .. } => Err(InfraError::Auth(
                "sign-in response did not include a session".to_string(),
            )),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, InfraError> {
        let url = self.endpoint(&["signup"])?;
        let body = self
            .post_json(
                url,
                None,
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "data": { "display_name": display_name },
                }),
            )
            .await?;
        parse_session_payload(&body, Utc::now())
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), InfraError> {
        let mut url = self.endpoint(&["logout"])?;
        url.query_pairs_mut().append_pair("scope", scope.as_str());
        self.post_json(url, Some(access_token), &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

fn parse_session_payload(body: &str, now: DateTime<Utc>) -> Result<SignUpOutcome, InfraError> {
    let parsed: SessionPayload = serde_json::from_str(body)
        .map_err(|error| InfraError::Integration(format!("invalid auth payload: {error}")))?;

    let Some(access_token) = parsed.access_token.filter(|token| !token.trim().is_empty()) else {
        let email = parsed
            .user
            .as_ref()
            .and_then(|user| user.email.clone())
            .or(parsed.email)
            .ok_or_else(|| InfraError::Auth("auth response did not include a user".to_string()))?;
        return Ok(SignUpOutcome::ConfirmationRequired { email });
    };

    let user = parsed
        .user
        .ok_or_else(|| InfraError::Auth("auth response did not include a user".to_string()))?;
    let expires_at = parsed
        .expires_at
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_else(|| now + Duration::seconds(parsed.expires_in.unwrap_or(3600).max(0)));
    let display_name = user
        .user_metadata
        .as_ref()
        .and_then(|metadata| metadata.get("display_name"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned);

    Ok(SignUpOutcome::SignedIn(AuthSession {
        access_token,
        refresh_token: parsed.refresh_token,
        expires_at,
        user: AuthUser {
            id: user.id,
            email: user.email,
            display_name,
        },
    }))
}

fn auth_http_error(status: StatusCode, body: &str) -> InfraError {
    let detail = serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| {
            payload
                .error_description
                .or(payload.msg)
                .or(payload.message)
                .or(payload.error)
        })
        .unwrap_or_else(|| format!("http {}", status.as_u16()));

    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => InfraError::Auth(detail),
        _ => InfraError::Integration(format!("auth service error: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).single().expect("valid")
    }

    #[test]
    fn endpoints_are_built_under_auth_v1() {
        let provider = ReqwestAuthProvider::new("https://project.example.co/", "anon").expect("provider");
        let mut url = provider.endpoint(&["token"]).expect("endpoint");
        url.query_pairs_mut().append_pair("grant_type", "password");
        assert_eq!(
            url.as_str(),
            "https://project.example.co/auth/v1/token?grant_type=password"
        );
        assert!(ReqwestAuthProvider::new("not a url", "anon").is_err());
    }

    #[test]
    fn session_payload_is_parsed() {
        let body = r#"{
            "access_token": "jwt",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": {"id": "user-1", "email": "a@example.com", "user_metadata": {"display_name": "Ada"}}
        }"#;
        let SignUpOutcome::SignedIn(session) = parse_session_payload(body, now()).expect("parse") else {
            panic!("expected session");
        };
        assert_eq!(session.user.id, "user-1");
        assert_eq!(session.user.display_name.as_deref(), Some("Ada"));
        assert_eq!(session.expires_at, now() + Duration::hours(1));
        assert!(!session.is_expired_at(now()));
    }

    #[test]
    fn unconfirmed_sign_up_requires_confirmation() {
        let body = r#"{"id": "user-1", "email": "a@example.com"}"#;
        assert_eq!(
            parse_session_payload(body, now()).expect("parse"),
            SignUpOutcome::ConfirmationRequired {
                email: "a@example.com".to_string()
            }
        );
    }

    #[test]
    fn bad_credentials_map_to_auth_errors() {
        let error = auth_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(error.is_auth());
        assert!(error.to_string().contains("Invalid login credentials"));

        let error = auth_http_error(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(error, InfraError::Integration(_)));
    }
}
