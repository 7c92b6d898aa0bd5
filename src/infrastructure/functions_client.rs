use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const GENERATE_MESSAGE_FUNCTION: &str = "generate-message";
const TASK_ASSIGNMENT_FUNCTION: &str = "send-task-notification";
const TASK_REMINDER_FUNCTION: &str = "send-task-reminder";
const GOOGLE_CREDENTIALS_FUNCTION: &str = "get-google-credentials";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SweetMessage,
    MoodSuggestion,
    ReminderSuggestion,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_mood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,
}

impl MessageContext {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignmentEmail {
    pub task_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    pub assigned_to_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    pub assigned_by_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskReminderEmail {
    pub task_id: String,
    pub user_id: String,
    pub task_title: String,
    pub due_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_email: Option<String>,
    pub days_until_due: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(
        &self,
        access_token: &str,
        kind: MessageKind,
        context: &MessageContext,
    ) -> Result<String, InfraError>;
}

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send_task_assignment(
        &self,
        access_token: &str,
        email: &TaskAssignmentEmail,
    ) -> Result<(), InfraError>;

    async fn send_task_reminder(
        &self,
        access_token: &str,
        email: &TaskReminderEmail,
    ) -> Result<(), InfraError>;
}

#[async_trait]
pub trait CredentialsSource: Send + Sync {
    /// `None` when the deployment has no calendar credentials configured.
    async fn google_credentials(&self, access_token: &str) -> Result<Option<GoogleCredentials>, InfraError>;
}

/// Serverless functions under `<functionsBaseUrl>/<name>`.
#[derive(Debug, Clone)]
pub struct ReqwestFunctionsClient {
    client: Client,
    base_url: Url,
    anon_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsResponse {
    client_id: Option<String>,
    client_secret: Option<String>,
    api_key: Option<String>,
}

impl ReqwestFunctionsClient {
    pub fn new(base_url: &str, anon_key: Option<String>) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid functionsBaseUrl '{base_url}': {error}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            anon_key,
        })
    }

    fn function_url(&self, name: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("functionsBaseUrl cannot be a base".to_string()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn invoke<T>(&self, name: &str, access_token: &str, payload: &T) -> Result<String, InfraError>
    where
        T: Serialize + Sync,
    {
        if access_token.trim().is_empty() {
            return Err(InfraError::Auth(format!("{name} requires a signed-in user")));
        }

        let mut request = self
            .client
            .post(self.function_url(name)?)
            .bearer_auth(access_token)
            .json(payload);
        if let Some(anon_key) = self.anon_key.as_deref() {
            request = request.header("apikey", anon_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Integration(format!("{name} request failed: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Integration(format!("failed reading {name} response: {error}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(InfraError::Auth(format!("{name} rejected the session")));
        }
        if !status.is_success() {
            return Err(InfraError::Integration(format!(
                "{name} failed: http {}; body={body}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}

fn parse_message_response(body: &str) -> Result<String, InfraError> {
    let parsed: MessageResponse = serde_json::from_str(body)
        .map_err(|error| InfraError::Integration(format!("invalid generate-message payload: {error}")))?;
    if let Some(error) = parsed.error {
        return Err(InfraError::Integration(format!("generate-message failed: {error}")));
    }
    parsed
        .message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .ok_or_else(|| InfraError::Integration("generate-message returned no message".to_string()))
}

fn parse_credentials_response(body: &str) -> Result<Option<GoogleCredentials>, InfraError> {
    let parsed: CredentialsResponse = serde_json::from_str(body)
        .map_err(|error| InfraError::Integration(format!("invalid credentials payload: {error}")))?;
    let non_empty = |value: Option<String>| value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

    Ok(non_empty(parsed.client_id).map(|client_id| GoogleCredentials {
        client_id,
        client_secret: non_empty(parsed.client_secret),
        api_key: non_empty(parsed.api_key),
    }))
}

#[async_trait]
impl MessageGenerator for ReqwestFunctionsClient {
    async fn generate(
        &self,
        access_token: &str,
        kind: MessageKind,
        context: &MessageContext,
    ) -> Result<String, InfraError> {
        let payload = if context.is_empty() {
            serde_json::json!({ "type": kind })
        } else {
            serde_json::json!({ "type": kind, "context": context })
        };
        let body = self
            .invoke(GENERATE_MESSAGE_FUNCTION, access_token, &payload)
            .await?;
        parse_message_response(&body)
    }
}

#[async_trait]
impl EmailNotifier for ReqwestFunctionsClient {
    async fn send_task_assignment(
        &self,
        access_token: &str,
        email: &TaskAssignmentEmail,
    ) -> Result<(), InfraError> {
        self.invoke(TASK_ASSIGNMENT_FUNCTION, access_token, email)
            .await
            .map(|_| ())
    }

    async fn send_task_reminder(
        &self,
        access_token: &str,
        email: &TaskReminderEmail,
    ) -> Result<(), InfraError> {
        self.invoke(TASK_REMINDER_FUNCTION, access_token, email)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CredentialsSource for ReqwestFunctionsClient {
    async fn google_credentials(&self, access_token: &str) -> Result<Option<GoogleCredentials>, InfraError> {
        match self
            .invoke(GOOGLE_CREDENTIALS_FUNCTION, access_token, &serde_json::json!({}))
            .await
        {
            Ok(body) => parse_credentials_response(&body),
            // Functions answer 404/500 when the secrets were never set.
            Err(InfraError::Integration(message)) => {
                tracing::warn!(%message, "google credentials endpoint unavailable");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
