use crate::domain::models::{DailyEvent, OAuthToken, Task};
use crate::infrastructure::auth_client::AuthSession;
use crate::infrastructure::config::{google_oauth_from_credentials, GoogleOAuthSecrets};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{
    decode_upcoming_event, encode_daily_event, encode_task_event, GoogleCalendarEvent,
    UpcomingEvent,
};
use crate::infrastructure::functions_client::CredentialsSource;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, PRIMARY_CALENDAR_ID};
use crate::infrastructure::oauth_client::{authorization_url, OAuthHttpClient, OAuthTokenResponse};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalendarAvailability {
    /// No calendar credentials are configured; the UI shows setup steps.
    SetupRequired,
    Ready { connected: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct CalendarService {
    env_secrets: Option<GoogleOAuthSecrets>,
    credentials_source: Option<Arc<dyn CredentialsSource>>,
    credential_store: Arc<dyn CredentialStore>,
    oauth_client: Arc<dyn OAuthHttpClient>,
    calendar_client: Arc<dyn GoogleCalendarClient>,
    timezone: Tz,
    // Per-user; only connect/disconnect change it, API failures leave it stale.
    connected: Mutex<HashMap<String, bool>>,
    now_provider: NowProvider,
}

impl CalendarService {
    pub fn new(
        env_secrets: Option<GoogleOAuthSecrets>,
        credentials_source: Option<Arc<dyn CredentialsSource>>,
        credential_store: Arc<dyn CredentialStore>,
        oauth_client: Arc<dyn OAuthHttpClient>,
        calendar_client: Arc<dyn GoogleCalendarClient>,
        timezone: Tz,
    ) -> Self {
        Self {
            env_secrets,
            credentials_source,
            credential_store,
            oauth_client,
            calendar_client,
            timezone,
            connected: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    async fn resolve_secrets(&self, session: &AuthSession) -> Result<Option<GoogleOAuthSecrets>, InfraError> {
        if let Some(secrets) = self.env_secrets.as_ref() {
            return Ok(Some(secrets.clone()));
        }
        let Some(source) = self.credentials_source.as_ref() else {
            return Ok(None);
        };
        let credentials = source.google_credentials(&session.access_token).await?;
        Ok(credentials.and_then(|credentials| {
            credentials
                .client_secret
                .as_deref()
                .map(|secret| google_oauth_from_credentials(&credentials.client_id, secret))
        }))
    }

    async fn required_secrets(&self, session: &AuthSession) -> Result<GoogleOAuthSecrets, InfraError> {
        self.resolve_secrets(session).await?.ok_or_else(|| {
            InfraError::InvalidConfig("calendar credentials are not configured".to_string())
        })
    }

    fn lock_connected(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, bool>>, InfraError> {
        self.connected
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("calendar state: {error}")))
    }

    fn set_connected(&self, user_id: &str, connected: bool) -> Result<(), InfraError> {
        self.lock_connected()?.insert(user_id.to_string(), connected);
        Ok(())
    }

    pub async fn availability(&self, session: &AuthSession) -> Result<CalendarAvailability, InfraError> {
        if self.resolve_secrets(session).await?.is_none() {
            return Ok(CalendarAvailability::SetupRequired);
        }

        let user_id = session.user.id.as_str();
        if let Some(connected) = self.lock_connected()?.get(user_id).copied() {
            return Ok(CalendarAvailability::Ready { connected });
        }
        let connected = self.credential_store.load_token(user_id)?.is_some();
        self.set_connected(user_id, connected)?;
        Ok(CalendarAvailability::Ready { connected })
    }

    pub async fn authorization_url(&self, session: &AuthSession) -> Result<String, InfraError> {
        let secrets = self.required_secrets(session).await?;
        if secrets.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }
        authorization_url(&secrets, &session.user.id)
    }

    pub async fn connect(&self, session: &AuthSession, authorization_code: &str) -> Result<OAuthToken, InfraError> {
        let authorization_code = authorization_code.trim();
        if authorization_code.is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }
        let secrets = self.required_secrets(session).await?;

        let response = self
            .oauth_client
            .exchange_authorization_code(&secrets, authorization_code)
            .await?;
        let token = self.token_from_response(response, None);
        self.credential_store.save_token(&session.user.id, &token)?;
        self.set_connected(&session.user.id, true)?;
        tracing::info!(user_id = %session.user.id, "calendar connected");
        Ok(token)
    }

    pub async fn disconnect(&self, session: &AuthSession) -> Result<(), InfraError> {
        let user_id = session.user.id.as_str();
        if let Some(token) = self.credential_store.load_token(user_id)? {
            let revocable = token.refresh_token.as_deref().unwrap_or(&token.access_token);
            if let Err(error) = self.oauth_client.revoke_token(revocable).await {
                tracing::warn!(%error, "calendar token revoke failed");
            }
        }
        self.credential_store.delete_token(user_id)?;
        self.set_connected(user_id, false)?;
        tracing::info!(user_id = %user_id, "calendar disconnected");
        Ok(())
    }

    pub async fn ensure_access_token(&self, session: &AuthSession) -> Result<EnsureTokenResult, InfraError> {
        let user_id = session.user.id.as_str();
        let Some(stored_token) = self.credential_store.load_token(user_id)? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };
        if stored_token.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS) {
            return Ok(EnsureTokenResult::Existing(stored_token));
        }
        let Some(refresh_token) = stored_token.refresh_token.clone() else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        let secrets = self.required_secrets(session).await?;
        match self.oauth_client.refresh_access_token(&secrets, &refresh_token).await {
            Ok(response) => {
                let token = self.token_from_response(response, Some(refresh_token));
                self.credential_store.save_token(user_id, &token)?;
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(message)) => {
                tracing::warn!(%message, "calendar token refresh rejected");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    async fn required_access_token(&self, session: &AuthSession) -> Result<String, InfraError> {
        match self.ensure_access_token(session).await? {
            EnsureTokenResult::Existing(token) | EnsureTokenResult::Refreshed(token) => Ok(token.access_token),
            EnsureTokenResult::ReauthenticationRequired => Err(InfraError::OAuth(
                "calendar authorization required, reconnect the calendar".to_string(),
            )),
        }
    }

    pub async fn create_event(
        &self,
        session: &AuthSession,
        event: &GoogleCalendarEvent,
    ) -> Result<GoogleCalendarEvent, InfraError> {
        let access_token = self.required_access_token(session).await?;
        self.calendar_client
            .create_event(&access_token, PRIMARY_CALENDAR_ID, event)
            .await
    }

    pub async fn list_upcoming_events(
        &self,
        session: &AuthSession,
        limit: u32,
    ) -> Result<Vec<UpcomingEvent>, InfraError> {
        let access_token = self.required_access_token(session).await?;
        let events = self
            .calendar_client
            .list_upcoming_events(&access_token, PRIMARY_CALENDAR_ID, (self.now_provider)(), limit)
            .await?;
        Ok(events.iter().filter_map(decode_upcoming_event).collect())
    }

    /// Returns the created event id; `None` for tasks without a due date.
    pub async fn push_task(&self, session: &AuthSession, task: &Task) -> Result<Option<String>, InfraError> {
        let Some(event) = encode_task_event(task)? else {
            return Ok(None);
        };
        let created = self.create_event(session, &event).await?;
        Ok(created.id)
    }

    pub async fn push_daily_event(
        &self,
        session: &AuthSession,
        event: &DailyEvent,
    ) -> Result<Option<String>, InfraError> {
        let encoded = encode_daily_event(event, self.timezone)?;
        let created = self.create_event(session, &encoded).await?;
        Ok(created.id)
    }

    fn token_from_response(&self, response: OAuthTokenResponse, fallback_refresh_token: Option<String>) -> OAuthToken {
        let expires_at = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::session::tests::session_for;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::functions_client::GoogleCredentials;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    pub(crate) enum FakeResponse {
        Success(OAuthTokenResponse),
        OAuthError(String),
    }

    impl Default for FakeResponse {
        fn default() -> Self {
            Self::Success(OAuthTokenResponse {
                access_token: "fake_access".to_string(),
                refresh_token: Some("fake_refresh".to_string()),
                expires_in: 3600,
                token_type: Some("Bearer".to_string()),
                scope: Some("calendar.events".to_string()),
            })
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeOAuthHttpClient {
        pub refresh_response: Mutex<FakeResponse>,
        pub exchange_calls: AtomicUsize,
        pub refresh_calls: AtomicUsize,
        pub revoke_calls: AtomicUsize,
    }

    impl FakeResponse {
        fn into_result(self) -> Result<OAuthTokenResponse, InfraError> {
            match self {
                Self::Success(value) => Ok(value),
                Self::OAuthError(message) => Err(InfraError::OAuth(message)),
            }
        }
    }

    #[async_trait]
    impl OAuthHttpClient for FakeOAuthHttpClient {
        async fn exchange_authorization_code(
            &self,
            _secrets: &GoogleOAuthSecrets,
            _authorization_code: &str,
        ) -> Result<OAuthTokenResponse, InfraError> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            FakeResponse::default().into_result()
        }

        async fn refresh_access_token(
            &self,
            _secrets: &GoogleOAuthSecrets,
            _refresh_token: &str,
        ) -> Result<OAuthTokenResponse, InfraError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_response
                .lock()
                .expect("refresh mutex poisoned")
                .clone()
                .into_result()
        }

        async fn revoke_token(&self, _token: &str) -> Result<(), InfraError> {
            self.revoke_calls.fetch_add(1, Ordering::SeqCst);
            Err(InfraError::OAuth("revoke unavailable".to_string()))
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeCalendarClient {
        pub fail: bool,
        pub created: Mutex<Vec<GoogleCalendarEvent>>,
        pub list_limits: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl GoogleCalendarClient for FakeCalendarClient {
        async fn create_event(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            event: &GoogleCalendarEvent,
        ) -> Result<GoogleCalendarEvent, InfraError> {
            if self.fail {
                return Err(InfraError::OAuth("google calendar api error: http 503".to_string()));
            }
            let mut created = self.created.lock().expect("created lock");
            let mut echoed = event.clone();
            echoed.id = Some(format!("gcal-{}", created.len() + 1));
            created.push(echoed.clone());
            Ok(echoed)
        }

        async fn list_upcoming_events(
            &self,
            _access_token: &str,
            _calendar_id: &str,
            _time_min: DateTime<Utc>,
            limit: u32,
        ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
            if self.fail {
                return Err(InfraError::OAuth("google calendar api error: http 503".to_string()));
            }
            self.list_limits.lock().expect("limits lock").push(limit);
            Ok(self.created.lock().expect("created lock").clone())
        }
    }

    struct FakeCredentialsSource {
        credentials: Option<GoogleCredentials>,
    }

    #[async_trait]
    impl CredentialsSource for FakeCredentialsSource {
        async fn google_credentials(&self, _access_token: &str) -> Result<Option<GoogleCredentials>, InfraError> {
            Ok(self.credentials.clone())
        }
    }

    pub(crate) fn test_secrets() -> GoogleOAuthSecrets {
        GoogleOAuthSecrets {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost/oauth2/callback".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar.events".to_string()],
        }
    }

    pub(crate) fn service(
        store: Arc<InMemoryCredentialStore>,
        oauth: Arc<FakeOAuthHttpClient>,
        calendar: Arc<FakeCalendarClient>,
    ) -> CalendarService {
        CalendarService::new(
            Some(test_secrets()),
            None,
            store,
            oauth,
            calendar,
            chrono_tz::UTC,
        )
    }

    fn signed_in() -> AuthSession {
        session_for("ada", Utc::now() + Duration::hours(1))
    }

    fn token_pattern() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._\\-]{1,64}".prop_map(|value| value.to_string())
    }

    proptest! {
        #[test]
        fn valid_token_is_used_without_refresh(
            access_token in token_pattern(),
            refresh_token in prop::option::of(token_pattern()),
            expires_in_seconds in 120i64..604800i64,
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let store = Arc::new(InMemoryCredentialStore::default());
                let token = OAuthToken {
                    access_token,
                    refresh_token,
                    expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
                    token_type: "Bearer".to_string(),
                    scope: None,
                };
                store.save_token("ada", &token).expect("save token");

                let oauth = Arc::new(FakeOAuthHttpClient::default());
                let calendar = service(store, oauth.clone(), Arc::new(FakeCalendarClient::default()));
                let result = calendar.ensure_access_token(&signed_in()).await.expect("ensure token");

                assert_eq!(result, EnsureTokenResult::Existing(token));
                assert_eq!(oauth.refresh_calls.load(Ordering::SeqCst), 0);
            });
        }
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_keeps_refresh_token() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token(
                "ada",
                &OAuthToken {
                    access_token: "expired".to_string(),
                    refresh_token: Some("refresh-token".to_string()),
                    expires_at: Utc::now() - Duration::seconds(120),
                    token_type: "Bearer".to_string(),
                    scope: None,
                },
            )
            .expect("save token");
        let oauth = Arc::new(FakeOAuthHttpClient::default());
        *oauth.refresh_response.lock().expect("lock") = FakeResponse::Success(OAuthTokenResponse {
            access_token: "new-access".to_string(),
            refresh_token: None,
            expires_in: 3600,
            token_type: None,
            scope: None,
        });

        let calendar = service(store.clone(), oauth, Arc::new(FakeCalendarClient::default()));
        let EnsureTokenResult::Refreshed(token) =
            calendar.ensure_access_token(&signed_in()).await.expect("ensure")
        else {
            panic!("expected refreshed token");
        };
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-token"));
        assert_eq!(store.load_token("ada").expect("load"), Some(token));
    }

    #[tokio::test]
    async fn rejected_refresh_requires_reauthentication() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token(
                "ada",
                &OAuthToken {
                    access_token: "expired".to_string(),
                    refresh_token: Some("revoked".to_string()),
                    expires_at: Utc::now() - Duration::seconds(5),
                    token_type: "Bearer".to_string(),
                    scope: None,
                },
            )
            .expect("save token");
        let oauth = Arc::new(FakeOAuthHttpClient::default());
        *oauth.refresh_response.lock().expect("lock") = FakeResponse::OAuthError("invalid_grant".to_string());

        let calendar = service(store, oauth, Arc::new(FakeCalendarClient::default()));
        assert_eq!(
            calendar.ensure_access_token(&signed_in()).await.expect("ensure"),
            EnsureTokenResult::ReauthenticationRequired
        );
        assert!(calendar.list_upcoming_events(&signed_in(), 5).await.is_err());
    }

    #[tokio::test]
    async fn missing_credentials_require_setup() {
        let calendar = CalendarService::new(
            None,
            Some(Arc::new(FakeCredentialsSource { credentials: None })),
            Arc::new(InMemoryCredentialStore::default()),
            Arc::new(FakeOAuthHttpClient::default()),
            Arc::new(FakeCalendarClient::default()),
            chrono_tz::UTC,
        );
        assert_eq!(
            calendar.availability(&signed_in()).await.expect("availability"),
            CalendarAvailability::SetupRequired
        );
        assert!(matches!(
            calendar.authorization_url(&signed_in()).await,
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn credentials_endpoint_enables_calendar() {
        let calendar = CalendarService::new(
            None,
            Some(Arc::new(FakeCredentialsSource {
                credentials: Some(GoogleCredentials {
                    client_id: "served-id".to_string(),
                    client_secret: Some("served-secret".to_string()),
                    api_key: None,
                }),
            })),
            Arc::new(InMemoryCredentialStore::default()),
            Arc::new(FakeOAuthHttpClient::default()),
            Arc::new(FakeCalendarClient::default()),
            chrono_tz::UTC,
        );
        assert_eq!(
            calendar.availability(&signed_in()).await.expect("availability"),
            CalendarAvailability::Ready { connected: false }
        );
        let url = calendar.authorization_url(&signed_in()).await.expect("url");
        assert!(url.contains("client_id=served-id"));
    }

    #[tokio::test]
    async fn connected_flag_changes_only_on_connect_and_disconnect() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let oauth = Arc::new(FakeOAuthHttpClient::default());
        let failing = Arc::new(FakeCalendarClient {
            fail: true,
            ..FakeCalendarClient::default()
        });
        let calendar = service(store.clone(), oauth.clone(), failing);
        let session = signed_in();

        calendar.connect(&session, "auth-code").await.expect("connect");
        assert_eq!(
            calendar.availability(&session).await.expect("availability"),
            CalendarAvailability::Ready { connected: true }
        );

        assert!(calendar.list_upcoming_events(&session, 10).await.is_err());
        assert_eq!(
            calendar.availability(&session).await.expect("availability"),
            CalendarAvailability::Ready { connected: true }
        );

        calendar.disconnect(&session).await.expect("disconnect despite revoke failure");
        assert_eq!(oauth.revoke_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load_token("ada").expect("load"), None);
        assert_eq!(
            calendar.availability(&session).await.expect("availability"),
            CalendarAvailability::Ready { connected: false }
        );
    }

    #[tokio::test]
    async fn pushes_and_lists_events() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let fake_calendar = Arc::new(FakeCalendarClient::default());
        let calendar = service(store, Arc::new(FakeOAuthHttpClient::default()), fake_calendar.clone());
        let session = signed_in();
        calendar.connect(&session, "auth-code").await.expect("connect");

        let event = DailyEvent {
            id: "evt-1".to_string(),
            user_id: "ada".to_string(),
            title: "Dentist".to_string(),
            description: None,
            start_time: "15:00".to_string(),
            duration_minutes: 30,
            location: Some("Main St".to_string()),
            event_type: crate::domain::models::EventType::Personal,
            date: "2026-03-10".to_string(),
            calendar_event_id: None,
            status: crate::domain::models::EventStatus::Todo,
            created_at: Utc::now(),
        };
        let id = calendar.push_daily_event(&session, &event).await.expect("push");
        assert_eq!(id.as_deref(), Some("gcal-1"));

        let upcoming = calendar.list_upcoming_events(&session, 7).await.expect("list");
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].summary, "Dentist");
        assert_eq!(fake_calendar.list_limits.lock().expect("limits").as_slice(), &[7]);
    }
}
