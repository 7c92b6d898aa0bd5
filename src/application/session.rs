use crate::infrastructure::auth_client::{
    AuthProvider, AuthSession, AuthUser, SignOutScope, SignUpOutcome,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_storage::SessionStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const SESSION_KEY_SUFFIX: &str = "auth-token";

/// Owns the signed-in session. Data commands resolve the owning user here.
pub struct SessionManager {
    provider: Option<Arc<dyn AuthProvider>>,
    storage: Arc<dyn SessionStorage>,
    key_prefix: String,
}

impl SessionManager {
    pub fn new(
        provider: Option<Arc<dyn AuthProvider>>,
        storage: Arc<dyn SessionStorage>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            storage,
            key_prefix: key_prefix.into(),
        }
    }

    fn session_key(&self) -> String {
        format!("{}{SESSION_KEY_SUFFIX}", self.key_prefix)
    }

    fn provider(&self) -> Result<&Arc<dyn AuthProvider>, InfraError> {
        self.provider
            .as_ref()
            .ok_or_else(|| InfraError::InvalidConfig("authBaseUrl is not configured".to_string()))
    }

    pub fn current_session(&self) -> Result<Option<AuthSession>, InfraError> {
        let Some(raw) = self.storage.get(&self.session_key())? else {
            return Ok(None);
        };
        match serde_json::from_str::<AuthSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable stored session");
                self.storage.remove(&self.session_key())?;
                Ok(None)
            }
        }
    }

    pub fn current_user(&self) -> Result<Option<AuthUser>, InfraError> {
        Ok(self.current_session()?.map(|session| session.user))
    }

    /// The live session, or an auth error asking the user to sign in again.
    pub fn require_session(&self, now: DateTime<Utc>) -> Result<AuthSession, InfraError> {
        let session = self
            .current_session()?
            .ok_or_else(|| InfraError::Auth("not signed in".to_string()))?;
        if session.is_expired_at(now) {
            return Err(InfraError::Auth(
                "session expired, sign in again".to_string(),
            ));
        }
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, InfraError> {
        let email = validate_credentials(email, password)?;
        let session = self.provider()?.sign_in(email, password).await?;
        self.store(&session)?;
        tracing::info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignUpOutcome, InfraError> {
        let email = validate_credentials(email, password)?;
        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());
        let outcome = self.provider()?.sign_up(email, password, display_name).await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.store(session)?;
            tracing::info!(user_id = %session.user.id, "signed up");
        }
        Ok(outcome)
    }

    /// Revokes every session of the user (best-effort) and clears all storage
    /// keys carrying the provider prefix.
    pub async fn sign_out(&self) -> Result<(), InfraError> {
        if let (Some(session), Some(provider)) = (self.current_session()?, self.provider.as_ref()) {
            if let Err(error) = provider
                .sign_out(&session.access_token, SignOutScope::Global)
                .await
            {
                tracing::warn!(%error, "remote sign-out failed, clearing local session anyway");
            }
        }

        for key in self.storage.keys()? {
            if key.starts_with(&self.key_prefix) {
                self.storage.remove(&key)?;
            }
        }
        tracing::info!("signed out");
        Ok(())
    }

    fn store(&self, session: &AuthSession) -> Result<(), InfraError> {
        let payload = serde_json::to_string(session)?;
        self.storage.set(&self.session_key(), &payload)
    }
}

fn validate_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str, InfraError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(InfraError::Validation("email must be an email address".to_string()));
    }
    if password.is_empty() {
        return Err(InfraError::Validation("password must not be empty".to_string()));
    }
    Ok(email)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::session_storage::InMemorySessionStorage;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) fn session_for(user_id: &str, expires_at: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: format!("token-{user_id}"),
            refresh_token: None,
            expires_at,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
                display_name: None,
            },
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeAuthProvider {
        pub fail_sign_out: bool,
        pub reject_password: bool,
        pub sign_out_scopes: Mutex<Vec<SignOutScope>>,
        pub sign_in_calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for FakeAuthProvider {
        async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthSession, InfraError> {
            self.sign_in_calls.fetch_add(1, Ordering::Relaxed);
            if self.reject_password {
                return Err(InfraError::Auth("Invalid login credentials".to_string()));
            }
            let user_id = email.split('@').next().unwrap_or("user");
            Ok(session_for(user_id, Utc::now() + Duration::hours(1)))
        }

        async fn sign_up(
            &self,
            email: &str,
            _password: &str,
            _display_name: Option<&str>,
        ) -> Result<SignUpOutcome, InfraError> {
            Ok(SignUpOutcome::ConfirmationRequired {
                email: email.to_string(),
            })
        }

        async fn sign_out(&self, _access_token: &str, scope: SignOutScope) -> Result<(), InfraError> {
            self.sign_out_scopes
                .lock()
                .expect("scopes lock")
                .push(scope);
            if self.fail_sign_out {
                return Err(InfraError::Integration("offline".to_string()));
            }
            Ok(())
        }
    }

    fn manager(provider: Arc<FakeAuthProvider>) -> (SessionManager, Arc<InMemorySessionStorage>) {
        let storage = Arc::new(InMemorySessionStorage::default());
        let manager = SessionManager::new(Some(provider as Arc<dyn AuthProvider>), storage.clone(), "sb-");
        (manager, storage)
    }

    #[tokio::test]
    async fn sign_in_stores_session_under_prefixed_key() {
        let provider = Arc::new(FakeAuthProvider::default());
        let (manager, storage) = manager(provider);

        let session = manager.sign_in(" ada@example.com ", "pw").await.expect("sign in");
        assert_eq!(session.user.id, "ada");
        assert!(storage.get("sb-auth-token").expect("get").is_some());
        assert_eq!(
            manager.current_user().expect("user").map(|user| user.id),
            Some("ada".to_string())
        );
    }

    #[tokio::test]
    async fn sign_in_errors_leave_no_session() {
        let provider = Arc::new(FakeAuthProvider {
            reject_password: true,
            ..FakeAuthProvider::default()
        });
        let (manager, _storage) = manager(provider.clone());

        let error = manager.sign_in("ada@example.com", "bad").await.expect_err("rejected");
        assert!(error.is_auth());
        assert!(manager.current_session().expect("session").is_none());

        assert!(manager.sign_in("not-an-email", "pw").await.is_err());
        assert_eq!(provider.sign_in_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn sign_out_clears_prefixed_keys_even_when_remote_fails() {
        let provider = Arc::new(FakeAuthProvider {
            fail_sign_out: true,
            ..FakeAuthProvider::default()
        });
        let (manager, storage) = manager(provider.clone());
        manager.sign_in("ada@example.com", "pw").await.expect("sign in");
        storage.set("sb-code-verifier", "xyz").expect("set");
        storage.set("theme", "dark").expect("set");

        manager.sign_out().await.expect("sign out");

        assert_eq!(storage.keys().expect("keys"), vec!["theme".to_string()]);
        assert_eq!(
            provider.sign_out_scopes.lock().expect("scopes").as_slice(),
            &[SignOutScope::Global]
        );
    }

    #[test]
    fn require_session_rejects_missing_and_expired_sessions() {
        let storage = Arc::new(InMemorySessionStorage::default());
        let manager = SessionManager::new(None, storage.clone(), "sb-");
        assert!(manager.require_session(Utc::now()).expect_err("missing").is_auth());

        let expired = session_for("ada", Utc::now() - Duration::minutes(1));
        storage
            .set("sb-auth-token", &serde_json::to_string(&expired).expect("json"))
            .expect("set");
        assert!(manager.require_session(Utc::now()).expect_err("expired").is_auth());
    }

    #[tokio::test]
    async fn sign_in_without_provider_reports_missing_config() {
        let manager = SessionManager::new(None, Arc::new(InMemorySessionStorage::default()), "sb-");
        let error = manager.sign_in("ada@example.com", "pw").await.expect_err("no provider");
        assert!(matches!(error, InfraError::InvalidConfig(_)));
    }
}
