//! Supabase GoTrue client used for viewer identity.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::UserId;
use crate::util::{compact_text, normalize_base_url, normalize_text_option};

/// Sessions this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;
const AUTH_PATH: &str = "/auth/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= self.expires_at
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const HIDDEN: &str = "<hidden>";
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .field("access_token", &HIDDEN)
            .field("refresh_token", &HIDDEN)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// The account exists but the e-mail address must be confirmed first.
    ConfirmationRequired,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("hosted sign-in needs both SUPABASE_URL and SUPABASE_ANON_KEY")]
    NotConfigured,
    #[error("invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed auth payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("auth service rejected the request: {0}")]
    Api(String),
    #[error("session storage failed: {0}")]
    SecureStorage(String),
}

impl From<AuthError> for crate::Error {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Http(source) => Self::Http(source),
            AuthError::Json(source) => Self::Serialization(source),
            AuthError::InvalidCredentials(message) => Self::validation(message),
            AuthError::NotConfigured | AuthError::InvalidConfiguration(_) => {
                Self::validation(error.to_string())
            }
            AuthError::Api(_) | AuthError::SecureStorage(_) => Self::backend(error.to_string()),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where a signed-in session is kept between runs.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Process-local session store; nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    slot: Arc<Mutex<Option<AuthSession>>>,
}

impl MemorySessionStore {
    fn slot(&self) -> AuthResult<MutexGuard<'_, Option<AuthSession>>> {
        self.slot
            .lock()
            .map_err(|_| AuthError::SecureStorage("in-memory session lock poisoned".into()))
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self.slot()?.clone())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        *self.slot()? = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.slot()?.take();
        Ok(())
    }
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    base: String,
    anon_key: String,
    http: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let base = normalize_auth_url(url.as_ref())?;
        let anon_key = normalize_text_option(Some(anon_key.into())).ok_or(
            AuthError::InvalidConfiguration("Supabase anon key must not be empty"),
        )?;
        Ok(Self {
            base,
            anon_key,
            http: Client::builder().build()?,
            store,
        })
    }

    /// The persisted session, refreshed when close to expiry.
    ///
    /// A session the service refuses to refresh is dropped from the store and
    /// the viewer is treated as signed out.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored) = self.store.load_session()? else {
            return Ok(None);
        };
        if !stored.is_expired() {
            return Ok(Some(stored));
        }

        match self.refresh_session(&stored.refresh_token).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(error) => {
                tracing::warn!(
                    user = %stored.user.id,
                    %error,
                    "stored session could not be refreshed"
                );
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let body = credentials_body(email, password)?;
        let reply = self.exchange("signup", None, &body).await?;
        let Some(session) = reply.into_session()? else {
            return Ok(SignUpOutcome::ConfirmationRequired);
        };
        self.store.save_session(&session)?;
        Ok(SignUpOutcome::SignedIn(session))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let body = credentials_body(email, password)?;
        let session = self
            .exchange("token", Some("password"), &body)
            .await?
            .into_session()?
            .ok_or_else(|| AuthError::Api("sign-in returned no session".into()))?;
        self.store.save_session(&session)?;
        tracing::info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration("refresh token is empty"));
        }
        let body = json!({ "refresh_token": refresh_token });
        let session = self
            .exchange("token", Some("refresh_token"), &body)
            .await?
            .into_session()?
            .ok_or_else(|| AuthError::Api("token refresh returned no session".into()))?;
        self.store.save_session(&session)?;
        tracing::debug!(user = %session.user.id, "session refreshed");
        Ok(session)
    }

    /// Revoke `access_token` and forget the stored session.
    ///
    /// A 401 means the token was already dead, which counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .http
            .post(format!("{}/logout", self.base))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            ensure_success(response).await?;
        }
        self.store.clear_session()
    }

    /// POST to an anonymous GoTrue endpoint, optionally as an OAuth grant.
    async fn exchange(
        &self,
        endpoint: &str,
        grant_type: Option<&str>,
        body: &Value,
    ) -> AuthResult<TokenReply> {
        let mut request = self
            .http
            .post(format!("{}/{endpoint}", self.base))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(body);
        if let Some(grant) = grant_type {
            request = request.query(&[("grant_type", grant)]);
        }
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

/// The GoTrue base for a project URL, accepting URLs that already end in it.
pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let base = normalize_base_url(url, "Supabase URL").map_err(|_| {
        AuthError::InvalidConfiguration("Supabase URL must be a non-empty http(s) URL")
    })?;
    if base.ends_with(AUTH_PATH) {
        Ok(base)
    } else {
        Ok(base + AUTH_PATH)
    }
}

/// Both values or neither; a half-configured backend is an error.
pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    match (normalize_text_option(url), normalize_text_option(anon_key)) {
        (Some(url), Some(key)) => Ok(Some((url, key))),
        (None, None) => Ok(None),
        _ => Err(AuthError::NotConfigured),
    }
}

fn credentials_body(email: &str, password: &str) -> AuthResult<Value> {
    let email = email.trim();
    let problem = if email.is_empty() {
        Some("Email is required")
    } else if !email.contains('@') {
        Some("Email address looks invalid")
    } else if password.trim().is_empty() {
        Some("Password is required")
    } else {
        None
    };
    match problem {
        Some(message) => Err(AuthError::InvalidCredentials(message)),
        None => Ok(json!({ "email": email, "password": password })),
    }
}

async fn ensure_success(response: Response) -> AuthResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::Api(describe_failure(status, &body)))
}

/// Token fields as GoTrue returns them, either flat or under `session`.
#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<AuthUser>,
}

impl TokenFields {
    fn or(self, other: Self) -> Self {
        Self {
            access_token: self.access_token.or(other.access_token),
            refresh_token: self.refresh_token.or(other.refresh_token),
            expires_at: self.expires_at.or(other.expires_at),
            expires_in: self.expires_in.or(other.expires_in),
            user: self.user.or(other.user),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    #[serde(flatten)]
    top: TokenFields,
    #[serde(default)]
    session: Option<TokenFields>,
}

impl TokenReply {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        let fields = self.top.or(self.session.unwrap_or_default());
        let expires_at = fields.expires_at.or_else(|| {
            fields
                .expires_in
                .map(|secs| Utc::now().timestamp().saturating_add(secs))
        });

        match (fields.access_token, fields.refresh_token, expires_at, fields.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                }))
            }
            // unconfirmed sign-up
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api("incomplete session in auth reply".into())),
        }
    }
}

/// GoTrue puts its message under one of several keys depending on the endpoint.
fn describe_failure(status: StatusCode, body: &str) -> String {
    let code = status.as_u16();
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|payload| {
        ["msg", "message", "error_description", "error"]
            .iter()
            .find_map(|key| payload.get(key)?.as_str().map(str::to_owned))
    });
    match from_json.unwrap_or_else(|| compact_text(body)) {
        text if text.trim().is_empty() => format!("HTTP {code}"),
        text => format!("{} ({code})", text.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BUYER: &str = "0190c8a2-7b1e-7c3d-9f00-2a4b6c8d0e1f";

    fn stored(expires_at: i64) -> AuthSession {
        AuthSession {
            access_token: "access-abc".to_string(),
            refresh_token: "refresh-xyz".to_string(),
            expires_at,
            user: AuthUser {
                id: BUYER.parse().unwrap(),
                email: Some("bruno@example.com".to_string()),
            },
        }
    }

    fn client(
        server: &MockServer,
        store: &MemorySessionStore,
    ) -> SupabaseAuthClient<MemorySessionStore> {
        SupabaseAuthClient::new(server.uri(), "anon", store.clone()).unwrap()
    }

    #[test]
    fn auth_url_gets_gotrue_prefix_once() {
        assert_eq!(
            normalize_auth_url(" https://bazar.supabase.co/ ").unwrap(),
            "https://bazar.supabase.co/auth/v1"
        );
        assert_eq!(
            normalize_auth_url("http://localhost:54321/auth/v1").unwrap(),
            "http://localhost:54321/auth/v1"
        );
        assert!(normalize_auth_url("bazar.supabase.co").is_err());
    }

    #[test]
    fn user_only_reply_means_confirmation_pending() {
        let reply: TokenReply =
            serde_json::from_value(json!({ "user": { "id": BUYER, "email": null } })).unwrap();
        assert_eq!(reply.into_session().unwrap(), None);
    }

    #[test]
    fn nested_session_fields_are_accepted() {
        let reply: TokenReply = serde_json::from_value(json!({
            "user": { "id": BUYER, "email": null },
            "session": { "access_token": "a", "refresh_token": "r", "expires_at": 42 }
        }))
        .unwrap();
        let session = reply.into_session().unwrap().unwrap();
        assert_eq!(session.expires_at, 42);
        assert_eq!(session.user_id().to_string(), BUYER);
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", stored(0));
        assert!(!rendered.contains("access-abc"));
        assert!(!rendered.contains("refresh-xyz"));
        assert!(rendered.contains("bruno@example.com"));
    }

    #[test]
    fn partial_hosted_config_is_rejected() {
        assert!(resolve_optional_supabase_config(None, Some("  ".into()))
            .unwrap()
            .is_none());
        assert!(matches!(
            resolve_optional_supabase_config(None, Some("anon".into())),
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn bad_credentials_map_to_validation() {
        let error: crate::Error = credentials_body("bruno", "pw").unwrap_err().into();
        assert_eq!(error.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn failure_text_prefers_gotrue_message() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            describe_failure(StatusCode::BAD_REQUEST, body),
            "Invalid login credentials (400)"
        );
        assert_eq!(describe_failure(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[tokio::test]
    async fn sign_in_stores_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .and(body_json(json!({ "email": "bruno@example.com", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "user": { "id": BUYER, "email": "bruno@example.com" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemorySessionStore::default();
        let session = client(&server, &store)
            .sign_in(" bruno@example.com ", "pw")
            .await
            .unwrap();

        assert!(!session.is_expired());
        assert_eq!(store.load_session().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn unrefreshable_session_is_forgotten() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Refresh Token Not Found"
            })))
            .mount(&server)
            .await;

        let store = MemorySessionStore::default();
        store.save_session(&stored(0)).unwrap();

        assert_eq!(client(&server, &store).restore_session().await.unwrap(), None);
        assert_eq!(store.load_session().unwrap(), None);
    }

    #[tokio::test]
    async fn live_session_is_restored_without_network() {
        let server = MockServer::start().await;
        let store = MemorySessionStore::default();
        store.save_session(&stored(i64::MAX / 2)).unwrap();

        let restored = client(&server, &store).restore_session().await.unwrap();
        assert_eq!(restored, Some(stored(i64::MAX / 2)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sign_out_accepts_an_already_revoked_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = MemorySessionStore::default();
        store.save_session(&stored(i64::MAX / 2)).unwrap();
        client(&server, &store).sign_out("stale").await.unwrap();
        assert_eq!(store.load_session().unwrap(), None);
    }
}
