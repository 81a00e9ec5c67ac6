//! Hosted sign-in with sessions kept in the OS keychain, one per profile.

use bazar_core::auth::{AuthResult, SessionPersistence, SignUpOutcome, SupabaseAuthClient};
pub use bazar_core::auth::{AuthError, AuthSession};
use bazar_core::config::SupabaseEndpoint;

/// Keychain account holding the serialized session of one profile.
#[derive(Clone)]
pub struct SessionStore {
    account: String,
}

impl SessionStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            account: format!("{profile_name}.session"),
        }
    }
}

fn storage_error(error: impl std::fmt::Display) -> AuthError {
    AuthError::SecureStorage(error.to_string())
}

#[cfg(not(test))]
mod secret {
    use keyring::{Entry, Error as KeyringError};

    use super::{storage_error, AuthResult};

    const SERVICE: &str = "bazar-cli";

    fn entry(account: &str) -> AuthResult<Entry> {
        Entry::new(SERVICE, account).map_err(storage_error)
    }

    pub fn read(account: &str) -> AuthResult<Option<String>> {
        match entry(account)?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(error) => Err(storage_error(error)),
        }
    }

    pub fn write(account: &str, raw: &str) -> AuthResult<()> {
        entry(account)?.set_password(raw).map_err(storage_error)
    }

    pub fn erase(account: &str) -> AuthResult<()> {
        match entry(account)?.delete_credential() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(error) => Err(storage_error(error)),
        }
    }
}


impl SessionPersistence for SessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(raw) = secret::read(&self.account)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        secret::write(&self.account, &serde_json::to_string(session)?)
    }

    fn clear_session(&self) -> AuthResult<()> {
        secret::erase(&self.account)
    }
}

/// GoTrue client bound to one profile's keychain slot.
#[derive(Clone)]
pub struct SupabaseAuthService {
    client: SupabaseAuthClient<SessionStore>,
}

impl SupabaseAuthService {
    pub fn new(profile_name: &str, endpoint: &SupabaseEndpoint) -> AuthResult<Self> {
        let store = SessionStore::new(profile_name);
        let client = SupabaseAuthClient::new(&endpoint.url, endpoint.anon_key.as_str(), store)?;
        Ok(Self { client })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.client.sign_in(email, password).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        self.client.sign_up(email, password).await
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        self.client.restore_session().await
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        self.client.sign_out(access_token).await
    }
}

pub fn load_stored_session(profile_name: &str) -> AuthResult<Option<AuthSession>> {
    SessionStore::new(profile_name).load_session()
}

pub fn clear_stored_session(profile_name: &str) -> AuthResult<()> {
    SessionStore::new(profile_name).clear_session()
}
