use bazar_core::auth::SignUpOutcome;
use bazar_core::config::SupabaseEndpoint;

use crate::auth::{clear_stored_session, load_stored_session, AuthSession, SupabaseAuthService};
use crate::cli::{AuthCommands, Credentials};
use crate::commands::common::resolve_client_config;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

fn auth_error(error: impl ToString) -> CliError {
    CliError::Auth(error.to_string())
}

/// Resolved profile name plus its hosted endpoint, if one is configured.
struct AuthTarget {
    profile: String,
    endpoint: Option<SupabaseEndpoint>,
}

impl AuthTarget {
    fn resolve(explicit_profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile = config.resolve_profile_name(explicit_profile);
        let endpoint = resolve_client_config(&config, &profile).supabase()?;
        Ok(Self { profile, endpoint })
    }

    fn service(&self) -> Result<Option<SupabaseAuthService>, CliError> {
        self.endpoint
            .as_ref()
            .map(|endpoint| SupabaseAuthService::new(&self.profile, endpoint).map_err(auth_error))
            .transpose()
    }

    fn require_service(&self) -> Result<SupabaseAuthService, CliError> {
        self.service()?.ok_or(CliError::HostedNotConfigured)
    }
}

fn describe_user(session: &AuthSession) -> &str {
    session.user.email.as_deref().unwrap_or("(no email)")
}

pub async fn run_auth(command: AuthCommands, profile: Option<&str>) -> Result<(), CliError> {
    let target = AuthTarget::resolve(profile)?;
    match command {
        AuthCommands::Login(credentials) => login(&target, &credentials).await,
        AuthCommands::Signup(credentials) => signup(&target, &credentials).await,
        AuthCommands::Status => status(&target).await,
        AuthCommands::Logout => logout(&target).await,
    }
}

async fn login(target: &AuthTarget, credentials: &Credentials) -> Result<(), CliError> {
    let session = target
        .require_service()?
        .sign_in(&credentials.email, &credentials.password)
        .await
        .map_err(auth_error)?;
    println!("{}: signed in as {}", target.profile, describe_user(&session));
    Ok(())
}

async fn signup(target: &AuthTarget, credentials: &Credentials) -> Result<(), CliError> {
    let outcome = target
        .require_service()?
        .sign_up(&credentials.email, &credentials.password)
        .await
        .map_err(auth_error)?;
    match outcome {
        SignUpOutcome::SignedIn(session) => {
            println!("{}: account created, signed in as {}", target.profile, describe_user(&session));
        }
        SignUpOutcome::ConfirmationRequired => {
            println!("Account created. Confirm your e-mail address, then run `bazar auth login`.");
        }
    }
    Ok(())
}

/// Offline profiles only report what the keychain holds.
async fn status(target: &AuthTarget) -> Result<(), CliError> {
    let session = match target.service()? {
        Some(service) => service.restore_session().await.map_err(auth_error)?,
        None => load_stored_session(&target.profile).map_err(auth_error)?,
    };
    match session {
        Some(session) => println!(
            "{}: signed in as {} (user {}, token expires at {})",
            target.profile,
            describe_user(&session),
            session.user_id(),
            session.expires_at
        ),
        None => println!("{}: not signed in", target.profile),
    }
    Ok(())
}

async fn logout(target: &AuthTarget) -> Result<(), CliError> {
    let stored = load_stored_session(&target.profile).map_err(auth_error)?;
    match (target.service()?, stored) {
        (Some(service), Some(session)) => service
            .sign_out(&session.access_token)
            .await
            .map_err(auth_error)?,
        _ => clear_stored_session(&target.profile).map_err(auth_error)?,
    }
    println!("{}: signed out", target.profile);
    Ok(())
}
