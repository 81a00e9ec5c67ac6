use bazar_core::config::ClientConfig;
use bazar_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            media_cloud_name,
            media_upload_preset,
            media_api_url,
            no_activate,
        } => {
            let explicit = ClientConfig {
                supabase_url,
                supabase_anon_key,
                media_cloud_name,
                media_upload_preset,
                media_api_url,
            };
            run_config_init(profile.as_deref().or(global_profile), explicit, no_activate)
        }
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    explicit: ClientConfig,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(explicit, ClientConfig::from_env(), &existing)?;
    config.set_profile(&profile_name, merged.clone());
    if !no_activate {
        config.activate(&profile_name);
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let missing = missing_fields(&merged);
    if missing.is_empty() {
        println!(
            "Profile '{profile_name}' is ready. Run `bazar auth login --email <email> --password <password>`."
        );
    } else {
        println!("Profile '{}' is missing: {}", profile_name, missing.join(", "));
    }
    Ok(())
}

/// Explicit flags, then environment, then what the profile already had.
pub fn merge_profile(
    explicit: ClientConfig,
    env: ClientConfig,
    existing: &CliProfile,
) -> Result<CliProfile, CliError> {
    let explicit = CliProfile::from(explicit).client_config();
    let merged = explicit.or(env).or(existing.client_config());

    merged
        .supabase()
        .map_err(|error| CliError::Config(error.to_string()))?;
    merged
        .media()
        .map_err(|error| CliError::Config(error.to_string()))?;
    if let Some(url) = &merged.media_api_url {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "media_api_url must include http:// or https://".to_string(),
            ));
        }
    }

    Ok(CliProfile::from(merged))
}

pub fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    let config = profile.client_config();
    let mut missing = Vec::new();
    if config.supabase_url.is_none() {
        missing.push("supabase_url");
    }
    if config.supabase_anon_key.is_none() {
        missing.push("supabase_anon_key");
    }
    missing
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    let shown = CliProfile {
        supabase_anon_key: profile
            .supabase_anon_key
            .as_ref()
            .map(|_| "[set]".to_string()),
        ..profile.clone()
    };
    println!("Profile '{profile_name}':");
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
