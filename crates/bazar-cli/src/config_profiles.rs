//! Named endpoint profiles stored in a JSON file under the user config dir.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bazar_core::config::ClientConfig;
use bazar_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "cli-config.json";
const FORMAT_VERSION: u32 = 1;
const ENV_PROFILE: &str = "BAZAR_PROFILE";
const FALLBACK_PROFILE: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliProfilesConfig {
    pub version: u32,
    pub active_profile: Option<String>,
    pub profiles: BTreeMap<String, CliProfile>,
}

impl Default for CliProfilesConfig {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            active_profile: None,
            profiles: BTreeMap::new(),
        }
    }
}

/// Endpoint settings for one named profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliProfile {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub media_cloud_name: Option<String>,
    pub media_upload_preset: Option<String>,
    pub media_api_url: Option<String>,
}

pub fn default_config_path() -> Result<PathBuf, String> {
    let base = dirs::config_dir().ok_or("no per-user config directory on this system")?;
    Ok(base.join("bazar").join(FILE_NAME))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(String::from))
}

fn file_error(action: &str, path: &Path, error: impl Display) -> String {
    format!("cannot {action} {}: {error}", path.display())
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    /// A missing file is an empty configuration.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(file_error("read", path, error)),
        };
        let config: Self =
            serde_json::from_str(&raw).map_err(|error| file_error("parse", path, error))?;
        Ok(config.normalized())
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|error| file_error("create", dir, error))?;
        }
        let json = serde_json::to_string_pretty(&self.clone().normalized())
            .map_err(|error| file_error("encode", path, error))?;
        std::fs::write(path, json).map_err(|error| file_error("write", path, error))
    }

    /// Explicit name, then `BAZAR_PROFILE`, then the active profile.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        let env = std::env::var(ENV_PROFILE).ok();
        self.pick_profile_name(explicit, env.as_deref())
    }

    fn pick_profile_name(&self, explicit: Option<&str>, env: Option<&str>) -> String {
        [explicit, env, self.active_profile.as_deref()]
            .into_iter()
            .find_map(normalize_profile_name)
            .unwrap_or_else(|| FALLBACK_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn set_profile(&mut self, name: &str, profile: CliProfile) {
        self.profiles.insert(name.to_string(), profile);
    }

    pub fn activate(&mut self, name: &str) {
        self.active_profile = normalize_profile_name(Some(name));
    }

    fn normalized(mut self) -> Self {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            *profile = CliProfile::from(profile.client_config());
        }
        self
    }
}

impl CliProfile {
    /// Endpoint settings as the core library consumes them.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            media_cloud_name: self.media_cloud_name.clone(),
            media_upload_preset: self.media_upload_preset.clone(),
            media_api_url: self.media_api_url.clone(),
        }
    }
}

/// Blank values are dropped on the way in.
impl From<ClientConfig> for CliProfile {
    fn from(config: ClientConfig) -> Self {
        Self {
            supabase_url: normalize_text_option(config.supabase_url),
            supabase_anon_key: normalize_text_option(config.supabase_anon_key),
            media_cloud_name: normalize_text_option(config.media_cloud_name),
            media_upload_preset: normalize_text_option(config.media_upload_preset),
            media_api_url: normalize_text_option(config.media_api_url),
        }
    }
}
