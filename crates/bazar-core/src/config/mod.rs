//! Client endpoint configuration.
//!
//! These values are public endpoints and keys (the Supabase anon key and an
//! unsigned media preset). Secret credentials never belong here.

use serde::{Deserialize, Serialize};

use crate::auth::resolve_optional_supabase_config;
use crate::media::DEFAULT_MEDIA_API_URL;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_MEDIA_CLOUD: &str = "BAZAR_MEDIA_CLOUD";
pub const ENV_MEDIA_PRESET: &str = "BAZAR_MEDIA_PRESET";
pub const ENV_MEDIA_API_URL: &str = "BAZAR_MEDIA_API_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub media_cloud_name: Option<String>,
    #[serde(default)]
    pub media_upload_preset: Option<String>,
    #[serde(default)]
    pub media_api_url: Option<String>,
}

/// Resolved hosted-backend endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseEndpoint {
    pub url: String,
    pub anon_key: String,
}

/// Resolved media host settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub api_url: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

impl ClientConfig {
    /// Build from a key lookup such as the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            supabase_url: normalize_text_option(lookup(ENV_SUPABASE_URL)),
            supabase_anon_key: normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)),
            media_cloud_name: normalize_text_option(lookup(ENV_MEDIA_CLOUD)),
            media_upload_preset: normalize_text_option(lookup(ENV_MEDIA_PRESET)),
            media_api_url: normalize_text_option(lookup(ENV_MEDIA_API_URL)),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            supabase_url: self.supabase_url.or(fallback.supabase_url),
            supabase_anon_key: self.supabase_anon_key.or(fallback.supabase_anon_key),
            media_cloud_name: self.media_cloud_name.or(fallback.media_cloud_name),
            media_upload_preset: self.media_upload_preset.or(fallback.media_upload_preset),
            media_api_url: self.media_api_url.or(fallback.media_api_url),
        }
    }

    /// The hosted backend, or `None` when neither value is set.
    pub fn supabase(&self) -> Result<Option<SupabaseEndpoint>> {
        let resolved = resolve_optional_supabase_config(
            self.supabase_url.clone(),
            self.supabase_anon_key.clone(),
        )?;
        let Some((url, anon_key)) = resolved else {
            return Ok(None);
        };
        if !is_http_url(&url) {
            return Err(Error::validation(format!(
                "{ENV_SUPABASE_URL} must include http:// or https://"
            )));
        }
        Ok(Some(SupabaseEndpoint { url, anon_key }))
    }

    /// Media settings, or `None` when image upload is not configured.
    pub fn media(&self) -> Result<Option<MediaEndpoint>> {
        let cloud_name = normalize_text_option(self.media_cloud_name.clone());
        let upload_preset = normalize_text_option(self.media_upload_preset.clone());
        match (cloud_name, upload_preset) {
            (None, None) => Ok(None),
            (Some(cloud_name), Some(upload_preset)) => Ok(Some(MediaEndpoint {
                api_url: normalize_text_option(self.media_api_url.clone())
                    .unwrap_or_else(|| DEFAULT_MEDIA_API_URL.to_string()),
                cloud_name,
                upload_preset,
            })),
            _ => Err(Error::validation(format!(
                "{ENV_MEDIA_CLOUD} and {ENV_MEDIA_PRESET} must be set together"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_means_local_mode() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.supabase().unwrap(), None);
        assert_eq!(config.media().unwrap(), None);
    }

    #[test]
    fn supabase_values_are_trimmed() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, " https://demo.supabase.co "),
            (ENV_SUPABASE_ANON_KEY, "anon"),
        ]));
        assert_eq!(
            config.supabase().unwrap(),
            Some(SupabaseEndpoint {
                url: "https://demo.supabase.co".to_string(),
                anon_key: "anon".to_string(),
            })
        );
    }

    #[test]
    fn half_configured_values_are_errors() {
        let supabase = ClientConfig::from_lookup(lookup(&[(ENV_SUPABASE_ANON_KEY, "anon")]));
        assert!(supabase.supabase().is_err());

        let media = ClientConfig::from_lookup(lookup(&[(ENV_MEDIA_CLOUD, "demo")]));
        assert!(media.media().is_err());

        let scheme = ClientConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, "demo.supabase.co"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
        ]));
        assert!(scheme.supabase().is_err());
    }

    #[test]
    fn media_defaults_api_url() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_MEDIA_CLOUD, "demo"),
            (ENV_MEDIA_PRESET, "unsigned"),
        ]));
        let media = config.media().unwrap().unwrap();
        assert_eq!(media.api_url, DEFAULT_MEDIA_API_URL);
    }

    #[test]
    fn explicit_values_win_over_fallback() {
        let explicit = ClientConfig {
            supabase_url: Some("https://a.supabase.co".into()),
            ..ClientConfig::default()
        };
        let fallback = ClientConfig {
            supabase_url: Some("https://b.supabase.co".into()),
            supabase_anon_key: Some("key".into()),
            ..ClientConfig::default()
        };
        let merged = explicit.or(fallback);
        assert_eq!(merged.supabase_url.as_deref(), Some("https://a.supabase.co"));
        assert_eq!(merged.supabase_anon_key.as_deref(), Some("key"));
    }
}
