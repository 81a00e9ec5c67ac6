//! Public user profile

use serde::{Deserialize, Serialize};

use super::UserId;

const FALLBACK_DISPLAY_NAME: &str = "User";

/// Read-only profile issued by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn display_name(&self) -> &str {
        display_name_or_fallback(self.full_name.as_deref())
    }
}

pub(crate) fn display_name_or_fallback(name: Option<&str>) -> &str {
    name.map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
}
