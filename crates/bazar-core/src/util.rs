//! Small text helpers shared by the config, auth and HTTP clients.

const ERROR_BODY_LIMIT: usize = 180;

/// Trimmed text, or `None` when absent or blank.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    let value = value.trim_start();
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Response body cut down for use inside an error message.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(ERROR_BODY_LIMIT).collect()
}

/// An `http(s)` base URL without trailing slashes; `field` names it in errors.
pub fn normalize_base_url(raw: &str, field: &str) -> Result<String, String> {
    let base = raw.trim().trim_end_matches('/');
    match base {
        "" => Err(format!("{field} must not be empty")),
        _ if !is_http_url(base) => Err(format!("{field} must include http:// or https://")),
        _ => Ok(base.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" Lisboa ".to_string())).as_deref(),
            Some("Lisboa")
        );
    }

    #[test]
    fn only_http_schemes_count_as_urls() {
        assert!(is_http_url("http://127.0.0.1:54321"));
        assert!(is_http_url("https://demo.supabase.co"));
        assert!(!is_http_url("wss://demo.supabase.co"));
        assert!(!is_http_url("demo.supabase.co"));
    }

    #[test]
    fn compact_text_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), ERROR_BODY_LIMIT);
        assert_eq!(compact_text("  short \n"), "short");
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://api.cloudinary.com// ", "Media API URL").unwrap(),
            "https://api.cloudinary.com"
        );
        assert_eq!(
            normalize_base_url("", "Media API URL").unwrap_err(),
            "Media API URL must not be empty"
        );
        assert!(normalize_base_url("api.cloudinary.com", "Media API URL").is_err());
    }
}
