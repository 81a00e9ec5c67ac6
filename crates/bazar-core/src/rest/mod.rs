//! Minimal PostgREST client for the hosted backend's `/rest/v1` surface.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::util::{compact_text, normalize_base_url};
use crate::{Error, Result};

const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

/// Row query against one table or view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    table: String,
    params: Vec<(String, String)>,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: Vec::new(),
        }
    }

    /// Column list, including embedded resources such as `*,profiles(full_name)`.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Case-insensitive substring match; `text` is matched literally.
    #[must_use]
    pub fn ilike_contains(mut self, column: &str, text: &str) -> Self {
        self.params.push((
            column.to_string(),
            format!("ilike.*{}*", escape_like(text)),
        ));
        self
    }

    /// Raw disjunction such as `buyer_id.eq.X,seller_id.eq.X`.
    #[must_use]
    pub fn or(mut self, filters: &str) -> Self {
        self.params.push(("or".to_string(), format!("({filters})")));
        self
    }

    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params
            .push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Escape LIKE metacharacters so user text matches literally.
///
/// `*` is PostgREST's wildcard alias and cannot be escaped. It becomes the
/// single-character wildcard `_`, so callers must re-check such rows.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '*' => escaped.push('_'),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Error body returned by PostgREST
#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    code: Option<String>,
}

fn parse_postgrest_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message {
            let mut rendered = message.trim().to_string();
            if let Some(details) = payload.details.filter(|text| !text.trim().is_empty()) {
                rendered.push_str(": ");
                rendered.push_str(details.trim());
            }
            if let Some(hint) = payload.hint.filter(|text| !text.trim().is_empty()) {
                rendered.push_str(&format!(" (hint: {})", hint.trim()));
            }
            return match payload.code {
                Some(code) => format!("{rendered} [{code}, HTTP {}]", status.as_u16()),
                None => format!("{rendered} [HTTP {}]", status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} (HTTP {})", status.as_u16())
    }
}

/// Client for `{base}/rest/v1`.
#[derive(Clone)]
pub struct PostgrestClient {
    rest_url: String,
    anon_key: String,
    client: Client,
}

impl std::fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PostgrestClient {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let base = normalize_base_url(base_url, "Supabase URL").map_err(Error::Validation)?;
        let anon_key = anon_key.trim().to_string();
        if anon_key.is_empty() {
            return Err(Error::validation("Supabase anon key must not be empty"));
        }

        Ok(Self {
            rest_url: format!("{base}/rest/v1"),
            anon_key,
            client: Client::builder().build()?,
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    /// Run a row query and decode every returned row.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        query: &RowQuery,
        access_token: Option<&str>,
    ) -> Result<Vec<T>> {
        let request = self
            .client
            .get(format!("{}/{}", self.rest_url, query.table_name()))
            .query(query.params());
        tracing::debug!(table = query.table_name(), "PostgREST select");
        self.send_rows(self.authorize(request, access_token)).await
    }

    /// Insert one row and return the stored representation.
    pub async fn insert<B, T>(&self, table: &str, row: &B, access_token: Option<&str>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(format!("{}/{table}", self.rest_url))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(row);
        tracing::debug!(table, "PostgREST insert");
        first_row(self.send_rows(self.authorize(request, access_token)).await?, table)
    }

    /// Insert or, on conflict over `on_conflict`, merge into the existing row.
    ///
    /// This is one server-side `INSERT ... ON CONFLICT DO UPDATE` statement.
    pub async fn upsert<B, T>(
        &self,
        table: &str,
        row: &B,
        on_conflict: &str,
        access_token: Option<&str>,
    ) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(format!("{}/{table}", self.rest_url))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", MERGE_DUPLICATES)
            .json(row);
        tracing::debug!(table, on_conflict, "PostgREST upsert");
        first_row(self.send_rows(self.authorize(request, access_token)).await?, table)
    }

    fn authorize(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Accept", "application/json")
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    async fn send_rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(parse_postgrest_error(status, &body)));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn first_row<T>(rows: Vec<T>, table: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::backend(format!("{table}: write returned no row")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn query_builder_renders_postgrest_params() {
        let query = RowQuery::table("listings")
            .select("*")
            .ilike_contains("title", "50%_off")
            .order("created_at", false)
            .limit(20);
        assert_eq!(
            query.params(),
            &[
                ("select".to_string(), "*".to_string()),
                ("title".to_string(), "ilike.*50\\%\\_off*".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn escape_like_narrows_star_to_one_character() {
        assert_eq!(escape_like("a*b"), "a_b");
        assert_eq!(escape_like("*"), "_");
        assert_eq!(escape_like(r"c:\tmp"), r"c:\\tmp");
    }

    #[test]
    fn error_body_is_decoded() {
        let body = r#"{"message":"duplicate key value","details":"Key exists","hint":null,"code":"23505"}"#;
        assert_eq!(
            parse_postgrest_error(StatusCode::CONFLICT, body),
            "duplicate key value: Key exists [23505, HTTP 409]"
        );
        assert_eq!(
            parse_postgrest_error(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502"
        );
    }

    #[tokio::test]
    async fn fetch_sends_filters_and_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("conversation_id", "eq.c1"))
            .and(query_param("order", "created_at.asc"))
            .and(header("apikey", "anon"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "n": 1 }, { "n": 2 }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = PostgrestClient::new(&server.uri(), "anon").unwrap();
        let query = RowQuery::table("messages")
            .eq("conversation_id", "c1")
            .order("created_at", true);
        let rows: Vec<Value> = client.fetch(&query, Some("user-jwt")).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn upsert_uses_on_conflict_and_merge_preference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/conversations"))
            .and(query_param("on_conflict", "listing_id,buyer_id,seller_id"))
            .and(headers(
                "Prefer",
                vec!["resolution=merge-duplicates", "return=representation"],
            ))
            .and(body_json(json!({ "listing_id": "l1" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "c1" }])))
            .mount(&server)
            .await;

        let client = PostgrestClient::new(&server.uri(), "anon").unwrap();
        let row: Value = client
            .upsert(
                "conversations",
                &json!({ "listing_id": "l1" }),
                "listing_id,buyer_id,seller_id",
                None,
            )
            .await
            .unwrap();
        assert_eq!(row["id"], "c1");
    }

    #[tokio::test]
    async fn failed_insert_maps_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "new row violates row-level security policy",
                "code": "42501"
            })))
            .mount(&server)
            .await;

        let client = PostgrestClient::new(&server.uri(), "anon").unwrap();
        let error = client
            .insert::<_, Value>("messages", &json!({ "content": "hi" }), None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Backend(ref message) if message.contains("42501")));
    }

    #[test]
    fn new_rejects_blank_key() {
        assert!(matches!(
            PostgrestClient::new("https://demo.supabase.co", " "),
            Err(Error::Validation(_))
        ));
    }
}
