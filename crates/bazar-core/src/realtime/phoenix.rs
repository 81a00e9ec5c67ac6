//! Phoenix channel frames spoken by the hosted realtime service (JSON, vsn 1.0.0).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";

/// Scope of a change subscription: inserts on `schema.table` where `column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn inserts(table: impl Into<String>, column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// PostgREST-style filter expression, e.g. `conversation_id=eq.<id>`
    #[must_use]
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Channel topic; one topic per scoped view.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{}-{}", self.table, self.value)
    }
}

/// A single frame on the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    #[must_use]
    pub fn join(filter: &ChangeFilter, access_token: Option<&str>, reference: &str) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": filter.schema,
                    "table": filter.table,
                    "filter": filter.expression(),
                }],
                "private": false,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: filter.topic(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    #[must_use]
    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    #[must_use]
    pub fn leave(topic: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Interpret an inbound frame for `topic`.
    #[must_use]
    pub fn classify(&self, topic: &str, join_ref: &str) -> Inbound {
        if self.topic != topic {
            return Inbound::Ignored;
        }

        match self.event.as_str() {
            "phx_reply" if self.reference.as_deref() == Some(join_ref) => {
                if self.payload["status"] == "ok" {
                    Inbound::Joined
                } else {
                    Inbound::Failed(describe(&self.payload["response"]))
                }
            }
            "phx_error" => Inbound::Failed(describe(&self.payload)),
            "phx_close" => Inbound::Closed,
            "system" if self.payload["status"] == "error" => {
                Inbound::Failed(describe(&self.payload))
            }
            "postgres_changes" => {
                let data = &self.payload["data"];
                let kind = data["type"]
                    .as_str()
                    .or_else(|| data["eventType"].as_str())
                    .unwrap_or_default();
                if kind.eq_ignore_ascii_case("INSERT") {
                    Inbound::Insert(data["record"].clone())
                } else {
                    Inbound::Ignored
                }
            }
            _ => Inbound::Ignored,
        }
    }
}

/// What an inbound frame means for a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Joined,
    Insert(Value),
    Failed(String),
    Closed,
    Ignored,
}

fn describe(value: &Value) -> String {
    value["message"]
        .as_str()
        .or_else(|| value["reason"].as_str())
        .map_or_else(
            || {
                if value.is_null() {
                    "channel error".to_string()
                } else {
                    value.to_string()
                }
            },
            ToString::to_string,
        )
}
