use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

impl AuditLog {
    /// Stored details are JSON; anything unparseable is surfaced as `{"raw": ...}`.
    pub fn details_from_str(raw: Option<&str>) -> serde_json::Value {
        match raw {
            None | Some("") => serde_json::json!({}),
            Some(s) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({ "raw": s })),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<i64>,
    pub from: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
}
