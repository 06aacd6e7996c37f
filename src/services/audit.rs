use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries::{self, NewAuditLog};

/// Who performed an action and from where.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub now: Option<NaiveDateTime>,
}

impl AuditContext {
    pub fn new(user_id: Option<i64>, ip_address: Option<String>, now: NaiveDateTime) -> Self {
        Self {
            user_id,
            ip_address,
            now: Some(now),
        }
    }
}

/// Records an audit entry. Failures are logged and swallowed so the
/// surrounding request still succeeds.
pub fn log_audit(
    conn: &Connection,
    ctx: &AuditContext,
    action: &str,
    entity_type: &str,
    entity_id: Option<i64>,
    details: serde_json::Value,
) {
    let timestamp = ctx
        .now
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let details = if details.is_null() {
        None
    } else {
        Some(details.to_string())
    };

    let entry = NewAuditLog {
        user_id: ctx.user_id,
        timestamp,
        action,
        entity_type,
        entity_id,
        details,
        ip_address: ctx.ip_address.as_deref(),
    };

    if let Err(e) = queries::insert_audit_log(conn, &entry) {
        tracing::error!(error = %e, action, entity_type, "failed to write audit log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{parse_datetime_input, AuditFilter};

    #[test]
    fn test_log_audit_writes_entry() {
        let conn = db::init_db(":memory:").unwrap();
        let ctx = AuditContext::new(
            None,
            Some("10.0.0.1".to_string()),
            parse_datetime_input("2030-06-17 10:00").unwrap(),
        );

        log_audit(
            &conn,
            &ctx,
            "create",
            "service",
            Some(7),
            serde_json::json!({"name": "Cut"}),
        );

        let logs = queries::list_audit_logs(&conn, &AuditFilter::default(), 10, 0).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "create");
        assert_eq!(logs[0].entity_id, Some(7));
        assert_eq!(logs[0].details["name"], "Cut");
        assert_eq!(logs[0].ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_log_audit_failure_is_swallowed() {
        let conn = db::init_db(":memory:").unwrap();
        conn.execute_batch("DROP TABLE audit_logs").unwrap();

        log_audit(
            &conn,
            &AuditContext::default(),
            "login",
            "user",
            None,
            serde_json::Value::Null,
        );
    }
}
