use base64::Engine;
use chrono::{Duration, NaiveDateTime};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha1::Sha1;
use sha2::Sha256;

use crate::config::{AppConfig, MAX_SESSION_TTL_HOURS};
use crate::db::queries;
use crate::models::User;

type HmacSha1 = Hmac<Sha1>;

const HASH_SCHEME: &str = "pbkdf2-sha256";
/// Hashes written before the move to SHA-256; still accepted at login.
const LEGACY_HASH_SCHEME: &str = "pbkdf2-sha1";
const PBKDF2_ROUNDS: u32 = 260_000;
const HASH_LEN: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 8;

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// `pbkdf2-sha256$<rounds>$<salt>$<hash>`, salt and hash base64 encoded.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4();
    hash_with_salt(password, salt.as_bytes(), PBKDF2_ROUNDS)
}

fn hash_with_salt(password: &str, salt: &[u8], rounds: u32) -> String {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    format!(
        "{HASH_SCHEME}${rounds}${}${}",
        b64().encode(salt),
        b64().encode(out)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 {
        return false;
    }
    let Ok(rounds) = parts[1].parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (b64().decode(parts[2]), b64().decode(parts[3])) else {
        return false;
    };
    if rounds == 0 || expected.is_empty() {
        return false;
    }

    let mut out = vec![0u8; expected.len()];
    match parts[0] {
        HASH_SCHEME => pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut out),
        LEGACY_HASH_SCHEME => pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), &salt, rounds, &mut out),
        _ => return false,
    }

    out.iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Length and confirmation rules shared by registration, reset and change.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        ));
    }
    if password != confirm {
        return Err("Passwords do not match.".to_string());
    }
    Ok(())
}

fn session_mac(secret: &str, session_id: &str) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_id.as_bytes());
    Some(mac)
}

/// Bearer token for a session: `<id>.<base64 HMAC-SHA1(secret, id)>`.
pub fn sign_session(secret: &str, session_id: &str) -> anyhow::Result<String> {
    let mac = session_mac(secret, session_id)
        .ok_or_else(|| anyhow::anyhow!("invalid session secret"))?;
    let signature = b64().encode(mac.finalize().into_bytes());
    Ok(format!("{session_id}.{signature}"))
}

/// Returns the session id when the signature matches.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let (session_id, signature) = token.split_once('.')?;
    let signature = b64().decode(signature).ok()?;
    let mac = session_mac(secret, session_id)?;
    mac.verify_slice(&signature).ok()?;
    Some(session_id.to_string())
}

/// Stores a new session for the user and returns its bearer token.
pub fn issue_session(
    conn: &Connection,
    config: &AppConfig,
    user_id: i64,
    now: NaiveDateTime,
) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let ttl = Duration::hours(config.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS));
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow::anyhow!("session expiry out of range"))?;
    queries::create_session(conn, &session_id, user_id, &expires_at)?;
    sign_session(&config.secret_key, &session_id)
}

/// The active user behind a bearer token, if the token is genuine and unexpired.
pub fn resolve_session(
    conn: &Connection,
    secret: &str,
    token: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Option<User>> {
    let Some(session_id) = verify_token(secret, token) else {
        return Ok(None);
    };
    let user = queries::get_session_user(conn, &session_id, &now)?;
    Ok(user.filter(|u| u.is_active))
}

pub fn revoke_session(conn: &Connection, secret: &str, token: &str) -> anyhow::Result<bool> {
    match verify_token(secret, token) {
        Some(session_id) => queries::delete_session(conn, &session_id),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{NewUser, Role};

    fn now() -> NaiveDateTime {
        crate::models::parse_datetime_input("2030-06-17 10:00").unwrap()
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse");
        assert!(hash.starts_with("pbkdf2-sha256$260000$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_legacy_sha1_hash_still_verifies() {
        let salt = b"0123456789abcdef";
        let mut out = [0u8; HASH_LEN];
        pbkdf2::pbkdf2_hmac::<Sha1>(b"correct horse", salt, 1_000, &mut out);
        let stored = format!("pbkdf2-sha1$1000${}${}", b64().encode(salt), b64().encode(out));

        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "md5$1$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha1$nope$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha256$0$YWJj$ZGVm"));
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("longenough", "longenough").is_ok());
        assert!(validate_new_password("short", "short").is_err());
        assert_eq!(
            validate_new_password("longenough", "different").unwrap_err(),
            "Passwords do not match."
        );
    }

    #[test]
    fn test_token_signature() {
        let token = sign_session("secret", "abc123").unwrap();
        assert_eq!(verify_token("secret", &token).as_deref(), Some("abc123"));
        assert_eq!(verify_token("other", &token), None);
        assert_eq!(verify_token("secret", "abc123.bogus"), None);
        assert_eq!(verify_token("secret", "no-dot"), None);
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = db::init_db(":memory:").unwrap();
        let config = AppConfig::default();
        let user_id = queries::create_user(
            &conn,
            &NewUser {
                email: "a@example.com".to_string(),
                password_hash: hash_password("password1"),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                phone: None,
                role: Role::Client,
            },
        )
        .unwrap();

        let token = issue_session(&conn, &config, user_id, now()).unwrap();
        let user = resolve_session(&conn, &config.secret_key, &token, now()).unwrap();
        assert_eq!(user.map(|u| u.id), Some(user_id));

        let later = now() + Duration::hours(config.session_ttl_hours + 1);
        assert!(resolve_session(&conn, &config.secret_key, &token, later)
            .unwrap()
            .is_none());

        assert!(revoke_session(&conn, &config.secret_key, &token).unwrap());
        assert!(resolve_session(&conn, &config.secret_key, &token, now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let conn = db::init_db(":memory:").unwrap();
        let config = AppConfig {
            session_ttl_hours: i64::MAX,
            ..AppConfig::default()
        };
        let user_id = queries::create_user(
            &conn,
            &NewUser {
                email: "ttl@example.com".to_string(),
                password_hash: "x".to_string(),
                first_name: "T".to_string(),
                last_name: "L".to_string(),
                phone: None,
                role: Role::Client,
            },
        )
        .unwrap();

        let token = issue_session(&conn, &config, user_id, now()).unwrap();
        let user = resolve_session(&conn, &config.secret_key, &token, now()).unwrap();
        assert_eq!(user.map(|u| u.id), Some(user_id));
    }
}
