// 🔐 Credentials - admin and consultant accounts consumed by auth flows
// Passwords are stored as "<salt>$<sha256(salt + password)>".

use crate::config::AdminSeed;
use crate::error::{LedgerError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// The field agent's profile shown on the home screen and used for export
/// filenames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultantProfile {
    pub consultant_id: i64,
    pub name: String,
    pub area: String,
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, hash)) => digest(salt, password) == hash,
        None => false,
    }
}

/// Create the seed admin account when no admin exists yet
pub fn seed_admin(conn: &Connection, seed: &AdminSeed) -> Result<bool> {
    let admins: i64 = conn.query_row("SELECT COUNT(*) FROM admin_accounts", [], |row| row.get(0))?;
    if admins > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO admin_accounts (username, password_hash) VALUES (?1, ?2)",
        params![seed.username, hash_password(&seed.password)],
    )?;
    info!(username = %seed.username, "seed admin account created");
    Ok(true)
}

pub fn verify_admin(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM admin_accounts WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.map_or(false, |hash| verify_password(&hash, password)))
}

/// Consultants sign in with their name and password
pub fn verify_consultant(conn: &Connection, name: &str, password: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT password_hash FROM consultant WHERE name = ?1")?;
    let hashes = stmt
        .query_map(params![name], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hashes.iter().any(|hash| verify_password(hash, password)))
}

pub fn add_consultant(conn: &Connection, name: &str, area: &str, password: &str) -> Result<i64> {
    if name.trim().is_empty() || area.trim().is_empty() || password.is_empty() {
        return Err(LedgerError::InvalidInput(
            "consultant name, area and password are required".to_string(),
        ));
    }
    conn.execute(
        "INSERT INTO consultant (name, password_hash, area) VALUES (?1, ?2, ?3)",
        params![name.trim(), hash_password(password), area.trim()],
    )?;
    let consultant_id = conn.last_insert_rowid();
    info!(consultant_id, name, "consultant added");
    Ok(consultant_id)
}

/// The device's consultant (the first one registered), if any
pub fn consultant_profile(conn: &Connection) -> Result<Option<ConsultantProfile>> {
    let profile = conn
        .query_row(
            "SELECT consultant_id, name, area FROM consultant ORDER BY consultant_id LIMIT 1",
            [],
            |row| {
                Ok(ConsultantProfile {
                    consultant_id: row.get(0)?,
                    name: row.get(1)?,
                    area: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}
