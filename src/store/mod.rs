//! Flat CSV-backed credential and history stores.
//!
//! Two files under `DATA_DIR` with fixed column schemas:
//! `users.csv {username, password}` and
//! `history.csv {username, date, result, probability}`. Both are append-only;
//! writes are serialized behind an async mutex, reads re-scan the file.

use anyhow::{Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const USERS_FILE: &str = "users.csv";
pub const HISTORY_FILE: &str = "history.csv";

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already registered")]
    DuplicateUser,
    #[error("store unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unreadable: {0}")]
    Csv(#[from] csv::Error),
    #[error("password hashing failed")]
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    /// Argon2 hash; the column keeps the legacy `password` name.
    password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub username: String,
    pub date: String,
    pub result: String,
    pub probability: String,
}

/// Registered users keyed by unique username.
#[derive(Clone)]
pub struct UserStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl UserStore {
    /// Open (creating with a header row if missing) `users.csv` under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = init_file(dir, USERS_FILE, &["username", "password"])?;
        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read_all(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut users = Vec::new();
        for record in reader.deserialize() {
            users.push(record?);
        }
        Ok(users)
    }

    /// Create an account. A second registration for the same username fails
    /// and leaves the existing row untouched.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let users = self.read_all()?;
        if users.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUser);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| StoreError::Hash)?
            .to_string();

        append_record(
            &self.path,
            &UserRecord {
                username: username.to_string(),
                password: hash,
            },
        )
    }

    /// True only when the username exists and the password verifies.
    pub async fn verify_login(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let users = self.read_all()?;
        let Some(user) = users.iter().find(|u| u.username == username) else {
            return Ok(false);
        };
        let Ok(parsed) = PasswordHash::new(&user.password) else {
            return Ok(false);
        };
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    pub async fn exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.read_all()?.iter().any(|u| u.username == username))
    }
}

/// Append-only log of completed assessments and monitor sessions.
#[derive(Clone)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl HistoryStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let path = init_file(dir, HISTORY_FILE, &["username", "date", "result", "probability"])?;
        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Append one row stamped with the current time.
    pub async fn append(
        &self,
        username: &str,
        result: &str,
        probability: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        append_record(
            &self.path,
            &HistoryRecord {
                username: username.to_string(),
                date: Utc::now().format(DATE_FORMAT).to_string(),
                result: result.to_string(),
                probability: probability.to_string(),
            },
        )
    }

    /// All rows for one user, newest first. Never leaks other users' rows.
    pub async fn for_user(&self, username: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize::<HistoryRecord>() {
            let record = record?;
            if record.username == username {
                rows.push(record);
            }
        }
        rows.reverse();
        Ok(rows)
    }
}

fn init_file(dir: &Path, name: &str, header: &[&str]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create data directory {}", dir.display()))?;
    let path = dir.join(name);
    if !path.exists() {
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        writer.write_record(header)?;
        writer.flush()?;
    }
    Ok(path)
}

fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}
