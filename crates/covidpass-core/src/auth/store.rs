use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens this close to expiry are treated as already expired, so a call
/// never starts with a token that lapses mid-flight.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionData {
    /// Token issued now and valid for `lifetime`. `None` when the expiry
    /// instant falls outside the representable range.
    pub fn new(access_token: String, token_type: String, lifetime: Duration) -> Option<Self> {
        let created_at = Utc::now();
        let expires_at = created_at.checked_add_signed(lifetime)?;
        Some(Self {
            access_token,
            token_type,
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Token store persisted as JSON between runs.
pub struct SessionStore {
    path: PathBuf,
    pub data: Option<SessionData>,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, data: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store from disk. Returns `Ok(false)` when there is nothing
    /// usable: no file, or a token that has expired.
    pub fn load(&mut self) -> Result<bool> {
        if self.path.exists() {
            let contents =
                std::fs::read_to_string(&self.path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;

            if !data.is_expired() {
                self.data = Some(data);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save the store to disk. A store without data writes nothing.
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Drop the in-memory token and delete the file.
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn authorization(&self) -> Option<String> {
        self.data.as_ref().map(SessionData::authorization)
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }
}
