use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::users::User;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoredSession {
    pub token: String,
    pub user: User,
    #[serde(default)]
    pub remember: bool,
}

/// Durable session record on disk. Only the session service writes here;
/// everything else reacts to session events instead.
#[derive(Clone)]
pub struct SessionStorage {
    path: PathBuf,
}

impl SessionStorage {
    pub fn new(dir_override: Option<PathBuf>) -> Result<Self, anyhow::Error> {
        let dir = match dir_override {
            Some(dir) => dir,
            None => directories::ProjectDirs::from("app", "cofre", "cofre-client")
                .context("could not resolve a data directory for session storage")?
                .data_dir()
                .to_path_buf(),
        };
        fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join("session.json"),
        })
    }

    pub fn load(&self) -> Result<Option<StoredSession>, anyhow::Error> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&raw).context("stored session data is not parseable")?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), anyhow::Error> {
        let raw = serde_json::to_string(session)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), anyhow::Error> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
