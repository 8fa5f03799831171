use std::path::{Path, PathBuf};

use crate::errors::{MatchError, ResultExt};
use crate::models::{MergedProfile, Query, UnifiedField};

/// Writes merged profiles as pretty-printed JSON documents.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `profile_<key>.json`, keyed on the national ID, else the full name.
    pub fn file_name_for(query: &Query) -> String {
        let key = query
            .get(&UnifiedField::NationalId)
            .map(str::to_string)
            .or_else(|| {
                query
                    .get(&UnifiedField::FullName)
                    .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_"))
            })
            .unwrap_or_else(|| "unknown".to_string());

        let key: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("profile_{}.json", key)
    }

    pub fn path_for(&self, query: &Query) -> PathBuf {
        self.dir.join(Self::file_name_for(query))
    }

    /// Persist `profile`, replacing any earlier document for the same query key.
    pub async fn save(&self, query: &Query, profile: &MergedProfile) -> Result<PathBuf, MatchError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating profile directory {}", self.dir.display()))?;

        let path = self.path_for(query);
        let body = serde_json::to_string_pretty(profile)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing profile {}", path.display()))?;

        tracing::info!("Profile saved to {}", path.display());
        Ok(path)
    }

    /// Read back a stored profile document, `None` when none exists for the query.
    pub async fn load(&self, query: &Query) -> Result<Option<serde_json::Value>, MatchError> {
        let path = self.path_for(query);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading profile {}", path.display())),
        }
    }
}
