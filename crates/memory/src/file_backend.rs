//! File-based language-pack store: one JSON file per (personality, language).
//!
//! Storage layout: `<root>/<personality_id>/languages_<language>.json`
//!
//! Writes go to a temporary sibling file that is renamed over the target, so
//! a concurrent reader sees either the old pack or the new one. A reader that
//! still hits an unparsable file retries once before reporting it corrupt.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::language::{LanguagePackEntry, LanguagePackStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const PACK_PREFIX: &str = "languages_";
const PACK_EXTENSION: &str = "json";
const READ_RETRY_DELAY: Duration = Duration::from_millis(25);

pub struct FileLanguagePackStore {
    root: PathBuf,
}

impl FileLanguagePackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "File language-pack store opened");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the pack for a (personality, language) pair.
    pub fn pack_path(&self, personality_id: &str, language: &str) -> PathBuf {
        self.root
            .join(sanitize(personality_id))
            .join(format!("{PACK_PREFIX}{}.{PACK_EXTENSION}", sanitize(language)))
    }

    async fn read_pack(path: &Path) -> Result<Option<LanguagePackEntry>, ReadFailure> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ReadFailure::Io(e.to_string())),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ReadFailure::Parse(e.to_string()))
    }
}

enum ReadFailure {
    Io(String),
    Parse(String),
}

/// Keeps ids usable as single path components.
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl LanguagePackStore for FileLanguagePackStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(
        &self,
        personality_id: &str,
        language: &str,
    ) -> Result<Option<LanguagePackEntry>, StoreError> {
        let path = self.pack_path(personality_id, language);
        match Self::read_pack(&path).await {
            Ok(entry) => Ok(entry),
            Err(ReadFailure::Io(reason)) => Err(StoreError::Storage(format!(
                "Failed to read {}: {reason}",
                path.display()
            ))),
            Err(ReadFailure::Parse(first)) => {
                // A writer may be mid-rename on filesystems without atomic replace
                warn!(path = %path.display(), error = %first, "Unreadable language pack, retrying once");
                tokio::time::sleep(READ_RETRY_DELAY).await;
                match Self::read_pack(&path).await {
                    Ok(entry) => Ok(entry),
                    Err(ReadFailure::Io(reason)) | Err(ReadFailure::Parse(reason)) => {
                        Err(StoreError::Corrupt {
                            path: path.display().to_string(),
                            reason,
                        })
                    }
                }
            }
        }
    }

    async fn save(&self, entry: &LanguagePackEntry) -> Result<(), StoreError> {
        let path = self.pack_path(&entry.personality_id, &entry.language_code);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create language-pack directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(entry)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize language pack: {e}")))?;

        let tmp = path.with_extension(format!("{PACK_EXTENSION}.tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write language pack: {e}")))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Storage(format!(
                "Failed to replace {}: {e}",
                path.display()
            )));
        }

        debug!(path = %path.display(), "Language pack saved");
        Ok(())
    }

    async fn delete(&self, personality_id: &str, language: &str) -> Result<bool, StoreError> {
        let path = self.pack_path(personality_id, language);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list_languages(&self, personality_id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(sanitize(personality_id));
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };

        let suffix = format!(".{PACK_EXTENSION}");
        let mut languages = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let file_name = item.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(lang) = name
                .strip_prefix(PACK_PREFIX)
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            {
                languages.push(lang.to_string());
            }
        }
        languages.sort();
        Ok(languages)
    }
}
