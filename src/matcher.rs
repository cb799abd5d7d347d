use serde::Serialize;
use std::path::{Path, PathBuf};

use img_hash::ImageHash;

use crate::config::AppCfg;
use crate::database::{load_database, read_description, DbEntry};
use crate::hashing::{distance, AverageHasher};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    /// URL of the matched reference image.
    pub image: Option<String>,
    /// Best distance seen; `None` when no entry could be compared.
    pub score: Option<u32>,
}

#[derive(Debug)]
pub enum IdentifyError {
    UnreadableUpload(anyhow::Error),
    Internal(anyhow::Error),
}

impl std::fmt::Display for IdentifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifyError::UnreadableUpload(e) => write!(f, "uploaded image could not be read: {e:#}"),
            IdentifyError::Internal(e) => write!(f, "identify failed: {e:#}"),
        }
    }
}

impl std::error::Error for IdentifyError {}

/// Linear scan for the entry nearest to `target`. Entries that fail to decode
/// are skipped; ties keep the earlier entry.
pub fn nearest<'a>(hasher: &AverageHasher, target: &ImageHash, entries: &'a [DbEntry]) -> Option<(&'a DbEntry, u32)> {
    let mut best: Option<(&DbEntry, u32)> = None;
    for entry in entries {
        let hash = match hasher.hash_path(&entry.image_path) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(entry = %entry.name, error = %format!("{e:#}"), "skipping unreadable database image");
                continue;
            }
        };
        let d = distance(target, &hash);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((entry, d));
        }
    }
    best
}

/// Hash the upload at `upload` and find its nearest entry.
pub fn match_image(hasher: &AverageHasher, upload: &Path, entries: &[DbEntry]) -> Result<Option<(DbEntry, u32)>, IdentifyError> {
    let target = hasher.hash_path(upload).map_err(IdentifyError::UnreadableUpload)?;
    Ok(nearest(hasher, &target, entries).map(|(e, d)| (e.clone(), d)))
}

/// Python-style capitalize: first character upper, the rest lower.
pub fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    db_dir: PathBuf,
    hash_size: u32,
    max_hash_diff: u32,
}

impl Matcher {
    pub fn new(db_dir: PathBuf, hash_size: u32, max_hash_diff: u32) -> Self {
        Self { db_dir, hash_size, max_hash_diff }
    }

    pub fn from_cfg(cfg: &AppCfg) -> Self {
        Self::new(cfg.db_dir.clone(), cfg.hash_size, cfg.max_hash_diff)
    }

    /// Rescans the database and hashes everything on every call.
    pub async fn identify(&self, upload: &Path) -> Result<MatchResult, IdentifyError> {
        let entries = load_database(&self.db_dir).await;
        let upload = upload.to_path_buf();
        let hash_size = self.hash_size;
        let best = tokio::task::spawn_blocking(move || {
            let hasher = AverageHasher::new(hash_size);
            match_image(&hasher, &upload, &entries)
        })
        .await
        .map_err(|e| IdentifyError::Internal(e.into()))??;

        let mut result = MatchResult { score: best.as_ref().map(|(_, d)| *d), ..Default::default() };
        if let Some((entry, d)) = best {
            tracing::debug!(entry = %entry.name, distance = d, "nearest entry");
            if d <= self.max_hash_diff {
                result.matched = true;
                result.name = Some(display_name(&entry.name));
                result.image = Some(entry.image_url());
                result.description = read_description(&entry).await;
            }
        }
        Ok(result)
    }
}
