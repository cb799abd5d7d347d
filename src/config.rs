use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_HASH_DIFF: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    /// Reference images and their `<name>.txt` descriptions.
    pub db_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub bind: String,
    /// Largest Hamming distance still reported as a match.
    pub max_hash_diff: u32,
    /// Hash is `hash_size x hash_size` bits.
    pub hash_size: u32,
    pub max_upload_mb: usize,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("fungi_database"),
            upload_dir: PathBuf::from("uploads"),
            bind: "0.0.0.0:10000".into(),
            max_hash_diff: DEFAULT_MAX_HASH_DIFF,
            hash_size: 8,
            max_upload_mb: 16,
        }
    }
}

impl AppCfg {
    /// Reads the YAML file when given, then applies `FUNGID_*` env overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .context(format!("Failed to read config file: {}", p.display()))?;
                serde_yaml::from_str(&txt).context("Failed to parse config YAML")?
            }
            None => AppCfg::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("FUNGID_DB_DIR") { self.db_dir = PathBuf::from(dir); }
        if let Ok(dir) = std::env::var("FUNGID_UPLOAD_DIR") { self.upload_dir = PathBuf::from(dir); }
        if let Ok(bind) = std::env::var("FUNGID_BIND") { self.bind = bind; }
        if let Some(d) = std::env::var("FUNGID_MAX_HASH_DIFF").ok().and_then(|v| v.parse().ok()) {
            self.max_hash_diff = d;
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.db_dir, &self.upload_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .context(format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
