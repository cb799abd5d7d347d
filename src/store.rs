use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

use crate::database::{DbEntry, IMAGE_EXTENSIONS};

/// Lowercased extension of `file_name` if it is one we accept.
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Write via `<path>.tmp` and rename so a concurrent scan never sees half a file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp).await.context(format!("create {}", tmp.display()))?;
        f.write_all(bytes).await?;
        let _ = f.sync_all().await; // best-effort
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Store an uploaded photo under a fresh name; the client's filename only
/// contributes its extension.
pub async fn save_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let Some(ext) = allowed_extension(file_name) else { bail!("unsupported extension: {file_name}") };
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{ext}", uuid::Uuid::new_v4()));
    write_atomic(&path, bytes).await?;
    Ok(path)
}

#[derive(Debug)]
pub enum AddError {
    BadName,
    BadExtension,
    NotAnImage,
    Io(anyhow::Error),
}

impl std::fmt::Display for AddError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddError::BadName => write!(f, "name must contain letters or digits"),
            AddError::BadExtension => write!(f, "only .jpg, .jpeg and .png images are accepted"),
            AddError::NotAnImage => write!(f, "file content is not a recognizable image"),
            AddError::Io(e) => write!(f, "write failed: {e:#}"),
        }
    }
}

impl std::error::Error for AddError {}

/// Add a labeled image (and its description, if any) to the database directory.
/// An existing entry with the same name and extension is overwritten.
pub async fn add_entry(dir: &Path, name: &str, description: &str, file_name: &str, bytes: &[u8]) -> Result<DbEntry, AddError> {
    let name = slug::slugify(name.trim());
    if name.is_empty() { return Err(AddError::BadName); }
    let ext = allowed_extension(file_name).ok_or(AddError::BadExtension)?;
    if image::guess_format(bytes).is_err() { return Err(AddError::NotAnImage); }

    fs::create_dir_all(dir).await.map_err(|e| AddError::Io(e.into()))?;
    let image_path = dir.join(format!("{name}.{ext}"));
    let text_path = dir.join(format!("{name}.txt"));
    write_atomic(&image_path, bytes).await.map_err(AddError::Io)?;
    let description = description.trim();
    if !description.is_empty() {
        write_atomic(&text_path, description.as_bytes()).await.map_err(AddError::Io)?;
    }
    tracing::info!(entry = %name, path = %image_path.display(), "added database entry");
    Ok(DbEntry { name, image_path, text_path })
}
