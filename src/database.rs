use serde::Serialize;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One labeled reference image. `text_path` may point at a file that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbEntry {
    pub name: String,
    pub image_path: PathBuf,
    pub text_path: PathBuf,
}

impl DbEntry {
    pub fn file_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Public URL under the `/fungi_images` static route.
    pub fn image_url(&self) -> String {
        format!("/fungi_images/{}", urlencoding::encode(&self.file_name()))
    }

    pub fn has_description(&self) -> bool {
        self.text_path.is_file()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Scan `dir` for reference images, sorted by file name. A missing or unlistable
/// directory is an empty database; image contents are not checked here.
pub async fn load_database(dir: &Path) -> Vec<DbEntry> {
    let mut entries = vec![];
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "database directory not readable");
            return entries;
        }
    };
    loop {
        let ent = match rd.next_entry().await {
            Ok(Some(ent)) => ent,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "database listing stopped early");
                break;
            }
        };
        let path = ent.path();
        if !is_image_file(&path) { continue; }
        match ent.file_type().await {
            Ok(ft) if ft.is_file() => {}
            _ => continue,
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else { continue };
        let text_path = dir.join(format!("{name}.txt"));
        entries.push(DbEntry { name, image_path: path, text_path });
    }
    entries.sort_by(|a, b| a.image_path.cmp(&b.image_path));
    entries
}

pub async fn read_description(entry: &DbEntry) -> Option<String> {
    tokio::fs::read_to_string(&entry.text_path).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, body: &[u8]) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn lists_only_image_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "amanita.png", b"x");
        touch(tmp.path(), "amanita.txt", b"Fly agaric");
        touch(tmp.path(), "boletus.JPG", b"x");
        touch(tmp.path(), "chanterelle.jpeg", b"x");
        touch(tmp.path(), "notes.md", b"x");
        touch(tmp.path(), "morel.gif", b"x");
        std::fs::create_dir(tmp.path().join("nested.png")).unwrap();

        let db = load_database(tmp.path()).await;
        let names: Vec<_> = db.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["amanita", "boletus", "chanterelle"]);
        assert_eq!(db[0].text_path, tmp.path().join("amanita.txt"));
        assert!(db[0].has_description());
        assert!(!db[1].has_description());
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_database(&tmp.path().join("nope")).await.is_empty());
    }

    #[tokio::test]
    async fn description_is_optional() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "amanita.png", b"x");
        touch(tmp.path(), "amanita.txt", "Fly agaric — toxic".as_bytes());
        touch(tmp.path(), "boletus.png", b"x");
        let db = load_database(tmp.path()).await;
        assert_eq!(read_description(&db[0]).await.as_deref(), Some("Fly agaric — toxic"));
        assert_eq!(read_description(&db[1]).await, None);
    }

    #[test]
    fn image_url_uses_file_name() {
        let e = DbEntry {
            name: "amanita".into(),
            image_path: PathBuf::from("/data/db/amanita.png"),
            text_path: PathBuf::from("/data/db/amanita.txt"),
        };
        assert_eq!(e.image_url(), "/fungi_images/amanita.png");
    }

    #[test]
    fn image_url_escapes_reserved_characters() {
        let e = DbEntry {
            name: "fly agaric #2?".into(),
            image_path: PathBuf::from("/data/db/fly agaric #2?.png"),
            text_path: PathBuf::from("/data/db/fly agaric #2?.txt"),
        };
        assert_eq!(e.image_url(), "/fungi_images/fly%20agaric%20%232%3F.png");
    }
}
