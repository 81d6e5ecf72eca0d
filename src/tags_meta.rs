use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TAGS_META_FILENAME: &str = ".tags.json";

/// Tag overrides for prompts, keyed by root-relative `/`-separated path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagsMeta {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub tags_by_path: HashMap<String, Vec<String>>,
}

impl Default for TagsMeta {
    fn default() -> Self {
        Self {
            version: default_version(),
            updated_at: 0,
            tags_by_path: HashMap::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}

#[derive(thiserror::Error, Debug)]
pub enum TagsMetaError {
    #[error("failed to access tag metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tag metadata: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn tags_meta_path(root: &Path) -> PathBuf {
    root.join(TAGS_META_FILENAME)
}

pub fn load_tags_meta(root: &Path) -> Result<TagsMeta, TagsMetaError> {
    let path = tags_meta_path(root);
    if !path.exists() {
        return Ok(TagsMeta::default());
    }
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_tags_meta(root: &Path, meta: &TagsMeta) -> Result<(), TagsMetaError> {
    fs::create_dir_all(root)?;
    let raw = serde_json::to_string_pretty(meta)?;
    fs::write(tags_meta_path(root), raw)?;
    Ok(())
}

pub fn resolve_tags_for_path(
    meta: &TagsMeta,
    root: &Path,
    path: &Path,
    fallback: Vec<String>,
) -> Vec<String> {
    meta.tags_by_path
        .get(&path_to_key(root, path))
        .cloned()
        .unwrap_or(fallback)
}

pub fn path_to_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn touch_updated_at(meta: &mut TagsMeta) {
    meta.updated_at = Utc::now().timestamp();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_tags_meta(dir.path()).unwrap(), TagsMeta::default());
    }

    #[test]
    fn saved_meta_loads_back() {
        let dir = TempDir::new().unwrap();
        let mut meta = TagsMeta::default();
        meta.tags_by_path
            .insert("work/mail.txt".to_string(), vec!["mail".to_string()]);
        touch_updated_at(&mut meta);
        save_tags_meta(dir.path(), &meta).unwrap();

        let loaded = load_tags_meta(dir.path()).unwrap();
        assert_eq!(loaded, meta);
        assert!(loaded.updated_at > 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(tags_meta_path(dir.path()), "{not json").unwrap();
        assert!(matches!(
            load_tags_meta(dir.path()),
            Err(TagsMetaError::Json(_))
        ));
    }

    #[test]
    fn meta_entry_wins_over_fallback() {
        let root = Path::new("/prompts");
        let mut meta = TagsMeta::default();
        meta.tags_by_path
            .insert("a/b.txt".to_string(), vec!["x".to_string()]);

        let hit = resolve_tags_for_path(&meta, root, &root.join("a/b.txt"), vec!["y".to_string()]);
        assert_eq!(hit, vec!["x".to_string()]);

        let miss = resolve_tags_for_path(&meta, root, &root.join("c.txt"), vec!["y".to_string()]);
        assert_eq!(miss, vec!["y".to_string()]);
    }

    #[test]
    fn key_is_root_relative_with_forward_slashes() {
        let root = Path::new("/prompts");
        assert_eq!(
            path_to_key(root, &root.join("team").join("notes.md")),
            "team/notes.md"
        );
    }
}
