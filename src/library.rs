use crate::prompts::{PromptEntry, index_prompts, make_preview, normalize_tag, search_prompts};
use crate::tags_meta::{
    TagsMetaError, load_tags_meta, path_to_key, save_tags_meta, touch_updated_at,
};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Newly created empty prompts stay hidden this long so an editor can save them.
pub const PENDING_PROMPT_TTL: Duration = Duration::from_secs(5);

const INVALID_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(thiserror::Error, Debug)]
pub enum LibraryError {
    #[error("file name cannot be empty")]
    EmptyName,
    #[error("file name contains invalid characters")]
    InvalidName,
    #[error("prompt already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("no prompts selected")]
    NothingSelected,
    #[error("no tags given")]
    NoTags,
    #[error("invalid tag '{0}': use 1-10 letters, digits or CJK characters")]
    InvalidTag(String),
    #[error("path is outside the prompts directory: {}", .0.display())]
    OutsideRoot(PathBuf),
    #[error("not a prompt file: {}", .0.display())]
    NotAPrompt(PathBuf),
    #[error("prompt file error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    TagsMeta(#[from] TagsMetaError),
    #[error("failed to watch prompts directory: {0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Default)]
pub struct DeletedPrompts {
    /// Raw and canonical ids of every removed prompt.
    pub ids: HashSet<String>,
    pub files: usize,
}

pub struct PromptLibrary {
    root: PathBuf,
    preview_chars: usize,
    prompts: Vec<PromptEntry>,
    pending: HashMap<String, Instant>,
}

impl PromptLibrary {
    pub fn open(root: impl Into<PathBuf>, preview_chars: usize) -> Result<Self, LibraryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let mut library = Self {
            root,
            preview_chars,
            prompts: Vec::new(),
            pending: HashMap::new(),
        };
        library.refresh();
        Ok(library)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prompts(&self) -> &[PromptEntry] {
        &self.prompts
    }

    pub fn all_tags(&self) -> Vec<String> {
        let tags: BTreeSet<&String> = self.prompts.iter().flat_map(|p| &p.tags).collect();
        tags.into_iter().cloned().collect()
    }

    pub fn refresh(&mut self) -> &[PromptEntry] {
        self.refresh_at(Instant::now())
    }

    fn refresh_at(&mut self, now: Instant) -> &[PromptEntry] {
        let mut still_pending = HashMap::new();
        let mut visible = Vec::new();
        for prompt in index_prompts(&self.root, self.preview_chars) {
            if let Some(created_at) = self.pending.get(&prompt.id) {
                let empty = fs::metadata(&prompt.path).map(|m| m.len() == 0).unwrap_or(true);
                if empty && now.saturating_duration_since(*created_at) < PENDING_PROMPT_TTL {
                    still_pending.insert(prompt.id.clone(), *created_at);
                    continue;
                }
            }
            visible.push(prompt);
        }
        self.pending = still_pending;
        self.prompts = visible;
        tracing::debug!(event_type = "index", count = self.prompts.len(), "prompts indexed");
        &self.prompts
    }

    pub fn search(
        &self,
        query: &str,
        limit: usize,
        favorites: Option<&[String]>,
    ) -> Vec<PromptEntry> {
        match favorites {
            Some(favorites) => {
                let favorites: HashSet<&str> = favorites.iter().map(String::as_str).collect();
                let filtered: Vec<PromptEntry> = self
                    .prompts
                    .iter()
                    .filter(|prompt| favorites.contains(prompt.id.as_str()))
                    .cloned()
                    .collect();
                search_prompts(&filtered, query, limit)
            }
            None => search_prompts(&self.prompts, query, limit),
        }
    }

    pub fn find(&self, id: &str) -> Option<&PromptEntry> {
        self.prompts.iter().find(|prompt| prompt.id == id)
    }

    pub fn set_preview_chars(&mut self, preview_chars: usize) {
        self.preview_chars = preview_chars;
        for prompt in &mut self.prompts {
            prompt.preview = make_preview(&prompt.body, preview_chars);
        }
    }

    pub fn create_prompt_file(&mut self, name: &str) -> Result<PathBuf, LibraryError> {
        let file_name = build_prompt_file_name(name)?;
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(file_name);
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        match created {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LibraryError::AlreadyExists(path));
            }
            Err(err) => return Err(err.into()),
        }
        self.pending
            .insert(path.to_string_lossy().to_string(), Instant::now());
        tracing::info!(event_type = "prompt_created", path = %path.display(), "created prompt file");
        Ok(path)
    }

    /// Deletes the given prompt files and their tag metadata.
    ///
    /// Every path is checked before anything is removed. Once a file is gone,
    /// later failures are logged and the library is still re-indexed.
    pub fn delete_prompt_files(&mut self, paths: &[String]) -> Result<DeletedPrompts, LibraryError> {
        if paths.is_empty() {
            return Err(LibraryError::NothingSelected);
        }
        let root = self.root.canonicalize()?;
        let targets = paths
            .iter()
            .map(|raw| resolve_inside(&root, Path::new(raw)).map(|target| (raw, target)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut deleted = DeletedPrompts::default();
        let mut keys = Vec::new();
        for (raw, target) in targets {
            if let Err(err) = fs::remove_file(&target) {
                if deleted.files == 0 {
                    return Err(err.into());
                }
                tracing::warn!(event_type = "prompt_deleted", path = %target.display(), error = %err, "failed to delete prompt file");
                break;
            }
            tracing::info!(event_type = "prompt_deleted", path = %target.display(), "deleted prompt file");
            keys.push(path_to_key(&root, &target));
            deleted.files += 1;
            deleted.ids.insert(raw.clone());
            deleted.ids.insert(target.to_string_lossy().to_string());
        }

        self.pending.retain(|id, _| !deleted.ids.contains(id));
        if let Err(err) = self.forget_tags(&keys) {
            tracing::warn!(event_type = "prompt_deleted", error = %err, "failed to update tag metadata");
        }

        self.refresh();
        Ok(deleted)
    }

    fn forget_tags(&self, keys: &[String]) -> Result<(), TagsMetaError> {
        let mut meta = load_tags_meta(&self.root)?;
        let before = meta.tags_by_path.len();
        for key in keys {
            meta.tags_by_path.remove(key);
        }
        if meta.tags_by_path.len() != before {
            touch_updated_at(&mut meta);
            save_tags_meta(&self.root, &meta)?;
        }
        Ok(())
    }

    /// Points the library at another directory, creating it if needed.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) -> Result<(), LibraryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::info!(event_type = "index", root = %root.display(), "prompts directory changed");
        self.root = root;
        self.pending.clear();
        self.refresh();
        Ok(())
    }

    /// Canonical path of a prompt file, rejected when it lies outside the root.
    pub fn resolve_prompt_path(&self, path: &str) -> Result<PathBuf, LibraryError> {
        let root = self.root.canonicalize()?;
        let target = resolve_inside(&root, Path::new(path))?;
        if !target.is_file() {
            return Err(LibraryError::NotAPrompt(target));
        }
        Ok(target)
    }

    pub fn update_prompt_tags(
        &mut self,
        paths: &[String],
        add: &[String],
        remove: &[String],
    ) -> Result<(), LibraryError> {
        if paths.is_empty() {
            return Err(LibraryError::NothingSelected);
        }
        let add = normalize_input_tags(add)?;
        let remove = normalize_input_tags(remove)?;
        if add.is_empty() && remove.is_empty() {
            return Err(LibraryError::NoTags);
        }

        let mut meta = load_tags_meta(&self.root)?;
        for raw in paths {
            let key = path_to_key(&self.root, Path::new(raw));
            let base = match meta.tags_by_path.get(&key) {
                Some(existing) => existing.clone(),
                None => self.find(raw).map(|p| p.tags.clone()).unwrap_or_default(),
            };
            let mut next: BTreeSet<String> =
                base.iter().filter_map(|tag| normalize_tag(tag)).collect();
            next.extend(add.iter().cloned());
            for tag in &remove {
                next.remove(tag);
            }
            meta.tags_by_path.insert(key, next.into_iter().collect());
        }

        touch_updated_at(&mut meta);
        save_tags_meta(&self.root, &meta)?;
        self.refresh();
        Ok(())
    }

    /// Writes starter prompts when the directory has none.
    pub fn seed_if_empty(&mut self) -> Result<bool, LibraryError> {
        if !index_prompts(&self.root, self.preview_chars).is_empty() {
            return Ok(false);
        }

        let welcome = self.root.join("Quick start #welcome.md");
        if !welcome.exists() {
            fs::write(
                &welcome,
                "PromptDeck quick start\n\n\
                 - Press the global hotkey to open the launcher.\n\
                 - Type to search; use #tag to filter by tag.\n\
                 - Enter inserts the selected prompt.\n",
            )?;
        }

        let examples = self.root.join("Examples");
        fs::create_dir_all(&examples)?;
        let reply = examples.join("Email reply #email.txt");
        if !reply.exists() {
            fs::write(
                &reply,
                "Reply in a friendly, concise tone.\n\
                 Summarize what they need, confirm the next step, and ask for anything missing.\n",
            )?;
        }

        tracing::info!(event_type = "seed", root = %self.root.display(), "seeded prompts directory");
        self.refresh();
        Ok(true)
    }

    /// Watches the prompts directory; `on_change` runs on the watcher thread.
    pub fn watch<F>(&self, on_change: F) -> Result<RecommendedWatcher, LibraryError>
    where
        F: Fn() + Send + 'static,
    {
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(_) => on_change(),
                Err(err) => tracing::warn!(event_type = "watch", error = %err, "watch error"),
            })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

fn resolve_inside(root: &Path, path: &Path) -> Result<PathBuf, LibraryError> {
    let target = path.canonicalize()?;
    if !target.starts_with(root) {
        return Err(LibraryError::OutsideRoot(target));
    }
    Ok(target)
}

pub fn build_prompt_file_name(input: &str) -> Result<String, LibraryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LibraryError::EmptyName);
    }
    let file_name = if trimmed.to_ascii_lowercase().ends_with(".txt") {
        trimmed.to_string()
    } else {
        format!("{trimmed}.txt")
    };
    if !is_valid_filename(&file_name) {
        return Err(LibraryError::InvalidName);
    }
    Ok(file_name)
}

fn is_valid_filename(name: &str) -> bool {
    if name == "." || name == ".." || name.ends_with('.') || name.ends_with(' ') {
        return false;
    }
    !name.chars().any(|ch| INVALID_FILENAME_CHARS.contains(&ch))
}

fn normalize_input_tags(raw: &[String]) -> Result<Vec<String>, LibraryError> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for token in raw.iter().flat_map(|value| value.split_whitespace()) {
        let token = token.trim_start_matches('#');
        if token.is_empty() {
            continue;
        }
        let tag = normalize_tag(token).ok_or_else(|| LibraryError::InvalidTag(token.to_string()))?;
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    Ok(tags)
}
