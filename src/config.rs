use crate::hotkey::{DEFAULT_HOTKEY, RebindOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECENT_LIMIT: usize = 20;
pub const PREVIEW_CHARS_MIN: u32 = 10;
pub const PREVIEW_CHARS_MAX: u32 = 200;
pub const TOP_TAGS_LIMIT_MIN: u32 = 1;
pub const TOP_TAGS_LIMIT_MAX: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prompts_dir: String,
    pub auto_paste: bool,
    pub append_clipboard: bool,
    pub hotkey: String,
    pub favorites: Vec<String>,
    pub recent_ids: Vec<String>,
    pub recent_enabled: bool,
    pub top_tags_use_results: bool,
    pub top_tags_limit: u32,
    pub show_shortcuts_hint: bool,
    pub preview_chars: u32,
    // Tables go last so the TOML writer emits plain values first.
    pub recent_meta: HashMap<String, i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prompts_dir: String::new(),
            auto_paste: true,
            append_clipboard: false,
            hotkey: DEFAULT_HOTKEY.to_string(),
            favorites: Vec::new(),
            recent_ids: Vec::new(),
            recent_enabled: true,
            top_tags_use_results: false,
            top_tags_limit: 8,
            show_shortcuts_hint: true,
            preview_chars: 50,
            recent_meta: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentState {
    pub recent_ids: Vec<String>,
    pub recent_meta: HashMap<String, i64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl AppConfig {
    pub fn prompts_root(&self) -> PathBuf {
        PathBuf::from(&self.prompts_dir)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Vec<String> {
        if let Some(pos) = self.favorites.iter().position(|item| item == id) {
            self.favorites.remove(pos);
        } else {
            self.favorites.push(id.to_string());
        }
        self.favorites.clone()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|item| item == id)
    }

    pub fn push_recent(&mut self, id: &str, now_ms: i64) -> RecentState {
        self.recent_ids.retain(|item| item != id);
        self.recent_ids.insert(0, id.to_string());
        self.recent_ids.truncate(RECENT_LIMIT);
        self.recent_meta.insert(id.to_string(), now_ms);
        let keep: HashSet<&String> = self.recent_ids.iter().collect();
        self.recent_meta.retain(|key, _| keep.contains(key));
        self.recent_state()
    }

    pub fn clear_recent(&mut self) -> RecentState {
        self.recent_ids.clear();
        self.recent_meta.clear();
        self.recent_state()
    }

    pub fn recent_state(&self) -> RecentState {
        RecentState {
            recent_ids: self.recent_ids.clone(),
            recent_meta: self.recent_meta.clone(),
        }
    }

    pub fn set_top_tags_limit(&mut self, limit: u32) -> u32 {
        self.top_tags_limit = limit.clamp(TOP_TAGS_LIMIT_MIN, TOP_TAGS_LIMIT_MAX);
        self.top_tags_limit
    }

    pub fn set_preview_chars(&mut self, preview_chars: u32) -> u32 {
        self.preview_chars = clamp_preview_chars(preview_chars);
        self.preview_chars
    }

    /// Drops favorites and recent entries that point at removed prompts.
    pub fn forget_prompts(&mut self, ids: &HashSet<String>) {
        self.favorites.retain(|item| !ids.contains(item));
        self.recent_ids.retain(|item| !ids.contains(item));
        self.recent_meta.retain(|key, _| !ids.contains(key));
    }

    /// Adopts the shortcut a rebind left active. Returns true when the stored
    /// value changed and should be saved.
    pub fn apply_rebind(&mut self, outcome: &RebindOutcome) -> bool {
        if !outcome.succeeded() {
            return false;
        }
        match &outcome.resulting_shortcut {
            Some(shortcut) if *shortcut != self.hotkey => {
                self.hotkey = shortcut.clone();
                true
            }
            _ => false,
        }
    }
}

pub fn clamp_preview_chars(value: u32) -> u32 {
    value.clamp(PREVIEW_CHARS_MIN, PREVIEW_CHARS_MAX)
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("PROMPTDECK_CONFIG") {
        return PathBuf::from(path);
    }
    let mut root = dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    root.push("promptdeck");
    root.push("config.toml");
    root
}

pub fn default_prompts_dir() -> PathBuf {
    let mut root = dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    root.push("PromptDeck");
    root.push("Prompts");
    root
}

pub fn load_or_init() -> Result<AppConfig, ConfigError> {
    load_from(&config_path(), &default_prompts_dir())
}

/// Loads `path`, creating it with defaults when missing. A blank
/// `prompts_dir` is filled with `fallback_dir` and written back.
pub fn load_from(path: &Path, fallback_dir: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        let cfg = AppConfig {
            prompts_dir: fallback_dir.to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        save_to(path, &cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    let mut cfg: AppConfig = toml::from_str(&raw)?;
    if cfg.prompts_dir.trim().is_empty() {
        cfg.prompts_dir = fallback_dir.to_string_lossy().to_string();
        save_to(path, &cfg)?;
    }
    Ok(cfg)
}

pub fn save(cfg: &AppConfig) -> Result<(), ConfigError> {
    save_to(&config_path(), cfg)
}

pub fn save_to(path: &Path, cfg: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{RegistrationError, UnregistrationError};
    use tempfile::TempDir;

    fn outcome(resulting: Option<&str>) -> RebindOutcome {
        RebindOutcome {
            resulting_shortcut: resulting.map(str::to_string),
            registration_error: None,
            registered: true,
            unregistered: true,
            unregistration_error: None,
        }
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let prompts = dir.path().join("prompts");

        let cfg = load_from(&path, &prompts).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.hotkey, "Alt+Space");
        assert_eq!(cfg.prompts_dir, prompts.to_string_lossy());
        assert!(cfg.auto_paste);
        assert_eq!(cfg.preview_chars, 50);
    }

    #[test]
    fn partial_file_fills_defaults_and_blank_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "hotkey = \"Ctrl+Shift+P\"\nprompts_dir = \"  \"\n").unwrap();

        let cfg = load_from(&path, Path::new("/tmp/fallback")).unwrap();
        assert_eq!(cfg.hotkey, "Ctrl+Shift+P");
        assert_eq!(cfg.prompts_dir, "/tmp/fallback");
        assert_eq!(cfg.top_tags_limit, 8);
        assert!(cfg.recent_enabled);

        let reloaded = load_from(&path, Path::new("/elsewhere")).unwrap();
        assert_eq!(reloaded.prompts_dir, "/tmp/fallback");
    }

    #[test]
    fn save_then_load_keeps_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = AppConfig {
            prompts_dir: "/prompts".to_string(),
            ..AppConfig::default()
        };
        cfg.toggle_favorite("/prompts/a.txt");
        cfg.push_recent("/prompts/b.txt", 42);
        save_to(&path, &cfg).unwrap();

        assert_eq!(load_from(&path, Path::new("/unused")).unwrap(), cfg);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "hotkey = [").unwrap();
        assert!(matches!(
            load_from(&path, Path::new("/unused")),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toggle_favorite_adds_then_removes() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.toggle_favorite("a"), vec!["a".to_string()]);
        assert!(cfg.is_favorite("a"));
        assert!(cfg.toggle_favorite("a").is_empty());
    }

    #[test]
    fn push_recent_dedupes_caps_and_prunes_meta() {
        let mut cfg = AppConfig::default();
        for i in 0..25 {
            cfg.push_recent(&format!("p{i}"), i);
        }
        let state = cfg.push_recent("p10", 100);

        assert_eq!(state.recent_ids.len(), RECENT_LIMIT);
        assert_eq!(state.recent_ids[0], "p10");
        assert_eq!(state.recent_ids.iter().filter(|id| *id == "p10").count(), 1);
        assert_eq!(state.recent_meta.get("p10"), Some(&100));
        assert!(!state.recent_meta.contains_key("p0"));
        assert_eq!(state.recent_meta.len(), RECENT_LIMIT);
    }

    #[test]
    fn clear_recent_empties_both() {
        let mut cfg = AppConfig::default();
        cfg.push_recent("a", 1);
        let state = cfg.clear_recent();
        assert!(state.recent_ids.is_empty());
        assert!(state.recent_meta.is_empty());
    }

    #[test]
    fn numeric_settings_are_clamped() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.set_top_tags_limit(0), 1);
        assert_eq!(cfg.set_top_tags_limit(99), 20);
        assert_eq!(cfg.set_preview_chars(3), PREVIEW_CHARS_MIN);
        assert_eq!(cfg.set_preview_chars(500), PREVIEW_CHARS_MAX);
        assert_eq!(cfg.set_preview_chars(80), 80);
    }

    #[test]
    fn forget_prompts_drops_references() {
        let mut cfg = AppConfig::default();
        cfg.toggle_favorite("a");
        cfg.toggle_favorite("b");
        cfg.push_recent("a", 1);
        cfg.push_recent("c", 2);

        let removed: HashSet<String> = ["a".to_string()].into_iter().collect();
        cfg.forget_prompts(&removed);
        assert_eq!(cfg.favorites, vec!["b".to_string()]);
        assert_eq!(cfg.recent_ids, vec!["c".to_string()]);
        assert!(!cfg.recent_meta.contains_key("a"));
    }

    #[test]
    fn apply_rebind_persists_only_successful_changes() {
        let mut cfg = AppConfig::default();
        assert!(cfg.apply_rebind(&outcome(Some("Alt+P"))));
        assert_eq!(cfg.hotkey, "Alt+P");
        assert!(!cfg.apply_rebind(&outcome(Some("Alt+P"))));

        let failed = RebindOutcome {
            resulting_shortcut: Some("Alt+P".to_string()),
            registration_error: Some(RegistrationError::Conflict("Ctrl+K".to_string())),
            registered: false,
            unregistered: false,
            unregistration_error: None,
        };
        assert!(!cfg.apply_rebind(&failed));
        assert_eq!(cfg.hotkey, "Alt+P");
    }

    #[test]
    fn apply_rebind_accepts_leaked_outcome() {
        let mut cfg = AppConfig::default();
        let leaked = RebindOutcome {
            unregistered: false,
            unregistration_error: Some(UnregistrationError::NotRegistered(
                "Alt+Space".to_string(),
            )),
            ..outcome(Some("Ctrl+Alt+P"))
        };
        assert!(cfg.apply_rebind(&leaked));
        assert_eq!(cfg.hotkey, "Ctrl+Alt+P");
    }
}
