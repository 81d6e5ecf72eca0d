use crate::tags_meta::{TagsMeta, load_tags_meta, resolve_tags_for_path};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

static BRACKET_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());

const MAX_TAG_CHARS: usize = 10;
const TITLE_BONUS: i32 = 10_000;
const TAG_BONUS: i32 = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub path: String,
}

pub fn index_prompts(dir: &Path, preview_chars: usize) -> Vec<PromptEntry> {
    let meta = match load_tags_meta(dir) {
        Ok(meta) => meta,
        Err(err) => {
            tracing::warn!(event_type = "index", path = %dir.display(), error = %err, "ignoring tag metadata");
            TagsMeta::default()
        }
    };

    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && is_prompt_file(entry.path()))
        .filter_map(|entry| read_prompt(entry.path(), dir, &meta, preview_chars))
        .collect()
}

pub fn read_prompt(
    path: &Path,
    root: &Path,
    meta: &TagsMeta,
    preview_chars: usize,
) -> Option<PromptEntry> {
    let body = fs::read_to_string(path).ok()?;
    let title = path.file_stem()?.to_string_lossy().to_string();

    let mut fallback = extract_title_tags(&title);
    fallback.extend(extract_path_tags(path, root));
    let mut tags = normalize_tags(resolve_tags_for_path(meta, root, path, fallback));
    tags.sort();

    let path_string = path.to_string_lossy().to_string();
    Some(PromptEntry {
        id: path_string.clone(),
        title,
        preview: make_preview(&body, preview_chars),
        body,
        tags,
        path: path_string,
    })
}

pub fn is_prompt_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "md" | "txt"))
}

/// Whitespace-collapsed body, cut at `max_chars` characters with `...` appended.
pub fn make_preview(body: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut preview: String = collapsed.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

fn extract_title_tags(title: &str) -> Vec<String> {
    let bracketed = BRACKET_TAG_RE
        .captures_iter(title)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str());
    let hashed = title
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('#'));
    bracketed.chain(hashed).filter_map(normalize_tag).collect()
}

fn extract_path_tags(path: &Path, root: &Path) -> Vec<String> {
    let Some(parent) = path.strip_prefix(root).ok().and_then(Path::parent) else {
        return Vec::new();
    };
    parent
        .components()
        .filter_map(|component| normalize_tag(&component.as_os_str().to_string_lossy()))
        .collect()
}

/// Accepts 1-10 ASCII alphanumeric or CJK characters, lowercased.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TAG_CHARS {
        return None;
    }
    if !trimmed.chars().all(is_allowed_tag_char) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

fn is_allowed_tag_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ('\u{4E00}'..='\u{9FFF}').contains(&ch)
}

fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|tag| normalize_tag(tag))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

pub fn search_prompts(prompts: &[PromptEntry], query: &str, limit: usize) -> Vec<PromptEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return prompts.iter().take(limit).cloned().collect();
    }

    let (tags, terms) = split_query(&query);
    let mut results: Vec<(i32, &PromptEntry)> = prompts
        .iter()
        .filter(|prompt| tags_match(prompt, &tags))
        .filter_map(|prompt| {
            let score = if terms.is_empty() {
                Some(0)
            } else {
                score_prompt(prompt, &terms)
            };
            score.map(|score| (score, prompt))
        })
        .collect();

    results.sort_by_key(|(score, _)| *score);
    results
        .into_iter()
        .take(limit)
        .map(|(_, prompt)| prompt.clone())
        .collect()
}

fn split_query(query: &str) -> (Vec<String>, Vec<String>) {
    let mut tags = Vec::new();
    let mut terms = Vec::new();
    for token in query.split_whitespace() {
        match token.strip_prefix('#') {
            Some(tag) => tags.extend(normalize_tag(tag)),
            None => terms.push(token.to_string()),
        }
    }
    (tags, terms)
}

fn tags_match(prompt: &PromptEntry, tags: &[String]) -> bool {
    tags.iter().all(|tag| prompt.tags.contains(tag))
}

fn score_prompt(prompt: &PromptEntry, terms: &[String]) -> Option<i32> {
    let tag_text = prompt.tags.join(" ").to_lowercase();
    let title_text = prompt.title.to_lowercase();
    let full_text = format!(
        "{} {} {} {}",
        prompt.title, prompt.preview, prompt.body, tag_text
    )
    .to_lowercase();

    let mut best = score_terms(&full_text, terms)?;
    if let Some(score) = score_terms(&title_text, terms) {
        best = best.min(score - TITLE_BONUS);
    }
    if let Some(score) = score_terms(&tag_text, terms) {
        best = best.min(score - TAG_BONUS);
    }
    Some(best)
}

fn score_terms(text: &str, terms: &[String]) -> Option<i32> {
    terms.iter().map(|term| score_match(text, term)).sum()
}

/// Lower is better. `None` when `term` is not an in-order subsequence of `text`.
fn score_match(text: &str, term: &str) -> Option<i32> {
    if term.is_empty() {
        return Some(0);
    }

    let mut score: i32 = 0;
    if let Some(index) = text.find(term) {
        score -= 200 + index as i32;
        if is_word_boundary(text, index) {
            score -= 30;
        }
        if is_word_boundary(text, index + term.len()) {
            score -= 10;
        }
    }

    let mut last_pos: i32 = -1;
    let mut start = 0usize;
    for ch in term.chars() {
        let offset = text[start..].find(ch)?;
        let pos = start + offset;
        score += pos as i32 - last_pos;
        last_pos = pos as i32;
        start = pos + ch.len_utf8();
    }
    Some(score)
}

fn is_word_boundary(text: &str, index: usize) -> bool {
    if index == 0 || index >= text.len() {
        return true;
    }
    let prev_is_word = text[..index]
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric);
    let next_is_word = text[index..]
        .chars()
        .next()
        .is_some_and(char::is_alphanumeric);
    !prev_is_word || !next_is_word
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(title: &str, body: &str, tags: &[&str]) -> PromptEntry {
        let path = format!("/prompts/{title}.txt");
        PromptEntry {
            id: path.clone(),
            title: title.to_string(),
            body: body.to_string(),
            preview: make_preview(body, 50),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            path,
        }
    }

    #[test]
    fn normalize_tag_accepts_ascii_and_cjk() {
        assert_eq!(normalize_tag("Tag1"), Some("tag1".to_string()));
        assert_eq!(normalize_tag("标签1"), Some("标签1".to_string()));
    }

    #[test]
    fn normalize_tag_rejects_symbols_spaces_and_length() {
        for raw in ["tag-1", "tag_1", "tag!", "tag 1", "", "12345678901"] {
            assert_eq!(normalize_tag(raw), None, "{raw}");
        }
    }

    #[test]
    fn preview_collapses_whitespace_and_truncates() {
        assert_eq!(make_preview("a\n\n  b\tc", 50), "a b c");
        assert_eq!(make_preview("abc def", 3), "abc...");
        assert_eq!(make_preview("abc def", 4), "abc ...");
        assert_eq!(make_preview("中文测试内容", 2), "中文...");
        assert_eq!(make_preview("anything", 0), "");
    }

    #[test]
    fn title_tags_come_from_brackets_and_hashes() {
        let mut tags = extract_title_tags("[Mail] reply #work #bad-tag");
        tags.sort();
        assert_eq!(tags, vec!["mail".to_string(), "work".to_string()]);
    }

    #[test]
    fn split_query_separates_valid_tags() {
        let (tags, terms) = split_query("#tag #tag-1 foo");
        assert_eq!(tags, vec!["tag".to_string()]);
        assert_eq!(terms, vec!["foo".to_string()]);
    }

    #[test]
    fn index_reads_md_and_txt_with_folder_tags() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Work")).unwrap();
        fs::write(root.join("Work").join("reply #mail.TXT"), "Dear   team,\nthanks").unwrap();
        fs::write(root.join("notes.md"), "plain").unwrap();
        fs::write(root.join("image.png"), "binary").unwrap();

        let mut prompts = index_prompts(root, 50);
        prompts.sort_by(|a, b| a.title.cmp(&b.title));

        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].title, "notes");
        assert!(prompts[0].tags.is_empty());
        assert_eq!(prompts[1].title, "reply #mail");
        assert_eq!(prompts[1].tags, vec!["mail".to_string(), "work".to_string()]);
        assert_eq!(prompts[1].preview, "Dear team, thanks");
        assert_eq!(prompts[1].id, prompts[1].path);
    }

    #[test]
    fn index_prefers_tag_metadata() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("draft #old.txt"), "x").unwrap();
        let mut meta = TagsMeta::default();
        meta.tags_by_path
            .insert("draft #old.txt".to_string(), vec!["New".to_string()]);
        crate::tags_meta::save_tags_meta(root, &meta).unwrap();

        let prompts = index_prompts(root, 50);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].tags, vec!["new".to_string()]);
    }

    #[test]
    fn empty_query_returns_first_entries() {
        let prompts = vec![entry("a", "", &[]), entry("b", "", &[]), entry("c", "", &[])];
        let results = search_prompts(&prompts, "   ", 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "a");
    }

    #[test]
    fn tag_filters_use_and_logic() {
        let prompts = vec![
            entry("one", "", &["a", "b"]),
            entry("two", "", &["a"]),
            entry("three", "", &["c"]),
        ];
        let titles = |query: &str| -> Vec<String> {
            search_prompts(&prompts, query, 10)
                .into_iter()
                .map(|p| p.title)
                .collect()
        };
        assert_eq!(titles("#a #b"), vec!["one".to_string()]);
        assert_eq!(titles("#A").len(), 2);
        assert!(titles("#a #c").is_empty());
    }

    #[test]
    fn title_match_outranks_body_match() {
        let prompts = vec![
            entry("summary", "write an email to the client", &[]),
            entry("email reply", "short answer", &[]),
        ];
        let results = search_prompts(&prompts, "email", 10);
        assert_eq!(results[0].title, "email reply");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn non_subsequence_terms_are_dropped() {
        let prompts = vec![entry("alpha", "beta", &[])];
        assert!(search_prompts(&prompts, "zzz", 10).is_empty());
        assert_eq!(search_prompts(&prompts, "apa", 10).len(), 1);
    }

    #[test]
    fn scoring_handles_multibyte_text() {
        assert!(score_match("中文测试", "测").is_some());
        assert!(score_match("中文测试", "试文").is_none());
        assert!(!is_word_boundary("中文测试", 3));
        assert!(is_word_boundary("a b", 2));
    }
}
