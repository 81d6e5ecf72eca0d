use crate::prompts::PromptEntry;
use serde::Serialize;
use std::collections::HashMap;

const MAX_TAG_SUGGESTIONS: usize = 8;

pub fn normalize_tag_token(tag: &str) -> String {
    format!("#{}", tag.to_lowercase())
}

pub fn has_query(query: &str) -> bool {
    !query.trim().is_empty()
}

pub fn has_tag_filters(query: &str) -> bool {
    query
        .split_whitespace()
        .any(|part| part.starts_with('#') && part.len() > 1)
}

pub fn has_any_filters(query: &str, show_favorites: bool) -> bool {
    has_query(query) || show_favorites
}

pub fn is_tag_active(query: &str, tag: &str) -> bool {
    let token = normalize_tag_token(tag);
    query
        .split_whitespace()
        .any(|part| part.to_lowercase() == token)
}

/// Replaces the last query token with `#tag`.
pub fn apply_tag_suggestion(query: &str, tag: &str) -> String {
    let mut parts: Vec<&str> = query.split_whitespace().collect();
    let token = format!("#{tag}");
    parts.pop();
    parts.push(&token);
    parts.join(" ")
}

pub fn clear_tag_filters(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|part| !part.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn toggle_tag_filter(query: &str, tag: &str) -> String {
    let token = normalize_tag_token(tag);
    let parts: Vec<&str> = query.split_whitespace().collect();
    let active = parts.iter().any(|part| part.to_lowercase() == token);
    let mut next: Vec<&str> = parts
        .into_iter()
        .filter(|part| part.to_lowercase() != token)
        .collect();
    if !active {
        next.push(&token);
    }
    next.join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentItem<'a> {
    pub prompt: &'a PromptEntry,
    pub index: usize,
}

/// Recent prompts in recent order, with their position in `prompts`. Unknown ids are skipped.
pub fn build_recent_list<'a>(
    prompts: &'a [PromptEntry],
    recent_ids: &[String],
) -> Vec<RecentItem<'a>> {
    let by_id: HashMap<&str, usize> = prompts
        .iter()
        .enumerate()
        .map(|(index, prompt)| (prompt.id.as_str(), index))
        .collect();
    recent_ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|&index| RecentItem {
            prompt: &prompts[index],
            index,
        })
        .collect()
}

pub fn tag_suggestions<'a>(input: &str, tags: &'a [String]) -> Vec<&'a str> {
    let Some(keyword) = input
        .split_whitespace()
        .next_back()
        .and_then(|last| last.strip_prefix('#'))
    else {
        return Vec::new();
    };
    let keyword = keyword.to_lowercase();
    tags.iter()
        .filter(|tag| tag.to_lowercase().starts_with(&keyword))
        .take(MAX_TAG_SUGGESTIONS)
        .map(String::as_str)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

pub fn build_top_tags(prompts: &[PromptEntry], limit: usize) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in prompts.iter().flat_map(|prompt| &prompt.tags) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }
    let mut top: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top.truncate(limit);
    top
}
