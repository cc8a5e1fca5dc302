//! Mention and hashtag records

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CharOffsets;

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("mention pattern is valid"));

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z0-9_]+)").expect("hashtag pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    /// Empty until resolved against a [`UserDirectory`]
    pub user_id: String,
    pub username: String,
    /// Char offset of the `@`
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    /// Spelling of the first occurrence
    pub tag: String,
    /// Char offset of the first `#`
    pub index: usize,
}

/// Every `@username` in scan order. Repeats are kept.
pub fn extract_mentions(text: &str) -> Vec<Mention> {
    let mut offsets = CharOffsets::new(text);
    MENTION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some(Mention {
                user_id: String::new(),
                username: name.as_str().to_string(),
                index: offsets.at(whole.start()),
            })
        })
        .collect()
}

/// First occurrence of each `#tag`, compared case-insensitively, in scan order.
pub fn extract_hashtags(text: &str) -> Vec<Hashtag> {
    let mut seen = HashSet::new();
    let mut offsets = CharOffsets::new(text);
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let tag = caps.get(1)?.as_str();
            let index = offsets.at(whole.start());
            seen.insert(tag.to_ascii_lowercase()).then(|| Hashtag {
                tag: tag.to_string(),
                index,
            })
        })
        .collect()
}

/// Lookup of usernames to user ids, provided by the account service.
pub trait UserDirectory {
    fn user_id(&self, username: &str) -> Option<String>;
}

impl UserDirectory for HashMap<String, String> {
    fn user_id(&self, username: &str) -> Option<String> {
        self.get(username).cloned()
    }
}

/// Fill in `user_id` for mentions the directory knows and drop the rest.
pub fn resolve_mentions(mentions: Vec<Mention>, directory: &dyn UserDirectory) -> Vec<Mention> {
    let total = mentions.len();
    let resolved: Vec<Mention> = mentions
        .into_iter()
        .filter_map(|mut m| {
            m.user_id = directory.user_id(&m.username)?;
            Some(m)
        })
        .collect();
    if resolved.len() < total {
        tracing::debug!(
            dropped = total - resolved.len(),
            "mentions without a matching user"
        );
    }
    resolved
}

/// Distinct usernames, case-insensitive, first spelling kept.
pub fn unique_usernames(mentions: &[Mention]) -> Vec<String> {
    let mut seen = HashSet::new();
    mentions
        .iter()
        .filter(|m| seen.insert(m.username.to_ascii_lowercase()))
        .map(|m| m.username.clone())
        .collect()
}
