//! Split text into plain, mention and hashtag runs for highlighted rendering

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CharOffsets;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@#][A-Za-z0-9_]+").expect("token pattern is valid"));

/// `range` is in chars, matching [`crate::Mention::index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String, range: Range<usize> },
    /// `text` includes the leading `@`
    Mention { text: String, range: Range<usize> },
    /// `text` includes the leading `#`
    Hashtag { text: String, range: Range<usize> },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Text { text, .. }
            | Segment::Mention { text, .. }
            | Segment::Hashtag { text, .. } => text,
        }
    }

    pub fn range(&self) -> Range<usize> {
        match self {
            Segment::Text { range, .. }
            | Segment::Mention { range, .. }
            | Segment::Hashtag { range, .. } => range.clone(),
        }
    }
}

/// Gap-free segmentation of `text`. Every hashtag occurrence gets its own
/// segment, repeats included.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut offsets = CharOffsets::new(text);
    let mut cursor = 0;
    let mut cursor_char = 0;

    for m in TOKEN_RE.find_iter(text) {
        let start = offsets.at(m.start());
        if m.start() > cursor {
            out.push(Segment::Text {
                text: text[cursor..m.start()].to_string(),
                range: cursor_char..start,
            });
        }
        // tokens are ASCII, one char per byte
        let end = start + m.len();
        let token = m.as_str().to_string();
        let range = start..end;
        out.push(if token.starts_with('@') {
            Segment::Mention { text: token, range }
        } else {
            Segment::Hashtag { text: token, range }
        });
        cursor = m.end();
        cursor_char = offsets.at(cursor);
    }

    if cursor < text.len() {
        let end = offsets.at(text.len());
        out.push(Segment::Text {
            text: text[cursor..].to_string(),
            range: cursor_char..end,
        });
    }
    out
}
