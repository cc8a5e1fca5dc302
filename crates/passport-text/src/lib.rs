//! passport-text: lexical extraction of @mentions and #hashtags
//!
//! A token is `@` or `#` followed by one or more ASCII word characters
//! (`[A-Za-z0-9_]`). Scanning is a single left-to-right pass and is total:
//! any input, including empty or adversarially long strings, yields a result.
//!
//! All `index` values and segment ranges count Unicode scalar values (Rust
//! `char`s) from the start of the input, not bytes.

pub mod entities;
pub mod segment;

/// Turns ascending byte offsets into char offsets in a single forward pass.
pub(crate) struct CharOffsets<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    /// Char offset of `byte`, which must lie on a char boundary at or after
    /// the previous call.
    pub(crate) fn at(&mut self, byte: usize) -> usize {
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

pub use entities::{
    extract_hashtags, extract_mentions, resolve_mentions, unique_usernames, Hashtag, Mention,
    UserDirectory,
};
pub use segment::{segment, Segment};
