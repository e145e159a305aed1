//! MIME classification from a file's leading bytes.
//!
//! Detection goes through the `infer` crate's magic-byte tables. Content that
//! carries no magic signature falls back to a cheap text check, then to
//! `application/octet-stream`.

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const PLAIN_TEXT: &str = "text/plain";
pub const EMPTY: &str = "application/x-empty";

/// Pluggable classification so hosts without a signature database, or tests,
/// can substitute their own.
pub trait MimeClassifier: Send + Sync {
    fn classify(&self, head: &[u8]) -> String;
}

/// Magic-byte classifier with text and binary fallbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicClassifier;

impl MimeClassifier for MagicClassifier {
    fn classify(&self, head: &[u8]) -> String {
        if head.is_empty() {
            return EMPTY.to_string();
        }
        if let Some(kind) = infer::get(head) {
            return kind.mime_type().to_string();
        }
        if looks_like_text(head) {
            PLAIN_TEXT.to_string()
        } else {
            OCTET_STREAM.to_string()
        }
    }
}

/// Classifier that always answers the same type.
#[derive(Debug, Clone)]
pub struct FixedClassifier(pub String);

impl Default for FixedClassifier {
    fn default() -> Self {
        FixedClassifier(OCTET_STREAM.to_string())
    }
}

impl MimeClassifier for FixedClassifier {
    fn classify(&self, _head: &[u8]) -> String {
        self.0.clone()
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // The head may end in the middle of a multi-byte sequence.
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > head.len(),
    }
}
