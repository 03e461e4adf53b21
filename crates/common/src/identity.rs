//! Sender identity normalization.
//!
//! Transports hand us phone numbers and chat ids in whatever shape the user
//! typed or pasted them, sometimes wrapped in bidirectional isolate marks.
//! Every store indexes by the digit-only form produced here.

/// Canonicalize a raw sender identifier to its digit-only key.
///
/// Drops every character that is not an ASCII decimal digit, including a
/// leading `+`, separators and Unicode direction marks.
pub fn normalize_sender(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}
