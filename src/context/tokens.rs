//! Token estimation.
//!
//! A deterministic pure function used to gate compaction, not for billing.
//! ASCII characters are charged a quarter token, everything else (CJK and
//! other wide scripts) two thirds. Rounding happens once per string so the
//! estimate is monotonic in input length.

use crate::message::Message;

/// Per-message framing overhead (role, separators).
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count of a piece of text.
pub fn estimate_text(text: &str) -> usize {
    let mut ascii = 0usize;
    let mut wide = 0usize;
    for ch in text.chars() {
        if ch.is_ascii() {
            ascii += 1;
        } else {
            wide += 1;
        }
    }
    ascii.div_ceil(4) + (wide * 2).div_ceil(3)
}

/// Estimate the token count of a message, including its tool calls.
pub fn estimate_message(message: &Message) -> usize {
    let mut total = MESSAGE_OVERHEAD + estimate_text(&message.content);
    for call in &message.tool_calls {
        total += estimate_text(&call.function.name);
        total += estimate_text(&call.function.arguments);
    }
    total
}
