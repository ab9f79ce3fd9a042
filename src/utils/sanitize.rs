//! Reply sanitization.
//!
//! Strips reasoning blocks and leaked speaker labels from model output
//! before it is delivered to the platform. The stored assistant turn keeps
//! the raw text.

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?(</think>|$)").unwrap());

static FROM_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[FROM:[^\]]*\]\s*").unwrap());

static BODY_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*\[BODY:\s*(.*)\]\s*$").unwrap());

/// Clean a model reply for delivery.
///
/// 1. Remove `<think>…</think>` blocks, including an unterminated one.
/// 2. Remove `[FROM: …]` labels and unwrap a `[BODY: …]` label wrapping
///    the whole reply. Brackets inside the body are kept.
/// 3. Trim surrounding whitespace.
///
/// # Example
/// ```
/// use parley::utils::sanitize::clean_reply;
///
/// assert_eq!(clean_reply("<think>plan</think>\nHi!"), "Hi!");
/// assert_eq!(clean_reply("[FROM: bot(0)] [BODY: sure]"), "sure");
/// ```
pub fn clean_reply(raw: &str) -> String {
    let out = THINK_BLOCK_RE.replace_all(raw, "");
    let out = FROM_LABEL_RE.replace_all(&out, "");
    let out = BODY_LABEL_RE.replace_all(&out, "$1");
    out.trim().to_string()
}
