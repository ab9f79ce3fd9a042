//! One-line text previews for logs and history listings.
//!
//! Previews count Unicode scalar values, never bytes, so cutting a long
//! message cannot land inside a multibyte character.

use crate::session::Turn;

/// Default preview width for log fields.
pub const LOG_PREVIEW_CHARS: usize = 120;

/// Flatten `text` to one line and keep at most `max_chars` characters.
///
/// Whitespace runs, newlines included, collapse to a single space. A cut
/// preview ends with `…`.
///
/// # Examples
///
/// ```
/// use parley::utils::string::preview;
///
/// assert_eq!(preview("see you\n  at 9", 20), "see you at 9");
/// assert_eq!(preview("see you at 9", 7), "see you…");
/// ```
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Preview of a stored turn: its text plus any tool calls it carries.
///
/// Tool results are prefixed with the id of the call they answer.
pub fn turn_preview(turn: &Turn, max_chars: usize) -> String {
    let mut line = match &turn.tool_call_id {
        Some(id) if turn.is_tool_result() => format!("[{}] {}", id, preview(&turn.text(), max_chars)),
        _ => preview(&turn.text(), max_chars),
    };
    if let Some(calls) = &turn.tool_calls {
        for call in calls {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!(
                "-> {}({})",
                call.name,
                preview(&call.arguments, max_chars)
            ));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    #[test]
    fn test_preview_flattens_lines() {
        assert_eq!(preview("[FROM: amy(1)]\n[BODY: hi]", 100), "[FROM: amy(1)] [BODY: hi]");
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let p = preview("早上好，今天开会吗", 4);
        assert_eq!(p, "早上好，…");
        assert_eq!(preview("早上好", 3), "早上好");
    }

    #[test]
    fn test_turn_preview_tool_call() {
        let turn = Turn::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "change_model", r#"{"provider":"glm"}"#)],
        );
        assert_eq!(turn_preview(&turn, 50), r#"-> change_model({"provider":"glm"})"#);
    }

    #[test]
    fn test_turn_preview_tool_result() {
        let turn = Turn::tool_result("c1", "Model switched to glm");
        assert_eq!(turn_preview(&turn, 9), "[c1] Model swi…");
    }
}
