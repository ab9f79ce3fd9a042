//! Context compaction for long conversations.
//!
//! Three mechanisms keep a conversation inside the model's context window:
//!
//! - **Summarize**: when the turn count exceeds the summarize threshold, the
//!   oldest block of non-system turns is folded into a single `[MEMORANDUM]`
//!   system turn written by a JSON-output model. An existing memorandum is
//!   folded into the next one, so a conversation holds at most one.
//! - **Anchor**: when the turn count exceeds the anchor threshold, an
//!   identity reminder is inserted before the latest user turn of the
//!   outbound request only. Stored history never contains it.
//! - **Truncate**: when a response reports more tokens than
//!   `floor(context_window * max_token_threshold)`, the oldest half of the
//!   turns is deleted, except system turns.
//!
//! The block selection and rewriting helpers are pure functions over
//! `&[Turn]`; [`Compactor`] wires them to configuration and the summarizer.

use std::collections::HashSet;
use std::ops::Range;

use tracing::{debug, info, warn};

use crate::config::{CompactionConfig, PromptConfig};
use crate::providers::{
    Capability, ChatOptions, LLMProvider, ModelDescriptor, ModelRegistry, Usage,
};
use crate::session::{Role, Turn};

/// Content prefix of memorandum turns.
pub const MEMORANDUM_TAG: &str = "[MEMORANDUM]";

/// Select the block to fold into a memorandum.
///
/// Returns `None` unless `turns.len() > threshold`. The block starts after
/// the leading system prompt and spans any previous memoranda plus
/// `floor(threshold / 2)` turns, extended over any tool results answering
/// calls inside it.
///
/// # Examples
///
/// ```
/// use parley::agent::compaction::summary_block;
/// use parley::session::Turn;
///
/// let mut turns = vec![Turn::system("sys")];
/// turns.extend((0..10).map(|i| Turn::user(&i.to_string())));
/// assert_eq!(summary_block(&turns, 10), Some(1..6));
/// assert_eq!(summary_block(&turns[..10], 10), None);
/// ```
pub fn summary_block(turns: &[Turn], threshold: usize) -> Option<Range<usize>> {
    if turns.len() <= threshold {
        return None;
    }
    let size = threshold / 2;
    if size == 0 {
        return None;
    }
    let start = turns
        .iter()
        .position(|t| !t.is_system() || is_memorandum(t))?;
    let mut end = start;
    while end < turns.len() && is_memorandum(&turns[end]) {
        end += 1;
    }
    end = (end + size).min(turns.len());
    while end < turns.len() && turns[end].is_tool_result() {
        end += 1;
    }
    Some(start..end)
}

/// Replace `block` with a single memorandum turn.
pub fn replace_with_memorandum(turns: &mut Vec<Turn>, block: Range<usize>, summary: &str) {
    let memo = Turn::system(&format!("{} {}", MEMORANDUM_TAG, summary.trim()));
    turns.splice(block, std::iter::once(memo));
}

/// Whether `turn` is a memorandum produced by summarization.
pub fn is_memorandum(turn: &Turn) -> bool {
    turn.role == Role::System && turn.text().starts_with(MEMORANDUM_TAG)
}

/// Outbound view with the identity anchor inserted before the last user turn.
///
/// Injects at most once: if an identical anchor turn is already present,
/// or there is no user turn, the view is returned unchanged.
pub fn with_anchor(turns: &[Turn], anchor: &str) -> Vec<Turn> {
    let mut view = turns.to_vec();
    if anchor.trim().is_empty() || view.iter().any(|t| t.is_system() && t.text() == anchor) {
        return view;
    }
    if let Some(pos) = view.iter().rposition(|t| t.role == Role::User) {
        view.insert(pos, Turn::system(anchor));
    }
    view
}

/// Drop tool results whose originating call is not in the view.
///
/// Truncation and summarization can remove an assistant turn while a later
/// tool result survives; endpoints reject such orphans.
pub fn drop_orphan_tool_results(turns: &[Turn]) -> Vec<Turn> {
    let mut open_calls: HashSet<&str> = HashSet::new();
    let mut view = Vec::with_capacity(turns.len());
    for turn in turns {
        if let Some(calls) = &turn.tool_calls {
            open_calls.extend(calls.iter().map(|c| c.id.as_str()));
        }
        if turn.is_tool_result() {
            let answered = turn
                .tool_call_id
                .as_deref()
                .is_some_and(|id| open_calls.contains(id));
            if !answered {
                continue;
            }
        }
        view.push(turn.clone());
    }
    view
}

/// Delete the oldest `len / 2` turns, keeping system turns in place.
///
/// Returns the number of turns removed.
pub fn truncate_oldest_half(turns: &mut Vec<Turn>) -> usize {
    let cutoff = turns.len() / 2;
    let before = turns.len();
    let mut index = 0;
    turns.retain(|turn| {
        let keep = index >= cutoff || turn.is_system();
        index += 1;
        keep
    });
    before - turns.len()
}

/// Whether reported usage exceeds `floor(context_window * fraction)`.
pub fn over_token_budget(usage: &Usage, model: &ModelDescriptor, fraction: f64) -> bool {
    u64::from(usage.total_tokens) > model.token_budget(fraction)
}

/// Build a "role: content" transcript for the summarizer.
///
/// # Examples
///
/// ```
/// use parley::agent::compaction::build_summary_transcript;
/// use parley::session::Turn;
///
/// let turns = vec![Turn::user("Hello"), Turn::assistant("Hi there!")];
/// let transcript = build_summary_transcript(&turns);
/// assert!(transcript.contains("user: Hello"));
/// assert!(transcript.contains("assistant: Hi there!"));
/// ```
pub fn build_summary_transcript(turns: &[Turn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        let text = turn.text();
        if let Some(calls) = &turn.tool_calls {
            for call in calls {
                transcript.push_str(&format!(
                    "{} (tool call {}): {}\n",
                    turn.role, call.name, call.arguments
                ));
            }
        }
        if !text.trim().is_empty() {
            transcript.push_str(&format!("{}: {}\n", turn.role, text));
        }
    }
    transcript
}

/// Applies the compaction rules with configured thresholds and prompts.
#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactionConfig,
    anchor_prompt: String,
    summary_prompt: String,
}

impl Compactor {
    pub fn new(config: CompactionConfig, prompts: &PromptConfig) -> Self {
        Self {
            config,
            anchor_prompt: prompts.anchor.clone(),
            summary_prompt: prompts.summary.clone(),
        }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Fold the oldest block into a memorandum if over the threshold.
    ///
    /// A summarizer failure leaves `turns` untouched; the next round will
    /// try again. Returns whether the sequence was compacted.
    pub async fn summarize_if_needed(
        &self,
        turns: &mut Vec<Turn>,
        provider: &dyn LLMProvider,
        registry: &ModelRegistry,
    ) -> bool {
        let Some(block) = summary_block(turns, self.config.summarize_threshold) else {
            return false;
        };
        let Some(model) = registry.select(Capability::JsonOutput) else {
            warn!("Summarization skipped: no json-output model configured");
            return false;
        };

        let request = vec![
            Turn::system(&self.summary_prompt),
            Turn::user(&build_summary_transcript(&turns[block.clone()])),
        ];
        let response = match provider
            .chat(&model, request, vec![], ChatOptions::new().with_json_output())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, model = %model.name, "Summarization failed, continuing uncompacted");
                return false;
            }
        };
        if response.content.trim().is_empty() {
            warn!(model = %model.name, "Summarizer returned no content");
            return false;
        }

        let folded = block.len();
        replace_with_memorandum(turns, block, &response.content);
        info!(folded, remaining = turns.len(), "Conversation summarized into memorandum");
        true
    }

    /// The outbound view of `turns`: orphan tool results removed and the
    /// identity anchor injected when the conversation is long.
    pub fn project(&self, turns: &[Turn]) -> Vec<Turn> {
        let view = drop_orphan_tool_results(turns);
        if turns.len() > self.config.anchor_threshold {
            debug!(turns = turns.len(), "Injecting identity anchor");
            with_anchor(&view, &self.anchor_prompt)
        } else {
            view
        }
    }

    /// Truncate `turns` if the reported usage exceeds the model's budget.
    ///
    /// Returns the number of turns removed.
    pub fn truncate_if_over_budget(
        &self,
        turns: &mut Vec<Turn>,
        usage: Option<&Usage>,
        model: &ModelDescriptor,
    ) -> usize {
        let Some(usage) = usage else {
            return 0;
        };
        if !over_token_budget(usage, model, self.config.max_token_threshold) {
            return 0;
        }
        let removed = truncate_oldest_half(turns);
        info!(
            total_tokens = usage.total_tokens,
            budget = model.token_budget(self.config.max_token_threshold),
            removed,
            "Token budget exceeded, oldest turns truncated"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParleyError, Result};
    use crate::providers::{LLMResponse, ToolDefinition};
    use crate::session::ToolCall;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn users(n: usize) -> Vec<Turn> {
        (0..n).map(|i| Turn::user(&format!("u{}", i))).collect()
    }

    fn with_system(n: usize) -> Vec<Turn> {
        let mut turns = vec![Turn::system("sys")];
        turns.extend(users(n - 1));
        turns
    }

    struct Summarizer {
        reply: Option<&'static str>,
        requests: Mutex<Vec<(Vec<Turn>, bool)>>,
    }

    #[async_trait]
    impl LLMProvider for Summarizer {
        async fn chat(
            &self,
            _model: &ModelDescriptor,
            turns: Vec<Turn>,
            _tools: Vec<ToolDefinition>,
            options: ChatOptions,
        ) -> Result<LLMResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((turns, options.json_output));
            self.reply
                .map(LLMResponse::text)
                .ok_or_else(|| ParleyError::Provider("summarizer down".into()))
        }

        fn name(&self) -> &str {
            "summarizer"
        }
    }

    fn json_registry() -> ModelRegistry {
        ModelRegistry::new(vec![ModelDescriptor::new("ds", "http://d", "ds")
            .with_capabilities(&[Capability::Chat, Capability::JsonOutput])])
    }

    fn compactor(summarize: usize, anchor: usize) -> Compactor {
        let config = CompactionConfig {
            summarize_threshold: summarize,
            anchor_threshold: anchor,
            max_token_threshold: 0.8,
        };
        let prompts = PromptConfig {
            anchor: "ANCHOR".into(),
            summary: "SUMMARIZE".into(),
            ..Default::default()
        };
        Compactor::new(config, &prompts)
    }

    // ── summary_block ──────────────────────────────────────────────────

    #[test]
    fn test_summary_block_boundary() {
        assert_eq!(summary_block(&with_system(10), 10), None);
        assert_eq!(summary_block(&with_system(11), 10), Some(1..6));
    }

    #[test]
    fn test_summary_block_folds_previous_memorandum() {
        let mut turns = vec![Turn::system("sys"), Turn::system("[MEMORANDUM] old")];
        turns.extend(users(10));
        assert_eq!(summary_block(&turns, 10), Some(1..7));
    }

    #[test]
    fn test_summary_block_collapses_stacked_memoranda() {
        let mut turns = vec![
            Turn::system("sys"),
            Turn::system("[MEMORANDUM] a"),
            Turn::system("[MEMORANDUM] b"),
        ];
        turns.extend(users(4));
        assert_eq!(summary_block(&turns, 4), Some(1..5));
    }

    #[test]
    fn test_summary_block_keeps_tool_results_with_call() {
        let mut turns = vec![Turn::system("sys"), Turn::user("a")];
        turns.push(Turn::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "t", "{}")],
        ));
        turns.push(Turn::tool_result("c1", "done"));
        turns.extend(users(4));
        // threshold 6: size 3 already covers the call and its result
        assert_eq!(summary_block(&turns, 6), Some(1..4));
        // threshold 5: size 2 -> 1..3, extended over the result to 1..4
        assert_eq!(summary_block(&turns, 5), Some(1..4));
    }

    #[test]
    fn test_replace_with_memorandum() {
        let mut turns = with_system(11);
        replace_with_memorandum(&mut turns, 1..6, "they talked");
        assert_eq!(turns.len(), 7);
        assert!(is_memorandum(&turns[1]));
        assert_eq!(turns[1].text(), "[MEMORANDUM] they talked");
        assert_eq!(turns[2].text(), "u5");
    }

    // ── summarize_if_needed ────────────────────────────────────────────

    #[tokio::test]
    async fn test_summarize_compaction_count() {
        // T + 5 turns -> (T + 5) - floor(T / 2) + 1
        let t = 20;
        let mut turns = with_system(t + 5);
        let provider = Summarizer {
            reply: Some(r#"{"summary":"ok"}"#),
            requests: Mutex::new(Vec::new()),
        };

        let changed = compactor(t, 100)
            .summarize_if_needed(&mut turns, &provider, &json_registry())
            .await;

        assert!(changed);
        assert_eq!(turns.len(), (t + 5) - t / 2 + 1);
        assert!(is_memorandum(&turns[1]));

        let requests = provider.requests.lock().unwrap();
        let (request, json) = &requests[0];
        assert!(json);
        assert_eq!(request[0].text(), "SUMMARIZE");
        assert!(request[1].text().starts_with("user: u0\n"));
    }

    #[tokio::test]
    async fn test_repeated_summaries_keep_one_memorandum() {
        let provider = Summarizer {
            reply: Some("recap"),
            requests: Mutex::new(Vec::new()),
        };
        let c = compactor(4, 100);
        let registry = json_registry();
        let mut turns = vec![Turn::system("sys")];
        for i in 0..30 {
            turns.push(Turn::user(&format!("q{}", i)));
            c.summarize_if_needed(&mut turns, &provider, &registry).await;
            turns.push(Turn::assistant(&format!("a{}", i)));
            assert!(turns.len() <= 7, "exchange {}: {} turns", i, turns.len());
            assert!(turns.iter().filter(|t| is_memorandum(t)).count() <= 1);
        }

        // The previous memorandum is part of the next summarizer input.
        let requests = provider.requests.lock().unwrap();
        let last = &requests.last().unwrap().0;
        assert!(last[1].text().starts_with("system: [MEMORANDUM] recap\n"));
    }

    #[tokio::test]
    async fn test_summarize_at_threshold_is_noop() {
        let mut turns = with_system(20);
        let provider = Summarizer {
            reply: Some("unused"),
            requests: Mutex::new(Vec::new()),
        };
        let changed = compactor(20, 100)
            .summarize_if_needed(&mut turns, &provider, &json_registry())
            .await;
        assert!(!changed);
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summarize_failure_leaves_turns() {
        let mut turns = with_system(30);
        let original = turns.clone();
        let provider = Summarizer {
            reply: None,
            requests: Mutex::new(Vec::new()),
        };
        let changed = compactor(20, 100)
            .summarize_if_needed(&mut turns, &provider, &json_registry())
            .await;
        assert!(!changed);
        assert_eq!(turns, original);
    }

    #[tokio::test]
    async fn test_summarize_without_json_model_skips() {
        let mut turns = with_system(30);
        let provider = Summarizer {
            reply: Some("x"),
            requests: Mutex::new(Vec::new()),
        };
        let registry = ModelRegistry::new(vec![ModelDescriptor::new("c", "http://c", "c")]);
        assert!(
            !compactor(20, 100)
                .summarize_if_needed(&mut turns, &provider, &registry)
                .await
        );
        assert_eq!(turns.len(), 30);
    }

    // ── anchor projection ──────────────────────────────────────────────

    #[test]
    fn test_anchor_inserted_before_last_user() {
        let mut turns = with_system(5);
        turns.push(Turn::assistant("reply"));
        let view = compactor(100, 5).project(&turns);

        assert_eq!(view.len(), turns.len() + 1);
        assert_eq!(view[4].text(), "ANCHOR");
        assert_eq!(view[5].text(), "u3");
        // Stored sequence untouched
        assert_eq!(turns.len(), 6);
    }

    #[test]
    fn test_anchor_threshold_boundary() {
        let turns = with_system(5);
        assert_eq!(compactor(100, 5).project(&turns), turns);
    }

    #[test]
    fn test_anchor_idempotent() {
        let turns = with_system(8);
        let once = with_anchor(&turns, "ANCHOR");
        let twice = with_anchor(&once, "ANCHOR");
        assert_eq!(once, twice);
        assert_eq!(
            twice.iter().filter(|t| t.text() == "ANCHOR").count(),
            1
        );
    }

    #[test]
    fn test_drop_orphan_tool_results() {
        let turns = vec![
            Turn::tool_result("gone", "orphan"),
            Turn::assistant_with_tools("", vec![ToolCall::new("c1", "t", "{}")]),
            Turn::tool_result("c1", "kept"),
        ];
        let view = drop_orphan_tool_results(&turns);
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].text(), "kept");
    }

    // ── truncation ─────────────────────────────────────────────────────

    #[test]
    fn test_truncate_oldest_half_keeps_system() {
        let mut turns = vec![
            Turn::system("sys"),
            Turn::user("1"),
            Turn::system("[MEMORANDUM] m"),
            Turn::user("3"),
            Turn::user("4"),
            Turn::user("5"),
            Turn::user("6"),
            Turn::user("7"),
        ];
        let removed = truncate_oldest_half(&mut turns);
        assert_eq!(removed, 2);
        let texts: Vec<String> = turns.iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["sys", "[MEMORANDUM] m", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_truncate_if_over_budget_boundary() {
        let model = ModelDescriptor::new("m", "http://m", "m").with_context_window(1000);
        let c = compactor(100, 100);

        let mut turns = with_system(10);
        assert_eq!(
            c.truncate_if_over_budget(&mut turns, Some(&Usage::new(700, 100)), &model),
            0
        );
        assert_eq!(turns.len(), 10);

        assert_eq!(
            c.truncate_if_over_budget(&mut turns, Some(&Usage::new(700, 101)), &model),
            4
        );
        assert_eq!(turns.len(), 6);
        assert!(turns[0].is_system());

        assert_eq!(c.truncate_if_over_budget(&mut turns, None, &model), 0);
    }

    #[test]
    fn test_build_summary_transcript_includes_tool_calls() {
        let turns = vec![
            Turn::assistant_with_tools("", vec![ToolCall::new("c", "change_model", "{}")]),
            Turn::tool_result("c", "Model switched to glm"),
        ];
        let transcript = build_summary_transcript(&turns);
        assert!(transcript.contains("assistant (tool call change_model): {}"));
        assert!(transcript.contains("tool: Model switched to glm"));
    }
}
