//! Configuration validation: unknown field detection and value checks.

use super::Config;
use serde_json::Value;
use std::collections::HashSet;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "agent",
    "compaction",
    "normalizer",
    "models",
    "prompts",
    "storage",
    "logging",
];

const KNOWN_AGENT: &[&str] = &[
    "max_tool_call_count",
    "max_active_groups",
    "default_model",
    "request_timeout_secs",
    "max_tokens",
    "temperature",
];

const KNOWN_COMPACTION: &[&str] = &[
    "summarize_threshold",
    "anchor_threshold",
    "max_token_threshold",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    out: &mut Vec<Diagnostic>,
) {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        out.push(Diagnostic::error(path, message));
    }
}

/// Validate a raw JSON config value against known field names.
pub fn validate_raw(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::error("", "Config must be a JSON object"));
        return diagnostics;
    };

    check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    if let Some(agent) = obj.get("agent").and_then(|v| v.as_object()) {
        check_keys(agent, KNOWN_AGENT, "agent", &mut diagnostics);
    }
    if let Some(compaction) = obj.get("compaction").and_then(|v| v.as_object()) {
        check_keys(compaction, KNOWN_COMPACTION, "compaction", &mut diagnostics);
    }

    diagnostics
}

/// Check loaded values for combinations the gateway cannot run with.
pub fn validate_values(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let fraction = config.compaction.max_token_threshold;
    if !(fraction > 0.0 && fraction <= 1.0) {
        diagnostics.push(Diagnostic::error(
            "compaction.max_token_threshold",
            format!("must be in (0, 1], got {}", fraction),
        ));
    }
    if config.compaction.summarize_threshold < 2 {
        diagnostics.push(Diagnostic::error(
            "compaction.summarize_threshold",
            "must be at least 2",
        ));
    }
    if config.agent.max_tool_call_count == 0 {
        diagnostics.push(Diagnostic::error(
            "agent.max_tool_call_count",
            "must be at least 1",
        ));
    }
    if config.agent.max_active_groups == 0 {
        diagnostics.push(Diagnostic::error(
            "agent.max_active_groups",
            "must be at least 1",
        ));
    }
    if config.compaction.anchor_threshold >= config.compaction.summarize_threshold {
        diagnostics.push(Diagnostic::warn(
            "compaction.anchor_threshold",
            "not below summarize_threshold, the anchor will rarely be injected",
        ));
    }

    let mut seen = HashSet::new();
    for (i, model) in config.models.iter().enumerate() {
        let path = format!("models[{}]", i);
        if model.name.trim().is_empty() {
            diagnostics.push(Diagnostic::error(&path, "name is empty"));
        } else if !seen.insert(model.name.to_ascii_lowercase()) {
            diagnostics.push(Diagnostic::error(
                &path,
                format!("duplicate model name '{}'", model.name),
            ));
        }
        if model.base_url.trim().is_empty() {
            diagnostics.push(Diagnostic::error(&path, "base_url is empty"));
        }
        if model.model.trim().is_empty() {
            diagnostics.push(Diagnostic::error(&path, "model is empty"));
        }
        if model.capabilities.is_empty() {
            diagnostics.push(Diagnostic::warn(&path, "no capabilities declared"));
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("agent", "agent"), 0);
        assert_eq!(levenshtein("agnet", "agent"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn test_suggest_field_match() {
        let s = suggest_field("compacton", KNOWN_TOP_LEVEL);
        assert_eq!(s.as_deref(), Some("did you mean 'compaction'?"));
    }

    #[test]
    fn test_suggest_field_no_match() {
        assert!(suggest_field("zzzzzzzzzz", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_raw_unknown_fields() {
        let raw = serde_json::json!({
            "agent": {"max_tool_call_cont": 3},
            "modles": []
        });
        let diags = validate_raw(&raw);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().any(|d| d.path == "modles"));
        assert!(diags.iter().any(|d| d.path == "agent.max_tool_call_cont"));
    }

    #[test]
    fn test_validate_raw_not_an_object() {
        let diags = validate_raw(&serde_json::json!([1, 2]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].level, DiagnosticLevel::Error);
    }

    #[test]
    fn test_validate_values_default_is_clean() {
        let diags = validate_values(&Config::default());
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_values_bad_fraction_and_duplicates() {
        let mut config = Config::default();
        config.compaction.max_token_threshold = 1.5;
        let model = ModelConfig {
            name: "glm".into(),
            base_url: "https://example.com".into(),
            model: "glm-4".into(),
            ..Default::default()
        };
        config.models = vec![model.clone(), model];

        let diags = validate_values(&config);
        let errors: Vec<_> = diags
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[1].to_string().contains("duplicate model name"));
    }
}
