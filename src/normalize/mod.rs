//! Message normalizer: platform messages to model-ready turns.
//!
//! A platform message is an ordered list of segments. The normalizer turns
//! it into one primary user turn labelled with its speaker, preceded by
//! context turns for quoted and forwarded messages:
//!
//! ```text
//! [QUOTED] [FROM: amy(1)] [BODY: what time?]
//! [FORWARDED] [FROM: bob(2)] [BODY: 9pm]
//! [FROM: cat(3)] [BODY: @1 see above [FORWARD]]
//! ```
//!
//! Every lookup is best-effort. A failed image description becomes a
//! placeholder, and an unresolvable forward or quote is left out. The user
//! turn itself is always produced.

pub mod source;
pub mod vision;

pub use source::{MessageSource, NoMessageSource};
pub use vision::{VisionModelDescriber, VisionService};

use crate::bus::{PlatformMessage, Segment, Sender};
use crate::config::NormalizerConfig;
use crate::error::Result;
use crate::session::Turn;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inline placeholder for an image that was not described.
pub const IMAGE_PLACEHOLDER: &str = "[IMAGE]";
/// Inline placeholder for an image whose description failed.
pub const IMAGE_UNREADABLE: &str = "[IMAGE_UNREADABLE]";
/// Inline marker left where a forward bundle was referenced.
pub const FORWARD_MARKER: &str = "[FORWARD]";
/// Nesting ceiling for forward bundles, independent of the message budget.
pub const MAX_FORWARD_DEPTH: usize = 8;

const FORWARDED_PREFIX: &str = "[FORWARDED] ";
const QUOTED_PREFIX: &str = "[QUOTED] ";

/// Result of a best-effort lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Resolved(T),
    Degraded { reason: String },
}

impl<T> Outcome<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Resolved(value),
            Err(e) => Outcome::Degraded {
                reason: e.to_string(),
            },
        }
    }

    /// The resolved value, discarding the degradation reason.
    pub fn resolved(self) -> Option<T> {
        match self {
            Outcome::Resolved(value) => Some(value),
            Outcome::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    fn map_resolved<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Resolved(value) => Outcome::Resolved(f(value)),
            Outcome::Degraded { reason } => Outcome::Degraded { reason },
        }
    }
}

/// Per-call normalization switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Describe primary-message images with the vision service
    pub image_understanding: bool,
    /// Maximum number of forwarded messages resolved for this call
    pub forward_budget: usize,
}

impl NormalizeOptions {
    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self {
            image_understanding: config.enable_image_understanding,
            forward_budget: config.forward_count,
        }
    }
}

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    /// Quoted and forwarded messages, in segment order
    pub context: Vec<Turn>,
    /// The labelled user turn
    pub primary: Turn,
    /// Reasons for every degraded lookup
    pub degraded: Vec<String>,
}

impl NormalizedMessage {
    /// Context turns followed by the primary turn.
    pub fn into_turns(self) -> Vec<Turn> {
        let mut turns = self.context;
        turns.push(self.primary);
        turns
    }
}

/// `[FROM: nickname(id)] [BODY: body]`
pub fn speaker_label(sender: &Sender, body: &str) -> String {
    format!("[FROM: {}({})] [BODY: {}]", sender.nickname, sender.id, body)
}

/// Message body under construction. Inline tokens (mentions, placeholders,
/// markers) are kept apart from the words on either side.
#[derive(Default)]
struct Body {
    text: String,
    after_token: bool,
}

impl Body {
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.after_token && !text.starts_with(char::is_whitespace) {
            self.text.push(' ');
        }
        self.text.push_str(text);
        self.after_token = false;
    }

    fn push_token(&mut self, token: &str) {
        if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
            self.text.push(' ');
        }
        self.text.push_str(token);
        self.after_token = true;
    }

    fn finish(&self) -> &str {
        self.text.trim()
    }
}

/// Render a message without any lookups: images become placeholders,
/// forwards become markers and quotes are dropped.
pub fn render_plain(message: &PlatformMessage) -> String {
    let mut body = Body::default();
    for segment in &message.segments {
        match segment {
            Segment::Text { text } => body.push_text(text),
            Segment::Mention { target } => body.push_token(&format!("@{}", target)),
            Segment::Image { .. } => body.push_token(IMAGE_PLACEHOLDER),
            Segment::Forward { .. } => body.push_token(FORWARD_MARKER),
            Segment::Reply { .. } => {}
        }
    }
    body.finish().to_string()
}

enum Pending {
    Message(PlatformMessage),
    Forward(String),
}

struct Frame {
    items: VecDeque<Pending>,
    depth: usize,
}

/// Converts platform messages into conversation turns.
pub struct Normalizer {
    source: Arc<dyn MessageSource>,
    vision: Option<Arc<dyn VisionService>>,
}

impl Normalizer {
    /// Create a normalizer. Without a vision service, enabled image
    /// understanding degrades to the failure placeholder.
    pub fn new(source: Arc<dyn MessageSource>, vision: Option<Arc<dyn VisionService>>) -> Self {
        Self { source, vision }
    }

    /// The message-history source.
    pub fn source(&self) -> &Arc<dyn MessageSource> {
        &self.source
    }

    /// Normalize one inbound message. Never fails.
    pub async fn normalize(
        &self,
        message: &PlatformMessage,
        options: NormalizeOptions,
    ) -> NormalizedMessage {
        let mut context = Vec::new();
        let mut degraded = Vec::new();
        let mut body = Body::default();
        let mut budget = options.forward_budget;

        for segment in &message.segments {
            match segment {
                Segment::Text { text } => body.push_text(text),
                Segment::Mention { target } => body.push_token(&format!("@{}", target)),
                Segment::Image { url } => {
                    let rendered = if options.image_understanding {
                        match self.describe_image(url).await {
                            Outcome::Resolved(description) => {
                                format!("[IMAGE_PARSED: {}]", description)
                            }
                            Outcome::Degraded { reason } => {
                                warn!(url = %url, reason = %reason, "Image description failed");
                                degraded.push(reason);
                                IMAGE_UNREADABLE.to_string()
                            }
                        }
                    } else {
                        IMAGE_PLACEHOLDER.to_string()
                    };
                    body.push_token(&rendered);
                }
                Segment::Forward { id } => {
                    body.push_token(FORWARD_MARKER);
                    let remaining = self
                        .expand_forward(id, budget, &mut context, &mut degraded)
                        .await;
                    budget = remaining;
                }
                Segment::Reply { message_id } => match self.resolve_quote(message_id).await {
                    Outcome::Resolved(turn) => context.push(turn),
                    Outcome::Degraded { reason } => {
                        warn!(message_id = %message_id, reason = %reason, "Quoted message unavailable");
                        degraded.push(reason);
                    }
                },
            }
        }

        NormalizedMessage {
            context,
            primary: Turn::user(&speaker_label(&message.sender, body.finish())),
            degraded,
        }
    }

    /// Render platform history (no vision, no expansion) as labelled user turns.
    pub fn normalize_history(&self, messages: &[PlatformMessage]) -> Vec<Turn> {
        messages
            .iter()
            .filter_map(|msg| {
                let body = render_plain(msg);
                (!body.is_empty()).then(|| Turn::user(&speaker_label(&msg.sender, &body)))
            })
            .collect()
    }

    async fn describe_image(&self, url: &str) -> Outcome<String> {
        match &self.vision {
            Some(vision) => Outcome::from_result(vision.describe(url).await),
            None => Outcome::Degraded {
                reason: "no vision-understanding model configured".to_string(),
            },
        }
    }

    async fn resolve_quote(&self, message_id: &str) -> Outcome<Turn> {
        Outcome::from_result(self.source.message(message_id).await).map_resolved(|msg| {
            Turn::user(&format!(
                "{}{}",
                QUOTED_PREFIX,
                speaker_label(&msg.sender, &render_plain(&msg))
            ))
        })
    }

    /// Expand a forward bundle into `out`, depth-first and in order.
    ///
    /// Each resolved message costs one unit of `budget`; expansion stops
    /// when it reaches zero or nesting exceeds [`MAX_FORWARD_DEPTH`].
    /// Returns the unspent budget.
    async fn expand_forward(
        &self,
        root_id: &str,
        mut budget: usize,
        out: &mut Vec<Turn>,
        degraded: &mut Vec<String>,
    ) -> usize {
        let mut stack = vec![Frame {
            items: VecDeque::from([Pending::Forward(root_id.to_string())]),
            depth: 0,
        }];

        while budget > 0 {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let depth = frame.depth;
            let Some(item) = frame.items.pop_front() else {
                stack.pop();
                continue;
            };

            match item {
                Pending::Message(msg) => {
                    budget -= 1;
                    let body = render_plain(&msg);
                    if !body.is_empty() {
                        out.push(Turn::user(&format!(
                            "{}{}",
                            FORWARDED_PREFIX,
                            speaker_label(&msg.sender, &body)
                        )));
                    }
                    // Nested bundles are expanded before the rest of this frame.
                    for segment in msg.segments.iter().rev() {
                        if let Segment::Forward { id } = segment {
                            frame.items.push_front(Pending::Forward(id.clone()));
                        }
                    }
                }
                Pending::Forward(id) => {
                    if depth >= MAX_FORWARD_DEPTH {
                        debug!(forward_id = %id, depth, "Forward nesting too deep, skipped");
                        continue;
                    }
                    match self.source.forwarded(&id).await {
                        Ok(messages) => stack.push(Frame {
                            items: messages.into_iter().map(Pending::Message).collect(),
                            depth: depth + 1,
                        }),
                        Err(e) => {
                            warn!(forward_id = %id, error = %e, "Forwarded messages unavailable");
                            degraded.push(e.to_string());
                        }
                    }
                }
            }
        }

        budget
    }
}
