//! Agent loop implementation
//!
//! This module provides the orchestration loop that drives completion
//! requests, tool dispatch and compaction for one conversation at a time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage, ReplyKind};
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::normalize::{NormalizeOptions, Normalizer};
use crate::providers::{ActiveModel, Capability, ChatOptions, LLMProvider, ModelRegistry};
use crate::session::{ContextStore, ToolCall, Turn};
use crate::tools::{ChangeModelTool, SummarizeChatTool, Tool, ToolContext, ToolRegistry};
use crate::utils::sanitize::clean_reply;
use crate::utils::string::{preview, LOG_PREVIEW_CHARS};

use super::commands::{help_text, model_list, parse_command, SlashCommand};
use super::compaction::Compactor;

/// Reply text used when the model produced nothing.
pub const NO_CONTENT: &str = "……";

/// Reply text used when the conversation already has an invocation in flight.
pub const BUSY_REPLY: &str = "Still working on the previous message, please wait.";

/// Terminal result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Cleaned model text
    Text(String),
    /// The model returned no usable text
    Empty,
    /// Refused: the conversation was already pending
    Busy,
}

impl Reply {
    /// The text delivered to the platform.
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Empty => NO_CONTENT.to_string(),
            Reply::Busy => BUSY_REPLY.to_string(),
        }
    }

    fn kind(&self) -> ReplyKind {
        match self {
            Reply::Text(_) => ReplyKind::Text,
            Reply::Empty => ReplyKind::Empty,
            Reply::Busy => ReplyKind::Busy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Requesting,
    ToolExecuting,
    Done,
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "IDLE",
            LoopState::Requesting => "REQUESTING",
            LoopState::ToolExecuting => "TOOL_EXECUTING",
            LoopState::Done => "DONE",
            LoopState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut LoopState, next: LoopState) {
    debug!(from = %state, to = %next, "Loop state");
    *state = next;
}

/// The orchestration loop.
///
/// Each invocation works on a copy of the stored turns and commits it back
/// only when it reaches DONE. A failed invocation therefore leaves the
/// stored conversation exactly as it was.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use parley::agent::AgentLoop;
///
/// let agent = Arc::new(AgentLoop::new(config, store, registry, provider, normalizer, bus));
/// agent.register_builtin_tools().await;
///
/// let reply = agent.process("cli:local", vec![Turn::user("hello")]).await?;
/// println!("{}", reply.into_text());
/// ```
pub struct AgentLoop {
    /// Agent configuration
    config: Config,
    /// Conversation storage and the pending set
    store: ContextStore,
    /// Known backend models
    registry: Arc<ModelRegistry>,
    /// Chat-completion client shared by every model
    provider: Arc<dyn LLMProvider>,
    /// Registered tools
    tools: RwLock<ToolRegistry>,
    /// Summarization, anchor and truncation rules
    compactor: Compactor,
    /// Platform message normalizer
    normalizer: Arc<Normalizer>,
    /// Process-wide active model
    active: watch::Sender<ActiveModel>,
    /// Message bus for input/output
    bus: Arc<MessageBus>,
    /// Whether the gateway loop is running
    running: AtomicBool,
    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,
}

impl AgentLoop {
    pub fn new(
        config: Config,
        store: ContextStore,
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn LLMProvider>,
        normalizer: Arc<Normalizer>,
        bus: Arc<MessageBus>,
    ) -> Self {
        let initial = registry.initial_active(config.agent.default_model.as_deref());
        info!(model = %initial.name(), "Initial active model");
        let (active, _) = watch::channel(initial);
        let (shutdown_tx, _) = watch::channel(false);
        let compactor = Compactor::new(config.compaction.clone(), &config.prompts);
        Self {
            config,
            store,
            registry,
            provider,
            tools: RwLock::new(ToolRegistry::new()),
            compactor,
            normalizer,
            active,
            bus,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Register a tool with the agent.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.register(tool);
    }

    /// Register `change_model` and `summarize_chat`.
    pub async fn register_builtin_tools(&self) {
        self.register_tool(Box::new(ChangeModelTool::new(Arc::clone(&self.registry))))
            .await;
        self.register_tool(Box::new(SummarizeChatTool::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.provider),
            Arc::clone(&self.normalizer),
            &self.config.prompts.chat_summary,
            self.config.normalizer.summary_history_count,
        )))
        .await;
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// The currently published active model.
    pub fn active_model(&self) -> ActiveModel {
        self.active.borrow().clone()
    }

    /// Watch active-model transitions.
    pub fn subscribe_active_model(&self) -> watch::Receiver<ActiveModel> {
        self.active.subscribe()
    }

    /// Switch the active model by name, alias or model id.
    ///
    /// Only chat models can be selected.
    pub fn switch_model(&self, query: &str) -> Result<ActiveModel> {
        let selection = self
            .registry
            .switch_to(query)
            .filter(|s| s.get().is_some_and(|m| m.supports(Capability::Chat)))
            .ok_or_else(|| ParleyError::NotFound(format!("no chat model named {}", query)))?;
        self.publish_active(selection.clone());
        Ok(selection)
    }

    fn publish_active(&self, selection: ActiveModel) {
        let previous = self.active.send_replace(selection.clone());
        info!(from = %previous.name(), to = %selection.name(), "Active model switched");
    }

    /// Run one invocation for `key` with the already-normalized inbound turns.
    ///
    /// Returns [`Reply::Busy`] without touching the conversation if another
    /// invocation for `key` is in flight. On error nothing is committed.
    pub async fn process(&self, key: &str, inbound: Vec<Turn>) -> Result<Reply> {
        let pending = self.store.pending();
        let Some(_guard) = pending.try_acquire(key) else {
            info!(conversation = %key, "Conversation busy, request refused");
            return Ok(Reply::Busy);
        };

        let system_prompt = self.config.prompts.system.clone();
        let mut turns = self
            .store
            .get(key, || vec![Turn::system(&system_prompt)])
            .await?;
        let before = turns.len();
        turns.extend(inbound);

        match self.run(key, &mut turns).await {
            Ok(reply) => {
                info!(conversation = %key, before, after = turns.len(), "Invocation committed");
                self.store.replace(key, turns).await;
                if let Err(e) = self.store.persist(key).await {
                    warn!(conversation = %key, error = %e, "Snapshot write failed");
                }
                if let Err(e) = self.store.evict_if_over_capacity().await {
                    warn!(error = %e, "Eviction failed");
                }
                Ok(reply)
            }
            Err(e) => {
                warn!(conversation = %key, error = %e, "Invocation failed, rolled back");
                Err(e)
            }
        }
    }

    async fn run(&self, key: &str, turns: &mut Vec<Turn>) -> Result<Reply> {
        let mut state = LoopState::Idle;
        let result = self.run_rounds(key, turns, &mut state).await;
        match &result {
            Ok(_) => transition(&mut state, LoopState::Done),
            Err(_) => transition(&mut state, LoopState::Failed),
        }
        result
    }

    async fn run_rounds(
        &self,
        key: &str,
        turns: &mut Vec<Turn>,
        state: &mut LoopState,
    ) -> Result<Reply> {
        let max_rounds = self.config.agent.max_tool_call_count;
        let mut options = ChatOptions::new();
        if let Some(max_tokens) = self.config.agent.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.config.agent.temperature {
            options = options.with_temperature(temperature);
        }

        let mut active = self.active_model();
        let mut rounds = 0usize;

        loop {
            transition(state, LoopState::Requesting);
            let model = active.require()?;

            self.compactor
                .summarize_if_needed(turns, self.provider.as_ref(), &self.registry)
                .await;
            let view = self.compactor.project(turns);
            let tool_definitions = if model.supports(Capability::FunctionCalling) {
                self.tools.read().await.definitions()
            } else {
                Vec::new()
            };

            let start = Instant::now();
            let response = self
                .provider
                .chat(&model, view, tool_definitions, options.clone())
                .await?;
            debug!(
                model = %model.name,
                latency_ms = start.elapsed().as_millis() as u64,
                tool_calls = response.tool_calls.len(),
                reply = %preview(&response.content, LOG_PREVIEW_CHARS),
                "Completion received"
            );

            turns.push(response.to_turn());
            self.compactor
                .truncate_if_over_budget(turns, response.usage.as_ref(), &model);

            if !response.has_tool_calls() {
                let text = clean_reply(&response.content);
                return Ok(if text.is_empty() {
                    Reply::Empty
                } else {
                    Reply::Text(text)
                });
            }

            if rounds >= max_rounds {
                error!(conversation = %key, rounds, "Tool round limit exceeded");
                return Err(ParleyError::ToolLimit(max_rounds));
            }
            rounds += 1;

            if !model.supports(Capability::FunctionCalling) {
                return Err(ParleyError::Config(format!(
                    "model '{}' returned tool calls but is not function-calling capable",
                    model.name
                )));
            }

            transition(state, LoopState::ToolExecuting);
            let calls: Vec<ToolCall> = response.tool_calls.iter().map(ToolCall::from).collect();
            for call in &calls {
                let ctx = ToolContext::new(key).with_active_model(active.clone());
                let output = {
                    let tools = self.tools.read().await;
                    tools.dispatch(call, &ctx).await?
                };
                if let Some(selection) = output.model_switch {
                    active = selection.clone();
                    self.publish_active(selection);
                }
                turns.push(Turn::tool_result(&call.id, &output.content));
            }
        }
    }

    /// Normalize and process one platform message, producing the reply.
    pub async fn handle_inbound(&self, msg: &InboundMessage) -> OutboundMessage {
        if let Some(command) = parse_command(&msg.message) {
            return self.run_command(msg, command).await;
        }

        let key = &msg.conversation_key;
        // Refuse before normalization so a busy conversation costs no vision calls.
        if self.store.pending().contains(key) {
            info!(conversation = %key, "Conversation busy, request refused");
            return OutboundMessage::reply_to(msg, BUSY_REPLY, ReplyKind::Busy);
        }

        let options = NormalizeOptions::from_config(&self.config.normalizer);
        let normalized = self.normalizer.normalize(&msg.message, options).await;
        if !normalized.degraded.is_empty() {
            debug!(degraded = normalized.degraded.len(), "Message normalized with placeholders");
        }

        match self.process(key, normalized.into_turns()).await {
            Ok(reply) => {
                let kind = reply.kind();
                OutboundMessage::reply_to(msg, &reply.into_text(), kind)
            }
            Err(e) => OutboundMessage::reply_to(msg, &e.to_string(), ReplyKind::Error),
        }
    }

    /// Answer a slash command. The conversation is left untouched.
    async fn run_command(&self, msg: &InboundMessage, command: SlashCommand) -> OutboundMessage {
        info!(conversation = %msg.conversation_key, command = ?command, "Slash command");
        let content = match command {
            SlashCommand::Model { name: Some(name) } => match self.switch_model(&name) {
                Ok(selection) => format!("Model switched to {}", selection.name()),
                Err(e) => {
                    debug!(error = %e, "Model switch command rejected");
                    model_list(&self.registry, self.active_model().name())
                }
            },
            SlashCommand::Model { name: None } => {
                model_list(&self.registry, self.active_model().name())
            }
            SlashCommand::Summary { count } => {
                let arguments = match count {
                    Some(count) => serde_json::json!({ "count": count }),
                    None => serde_json::json!({}),
                };
                let call = ToolCall::new("command", "summarize_chat", &arguments.to_string());
                let ctx = ToolContext::new(&msg.conversation_key)
                    .with_active_model(self.active_model());
                let tools = self.tools.read().await;
                match tools.dispatch(&call, &ctx).await {
                    Ok(output) => output.content,
                    Err(e) => {
                        return OutboundMessage::reply_to(msg, &e.to_string(), ReplyKind::Error)
                    }
                }
            }
            SlashCommand::Help => help_text(),
        };
        OutboundMessage::reply_to(msg, &content, ReplyKind::Command)
    }

    /// Start the gateway loop, consuming from the message bus.
    ///
    /// Each inbound message is handled on its own task. The loop runs
    /// until [`stop`](Self::stop) is called or the inbound queue closes.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ParleyError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    let Some(msg) = msg else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let request_span = info_span!(
                        "request",
                        request_id = %uuid::Uuid::new_v4(),
                        conversation = %msg.conversation_key,
                        channel = %msg.channel,
                        sender = %msg.message.sender.id,
                    );
                    let agent = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            let start = Instant::now();
                            let outbound = agent.handle_inbound(&msg).await;
                            info!(
                                latency_ms = start.elapsed().as_millis() as u64,
                                kind = ?outbound.kind,
                                "Request completed"
                            );
                            if let Err(e) = agent.bus.publish_outbound(outbound).await {
                                error!(error = %e, "Failed to publish outbound message");
                            }
                        }
                        .instrument(request_span),
                    );
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    /// Signal the gateway loop to stop. In-flight invocations finish.
    pub fn stop(&self) {
        info!("Stopping agent loop");
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
