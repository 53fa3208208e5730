//! Demo covenant: a chat echo adapter and a streaming agent.
//!
//! The chat branch produces `Inbound` messages and consumes `Outbound`
//! replies. The agent branch consumes `Prompt`s and streams its answer as
//! `ReplyChunk`s from a daemon. The covenant routes `Inbound -> Prompt`
//! inline and windows `ReplyChunk -> Outbound` so each streamed answer lands
//! in the chat journal as one message.

use covenant_core::{BranchManifest, Error, JournalEntry, LeafType, Position, Result};
use covenant_journal::Journal;
use covenant_runtime::{
    Branch, Container, Covenant, CovenantBuilder, CovenantConfig, ExecutionScope, TaskDaemon,
};
use covenant_stream::{Chunk, ShatterPolicy, TextAggregator};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const INBOUND: LeafType = LeafType::new("Inbound");
pub const OUTBOUND: LeafType = LeafType::new("Outbound");
pub const PROMPT: LeafType = LeafType::new("Prompt");
pub const REPLY_CHUNK: LeafType = LeafType::new("ReplyChunk");

pub const RESPONDER: &str = "agent-responder";

#[derive(Clone, Debug, PartialEq)]
pub enum ChatEntry {
    Inbound(String),
    Outbound(String),
}

impl JournalEntry for ChatEntry {
    const FAMILY: &'static str = "chat";
    const LEAVES: &'static [LeafType] = &[INBOUND, OUTBOUND];

    fn leaf_type(&self) -> LeafType {
        match self {
            Self::Inbound(_) => INBOUND,
            Self::Outbound(_) => OUTBOUND,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AgentEntry {
    Prompt(String),
    ReplyChunk(String),
}

impl JournalEntry for AgentEntry {
    const FAMILY: &'static str = "agent";
    const LEAVES: &'static [LeafType] = &[PROMPT, REPLY_CHUNK];

    fn leaf_type(&self) -> LeafType {
        match self {
            Self::Prompt(_) => PROMPT,
            Self::ReplyChunk(_) => REPLY_CHUNK,
        }
    }
}

impl Chunk for AgentEntry {
    fn content(&self) -> &str {
        match self {
            Self::Prompt(s) | Self::ReplyChunk(s) => s,
        }
    }

    fn with_content(&self, content: String) -> Self {
        match self {
            Self::Prompt(_) => Self::Prompt(content),
            Self::ReplyChunk(_) => Self::ReplyChunk(content),
        }
    }
}

/// Chat adapter. Owns the chat journal; nothing else.
pub struct ChatBranch;

impl Branch for ChatBranch {
    fn register(&self, container: &mut Container) -> Result<BranchManifest> {
        container.register_memory_journal::<ChatEntry>();
        BranchManifest::builder::<ChatEntry>("chat")
            .produces([INBOUND])
            .consumes([OUTBOUND])
            .build()
    }
}

/// Streaming agent. Answers every prompt word by word and closes each answer
/// with a paragraph break.
pub struct AgentBranch;

impl Branch for AgentBranch {
    fn register(&self, container: &mut Container) -> Result<BranchManifest> {
        let journal = container.register_memory_journal::<AgentEntry>();
        container.register_daemon(Arc::new(TaskDaemon::new(RESPONDER, move |cancel| {
            respond(journal.clone(), cancel)
        })));
        BranchManifest::builder::<AgentEntry>("agent")
            .produces([REPLY_CHUNK])
            .consumes([PROMPT])
            .requires(RESPONDER)
            .build()
    }
}

async fn respond(journal: Arc<dyn Journal<AgentEntry>>, cancel: CancellationToken) -> Result<()> {
    let mut prompts = journal.tail(Position::ORIGIN, cancel);
    while let Some(item) = prompts.next().await {
        let (position, entry) = item?;
        let AgentEntry::Prompt(prompt) = entry else {
            continue;
        };
        debug!("responder: prompt at {}", position);
        for chunk in reply_chunks(&prompt) {
            journal.write(AgentEntry::ReplyChunk(chunk)).await?;
        }
    }
    Ok(())
}

/// `"echo: <prompt>"` split after each space, then a closing paragraph break.
pub fn reply_chunks(prompt: &str) -> Vec<String> {
    let reply = format!("echo: {}", prompt.trim());
    let mut chunks: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
    chunks.push("\n\n".to_string());
    chunks
}

fn inbound_to_prompt(entry: &ChatEntry) -> Result<AgentEntry> {
    match entry {
        ChatEntry::Inbound(text) => Ok(AgentEntry::Prompt(text.clone())),
        other => Err(Error::out_of_domain("inbound-to-prompt", other.leaf_type())),
    }
}

/// Register both branches into `container` and build the demo covenant.
pub fn build(config: &CovenantConfig, container: &mut Container) -> Result<Covenant> {
    let window = config.window.policy::<AgentEntry>();
    CovenantBuilder::new()
        .connect_branch(&ChatBranch, container)?
        .connect_branch(&AgentBranch, container)?
        .routing(|r| {
            r.route::<ChatEntry, AgentEntry>(INBOUND, PROMPT, inbound_to_prompt);
            r.route_windowed::<AgentEntry, ChatEntry>(
                REPLY_CHUNK,
                OUTBOUND,
                TextAggregator::new("reply-aggregator", |text: String| {
                    ChatEntry::Outbound(text.trim_end().to_string())
                }),
                window,
            );
        })
        .build(container)
}

#[derive(Clone, Debug, Default)]
pub struct DemoOutcome {
    /// Outbound messages in journal order.
    pub replies: Vec<String>,
    pub prompts_routed: u64,
    /// Outbound entries written by the windowed reply route.
    pub windows_flushed: u64,
}

/// Build the demo covenant, send `messages` through it and collect one reply
/// per inbound entry. Messages longer than the shatter cap arrive as several
/// inbound entries.
pub async fn run(
    config: &CovenantConfig,
    messages: &[String],
    parent: &CancellationToken,
) -> Result<DemoOutcome> {
    let mut container = Container::new();
    let covenant = build(config, &mut container)?;
    let chat = container
        .journal::<ChatEntry>()
        .ok_or_else(|| Error::Internal("chat journal missing after build".into()))?;

    let mut scope = ExecutionScope::enter(&container, &covenant, parent, config.scope.clone()).await?;
    info!("demo: scope {} entered", scope.id());

    let collected = match send(chat.as_ref(), messages, &config.shatter.policy()).await {
        Ok(expected) => collect_replies(chat.as_ref(), expected, &mut scope).await,
        Err(e) => Err(e),
    };

    let pumps = covenant.pump_daemon();
    let prompts_routed = pumps.routed(INBOUND);
    let windows_flushed = pumps.routed(REPLY_CHUNK);
    let exited = scope.exit().await;

    let replies = collected?;
    exited?;
    Ok(DemoOutcome {
        replies,
        prompts_routed,
        windows_flushed,
    })
}

/// Write each message as one or more inbound entries. Returns how many were
/// written.
async fn send(
    chat: &dyn Journal<ChatEntry>,
    messages: &[String],
    shatter: &dyn ShatterPolicy,
) -> Result<usize> {
    let mut written = 0;
    for message in messages {
        for piece in shatter.shatter(message) {
            chat.write(ChatEntry::Inbound(piece)).await?;
            written += 1;
        }
    }
    Ok(written)
}

/// Wait for `expected` outbound messages, or the first daemon fault.
async fn collect_replies(
    chat: &dyn Journal<ChatEntry>,
    expected: usize,
    scope: &mut ExecutionScope,
) -> Result<Vec<String>> {
    let is_outbound = |e: &ChatEntry| e.leaf_type() == OUTBOUND;
    let mut replies = Vec::with_capacity(expected);
    let mut from = Position::ORIGIN.next();
    while replies.len() < expected {
        let cancel = scope.cancellation().clone();
        tokio::select! {
            found = chat.wait_for(from, &is_outbound, cancel) => {
                let (position, entry) = found?;
                if let ChatEntry::Outbound(text) = entry {
                    info!("demo: reply {} at {}", replies.len() + 1, position);
                    replies.push(text);
                }
                from = position.next();
            }
            Some(fault) = scope.next_fault() => {
                return Err(Error::daemon_failed(&fault.daemon, fault.error.to_string()));
            }
        }
    }
    Ok(replies)
}
