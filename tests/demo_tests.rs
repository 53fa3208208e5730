//! End-to-end tests for the chat/agent demo covenant

use covenant::demo::{self, AgentEntry, ChatEntry, OUTBOUND, PROMPT, RESPONDER};
use covenant_core::{DaemonId, Error, JournalEntry, Position, Violation};
use covenant_runtime::{Container, CovenantBuilder, CovenantConfig, Invocation, PUMP_DAEMON_ID};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn reply_chunks_end_with_a_paragraph_break() {
    assert_eq!(
        demo::reply_chunks(" hi there "),
        vec!["echo: ", "hi ", "there", "\n\n"]
    );
}

#[test]
fn demo_covenant_validates() {
    let mut container = Container::new();
    let covenant = demo::build(&CovenantConfig::default(), &mut container).unwrap();

    assert_eq!(covenant.pumps().len(), 2);
    assert_eq!(covenant.pumps()[0].invocation(), &Invocation::Inline);
    assert_eq!(
        covenant.pumps()[1].invocation(),
        &Invocation::Windowed { transmuter: None }
    );
    assert_eq!(
        covenant.daemon_order(),
        vec![DaemonId::new(RESPONDER), DaemonId::new(PUMP_DAEMON_ID)]
    );
    let described = covenant.describe().unwrap();
    assert!(described.contains("\"ReplyChunk\""));
    assert!(described.contains("\"Outbound\""));
}

#[test]
fn agent_alone_leaves_its_replies_undelivered() {
    let mut container = Container::new();
    let err = CovenantBuilder::new()
        .connect_branch(&demo::AgentBranch, &mut container)
        .unwrap()
        .build(&mut container)
        .err()
        .unwrap();

    let Error::Validation(report) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(report.len(), 2);
    assert!(matches!(report.violations()[0], Violation::DeadLetter { .. }));
    assert!(matches!(
        report.violations()[1],
        Violation::OrphanedConsumer { leaf, .. } if leaf == PROMPT
    ));
}

#[tokio::test]
async fn every_message_gets_one_aggregated_reply() {
    let messages = strings(&["hello", "how are the journals today?"]);
    let outcome = tokio::time::timeout(
        WAIT,
        demo::run(&CovenantConfig::default(), &messages, &CancellationToken::new()),
    )
    .await
    .expect("demo timed out")
    .unwrap();

    assert_eq!(
        outcome.replies,
        strings(&["echo: hello", "echo: how are the journals today?"])
    );
    assert_eq!(outcome.prompts_routed, 2);
    assert_eq!(outcome.windows_flushed, 2);
}

#[tokio::test]
async fn oversized_message_is_shattered_before_sending() {
    let mut config = CovenantConfig::default();
    config.shatter.max_chars = 8;
    let messages = strings(&["first\n\nsecond"]);

    let outcome = tokio::time::timeout(WAIT, demo::run(&config, &messages, &CancellationToken::new()))
        .await
        .expect("demo timed out")
        .unwrap();

    assert_eq!(outcome.replies, strings(&["echo: first", "echo: second"]));
    assert_eq!(outcome.prompts_routed, 2);
}

#[tokio::test]
async fn no_messages_means_no_replies() {
    let outcome = demo::run(&CovenantConfig::default(), &[], &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.replies.is_empty());
    assert_eq!(outcome.prompts_routed, 0);
}

#[tokio::test]
async fn cancelled_parent_ends_the_demo() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = tokio::time::timeout(
        WAIT,
        demo::run(&CovenantConfig::default(), &strings(&["hello"]), &cancel),
    )
    .await
    .expect("demo timed out")
    .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn responder_streams_into_the_agent_journal() {
    let config = CovenantConfig::default();
    let mut container = Container::new();
    let covenant = demo::build(&config, &mut container).unwrap();
    let chat = container.journal::<ChatEntry>().unwrap();
    let agent = container.journal::<AgentEntry>().unwrap();

    let scope = covenant_runtime::ExecutionScope::enter(
        &container,
        &covenant,
        &CancellationToken::new(),
        config.scope.clone(),
    )
    .await
    .unwrap();

    chat.write(ChatEntry::Inbound("ping".into())).await.unwrap();
    let is_outbound = |e: &ChatEntry| e.leaf_type() == OUTBOUND;
    let (_, reply) = tokio::time::timeout(
        WAIT,
        chat.wait_for(Position::ORIGIN, &is_outbound, CancellationToken::new()),
    )
    .await
    .expect("no reply")
    .unwrap();
    assert_eq!(reply, ChatEntry::Outbound("echo: ping".into()));

    // Prompt, then "echo: ", "ping", "\n\n".
    assert_eq!(agent.head().await, Position(4));
    scope.exit().await.unwrap();
}
