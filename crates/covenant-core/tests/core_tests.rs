//! Tests for covenant-core: entry model, manifests, errors

use covenant_core::*;

const OPEN: LeafType = LeafType::new("Open");
const CLOSE: LeafType = LeafType::new("Close");

#[derive(Clone, Debug)]
enum DoorEntry {
    Open,
    Close,
}

impl JournalEntry for DoorEntry {
    const FAMILY: &'static str = "door";
    const LEAVES: &'static [LeafType] = &[OPEN, CLOSE];

    fn leaf_type(&self) -> LeafType {
        match self {
            Self::Open => OPEN,
            Self::Close => CLOSE,
        }
    }
}

#[derive(Clone, Debug)]
enum WindowEntry {
    Open,
}

impl JournalEntry for WindowEntry {
    const FAMILY: &'static str = "window";
    const LEAVES: &'static [LeafType] = &[OPEN];

    fn leaf_type(&self) -> LeafType {
        OPEN
    }
}

#[test]
fn position_origin_and_neighbours() {
    assert_eq!(Position::ORIGIN.value(), 0);
    assert_eq!(Position::ORIGIN.next(), Position(1));
    assert_eq!(Position(5).prev(), Some(Position(4)));
    assert_eq!(Position::ORIGIN.prev(), None);
    assert_eq!(Position(7).to_string(), "#7");
}

#[test]
fn leaf_tags_match_variants() {
    assert_eq!(DoorEntry::Open.leaf_type(), OPEN);
    assert_eq!(DoorEntry::Close.leaf_type(), CLOSE);
    assert_eq!(WindowEntry::Open.leaf_type(), OPEN);
    assert_eq!(OPEN.to_string(), "Open");
}

#[test]
fn families_compare_by_type_not_name() {
    let door = JournalFamily::of::<DoorEntry>();
    let window = JournalFamily::of::<WindowEntry>();
    assert_eq!(door, JournalFamily::of::<DoorEntry>());
    assert_ne!(door, window);
    // Same leaf name in both tables.
    assert!(door.declares(OPEN));
    assert!(window.declares(OPEN));
    assert!(!window.declares(CLOSE));
    assert_eq!(door.to_string(), "door");
}

#[test]
fn manifest_keeps_daemons_in_declaration_order() {
    let manifest = BranchManifest::builder::<DoorEntry>("doorman")
        .produces([OPEN])
        .consumes([CLOSE])
        .requires("lock")
        .requires("bell")
        .requires("lock")
        .build()
        .unwrap();

    assert_eq!(manifest.name(), "doorman");
    assert_eq!(manifest.journal(), JournalFamily::of::<DoorEntry>());
    assert_eq!(
        manifest.required_daemons(),
        &[DaemonId::new("lock"), DaemonId::new("bell")]
    );
    assert_eq!(manifest.leaves().collect::<Vec<_>>(), vec![OPEN, CLOSE]);
}

#[test]
fn undeclared_leaf_names_family_and_branch() {
    let err = BranchManifest::builder::<WindowEntry>("glazier")
        .produces([CLOSE])
        .build()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "UndeclaredLeaf: Close is not a leaf of journal family 'window'. Add it to window::LEAVES or remove it from branch 'glazier'."
    );
}

#[test]
fn startup_failure_lists_rolled_back_daemons() {
    let err = Error::StartupFailed {
        daemon: DaemonId::new("bell"),
        reason: Box::new(Error::Internal("no power".into())),
        rolled_back: vec![DaemonId::new("lock"), DaemonId::new("light")],
    };
    let text = err.to_string();
    assert!(text.starts_with("daemon 'bell' failed to start: internal error: no power;"));
    assert!(text.contains("rolled back [lock, light]"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn shutdown_failure_joins_reasons() {
    let err = Error::ShutdownFailed {
        failures: vec![
            (DaemonId::new("lock"), "jammed".into()),
            (DaemonId::new("bell"), "stuck".into()),
        ],
    };
    assert_eq!(err.to_string(), "shutdown failed for [lock: jammed; bell: stuck]");
}

#[test]
fn only_cancellation_is_cancelled() {
    assert!(Error::Cancelled.is_cancelled());
    assert!(!Error::out_of_domain("t", OPEN).is_cancelled());
    assert!(!Error::daemon_failed(&DaemonId::new("d"), "x").is_cancelled());
}

#[test]
fn invalid_transition_message() {
    let err = Error::invalid_transition(
        &DaemonId::new("lock"),
        DaemonStatus::Completed,
        DaemonStatus::Running,
    );
    assert_eq!(err.to_string(), "daemon 'lock' cannot move from completed to running");
}

#[test]
fn violations_serialize_with_snake_case_code() {
    let mut report = ValidationReport::new();
    report.push(Violation::MultipleJournals {
        leaf: OPEN,
        families: vec!["door", "window"],
    });
    report.push(Violation::UnknownLeaf {
        leaf: CLOSE,
        usage: "terminal",
    });

    let json = serde_json::to_value(&report).unwrap();
    let items = json["violations"].as_array().unwrap();
    assert_eq!(items[0]["code"], "multiple_journals");
    assert_eq!(items[0]["leaf"], "Open");
    assert_eq!(items[0]["families"][1], "window");
    assert_eq!(items[1]["code"], "unknown_leaf");
    assert_eq!(report.with_code("UnknownLeaf").count(), 1);
    assert_eq!(report.violations()[1].leaf(), Some(CLOSE));
}

#[test]
fn daemon_status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&DaemonStatus::Running).unwrap(),
        "\"running\""
    );
    assert_eq!(
        serde_json::to_string(&DaemonId::new("lock")).unwrap(),
        "\"lock\""
    );
}
