//! Static validation of a covenant graph.
//!
//! Runs before any runtime object exists. Every check runs and every
//! violation is collected, so one failed build lists everything to fix.

use crate::container::Container;
use crate::route::RouteDescriptor;
use covenant_core::{BranchManifest, JournalFamily, LeafType, ValidationReport, Violation};
use std::collections::BTreeSet;
use std::collections::HashSet;

/// Validate connected manifests against declared routes and terminals.
///
/// Checks, in report order: coverage (`DeadLetter`), uniqueness
/// (`AmbiguousDisposition`, `SelfRoute`), consumer satisfaction (`OrphanedConsumer`),
/// entry-journal uniqueness (`MultipleJournals`), transmuter registration
/// (`UnregisteredTransmuter`), then the structural checks `UnknownLeaf`,
/// `JournalMismatch`, `UnregisteredJournal` and `DuplicateBranch`.
pub fn validate(
    manifests: &[BranchManifest],
    routes: &[RouteDescriptor],
    terminals: &[LeafType],
    container: &Container,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let producers = index_by_leaf(manifests, |m| m.produces());
    let consumers = index_by_leaf(manifests, |m| m.consumes());
    let families = connected_families(manifests);
    let owners = leaf_owners(&families);

    // Coverage
    for (leaf, branches) in &producers {
        let routed = routes.iter().any(|r| r.source() == *leaf);
        if !routed && !terminals.contains(leaf) {
            report.push(Violation::DeadLetter {
                leaf: *leaf,
                branches: branches.clone(),
            });
        }
    }

    // Uniqueness
    let mut dispositions: Vec<LeafType> = Vec::new();
    for leaf in routes.iter().map(|r| r.source()).chain(terminals.iter().copied()) {
        if !dispositions.contains(&leaf) {
            dispositions.push(leaf);
        }
    }
    for leaf in dispositions {
        let routed = routes.iter().filter(|r| r.source() == leaf).count();
        let terminal = terminals.iter().filter(|t| **t == leaf).count();
        if routed + terminal > 1 {
            report.push(Violation::AmbiguousDisposition {
                leaf,
                routes: routed,
                terminals: terminal,
            });
        }
    }
    for route in routes {
        if route.source() == route.target() {
            report.push(Violation::SelfRoute { leaf: route.source() });
        }
    }

    // Consumer satisfaction
    for (leaf, branches) in &consumers {
        if !routes.iter().any(|r| r.target() == *leaf) {
            report.push(Violation::OrphanedConsumer {
                leaf: *leaf,
                branches: branches.clone(),
            });
        }
    }

    // Entry-journal uniqueness
    for (leaf, owning) in &owners {
        if owning.len() > 1 {
            report.push(Violation::MultipleJournals {
                leaf: *leaf,
                families: owning.iter().map(|f| f.name()).collect(),
            });
        }
    }

    // Transmuter registration
    for route in routes {
        if let Some(name) = route.invocation().transmuter_name() {
            if !route.transmuter_resolves(container) {
                report.push(Violation::UnregisteredTransmuter {
                    leaf: route.source(),
                    transmuter: name.to_string(),
                });
            }
        }
    }

    // Route and terminal leaves must belong to a connected family, and
    // routes must be typed against that family.
    let owner_of = |leaf: LeafType| owners.iter().find(|(l, _)| *l == leaf).map(|(_, f)| f);
    for route in routes {
        for (leaf, family, usage) in [
            (route.source(), route.source_family(), "route source"),
            (route.target(), route.target_family(), "route target"),
        ] {
            match owner_of(leaf) {
                None => report.push(Violation::UnknownLeaf { leaf, usage }),
                Some(owning) if !owning.contains(&family) => report.push(Violation::JournalMismatch {
                    leaf,
                    declared: owning[0].name(),
                    routed: family.name(),
                }),
                Some(_) => {}
            }
        }
    }
    for leaf in terminals {
        if owner_of(*leaf).is_none() {
            report.push(Violation::UnknownLeaf {
                leaf: *leaf,
                usage: "terminal",
            });
        }
    }

    for family in &families {
        if container.has_journal(family) {
            continue;
        }
        if let Some(manifest) = manifests.iter().find(|m| m.journal() == *family) {
            report.push(Violation::UnregisteredJournal {
                family: family.name(),
                branch: manifest.name().to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for manifest in manifests {
        if !seen.insert(manifest.name()) && reported.insert(manifest.name()) {
            report.push(Violation::DuplicateBranch {
                branch: manifest.name().to_string(),
            });
        }
    }

    report
}

/// Leaf → branch names, in first-seen order.
fn index_by_leaf<'a>(
    manifests: &'a [BranchManifest],
    leaves: impl Fn(&'a BranchManifest) -> &'a BTreeSet<LeafType>,
) -> Vec<(LeafType, Vec<String>)> {
    let mut index: Vec<(LeafType, Vec<String>)> = Vec::new();
    for manifest in manifests {
        for leaf in leaves(manifest) {
            let name = manifest.name().to_string();
            match index.iter_mut().find(|(l, _)| l == leaf) {
                Some((_, branches)) if !branches.contains(&name) => branches.push(name),
                Some(_) => {}
                None => index.push((*leaf, vec![name])),
            }
        }
    }
    index
}

/// Distinct journal families of the connected manifests, in connection order.
fn connected_families(manifests: &[BranchManifest]) -> Vec<JournalFamily> {
    let mut families: Vec<JournalFamily> = Vec::new();
    for manifest in manifests {
        if !families.contains(&manifest.journal()) {
            families.push(manifest.journal());
        }
    }
    families
}

/// Leaf → every connected family whose leaf table declares it.
fn leaf_owners(families: &[JournalFamily]) -> Vec<(LeafType, Vec<JournalFamily>)> {
    let mut owners: Vec<(LeafType, Vec<JournalFamily>)> = Vec::new();
    for family in families {
        for leaf in family.leaves() {
            match owners.iter_mut().find(|(l, _)| l == leaf) {
                Some((_, owning)) => owning.push(*family),
                None => owners.push((*leaf, vec![*family])),
            }
        }
    }
    owners
}
