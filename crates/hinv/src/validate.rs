//! Validation of an [IntermediateInventory] before resolution
//!
//! Runs in two phases. The structural phase checks every item on its own (names, reserved names,
//! host/group conflicts) and always runs to completion. The referential phase checks what items
//! point at (parents, host group references, parent cycles) and only runs when the structural
//! phase found no errors.
use crate::diagnostics::{Diagnostics, Issue};
use crate::intermediate::IntermediateInventory;
use std::collections::HashSet;

/// Returns true if validation found errors and resolution must not proceed
pub fn validate(inventory: &IntermediateInventory, diagnostics: &mut Diagnostics) -> bool {
    let mut structural = Diagnostics::new();
    validate_structure(inventory, &mut structural);
    let fatal = structural.has_errors();
    diagnostics.extend(structural);

    if fatal {
        tracing::debug!("structural errors found, skipping reference validation");
        return true;
    }

    let mut referential = Diagnostics::new();
    validate_references(inventory, &mut referential);
    let fatal = referential.has_errors();
    diagnostics.extend(referential);

    fatal
}

fn validate_structure(inventory: &IntermediateInventory, diagnostics: &mut Diagnostics) {
    for group in inventory.groups.values() {
        if group.name.is_empty() {
            diagnostics.error(Issue::EmptyName { kind: "group" }, group.location.clone());
        } else if group.name == crate::ALL {
            diagnostics.error(
                Issue::ReservedName {
                    kind: "group",
                    name: group.name.clone(),
                },
                group.location.clone(),
            );
        }
    }

    for host in inventory.hosts.values() {
        if host.name.is_empty() {
            diagnostics.error(Issue::EmptyName { kind: "host" }, host.location.clone());
        } else if host.name == crate::ALL {
            diagnostics.error(
                Issue::ReservedName {
                    kind: "host",
                    name: host.name.clone(),
                },
                host.location.clone(),
            );
        }

        if let Some(group) = inventory.groups.get(&host.name) {
            diagnostics.error(
                Issue::NameConflict(host.name.clone()),
                host.location.clone(),
            );
            diagnostics.error(
                Issue::NameConflict(group.name.clone()),
                group.location.clone(),
            );
        }
    }
}

fn validate_references(inventory: &IntermediateInventory, diagnostics: &mut Diagnostics) {
    for group in inventory.groups.values() {
        let Some(parent) = group.parent_name() else {
            continue;
        };

        if !inventory.groups.contains_key(parent) {
            let location = group.parent.as_ref().map(|(_, location)| location.clone());
            diagnostics.error(
                Issue::UnknownParent {
                    group: group.name.clone(),
                    parent: parent.to_owned(),
                },
                location,
            );
        }
    }

    for host in inventory.hosts.values() {
        for (group, location) in &host.declared_groups {
            if !inventory.groups.contains_key(group) {
                diagnostics.error(
                    Issue::UnknownGroup {
                        host: host.name.clone(),
                        group: group.clone(),
                    },
                    location.clone(),
                );
            }
        }
    }

    detect_cycles(inventory, diagnostics);
}

/// Walks the parent chain of every group depth first
///
/// Each walk keeps its own set of groups currently being visited. Reaching one of them again is
/// a cycle. A cycle is reported once, no matter from how many of its members it is reached.
fn detect_cycles(inventory: &IntermediateInventory, diagnostics: &mut Diagnostics) {
    let mut reported: HashSet<Vec<&str>> = HashSet::new();

    for start in inventory.groups.values() {
        let mut visiting: Vec<&str> = vec![];
        let mut current = Some(start.name.as_str());

        while let Some(name) = current {
            if let Some(position) = visiting.iter().position(|visited| *visited == name) {
                let cycle = &visiting[position..];

                let mut key = cycle.to_vec();
                key.sort_unstable();
                if reported.insert(key) {
                    let mut chain = cycle.join(" -> ");
                    chain.push_str(" -> ");
                    chain.push_str(name);

                    let location = inventory.groups.get(name).map(|g| g.location.clone());
                    diagnostics.error(Issue::CircularGroupReference(chain), location);
                }
                break;
            }

            visiting.push(name);
            current = inventory
                .groups
                .get(name)
                .and_then(|group| group.parent_name());
        }
    }
}
