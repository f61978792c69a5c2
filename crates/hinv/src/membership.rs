//! Group membership closure
use crate::intermediate::IntermediateInventory;
use std::collections::{HashSet, VecDeque};

/// Fills `resolved_groups` of every host
///
/// Breadth first from the declared groups outwards, so closer groups come before their
/// ancestors. Inheritance uses this order as precedence. Expects a validated inventory: parents
/// exist and form no cycles.
pub fn resolve_memberships(inventory: &mut IntermediateInventory) {
    let IntermediateInventory { groups, hosts, .. } = inventory;

    for host in hosts.values_mut() {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = host
            .declared_groups
            .iter()
            .map(|(group, _)| group.as_str())
            .collect();
        let mut resolved = vec![];

        while let Some(group) = queue.pop_front() {
            if !visited.insert(group) {
                continue;
            }
            resolved.push(group.to_owned());

            if let Some(parent) = groups.get(group).and_then(|group| group.parent_name()) {
                if !visited.contains(parent) {
                    queue.push_back(parent);
                }
            }
        }

        tracing::trace!(host = %host.name, groups = ?resolved, "resolved group membership");
        host.resolved_groups = resolved;
    }
}
