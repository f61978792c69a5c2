//! Variable resolution
//!
//! Variables of a host come from its inheritance chain: the host itself, then its groups nearest
//! first, then the global `vars`. The first binding of a name along the chain wins.
//!
//! Bindings may reference each other in any order (`a = var.b + 1` before `b = 5`), so they are
//! evaluated in rounds. Each round evaluates every pending binding against the values known when
//! the round started. A binding that reads a `var.*` name that is not known yet is retried in the
//! next round, any other failure is final. Once a round makes no progress the remaining bindings
//! depend on something missing or on each other.
use crate::diagnostics::{Diagnostics, Issue};
use crate::eval::{AttributeBinding, EvalFailure, Scope};
use crate::intermediate::{Bindings, IntermediateGroup, IntermediateHost, IntermediateInventory};
use hcl::Value;
use indexmap::IndexMap;

/// Rounds allowed on top of the number of variables
const ROUND_SLACK: usize = 10;

/// Ordered levels of a host: host first, global last
pub struct InheritanceChain<'a, T> {
    pub levels: Vec<&'a T>,
}

impl<'a, T> InheritanceChain<'a, T> {
    /// Builds the chain by picking one item per level
    pub fn build(
        inventory: &'a IntermediateInventory,
        host: &'a IntermediateHost,
        select_host: impl Fn(&'a IntermediateHost) -> Option<&'a T>,
        select_group: impl Fn(&'a IntermediateGroup) -> Option<&'a T>,
        select_global: impl Fn(&'a IntermediateInventory) -> Option<&'a T>,
    ) -> Self {
        let mut levels = vec![];
        levels.extend(select_host(host));
        for group in &host.resolved_groups {
            if let Some(group) = inventory.groups.get(group) {
                levels.extend(select_group(group));
            }
        }
        levels.extend(select_global(inventory));

        Self { levels }
    }
}

/// Merges the variable levels of a host, first binding per name wins
pub fn merge_vars(inventory: &IntermediateInventory, host: &IntermediateHost) -> Bindings {
    let chain = InheritanceChain::build(
        inventory,
        host,
        |host| Some(&host.vars),
        |group| Some(&group.vars),
        |inventory| Some(&inventory.vars),
    );

    let mut merged = Bindings::new();
    for level in chain.levels {
        for (name, binding) in level {
            if !merged.contains_key(name) {
                merged.insert(name.clone(), binding.clone());
            }
        }
    }
    merged
}

/// Resolves the variables of one host, `None` if any of them failed
#[tracing::instrument(level = "debug", skip_all, fields(host = %host.name))]
pub fn resolve_vars(
    inventory: &IntermediateInventory,
    host: &IntermediateHost,
    diagnostics: &mut Diagnostics,
) -> Option<IndexMap<String, Value>> {
    let merged = merge_vars(inventory, host);
    let (evaluated, failures) = evaluate_fixpoint(&host.name, merged);

    let failed = failures.has_errors();
    diagnostics.extend(failures);

    if failed {
        return None;
    }

    Some(evaluated)
}

/// Evaluates bindings that may reference each other
pub fn evaluate_fixpoint(
    host_name: &str,
    bindings: Bindings,
) -> (IndexMap<String, Value>, Diagnostics) {
    // every progressing round resolves at least one binding, the bound only guards termination
    let max_rounds = bindings.len() + ROUND_SLACK;
    evaluate_rounds(host_name, bindings, max_rounds)
}

fn evaluate_rounds(
    host_name: &str,
    bindings: Bindings,
    max_rounds: usize,
) -> (IndexMap<String, Value>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut evaluated: IndexMap<String, Value> = IndexMap::new();
    let mut pending = bindings;
    let mut round = 0;

    while !pending.is_empty() {
        round += 1;
        let scope = Scope::new(host_name, evaluated.clone())
            .with_pending(pending.keys().cloned().collect());

        let step = evaluate_round(&scope, pending);
        tracing::trace!(
            round,
            resolved = step.resolved.len(),
            waiting = step.waiting.len(),
            "evaluation round"
        );

        let progressed = !step.resolved.is_empty();
        evaluated.extend(step.resolved);
        for (binding, failure) in step.failed {
            diagnostics.error(
                Issue::VariableEvaluation {
                    host: host_name.to_owned(),
                    name: binding.key.clone(),
                    message: failure.to_string(),
                },
                binding.location.clone(),
            );
        }

        if !progressed {
            for (binding, missing) in step.waiting {
                diagnostics.error(
                    Issue::UnresolvableVariable {
                        host: host_name.to_owned(),
                        name: binding.key.clone(),
                        missing: Some(missing),
                    },
                    binding.location.clone(),
                );
            }
            break;
        }

        if round >= max_rounds {
            for (binding, _) in step.waiting {
                diagnostics.error(
                    Issue::ResolutionLimit {
                        host: host_name.to_owned(),
                        name: binding.key.clone(),
                        rounds: round,
                    },
                    binding.location.clone(),
                );
            }
            break;
        }

        pending = step
            .waiting
            .into_iter()
            .map(|(binding, _)| (binding.key.clone(), binding))
            .collect();
    }

    (evaluated, diagnostics)
}

struct RoundResult {
    resolved: IndexMap<String, Value>,
    /// bindings to retry, with the name they were waiting for
    waiting: Vec<(AttributeBinding, String)>,
    failed: Vec<(AttributeBinding, EvalFailure)>,
}

/// One round: a pure function of the pending bindings and the values known so far
fn evaluate_round(scope: &Scope, pending: Bindings) -> RoundResult {
    let mut result = RoundResult {
        resolved: IndexMap::new(),
        waiting: vec![],
        failed: vec![],
    };

    for (name, binding) in pending {
        match binding.evaluate(scope) {
            Ok(value) => {
                result.resolved.insert(name, value);
            }
            Err(EvalFailure::NameNotFound { name: missing }) => {
                result.waiting.push((binding, missing));
            }
            Err(failure) => result.failed.push((binding, failure)),
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eval::test::binding;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn bindings(items: &[(&str, &str)]) -> Bindings {
        items
            .iter()
            .map(|(key, expr)| (key.to_string(), binding(key, expr)))
            .collect()
    }

    fn host_vars(
        documents: crate::hcl_documents::HclDocuments,
        host: &str,
    ) -> Option<IndexMap<String, Value>> {
        let mut diagnostics = Diagnostics::new();
        let mut inventory = IntermediateInventory::build(&documents, &mut diagnostics);
        assert!(!crate::validate::validate(&inventory, &mut diagnostics));
        crate::membership::resolve_memberships(&mut inventory);
        resolve_vars(&inventory, &inventory.hosts[host], &mut diagnostics)
    }

    #[test]
    fn precedence_host_group_global() {
        let with_all = hcl_documents!(
            r#"
            vars { x = 1 }
            group "g" {
              vars { x = 2 }
            }
            host "h" {
              groups = ["g"]
              vars { x = 3 }
            }
            "#
        );
        let without_host = hcl_documents!(
            r#"
            vars { x = 1 }
            group "g" {
              vars { x = 2 }
            }
            host "h" { groups = ["g"] }
            "#
        );
        let global_only = hcl_documents!(
            r#"
            vars { x = 1 }
            group "g" {}
            host "h" { groups = ["g"] }
            "#
        );

        assert_eq!(host_vars(with_all, "h").unwrap()["x"], Value::from(3));
        assert_eq!(host_vars(without_host, "h").unwrap()["x"], Value::from(2));
        assert_eq!(host_vars(global_only, "h").unwrap()["x"], Value::from(1));
    }

    #[test]
    fn nearest_group_wins() {
        let documents = hcl_documents!(
            r#"
            group "parent" {
              vars {
                x = "parent"
                y = "parent"
              }
            }
            group "child" {
              parent = "parent"
              vars { x = "child" }
            }
            host "h" { groups = ["child"] }
            "#
        );

        let vars = host_vars(documents, "h").unwrap();
        assert_eq!(vars["x"], Value::from("child"));
        assert_eq!(vars["y"], Value::from("parent"));
    }

    #[test]
    fn order_independent() {
        for items in [
            [("a", "var.b + 1"), ("b", "5")],
            [("b", "5"), ("a", "var.b + 1")],
        ] {
            let (values, diagnostics) = evaluate_fixpoint("h", bindings(&items));
            assert!(diagnostics.is_empty(), "{diagnostics}");
            assert_eq!(values["a"], Value::from(6));
            assert_eq!(values["b"], Value::from(5));
        }
    }

    #[test]
    fn whole_scope_waits_for_the_other_variables() {
        for items in [
            [("count", "length(var)"), ("b", "1")],
            [("b", "1"), ("count", "length(var)")],
        ] {
            let (values, diagnostics) = evaluate_fixpoint("h", bindings(&items));
            assert!(diagnostics.is_empty(), "{diagnostics}");
            assert_eq!(values["count"], Value::from(1u64));
        }

        let (values, diagnostics) = evaluate_fixpoint("h", bindings(&[("all", "var"), ("b", "1")]));
        assert!(diagnostics.is_empty(), "{diagnostics}");
        assert_eq!(
            values["all"],
            Value::Object([("b".to_owned(), Value::from(1))].into_iter().collect())
        );
    }

    #[test]
    fn two_whole_scope_reads_are_unresolvable() {
        let (values, diagnostics) =
            evaluate_fixpoint("h", bindings(&[("a", "length(var)"), ("b", "var")]));

        assert!(values.is_empty());
        assert_eq!(
            diagnostics.issues().cloned().collect::<Vec<_>>(),
            vec![
                Issue::UnresolvableVariable {
                    host: "h".into(),
                    name: "a".into(),
                    missing: Some("b".into()),
                },
                Issue::UnresolvableVariable {
                    host: "h".into(),
                    name: "b".into(),
                    missing: Some("a".into()),
                },
            ]
        );
    }

    #[test]
    fn round_limit_reports_what_is_left() {
        let (values, diagnostics) =
            evaluate_rounds("h", bindings(&[("a", "var.b"), ("b", "1")]), 1);

        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(
            diagnostics.issues().cloned().collect::<Vec<_>>(),
            vec![Issue::ResolutionLimit {
                host: "h".into(),
                name: "a".into(),
                rounds: 1,
            }]
        );
    }

    #[test]
    fn references_across_levels() {
        let documents = hcl_documents!(
            r#"
            vars {
              domain = "example.com"
              fqdn   = "${host.name}.${var.domain}"
            }
            host "web1" {
              vars { domain = "internal" }
            }
            "#
        );

        let vars = host_vars(documents, "web1").unwrap();
        assert_eq!(vars["fqdn"], Value::from("web1.internal"));
    }

    #[test]
    fn cycle_is_unresolvable() {
        let (values, diagnostics) =
            evaluate_fixpoint("h", bindings(&[("a", "var.b"), ("b", "var.a"), ("c", "1")]));

        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(
            diagnostics.issues().cloned().collect::<Vec<_>>(),
            vec![
                Issue::UnresolvableVariable {
                    host: "h".into(),
                    name: "a".into(),
                    missing: Some("b".into()),
                },
                Issue::UnresolvableVariable {
                    host: "h".into(),
                    name: "b".into(),
                    missing: Some("a".into()),
                },
            ]
        );
    }

    #[test]
    fn missing_name_is_unresolvable() {
        let (_, diagnostics) = evaluate_fixpoint("h", bindings(&[("a", "var.nope")]));

        assert_eq!(
            diagnostics.issues().cloned().collect::<Vec<_>>(),
            vec![Issue::UnresolvableVariable {
                host: "h".into(),
                name: "a".into(),
                missing: Some("nope".into()),
            }]
        );
    }

    #[test]
    fn evaluation_errors_drop_the_variable() {
        let (values, diagnostics) = evaluate_fixpoint(
            "h",
            bindings(&[("bad", r#""text" + 1"#), ("good", "2"), ("dependent", "var.bad")]),
        );

        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["good"]);
        let issues: Vec<_> = diagnostics.issues().collect();
        assert!(matches!(issues[0], Issue::VariableEvaluation { name, .. } if name == "bad"));
        assert!(matches!(issues[1], Issue::UnresolvableVariable { name, .. } if name == "dependent"));
    }

    #[test]
    fn long_chains_resolve() {
        // declared in reverse so every round resolves exactly one link
        let mut items = vec![];
        for index in (0..30).rev() {
            let expr = if index == 0 {
                "0".to_owned()
            } else {
                format!("var.v{} + 1", index - 1)
            };
            items.push((format!("v{index}"), expr));
        }
        let bindings: Bindings = items
            .iter()
            .map(|(key, expr)| (key.clone(), binding(key, expr)))
            .collect();

        let (values, diagnostics) = evaluate_fixpoint("h", bindings);
        assert!(diagnostics.is_empty(), "{diagnostics}");
        assert_eq!(values["v29"], Value::from(29));
    }

    #[test]
    fn failures_are_per_host() {
        let documents = hcl_documents!(
            r#"
            host "good" {
              vars { a = 1 }
            }
            host "bad" {
              vars { a = var.a }
            }
            "#
        );

        let mut diagnostics = Diagnostics::new();
        let mut inventory = IntermediateInventory::build(&documents, &mut diagnostics);
        crate::membership::resolve_memberships(&mut inventory);

        assert!(resolve_vars(&inventory, &inventory.hosts["good"], &mut diagnostics).is_some());
        assert!(resolve_vars(&inventory, &inventory.hosts["bad"], &mut diagnostics).is_none());
        assert_eq!(diagnostics.errors().count(), 1);
    }
}
