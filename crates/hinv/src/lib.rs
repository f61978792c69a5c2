//! # hinv - hcl inventory
//!
//! Resolves a set of HCL documents describing hosts, groups, variables and connection settings into
//! an [Inventory] that automation tooling can query.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `hinv` works internally.
//!
//! ### Documents
//!
//! An inventory is written in plain HCL. Root blocks are `vars`, `transport "<kind>"`,
//! `escalate`, `group "<name>"` and `host "<name>"`. Groups and hosts may again contain `vars`,
//! `transport` and `escalate`.
//!
//! ```hcl
//! vars {
//!   domain = "example.com"
//! }
//!
//! transport "ssh" {
//!   host = "${host.name}.${var.domain}"
//!   user = "deploy"
//! }
//!
//! group "infra" {}
//!
//! group "web" {
//!   parent = "infra"
//!   vars {
//!     http_port = 8080
//!   }
//! }
//!
//! host "web1" {
//!   groups = ["web"]
//!   escalate {
//!     password = var.sudo_password
//!   }
//!   vars {
//!     sudo_password = "..."
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! Every document is parsed as a `body` ([hcl_edit::structure::Body]) and stored in
//! [hcl_documents::HclDocuments] together with its path and text. The text is kept so byte spans
//! can be turned into line and column numbers for [diagnostics::SourceLocation]. At this point the
//! documents only have to be valid HCL.
//!
//! ### Building
//!
//! see [intermediate::IntermediateInventory::build]
//!
//! Root blocks of all documents are classified against a fixed [schema] and turned into records
//! that still hold unevaluated expressions ([eval::AttributeBinding]). Unknown elements produce
//! warnings, duplicates produce errors. Only `parent` and `groups` are evaluated here, they must be
//! literals.
//!
//! ### Validation and membership
//!
//! [validate::validate] checks names first (empty, reserved `all`, host/group collisions) and then
//! references (unknown parents, unknown groups, parent cycles). Any error stops the resolution.
//!
//! [membership::resolve_memberships] expands the declared groups of each host to all ancestors,
//! nearest first. This order is the precedence used by everything inherited.
//!
//! ### Per host resolution
//!
//! Each host has an inheritance chain: the host, its groups nearest first, the global level.
//!
//! - [vars::resolve_vars] merges variables along the chain (first wins) and evaluates them in
//!   rounds until nothing changes, so variables may reference each other in any order.
//! - [transport::resolve_transport] merges the transport settings and builds a validated
//!   [transport::ConcreteTransport].
//! - [escalate::resolve_escalate] picks the nearest escalation password.
//!
//! Passwords and passphrases are handed to a [secrets::SecretSink] as soon as they are evaluated.
//! The CLI routes its log output through [secrets::Redacting] so they never show up in logs.
//!
//! A host that fails in any of those steps is left out, the error is recorded in
//! [diagnostics::Diagnostics] and resolution continues with the next host.
//!
//! ### Output
//!
//! [Inventory] holds the resolved [Host]s by name, by group and by target (host name, group name
//! or `all`). [Inventory::eval_context] provides an [hcl::eval::Context] with the vars of a host
//! and of every other host for callers that evaluate their own expressions.
//!
pub mod diagnostics;
pub mod escalate;
pub mod eval;
pub mod hcl_documents;
pub mod intermediate;
pub mod inventory;
pub mod keys;
pub mod membership;
pub mod resolver;
pub mod schema;
pub mod secrets;
pub mod transport;
mod util;
pub mod validate;
pub mod vars;
mod visit;

pub use diagnostics::{Diagnostic, Diagnostics, Issue, Severity};
pub use inventory::{Host, Inventory};
pub use resolver::{resolve, Resolution, ResolveOptions, Resolver};

/// Implicit group every host belongs to
pub const ALL: &str = "all";
