//! Intermediate inventory: classified blocks turned into records of unevaluated expressions
//!
//! [IntermediateInventory::build] walks the root body of all documents and produces one record per
//! `host`, `group`, `transport` and `escalate` block. Nothing is evaluated here except the two
//! attributes that have to be literal (`parent` and `groups`), so every later stage can work on
//! names and relations without touching variables.
use crate::diagnostics::{Diagnostics, Issue, SourceLocation};
use crate::eval::AttributeBinding;
use crate::hcl_documents::HclDocuments;
use crate::schema::{self, BodyContent, Located};
use crate::util::type_name;
use hcl_edit::structure::{Attribute, Block};
use indexmap::IndexMap;

pub type Bindings = IndexMap<String, AttributeBinding>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    Ssh,
}

impl TransportKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "local" => Some(Self::Local),
            "ssh" => Some(Self::Ssh),
            _ => None,
        }
    }

    /// Settings a transport block of this kind accepts
    pub fn settings(&self) -> &'static [&'static str] {
        match self {
            TransportKind::Local => &[],
            TransportKind::Ssh => &[
                "host",
                "port",
                "user",
                "connection_timeout",
                "use_known_hosts",
                "known_hosts_path",
                "add_unknown_hosts",
                "private_key_path",
                "private_key_pass",
                "password",
                "use_agent",
            ],
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Local => f.write_str("local"),
            TransportKind::Ssh => f.write_str("ssh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateTransport {
    pub kind: TransportKind,
    pub config: Bindings,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateEscalate {
    pub password: Option<AttributeBinding>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateHost {
    pub name: String,
    pub vars: Bindings,
    pub transport: Option<IntermediateTransport>,
    pub escalate: Option<IntermediateEscalate>,
    pub declared_groups: Vec<(String, SourceLocation)>,
    /// closure of `declared_groups` over group parents, nearest first
    pub resolved_groups: Vec<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateGroup {
    pub name: String,
    pub parent: Option<(String, SourceLocation)>,
    pub vars: Bindings,
    pub transport: Option<IntermediateTransport>,
    pub escalate: Option<IntermediateEscalate>,
    pub location: SourceLocation,
}

impl IntermediateGroup {
    /// Parent group, `None` if unset or the implicit `all`
    pub fn parent_name(&self) -> Option<&str> {
        self.parent
            .as_ref()
            .map(|(parent, _)| parent.as_str())
            .filter(|parent| !parent.is_empty() && *parent != crate::ALL)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntermediateInventory {
    pub vars: Bindings,
    pub transport: Option<IntermediateTransport>,
    pub escalate: Option<IntermediateEscalate>,
    pub groups: IndexMap<String, IntermediateGroup>,
    pub hosts: IndexMap<String, IntermediateHost>,
}

/// Settings shared by the root, groups and hosts
struct Level {
    vars: Bindings,
    transport: Option<IntermediateTransport>,
    escalate: Option<IntermediateEscalate>,
}

impl IntermediateInventory {
    pub fn build(documents: &HclDocuments, diagnostics: &mut Diagnostics) -> Self {
        let root = schema::classify_documents(documents, &schema::ROOT, diagnostics);
        let level = build_level(&root, diagnostics);

        let mut inventory = IntermediateInventory {
            vars: level.vars,
            transport: level.transport,
            escalate: level.escalate,
            ..Default::default()
        };

        for block in root.blocks_of("group") {
            let group = build_group(block, diagnostics);
            if inventory.groups.contains_key(&group.name) {
                diagnostics.error(Issue::DuplicateGroup(group.name), group.location);
                continue;
            }
            inventory.groups.insert(group.name.clone(), group);
        }

        for block in root.blocks_of("host") {
            let host = build_host(block, diagnostics);
            if inventory.hosts.contains_key(&host.name) {
                diagnostics.error(Issue::DuplicateHost(host.name), host.location);
                continue;
            }
            inventory.hosts.insert(host.name.clone(), host);
        }

        tracing::debug!(
            groups = inventory.groups.len(),
            hosts = inventory.hosts.len(),
            "intermediate inventory built"
        );

        inventory
    }
}

fn build_group(block: Located<'_, Block>, diagnostics: &mut Diagnostics) -> IntermediateGroup {
    let content = block.classify(&schema::GROUP, diagnostics);
    let level = build_level(&content, diagnostics);

    let parent = content.attribute("parent").and_then(|attribute| {
        let binding = binding(attribute);
        let value = static_string(&binding, diagnostics)?;
        Some((value, binding.location))
    });

    IntermediateGroup {
        name: block.label().unwrap_or_default().to_owned(),
        parent,
        vars: level.vars,
        transport: level.transport,
        escalate: level.escalate,
        location: block.location(),
    }
}

fn build_host(block: Located<'_, Block>, diagnostics: &mut Diagnostics) -> IntermediateHost {
    let content = block.classify(&schema::HOST, diagnostics);
    let level = build_level(&content, diagnostics);

    let declared_groups = content
        .attribute("groups")
        .map(|attribute| {
            let binding = binding(attribute);
            static_string_list(&binding, diagnostics)
                .into_iter()
                .filter(|group| group != crate::ALL)
                .map(|group| (group, binding.location.clone()))
                .collect()
        })
        .unwrap_or_default();

    IntermediateHost {
        name: block.label().unwrap_or_default().to_owned(),
        vars: level.vars,
        transport: level.transport,
        escalate: level.escalate,
        declared_groups,
        resolved_groups: vec![],
        location: block.location(),
    }
}

fn build_level(content: &BodyContent<'_>, diagnostics: &mut Diagnostics) -> Level {
    let mut vars = Bindings::new();
    for block in content.blocks_of("vars") {
        let vars_content = block.classify(&schema::VARIABLES, diagnostics);
        for attribute in vars_content.attributes.into_values() {
            let binding = binding(attribute);
            if vars.contains_key(&binding.key) {
                diagnostics.error(Issue::DuplicateVariable(binding.key), binding.location);
                continue;
            }
            vars.insert(binding.key.clone(), binding);
        }
    }

    let mut transport = None;
    for block in content.blocks_of("transport") {
        let Some(built) = build_transport(block, diagnostics) else {
            continue;
        };
        if transport.is_some() {
            diagnostics.error(Issue::DuplicateTransport, built.location);
            continue;
        }
        transport = Some(built);
    }

    let mut escalate = None;
    for block in content.blocks_of("escalate") {
        let escalate_content = block.classify(&schema::ESCALATION, diagnostics);
        let built = IntermediateEscalate {
            password: escalate_content.attribute("password").map(binding),
            location: block.location(),
        };
        if escalate.is_some() {
            diagnostics.error(Issue::DuplicateEscalate, built.location);
            continue;
        }
        escalate = Some(built);
    }

    Level {
        vars,
        transport,
        escalate,
    }
}

fn build_transport(
    block: Located<'_, Block>,
    diagnostics: &mut Diagnostics,
) -> Option<IntermediateTransport> {
    let label = block.label().unwrap_or_default();
    let Some(kind) = TransportKind::parse(label) else {
        diagnostics.error(
            Issue::UnknownTransportKind(label.to_owned()),
            block.location(),
        );
        return None;
    };

    let content = block.classify(&schema::TRANSPORT_SETTINGS, diagnostics);
    let mut config = Bindings::new();
    for attribute in content.attributes.into_values() {
        if !kind.settings().contains(&attribute.key()) {
            diagnostics.warning(
                Issue::UnknownTransportSetting {
                    kind: kind.to_string(),
                    key: attribute.key().to_owned(),
                },
                attribute.location(),
            );
            continue;
        }
        let binding = binding(attribute);
        config.insert(binding.key.clone(), binding);
    }

    Some(IntermediateTransport {
        kind,
        config,
        location: block.location(),
    })
}

fn binding(attribute: Located<'_, Attribute>) -> AttributeBinding {
    AttributeBinding::new(
        attribute.key(),
        attribute.item.value.clone().into(),
        attribute.location(),
    )
}

fn static_string(binding: &AttributeBinding, diagnostics: &mut Diagnostics) -> Option<String> {
    let issue = |message: String| Issue::InvalidStaticAttribute {
        attribute: "parent",
        expected: "a literal string",
        message,
    };

    match binding.evaluate_static() {
        Ok(hcl::Value::String(value)) => Some(value),
        Ok(other) => {
            diagnostics.error(
                issue(format!("found {}", type_name(&other))),
                binding.location.clone(),
            );
            None
        }
        Err(failure) => {
            diagnostics.error(issue(failure.to_string()), binding.location.clone());
            None
        }
    }
}

fn static_string_list(binding: &AttributeBinding, diagnostics: &mut Diagnostics) -> Vec<String> {
    let issue = |message: String| Issue::InvalidStaticAttribute {
        attribute: "groups",
        expected: "a literal list of strings",
        message,
    };

    let elements = match binding.evaluate_static() {
        Ok(hcl::Value::Array(elements)) => elements,
        Ok(other) => {
            diagnostics.error(
                issue(format!("found {}", type_name(&other))),
                binding.location.clone(),
            );
            return vec![];
        }
        Err(failure) => {
            diagnostics.error(issue(failure.to_string()), binding.location.clone());
            return vec![];
        }
    };

    let mut names = vec![];
    for element in elements {
        match element {
            hcl::Value::String(name) => names.push(name),
            other => diagnostics.error(
                issue(format!("found {} element", type_name(&other))),
                binding.location.clone(),
            ),
        }
    }
    names
}
