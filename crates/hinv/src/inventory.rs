//! The resolved inventory
//!
//! Hosts are shared between the lookup tables through [Arc], so a host that is part of many groups
//! is stored once. Every table keeps declaration order.
use crate::escalate::EscalateConfig;
use crate::eval::{base_context, host_object, vars_object};
use crate::transport::ConcreteTransport;
use hcl::eval::Context;
use hcl::{Identifier, Value};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use std::sync::Arc;

/// A fully resolved host
#[derive(derive_new::new, Debug, Clone, PartialEq)]
pub struct Host {
    name: String,
    vars: IndexMap<String, Value>,
    transport: ConcreteTransport,
    escalate: EscalateConfig,
    groups: Vec<String>,
}

impl Host {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &IndexMap<String, Value> {
        &self.vars
    }

    pub fn transport(&self) -> &ConcreteTransport {
        &self.transport
    }

    pub fn escalate(&self) -> &EscalateConfig {
        &self.escalate
    }

    /// Every group the host belongs to, nearest first
    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

impl serde::ser::Serialize for Host {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(Some(5))?;
        ser.serialize_entry("name", &self.name)?;
        ser.serialize_entry("groups", &self.groups)?;
        ser.serialize_entry("vars", &self.vars)?;
        ser.serialize_entry("transport", &self.transport)?;
        ser.serialize_entry("escalate", &self.escalate)?;
        ser.end()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Inventory {
    hosts: IndexMap<String, Arc<Host>>,
    groups: IndexMap<String, Vec<Arc<Host>>>,
    targets: IndexMap<String, Vec<Arc<Host>>>,
}

impl Inventory {
    /// Builds the lookup tables, hosts are expected in declaration order
    pub fn assemble(hosts: impl IntoIterator<Item = Host>) -> Self {
        let mut inventory = Inventory::default();

        for host in hosts {
            let host = Arc::new(host);
            let name = host.name().to_owned();

            inventory
                .targets
                .insert(name.clone(), vec![host.clone()]);
            inventory
                .targets
                .entry(crate::ALL.to_owned())
                .or_default()
                .push(host.clone());

            for group in host.groups() {
                inventory
                    .groups
                    .entry(group.clone())
                    .or_default()
                    .push(host.clone());
                inventory
                    .targets
                    .entry(group.clone())
                    .or_default()
                    .push(host.clone());
            }

            inventory.hosts.insert(name, host);
        }

        inventory
    }

    pub fn host(&self, name: &str) -> Option<&Arc<Host>> {
        self.hosts.get(name)
    }

    pub fn hosts(&self) -> &IndexMap<String, Arc<Host>> {
        &self.hosts
    }

    /// Members of a declared group, never the implicit `all`
    pub fn group(&self, name: &str) -> Option<&[Arc<Host>]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Hosts addressed by a host name, a group name or `all`
    pub fn target(&self, name: &str) -> Option<&[Arc<Host>]> {
        self.targets.get(name).map(Vec::as_slice)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Arc<Host>])> {
        self.groups
            .iter()
            .map(|(name, hosts)| (name.as_str(), hosts.as_slice()))
    }

    pub fn targets(&self) -> impl Iterator<Item = (&str, &[Arc<Host>])> {
        self.targets
            .iter()
            .map(|(name, hosts)| (name.as_str(), hosts.as_slice()))
    }

    /// Evaluation context for expressions run on behalf of `host`
    ///
    /// Contains `var` (the vars of the host), `hostvars` (vars of every host by name), `host` and
    /// the function table. Callers stack their own layers on top with [Context::child].
    pub fn eval_context(&self, host: &str) -> Option<Context<'static>> {
        let host = self.host(host)?;

        let hostvars = Value::Object(
            self.hosts
                .iter()
                .map(|(name, host)| (name.clone(), vars_object(host.vars())))
                .collect(),
        );

        let mut context = base_context();
        context.declare_var(Identifier::unchecked("var"), vars_object(host.vars()));
        context.declare_var(Identifier::unchecked("hostvars"), hostvars);
        context.declare_var(Identifier::unchecked("host"), host_object(host.name()));
        Some(context)
    }
}
