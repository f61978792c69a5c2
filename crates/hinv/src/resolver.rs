//! Document set to [Inventory]
//!
//! 1. build the intermediate inventory (classification, duplicates, literal attributes)
//! 2. validate names and references, stop on any error
//! 3. resolve group memberships
//! 4. per host: variables, then transport and escalation against those variables
//! 5. assemble the lookup tables from the hosts that resolved completely
use crate::diagnostics::Diagnostics;
use crate::escalate::resolve_escalate;
use crate::eval::Scope;
use crate::hcl_documents::HclDocuments;
use crate::intermediate::{IntermediateHost, IntermediateInventory};
use crate::inventory::{Host, Inventory};
use crate::keys::{FileKeyCache, KeyCache};
use crate::membership::resolve_memberships;
use crate::secrets::{SecretFilter, SecretSink};
use crate::transport::{resolve_transport, TransportContext, TransportDefaults};
use crate::validate::validate;
use crate::vars::resolve_vars;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ResolveOptions {
    /// used when a ssh transport sets no `connection_timeout`
    pub default_connection_timeout: Duration,
    /// used when a ssh transport sets no `known_hosts_path`
    pub default_known_hosts_path: PathBuf,
    pub secrets: Arc<dyn SecretSink>,
    pub keys: Arc<dyn KeyCache>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        let transport = TransportDefaults::default();
        Self {
            default_connection_timeout: transport.connection_timeout,
            default_known_hosts_path: transport.known_hosts_path,
            secrets: SecretFilter::global(),
            keys: FileKeyCache::global(),
        }
    }
}

/// Outcome of a resolution, `inventory` is only set when there are no errors
#[derive(Debug)]
pub struct Resolution {
    pub inventory: Option<Inventory>,
    pub diagnostics: Diagnostics,
}

impl Resolution {
    /// Turns the resolution into a result, errors carry all diagnostics
    pub fn into_result(self) -> Result<(Inventory, Diagnostics), Diagnostics> {
        match self.inventory {
            Some(inventory) => Ok((inventory, self.diagnostics)),
            None => Err(self.diagnostics),
        }
    }
}

#[derive(derive_new::new, Clone, Default)]
pub struct Resolver {
    options: ResolveOptions,
}

impl Resolver {
    #[tracing::instrument(level = "debug", skip_all, fields(sources = documents.source_count()))]
    pub fn resolve(&self, documents: &HclDocuments) -> Resolution {
        let mut diagnostics = Diagnostics::new();

        let mut intermediate = IntermediateInventory::build(documents, &mut diagnostics);
        let invalid = validate(&intermediate, &mut diagnostics);
        if invalid || diagnostics.has_errors() {
            tracing::debug!(errors = diagnostics.errors().count(), "validation failed");
            return Resolution {
                inventory: None,
                diagnostics,
            };
        }

        resolve_memberships(&mut intermediate);

        let defaults = TransportDefaults {
            connection_timeout: self.options.default_connection_timeout,
            known_hosts_path: self.options.default_known_hosts_path.clone(),
        };
        let context = TransportContext {
            defaults: &defaults,
            keys: self.options.keys.as_ref(),
            secrets: self.options.secrets.as_ref(),
        };

        let mut hosts = vec![];
        let mut failed = 0;
        for host in intermediate.hosts.values() {
            match self.resolve_host(&intermediate, host, &context, &mut diagnostics) {
                Some(host) => hosts.push(host),
                None => failed += 1,
            }
        }

        tracing::info!(
            resolved = hosts.len(),
            failed,
            groups = intermediate.groups.len(),
            "resolved inventory"
        );

        let inventory = (!diagnostics.has_errors()).then(|| Inventory::assemble(hosts));
        Resolution {
            inventory,
            diagnostics,
        }
    }

    /// All components of one host, `None` if any of them failed
    fn resolve_host(
        &self,
        intermediate: &IntermediateInventory,
        host: &IntermediateHost,
        context: &TransportContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Host> {
        let vars = resolve_vars(intermediate, host, diagnostics)?;
        let scope = Scope::new(&host.name, vars);

        // both run even if the other failed, so every problem of the host is reported
        let transport = resolve_transport(intermediate, host, &scope, context, diagnostics);
        let escalate = resolve_escalate(
            intermediate,
            host,
            &scope,
            self.options.secrets.as_ref(),
            diagnostics,
        );

        Some(Host::new(
            host.name.clone(),
            scope.vars().clone(),
            transport?,
            escalate?,
            host.resolved_groups.clone(),
        ))
    }
}

/// Resolves with the process-wide secret filter and key cache
pub fn resolve(documents: &HclDocuments) -> Resolution {
    Resolver::default().resolve(documents)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diagnostics::Issue;
    use crate::hcl_documents;
    use crate::transport::{AuthMethod, ConcreteTransport, LocalTransport};
    use pretty_assertions::assert_eq;

    fn resolver() -> (Resolver, Arc<SecretFilter>) {
        let secrets = Arc::new(SecretFilter::default());
        let resolver = Resolver::new(ResolveOptions {
            secrets: secrets.clone(),
            keys: Arc::new(FileKeyCache::default()),
            ..Default::default()
        });
        (resolver, secrets)
    }

    #[test]
    fn resolves_hosts() {
        let (resolver, _) = resolver();
        let resolution = resolver.resolve(&hcl_documents!(
            r#"
            vars { env = "prod" }
            group "web" {
              vars { role = "web" }
            }
            host "web1" { groups = ["web"] }
            host "db1" {}
            "#
        ));

        assert!(resolution.diagnostics.is_empty(), "{}", resolution.diagnostics);
        let inventory = resolution.inventory.unwrap();
        let web1 = inventory.host("web1").unwrap();
        assert_eq!(web1.vars()["env"], hcl::Value::from("prod"));
        assert_eq!(web1.vars()["role"], hcl::Value::from("web"));
        assert_eq!(web1.groups(), ["web"]);
        assert_eq!(web1.transport(), &ConcreteTransport::Local(LocalTransport));
        assert!(!inventory.host("db1").unwrap().vars().contains_key("role"));
    }

    #[test]
    fn validation_errors_stop_resolution() {
        let (resolver, _) = resolver();
        let resolution = resolver.resolve(&hcl_documents!(
            r#"
            group "a" { parent = "b" }
            group "b" { parent = "a" }
            host "h" {
              vars { never = var.evaluated }
            }
            "#
        ));

        assert!(resolution.inventory.is_none());
        let issues: Vec<_> = resolution.diagnostics.issues().collect();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], Issue::CircularGroupReference(_)));
    }

    #[test]
    fn one_failing_host_fails_the_inventory() {
        let (resolver, secrets) = resolver();
        let resolution = resolver.resolve(&hcl_documents!(
            r#"
            host "good" {
              escalate { password = "hunter2" }
            }
            host "bad" {
              transport "ssh" { host = "bad" }
            }
            "#
        ));

        assert!(resolution.inventory.is_none());
        assert_eq!(resolution.diagnostics.errors().count(), 1);
        assert_eq!(secrets.filter("hunter2"), "********");
    }

    #[test]
    fn hosts_share_private_keys() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("id_ed25519");
        std::fs::write(&key_path, "PRIVATE KEY").unwrap();

        let keys = Arc::new(FileKeyCache::default());
        let resolver = Resolver::new(ResolveOptions {
            secrets: Arc::new(SecretFilter::default()),
            keys: keys.clone(),
            ..Default::default()
        });
        let resolution = resolver.resolve(&hcl_documents!(format!(
            r#"
            transport "ssh" {{
              host             = host.name
              user             = "deploy"
              private_key_path = "{}"
            }}
            host "web1" {{}}
            host "web2" {{}}
            "#,
            key_path.display()
        )));

        assert!(resolution.diagnostics.is_empty(), "{}", resolution.diagnostics);
        assert_eq!(keys.len(), 1);

        let inventory = resolution.inventory.unwrap();
        let key_of = |name: &str| match inventory.host(name).unwrap().transport() {
            ConcreteTransport::Ssh(ssh) => match &ssh.auth()[0] {
                AuthMethod::PrivateKey { key, .. } => key.clone(),
                other => panic!("unexpected auth {other:?}"),
            },
            other => panic!("unexpected transport {other:?}"),
        };
        assert!(Arc::ptr_eq(&key_of("web1"), &key_of("web2")));
    }

    #[test]
    fn warnings_keep_the_inventory() {
        let (resolver, _) = resolver();
        let resolution = resolver.resolve(&hcl_documents!(
            r#"
            unknown = 1
            host "h" {}
            "#
        ));

        assert_eq!(resolution.diagnostics.len(), 1);
        let (inventory, _) = resolution.into_result().unwrap();
        assert!(inventory.host("h").is_some());
    }
}
