//! Resolution of complete document sets
//!
//! `fixtures/site` is a small multi-file inventory, every file in `fixtures/valid` has to resolve
//! on its own without any diagnostics.

use hinv::hcl_documents::HclDocuments;
use hinv::keys::FileKeyCache;
use hinv::secrets::SecretFilter;
use hinv::transport::{AuthMethod, ConcreteTransport, LocalTransport};
use hinv::{Resolution, ResolveOptions, Resolver};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn resolver(secrets: Arc<SecretFilter>) -> Resolver {
    Resolver::new(ResolveOptions {
        default_connection_timeout: Duration::from_secs(10),
        default_known_hosts_path: "/etc/ssh/ssh_known_hosts".into(),
        secrets,
        keys: Arc::new(FileKeyCache::default()),
    })
}

fn site() -> (Resolution, Arc<SecretFilter>) {
    let mut documents = HclDocuments::default();
    documents
        .load_directory(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/site"))
        .expect("fixtures must load");
    assert_eq!(documents.source_count(), 3);

    let secrets = Arc::new(SecretFilter::default());
    (resolver(secrets.clone()).resolve(&documents), secrets)
}

fn issues(text: &str) -> Vec<String> {
    let resolution = resolver(Arc::default()).resolve(&hinv::hcl_documents!(text));
    assert!(resolution.inventory.is_none(), "resolution must fail");
    resolution
        .diagnostics
        .issues()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn site_resolves() {
    let (resolution, _) = site();
    assert!(resolution.diagnostics.is_empty(), "{}", resolution.diagnostics);

    let inventory = resolution.inventory.unwrap();
    let hosts: Vec<_> = inventory.hosts().keys().map(String::as_str).collect();
    assert_eq!(hosts, vec!["web1", "web2", "db1", "localhost"]);

    let groups = inventory
        .groups()
        .map(|(group, hosts)| {
            let names: Vec<_> = hosts.iter().map(|host| host.name()).collect();
            format!("{group}: {}", names.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(groups, @r###"
    frontend: web1
    web: web1, web2
    infra: web1, web2, db1
    db: db1
    "###);
}

#[test]
fn variables_are_inherited() {
    let (resolution, _) = site();
    let inventory = resolution.inventory.unwrap();

    let web1 = inventory.host("web1").unwrap();
    assert_eq!(web1.groups(), ["frontend", "web", "infra"]);
    assert_eq!(web1.vars()["fqdn"], hcl::Value::from("web1.example.com"));
    assert_eq!(web1.vars()["http_port"], hcl::Value::from(8080));
    assert_eq!(web1.vars()["datacenter"], hcl::Value::from("fra1"));

    let web2 = inventory.host("web2").unwrap();
    assert_eq!(web2.vars()["http_port"], hcl::Value::from(9090));

    let localhost = inventory.host("localhost").unwrap();
    assert!(localhost.groups().is_empty());
    assert!(!localhost.vars().contains_key("datacenter"));
}

#[test]
fn transports_are_merged() {
    let (resolution, _) = site();
    let inventory = resolution.inventory.unwrap();

    let web1 = inventory.host("web1").unwrap().transport().as_ssh().unwrap();
    assert_eq!(web1.host(), "web1.example.com");
    assert_eq!(web1.user(), "deploy");
    assert_eq!(web1.port(), 22);
    assert_eq!(web1.connection_timeout(), Duration::from_secs(10));
    assert_eq!(web1.auth(), &[AuthMethod::Agent]);

    let db1 = inventory.host("db1").unwrap().transport().as_ssh().unwrap();
    assert_eq!(db1.host(), "db1.example.com");
    assert_eq!(db1.port(), 2222);
    assert_eq!(db1.connection_timeout(), Duration::from_secs(90));

    assert_eq!(
        inventory.host("localhost").unwrap().transport(),
        &ConcreteTransport::Local(LocalTransport)
    );
}

#[test]
fn escalation_password_is_redacted() {
    let (resolution, secrets) = site();
    let inventory = resolution.inventory.unwrap();

    assert_eq!(
        inventory.host("db1").unwrap().escalate().password(),
        Some("s3cret")
    );
    assert!(!inventory.host("web1").unwrap().escalate().is_enabled());
    assert_eq!(secrets.filter("echo s3cret | sudo -S"), "echo ******** | sudo -S");
}

#[test]
fn targets() {
    let (resolution, _) = site();
    let inventory = resolution.inventory.unwrap();

    for target in ["web1", "frontend", "web", "infra", "all"] {
        let hosts = inventory.target(target).unwrap();
        assert!(
            hosts.iter().any(|host| host.name() == "web1"),
            "`{target}` must contain web1"
        );
    }

    assert_eq!(inventory.target("all").unwrap().len(), 4);
    assert!(inventory.group("all").is_none());
    assert!(inventory.target("unknown").is_none());
}

#[test]
fn serialized_host() {
    let (resolution, _) = site();
    let inventory = resolution.inventory.unwrap();

    let db1 = serde_json::to_value(&**inventory.host("db1").unwrap()).unwrap();
    assert_eq!(
        db1["transport"],
        serde_json::json!({
            "kind": "ssh",
            "host": "db1.example.com",
            "port": 2222,
            "user": "deploy",
            "connection_timeout": "1m 30s",
            "auth": ["agent"],
            "known_hosts": "/etc/ssh/ssh_known_hosts",
            "add_unknown_hosts": false,
        })
    );
    assert_eq!(db1["escalate"], serde_json::json!({ "password": true }));
}

#[test]
fn valid_documents() {
    insta::glob!("fixtures/valid/*.hcl", |path| {
        let mut documents = HclDocuments::default();
        documents.load_file(path).unwrap();

        let secrets = Arc::new(SecretFilter::default());
        let resolution = resolver(secrets.clone()).resolve(&documents);
        assert!(
            resolution.diagnostics.is_empty(),
            "{}: {}",
            path.display(),
            resolution.diagnostics
        );
        let inventory = resolution.inventory.expect("inventory");

        // every host is a target of its own and part of `all`
        for name in inventory.hosts().keys() {
            assert_eq!(inventory.target(name).unwrap().len(), 1);
            assert!(inventory
                .target(hinv::ALL)
                .unwrap()
                .iter()
                .any(|host| host.name() == name));
        }

        if let Some(bastion) = inventory.host("bastion") {
            assert_eq!(secrets.filter("not-in-logs"), "********");
            assert!(!bastion.escalate().is_enabled());
        }
        if let Some(app1) = inventory.host("app1") {
            assert_eq!(
                app1.vars()["url"],
                hcl::Value::from("https://app1.apps.internal:443")
            );
        }
    });
}

#[test]
fn circular_groups() {
    insta::assert_debug_snapshot!(issues(r#"
        group "a" { parent = "b" }
        group "b" { parent = "a" }
        host "h" { groups = ["a"] }
    "#), @r###"
    [
        "circular group reference: a -> b -> a",
    ]
    "###);
}

#[test]
fn host_and_group_names_collide() {
    assert_eq!(
        issues(
            r#"
            group "web" {}
            host "web" {}
            "#
        ),
        vec![
            "name conflict: `web` is declared as both a host and a group",
            "name conflict: `web` is declared as both a host and a group",
        ]
    );
}

#[test]
fn circular_variables() {
    insta::assert_debug_snapshot!(issues(r#"
        host "h" {
          vars {
            a = var.b
            b = var.a
          }
        }
    "#), @r###"
    [
        "host `h`: variable `a` is unresolvable due to missing or circular dependency (references `var.b`)",
        "host `h`: variable `b` is unresolvable due to missing or circular dependency (references `var.a`)",
    ]
    "###);
}

#[test]
fn ssh_requires_host_and_user() {
    assert_eq!(
        issues(
            r#"
            transport "ssh" { port = 2200 }
            host "h" {}
            "#
        ),
        vec![
            "host `h`: transport `ssh` requires setting `host`",
            "host `h`: transport `ssh` requires setting `user`",
        ]
    );
}

#[test]
fn diagnostics_point_at_the_source() {
    let documents = hinv::hcl_documents! {
        "groups.hcl" => "group \"web\" {}\n",
        "hosts.hcl" => "host \"web1\" {}\nhost \"web1\" {}\n"
    };
    let resolution = resolver(Arc::default()).resolve(&documents);

    let rendered: Vec<_> = resolution
        .diagnostics
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        rendered,
        vec!["error: host `web1` is declared more than once (hosts.hcl:2:1)"]
    );
}
