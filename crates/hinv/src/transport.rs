//! Transport resolution
//!
//! The transport of a host is merged along its inheritance chain. The first level that declares a
//! transport decides the kind, levels declaring a different kind are skipped, levels of the same
//! kind contribute settings (first write wins). Without any transport block a host is reached
//! through [ConcreteTransport::Local].
//!
//! Every setting is an expression evaluated against the host's resolved variables.
use crate::diagnostics::{Diagnostics, Issue};
use crate::eval::Scope;
use crate::intermediate::{
    Bindings, IntermediateHost, IntermediateInventory, IntermediateTransport, TransportKind,
};
use crate::keys::KeyCache;
use crate::secrets::SecretSink;
use crate::util::type_name;
use crate::vars::InheritanceChain;
use hcl::Value;
use serde::ser::SerializeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum ConcreteTransport {
    Local(LocalTransport),
    Ssh(SshTransport),
}

impl ConcreteTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            ConcreteTransport::Local(_) => TransportKind::Local,
            ConcreteTransport::Ssh(_) => TransportKind::Ssh,
        }
    }

    pub fn as_ssh(&self) -> Option<&SshTransport> {
        match self {
            ConcreteTransport::Ssh(ssh) => Some(ssh),
            ConcreteTransport::Local(_) => None,
        }
    }
}

/// Commands run on the machine running the tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTransport;

#[derive(Clone, PartialEq)]
pub enum AuthMethod {
    PrivateKey {
        path: PathBuf,
        key: Arc<str>,
        passphrase: Option<String>,
    },
    Password(String),
    Agent,
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::PrivateKey {
                path, passphrase, ..
            } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("encrypted", &passphrase.is_some())
                .finish_non_exhaustive(),
            AuthMethod::Password(_) => f.write_str("Password"),
            AuthMethod::Agent => f.write_str("Agent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownHosts {
    /// host keys are not checked
    Ignore,
    Verify { path: PathBuf, add_unknown: bool },
}

/// Everything needed to open an ssh connection
#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub connection_timeout: Duration,
    pub auth: Vec<AuthMethod>,
    pub known_hosts: KnownHosts,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("ssh host must not be empty")]
    EmptyHost,
    #[error("ssh user must not be empty")]
    EmptyUser,
    #[error("ssh port must not be 0")]
    InvalidPort,
    #[error("connection timeout must not be zero")]
    ZeroTimeout,
    #[error("no authentication method configured")]
    NoAuthMethod,
    #[error("known hosts verification requires a known hosts path")]
    EmptyKnownHostsPath,
}

/// A validated ssh configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Result<Self, TransportError> {
        if config.host.is_empty() {
            return Err(TransportError::EmptyHost);
        }
        if config.user.is_empty() {
            return Err(TransportError::EmptyUser);
        }
        if config.port == 0 {
            return Err(TransportError::InvalidPort);
        }
        if config.connection_timeout.is_zero() {
            return Err(TransportError::ZeroTimeout);
        }
        if config.auth.is_empty() {
            return Err(TransportError::NoAuthMethod);
        }
        if let KnownHosts::Verify { path, .. } = &config.known_hosts {
            if path.as_os_str().is_empty() {
                return Err(TransportError::EmptyKnownHostsPath);
            }
        }

        Ok(Self { config })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn user(&self) -> &str {
        &self.config.user
    }

    pub fn connection_timeout(&self) -> Duration {
        self.config.connection_timeout
    }

    pub fn auth(&self) -> &[AuthMethod] {
        &self.config.auth
    }

    pub fn known_hosts(&self) -> &KnownHosts {
        &self.config.known_hosts
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

/// Engine-wide fallbacks for optional transport settings
#[derive(Debug, Clone)]
pub struct TransportDefaults {
    pub connection_timeout: Duration,
    pub known_hosts_path: PathBuf,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            known_hosts_path: expand_home(Path::new("~/.ssh/known_hosts")),
        }
    }
}

/// Shared collaborators of transport resolution
pub struct TransportContext<'a> {
    pub defaults: &'a TransportDefaults,
    pub keys: &'a dyn KeyCache,
    pub secrets: &'a dyn SecretSink,
}

/// Merges the transport blocks along the inheritance chain of a host
pub fn merge_transport(
    inventory: &IntermediateInventory,
    host: &IntermediateHost,
) -> Option<(TransportKind, Bindings)> {
    let chain: InheritanceChain<'_, IntermediateTransport> = InheritanceChain::build(
        inventory,
        host,
        |host| host.transport.as_ref(),
        |group| group.transport.as_ref(),
        |inventory| inventory.transport.as_ref(),
    );

    let mut levels = chain.levels.into_iter();
    let first = levels.next()?;
    let kind = first.kind;
    let mut config = first.config.clone();

    for level in levels {
        if level.kind != kind {
            tracing::debug!(
                host = %host.name,
                %kind,
                skipped = %level.kind,
                location = %level.location,
                "skipping transport of a different kind"
            );
            continue;
        }

        for (key, binding) in &level.config {
            if !config.contains_key(key) {
                config.insert(key.clone(), binding.clone());
            }
        }
    }

    Some((kind, config))
}

/// Resolves the transport of a host, `None` if it could not be built
#[tracing::instrument(level = "debug", skip_all, fields(host = %host.name))]
pub fn resolve_transport(
    inventory: &IntermediateInventory,
    host: &IntermediateHost,
    scope: &Scope,
    context: &TransportContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<ConcreteTransport> {
    let Some((kind, config)) = merge_transport(inventory, host) else {
        tracing::trace!("no transport configured, using local");
        return Some(ConcreteTransport::Local(LocalTransport));
    };

    match kind {
        TransportKind::Local => Some(ConcreteTransport::Local(LocalTransport)),
        TransportKind::Ssh => {
            let mut settings = Settings {
                host: &host.name,
                config: &config,
                scope,
                diagnostics,
                failed: false,
            };
            resolve_ssh(&mut settings, context).map(ConcreteTransport::Ssh)
        }
    }
}

fn resolve_ssh(settings: &mut Settings<'_>, context: &TransportContext<'_>) -> Option<SshTransport> {
    let host = settings.required_string("host");
    let user = settings.required_string("user");
    let port = settings.port("port").unwrap_or(DEFAULT_SSH_PORT);
    let connection_timeout = settings
        .duration("connection_timeout")
        .unwrap_or(context.defaults.connection_timeout);

    // secrets are registered before anything else can fail
    let passphrase = settings.string("private_key_pass");
    let password = settings.string("password");
    for secret in passphrase.iter().chain(password.iter()) {
        context.secrets.add_secret(secret);
    }

    let use_known_hosts = settings.bool("use_known_hosts").unwrap_or(true);
    let known_hosts_path = settings
        .string("known_hosts_path")
        .map(|path| expand_home(Path::new(&path)))
        .unwrap_or_else(|| context.defaults.known_hosts_path.clone());
    let add_unknown = settings.bool("add_unknown_hosts").unwrap_or(false);

    let private_key = settings
        .string("private_key_path")
        .map(|path| expand_home(Path::new(&path)))
        .and_then(|path| match context.keys.load(&path) {
            Ok(key) => Some(AuthMethod::PrivateKey {
                path,
                key,
                passphrase: passphrase.clone(),
            }),
            Err(error) => {
                settings.fail(Issue::PrivateKey {
                    host: settings.host.to_owned(),
                    path,
                    message: error.to_string(),
                });
                None
            }
        });

    let use_agent = settings
        .bool("use_agent")
        .unwrap_or(private_key.is_none() && password.is_none());

    let (Some(host), Some(user)) = (host, user) else {
        return None;
    };
    if settings.failed {
        return None;
    }

    let mut auth = vec![];
    auth.extend(private_key);
    auth.extend(password.map(AuthMethod::Password));
    if use_agent {
        auth.push(AuthMethod::Agent);
    }

    let known_hosts = if use_known_hosts {
        KnownHosts::Verify {
            path: known_hosts_path,
            add_unknown,
        }
    } else {
        KnownHosts::Ignore
    };

    let config = SshConfig {
        host,
        port,
        user,
        connection_timeout,
        auth,
        known_hosts,
    };

    match SshTransport::new(config) {
        Ok(transport) => Some(transport),
        Err(error) => {
            settings.fail(Issue::TransportBuild {
                host: settings.host.to_owned(),
                error,
            });
            None
        }
    }
}

/// Typed access to the merged settings of one transport
struct Settings<'a> {
    host: &'a str,
    config: &'a Bindings,
    scope: &'a Scope,
    diagnostics: &'a mut Diagnostics,
    failed: bool,
}

impl<'a> Settings<'a> {
    fn fail(&mut self, issue: Issue) {
        self.diagnostics.error(issue, None);
        self.failed = true;
    }

    fn invalid(&mut self, key: &str, message: String) {
        let location = self.config.get(key).map(|binding| binding.location.clone());
        self.diagnostics.error(
            Issue::InvalidTransportSetting {
                host: self.host.to_owned(),
                key: key.to_owned(),
                message,
            },
            location,
        );
        self.failed = true;
    }

    /// Evaluated setting, `None` when unset or `null`
    fn value(&mut self, key: &str) -> Option<Value> {
        let binding = self.config.get(key)?;
        match binding.evaluate(self.scope) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(failure) => {
                self.invalid(key, failure.to_string());
                None
            }
        }
    }

    fn string(&mut self, key: &str) -> Option<String> {
        match self.value(key)? {
            Value::String(value) => Some(value),
            other => {
                self.invalid(key, format!("expected string, found {}", type_name(&other)));
                None
            }
        }
    }

    /// Like [Settings::string], unset and `null` are errors
    fn required_string(&mut self, key: &'static str) -> Option<String> {
        let reported = self.diagnostics.len();
        let value = self.string(key);

        if value.is_none() && self.diagnostics.len() == reported {
            let host = self.host.to_owned();
            self.fail(Issue::MissingTransportSetting {
                host,
                kind: TransportKind::Ssh.to_string(),
                key,
            });
        }
        value
    }

    fn bool(&mut self, key: &str) -> Option<bool> {
        match self.value(key)? {
            Value::Bool(value) => Some(value),
            other => {
                self.invalid(key, format!("expected bool, found {}", type_name(&other)));
                None
            }
        }
    }

    fn port(&mut self, key: &str) -> Option<u16> {
        match self.value(key)? {
            Value::Number(number) => match number.as_u64().map(u16::try_from) {
                Some(Ok(port)) => Some(port),
                _ => {
                    self.invalid(key, format!("{number} is not a valid port"));
                    None
                }
            },
            other => {
                self.invalid(key, format!("expected number, found {}", type_name(&other)));
                None
            }
        }
    }

    /// Number of seconds or a duration string like `"1m 30s"`
    fn duration(&mut self, key: &str) -> Option<Duration> {
        match self.value(key)? {
            Value::Number(number) => {
                let converted = number
                    .as_f64()
                    .ok_or_else(|| format!("{number} is not a number of seconds"))
                    .and_then(|seconds| {
                        Duration::try_from_secs_f64(seconds)
                            .map_err(|error| format!("{number} seconds: {error}"))
                    });

                match converted {
                    Ok(duration) => Some(duration),
                    Err(message) => {
                        self.invalid(key, message);
                        None
                    }
                }
            }
            Value::String(text) => match humantime::parse_duration(&text) {
                Ok(duration) => Some(duration),
                Err(error) => {
                    self.invalid(key, format!("invalid duration `{text}`: {error}"));
                    None
                }
            },
            other => {
                self.invalid(
                    key,
                    format!("expected duration, found {}", type_name(&other)),
                );
                None
            }
        }
    }
}

/// Replaces a leading `~` with the home directory, if it is known
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_owned();
    };

    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_owned(),
    }
}

impl serde::ser::Serialize for ConcreteTransport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ConcreteTransport::Local(_) => {
                let mut ser = serializer.serialize_map(Some(1))?;
                ser.serialize_entry("kind", "local")?;
                ser.end()
            }
            ConcreteTransport::Ssh(ssh) => {
                let mut ser = serializer.serialize_map(Some(7))?;
                ser.serialize_entry("kind", "ssh")?;
                ser.serialize_entry("host", ssh.host())?;
                ser.serialize_entry("port", &ssh.port())?;
                ser.serialize_entry("user", ssh.user())?;
                ser.serialize_entry(
                    "connection_timeout",
                    &humantime::format_duration(ssh.connection_timeout()).to_string(),
                )?;

                let auth: Vec<String> = ssh
                    .auth()
                    .iter()
                    .map(|method| match method {
                        AuthMethod::PrivateKey { path, .. } => {
                            format!("private_key:{}", path.display())
                        }
                        AuthMethod::Password(_) => "password".to_owned(),
                        AuthMethod::Agent => "agent".to_owned(),
                    })
                    .collect();
                ser.serialize_entry("auth", &auth)?;

                match ssh.known_hosts() {
                    KnownHosts::Ignore => ser.serialize_entry("known_hosts", "ignore")?,
                    KnownHosts::Verify { path, add_unknown } => {
                        ser.serialize_entry("known_hosts", &path.display().to_string())?;
                        ser.serialize_entry("add_unknown_hosts", add_unknown)?;
                    }
                }
                ser.end()
            }
        }
    }
}
