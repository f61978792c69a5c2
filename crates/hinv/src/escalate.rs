//! Privilege escalation settings
use crate::diagnostics::{Diagnostics, Issue};
use crate::eval::Scope;
use crate::intermediate::{IntermediateEscalate, IntermediateHost, IntermediateInventory};
use crate::secrets::SecretSink;
use crate::util::type_name;
use crate::vars::InheritanceChain;
use hcl::Value;
use serde::ser::SerializeMap;

/// How commands of a host are escalated, `password: None` means no escalation
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EscalateConfig {
    password: Option<String>,
}

impl EscalateConfig {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Debug for EscalateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalateConfig")
            .field("password", &self.password.as_ref().map(|_| crate::secrets::REDACTED))
            .finish()
    }
}

impl serde::ser::Serialize for EscalateConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut ser = serializer.serialize_map(Some(1))?;
        ser.serialize_entry("password", &self.is_enabled())?;
        ser.end()
    }
}

/// Resolves the escalation of a host
///
/// The nearest level that sets `password` decides. An escalate block without a password does not
/// hide the levels behind it.
#[tracing::instrument(level = "debug", skip_all, fields(host = %host.name))]
pub fn resolve_escalate(
    inventory: &IntermediateInventory,
    host: &IntermediateHost,
    scope: &Scope,
    secrets: &dyn SecretSink,
    diagnostics: &mut Diagnostics,
) -> Option<EscalateConfig> {
    let chain: InheritanceChain<'_, IntermediateEscalate> = InheritanceChain::build(
        inventory,
        host,
        |host| host.escalate.as_ref(),
        |group| group.escalate.as_ref(),
        |inventory| inventory.escalate.as_ref(),
    );

    let Some(binding) = chain
        .levels
        .into_iter()
        .find_map(|level| level.password.as_ref())
    else {
        return Some(EscalateConfig::default());
    };

    let invalid = |message: String| Issue::EscalatePassword {
        host: host.name.clone(),
        message,
    };

    match binding.evaluate(scope) {
        Ok(Value::Null) => Some(EscalateConfig::default()),
        Ok(Value::String(password)) => {
            secrets.add_secret(&password);
            Some(EscalateConfig::new(Some(password)))
        }
        Ok(other) => {
            diagnostics.error(
                invalid(format!("expected string, found {}", type_name(&other))),
                binding.location.clone(),
            );
            None
        }
        Err(failure) => {
            diagnostics.error(invalid(failure.to_string()), binding.location.clone());
            None
        }
    }
}
