//! Diagnostics collected while building and resolving an inventory
//!
//! Every stage appends to a shared [Diagnostics] list instead of returning early. Only errors
//! gate the following stages, warnings are carried through to the caller.
use crate::transport::TransportError;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Position of a declaration inside a loaded document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub path: Option<PathBuf>,
    /// 1-based, 0 when the span is unknown
    pub line: usize,
    /// 1-based, 0 when the span is unknown
    pub column: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display())?,
            None => f.write_str("<stdin>")?,
        }

        if self.line > 0 {
            write!(f, ":{}:{}", self.line, self.column)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub issue: Issue,
    pub location: Option<SourceLocation>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.issue)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Everything that can go wrong, grouped by the stage that reports it
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Issue {
    // classifier
    #[error("unexpected attribute `{0}`")]
    UnexpectedAttribute(String),
    #[error("unexpected block `{0}`")]
    UnexpectedBlock(String),
    #[error("block `{ident}` expects {expected} label(s) but has {found}")]
    BlockLabels {
        ident: String,
        expected: usize,
        found: usize,
    },
    #[error("attribute `{0}` is declared more than once")]
    DuplicateAttribute(String),

    // builder
    #[error("host `{0}` is declared more than once")]
    DuplicateHost(String),
    #[error("group `{0}` is declared more than once")]
    DuplicateGroup(String),
    #[error("variable `{0}` is declared more than once at the same level")]
    DuplicateVariable(String),
    #[error("only one `transport` block is allowed per level")]
    DuplicateTransport,
    #[error("only one `escalate` block is allowed per level")]
    DuplicateEscalate,
    #[error("unknown transport kind `{0}` (expected `local` or `ssh`)")]
    UnknownTransportKind(String),
    #[error("unknown setting `{key}` for transport `{kind}`")]
    UnknownTransportSetting { kind: String, key: String },
    #[error("`{attribute}` must be {expected}: {message}")]
    InvalidStaticAttribute {
        attribute: &'static str,
        expected: &'static str,
        message: String,
    },

    // validator
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
    #[error("{kind} name `{name}` is reserved")]
    ReservedName { kind: &'static str, name: String },
    #[error("name conflict: `{0}` is declared as both a host and a group")]
    NameConflict(String),
    #[error("group `{group}` references unknown parent group `{parent}`")]
    UnknownParent { group: String, parent: String },
    #[error("host `{host}` references unknown group `{group}`")]
    UnknownGroup { host: String, group: String },
    #[error("circular group reference: {0}")]
    CircularGroupReference(String),

    // variables
    #[error("host `{host}`: variable `{name}` failed to evaluate: {message}")]
    VariableEvaluation {
        host: String,
        name: String,
        message: String,
    },
    #[error("host `{host}`: variable `{name}` is unresolvable due to missing or circular dependency{}", missing_suffix(.missing))]
    UnresolvableVariable {
        host: String,
        name: String,
        missing: Option<String>,
    },
    #[error("host `{host}`: variable `{name}` still unresolved after {rounds} evaluation rounds")]
    ResolutionLimit {
        host: String,
        name: String,
        rounds: usize,
    },

    // transport
    #[error("host `{host}`: transport `{kind}` requires setting `{key}`")]
    MissingTransportSetting {
        host: String,
        kind: String,
        key: &'static str,
    },
    #[error("host `{host}`: transport setting `{key}` is invalid: {message}")]
    InvalidTransportSetting {
        host: String,
        key: String,
        message: String,
    },
    #[error("host `{host}`: cannot read private key `{path}`: {message}")]
    PrivateKey {
        host: String,
        path: PathBuf,
        message: String,
    },
    #[error("host `{host}`: cannot build transport: {error}")]
    TransportBuild { host: String, error: TransportError },

    // escalation
    #[error("host `{host}`: escalation password is invalid: {message}")]
    EscalatePassword { host: String, message: String },
}

fn missing_suffix(missing: &Option<String>) -> String {
    match missing {
        Some(name) => format!(" (references `var.{name}`)"),
        None => String::new(),
    }
}

/// Append-only list of [Diagnostic]s
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(?diagnostic, "issue found");
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, issue: Issue, location: impl Into<Option<SourceLocation>>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            issue,
            location: location.into(),
        });
    }

    pub fn warning(&mut self, issue: Issue, location: impl Into<Option<SourceLocation>>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            issue,
            location: location.into(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// True if any diagnostic is at error severity
    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.items.iter().map(|diagnostic| &diagnostic.issue)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for diagnostic in &self.items {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}
