//! Expression evaluation on top of [hcl::eval]
//!
//! Variables are exposed to expressions as the object `var`, so `var.port` reads the variable
//! `port`. Next to `var` a scope carries the ambient `host` object (`host.name`) and a fixed
//! function table.
//!
//! When an evaluation fails we check which `var.*` names the expression reads. If any of them is
//! not part of the scope the failure is reported as [EvalFailure::NameNotFound], which the
//! variable resolver treats as "not evaluated yet" rather than as an error. An expression that
//! reads `var` as a whole is not evaluated at all while the scope still has pending names.
use crate::diagnostics::SourceLocation;
use crate::util::{type_name, VarReferences};
use hcl::eval::{Context, Evaluate, FuncArgs, FuncDef, ParamType};
use hcl::{Identifier, Value};
use indexmap::IndexMap;

/// A key bound to an unevaluated expression
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBinding {
    pub key: String,
    pub expression: hcl::Expression,
    pub location: SourceLocation,
}

impl AttributeBinding {
    pub fn new(key: impl Into<String>, expression: hcl::Expression, location: SourceLocation) -> Self {
        Self {
            key: key.into(),
            expression,
            location,
        }
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, EvalFailure> {
        let references = VarReferences::of(&self.expression);

        if references.whole_scope {
            if let Some(name) = scope.pending().iter().find(|name| **name != self.key) {
                return Err(EvalFailure::NameNotFound { name: name.clone() });
            }
        }

        self.expression.evaluate(scope.context()).map_err(|errors| {
            let missing = references
                .names
                .into_iter()
                .find(|name| !scope.contains(name));

            match missing {
                Some(name) => EvalFailure::NameNotFound { name },
                None => EvalFailure::Failed {
                    message: errors.to_string(),
                },
            }
        })
    }

    /// Evaluates without any variables in scope, for attributes that must be literal
    pub fn evaluate_static(&self) -> Result<Value, EvalFailure> {
        self.evaluate(&Scope::empty())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalFailure {
    #[error("unknown variable `var.{name}`")]
    NameNotFound { name: String },
    #[error("{message}")]
    Failed { message: String },
}

/// Evaluation scope for a single host
pub struct Scope {
    vars: IndexMap<String, Value>,
    /// names that are bound but not evaluated yet
    pending: Vec<String>,
    context: Context<'static>,
}

impl Scope {
    pub fn new(host_name: &str, vars: IndexMap<String, Value>) -> Self {
        let mut context = base_context();
        context.declare_var(Identifier::unchecked("var"), vars_object(&vars));
        context.declare_var(Identifier::unchecked("host"), host_object(host_name));

        Self {
            vars,
            pending: vec![],
            context,
        }
    }

    pub fn empty() -> Self {
        Self {
            vars: IndexMap::new(),
            pending: vec![],
            context: base_context(),
        }
    }

    pub fn with_pending(mut self, pending: Vec<String>) -> Self {
        self.pending = pending;
        self
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn vars(&self) -> &IndexMap<String, Value> {
        &self.vars
    }

    pub fn context(&self) -> &Context<'static> {
        &self.context
    }
}

pub(crate) fn vars_object(vars: &IndexMap<String, Value>) -> Value {
    Value::Object(
        vars.iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    )
}

pub(crate) fn host_object(host_name: &str) -> Value {
    Value::Object(
        [("name".to_owned(), Value::String(host_name.to_owned()))]
            .into_iter()
            .collect(),
    )
}

/// Context with the function table and nothing else
pub fn base_context() -> Context<'static> {
    let mut context = Context::new();

    context.declare_func(
        Identifier::unchecked("upper"),
        FuncDef::builder().param(ParamType::String).build(upper),
    );
    context.declare_func(
        Identifier::unchecked("lower"),
        FuncDef::builder().param(ParamType::String).build(lower),
    );
    context.declare_func(
        Identifier::unchecked("trimspace"),
        FuncDef::builder().param(ParamType::String).build(trimspace),
    );
    context.declare_func(
        Identifier::unchecked("join"),
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::array_of(ParamType::String))
            .build(join),
    );
    context.declare_func(
        Identifier::unchecked("length"),
        FuncDef::builder().param(ParamType::Any).build(length),
    );

    context
}

fn string_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args[index]
        .as_str()
        .ok_or_else(|| format!("expected string, got {}", type_name(&args[index])))
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.to_uppercase().into())
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.to_lowercase().into())
}

fn trimspace(args: FuncArgs) -> Result<Value, String> {
    Ok(string_arg(&args, 0)?.trim().into())
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = string_arg(&args, 0)?;
    let Some(elements) = args[1].as_array() else {
        return Err(format!("expected list, got {}", type_name(&args[1])));
    };

    let parts = elements
        .iter()
        .map(|element| {
            element
                .as_str()
                .ok_or_else(|| format!("expected list of strings, found {}", type_name(element)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parts.join(separator).into())
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let length = match &args[0] {
        Value::Array(array) => array.len(),
        Value::Object(object) => object.len(),
        Value::String(string) => string.chars().count(),
        other => return Err(format!("cannot take the length of {}", type_name(other))),
    };

    Ok(Value::from(length as u64))
}
