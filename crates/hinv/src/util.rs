use crate::visit::{self, VisitTraversals};
use hcl::{Expression, Traversal, TraversalOperator};

/// The variables an expression reads
///
/// `var.<name>` and `var["<name>"]` name a single variable. Any other use of `var` (`var` on its
/// own, `var[var.key]`, `var.*`) may read every variable and sets `whole_scope`.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct VarReferences {
    pub names: Vec<String>,
    pub whole_scope: bool,
}

impl VarReferences {
    pub fn of(expression: &Expression) -> Self {
        let mut collector = Self::default();
        expression.visit_traversals(&mut collector);
        collector
    }
}

impl visit::Visit<Traversal> for VarReferences {
    fn visit(&mut self, traversal: &Traversal) {
        let Expression::Variable(var) = &traversal.expr else {
            return;
        };

        if var.as_str() != "var" {
            return;
        }

        let name = match traversal.operators.first() {
            Some(TraversalOperator::GetAttr(ident)) => ident.as_str(),
            Some(TraversalOperator::Index(Expression::String(key))) => key.as_str(),
            _ => {
                self.whole_scope = true;
                return;
            }
        };

        if !self.names.iter().any(|known| known == name) {
            self.names.push(name.to_owned());
        }
    }
}

/// Short type description of a value for error messages
pub(crate) fn type_name(value: &hcl::Value) -> &'static str {
    match value {
        hcl::Value::Null => "null",
        hcl::Value::Bool(_) => "bool",
        hcl::Value::Number(_) => "number",
        hcl::Value::String(_) => "string",
        hcl::Value::Array(_) => "list",
        hcl::Value::Object(_) => "object",
    }
}
