//! Alias naming and operator rendering.
//!
//! Every alias is a pure function of the attribute name. Builders that run
//! independently (key condition, filter, projection) therefore agree on the
//! alias for a shared attribute, and their alias maps can be merged.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::Expression;
use crate::errors::ConfigError;

/// Comparison operators understood by the key-condition and filter builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
    BeginsWith,
    Between,
    Exists,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Le => "<=",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::BeginsWith => "begins_with",
            Operator::Between => "between",
            Operator::Exists => "exists",
        }
    }

    /// Number of values the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::Exists => 0,
            _ => 1,
        }
    }

    /// Whether the operator may constrain a sort key.
    pub fn is_key_operator(self) -> bool {
        !matches!(self, Operator::Exists)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Operator::Eq),
            "<=" => Ok(Operator::Le),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            ">" => Ok(Operator::Gt),
            "begins_with" => Ok(Operator::BeginsWith),
            "between" => Ok(Operator::Between),
            "exists" => Ok(Operator::Exists),
            other => Err(ConfigError::UnknownOperator(other.to_string())),
        }
    }
}

/// Placeholder-safe form of an attribute name.
fn alias_stem(attribute: &str) -> String {
    attribute
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `#name` alias for an attribute name.
pub fn name_alias(attribute: &str) -> String {
    format!("#{}", alias_stem(attribute))
}

/// `:name` alias for an attribute value.
pub fn value_alias(attribute: &str) -> String {
    format!(":{}", alias_stem(attribute))
}

/// `(:nameFrom, :nameTo)` aliases for range bounds.
pub fn range_aliases(attribute: &str) -> (String, String) {
    let stem = alias_stem(attribute);
    (format!(":{}From", stem), format!(":{}To", stem))
}

/// Render one `<attribute> <operator> <values>` clause into `expr`'s alias
/// maps and return the clause text. The expression text itself is untouched.
pub fn render_condition(
    expr: &mut Expression,
    attribute: &str,
    operator: Operator,
    values: &[Value],
) -> Result<String, ConfigError> {
    if values.len() != operator.arity() {
        return Err(ConfigError::InvalidArity {
            operator,
            expected: operator.arity(),
            actual: values.len(),
        });
    }

    let name = expr.bind_name(attribute)?;
    let clause = match operator {
        Operator::Eq | Operator::Le | Operator::Lt | Operator::Ge | Operator::Gt => {
            let value = expr.bind_value(value_alias(attribute), &values[0])?;
            format!("{} {} {}", name, operator, value)
        }
        Operator::BeginsWith => {
            let value = expr.bind_value(value_alias(attribute), &values[0])?;
            format!("begins_with({}, {})", name, value)
        }
        Operator::Exists => format!("attribute_exists({})", name),
        Operator::Between => {
            let (from, to) = range_aliases(attribute);
            let from = expr.bind_value(from, &values[0])?;
            let to = expr.bind_value(to, &values[1])?;
            format!("{} between {} and {}", name, from, to)
        }
    };
    Ok(clause)
}
