use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blockchain::normalize_address;
use crate::error::RuleError;
use crate::logging::LogContext;
use crate::models::Transaction;

/// Transaction field a condition reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Value,
    BlockNumber,
    From,
    To,
    /// Kept so the rule still loads; never satisfied
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Text,
}

impl Field {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "value" => Field::Value,
            "block_number" | "blocknumber" => Field::BlockNumber,
            "from" => Field::From,
            "to" => Field::To,
            _ => Field::Unknown(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Field::Value => "value",
            Field::BlockNumber => "block_number",
            Field::From => "from",
            Field::To => "to",
            Field::Unknown(name) => name,
        }
    }

    fn kind(&self) -> Option<FieldKind> {
        match self {
            Field::Value | Field::BlockNumber => Some(FieldKind::Numeric),
            Field::From | Field::To => Some(FieldKind::Text),
            Field::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    /// Reserved; always evaluates false
    Between,
    Unsupported(String),
}

impl Operator {
    pub fn parse(symbol: &str) -> Self {
        match symbol.trim() {
            ">" => Operator::GreaterThan,
            "<" => Operator::LessThan,
            ">=" => Operator::GreaterOrEqual,
            "<=" => Operator::LessOrEqual,
            "==" => Operator::Equal,
            s if s.eq_ignore_ascii_case("between") => Operator::Between,
            _ => Operator::Unsupported(symbol.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
            Operator::Between => "between",
            Operator::Unsupported(symbol) => symbol,
        }
    }

    fn compare(&self, actual: f64, expected: f64) -> bool {
        match self {
            Operator::GreaterThan => actual > expected,
            Operator::LessThan => actual < expected,
            Operator::GreaterOrEqual => actual >= expected,
            Operator::LessOrEqual => actual <= expected,
            Operator::Equal => actual == expected,
            Operator::Between | Operator::Unsupported(_) => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

impl ConditionValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ConditionValue::Number(_) => "numeric",
            ConditionValue::Text(_) => "string",
        }
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

impl From<u64> for ConditionValue {
    fn from(value: u64) -> Self {
        ConditionValue::Number(value as f64)
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Text(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::Text(value)
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// On-disk shape: `{ field = "value", operator = ">", value = 10.0 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCondition {
    field: String,
    operator: String,
    value: ConditionValue,
}

/// Single predicate over a transaction field.
///
/// Field and operator are resolved when the condition is built; names
/// that do not resolve are kept and make the condition unsatisfiable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub struct RuleCondition {
    pub field: Field,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl From<RawCondition> for RuleCondition {
    fn from(raw: RawCondition) -> Self {
        Self {
            field: Field::parse(&raw.field),
            operator: Operator::parse(&raw.operator),
            value: raw.value,
        }
    }
}

impl From<RuleCondition> for RawCondition {
    fn from(condition: RuleCondition) -> Self {
        Self {
            field: condition.field.as_str().to_string(),
            operator: condition.operator.as_str().to_string(),
            value: condition.value,
        }
    }
}

impl RuleCondition {
    pub fn new(field: &str, operator: &str, value: impl Into<ConditionValue>) -> Self {
        Self {
            field: Field::parse(field),
            operator: Operator::parse(operator),
            value: value.into(),
        }
    }

    /// Evaluate against `transaction`, reporting why a condition cannot apply
    pub fn check(&self, transaction: &Transaction) -> Result<bool, RuleError> {
        if let Operator::Unsupported(operator) = &self.operator {
            return Err(RuleError::UnsupportedOperator {
                field: self.field.to_string(),
                operator: operator.clone(),
            });
        }

        let kind = self
            .field
            .kind()
            .ok_or_else(|| RuleError::UnknownField(self.field.to_string()))?;

        match (kind, &self.value) {
            (FieldKind::Numeric, ConditionValue::Number(expected)) => {
                let actual = match self.field {
                    Field::BlockNumber => transaction.block_number as f64,
                    _ => transaction.value,
                };
                Ok(self.operator.compare(actual, *expected))
            }
            (FieldKind::Text, ConditionValue::Text(expected)) => {
                if self.operator != Operator::Equal {
                    return Err(RuleError::UnsupportedOperator {
                        field: self.field.to_string(),
                        operator: self.operator.to_string(),
                    });
                }
                let actual = match self.field {
                    Field::To => transaction.to.as_deref(),
                    _ => Some(transaction.from.as_str()),
                };
                Ok(actual
                    .map(|address| normalize_address(address) == normalize_address(expected))
                    .unwrap_or(false))
            }
            (FieldKind::Numeric, found) => Err(RuleError::ConditionTypeMismatch {
                field: self.field.to_string(),
                expected: "numeric",
                found: found.kind_name(),
            }),
            (FieldKind::Text, found) => Err(RuleError::ConditionTypeMismatch {
                field: self.field.to_string(),
                expected: "string",
                found: found.kind_name(),
            }),
        }
    }

    /// Like [`check`](Self::check), but anything malformed counts as not satisfied
    pub fn is_satisfied(&self, transaction: &Transaction) -> bool {
        match self.check(transaction) {
            Ok(satisfied) => satisfied,
            Err(error) => {
                LogContext::new("rules", "check_condition")
                    .with_transaction_hash(&transaction.hash)
                    .debug(&format!("Condition not satisfied: {}", error));
                false
            }
        }
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}
