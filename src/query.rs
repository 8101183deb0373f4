pub(crate) mod translate;

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field registry shared by the validator, the translator, and the LLM
/// prompt. Extending the segment vocabulary means adding an entry here and a
/// matching arm in [`crate::database::customer::Customer::field`].
pub(crate) const FIELDS: &[(&str, FieldType)] = &[
    ("totalSpend", FieldType::Number),
    ("lastVisit", FieldType::Date),
    ("tags", FieldType::Text),
];

pub(crate) fn field_type(name: &str) -> Option<FieldType> {
    FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, field_type)| *field_type)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FieldType {
    Number,
    Date,
    Text,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldType::Number => write!(f, "number"),
            FieldType::Date => write!(f, "date"),
            FieldType::Text => write!(f, "text"),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Combinator {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "doesNotContain")]
    DoesNotContain,
}

impl Operator {
    pub(crate) fn allowed_on(self, field_type: FieldType) -> bool {
        match field_type {
            FieldType::Number | FieldType::Date => {
                !matches!(self, Operator::Contains | Operator::DoesNotContain)
            }
            FieldType::Text => matches!(
                self,
                Operator::Eq | Operator::Ne | Operator::Contains | Operator::DoesNotContain
            ),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::DoesNotContain => "doesNotContain",
        };
        write!(f, "{s}")
    }
}

/// A segment filter tree. A node is either a combinator over child rules or a
/// single field comparison; `deny_unknown_fields` on both variants makes a
/// node carrying both `rules` and `field` fail to deserialize instead of
/// silently picking one shape.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum FilterNode {
    Combinator(CombinatorNode),
    Rule(Rule),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CombinatorNode {
    pub(crate) combinator: Combinator,
    pub(crate) rules: Vec<FilterNode>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Rule {
    pub(crate) field: String,
    pub(crate) operator: Operator,
    pub(crate) value: String,
}

/// A rule value coerced to the declared type of its field.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CoercedValue {
    Number(f64),
    Date(Timestamp),
    Text(String),
}

/// A customer field as seen by the predicate evaluator.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FieldValue<'a> {
    Number(f64),
    Date(Timestamp),
    Tags(&'a [String]),
}

pub(crate) fn coerce(value: &str, field_type: FieldType) -> Option<CoercedValue> {
    match field_type {
        FieldType::Number => value.trim().parse::<f64>().ok().map(CoercedValue::Number),
        FieldType::Date => parse_date(value).map(CoercedValue::Date),
        FieldType::Text => Some(CoercedValue::Text(value.to_string())),
    }
}

/// Accepts either a full RFC 3339 timestamp or a plain calendar date, which
/// is what the segment builder UI sends.
fn parse_date(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(timestamp) = value.parse::<Timestamp>() {
        return Some(timestamp);
    }
    value
        .parse::<jiff::civil::Date>()
        .ok()
        .and_then(|date| date.to_zoned(jiff::tz::TimeZone::UTC).ok())
        .map(|zoned| zoned.timestamp())
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub(crate) enum ValidationReason {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("operator `{operator}` is not valid for {field_type} field `{field}`")]
    OperatorMismatch {
        field: String,
        operator: Operator,
        field_type: FieldType,
    },
    #[error("value `{value}` is not a valid {field_type} for field `{field}`")]
    BadValue {
        field: String,
        value: String,
        field_type: FieldType,
    },
}

/// Rejection of a filter tree, pointing at the offending node by its
/// breadcrumb of child indices from the root.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid rule at path {path:?}: {reason}")]
pub(crate) struct ValidationError {
    pub(crate) path: Vec<usize>,
    pub(crate) reason: ValidationReason,
}

/// Checks every rule of the tree against the field registry: the field must
/// be known, the operator must be allowed for the field's type, and the value
/// must coerce to that type. This is the mandatory gate between untrusted
/// trees (the LLM bridge, raw client input) and everything that persists or
/// evaluates them.
pub(crate) fn validate(node: &FilterNode) -> Result<(), ValidationError> {
    let mut path = Vec::new();
    validate_at(node, &mut path)
}

fn validate_at(node: &FilterNode, path: &mut Vec<usize>) -> Result<(), ValidationError> {
    match node {
        FilterNode::Combinator(combinator) => {
            for (index, rule) in combinator.rules.iter().enumerate() {
                path.push(index);
                validate_at(rule, path)?;
                path.pop();
            }
            Ok(())
        }
        FilterNode::Rule(rule) => {
            let field_type = field_type(&rule.field).ok_or_else(|| ValidationError {
                path: path.clone(),
                reason: ValidationReason::UnknownField(rule.field.clone()),
            })?;
            if !rule.operator.allowed_on(field_type) {
                return Err(ValidationError {
                    path: path.clone(),
                    reason: ValidationReason::OperatorMismatch {
                        field: rule.field.clone(),
                        operator: rule.operator,
                        field_type,
                    },
                });
            }
            if coerce(&rule.value, field_type).is_none() {
                return Err(ValidationError {
                    path: path.clone(),
                    reason: ValidationReason::BadValue {
                        field: rule.field.clone(),
                        value: rule.value.clone(),
                        field_type,
                    },
                });
            }
            Ok(())
        }
    }
}
