use std::cmp::Ordering;

use thiserror::Error;

use super::{
    coerce, field_type, CoercedValue, Combinator, FieldType, FieldValue, FilterNode, Operator,
};
use crate::database::customer::Customer;

#[derive(Clone, Debug, Error, PartialEq)]
pub(crate) enum TranslationError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("operator `{operator}` cannot be applied to {field_type} field `{field}`")]
    OperatorMismatch {
        field: String,
        operator: Operator,
        field_type: FieldType,
    },
    #[error("cannot coerce `{value}` to {field_type} for field `{field}`")]
    BadValue {
        field: String,
        value: String,
        field_type: FieldType,
    },
}

/// A filter tree compiled against the field registry, with every rule value
/// coerced once. This is the form the evaluator runs over the customer
/// partition.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Compare {
        field: String,
        operator: Operator,
        value: CoercedValue,
    },
}

/// Pure translation of a filter tree into a [`Predicate`]. Rules that the
/// validator would reject are errors here too; the translator never falls
/// back to a match-all or match-none predicate for input it does not
/// understand.
pub(crate) fn translate(node: &FilterNode) -> Result<Predicate, TranslationError> {
    match node {
        FilterNode::Combinator(combinator) => {
            let children = combinator
                .rules
                .iter()
                .map(translate)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match combinator.combinator {
                Combinator::And => Predicate::All(children),
                Combinator::Or => Predicate::Any(children),
            })
        }
        FilterNode::Rule(rule) => {
            let field_type = field_type(&rule.field)
                .ok_or_else(|| TranslationError::UnknownField(rule.field.clone()))?;
            if !rule.operator.allowed_on(field_type) {
                return Err(TranslationError::OperatorMismatch {
                    field: rule.field.clone(),
                    operator: rule.operator,
                    field_type,
                });
            }
            let value = coerce(&rule.value, field_type).ok_or_else(|| {
                TranslationError::BadValue {
                    field: rule.field.clone(),
                    value: rule.value.clone(),
                    field_type,
                }
            })?;
            Ok(Predicate::Compare {
                field: rule.field.clone(),
                operator: rule.operator,
                value,
            })
        }
    }
}

impl Predicate {
    pub(crate) fn matches(&self, customer: &Customer) -> bool {
        match self {
            // `and` over no rules matches everything; `or` over no rules
            // matches nothing. The identity elements of the combinators.
            Predicate::All(children) => children.iter().all(|child| child.matches(customer)),
            Predicate::Any(children) => children.iter().any(|child| child.matches(customer)),
            Predicate::Compare {
                field,
                operator,
                value,
            } => {
                let Some(field_value) = customer.field(field) else {
                    return false;
                };
                compare(&field_value, *operator, value)
            }
        }
    }
}

fn compare(field_value: &FieldValue, operator: Operator, value: &CoercedValue) -> bool {
    match (field_value, value) {
        (FieldValue::Number(have), CoercedValue::Number(want)) => {
            ordering_matches(have.partial_cmp(want), operator)
        }
        (FieldValue::Date(have), CoercedValue::Date(want)) => {
            ordering_matches(Some(have.cmp(want)), operator)
        }
        (FieldValue::Tags(tags), CoercedValue::Text(want)) => match operator {
            Operator::Eq => tags.iter().any(|tag| tag == want),
            Operator::Ne => !tags.iter().any(|tag| tag == want),
            Operator::Contains => any_tag_contains(tags, want),
            Operator::DoesNotContain => !any_tag_contains(tags, want),
            _ => false,
        },
        _ => false,
    }
}

fn ordering_matches(ordering: Option<Ordering>, operator: Operator) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Contains | Operator::DoesNotContain => false,
    }
}

fn any_tag_contains(tags: &[String], value: &str) -> bool {
    let needle = value.to_lowercase();
    tags.iter()
        .any(|tag| tag.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::*;
    use crate::query::{validate, Rule};

    fn customer(total_spend: f64, last_visit: &str, tags: &[&str]) -> Customer {
        Customer {
            name: "test".to_string(),
            email: "test@example.com".to_string(),
            total_spend,
            last_visit: last_visit.parse::<Timestamp>().unwrap(),
            tags: tags.iter().map(ToString::to_string).collect(),
            created_at: Timestamp::UNIX_EPOCH,
        }
    }

    fn parse(json: &str) -> FilterNode {
        serde_json::from_str(json).unwrap()
    }

    fn compiled(json: &str) -> Predicate {
        let node = parse(json);
        validate(&node).unwrap();
        translate(&node).unwrap()
    }

    #[test]
    fn and_combinator_filters_by_numeric_comparison() {
        let predicate = compiled(
            r#"{"combinator": "and", "rules": [
                {"field": "totalSpend", "operator": ">", "value": "100"}
            ]}"#,
        );
        let a = customer(50.0, "2024-01-01T00:00:00Z", &[]);
        let b = customer(150.0, "2024-01-01T00:00:00Z", &[]);
        assert!(!predicate.matches(&a));
        assert!(predicate.matches(&b));
    }

    #[test]
    fn or_combinator_matches_either_branch() {
        let predicate = compiled(
            r#"{"combinator": "or", "rules": [
                {"field": "totalSpend", "operator": ">", "value": "100"},
                {"field": "tags", "operator": "contains", "value": "vip"}
            ]}"#,
        );
        let a = customer(50.0, "2024-01-01T00:00:00Z", &["vip"]);
        let b = customer(150.0, "2024-01-01T00:00:00Z", &[]);
        let c = customer(50.0, "2024-01-01T00:00:00Z", &[]);
        assert!(predicate.matches(&a));
        assert!(predicate.matches(&b));
        assert!(!predicate.matches(&c));
    }

    #[test]
    fn contains_is_case_insensitive_substring_on_tags() {
        let predicate =
            compiled(r#"{"field": "tags", "operator": "contains", "value": "VIP"}"#);
        assert!(predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["vip-gold"])));
        assert!(!predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["regular"])));
    }

    #[test]
    fn does_not_contain_excludes_exactly_the_matching_customers() {
        let predicate =
            compiled(r#"{"field": "tags", "operator": "doesNotContain", "value": "vip"}"#);
        assert!(!predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["VIP"])));
        assert!(!predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["new", "vip"])));
        assert!(predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["new"])));
        assert!(predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &[])));
    }

    #[test]
    fn tag_equality_is_exact_membership() {
        let predicate = compiled(r#"{"field": "tags", "operator": "=", "value": "vip"}"#);
        assert!(predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["vip", "new"])));
        assert!(!predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["vip-gold"])));

        let predicate = compiled(r#"{"field": "tags", "operator": "!=", "value": "vip"}"#);
        assert!(!predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["vip"])));
        assert!(predicate.matches(&customer(0.0, "2024-01-01T00:00:00Z", &["vip-gold"])));
    }

    #[test]
    fn date_comparisons_work_on_coerced_calendar_dates() {
        let predicate =
            compiled(r#"{"field": "lastVisit", "operator": ">=", "value": "2024-06-01"}"#);
        assert!(predicate.matches(&customer(0.0, "2024-07-15T09:00:00Z", &[])));
        assert!(!predicate.matches(&customer(0.0, "2024-05-31T23:59:59Z", &[])));
    }

    #[test]
    fn empty_and_matches_all_empty_or_matches_none() {
        let everyone = compiled(r#"{"combinator": "and", "rules": []}"#);
        let no_one = compiled(r#"{"combinator": "or", "rules": []}"#);
        let c = customer(10.0, "2024-01-01T00:00:00Z", &[]);
        assert!(everyone.matches(&c));
        assert!(!no_one.matches(&c));
    }

    #[test]
    fn type_mismatched_operator_fails_instead_of_matching_all() {
        let node = FilterNode::Rule(Rule {
            field: "totalSpend".to_string(),
            operator: Operator::Contains,
            value: "5".to_string(),
        });
        assert_eq!(
            translate(&node).unwrap_err(),
            TranslationError::OperatorMismatch {
                field: "totalSpend".to_string(),
                operator: Operator::Contains,
                field_type: FieldType::Number,
            }
        );
    }

    #[test]
    fn unknown_field_and_bad_value_fail_translation() {
        let node = FilterNode::Rule(Rule {
            field: "salary".to_string(),
            operator: Operator::Gt,
            value: "1".to_string(),
        });
        assert!(matches!(
            translate(&node),
            Err(TranslationError::UnknownField(_))
        ));

        let node = FilterNode::Rule(Rule {
            field: "lastVisit".to_string(),
            operator: Operator::Lt,
            value: "soon".to_string(),
        });
        assert!(matches!(
            translate(&node),
            Err(TranslationError::BadValue { .. })
        ));
    }

    #[test]
    fn validated_trees_always_translate() {
        let node = parse(
            r#"{"combinator": "or", "rules": [
                {"field": "totalSpend", "operator": "<=", "value": "10.5"},
                {"combinator": "and", "rules": [
                    {"field": "lastVisit", "operator": ">", "value": "2024-01-01"},
                    {"field": "tags", "operator": "doesNotContain", "value": "churned"}
                ]}
            ]}"#,
        );
        validate(&node).unwrap();
        translate(&node).unwrap();
    }
}
