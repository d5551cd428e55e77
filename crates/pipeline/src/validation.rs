//! Schema-level validation of job parameter documents.
//!
//! Each job type declares a list of [`FieldRule`]s over dotted parameter
//! paths; the evaluator is pure and aggregates every violation instead of
//! stopping at the first.

use oncoflow_core::document::Document;
use serde::Serialize;
use serde_json::Value;

/// A single rule attached to a dotted parameter path.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: &'static str,
    pub rule: Rule,
}

impl FieldRule {
    pub fn new(field: &'static str, rule: Rule) -> Self {
        Self { field, rule }
    }
}

/// Validation rule kinds.
///
/// Type rules (`Boolean`, `Integer`, `Numeric`, `In`) only apply when the
/// field is filled; presence is governed by the `Required*` rules.
#[derive(Debug, Clone)]
pub enum Rule {
    /// The field must be filled.
    Required,
    /// The field, when filled, must be a boolean (or 0/1).
    Boolean,
    /// The field, when filled, must be an integer.
    Integer,
    /// The field, when filled, must be numeric.
    Numeric,
    /// The field, when filled, must be one of the listed strings.
    In(&'static [&'static str]),
    /// The field must be filled when none of the listed fields are.
    RequiredWithoutAll(&'static [&'static str]),
    /// The field must be filled when `when` is truthy and `and_filled`
    /// is filled.
    RequiredIf {
        when: &'static str,
        and_filled: &'static str,
    },
}

/// A single field-level rule violation.
#[derive(Debug, Clone, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Aggregated result of evaluating all rules against one document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub violations: Vec<FieldViolation>,
}

impl ValidationOutcome {
    /// One-line summary of every violation, for error messages and logs.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Evaluate all rules against a parameter document.
pub fn evaluate(rules: &[FieldRule], params: &Document) -> ValidationOutcome {
    let mut violations = Vec::new();
    for rule in rules {
        if let Some(violation) = evaluate_single(rule, params) {
            violations.push(violation);
        }
    }
    ValidationOutcome {
        is_valid: violations.is_empty(),
        violations,
    }
}

fn evaluate_single(rule: &FieldRule, params: &Document) -> Option<FieldViolation> {
    let value = params.get(rule.field);
    match &rule.rule {
        Rule::Required => {
            (!is_filled(value)).then(|| violation(rule.field, "is required".into()))
        }
        Rule::Boolean => check_filled(value, rule.field, "must be a boolean", |v| {
            matches!(v, Value::Bool(_))
                || matches!(v.as_i64(), Some(0) | Some(1))
                || matches!(v, Value::String(s) if matches!(s.as_str(), "0" | "1" | "true" | "false"))
        }),
        Rule::Integer => check_filled(value, rule.field, "must be an integer", |v| {
            v.as_i64().is_some() || matches!(v, Value::String(s) if s.parse::<i64>().is_ok())
        }),
        Rule::Numeric => check_filled(value, rule.field, "must be numeric", |v| {
            v.as_f64().is_some() || matches!(v, Value::String(s) if s.parse::<f64>().is_ok())
        }),
        Rule::In(allowed) => check_filled(
            value,
            rule.field,
            &format!("must be one of: {}", allowed.join(", ")),
            |v| matches!(v, Value::String(s) if allowed.contains(&s.as_str())),
        ),
        Rule::RequiredWithoutAll(others) => {
            let any_other = others.iter().any(|o| is_filled(params.get(o)));
            (!is_filled(value) && !any_other).then(|| {
                violation(
                    rule.field,
                    format!("is required when none of {} are present", others.join(", ")),
                )
            })
        }
        Rule::RequiredIf { when, and_filled } => {
            let condition = params.get_bool_or(when, false) && is_filled(params.get(and_filled));
            (condition && !is_filled(value)).then(|| {
                violation(
                    rule.field,
                    format!("is required when {when} is set and {and_filled} is present"),
                )
            })
        }
    }
}

/// A field counts as filled when it is present, non-null, and not an
/// empty string.
fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn check_filled(
    value: Option<&Value>,
    field: &str,
    message: &str,
    pred: impl Fn(&Value) -> bool,
) -> Option<FieldViolation> {
    match value {
        Some(v) if is_filled(Some(v)) && !pred(v) => Some(violation(field, message.into())),
        _ => None,
    }
}

fn violation(field: &str, message: String) -> FieldViolation {
    FieldViolation {
        field: field.to_string(),
        message,
    }
}
