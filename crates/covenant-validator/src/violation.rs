//! Violation records.

use std::fmt;
use std::sync::Arc;

use covenant_types::{Context, Severity, Value};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

use crate::check::Check;

/// One failed constraint.
///
/// Carries the rendered message, the template it came from, the error code
/// and severity of the failing check, where it failed, the object that owns
/// the failing member, the root of the validation call, the offending value
/// and, for groups and cascades, the nested causes.
#[derive(Clone, Debug)]
pub struct ConstraintViolation {
    pub(crate) message: String,
    pub(crate) message_template: String,
    pub(crate) error_code: String,
    pub(crate) severity: Severity,
    pub(crate) context: Context,
    pub(crate) validated_object: Value,
    pub(crate) root: Value,
    pub(crate) invalid_value: Value,
    pub(crate) check: Arc<Check>,
    pub(crate) causes: Vec<ConstraintViolation>,
    pub(crate) position: Position,
}

/// Where in the checked member a violation was found: which selected node,
/// and which element of it when the check ran over a container's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct Position {
    node: usize,
    element: Option<usize>,
}

impl Position {
    pub(crate) fn node(node: usize) -> Self {
        Self {
            node,
            element: None,
        }
    }

    pub(crate) fn element(self, element: usize) -> Self {
        Self {
            element: Some(element),
            ..self
        }
    }
}

impl ConstraintViolation {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn message_template(&self) -> &str {
        &self.message_template
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn validated_object(&self) -> &Value {
        &self.validated_object
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn invalid_value(&self) -> &Value {
        &self.invalid_value
    }

    pub fn check(&self) -> &Check {
        &self.check
    }

    pub fn causes(&self) -> &[ConstraintViolation] {
        &self.causes
    }

    /// This violation followed by all nested causes, depth first.
    pub fn flatten(&self) -> Vec<&ConstraintViolation> {
        let mut out = vec![self];
        for cause in &self.causes {
            out.extend(cause.flatten());
        }
        out
    }
}

/// Same message, code, severity and location, about the same values.
/// The originating check is not compared.
impl PartialEq for ConstraintViolation {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.error_code == other.error_code
            && self.severity == other.severity
            && self.context == other.context
            && self.validated_object == other.validated_object
            && self.invalid_value == other.invalid_value
            && self.causes == other.causes
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.error_code)
    }
}

#[derive(serde::Serialize)]
struct Report<'a> {
    message: &'a str,
    error_code: &'a str,
    severity: Severity,
    context: &'a Context,
    invalid_value: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    causes: &'a [ConstraintViolation],
}

/// Serialized as a report: values are rendered with `Display` because
/// application objects have no generic serialized form.
impl Serialize for ConstraintViolation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Report {
            message: &self.message,
            error_code: &self.error_code,
            severity: self.severity,
            context: &self.context,
            invalid_value: self.invalid_value.to_string(),
            causes: &self.causes,
        }
        .serialize(serializer)
    }
}

/// A non-empty set of violations.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{} constraint violation(s){}", .violations.len(), bullets(.violations))]
pub struct ConstraintsViolatedError {
    violations: Vec<ConstraintViolation>,
}

fn bullets(violations: &[ConstraintViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("\n  - {}", v.message))
        .collect()
}

impl ConstraintsViolatedError {
    /// `None` when there is nothing to report.
    pub fn new(violations: Vec<ConstraintViolation>) -> Option<Self> {
        (!violations.is_empty()).then_some(Self { violations })
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<ConstraintViolation> {
        self.violations
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use similar_asserts::assert_eq;

    use super::*;

    fn violation(message: &str, code: &str, causes: Vec<ConstraintViolation>) -> ConstraintViolation {
        ConstraintViolation {
            message: message.to_string(),
            message_template: message.to_string(),
            error_code: code.to_string(),
            severity: Severity::Error,
            context: Context::field("Cart", "lines"),
            validated_object: Value::Null,
            root: Value::Null,
            invalid_value: Value::from(vec![Value::from("x")]),
            check: Arc::new(Check::assert_valid()),
            causes,
            position: Position::default(),
        }
    }

    #[test]
    fn flatten_walks_causes_depth_first() {
        let tree = violation(
            "cart",
            "c.cart",
            vec![
                violation("line", "c.line", vec![violation("sku", "c.sku", Vec::new())]),
                violation("total", "c.total", Vec::new()),
            ],
        );
        let codes: Vec<_> = tree.flatten().iter().map(|v| v.error_code()).collect();
        assert_eq!(codes, vec!["c.cart", "c.line", "c.sku", "c.total"]);
    }

    #[test]
    fn report_renders_values_and_omits_empty_causes() {
        let leaf = violation("sku missing", "c.sku", Vec::new());
        let report = serde_json::to_value(&leaf).unwrap();
        assert_eq!(
            report,
            serde_json::json!({
                "message": "sku missing",
                "error_code": "c.sku",
                "severity": "error",
                "context": {"kind": "field", "declaring_type": "Cart", "field": "lines"},
                "invalid_value": "[x]",
            })
        );

        let parent = serde_json::to_value(violation("cart", "c.cart", vec![leaf])).unwrap();
        assert_eq!(parent["causes"][0]["error_code"], "c.sku");
    }

    #[test]
    fn error_requires_at_least_one_violation() {
        assert!(ConstraintsViolatedError::new(Vec::new()).is_none());

        let error = ConstraintsViolatedError::new(vec![
            violation("first", "a", Vec::new()),
            violation("second", "b", Vec::new()),
        ])
        .unwrap();
        assert_eq!(error.violations().len(), 2);
        assert_snapshot!(error.to_string(), @r"
        2 constraint violation(s)
          - first
          - second
        ");
    }
}
