//! Atomic constraint evaluators.
//!
//! A [`Check`] is a configured [`CheckKind`] plus the attributes every check
//! carries (message, error code, severity, profiles, target selector,
//! `applies_to`, `when`). Checks are immutable once built; constructors that
//! take parameters reject semantically invalid ones up front so a broken
//! declaration fails at configuration time, not on every validation call.
//!
//! Leaf kinds are evaluated by [`Check::is_satisfied`]. Cascading
//! (`AssertValid`) needs the engine's traversal state and is handled there;
//! group kinds have a pure boolean reading here and a reporting-aware one in
//! [`crate::composition`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use covenant_types::{ConfigurationError, ConstraintTarget, Context, Severity, Value};
use regex::Regex;

use crate::expression::{Bindings, ExpressionLanguages};

/// What the engine offers to checks while they evaluate.
pub trait EngineServices {
    fn languages(&self) -> &ExpressionLanguages;
}

/// User-supplied check logic for `CheckWith`.
pub trait CustomCheck: fmt::Debug + Send + Sync {
    /// Name used in the default error code and message variables.
    fn name(&self) -> &str;

    fn is_satisfied(
        &self,
        validated_object: &Value,
        value: &Value,
        context: &Context,
        services: &dyn EngineServices,
    ) -> Result<bool, ConfigurationError>;

    /// Whether a null value passes without consulting the check.
    fn ignore_if_null(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub enum CheckKind {
    NotNull,
    AssertNull,
    NotEmpty,
    NotBlank,
    Length { min: usize, max: usize },
    MinLength(usize),
    MaxLength(usize),
    Size { min: usize, max: usize },
    MinSize(usize),
    MaxSize(usize),
    Range { min: f64, max: f64 },
    Min { min: f64, inclusive: bool },
    Max { max: f64, inclusive: bool },
    MatchPattern { pattern: String, regex: Regex },
    MemberOf { members: Vec<String>, ignore_case: bool },
    NotMemberOf { members: Vec<String>, ignore_case: bool },
    AssertTrue,
    AssertFalse,
    Past,
    Future,
    /// Boolean expression over `_this` and `_value`.
    Assert { language: String, expression: String },
    /// Named predicate from the owning object's accessor registry.
    ValidateWithMethod { method: String, ignore_if_null: bool },
    CheckWith(Arc<dyn CustomCheck>),
    /// Cascade into the referenced object(s).
    AssertValid,
    And(Vec<Arc<Check>>),
    Or(Vec<Arc<Check>>),
    Xor(Vec<Arc<Check>>),
    Not(Arc<Check>),
    /// Method precondition. Only meaningful inside a method contract.
    Pre { language: String, expression: String },
    /// Method postcondition; `old` is captured before the call.
    Post {
        language: String,
        expression: String,
        old: Option<String>,
    },
}

pub(crate) const XOR_NONE_MESSAGE: &str =
    "{context} satisfies none of the mutually exclusive constraints";
pub(crate) const XOR_MANY_MESSAGE: &str =
    "{context} satisfies {satisfied} of the mutually exclusive constraints, expected exactly one";

impl CheckKind {
    pub fn name(&self) -> &str {
        match self {
            Self::NotNull => "NotNull",
            Self::AssertNull => "AssertNull",
            Self::NotEmpty => "NotEmpty",
            Self::NotBlank => "NotBlank",
            Self::Length { .. } => "Length",
            Self::MinLength(_) => "MinLength",
            Self::MaxLength(_) => "MaxLength",
            Self::Size { .. } => "Size",
            Self::MinSize(_) => "MinSize",
            Self::MaxSize(_) => "MaxSize",
            Self::Range { .. } => "Range",
            Self::Min { .. } => "Min",
            Self::Max { .. } => "Max",
            Self::MatchPattern { .. } => "MatchPattern",
            Self::MemberOf { .. } => "MemberOf",
            Self::NotMemberOf { .. } => "NotMemberOf",
            Self::AssertTrue => "AssertTrue",
            Self::AssertFalse => "AssertFalse",
            Self::Past => "Past",
            Self::Future => "Future",
            Self::Assert { .. } => "Assert",
            Self::ValidateWithMethod { .. } => "ValidateWithMethod",
            Self::CheckWith(custom) => custom.name(),
            Self::AssertValid => "AssertValid",
            Self::And(_) => "And",
            Self::Or(_) => "Or",
            Self::Xor(_) => "Xor",
            Self::Not(_) => "Not",
            Self::Pre { .. } => "Pre",
            Self::Post { .. } => "Post",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::NotNull => "{context} cannot be null",
            Self::AssertNull => "{context} must be null",
            Self::NotEmpty => "{context} cannot be empty",
            Self::NotBlank => "{context} cannot be blank",
            Self::Length { .. } => "{context} is not between {min} and {max} characters long",
            Self::MinLength(_) => "{context} must not be shorter than {min} characters",
            Self::MaxLength(_) => "{context} must not be longer than {max} characters",
            Self::Size { .. } => "{context} must contain between {min} and {max} items",
            Self::MinSize(_) => "{context} must contain at least {min} items",
            Self::MaxSize(_) => "{context} must contain at most {max} items",
            Self::Range { .. } => "{context} is not in the range {min} - {max}",
            Self::Min { inclusive: true, .. } => "{context} must be greater than or equal to {min}",
            Self::Min { .. } => "{context} must be greater than {min}",
            Self::Max { inclusive: true, .. } => "{context} must be less than or equal to {max}",
            Self::Max { .. } => "{context} must be less than {max}",
            Self::MatchPattern { .. } => "{context} does not match the pattern {pattern}",
            Self::MemberOf { .. } => "{context} must be one of {members}",
            Self::NotMemberOf { .. } => "{context} must not be one of {members}",
            Self::AssertTrue => "{context} is not true",
            Self::AssertFalse => "{context} is not false",
            Self::Past => "{context} is not in the past",
            Self::Future => "{context} is not in the future",
            Self::Assert { .. } => "{context} does not satisfy {expression}",
            Self::ValidateWithMethod { .. } | Self::CheckWith(_) => "{context} is invalid",
            Self::AssertValid => "{context} is invalid",
            Self::And(_) => "{context} does not satisfy all of the grouped constraints",
            Self::Or(_) => "{context} does not satisfy any of the grouped constraints",
            Self::Xor(_) => XOR_NONE_MESSAGE,
            Self::Not(_) => "{context} satisfies a constraint it must not satisfy",
            Self::Pre { .. } => "{context}: precondition {expression} is not satisfied",
            Self::Post { .. } => "{context}: postcondition {expression} is not satisfied",
        }
    }

    /// Where the check applies on container values when not configured.
    pub fn default_applies_to(&self) -> ConstraintTarget {
        match self {
            Self::NotNull
            | Self::AssertNull
            | Self::NotEmpty
            | Self::Size { .. }
            | Self::MinSize(_)
            | Self::MaxSize(_)
            | Self::Assert { .. }
            | Self::AssertValid
            | Self::Pre { .. }
            | Self::Post { .. } => ConstraintTarget::Container,
            _ => ConstraintTarget::Values,
        }
    }

    /// Kind-specific substitutions for the message template.
    pub fn message_variables(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Length { min, max } | Self::Size { min, max } => {
                vec![("min", min.to_string()), ("max", max.to_string())]
            }
            Self::MinLength(min) | Self::MinSize(min) => vec![("min", min.to_string())],
            Self::MaxLength(max) | Self::MaxSize(max) => vec![("max", max.to_string())],
            Self::Range { min, max } => vec![("min", min.to_string()), ("max", max.to_string())],
            Self::Min { min, inclusive } => {
                vec![("min", min.to_string()), ("inclusive", inclusive.to_string())]
            }
            Self::Max { max, inclusive } => {
                vec![("max", max.to_string()), ("inclusive", inclusive.to_string())]
            }
            Self::MatchPattern { pattern, .. } => vec![("pattern", pattern.clone())],
            Self::MemberOf {
                members,
                ignore_case,
            }
            | Self::NotMemberOf {
                members,
                ignore_case,
            } => vec![
                ("members", members.join(", ")),
                ("ignoreCase", ignore_case.to_string()),
            ],
            Self::Assert {
                language,
                expression,
            }
            | Self::Pre {
                language,
                expression,
            } => vec![
                ("language", language.clone()),
                ("expression", expression.clone()),
            ],
            Self::Post {
                language,
                expression,
                old,
            } => vec![
                ("language", language.clone()),
                ("expression", expression.clone()),
                ("old", old.clone().unwrap_or_default()),
            ],
            Self::ValidateWithMethod {
                method,
                ignore_if_null,
            } => vec![
                ("methodName", method.clone()),
                ("ignoreIfNull", ignore_if_null.to_string()),
            ],
            Self::CheckWith(custom) => vec![("checker", custom.name().to_string())],
            Self::And(checks) | Self::Or(checks) | Self::Xor(checks) => {
                vec![("count", checks.len().to_string())]
            }
            _ => Vec::new(),
        }
    }
}

/// A configured constraint.
#[derive(Clone, Debug)]
pub struct Check {
    kind: CheckKind,
    message: Option<String>,
    error_code: Option<String>,
    severity: Severity,
    profiles: Vec<String>,
    target: Option<String>,
    applies_to: Option<Vec<ConstraintTarget>>,
    when: Option<String>,
}

fn invalid_parameter(check: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        check: check.to_string(),
        reason: reason.into(),
    }
}

impl Check {
    pub fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            message: None,
            error_code: None,
            severity: Severity::default(),
            profiles: Vec::new(),
            target: None,
            applies_to: None,
            when: None,
        }
    }

    pub fn not_null() -> Self {
        Self::new(CheckKind::NotNull)
    }

    pub fn assert_null() -> Self {
        Self::new(CheckKind::AssertNull)
    }

    pub fn not_empty() -> Self {
        Self::new(CheckKind::NotEmpty)
    }

    pub fn not_blank() -> Self {
        Self::new(CheckKind::NotBlank)
    }

    pub fn length(min: usize, max: usize) -> Result<Self, ConfigurationError> {
        if min > max {
            return Err(invalid_parameter("Length", format!("min {min} > max {max}")));
        }
        Ok(Self::new(CheckKind::Length { min, max }))
    }

    pub fn min_length(min: usize) -> Self {
        Self::new(CheckKind::MinLength(min))
    }

    pub fn max_length(max: usize) -> Self {
        Self::new(CheckKind::MaxLength(max))
    }

    pub fn size(min: usize, max: usize) -> Result<Self, ConfigurationError> {
        if min > max {
            return Err(invalid_parameter("Size", format!("min {min} > max {max}")));
        }
        Ok(Self::new(CheckKind::Size { min, max }))
    }

    pub fn min_size(min: usize) -> Self {
        Self::new(CheckKind::MinSize(min))
    }

    pub fn max_size(max: usize) -> Self {
        Self::new(CheckKind::MaxSize(max))
    }

    pub fn range(min: f64, max: f64) -> Result<Self, ConfigurationError> {
        if min.is_nan() || max.is_nan() {
            return Err(invalid_parameter("Range", "bounds must be numbers"));
        }
        if min > max {
            return Err(invalid_parameter("Range", format!("min {min} > max {max}")));
        }
        Ok(Self::new(CheckKind::Range { min, max }))
    }

    pub fn min(min: f64, inclusive: bool) -> Self {
        Self::new(CheckKind::Min { min, inclusive })
    }

    pub fn max(max: f64, inclusive: bool) -> Self {
        Self::new(CheckKind::Max { max, inclusive })
    }

    /// The whole value must match `pattern`.
    pub fn match_pattern(pattern: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| invalid_parameter("MatchPattern", e.to_string()))?;
        Ok(Self::new(CheckKind::MatchPattern {
            pattern: pattern.to_string(),
            regex,
        }))
    }

    pub fn member_of<S: Into<String>>(
        members: impl IntoIterator<Item = S>,
        ignore_case: bool,
    ) -> Result<Self, ConfigurationError> {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        if members.is_empty() {
            return Err(invalid_parameter("MemberOf", "no members given"));
        }
        Ok(Self::new(CheckKind::MemberOf {
            members,
            ignore_case,
        }))
    }

    pub fn not_member_of<S: Into<String>>(
        members: impl IntoIterator<Item = S>,
        ignore_case: bool,
    ) -> Self {
        Self::new(CheckKind::NotMemberOf {
            members: members.into_iter().map(Into::into).collect(),
            ignore_case,
        })
    }

    pub fn assert_true() -> Self {
        Self::new(CheckKind::AssertTrue)
    }

    pub fn assert_false() -> Self {
        Self::new(CheckKind::AssertFalse)
    }

    pub fn past() -> Self {
        Self::new(CheckKind::Past)
    }

    pub fn future() -> Self {
        Self::new(CheckKind::Future)
    }

    pub fn assert(language: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(CheckKind::Assert {
            language: language.into(),
            expression: expression.into(),
        })
    }

    pub fn validate_with_method(method: impl Into<String>, ignore_if_null: bool) -> Self {
        Self::new(CheckKind::ValidateWithMethod {
            method: method.into(),
            ignore_if_null,
        })
    }

    pub fn check_with(custom: impl CustomCheck + 'static) -> Self {
        Self::new(CheckKind::CheckWith(Arc::new(custom)))
    }

    pub fn assert_valid() -> Self {
        Self::new(CheckKind::AssertValid)
    }

    pub fn and(checks: Vec<Check>) -> Result<Self, ConfigurationError> {
        Ok(Self::new(CheckKind::And(group("And", checks)?)))
    }

    pub fn or(checks: Vec<Check>) -> Result<Self, ConfigurationError> {
        Ok(Self::new(CheckKind::Or(group("Or", checks)?)))
    }

    pub fn xor(checks: Vec<Check>) -> Result<Self, ConfigurationError> {
        Ok(Self::new(CheckKind::Xor(group("Xor", checks)?)))
    }

    pub fn not(check: Check) -> Self {
        Self::new(CheckKind::Not(Arc::new(check)))
    }

    pub fn pre(language: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(CheckKind::Pre {
            language: language.into(),
            expression: expression.into(),
        })
    }

    pub fn post(language: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(CheckKind::Post {
            language: language.into(),
            expression: expression.into(),
            old: None,
        })
    }

    /// Expression captured before the guarded call, bound as `_old` when the
    /// postcondition runs. Ignored on other kinds.
    pub fn with_old(mut self, old: impl Into<String>) -> Self {
        if let CheckKind::Post { old: slot, .. } = &mut self.kind {
            *slot = Some(old.into());
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_profiles<S: Into<String>>(mut self, profiles: impl IntoIterator<Item = S>) -> Self {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    /// Apply the check to the nodes a `language:expression` selects from
    /// the member value instead of the value itself.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn applies_to(mut self, targets: impl IntoIterator<Item = ConstraintTarget>) -> Self {
        self.applies_to = Some(targets.into_iter().collect());
        self
    }

    /// Only evaluate when the `language:expression` condition holds.
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }

    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn message_template(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }

    pub fn error_code(&self) -> String {
        self.error_code
            .clone()
            .unwrap_or_else(|| format!("covenant.{}", self.kind.name()))
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn when_condition(&self) -> Option<&str> {
        self.when.as_deref()
    }

    pub fn effective_applies_to(&self) -> Vec<ConstraintTarget> {
        self.applies_to
            .clone()
            .unwrap_or_else(|| vec![self.kind.default_applies_to()])
    }

    /// Evaluate against `value`, owned by `validated_object`.
    ///
    /// Pure with respect to its inputs. `AssertValid` and the method
    /// contract kinds need engine state and report `UnsupportedCheck`.
    pub fn is_satisfied(
        &self,
        validated_object: &Value,
        value: &Value,
        context: &Context,
        services: &dyn EngineServices,
    ) -> Result<bool, ConfigurationError> {
        use CheckKind::*;

        if value.is_null() && ignores_null(&self.kind) {
            return Ok(true);
        }

        let satisfied = match &self.kind {
            NotNull => !value.is_null(),
            AssertNull => value.is_null(),
            NotEmpty => match value {
                Value::Str(s) => !s.is_empty(),
                Value::List(items) => !items.is_empty(),
                Value::Map(entries) => !entries.is_empty(),
                _ => true,
            },
            NotBlank => match value {
                Value::Str(s) => !s.trim().is_empty(),
                _ => true,
            },
            Length { min, max } => within(text_len(value), *min, *max),
            MinLength(min) => text_len(value) >= *min,
            MaxLength(max) => text_len(value) <= *max,
            Size { min, max } => value.len().is_some_and(|n| within(n, *min, *max)),
            MinSize(min) => value.len().is_some_and(|n| n >= *min),
            MaxSize(max) => value.len().is_some_and(|n| n <= *max),
            Range { min, max } => number(value).is_some_and(|n| n >= *min && n <= *max),
            Min { min, inclusive } => {
                number(value).is_some_and(|n| if *inclusive { n >= *min } else { n > *min })
            }
            Max { max, inclusive } => {
                number(value).is_some_and(|n| if *inclusive { n <= *max } else { n < *max })
            }
            MatchPattern { regex, .. } => regex.is_match(&value.to_string()),
            MemberOf {
                members,
                ignore_case,
            } => is_member(value, members, *ignore_case),
            NotMemberOf {
                members,
                ignore_case,
            } => !is_member(value, members, *ignore_case),
            AssertTrue => truthiness(value) == Some(true),
            AssertFalse => truthiness(value) == Some(false),
            Past => matches!(value, Value::Timestamp(t) if *t < Utc::now()),
            Future => matches!(value, Value::Timestamp(t) if *t > Utc::now()),
            Assert {
                language,
                expression,
            } => {
                let mut bindings = Bindings::new();
                bindings.insert("_this".into(), validated_object.clone());
                bindings.insert("_value".into(), value.clone());
                services
                    .languages()
                    .evaluate_bool(language, expression, &bindings)?
            }
            ValidateWithMethod { method, .. } => match validated_object {
                Value::Object(object) => object.call_predicate(method, value)?,
                other => {
                    return Err(ConfigurationError::UnknownMethod {
                        type_name: other.kind().to_string(),
                        method: method.clone(),
                    });
                }
            },
            CheckWith(custom) => custom.is_satisfied(validated_object, value, context, services)?,
            And(checks) => {
                for check in checks {
                    if !check.is_satisfied(validated_object, value, context, services)? {
                        return Ok(false);
                    }
                }
                true
            }
            Or(checks) => {
                for check in checks {
                    if check.is_satisfied(validated_object, value, context, services)? {
                        return Ok(true);
                    }
                }
                false
            }
            Xor(checks) => {
                let mut satisfied = 0;
                for check in checks {
                    if check.is_satisfied(validated_object, value, context, services)? {
                        satisfied += 1;
                    }
                }
                satisfied == 1
            }
            Not(check) => !check.is_satisfied(validated_object, value, context, services)?,
            AssertValid | Pre { .. } | Post { .. } => {
                return Err(ConfigurationError::UnsupportedCheck {
                    check: self.name().to_string(),
                });
            }
        };
        Ok(satisfied)
    }
}

fn group(name: &str, checks: Vec<Check>) -> Result<Vec<Arc<Check>>, ConfigurationError> {
    if checks.is_empty() {
        return Err(invalid_parameter(name, "a group needs at least one check"));
    }
    Ok(checks.into_iter().map(Arc::new).collect())
}

/// Kinds for which a null value is trivially satisfied.
fn ignores_null(kind: &CheckKind) -> bool {
    match kind {
        CheckKind::NotNull
        | CheckKind::AssertNull
        | CheckKind::Assert { .. }
        | CheckKind::AssertValid
        | CheckKind::And(_)
        | CheckKind::Or(_)
        | CheckKind::Xor(_)
        | CheckKind::Not(_)
        | CheckKind::Pre { .. }
        | CheckKind::Post { .. } => false,
        CheckKind::ValidateWithMethod { ignore_if_null, .. } => *ignore_if_null,
        CheckKind::CheckWith(custom) => custom.ignore_if_null(),
        _ => true,
    }
}

fn within(n: usize, min: usize, max: usize) -> bool {
    n >= min && n <= max
}

fn text_len(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Str(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Str(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_member(value: &Value, members: &[String], ignore_case: bool) -> bool {
    let rendered = value.to_string();
    members.iter().any(|m| {
        if ignore_case {
            m.eq_ignore_ascii_case(&rendered)
        } else {
            *m == rendered
        }
    })
}
