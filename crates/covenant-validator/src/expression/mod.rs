//! Expression-language plugins.
//!
//! Target selectors (`path:level3/array`), `when` activation conditions,
//! `Assert` checks and method pre/postconditions are strings in some
//! expression language. Languages are looked up by tag in an
//! [`ExpressionLanguages`] registry owned by the validator. Two languages
//! ship with the crate:
//! - [`PathLanguage`] (`path`): XPath-like navigation through objects,
//!   lists and maps. Registered by default.
//! - [`FunctionLanguage`] (`fn`, or any tag you choose): named Rust
//!   closures over the bindings, registered programmatically.
//!
//! An unknown tag or a malformed expression is a [`ConfigurationError`],
//! never a violation.

mod function;
mod path;

use std::collections::HashMap;
use std::sync::Arc;

use covenant_types::{ConfigurationError, Value};
use indexmap::IndexMap;

pub use function::FunctionLanguage;
pub use path::PathLanguage;

/// Named values visible to an expression.
///
/// Conventional names: `_this` (the object owning the member or method),
/// `_value` (the value under validation), `_args` (method arguments as a
/// list), `_returns` (return value), `_old` (value captured before the call),
/// plus one entry per declared method parameter.
pub type Bindings = IndexMap<String, Value>;

/// Tag used for target expressions that carry no explicit language prefix.
pub const DEFAULT_TARGET_LANGUAGE: &str = "path";

pub trait ExpressionLanguage: Send + Sync {
    /// Tag this language is registered under.
    fn name(&self) -> &str;

    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, ConfigurationError>;

    fn evaluate_bool(&self, expression: &str, bindings: &Bindings) -> Result<bool, ConfigurationError> {
        match self.evaluate(expression, bindings)? {
            Value::Bool(b) => Ok(b),
            other => Err(ConfigurationError::NonBooleanResult {
                language: self.name().to_string(),
                expression: expression.to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Resolve a target selector to the nodes it addresses.
    ///
    /// Zero nodes is a legitimate answer. Languages that cannot select
    /// nodes keep the default, which reports the expression as invalid.
    fn resolve(
        &self,
        expression: &str,
        _root: &Value,
        _current: &Value,
    ) -> Result<Vec<Value>, ConfigurationError> {
        Err(ConfigurationError::InvalidExpression {
            language: self.name().to_string(),
            expression: expression.to_string(),
            reason: "language does not support target selection".to_string(),
        })
    }
}

/// Registry of expression languages keyed by tag.
#[derive(Clone, Default)]
pub struct ExpressionLanguages {
    languages: HashMap<String, Arc<dyn ExpressionLanguage>>,
}

impl ExpressionLanguages {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `path` language.
    pub fn with_defaults() -> Self {
        let mut languages = Self::new();
        languages.register(Arc::new(PathLanguage));
        languages
    }

    /// Register a language, replacing any previous one with the same tag.
    pub fn register(&mut self, language: Arc<dyn ExpressionLanguage>) {
        self.languages
            .insert(language.name().to_string(), language);
    }

    pub fn get(&self, tag: &str) -> Result<&Arc<dyn ExpressionLanguage>, ConfigurationError> {
        self.languages
            .get(tag)
            .ok_or_else(|| ConfigurationError::UnknownLanguage {
                language: tag.to_string(),
            })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.languages.contains_key(tag)
    }

    pub fn evaluate(
        &self,
        tag: &str,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<Value, ConfigurationError> {
        self.get(tag)?.evaluate(expression, bindings)
    }

    pub fn evaluate_bool(
        &self,
        tag: &str,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<bool, ConfigurationError> {
        self.get(tag)?.evaluate_bool(expression, bindings)
    }

    /// Resolve a `tag:expression` target. Untagged targets use
    /// [`DEFAULT_TARGET_LANGUAGE`].
    pub fn resolve_target(
        &self,
        target: &str,
        root: &Value,
        current: &Value,
    ) -> Result<Vec<Value>, ConfigurationError> {
        let (tag, expression) = split_tagged(target).unwrap_or((DEFAULT_TARGET_LANGUAGE, target));
        self.get(tag)?.resolve(expression, root, current)
    }

    /// Evaluate a `tag:expression` condition, such as a check's `when`.
    pub fn evaluate_tagged_bool(
        &self,
        tagged: &str,
        bindings: &Bindings,
    ) -> Result<bool, ConfigurationError> {
        let (tag, expression) =
            split_tagged(tagged).ok_or_else(|| ConfigurationError::InvalidExpression {
                language: String::new(),
                expression: tagged.to_string(),
                reason: "expected '<language>:<expression>'".to_string(),
            })?;
        self.evaluate_bool(tag, expression, bindings)
    }
}

/// Split `tag:expression`. Returns `None` when there is no tag.
pub fn split_tagged(s: &str) -> Option<(&str, &str)> {
    let (tag, rest) = s.split_once(':')?;
    let is_tag = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    is_tag.then_some((tag, rest))
}
