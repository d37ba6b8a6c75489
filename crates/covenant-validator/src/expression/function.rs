use std::collections::HashMap;
use std::sync::Arc;

use covenant_types::{ConfigurationError, Value};

use super::{Bindings, ExpressionLanguage};

type Function = Arc<dyn Fn(&Bindings) -> Value + Send + Sync>;

/// Expression language whose expressions are names of registered closures.
///
/// ```ignore
/// let lang = FunctionLanguage::new("fn")
///     .function("has_funds", |b| Value::from(balance(b) >= amount(b)));
/// ```
#[derive(Clone)]
pub struct FunctionLanguage {
    tag: String,
    functions: HashMap<String, Function>,
}

impl FunctionLanguage {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            functions: HashMap::new(),
        }
    }

    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Bindings) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }
}

impl ExpressionLanguage for FunctionLanguage {
    fn name(&self) -> &str {
        &self.tag
    }

    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, ConfigurationError> {
        let f = self
            .functions
            .get(expression.trim())
            .ok_or_else(|| ConfigurationError::InvalidExpression {
                language: self.tag.clone(),
                expression: expression.to_string(),
                reason: "no function registered under this name".to_string(),
            })?;
        Ok(f(bindings))
    }
}
