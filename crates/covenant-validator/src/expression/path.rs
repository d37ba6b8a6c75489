//! `path` expression language.
//!
//! Grammar:
//! ```text
//! path      := '/' | ['/'] step ('/' step)*
//! step      := ('.' | name) predicate*
//! predicate := '[' integer ']'                 1-based index into a list
//!            | '[' '@' name '=' literal ']'    keep list elements whose member equals literal
//! literal   := integer | float | 'text' | "text" | true | false | null
//! ```
//!
//! Stepping through `null` or a missing map key yields no nodes. Stepping
//! into a list applies the step to every element. Naming a member the
//! object's type does not declare is a configuration error.

use covenant_types::{ConfigurationError, Value};

use super::{Bindings, ExpressionLanguage};

const NAME: &str = "path";

#[derive(Clone, Copy, Debug, Default)]
pub struct PathLanguage;

#[derive(Clone, Debug, PartialEq)]
enum Selector {
    Current,
    Member(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Index(usize),
    Equals { member: String, literal: Value },
}

#[derive(Clone, Debug, PartialEq)]
struct Step {
    selector: Selector,
    predicates: Vec<Predicate>,
}

#[derive(Clone, Debug, PartialEq)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

impl ExpressionLanguage for PathLanguage {
    fn name(&self) -> &str {
        NAME
    }

    /// The first step names a binding; the rest navigate from it.
    /// Zero nodes evaluate to `Null`, several to a `List`.
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, ConfigurationError> {
        let path = parse(expression)?;
        let Some((first, rest)) = path.steps.split_first() else {
            return Err(invalid(expression, "empty path"));
        };
        let binding = match (path.absolute, &first.selector) {
            (false, Selector::Member(name)) => bindings
                .get(name)
                .ok_or_else(|| invalid(expression, &format!("unknown binding '{name}'")))?,
            _ => return Err(invalid(expression, "expression must start with a binding name")),
        };
        let mut nodes = apply_predicates(vec![binding.clone()], &first.predicates, expression)?;
        for step in rest {
            nodes = apply_step(nodes, step, expression)?;
        }
        Ok(match nodes.len() {
            0 => Value::Null,
            1 => nodes.remove(0),
            _ => Value::List(nodes),
        })
    }

    fn resolve(
        &self,
        expression: &str,
        root: &Value,
        current: &Value,
    ) -> Result<Vec<Value>, ConfigurationError> {
        let path = parse(expression)?;
        let start = if path.absolute { root } else { current };
        let mut nodes = vec![start.clone()];
        for step in &path.steps {
            nodes = apply_step(nodes, step, expression)?;
        }
        Ok(nodes)
    }
}

fn invalid(expression: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidExpression {
        language: NAME.to_string(),
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

fn apply_step(nodes: Vec<Value>, step: &Step, expression: &str) -> Result<Vec<Value>, ConfigurationError> {
    let selected = match &step.selector {
        Selector::Current => nodes,
        Selector::Member(name) => {
            let mut out = Vec::new();
            for node in &nodes {
                select_member(node, name, expression, &mut out)?;
            }
            out
        }
    };
    apply_predicates(selected, &step.predicates, expression)
}

fn select_member(
    node: &Value,
    name: &str,
    expression: &str,
    out: &mut Vec<Value>,
) -> Result<(), ConfigurationError> {
    match node {
        Value::Null => Ok(()),
        Value::Object(object) => {
            out.push(object.field(name)?);
            Ok(())
        }
        Value::Map(_) => {
            out.extend(node.get(name).cloned());
            Ok(())
        }
        Value::List(items) => {
            for item in items {
                select_member(item, name, expression, out)?;
            }
            Ok(())
        }
        other => Err(invalid(
            expression,
            &format!("cannot select '{name}' from a {}", other.kind()),
        )),
    }
}

fn apply_predicates(
    mut nodes: Vec<Value>,
    predicates: &[Predicate],
    expression: &str,
) -> Result<Vec<Value>, ConfigurationError> {
    for predicate in predicates {
        let mut out = Vec::new();
        for node in nodes {
            match (predicate, node) {
                (Predicate::Index(i), Value::List(items)) => {
                    out.extend(items.into_iter().nth(i - 1));
                }
                (Predicate::Index(i), other) => {
                    if *i == 1 {
                        out.push(other);
                    }
                }
                (Predicate::Equals { member, literal }, Value::List(items)) => {
                    for item in items {
                        if member_equals(&item, member, literal, expression)? {
                            out.push(item);
                        }
                    }
                }
                (Predicate::Equals { member, literal }, other) => {
                    if member_equals(&other, member, literal, expression)? {
                        out.push(other);
                    }
                }
            }
        }
        nodes = out;
    }
    Ok(nodes)
}

fn member_equals(
    node: &Value,
    member: &str,
    literal: &Value,
    expression: &str,
) -> Result<bool, ConfigurationError> {
    let mut selected = Vec::new();
    select_member(node, member, expression, &mut selected)?;
    Ok(selected.iter().any(|v| loosely_equals(v, literal)))
}

/// Literal comparison with the usual coercions: booleans compare to 0/1,
/// numbers across int/float, everything else by rendered text.
fn loosely_equals(value: &Value, literal: &Value) -> bool {
    match (value, literal) {
        (Value::Bool(b), Value::Int(_) | Value::Float(_)) => {
            Some(if *b { 1.0 } else { 0.0 }) == literal.as_f64()
        }
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => a.as_f64() == b.as_f64(),
        (a, b) => a.to_string() == b.to_string(),
    }
}

fn parse(expression: &str) -> Result<Path, ConfigurationError> {
    let mut chars = expression.trim().chars().peekable();
    let absolute = chars.next_if_eq(&'/').is_some();
    let mut steps = Vec::new();
    if absolute && chars.peek().is_none() {
        return Ok(Path { absolute, steps });
    }

    loop {
        let selector = if chars.next_if_eq(&'.').is_some() {
            Selector::Current
        } else {
            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_' || *c == '-') {
                name.push(c);
            }
            if name.is_empty() {
                return Err(invalid(expression, "expected a member name or '.'"));
            }
            Selector::Member(name)
        };

        let mut predicates = Vec::new();
        while chars.next_if_eq(&'[').is_some() {
            let mut body = String::new();
            let mut quote = None;
            loop {
                match chars.next() {
                    None => return Err(invalid(expression, "unterminated '['")),
                    Some(c) if quote == Some(c) => {
                        quote = None;
                        body.push(c);
                    }
                    Some(c) if quote.is_none() && (c == '\'' || c == '"') => {
                        quote = Some(c);
                        body.push(c);
                    }
                    Some(']') if quote.is_none() => break,
                    Some(c) => body.push(c),
                }
            }
            predicates.push(parse_predicate(body.trim(), expression)?);
        }

        steps.push(Step {
            selector,
            predicates,
        });

        match chars.next() {
            None => break,
            Some('/') => continue,
            Some(c) => return Err(invalid(expression, &format!("unexpected '{c}'"))),
        }
    }

    Ok(Path { absolute, steps })
}

fn parse_predicate(body: &str, expression: &str) -> Result<Predicate, ConfigurationError> {
    if let Some(filter) = body.strip_prefix('@') {
        let (member, literal) = filter
            .split_once('=')
            .ok_or_else(|| invalid(expression, "expected '[@member=literal]'"))?;
        return Ok(Predicate::Equals {
            member: member.trim().to_string(),
            literal: parse_literal(literal.trim(), expression)?,
        });
    }
    match body.parse::<usize>() {
        Ok(0) => Err(invalid(expression, "indexes start at 1")),
        Ok(i) => Ok(Predicate::Index(i)),
        Err(_) => Err(invalid(expression, &format!("unsupported predicate '[{body}]'"))),
    }
}

fn parse_literal(literal: &str, expression: &str) -> Result<Value, ConfigurationError> {
    let quoted = |q: char| literal.len() >= 2 && literal.starts_with(q) && literal.ends_with(q);
    if quoted('\'') || quoted('"') {
        return Ok(Value::Str(literal[1..literal.len() - 1].to_string()));
    }
    match literal {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(i) = literal.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    literal
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| invalid(expression, &format!("invalid literal '{literal}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{level1, level2, level3, thing};

    fn resolve(expression: &str, current: &Value) -> Result<Vec<Value>, ConfigurationError> {
        PathLanguage.resolve(expression, &Value::Null, current)
    }

    #[test]
    fn parses_steps_and_predicates() {
        let path = parse("/a/.[2]/b[@c='x]y']").unwrap();
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 3);
        assert_eq!(
            path.steps[2].predicates,
            vec![Predicate::Equals {
                member: "c".into(),
                literal: Value::from("x]y"),
            }]
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["", "a//b", "a[", "a[0]", "a[@b]", "a b"] {
            assert!(
                matches!(parse(bad), Err(ConfigurationError::InvalidExpression { .. })),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn null_intermediate_yields_no_nodes() {
        let lv2 = level2(None);
        assert!(resolve("level3/name", &lv2).unwrap().is_empty());
    }

    #[test]
    fn null_leaf_is_a_node() {
        let lv2 = level2(Some(level3(None, None)));
        assert_eq!(resolve("level3/name", &lv2).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn unknown_member_on_live_object_is_configuration_error() {
        let lv2 = level2(Some(level3(None, None)));
        let err = resolve("level3/foobar", &lv2).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownField {
                type_name: "Level3".into(),
                field: "foobar".into(),
            }
        );
    }

    #[test]
    fn index_selects_list_element() {
        let lv2 = level2(Some(level3(None, Some(&["a", "bb", "ccc"]))));
        assert_eq!(resolve("level3/array[2]", &lv2).unwrap(), vec![Value::from("bb")]);
        assert!(resolve("level3/array[9]", &lv2).unwrap().is_empty());
        assert_eq!(resolve("level3/array", &lv2).unwrap().len(), 1);
    }

    #[test]
    fn filter_compares_bool_with_zero() {
        let things = Value::from(vec![thing(true), thing(false), thing(false)]);
        let nodes = resolve(".[@visible=0]/visible", &things).unwrap();
        assert_eq!(nodes, vec![Value::Bool(false), Value::Bool(false)]);
    }

    #[test]
    fn absolute_paths_start_at_root() {
        let root = level1(None, None, vec![]);
        let nodes = PathLanguage
            .resolve("/level2a", &root, &Value::Null)
            .unwrap();
        assert_eq!(nodes, vec![Value::Null]);
        assert_eq!(PathLanguage.resolve("/", &root, &Value::Null).unwrap(), vec![root]);
    }

    #[test]
    fn evaluate_starts_from_binding() {
        let mut bindings = Bindings::new();
        bindings.insert("_this".into(), level2(Some(level3(Some("lvl"), None))));
        assert_eq!(
            PathLanguage.evaluate("_this/level3/name", &bindings).unwrap(),
            Value::from("lvl")
        );
        assert!(PathLanguage.evaluate("nope/x", &bindings).is_err());
    }

    #[test]
    fn evaluate_bool_rejects_non_boolean() {
        let mut bindings = Bindings::new();
        bindings.insert("_value".into(), Value::Int(3));
        let err = PathLanguage.evaluate_bool("_value", &bindings).unwrap_err();
        assert!(matches!(err, ConfigurationError::NonBooleanResult { .. }));
    }
}
