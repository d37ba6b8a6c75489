//! Boolean composition of checks.
//!
//! The engine evaluates each child with its full pipeline and hands the
//! resulting violations back here; this module only decides whether the
//! group holds and which child violations survive as causes.

use std::sync::Arc;

use crate::check::{Check, CheckKind};
use crate::config::GroupReporting;
use crate::violation::ConstraintViolation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupOp {
    And,
    Or,
    Xor,
    Not,
}

impl GroupOp {
    /// The operator and children of a group kind, `None` for leaf kinds.
    pub fn of(kind: &CheckKind) -> Option<(Self, &[Arc<Check>])> {
        match kind {
            CheckKind::And(children) => Some((Self::And, children.as_slice())),
            CheckKind::Or(children) => Some((Self::Or, children.as_slice())),
            CheckKind::Xor(children) => Some((Self::Xor, children.as_slice())),
            CheckKind::Not(child) => Some((Self::Not, std::slice::from_ref(child))),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct GroupOutcome {
    pub satisfied: bool,
    /// Children that held. Only exact for `Xor`, which never short-circuits.
    pub satisfied_count: usize,
    /// Child violations, populated under [`GroupReporting::WithBranches`].
    pub causes: Vec<ConstraintViolation>,
}

/// Evaluate a group.
///
/// `evaluate_child` returns the violations a child produces for the value
/// under test; an empty vector means the child holds. `And` stops at the
/// first failing child and `Or` at the first holding one unless branches
/// are being reported, in which case every child runs.
pub fn evaluate_group<F, E>(
    op: GroupOp,
    children: &[Arc<Check>],
    reporting: GroupReporting,
    mut evaluate_child: F,
) -> Result<GroupOutcome, E>
where
    F: FnMut(&Arc<Check>) -> Result<Vec<ConstraintViolation>, E>,
{
    let with_branches = reporting == GroupReporting::WithBranches;
    let mut outcome = GroupOutcome::default();
    let mut failed = Vec::new();

    match op {
        GroupOp::And => {
            for child in children {
                let violations = evaluate_child(child)?;
                if violations.is_empty() {
                    outcome.satisfied_count += 1;
                } else {
                    failed.extend(violations);
                    if !with_branches {
                        break;
                    }
                }
            }
            outcome.satisfied = outcome.satisfied_count == children.len();
        }
        GroupOp::Or => {
            for child in children {
                let violations = evaluate_child(child)?;
                if violations.is_empty() {
                    outcome.satisfied_count += 1;
                    break;
                }
                failed.extend(violations);
            }
            outcome.satisfied = outcome.satisfied_count > 0;
        }
        GroupOp::Xor => {
            for child in children {
                let violations = evaluate_child(child)?;
                if violations.is_empty() {
                    outcome.satisfied_count += 1;
                } else {
                    failed.extend(violations);
                }
            }
            outcome.satisfied = outcome.satisfied_count == 1;
            // With several branches holding there is no failing branch to blame.
            if outcome.satisfied_count > 1 {
                failed.clear();
            }
        }
        GroupOp::Not => {
            for child in children {
                if evaluate_child(child)?.is_empty() {
                    outcome.satisfied_count += 1;
                }
            }
            outcome.satisfied = outcome.satisfied_count == 0;
        }
    }

    if !outcome.satisfied && with_branches {
        outcome.causes = failed;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use covenant_types::{Context, Severity, Value};

    use super::*;

    fn fake_violation(check: &Arc<Check>) -> ConstraintViolation {
        ConstraintViolation {
            message: format!("{} failed", check.name()),
            message_template: String::new(),
            error_code: check.error_code(),
            severity: Severity::Error,
            context: Context::field("T", "f"),
            validated_object: Value::Null,
            root: Value::Null,
            invalid_value: Value::Null,
            check: Arc::clone(check),
            causes: Vec::new(),
            position: Default::default(),
        }
    }

    /// Children named AssertTrue hold, AssertFalse fail.
    fn children(pattern: &[bool]) -> Vec<Arc<Check>> {
        pattern
            .iter()
            .map(|ok| Arc::new(if *ok { Check::assert_true() } else { Check::assert_false() }))
            .collect()
    }

    fn run(op: GroupOp, pattern: &[bool], reporting: GroupReporting) -> (GroupOutcome, usize) {
        let kids = children(pattern);
        let mut calls = 0;
        let outcome = evaluate_group(op, &kids, reporting, |child| {
            calls += 1;
            Ok::<_, ()>(match child.kind() {
                CheckKind::AssertTrue => vec![],
                _ => vec![fake_violation(child)],
            })
        })
        .unwrap();
        (outcome, calls)
    }

    #[test]
    fn and_short_circuits_unless_reporting_branches() {
        let (outcome, calls) = run(GroupOp::And, &[false, false, true], GroupReporting::GroupOnly);
        assert!(!outcome.satisfied);
        assert_eq!(calls, 1);
        assert!(outcome.causes.is_empty());

        let (outcome, calls) = run(GroupOp::And, &[false, false, true], GroupReporting::WithBranches);
        assert_eq!(calls, 3);
        assert_eq!(outcome.causes.len(), 2);
    }

    #[test]
    fn or_stops_at_first_holding_child() {
        let (outcome, calls) = run(GroupOp::Or, &[false, true, false], GroupReporting::WithBranches);
        assert!(outcome.satisfied);
        assert_eq!(calls, 2);
        assert!(outcome.causes.is_empty());
    }

    #[test]
    fn xor_needs_exactly_one() {
        assert!(run(GroupOp::Xor, &[true, false], GroupReporting::GroupOnly).0.satisfied);
        let (none, _) = run(GroupOp::Xor, &[false, false], GroupReporting::WithBranches);
        assert!(!none.satisfied);
        assert_eq!(none.causes.len(), 2);
        let (both, _) = run(GroupOp::Xor, &[true, true], GroupReporting::WithBranches);
        assert!(!both.satisfied);
        assert_eq!(both.satisfied_count, 2);
        assert!(both.causes.is_empty());
    }

    #[test]
    fn not_inverts() {
        assert!(run(GroupOp::Not, &[false], GroupReporting::GroupOnly).0.satisfied);
        assert!(!run(GroupOp::Not, &[true], GroupReporting::GroupOnly).0.satisfied);
    }
}
