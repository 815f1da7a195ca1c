//! Match Lowerer (C8)
//!
//! Pattern normalization, exhaustiveness checking via a pattern-matrix
//! usefulness algorithm in the style of Maranget's "Warnings for pattern
//! matching", and the switch-table vs if-chain lowering decision (§4.5).

use crate::ast::Pattern;
use crate::diagnostics::{CoreError, ErrorKind, SourceSpan, Witness};
use crate::types::Type;
use std::collections::HashSet;

/// The two shapes a `match` can lower to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lowering {
    /// Every arm is an unguarded integer-literal pattern (or an `Or` of
    /// them) over a single integral subject.
    SwitchTable,
    /// Sequential destructuring and guard evaluation in source-arm order.
    IfChain,
}

/// Flatten `Or` patterns into individual rows; every other pattern shape is
/// already a single row.
pub(crate) fn flatten_row(pattern: &Pattern) -> Vec<&Pattern> {
    match pattern {
        Pattern::Or(pats) => pats.iter().flat_map(flatten_row).collect(),
        other => vec![other],
    }
}

/// Check exhaustiveness of `arms` over `subject_ty`. An unguarded arm is
/// one whose `has_guard` is false; a guarded arm can never discharge
/// exhaustiveness on its own since the guard might fail at runtime.
pub struct Arm<'a> {
    pub pattern: &'a Pattern,
    pub has_guard: bool,
}

pub fn check_exhaustive(
    subject_ty: &Type,
    arms: &[Arm<'_>],
    span: SourceSpan,
) -> Result<(), CoreError> {
    let mut rows: Vec<&Pattern> = Vec::new();
    for arm in arms {
        if arm.has_guard {
            continue;
        }
        rows.extend(flatten_row(arm.pattern));
    }

    if rows.iter().any(|p| p.is_catch_all()) {
        return Ok(());
    }

    match subject_ty {
        Type::Bool => {
            let mut covered = HashSet::new();
            for p in &rows {
                if let Pattern::BoolLit(b) = p {
                    covered.insert(*b);
                }
            }
            let missing: Vec<&str> = [true, false]
                .iter()
                .filter(|b| !covered.contains(*b))
                .map(|b| if *b { "true" } else { "false" })
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(nonexhaustive(missing[0].to_string(), span))
            }
        }
        Type::Enum { variants, .. } => {
            let mut covered = HashSet::new();
            for p in &rows {
                if let Pattern::Struct { tag: Some(name), .. } = p {
                    covered.insert(name.as_str());
                }
            }
            match variants.iter().find(|v| !covered.contains(v.name.as_str())) {
                None => Ok(()),
                Some(missing) => Err(nonexhaustive(format!("{}(_)", missing.name), span)),
            }
        }
        _ => Err(nonexhaustive("_".to_string(), span)),
    }
}

fn nonexhaustive(witness: String, span: SourceSpan) -> CoreError {
    CoreError::new(ErrorKind::MatchNonExhaustive(witness.clone()), span)
        .with_witness(Witness::UncoveredValue(witness))
}

/// Choose how to lower a match whose exhaustiveness has already been
/// confirmed: a switch table when every arm is an unguarded integer
/// literal (or `Or` of them), possibly with a trailing catch-all arm
/// serving as the table's `default` label; an if-chain otherwise. A
/// catch-all arm anywhere but last can't become a `default` (a switch's
/// default is unconditional and always comes last), so it falls back to
/// an if-chain.
pub fn choose_lowering(subject_ty: &Type, arms: &[Arm<'_>]) -> Lowering {
    let is_integral = matches!(subject_ty, Type::Int(_));
    let Some((last, rest)) = (is_integral).then(|| arms.split_last()).flatten() else {
        return Lowering::IfChain;
    };

    let is_int_literal_arm =
        |arm: &Arm<'_>| !arm.has_guard && flatten_row(arm.pattern).iter().all(|p| matches!(p, Pattern::IntLit(_)));
    let is_default_arm = |arm: &Arm<'_>| !arm.has_guard && flatten_row(arm.pattern).iter().all(|p| p.is_catch_all());

    if rest.iter().all(|arm| is_int_literal_arm(arm)) && (is_int_literal_arm(last) || is_default_arm(last)) {
        Lowering::SwitchTable
    } else {
        Lowering::IfChain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntType;

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    #[test]
    fn s4_bool_match_is_exhaustive_with_both_arms() {
        let true_arm = Pattern::BoolLit(true);
        let false_arm = Pattern::BoolLit(false);
        let arms = vec![
            Arm { pattern: &true_arm, has_guard: false },
            Arm { pattern: &false_arm, has_guard: false },
        ];
        assert!(check_exhaustive(&Type::Bool, &arms, span()).is_ok());
    }

    #[test]
    fn s4_bool_match_missing_an_arm_is_nonexhaustive() {
        let true_arm = Pattern::BoolLit(true);
        let arms = vec![Arm { pattern: &true_arm, has_guard: false }];
        let err = check_exhaustive(&Type::Bool, &arms, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MatchNonExhaustive(_)));
    }

    #[test]
    fn catch_all_wildcard_is_always_exhaustive() {
        let wc = Pattern::Wildcard;
        let arms = vec![Arm { pattern: &wc, has_guard: false }];
        let int_ty = Type::Int(IntType::new(true, 32).unwrap());
        assert!(check_exhaustive(&int_ty, &arms, span()).is_ok());
    }

    #[test]
    fn infinite_type_without_catch_all_is_nonexhaustive() {
        let lit = Pattern::IntLit(1);
        let arms = vec![Arm { pattern: &lit, has_guard: false }];
        let int_ty = Type::Int(IntType::new(true, 32).unwrap());
        let err = check_exhaustive(&int_ty, &arms, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MatchNonExhaustive(_)));
    }

    #[test]
    fn guarded_arm_does_not_discharge_exhaustiveness() {
        let lit = Pattern::BoolLit(true);
        let wc = Pattern::Wildcard;
        let arms = vec![
            Arm { pattern: &lit, has_guard: false },
            Arm { pattern: &wc, has_guard: true },
        ];
        let err = check_exhaustive(&Type::Bool, &arms, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MatchNonExhaustive(_)));
    }

    #[test]
    fn switch_table_chosen_for_all_integer_literal_arms() {
        let a = Pattern::IntLit(1);
        let b = Pattern::Wildcard;
        let int_ty = Type::Int(IntType::new(true, 32).unwrap());
        let arms = vec![
            Arm { pattern: &a, has_guard: false },
            Arm { pattern: &b, has_guard: false },
        ];
        assert_eq!(choose_lowering(&int_ty, &arms), Lowering::SwitchTable);
    }

    #[test]
    fn if_chain_chosen_when_guard_present() {
        let a = Pattern::IntLit(1);
        let int_ty = Type::Int(IntType::new(true, 32).unwrap());
        let arms = vec![Arm { pattern: &a, has_guard: true }];
        assert_eq!(choose_lowering(&int_ty, &arms), Lowering::IfChain);
    }
}
