//! Refinement Engine (C7)
//!
//! Construction and conversion rules for `Refined(base, predicates, tags)`
//! values (§4.4): `assume`/`refine`/type-call construction, predicate-AND
//! semantics, and the subset rule governing refined-to-refined conversion.
//! The `for`-`else` lowering of `refine(...)` itself (producing the guarded
//! single `yield`) is the inline kernel's concern once the surrounding
//! `for` is recognized as a refine-loop; this module owns the type-level
//! rules the lowering must respect.

use crate::diagnostics::{CoreError, ErrorKind, SourceSpan};
use crate::types::Type;
use std::collections::HashSet;

/// Whether a plain base-typed value may flow directly into a refined slot.
/// Per §4.4, never — only `assume`/`refine`/a refined type-call constructs
/// a refined value.
pub fn base_to_refined_allowed() -> bool {
    false
}

/// Forgetting a refinement (refined → its base type) is always allowed.
pub fn refined_to_base(base: &Type) -> Type {
    base.clone()
}

/// Refined → refined conversion: legal iff the destination's tag set is a
/// subset of the source's, and the destination's predicate set is a subset
/// of the source's (compared by structural identity of each `FuncRef`,
/// i.e. by name).
pub fn convert_refined(
    src_predicates: &[String],
    src_tags: &HashSet<String>,
    dst_predicates: &[String],
    dst_tags: &HashSet<String>,
    span: SourceSpan,
) -> Result<(), CoreError> {
    let src_pred_set: HashSet<&str> = src_predicates.iter().map(String::as_str).collect();
    let dst_pred_set: HashSet<&str> = dst_predicates.iter().map(String::as_str).collect();

    let tags_ok = dst_tags.is_subset(src_tags);
    let preds_ok = dst_pred_set.is_subset(&src_pred_set);

    if tags_ok && preds_ok {
        return Ok(());
    }
    let mut reasons = Vec::new();
    if !tags_ok {
        reasons.push("destination tags are not a subset of source tags".to_string());
    }
    if !preds_ok {
        reasons.push("destination predicates are not a subset of source predicates".to_string());
    }
    Err(CoreError::new(
        ErrorKind::RefineTagNotSubset(reasons.join("; ")),
        span,
    ))
}

/// `assume(v…, pred…, tag…)` — combine zero-check-cost into a refined
/// value. The runtime representation is the base type for a single
/// predicate (arity 1, a single value argument), or a struct of the
/// argument values when multiple predicates share one N-ary shape. This
/// function only validates arity; representation is a type-model concern
/// (`Type::Refined` / `validate_refined_shape` in [`crate::types`]).
pub fn validate_assume_arity(
    value_count: usize,
    predicate_arity: usize,
    span: SourceSpan,
) -> Result<(), CoreError> {
    if value_count != predicate_arity {
        return Err(CoreError::new(
            ErrorKind::RefinedArityMismatch(format!(
                "assume() given {value_count} values but predicates expect arity {predicate_arity}"
            )),
            span,
        ));
    }
    Ok(())
}

/// `refine(v…, pred…)` is legal only as the iterable of a `for` loop — any
/// other use site is rejected eagerly rather than deferred to a later pass.
pub fn validate_refine_site(in_for_iterable_position: bool, span: SourceSpan) -> Result<(), CoreError> {
    if in_for_iterable_position {
        Ok(())
    } else {
        Err(CoreError::new(
            ErrorKind::RefineOutsideForLoop(
                "'refine' may only appear as the iterable of a for-loop".to_string(),
            ),
            span,
        ))
    }
}

/// Build the conjunction of predicate calls guarding a `refine(...)`
/// for-loop's single `yield`, per §4.4: `p1(v) && p2(v) && ...`. Returned
/// as the ordered list of predicate call names to AND together; the inline
/// kernel (or a future AST-transform pass) is responsible for emitting the
/// actual guarded `if`/`yield`/`else` shape from this list.
pub fn predicate_conjunction(predicates: &[String]) -> Vec<String> {
    predicates.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    #[test]
    fn subset_tags_and_predicates_allow_conversion() {
        let src_tags: HashSet<String> = ["Positive".to_string(), "Checked".to_string()].into();
        let dst_tags: HashSet<String> = ["Positive".to_string()].into();
        let result = convert_refined(
            &["is_positive".to_string(), "is_small".to_string()],
            &src_tags,
            &["is_positive".to_string()],
            &dst_tags,
            span(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn extra_destination_tag_is_rejected() {
        let src_tags: HashSet<String> = ["Positive".to_string()].into();
        let dst_tags: HashSet<String> = ["Positive".to_string(), "Verified".to_string()].into();
        let result = convert_refined(&[], &src_tags, &[], &dst_tags, span());
        assert!(result.is_err());
    }

    #[test]
    fn extra_destination_predicate_is_rejected() {
        let src_tags = HashSet::new();
        let result = convert_refined(
            &["is_positive".to_string()],
            &src_tags,
            &["is_positive".to_string(), "is_even".to_string()],
            &src_tags,
            span(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn s8_refine_arity_mismatch_is_rejected() {
        let err = validate_assume_arity(1, 2, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RefinedArityMismatch(_)));
        assert!(validate_assume_arity(2, 2, span()).is_ok());
    }

    #[test]
    fn refine_outside_for_loop_is_rejected() {
        let err = validate_refine_site(false, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RefineOutsideForLoop(_)));
        assert!(validate_refine_site(true, span()).is_ok());
    }

    #[test]
    fn base_to_refined_is_never_allowed() {
        assert!(!base_to_refined_allowed());
    }
}
