//! Rewriting into the checker's operator basis.
//!
//! The checker evaluates `{Atom, Negation, And, Or, ExistsNext,
//! ExistsUntil, AllUntil}` directly. Everything else is definable:
//!
//! ```text
//! AX f  ==  !EX !f
//! EF f  ==  E (true U f)
//! AF f  ==  A (true U f)
//! EG f  ==  !A (true U !f)
//! AG f  ==  !E (true U !f)
//! ```

use crate::ast::{Formula, Operator};

/// Rewrite `formula` into until normal form.
///
/// The result is structurally interned like any other formula, so repeated
/// normalization of shared sub-formulas yields shared results.
pub fn normalize(formula: &Formula) -> Formula {
    match formula.operator() {
        Operator::Atom => formula.clone(),
        Operator::Negation => Formula::negation(&normalize(formula.operand(0))),
        Operator::And => Formula::and(
            &normalize(formula.operand(0)),
            &normalize(formula.operand(1)),
        ),
        Operator::Or => Formula::or(
            &normalize(formula.operand(0)),
            &normalize(formula.operand(1)),
        ),
        Operator::ExistsNext => Formula::exists_next(&normalize(formula.operand(0))),
        Operator::ExistsUntil => Formula::exists_until(
            &normalize(formula.operand(0)),
            &normalize(formula.operand(1)),
        ),
        Operator::AllUntil => Formula::all_until(
            &normalize(formula.operand(0)),
            &normalize(formula.operand(1)),
        ),
        Operator::AllNext => {
            let inner = normalize(formula.operand(0));
            Formula::negation(&Formula::exists_next(&Formula::negation(&inner)))
        }
        Operator::ExistsFuture => {
            Formula::exists_until(&Formula::tt(), &normalize(formula.operand(0)))
        }
        Operator::AllFuture => Formula::all_until(&Formula::tt(), &normalize(formula.operand(0))),
        Operator::ExistsGlobally => {
            let inner = normalize(formula.operand(0));
            Formula::negation(&Formula::all_until(&Formula::tt(), &Formula::negation(&inner)))
        }
        Operator::AllGlobally => {
            let inner = normalize(formula.operand(0));
            Formula::negation(&Formula::exists_until(
                &Formula::tt(),
                &Formula::negation(&inner),
            ))
        }
    }
}

/// True when `formula` is already inside the checker's basis.
pub fn is_normalized(formula: &Formula) -> bool {
    let basis = matches!(
        formula.operator(),
        Operator::Atom
            | Operator::Negation
            | Operator::And
            | Operator::Or
            | Operator::ExistsNext
            | Operator::ExistsUntil
            | Operator::AllUntil
    );
    basis && formula.operands().iter().all(is_normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizing_basis_formulas_is_identity() {
        let f = Formula::exists_until(&Formula::prop("a"), &Formula::prop("b"));
        assert_eq!(normalize(&f), f);
        assert!(is_normalized(&f));
    }

    #[test]
    fn sugar_operators_are_rewritten() {
        let p = Formula::prop("p");

        let ef = normalize(&Formula::exists_future(&p));
        assert_eq!(ef, Formula::exists_until(&Formula::tt(), &p));

        let af = normalize(&Formula::all_future(&p));
        assert_eq!(af, Formula::all_until(&Formula::tt(), &p));

        let ax = normalize(&Formula::all_next(&p));
        assert_eq!(
            ax,
            Formula::negation(&Formula::exists_next(&Formula::negation(&p)))
        );

        let ag = normalize(&Formula::all_globally(&p));
        assert_eq!(
            ag,
            Formula::negation(&Formula::exists_until(
                &Formula::tt(),
                &Formula::negation(&p)
            ))
        );
        assert!(is_normalized(&ag));
    }

    #[test]
    fn nested_sugar_is_rewritten_recursively() {
        let p = Formula::prop("p");
        let f = normalize(&Formula::exists_next(&Formula::all_future(&p)));
        assert_eq!(
            f,
            Formula::exists_next(&Formula::all_until(&Formula::tt(), &p))
        );
    }

    #[test]
    fn non_basis_formulas_are_reported() {
        assert!(!is_normalized(&Formula::all_globally(&Formula::prop("p"))));
    }
}
