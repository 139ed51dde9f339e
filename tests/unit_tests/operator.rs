use nalgebra::DVector;
use proptest::collection::vec;
use proptest::prelude::*;
use util::assert_panics;
use weakfem::error::ConfigurationError;
use weakfem::operator::{Coefficient, DiffOp, OpDerivative, Term, TermKind};

fn value(variable: usize) -> DiffOp {
    DiffOp::real(OpDerivative::value(variable))
}

fn derivative(variable: usize, coordinate: usize) -> DiffOp {
    DiffOp::real(OpDerivative {
        variable,
        coordinate: Some(coordinate),
        order: 1,
    })
}

#[test]
fn virt_swaps_real_and_virtual_operators() {
    let u = derivative(0, 1);
    let v = u.virt();
    assert_eq!(v.terms()[0].real, None);
    assert_eq!(v.terms()[0].vir, u.terms()[0].real);
    assert_eq!(v.terms()[0].kind(), TermKind::Load);
    assert_eq!(v.virt(), u);
    assert_eq!(u.terms()[0].kind(), TermKind::RealOnly);
}

#[test]
fn product_of_real_and_virtual_is_bilinear() {
    let op = value(0).virt().try_mul(&(derivative(1, 0) * 3.0)).unwrap();
    assert_eq!(op.len(), 1);
    let term = &op.terms()[0];
    assert_eq!(term.kind(), TermKind::Bilinear);
    assert_eq!(term.coefficient, Coefficient::Scalar(3.0));
    assert_eq!(term.vir, Some(OpDerivative::value(0)));
}

#[test]
fn two_real_operators_violate_the_mixing_rule() {
    let err = value(0).try_mul(&value(1)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::MixingRule)
    ));
    let err = value(0).virt().try_mul(&value(1).virt()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::MixingRule)
    ));
    let (a, b) = (value(0), value(1));
    assert_panics!(&a * &b);
}

#[test]
fn scaling_by_zero_or_one() {
    let op = value(0) + derivative(1, 0) * 2.0;
    assert!((&op * 0.0).is_empty());
    assert_eq!(&op * 1.0, op);
    assert_eq!((&op * 2.0).terms()[1].coefficient, Coefficient::Scalar(4.0));
}

#[test]
fn sort_merges_identical_terms_and_drops_cancelled_ones() {
    let u = value(0);
    let op = (u.clone() + u.clone() * 2.0 - u.clone() * 3.0).sorted();
    assert!(op.is_empty());

    let op = (value(1) + value(0) + value(1)).sorted();
    assert_eq!(op.len(), 2);
    assert_eq!(op.terms()[0].real, Some(OpDerivative::value(0)));
    assert_eq!(op.terms()[1].coefficient, Coefficient::Scalar(2.0));
}

#[test]
fn sort_groups_bilinear_before_load_terms() {
    let load = value(0).virt();
    let bilinear = value(1).virt().try_mul(&value(0)).unwrap();
    let op = (load + value(2) + bilinear).sorted();
    let kinds: Vec<_> = op.terms().iter().map(Term::kind).collect();
    assert_eq!(kinds, vec![TermKind::Bilinear, TermKind::Load, TermKind::RealOnly]);
}

#[test]
fn field_coefficients_multiply_pointwise() {
    let field = Coefficient::Field(DVector::from_column_slice(&[1.0, 2.0, 3.0]));
    let op = &(&value(0) * &field) * &Coefficient::Field(DVector::from_column_slice(&[2.0, 2.0, 2.0]));
    assert_eq!(
        op.terms()[0].coefficient,
        Coefficient::Field(DVector::from_column_slice(&[2.0, 4.0, 6.0]))
    );
    // Fields are never treated as zero
    assert!(!(&value(0) * &Coefficient::Field(DVector::<f64>::zeros(3))).is_empty());
}

#[test]
fn fields_of_different_lengths_are_kept_apart() {
    let nodal = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    let points = DVector::repeat(4, 2.0);

    let product = &(&value(0) * &Coefficient::Field(nodal.clone())) * &Coefficient::Field(points.clone());
    assert_eq!(
        product.terms()[0].coefficient,
        Coefficient::Product(vec![nodal.clone(), points.clone()])
    );
    let negated = -product;
    assert_eq!(
        negated.terms()[0].coefficient,
        Coefficient::Product(vec![-nodal.clone(), points.clone()])
    );

    let grad = derivative(0, 0);
    let op = grad.virt().try_mul(&(&grad * &Coefficient::Field(points.clone()))).unwrap()
        + grad.virt().try_mul(&(&grad * &Coefficient::Field(nodal.clone()))).unwrap()
        + grad.virt().try_mul(&(&grad * &Coefficient::Field(nodal.clone()))).unwrap();
    let sorted = op.sorted();
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted.terms()[0].coefficient, Coefficient::Field(&nodal * 2.0));
    assert_eq!(sorted.terms()[1].coefficient, Coefficient::Field(points));
}

#[test]
fn product_distributes_over_sums() {
    let a = value(0).virt() + derivative(0, 1).virt();
    let b = value(1) * 2.0 + derivative(1, 0);
    let product = a.try_mul(&b).unwrap().sorted();
    let expanded = (value(0).virt().try_mul(&b).unwrap() + derivative(0, 1).virt().try_mul(&b).unwrap()).sorted();
    assert_eq!(product, expanded);
    assert_eq!(product.len(), 4);
}

#[test]
fn sum_of_iterator_collects_all_terms() {
    let op: DiffOp = (0..4).map(value).sum();
    assert_eq!(op.len(), 4);
    assert_eq!(op.real_variables(), vec![0, 1, 2, 3]);
}

fn term_strategy() -> impl Strategy<Value = Term> {
    (0..3usize, prop::option::of(0..2usize), any::<bool>(), -3i32..=3).prop_map(
        |(variable, coordinate, virtual_only, coefficient)| {
            let op = OpDerivative {
                variable,
                coordinate,
                order: if coordinate.is_some() { 1 } else { 0 },
            };
            let (real, vir) = if virtual_only {
                (None, Some(op))
            } else {
                (Some(op), Some(OpDerivative::value(variable)))
            };
            Term {
                real,
                vir,
                coefficient: Coefficient::Scalar(coefficient as f64),
            }
        },
    )
}

proptest! {
    #[test]
    fn sorted_operator_does_not_depend_on_term_order(
        (terms, shuffled) in vec(term_strategy(), 0..12)
            .prop_flat_map(|terms| (Just(terms.clone()), Just(terms).prop_shuffle()))
    ) {
        let a = DiffOp::from_terms(terms).sorted();
        let b = DiffOp::from_terms(shuffled).sorted();
        prop_assert_eq!(a, b);
    }
}
