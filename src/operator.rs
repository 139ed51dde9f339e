//! Symbolic algebra of differential-operator terms that make up a weak form.
//!
//! A [`DiffOp`] is a sum of [`Term`]s. Each term carries an optional real operator (acting on
//! the unknown field), an optional virtual operator (acting on the test field) and a
//! coefficient. Terms with both operators contribute to the bilinear form, terms with only a
//! virtual operator contribute to the load vector, and terms with only a real operator are
//! intermediate expressions that must be multiplied by a virtual one before assembly.
use crate::error::ConfigurationError;
use nalgebra::DVector;
use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};

/// Partial derivative `∂^order(variable)/∂coordinate^order` of a single variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpDerivative {
    pub variable: usize,
    /// Coordinate rank in the modeling space, `None` for `order == 0`.
    pub coordinate: Option<usize>,
    pub order: u8,
}

impl OpDerivative {
    pub fn value(variable: usize) -> Self {
        Self {
            variable,
            coordinate: None,
            order: 0,
        }
    }
}

/// Multiplier of a term: a scalar or a field.
///
/// A field is located at Gauss points, nodes or elements; the location is inferred from its
/// length when the term is assembled. Fields of different lengths are never combined
/// symbolically: their product is kept as a list of factors, each converted to Gauss points
/// before multiplication.
#[derive(Debug, Clone, PartialEq)]
pub enum Coefficient {
    Scalar(f64),
    Field(DVector<f64>),
    /// Pointwise product of fields of pairwise different lengths.
    Product(Vec<DVector<f64>>),
}

impl Default for Coefficient {
    fn default() -> Self {
        Coefficient::Scalar(1.0)
    }
}

impl From<f64> for Coefficient {
    fn from(value: f64) -> Self {
        Coefficient::Scalar(value)
    }
}

impl From<DVector<f64>> for Coefficient {
    fn from(value: DVector<f64>) -> Self {
        Coefficient::Field(value)
    }
}

impl Coefficient {
    pub fn is_zero(&self) -> bool {
        match self {
            Coefficient::Scalar(s) => *s == 0.0,
            Coefficient::Field(_) | Coefficient::Product(_) => false,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Coefficient::Scalar(s) => Some(*s),
            Coefficient::Field(_) | Coefficient::Product(_) => None,
        }
    }

    /// The fields whose pointwise product this coefficient is, together with a scalar factor.
    fn factors(&self) -> (f64, Vec<DVector<f64>>) {
        match self {
            Coefficient::Scalar(s) => (*s, Vec::new()),
            Coefficient::Field(f) => (1.0, vec![f.clone()]),
            Coefficient::Product(fields) => (1.0, fields.clone()),
        }
    }

    fn from_factors(scale: f64, mut fields: Vec<DVector<f64>>) -> Coefficient {
        if scale == 0.0 || fields.is_empty() {
            return Coefficient::Scalar(scale);
        }
        if scale != 1.0 {
            fields[0] *= scale;
        }
        if fields.len() == 1 {
            Coefficient::Field(fields.remove(0))
        } else {
            Coefficient::Product(fields)
        }
    }

    fn product(&self, other: &Coefficient) -> Coefficient {
        let (a, mut fields) = self.factors();
        let (b, others) = other.factors();
        for field in others {
            match fields.iter_mut().find(|f| f.len() == field.len()) {
                Some(existing) => existing.component_mul_assign(&field),
                None => fields.push(field),
            }
        }
        Coefficient::from_factors(a * b, fields)
    }

    /// Symbolic sum, if both coefficients can be combined without knowing where fields live.
    fn try_sum(&self, other: &Coefficient) -> Option<Coefficient> {
        use Coefficient::*;
        match (self, other) {
            (Scalar(a), Scalar(b)) => Some(Scalar(a + b)),
            (Scalar(a), Field(f)) | (Field(f), Scalar(a)) => Some(Field(f.add_scalar(*a))),
            (Field(a), Field(b)) if a.len() == b.len() => Some(Field(a + b)),
            _ => None,
        }
    }

    fn negated(&self) -> Coefficient {
        match self {
            Coefficient::Scalar(s) => Coefficient::Scalar(-s),
            Coefficient::Field(f) => Coefficient::Field(-f),
            Coefficient::Product(_) => self.product(&Coefficient::Scalar(-1.0)),
        }
    }
}

/// Whether the term contributes to the matrix, to the vector, or to neither.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TermKind {
    Bilinear,
    Load,
    RealOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub real: Option<OpDerivative>,
    pub vir: Option<OpDerivative>,
    pub coefficient: Coefficient,
}

impl Term {
    pub fn kind(&self) -> TermKind {
        match (&self.real, &self.vir) {
            (Some(_), Some(_)) => TermKind::Bilinear,
            (None, Some(_)) => TermKind::Load,
            _ => TermKind::RealOnly,
        }
    }

    fn key(&self) -> (TermKind, Option<OpDerivative>, Option<OpDerivative>) {
        (self.kind(), self.vir, self.real)
    }

    fn try_mul(&self, other: &Term) -> Result<Term, ConfigurationError> {
        let real = match (self.real, other.real) {
            (Some(_), Some(_)) => return Err(ConfigurationError::MixingRule),
            (a, b) => a.or(b),
        };
        let vir = match (self.vir, other.vir) {
            (Some(_), Some(_)) => return Err(ConfigurationError::MixingRule),
            (a, b) => a.or(b),
        };
        Ok(Term {
            real,
            vir,
            coefficient: self.coefficient.product(&other.coefficient),
        })
    }
}

/// A sum of operator terms.
///
/// The empty operator is the additive identity; adding it or scaling by zero leaves no terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOp {
    terms: Vec<Term>,
}

impl DiffOp {
    /// Single-term operator with a real derivative and unit coefficient.
    pub fn real(op: OpDerivative) -> Self {
        Self {
            terms: vec![Term {
                real: Some(op),
                vir: None,
                coefficient: Coefficient::Scalar(1.0),
            }],
        }
    }

    /// Single-term operator with a virtual derivative and unit coefficient.
    pub fn virtual_op(op: OpDerivative) -> Self {
        Self::real(op).virt()
    }

    pub fn from_terms(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Swaps the real and virtual operators of every term.
    pub fn virt(&self) -> DiffOp {
        DiffOp {
            terms: self
                .terms
                .iter()
                .map(|t| Term {
                    real: t.vir,
                    vir: t.real,
                    coefficient: t.coefficient.clone(),
                })
                .collect(),
        }
    }

    /// Distributes the product over both sums.
    ///
    /// Fails if any pair of terms would end up with two real or two virtual operators.
    pub fn try_mul(&self, other: &DiffOp) -> eyre::Result<DiffOp> {
        let mut terms = Vec::with_capacity(self.terms.len() * other.terms.len());
        for a in &self.terms {
            for b in &other.terms {
                terms.push(a.try_mul(b)?);
            }
        }
        Ok(DiffOp { terms })
    }

    /// Scales every term by a coefficient.
    pub fn scaled(&self, coefficient: &Coefficient) -> DiffOp {
        if coefficient.is_zero() {
            return DiffOp::default();
        }
        if coefficient.as_scalar() == Some(1.0) {
            return self.clone();
        }
        DiffOp {
            terms: self
                .terms
                .iter()
                .map(|t| Term {
                    real: t.real,
                    vir: t.vir,
                    coefficient: t.coefficient.product(coefficient),
                })
                .collect(),
        }
    }

    /// Orders terms canonically and merges terms with identical operators.
    ///
    /// Terms are grouped bilinear first, then load terms, then real-only terms, and ordered by
    /// virtual operator and then real operator within each group. Terms sharing both operators
    /// are merged by summing their coefficients, so the assembled result only depends on the
    /// operator content, not on the order in which terms were written.
    pub fn sort(&mut self) {
        self.terms.sort_by(|a, b| {
            a.key()
                .cmp(&b.key())
                .then_with(|| compare_coefficients(&a.coefficient, &b.coefficient))
        });
        let mut merged: Vec<Term> = Vec::with_capacity(self.terms.len());
        for term in self.terms.drain(..) {
            let sum = match merged.last() {
                Some(last) if last.key() == term.key() => last.coefficient.try_sum(&term.coefficient),
                _ => None,
            };
            match (sum, merged.last_mut()) {
                (Some(sum), Some(last)) => last.coefficient = sum,
                _ => merged.push(term),
            }
        }
        merged.retain(|t| !t.coefficient.is_zero());
        self.terms = merged;
    }

    pub fn sorted(mut self) -> DiffOp {
        self.sort();
        self
    }

    /// Distinct variables used by real operators.
    pub fn real_variables(&self) -> Vec<usize> {
        let mut vars: Vec<_> = self.terms.iter().filter_map(|t| t.real).map(|op| op.variable).collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

fn compare_coefficients(a: &Coefficient, b: &Coefficient) -> Ordering {
    use Coefficient::*;
    let rank = |c: &Coefficient| match c {
        Scalar(_) => 0,
        Field(_) => 1,
        Product(_) => 2,
    };
    match (a, b) {
        (Scalar(x), Scalar(y)) => x.total_cmp(y),
        (Field(x), Field(y)) => compare_fields(x, y),
        (Product(x), Product(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(p, q)| compare_fields(p, q))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Orders fields by length first, so that fields which can be summed end up adjacent.
fn compare_fields(x: &DVector<f64>, y: &DVector<f64>) -> Ordering {
    x.len().cmp(&y.len()).then_with(|| {
        x.iter()
            .zip(y.iter())
            .map(|(p, q)| p.total_cmp(q))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

impl Add for DiffOp {
    type Output = DiffOp;

    fn add(mut self, rhs: DiffOp) -> DiffOp {
        self.terms.extend(rhs.terms);
        self
    }
}

impl<'a> Add<&'a DiffOp> for &'a DiffOp {
    type Output = DiffOp;

    fn add(self, rhs: &'a DiffOp) -> DiffOp {
        self.clone() + rhs.clone()
    }
}

impl Neg for DiffOp {
    type Output = DiffOp;

    fn neg(self) -> DiffOp {
        DiffOp {
            terms: self
                .terms
                .into_iter()
                .map(|t| Term {
                    coefficient: t.coefficient.negated(),
                    ..t
                })
                .collect(),
        }
    }
}

impl Sub for DiffOp {
    type Output = DiffOp;

    fn sub(self, rhs: DiffOp) -> DiffOp {
        self + (-rhs)
    }
}

impl Mul<f64> for DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: f64) -> DiffOp {
        self.scaled(&Coefficient::Scalar(rhs))
    }
}

impl Mul<f64> for &DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: f64) -> DiffOp {
        self.scaled(&Coefficient::Scalar(rhs))
    }
}

impl Mul<&Coefficient> for &DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: &Coefficient) -> DiffOp {
        self.scaled(rhs)
    }
}

impl Mul<Coefficient> for DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: Coefficient) -> DiffOp {
        self.scaled(&rhs)
    }
}

/// Operator product.
///
/// # Panics
///
/// Panics if the product would create a term with two real or two virtual operators.
/// Use [`DiffOp::try_mul`] to handle this case as an error.
impl Mul<&DiffOp> for &DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: &DiffOp) -> DiffOp {
        match self.try_mul(rhs) {
            Ok(product) => product,
            Err(err) => panic!("{err}"),
        }
    }
}

impl Mul for DiffOp {
    type Output = DiffOp;

    fn mul(self, rhs: DiffOp) -> DiffOp {
        &self * &rhs
    }
}

impl Sum for DiffOp {
    fn sum<I: Iterator<Item = DiffOp>>(iter: I) -> DiffOp {
        iter.fold(DiffOp::default(), |acc, op| acc + op)
    }
}
