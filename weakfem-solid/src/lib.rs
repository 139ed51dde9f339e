//! Solid mechanics weak forms and constitutive laws for `weakfem`.
pub mod beam;
pub mod body_force;
pub mod homogen;
pub mod materials;
pub mod stress_equilibrium;

pub use beam::{BeamProperties, EulerBernoulliBeam};
pub use body_force::{BodyForce, Inertia};
pub use materials::{CubicHardening, ElasticIsotropic, LameParameters, YoungPoisson};
pub use stress_equilibrium::StressEquilibrium;
