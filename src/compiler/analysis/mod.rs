//! ParamSpec rules and the checker that applies them

pub mod annotations;
pub mod checker;
pub mod constraints;
pub mod declarations;
pub mod inference;
pub mod projections;
pub mod use_sites;

pub use annotations::{AnnotationResolver, NameEnv, Resolved};
pub use checker::TypeChecker;
pub use constraints::{ConstraintChecker, DeferredConstraints};
pub use declarations::DeclarationValidator;
pub use inference::{ArgRef, CallInference, CallIssue, CallOutcome, InferenceOptions};
pub use projections::{ProjectionPair, ProjectionValidator};
pub use use_sites::{Position, UseSiteValidator};
