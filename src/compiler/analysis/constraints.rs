//! Extension point for ParamSpec bound and variance checking
//!
//! Declarations already carry `bound=` and the variance markers. What they
//! should constrain is not settled, so the checker routes every solved
//! variable through a [`ConstraintChecker`] and ships one that accepts all.

use crate::compiler::types::{ParamSpecDecl, Signature, Type, TypeVarDecl};
use tracing::trace;

pub trait ConstraintChecker: Send + Sync {
    /// Called with the parameter list a ParamSpec was solved to
    fn check_param_spec(&self, decl: &ParamSpecDecl, solved: &Signature) -> Result<(), String>;

    fn check_type_var(&self, decl: &TypeVarDecl, solved: &Type) -> Result<(), String>;
}

/// Accepts every solution
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredConstraints;

impl ConstraintChecker for DeferredConstraints {
    fn check_param_spec(&self, decl: &ParamSpecDecl, solved: &Signature) -> Result<(), String> {
        if decl.bound.is_some() {
            trace!(var = %decl.name, solved = %solved, "ParamSpec bound not checked");
        }
        Ok(())
    }

    fn check_type_var(&self, _decl: &TypeVarDecl, _solved: &Type) -> Result<(), String> {
        Ok(())
    }
}
