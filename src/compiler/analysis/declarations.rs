//! `P = ParamSpec("P", bound=..., covariant=..., contravariant=...)`

use super::annotations::{AnnotationResolver, NameEnv};
use crate::compiler::ast::{LineIndex, SourceLocationExt};
use crate::compiler::errors::TypeError;
use crate::compiler::types::{ParamSpecDecl, TypeVarDecl, Variance};
use rustpython_parser::ast::{Constant, Expr, ExprCall, ExprConstant, ExprName};
use tracing::debug;

pub struct DeclarationValidator<'a> {
    env: &'a dyn NameEnv,
    index: &'a LineIndex,
    require_matching_name: bool,
}

fn string_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Constant(ExprConstant { value: Constant::Str(s), .. }) => Some(s.as_str()),
        _ => None,
    }
}

fn bool_literal(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Constant(ExprConstant { value: Constant::Bool(b), .. }) => Some(*b),
        _ => None,
    }
}

fn single_name(targets: &[Expr]) -> Option<&str> {
    match targets {
        [Expr::Name(ExprName { id, .. })] => Some(id.as_str()),
        _ => None,
    }
}

impl<'a> DeclarationValidator<'a> {
    pub fn new(env: &'a dyn NameEnv, index: &'a LineIndex) -> Self {
        Self {
            env,
            index,
            require_matching_name: true,
        }
    }

    pub fn with_matching_name(mut self, required: bool) -> Self {
        self.require_matching_name = required;
        self
    }

    /// Validate a ParamSpec declaration. The declaration is still returned
    /// alongside errors whenever a target name exists, so later uses of the
    /// variable do not cascade.
    pub fn validate_param_spec(
        &self,
        targets: &[Expr],
        call: &ExprCall,
    ) -> (Option<ParamSpecDecl>, Vec<TypeError>) {
        let mut errors = Vec::new();
        let location = call.source_location(self.index);

        let Some(target) = single_name(targets) else {
            errors.push(TypeError::invalid_declaration(
                "a ParamSpec must be assigned to a single plain name",
                location,
            ));
            return (None, errors);
        };

        match call.args.as_slice() {
            [] => errors.push(TypeError::invalid_declaration(
                "ParamSpec() requires its name as the first argument",
                location.clone(),
            )),
            [first, rest @ ..] => {
                match string_literal(first) {
                    None => errors.push(TypeError::invalid_declaration(
                        "the name passed to ParamSpec() must be a string literal",
                        first.source_location(self.index),
                    )),
                    Some(literal) if literal != target && self.require_matching_name => {
                        debug!(literal, target, "ParamSpec name mismatch");
                        errors.push(
                            TypeError::invalid_declaration(
                                format!(
                                    "name '{}' does not match the variable '{}' it is assigned to",
                                    literal, target
                                ),
                                first.source_location(self.index),
                            )
                            .with_suggestion(format!("Use {} = ParamSpec(\"{}\")", target, target)),
                        );
                    }
                    Some(_) => {}
                }
                if let Some(extra) = rest.first() {
                    errors.push(TypeError::invalid_declaration(
                        "ParamSpec() takes a single positional argument",
                        extra.source_location(self.index),
                    ));
                }
            }
        }

        let mut bound = None;
        let (mut covariant, mut contravariant) = (false, false);

        for keyword in &call.keywords {
            let Some(name) = keyword.arg.as_ref().map(|id| id.as_str()) else {
                errors.push(TypeError::invalid_declaration(
                    "ParamSpec() does not accept '**' arguments",
                    keyword.value.source_location(self.index),
                ));
                continue;
            };

            match name {
                "bound" => bound = Some(AnnotationResolver::new(self.env).resolve(&keyword.value)),
                "covariant" | "contravariant" => match bool_literal(&keyword.value) {
                    Some(flag) if name == "covariant" => covariant = flag,
                    Some(flag) => contravariant = flag,
                    None => errors.push(TypeError::invalid_declaration(
                        format!("'{}' must be a literal True or False", name),
                        keyword.value.source_location(self.index),
                    )),
                },
                other => errors.push(TypeError::invalid_declaration(
                    format!("unexpected keyword argument '{}'", other),
                    keyword.value.source_location(self.index),
                )),
            }
        }

        let variance = Variance::from_flags(covariant, contravariant).unwrap_or_else(|| {
            errors.push(TypeError::invalid_declaration(
                "a ParamSpec cannot be both covariant and contravariant",
                location.clone(),
            ));
            Variance::Invariant
        });

        let decl = ParamSpecDecl {
            name: target.to_string(),
            bound,
            variance,
            location,
        };
        (Some(decl), errors)
    }

    /// TypeVars are recorded without name checks
    pub fn type_var(&self, targets: &[Expr], call: &ExprCall) -> Option<TypeVarDecl> {
        let target = single_name(targets)?;
        let resolver = AnnotationResolver::new(self.env);

        let constraints = call.args.iter().skip(1).map(|c| resolver.resolve(c)).collect();
        let mut bound = None;
        let (mut covariant, mut contravariant) = (false, false);

        for keyword in &call.keywords {
            match keyword.arg.as_ref().map(|id| id.as_str()) {
                Some("bound") => bound = Some(resolver.resolve(&keyword.value)),
                Some("covariant") => covariant = bool_literal(&keyword.value).unwrap_or(false),
                Some("contravariant") => {
                    contravariant = bool_literal(&keyword.value).unwrap_or(false)
                }
                _ => {}
            }
        }

        Some(TypeVarDecl {
            name: target.to_string(),
            constraints,
            bound,
            variance: Variance::from_flags(covariant, contravariant).unwrap_or_default(),
        })
    }
}
