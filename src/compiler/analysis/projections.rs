//! `*args: P.args, **kwargs: P.kwargs` pairing and the leading-parameter rule

use super::annotations::{
    projection_of, string_annotation, undeclared_projection_owner, NameEnv, Projection,
    ProjectionKind,
};
use crate::compiler::ast::{LineIndex, SourceLocationExt};
use crate::compiler::errors::TypeError;
use rustpython_parser::ast::{Arg, Arguments};
use tracing::debug;

/// A valid projection pair on a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPair {
    pub var: String,
    /// Positional parameters before `*args`, receiver excluded
    pub prefix_len: usize,
}

pub struct ProjectionValidator<'a> {
    env: &'a dyn NameEnv,
    index: &'a LineIndex,
    known_specs: &'a [String],
    dunder_positional: bool,
}

impl<'a> ProjectionValidator<'a> {
    pub fn new(env: &'a dyn NameEnv, index: &'a LineIndex, known_specs: &'a [String]) -> Self {
        Self {
            env,
            index,
            known_specs,
            dunder_positional: true,
        }
    }

    /// Treat `__x` as positional-only (the pre-3.8 convention)
    pub fn with_dunder_positional(mut self, enabled: bool) -> Self {
        self.dunder_positional = enabled;
        self
    }

    fn projection(&self, arg: &Arg) -> Option<Projection> {
        let annotation = arg.annotation.as_deref()?;
        match string_annotation(annotation) {
            Some(Ok(inner)) => projection_of(self.env, &inner),
            Some(Err(_)) => None,
            None => projection_of(self.env, annotation),
        }
    }

    fn undeclared_owner(&self, arg: &Arg) -> Option<String> {
        let annotation = arg.annotation.as_deref()?;
        match string_annotation(annotation) {
            Some(Ok(inner)) => undeclared_projection_owner(self.env, &inner).map(str::to_string),
            Some(Err(_)) => None,
            None => undeclared_projection_owner(self.env, annotation).map(str::to_string),
        }
    }

    fn is_positional_only_name(&self, name: &str) -> bool {
        self.dunder_positional && name.starts_with("__") && !name.ends_with("__")
    }

    /// Check a signature's projections; `receiver` exempts the first
    /// positional parameter (`self` / `cls`)
    pub fn validate(
        &self,
        arguments: &Arguments,
        receiver: bool,
    ) -> (Option<ProjectionPair>, Vec<TypeError>) {
        let mut errors = Vec::new();

        let positional: Vec<(&Arg, bool)> = arguments
            .posonlyargs
            .iter()
            .map(|a| (&a.def, true))
            .chain(arguments.args.iter().map(|a| (&a.def, false)))
            .skip(usize::from(receiver))
            .collect();

        // Projections on ordinary parameters
        let ordinary = positional
            .iter()
            .map(|(arg, _)| *arg)
            .chain(arguments.kwonlyargs.iter().map(|a| &a.def));
        for arg in ordinary {
            if let Some(projection) = self.projection(arg) {
                errors.push(TypeError::invalid_projection(
                    misplaced(&projection),
                    arg.source_location(self.index),
                ));
            }
        }

        let vararg = arguments.vararg.as_deref();
        let kwarg = arguments.kwarg.as_deref();

        for arg in vararg.iter().chain(kwarg.iter()) {
            if let Some(owner) = self.undeclared_owner(arg) {
                errors.push(TypeError::unknown_param_spec(
                    &owner,
                    self.known_specs,
                    arg.source_location(self.index),
                ));
            }
        }

        let star = vararg.and_then(|a| self.projection(a).map(|p| (a, p)));
        let double_star = kwarg.and_then(|a| self.projection(a).map(|p| (a, p)));

        let var = match (star, double_star) {
            (None, None) => return (None, errors),
            (Some((star_arg, args)), Some((_, kwargs)))
                if args.kind == ProjectionKind::Args && kwargs.kind == ProjectionKind::Kwargs =>
            {
                if args.var != kwargs.var {
                    errors.push(TypeError::invalid_projection(
                        format!(
                            "'{}' and '{}' come from different ParamSpecs",
                            args.label(),
                            kwargs.label()
                        ),
                        star_arg.source_location(self.index),
                    ));
                    return (None, errors);
                }
                args.var
            }
            (Some((star_arg, args)), Some((_, kwargs)))
                if args.kind == ProjectionKind::Kwargs && kwargs.kind == ProjectionKind::Args =>
            {
                errors.push(TypeError::invalid_projection(
                    format!(
                        "'*args' and '**kwargs' are swapped; \
                         write '*args: {}.args, **kwargs: {}.kwargs'",
                        kwargs.var, args.var
                    ),
                    star_arg.source_location(self.index),
                ));
                return (None, errors);
            }
            (star, double_star) => {
                if let Some((arg, projection)) = &star {
                    let reason = match projection.kind {
                        ProjectionKind::Kwargs => misplaced(projection),
                        ProjectionKind::Args => format!(
                            "'{}' requires '**kwargs: {}.kwargs'",
                            projection.label(),
                            projection.var
                        ),
                    };
                    let location = arg.source_location(self.index);
                    errors.push(TypeError::invalid_projection(reason, location));
                }
                if let Some((arg, projection)) = &double_star {
                    let reason = match projection.kind {
                        ProjectionKind::Args => misplaced(projection),
                        ProjectionKind::Kwargs => format!(
                            "'{}' requires '*args: {}.args'",
                            projection.label(),
                            projection.var
                        ),
                    };
                    let location = arg.source_location(self.index);
                    errors.push(TypeError::invalid_projection(reason, location));
                }
                return (None, errors);
            }
        };

        for kwonly in &arguments.kwonlyargs {
            errors.push(TypeError::invalid_projection(
                format!(
                    "keyword-only parameter '{}' cannot appear between \
                     '*args: {var}.args' and '**kwargs: {var}.kwargs'",
                    kwonly.def.arg.as_str(),
                    var = var
                ),
                kwonly.def.source_location(self.index),
            ));
        }

        for (arg, positional_only) in &positional {
            let name = arg.arg.as_str();
            if *positional_only || self.is_positional_only_name(name) {
                continue;
            }
            debug!(param = name, var = %var, "Named parameter before projection pair");
            errors.push(
                TypeError::invalid_projection(
                    format!(
                        "parameter '{}' precedes '*args: {}.args' \
                         and could collide with a parameter of '{}'",
                        name, var, var
                    ),
                    arg.source_location(self.index),
                )
                .with_suggestion(format!("Make '{}' positional-only by adding '/' after it", name)),
            );
        }

        (
            Some(ProjectionPair {
                var,
                prefix_len: positional.len(),
            }),
            errors,
        )
    }
}

fn misplaced(projection: &Projection) -> String {
    match projection.kind {
        ProjectionKind::Args => format!("'{}' can only annotate '*args'", projection.label()),
        ProjectionKind::Kwargs => format!("'{}' can only annotate '**kwargs'", projection.label()),
    }
}
