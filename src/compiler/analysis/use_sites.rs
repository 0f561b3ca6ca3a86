//! Where a ParamSpec may appear inside a type expression
//!
//! Accepted: the whole parameter slot of `Callable[...]`, and a type argument
//! of a user class in a position declared with a ParamSpec. Everything else
//! (bare annotation, inside a container, one element of a Callable parameter
//! list) is rejected. Projections are accepted only as the whole annotation
//! of a parameter; the pairing rules live in [`super::projections`].

use super::annotations::{
    is_ellipsis, projection_of, slice_elements, string_annotation, AnnotationResolver, NameEnv,
    Resolved,
};
use crate::compiler::ast::LineIndex;
use crate::compiler::errors::{ErrorKind, SourceLocation, TypeError};
use crate::compiler::types::{SpecialForm, TypeParamKind};
use rustpython_parser::ast::{
    Expr, ExprAttribute, ExprBinOp, ExprName, ExprSubscript, Operator, Ranged,
};
use rustpython_parser::text_size::TextRange;
use tracing::trace;

/// Top-level position of an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Parameter,
    Return,
    Variable,
    ClassBase,
}

#[derive(Debug, Clone)]
enum Slot {
    TopLevel(Position),
    CallableParamElement,
    CallableReturn,
    Container(String),
    TypeVarArgument { target: String, param: String },
    /// Arguments of unknown generics and `Generic[...]` itself
    Unchecked,
}

impl Slot {
    fn param_spec_context(&self) -> Option<String> {
        Some(match self {
            Slot::TopLevel(Position::Parameter) => {
                "as a standalone type in a parameter annotation".to_string()
            }
            Slot::TopLevel(Position::Return) => "as a return type".to_string(),
            Slot::TopLevel(Position::Variable) => "as a variable annotation".to_string(),
            Slot::TopLevel(Position::ClassBase) => "as a base class".to_string(),
            Slot::CallableParamElement => {
                "inside the parameter list of Callable; write Callable[P, R] instead".to_string()
            }
            Slot::CallableReturn => "as the return type of Callable".to_string(),
            Slot::Container(name) => format!("inside {}", name),
            Slot::TypeVarArgument { target, param } => {
                format!("in place of TypeVar '{}' of '{}'", param, target)
            }
            Slot::Unchecked => return None,
        })
    }
}

pub struct UseSiteValidator<'a> {
    env: &'a dyn NameEnv,
    index: &'a LineIndex,
}

impl<'a> UseSiteValidator<'a> {
    pub fn new(env: &'a dyn NameEnv, index: &'a LineIndex) -> Self {
        Self { env, index }
    }

    pub fn validate(&self, expr: &Expr, position: Position) -> Vec<TypeError> {
        let mut errors = Vec::new();
        self.walk(expr, &Slot::TopLevel(position), None, &mut errors);
        errors
    }

    fn location(&self, range: TextRange, outer: Option<TextRange>) -> SourceLocation {
        match outer {
            Some(outer) => self.index.relocate(range, outer),
            None => self.index.location(range),
        }
    }

    fn walk(
        &self,
        expr: &Expr,
        slot: &Slot,
        outer: Option<TextRange>,
        errors: &mut Vec<TypeError>,
    ) {
        if let Some(parsed) = string_annotation(expr) {
            match parsed {
                Ok(inner) => self.walk(&inner, slot, outer.or(Some(expr.range())), errors),
                Err(detail) => errors.push(TypeError::new(
                    ErrorKind::SyntaxError {
                        detail: format!("invalid string annotation: {}", detail),
                    },
                    self.location(expr.range(), outer),
                )),
            }
            return;
        }

        if let Some(projection) = projection_of(self.env, expr) {
            let reason = match slot {
                Slot::TopLevel(Position::Parameter) => return,
                Slot::TopLevel(Position::Return) => {
                    format!("'{}' cannot annotate a return value", projection.label())
                }
                Slot::TopLevel(Position::Variable) => {
                    format!("'{}' cannot annotate a variable", projection.label())
                }
                Slot::TopLevel(Position::ClassBase) => {
                    format!("'{}' cannot be used as a base class", projection.label())
                }
                _ => format!("'{}' cannot be wrapped inside another type", projection.label()),
            };
            errors.push(TypeError::invalid_projection(reason, self.location(expr.range(), outer)));
            return;
        }

        match expr {
            Expr::Name(_) | Expr::Attribute(_) => {
                if let Resolved::ParamSpec(var) = self.env.resolve(expr) {
                    if let Some(context) = slot.param_spec_context() {
                        trace!(var = %var, context = %context, "Rejected ParamSpec use site");
                        let location = self.location(expr.range(), outer);
                        errors.push(TypeError::invalid_use_site(&var, context, location));
                    }
                }
            }
            Expr::Subscript(subscript) => self.walk_subscript(subscript, outer, errors),
            Expr::BinOp(ExprBinOp { left, op: Operator::BitOr, right, .. }) => {
                let union = Slot::Container("a union".to_string());
                self.walk(left, &union, outer, errors);
                self.walk(right, &union, outer, errors);
            }
            Expr::List(list) => {
                let slot = Slot::Container("a list expression".to_string());
                for elt in &list.elts {
                    self.walk(elt, &slot, outer, errors);
                }
            }
            Expr::Tuple(tuple) => {
                let slot = Slot::Container("a tuple expression".to_string());
                for elt in &tuple.elts {
                    self.walk(elt, &slot, outer, errors);
                }
            }
            _ => {}
        }
    }

    fn walk_subscript(
        &self,
        subscript: &ExprSubscript,
        outer: Option<TextRange>,
        errors: &mut Vec<TypeError>,
    ) {
        let args = slice_elements(&subscript.slice);
        let location = self.location(subscript.range(), outer);

        match self.env.resolve(&subscript.value) {
            Resolved::Special(SpecialForm::Callable) => {
                let [params, ret] = args.as_slice() else {
                    errors.push(TypeError::new(
                        ErrorKind::InvalidTypeArguments {
                            target: "Callable".to_string(),
                            reason: "expected a parameter list, '...' or a ParamSpec, \
                                     followed by a return type"
                                .to_string(),
                        },
                        location,
                    ));
                    return;
                };
                self.walk_callable_params(params, outer, errors);
                self.walk(ret, &Slot::CallableReturn, outer, errors);
            }
            Resolved::Special(SpecialForm::Generic | SpecialForm::Protocol) => {
                for arg in args {
                    self.walk(arg, &Slot::Unchecked, outer, errors);
                }
            }
            Resolved::Special(_) => {
                let slot = Slot::Container(format!("{}[...]", subscript_name(&subscript.value)));
                for arg in args.into_iter().filter(|a| !is_ellipsis(a)) {
                    self.walk(arg, &slot, outer, errors);
                }
            }
            Resolved::Class(info) if info.is_generic() => {
                if args.len() != info.type_params.len() {
                    errors.push(TypeError::new(
                        ErrorKind::InvalidTypeArguments {
                            target: info.name.clone(),
                            reason: format!(
                                "expected {} type argument{}, found {}",
                                info.type_params.len(),
                                if info.type_params.len() == 1 { "" } else { "s" },
                                args.len()
                            ),
                        },
                        location,
                    ));
                    return;
                }

                for (param, arg) in info.type_params.iter().zip(args) {
                    match param.kind {
                        TypeParamKind::ParamSpec => {
                            let name = &param.name;
                            self.walk_param_spec_argument(&info.name, name, arg, outer, errors)
                        }
                        TypeParamKind::TypeVar => {
                            let slot = Slot::TypeVarArgument {
                                target: info.name.clone(),
                                param: param.name.clone(),
                            };
                            self.walk(arg, &slot, outer, errors);
                        }
                    }
                }
            }
            Resolved::Class(info) => errors.push(TypeError::new(
                ErrorKind::InvalidTypeArguments {
                    target: info.name.clone(),
                    reason: format!("'{}' is not generic", info.name),
                },
                location,
            )),
            _ => {
                for arg in args {
                    self.walk(arg, &Slot::Unchecked, outer, errors);
                }
            }
        }
    }

    fn walk_callable_params(
        &self,
        params: &Expr,
        outer: Option<TextRange>,
        errors: &mut Vec<TypeError>,
    ) {
        if let Some(parsed) = string_annotation(params) {
            match parsed {
                Ok(inner) => {
                    self.walk_callable_params(&inner, outer.or(Some(params.range())), errors)
                }
                Err(_) => self.walk(params, &Slot::CallableParamElement, outer, errors),
            }
            return;
        }

        match params {
            Expr::List(list) => {
                for elt in &list.elts {
                    self.walk(elt, &Slot::CallableParamElement, outer, errors);
                }
            }
            _ if is_ellipsis(params) => {}
            _ if matches!(self.env.resolve(params), Resolved::ParamSpec(_)) => {}
            _ => {
                // Projections get their own message from the generic walk
                if projection_of(self.env, params).is_some() {
                    self.walk(params, &Slot::CallableParamElement, outer, errors);
                    return;
                }
                errors.push(TypeError::new(
                    ErrorKind::InvalidTypeArguments {
                        target: "Callable".to_string(),
                        reason: format!(
                            "the parameter slot must be a list of types, '...' \
                             or a ParamSpec, not '{}'",
                            AnnotationResolver::new(self.env).resolve(params)
                        ),
                    },
                    self.location(params.range(), outer),
                ));
            }
        }
    }

    fn walk_param_spec_argument(
        &self,
        target: &str,
        param: &str,
        arg: &Expr,
        outer: Option<TextRange>,
        errors: &mut Vec<TypeError>,
    ) {
        if is_ellipsis(arg) || matches!(self.env.resolve(arg), Resolved::ParamSpec(_)) {
            return;
        }

        if let Some(Ok(inner)) = string_annotation(arg) {
            let outer = outer.or(Some(arg.range()));
            return self.walk_param_spec_argument(target, param, &inner, outer, errors);
        }

        let reason = match arg {
            Expr::List(_) => format!(
                "an explicit parameter list cannot stand in for ParamSpec '{}'; \
                 pass a ParamSpec or '...'",
                param
            ),
            _ => format!(
                "expected a ParamSpec or '...' for '{}', found '{}'",
                param,
                AnnotationResolver::new(self.env).resolve(arg)
            ),
        };
        errors.push(TypeError::new(
            ErrorKind::InvalidTypeArguments {
                target: target.to_string(),
                reason,
            },
            self.location(arg.range(), outer),
        ));
    }
}

fn subscript_name(expr: &Expr) -> String {
    match expr {
        Expr::Name(ExprName { id, .. }) => id.as_str().to_string(),
        Expr::Attribute(ExprAttribute { attr, .. }) => attr.as_str().to_string(),
        _ => "a generic".to_string(),
    }
}
