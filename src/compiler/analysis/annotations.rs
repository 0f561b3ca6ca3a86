//! Annotation expressions to [`Type`]
//!
//! Resolution is silent and best effort: anything it cannot make sense of
//! becomes `Any`. Diagnostics for misplaced ParamSpecs come from
//! [`super::use_sites`] and [`super::projections`], which walk the same
//! expressions.

use crate::compiler::frontend::parse_expression;
use crate::compiler::types::{
    ClassInfo, ParamList, Parameter, Signature, SpecialForm, Type, TypeArg, TypeParamKind,
};
use rustpython_parser::ast::{
    Constant, Expr, ExprAttribute, ExprBinOp, ExprConstant, ExprName, ExprSubscript, Operator,
};

/// What a name in a type expression refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    ParamSpec(String),
    TypeVar(String),
    Class(ClassInfo),
    Special(SpecialForm),
    Value(Type),
    Unknown,
}

/// Name lookup shared by every annotation walker
pub trait NameEnv {
    fn resolve_name(&self, name: &str) -> Resolved;

    /// Names and `module.attr` references to `typing` / `functools`
    fn resolve(&self, expr: &Expr) -> Resolved {
        match expr {
            Expr::Name(ExprName { id, .. }) => self.resolve_name(id.as_str()),
            Expr::Attribute(ExprAttribute { value, attr, .. }) => {
                let form = match self.resolve(value) {
                    Resolved::Special(SpecialForm::TypingModule) => {
                        SpecialForm::from_typing(attr.as_str())
                    }
                    Resolved::Special(SpecialForm::FunctoolsModule) => {
                        SpecialForm::from_functools(attr.as_str())
                    }
                    _ => None,
                };
                form.map_or(Resolved::Unknown, Resolved::Special)
            }
            _ => Resolved::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Args,
    Kwargs,
}

/// `P.args` or `P.kwargs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub var: String,
    pub kind: ProjectionKind,
}

impl Projection {
    pub fn label(&self) -> String {
        match self.kind {
            ProjectionKind::Args => format!("{}.args", self.var),
            ProjectionKind::Kwargs => format!("{}.kwargs", self.var),
        }
    }
}

fn projection_kind(attr: &str) -> Option<ProjectionKind> {
    match attr {
        "args" => Some(ProjectionKind::Args),
        "kwargs" => Some(ProjectionKind::Kwargs),
        _ => None,
    }
}

/// Recognise a projection of a declared ParamSpec
pub fn projection_of(env: &dyn NameEnv, expr: &Expr) -> Option<Projection> {
    let Expr::Attribute(ExprAttribute { value, attr, .. }) = expr else {
        return None;
    };
    let kind = projection_kind(attr.as_str())?;
    match env.resolve(value) {
        Resolved::ParamSpec(var) => Some(Projection { var, kind }),
        _ => None,
    }
}

/// `X.args` / `X.kwargs` where `X` is a bare name that resolves to nothing
pub fn undeclared_projection_owner<'e>(env: &dyn NameEnv, expr: &'e Expr) -> Option<&'e str> {
    let Expr::Attribute(ExprAttribute { value, attr, .. }) = expr else {
        return None;
    };
    projection_kind(attr.as_str())?;
    match value.as_ref() {
        Expr::Name(ExprName { id, .. }) if env.resolve_name(id.as_str()) == Resolved::Unknown => {
            Some(id.as_str())
        }
        _ => None,
    }
}

/// Parse the body of a string annotation
pub fn string_annotation(expr: &Expr) -> Option<Result<Expr, String>> {
    match expr {
        Expr::Constant(ExprConstant { value: Constant::Str(text), .. }) => {
            Some(parse_expression(text).map_err(|e| e.message))
        }
        _ => None,
    }
}

/// Elements of a subscript slice: `X[a, b]` gives `[a, b]`, `X[a]` gives `[a]`
pub fn slice_elements(slice: &Expr) -> Vec<&Expr> {
    match slice {
        Expr::Tuple(tuple) => tuple.elts.iter().collect(),
        other => vec![other],
    }
}

pub fn is_ellipsis(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(ExprConstant { value: Constant::Ellipsis, .. }))
}

fn builtin_type(name: &str) -> Option<Type> {
    Some(match name {
        "int" => Type::Int,
        "float" => Type::Float,
        "str" => Type::Str,
        "bool" => Type::Bool,
        "bytes" => Type::Bytes,
        "object" => Type::Object,
        "None" => Type::None,
        _ => return None,
    })
}

pub struct AnnotationResolver<'a> {
    env: &'a dyn NameEnv,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(env: &'a dyn NameEnv) -> Self {
        Self { env }
    }

    pub fn resolve(&self, expr: &Expr) -> Type {
        if let Some(parsed) = string_annotation(expr) {
            return parsed.map_or(Type::Any, |inner| self.resolve(&inner));
        }

        match expr {
            Expr::Constant(ExprConstant { value: Constant::None, .. }) => Type::None,
            Expr::BinOp(ExprBinOp { left, op: Operator::BitOr, right, .. }) => {
                Type::union(vec![self.resolve(left), self.resolve(right)])
            }
            Expr::Subscript(subscript) => self.resolve_subscript(subscript),
            Expr::Name(ExprName { id, .. }) => match self.env.resolve(expr) {
                Resolved::Unknown => builtin_type(id.as_str())
                    .unwrap_or_else(|| Type::Class(id.as_str().to_string())),
                resolved => self.resolve_bare(resolved),
            },
            Expr::Attribute(_) => match projection_of(self.env, expr) {
                Some(Projection { var, kind: ProjectionKind::Args }) => Type::ParamSpecArgs(var),
                Some(Projection {
                    var,
                    kind: ProjectionKind::Kwargs,
                }) => Type::ParamSpecKwargs(var),
                None => self.resolve_bare(self.env.resolve(expr)),
            },
            _ => Type::Any,
        }
    }

    fn resolve_bare(&self, resolved: Resolved) -> Type {
        match resolved {
            Resolved::TypeVar(name) => Type::TypeVar(name),
            Resolved::Class(info) if info.is_generic() => {
                let args = info
                    .type_params
                    .iter()
                    .map(|p| match p.kind {
                        TypeParamKind::TypeVar => TypeArg::Type(Type::Any),
                        TypeParamKind::ParamSpec => TypeArg::Params(Signature::Gradual),
                    })
                    .collect();
                Type::Generic(info.name, args)
            }
            Resolved::Class(info) => Type::Class(info.name),
            Resolved::Special(SpecialForm::Callable) => {
                Type::callable(Signature::Gradual, Type::Any)
            }
            Resolved::Special(SpecialForm::List) => Type::List(Box::new(Type::Any)),
            Resolved::Special(SpecialForm::Set) => Type::Set(Box::new(Type::Any)),
            Resolved::Special(SpecialForm::Dict) => {
                Type::Dict(Box::new(Type::Any), Box::new(Type::Any))
            }
            // Values, imports and misplaced ParamSpecs; the latter are reported elsewhere
            _ => Type::Any,
        }
    }

    fn resolve_subscript(&self, subscript: &ExprSubscript) -> Type {
        let args = slice_elements(&subscript.slice);

        match self.env.resolve(&subscript.value) {
            Resolved::Special(SpecialForm::Callable) => match args.as_slice() {
                [params, ret] => Type::callable(self.resolve_params(params), self.resolve(ret)),
                _ => Type::callable(Signature::Gradual, Type::Any),
            },
            Resolved::Special(SpecialForm::List) => Type::List(Box::new(self.first(&args))),
            Resolved::Special(SpecialForm::Set) => Type::Set(Box::new(self.first(&args))),
            Resolved::Special(SpecialForm::Dict) => match args.as_slice() {
                [k, v] => Type::Dict(Box::new(self.resolve(k)), Box::new(self.resolve(v))),
                _ => Type::Dict(Box::new(Type::Any), Box::new(Type::Any)),
            },
            Resolved::Special(SpecialForm::Tuple) => match args.as_slice() {
                [elem, rest] if is_ellipsis(rest) => Type::List(Box::new(self.resolve(elem))),
                _ => Type::Tuple(args.iter().map(|a| self.resolve(a)).collect()),
            },
            Resolved::Special(SpecialForm::Optional) => {
                Type::union(vec![self.first(&args), Type::None])
            }
            Resolved::Special(SpecialForm::Union) => {
                Type::union(args.iter().map(|a| self.resolve(a)).collect())
            }
            Resolved::Class(info) if info.is_generic() => {
                let args = info
                    .type_params
                    .iter()
                    .enumerate()
                    .map(|(i, param)| match (param.kind, args.get(i)) {
                        (TypeParamKind::TypeVar, Some(arg)) => TypeArg::Type(self.resolve(arg)),
                        (TypeParamKind::TypeVar, None) => TypeArg::Type(Type::Any),
                        (TypeParamKind::ParamSpec, Some(arg)) => {
                            TypeArg::Params(self.resolve_params(arg))
                        }
                        (TypeParamKind::ParamSpec, None) => TypeArg::Params(Signature::Gradual),
                    })
                    .collect();
                Type::Generic(info.name, args)
            }
            Resolved::Class(info) => Type::Class(info.name),
            _ => Type::Any,
        }
    }

    fn first(&self, args: &[&Expr]) -> Type {
        args.first().map_or(Type::Any, |a| self.resolve(a))
    }

    /// The parameter slot of `Callable[...]` or of a class generic over a ParamSpec
    pub fn resolve_params(&self, expr: &Expr) -> Signature {
        if let Some(parsed) = string_annotation(expr) {
            return parsed.map_or(Signature::Gradual, |inner| self.resolve_params(&inner));
        }

        match expr {
            Expr::List(list) => Signature::Params(
                list.elts
                    .iter()
                    .map(|e| Parameter::positional_only(self.resolve(e)))
                    .collect::<ParamList>(),
            ),
            _ if is_ellipsis(expr) => Signature::Gradual,
            _ => match self.env.resolve(expr) {
                Resolved::ParamSpec(var) => Signature::spec(var),
                _ => Signature::Gradual,
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_env::MapEnv;
    use super::*;
    use crate::compiler::types::{TypeParam, TypeParamKind};

    fn resolve(env: &MapEnv, source: &str) -> Type {
        let expr = parse_expression(source).unwrap();
        AnnotationResolver::new(env).resolve(&expr)
    }

    #[test]
    fn test_primitives_and_containers() {
        let env = MapEnv::new();
        assert_eq!(resolve(&env, "int"), Type::Int);
        assert_eq!(resolve(&env, "list[str]").to_string(), "list[str]");
        assert_eq!(resolve(&env, "Optional[int]").to_string(), "int | None");
        assert_eq!(resolve(&env, "int | str").to_string(), "int | str");
    }

    #[test]
    fn test_callable_forms() {
        let env = MapEnv::new();
        assert_eq!(resolve(&env, "Callable[P, int]").to_string(), "(**P) -> int");
        assert_eq!(resolve(&env, "Callable[[int, str], T]").to_string(), "(int, str) -> T");
        assert_eq!(resolve(&env, "Callable[..., None]").to_string(), "(...) -> None");
        assert_eq!(resolve(&env, "'Callable[P, int]'").to_string(), "(**P) -> int");
    }

    #[test]
    fn test_projections() {
        let env = MapEnv::new();
        assert_eq!(resolve(&env, "P.args"), Type::ParamSpecArgs("P".into()));
        assert_eq!(resolve(&env, "P.kwargs"), Type::ParamSpecKwargs("P".into()));

        let expr = parse_expression("P2.args").unwrap();
        assert_eq!(undeclared_projection_owner(&env, &expr), Some("P2"));
    }

    #[test]
    fn test_generic_class() {
        let mut info = ClassInfo::new("Z");
        info.type_params = vec![
            TypeParam { name: "T".into(), kind: TypeParamKind::TypeVar },
            TypeParam { name: "P".into(), kind: TypeParamKind::ParamSpec },
        ];
        let env = MapEnv::new().with("Z", Resolved::Class(info));

        assert_eq!(resolve(&env, "Z[int, P]").to_string(), "Z[int, (**P)]");
        assert_eq!(resolve(&env, "Z").to_string(), "Z[Any, (...)]");
    }

    #[test]
    fn test_typing_module_attribute() {
        let env = MapEnv::new().with("t", Resolved::Special(SpecialForm::TypingModule));
        assert_eq!(resolve(&env, "t.Callable[P, t.Any]").to_string(), "(**P) -> Any");
    }
}
