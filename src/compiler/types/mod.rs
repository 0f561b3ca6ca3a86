//! Type model for parameter specification checking
//!
//! `Type` covers the slice of Python's type language the checker reasons
//! about. Parameter lists live in [`signature`]; declared names live in
//! [`symbols`].

pub mod signature;
pub mod symbols;
pub mod variance;

pub use signature::{
    ArgSource, BoundArgument, CallArgs, CallMismatch, ParamKind, ParamList, Parameter, Signature,
};
pub use symbols::{
    ClassInfo, ParamSpecDecl, SpecialForm, Symbol, TypeContext, TypeParam, TypeParamKind,
    TypeVarDecl,
};
pub use variance::Variance;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Any,
    Never,
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Object,

    // Composite types
    List(Box<Type>),
    Tuple(Vec<Type>),
    Dict(Box<Type>, Box<Type>),
    Set(Box<Type>),
    Union(Vec<Type>),

    // Nominal types
    Class(String),
    /// Instance of a user generic class, arguments in declaration order
    Generic(String, Vec<TypeArg>),

    /// `Callable[params, return]`; a callable-with-specification when the
    /// signature is `Signature::Spec`
    Callable(Box<Signature>, Box<Type>),

    TypeVar(String),

    /// Type of `args` inside a function declared with `*args: P.args`
    ParamSpecArgs(String),
    /// Type of `kwargs` inside a function declared with `**kwargs: P.kwargs`
    ParamSpecKwargs(String),
}

/// Argument to a user generic class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeArg {
    Type(Type),
    Params(Signature),
}

/// Solved variables of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    pub types: HashMap<String, Type>,
    pub specs: HashMap<String, Signature>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.specs.is_empty()
    }
}

impl Type {
    pub fn callable(signature: Signature, ret: Type) -> Type {
        Type::Callable(Box::new(signature), Box::new(ret))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn is_subtype(&self, other: &Type) -> bool {
        use Type::*;

        match (self, other) {
            // Gradual: Any is consistent in both directions
            (Any, _) | (_, Any) => true,
            (Never, _) => true,
            (a, b) if a == b => true,
            (_, Object) => true,

            (a, Union(types)) => types.iter().any(|t| a.is_subtype(t)),
            (Union(types), b) => types.iter().all(|t| t.is_subtype(b)),

            // Numeric tower
            (Bool, Int) | (Bool, Float) | (Int, Float) => true,

            (List(a), List(b)) => a == b || a.is_any() || b.is_any(),
            (Set(a), Set(b)) => a == b || a.is_any() || b.is_any(),
            (Dict(k1, v1), Dict(k2, v2)) => k1 == k2 && v1 == v2,
            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype(y))
            }

            // Parameters contravariant, return covariant
            (Callable(s1, r1), Callable(s2, r2)) => s1.is_compatible_with(s2) && r1.is_subtype(r2),

            (Generic(n1, a1), Generic(n2, a2)) => {
                n1 == n2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x.is_consistent(y))
            }

            // TypeVars are rigid inside the function that binds them
            (TypeVar(a), TypeVar(b)) => a == b,

            _ => false,
        }
    }

    /// Replace solved variables
    pub fn substitute(&self, subst: &Substitution) -> Type {
        if subst.is_empty() {
            return self.clone();
        }

        match self {
            Type::TypeVar(name) => subst.types.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::List(t) => Type::List(Box::new(t.substitute(subst))),
            Type::Set(t) => Type::Set(Box::new(t.substitute(subst))),
            Type::Dict(k, v) => {
                Type::Dict(Box::new(k.substitute(subst)), Box::new(v.substitute(subst)))
            }
            Type::Tuple(ts) => Type::Tuple(ts.iter().map(|t| t.substitute(subst)).collect()),
            Type::Union(ts) => Type::union(ts.iter().map(|t| t.substitute(subst)).collect()),
            Type::Generic(name, args) => {
                Type::Generic(name.clone(), args.iter().map(|a| a.substitute(subst)).collect())
            }
            Type::Callable(sig, ret) => {
                Type::callable(sig.substitute(subst), ret.substitute(subst))
            }
            _ => self.clone(),
        }
    }

    /// Collect TypeVar and ParamSpec names mentioned by this type
    pub fn collect_vars(&self, types: &mut Vec<String>, specs: &mut Vec<String>) {
        match self {
            Type::TypeVar(name) => {
                if !types.contains(name) {
                    types.push(name.clone());
                }
            }
            Type::List(t) | Type::Set(t) => t.collect_vars(types, specs),
            Type::Dict(k, v) => {
                k.collect_vars(types, specs);
                v.collect_vars(types, specs);
            }
            Type::Tuple(ts) | Type::Union(ts) => {
                for t in ts {
                    t.collect_vars(types, specs);
                }
            }
            Type::Generic(_, args) => {
                for arg in args {
                    match arg {
                        TypeArg::Type(t) => t.collect_vars(types, specs),
                        TypeArg::Params(sig) => sig.collect_vars(types, specs),
                    }
                }
            }
            Type::Callable(sig, ret) => {
                sig.collect_vars(types, specs);
                ret.collect_vars(types, specs);
            }
            _ => {}
        }
    }

    pub fn union(types: Vec<Type>) -> Type {
        let mut flattened = Vec::new();
        for ty in types {
            match ty {
                Type::Union(inner) => flattened.extend(inner),
                Type::Never => {}
                other => flattened.push(other),
            }
        }

        if flattened.iter().any(Type::is_any) {
            return Type::Any;
        }

        // Drop members already covered by another member
        let mut result: Vec<Type> = Vec::new();
        for ty in flattened {
            if !result.iter().any(|t| ty.is_subtype(t)) {
                result.retain(|t| !t.is_subtype(&ty));
                result.push(ty);
            }
        }

        match result.len() {
            0 => Type::Never,
            1 => result.remove(0),
            _ => Type::Union(result),
        }
    }

    /// Narrowest type acceptable for both, when one exists
    pub fn meet(&self, other: &Type) -> Option<Type> {
        if self.is_any() {
            return Some(other.clone());
        }
        if other.is_any() {
            return Some(self.clone());
        }
        if self.is_subtype(other) {
            Some(self.clone())
        } else if other.is_subtype(self) {
            Some(other.clone())
        } else {
            None
        }
    }
}

impl TypeArg {
    pub fn substitute(&self, subst: &Substitution) -> TypeArg {
        match self {
            TypeArg::Type(t) => TypeArg::Type(t.substitute(subst)),
            TypeArg::Params(sig) => TypeArg::Params(sig.substitute(subst)),
        }
    }

    /// Generic arguments are invariant
    pub fn is_consistent(&self, other: &TypeArg) -> bool {
        match (self, other) {
            (TypeArg::Type(a), TypeArg::Type(b)) => a.is_subtype(b) && b.is_subtype(a),
            (TypeArg::Params(a), TypeArg::Params(b)) => {
                matches!(a, Signature::Gradual)
                    || matches!(b, Signature::Gradual)
                    || a.equivalent(b)
            }
            _ => false,
        }
    }
}

fn join_types(types: &[Type]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Never => write!(f, "Never"),
            Type::None => write!(f, "None"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Bytes => write!(f, "bytes"),
            Type::Object => write!(f, "object"),
            Type::List(t) => write!(f, "list[{}]", t),
            Type::Tuple(ts) if ts.is_empty() => write!(f, "tuple[()]"),
            Type::Tuple(ts) => write!(f, "tuple[{}]", join_types(ts)),
            Type::Dict(k, v) => write!(f, "dict[{}, {}]", k, v),
            Type::Set(t) => write!(f, "set[{}]", t),
            Type::Union(ts) => {
                write!(f, "{}", ts.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" | "))
            }
            Type::Class(name) => write!(f, "{}", name),
            Type::Generic(name, args) => {
                let args = args
                    .iter()
                    .map(|a| match a {
                        TypeArg::Type(t) => t.to_string(),
                        TypeArg::Params(sig) => sig.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}[{}]", name, args)
            }
            Type::Callable(sig, ret) => write!(f, "{} -> {}", sig, ret),
            Type::TypeVar(name) => write!(f, "{}", name),
            Type::ParamSpecArgs(name) => write!(f, "{}.args", name),
            Type::ParamSpecKwargs(name) => write!(f, "{}.kwargs", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tower() {
        assert!(Type::Bool.is_subtype(&Type::Int));
        assert!(Type::Int.is_subtype(&Type::Float));
        assert!(!Type::Float.is_subtype(&Type::Int));
        assert!(Type::Str.is_subtype(&Type::Object));
    }

    #[test]
    fn test_union_simplification() {
        assert_eq!(Type::union(vec![Type::Int, Type::Bool]), Type::Int);
        assert_eq!(Type::union(vec![Type::Int, Type::Any]), Type::Any);
        assert_eq!(
            Type::union(vec![Type::Int, Type::Str]).to_string(),
            "int | str"
        );
    }

    #[test]
    fn test_meet() {
        assert_eq!(Type::Int.meet(&Type::Float), Some(Type::Int));
        assert_eq!(Type::Any.meet(&Type::Str), Some(Type::Str));
        assert_eq!(Type::Int.meet(&Type::Str), None);
    }

    #[test]
    fn test_substitute_callable() {
        let ret = Type::TypeVar("R".into());
        let callable = Type::callable(
            Signature::Spec { prefix: ParamList::new(), var: "P".into() },
            ret,
        );

        let mut subst = Substitution::new();
        subst.types.insert("R".into(), Type::Int);
        subst.specs.insert(
            "P".into(),
            Signature::Params(ParamList::from_vec(vec![Parameter::named(
                "x",
                ParamKind::PositionalOrKeyword,
                Type::Str,
            )])),
        );

        assert_eq!(callable.substitute(&subst).to_string(), "(x: str) -> int");
    }

    #[test]
    fn test_collect_vars() {
        let ty = Type::callable(
            Signature::Spec { prefix: ParamList::new(), var: "P".into() },
            Type::List(Box::new(Type::TypeVar("T".into()))),
        );
        let (mut types, mut specs) = (Vec::new(), Vec::new());
        ty.collect_vars(&mut types, &mut specs);

        assert_eq!(types, vec!["T".to_string()]);
        assert_eq!(specs, vec!["P".to_string()]);
    }
}
