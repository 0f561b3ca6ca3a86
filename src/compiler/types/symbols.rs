use super::{Signature, Substitution, Type, TypeArg, Variance};
use crate::compiler::errors::SourceLocation;
use dashmap::DashMap;
use std::collections::HashMap;

/// A declared parameter specification variable
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpecDecl {
    pub name: String,
    /// Parsed but not yet checked
    pub bound: Option<Type>,
    pub variance: Variance,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeVarDecl {
    pub name: String,
    pub constraints: Vec<Type>,
    pub bound: Option<Type>,
    pub variance: Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParamKind {
    TypeVar,
    ParamSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParam {
    pub name: String,
    pub kind: TypeParamKind,
}

/// A user class; generic when `type_params` is non-empty
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    /// `__init__` without its receiver
    pub constructor: Option<Signature>,
    /// Annotated attributes and methods as seen through an instance
    pub members: HashMap<String, Type>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            constructor: None,
            members: HashMap::new(),
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// The type of `self` inside the class body
    pub fn instance_type(&self) -> Type {
        if !self.is_generic() {
            return Type::Class(self.name.clone());
        }
        let args = self
            .type_params
            .iter()
            .map(|p| match p.kind {
                TypeParamKind::TypeVar => TypeArg::Type(Type::TypeVar(p.name.clone())),
                TypeParamKind::ParamSpec => TypeArg::Params(Signature::spec(p.name.clone())),
            })
            .collect();
        Type::Generic(self.name.clone(), args)
    }

    /// Type of the class object when called: constructor parameters to instance
    pub fn constructor_type(&self) -> Type {
        let params = self.constructor.clone().unwrap_or(Signature::Gradual);
        Type::callable(params, self.instance_type())
    }

    /// Member type for an instance whose class arguments are `args`
    pub fn member(&self, name: &str, args: &[TypeArg]) -> Option<Type> {
        let ty = self.members.get(name)?;
        let mut subst = Substitution::new();
        for (param, arg) in self.type_params.iter().zip(args) {
            match arg {
                TypeArg::Type(t) => {
                    subst.types.insert(param.name.clone(), t.clone());
                }
                TypeArg::Params(sig) => {
                    subst.specs.insert(param.name.clone(), sig.clone());
                }
            }
        }
        Some(ty.substitute(&subst))
    }
}

/// Names from `typing`, `typing_extensions`, `functools` and builtins that the
/// checker gives meaning to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    ParamSpec,
    TypeVar,
    Callable,
    Generic,
    Protocol,
    Any,
    Optional,
    Union,
    List,
    Dict,
    Tuple,
    Set,
    RevealType,
    Wraps,
    StaticMethod,
    ClassMethod,
    Property,
    /// `typing` / `typing_extensions` imported as a module
    TypingModule,
    FunctoolsModule,
}

impl SpecialForm {
    pub fn from_typing(name: &str) -> Option<Self> {
        Some(match name {
            "ParamSpec" => SpecialForm::ParamSpec,
            "TypeVar" => SpecialForm::TypeVar,
            "Callable" => SpecialForm::Callable,
            "Generic" => SpecialForm::Generic,
            "Protocol" => SpecialForm::Protocol,
            "Any" => SpecialForm::Any,
            "Optional" => SpecialForm::Optional,
            "Union" => SpecialForm::Union,
            "List" => SpecialForm::List,
            "Dict" => SpecialForm::Dict,
            "Tuple" => SpecialForm::Tuple,
            "Set" => SpecialForm::Set,
            "reveal_type" => SpecialForm::RevealType,
            _ => return None,
        })
    }

    pub fn from_functools(name: &str) -> Option<Self> {
        match name {
            "wraps" => Some(SpecialForm::Wraps),
            _ => None,
        }
    }

    /// Unshadowed builtins plus the typing names accepted without an import
    pub fn from_builtin(name: &str) -> Option<Self> {
        Some(match name {
            "list" => SpecialForm::List,
            "dict" => SpecialForm::Dict,
            "tuple" => SpecialForm::Tuple,
            "set" => SpecialForm::Set,
            "staticmethod" => SpecialForm::StaticMethod,
            "classmethod" => SpecialForm::ClassMethod,
            "property" => SpecialForm::Property,
            other => return Self::from_typing(other),
        })
    }

    /// Decorators that leave the decorated function's type alone
    pub fn is_transparent_decorator(self) -> bool {
        matches!(
            self,
            SpecialForm::StaticMethod
                | SpecialForm::ClassMethod
                | SpecialForm::Property
                | SpecialForm::Wraps
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    TypeVar(TypeVarDecl),
    ParamSpec(ParamSpecDecl),
    Class(ClassInfo),
    Special(SpecialForm),
    Value(Type),
}

/// Module-level names
#[derive(Debug, Default)]
pub struct TypeContext {
    symbols: DashMap<String, Symbol>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, name: impl Into<String>, symbol: Symbol) {
        self.symbols.insert(name.into(), symbol);
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).map(|r| r.value().clone())
    }

    pub fn param_spec(&self, name: &str) -> Option<ParamSpecDecl> {
        match self.lookup(name) {
            Some(Symbol::ParamSpec(decl)) => Some(decl),
            _ => None,
        }
    }

    pub fn type_var(&self, name: &str) -> Option<TypeVarDecl> {
        match self.lookup(name) {
            Some(Symbol::TypeVar(decl)) => Some(decl),
            _ => None,
        }
    }

    pub fn class(&self, name: &str) -> Option<ClassInfo> {
        match self.lookup(name) {
            Some(Symbol::Class(info)) => Some(info),
            _ => None,
        }
    }

    /// Declared ParamSpec names, sorted, for suggestions
    pub fn param_spec_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .symbols
            .iter()
            .filter(|r| matches!(r.value(), Symbol::ParamSpec(_)))
            .map(|r| r.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::Parameter;

    fn decl(name: &str) -> ParamSpecDecl {
        ParamSpecDecl {
            name: name.to_string(),
            bound: None,
            variance: Variance::Invariant,
            location: SourceLocation::unknown(),
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let ctx = TypeContext::new();
        ctx.define("P", Symbol::ParamSpec(decl("P")));
        ctx.define("Box", Symbol::Class(ClassInfo::new("Box")));

        assert_eq!(ctx.param_spec("P").map(|d| d.name), Some("P".to_string()));
        assert!(ctx.param_spec("Box").is_none());
        assert!(ctx.class("Box").is_some());
        assert_eq!(ctx.len(), 2);

        ctx.clear();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_param_spec_names_sorted() {
        let ctx = TypeContext::new();
        ctx.define("Q", Symbol::ParamSpec(decl("Q")));
        ctx.define("P", Symbol::ParamSpec(decl("P")));
        ctx.define("T", Symbol::Value(Type::Int));

        assert_eq!(ctx.param_spec_names(), vec!["P".to_string(), "Q".to_string()]);
    }

    #[test]
    fn test_generic_member_substitution() {
        let mut info = ClassInfo::new("Job");
        info.type_params = vec![
            TypeParam { name: "P".into(), kind: TypeParamKind::ParamSpec },
            TypeParam { name: "R".into(), kind: TypeParamKind::TypeVar },
        ];
        info.members.insert(
            "run".into(),
            Type::callable(Signature::spec("P"), Type::TypeVar("R".into())),
        );

        assert_eq!(info.instance_type().to_string(), "Job[(**P), R]");
        assert_eq!(info.constructor_type().to_string(), "(...) -> Job[(**P), R]");

        let args = [
            TypeArg::Params(Signature::params(vec![Parameter::positional_only(Type::Int)])),
            TypeArg::Type(Type::Str),
        ];
        assert_eq!(
            info.member("run", &args).map(|t| t.to_string()),
            Some("(int) -> str".to_string())
        );
        assert!(info.member("missing", &args).is_none());
    }

    #[test]
    fn test_special_forms() {
        assert_eq!(SpecialForm::from_typing("ParamSpec"), Some(SpecialForm::ParamSpec));
        assert_eq!(SpecialForm::from_builtin("list"), Some(SpecialForm::List));
        assert_eq!(SpecialForm::from_builtin("Callable"), Some(SpecialForm::Callable));
        assert!(SpecialForm::Wraps.is_transparent_decorator());
        assert!(!SpecialForm::Callable.is_transparent_decorator());
    }
}
