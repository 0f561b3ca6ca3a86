use paramspec::compiler::analysis::{CallInference, ConstraintChecker, InferenceOptions};
use paramspec::compiler::types::{ParamSpecDecl, TypeVarDecl};
use paramspec::{CallArgs, ParamKind, Parameter, Signature, Type, TypeChecker, TypeError};
use proptest::prelude::*;

const PRELUDE: &str = r#"from typing import Callable, ParamSpec, TypeVar
P = ParamSpec("P")
R = TypeVar("R")
"#;

fn check(body: &str) -> Vec<TypeError> {
    let source = format!("{}{}", PRELUDE, body);
    let mut checker = TypeChecker::new(&source);
    checker.check_source(&source);
    checker.into_errors()
}

fn codes(body: &str) -> Vec<&'static str> {
    check(body).iter().filter(|e| e.is_error()).map(|e| e.code).collect()
}

fn revealed(body: &str) -> Vec<String> {
    check(body)
        .into_iter()
        .filter(|e| e.code == "reveal")
        .map(|e| e.message)
        .collect()
}

const LOGGED: &str = r#"
def logged(f: Callable[P, R]) -> Callable[P, R]:
    def inner(*args: P.args, **kwargs: P.kwargs) -> R:
        return f(*args, **kwargs)
    return inner
"#;

#[test]
fn test_bound_list_preserves_parameter_kinds() {
    let body = format!(
        r#"{}
@logged
def greet(name: str, /, greeting: str = "hi", *, loud: bool = False) -> str:
    return greeting

reveal_type(greet)
"#,
        LOGGED
    );
    let expected = "(name: str, /, greeting: str = ..., *, loud: bool = ...) -> str";
    assert_eq!(revealed(&body), vec![format!("Revealed type is '{}'", expected)]);
}

#[test]
fn test_calls_through_bound_list() {
    let body = format!(
        r#"{}
@logged
def greet(name: str, /, greeting: str = "hi", *, loud: bool = False) -> str:
    return greeting

greet("a")
greet("a", "b", loud=True)
greet("a", greeting="b")
greet(name="a")
greet("a", "b", "c")
greet()
greet("a", loud=1)
"#,
        LOGGED
    );
    assert_eq!(codes(&body), vec!["call-arg", "call-arg", "call-arg", "arg-type"]);
}

#[test]
fn test_shared_binding_identical_lists() {
    let body = r#"
def twice(a: Callable[P, int], b: Callable[P, int]) -> Callable[P, bool]: ...

def f(x: int) -> int: ...

reveal_type(twice(f, f))
"#;
    assert!(codes(body).is_empty());
    assert_eq!(revealed(body), vec!["Revealed type is '(x: int) -> bool'".to_string()]);
}

#[test]
fn test_shared_binding_without_common_convention() {
    let body = r#"
def twice(a: Callable[P, int], b: Callable[P, int]) -> Callable[P, bool]: ...

def g(*, x: int) -> int: ...
def h(*, y: int) -> int: ...

twice(g, h)
"#;
    let errors: Vec<TypeError> = check(body).into_iter().filter(TypeError::is_error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "paramspec-binding");
    assert_eq!(errors[0].location.line, 10);
}

#[test]
fn test_shared_binding_positional_supertype() {
    // Both accept one int positionally; the names differ, so only the position survives
    let body = r#"
def twice(a: Callable[P, int], b: Callable[P, int]) -> Callable[P, bool]: ...

def f(x: int) -> int: ...
def g(y: int) -> int: ...

reveal_type(twice(f, g))
"#;
    assert!(codes(body).is_empty());
    assert_eq!(revealed(body), vec!["Revealed type is '(int) -> bool'".to_string()]);
}

#[test]
fn test_leading_anonymous_parameter_solved_per_call() {
    let body = r#"
def call(f: Callable[P, R], /, *args: P.args, **kwargs: P.kwargs) -> R:
    return f(*args, **kwargs)

def clash(f: str, n: int) -> bool: ...

reveal_type(call(clash, "s", n=1))
call(clash, f="s", n=2)
call(clash, 1, 2)
"#;
    assert_eq!(codes(body), vec!["arg-type"]);
    assert_eq!(revealed(body), vec!["Revealed type is 'bool'".to_string()]);
}

#[test]
fn test_round_trip_through_decorator() {
    let body = r#"
def deco(f: Callable[P, R]) -> Callable[P, R]:
    def inner(*args: P.args, **kwargs: P.kwargs) -> R:
        return f(*args, **kwargs)
    return inner

def wrong(f: Callable[P, R]) -> Callable[P, R]:
    def inner(x: int) -> R: ...
    return inner
"#;
    let errors: Vec<TypeError> = check(body).into_iter().filter(TypeError::is_error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "return-value");
    assert_eq!(errors[0].location.line, 12);
}

#[test]
fn test_unsolved_variable_defaults_to_gradual() {
    let body = r#"
def logged(f: Callable[P, R]) -> Callable[P, R]: ...

from mystery import thing
reveal_type(logged(thing))
"#;
    assert_eq!(revealed(body), vec!["Revealed type is '(...) -> Any'".to_string()]);
}

#[test]
fn test_decorator_applied_inside_generic_function() {
    // `logged` quantifies its own P and R even where the enclosing P and R are held fixed
    let body = format!(
        r#"{}
def outer(g: Callable[P, R]) -> Callable[P, R]:
    @logged
    def helper(x: int) -> str: ...
    reveal_type(helper)
    helper(1)
    return logged(g)
"#,
        LOGGED
    );
    assert!(codes(&body).is_empty());
    assert_eq!(revealed(&body), vec!["Revealed type is '(x: int) -> str'".to_string()]);
}

#[test]
fn test_binding_error_inside_generic_function_names_declared_variable() {
    let body = r#"
def twice(a: Callable[P, int], b: Callable[P, int]) -> Callable[P, bool]: ...

def outer(g: Callable[P, R]) -> Callable[P, R]:
    def h1(*, x: int) -> int: ...
    def h2(*, y: int) -> int: ...
    twice(h1, h2)
    return g
"#;
    let errors: Vec<TypeError> = check(body).into_iter().filter(TypeError::is_error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "paramspec-binding");
    assert!(errors[0].message.contains("'P'"), "{}", errors[0].message);
    assert!(!errors[0].message.contains('@'), "{}", errors[0].message);
}

#[test]
fn test_forwarding_inside_decorator_still_uses_enclosing_variable() {
    let body = r#"
def outer(f: Callable[P, R]) -> Callable[P, R]:
    def inner(*args: P.args, **kwargs: P.kwargs) -> R:
        f(1)
        return f(*args, **kwargs)
    return inner
"#;
    assert_eq!(codes(body), vec!["call-arg"]);
}

/// Rejects ParamSpec solutions that take more than one parameter
struct AtMostOneParameter;

impl ConstraintChecker for AtMostOneParameter {
    fn check_param_spec(&self, decl: &ParamSpecDecl, solved: &Signature) -> Result<(), String> {
        match solved {
            Signature::Params(params) if params.len() > 1 => {
                Err(format!("'{}' is bound to {} parameters", decl.name, params.len()))
            }
            _ => Ok(()),
        }
    }

    fn check_type_var(&self, _decl: &TypeVarDecl, _solved: &Type) -> Result<(), String> {
        Ok(())
    }
}

#[test]
fn test_constraint_checker_rejection_reported() {
    let source = format!(
        r#"{}{}
@logged
def one(x: int) -> int: ...

@logged
def two(x: int, y: int) -> int: ...
"#,
        PRELUDE, LOGGED
    );
    let mut checker = TypeChecker::new(&source).with_constraints(Box::new(AtMostOneParameter));
    checker.check_source(&source);
    let errors: Vec<TypeError> =
        checker.into_errors().into_iter().filter(TypeError::is_error).collect();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "call-arg");
    assert_eq!(errors[0].location.line, 13);
    assert!(errors[0].message.contains("'P' is bound to 2 parameters"), "{}", errors[0].message);
}

// Property-based checks over generated parameter lists

#[derive(Debug, Clone)]
struct GenParam {
    kind: ParamKind,
    ty: Type,
    has_default: bool,
}

fn gen_param() -> impl Strategy<Value = GenParam> {
    let kind = prop_oneof![
        Just(ParamKind::PositionalOnly),
        Just(ParamKind::PositionalOrKeyword),
        Just(ParamKind::KeywordOnly),
    ];
    let ty = prop_oneof![Just(Type::Int), Just(Type::Str), Just(Type::Bool)];
    (kind, ty, any::<bool>()).prop_map(|(kind, ty, has_default)| GenParam { kind, ty, has_default })
}

fn rank(kind: ParamKind) -> u8 {
    match kind {
        ParamKind::PositionalOnly => 0,
        ParamKind::PositionalOrKeyword => 1,
        _ => 2,
    }
}

/// A well-formed Python parameter list: kinds in order, positional defaults last
fn gen_signature() -> impl Strategy<Value = Vec<Parameter>> {
    prop::collection::vec(gen_param(), 0..6).prop_map(|mut params| {
        params.sort_by_key(|p| rank(p.kind));
        let mut seen_default = false;
        params
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let mut has_default = p.has_default;
                if p.kind.is_positional() {
                    has_default |= seen_default;
                    seen_default = has_default;
                }
                let mut param = Parameter::named(format!("p{}", i), p.kind, p.ty);
                param.has_default = has_default;
                param
            })
            .collect()
    })
}

/// Every required parameter, positionals by position and the rest by keyword
fn minimal_call(params: &[Parameter]) -> CallArgs {
    let mut args = CallArgs::default();
    for param in params.iter().filter(|p| p.is_required()) {
        match param.kind {
            ParamKind::KeywordOnly => {
                let name = param.name.clone().unwrap_or_default();
                args.keywords.push((name, param.ty.clone()));
            }
            _ => args.positional.push(param.ty.clone()),
        }
    }
    args
}

fn decorator() -> Type {
    let pr = Type::callable(Signature::spec("P"), Type::TypeVar("R".into()));
    Type::callable(
        Signature::params(vec![Parameter::named("f", ParamKind::PositionalOrKeyword, pr.clone())]),
        pr,
    )
}

proptest! {
    #[test]
    fn prop_decorator_returns_bound_list(params in gen_signature()) {
        let function = Type::callable(Signature::params(params), Type::Int);
        let outcome = CallInference::new(InferenceOptions::default(), &[], &[])
            .infer("logged", &decorator(), &CallArgs::positional(vec![function.clone()]));

        prop_assert!(outcome.issues.is_empty());
        prop_assert_eq!(outcome.ret, function);
    }

    #[test]
    fn prop_valid_shape_accepted(params in gen_signature()) {
        let function = Type::callable(Signature::params(params.clone()), Type::Int);
        let inference = CallInference::new(InferenceOptions::default(), &[], &[]);
        let decorated = inference
            .infer("logged", &decorator(), &CallArgs::positional(vec![function]))
            .ret;

        let outcome = inference.infer("f", &decorated, &minimal_call(&params));
        prop_assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        prop_assert_eq!(outcome.ret, Type::Int);
    }

    #[test]
    fn prop_extra_positional_rejected(params in gen_signature()) {
        let signature = Signature::params(params.clone());
        let positional = params.iter().filter(|p| p.kind.is_positional()).count();
        let args = CallArgs::positional(vec![Type::Int; positional + 1]);
        prop_assert!(signature.bind(&args).is_err());
    }

    #[test]
    fn prop_missing_required_rejected(params in gen_signature()) {
        let required = params.iter().filter(|p| p.is_required()).count();
        prop_assume!(required > 0);

        let mut args = minimal_call(&params);
        if args.keywords.pop().is_none() {
            args.positional.pop();
        }
        prop_assert!(Signature::params(params).bind(&args).is_err());
    }

    #[test]
    fn prop_supertype_of_identical_lists(params in gen_signature()) {
        let signature = Signature::params(params);
        let joined = signature.common_supertype(&signature);
        prop_assert!(joined.map_or(false, |j| j.equivalent(&signature)));
        prop_assert!(signature.is_compatible_with(&signature));
    }

    #[test]
    fn prop_supertype_calls_valid_for_both(a in gen_signature(), b in gen_signature()) {
        let (sa, sb) = (Signature::params(a), Signature::params(b));
        if let Some(Signature::Params(joined)) = sa.common_supertype(&sb) {
            let call = minimal_call(&joined);
            prop_assert!(sa.bind(&call).is_ok(), "{} vs {}", sa, Signature::Params(joined.clone()));
            prop_assert!(sb.bind(&call).is_ok(), "{} vs {}", sb, Signature::Params(joined));
        }
    }
}
