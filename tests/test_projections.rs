use paramspec::compiler::frontend::CheckConfig;
use paramspec::{TypeChecker, TypeError};

const PRELUDE: &str = r#"from typing import Callable, ParamSpec, TypeVar
P = ParamSpec("P")
Q = ParamSpec("Q")
R = TypeVar("R")
"#;

fn errors_with(body: &str, config: CheckConfig) -> Vec<TypeError> {
    let source = format!("{}{}", PRELUDE, body);
    let mut checker = TypeChecker::with_config(&source, config);
    checker.check_source(&source);
    checker.into_errors().into_iter().filter(TypeError::is_error).collect()
}

fn errors(body: &str) -> Vec<TypeError> {
    errors_with(body, CheckConfig::default())
}

fn revealed(body: &str) -> Vec<String> {
    let source = format!("{}{}", PRELUDE, body);
    let mut checker = TypeChecker::new(&source);
    checker
        .check_source(&source)
        .iter()
        .filter(|e| e.code == "reveal")
        .map(|e| e.message.clone())
        .collect()
}

#[test]
fn test_pair_accepted() {
    assert!(errors("def f(*args: P.args, **kwargs: P.kwargs) -> int: ...\n").is_empty());
}

#[test]
fn test_lone_args_rejected() {
    let found = errors("def f(*args: P.args) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "paramspec-projection");
    assert!(found[0].message.contains("requires '**kwargs: P.kwargs'"));

    let found = errors("def f(**kwargs: P.kwargs) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("requires '*args: P.args'"));
}

#[test]
fn test_swapped_rejected() {
    let found = errors("def f(*args: P.kwargs, **kwargs: P.args) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("swapped"));
}

#[test]
fn test_different_variables_rejected() {
    let found = errors("def f(*args: P.args, **kwargs: Q.kwargs) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("different ParamSpecs"));
}

#[test]
fn test_projection_on_ordinary_parameter_rejected() {
    let found = errors("def f(x: P.args) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].message,
        "Invalid use of ParamSpec components: 'P.args' can only annotate '*args'"
    );
}

#[test]
fn test_wrapped_projection_rejected() {
    let found = errors("def f(*args: tuple[P.args], **kwargs: P.kwargs) -> int: ...\n");
    assert!(!found.is_empty());
    assert!(found.iter().all(|e| e.code == "paramspec-projection"));
    assert!(found[0].message.contains("wrapped"));
}

#[test]
fn test_unknown_owner_suggests_declared_name() {
    let found = errors("def f(*args: S.args, **kwargs: S.kwargs) -> int: ...\n");
    assert_eq!(found.len(), 2);
    assert!(found[0].message.contains("'S' is not a declared ParamSpec"));
    assert!(found[0].suggestions.contains(&"Did you mean 'P'?".to_string()));
}

#[test]
fn test_inferred_type_of_projection_pair() {
    let body = r#"
def f(*args: P.args, **kwargs: P.kwargs) -> int: ...
reveal_type(f)
"#;
    assert_eq!(revealed(body), vec!["Revealed type is '(**P) -> int'".to_string()]);
}

#[test]
fn test_anonymous_leading_parameter_accepted() {
    let body = r#"
def call(f: Callable[P, R], /, *args: P.args, **kwargs: P.kwargs) -> R:
    return f(*args, **kwargs)

def legacy(__f: Callable[P, R], *args: P.args, **kwargs: P.kwargs) -> R:
    return __f(*args, **kwargs)
"#;
    assert!(errors(body).is_empty(), "{:?}", errors(body));
}

#[test]
fn test_named_leading_parameter_rejected() {
    let body = "def call(f: Callable[P, R], *args: P.args, **kwargs: P.kwargs) -> R: ...\n";
    let found = errors(body);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "paramspec-projection");
    assert!(found[0].message.contains("parameter 'f' precedes"));
    assert_eq!(
        found[0].suggestions,
        vec!["Make 'f' positional-only by adding '/' after it".to_string()]
    );
}

#[test]
fn test_dunder_convention_can_be_disabled() {
    let body = "def legacy(__f: Callable[P, R], *args: P.args, **kwargs: P.kwargs) -> R: ...\n";
    let config = CheckConfig {
        dunder_positional: false,
        ..CheckConfig::default()
    };
    assert_eq!(errors_with(body, config).len(), 1);
}

#[test]
fn test_keyword_only_between_projections_rejected() {
    let found = errors("def f(*args: P.args, flag: bool, **kwargs: P.kwargs) -> int: ...\n");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("keyword-only parameter 'flag'"));
}
