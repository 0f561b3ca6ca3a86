use paramspec::{TypeChecker, TypeError};

const PRELUDE: &str = r#"from typing import Callable, Generic, ParamSpec, TypeVar
P = ParamSpec("P")
T = TypeVar("T")
"#;

fn errors(body: &str) -> Vec<TypeError> {
    let source = format!("{}{}", PRELUDE, body);
    let mut checker = TypeChecker::new(&source);
    checker.check_source(&source);
    checker.into_errors().into_iter().filter(TypeError::is_error).collect()
}

fn codes(body: &str) -> Vec<&'static str> {
    errors(body).iter().map(|e| e.code).collect()
}

#[test]
fn test_callable_parameter_slot() {
    assert!(codes("def f(c: Callable[P, int]) -> Callable[P, int]: ...\n").is_empty());
    assert!(codes("def f(c: Callable[..., int]) -> None: ...\n").is_empty());
    assert!(codes("def f(c: list[Callable[P, int]]) -> None: ...\n").is_empty());
}

#[test]
fn test_standalone_use_rejected() {
    let found = errors("def f(x: P) -> None: ...\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "paramspec-use-site");
    assert_eq!(found[0].location.line, 4);

    assert_eq!(codes("def f() -> P: ...\n"), vec!["paramspec-use-site"]);
    assert_eq!(codes("x: P\n"), vec!["paramspec-use-site"]);
}

#[test]
fn test_nested_in_other_generic_rejected() {
    assert_eq!(codes("def f(x: list[P]) -> None: ...\n"), vec!["paramspec-use-site"]);
    assert_eq!(codes("def f(x: dict[str, P]) -> None: ...\n"), vec!["paramspec-use-site"]);
}

#[test]
fn test_element_of_parameter_list_rejected() {
    let found = errors("def f(c: Callable[[int, P], int]) -> None: ...\n");
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("parameter list of Callable"));
}

#[test]
fn test_user_generic_argument() {
    let body = r#"
class Box(Generic[T, P]): ...

def ok(b: Box[int, P]) -> None: ...
def gradual(b: Box[int, ...]) -> None: ...
"#;
    assert!(codes(body).is_empty());
}

#[test]
fn test_explicit_list_for_param_spec_rejected() {
    let body = r#"
class Z(Generic[P]): ...

def f(z: Z[[int, str]]) -> None: ...
"#;
    let found = errors(body);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "type-arg");
    assert!(found[0].message.contains("explicit parameter list"));
}

#[test]
fn test_param_spec_in_typevar_slot_rejected() {
    let body = r#"
class Box(Generic[T, P]): ...

def f(b: Box[P, P]) -> None: ...
"#;
    assert_eq!(codes(body), vec!["paramspec-use-site"]);
}

#[test]
fn test_string_annotations_validated() {
    let found = errors("def f(x: 'list[P]') -> None: ...\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "paramspec-use-site");
    assert!(codes("def f(c: 'Callable[P, int]') -> None: ...\n").is_empty());
}

#[test]
fn test_string_annotation_columns() {
    let column = |body: &str| {
        let found = errors(body);
        assert_eq!(found.len(), 1, "{}", body);
        assert_eq!(found[0].code, "paramspec-use-site");
        (found[0].location.line, found[0].location.col)
    };
    assert_eq!(column("def f(x: 'P') -> None: ...\n"), (4, 10));
    assert_eq!(column("def f(x: \"\"\"P\"\"\") -> None: ...\n"), (4, 12));
    assert_eq!(column("def f(x: r'P') -> None: ...\n"), (4, 11));
    assert_eq!(column("def f(é: 'P') -> None: ...\n"), (4, 10));
}
