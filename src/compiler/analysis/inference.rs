//! Call-site inference
//!
//! Given the type of a callee and the shapes and types of the supplied
//! arguments, binds the arguments, solves the callee's TypeVars and
//! ParamSpecs, reconciles several candidates for one ParamSpec, checks
//! argument types and produces the substituted return type.
//!
//! Variables in `rigid_*` belong to an enclosing function: they are never
//! solved, and a callee whose parameter list is such a ParamSpec only accepts
//! the forwarding call `f(<prefix>, *args, **kwargs)`.

use crate::compiler::errors::ErrorKind;
use crate::compiler::frontend::config::JoinStrategy;
use crate::compiler::types::{
    ArgSource, BoundArgument, CallArgs, CallMismatch, ParamKind, Parameter, Signature, Substitution,
    Type, TypeArg,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct InferenceOptions {
    pub join_strategy: JoinStrategy,
    pub check_argument_types: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            join_strategy: JoinStrategy::Supertype,
            check_argument_types: true,
        }
    }
}

/// What part of the call a diagnostic points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgRef {
    Call,
    Arg(ArgSource),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallIssue {
    pub kind: ErrorKind,
    pub at: ArgRef,
}

#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub ret: Type,
    /// Variables solved from the arguments, before defaulting
    pub solved: Substitution,
    pub issues: Vec<CallIssue>,
}

#[derive(Default)]
struct Candidates {
    types: Vec<(String, Type)>,
    specs: Vec<(String, Signature, ArgSource)>,
}

pub struct CallInference<'a> {
    options: InferenceOptions,
    rigid_types: &'a [String],
    rigid_specs: &'a [String],
}

impl<'a> CallInference<'a> {
    pub fn new(
        options: InferenceOptions,
        rigid_types: &'a [String],
        rigid_specs: &'a [String],
    ) -> Self {
        Self {
            options,
            rigid_types,
            rigid_specs,
        }
    }

    fn is_rigid_spec(&self, var: &str) -> bool {
        self.rigid_specs.iter().any(|v| v == var)
    }

    fn is_rigid_type(&self, var: &str) -> bool {
        self.rigid_types.iter().any(|v| v == var)
    }

    pub fn infer(&self, callee: &str, ty: &Type, args: &CallArgs) -> CallOutcome {
        let mut issues = Vec::new();

        let Type::Callable(sig, ret) = ty else {
            trace!(callee, ty = %ty, "Callee is not a known callable");
            return CallOutcome {
                ret: Type::Any,
                solved: Substitution::new(),
                issues,
            };
        };

        let mismatch = |issues: &mut Vec<CallIssue>, m: CallMismatch| {
            issues.push(CallIssue {
                kind: ErrorKind::CallSiteMismatch {
                    callee: callee.to_string(),
                    reason: m.to_string(),
                },
                at: ArgRef::Call,
            })
        };

        let bound = match sig.as_ref() {
            Signature::Gradual => Vec::new(),
            Signature::Params(_) => sig.bind(args).unwrap_or_else(|m| {
                mismatch(&mut issues, m);
                Vec::new()
            }),
            Signature::Spec { prefix, var } if self.is_rigid_spec(var) => {
                forwarding(prefix, var, args).unwrap_or_else(|m| {
                    mismatch(&mut issues, m);
                    Vec::new()
                })
            }
            Signature::Spec { prefix, .. } => {
                let shortfall = args.positional.len() < prefix.len() && args.star.is_empty();
                if shortfall {
                    mismatch(
                        &mut issues,
                        CallMismatch::PrefixMismatch {
                            expected: prefix.len(),
                            found: args.positional.len(),
                        },
                    );
                }
                bind_prefix(prefix, args)
            }
        };

        let mut candidates = Candidates::default();
        for arg in &bound {
            self.collect(&arg.param.ty, &arg.arg, &arg.source, &mut candidates);
        }
        let solved = self.reconcile(candidates, &mut issues);

        // The tail of a call through a solved ParamSpec must fit what it was solved to
        if let Signature::Spec { prefix, var } = sig.as_ref() {
            if !self.is_rigid_spec(var) {
                if let Some(target) = solved.specs.get(var) {
                    let tail = tail_args(args, prefix.len());
                    self.check_tail(callee, target, &tail, prefix.len(), &mut issues);
                }
            }
        }

        let full = self.with_defaults(ty, &solved);

        if self.options.check_argument_types {
            for arg in &bound {
                self.check_argument(arg, &arg.param.ty.substitute(&full), &mut issues);
            }
        }

        let ret = ret.substitute(&full);
        debug!(callee, ret = %ret, issues = issues.len(), "Inferred call");

        CallOutcome { ret, solved, issues }
    }

    fn check_argument(&self, arg: &BoundArgument, expected: &Type, issues: &mut Vec<CallIssue>) {
        if !arg.arg.is_subtype(expected) {
            issues.push(CallIssue {
                kind: ErrorKind::InvalidArgType {
                    param: arg.label.clone(),
                    expected: expected.to_string(),
                    found: arg.arg.to_string(),
                },
                at: ArgRef::Arg(arg.source.clone()),
            });
        }
    }

    /// Arguments after the prefix of a call through a solved ParamSpec
    fn check_tail(
        &self,
        callee: &str,
        target: &Signature,
        tail: &CallArgs,
        offset: usize,
        issues: &mut Vec<CallIssue>,
    ) {
        let result = match target {
            Signature::Gradual => return,
            Signature::Params(_) => target.bind(tail),
            Signature::Spec { prefix, var } if self.is_rigid_spec(var) => {
                forwarding(prefix, var, tail)
            }
            Signature::Spec { .. } => return,
        };

        match result {
            Ok(bound) => {
                if self.options.check_argument_types {
                    for mut arg in bound {
                        if let ArgSource::Positional(i) = arg.source {
                            arg.source = ArgSource::Positional(i + offset);
                        }
                        self.check_argument(&arg, &arg.param.ty, issues);
                    }
                }
            }
            Err(m) => issues.push(CallIssue {
                kind: ErrorKind::CallSiteMismatch {
                    callee: callee.to_string(),
                    reason: m.to_string(),
                },
                at: ArgRef::Call,
            }),
        }
    }

    /// Record what `actual` says about the free variables in `pattern`
    fn collect(&self, pattern: &Type, actual: &Type, source: &ArgSource, out: &mut Candidates) {
        match (pattern, actual) {
            (_, Type::Any) => {}
            (Type::TypeVar(name), _) if !self.is_rigid_type(name) => {
                out.types.push((name.clone(), actual.clone()))
            }
            (Type::Callable(ps, pr), Type::Callable(asig, ar)) => {
                self.collect_signature(ps, asig, source, out);
                self.collect(pr, ar, source, out);
            }
            (Type::List(p), Type::List(a)) | (Type::Set(p), Type::Set(a)) => {
                self.collect(p, a, source, out)
            }
            (Type::Dict(pk, pv), Type::Dict(ak, av)) => {
                self.collect(pk, ak, source, out);
                self.collect(pv, av, source, out);
            }
            (Type::Tuple(ps), Type::Tuple(actuals)) if ps.len() == actuals.len() => {
                for (p, a) in ps.iter().zip(actuals) {
                    self.collect(p, a, source, out);
                }
            }
            (Type::Generic(pn, pargs), Type::Generic(an, aargs))
                if pn == an && pargs.len() == aargs.len() =>
            {
                for (p, a) in pargs.iter().zip(aargs) {
                    match (p, a) {
                        (TypeArg::Type(p), TypeArg::Type(a)) => self.collect(p, a, source, out),
                        (TypeArg::Params(p), TypeArg::Params(a)) => {
                            self.collect_signature(p, a, source, out)
                        }
                        _ => {}
                    }
                }
            }
            (Type::Union(members), _) => {
                let concrete_match = members
                    .iter()
                    .any(|m| !self.has_free_vars(m) && actual.is_subtype(m));
                if !concrete_match {
                    if let Some(member) = members.iter().find(|m| self.has_free_vars(m)) {
                        self.collect(member, actual, source, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_signature(
        &self,
        pattern: &Signature,
        actual: &Signature,
        source: &ArgSource,
        out: &mut Candidates,
    ) {
        match (pattern, actual) {
            (Signature::Spec { prefix, var }, _) if !self.is_rigid_spec(var) => {
                // A callable that cannot take the prefix fails the argument type check later
                if let Some(rest) = strip_prefix(prefix, actual) {
                    trace!(var = %var, candidate = %rest, "ParamSpec candidate");
                    out.specs.push((var.clone(), rest, source.clone()));
                }
            }
            (Signature::Params(ps), Signature::Params(actuals)) => {
                for (p, a) in ps.iter().zip(actuals.iter()) {
                    if p.kind == a.kind || (p.kind.is_positional() && a.kind.is_positional()) {
                        self.collect(&p.ty, &a.ty, source, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn has_free_vars(&self, ty: &Type) -> bool {
        let (mut types, mut specs) = (Vec::new(), Vec::new());
        ty.collect_vars(&mut types, &mut specs);
        types.iter().any(|t| !self.is_rigid_type(t)) || specs.iter().any(|s| !self.is_rigid_spec(s))
    }

    fn join(&self, a: &Signature, b: &Signature) -> Option<Signature> {
        match self.options.join_strategy {
            JoinStrategy::Supertype => a.common_supertype(b),
            JoinStrategy::Exact => match (a, b) {
                (Signature::Gradual, other) | (other, Signature::Gradual) => Some(other.clone()),
                _ if a.equivalent(b) => Some(a.clone()),
                _ => None,
            },
        }
    }

    fn reconcile(&self, candidates: Candidates, issues: &mut Vec<CallIssue>) -> Substitution {
        let mut subst = Substitution::new();

        for (name, ty) in candidates.types {
            let joined = match subst.types.remove(&name) {
                Some(existing) => Type::union(vec![existing, ty]),
                None => ty,
            };
            subst.types.insert(name, joined);
        }

        let mut specs: HashMap<String, Signature> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();
        for (var, candidate, source) in candidates.specs {
            if failed.contains(&var) {
                continue;
            }
            let Some(current) = specs.get(&var) else {
                specs.insert(var, candidate);
                continue;
            };

            match self.join(current, &candidate) {
                Some(joined) => {
                    debug!(var = %var, joined = %joined, "Reconciled ParamSpec candidates");
                    specs.insert(var, joined);
                }
                None => {
                    issues.push(CallIssue {
                        kind: ErrorKind::UnsatisfiableBinding {
                            var: var.clone(),
                            first: current.to_string(),
                            second: candidate.to_string(),
                        },
                        at: ArgRef::Arg(source),
                    });
                    // One report per variable; `...` keeps the rest of the call quiet
                    specs.insert(var.clone(), Signature::Gradual);
                    failed.insert(var);
                }
            }
        }
        subst.specs = specs;

        subst
    }

    /// Unsolved variables of the callee become `Any` / `...`
    fn with_defaults(&self, callee: &Type, solved: &Substitution) -> Substitution {
        let mut full = solved.clone();
        let (mut types, mut specs) = (Vec::new(), Vec::new());
        callee.collect_vars(&mut types, &mut specs);

        for name in types.into_iter().filter(|t| !self.is_rigid_type(t)) {
            full.types.entry(name).or_insert(Type::Any);
        }
        for var in specs.into_iter().filter(|s| !self.is_rigid_spec(s)) {
            full.specs.entry(var).or_insert(Signature::Gradual);
        }
        full
    }
}

/// `f(<prefix>, *args, **kwargs)` where `args: P.args` and `kwargs: P.kwargs`
fn forwarding(
    prefix: &[Parameter],
    var: &str,
    args: &CallArgs,
) -> Result<Vec<BoundArgument>, CallMismatch> {
    if args.positional.len() != prefix.len() {
        return Err(CallMismatch::PrefixMismatch {
            expected: prefix.len(),
            found: args.positional.len(),
        });
    }

    let star_ok = matches!(
        args.star.as_slice(),
        [t] if t.is_any() || *t == Type::ParamSpecArgs(var.to_string())
    );
    let double_star_ok = matches!(
        args.double_star.as_slice(),
        [t] if t.is_any() || *t == Type::ParamSpecKwargs(var.to_string())
    );

    if !args.keywords.is_empty() || !star_ok || !double_star_ok {
        return Err(CallMismatch::ForwardingRequired { var: var.to_string() });
    }

    Ok(bind_prefix(prefix, args))
}

fn bind_prefix(prefix: &[Parameter], args: &CallArgs) -> Vec<BoundArgument> {
    prefix
        .iter()
        .zip(&args.positional)
        .enumerate()
        .map(|(i, (param, arg))| BoundArgument {
            param: param.clone(),
            label: format!("#{}", i + 1),
            arg: arg.clone(),
            source: ArgSource::Positional(i),
        })
        .collect()
}

fn tail_args(args: &CallArgs, skip: usize) -> CallArgs {
    CallArgs {
        positional: args.positional.iter().skip(skip).cloned().collect(),
        keywords: args.keywords.clone(),
        star: args.star.clone(),
        double_star: args.double_star.clone(),
    }
}

/// What remains of `sig` once the leading `prefix` parameters are supplied
fn strip_prefix(prefix: &[Parameter], sig: &Signature) -> Option<Signature> {
    match sig {
        Signature::Gradual => Some(Signature::Gradual),
        Signature::Params(params) => {
            let mut rest = params.clone();
            for expected in prefix {
                match rest.first() {
                    Some(p) if p.kind.is_positional() && expected.ty.is_subtype(&p.ty) => {
                        rest.remove(0);
                    }
                    // `*args` keeps absorbing leading arguments
                    Some(p)
                        if p.kind == ParamKind::VarPositional && expected.ty.is_subtype(&p.ty) => {}
                    _ => return None,
                }
            }
            Some(Signature::Params(rest))
        }
        Signature::Spec { prefix: own, var } => {
            if own.len() < prefix.len() {
                return None;
            }
            let compatible = prefix.iter().zip(own.iter()).all(|(e, p)| e.ty.is_subtype(&p.ty));
            compatible.then(|| Signature::Spec {
                prefix: own.iter().skip(prefix.len()).cloned().collect(),
                var: var.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::ParamList;

    fn pos_or_kw(name: &str, ty: Type) -> Parameter {
        Parameter::named(name, ParamKind::PositionalOrKeyword, ty)
    }

    fn tv(name: &str) -> Type {
        Type::TypeVar(name.into())
    }

    /// `def deco(f: Callable[P, R]) -> Callable[P, R]`
    fn decorator() -> Type {
        let pr = Type::callable(Signature::spec("P"), tv("R"));
        Type::callable(
            Signature::params(vec![pos_or_kw("f", pr.clone())]),
            pr,
        )
    }

    fn x_int_y_str() -> Type {
        Type::callable(
            Signature::params(vec![pos_or_kw("x", Type::Int), pos_or_kw("y", Type::Str)]),
            Type::Bool,
        )
    }

    fn infer(callee: &Type, args: CallArgs) -> CallOutcome {
        CallInference::new(InferenceOptions::default(), &[], &[]).infer("deco", callee, &args)
    }

    #[test]
    fn test_decorator_preserves_signature() {
        let outcome = infer(&decorator(), CallArgs::positional(vec![x_int_y_str()]));
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret.to_string(), "(x: int, y: str) -> bool");
    }

    #[test]
    fn test_shared_binding_identical() {
        let pr = Type::callable(Signature::spec("P"), Type::Int);
        let twice = Type::callable(
            Signature::params(vec![pos_or_kw("a", pr.clone()), pos_or_kw("b", pr)]),
            Type::callable(Signature::spec("P"), Type::Bool),
        );
        let f = Type::callable(Signature::params(vec![pos_or_kw("x", Type::Int)]), Type::Int);

        let outcome = infer(&twice, CallArgs::positional(vec![f.clone(), f]));
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret.to_string(), "(x: int) -> bool");
    }

    #[test]
    fn test_shared_binding_unsatisfiable() {
        let pr = Type::callable(Signature::spec("P"), Type::Int);
        let twice = Type::callable(
            Signature::params(vec![pos_or_kw("a", pr.clone()), pos_or_kw("b", pr)]),
            Type::None,
        );
        let kw = |name: &str| {
            Type::callable(
                Signature::params(vec![Parameter::named(name, ParamKind::KeywordOnly, Type::Int)]),
                Type::Int,
            )
        };

        let outcome = infer(&twice, CallArgs::positional(vec![kw("x"), kw("y")]));
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].at, ArgRef::Arg(ArgSource::Positional(1)));
        assert!(matches!(outcome.issues[0].kind, ErrorKind::UnsatisfiableBinding { .. }));
    }

    #[test]
    fn test_exact_strategy() {
        let pr = Type::callable(Signature::spec("P"), Type::Int);
        let twice = Type::callable(
            Signature::params(vec![pos_or_kw("a", pr.clone()), pos_or_kw("b", pr)]),
            Type::None,
        );
        let f = Type::callable(Signature::params(vec![pos_or_kw("x", Type::Int)]), Type::Int);
        let g = Type::callable(Signature::params(vec![pos_or_kw("y", Type::Int)]), Type::Int);

        let options = InferenceOptions {
            join_strategy: JoinStrategy::Exact,
            ..InferenceOptions::default()
        };
        let args = CallArgs::positional(vec![f.clone(), g.clone()]);
        let outcome = CallInference::new(options, &[], &[]).infer("twice", &twice, &args);
        assert_eq!(outcome.issues.len(), 1);

        // Renamed positionals still share the positional calling convention
        assert!(infer(&twice, CallArgs::positional(vec![f, g])).issues.is_empty());
    }

    #[test]
    fn test_forwarding_inside_scope() {
        let f = Type::callable(Signature::spec("P"), tv("R"));
        let rigid_types = vec!["R".to_string()];
        let rigid_specs = vec!["P".to_string()];
        let inference = CallInference::new(InferenceOptions::default(), &rigid_types, &rigid_specs);

        let forward = CallArgs {
            star: vec![Type::ParamSpecArgs("P".into())],
            double_star: vec![Type::ParamSpecKwargs("P".into())],
            ..CallArgs::default()
        };
        let outcome = inference.infer("f", &f, &forward);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret, tv("R"));

        let outcome = inference.infer("f", &f, &CallArgs::positional(vec![Type::Int]));
        assert_eq!(outcome.issues.len(), 1);
        assert!(matches!(outcome.issues[0].kind, ErrorKind::CallSiteMismatch { .. }));
    }

    #[test]
    fn test_prefix_solving() {
        // def call(fn: Callable[P, R], /, *args: P.args, **kwargs: P.kwargs) -> R
        let callee = Type::callable(
            Signature::Spec {
                prefix: ParamList::from_vec(vec![Parameter::positional_only(Type::callable(
                    Signature::spec("P"),
                    tv("R"),
                ))]),
                var: "P".into(),
            },
            tv("R"),
        );

        let good =
            CallArgs::positional(vec![x_int_y_str(), Type::Int]).with_keyword("y", Type::Str);
        let outcome = infer(&callee, good);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret, Type::Bool);

        let bad = CallArgs::positional(vec![x_int_y_str(), Type::Str, Type::Str]);
        let outcome = infer(&callee, bad);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].at, ArgRef::Arg(ArgSource::Positional(1)));
    }

    #[test]
    fn test_concatenated_prefix_stripped() {
        // def with_request(f: Callable[[int], P, R]) in Spec form: Callable[Spec{[int], P}, R]
        let pattern = Type::callable(
            Signature::Spec {
                prefix: ParamList::from_vec(vec![Parameter::positional_only(Type::Int)]),
                var: "P".into(),
            },
            tv("R"),
        );
        let deco = Type::callable(
            Signature::params(vec![pos_or_kw("f", pattern)]),
            Type::callable(Signature::spec("P"), tv("R")),
        );
        let handler = Type::callable(
            Signature::params(vec![pos_or_kw("request", Type::Int), pos_or_kw("name", Type::Str)]),
            Type::Str,
        );

        let outcome = infer(&deco, CallArgs::positional(vec![handler]));
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret.to_string(), "(name: str) -> str");
    }

    #[test]
    fn test_argument_types_checked() {
        let outcome = infer(&x_int_y_str(), CallArgs::positional(vec![Type::Str, Type::Str]));
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(
            outcome.issues[0].kind,
            ErrorKind::InvalidArgType {
                param: "x".into(),
                expected: "int".into(),
                found: "str".into(),
            }
        );
    }

    #[test]
    fn test_unsolved_defaults() {
        let outcome = infer(&decorator(), CallArgs::positional(vec![Type::Any]));
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.ret.to_string(), "(...) -> Any");
    }
}
