//! Parameter lists and the values a ParamSpec ranges over
//!
//! A [`Signature`] is either a concrete parameter list, a ParamSpec (with
//! optional anonymous leading parameters), or `...`. Three operations drive
//! checking:
//!
//! * [`Signature::bind`] maps call arguments onto a concrete list with Python
//!   binding rules.
//! * [`Signature::common_supertype`] finds the most general list whose every
//!   valid call is valid for both inputs; `None` means no call satisfies both.
//! * [`Signature::is_compatible_with`] decides whether a callable with one
//!   list can stand where another list is expected.

use super::{Substitution, Type};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    pub fn is_positional(self) -> bool {
        matches!(self, ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword)
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly)
    }

    pub fn is_variadic(self) -> bool {
        matches!(self, ParamKind::VarPositional | ParamKind::VarKeyword)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// `None` only for anonymous positional-only parameters
    pub name: Option<String>,
    pub kind: ParamKind,
    pub ty: Type,
    pub has_default: bool,
}

impl Parameter {
    pub fn positional_only(ty: Type) -> Self {
        Self {
            name: None,
            kind: ParamKind::PositionalOnly,
            ty,
            has_default: false,
        }
    }

    pub fn named(name: impl Into<String>, kind: ParamKind, ty: Type) -> Self {
        Self {
            name: Some(name.into()),
            kind,
            ty,
            has_default: false,
        }
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn is_required(&self) -> bool {
        !self.has_default && !self.kind.is_variadic()
    }

    fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("#{}", index + 1),
        }
    }

    fn substitute(&self, subst: &Substitution) -> Parameter {
        Parameter {
            ty: self.ty.substitute(subst),
            ..self.clone()
        }
    }

    fn equivalent(&self, other: &Parameter) -> bool {
        self.kind == other.kind
            && self.has_default == other.has_default
            && self.ty == other.ty
            // Positional-only names are not observable by callers
            && (self.kind == ParamKind::PositionalOnly || self.name == other.name)
    }
}

pub type ParamList = SmallVec<[Parameter; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signature {
    Params(ParamList),
    /// Anonymous leading parameters followed by whatever `var` is bound to
    Spec { prefix: ParamList, var: String },
    /// `...`
    Gradual,
}

/// Shape and types of the arguments at one call site
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Type>,
    pub keywords: Vec<(String, Type)>,
    /// `*iterable` unpackings
    pub star: Vec<Type>,
    /// `**mapping` unpackings
    pub double_star: Vec<Type>,
}

impl CallArgs {
    pub fn positional(args: Vec<Type>) -> Self {
        Self {
            positional: args,
            ..Self::default()
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.keywords.push((name.into(), ty));
        self
    }
}

/// Where an argument sits in the call expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSource {
    Positional(usize),
    Keyword(String),
}

/// One argument matched to the parameter receiving it
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgument {
    pub param: Parameter,
    pub label: String,
    pub arg: Type,
    pub source: ArgSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallMismatch {
    TooManyPositional { expected: usize, found: usize },
    UnexpectedKeyword(String),
    MultipleValues(String),
    PositionalOnlyAsKeyword(String),
    Missing(Vec<String>),
    /// Calls through an in-scope ParamSpec must forward `*args, **kwargs`
    ForwardingRequired { var: String },
    PrefixMismatch { expected: usize, found: usize },
}

impl fmt::Display for CallMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyPositional { expected, found } => write!(
                f,
                "too many positional arguments (expected at most {}, found {})",
                expected, found
            ),
            Self::UnexpectedKeyword(name) => write!(f, "unexpected keyword argument '{}'", name),
            Self::MultipleValues(name) => write!(f, "multiple values for argument '{}'", name),
            Self::PositionalOnlyAsKeyword(name) => {
                write!(f, "positional-only argument '{}' passed by keyword", name)
            }
            Self::Missing(names) => write!(
                f,
                "missing argument{} {}",
                if names.len() == 1 { "" } else { "s" },
                names.iter().map(|n| format!("'{}'", n)).collect::<Vec<_>>().join(", ")
            ),
            Self::ForwardingRequired { var } => write!(
                f,
                "arguments must be forwarded as (*args: {}.args, **kwargs: {}.kwargs)",
                var, var
            ),
            Self::PrefixMismatch { expected, found } => write!(
                f,
                "expected {} leading positional argument{} before *args, found {}",
                expected,
                if *expected == 1 { "" } else { "s" },
                found
            ),
        }
    }
}

impl Signature {
    pub fn params(params: Vec<Parameter>) -> Self {
        Signature::Params(ParamList::from_vec(params))
    }

    pub fn spec(var: impl Into<String>) -> Self {
        Signature::Spec {
            prefix: ParamList::new(),
            var: var.into(),
        }
    }

    pub fn param_spec(&self) -> Option<&str> {
        match self {
            Signature::Spec { var, .. } => Some(var),
            _ => None,
        }
    }

    /// Match arguments against a concrete parameter list
    ///
    /// `Gradual` accepts everything. `Spec` lists are handled by the caller,
    /// which knows whether the variable is in scope.
    pub fn bind(&self, args: &CallArgs) -> Result<Vec<BoundArgument>, CallMismatch> {
        match self {
            Signature::Gradual => Ok(Vec::new()),
            Signature::Spec { var, .. } => {
                Err(CallMismatch::ForwardingRequired { var: var.clone() })
            }
            Signature::Params(params) => bind_params(params, args),
        }
    }

    /// Most general list whose every valid call is valid for both
    pub fn common_supertype(&self, other: &Signature) -> Option<Signature> {
        match (self, other) {
            (Signature::Gradual, s) | (s, Signature::Gradual) => Some(s.clone()),
            (Signature::Params(a), Signature::Params(b)) => {
                common_params(a, b).map(Signature::Params)
            }
            (
                Signature::Spec { prefix: pa, var: va },
                Signature::Spec { prefix: pb, var: vb },
            ) if va == vb && pa.len() == pb.len() => {
                let prefix = pa
                    .iter()
                    .zip(pb.iter())
                    .map(|(a, b)| merge_positional(a, b).map(anonymize))
                    .collect::<Option<ParamList>>()?;
                Some(Signature::Spec {
                    prefix,
                    var: va.clone(),
                })
            }
            _ => None,
        }
    }

    /// Structural equality up to positional-only names
    pub fn equivalent(&self, other: &Signature) -> bool {
        match (self, other) {
            (Signature::Gradual, Signature::Gradual) => true,
            (Signature::Params(a), Signature::Params(b)) => lists_equivalent(a, b),
            (
                Signature::Spec { prefix: pa, var: va },
                Signature::Spec { prefix: pb, var: vb },
            ) => va == vb && lists_equivalent(pa, pb),
            _ => false,
        }
    }

    /// Can a callable with this signature be used where `expected` is required?
    pub fn is_compatible_with(&self, expected: &Signature) -> bool {
        match (self, expected) {
            (Signature::Gradual, _) | (_, Signature::Gradual) => true,
            _ => expected
                .common_supertype(self)
                .map_or(false, |meet| meet.equivalent(expected)),
        }
    }

    pub fn substitute(&self, subst: &Substitution) -> Signature {
        match self {
            Signature::Gradual => Signature::Gradual,
            Signature::Params(params) => {
                Signature::Params(params.iter().map(|p| p.substitute(subst)).collect())
            }
            Signature::Spec { prefix, var } => {
                let prefix: ParamList = prefix.iter().map(|p| p.substitute(subst)).collect();
                match subst.specs.get(var) {
                    None => Signature::Spec {
                        prefix,
                        var: var.clone(),
                    },
                    Some(Signature::Params(params)) => {
                        let params = prefix.into_iter().chain(params.iter().cloned());
                        Signature::Params(params.collect())
                    }
                    Some(Signature::Spec { prefix: inner, var: inner_var }) => Signature::Spec {
                        prefix: prefix.into_iter().chain(inner.iter().cloned()).collect(),
                        var: inner_var.clone(),
                    },
                    Some(Signature::Gradual) if prefix.is_empty() => Signature::Gradual,
                    Some(Signature::Gradual) => {
                        let mut params = prefix;
                        params.push(Parameter::named("args", ParamKind::VarPositional, Type::Any));
                        params.push(Parameter::named("kwargs", ParamKind::VarKeyword, Type::Any));
                        Signature::Params(params)
                    }
                }
            }
        }
    }

    pub fn collect_vars(&self, types: &mut Vec<String>, specs: &mut Vec<String>) {
        let params = match self {
            Signature::Gradual => return,
            Signature::Params(params) => params,
            Signature::Spec { prefix, var } => {
                if !specs.contains(var) {
                    specs.push(var.clone());
                }
                prefix
            }
        };
        for param in params {
            param.ty.collect_vars(types, specs);
        }
    }
}

fn bind_params(params: &[Parameter], args: &CallArgs) -> Result<Vec<BoundArgument>, CallMismatch> {
    let mut bound = Vec::new();
    let mut filled = vec![false; params.len()];

    let positional_slots: Vec<usize> = params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.kind.is_positional())
        .map(|(i, _)| i)
        .collect();
    let var_positional = params.iter().position(|p| p.kind == ParamKind::VarPositional);
    let var_keyword = params.iter().position(|p| p.kind == ParamKind::VarKeyword);

    for (n, arg) in args.positional.iter().enumerate() {
        let idx = match (positional_slots.get(n), var_positional) {
            (Some(&idx), _) => {
                filled[idx] = true;
                idx
            }
            (None, Some(idx)) => idx,
            (None, None) => {
                return Err(CallMismatch::TooManyPositional {
                    expected: positional_slots.len(),
                    found: args.positional.len(),
                })
            }
        };
        bound.push(BoundArgument {
            param: params[idx].clone(),
            label: params[idx].label(idx),
            arg: arg.clone(),
            source: ArgSource::Positional(n),
        });
    }

    for (name, arg) in &args.keywords {
        let target = params
            .iter()
            .position(|p| p.kind.is_keyword() && p.name.as_deref() == Some(name.as_str()));

        let idx = match target {
            Some(idx) if filled[idx] => return Err(CallMismatch::MultipleValues(name.clone())),
            Some(idx) => {
                filled[idx] = true;
                idx
            }
            None => match var_keyword {
                Some(idx) => idx,
                None if params.iter().any(|p| {
                    p.kind == ParamKind::PositionalOnly && p.name.as_deref() == Some(name.as_str())
                }) =>
                {
                    return Err(CallMismatch::PositionalOnlyAsKeyword(name.clone()))
                }
                None => return Err(CallMismatch::UnexpectedKeyword(name.clone())),
            },
        };
        bound.push(BoundArgument {
            param: params[idx].clone(),
            label: name.clone(),
            arg: arg.clone(),
            source: ArgSource::Keyword(name.clone()),
        });
    }

    // Unpacked arguments may supply anything of the matching kind
    let missing: Vec<String> = params
        .iter()
        .enumerate()
        .filter(|(i, p)| p.is_required() && !filled[*i])
        .filter(|(_, p)| {
            let by_star = !args.star.is_empty() && p.kind.is_positional();
            let by_double_star = !args.double_star.is_empty() && p.kind.is_keyword();
            !(by_star || by_double_star)
        })
        .map(|(i, p)| p.label(i))
        .collect();

    if !missing.is_empty() {
        return Err(CallMismatch::Missing(missing));
    }

    Ok(bound)
}

fn anonymize(mut param: Parameter) -> Parameter {
    param.kind = ParamKind::PositionalOnly;
    param.name = None;
    param
}

fn merge_positional(a: &Parameter, b: &Parameter) -> Option<Parameter> {
    let ty = a.ty.meet(&b.ty)?;
    let has_default = a.has_default && b.has_default;

    let same_keyword = a.kind == ParamKind::PositionalOrKeyword
        && b.kind == ParamKind::PositionalOrKeyword
        && a.name == b.name;

    Some(if same_keyword {
        Parameter {
            name: a.name.clone(),
            kind: ParamKind::PositionalOrKeyword,
            ty,
            has_default,
        }
    } else {
        Parameter {
            name: None,
            kind: ParamKind::PositionalOnly,
            ty,
            has_default,
        }
    })
}

fn lists_equivalent(a: &[Parameter], b: &[Parameter]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

fn variadic(params: &[Parameter], kind: ParamKind) -> Option<&Parameter> {
    params.iter().find(|p| p.kind == kind)
}

fn common_params(a: &[Parameter], b: &[Parameter]) -> Option<ParamList> {
    let a_pos: Vec<&Parameter> = a.iter().filter(|p| p.kind.is_positional()).collect();
    let b_pos: Vec<&Parameter> = b.iter().filter(|p| p.kind.is_positional()).collect();
    let a_star = variadic(a, ParamKind::VarPositional);
    let b_star = variadic(b, ParamKind::VarPositional);
    let a_kwargs = variadic(a, ParamKind::VarKeyword);
    let b_kwargs = variadic(b, ParamKind::VarKeyword);

    let mut result = ParamList::new();
    let mut a_rest: Vec<&Parameter> = Vec::new();
    let mut b_rest: Vec<&Parameter> = Vec::new();
    let mut closed = false;

    // Positional slots, index by index, until one side runs out
    for i in 0..a_pos.len().max(b_pos.len()) {
        let (pa, pb) = (a_pos.get(i).copied(), b_pos.get(i).copied());
        if !closed {
            match (pa, pb, a_star, b_star) {
                (Some(pa), Some(pb), _, _) => {
                    result.push(merge_positional(pa, pb)?);
                    continue;
                }
                (Some(pa), None, _, Some(star)) | (None, Some(pa), Some(star), _) => {
                    let mut param = anonymize(pa.clone());
                    param.ty = pa.ty.meet(&star.ty)?;
                    result.push(param);
                    continue;
                }
                _ => closed = true,
            }
        }
        a_rest.extend(pa);
        b_rest.extend(pb);
    }

    normalize_positional(&mut result);

    // Names already filled positionally would receive a second value by keyword
    let merged = result.len();
    let consumed = |pos: &[&Parameter], name: &str| {
        pos.iter()
            .take(merged)
            .any(|p| p.kind == ParamKind::PositionalOrKeyword && p.name.as_deref() == Some(name))
    };

    if let (Some(sa), Some(sb)) = (a_star, b_star) {
        let mut star = sa.clone();
        star.ty = sa.ty.meet(&sb.ty)?;
        result.push(star);
    }

    // Whatever could not be passed positionally must be reachable by keyword
    let a_kw = keyword_candidates(a, a_rest)?;
    let b_kw = keyword_candidates(b, b_rest)?;

    let mut names: Vec<&str> = Vec::new();
    for param in a_kw.iter().chain(b_kw.iter()) {
        if let Some(name) = param.name.as_deref() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    for name in names {
        let pa = a_kw.iter().find(|p| p.name.as_deref() == Some(name)).copied();
        let pb = b_kw.iter().find(|p| p.name.as_deref() == Some(name)).copied();

        let required =
            pa.map_or(false, |p| p.is_required()) || pb.map_or(false, |p| p.is_required());
        let ta = pa.or(a_kwargs).filter(|_| !consumed(&a_pos, name)).map(|p| &p.ty);
        let tb = pb.or(b_kwargs).filter(|_| !consumed(&b_pos, name)).map(|p| &p.ty);

        match (ta, tb) {
            (Some(ta), Some(tb)) => result.push(Parameter {
                name: Some(name.to_string()),
                kind: ParamKind::KeywordOnly,
                ty: ta.meet(tb)?,
                has_default: !required,
            }),
            // One side cannot accept the name at all
            _ if required => return None,
            _ => {}
        }
    }

    if let (Some(ka), Some(kb)) = (a_kwargs, b_kwargs) {
        let mut kwargs = ka.clone();
        kwargs.ty = ka.ty.meet(&kb.ty)?;
        result.push(kwargs);
    }

    Some(result)
}

/// Keyword-reachable leftovers; a required positional-only leftover has no way in
fn keyword_candidates<'a>(
    params: &'a [Parameter],
    rest: Vec<&'a Parameter>,
) -> Option<Vec<&'a Parameter>> {
    let mut out = Vec::new();
    for param in rest {
        match param.kind {
            ParamKind::PositionalOrKeyword => out.push(param),
            _ if param.is_required() => return None,
            _ => {}
        }
    }
    out.extend(params.iter().filter(|p| p.kind == ParamKind::KeywordOnly));
    Some(out)
}

/// Keep the merged positional section a valid Python parameter list
fn normalize_positional(params: &mut ParamList) {
    if let Some(last_only) = params.iter().rposition(|p| p.kind == ParamKind::PositionalOnly) {
        for param in params.iter_mut().take(last_only) {
            param.kind = ParamKind::PositionalOnly;
            param.name = None;
        }
    }
    if let Some(last_required) = params.iter().rposition(|p| !p.has_default) {
        for param in params.iter_mut().take(last_required) {
            param.has_default = false;
        }
    }
}

fn fmt_params(params: &[Parameter], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::new();
    let last_named_only = params
        .iter()
        .rposition(|p| p.kind == ParamKind::PositionalOnly && p.name.is_some());
    let has_var_positional = params.iter().any(|p| p.kind == ParamKind::VarPositional);
    let mut star_written = false;

    for (i, param) in params.iter().enumerate() {
        let default = if param.has_default { " = ..." } else { "" };
        match (param.kind, &param.name) {
            (ParamKind::PositionalOnly, None) => parts.push(format!("{}{}", param.ty, default)),
            (ParamKind::VarPositional, name) => {
                parts.push(format!("*{}: {}", name.as_deref().unwrap_or("args"), param.ty))
            }
            (ParamKind::VarKeyword, name) => {
                parts.push(format!("**{}: {}", name.as_deref().unwrap_or("kwargs"), param.ty))
            }
            (ParamKind::KeywordOnly, Some(name)) => {
                if !has_var_positional && !star_written {
                    parts.push("*".to_string());
                    star_written = true;
                }
                parts.push(format!("{}: {}{}", name, param.ty, default))
            }
            (_, name) => parts.push(format!(
                "{}: {}{}",
                name.as_deref().unwrap_or("_"),
                param.ty,
                default
            )),
        }
        if Some(i) == last_named_only {
            parts.push("/".to_string());
        }
    }

    write!(f, "{}", parts.join(", "))
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Gradual => write!(f, "(...)"),
            Signature::Params(params) => {
                write!(f, "(")?;
                fmt_params(params, f)?;
                write!(f, ")")
            }
            Signature::Spec { prefix, var } => {
                write!(f, "(")?;
                if !prefix.is_empty() {
                    fmt_params(prefix, f)?;
                    write!(f, ", ")?;
                }
                write!(f, "**{})", var)
            }
        }
    }
}
