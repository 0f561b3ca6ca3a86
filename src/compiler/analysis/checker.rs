//! Module walk
//!
//! [`TypeChecker`] owns the name scopes and drives the individual passes:
//! declarations on assignments, use-site and projection validation on
//! every signature, and call inference on every call expression.

use super::annotations::{slice_elements, AnnotationResolver, NameEnv, Resolved};
use super::constraints::{ConstraintChecker, DeferredConstraints};
use super::declarations::DeclarationValidator;
use super::inference::{ArgRef, CallInference, CallIssue, CallOutcome, InferenceOptions};
use super::projections::{ProjectionPair, ProjectionValidator};
use super::use_sites::{Position, UseSiteValidator};
use crate::compiler::ast::{LineIndex, SourceLocationExt};
use crate::compiler::errors::{ErrorCollector, ErrorKind, SourceLocation, TypeError};
use crate::compiler::frontend::config::CheckConfig;
use crate::compiler::frontend::parse_module;
use crate::compiler::types::{
    ArgSource, CallArgs, ClassInfo, ParamKind, ParamList, Parameter, Signature, SpecialForm,
    Substitution, Symbol,
    Type, TypeContext, TypeParam, TypeParamKind,
};
use rustpython_parser::ast::{
    Arg, Arguments, Constant, ExceptHandler, Expr, ExprAttribute, ExprAwait, ExprCall,
    ExprConstant, ExprList,
    ExprName, ExprStarred, ExprSubscript, ExprTuple, Mod, ModModule, Operator, Ranged, Stmt,
    StmtClassDef, UnaryOp,
};
use rustpython_parser::text_size::TextRange;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Function,
    Class,
    Lambda,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    symbols: HashMap<String, Symbol>,
    /// Variables bound by this scope's signature or class header
    rigid_types: Vec<String>,
    rigid_specs: Vec<String>,
    return_type: Option<Type>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            symbols: HashMap::new(),
            rigid_types: Vec::new(),
            rigid_specs: Vec::new(),
            return_type: None,
        }
    }
}

/// The pieces of `def` and `async def` the checker looks at
struct FunctionParts<'a> {
    name: &'a str,
    args: &'a Arguments,
    body: &'a [Stmt],
    decorators: &'a [Expr],
    returns: Option<&'a Expr>,
    is_async: bool,
}

pub struct TypeChecker {
    config: CheckConfig,
    ctx: Arc<TypeContext>,
    index: LineIndex,
    file: String,
    errors: ErrorCollector,
    scopes: Vec<Scope>,
    /// Classes whose bodies are being checked, innermost last
    classes: Vec<ClassInfo>,
    constraints: Box<dyn ConstraintChecker>,
    /// Fresh variable names handed out at use sites, with the name they replace
    renamed: Vec<(String, String)>,
}

impl NameEnv for TypeChecker {
    fn resolve_name(&self, name: &str) -> Resolved {
        match self.lookup(name) {
            Some(Symbol::ParamSpec(decl)) => Resolved::ParamSpec(decl.name),
            Some(Symbol::TypeVar(decl)) => Resolved::TypeVar(decl.name),
            Some(Symbol::Class(info)) => Resolved::Class(info),
            Some(Symbol::Special(form)) => Resolved::Special(form),
            Some(Symbol::Value(ty)) => Resolved::Value(ty),
            None => SpecialForm::from_builtin(name).map_or(Resolved::Unknown, Resolved::Special),
        }
    }
}

impl TypeChecker {
    pub fn new(source: &str) -> Self {
        Self::with_config(source, CheckConfig::default())
    }

    pub fn with_config(source: &str, config: CheckConfig) -> Self {
        Self {
            config,
            ctx: Arc::new(TypeContext::new()),
            index: LineIndex::new(source),
            file: "<string>".to_string(),
            errors: ErrorCollector::new(),
            scopes: Vec::new(),
            classes: Vec::new(),
            constraints: Box::new(DeferredConstraints),
            renamed: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.errors = ErrorCollector::with_max(max_errors);
        self
    }

    pub fn with_constraints(mut self, constraints: Box<dyn ConstraintChecker>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn context(&self) -> &Arc<TypeContext> {
        &self.ctx
    }

    pub fn errors(&self) -> &[TypeError] {
        self.errors.errors()
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors.into_errors()
    }

    /// Errors beyond the configured maximum
    pub fn dropped(&self) -> usize {
        self.errors.dropped()
    }

    /// Parse and check `source` in one step; a parse failure becomes a single
    /// syntax diagnostic
    #[instrument(skip(self, source), fields(file = %self.file))]
    pub fn check_source(&mut self, source: &str) -> &[TypeError] {
        match parse_module(source) {
            Ok(module) => self.check(&module),
            Err(e) => {
                let (line, col) = self.index.offset_to_position(e.offset);
                self.report(TypeError::new(
                    ErrorKind::SyntaxError { detail: e.message },
                    SourceLocation::new(line, col, line, col),
                ));
                self.errors.errors()
            }
        }
    }

    #[instrument(skip(self, module), fields(file = %self.file))]
    pub fn check(&mut self, module: &Mod) -> &[TypeError] {
        if !self.config.enabled {
            debug!("Checking disabled for file");
            return self.errors.errors();
        }

        if let Mod::Module(ModModule { body, .. }) = module {
            self.check_block(body);
        }

        info!(
            errors = self.errors.error_count(),
            dropped = self.errors.dropped(),
            "Checked module"
        );
        self.errors.errors()
    }

    /// Type of a module-level name after checking
    pub fn type_of(&self, name: &str) -> Option<Type> {
        match self.ctx.lookup(name)? {
            Symbol::Value(ty) => Some(ty),
            Symbol::Class(info) => Some(info.constructor_type()),
            _ => None,
        }
    }

    // Scopes

    fn lookup(&self, name: &str) -> Option<Symbol> {
        self.lookup_scoped(name).map(|(symbol, _)| symbol)
    }

    /// Symbol plus the depth of the scope defining it, `None` at module level
    fn lookup_scoped(&self, name: &str) -> Option<(Symbol, Option<usize>)> {
        // A class body is only visible from directly inside it
        let innermost = self.scopes.len().checked_sub(1);
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            if scope.kind == ScopeKind::Class && Some(depth) != innermost {
                continue;
            }
            if let Some(symbol) = scope.symbols.get(name) {
                return Some((symbol.clone(), Some(depth)));
            }
        }
        self.ctx.lookup(name).map(|symbol| (symbol, None))
    }

    fn define(&mut self, name: impl Into<String>, symbol: Symbol) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.symbols.insert(name.into(), symbol);
            }
            None => self.ctx.define(name, symbol),
        }
    }

    fn in_class_body(&self) -> bool {
        self.scopes.last().map_or(false, |s| s.kind == ScopeKind::Class)
    }

    fn rigid_vars(&self) -> (Vec<String>, Vec<String>) {
        let mut types = Vec::new();
        let mut specs = Vec::new();
        for scope in &self.scopes {
            types.extend(scope.rigid_types.iter().cloned());
            specs.extend(scope.rigid_specs.iter().cloned());
        }
        (types, specs)
    }

    /// Give a name's own variables fresh names where they collide with
    /// variables held rigid by the scopes around the use site
    fn instantiate(&mut self, ty: Type, defined_at: Option<usize>) -> Type {
        let (rigid_types, rigid_specs) = self.rigid_vars();
        if rigid_types.is_empty() && rigid_specs.is_empty() {
            return ty;
        }
        // Scopes around the definition bind the same variables the name mentions
        let outer = match defined_at {
            Some(depth) => &self.scopes[..=depth],
            None => &self.scopes[..0],
        };
        let held_types: Vec<&String> = outer.iter().flat_map(|s| &s.rigid_types).collect();
        let held_specs: Vec<&String> = outer.iter().flat_map(|s| &s.rigid_specs).collect();

        let mut types = Vec::new();
        let mut specs = Vec::new();
        ty.collect_vars(&mut types, &mut specs);
        types.retain(|v| rigid_types.contains(v) && !held_types.contains(&v));
        specs.retain(|v| rigid_specs.contains(v) && !held_specs.contains(&v));
        if types.is_empty() && specs.is_empty() {
            return ty;
        }

        let mut subst = Substitution::new();
        for var in types {
            let fresh = self.fresh_name(&var);
            subst.types.insert(var, Type::TypeVar(fresh));
        }
        for var in specs {
            let fresh = self.fresh_name(&var);
            subst.specs.insert(var, Signature::spec(fresh));
        }
        trace!(ty = %ty, "Renamed variables shadowed by rigid ones");
        ty.substitute(&subst)
    }

    fn fresh_name(&mut self, var: &str) -> String {
        let fresh = format!("{}@{}", var, self.renamed.len() + 1);
        self.renamed.push((fresh.clone(), var.to_string()));
        fresh
    }

    /// Name a variable the way the source wrote it
    fn original_name<'n>(&'n self, var: &'n str) -> &'n str {
        self.renamed
            .iter()
            .find(|(fresh, _)| fresh == var)
            .map_or(var, |(_, original)| original.as_str())
    }

    /// Replace fresh variable names in rendered text, longest first
    fn restore_names(&self, text: String) -> String {
        if !text.contains('@') {
            return text;
        }
        let mut pairs: Vec<&(String, String)> = self.renamed.iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        pairs
            .into_iter()
            .fold(text, |text, (fresh, original)| text.replace(fresh.as_str(), original))
    }

    fn restore_kind(&self, kind: ErrorKind) -> ErrorKind {
        match kind {
            ErrorKind::UnsatisfiableBinding { var, first, second } => {
                ErrorKind::UnsatisfiableBinding {
                    var: self.restore_names(var),
                    first: self.restore_names(first),
                    second: self.restore_names(second),
                }
            }
            ErrorKind::CallSiteMismatch { callee, reason } => ErrorKind::CallSiteMismatch {
                callee,
                reason: self.restore_names(reason),
            },
            ErrorKind::InvalidArgType { param, expected, found } => ErrorKind::InvalidArgType {
                param,
                expected: self.restore_names(expected),
                found: self.restore_names(found),
            },
            other => other,
        }
    }

    fn expected_return(&self) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.kind == ScopeKind::Function)
            .and_then(|s| s.return_type.clone())
    }

    /// Every ParamSpec name visible from here, for suggestions
    fn visible_param_specs(&self) -> Vec<String> {
        let mut names = self.ctx.param_spec_names();
        for scope in &self.scopes {
            for (name, symbol) in &scope.symbols {
                if matches!(symbol, Symbol::ParamSpec(_)) && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    // Reporting

    fn report(&mut self, error: TypeError) {
        let error = error.with_file(self.file.clone());
        self.errors.add(error);
    }

    fn report_all(&mut self, errors: Vec<TypeError>) {
        for error in errors {
            self.report(error);
        }
    }

    fn location(&self, range: TextRange) -> SourceLocation {
        self.index.location(range)
    }

    // Annotations

    fn resolve_annotation(&self, expr: &Expr) -> Type {
        AnnotationResolver::new(self).resolve(expr)
    }

    fn validate_annotation(&mut self, expr: &Expr, position: Position) {
        let errors = UseSiteValidator::new(&*self, &self.index).validate(expr, position);
        self.report_all(errors);
    }

    // Statements

    fn check_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => self.check_function(FunctionParts {
                name: def.name.as_str(),
                args: &def.args,
                body: &def.body,
                decorators: &def.decorator_list,
                returns: def.returns.as_deref(),
                is_async: false,
            }),
            Stmt::AsyncFunctionDef(def) => self.check_function(FunctionParts {
                name: def.name.as_str(),
                args: &def.args,
                body: &def.body,
                decorators: &def.decorator_list,
                returns: def.returns.as_deref(),
                is_async: true,
            }),
            Stmt::ClassDef(class) => self.check_class(class),

            Stmt::Assign(assign) => {
                if let Expr::Call(call) = assign.value.as_ref() {
                    match self.resolve(&call.func) {
                        Resolved::Special(SpecialForm::ParamSpec) => {
                            self.declare_param_spec(&assign.targets, call);
                            return;
                        }
                        Resolved::Special(SpecialForm::TypeVar) => {
                            let decl = DeclarationValidator::new(&*self, &self.index)
                                .type_var(&assign.targets, call);
                            if let Some(decl) = decl {
                                trace!(name = %decl.name, "Declared TypeVar");
                                self.define(decl.name.clone(), Symbol::TypeVar(decl));
                            }
                            return;
                        }
                        _ => {}
                    }
                }
                self.reject_packed_param_specs(&assign.value);

                let ty = self.infer_expr(&assign.value);
                for target in &assign.targets {
                    self.bind_target(target, ty.clone());
                }
            }

            Stmt::AnnAssign(assign) => {
                self.validate_annotation(&assign.annotation, Position::Variable);
                let declared = self.resolve_annotation(&assign.annotation);
                if let Some(value) = &assign.value {
                    self.infer_expr(value);
                }
                if self.in_class_body() {
                    let target = (assign.target.as_ref(), self.classes.last_mut());
                    if let (Expr::Name(ExprName { id, .. }), Some(class)) = target {
                        class.members.insert(id.as_str().to_string(), declared.clone());
                    }
                }
                self.bind_target(&assign.target, declared);
            }

            Stmt::AugAssign(assign) => {
                self.infer_expr(&assign.value);
            }

            Stmt::Return(ret) => {
                let found = match &ret.value {
                    Some(value) => self.infer_expr(value),
                    None => Type::None,
                };
                if !self.config.check_return_types {
                    return;
                }
                if let Some(expected) = self.expected_return() {
                    if !found.is_subtype(&expected) {
                        let range = ret.value.as_ref().map_or(ret.range, |v| v.range());
                        self.report(TypeError::new(
                            ErrorKind::InvalidReturnType {
                                expected: expected.to_string(),
                                found: found.to_string(),
                            },
                            self.location(range),
                        ));
                    }
                }
            }

            Stmt::Expr(expr) => {
                self.infer_expr(&expr.value);
            }

            Stmt::Import(import) => {
                for alias in &import.names {
                    let module = alias.name.as_str();
                    let symbol = match module {
                        "typing" | "typing_extensions" => {
                            Symbol::Special(SpecialForm::TypingModule)
                        }
                        "functools" => Symbol::Special(SpecialForm::FunctoolsModule),
                        _ => Symbol::Value(Type::Any),
                    };
                    // `import a.b` binds `a`
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str().to_string(),
                        None => module.split('.').next().unwrap_or(module).to_string(),
                    };
                    self.define(bound, symbol);
                }
            }

            Stmt::ImportFrom(import) => {
                let module = import.module.as_ref().map(|m| m.as_str()).unwrap_or("");
                for alias in &import.names {
                    let name = alias.name.as_str();
                    if name == "*" {
                        continue;
                    }
                    let form = match module {
                        "typing" | "typing_extensions" => SpecialForm::from_typing(name),
                        "collections.abc" if name == "Callable" => Some(SpecialForm::Callable),
                        "functools" => SpecialForm::from_functools(name),
                        _ => None,
                    };
                    let symbol = form.map_or(Symbol::Value(Type::Any), Symbol::Special);
                    let bound = alias.asname.as_ref().map_or(name, |a| a.as_str());
                    self.define(bound.to_string(), symbol);
                }
            }

            Stmt::If(branch) => {
                self.infer_expr(&branch.test);
                self.check_block(&branch.body);
                self.check_block(&branch.orelse);
            }

            Stmt::While(looped) => {
                self.infer_expr(&looped.test);
                self.check_block(&looped.body);
                self.check_block(&looped.orelse);
            }

            Stmt::For(looped) => {
                let iterable = self.infer_expr(&looped.iter);
                self.bind_target(&looped.target, element_type(&iterable));
                self.check_block(&looped.body);
                self.check_block(&looped.orelse);
            }

            Stmt::AsyncFor(looped) => {
                self.infer_expr(&looped.iter);
                self.bind_target(&looped.target, Type::Any);
                self.check_block(&looped.body);
                self.check_block(&looped.orelse);
            }

            Stmt::With(with) => {
                for item in &with.items {
                    self.infer_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars, Type::Any);
                    }
                }
                self.check_block(&with.body);
            }

            Stmt::AsyncWith(with) => {
                for item in &with.items {
                    self.infer_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars, Type::Any);
                    }
                }
                self.check_block(&with.body);
            }

            Stmt::Try(block) => {
                self.check_block(&block.body);
                for handler in &block.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(name) = &handler.name {
                        self.define(name.as_str().to_string(), Symbol::Value(Type::Any));
                    }
                    self.check_block(&handler.body);
                }
                self.check_block(&block.orelse);
                self.check_block(&block.finalbody);
            }

            Stmt::Raise(raise) => {
                if let Some(exc) = &raise.exc {
                    self.infer_expr(exc);
                }
            }

            Stmt::Assert(assert) => {
                self.infer_expr(&assert.test);
            }

            _ => {}
        }
    }

    fn bind_target(&mut self, target: &Expr, ty: Type) {
        match target {
            Expr::Name(ExprName { id, .. }) => {
                self.define(id.as_str().to_string(), Symbol::Value(ty))
            }
            Expr::Tuple(tuple) => {
                let elements = match ty {
                    Type::Tuple(elements) if elements.len() == tuple.elts.len() => elements,
                    other => vec![element_type(&other); tuple.elts.len()],
                };
                for (elt, ty) in tuple.elts.iter().zip(elements) {
                    self.bind_target(elt, ty);
                }
            }
            Expr::List(list) => {
                let element = element_type(&ty);
                for elt in &list.elts {
                    self.bind_target(elt, element.clone());
                }
            }
            Expr::Starred(ExprStarred { value, .. }) => {
                self.bind_target(value, Type::List(Box::new(Type::Any)))
            }
            _ => {}
        }
    }

    fn declare_param_spec(&mut self, targets: &[Expr], call: &ExprCall) {
        let (decl, errors) = DeclarationValidator::new(&*self, &self.index)
            .with_matching_name(self.config.require_matching_name)
            .validate_param_spec(targets, call);
        self.report_all(errors);

        if let Some(decl) = decl {
            debug!(name = %decl.name, variance = ?decl.variance, "Declared ParamSpec");
            self.define(decl.name.clone(), Symbol::ParamSpec(decl));
        }
    }

    /// `A, B = ParamSpec("A"), ParamSpec("B")` declares nothing
    fn reject_packed_param_specs(&mut self, value: &Expr) {
        let elements = match value {
            Expr::Tuple(ExprTuple { elts, .. }) | Expr::List(ExprList { elts, .. }) => elts,
            _ => return,
        };
        for element in elements {
            match element {
                Expr::Call(call)
                    if self.resolve(&call.func) == Resolved::Special(SpecialForm::ParamSpec) =>
                {
                    self.report(TypeError::invalid_declaration(
                        "a ParamSpec must be assigned to a single plain name",
                        call.source_location(&self.index),
                    ));
                }
                nested => self.reject_packed_param_specs(nested),
            }
        }
    }

    // Functions

    fn check_function(&mut self, def: FunctionParts<'_>) {
        let staticmethod = def
            .decorators
            .iter()
            .any(|d| self.resolve(d) == Resolved::Special(SpecialForm::StaticMethod));
        let is_method = self.in_class_body();
        let receiver = is_method && !staticmethod && has_positional(def.args);

        for arg in all_args(def.args) {
            if let Some(annotation) = &arg.annotation {
                self.validate_annotation(annotation, Position::Parameter);
            }
        }
        if let Some(returns) = def.returns {
            self.validate_annotation(returns, Position::Return);
        }

        let known = self.visible_param_specs();
        let (pair, errors) = ProjectionValidator::new(&*self, &self.index, &known)
            .with_dunder_positional(self.config.dunder_positional)
            .validate(def.args, receiver);
        self.report_all(errors);

        let signature = self.signature_of(def.args, pair.as_ref());
        let declared_return = def.returns.map(|r| self.resolve_annotation(r));
        let outer_return = if def.is_async {
            Type::Any
        } else {
            declared_return.clone().unwrap_or(Type::Any)
        };
        let mut fn_ty = Type::callable(signature.clone(), outer_return);
        debug!(function = def.name, ty = %fn_ty, "Inferred function type");

        self.check_function_body(
            &def,
            &fn_ty,
            &signature,
            pair.as_ref(),
            declared_return,
            receiver,
        );

        let mut transparent = Vec::new();
        for decorator in def.decorators.iter().rev() {
            if let Some(form) = self.transparent_decorator(decorator) {
                transparent.push(form);
                if let Expr::Call(call) = decorator {
                    // Still check the arguments of `wraps(...)`
                    for arg in &call.args {
                        self.infer_expr(arg);
                    }
                }
                continue;
            }
            fn_ty = self.apply_decorator(def.name, decorator, fn_ty);
        }

        if is_method {
            let member = if transparent.contains(&SpecialForm::Property) {
                match &fn_ty {
                    Type::Callable(_, ret) => ret.as_ref().clone(),
                    other => other.clone(),
                }
            } else if receiver {
                drop_receiver(&fn_ty)
            } else {
                fn_ty.clone()
            };

            if let Some(class) = self.classes.last_mut() {
                if def.name == "__init__" {
                    if let Type::Callable(sig, _) = &member {
                        class.constructor = Some(sig.as_ref().clone());
                    }
                }
                class.members.insert(def.name.to_string(), member);
            }
        }

        self.define(def.name.to_string(), Symbol::Value(fn_ty));
    }

    fn check_function_body(
        &mut self,
        def: &FunctionParts<'_>,
        fn_ty: &Type,
        signature: &Signature,
        pair: Option<&ProjectionPair>,
        declared_return: Option<Type>,
        receiver: bool,
    ) {
        let (outer_types, outer_specs) = self.rigid_vars();
        let (mut types, mut specs) = (Vec::new(), Vec::new());
        fn_ty.collect_vars(&mut types, &mut specs);
        if let Some(ret) = &declared_return {
            ret.collect_vars(&mut types, &mut specs);
        }

        let mut scope = Scope::new(ScopeKind::Function);
        scope.rigid_types = types.into_iter().filter(|t| !outer_types.contains(t)).collect();
        scope.rigid_specs = specs.into_iter().filter(|s| !outer_specs.contains(s)).collect();
        scope.return_type = declared_return;

        let receiver_ty = self.classes.last().map(ClassInfo::instance_type);
        let params = match signature {
            Signature::Params(params) => params.clone(),
            _ => ParamList::new(),
        };

        // Parameter names come from the AST, types from the signature built above
        let positional: Vec<&Arg> = def
            .args
            .posonlyargs
            .iter()
            .chain(def.args.args.iter())
            .map(|a| &a.def)
            .collect();
        for (i, arg) in positional.iter().enumerate() {
            let ty = match (&arg.annotation, i, &receiver_ty) {
                (None, 0, Some(receiver_ty)) if receiver => receiver_ty.clone(),
                (Some(annotation), _, _) => self.resolve_annotation(annotation),
                _ => Type::Any,
            };
            scope.symbols.insert(arg.arg.as_str().to_string(), Symbol::Value(ty));
        }
        for arg in &def.args.kwonlyargs {
            let ty = arg.def.annotation.as_ref().map_or(Type::Any, |a| self.resolve_annotation(a));
            scope.symbols.insert(arg.def.arg.as_str().to_string(), Symbol::Value(ty));
        }

        let element = |kind: ParamKind| {
            params
                .iter()
                .find(|p| p.kind == kind)
                .map_or(Type::Any, |p| p.ty.clone())
        };
        if let Some(vararg) = &def.args.vararg {
            let ty = match pair {
                Some(pair) => Type::ParamSpecArgs(pair.var.clone()),
                None => Type::List(Box::new(element(ParamKind::VarPositional))),
            };
            scope.symbols.insert(vararg.arg.as_str().to_string(), Symbol::Value(ty));
        }
        if let Some(kwarg) = &def.args.kwarg {
            let ty = match pair {
                Some(pair) => Type::ParamSpecKwargs(pair.var.clone()),
                None => Type::Dict(Box::new(Type::Str), Box::new(element(ParamKind::VarKeyword))),
            };
            scope.symbols.insert(kwarg.arg.as_str().to_string(), Symbol::Value(ty));
        }

        trace!(
            function = def.name,
            rigid_specs = ?scope.rigid_specs,
            rigid_types = ?scope.rigid_types,
            "Entering function body"
        );
        self.scopes.push(scope);
        self.check_block(def.body);
        self.scopes.pop();
    }

    /// The parameter list a `def` presents to callers
    fn signature_of(&self, args: &Arguments, pair: Option<&ProjectionPair>) -> Signature {
        let annotated = |arg: &Arg| {
            arg.annotation
                .as_ref()
                .map_or(Type::Any, |a| self.resolve_annotation(a))
        };
        let dunder = |name: &str| {
            self.config.dunder_positional && name.starts_with("__") && !name.ends_with("__")
        };

        let mut positional = ParamList::new();
        for arg in &args.posonlyargs {
            let name = arg.def.arg.as_str();
            let mut param = Parameter::named(name, ParamKind::PositionalOnly, annotated(&arg.def));
            param.has_default = arg.default.is_some();
            positional.push(param);
        }
        for arg in &args.args {
            let name = arg.def.arg.as_str();
            let kind = if dunder(name) {
                ParamKind::PositionalOnly
            } else {
                ParamKind::PositionalOrKeyword
            };
            let mut param = Parameter::named(name, kind, annotated(&arg.def));
            param.has_default = arg.default.is_some();
            positional.push(param);
        }

        if let Some(pair) = pair {
            let prefix = positional
                .into_iter()
                .map(|p| Parameter::positional_only(p.ty))
                .collect();
            return Signature::Spec {
                prefix,
                var: pair.var.clone(),
            };
        }

        let mut params = positional;
        if let Some(vararg) = &args.vararg {
            let name = vararg.arg.as_str();
            params.push(Parameter::named(name, ParamKind::VarPositional, annotated(vararg)));
        }
        for arg in &args.kwonlyargs {
            let name = arg.def.arg.as_str();
            let mut param = Parameter::named(name, ParamKind::KeywordOnly, annotated(&arg.def));
            param.has_default = arg.default.is_some();
            params.push(param);
        }
        if let Some(kwarg) = &args.kwarg {
            let name = kwarg.arg.as_str();
            params.push(Parameter::named(name, ParamKind::VarKeyword, annotated(kwarg)));
        }
        Signature::Params(params)
    }

    fn transparent_decorator(&self, decorator: &Expr) -> Option<SpecialForm> {
        let target = match decorator {
            Expr::Call(call) => call.func.as_ref(),
            other => other,
        };
        match self.resolve(target) {
            Resolved::Special(form) if form.is_transparent_decorator() => Some(form),
            _ => None,
        }
    }

    fn apply_decorator(&mut self, function: &str, decorator: &Expr, fn_ty: Type) -> Type {
        let decorator_ty = self.infer_expr(decorator);
        let name = callee_name(decorator);
        let outcome = self.run_inference(&name, &decorator_ty, &CallArgs::positional(vec![fn_ty]));
        let location = decorator.source_location(&self.index);

        for issue in outcome.issues {
            let kind = self.restore_kind(issue.kind);
            self.report(TypeError::new(kind, location.clone()));
        }
        self.check_solved(&name, &outcome.solved, &location);

        debug!(function, decorator = %name, ty = %outcome.ret, "Applied decorator");
        outcome.ret
    }

    // Classes

    fn check_class(&mut self, class: &StmtClassDef) {
        let name = class.name.as_str();
        let mut info = ClassInfo::new(name);
        let mut explicit: Option<Vec<TypeParam>> = None;
        let mut implicit: Vec<TypeParam> = Vec::new();

        for base in &class.bases {
            self.validate_annotation(base, Position::ClassBase);

            let Expr::Subscript(ExprSubscript { value, slice, .. }) = base else {
                continue;
            };
            match self.resolve(value) {
                Resolved::Special(form @ (SpecialForm::Generic | SpecialForm::Protocol)) => {
                    let params = self.declared_type_params(form, slice);
                    if explicit.is_none() {
                        explicit = Some(params);
                    }
                }
                _ => {
                    for param in self.mentioned_type_params(slice) {
                        if !implicit.contains(&param) {
                            implicit.push(param);
                        }
                    }
                }
            }
        }
        for keyword in &class.keywords {
            self.infer_expr(&keyword.value);
        }

        info.type_params = explicit.unwrap_or(implicit);
        debug!(class = name, params = info.type_params.len(), "Declared class");

        // Visible to its own methods
        self.define(name.to_string(), Symbol::Class(info.clone()));

        let mut scope = Scope::new(ScopeKind::Class);
        for param in &info.type_params {
            match param.kind {
                TypeParamKind::TypeVar => scope.rigid_types.push(param.name.clone()),
                TypeParamKind::ParamSpec => scope.rigid_specs.push(param.name.clone()),
            }
        }

        self.classes.push(info);
        self.scopes.push(scope);
        self.check_block(&class.body);
        self.scopes.pop();
        let info = self.classes.pop();

        if let Some(info) = info {
            for decorator in &class.decorator_list {
                self.infer_expr(decorator);
            }
            self.define(name.to_string(), Symbol::Class(info));
        }
    }

    /// `Generic[...]` / `Protocol[...]` arguments: each a distinct TypeVar or ParamSpec
    fn declared_type_params(&mut self, form: SpecialForm, slice: &Expr) -> Vec<TypeParam> {
        let target = match form {
            SpecialForm::Protocol => "Protocol",
            _ => "Generic",
        };
        let mut params: Vec<TypeParam> = Vec::new();
        let mut errors = Vec::new();

        for element in slice_elements(slice) {
            let param = match self.resolve(element) {
                Resolved::TypeVar(name) => TypeParam { name, kind: TypeParamKind::TypeVar },
                Resolved::ParamSpec(name) => TypeParam { name, kind: TypeParamKind::ParamSpec },
                _ => {
                    errors.push(TypeError::new(
                        ErrorKind::InvalidTypeArguments {
                            target: target.to_string(),
                            reason: "every argument must be a TypeVar or a ParamSpec".to_string(),
                        },
                        element.source_location(&self.index),
                    ));
                    continue;
                }
            };
            if params.iter().any(|p| p.name == param.name) {
                errors.push(TypeError::new(
                    ErrorKind::InvalidTypeArguments {
                        target: target.to_string(),
                        reason: format!("'{}' appears more than once", param.name),
                    },
                    element.source_location(&self.index),
                ));
                continue;
            }
            params.push(param);
        }

        self.report_all(errors);
        params
    }

    /// Variables mentioned in the arguments of a subscripted base, in order
    fn mentioned_type_params(&self, slice: &Expr) -> Vec<TypeParam> {
        let resolver = AnnotationResolver::new(self);
        let mut params = Vec::new();

        for element in slice_elements(slice) {
            if let Resolved::ParamSpec(name) = self.resolve(element) {
                params.push(TypeParam { name, kind: TypeParamKind::ParamSpec });
                continue;
            }
            let (mut types, mut specs) = (Vec::new(), Vec::new());
            resolver.resolve(element).collect_vars(&mut types, &mut specs);
            params.extend(types.into_iter().map(|name| TypeParam {
                name,
                kind: TypeParamKind::TypeVar,
            }));
            params.extend(specs.into_iter().map(|name| TypeParam {
                name,
                kind: TypeParamKind::ParamSpec,
            }));
        }
        params
    }

    // Expressions

    fn infer_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Constant(ExprConstant { value, .. }) => match value {
                Constant::None => Type::None,
                Constant::Bool(_) => Type::Bool,
                Constant::Str(_) => Type::Str,
                Constant::Bytes(_) => Type::Bytes,
                Constant::Int(_) => Type::Int,
                Constant::Float(_) => Type::Float,
                _ => Type::Any,
            },

            Expr::Name(ExprName { id, .. }) => match self.lookup_scoped(id.as_str()) {
                Some((Symbol::Value(ty), depth)) => self.instantiate(ty, depth),
                Some((Symbol::Class(info), depth)) => {
                    self.instantiate(info.constructor_type(), depth)
                }
                _ => Type::Any,
            },

            Expr::Call(call) => self.infer_call(call),

            Expr::Attribute(ExprAttribute { value, attr, .. }) => {
                let base = self.infer_expr(value);
                let member = match &base {
                    Type::Generic(name, args) => {
                        self.ctx_class(name).and_then(|c| c.member(attr.as_str(), args))
                    }
                    Type::Class(name) => {
                        self.ctx_class(name).and_then(|c| c.member(attr.as_str(), &[]))
                    }
                    _ => None,
                };
                member.unwrap_or(Type::Any)
            }

            Expr::Lambda(lambda) => {
                let mut scope = Scope::new(ScopeKind::Lambda);
                let mut params = ParamList::new();
                for arg in lambda.args.posonlyargs.iter().chain(lambda.args.args.iter()) {
                    let name = arg.def.arg.as_str();
                    scope.symbols.insert(name.to_string(), Symbol::Value(Type::Any));
                    let mut param =
                        Parameter::named(name, ParamKind::PositionalOrKeyword, Type::Any);
                    param.has_default = arg.default.is_some();
                    params.push(param);
                }
                self.scopes.push(scope);
                let ret = self.infer_expr(&lambda.body);
                self.scopes.pop();
                Type::callable(Signature::Params(params), ret)
            }

            Expr::List(list) => Type::List(Box::new(self.join_elements(&list.elts))),
            Expr::Set(set) => Type::Set(Box::new(self.join_elements(&set.elts))),
            Expr::Tuple(tuple) => {
                Type::Tuple(tuple.elts.iter().map(|e| self.infer_expr(e)).collect())
            }
            Expr::Dict(dict) => {
                let keys: Vec<Type> =
                    dict.keys.iter().flatten().map(|k| self.infer_expr(k)).collect();
                let values: Vec<Type> = dict.values.iter().map(|v| self.infer_expr(v)).collect();
                Type::Dict(Box::new(join_or_any(keys)), Box::new(join_or_any(values)))
            }

            Expr::BoolOp(op) => {
                let types = op.values.iter().map(|v| self.infer_expr(v)).collect();
                Type::union(types)
            }
            Expr::IfExp(branch) => {
                self.infer_expr(&branch.test);
                let body = self.infer_expr(&branch.body);
                let orelse = self.infer_expr(&branch.orelse);
                Type::union(vec![body, orelse])
            }
            Expr::Compare(compare) => {
                self.infer_expr(&compare.left);
                for comparator in &compare.comparators {
                    self.infer_expr(comparator);
                }
                Type::Bool
            }
            Expr::BinOp(binop) => {
                let left = self.infer_expr(&binop.left);
                let right = self.infer_expr(&binop.right);
                binary_result(&left, binop.op, &right)
            }
            Expr::UnaryOp(unary) => {
                let operand = self.infer_expr(&unary.operand);
                match unary.op {
                    UnaryOp::Not => Type::Bool,
                    _ => operand,
                }
            }

            Expr::Subscript(ExprSubscript { value, slice, .. }) => {
                let base = self.infer_expr(value);
                self.infer_expr(slice);
                match base {
                    Type::List(t) => *t,
                    Type::Dict(_, v) => *v,
                    Type::Str => Type::Str,
                    _ => Type::Any,
                }
            }

            Expr::NamedExpr(named) => {
                let ty = self.infer_expr(&named.value);
                self.bind_target(&named.target, ty.clone());
                ty
            }

            Expr::Starred(ExprStarred { value, .. }) | Expr::Await(ExprAwait { value, .. }) => {
                self.infer_expr(value);
                Type::Any
            }

            Expr::JoinedStr(joined) => {
                for value in &joined.values {
                    self.infer_expr(value);
                }
                Type::Str
            }

            _ => Type::Any,
        }
    }

    fn ctx_class(&self, name: &str) -> Option<ClassInfo> {
        match self.lookup(name) {
            Some(Symbol::Class(info)) => Some(info),
            _ => self.classes.iter().rev().find(|c| c.name == name).cloned(),
        }
    }

    fn join_elements(&mut self, elements: &[Expr]) -> Type {
        let types = elements.iter().map(|e| self.infer_expr(e)).collect();
        join_or_any(types)
    }

    fn infer_call(&mut self, call: &ExprCall) -> Type {
        if self.resolve(&call.func) == Resolved::Special(SpecialForm::RevealType) {
            let ty = match call.args.first() {
                Some(arg) => self.infer_expr(arg),
                None => Type::Any,
            };
            let shown = self.restore_names(ty.to_string());
            self.report(TypeError::new(
                ErrorKind::RevealedType { ty: shown },
                call.source_location(&self.index),
            ));
            return ty;
        }

        let callee = self.infer_expr(&call.func);

        let mut args = CallArgs::default();
        for arg in &call.args {
            match arg {
                Expr::Starred(ExprStarred { value, .. }) => {
                    let ty = self.infer_expr(value);
                    args.star.push(ty);
                }
                other => {
                    let ty = self.infer_expr(other);
                    args.positional.push(ty);
                }
            }
        }
        for keyword in &call.keywords {
            let ty = self.infer_expr(&keyword.value);
            match &keyword.arg {
                Some(name) => args.keywords.push((name.as_str().to_string(), ty)),
                None => args.double_star.push(ty),
            }
        }

        let name = callee_name(&call.func);
        let outcome = self.run_inference(&name, &callee, &args);
        let call_location = call.source_location(&self.index);

        for CallIssue { kind, at } in outcome.issues {
            let location = match at {
                ArgRef::Call => call_location.clone(),
                ArgRef::Arg(source) => argument_location(call, &source, &self.index)
                    .unwrap_or_else(|| call_location.clone()),
            };
            let kind = self.restore_kind(kind);
            self.report(TypeError::new(kind, location));
        }
        self.check_solved(&name, &outcome.solved, &call_location);

        outcome.ret
    }

    fn run_inference(&self, name: &str, callee: &Type, args: &CallArgs) -> CallOutcome {
        let (rigid_types, rigid_specs) = self.rigid_vars();
        let options = InferenceOptions {
            join_strategy: self.config.join_strategy,
            check_argument_types: self.config.check_argument_types,
        };
        CallInference::new(options, &rigid_types, &rigid_specs).infer(name, callee, args)
    }

    /// Route solved variables through the bound/variance hook
    fn check_solved(&mut self, callee: &str, solved: &Substitution, location: &SourceLocation) {
        let mut failures = Vec::new();

        for (var, sig) in &solved.specs {
            if let Some(Symbol::ParamSpec(decl)) = self.lookup(self.original_name(var)) {
                if let Err(reason) = self.constraints.check_param_spec(&decl, sig) {
                    failures.push(reason);
                }
            }
        }
        for (var, ty) in &solved.types {
            if let Some(Symbol::TypeVar(decl)) = self.lookup(self.original_name(var)) {
                if let Err(reason) = self.constraints.check_type_var(&decl, ty) {
                    failures.push(reason);
                }
            }
        }

        for reason in failures {
            self.report(TypeError::call_mismatch(callee, reason, location.clone()));
        }
    }
}

fn has_positional(args: &Arguments) -> bool {
    !args.posonlyargs.is_empty() || !args.args.is_empty()
}

fn all_args(args: &Arguments) -> impl Iterator<Item = &Arg> {
    args.posonlyargs
        .iter()
        .chain(args.args.iter())
        .map(|a| &a.def)
        .chain(args.vararg.as_deref())
        .chain(args.kwonlyargs.iter().map(|a| &a.def))
        .chain(args.kwarg.as_deref())
}

/// A method as seen through an instance
fn drop_receiver(fn_ty: &Type) -> Type {
    let Type::Callable(sig, ret) = fn_ty else {
        return fn_ty.clone();
    };
    let sig = match sig.as_ref() {
        Signature::Params(params) if params.first().map_or(false, |p| p.kind.is_positional()) => {
            Signature::Params(params.iter().skip(1).cloned().collect())
        }
        Signature::Spec { prefix, var } if !prefix.is_empty() => Signature::Spec {
            prefix: prefix.iter().skip(1).cloned().collect(),
            var: var.clone(),
        },
        other => other.clone(),
    };
    Type::callable(sig, ret.as_ref().clone())
}

fn element_type(iterable: &Type) -> Type {
    match iterable {
        Type::List(t) | Type::Set(t) => t.as_ref().clone(),
        Type::Dict(k, _) => k.as_ref().clone(),
        Type::Tuple(elements) if !elements.is_empty() => Type::union(elements.clone()),
        Type::Str => Type::Str,
        _ => Type::Any,
    }
}

fn join_or_any(types: Vec<Type>) -> Type {
    if types.is_empty() {
        Type::Any
    } else {
        Type::union(types)
    }
}

fn binary_result(left: &Type, op: Operator, right: &Type) -> Type {
    match (left, op, right) {
        (Type::Str, Operator::Add, Type::Str) => Type::Str,
        (Type::Str, Operator::Mod, _) => Type::Str,
        (Type::Int | Type::Bool, Operator::Div, Type::Int | Type::Bool) => Type::Float,
        (Type::Int | Type::Bool, _, Type::Int | Type::Bool) => Type::Int,
        (Type::Float, _, Type::Int | Type::Float | Type::Bool)
        | (Type::Int | Type::Bool, _, Type::Float) => Type::Float,
        (Type::List(a), Operator::Add, Type::List(b)) if a == b => left.clone(),
        _ => Type::Any,
    }
}

/// Dotted name of a callee, for messages
fn callee_name(expr: &Expr) -> String {
    match expr {
        Expr::Name(ExprName { id, .. }) => id.as_str().to_string(),
        Expr::Attribute(ExprAttribute { value, attr, .. }) => {
            format!("{}.{}", callee_name(value), attr.as_str())
        }
        Expr::Call(call) => callee_name(&call.func),
        _ => "callable".to_string(),
    }
}

fn argument_location(
    call: &ExprCall,
    source: &ArgSource,
    index: &LineIndex,
) -> Option<SourceLocation> {
    match source {
        ArgSource::Positional(n) => call
            .args
            .iter()
            .filter(|a| !matches!(a, Expr::Starred(_)))
            .nth(*n)
            .map(|a| a.source_location(index)),
        ArgSource::Keyword(name) => call
            .keywords
            .iter()
            .find(|k| k.arg.as_ref().map(|a| a.as_str()) == Some(name.as_str()))
            .map(|k| k.value.source_location(index)),
    }
}
