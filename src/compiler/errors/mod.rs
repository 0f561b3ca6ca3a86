use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceLocation {
    pub fn new(line: usize, col: usize, end_line: usize, end_col: usize) -> Self {
        Self { line, col, end_line, end_col }
    }

    pub fn from_range(start: (usize, usize), end: (usize, usize)) -> Self {
        Self::new(start.0, start.1, end.0, end.1)
    }

    /// Location used for diagnostics that are not tied to a node (I/O, config)
    pub fn unknown() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Note => write!(f, "note"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// `P = ParamSpec("Q")` and friends
    InvalidDeclaration { reason: String },
    /// Variable used outside a callable parameter slot or generic argument
    InvalidUseSite { var: String, context: String },
    InvalidProjection { reason: String },
    UnsatisfiableBinding { var: String, first: String, second: String },
    CallSiteMismatch { callee: String, reason: String },
    InvalidArgType { param: String, expected: String, found: String },
    InvalidReturnType { expected: String, found: String },
    InvalidTypeArguments { target: String, reason: String },
    RevealedType { ty: String },
    SyntaxError { detail: String },
    Io { detail: String },
}

impl ErrorKind {
    /// Stable short code shown next to the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDeclaration { .. } => "paramspec-declaration",
            Self::InvalidUseSite { .. } => "paramspec-use-site",
            Self::InvalidProjection { .. } => "paramspec-projection",
            Self::UnsatisfiableBinding { .. } => "paramspec-binding",
            Self::CallSiteMismatch { .. } => "call-arg",
            Self::InvalidArgType { .. } => "arg-type",
            Self::InvalidReturnType { .. } => "return-value",
            Self::InvalidTypeArguments { .. } => "type-arg",
            Self::RevealedType { .. } => "reveal",
            Self::SyntaxError { .. } => "syntax",
            Self::Io { .. } => "io",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::RevealedType { .. } => Severity::Note,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDeclaration { reason } => {
                write!(f, "Invalid ParamSpec declaration: {}", reason)
            }
            Self::InvalidUseSite { var, context } => {
                write!(f, "ParamSpec '{}' is not allowed {}", var, context)
            }
            Self::InvalidProjection { reason } => {
                write!(f, "Invalid use of ParamSpec components: {}", reason)
            }
            Self::UnsatisfiableBinding { var, first, second } => {
                write!(
                    f,
                    "Cannot bind ParamSpec '{}': {} and {} share no common calling convention",
                    var, first, second
                )
            }
            Self::CallSiteMismatch { callee, reason } => {
                write!(f, "Invalid call to {}: {}", callee, reason)
            }
            Self::InvalidArgType { param, expected, found } => {
                write!(
                    f,
                    "Invalid type for parameter '{}': expected {}, found {}",
                    param, expected, found
                )
            }
            Self::InvalidReturnType { expected, found } => {
                write!(f, "Invalid return type: expected {}, found {}", expected, found)
            }
            Self::InvalidTypeArguments { target, reason } => {
                write!(f, "Invalid type arguments for {}: {}", target, reason)
            }
            Self::RevealedType { ty } => {
                write!(f, "Revealed type is '{}'", ty)
            }
            Self::SyntaxError { detail } => {
                write!(f, "Syntax error: {}", detail)
            }
            Self::Io { detail } => {
                write!(f, "{}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: SourceLocation,
    pub file: String,
    pub suggestions: Vec<String>,
}

impl TypeError {
    pub fn new(kind: ErrorKind, location: SourceLocation) -> Self {
        Self {
            severity: kind.severity(),
            code: kind.code(),
            message: kind.to_string(),
            kind,
            location,
            file: String::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: String) -> Self {
        self.file = file;
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn invalid_declaration(reason: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(ErrorKind::InvalidDeclaration { reason: reason.into() }, location)
    }

    pub fn invalid_use_site(
        var: &str,
        context: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self::new(
            ErrorKind::InvalidUseSite {
                var: var.to_string(),
                context: context.into(),
            },
            location,
        )
    }

    pub fn invalid_projection(reason: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(ErrorKind::InvalidProjection { reason: reason.into() }, location)
    }

    pub fn call_mismatch(
        callee: impl Into<String>,
        reason: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self::new(
            ErrorKind::CallSiteMismatch {
                callee: callee.into(),
                reason: reason.into(),
            },
            location,
        )
    }

    /// Unknown projection owner, with "did you mean" hints drawn from declared variables
    pub fn unknown_param_spec(name: &str, known: &[String], location: SourceLocation) -> Self {
        let mut error = Self::invalid_projection(
            format!("'{}' is not a declared ParamSpec", name),
            location,
        );

        let similar = find_similar_names(name, known, 2);
        if !similar.is_empty() {
            let suggestions = similar
                .iter()
                .take(3)
                .map(|s| format!("Did you mean '{}'?", s))
                .collect();
            error = error.with_suggestions(suggestions);
        }

        error
    }

    /// Render in the requested layout
    pub fn render(&self, show_codes: bool, show_suggestions: bool) -> String {
        let mut out = String::new();
        if !self.file.is_empty() {
            out.push_str(&self.file);
            out.push(':');
        }
        out.push_str(&format!(
            "{}:{}: {}: {}",
            self.location.line, self.location.col, self.severity, self.message
        ));
        if show_codes {
            out.push_str(&format!("  [{}]", self.code));
        }
        if show_suggestions {
            for suggestion in &self.suggestions {
                out.push_str(&format!("\n  hint: {}", suggestion));
            }
        }
        out
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(true, true))
    }
}

/// Error collector for gathering multiple errors during checking
#[derive(Debug)]
pub struct ErrorCollector {
    errors: Vec<TypeError>,
    max_errors: usize,
    dropped: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::with_max(100)
    }

    pub fn with_max(max_errors: usize) -> Self {
        Self {
            errors: Vec::new(),
            max_errors,
            dropped: 0,
        }
    }

    pub fn add(&mut self, error: TypeError) {
        // Notes never count against the cap
        if !error.is_error() || self.error_count() < self.max_errors {
            self.errors.push(error);
        } else {
            self.dropped += 1;
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = TypeError>) {
        for error in errors {
            self.add(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(TypeError::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_error()).count()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.dropped = 0;
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute Levenshtein distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Find similar names for "did you mean" suggestions
pub fn find_similar_names(target: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut results: Vec<(String, usize)> = candidates
        .iter()
        .map(|c| (c.clone(), levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();

    results.sort_by_key(|(_, dist)| *dist);
    results.into_iter().map(|(name, _)| name).collect()
}
