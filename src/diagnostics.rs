use std::{fmt, ops::Range};

use thiserror::Error;

use crate::value::{Kind, Value};

/// Represents a byte span within a single line of source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn join(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Severity of a diagnostic. Ordering follows display precedence:
/// `Error > Warning > Recommendation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Recommendation,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Recommendation => write!(f, "recommendation"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnexpectedToken,
    UnexpectedEnd,
    UnbalancedGrouping,
    UnbalancedFallback,
    UnmatchedTernary,
    EmptyTernaryBranch,
    UnresolvedExpression,
    UnknownName,
    UnknownFunction,
    UnknownModule,
    UnknownType,
    UnknownUnit,
    InvalidOperand,
    InvalidUnaryOperand,
    InvalidCast,
    DivisionByZero,
    ModuloByZero,
    IndexOutOfBounds,
    IndexZero,
    IndexNotInteger,
    NamedIndexMissing,
    SliceStep,
    SliceOrder,
    NotIndexable,
    NotCallable,
    NotIterable,
    FilterNotBoolean,
    ConditionNotBoolean,
    DimensionMismatch,
    MatrixNotSquare,
    MatrixNotRectangular,
    MatrixSingular,
    UnitMismatch,
    NonIntegerExponent,
    NonLinear,
    DisjunctiveBound,
    MissingArgument,
    TooManyArguments,
    ArgumentType,
    MissingPipeValue,
    PipeTarget,
    DuplicateDeclaration,
    CircularDependency,
    ReservedName,
    AssertionFailed,
    AssertionNotBoolean,
    TypeDeclaration,
    AppendTarget,
    SpreadTooLarge,
    SpreadNotList,
    RangeTooLarge,
    InvalidStep,
    ConstructorBody,
    MacroPlacement,
    RecursionLimit,
    InvalidDate,
    DateOutOfRange,
    OffsetOverflow,
    UnitOverflow,
    EmptyCollection,
    TooFewValues,
    MathDomain,
    NoSolver,
    Infeasible,
    UnknownNode,
}

impl ErrorCode {
    pub fn template(self) -> &'static str {
        use ErrorCode::*;
        match self {
            UnexpectedToken => "unexpected %s",
            UnexpectedEnd => "expression ends unexpectedly, expected %s",
            UnbalancedGrouping => "unbalanced %s",
            UnbalancedFallback => "every `fa` needs a matching `fo` after it",
            UnmatchedTernary => "`?` has no matching `:`",
            EmptyTernaryBranch => "the %s branch of `?:` is empty",
            UnresolvedExpression => "expression does not resolve to a single value: %s",
            UnknownName => "%n is not defined",
            UnknownFunction => "no function or macro named %s",
            UnknownModule => "no module named %s",
            UnknownType => "no type named %s",
            UnknownUnit => "unknown unit %s",
            InvalidOperand => "cannot apply %s to %t and %t",
            InvalidUnaryOperand => "cannot apply unary %s to %t",
            InvalidCast => "%n cannot be cast to %t",
            DivisionByZero => "division of %n by zero",
            ModuloByZero => "modulo of %n by zero",
            IndexOutOfBounds => "index %n is out of bounds for length %s",
            IndexZero => "indices start at 1; 0 is not a valid index",
            IndexNotInteger => "index %n is not an integer",
            NamedIndexMissing => "%n has no index named %s",
            SliceStep => "slice step %n must be an integer of at least 1",
            SliceOrder => "slice start %n is after its end %n",
            NotIndexable => "%n of type %t cannot be indexed",
            NotCallable => "%n is not a function",
            NotIterable => "%n of type %t cannot be iterated",
            FilterNotBoolean => "filter %n must produce a boolean, found %t",
            ConditionNotBoolean => "condition %n must be a boolean, found %t",
            DimensionMismatch => "dimension mismatch: %s",
            MatrixNotSquare => "%s requires a square matrix",
            MatrixNotRectangular => "%s requires a rectangular matrix",
            MatrixSingular => "matrix %n is singular",
            UnitMismatch => "units of %n and %n are not compatible",
            NonIntegerExponent => "exponent %n of a measurement must be an integer",
            NonLinear => "product of %n and %n is not linear",
            DisjunctiveBound => "bound %n uses `or`, which a linear model cannot express",
            MissingArgument => "%s is missing required parameter %s",
            TooManyArguments => "%s accepts at most %s arguments",
            ArgumentType => "parameter %s of %s expects %t, found %n",
            MissingPipeValue => "`result` is only available after `|>`",
            PipeTarget => "`|>` must be followed by a function call",
            DuplicateDeclaration => "%s is already declared on another line",
            CircularDependency => "%s depends on itself through %s",
            ReservedName => "%s is a reserved name",
            AssertionFailed => "assertion failed: %n",
            AssertionNotBoolean => "assertion must be exactly one boolean, found %t",
            TypeDeclaration => "%n does not satisfy the declared type %t",
            AppendTarget => "cannot append to %n of type %t",
            SpreadTooLarge => "cannot spread %n: %s elements exceed the limit of %s",
            SpreadNotList => "only vectors can be spread, found %t",
            RangeTooLarge => "constructed vector would exceed %s elements",
            InvalidStep => "step %n must be non-zero",
            ConstructorBody => "%s",
            MacroPlacement => "macro %s must be the whole statement",
            RecursionLimit => "call depth exceeded %s frames in %s",
            InvalidDate => "%s is not a valid date",
            DateOutOfRange => "date arithmetic on %n leaves the supported range",
            OffsetOverflow => "offset arithmetic on %n overflows",
            UnitOverflow => "unit exponents of %n overflow",
            EmptyCollection => "%s of an empty collection",
            TooFewValues => "%s needs at least %s values",
            MathDomain => "%s is undefined for %n",
            NoSolver => "no linear solver is registered",
            Infeasible => "model %n is infeasible: %s",
            UnknownNode => "%n has no node named %s",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    DuplicateNames,
    DuplicateParameter,
    HeterogeneousVector,
    NoNamedIndices,
    ShadowsBuiltin,
    ShortestClause,
    EmptyRange,
    FallbackTaken,
    RaggedMatrix,
    ImplicitNode,
}

impl WarningCode {
    pub fn template(self) -> &'static str {
        use WarningCode::*;
        match self {
            DuplicateNames => "duplicate names %s; names are dropped",
            DuplicateParameter => "parameter %s was given more than once; the first is used",
            HeterogeneousVector => "elements of %n have mixed types; stored as a List",
            NoNamedIndices => "%n has no named indices",
            ShadowsBuiltin => "%s shadows a built-in function",
            ShortestClause => "for clauses have different lengths; using the shortest (%s)",
            EmptyRange => "range from %n to %n with step %n is empty",
            FallbackTaken => "fell back after: %s",
            RaggedMatrix => "rows of %n have different widths",
            ImplicitNode => "edge endpoint %s is not among the listed nodes; it is added",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecommendationCode {
    AlreadyImported,
    RedundantCast,
    UnusedParameter,
    PreferQualified,
}

impl RecommendationCode {
    pub fn template(self) -> &'static str {
        use RecommendationCode::*;
        match self {
            AlreadyImported => "module %s is already imported",
            RedundantCast => "%n is already of type %t",
            UnusedParameter => "%s does not take a parameter named %s",
            PreferQualified => "%s is provided by several imported modules; %s is used",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Error(ErrorCode),
    Warning(WarningCode),
    Recommendation(RecommendationCode),
}

impl Code {
    pub fn severity(self) -> Severity {
        match self {
            Code::Error(_) => Severity::Error,
            Code::Warning(_) => Severity::Warning,
            Code::Recommendation(_) => Severity::Recommendation,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            Code::Error(code) => code.template(),
            Code::Warning(code) => code.template(),
            Code::Recommendation(code) => code.template(),
        }
    }
}

/// Ordered, disjoint token-index ranges a value was built from. Ranges are
/// kept sorted and coalesced by construction, so a walk over the provenance
/// always visits tokens in strictly increasing source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    ranges: Vec<Range<usize>>,
}

impl Provenance {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn token(index: usize) -> Self {
        Self {
            ranges: vec![index..index + 1],
        }
    }

    pub fn tokens(range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end,
            "provenance range {range:?} is out of order"
        );
        if range.is_empty() {
            return Self::empty();
        }
        Self {
            ranges: vec![range],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn contains(&self, index: usize) -> bool {
        self.ranges.iter().any(|range| range.contains(&index))
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|range| range.clone())
    }

    /// Merges two provenance lists, preserving source order.
    pub fn union(&self, other: &Provenance) -> Provenance {
        let mut merged: Vec<Range<usize>> =
            Vec::with_capacity(self.ranges.len() + other.ranges.len());
        let mut left = self.ranges.iter().peekable();
        let mut right = other.ranges.iter().peekable();
        loop {
            let next = match (left.peek(), right.peek()) {
                (Some(a), Some(b)) => {
                    if a.start <= b.start {
                        left.next()
                    } else {
                        right.next()
                    }
                }
                (Some(_), None) => left.next(),
                (None, Some(_)) => right.next(),
                (None, None) => break,
            };
            let Some(range) = next else { break };
            match merged.last_mut() {
                Some(last) if range.start <= last.end => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range.clone()),
            }
        }
        Provenance { ranges: merged }
    }
}

/// Per-token severity marks and fallback suppression for one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMarks {
    severities: Vec<Option<Severity>>,
    suppressed: Vec<bool>,
}

impl TokenMarks {
    pub fn new(len: usize) -> Self {
        Self {
            severities: vec![None; len],
            suppressed: vec![false; len],
        }
    }

    /// Marks every token of the provenance; a stronger mark is never
    /// overwritten by a weaker one.
    pub fn mark(&mut self, provenance: &Provenance, severity: Severity) {
        for index in provenance.indices() {
            if let Some(slot) = self.severities.get_mut(index) {
                *slot = Some(match *slot {
                    Some(existing) => existing.max(severity),
                    None => severity,
                });
            }
        }
    }

    pub fn suppress(&mut self, provenance: &Provenance) {
        for index in provenance.indices() {
            if let Some(slot) = self.suppressed.get_mut(index) {
                *slot = true;
            }
        }
    }

    pub fn severity(&self, index: usize) -> Option<Severity> {
        self.severities.get(index).copied().flatten()
    }

    pub fn is_suppressed(&self, index: usize) -> bool {
        self.suppressed.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.severities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.severities.is_empty()
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Code,
    pub span: Option<SourceSpan>,
    pub marked: Provenance,
    pub names: Vec<String>,
    pub kinds: Vec<Kind>,
    pub strings: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            span: None,
            marked: Provenance::empty(),
            names: Vec::new(),
            kinds: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self::new(Code::Error(code))
    }

    pub fn warning(code: WarningCode) -> Self {
        Self::new(Code::Warning(code))
    }

    pub fn recommendation(code: RecommendationCode) -> Self {
        Self::new(Code::Recommendation(code))
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn is_error(&self, code: ErrorCode) -> bool {
        self.code == Code::Error(code)
    }

    /// Substitutes a value for the next `%n` and marks its provenance.
    pub fn with_value(mut self, value: &Value) -> Self {
        self.names.push(value.label());
        self.mark_value(value);
        self
    }

    /// Marks a value without substituting it into the message.
    pub fn marking(mut self, value: &Value) -> Self {
        self.mark_value(value);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn with_str(mut self, text: impl Into<String>) -> Self {
        self.strings.push(text.into());
        self
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(match self.span {
            Some(existing) => existing.join(span),
            None => span,
        });
        self
    }

    pub fn with_provenance(mut self, provenance: &Provenance) -> Self {
        self.marked = self.marked.union(provenance);
        self
    }

    /// Attributes a diagnostic that carries no marks yet to the given site.
    pub fn or_at(self, span: SourceSpan, provenance: &Provenance) -> Self {
        if self.marked.is_empty() {
            self.with_span(span).with_provenance(provenance)
        } else {
            self
        }
    }

    fn mark_value(&mut self, value: &Value) {
        self.marked = self.marked.union(&value.meta.provenance);
        let span = value.meta.span;
        self.span = Some(match self.span {
            Some(existing) => existing.join(span),
            None => span,
        });
    }

    pub fn message(&self) -> String {
        render_template(
            self.code.template(),
            &self.names,
            &self.kinds.iter().map(|kind| format!("`{kind}`")).collect::<Vec<_>>(),
            &self.strings,
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity(), self.message())?;
        if let Some(span) = self.span {
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Expands `%n`, `%t` and `%s` placeholders. Each placeholder family draws from
/// its own argument list: when the counts match, arguments are substituted by
/// index; when there are more arguments than placeholders, the last
/// placeholder receives the remaining arguments joined with spaces.
pub fn render_template(
    template: &str,
    names: &[String],
    kinds: &[String],
    strings: &[String],
) -> String {
    let name_slots = template.matches("%n").count();
    let kind_slots = template.matches("%t").count();
    let string_slots = template.matches("%s").count();
    let (mut name_at, mut kind_at, mut string_at) = (0, 0, 0);
    let mut output = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                output.push_str(&slot_text(names, name_at, name_slots));
                name_at += 1;
            }
            Some('t') => {
                chars.next();
                output.push_str(&slot_text(kinds, kind_at, kind_slots));
                kind_at += 1;
            }
            Some('s') => {
                chars.next();
                output.push_str(&slot_text(strings, string_at, string_slots));
                string_at += 1;
            }
            _ => output.push('%'),
        }
    }
    output
}

fn slot_text(args: &[String], slot: usize, slots: usize) -> String {
    if slot + 1 == slots && args.len() > slots {
        return args[slot..].join(" ");
    }
    args.get(slot).cloned().unwrap_or_else(|| "?".to_string())
}

/// Unified error type for the reckon toolchain.
#[derive(Debug, Error)]
pub enum ReckonError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line editor error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
    #[error("{0} line(s) failed to resolve")]
    Failed(usize),
}

pub type Result<T> = std::result::Result<T, ReckonError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placeholders_align_by_index() {
        let text = render_template("%n and %n", &strings(&["a", "b"]), &[], &[]);
        assert_eq!(text, "a and b");
    }

    #[test]
    fn surplus_arguments_join_on_last_placeholder() {
        let text = render_template("values: %n", &strings(&["1", "2", "3"]), &[], &[]);
        assert_eq!(text, "values: 1 2 3");
    }

    #[test]
    fn type_tags_are_quoted() {
        let diag = Diagnostic::error(ErrorCode::InvalidOperand)
            .with_str("+")
            .with_kind(Kind::String)
            .with_kind(Kind::Number);
        assert_eq!(diag.message(), "cannot apply + to `String` and `Number`");
    }

    #[test]
    fn provenance_union_keeps_order_and_coalesces() {
        let a = Provenance::tokens(4..6);
        let b = Provenance::token(1).union(&Provenance::token(6));
        let merged = a.union(&b);
        assert_eq!(merged.ranges(), &[1..2, 4..7]);
        assert_eq!(merged.indices().collect::<Vec<_>>(), vec![1, 4, 5, 6]);
    }

    #[test]
    fn stronger_marks_win() {
        let mut marks = TokenMarks::new(3);
        marks.mark(&Provenance::tokens(0..2), Severity::Error);
        marks.mark(&Provenance::tokens(1..3), Severity::Recommendation);
        assert_eq!(marks.severity(0), Some(Severity::Error));
        assert_eq!(marks.severity(1), Some(Severity::Error));
        assert_eq!(marks.severity(2), Some(Severity::Recommendation));
    }
}
