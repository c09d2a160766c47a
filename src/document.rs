//! Lines, the symbol table and incremental propagation.
//!
//! A [`Document`] owns every piece of shared state: the lines in order, the
//! [`Environment`] and the [`SymbolGraph`]. All mutation goes through the
//! Edit and Propagate transitions below, one action at a time.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::{
    ast::{Stmt, StmtKind},
    diagnostics::{Diagnostic, ErrorCode, Provenance, Severity, TokenMarks},
    environment::{Environment, LineId},
    graph::SymbolGraph,
    lexer::{tokenize, Token},
    linear::LpSolver,
    network::{Dijkstra, PathFinder},
    parser::parse_line,
    runtime::{Resolution, Resolver, Settings},
    stdlib::{Catalog, MacroContext, OutputSink},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Unresolved,
    Resolved,
    Error,
}

#[derive(Debug)]
struct Line {
    id: LineId,
    text: String,
    tokens: Vec<Token>,
    parsed: Result<Stmt, Diagnostic>,
    state: LineState,
    resolution: Resolution,
}

impl Line {
    fn new(id: LineId, text: String) -> Self {
        let (tokens, parsed) = parse(&text);
        Self {
            id,
            text,
            tokens,
            parsed,
            state: LineState::Unresolved,
            resolution: Resolution::default(),
        }
    }

    fn set_text(&mut self, text: String) {
        let (tokens, parsed) = parse(&text);
        self.text = text;
        self.tokens = tokens;
        self.parsed = parsed;
        self.state = LineState::Unresolved;
    }

    fn declared_names(&self) -> Vec<String> {
        match &self.parsed {
            Ok(stmt) => stmt.declared_names().into_iter().map(String::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn is_macro(&self) -> bool {
        matches!(
            &self.parsed,
            Ok(Stmt {
                kind: StmtKind::Macro(_),
                ..
            })
        )
    }
}

/// A request to change the document, applied strictly one at a time.
#[derive(Debug, Clone)]
enum Action {
    Insert { at: usize, id: LineId, text: String },
    Edit { id: LineId, text: String },
    Remove { id: LineId },
}

/// What a line currently shows, with suppressed severities filtered out.
#[derive(Debug)]
pub struct Outcome<'a> {
    pub line: LineId,
    pub text: &'a str,
    pub state: LineState,
    pub value: Option<&'a Value>,
    pub error: Option<&'a Diagnostic>,
    pub warnings: Vec<&'a Diagnostic>,
    pub recommendations: Vec<&'a Diagnostic>,
    pub marks: &'a TokenMarks,
}

pub struct Document {
    lines: Vec<Line>,
    next_id: u64,
    env: Environment,
    graph: SymbolGraph,
    catalog: Catalog,
    settings: Settings,
    pending: IndexMap<LineId, String>,
    buffer: VecDeque<Action>,
    propagating: bool,
    resolutions: usize,
    solver: Option<Box<dyn LpSolver>>,
    paths: Box<dyn PathFinder>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            lines: Vec::new(),
            next_id: 1,
            env: Environment::new(),
            graph: SymbolGraph::new(),
            catalog: Catalog::standard(),
            settings,
            pending: IndexMap::new(),
            buffer: VecDeque::new(),
            propagating: false,
            resolutions: 0,
            solver: None,
            paths: Box::new(Dijkstra),
        }
    }

    /// Replaces the catalog. Existing lines are not re-resolved.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Display settings may change at any time; caps apply to later passes.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn set_solver(&mut self, solver: Box<dyn LpSolver>) {
        self.solver = Some(solver);
    }

    pub fn set_path_finder(&mut self, paths: Box<dyn PathFinder>) {
        self.paths = paths;
    }

    /// Appends every line of `source`.
    pub fn load(&mut self, source: &str) -> Vec<LineId> {
        source.lines().map(|line| self.push(line)).collect()
    }

    pub fn push(&mut self, text: impl Into<String>) -> LineId {
        let at = self.lines.len();
        self.insert(at, text)
    }

    /// Inserts a line before position `at` (clamped to the end).
    pub fn insert(&mut self, at: usize, text: impl Into<String>) -> LineId {
        let id = LineId(self.next_id);
        self.next_id += 1;
        self.submit(Action::Insert {
            at,
            id,
            text: text.into(),
        });
        id
    }

    /// Replaces the text of a line. Returns `false` for an unknown line.
    pub fn edit(&mut self, id: LineId, text: impl Into<String>) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.submit(Action::Edit {
            id,
            text: text.into(),
        });
        true
    }

    pub fn remove(&mut self, id: LineId) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.submit(Action::Remove { id });
        true
    }

    /// Records an edit without applying it. Later edits to the same line
    /// replace earlier ones until [`Document::flush`].
    pub fn queue_edit(&mut self, id: LineId, text: impl Into<String>) {
        self.pending.insert(id, text.into());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Applies every queued edit, one propagation pass each.
    pub fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (id, text) in pending {
            self.buffer.push_back(Action::Edit { id, text });
        }
        self.drain();
    }

    fn submit(&mut self, action: Action) {
        self.buffer.push_back(action);
        if self.propagating {
            debug!("propagation in progress; buffered {} actions", self.buffer.len());
            return;
        }
        self.drain();
    }

    fn drain(&mut self) {
        if self.propagating {
            return;
        }
        while let Some(action) = self.buffer.pop_front() {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: Action) {
        self.propagating = true;
        self.resolutions = 0;
        match action {
            Action::Insert { at, id, text } => {
                debug!("insert {id} at {at}: {text}");
                let at = at.min(self.lines.len());
                self.lines.insert(at, Line::new(id, text));
                self.sync_order();
                let changed = self.resolve_line(id);
                self.propagate(id, changed);
            }
            Action::Edit { id, text } => {
                if let Some(at) = self.position(id) {
                    debug!("edit {id}: {text}");
                    self.lines[at].set_text(text);
                    let changed = self.resolve_line(id);
                    self.propagate(id, changed);
                }
            }
            Action::Remove { id } => {
                if let Some(at) = self.position(id) {
                    debug!("remove {id}");
                    let imported = self.env.imported_by(id);
                    self.lines.remove(at);
                    self.graph.remove_line(id);
                    let mut changed = self.env.remove_line(id);
                    self.sync_order();
                    for module in imported {
                        self.expand_module(&module, &mut changed);
                    }
                    self.propagate(id, changed);
                }
            }
        }
        self.propagating = false;
    }

    fn sync_order(&mut self) {
        let order: Vec<LineId> = self.lines.iter().map(|line| line.id).collect();
        self.env.set_order(&order);
    }

    fn position(&self, id: LineId) -> Option<usize> {
        self.lines.iter().position(|line| line.id == id)
    }

    fn expand_module(&self, module: &str, changed: &mut Vec<String>) {
        push_unique(changed, module);
        if let Some(found) = self.catalog.module(module) {
            for name in found.names() {
                push_unique(changed, name);
            }
        }
    }

    /// Re-resolves one line and commits its bindings. Returns the names
    /// whose value changed.
    fn resolve_line(&mut self, id: LineId) -> Vec<String> {
        let Some(at) = self.position(id) else {
            return Vec::new();
        };
        self.resolutions += 1;
        assert!(
            self.resolutions <= self.settings.propagation_cap,
            "propagation exceeded {} line resolutions",
            self.settings.propagation_cap
        );

        let before_names: Vec<String> = self.graph.declared(id).to_vec();
        let before: Vec<(String, Option<Value>)> = before_names
            .iter()
            .map(|name| (name.clone(), self.env.site_value(id, name).cloned()))
            .collect();
        let imported_before = self.env.imported_by(id);
        self.env.remove_line(id);

        let line = &self.lines[at];
        let mut resolution = match &line.parsed {
            Ok(stmt) => Resolver::new(
                &self.env,
                &self.catalog,
                &self.settings,
                id,
                &line.text,
                &line.tokens,
            )
            .resolve(stmt, None),
            Err(error) => failed(error.clone(), line.tokens.len()),
        };

        let mut declared = line.declared_names();
        for declaration in &resolution.declarations {
            push_unique(&mut declared, &declaration.name);
        }
        self.graph.insert_line(id, &declared, &resolution.references);

        let cycle = declared
            .iter()
            .find_map(|name| self.graph.cycle_from(name).map(|path| (name.clone(), path)));
        let mut committed_imports = Vec::new();
        if let Some((name, path)) = cycle {
            let path = path.join(" -> ");
            warn!("line {id}: {name} rejected, circular through {path}");
            let span = match &line.parsed {
                Ok(stmt) => stmt.span,
                Err(_) => Default::default(),
            };
            let error = Diagnostic::error(ErrorCode::CircularDependency)
                .with_str(name)
                .with_str(path)
                .with_span(span)
                .with_provenance(&Provenance::tokens(0..line.tokens.len()));
            resolution = Resolution {
                references: resolution.references,
                ..failed(error, line.tokens.len())
            };
        } else if resolution.is_ok() {
            for declaration in &resolution.declarations {
                self.env
                    .define(id, &declaration.name, declaration.kind, declaration.value.clone());
            }
            for module in &resolution.imports {
                self.env.import(id, module);
            }
            committed_imports = resolution.imports.clone();
        }

        let mut changed = Vec::new();
        for (name, old) in &before {
            if differs(old.as_ref(), self.env.site_value(id, name)) {
                push_unique(&mut changed, name);
            }
        }
        for name in &declared {
            let known = before.iter().any(|(old, _)| old == name);
            if !known && self.env.site_value(id, name).is_some() {
                push_unique(&mut changed, name);
            }
        }
        for module in imported_before.iter().filter(|m| !committed_imports.contains(m)) {
            self.expand_module(module, &mut changed);
        }
        for module in committed_imports.iter().filter(|m| !imported_before.contains(m)) {
            self.expand_module(module, &mut changed);
        }

        let line = &mut self.lines[at];
        line.state = if resolution.error.is_some() {
            LineState::Error
        } else {
            LineState::Resolved
        };
        line.resolution = resolution;
        trace!("line {id}: changed {changed:?}");
        changed
    }

    /// Breadth-first re-resolution of every line reading a changed name.
    /// Lines whose bindings come out unchanged stop the fan-out.
    fn propagate(&mut self, origin: LineId, changed: Vec<String>) {
        let mut queue: VecDeque<LineId> = VecDeque::new();
        let mut queued: HashSet<LineId> = HashSet::new();
        self.enqueue(origin, &changed, &mut queue, &mut queued);
        let mut wave = 0;
        while let Some(id) = queue.pop_front() {
            queued.remove(&id);
            wave += 1;
            trace!("propagation step {wave}: {id}");
            let changed = self.resolve_line(id);
            if !changed.is_empty() {
                self.enqueue(id, &changed, &mut queue, &mut queued);
            }
        }
        if wave > 0 {
            debug!("propagation from {origin} re-resolved {wave} lines");
        }
    }

    fn enqueue(
        &self,
        source: LineId,
        changed: &[String],
        queue: &mut VecDeque<LineId>,
        queued: &mut HashSet<LineId>,
    ) {
        let mut readers: Vec<(usize, LineId)> = changed
            .iter()
            .flat_map(|name| self.graph.readers(name))
            .filter(|reader| *reader != source)
            .filter_map(|reader| self.position(reader).map(|at| (at, reader)))
            .collect();
        readers.sort();
        readers.dedup();
        for (_, reader) in readers {
            if queued.insert(reader) {
                queue.push_back(reader);
            }
        }
    }

    /// Runs every macro line, in document order, writing to `sink`.
    /// Returns how many macros ran.
    pub fn execute(&mut self, sink: &mut dyn OutputSink) -> usize {
        let mut ran = 0;
        for at in 0..self.lines.len() {
            let line = &self.lines[at];
            if !line.is_macro() {
                continue;
            }
            let Ok(stmt) = &line.parsed else { continue };
            let mut context = MacroContext {
                sink: &mut *sink,
                solver: self.solver.as_deref(),
                paths: self.paths.as_ref(),
            };
            let resolution = Resolver::new(
                &self.env,
                &self.catalog,
                &self.settings,
                line.id,
                &line.text,
                &line.tokens,
            )
            .resolve(stmt, Some(&mut context));
            ran += 1;
            let line = &mut self.lines[at];
            line.state = if resolution.error.is_some() {
                LineState::Error
            } else {
                LineState::Resolved
            };
            line.resolution = resolution;
        }
        ran
    }

    /// The composite value currently bound to `name`.
    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.env.get(name)
    }

    pub fn outcome(&self, id: LineId) -> Option<Outcome<'_>> {
        let line = self.lines.iter().find(|line| line.id == id)?;
        let resolution = &line.resolution;
        let warnings = if self.settings.suppress_warnings {
            Vec::new()
        } else {
            resolution.warnings.iter().collect()
        };
        let recommendations = if self.settings.suppress_recommendations {
            Vec::new()
        } else {
            resolution.recommendations.iter().collect()
        };
        Some(Outcome {
            line: id,
            text: &line.text,
            state: line.state,
            value: resolution.value.as_ref(),
            error: resolution.error.as_ref(),
            warnings,
            recommendations,
            marks: &resolution.marks,
        })
    }

    pub fn ids(&self) -> Vec<LineId> {
        self.lines.iter().map(|line| line.id).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self, id: LineId) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.id == id)
            .map(|line| line.text.as_str())
    }

    /// The line at 0-based position `at`.
    pub fn line_at(&self, at: usize) -> Option<LineId> {
        self.lines.get(at).map(|line| line.id)
    }

    /// Names the line at `id` reads, as recorded in the dependency graph.
    pub fn references(&self, id: LineId) -> &[String] {
        self.graph.references(id)
    }

    /// Names `name` depends on directly.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.graph.dependencies(name).map(String::from).collect()
    }

    /// Line resolutions performed by the most recent action, including the
    /// edited line itself.
    pub fn last_pass(&self) -> usize {
        self.resolutions
    }

    pub fn is_propagating(&self) -> bool {
        self.propagating
    }
}

/// Lexing failures leave the line without tokens.
fn parse(text: &str) -> (Vec<Token>, Result<Stmt, Diagnostic>) {
    match tokenize(text) {
        Ok(tokens) => {
            let parsed = parse_line(text, &tokens);
            (tokens, parsed)
        }
        Err(error) => (Vec::new(), Err(error)),
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_string());
    }
}

fn differs(before: Option<&Value>, after: Option<&Value>) -> bool {
    match (before, after) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.equals(b, false, true),
        _ => true,
    }
}

fn failed(error: Diagnostic, tokens: usize) -> Resolution {
    let mut marks = TokenMarks::new(tokens);
    marks.mark(&error.marked, Severity::Error);
    Resolution {
        error: Some(error),
        marks,
        ..Resolution::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(document: &Document, name: &str) -> f64 {
        document
            .value_of(name)
            .and_then(|value| value.as_number())
            .unwrap_or_else(|| panic!("{name} is not a number"))
    }

    #[test]
    fn edits_propagate_to_readers() {
        let mut document = Document::new();
        let x = document.push("x = 5");
        document.push("y = x + 1");
        assert_eq!(number(&document, "y"), 6.0);
        document.edit(x, "x = 10");
        assert_eq!(number(&document, "y"), 11.0);
    }

    #[test]
    fn unrelated_lines_are_not_re_resolved() {
        let mut document = Document::new();
        let x = document.push("x = 5");
        document.push("y = x + 1");
        document.push("z = 3");
        document.edit(x, "x = 6");
        assert_eq!(document.last_pass(), 2);
    }

    #[test]
    fn unchanged_values_stop_the_fan_out() {
        let mut document = Document::new();
        let x = document.push("x = 5");
        document.push("y = x > 0");
        document.push("z = y ? 1 : 2");
        document.edit(x, "x = 6");
        assert_eq!(document.last_pass(), 2);
    }

    #[test]
    fn a_later_declaration_repairs_earlier_readers() {
        let mut document = Document::new();
        let y = document.push("y = x * 2");
        assert_eq!(document.outcome(y).map(|o| o.state), Some(LineState::Error));
        document.push("x = 4");
        assert_eq!(document.outcome(y).map(|o| o.state), Some(LineState::Resolved));
        assert_eq!(number(&document, "y"), 8.0);
    }

    #[test]
    fn queued_edits_coalesce() {
        let mut document = Document::new();
        let x = document.push("x = 1");
        document.queue_edit(x, "x = 2");
        document.queue_edit(x, "x = 3");
        assert!(document.has_pending());
        assert_eq!(number(&document, "x"), 1.0);
        document.flush();
        assert!(!document.has_pending());
        assert_eq!(number(&document, "x"), 3.0);
    }
}
