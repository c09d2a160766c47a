use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, ErrorCode, SourceSpan},
    value::{Array, Value, ValueKind},
};

/// Opaque identity of a document line. Identities are never reused, so a
/// line keeps its id when lines above it are inserted or removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub u64);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a line contributes to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Declare,
    Function,
    /// `x is Variable`; several lines may declare the same variable.
    Variable,
    /// `v << e`; applied on top of the primary declaration in line order.
    Append,
}

impl SiteKind {
    fn is_primary(self) -> bool {
        !matches!(self, SiteKind::Append)
    }
}

#[derive(Debug, Clone)]
pub struct Site {
    pub kind: SiteKind,
    pub value: Value,
}

/// A name together with every line that defines or refines it. The name is
/// undefined exactly when `sites` is empty.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    sites: BTreeMap<LineId, Site>,
}

impl Binding {
    pub fn lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.sites.keys().copied()
    }

    fn primary(&self) -> Option<(LineId, &Site)> {
        self.sites
            .iter()
            .find(|(_, site)| site.kind.is_primary())
            .map(|(line, site)| (*line, site))
    }
}

/// Per-document symbol table. Owned by the document and handed to the
/// resolver for the duration of one statement.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: IndexMap<String, Binding>,
    imports: IndexMap<String, BTreeSet<LineId>>,
    positions: HashMap<LineId, usize>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the document order used to compose multi-site bindings.
    pub fn set_order(&mut self, lines: &[LineId]) {
        self.positions = lines
            .iter()
            .enumerate()
            .map(|(position, line)| (*line, position))
            .collect();
    }

    fn position(&self, line: LineId) -> (usize, LineId) {
        (self.positions.get(&line).copied().unwrap_or(usize::MAX), line)
    }

    /// Checks that `line` may add a site of `kind` for `name`.
    pub fn check(&self, line: LineId, name: &str, kind: SiteKind, span: SourceSpan) -> Result<(), Diagnostic> {
        let Some(binding) = self.bindings.get(name) else {
            return Ok(());
        };
        if !kind.is_primary() {
            return Ok(());
        }
        let conflict = binding.sites.iter().any(|(other, site)| {
            *other != line
                && site.kind.is_primary()
                && !(site.kind == SiteKind::Variable && kind == SiteKind::Variable)
        });
        if conflict {
            return Err(Diagnostic::error(ErrorCode::DuplicateDeclaration)
                .with_str(name)
                .with_span(span));
        }
        Ok(())
    }

    pub fn define(&mut self, line: LineId, name: &str, kind: SiteKind, value: Value) {
        let value = value.named(name).on_line(line);
        self.bindings
            .entry(name.to_string())
            .or_default()
            .sites
            .insert(line, Site { kind, value });
    }

    pub fn import(&mut self, line: LineId, module: &str) {
        self.imports.entry(module.to_string()).or_default().insert(line);
    }

    pub fn is_imported(&self, module: &str) -> bool {
        self.imports.contains_key(module)
    }

    pub fn imports(&self) -> impl Iterator<Item = &str> + '_ {
        self.imports.keys().map(String::as_str)
    }

    /// Modules `line` imports.
    pub fn imported_by(&self, line: LineId) -> Vec<String> {
        self.imports
            .iter()
            .filter(|(_, lines)| lines.contains(&line))
            .map(|(module, _)| module.clone())
            .collect()
    }

    /// Drops every site `line` contributed and returns the affected names.
    /// A binding disappears only once its last site is gone.
    pub fn remove_line(&mut self, line: LineId) -> Vec<String> {
        let mut touched = Vec::new();
        self.bindings.retain(|name, binding| {
            if binding.sites.remove(&line).is_some() {
                touched.push(name.clone());
            }
            !binding.sites.is_empty()
        });
        self.imports.retain(|module, lines| {
            if lines.remove(&line) {
                touched.push(module.clone());
            }
            !lines.is_empty()
        });
        touched
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings
            .get(name)
            .is_some_and(|binding| binding.primary().is_some())
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.bindings.keys().map(String::as_str)
    }

    /// The value `line` itself contributed to `name`.
    pub fn site_value(&self, line: LineId, name: &str) -> Option<&Value> {
        self.bindings
            .get(name)
            .and_then(|binding| binding.sites.get(&line))
            .map(|site| &site.value)
    }

    /// The composite value of `name`: its primary site with every append
    /// site applied in document order.
    pub fn get(&self, name: &str) -> Option<Value> {
        let binding = self.bindings.get(name)?;
        let mut ordered: Vec<(LineId, &Site)> =
            binding.sites.iter().map(|(line, site)| (*line, site)).collect();
        ordered.sort_by_key(|(line, _)| self.position(*line));
        let (primary_line, primary) = ordered
            .iter()
            .find(|(_, site)| site.kind.is_primary())
            .copied()?;
        let appended: Vec<&Value> = ordered
            .iter()
            .filter(|(_, site)| site.kind == SiteKind::Append)
            .map(|(_, site)| &site.value)
            .collect();
        if appended.is_empty() {
            return Some(primary.value.clone());
        }
        let composed = append_all(&primary.value, &appended).unwrap_or_else(|| primary.value.clone());
        let mut composed = composed.named(name).on_line(primary_line);
        composed.meta.span = primary.value.meta.span;
        Some(composed)
    }
}

/// Applies appended values to a vector or matrix. Returns `None` when the
/// base cannot be appended to.
pub fn append_all(base: &Value, appended: &[&Value]) -> Option<Value> {
    let array = base.as_array()?;
    if array.is_matrix() {
        let mut rows: Vec<Vec<Value>> = array
            .items
            .iter()
            .map(|row| row.as_vector().map(|r| r.items.clone()))
            .collect::<Option<_>>()?;
        for value in appended {
            rows.push(value.as_vector()?.items.clone());
        }
        return Array::matrix(rows).map(Value::array);
    }
    let mut items = array.items.clone();
    for value in appended {
        match &*value.kind {
            ValueKind::Array(more) if !more.is_matrix() => items.extend(more.items.iter().cloned()),
            _ => items.push((*value).clone().unnamed()),
        }
    }
    Some(Value::array(Array::vector(items).0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_primary_declarations_conflict() {
        let mut env = Environment::new();
        env.define(LineId(1), "x", SiteKind::Declare, Value::number(1.0));
        let err = env
            .check(LineId(2), "x", SiteKind::Declare, SourceSpan::default())
            .expect_err("declared on line 1");
        assert!(err.is_error(ErrorCode::DuplicateDeclaration));
        assert!(env
            .check(LineId(1), "x", SiteKind::Declare, SourceSpan::default())
            .is_ok());
    }

    #[test]
    fn variables_may_span_lines() {
        let mut env = Environment::new();
        env.define(LineId(1), "x", SiteKind::Variable, Value::variable("x"));
        assert!(env
            .check(LineId(2), "x", SiteKind::Variable, SourceSpan::default())
            .is_ok());
        env.define(LineId(2), "x", SiteKind::Variable, Value::variable("x"));
        env.remove_line(LineId(1));
        assert!(env.contains("x"));
        env.remove_line(LineId(2));
        assert!(!env.contains("x"));
    }

    #[test]
    fn appends_follow_document_order() {
        let mut env = Environment::new();
        env.define(LineId(1), "v", SiteKind::Declare, Value::numbers([1.0]));
        env.define(LineId(3), "v", SiteKind::Append, Value::number(3.0));
        env.define(LineId(2), "v", SiteKind::Append, Value::number(2.0));
        env.set_order(&[LineId(1), LineId(3), LineId(2)]);
        let v = env.get("v").expect("declared");
        assert!(v.equals(&Value::numbers([1.0, 3.0, 2.0]), false, true));
        assert_eq!(v.meta.name.as_deref(), Some("v"));
    }

    #[test]
    fn append_only_binding_is_undefined() {
        let mut env = Environment::new();
        env.define(LineId(2), "v", SiteKind::Append, Value::number(2.0));
        assert!(env.get("v").is_none());
        assert!(!env.contains("v"));
    }
}
