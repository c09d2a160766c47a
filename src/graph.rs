use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::environment::LineId;

#[derive(Debug, Clone, Default)]
struct LineEdges {
    declared: Vec<String>,
    references: Vec<String>,
}

/// Directed graph over declared names. An edge `definer -> used` exists
/// when a line declaring `definer` read `used` while resolving. A reverse
/// index from each name to the lines that read it drives propagation.
#[derive(Debug, Default)]
pub struct SymbolGraph {
    lines: HashMap<LineId, LineEdges>,
    uses: BTreeMap<String, BTreeMap<String, BTreeSet<LineId>>>,
    readers: BTreeMap<String, BTreeSet<LineId>>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the names `line` declares and the names it read. A line's
    /// own names are kept out of the dependency edges so that recursion
    /// and appends do not count as cycles; they still register as reads.
    pub fn insert_line(&mut self, line: LineId, declared: &[String], references: &[String]) {
        self.remove_line(line);
        for name in references {
            self.readers.entry(name.clone()).or_default().insert(line);
        }
        for definer in declared {
            for used in references.iter().filter(|used| !declared.contains(used)) {
                self.uses
                    .entry(definer.clone())
                    .or_default()
                    .entry(used.clone())
                    .or_default()
                    .insert(line);
            }
        }
        self.lines.insert(
            line,
            LineEdges {
                declared: declared.to_vec(),
                references: references.to_vec(),
            },
        );
    }

    pub fn remove_line(&mut self, line: LineId) {
        let Some(edges) = self.lines.remove(&line) else {
            return;
        };
        for name in &edges.references {
            if let Some(lines) = self.readers.get_mut(name) {
                lines.remove(&line);
                if lines.is_empty() {
                    self.readers.remove(name);
                }
            }
        }
        for definer in &edges.declared {
            let Some(targets) = self.uses.get_mut(definer) else {
                continue;
            };
            targets.retain(|_, lines| {
                lines.remove(&line);
                !lines.is_empty()
            });
            if targets.is_empty() {
                self.uses.remove(definer);
            }
        }
    }

    /// Lines that read `name`.
    pub fn readers(&self, name: &str) -> impl Iterator<Item = LineId> + '_ {
        self.readers.get(name).into_iter().flatten().copied()
    }

    pub fn declared(&self, line: LineId) -> &[String] {
        self.lines
            .get(&line)
            .map(|edges| edges.declared.as_slice())
            .unwrap_or_default()
    }

    pub fn references(&self, line: LineId) -> &[String] {
        self.lines
            .get(&line)
            .map(|edges| edges.references.as_slice())
            .unwrap_or_default()
    }

    /// Names `name` depends on directly.
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.uses
            .get(name)
            .into_iter()
            .flat_map(|targets| targets.keys())
            .map(String::as_str)
    }

    /// A dependency path leading from `name` back to itself, if any.
    pub fn cycle_from(&self, name: &str) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = vec![name.to_string()];
        if self.search(name, name, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn search(
        &self,
        goal: &str,
        current: &str,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        for next in self.dependencies(current) {
            if next == goal {
                path.push(next.to_string());
                return true;
            }
            if !visited.insert(next.to_string()) {
                continue;
            }
            path.push(next.to_string());
            if self.search(goal, next, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_two_line_cycle() {
        let mut graph = SymbolGraph::new();
        graph.insert_line(LineId(1), &names(&["a"]), &names(&["b"]));
        assert!(graph.cycle_from("a").is_none());
        graph.insert_line(LineId(2), &names(&["b"]), &names(&["a"]));
        assert_eq!(graph.cycle_from("b"), Some(names(&["b", "a", "b"])));
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let mut graph = SymbolGraph::new();
        graph.insert_line(LineId(1), &names(&["f"]), &names(&["f", "n"]));
        assert!(graph.cycle_from("f").is_none());
        assert_eq!(graph.readers("f").collect::<Vec<_>>(), vec![LineId(1)]);
    }

    #[test]
    fn removing_a_line_drops_its_edges() {
        let mut graph = SymbolGraph::new();
        graph.insert_line(LineId(1), &names(&["a"]), &names(&["b"]));
        graph.insert_line(LineId(2), &names(&["b"]), &names(&["a"]));
        graph.remove_line(LineId(2));
        assert!(graph.cycle_from("a").is_none());
        assert_eq!(graph.readers("a").count(), 0);
        assert_eq!(graph.readers("b").collect::<Vec<_>>(), vec![LineId(1)]);
    }

    #[test]
    fn shared_definers_keep_edges_until_last_line() {
        let mut graph = SymbolGraph::new();
        graph.insert_line(LineId(1), &names(&["x"]), &names(&["c"]));
        graph.insert_line(LineId(2), &names(&["x"]), &names(&["c"]));
        graph.remove_line(LineId(1));
        assert_eq!(graph.dependencies("x").collect::<Vec<_>>(), vec!["c"]);
        graph.remove_line(LineId(2));
        assert_eq!(graph.dependencies("x").count(), 0);
    }
}
