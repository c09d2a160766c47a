use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::Result,
    document::{Document, LineState, Outcome},
    environment::LineId,
    runtime::Settings,
    stdlib::OutputSink,
};

/// Writes macro output straight to stdout.
pub struct Stdout;

impl OutputSink for Stdout {
    fn emit(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Renders a line's value or error followed by its warnings and
/// recommendations, one per row.
pub fn describe(position: usize, outcome: &Outcome<'_>) -> Vec<String> {
    let mut rows = Vec::new();
    let head = match (outcome.state, outcome.error, outcome.value) {
        (_, Some(error), _) => format!("{position:>3} | {}  => {error}", outcome.text),
        (_, None, Some(value)) => format!("{position:>3} | {}  = {value}", outcome.text),
        (LineState::Unresolved, None, None) => format!("{position:>3} | {}  ...", outcome.text),
        _ => format!("{position:>3} | {}", outcome.text),
    };
    rows.push(head);
    for note in outcome.warnings.iter().chain(&outcome.recommendations) {
        rows.push(format!("    | {note}"));
    }
    rows
}

/// Interactive session over a single growing document.
pub struct Repl {
    document: Document,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Repl {
    pub fn new(settings: Settings) -> Self {
        Self {
            document: Document::with_settings(settings),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        loop {
            let prompt = format!("{:>3} > ", self.document.len() + 1);
            match editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if !trimmed.is_empty() {
                        editor.add_history_entry(trimmed).ok();
                    }
                    for row in self.command(&line) {
                        println!("{row}");
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Handles one input line: a `:` command or a new document line.
    pub fn command(&mut self, input: &str) -> Vec<String> {
        let trimmed = input.trim();
        let Some(command) = trimmed.strip_prefix(':') else {
            let id = self.document.push(input);
            return self.show(id);
        };
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        match name {
            "list" => self.list(),
            "edit" => match self.target(rest) {
                Some((id, text)) => {
                    self.document.edit(id, text);
                    self.list()
                }
                None => vec!["usage: :edit LINE TEXT".to_string()],
            },
            "delete" => match self.target(rest) {
                Some((id, _)) => {
                    self.document.remove(id);
                    self.list()
                }
                None => vec!["usage: :delete LINE".to_string()],
            },
            "run" => {
                let ran = self.document.execute(&mut Stdout);
                let mut rows = vec![format!("ran {ran} macros")];
                rows.extend(self.list());
                rows
            }
            "help" => vec![
                ":list              show every line".to_string(),
                ":edit LINE TEXT    replace a line".to_string(),
                ":delete LINE       remove a line".to_string(),
                ":run               execute macro lines".to_string(),
                ":quit              leave".to_string(),
            ],
            other => vec![format!("unknown command :{other}")],
        }
    }

    fn target<'a>(&self, rest: &'a str) -> Option<(LineId, &'a str)> {
        let rest = rest.trim_start();
        let (number, text) = rest.split_once(' ').unwrap_or((rest, ""));
        let position: usize = number.parse().ok()?;
        let id = self.document.line_at(position.checked_sub(1)?)?;
        Some((id, text))
    }

    fn show(&self, id: LineId) -> Vec<String> {
        let position = self
            .document
            .ids()
            .iter()
            .position(|line| *line == id)
            .map_or(0, |at| at + 1);
        self.document
            .outcome(id)
            .map(|outcome| describe(position, &outcome))
            .unwrap_or_default()
    }

    fn list(&self) -> Vec<String> {
        self.document
            .ids()
            .into_iter()
            .enumerate()
            .filter_map(|(at, id)| self.document.outcome(id).map(|o| describe(at + 1, &o)))
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lines_show_their_value() {
        let mut repl = Repl::default();
        let rows = repl.command("x = 2 + 3");
        assert_eq!(rows, vec!["  1 | x = 2 + 3  = 5".to_string()]);
    }

    #[test]
    fn edit_command_updates_readers() {
        let mut repl = Repl::default();
        repl.command("x = 1");
        repl.command("y = x * 10");
        let rows = repl.command(":edit 1 x = 4");
        assert!(rows.iter().any(|row| row.ends_with("= 40")), "{rows:?}");
    }

    #[test]
    fn bad_line_numbers_print_usage() {
        let mut repl = Repl::default();
        assert_eq!(repl.command(":delete 7"), vec!["usage: :delete LINE".to_string()]);
    }
}
