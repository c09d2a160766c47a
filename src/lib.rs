//! Core library for the reckon calculator: a document of lines whose
//! declarations are tracked in a symbol graph and re-resolved incrementally
//! whenever something they read changes.

pub mod ast;
pub mod dates;
pub mod diagnostics;
pub mod document;
pub mod environment;
pub mod graph;
pub mod lexer;
pub mod linear;
pub mod network;
pub mod ops;
pub mod parser;
pub mod plot;
pub mod repl;
pub mod runtime;
pub mod stats;
pub mod stdlib;
pub mod table;
pub mod units;
pub mod value;

pub use diagnostics::{Diagnostic, ReckonError, Severity, SourceSpan};
pub use document::{Document, LineState, Outcome};
pub use environment::LineId;
pub use repl::Repl;
pub use runtime::Settings;
pub use value::{Kind, Value};
