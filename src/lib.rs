//! Sucrose: a hygienic, pattern-based macro expander for C-family token
//! streams.
//!
//! The pipeline runs in stages. Enforestation grows terms at the head of
//! the token stream, applying macros as it finds them. Pattern macros are
//! compiled from `rule` and `case` clauses, matched with leveled pattern
//! environments, and transcribed with repetition unrolling. Hygiene rides
//! on the syntax objects themselves: marks stamped at expansion
//! boundaries, alpha-renames for bindings, and definition contexts for
//! `var` hoisting, resolved on demand by [`resolve`].
//!
//! [`expand_top_level`] is the entry point for whole programs. The caller
//! supplies tokens with delimiters pre-nested and, when `case` or
//! `function` macros are in play, a [`HostEval`] implementation to run the
//! generated transformer programs.

pub use errors::ExpandError;
pub use expander::{expand, expand_top_level, ExpandOptions, Expansion, ExpansionStep};
pub use macros::{HostEval, MacroEnv, SyntaxStore};
pub use syntax::{resolve, Span, Syntax, Token, TokenKind};
pub use terms::{flatten, Term};

pub mod enforest;
pub mod errors;
pub mod expander;
pub mod macros;
pub mod patterns;
pub mod syntax;
pub mod terms;
