//! The unified error type for the whole expansion pipeline.
//!
//! All errors raised during enforestation, pattern matching, transcription,
//! and driver traversal are unrecoverable at the point they are raised: they
//! propagate straight back to the caller of the top-level entry point and no
//! partial output survives.
//!
//! Construction outside this module goes through the helper functions below
//! rather than open-coded struct literals.

use miette::Diagnostic;
use thiserror::Error;

use crate::syntax::Span;

// =============================================================================
// SECTION 1: CORE ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ExpandError {
    /// Malformed `macro` syntax: missing braces, missing `=>`, mixed
    /// `rule`/`case` clauses, or a missing pattern class after `:`.
    #[error("malformed macro definition: {msg}")]
    #[diagnostic(code(sucrose::macro_definition))]
    MacroDefinition { msg: String, span: Option<Span> },

    /// None of a macro's compiled cases matched the call-site syntax.
    #[error("could not match any cases for macro `{name}`")]
    #[diagnostic(code(sucrose::no_matching_case))]
    NoMatchingCase { name: String, span: Option<Span> },

    /// An internal consistency fault in the hygiene machinery: ellipsis
    /// level mismatches, unequal repetition lengths, or a repeat site with
    /// no non-scalar free variable.
    #[error("hygiene invariant violated: {msg}")]
    #[diagnostic(code(sucrose::hygiene))]
    Hygiene { msg: String },

    /// Constructs intentionally not supported, such as `with` statements.
    #[error("unsupported syntax: {msg}")]
    #[diagnostic(code(sucrose::unsupported))]
    Unsupported { msg: String, span: Option<Span> },

    /// A grammar production was requested but the input does not enforest
    /// to that production.
    #[error("expected {production} but the input does not enforest to it")]
    #[diagnostic(code(sucrose::production_mismatch))]
    ProductionMismatch {
        production: String,
        span: Option<Span>,
    },

    /// A macro kept expanding past the configured depth limit.
    #[error("macro expansion exceeded the depth limit of {limit}")]
    #[diagnostic(code(sucrose::recursion_limit))]
    RecursionLimit { limit: usize },

    /// A defensive internal invariant failed. Signals an implementation bug
    /// rather than a problem with the input program.
    #[error("internal expander fault: {msg}")]
    #[diagnostic(code(sucrose::assertion))]
    Assertion { msg: String },

    /// The injected host evaluator reported a failure, or was required but
    /// not installed.
    #[error("host evaluator error: {msg}")]
    #[diagnostic(code(sucrose::host))]
    Host { msg: String },
}

// =============================================================================
// SECTION 2: CONSTRUCTION HELPERS
// =============================================================================

/// Constructs a macro definition error (malformed `macro` syntax).
pub fn macro_definition_error(msg: impl Into<String>, span: Option<Span>) -> ExpandError {
    ExpandError::MacroDefinition {
        msg: msg.into(),
        span,
    }
}

/// Constructs a no-matching-case error for the named macro.
pub fn no_matching_case(name: impl Into<String>, span: Option<Span>) -> ExpandError {
    ExpandError::NoMatchingCase {
        name: name.into(),
        span,
    }
}

/// Constructs a hygiene invariant violation.
pub fn hygiene_violation(msg: impl Into<String>) -> ExpandError {
    ExpandError::Hygiene { msg: msg.into() }
}

/// Constructs an unsupported-syntax error.
pub fn unsupported_syntax(msg: impl Into<String>, span: Option<Span>) -> ExpandError {
    ExpandError::Unsupported {
        msg: msg.into(),
        span,
    }
}

/// Constructs a production mismatch error for the named production.
pub fn production_mismatch(production: impl Into<String>, span: Option<Span>) -> ExpandError {
    ExpandError::ProductionMismatch {
        production: production.into(),
        span,
    }
}

/// Constructs a recursion limit error.
pub fn recursion_limit(limit: usize) -> ExpandError {
    ExpandError::RecursionLimit { limit }
}

/// Constructs an internal assertion fault.
///
/// These indicate bugs in the expander itself, not problems with the input,
/// and carry a distinct diagnostic code so reporting can separate the two.
pub fn assertion(msg: impl Into<String>) -> ExpandError {
    ExpandError::Assertion { msg: msg.into() }
}

/// Constructs a host evaluator error.
pub fn host_error(msg: impl Into<String>) -> ExpandError {
    ExpandError::Host { msg: msg.into() }
}

// =============================================================================
// SECTION 3: INTROSPECTION
// =============================================================================

impl ExpandError {
    /// Returns a stable semantic code for this error, useful for test
    /// matching independent of user-facing message changes.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExpandError::MacroDefinition { .. } => "MACRO_DEFINITION_ERROR",
            ExpandError::NoMatchingCase { .. } => "NO_MATCHING_CASE",
            ExpandError::Hygiene { .. } => "HYGIENE_VIOLATION",
            ExpandError::Unsupported { .. } => "UNSUPPORTED_SYNTAX",
            ExpandError::ProductionMismatch { .. } => "PRODUCTION_MISMATCH",
            ExpandError::RecursionLimit { .. } => "RECURSION_LIMIT_EXCEEDED",
            ExpandError::Assertion { .. } => "ASSERTION_FAULT",
            ExpandError::Host { .. } => "HOST_ERROR",
        }
    }

    /// The source position implicated by this error, where one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            ExpandError::MacroDefinition { span, .. }
            | ExpandError::NoMatchingCase { span, .. }
            | ExpandError::Unsupported { span, .. }
            | ExpandError::ProductionMismatch { span, .. } => *span,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            no_matching_case("swap", None).error_code(),
            "NO_MATCHING_CASE"
        );
        assert_eq!(assertion("boom").error_code(), "ASSERTION_FAULT");
        assert_eq!(
            recursion_limit(128).error_code(),
            "RECURSION_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn spans_survive_construction() {
        let span = Span {
            start: 3,
            end: 7,
            line: 1,
        };
        let err = macro_definition_error("missing `=>`", Some(span));
        assert_eq!(err.span(), Some(span));
    }
}
