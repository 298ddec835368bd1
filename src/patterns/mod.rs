//! Pattern compilation: turning the raw syntax inside a macro clause's
//! pattern braces into a compiled pattern list the matcher can run.

pub mod matcher;
pub mod transcribe;

use crate::errors::{macro_definition_error, ExpandError};
use crate::syntax::Syntax;

pub use matcher::{match_patterns, Match, MatchBody, MatchOutcome, PatternEnv};
pub use transcribe::{apply_mark_to_env, transcribe};

// =============================================================================
// SECTION 1: PATTERN CLASSES
// =============================================================================

/// What a pattern variable is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    /// Any single token, including a whole delimiter.
    Token,
    /// A literal token.
    Lit,
    /// An identifier token.
    Ident,
    /// A full expression, consumed greedily by enforestation.
    Expr,
    /// A complete `var` statement.
    VarStatement,
    /// A concrete token that must appear verbatim.
    PatternLiteral,
    /// A `$(...)` grouping: the inner patterns match against the input
    /// without consuming a delimiter.
    PatternGroup,
}

impl PatternClass {
    fn from_name(name: &str) -> Option<PatternClass> {
        match name {
            "token" => Some(PatternClass::Token),
            "lit" => Some(PatternClass::Lit),
            "ident" => Some(PatternClass::Ident),
            "expr" => Some(PatternClass::Expr),
            "VariableStatement" => Some(PatternClass::VarStatement),
            _ => None,
        }
    }
}

/// One compiled pattern element.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The syntax this element was compiled from. For variables this is the
    /// `$name` token, and its value keys the pattern environment.
    pub stx: Syntax,
    pub class: PatternClass,
    /// Compiled sub-patterns for delimiters and groups.
    pub inner: Option<Vec<Pattern>>,
    /// Whether an ellipsis follows this element.
    pub repeat: bool,
    /// The separator between repetitions. `" "` means plain juxtaposition.
    pub separator: String,
}

// =============================================================================
// SECTION 2: COMPILATION
// =============================================================================

/// Compiles raw pattern syntax into a pattern list.
///
/// Two shapes consume more than one token: `$x : class` (an annotated
/// variable) and `$ ( ... )` (a group). Ellipses and their optional
/// separator delimiters attach to the element they follow.
pub fn compile(raw: &[Syntax]) -> Result<Vec<Pattern>, ExpandError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let stx = &raw[i];
        let (mut pattern, consumed) = if stx.is_pattern_var() {
            compile_variable(raw, i)?
        } else if stx.is_identifier() && stx.value() == "$" {
            compile_group(raw, i)?
        } else if stx.is_delimiter() {
            let pattern = Pattern {
                stx: stx.clone(),
                class: PatternClass::Token,
                inner: Some(compile(stx.inner())?),
                repeat: false,
                separator: " ".to_string(),
            };
            (pattern, 1)
        } else {
            let pattern = Pattern {
                stx: stx.clone(),
                class: PatternClass::PatternLiteral,
                inner: None,
                repeat: false,
                separator: " ".to_string(),
            };
            (pattern, 1)
        };
        i += consumed;

        // An ellipsis after the element marks it repeating, optionally with
        // a `(sep)` delimiter naming the separator token.
        if raw.get(i).map(|s| s.value()) == Some("...") {
            pattern.repeat = true;
            i += 1;
        } else if let Some(sep) = raw.get(i) {
            if delim_is_separator(sep) && raw.get(i + 1).map(|s| s.value()) == Some("...") {
                pattern.repeat = true;
                pattern.separator = sep.inner()[0].value().to_string();
                i += 2;
            }
        }
        out.push(pattern);
    }
    Ok(out)
}

fn compile_variable(raw: &[Syntax], i: usize) -> Result<(Pattern, usize), ExpandError> {
    let stx = &raw[i];
    let mut class = PatternClass::Token;
    let mut consumed = 1;
    if raw.get(i + 1).map(|s| s.value()) == Some(":") {
        let Some(class_stx) = raw.get(i + 2) else {
            return Err(macro_definition_error(
                format!("missing pattern class after `{} :`", stx.value()),
                Some(stx.span()),
            ));
        };
        class = PatternClass::from_name(class_stx.value()).ok_or_else(|| {
            macro_definition_error(
                format!("unknown pattern class `{}`", class_stx.value()),
                Some(class_stx.span()),
            )
        })?;
        consumed = 3;
    }
    Ok((
        Pattern {
            stx: stx.clone(),
            class,
            inner: None,
            repeat: false,
            separator: " ".to_string(),
        },
        consumed,
    ))
}

fn compile_group(raw: &[Syntax], i: usize) -> Result<(Pattern, usize), ExpandError> {
    let dollar = &raw[i];
    let Some(delim) = raw.get(i + 1).filter(|s| s.is_delimiter()) else {
        return Err(macro_definition_error(
            "`$` in a pattern must be followed by a delimiter",
            Some(dollar.span()),
        ));
    };
    Ok((
        Pattern {
            stx: delim.clone(),
            class: PatternClass::PatternGroup,
            inner: Some(compile(delim.inner())?),
            repeat: false,
            separator: " ".to_string(),
        },
        2,
    ))
}

// =============================================================================
// SECTION 3: QUERIES
// =============================================================================

/// The weight used to order a macro's cases: longer patterns are tried
/// first so a more specific case wins over a prefix of itself.
pub fn pattern_length(patterns: &[Pattern]) -> usize {
    patterns
        .iter()
        .map(|p| match &p.inner {
            Some(inner) => 1 + pattern_length(inner),
            None => 1,
        })
        .sum()
}

/// Collects the names of every pattern variable in a raw syntax sequence,
/// recursing into delimiters.
pub fn free_var_names(raw: &[Syntax]) -> Vec<String> {
    let mut out = Vec::new();
    collect_free_vars(raw, &mut out);
    out
}

fn collect_free_vars(raw: &[Syntax], out: &mut Vec<String>) {
    for stx in raw {
        if stx.is_pattern_var() {
            let name = stx.value().to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        } else if stx.is_delimiter() {
            collect_free_vars(stx.inner(), out);
        }
    }
}

pub fn contains_pattern_var(raw: &[Syntax]) -> bool {
    raw.iter()
        .any(|s| s.is_pattern_var() || (s.is_delimiter() && contains_pattern_var(s.inner())))
}

/// A `(tok)` delimiter naming a repetition separator: parens around exactly
/// one non-delimiter, non-variable token.
pub fn delim_is_separator(stx: &Syntax) -> bool {
    stx.is_delimiter()
        && stx.value() == "()"
        && stx.inner().len() == 1
        && !stx.inner()[0].is_delimiter()
        && !stx.inner()[0].is_pattern_var()
}
