//! Macro definitions and their application: compiling `macro` bodies into
//! transformers and running a transformer at a call site.
//!
//! Three transformer shapes exist. `rule` clauses are pure rewrites handled
//! entirely in-process. `case` clauses transcribe their template into a
//! program the injected host evaluator runs, with matched syntax threaded
//! through the syntax store. A body that is directly a `function` is handed
//! whole to the host evaluator, which returns a callable transformer.

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{macro_definition_error, no_matching_case, ExpandError};
use crate::expander::{expand_top_level, Expansion};
use crate::patterns::{
    apply_mark_to_env, compile, match_patterns, pattern_length, transcribe, Pattern,
};
use crate::syntax::{fresh, pretty, Syntax, Token};

// =============================================================================
// SECTION 1: TRANSFORMERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    Rule,
    Case,
}

/// One compiled clause of a pattern macro.
pub struct MacroCase {
    pub pattern: Vec<Pattern>,
    pub body: Vec<Syntax>,
}

/// The syntax a transformer produced, plus the call-site tokens it did not
/// consume.
pub struct Expanded {
    pub result: Vec<Syntax>,
    pub rest: Vec<Syntax>,
}

/// A transformer obtained from the host evaluator.
pub type HostFn =
    Rc<dyn Fn(&[Syntax], &Syntax, &mut SyntaxStore) -> Result<Expanded, ExpandError>>;

pub enum Transformer {
    Cases {
        kind: MacroKind,
        cases: Vec<MacroCase>,
    },
    Host(HostFn),
}

// =============================================================================
// SECTION 2: ENVIRONMENTS AND THE SYNTAX STORE
// =============================================================================

/// Maps macro names (raw token values) to their transformers.
#[derive(Default)]
pub struct MacroEnv {
    bindings: HashMap<String, Rc<Transformer>>,
}

impl MacroEnv {
    pub fn new() -> MacroEnv {
        MacroEnv::default()
    }

    pub fn define(&mut self, name: impl Into<String>, transformer: Transformer) {
        self.bindings.insert(name.into(), Rc::new(transformer));
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<Transformer>> {
        self.bindings.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Matched syntax parked for retrieval by host-evaluated template bodies.
/// Keys come from the same counter as marks and rename ids.
#[derive(Default)]
pub struct SyntaxStore {
    slots: HashMap<usize, Vec<Syntax>>,
}

impl SyntaxStore {
    pub fn new() -> SyntaxStore {
        SyntaxStore::default()
    }

    pub fn insert(&mut self, id: usize, stx: Vec<Syntax>) {
        self.slots.insert(id, stx);
    }

    pub fn get(&self, id: usize) -> Option<&[Syntax]> {
        self.slots.get(&id).map(|v| v.as_slice())
    }
}

/// The host evaluator: the collaborator that runs transcribed `case`
/// bodies and raw `function` transformers. Injected by the embedder; when
/// absent, only `rule` macros work.
pub trait HostEval {
    /// Runs an expanded template program and returns the syntax it built.
    fn eval_macro_body(
        &self,
        program: &[Syntax],
        store: &mut SyntaxStore,
    ) -> Result<Vec<Syntax>, ExpandError>;

    /// Evaluates an expanded `function` body into a callable transformer.
    fn load_transformer(
        &self,
        program: &[Syntax],
        store: &mut SyntaxStore,
    ) -> Result<HostFn, ExpandError>;
}

/// Builds new syntax carrying `like`'s position and hygiene context. The
/// building block behind a host evaluator's `makeSyntax` entry point.
pub fn make_syntax(mut token: Token, like: &Syntax) -> Syntax {
    token.span = like.span();
    Syntax::with_context(token, like.context.clone())
}

/// The raw token value of a syntax object. The building block behind a host
/// evaluator's `unwrapSyntax` entry point.
pub fn unwrap_syntax(stx: &Syntax) -> &str {
    stx.value()
}

// =============================================================================
// SECTION 3: LOADING DEFINITIONS
// =============================================================================

/// Compiles the body of a `macro name { ... }` form into a transformer.
pub fn load_macro_def(
    name: &Syntax,
    body: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Transformer, ExpandError> {
    let Some(first) = body.first() else {
        return Err(macro_definition_error(
            format!("macro `{}` has an empty body", name.value()),
            Some(name.span()),
        ));
    };

    if first.is_keyword() && first.value() == "function" {
        return load_raw_transformer(name, body, env, exp);
    }

    let kind = match first.value() {
        "rule" => MacroKind::Rule,
        "case" => MacroKind::Case,
        other => {
            return Err(macro_definition_error(
                format!(
                    "macro `{}` must begin with `rule`, `case`, or `function`, found `{}`",
                    name.value(),
                    other
                ),
                Some(first.span()),
            ));
        }
    };
    let kind_word = first.value().to_string();

    let mut cases = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let clause = &body[i];
        if clause.value() != kind_word {
            let msg = if clause.value() == "rule" || clause.value() == "case" {
                format!(
                    "macro `{}` mixes `rule` and `case` clauses",
                    name.value()
                )
            } else {
                format!(
                    "unexpected `{}` in macro `{}`, expected a `{}` clause",
                    clause.value(),
                    name.value(),
                    kind_word
                )
            };
            return Err(macro_definition_error(msg, Some(clause.span())));
        }
        let Some(pattern_delim) = body.get(i + 1).filter(|s| s.is_delimiter() && s.value() == "{}")
        else {
            return Err(macro_definition_error(
                format!("`{}` clause is missing its pattern braces", kind_word),
                Some(clause.span()),
            ));
        };
        let arrow_len = arrow_at(body, i + 2).ok_or_else(|| {
            macro_definition_error(
                format!("`{}` clause is missing `=>`", kind_word),
                Some(pattern_delim.span()),
            )
        })?;
        let template_index = i + 2 + arrow_len;
        let Some(template_delim) = body
            .get(template_index)
            .filter(|s| s.is_delimiter() && s.value() == "{}")
        else {
            return Err(macro_definition_error(
                format!("`{}` clause is missing its template braces", kind_word),
                Some(pattern_delim.span()),
            ));
        };
        cases.push(MacroCase {
            pattern: compile(pattern_delim.inner())?,
            body: template_delim.inner().to_vec(),
        });
        i = template_index + 1;
    }

    // Longer patterns first, so a case cannot be shadowed by a prefix of
    // itself.
    cases.sort_by(|a, b| pattern_length(&b.pattern).cmp(&pattern_length(&a.pattern)));
    Ok(Transformer::Cases { kind, cases })
}

// The arrow may arrive as a single `=>` punctuator or as an `=` `>` pair,
// depending on how the tokenizer glues punctuation.
fn arrow_at(body: &[Syntax], i: usize) -> Option<usize> {
    match body.get(i).map(|s| s.value()) {
        Some("=>") => Some(1),
        Some("=") if body.get(i + 1).map(|s| s.value()) == Some(">") => Some(2),
        _ => None,
    }
}

fn load_raw_transformer(
    name: &Syntax,
    body: &[Syntax],
    _env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Transformer, ExpandError> {
    let Some(host) = exp.host() else {
        return Err(macro_definition_error(
            format!(
                "macro `{}` uses a function transformer but no host evaluator is installed",
                name.value()
            ),
            Some(name.span()),
        ));
    };
    // Parenthesize so the function parses as an expression, then expand it
    // like any other program before handing it to the host.
    let wrapped = Syntax::delimiter("()", body.to_vec(), name.span());
    let mut stub_env = MacroEnv::new();
    let mut stub_exp = exp.sub_expansion();
    let program = expand_top_level(&[wrapped], &mut stub_env, &mut stub_exp)?;
    let f = host.load_transformer(&program, exp.store_mut())?;
    Ok(Transformer::Host(f))
}

// =============================================================================
// SECTION 4: APPLICATION
// =============================================================================

/// Runs a transformer at a call site. `stx` is the input after the macro
/// name; `name_stx` is the name token itself, used for positions and
/// error reporting.
pub fn apply_transformer(
    transformer: &Transformer,
    stx: &[Syntax],
    name_stx: &Syntax,
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Expanded, ExpandError> {
    exp.guard()?;
    let out = apply_inner(transformer, stx, name_stx, env, exp);
    exp.leave();
    out
}

fn apply_inner(
    transformer: &Transformer,
    stx: &[Syntax],
    name_stx: &Syntax,
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Expanded, ExpandError> {
    match transformer {
        Transformer::Cases { kind, cases } => {
            for case in cases {
                let outcome = match_patterns(&case.pattern, stx, env, true, exp)?;
                if !outcome.success {
                    continue;
                }
                // Everything the call site contributed gets this mark;
                // re-marking the final result cancels it on those tokens
                // and leaves it on template-introduced ones.
                let new_mark = fresh();
                let mut pattern_env = outcome.env;
                apply_mark_to_env(new_mark, &mut pattern_env);
                let result = match kind {
                    MacroKind::Rule => {
                        transcribe(&case.body, name_stx, &pattern_env, None)?
                    }
                    MacroKind::Case => {
                        let template =
                            transcribe(&case.body, name_stx, &pattern_env, Some(exp.store_mut()))?;
                        run_case_body(&template, name_stx, exp)?
                    }
                };
                let result: Vec<Syntax> = result.iter().map(|s| s.mark(new_mark)).collect();
                exp.record(name_stx.value(), name_stx.span(), pretty(&result));
                return Ok(Expanded {
                    result,
                    rest: outcome.rest,
                });
            }
            Err(no_matching_case(name_stx.value(), Some(name_stx.span())))
        }
        Transformer::Host(f) => {
            let new_mark = fresh();
            let marked: Vec<Syntax> = stx.iter().map(|s| s.mark(new_mark)).collect();
            let expanded = f(&marked, name_stx, exp.store_mut())?;
            // Re-marking cancels on tokens that came from the call site,
            // in the result and the unconsumed rest alike.
            let result: Vec<Syntax> = expanded
                .result
                .iter()
                .map(|s| s.mark(new_mark))
                .collect();
            let rest: Vec<Syntax> = expanded.rest.iter().map(|s| s.mark(new_mark)).collect();
            exp.record(name_stx.value(), name_stx.span(), pretty(&result));
            Ok(Expanded { result, rest })
        }
    }
}

// Wraps a transcribed `case` template in the retrieval preamble, expands
// it, and hands the program to the host evaluator.
fn run_case_body(
    template: &[Syntax],
    name_stx: &Syntax,
    exp: &mut Expansion,
) -> Result<Vec<Syntax>, ExpandError> {
    let span = name_stx.span();
    let params = Syntax::delimiter(
        "()",
        vec![
            Syntax::ident("makeSyntax", span),
            Syntax::punct(",", span),
            Syntax::ident("getSyntax", span),
            Syntax::punct(",", span),
            Syntax::ident("unwrapSyntax", span),
        ],
        span,
    );
    let body = Syntax::delimiter("{}", template.to_vec(), span);
    let stub = Syntax::delimiter(
        "()",
        vec![Syntax::keyword("function", span), params, body],
        span,
    );

    let mut stub_env = MacroEnv::new();
    let mut stub_exp = exp.sub_expansion();
    let program = expand_top_level(&[stub], &mut stub_env, &mut stub_exp)?;

    let Some(host) = exp.host() else {
        return Err(macro_definition_error(
            "`case` macros need a host evaluator but none is installed".to_string(),
            Some(name_stx.span()),
        ));
    };
    host.eval_macro_body(&program, exp.store_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{marks_of_full, Span, TokenKind};

    #[test]
    fn make_syntax_carries_position_and_context() {
        let span = Span {
            start: 10,
            end: 11,
            line: 2,
        };
        let like = Syntax::ident("m", span).mark(fresh());
        let token = Token {
            kind: TokenKind::Identifier,
            value: "made".to_string(),
            inner: None,
            span: Span::default(),
        };
        let made = make_syntax(token, &like);
        assert_eq!(made.value(), "made");
        assert_eq!(made.span(), span);
        assert_eq!(marks_of_full(&made.context), marks_of_full(&like.context));
    }

    #[test]
    fn unwrap_syntax_yields_the_raw_value() {
        let stx = Syntax::number("42", Span::default()).mark(fresh());
        assert_eq!(unwrap_syntax(&stx), "42");
    }

    #[test]
    fn arrow_accepts_both_spellings() {
        let span = Span::default();
        let glued = vec![Syntax::punct("=>", span)];
        assert_eq!(arrow_at(&glued, 0), Some(1));
        let split = vec![Syntax::punct("=", span), Syntax::punct(">", span)];
        assert_eq!(arrow_at(&split, 0), Some(2));
        let neither = vec![Syntax::punct("=", span), Syntax::punct("=", span)];
        assert_eq!(arrow_at(&neither, 0), None);
    }
}
