//! Transcription: instantiating a macro's template body from a pattern
//! environment, unrolling repetitions and splicing matched syntax.

use crate::errors::{hygiene_violation, ExpandError};
use crate::macros::SyntaxStore;
use crate::patterns::free_var_names;
use crate::patterns::matcher::{Match, MatchBody, PatternEnv};
use crate::syntax::{fresh, wrap_delim, Syntax};

// =============================================================================
// SECTION 1: TEMPLATE ANNOTATION
// =============================================================================

// A template token annotated with the repetition that follows it.
struct Part {
    stx: Syntax,
    repeat: bool,
    separator: String,
    group: bool,
}

fn plain(stx: &Syntax) -> Part {
    Part {
        stx: stx.clone(),
        repeat: false,
        separator: " ".to_string(),
        group: false,
    }
}

// Looks at `body[j]` for an ellipsis, with or without a `(sep)` delimiter
// in front of it. Returns the repeat flag, the separator, and how many
// template tokens the signal consumed.
fn detect_repeat(body: &[Syntax], j: usize) -> (bool, String, usize) {
    if body.get(j).map(|s| s.value()) == Some("...") {
        return (true, " ".to_string(), 1);
    }
    if let Some(sep) = body.get(j) {
        if crate::patterns::delim_is_separator(sep)
            && body.get(j + 1).map(|s| s.value()) == Some("...")
        {
            return (true, sep.inner()[0].value().to_string(), 2);
        }
    }
    (false, " ".to_string(), 0)
}

fn annotate(body: &[Syntax]) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let stx = &body[i];
        if stx.value() == "$" && !stx.is_delimiter() {
            match body.get(i + 1) {
                // `$[...]` splices its contents verbatim, so a literal
                // ellipsis can appear in output. Substitution still runs
                // over the spliced tokens.
                Some(next) if next.is_delimiter() && next.value() == "[]" => {
                    parts.extend(next.inner().iter().map(plain));
                    i += 2;
                    continue;
                }
                // `$(...)` groups template tokens under one repetition
                // without emitting a delimiter.
                Some(next) if next.is_delimiter() && next.value() == "()" => {
                    let (repeat, separator, consumed) = detect_repeat(body, i + 2);
                    parts.push(Part {
                        stx: next.clone(),
                        repeat,
                        separator,
                        group: true,
                    });
                    i += 2 + consumed;
                    continue;
                }
                // A stray `$` is dropped.
                _ => {
                    i += 1;
                    continue;
                }
            }
        }
        if stx.value() == "..." && !stx.is_delimiter() {
            // An ellipsis with nothing to attach to is dropped.
            i += 1;
            continue;
        }
        let (repeat, separator, consumed) = detect_repeat(body, i + 1);
        parts.push(Part {
            stx: stx.clone(),
            repeat,
            separator,
            group: false,
        });
        i += 1 + consumed;
    }
    parts
}

// =============================================================================
// SECTION 2: TRANSCRIPTION
// =============================================================================

/// Instantiates a template body against a pattern environment.
///
/// `name_stx` is the macro-call identifier; every emitted token takes its
/// source position from it so downstream positions point at the call site.
/// When `case_store` is given, substituted pattern variables are emitted as
/// `getSyntax(id)` retrieval calls against the store instead of spliced
/// directly, which is how template bodies destined for a host evaluator
/// reference matched syntax.
pub fn transcribe(
    body: &[Syntax],
    name_stx: &Syntax,
    env: &PatternEnv,
    mut case_store: Option<&mut SyntaxStore>,
) -> Result<Vec<Syntax>, ExpandError> {
    let mut out = Vec::new();
    for part in annotate(body) {
        if part.repeat {
            if part.stx.is_delimiter() {
                out.extend(transcribe_repeat_delim(&part, name_stx, env, case_store.as_deref_mut())?);
            } else {
                out.extend(transcribe_repeat_var(&part, name_stx, env)?);
            }
        } else if part.stx.is_delimiter() {
            let inner = transcribe(part.stx.inner(), name_stx, env, case_store.as_deref_mut())?;
            let rebuilt = wrap_delim(inner, &part.stx);
            out.extend(take_line_context(name_stx, &[rebuilt]));
        } else if let Some(matched) = env.get(part.stx.value()) {
            let MatchBody::Stx(stx) = &matched.body else {
                return Err(hygiene_violation(format!(
                    "`{}` used at the wrong ellipsis level",
                    part.stx.value()
                )));
            };
            if matched.level != 0 {
                return Err(hygiene_violation(format!(
                    "`{}` used at the wrong ellipsis level",
                    part.stx.value()
                )));
            }
            match case_store.as_deref_mut() {
                Some(store) => out.extend(make_get_syntax(stx, store, name_stx)),
                None => out.extend(take_line_context(name_stx, stx)),
            }
        } else {
            out.extend(take_line_context(name_stx, &[part.stx.clone()]));
        }
    }
    Ok(out)
}

// Unrolls a repeated delimiter or group. Every free variable under the
// repetition must be bound, at least one must be non-scalar, and all
// non-scalars must repeat the same number of times.
fn transcribe_repeat_delim(
    part: &Part,
    name_stx: &Syntax,
    env: &PatternEnv,
    mut case_store: Option<&mut SyntaxStore>,
) -> Result<Vec<Syntax>, ExpandError> {
    let fv: Vec<String> = free_var_names(part.stx.inner())
        .into_iter()
        .filter(|name| env.contains_key(name))
        .collect();
    let repeat_len = fv
        .iter()
        .filter_map(|name| match &env[name].body {
            MatchBody::Sub(subs) if env[name].level > 0 => Some(subs.len()),
            _ => None,
        })
        .next()
        .ok_or_else(|| {
            hygiene_violation("a repetition needs at least one non-scalar pattern variable")
        })?;
    for name in &fv {
        if let MatchBody::Sub(subs) = &env[name].body {
            if env[name].level > 0 && subs.len() != repeat_len {
                return Err(hygiene_violation(
                    "all non-scalar pattern variables in a repetition must repeat the same number of times",
                ));
            }
        }
    }

    let mut transcribed: Vec<Vec<Syntax>> = Vec::with_capacity(repeat_len);
    for idx in 0..repeat_len {
        let mut restricted = PatternEnv::new();
        for name in &fv {
            let matched = &env[name];
            if matched.level == 0 {
                restricted.insert(name.clone(), matched.clone());
            } else if let MatchBody::Sub(subs) = &matched.body {
                restricted.insert(name.clone(), subs[idx].clone());
            }
        }
        let inner = transcribe(
            part.stx.inner(),
            name_stx,
            &restricted,
            case_store.as_deref_mut(),
        )?;
        if part.group {
            transcribed.push(inner);
        } else {
            let rebuilt = wrap_delim(inner, &part.stx);
            transcribed.push(take_line_context(name_stx, &[rebuilt]));
        }
    }
    Ok(join_syntax_arr(&transcribed, &part.separator, name_stx))
}

// Splices a repeated pattern variable, interleaving the separator.
fn transcribe_repeat_var(
    part: &Part,
    name_stx: &Syntax,
    env: &PatternEnv,
) -> Result<Vec<Syntax>, ExpandError> {
    let Some(matched) = env.get(part.stx.value()) else {
        return Err(hygiene_violation(format!(
            "`{}` is repeated in the template but matched nothing",
            part.stx.value()
        )));
    };
    if matched.level != 1 {
        return Err(hygiene_violation(format!(
            "`{}` used at the wrong ellipsis level",
            part.stx.value()
        )));
    }
    let MatchBody::Sub(subs) = &matched.body else {
        return Err(hygiene_violation(format!(
            "`{}` used at the wrong ellipsis level",
            part.stx.value()
        )));
    };
    let pieces: Vec<Vec<Syntax>> = subs
        .iter()
        .map(|sub| match &sub.body {
            MatchBody::Stx(stx) => take_line_context(name_stx, stx),
            MatchBody::Sub(_) => Vec::new(),
        })
        .collect();
    Ok(join_syntax_arr(&pieces, &part.separator, name_stx))
}

// =============================================================================
// SECTION 3: SPLICING HELPERS
// =============================================================================

// Joins pre-transcribed pieces, inserting the separator punctuator between
// them. `" "` means plain juxtaposition.
fn join_syntax_arr(pieces: &[Vec<Syntax>], separator: &str, name_stx: &Syntax) -> Vec<Syntax> {
    let mut out = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 && separator != " " {
            out.push(Syntax::punct(separator, name_stx.span()));
        }
        out.extend(piece.iter().cloned());
    }
    out
}

/// Clones each syntax object, re-pointing its source position at `from` so
/// expanded output reports the call site. Hygiene context is untouched.
pub fn take_line_context(from: &Syntax, to: &[Syntax]) -> Vec<Syntax> {
    to.iter().map(|stx| retag(from, stx)).collect()
}

fn retag(from: &Syntax, stx: &Syntax) -> Syntax {
    let mut token = stx.token.clone();
    token.span = from.span();
    if let Some(inner) = token.inner.take() {
        token.inner = Some(inner.iter().map(|s| retag(from, s)).collect());
    }
    Syntax::with_context(token, stx.context.clone())
}

// Stores matched syntax under a fresh id and emits `getSyntax ( id )` in
// its place, for template bodies a host evaluator will run.
fn make_get_syntax(matched: &[Syntax], store: &mut SyntaxStore, name_stx: &Syntax) -> Vec<Syntax> {
    let id = fresh();
    store.insert(id, matched.to_vec());
    let span = name_stx.span();
    let arg = Syntax::number(&id.to_string(), span);
    vec![
        Syntax::ident("getSyntax", span),
        Syntax::delimiter("()", vec![arg], span),
    ]
}

// =============================================================================
// SECTION 4: MARKING
// =============================================================================

/// Stamps a mark on every piece of matched syntax in the environment, so
/// call-site tokens flowing into a template carry the expansion's mark.
pub fn apply_mark_to_env(mark: usize, env: &mut PatternEnv) {
    for matched in env.values_mut() {
        mark_match(mark, matched);
    }
}

fn mark_match(mark: usize, matched: &mut Match) {
    match &mut matched.body {
        MatchBody::Stx(stx) => {
            for s in stx.iter_mut() {
                *s = s.mark(mark);
            }
        }
        MatchBody::Sub(subs) => {
            for sub in subs.iter_mut() {
                mark_match(mark, sub);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{marks_of_full, Span};

    fn ident(v: &str) -> Syntax {
        Syntax::ident(v, Span::default())
    }

    fn num(v: &str) -> Syntax {
        Syntax::number(v, Span::default())
    }

    fn punct(v: &str) -> Syntax {
        Syntax::punct(v, Span::default())
    }

    fn scalar(stx: Vec<Syntax>) -> Match {
        Match {
            level: 0,
            body: MatchBody::Stx(stx),
        }
    }

    fn repeated(items: Vec<Vec<Syntax>>) -> Match {
        Match {
            level: 1,
            body: MatchBody::Sub(items.into_iter().map(scalar).collect()),
        }
    }

    fn values(stx: &[Syntax]) -> Vec<String> {
        stx.iter().map(|s| s.value().to_string()).collect()
    }

    #[test]
    fn scalar_substitution() {
        let mut env = PatternEnv::new();
        env.insert("$x".to_string(), scalar(vec![num("5")]));
        let body = vec![ident("$x"), punct("+"), ident("$x")];
        let out = transcribe(&body, &ident("m"), &env, None).unwrap();
        assert_eq!(values(&out), vec!["5", "+", "5"]);
    }

    #[test]
    fn unbound_template_tokens_pass_through() {
        let env = PatternEnv::new();
        let body = vec![ident("y"), punct(";")];
        let out = transcribe(&body, &ident("m"), &env, None).unwrap();
        assert_eq!(values(&out), vec!["y", ";"]);
    }

    #[test]
    fn repeated_variable_joins_with_separator() {
        let mut env = PatternEnv::new();
        env.insert(
            "$x".to_string(),
            repeated(vec![vec![num("1")], vec![num("2")], vec![num("3")]]),
        );
        let span = Span::default();
        let sep = Syntax::delimiter("()", vec![punct(",")], span);
        let body = vec![ident("$x"), sep, punct("...")];
        let out = transcribe(&body, &ident("m"), &env, None).unwrap();
        assert_eq!(values(&out), vec!["1", ",", "2", ",", "3"]);
    }

    #[test]
    fn repeated_delimiter_unrolls_per_iteration() {
        let mut env = PatternEnv::new();
        env.insert(
            "$x".to_string(),
            repeated(vec![vec![num("1")], vec![num("2")]]),
        );
        let span = Span::default();
        let delim = Syntax::delimiter("[]", vec![ident("$x")], span);
        let body = vec![delim, punct("...")];
        let out = transcribe(&body, &ident("m"), &env, None).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_delimiter());
        assert_eq!(values(out[0].inner()), vec!["1"]);
        assert_eq!(values(out[1].inner()), vec!["2"]);
    }

    #[test]
    fn wrong_ellipsis_level_is_a_hygiene_error() {
        let mut env = PatternEnv::new();
        env.insert(
            "$x".to_string(),
            repeated(vec![vec![num("1")], vec![num("2")]]),
        );
        let body = vec![ident("$x")];
        let err = transcribe(&body, &ident("m"), &env, None).unwrap_err();
        assert_eq!(err.error_code(), "HYGIENE_VIOLATION");
    }

    #[test]
    fn repeat_without_nonscalar_is_a_hygiene_error() {
        let mut env = PatternEnv::new();
        env.insert("$x".to_string(), scalar(vec![num("1")]));
        let span = Span::default();
        let delim = Syntax::delimiter("[]", vec![ident("$x")], span);
        let body = vec![delim, punct("...")];
        let err = transcribe(&body, &ident("m"), &env, None).unwrap_err();
        assert_eq!(err.error_code(), "HYGIENE_VIOLATION");
    }

    #[test]
    fn literal_escape_preserves_ellipsis() {
        let env = PatternEnv::new();
        let span = Span::default();
        let escape = Syntax::delimiter("[]", vec![punct("...")], span);
        let body = vec![ident("$"), escape];
        let out = transcribe(&body, &ident("m"), &env, None).unwrap();
        assert_eq!(values(&out), vec!["..."]);
    }

    #[test]
    fn output_takes_call_site_position() {
        let call_span = Span {
            start: 40,
            end: 41,
            line: 3,
        };
        let mut env = PatternEnv::new();
        env.insert("$x".to_string(), scalar(vec![num("5")]));
        let out = transcribe(&[ident("$x")], &Syntax::ident("m", call_span), &env, None).unwrap();
        assert_eq!(out[0].span(), call_span);
    }

    #[test]
    fn marking_the_env_reaches_every_binding() {
        let mut env = PatternEnv::new();
        env.insert("$x".to_string(), scalar(vec![ident("a")]));
        env.insert(
            "$y".to_string(),
            repeated(vec![vec![ident("b")], vec![ident("c")]]),
        );
        let m = fresh();
        apply_mark_to_env(m, &mut env);
        let MatchBody::Stx(stx) = &env["$x"].body else {
            panic!("scalar expected");
        };
        assert_eq!(marks_of_full(&stx[0].context), vec![m]);
        let MatchBody::Sub(subs) = &env["$y"].body else {
            panic!("repeat expected");
        };
        for sub in subs {
            let MatchBody::Stx(stx) = &sub.body else {
                panic!("scalar expected");
            };
            assert_eq!(marks_of_full(&stx[0].context), vec![m]);
        }
    }
}
