//! Pattern matching: running a compiled pattern list against call-site
//! syntax, producing the leveled pattern environment transcription reads.

use std::collections::HashMap;

use crate::enforest::{enforest, get_expression};
use crate::errors::ExpandError;
use crate::expander::Expansion;
use crate::macros::MacroEnv;
use crate::patterns::{Pattern, PatternClass};
use crate::syntax::Syntax;
use crate::terms::Term;

// =============================================================================
// SECTION 1: THE PATTERN ENVIRONMENT
// =============================================================================

/// What a pattern variable matched: either syntax directly (ellipsis level
/// zero) or one sub-match per repetition.
#[derive(Debug, Clone)]
pub enum MatchBody {
    Stx(Vec<Syntax>),
    Sub(Vec<Match>),
}

/// A binding at a given ellipsis level. Level zero is a scalar; each
/// enclosing ellipsis adds one level of `Sub` nesting.
#[derive(Debug, Clone)]
pub struct Match {
    pub level: usize,
    pub body: MatchBody,
}

pub type PatternEnv = HashMap<String, Match>;

/// The result of running a pattern list against input syntax.
#[derive(Debug)]
pub struct MatchOutcome {
    pub success: bool,
    pub rest: Vec<Syntax>,
    pub env: PatternEnv,
}

// =============================================================================
// SECTION 2: MATCHING
// =============================================================================

/// Matches a pattern list against input, in order, threading the remaining
/// input through. A failed match is reported through `success`, not an
/// error; errors are reserved for faults inside nested enforestation.
///
/// `top_level` relaxes the rule that a trailing separated repetition must
/// consume all remaining input: at the top of a macro call the leftover
/// becomes the rest-of-stream, while inside a delimiter it is a mismatch.
pub fn match_patterns(
    patterns: &[Pattern],
    stx: &[Syntax],
    env: &MacroEnv,
    top_level: bool,
    exp: &mut Expansion,
) -> Result<MatchOutcome, ExpandError> {
    let mut pattern_env = PatternEnv::new();
    let mut rest = stx.to_vec();
    let mut success = true;

    for (pattern_number, pattern) in patterns.iter().enumerate() {
        loop {
            let step = match_pattern(pattern, &rest, env, &mut pattern_env, exp)?;
            if !step.success && pattern.repeat {
                // A repetition may match zero times.
                rest = step.rest;
                break;
            } else if !step.success {
                success = false;
                break;
            }
            rest = step.rest;
            if pattern.repeat {
                if rest.first().map(|s| s.value()) == Some(pattern.separator.as_str()) {
                    rest = rest[1..].to_vec();
                } else if pattern.separator == " " {
                    // Juxtaposed repetition keeps going as long as input
                    // remains.
                } else if !rest.is_empty()
                    && pattern_number == patterns.len() - 1
                    && !top_level
                {
                    // A separated repetition nested in a delimiter must
                    // consume everything up to the closing bracket.
                    success = false;
                    break;
                } else {
                    break;
                }
            }
            if !(pattern.repeat && !rest.is_empty()) {
                break;
            }
        }
        if !success {
            break;
        }
    }

    Ok(MatchOutcome {
        success,
        rest,
        env: pattern_env,
    })
}

struct StepOutcome {
    success: bool,
    rest: Vec<Syntax>,
}

fn match_pattern(
    pattern: &Pattern,
    stx: &[Syntax],
    env: &MacroEnv,
    pattern_env: &mut PatternEnv,
    exp: &mut Expansion,
) -> Result<StepOutcome, ExpandError> {
    if let Some(inner) = &pattern.inner {
        let (sub, rest) = if pattern.class == PatternClass::PatternGroup {
            // Groups match against the input in place, no delimiter taken.
            let sub = match_patterns(inner, stx, env, false, exp)?;
            let rest = sub.rest.clone();
            (sub, rest)
        } else if stx
            .first()
            .map(|s| s.is_delimiter() && s.value() == pattern.stx.value())
            .unwrap_or(false)
        {
            let sub = match_patterns(inner, stx[0].inner(), env, false, exp)?;
            (sub, stx[1..].to_vec())
        } else {
            return Ok(StepOutcome {
                success: false,
                rest: stx.to_vec(),
            });
        };
        let success = sub.success;
        merge_sub_env(pattern, sub.env, pattern_env);
        return Ok(StepOutcome { success, rest });
    }

    if pattern.class == PatternClass::PatternLiteral {
        let success = stx.first().map(|s| s.value()) == Some(pattern.stx.value());
        let rest = if success {
            stx[1..].to_vec()
        } else {
            stx.to_vec()
        };
        return Ok(StepOutcome { success, rest });
    }

    let (matched, rest) = match_pattern_class(pattern.class, stx, env, exp)?;
    let success = matched.is_some();
    if let Some(result) = matched {
        let scalar = Match {
            level: 0,
            body: MatchBody::Stx(result),
        };
        let key = pattern.stx.value().to_string();
        if pattern.repeat {
            match pattern_env.get_mut(&key) {
                Some(Match {
                    body: MatchBody::Sub(subs),
                    ..
                }) => subs.push(scalar),
                _ => {
                    pattern_env.insert(
                        key,
                        Match {
                            level: 1,
                            body: MatchBody::Sub(vec![scalar]),
                        },
                    );
                }
            }
        } else {
            pattern_env.insert(key, scalar);
        }
    }
    Ok(StepOutcome {
        success,
        rest: if success { rest } else { stx.to_vec() },
    })
}

// Folds a sub-match's bindings into the enclosing environment. Under a
// repetition each variable gains one ellipsis level, with one sub-match
// pushed per iteration.
fn merge_sub_env(pattern: &Pattern, sub_env: PatternEnv, pattern_env: &mut PatternEnv) {
    for (key, matched) in sub_env {
        if pattern.repeat {
            let next_level = matched.level + 1;
            match pattern_env.get_mut(&key) {
                Some(Match {
                    body: MatchBody::Sub(subs),
                    ..
                }) => subs.push(matched),
                _ => {
                    pattern_env.insert(
                        key,
                        Match {
                            level: next_level,
                            body: MatchBody::Sub(vec![matched]),
                        },
                    );
                }
            }
        } else {
            pattern_env.insert(key, matched);
        }
    }
}

// =============================================================================
// SECTION 3: PATTERN CLASSES
// =============================================================================

// Returns the matched syntax (None on mismatch) and the remaining input.
fn match_pattern_class(
    class: PatternClass,
    stx: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<(Option<Vec<Syntax>>, Vec<Syntax>), ExpandError> {
    match class {
        PatternClass::Token => match stx.first() {
            Some(first) if !first.is_eof() => {
                Ok((Some(vec![first.clone()]), stx[1..].to_vec()))
            }
            _ => Ok((None, stx.to_vec())),
        },
        PatternClass::Lit => match stx.first() {
            Some(first) if first.is_literal() => {
                Ok((Some(vec![first.clone()]), stx[1..].to_vec()))
            }
            _ => Ok((None, stx.to_vec())),
        },
        PatternClass::Ident => match stx.first() {
            Some(first) if first.is_identifier() => {
                Ok((Some(vec![first.clone()]), stx[1..].to_vec()))
            }
            _ => Ok((None, stx.to_vec())),
        },
        PatternClass::VarStatement => {
            if stx.is_empty() {
                return Ok((None, Vec::new()));
            }
            let res = enforest(stx, env, exp)?;
            if matches!(res.result, Term::VarStatement { .. }) {
                Ok((Some(res.result.destruct(false)), res.rest))
            } else {
                Ok((None, stx.to_vec()))
            }
        }
        PatternClass::Expr => {
            if stx.is_empty() {
                return Ok((None, Vec::new()));
            }
            match get_expression(stx, env, exp)? {
                Some(res) => Ok((Some(res.result.destruct(false)), res.rest)),
                None => Ok((None, stx.to_vec())),
            }
        }
        PatternClass::PatternLiteral | PatternClass::PatternGroup => Ok((None, stx.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::compile;
    use crate::syntax::Span;

    fn ident(v: &str) -> Syntax {
        Syntax::ident(v, Span::default())
    }

    fn num(v: &str) -> Syntax {
        Syntax::number(v, Span::default())
    }

    fn punct(v: &str) -> Syntax {
        Syntax::punct(v, Span::default())
    }

    fn kw(v: &str) -> Syntax {
        Syntax::keyword(v, Span::default())
    }

    fn run(pattern_src: Vec<Syntax>, input: Vec<Syntax>, top_level: bool) -> MatchOutcome {
        let patterns = compile(&pattern_src).unwrap();
        let env = MacroEnv::new();
        let mut exp = Expansion::new();
        match_patterns(&patterns, &input, &env, top_level, &mut exp).unwrap()
    }

    fn scalar_values(m: &Match) -> Vec<String> {
        match &m.body {
            MatchBody::Stx(stx) => stx.iter().map(|s| s.value().to_string()).collect(),
            MatchBody::Sub(_) => panic!("expected a scalar binding"),
        }
    }

    #[test]
    fn token_variable_takes_one_token() {
        let out = run(vec![ident("$x")], vec![num("5"), num("6")], true);
        assert!(out.success);
        assert_eq!(out.rest.len(), 1);
        assert_eq!(scalar_values(&out.env["$x"]), vec!["5"]);
    }

    #[test]
    fn literal_class_rejects_identifiers() {
        let out = run(
            vec![ident("$x"), punct(":"), ident("lit")],
            vec![ident("y")],
            true,
        );
        assert!(!out.success);
    }

    #[test]
    fn expr_class_consumes_greedily() {
        let out = run(
            vec![ident("$x"), punct(":"), ident("expr")],
            vec![num("1"), punct("+"), num("2"), punct(";")],
            true,
        );
        assert!(out.success);
        assert_eq!(scalar_values(&out.env["$x"]), vec!["1", "+", "2"]);
        assert_eq!(out.rest.len(), 1);
        assert_eq!(out.rest[0].value(), ";");
    }

    #[test]
    fn var_statement_class_consumes_a_whole_statement() {
        let out = run(
            vec![ident("$x"), punct(":"), ident("VariableStatement")],
            vec![kw("var"), ident("a"), punct("="), num("1"), ident("rest")],
            true,
        );
        assert!(out.success);
        assert_eq!(scalar_values(&out.env["$x"]), vec!["var", "a", "=", "1"]);
        assert_eq!(out.rest.len(), 1);
        assert_eq!(out.rest[0].value(), "rest");
    }

    #[test]
    fn var_statement_class_rejects_other_statements() {
        let out = run(
            vec![ident("$x"), punct(":"), ident("VariableStatement")],
            vec![num("1"), punct("+"), num("2")],
            true,
        );
        assert!(!out.success);
    }

    #[test]
    fn separated_repetition_binds_each_iteration() {
        let span = Span::default();
        let sep = Syntax::delimiter("()", vec![punct(",")], span);
        let out = run(
            vec![ident("$x"), sep, punct("...")],
            vec![num("1"), punct(","), num("2"), punct(","), num("3")],
            true,
        );
        assert!(out.success);
        let m = &out.env["$x"];
        assert_eq!(m.level, 1);
        match &m.body {
            MatchBody::Sub(subs) => assert_eq!(subs.len(), 3),
            MatchBody::Stx(_) => panic!("expected a repeated binding"),
        }
    }

    #[test]
    fn top_level_repetition_leaves_trailing_input_as_rest() {
        let span = Span::default();
        let sep = Syntax::delimiter("()", vec![punct(",")], span);
        let out = run(
            vec![ident("$x"), sep, punct("...")],
            vec![num("1"), punct(","), num("2"), ident("foo")],
            true,
        );
        assert!(out.success);
        assert_eq!(out.rest.len(), 1);
        assert_eq!(out.rest[0].value(), "foo");
    }

    #[test]
    fn nested_repetition_must_consume_the_delimiter() {
        let span = Span::default();
        let sep = Syntax::delimiter("()", vec![punct(",")], span);
        let input_delim = Syntax::delimiter(
            "()",
            vec![num("1"), punct(","), num("2"), ident("foo")],
            span,
        );
        let pattern_delim = Syntax::delimiter("()", vec![ident("$x"), sep, punct("...")], span);
        let out = run(vec![pattern_delim], vec![input_delim], true);
        assert!(!out.success);
    }

    #[test]
    fn repetition_may_match_zero_times() {
        let out = run(
            vec![
                ident("$x"),
                punct(":"),
                ident("lit"),
                punct("..."),
                punct(";"),
            ],
            vec![punct(";")],
            true,
        );
        assert!(out.success);
        assert!(!out.env.contains_key("$x"));
    }

    #[test]
    fn group_matches_without_a_delimiter_in_the_input() {
        let span = Span::default();
        let group = Syntax::delimiter("()", vec![ident("$a"), punct(","), ident("$b")], span);
        let out = run(
            vec![ident("$"), group],
            vec![num("1"), punct(","), num("2")],
            true,
        );
        assert!(out.success);
        assert_eq!(scalar_values(&out.env["$a"]), vec!["1"]);
        assert_eq!(scalar_values(&out.env["$b"]), vec!["2"]);
    }
}
