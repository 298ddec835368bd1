//! Shared test support: a small tokenizer producing pre-nested delimiter
//! syntax, a host evaluator stand-in, and expansion helpers.

use std::rc::Rc;

use sucrose::macros::{unwrap_syntax, Expanded, HostFn};
use sucrose::{
    ExpandError, Expansion, HostEval, MacroEnv, Span, Syntax, SyntaxStore,
};

const KEYWORDS: &[&str] = &[
    "var",
    "function",
    "catch",
    "new",
    "this",
    "typeof",
    "delete",
    "void",
    "in",
    "instanceof",
    "with",
];

// Multi-character punctuators, longest first so maximal munch works.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", ">>>", "=>", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(src: &str) -> Lexer {
        Lexer {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn span_from(&self, start: usize) -> Span {
        Span {
            start,
            end: self.pos,
            line: self.line,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.line += 1;
                self.pos += 1;
            } else if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn starts_with(&self, pat: &str) -> bool {
        pat.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    // Reads tokens until the closing bracket (or end of input), nesting
    // delimiters as it goes.
    fn read_seq(&mut self, close: Option<char>) -> Vec<Syntax> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            if Some(c) == close {
                self.pos += 1;
                break;
            }
            let start = self.pos;
            match c {
                '(' | '[' | '{' => {
                    self.pos += 1;
                    let (pair, closer) = match c {
                        '(' => ("()", ')'),
                        '[' => ("[]", ']'),
                        _ => ("{}", '}'),
                    };
                    let inner = self.read_seq(Some(closer));
                    out.push(Syntax::delimiter(pair, inner, self.span_from(start)));
                }
                '"' | '\'' => {
                    self.pos += 1;
                    let mut value = String::new();
                    while let Some(ch) = self.peek() {
                        self.pos += 1;
                        if ch == c {
                            break;
                        }
                        value.push(ch);
                    }
                    out.push(Syntax::string_lit(&value, self.span_from(start)));
                }
                _ if c.is_ascii_digit() => {
                    let mut value = String::new();
                    while let Some(ch) = self.peek() {
                        if ch.is_ascii_digit() || ch == '.' {
                            value.push(ch);
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    out.push(Syntax::number(&value, self.span_from(start)));
                }
                _ if c.is_alphabetic() || c == '_' || c == '$' => {
                    let mut value = String::new();
                    while let Some(ch) = self.peek() {
                        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                            value.push(ch);
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let span = self.span_from(start);
                    if KEYWORDS.contains(&value.as_str()) {
                        out.push(Syntax::keyword(&value, span));
                    } else {
                        out.push(Syntax::ident(&value, span));
                    }
                }
                _ => {
                    let mut matched = None;
                    for pat in PUNCTUATORS {
                        if self.starts_with(pat) {
                            matched = Some(*pat);
                            break;
                        }
                    }
                    match matched {
                        Some(pat) => {
                            self.pos += pat.chars().count();
                            out.push(Syntax::punct(pat, self.span_from(start)));
                        }
                        None => {
                            self.pos += 1;
                            out.push(Syntax::punct(&c.to_string(), self.span_from(start)));
                        }
                    }
                }
            }
        }
        out
    }
}

/// Tokenizes source into syntax with delimiters pre-nested.
pub fn tokens(src: &str) -> Vec<Syntax> {
    Lexer::new(src).read_seq(None)
}

/// The token values of a syntax sequence with every delimiter broken into
/// its open bracket, contents, and close bracket.
pub fn flat_values(stx: &[Syntax]) -> Vec<String> {
    let mut out = Vec::new();
    collect_flat(stx, &mut out);
    out
}

fn collect_flat(stx: &[Syntax], out: &mut Vec<String>) {
    for s in stx {
        if s.is_delimiter() {
            let value = s.value();
            let mut chars = value.chars();
            let open = chars.next().map(String::from).unwrap_or_default();
            let close = chars.next().map(String::from).unwrap_or_default();
            out.push(open);
            collect_flat(s.inner(), out);
            out.push(close);
        } else {
            out.push(s.value().to_string());
        }
    }
}

/// Expands source without a host evaluator.
pub fn expand_str(src: &str) -> Result<Vec<Syntax>, ExpandError> {
    let mut env = MacroEnv::new();
    let mut exp = Expansion::new();
    sucrose::expand_top_level(&tokens(src), &mut env, &mut exp)
}

/// Expands source with [`TestHost`] installed.
pub fn expand_str_with_host(src: &str) -> Result<Vec<Syntax>, ExpandError> {
    let mut env = MacroEnv::new();
    let mut exp = Expansion::with_host(Rc::new(TestHost));
    sucrose::expand_top_level(&tokens(src), &mut env, &mut exp)
}

/// A host evaluator stand-in. It does not run real programs: template
/// bodies are interpreted just far enough to resolve `getSyntax(id)`
/// retrievals, and function transformers always take the first token of
/// their input.
pub struct TestHost;

impl HostEval for TestHost {
    fn eval_macro_body(
        &self,
        program: &[Syntax],
        store: &mut SyntaxStore,
    ) -> Result<Vec<Syntax>, ExpandError> {
        // The program arrives flattened: `( function ( ... ) { body } )`.
        let open = program.iter().position(|s| s.value() == "{");
        let close = program.iter().rposition(|s| s.value() == "}");
        let (Some(open), Some(close)) = (open, close) else {
            return Err(sucrose::errors::host_error(
                "template program has no body braces",
            ));
        };
        let body = &program[open + 1..close];

        let mut out = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let is_retrieval = body[i].value() == "getSyntax"
                && body.get(i + 1).map(|s| s.value()) == Some("(")
                && body.get(i + 3).map(|s| s.value()) == Some(")");
            if is_retrieval {
                let id: usize = unwrap_syntax(&body[i + 2])
                    .parse()
                    .map_err(|_| sucrose::errors::host_error("bad syntax-store id"))?;
                let stored = store
                    .get(id)
                    .ok_or_else(|| sucrose::errors::host_error("missing syntax-store slot"))?;
                out.extend(stored.iter().cloned());
                i += 4;
            } else {
                out.push(body[i].clone());
                i += 1;
            }
        }
        Ok(out)
    }

    fn load_transformer(
        &self,
        _program: &[Syntax],
        _store: &mut SyntaxStore,
    ) -> Result<HostFn, ExpandError> {
        Ok(Rc::new(|stx, name_stx, _store| {
            let Some((first, rest)) = stx.split_first() else {
                return Err(sucrose::errors::host_error(format!(
                    "`{}` needs at least one token",
                    name_stx.value()
                )));
            };
            Ok(Expanded {
                result: vec![first.clone()],
                rest: rest.to_vec(),
            })
        }))
    }
}
