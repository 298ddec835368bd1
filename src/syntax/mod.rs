//! Tokens, source spans, and syntax objects.
//!
//! A syntax object is an immutable pair of a token and a context chain. The
//! tokenizer that produces the initial stream is an external collaborator;
//! it must deliver delimiter tokens pre-nested, with their inner syntax
//! already attached.

pub mod hygiene;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use hygiene::{fresh, marks_of, marks_of_full, resolve, Context, DefCtx, DefEntry};

// =============================================================================
// SECTION 1: SPANS AND TOKENS
// =============================================================================

/// A half-open byte range into the original source, plus the line it
/// starts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    BooleanLiteral,
    Delimiter,
    Eof,
    Identifier,
    Keyword,
    NullLiteral,
    NumericLiteral,
    Punctuator,
    RegexLiteral,
    StringLiteral,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::BooleanLiteral
                | TokenKind::NullLiteral
                | TokenKind::NumericLiteral
                | TokenKind::RegexLiteral
                | TokenKind::StringLiteral
        )
    }
}

/// A single token. Delimiter tokens use the two-character bracket pair as
/// their value (`"()"`, `"[]"`, `"{}"`) and own their inner syntax.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub inner: Option<Vec<Syntax>>,
    pub span: Span,
}

// =============================================================================
// SECTION 2: SYNTAX OBJECTS
// =============================================================================

/// An immutable `(token, context)` pair.
#[derive(Debug, Clone)]
pub struct Syntax {
    pub token: Token,
    pub context: Rc<Context>,
}

impl Syntax {
    pub fn new(token: Token) -> Syntax {
        Syntax {
            token,
            context: Rc::new(Context::Top),
        }
    }

    pub fn with_context(token: Token, context: Rc<Context>) -> Syntax {
        Syntax { token, context }
    }

    // --- constructors for the common token shapes ---

    pub fn ident(value: &str, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::Identifier,
            value: value.to_string(),
            inner: None,
            span,
        })
    }

    pub fn keyword(value: &str, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::Keyword,
            value: value.to_string(),
            inner: None,
            span,
        })
    }

    pub fn punct(value: &str, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::Punctuator,
            value: value.to_string(),
            inner: None,
            span,
        })
    }

    pub fn number(value: &str, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::NumericLiteral,
            value: value.to_string(),
            inner: None,
            span,
        })
    }

    pub fn string_lit(value: &str, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::StringLiteral,
            value: value.to_string(),
            inner: None,
            span,
        })
    }

    pub fn delimiter(value: &str, inner: Vec<Syntax>, span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::Delimiter,
            value: value.to_string(),
            inner: Some(inner),
            span,
        })
    }

    pub fn eof(span: Span) -> Syntax {
        Syntax::new(Token {
            kind: TokenKind::Eof,
            value: String::new(),
            inner: None,
            span,
        })
    }

    // --- accessors and predicates ---

    pub fn value(&self) -> &str {
        &self.token.value
    }

    pub fn span(&self) -> Span {
        self.token.span
    }

    /// The inner syntax of a delimiter token, or an empty slice otherwise.
    pub fn inner(&self) -> &[Syntax] {
        match &self.token.inner {
            Some(inner) => inner,
            None => &[],
        }
    }

    pub fn is_identifier(&self) -> bool {
        self.token.kind == TokenKind::Identifier
    }

    pub fn is_keyword(&self) -> bool {
        self.token.kind == TokenKind::Keyword
    }

    pub fn is_punctuator(&self) -> bool {
        self.token.kind == TokenKind::Punctuator
    }

    pub fn is_delimiter(&self) -> bool {
        self.token.kind == TokenKind::Delimiter
    }

    pub fn is_literal(&self) -> bool {
        self.token.kind.is_literal()
    }

    pub fn is_eof(&self) -> bool {
        self.token.kind == TokenKind::Eof
    }

    /// A pattern variable is an identifier starting with `$`, but not the
    /// bare `$` itself.
    pub fn is_pattern_var(&self) -> bool {
        self.is_identifier() && self.token.value.starts_with('$') && self.token.value != "$"
    }

    // --- hygiene operations ---

    /// Stamps a fresh expansion mark on this syntax object, recursing into
    /// delimiter inners.
    pub fn mark(&self, mark: usize) -> Syntax {
        let mut token = self.token.clone();
        if let Some(inner) = token.inner.take() {
            token.inner = Some(inner.iter().map(|s| s.mark(mark)).collect());
        }
        Syntax {
            token,
            context: Rc::new(Context::Mark {
                mark,
                parent: self.context.clone(),
            }),
        }
    }

    /// Records that occurrences of `binder` are renamed to the synthetic
    /// name with id `name`. Only identifiers and keywords can bind, so
    /// other tokens are returned unchanged; delimiters recurse.
    pub fn rename(&self, binder: &Syntax, name: usize) -> Syntax {
        match self.token.kind {
            TokenKind::Delimiter => {
                let mut token = self.token.clone();
                if let Some(inner) = token.inner.take() {
                    token.inner = Some(inner.iter().map(|s| s.rename(binder, name)).collect());
                }
                Syntax {
                    token,
                    context: Rc::new(Context::Rename {
                        binder: binder.clone(),
                        name,
                        parent: self.context.clone(),
                        def: None,
                    }),
                }
            }
            TokenKind::Identifier | TokenKind::Keyword => Syntax {
                token: self.token.clone(),
                context: Rc::new(Context::Rename {
                    binder: binder.clone(),
                    name,
                    parent: self.context.clone(),
                    def: None,
                }),
            },
            _ => self.clone(),
        }
    }

    /// Pushes a scope boundary for `def` onto this syntax object,
    /// recursing into delimiter inners.
    pub fn add_def_ctx(&self, def: &DefCtx) -> Syntax {
        match self.token.kind {
            TokenKind::Delimiter => {
                let mut token = self.token.clone();
                if let Some(inner) = token.inner.take() {
                    token.inner = Some(inner.iter().map(|s| s.add_def_ctx(def)).collect());
                }
                Syntax {
                    token,
                    context: Rc::new(Context::Def {
                        def: def.clone(),
                        parent: self.context.clone(),
                    }),
                }
            }
            TokenKind::Identifier | TokenKind::Keyword => Syntax {
                token: self.token.clone(),
                context: Rc::new(Context::Def {
                    def: def.clone(),
                    parent: self.context.clone(),
                }),
            },
            _ => self.clone(),
        }
    }

    /// The canonical hygienic name of this token. Meaningful for
    /// identifiers and keywords; other tokens resolve to their value.
    pub fn resolved_name(&self) -> String {
        resolve(self)
    }
}

// =============================================================================
// SECTION 3: SEQUENCE HELPERS
// =============================================================================

/// Wraps a syntax sequence in a copy of the given delimiter, keeping the
/// delimiter's span and context.
pub fn wrap_delim(inner: Vec<Syntax>, delim: &Syntax) -> Syntax {
    Syntax {
        token: Token {
            kind: TokenKind::Delimiter,
            value: delim.token.value.clone(),
            inner: Some(inner),
            span: delim.token.span,
        },
        context: delim.context.clone(),
    }
}

/// The open and close characters of a delimiter value.
pub fn delim_chars(value: &str) -> (String, String) {
    let mut chars = value.chars();
    let open = chars.next().map(String::from).unwrap_or_default();
    let close = chars.next().map(String::from).unwrap_or_default();
    (open, close)
}

/// Renders a syntax sequence as a single line, mainly for trace output and
/// error messages.
pub fn pretty(stx: &[Syntax]) -> String {
    let mut parts = Vec::with_capacity(stx.len());
    for s in stx {
        if s.is_delimiter() {
            let (open, close) = delim_chars(s.value());
            parts.push(format!("{}{}{}", open, pretty(s.inner()), close));
        } else {
            parts.push(s.value().to_string());
        }
    }
    parts.join(" ")
}
