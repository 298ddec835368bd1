//! The Term Tree: the semi-structured representation syntax passes through
//! while it is being expanded. Each variant owns its child slots in the
//! fixed order `destruct` walks to flatten the term back to syntax.

use crate::syntax::{delim_chars, pretty, wrap_delim, Span, Syntax, Token, TokenKind};

// =============================================================================
// SECTION 1: DELIMITER PAYLOADS
// =============================================================================

/// A delimiter as a term. Starts out raw (the inner syntax still lives on
/// the token); the driver's second pass replaces the contents with expanded
/// terms.
#[derive(Debug, Clone)]
pub struct DelimTerm {
    pub stx: Syntax,
    pub expanded: Option<Vec<Term>>,
}

impl DelimTerm {
    pub fn new(stx: Syntax) -> DelimTerm {
        DelimTerm {
            stx,
            expanded: None,
        }
    }

    fn inner_syntax(&self, break_delimiters: bool) -> Vec<Syntax> {
        match &self.expanded {
            Some(terms) => terms
                .iter()
                .flat_map(|t| t.destruct(break_delimiters))
                .collect(),
            None => self.stx.inner().to_vec(),
        }
    }

    fn destruct(&self, break_delimiters: bool) -> Vec<Syntax> {
        let inner = self.inner_syntax(break_delimiters);
        if break_delimiters {
            break_open(&self.stx, inner)
        } else if self.expanded.is_some() {
            vec![wrap_delim(inner, &self.stx)]
        } else {
            vec![self.stx.clone()]
        }
    }
}

// Splits a delimiter into its open bracket, inner sequence, and close
// bracket as three separate runs of syntax.
fn break_open(delim: &Syntax, inner: Vec<Syntax>) -> Vec<Syntax> {
    let (open, close) = delim_chars(delim.value());
    let span = delim.span();
    let mut out = Vec::with_capacity(inner.len() + 2);
    out.push(punct_at(&open, span));
    out.extend(inner);
    out.push(punct_at(&close, span));
    out
}

fn punct_at(value: &str, span: Span) -> Syntax {
    Syntax::new(Token {
        kind: TokenKind::Punctuator,
        value: value.to_string(),
        inner: None,
        span,
    })
}

// =============================================================================
// SECTION 2: FUNCTION SLOTS
// =============================================================================

/// A function's parameter list: the raw `()` delimiter until the driver's
/// second pass re-expands it into a term.
#[derive(Debug, Clone)]
pub enum FunParams {
    Raw(Syntax),
    Expanded(Box<Term>),
}

impl FunParams {
    fn destruct(&self, break_delimiters: bool) -> Vec<Syntax> {
        match self {
            FunParams::Raw(stx) => vec![stx.clone()],
            FunParams::Expanded(term) => term.destruct(break_delimiters),
        }
    }
}

/// A function's body: the raw `{}` delimiter until the driver's second pass
/// replaces it with the fully expanded, flattened body (braces included).
#[derive(Debug, Clone)]
pub enum FunBody {
    Raw(Syntax),
    Flattened(Vec<Syntax>),
}

impl FunBody {
    fn destruct(&self) -> Vec<Syntax> {
        match self {
            FunBody::Raw(stx) => vec![stx.clone()],
            FunBody::Flattened(stx) => stx.clone(),
        }
    }
}

// =============================================================================
// SECTION 3: THE TERM TREE
// =============================================================================

#[derive(Debug, Clone)]
pub enum Term {
    Eof(Syntax),
    Lit(Syntax),
    Id(Syntax),
    Punc(Syntax),
    Keyword(Syntax),
    This(Syntax),
    Delimiter(DelimTerm),
    ArrayLiteral(DelimTerm),
    Block(DelimTerm),
    ParenExpr(DelimTerm),
    UnaryOp {
        op: Syntax,
        expr: Box<Term>,
    },
    PostfixOp {
        expr: Box<Term>,
        op: Syntax,
    },
    BinOp {
        left: Box<Term>,
        op: Syntax,
        right: Box<Term>,
    },
    Conditional {
        cond: Box<Term>,
        question: Syntax,
        then_expr: Box<Term>,
        colon: Syntax,
        else_expr: Box<Term>,
    },
    Call {
        callee: Box<Term>,
        args: Vec<Term>,
        delim: Syntax,
        commas: Vec<Syntax>,
    },
    Const {
        kw: Syntax,
        call: Box<Term>,
    },
    ObjGet {
        left: Box<Term>,
        delim: Syntax,
        index: Box<Term>,
    },
    ObjDotGet {
        left: Box<Term>,
        dot: Syntax,
        right: Syntax,
    },
    VarDecl {
        ident: Syntax,
        eq: Option<Syntax>,
        init: Option<Box<Term>>,
        comma: Option<Syntax>,
    },
    VarStatement {
        kw: Syntax,
        decls: Vec<Term>,
    },
    NamedFun {
        kw: Syntax,
        name: Syntax,
        params: FunParams,
        body: FunBody,
    },
    AnonFun {
        kw: Syntax,
        params: FunParams,
        body: FunBody,
    },
    CatchClause {
        kw: Syntax,
        params: FunParams,
        body: FunBody,
    },
    MacroDef {
        name: Syntax,
        body: Vec<Syntax>,
    },
    Empty,
}

impl Term {
    /// Whether this term is an expression. Blocks, array literals, and
    /// parenthesized expressions count as primary expressions.
    pub fn is_expr(&self) -> bool {
        matches!(
            self,
            Term::Lit(_)
                | Term::Id(_)
                | Term::This(_)
                | Term::Block(_)
                | Term::ArrayLiteral(_)
                | Term::ParenExpr(_)
                | Term::UnaryOp { .. }
                | Term::PostfixOp { .. }
                | Term::BinOp { .. }
                | Term::Conditional { .. }
                | Term::Call { .. }
                | Term::Const { .. }
                | Term::ObjGet { .. }
                | Term::ObjDotGet { .. }
                | Term::NamedFun { .. }
                | Term::AnonFun { .. }
        )
    }

    /// Flattens the term back to an ordered syntax sequence.
    ///
    /// `break_delimiters` controls whether delimiter terms split into their
    /// open bracket, inner sequence, and close bracket (needed before
    /// handing the result to a code generator) or stay single opaque
    /// delimiter tokens (needed when re-matching patterns).
    pub fn destruct(&self, break_delimiters: bool) -> Vec<Syntax> {
        match self {
            Term::Eof(stx)
            | Term::Lit(stx)
            | Term::Id(stx)
            | Term::Punc(stx)
            | Term::Keyword(stx)
            | Term::This(stx) => vec![stx.clone()],
            Term::Delimiter(d)
            | Term::ArrayLiteral(d)
            | Term::Block(d)
            | Term::ParenExpr(d) => d.destruct(break_delimiters),
            Term::UnaryOp { op, expr } => {
                let mut out = vec![op.clone()];
                out.extend(expr.destruct(break_delimiters));
                out
            }
            Term::PostfixOp { expr, op } => {
                let mut out = expr.destruct(break_delimiters);
                out.push(op.clone());
                out
            }
            Term::BinOp { left, op, right } => {
                let mut out = left.destruct(break_delimiters);
                out.push(op.clone());
                out.extend(right.destruct(break_delimiters));
                out
            }
            Term::Conditional {
                cond,
                question,
                then_expr,
                colon,
                else_expr,
            } => {
                let mut out = cond.destruct(break_delimiters);
                out.push(question.clone());
                out.extend(then_expr.destruct(break_delimiters));
                out.push(colon.clone());
                out.extend(else_expr.destruct(break_delimiters));
                out
            }
            Term::Call {
                callee,
                args,
                delim,
                commas,
            } => {
                // Re-thread the original comma syntax between the arguments
                // so position metadata round-trips without recomputation.
                let mut inner = Vec::new();
                let mut comma_iter = commas.iter();
                for arg in args {
                    inner.extend(arg.destruct(break_delimiters));
                    if let Some(comma) = comma_iter.next() {
                        inner.push(comma.clone());
                    }
                }
                let mut out = callee.destruct(break_delimiters);
                if break_delimiters {
                    out.extend(break_open(delim, inner));
                } else {
                    out.push(wrap_delim(inner, delim));
                }
                out
            }
            Term::Const { kw, call } => {
                let mut out = vec![kw.clone()];
                out.extend(call.destruct(break_delimiters));
                out
            }
            Term::ObjGet { left, delim, index } => {
                let mut out = left.destruct(break_delimiters);
                let inner = index.destruct(break_delimiters);
                if break_delimiters {
                    out.extend(break_open(delim, inner));
                } else {
                    out.push(wrap_delim(inner, delim));
                }
                out
            }
            Term::ObjDotGet { left, dot, right } => {
                let mut out = left.destruct(break_delimiters);
                out.push(dot.clone());
                out.push(right.clone());
                out
            }
            Term::VarDecl {
                ident,
                eq,
                init,
                comma,
            } => {
                let mut out = vec![ident.clone()];
                if let Some(eq) = eq {
                    out.push(eq.clone());
                }
                if let Some(init) = init {
                    out.extend(init.destruct(break_delimiters));
                }
                if let Some(comma) = comma {
                    out.push(comma.clone());
                }
                out
            }
            Term::VarStatement { kw, decls } => {
                let mut out = vec![kw.clone()];
                for decl in decls {
                    out.extend(decl.destruct(break_delimiters));
                }
                out
            }
            Term::NamedFun {
                kw,
                name,
                params,
                body,
            } => {
                let mut out = vec![kw.clone(), name.clone()];
                out.extend(params.destruct(break_delimiters));
                out.extend(body.destruct());
                out
            }
            Term::AnonFun { kw, params, body } | Term::CatchClause { kw, params, body } => {
                let mut out = vec![kw.clone()];
                out.extend(params.destruct(break_delimiters));
                out.extend(body.destruct());
                out
            }
            Term::MacroDef { name, body } => {
                let mut out = vec![name.clone()];
                out.extend(body.iter().cloned());
                out
            }
            Term::Empty => Vec::new(),
        }
    }

    /// Renders the term for trace output.
    pub fn pretty(&self) -> String {
        pretty(&self.destruct(false))
    }
}

/// The public finishing step: flattens every term (breaking delimiters) and
/// concatenates the results into the syntax stream a code generator takes.
pub fn flatten(terms: &[Term]) -> Vec<Syntax> {
    terms.iter().flat_map(|t| t.destruct(true)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Span;

    fn num(v: &str) -> Syntax {
        Syntax::number(v, Span::default())
    }

    fn punct(v: &str) -> Syntax {
        Syntax::punct(v, Span::default())
    }

    fn values(stx: &[Syntax]) -> Vec<String> {
        stx.iter().map(|s| s.value().to_string()).collect()
    }

    #[test]
    fn binop_destructs_in_slot_order() {
        let term = Term::BinOp {
            left: Box::new(Term::Lit(num("1"))),
            op: punct("+"),
            right: Box::new(Term::Lit(num("2"))),
        };
        assert_eq!(values(&term.destruct(true)), vec!["1", "+", "2"]);
    }

    #[test]
    fn call_rethreads_commas() {
        let span = Span::default();
        let delim = Syntax::delimiter("()", vec![], span);
        let term = Term::Call {
            callee: Box::new(Term::Id(Syntax::ident("f", span))),
            args: vec![Term::Lit(num("1")), Term::Lit(num("2"))],
            delim,
            commas: vec![punct(",")],
        };
        assert_eq!(
            values(&term.destruct(true)),
            vec!["f", "(", "1", ",", "2", ")"]
        );
    }

    #[test]
    fn raw_delimiter_stays_whole_without_breaking() {
        let span = Span::default();
        let delim = Syntax::delimiter("[]", vec![num("1")], span);
        let term = Term::Delimiter(DelimTerm::new(delim));
        let unbroken = term.destruct(false);
        assert_eq!(unbroken.len(), 1);
        assert!(unbroken[0].is_delimiter());
        assert_eq!(values(&term.destruct(true)), vec!["[", "1", "]"]);
    }

    #[test]
    fn empty_term_vanishes() {
        assert!(flatten(&[Term::Empty]).is_empty());
    }

    #[test]
    fn var_statement_destructs_decls_in_order() {
        let span = Span::default();
        let term = Term::VarStatement {
            kw: Syntax::keyword("var", span),
            decls: vec![Term::VarDecl {
                ident: Syntax::ident("x", span),
                eq: Some(punct("=")),
                init: Some(Box::new(Term::Lit(num("42")))),
                comma: None,
            }],
        };
        assert_eq!(values(&term.destruct(true)), vec!["var", "x", "=", "42"]);
    }
}
