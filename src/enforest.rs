//! Enforestation: growing a term at the head of a token stream.
//!
//! The step machine keeps a head (either raw syntax or a term built so far)
//! and the remaining tokens. Each step either grows the head by consuming
//! more of the stream, applies a macro whose output re-enters the stream,
//! or stops and returns the head as the finished term. Guards are tried in
//! a fixed order and the first one whose look-ahead matches commits: if its
//! body then fails to build the bigger shape, stepping stops rather than
//! trying later guards.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::errors::{
    assertion, production_mismatch, recursion_limit, unsupported_syntax, ExpandError,
};
use crate::expander::Expansion;
use crate::macros::{apply_transformer, MacroEnv};
use crate::syntax::Syntax;
use crate::terms::{DelimTerm, FunBody, FunParams, Term};

// =============================================================================
// SECTION 1: OPERATOR TABLES
// =============================================================================

static UNARY_OPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["+", "-", "~", "!", "delete", "void", "typeof", "++", "--"]
        .into_iter()
        .collect()
});

static BINARY_OPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "+", "-", "*", "/", "%", "||", "&&", "|", "&", "^", "==", "!=", "===", "!==", "<", ">",
        "<=", ">=", "in", "instanceof", "<<", ">>", ">>>",
    ]
    .into_iter()
    .collect()
});

fn is_unary_op(stx: &Syntax) -> bool {
    (stx.is_punctuator() || stx.is_keyword()) && UNARY_OPS.contains(stx.value())
}

fn is_binary_op(stx: &Syntax) -> bool {
    (stx.is_punctuator() || stx.is_keyword()) && BINARY_OPS.contains(stx.value())
}

// =============================================================================
// SECTION 2: THE STEP MACHINE
// =============================================================================

/// A term grown from the head of the input, plus the tokens after it.
#[derive(Debug)]
pub struct Enforested {
    pub result: Term,
    pub rest: Vec<Syntax>,
}

enum Head {
    Term(Term),
    Stx(Syntax),
}

enum Step {
    Next(Head, Vec<Syntax>),
    Done(Term, Vec<Syntax>),
}

/// Grows one term from the head of `stx`. The input must be non-empty.
pub fn enforest(
    stx: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Enforested, ExpandError> {
    let first = stx
        .first()
        .ok_or_else(|| assertion("enforest needs at least one token"))?;
    let mut head = Head::Stx(first.clone());
    let mut rest = stx[1..].to_vec();
    // Bounds the number of macro applications feeding one head, so a macro
    // that keeps re-emitting itself terminates with an error.
    let mut macro_calls = 0usize;
    loop {
        match head {
            Head::Term(term) => match step_term(term, rest, env, exp)? {
                Step::Next(h, r) => {
                    head = h;
                    rest = r;
                }
                Step::Done(result, rest) => return Ok(Enforested { result, rest }),
            },
            Head::Stx(stx0) => {
                let (h, r) = step_stx(stx0, rest, env, exp, &mut macro_calls)?;
                head = h;
                rest = r;
            }
        }
    }
}

/// Enforests and keeps the result only when it is an expression; otherwise
/// reports no expression and leaves the input untouched.
pub fn get_expression(
    stx: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Option<Enforested>, ExpandError> {
    let res = enforest(stx, env, exp)?;
    if res.result.is_expr() {
        Ok(Some(res))
    } else {
        Ok(None)
    }
}

// =============================================================================
// SECTION 3: TERM-HEAD GUARDS
// =============================================================================

fn step_term(
    term: Term,
    rest: Vec<Syntax>,
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Step, ExpandError> {
    let next = rest.first();

    // Call: an expression followed by a paren delimiter.
    if term.is_expr() && next.map(|s| s.is_delimiter() && s.value() == "()").unwrap_or(false) {
        let delim = rest[0].clone();
        exp.guard()?;
        let parsed = parse_call_args(&delim, env, exp);
        exp.leave();
        if let Some((args, commas)) = parsed? {
            let call = Term::Call {
                callee: Box::new(term),
                args,
                delim,
                commas,
            };
            return Ok(Step::Next(Head::Term(call), rest[1..].to_vec()));
        }
        return Ok(Step::Done(term, rest));
    }

    // Conditional: `cond ? then : else`.
    if term.is_expr() && next.map(|s| s.is_punctuator() && s.value() == "?").unwrap_or(false) {
        let question = rest[0].clone();
        if rest.len() > 1 {
            let then_res = enforest(&rest[1..], env, exp)?;
            if then_res.result.is_expr()
                && then_res.rest.first().map(|s| s.value()) == Some(":")
                && then_res.rest.len() > 1
            {
                let colon = then_res.rest[0].clone();
                let else_res = enforest(&then_res.rest[1..], env, exp)?;
                if else_res.result.is_expr() {
                    let cond = Term::Conditional {
                        cond: Box::new(term),
                        question,
                        then_expr: Box::new(then_res.result),
                        colon,
                        else_expr: Box::new(else_res.result),
                    };
                    return Ok(Step::Next(Head::Term(cond), else_res.rest));
                }
            }
        }
        return Ok(Step::Done(term, rest));
    }

    // Constructor call: `new` followed by a call expression.
    if matches!(&term, Term::Keyword(kw) if kw.value() == "new") && !rest.is_empty() {
        let res = enforest(&rest, env, exp)?;
        if matches!(res.result, Term::Call { .. }) {
            let Term::Keyword(kw) = term else {
                return Err(assertion("constructor head changed shape"));
            };
            let cons = Term::Const {
                kw,
                call: Box::new(res.result),
            };
            return Ok(Step::Next(Head::Term(cons), res.rest));
        }
        return Ok(Step::Done(term, rest));
    }

    // Parenthesized expression: a paren delimiter whose contents are empty
    // or enforest fully to one expression.
    if let Term::Delimiter(d) = &term {
        if d.stx.value() == "()" {
            let inner = d.stx.inner().to_vec();
            let ok = if inner.is_empty() {
                true
            } else {
                exp.guard()?;
                let res = get_expression(&inner, env, exp);
                exp.leave();
                match res? {
                    Some(res) => res.rest.is_empty(),
                    None => false,
                }
            };
            if ok {
                let Term::Delimiter(d) = term else {
                    return Err(assertion("paren head changed shape"));
                };
                return Ok(Step::Next(Head::Term(Term::ParenExpr(d)), rest));
            }
            return Ok(Step::Done(term, rest));
        }
    }

    // Binary operator.
    if rest.len() >= 2 && is_binary_op(&rest[0]) {
        let op = rest[0].clone();
        let right = enforest(&rest[1..], env, exp)?;
        if right.result.is_expr() {
            let bin = Term::BinOp {
                left: Box::new(term),
                op,
                right: Box::new(right.result),
            };
            return Ok(Step::Next(Head::Term(bin), right.rest));
        }
        return Ok(Step::Done(term, rest));
    }

    // Unary operator: a lone punctuator or keyword operator absorbing the
    // expression after it.
    let unary_head = match &term {
        Term::Punc(op) | Term::Keyword(op) if is_unary_op(op) => Some(op.clone()),
        _ => None,
    };
    if let Some(op) = unary_head {
        if !rest.is_empty() {
            let res = enforest(&rest, env, exp)?;
            if res.result.is_expr() {
                let unary = Term::UnaryOp {
                    op,
                    expr: Box::new(res.result),
                };
                return Ok(Step::Next(Head::Term(unary), res.rest));
            }
        }
        return Ok(Step::Done(term, rest));
    }

    // Postfix increment and decrement.
    if term.is_expr()
        && next
            .map(|s| s.is_punctuator() && (s.value() == "++" || s.value() == "--"))
            .unwrap_or(false)
    {
        let post = Term::PostfixOp {
            expr: Box::new(term),
            op: rest[0].clone(),
        };
        return Ok(Step::Next(Head::Term(post), rest[1..].to_vec()));
    }

    // Computed member access: the bracket contents must enforest fully to
    // one expression.
    if term.is_expr() && next.map(|s| s.is_delimiter() && s.value() == "[]").unwrap_or(false) {
        let delim = rest[0].clone();
        if !delim.inner().is_empty() {
            exp.guard()?;
            let indexed = get_expression(delim.inner(), env, exp);
            exp.leave();
            if let Some(index) = indexed? {
                if index.rest.is_empty() {
                    let get = Term::ObjGet {
                        left: Box::new(term),
                        delim,
                        index: Box::new(index.result),
                    };
                    return Ok(Step::Next(Head::Term(get), rest[1..].to_vec()));
                }
            }
        }
        return Ok(Step::Done(term, rest));
    }

    // Dotted member access.
    if term.is_expr()
        && next.map(|s| s.value() == "." && s.is_punctuator()).unwrap_or(false)
        && rest.get(1).map(|s| s.is_identifier()).unwrap_or(false)
    {
        let get = Term::ObjDotGet {
            left: Box::new(term),
            dot: rest[0].clone(),
            right: rest[1].clone(),
        };
        return Ok(Step::Next(Head::Term(get), rest[2..].to_vec()));
    }

    // Bracket and brace delimiters become expressions on their own.
    if matches!(&term, Term::Delimiter(d) if d.stx.value() == "[]") {
        let Term::Delimiter(d) = term else {
            return Err(assertion("array head changed shape"));
        };
        return Ok(Step::Next(Head::Term(Term::ArrayLiteral(d)), rest));
    }
    if matches!(&term, Term::Delimiter(d) if d.stx.value() == "{}") {
        let Term::Delimiter(d) = term else {
            return Err(assertion("block head changed shape"));
        };
        return Ok(Step::Next(Head::Term(Term::Block(d)), rest));
    }

    // Variable statement.
    if matches!(&term, Term::Keyword(kw) if kw.value() == "var")
        && next.map(|s| s.is_identifier()).unwrap_or(false)
    {
        let Term::Keyword(kw) = term else {
            return Err(assertion("var head changed shape"));
        };
        let (decls, var_rest) = enforest_var_statement(&rest, env, exp)?;
        let stmt = Term::VarStatement { kw, decls };
        return Ok(Step::Next(Head::Term(stmt), var_rest));
    }

    Ok(Step::Done(term, rest))
}

// Parses the contents of a call's paren delimiter into comma-separated
// argument expressions. Returns None when the contents do not form an
// argument list.
fn parse_call_args(
    delim: &Syntax,
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Option<(Vec<Term>, Vec<Syntax>)>, ExpandError> {
    let mut inner = delim.inner().to_vec();
    let mut args = Vec::new();
    let mut commas = Vec::new();
    while !inner.is_empty() {
        let arg = enforest(&inner, env, exp)?;
        args.push(arg.result);
        inner = arg.rest;
        if inner.first().map(|s| s.value()) == Some(",") {
            commas.push(inner[0].clone());
            inner = inner[1..].to_vec();
        } else {
            break;
        }
    }
    if inner.is_empty() && args.iter().all(|a| a.is_expr()) {
        Ok(Some((args, commas)))
    } else {
        Ok(None)
    }
}

// =============================================================================
// SECTION 4: RAW-HEAD DISPATCH
// =============================================================================

fn step_stx(
    stx0: Syntax,
    rest: Vec<Syntax>,
    env: &MacroEnv,
    exp: &mut Expansion,
    macro_calls: &mut usize,
) -> Result<(Head, Vec<Syntax>), ExpandError> {
    // Macro invocation: the output re-enters the stream at the head.
    if (stx0.is_identifier() || stx0.is_keyword()) && env.contains(stx0.value()) {
        *macro_calls += 1;
        if *macro_calls > exp.max_depth() {
            return Err(recursion_limit(exp.max_depth()));
        }
        let transformer = env
            .lookup(stx0.value())
            .ok_or_else(|| assertion("macro vanished between lookup and application"))?;
        let expanded = apply_transformer(&transformer, &rest, &stx0, env, exp)?;
        if let Some((new_head, result_rest)) = expanded.result.split_first() {
            let mut new_rest = result_rest.to_vec();
            new_rest.extend(expanded.rest);
            return Ok((Head::Stx(new_head.clone()), new_rest));
        }
        return Ok((Head::Term(Term::Empty), expanded.rest));
    }

    // Macro definition: `macro name { ... }`. Loading and binding happen in
    // the driver; here it just becomes a term.
    if stx0.is_identifier()
        && stx0.value() == "macro"
        && rest
            .first()
            .map(|s| s.is_identifier() || s.is_keyword())
            .unwrap_or(false)
        && rest
            .get(1)
            .map(|s| s.is_delimiter() && s.value() == "{}")
            .unwrap_or(false)
    {
        let def = Term::MacroDef {
            name: rest[0].clone(),
            body: rest[1].inner().to_vec(),
        };
        return Ok((Head::Term(def), rest[2..].to_vec()));
    }

    if stx0.is_keyword() && stx0.value() == "function" {
        // Named form: `function name ( ) { }`.
        if rest.first().map(|s| s.is_identifier()).unwrap_or(false)
            && rest
                .get(1)
                .map(|s| s.is_delimiter() && s.value() == "()")
                .unwrap_or(false)
            && rest
                .get(2)
                .map(|s| s.is_delimiter() && s.value() == "{}")
                .unwrap_or(false)
        {
            let fun = Term::NamedFun {
                kw: stx0,
                name: rest[0].clone(),
                params: FunParams::Raw(rest[1].clone()),
                body: FunBody::Raw(rest[2].clone()),
            };
            return Ok((Head::Term(fun), rest[3..].to_vec()));
        }
        // Anonymous form: `function ( ) { }`.
        if rest
            .first()
            .map(|s| s.is_delimiter() && s.value() == "()")
            .unwrap_or(false)
            && rest
                .get(1)
                .map(|s| s.is_delimiter() && s.value() == "{}")
                .unwrap_or(false)
        {
            let fun = Term::AnonFun {
                kw: stx0,
                params: FunParams::Raw(rest[0].clone()),
                body: FunBody::Raw(rest[1].clone()),
            };
            return Ok((Head::Term(fun), rest[2..].to_vec()));
        }
    }

    if stx0.is_keyword()
        && stx0.value() == "catch"
        && rest
            .first()
            .map(|s| s.is_delimiter() && s.value() == "()")
            .unwrap_or(false)
        && rest
            .get(1)
            .map(|s| s.is_delimiter() && s.value() == "{}")
            .unwrap_or(false)
    {
        let clause = Term::CatchClause {
            kw: stx0,
            params: FunParams::Raw(rest[0].clone()),
            body: FunBody::Raw(rest[1].clone()),
        };
        return Ok((Head::Term(clause), rest[2..].to_vec()));
    }

    if stx0.is_keyword() && stx0.value() == "this" {
        return Ok((Head::Term(Term::This(stx0)), rest));
    }

    if stx0.is_keyword() && stx0.value() == "with" {
        return Err(unsupported_syntax(
            "with statements are not supported",
            Some(stx0.span()),
        ));
    }

    if stx0.is_literal() {
        return Ok((Head::Term(Term::Lit(stx0)), rest));
    }
    if stx0.is_identifier() {
        return Ok((Head::Term(Term::Id(stx0)), rest));
    }
    if stx0.is_punctuator() {
        return Ok((Head::Term(Term::Punc(stx0)), rest));
    }
    if stx0.is_keyword() {
        return Ok((Head::Term(Term::Keyword(stx0)), rest));
    }
    if stx0.is_delimiter() {
        return Ok((Head::Term(Term::Delimiter(DelimTerm::new(stx0))), rest));
    }
    if stx0.is_eof() {
        if !rest.is_empty() {
            return Err(assertion("tokens found after end of input"));
        }
        return Ok((Head::Term(Term::Eof(stx0)), rest));
    }
    Err(assertion(format!(
        "unhandled token kind for `{}`",
        stx0.value()
    )))
}

// =============================================================================
// SECTION 5: VARIABLE STATEMENTS
// =============================================================================

/// Parses the declarator list after a `var` keyword: identifiers with
/// optional initializers, separated by commas.
pub fn enforest_var_statement(
    stx: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<(Vec<Term>, Vec<Syntax>), ExpandError> {
    let ident = stx
        .first()
        .filter(|s| s.is_identifier())
        .cloned()
        .ok_or_else(|| assertion("var declaration expects an identifier"))?;

    match stx.get(1).map(|s| s.value()) {
        Some("=") => {
            let eq = stx[1].clone();
            if stx.len() <= 2 {
                return Err(assertion("var initializer is missing"));
            }
            let init = enforest(&stx[2..], env, exp)?;
            if !init.result.is_expr() {
                return Err(assertion("var initializer must be an expression"));
            }
            if init.rest.first().map(|s| s.value()) == Some(",") {
                let comma = init.rest[0].clone();
                let tail = init.rest[1..].to_vec();
                let (more, rest) = enforest_var_statement(&tail, env, exp)?;
                let mut decls = vec![Term::VarDecl {
                    ident,
                    eq: Some(eq),
                    init: Some(Box::new(init.result)),
                    comma: Some(comma),
                }];
                decls.extend(more);
                Ok((decls, rest))
            } else {
                Ok((
                    vec![Term::VarDecl {
                        ident,
                        eq: Some(eq),
                        init: Some(Box::new(init.result)),
                        comma: None,
                    }],
                    init.rest,
                ))
            }
        }
        Some(",") => {
            let comma = stx[1].clone();
            let (more, rest) = enforest_var_statement(&stx[2..], env, exp)?;
            let mut decls = vec![Term::VarDecl {
                ident,
                eq: None,
                init: None,
                comma: Some(comma),
            }];
            decls.extend(more);
            Ok((decls, rest))
        }
        _ => Ok((
            vec![Term::VarDecl {
                ident,
                eq: None,
                init: None,
                comma: None,
            }],
            stx[1..].to_vec(),
        )),
    }
}

// =============================================================================
// SECTION 6: PRODUCTIONS
// =============================================================================

/// The grammar productions callers can demand from the head of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    Expression,
    Statement,
    VariableStatement,
    Block,
    ArrayLiteral,
    ParenExpression,
    Call,
    Function,
    Identifier,
    Literal,
}

impl Production {
    fn name(self) -> &'static str {
        match self {
            Production::Expression => "an expression",
            Production::Statement => "a statement",
            Production::VariableStatement => "a variable statement",
            Production::Block => "a block",
            Production::ArrayLiteral => "an array literal",
            Production::ParenExpression => "a parenthesized expression",
            Production::Call => "a call expression",
            Production::Function => "a function",
            Production::Identifier => "an identifier",
            Production::Literal => "a literal",
        }
    }
}

/// Enforests the head of `stx` and checks it is the demanded production.
pub fn enforest_production(
    production: Production,
    stx: &[Syntax],
    env: &MacroEnv,
    exp: &mut Expansion,
) -> Result<Enforested, ExpandError> {
    let span = stx.first().map(|s| s.span());
    let mismatch = || production_mismatch(production.name(), span);

    if production == Production::Expression {
        return match get_expression(stx, env, exp)? {
            Some(res) => Ok(res),
            None => Err(mismatch()),
        };
    }

    let res = enforest(stx, env, exp)?;
    let matches_production = match production {
        Production::Expression => unreachable!("handled above"),
        Production::Statement | Production::VariableStatement => {
            matches!(res.result, Term::VarStatement { .. })
        }
        Production::Block => matches!(res.result, Term::Block(_)),
        Production::ArrayLiteral => matches!(res.result, Term::ArrayLiteral(_)),
        Production::ParenExpression => matches!(res.result, Term::ParenExpr(_)),
        Production::Call => matches!(res.result, Term::Call { .. }),
        Production::Function => {
            matches!(res.result, Term::NamedFun { .. } | Term::AnonFun { .. })
        }
        Production::Identifier => matches!(res.result, Term::Id(_)),
        Production::Literal => matches!(res.result, Term::Lit(_)),
    };
    if matches_production {
        Ok(res)
    } else {
        Err(mismatch())
    }
}
