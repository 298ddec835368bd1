//! The expansion driver: the two-pass walk that turns a token stream into
//! fully expanded syntax, plus the `Expansion` state threaded through every
//! stage.
//!
//! Pass one enforests the stream term by term, loading macro definitions
//! into the environment and hoisting `var` declarations into the enclosing
//! definition scope. Pass two walks each term, expanding delimiter contents
//! and performing the scope hygiene for function and catch bodies. The
//! top-level entry wraps the whole program in a synthetic function so the
//! top level is just another function scope.

use std::rc::Rc;

use serde::Serialize;

use crate::errors::{assertion, recursion_limit, ExpandError};
use crate::enforest::enforest;
use crate::macros::{load_macro_def, HostEval, MacroEnv, SyntaxStore};
use crate::syntax::{fresh, marks_of_full, wrap_delim, DefCtx, DefEntry, Span, Syntax};
use crate::terms::{flatten, DelimTerm, FunBody, FunParams, Term};

// =============================================================================
// SECTION 1: OPTIONS AND TRACE
// =============================================================================

pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct ExpandOptions {
    /// Bounds both macro-application chains and nesting of recursive
    /// expansion, so self-feeding macros fail instead of diverging.
    pub max_expansion_depth: usize,
}

impl Default for ExpandOptions {
    fn default() -> ExpandOptions {
        ExpandOptions {
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

/// One recorded macro application, kept in call order.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionStep {
    pub macro_name: String,
    pub span: Span,
    pub output: String,
}

// =============================================================================
// SECTION 2: EXPANSION STATE
// =============================================================================

/// State shared across one whole expansion: the syntax store, the optional
/// host evaluator, the application trace, and the recursion accounting.
pub struct Expansion {
    store: SyntaxStore,
    host: Option<Rc<dyn HostEval>>,
    trace: Vec<ExpansionStep>,
    options: ExpandOptions,
    depth: usize,
}

impl Default for Expansion {
    fn default() -> Expansion {
        Expansion::new()
    }
}

impl Expansion {
    pub fn new() -> Expansion {
        Expansion {
            store: SyntaxStore::new(),
            host: None,
            trace: Vec::new(),
            options: ExpandOptions::default(),
            depth: 0,
        }
    }

    pub fn with_host(host: Rc<dyn HostEval>) -> Expansion {
        Expansion {
            host: Some(host),
            ..Expansion::new()
        }
    }

    pub fn with_options(options: ExpandOptions) -> Expansion {
        Expansion {
            options,
            ..Expansion::new()
        }
    }

    pub fn set_host(&mut self, host: Rc<dyn HostEval>) {
        self.host = Some(host);
    }

    /// A fresh expansion sharing this one's host and options, used for
    /// expanding generated helper programs without mixing traces.
    pub fn sub_expansion(&self) -> Expansion {
        Expansion {
            store: SyntaxStore::new(),
            host: self.host.clone(),
            trace: Vec::new(),
            options: self.options,
            depth: 0,
        }
    }

    pub fn host(&self) -> Option<Rc<dyn HostEval>> {
        self.host.clone()
    }

    pub fn store_mut(&mut self) -> &mut SyntaxStore {
        &mut self.store
    }

    pub fn max_depth(&self) -> usize {
        self.options.max_expansion_depth
    }

    /// Enters one level of recursive expansion, failing once the depth
    /// limit is reached. Every `guard` pairs with a `leave`.
    pub(crate) fn guard(&mut self) -> Result<(), ExpandError> {
        if self.depth >= self.options.max_expansion_depth {
            return Err(recursion_limit(self.options.max_expansion_depth));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }

    pub(crate) fn record(&mut self, macro_name: &str, span: Span, output: String) {
        self.trace.push(ExpansionStep {
            macro_name: macro_name.to_string(),
            span,
            output,
        });
    }

    /// The macro applications recorded so far, in call order.
    pub fn trace(&self) -> &[ExpansionStep] {
        &self.trace
    }

    pub fn trace_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.trace)
    }
}

// =============================================================================
// SECTION 3: THE TWO-PASS DRIVER
// =============================================================================

/// Expands a token stream to finished terms within the given definition
/// scope.
pub fn expand(
    stx: &[Syntax],
    env: &mut MacroEnv,
    defscope: Option<&DefCtx>,
    exp: &mut Expansion,
) -> Result<Vec<Term>, ExpandError> {
    exp.guard()?;
    let out = expand_inner(stx, env, defscope, exp);
    exp.leave();
    out
}

fn expand_inner(
    stx: &[Syntax],
    env: &mut MacroEnv,
    defscope: Option<&DefCtx>,
    exp: &mut Expansion,
) -> Result<Vec<Term>, ExpandError> {
    let term_trees = expand_to_term_tree(stx, env, defscope, exp)?;
    term_trees
        .into_iter()
        .map(|t| expand_term_tree_to_final(t, env, defscope, exp))
        .collect()
}

// Pass one: enforest the stream, registering macros and hoisting `var`
// declarations as they appear. Macro definitions produce no output terms.
fn expand_to_term_tree(
    stx: &[Syntax],
    env: &mut MacroEnv,
    defscope: Option<&DefCtx>,
    exp: &mut Expansion,
) -> Result<Vec<Term>, ExpandError> {
    let mut rest = stx.to_vec();
    let mut terms = Vec::new();
    while !rest.is_empty() {
        let res = enforest(&rest, env, exp)?;
        rest = res.rest;
        match res.result {
            Term::MacroDef { name, body } => {
                let transformer = load_macro_def(&name, &body, env, exp)?;
                env.define(name.value(), transformer);
            }
            term => {
                if let Term::VarStatement { decls, .. } = &term {
                    add_vars_to_definition_ctx(decls, defscope)?;
                }
                if let Term::Block(d) | Term::Delimiter(d) = &term {
                    hoist_immediate_vars(d.stx.inner(), defscope);
                }
                terms.push(term);
            }
        }
    }
    Ok(terms)
}

// Pass two: recurse into sub-terms, expand delimiter contents, and run the
// function-scope hygiene.
fn expand_term_tree_to_final(
    term: Term,
    env: &mut MacroEnv,
    defscope: Option<&DefCtx>,
    exp: &mut Expansion,
) -> Result<Term, ExpandError> {
    match term {
        Term::ArrayLiteral(d) => Ok(Term::ArrayLiteral(expand_delim(d, env, defscope, exp)?)),
        Term::Block(d) => Ok(Term::Block(expand_delim(d, env, defscope, exp)?)),
        Term::ParenExpr(d) => Ok(Term::ParenExpr(expand_delim(d, env, defscope, exp)?)),
        Term::Delimiter(d) => Ok(Term::Delimiter(expand_delim(d, env, defscope, exp)?)),
        Term::Call {
            callee,
            args,
            delim,
            commas,
        } => {
            let callee = Box::new(expand_term_tree_to_final(*callee, env, defscope, exp)?);
            let args = args
                .into_iter()
                .map(|a| expand_term_tree_to_final(a, env, defscope, exp))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Term::Call {
                callee,
                args,
                delim,
                commas,
            })
        }
        Term::UnaryOp { op, expr } => Ok(Term::UnaryOp {
            op,
            expr: Box::new(expand_term_tree_to_final(*expr, env, defscope, exp)?),
        }),
        Term::BinOp { left, op, right } => Ok(Term::BinOp {
            left: Box::new(expand_term_tree_to_final(*left, env, defscope, exp)?),
            op,
            right: Box::new(expand_term_tree_to_final(*right, env, defscope, exp)?),
        }),
        Term::ObjDotGet { left, dot, right } => Ok(Term::ObjDotGet {
            left: Box::new(expand_term_tree_to_final(*left, env, defscope, exp)?),
            dot,
            right,
        }),
        Term::VarDecl {
            ident,
            eq,
            init,
            comma,
        } => {
            let init = match init {
                Some(init) => Some(Box::new(expand_term_tree_to_final(
                    *init, env, defscope, exp,
                )?)),
                None => None,
            };
            Ok(Term::VarDecl {
                ident,
                eq,
                init,
                comma,
            })
        }
        Term::VarStatement { kw, decls } => {
            let decls = decls
                .into_iter()
                .map(|d| expand_term_tree_to_final(d, env, defscope, exp))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Term::VarStatement { kw, decls })
        }
        Term::NamedFun {
            kw,
            name,
            params,
            body,
        } => {
            let (params, body) = expand_function_scope(params, body, env, exp)?;
            Ok(Term::NamedFun {
                kw,
                name,
                params,
                body,
            })
        }
        Term::AnonFun { kw, params, body } => {
            let (params, body) = expand_function_scope(params, body, env, exp)?;
            Ok(Term::AnonFun { kw, params, body })
        }
        Term::CatchClause { kw, params, body } => {
            let (params, body) = expand_function_scope(params, body, env, exp)?;
            Ok(Term::CatchClause { kw, params, body })
        }
        other => Ok(other),
    }
}

fn expand_delim(
    d: DelimTerm,
    env: &mut MacroEnv,
    defscope: Option<&DefCtx>,
    exp: &mut Expansion,
) -> Result<DelimTerm, ExpandError> {
    let expanded = expand(d.stx.inner(), env, defscope, exp)?;
    Ok(DelimTerm {
        stx: d.stx,
        expanded: Some(expanded),
    })
}

// =============================================================================
// SECTION 4: SCOPE HYGIENE
// =============================================================================

// The heart of binding hygiene. A fresh definition context fences the
// function off from its surroundings; each parameter is alpha-renamed in
// both the parameter list and the body before the body expands, and the
// `var` renames the body expansion discovers are applied afterwards.
fn expand_function_scope(
    params: FunParams,
    body: FunBody,
    env: &mut MacroEnv,
    exp: &mut Expansion,
) -> Result<(FunParams, FunBody), ExpandError> {
    let FunParams::Raw(params_stx) = params else {
        return Err(assertion("function parameters were already expanded"));
    };
    let FunBody::Raw(body_stx) = body else {
        return Err(assertion("function body was already expanded"));
    };

    let new_def = DefCtx::new();
    let params_stx = params_stx.add_def_ctx(&new_def);
    let mut renamed_body = body_stx.add_def_ctx(&new_def);

    let param_idents: Vec<Syntax> = params_stx
        .inner()
        .iter()
        .filter(|s| s.is_identifier())
        .cloned()
        .collect();
    let mut renamed_params = Vec::with_capacity(param_idents.len());
    for param in &param_idents {
        let id = fresh();
        renamed_params.push(param.rename(param, id));
        renamed_body = renamed_body.rename(param, id);
    }

    let body_terms = expand(&[renamed_body], env, Some(&new_def), exp)?;
    if body_terms.len() != 1 {
        return Err(assertion("function body did not expand to a single term"));
    }
    let flattened = flatten(&body_terms);
    let final_body: Vec<Syntax> = flattened
        .iter()
        .map(|s| {
            let mut acc = s.clone();
            for entry in new_def.entries().iter() {
                acc = acc.rename(&entry.binder, entry.name);
            }
            acc
        })
        .collect();

    let mut flat_params = Vec::new();
    for (i, p) in renamed_params.iter().enumerate() {
        if i > 0 {
            flat_params.push(Syntax::punct(",", p.span()));
        }
        flat_params.push(p.clone());
    }
    let params_delim = wrap_delim(flat_params, &params_stx);
    let mut param_terms = expand(&[params_delim], env, Some(&new_def), exp)?;
    if param_terms.len() != 1 {
        return Err(assertion(
            "parameter list did not expand to a single term",
        ));
    }

    Ok((
        FunParams::Expanded(Box::new(param_terms.remove(0))),
        FunBody::Flattened(final_body),
    ))
}

/// Records each declared variable in the enclosing definition scope. A
/// redeclaration of the same spelling at the same mark depth keeps the
/// first recording.
fn add_vars_to_definition_ctx(
    decls: &[Term],
    defscope: Option<&DefCtx>,
) -> Result<(), ExpandError> {
    let def = defscope
        .ok_or_else(|| assertion("variable declaration outside any definition scope"))?;
    for decl in decls {
        if let Term::VarDecl { ident, .. } = decl {
            declare_in(def, ident);
        }
    }
    Ok(())
}

fn declare_in(def: &DefCtx, ident: &Syntax) {
    let duplicate = def.entries().iter().any(|e| {
        e.binder.token.value == ident.token.value
            && marks_of_full(&e.binder.context) == marks_of_full(&ident.context)
    });
    if duplicate {
        return;
    }
    def.push(DefEntry {
        binder: ident.clone(),
        name: fresh(),
    });
}

// Shallow scan of raw delimiter contents for `var` declarator lists, so
// declarations inside nested blocks reach the function scope before the
// block's own expansion runs. Harmless to run twice; redeclarations are
// dropped.
fn hoist_immediate_vars(inner: &[Syntax], defscope: Option<&DefCtx>) {
    let Some(def) = defscope else {
        return;
    };
    let mut i = 0;
    while i < inner.len() {
        if inner[i].is_keyword() && inner[i].value() == "var" {
            i += 1;
            while i < inner.len() && inner[i].is_identifier() {
                declare_in(def, &inner[i]);
                i += 1;
                while i < inner.len() && inner[i].value() != "," && inner[i].value() != ";" {
                    i += 1;
                }
                if i < inner.len() && inner[i].value() == "," {
                    i += 1;
                } else {
                    break;
                }
            }
        } else {
            i += 1;
        }
    }
}

// =============================================================================
// SECTION 5: TOP LEVEL
// =============================================================================

/// Expands a whole program. The input is wrapped in a synthetic function so
/// top-level declarations get the same scope hygiene as any function body;
/// the wrapper is stripped from the result.
pub fn expand_top_level(
    stx: &[Syntax],
    env: &mut MacroEnv,
    exp: &mut Expansion,
) -> Result<Vec<Syntax>, ExpandError> {
    let span = Span::default();
    let wrapper = vec![
        Syntax::keyword("function", span),
        Syntax::ident("$topLevel$", span),
        Syntax::delimiter("()", Vec::new(), span),
        Syntax::delimiter("{}", stx.to_vec(), span),
    ];
    let mut terms = expand(&wrapper, env, None, exp)?;
    if terms.len() != 1 {
        return Err(assertion("top level did not expand to a single function"));
    }
    let Term::NamedFun {
        body: FunBody::Flattened(body),
        ..
    } = terms.remove(0)
    else {
        return Err(assertion("top-level wrapper lost its shape"));
    };
    if body.len() < 2 {
        return Err(assertion("top-level body lost its braces"));
    }
    Ok(body[1..body.len() - 1].to_vec())
}
