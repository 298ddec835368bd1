//! The lexical-context model: marks, renames, definition contexts, and the
//! name-resolution algorithm that walks them.
//!
//! Every syntax object carries a persistent context chain. Extension always
//! allocates a new node; existing nodes are never mutated. Resolution maps a
//! `(name, context)` pair to the canonical hygienic name an emitter should
//! print: a reference binds to the definition introduced at the same
//! expansion depth (same enclosing marks) as its binder, not merely the
//! lexically nearest one of the same spelling.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::syntax::Syntax;

// =============================================================================
// SECTION 1: FRESH NAMES
// =============================================================================

static NEXT_FRESH: AtomicUsize = AtomicUsize::new(0);

/// Draws the next id from the process-wide monotonic counter.
///
/// Marks, rename ids, and syntax-store slots all draw from this one counter,
/// so equality of two ids implies they came from the same allocation.
pub fn fresh() -> usize {
    NEXT_FRESH.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// SECTION 2: CONTEXT CHAINS
// =============================================================================

/// One node in a persistent context chain.
#[derive(Debug)]
pub enum Context {
    /// Top level; no enclosing hygiene operation.
    Top,
    /// A fresh expansion boundary was crossed.
    Mark { mark: usize, parent: Rc<Context> },
    /// The identifier `binder` was alpha-renamed to the synthetic name
    /// `binder.value + "$" + name` within `def` (when present).
    Rename {
        binder: Syntax,
        name: usize,
        parent: Rc<Context>,
        def: Option<DefCtx>,
    },
    /// A scope boundary associated with a definition-context list.
    Def { def: DefCtx, parent: Rc<Context> },
}

/// One recorded renaming inside a definition context.
#[derive(Debug)]
pub struct DefEntry {
    /// The identifier occurrence that introduced the binding.
    pub binder: Syntax,
    /// The fresh rename id assigned to it.
    pub name: usize,
}

/// An ordered, append-only list of renamings scoped to one lexical region
/// (function body, catch block, top level). Shared by reference among all
/// syntax produced while expanding that region, and appended to as new `var`
/// declarations are discovered during the first pass.
#[derive(Clone, Debug, Default)]
pub struct DefCtx {
    entries: Rc<RefCell<Vec<DefEntry>>>,
}

impl DefCtx {
    pub fn new() -> DefCtx {
        DefCtx::default()
    }

    /// Identity comparison. Two definition contexts are the same scope iff
    /// they are the same allocation.
    pub fn ptr_eq(&self, other: &DefCtx) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    pub fn push(&self, entry: DefEntry) {
        self.entries.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Ref<'_, Vec<DefEntry>> {
        self.entries.borrow()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    // Extends `base` with one Rename node per recorded renaming of `name`,
    // in recording order. The outermost node ends up being the last one
    // recorded, which is what resolution walks first.
    fn renames_onto(&self, name: &str, base: Rc<Context>) -> Rc<Context> {
        let mut acc = base;
        for entry in self.entries.borrow().iter() {
            if entry.binder.token.value == name {
                acc = Rc::new(Context::Rename {
                    binder: entry.binder.clone(),
                    name: entry.name,
                    parent: acc,
                    def: Some(self.clone()),
                });
            }
        }
        acc
    }
}

// =============================================================================
// SECTION 3: MARK SEQUENCES
// =============================================================================

// Adjacent duplicate marks cancel: a syntax object marked twice with the
// same mark is back where it started.
fn remdup(mark: usize, mut rest: Vec<usize>) -> Vec<usize> {
    if rest.first() == Some(&mark) {
        rest.remove(0);
        return rest;
    }
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(mark);
    out.append(&mut rest);
    out
}

/// The sequence of enclosing marks on `ctx`, computed up to (but not
/// including) the point where the rename whose synthetic name equals
/// `stop_name` would itself appear.
pub fn marks_of(ctx: &Rc<Context>, stop_name: Option<&str>, original_name: &str) -> Vec<usize> {
    match &**ctx {
        Context::Top => Vec::new(),
        Context::Mark { mark, parent } => {
            remdup(*mark, marks_of(parent, stop_name, original_name))
        }
        Context::Def { parent, .. } => marks_of(parent, stop_name, original_name),
        Context::Rename { name, parent, .. } => {
            if let Some(stop) = stop_name {
                if stop == format!("{}${}", original_name, name) {
                    return Vec::new();
                }
            }
            marks_of(parent, stop_name, original_name)
        }
    }
}

/// The full mark sequence of a context, with no rename cut-off.
pub fn marks_of_full(ctx: &Rc<Context>) -> Vec<usize> {
    marks_of(ctx, None, "")
}

// =============================================================================
// SECTION 4: RESOLUTION
// =============================================================================

/// Resolves an identifier syntax object to its canonical hygienic name.
///
/// Pure in `(token value, context)`: resolving the same syntax object twice
/// yields the same name.
pub fn resolve(stx: &Syntax) -> String {
    resolve_ctx(&stx.token.value, &stx.context, &[], &[])
}

fn in_set(set: &[DefCtx], def: &DefCtx) -> bool {
    set.iter().any(|d| d.ptr_eq(def))
}

fn union(set: &[DefCtx], def: &DefCtx) -> Vec<DefCtx> {
    if in_set(set, def) {
        return set.to_vec();
    }
    let mut out = set.to_vec();
    out.push(def.clone());
    out
}

// The spine set records definition contexts already applied on the current
// resolution path (so re-applying them cannot recurse forever); the branch
// set bounds the independent resolution of each rename's own binder.
fn resolve_ctx(name: &str, ctx: &Rc<Context>, spine: &[DefCtx], branch: &[DefCtx]) -> String {
    match &**ctx {
        Context::Top => name.to_string(),
        Context::Mark { parent, .. } => resolve_ctx(name, parent, spine, branch),
        Context::Def { def, parent } => {
            if in_set(spine, def) {
                resolve_ctx(name, parent, spine, branch)
            } else {
                let extended = def.renames_onto(name, parent.clone());
                resolve_ctx(name, &extended, spine, &union(branch, def))
            }
        }
        Context::Rename {
            binder,
            name: rename_id,
            parent,
            def,
        } => {
            let spine2 = match def {
                Some(d) => union(spine, d),
                None => spine.to_vec(),
            };
            let id_name = resolve_ctx(&binder.token.value, &binder.context, branch, branch);
            let sub_name = resolve_ctx(name, parent, &spine2, branch);
            if id_name == sub_name {
                let synthetic = format!("{}${}", name, rename_id);
                let id_marks = marks_of(&binder.context, Some(&synthetic), name);
                let sub_marks = marks_of(parent, Some(&synthetic), name);
                if id_marks == sub_marks {
                    return synthetic;
                }
            }
            resolve_ctx(name, parent, &spine2, branch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Span;

    fn ident(value: &str) -> Syntax {
        Syntax::ident(value, Span::default())
    }

    #[test]
    fn fresh_ids_are_unique() {
        let drawn: Vec<usize> = (0..64).map(|_| fresh()).collect();
        for (i, a) in drawn.iter().enumerate() {
            for b in &drawn[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let x = ident("x").mark(fresh());
        assert_eq!(resolve(&x), resolve(&x));
    }

    #[test]
    fn top_context_resolves_to_itself() {
        assert_eq!(resolve(&ident("x")), "x");
    }

    #[test]
    fn rename_produces_synthetic_name() {
        let x = ident("x");
        let id = fresh();
        let renamed = x.rename(&x, id);
        assert_eq!(resolve(&renamed), format!("x${}", id));
    }

    #[test]
    fn rename_of_other_spelling_is_inert() {
        let x = ident("x");
        let y = ident("y").rename(&x, fresh());
        assert_eq!(resolve(&y), "y");
    }

    #[test]
    fn duplicate_marks_cancel() {
        let m = fresh();
        let x = ident("x").mark(m).mark(m);
        assert_eq!(marks_of_full(&x.context), Vec::<usize>::new());
    }

    #[test]
    fn distinct_marks_accumulate() {
        let m1 = fresh();
        let m2 = fresh();
        let x = ident("x").mark(m1).mark(m2);
        assert_eq!(marks_of_full(&x.context), vec![m2, m1]);
    }

    #[test]
    fn marked_identifier_does_not_take_unmarked_rename() {
        // The binder is unmarked but the lookup occurrence carries a fresh
        // mark, so the mark sequences differ and the rename must not apply.
        let binder = ident("tmp");
        let id = fresh();
        let use_site = ident("tmp").mark(fresh()).rename(&binder, id);
        assert_eq!(resolve(&use_site), "tmp");
    }

    #[test]
    fn def_ctx_renames_apply_through_scope_boundary() {
        let def = DefCtx::new();
        let binder = ident("x").add_def_ctx(&def);
        let id = fresh();
        def.push(DefEntry {
            binder: binder.clone(),
            name: id,
        });
        let use_site = ident("x").add_def_ctx(&def);
        assert_eq!(resolve(&use_site), format!("x${}", id));
    }
}
