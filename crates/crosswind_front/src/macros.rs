//! Hygienic macro expansion.
//!
//! Runs after the global symbol pass and before function-body
//! resolution, so expansions can reference already-resolved globals yet
//! still introduce locals. Expansion is bounded by
//! [`MAX_MACRO_NESTING`]; `$param` placeholders substitute cloned
//! argument subtrees, `gen_ids` entries are renamed to fresh
//! capture-proof identifiers, and a multi-statement expansion splices
//! into the surrounding list through a `MacroListArg`.

use crate::ast::{Ast, ChildSlot, ModId, NodeFlags, NodeId, NodeKind};
use crate::ctx::Ctx;
use crate::symtab::resolve_macro;
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc};
use std::collections::HashMap;

/// Maximum depth of macros expanding to further macro invocations.
pub const MAX_MACRO_NESTING: usize = 4;

/// Per-function expansion state handing out fresh hygiene ids.
pub struct MacroContext {
    next_uid: u32,
}

impl MacroContext {
    pub fn new() -> Self {
        MacroContext { next_uid: 1 }
    }

    fn fresh_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    /// Turns a `$name` gen-id into a unique plain identifier. The sigil
    /// moves inside the name (`$tmp` → `tmp$3`), so nothing hygiene-made
    /// can collide with source identifiers or survive the verifier's
    /// leading-sigil check.
    fn fresh_name(&mut self, gen_id: &str) -> String {
        format!("{}${}", gen_id.trim_start_matches('$'), self.fresh_uid())
    }
}

impl Default for MacroContext {
    fn default() -> Self {
        Self::new()
    }
}

fn macro_err(loc: SrcLoc, message: impl Into<String>) -> CompileError {
    CompileError::new(ErrorKind::Macro, loc, message)
}

/// Expands every macro form inside one function definition.
pub fn expand_macros_in_fun(ctx: &mut Ctx, mid: ModId, fun: NodeId) -> Result<()> {
    let mut mctx = MacroContext::new();
    find_and_expand(ctx, mid, fun, 0, &mut mctx)
}

/// Rewrites the child slots of `node`, expanding any child flagged
/// `TO_BE_EXPANDED`. List slots splice `MacroListArg` results; single
/// slots reject them.
fn find_and_expand(
    ctx: &mut Ctx,
    mid: ModId,
    node: NodeId,
    nesting: usize,
    mctx: &mut MacroContext,
) -> Result<()> {
    let slots = ctx.ast.kind(node).child_slots();
    let mut new_slots = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            ChildSlot::Node { name, id } => {
                find_and_expand(ctx, mid, id, nesting, mctx)?;
                let mut new_id = id;
                if ctx.ast.flags(id).contains(NodeFlags::TO_BE_EXPANDED) {
                    new_id = expand_one(ctx, mid, id, nesting, mctx)?;
                    if matches!(ctx.ast.kind(new_id), NodeKind::MacroListArg { .. }) {
                        return Err(macro_err(
                            ctx.ast.loc(id),
                            "macro expands to a statement list where a single node is required",
                        ));
                    }
                }
                new_slots.push(ChildSlot::Node { name, id: new_id });
            }
            ChildSlot::List { name, ids } => {
                let mut new_ids = Vec::with_capacity(ids.len());
                for id in ids {
                    find_and_expand(ctx, mid, id, nesting, mctx)?;
                    if !ctx.ast.flags(id).contains(NodeFlags::TO_BE_EXPANDED) {
                        new_ids.push(id);
                        continue;
                    }
                    let expanded = expand_one(ctx, mid, id, nesting, mctx)?;
                    match ctx.ast.kind(expanded) {
                        NodeKind::MacroListArg { args } => new_ids.extend(args.iter().copied()),
                        _ => new_ids.push(expanded),
                    }
                }
                new_slots.push(ChildSlot::List { name, ids: new_ids });
            }
        }
    }
    ctx.ast.node_mut(node).kind.set_child_slots(new_slots);
    Ok(())
}

/// Expands one `TO_BE_EXPANDED` node: the macro-like built-ins, or a
/// proper macro invocation resolved through the macro namespace.
fn expand_one(
    ctx: &mut Ctx,
    mid: ModId,
    node: NodeId,
    nesting: usize,
    mctx: &mut MacroContext,
) -> Result<NodeId> {
    let loc = ctx.ast.loc(node);
    if nesting >= MAX_MACRO_NESTING {
        return Err(macro_err(
            loc,
            format!("macro nesting exceeds the limit of {}", MAX_MACRO_NESTING),
        ));
    }
    match ctx.ast.kind(node).clone() {
        NodeKind::ExprSrcLoc => Ok(ctx.ast.alloc(
            NodeKind::ValNum {
                number: format!("{}_u32", loc.line),
            },
            loc,
        )),
        NodeKind::ExprStringify { expr } => match ctx.ast.kind(expr) {
            NodeKind::Id { name } => {
                let text = format!("\"{}\"", name);
                Ok(ctx.ast.alloc(NodeKind::ValString { raw: true, text }, loc))
            }
            other => Err(macro_err(
                ctx.ast.loc(expr),
                format!("stringify expects an identifier, got `{}`", other.tag()),
            )),
        },
        NodeKind::MacroInvoke { name, args } => {
            let components: Vec<&str> = name.split("::").collect();
            let macro_def = {
                let Ctx {
                    ref modules,
                    builtin,
                    ..
                } = *ctx;
                resolve_macro(modules, &modules[mid.index()].symtab, builtin, &components)
            };
            let macro_def = macro_def
                .ok_or_else(|| macro_err(loc, format!("invocation of unknown macro `{}`", name)))?;
            let expanded = expand_invocation(ctx, node, macro_def, &args, mctx)?;
            // Expand whatever the expansion itself produced.
            find_and_expand(ctx, mid, expanded, nesting + 1, mctx)?;
            if ctx.ast.flags(expanded).contains(NodeFlags::TO_BE_EXPANDED) {
                return expand_one(ctx, mid, expanded, nesting + 1, mctx);
            }
            Ok(expanded)
        }
        other => unreachable!("`{}` is not expandable", other.tag()),
    }
}

/// What a `$name` stands for during one invocation.
enum Binding {
    /// A caller-supplied argument subtree.
    Arg(NodeId),
    /// A fresh hygiene identifier.
    Gensym(String),
}

/// Substitution result: ephemeral-list arguments splice several nodes
/// into list positions.
#[derive(Debug)]
enum Subst {
    One(NodeId),
    Many(Vec<NodeId>),
}

fn expand_invocation(
    ctx: &mut Ctx,
    invoke: NodeId,
    macro_def: NodeId,
    args: &[NodeId],
    mctx: &mut MacroContext,
) -> Result<NodeId> {
    let loc = ctx.ast.loc(invoke);
    let (macro_name, params, gen_ids, body) = match ctx.ast.kind(macro_def) {
        NodeKind::DefMacro {
            name,
            params,
            gen_ids,
            body,
            ..
        } => (name.clone(), params.clone(), gen_ids.clone(), body.clone()),
        other => unreachable!("macro resolution produced `{}`", other.tag()),
    };
    if args.len() != params.len() {
        return Err(macro_err(
            loc,
            format!(
                "macro `{}` expects {} argument(s), got {}",
                macro_name,
                params.len(),
                args.len()
            ),
        ));
    }
    let mut bindings: HashMap<String, Binding> = HashMap::new();
    for (param, &arg) in params.iter().zip(args) {
        bindings.insert(param.clone(), Binding::Arg(arg));
    }
    for gen_id in &gen_ids {
        bindings.insert(gen_id.clone(), Binding::Gensym(mctx.fresh_name(gen_id)));
    }

    let mut out = Vec::new();
    for node in body {
        match substitute(&mut ctx.ast, node, &bindings)? {
            Subst::One(id) => out.push(id),
            Subst::Many(ids) => out.extend(ids),
        }
    }
    match out.len() {
        1 => Ok(out[0]),
        _ => Ok(ctx.ast.alloc(NodeKind::MacroListArg { args: out }, loc)),
    }
}

/// String-valued name fields that may carry a `$name` inside a macro
/// body (`(let $tmp …)`, `(. $obj $field)`), rewritten alongside the
/// MacroId child nodes.
fn macro_name_slots(kind: &mut NodeKind) -> Vec<&mut String> {
    match kind {
        NodeKind::DefVar { name, .. }
        | NodeKind::DefGlobal { name, .. }
        | NodeKind::FunParam { name, .. }
        | NodeKind::ExprField { field: name, .. }
        | NodeKind::FieldVal { field: name, .. }
        | NodeKind::ExprOffsetof { field: name, .. } => vec![name],
        _ => Vec::new(),
    }
}

fn rewrite_macro_names(
    ast: &Ast,
    kind: &mut NodeKind,
    bindings: &HashMap<String, Binding>,
    loc: SrcLoc,
) -> Result<()> {
    for slot in macro_name_slots(kind) {
        if !slot.starts_with('$') {
            continue;
        }
        let replacement = match bindings.get(slot.as_str()) {
            Some(Binding::Gensym(fresh)) => fresh.clone(),
            Some(Binding::Arg(arg)) => match ast.kind(*arg) {
                NodeKind::Id { name } => name.clone(),
                other => {
                    return Err(macro_err(
                        loc,
                        format!(
                            "macro argument used as a name must be an identifier, got `{}`",
                            other.tag()
                        ),
                    ))
                }
            },
            None => return Err(macro_err(loc, format!("unbound macro id `{}`", slot))),
        };
        *slot = replacement;
    }
    Ok(())
}

/// Clones a macro-body subtree, replacing `$name` placeholders from the
/// bindings. Arguments are cloned per use site.
fn substitute(
    ast: &mut Ast,
    node: NodeId,
    bindings: &HashMap<String, Binding>,
) -> Result<Subst> {
    let loc = ast.loc(node);
    if let NodeKind::MacroId { name } = ast.kind(node) {
        let name = name.clone();
        return match bindings.get(&name) {
            Some(Binding::Arg(arg)) => match ast.kind(*arg) {
                NodeKind::EphemeralList { args } => {
                    let items = args.clone();
                    Ok(Subst::Many(
                        items
                            .into_iter()
                            .map(|item| ast.clone_subtree(item, false))
                            .collect(),
                    ))
                }
                _ => Ok(Subst::One(ast.clone_subtree(*arg, false))),
            },
            Some(Binding::Gensym(fresh)) => Ok(Subst::One(ast.alloc(
                NodeKind::Id {
                    name: fresh.clone(),
                },
                loc,
            ))),
            None => Err(macro_err(loc, format!("unbound macro id `{}`", name))),
        };
    }

    let mut kind = ast.kind(node).clone();
    rewrite_macro_names(ast, &mut kind, bindings, loc)?;
    let mut new_slots = Vec::new();
    for slot in kind.child_slots() {
        match slot {
            ChildSlot::Node { name, id } => {
                let replacement = match substitute(ast, id, bindings)? {
                    Subst::One(one) => one,
                    Subst::Many(many) if many.len() == 1 => many[0],
                    Subst::Many(_) => {
                        return Err(macro_err(
                            ast.loc(id),
                            "list-valued macro argument used where a single node is required",
                        ))
                    }
                };
                new_slots.push(ChildSlot::Node {
                    name,
                    id: replacement,
                });
            }
            ChildSlot::List { name, ids } => {
                let mut new_ids = Vec::with_capacity(ids.len());
                for id in ids {
                    match substitute(ast, id, bindings)? {
                        Subst::One(one) => new_ids.push(one),
                        Subst::Many(many) => new_ids.extend(many),
                    }
                }
                new_slots.push(ChildSlot::List { name, ids: new_ids });
            }
        }
    }
    kind.set_child_slots(new_slots);
    Ok(Subst::One(ast.alloc(kind, loc)))
}
