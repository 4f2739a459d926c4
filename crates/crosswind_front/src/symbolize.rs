//! Symbol resolution.
//!
//! Two passes over the topological module order, with macro expansion
//! between them:
//!
//! 1. a **global pass** binding every id outside function and macro
//!    bodies (run non-strictly during the import fixed point, strictly
//!    once the pool has settled), and
//! 2. a **function-body pass** maintaining a stack of scope maps plus an
//!    occupancy set seeded with the module's global names, so a local
//!    may never shadow anything visible at its declaration site.

use crate::ast::{Ast, ChildSlot, ModId, NodeFlags, NodeId, NodeKind};
use crate::ctx::{Ctx, Module};
use crate::macros;
use crate::symtab::{resolve_sym, SymTab};
use crate::verify;
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc};
use std::collections::{HashMap, HashSet};

/// Builds a module's global symbol table from its top-level
/// definitions. Imports are added later by the pool, once their target
/// module exists; polymorphic functions are deferred to type inference.
pub fn extract_symtab(ast: &Ast, defmod: NodeId) -> Result<SymTab> {
    let mut symtab = SymTab::new();
    let body = match ast.kind(defmod) {
        NodeKind::DefMod { body, .. } => body.clone(),
        _ => unreachable!("extract_symtab on a non-module node"),
    };
    for node in body {
        match ast.kind(node) {
            NodeKind::Comment { .. }
            | NodeKind::StmtStaticAssert { .. }
            | NodeKind::Import { .. } => continue,
            NodeKind::DefFun { poly: true, .. } => continue,
            _ => symtab.add_top_level_sym(ast, node)?,
        }
    }
    Ok(symtab)
}

fn unresolved(loc: SrcLoc, name: &str) -> CompileError {
    CompileError::new(
        ErrorKind::Symbol,
        loc,
        format!("cannot resolve symbol `{}`", name),
    )
}

/// Global pass: binds ids in every non-function, non-macro top-level
/// node of every module. In non-strict mode unresolved ids are left
/// untouched so the import fixed point can retry them next round.
pub fn resolve_globals(ctx: &mut Ctx, strict: bool) -> Result<()> {
    let Ctx {
        ref mut ast,
        ref modules,
        builtin,
        ..
    } = *ctx;
    for module in modules.iter() {
        let body = match ast.kind(module.def) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        for node in body {
            if matches!(
                ast.kind(node),
                NodeKind::DefFun { .. } | NodeKind::DefMacro { .. } | NodeKind::Comment { .. }
            ) {
                continue;
            }
            resolve_globals_in(ast, modules, &module.symtab, builtin, node, strict)?;
        }
    }
    Ok(())
}

fn resolve_globals_in(
    ast: &mut Ast,
    modules: &[Module],
    symtab: &SymTab,
    builtin: Option<ModId>,
    node: NodeId,
    strict: bool,
) -> Result<()> {
    if let NodeKind::Id { name } = ast.kind(node) {
        if ast.node(node).x_symbol.is_some() {
            return Ok(());
        }
        let name = name.clone();
        let components: Vec<&str> = name.split("::").collect();
        match resolve_sym(ast, modules, symtab, builtin, &components, false)? {
            Some(def) => ast.set_symbol(node, def),
            None if strict => return Err(unresolved(ast.loc(node), &name)),
            None => {}
        }
        return Ok(());
    }
    for slot in ast.kind(node).child_slots() {
        match slot {
            ChildSlot::Node { id, .. } => {
                resolve_globals_in(ast, modules, symtab, builtin, id, strict)?
            }
            ChildSlot::List { ids, .. } => {
                for id in ids {
                    resolve_globals_in(ast, modules, symtab, builtin, id, strict)?;
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Function-body pass
// =============================================================================

/// Scope maps plus the occupancy set that enforces the no-shadowing
/// rule. The occupancy set starts out holding the module's global
/// names; scope exit removes exactly the names the scope declared.
struct Scopes {
    maps: Vec<HashMap<String, NodeId>>,
    occupied: HashSet<String>,
}

impl Scopes {
    fn new(symtab: &SymTab) -> Self {
        Scopes {
            maps: Vec::new(),
            occupied: symtab.all_names().map(|s| s.to_string()).collect(),
        }
    }

    fn push(&mut self) {
        self.maps.push(HashMap::new());
    }

    fn pop(&mut self) {
        let map = self.maps.pop().expect("scope stack underflow");
        for name in map.keys() {
            self.occupied.remove(name);
        }
    }

    fn declare(&mut self, ast: &Ast, name: &str, node: NodeId) -> Result<()> {
        if self.occupied.contains(name) {
            return Err(CompileError::new(
                ErrorKind::Symbol,
                ast.loc(node),
                format!("duplicate symbol `{}` shadows an existing name", name),
            ));
        }
        self.occupied.insert(name.to_string());
        self.maps
            .last_mut()
            .expect("declaration outside any scope")
            .insert(name.to_string(), node);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        for map in self.maps.iter().rev() {
            if let Some(&node) = map.get(name) {
                return Some(node);
            }
        }
        None
    }
}

/// Resolves every id in the bodies of a module's functions.
pub fn resolve_function_bodies(ctx: &mut Ctx, mid: ModId) -> Result<()> {
    let Ctx {
        ref mut ast,
        ref modules,
        builtin,
        ..
    } = *ctx;
    let module = &modules[mid.index()];
    let body = match ast.kind(module.def) {
        NodeKind::DefMod { body, .. } => body.clone(),
        _ => unreachable!(),
    };
    for node in body {
        if matches!(ast.kind(node), NodeKind::DefFun { .. }) {
            let mut scopes = Scopes::new(&module.symtab);
            resolve_in_fun(ast, modules, &module.symtab, builtin, &mut scopes, node)?;
            assert!(scopes.maps.is_empty(), "unbalanced scope stack");
        }
    }
    Ok(())
}

fn resolve_in_fun(
    ast: &mut Ast,
    modules: &[Module],
    symtab: &SymTab,
    builtin: Option<ModId>,
    scopes: &mut Scopes,
    node: NodeId,
) -> Result<()> {
    let flags = ast.flags(node);
    match ast.kind(node) {
        NodeKind::DefVar { name, .. } => {
            let name = name.clone();
            scopes.declare(ast, &name, node)?;
        }
        NodeKind::Id { name } => {
            if ast.node(node).x_symbol.is_some() {
                return Ok(());
            }
            let name = name.clone();
            let components: Vec<&str> = name.split("::").collect();
            let def = if components.len() == 1 {
                scopes.lookup(components[0])
            } else {
                None
            };
            let def = match def {
                Some(d) => Some(d),
                None => resolve_sym(ast, modules, symtab, builtin, &components, false)?,
            };
            match def {
                Some(d) => ast.set_symbol(node, d),
                None => return Err(unresolved(ast.loc(node), &name)),
            }
            return Ok(());
        }
        _ => {}
    }

    if flags.contains(NodeFlags::NEW_SCOPE) {
        scopes.push();
        if let NodeKind::DefFun { params, .. } = ast.kind(node) {
            for param in params.clone() {
                if let NodeKind::FunParam { name, .. } = ast.kind(param) {
                    let name = name.clone();
                    scopes.declare(ast, &name, param)?;
                }
            }
        }
    }

    let poly_call = matches!(ast.kind(node), NodeKind::ExprCall { poly: true, .. });
    for slot in ast.kind(node).child_slots() {
        match slot {
            ChildSlot::Node { name, id } => {
                if poly_call && name == "callee" {
                    // bound during type inference, once the first
                    // argument's type is known
                    continue;
                }
                resolve_in_fun(ast, modules, symtab, builtin, scopes, id)?;
            }
            ChildSlot::List { name, ids } => {
                let own_scope = matches!(name, "body_t" | "body_f");
                if own_scope {
                    scopes.push();
                }
                for id in ids {
                    resolve_in_fun(ast, modules, symtab, builtin, scopes, id)?;
                }
                if own_scope {
                    scopes.pop();
                }
            }
        }
    }

    if flags.contains(NodeFlags::NEW_SCOPE) {
        scopes.pop();
    }
    Ok(())
}

/// Full symbol phase: strict global pass, macro expansion inside
/// functions, function-body resolution, then the symbol audit.
pub fn decorate_ast_with_symbols(ctx: &mut Ctx) -> Result<()> {
    resolve_globals(ctx, true)?;

    let order = ctx.topo.clone();
    for &mid in &order {
        for node in ctx.module_body(mid) {
            if matches!(ctx.ast.kind(node), NodeKind::DefFun { .. }) {
                macros::expand_macros_in_fun(ctx, mid, node)?;
            }
        }
    }
    for &mid in &order {
        resolve_function_bodies(ctx, mid)?;
    }
    verify::verify_symbols(ctx)
}
