//! Symbol tables for global symbols.
//!
//! Each module keeps one map per declaration kind plus an `all` map used
//! for duplicate detection (and, during function-body resolution, as the
//! seed of the occupancy set that rejects shadowing). Qualified names
//! `a::b[::c]` resolve through the current module, imported modules
//! (requiring `pub`), enum members, and finally the `builtin` module.

use crate::ast::{Ast, ModId, NodeId, NodeKind};
use crate::ctx::Module;
use crosswind_base::{CompileError, ErrorKind, Result};
use std::collections::HashMap;

/// Symbol table for one module's global symbols.
#[derive(Default, Debug)]
pub struct SymTab {
    type_syms: HashMap<String, NodeId>,
    rec_syms: HashMap<String, NodeId>,
    enum_syms: HashMap<String, NodeId>,
    fun_syms: HashMap<String, NodeId>,
    macro_syms: HashMap<String, NodeId>,
    var_syms: HashMap<String, NodeId>,
    mod_syms: HashMap<String, ModId>,
    all_syms: HashMap<String, NodeId>,
}

impl SymTab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every global in this module (the occupancy seed).
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.all_syms.keys().map(|s| s.as_str())
    }

    pub fn macro_def(&self, name: &str) -> Option<NodeId> {
        self.macro_syms.get(name).copied()
    }

    pub fn imported_module(&self, name: &str) -> Option<ModId> {
        self.mod_syms.get(name).copied()
    }

    fn add_with_dup_check(&mut self, ast: &Ast, name: &str, node: NodeId) -> Result<()> {
        if let Some(&prev) = self.all_syms.get(name) {
            return Err(CompileError::new(
                ErrorKind::Symbol,
                ast.loc(node),
                format!(
                    "duplicate symbol `{}`, previously defined at line {}",
                    name,
                    ast.loc(prev).line
                ),
            ));
        }
        self.all_syms.insert(name.to_string(), node);
        Ok(())
    }

    /// Registers a top-level definition. Imports go through
    /// [`SymTab::add_import`] once their target module is known.
    pub fn add_top_level_sym(&mut self, ast: &Ast, node: NodeId) -> Result<()> {
        let (name, map) = match ast.kind(node) {
            NodeKind::DefFun { name, .. } => (name.clone(), &mut self.fun_syms),
            NodeKind::DefMacro { name, .. } => (name.clone(), &mut self.macro_syms),
            NodeKind::DefGlobal { name, .. } => (name.clone(), &mut self.var_syms),
            NodeKind::DefRec { name, .. } => (name.clone(), &mut self.rec_syms),
            NodeKind::DefEnum { name, .. } => (name.clone(), &mut self.enum_syms),
            NodeKind::DefType { name, .. } => (name.clone(), &mut self.type_syms),
            other => {
                return Err(CompileError::new(
                    ErrorKind::Symbol,
                    ast.loc(node),
                    format!("unexpected toplevel node `{}`", other.tag()),
                ))
            }
        };
        map.insert(name.clone(), node);
        self.add_with_dup_check(ast, &name, node)
    }

    /// Registers a resolved import under its alias (or plain name).
    pub fn add_import(&mut self, ast: &Ast, import: NodeId, target: ModId) -> Result<()> {
        let name = match ast.kind(import) {
            NodeKind::Import { name, alias, .. } => {
                if alias.is_empty() {
                    // a/b/c imports register under their last component
                    name.rsplit('/').next().unwrap_or(name).to_string()
                } else {
                    alias.clone()
                }
            }
            _ => unreachable!("add_import on a non-import node"),
        };
        self.mod_syms.insert(name.clone(), target);
        self.add_with_dup_check(ast, &name, import)
    }

    /// Single-component lookup in this module only.
    pub fn resolve_sym_here(
        &self,
        ast: &Ast,
        name: &str,
        must_be_public: bool,
    ) -> Result<Option<NodeId>> {
        for map in [
            &self.type_syms,
            &self.fun_syms,
            &self.rec_syms,
            &self.enum_syms,
            &self.var_syms,
            &self.macro_syms,
        ] {
            if let Some(&node) = map.get(name) {
                if must_be_public && !is_pub(ast, node) {
                    return Err(CompileError::new(
                        ErrorKind::Symbol,
                        ast.loc(node),
                        format!("`{}` is not public", name),
                    ));
                }
                return Ok(Some(node));
            }
        }
        Ok(None)
    }
}

fn is_pub(ast: &Ast, node: NodeId) -> bool {
    match ast.kind(node) {
        NodeKind::DefFun { pub_vis, .. }
        | NodeKind::DefRec { pub_vis, .. }
        | NodeKind::DefEnum { pub_vis, .. }
        | NodeKind::DefType { pub_vis, .. }
        | NodeKind::DefGlobal { pub_vis, .. }
        | NodeKind::DefMacro { pub_vis, .. } => *pub_vis,
        _ => false,
    }
}

/// Finds the `EnumVal` member of an enum definition.
pub fn resolve_enum_item(ast: &Ast, enum_def: NodeId, member: &str) -> Option<NodeId> {
    let items = match ast.kind(enum_def) {
        NodeKind::DefEnum { items, .. } => items,
        _ => return None,
    };
    items.iter().copied().find(|&item| {
        matches!(ast.kind(item), NodeKind::EnumVal { name, .. } if name == member)
    })
}

/// Resolves a qualified name against a module's table:
/// one component → here, then the builtin module; two components →
/// enum member here, or a public symbol of an imported module; three
/// components → a public enum member of an imported module.
///
/// Returns `Ok(None)` when nothing matches so non-strict callers (the
/// import fixed point) can retry later.
pub fn resolve_sym(
    ast: &Ast,
    modules: &[Module],
    cur: &SymTab,
    builtin: Option<ModId>,
    components: &[&str],
    must_be_public: bool,
) -> Result<Option<NodeId>> {
    if components.len() == 2 {
        if let Some(&enum_def) = cur.enum_syms.get(components[0]) {
            if must_be_public && !is_pub(ast, enum_def) {
                return Err(CompileError::new(
                    ErrorKind::Symbol,
                    ast.loc(enum_def),
                    format!("`{}` is not public", components[0]),
                ));
            }
            return Ok(resolve_enum_item(ast, enum_def, components[1]));
        }
    }
    if components.len() > 1 {
        let target = if components[0] == "$builtin" {
            builtin
        } else {
            cur.mod_syms.get(components[0]).copied()
        };
        if let Some(mid) = target {
            let tab = &modules[mid.index()].symtab;
            return resolve_sym(ast, modules, tab, builtin, &components[1..], true);
        }
        return Ok(None);
    }

    let out = cur.resolve_sym_here(ast, components[0], must_be_public)?;
    if out.is_some() {
        return Ok(out);
    }
    if let Some(bid) = builtin {
        return modules[bid.index()]
            .symtab
            .resolve_sym_here(ast, components[0], must_be_public);
    }
    Ok(None)
}

/// Macro-namespace twin of [`resolve_sym`]: only the macro maps and the
/// builtin module participate.
pub fn resolve_macro(
    modules: &[Module],
    cur: &SymTab,
    builtin: Option<ModId>,
    components: &[&str],
) -> Option<NodeId> {
    if components.len() == 2 {
        let target = if components[0] == "$builtin" {
            builtin
        } else {
            cur.mod_syms.get(components[0]).copied()
        };
        let mid = target?;
        return modules[mid.index()].symtab.macro_def(components[1]);
    }
    if components.len() != 1 {
        return None;
    }
    if let Some(def) = cur.macro_def(components[0]) {
        return Some(def);
    }
    let bid = builtin?;
    modules[bid.index()].symtab.macro_def(components[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crosswind_base::SrcLoc;

    fn def_global(ast: &mut Ast, name: &str, pub_vis: bool, line: u32) -> NodeId {
        let ty = ast.alloc(NodeKind::TypeAuto, SrcLoc::unknown());
        let init = ast.alloc(NodeKind::ValUndef, SrcLoc::unknown());
        ast.alloc(
            NodeKind::DefGlobal {
                pub_vis,
                mutable: false,
                name: name.into(),
                ty,
                initial: init,
            },
            SrcLoc::new(crosswind_base::Sym::NONE, line),
        )
    }

    #[test]
    fn duplicate_global_reports_both_lines() {
        let mut ast = Ast::new();
        let a = def_global(&mut ast, "x", false, 3);
        let b = def_global(&mut ast, "x", false, 7);
        let mut tab = SymTab::new();
        tab.add_top_level_sym(&ast, a).unwrap();
        let err = tab.add_top_level_sym(&ast, b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Symbol);
        assert_eq!(err.loc.line, 7);
        assert!(err.message.contains("line 3"));
    }

    #[test]
    fn resolve_sym_here_checks_visibility() {
        let mut ast = Ast::new();
        let hidden = def_global(&mut ast, "secret", false, 1);
        let mut tab = SymTab::new();
        tab.add_top_level_sym(&ast, hidden).unwrap();
        assert!(tab.resolve_sym_here(&ast, "secret", false).unwrap().is_some());
        let err = tab.resolve_sym_here(&ast, "secret", true).unwrap_err();
        assert!(err.message.contains("not public"));
    }

    #[test]
    fn enum_member_resolution() {
        let mut ast = Ast::new();
        let auto = ast.alloc(NodeKind::ValAuto, SrcLoc::unknown());
        let red = ast.alloc(
            NodeKind::EnumVal {
                name: "red".into(),
                value: auto,
            },
            SrcLoc::unknown(),
        );
        let color = ast.alloc(
            NodeKind::DefEnum {
                pub_vis: true,
                name: "color".into(),
                base: crate::ast::BaseTypeKind::U8,
                items: vec![red],
            },
            SrcLoc::unknown(),
        );
        let mut tab = SymTab::new();
        tab.add_top_level_sym(&ast, color).unwrap();
        let found = resolve_sym(&ast, &[], &tab, None, &["color", "red"], false)
            .unwrap()
            .unwrap();
        assert_eq!(found, red);
        assert!(resolve_enum_item(&ast, color, "blue").is_none());
    }

    #[test]
    fn unresolved_name_is_none_not_error() {
        let ast = Ast::new();
        let tab = SymTab::new();
        let out = resolve_sym(&ast, &[], &tab, None, &["missing"], false).unwrap();
        assert!(out.is_none());
    }
}
