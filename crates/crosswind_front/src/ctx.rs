//! The compilation context.
//!
//! One [`Ctx`] value owns everything a single compilation touches: the
//! node arena, the string interner, the loaded module instances, and
//! the type corpus. Phases borrow it mutably in sequence; nothing in
//! the frontend is process-global.

use crate::ast::{Ast, BaseTypeKind, ModId, NodeId};
use crate::corpus::TypeCorpus;
use crate::symtab::SymTab;
use crosswind_base::Interner;

/// One loaded (possibly specialized) module instance.
#[derive(Debug)]
pub struct Module {
    /// The `DefMod` node.
    pub def: NodeId,
    /// Assigned unique name; specializations get `base<arg,…>`.
    pub name: String,
    /// Global symbol table.
    pub symtab: SymTab,
}

#[derive(Debug)]
pub struct Ctx {
    pub interner: Interner,
    pub ast: Ast,
    pub modules: Vec<Module>,
    pub corpus: TypeCorpus,
    /// Deterministic topological order, set by the module pool.
    pub topo: Vec<ModId>,
    /// The `builtin` module, consulted as a lookup fallback.
    pub builtin: Option<ModId>,
}

impl Ctx {
    pub fn new(uint_kind: BaseTypeKind, sint_kind: BaseTypeKind) -> Self {
        Ctx {
            interner: Interner::new(),
            ast: Ast::new(),
            modules: Vec::new(),
            corpus: TypeCorpus::new(uint_kind, sint_kind),
            topo: Vec::new(),
            builtin: None,
        }
    }

    pub fn add_module(&mut self, module: Module) -> ModId {
        let mid = ModId(self.modules.len() as u32);
        if module.name == "builtin" {
            self.builtin = Some(mid);
        }
        self.modules.push(module);
        mid
    }

    pub fn module(&self, mid: ModId) -> &Module {
        &self.modules[mid.index()]
    }

    pub fn module_mut(&mut self, mid: ModId) -> &mut Module {
        &mut self.modules[mid.index()]
    }

    /// Body node ids of a module, in source order.
    pub fn module_body(&self, mid: ModId) -> Vec<NodeId> {
        match self.ast.kind(self.modules[mid.index()].def) {
            crate::ast::NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!("module def is not a DefMod"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crosswind_base::SrcLoc;

    #[test]
    fn builtin_module_is_remembered() {
        let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
        let def = ctx.ast.alloc(
            NodeKind::DefMod {
                name: "builtin".into(),
                body: vec![],
                params: vec![],
            },
            SrcLoc::unknown(),
        );
        let mid = ctx.add_module(Module {
            def,
            name: "builtin".into(),
            symtab: SymTab::new(),
        });
        assert_eq!(ctx.builtin, Some(mid));
        assert_eq!(ctx.module(mid).name, "builtin");
    }
}
