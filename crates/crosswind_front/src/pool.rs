//! Module pool.
//!
//! Turns a set of seed module paths into fully loaded, import-bound
//! module instances. Imports of parameterized modules are resolved by a
//! fixed-point loop: each round first runs non-strict global symbol
//! resolution over everything loaded so far (so module arguments can be
//! normalized), then binds every import whose target is ready. A round
//! with pending imports but no progress means the program's imports do
//! not terminate.
//!
//! Module identity is the canonical path plus the normalized argument
//! list; re-importing the same identity anywhere yields the same
//! instance.

use crate::ast::{ChildSlot, ModId, NodeId, NodeKind};
use crate::ctx::{Ctx, Module};
use crate::reader::read_modules_from_source;
use crate::symbolize::{extract_symtab, resolve_globals};
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc};
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

// =============================================================================
// Loaders
// =============================================================================

/// Where module source text comes from. The pool only ever sees
/// canonical paths; `canonical_path` implements the resolution rules
/// (absolute, `./relative` against the importer, bare name against the
/// library root).
pub trait ModLoader {
    fn canonical_path(&self, importer: Option<&str>, pathname: &str) -> String;
    fn read(&self, canonical: &str) -> std::io::Result<String>;
}

/// Lexically normalizes `.` and `..` components; never touches the
/// filesystem, so it also works for in-memory loaders.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn resolve_pathname(root: &str, importer: Option<&str>, pathname: &str) -> String {
    if pathname.starts_with('/') {
        normalize_path(pathname)
    } else if pathname.starts_with('.') {
        let dir = importer
            .and_then(|p| Path::new(p).parent())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if dir.is_empty() {
            normalize_path(pathname)
        } else {
            normalize_path(&format!("{}/{}", dir, pathname))
        }
    } else if root.is_empty() {
        normalize_path(pathname)
    } else {
        normalize_path(&format!("{}/{}", root, pathname))
    }
}

/// Loads `<canonical>.cw` files from disk, resolving bare names against
/// a library root directory.
pub struct FileLoader {
    root: String,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileLoader {
            root: root.into().to_string_lossy().into_owned(),
        }
    }
}

impl ModLoader for FileLoader {
    fn canonical_path(&self, importer: Option<&str>, pathname: &str) -> String {
        resolve_pathname(&self.root, importer, pathname)
    }

    fn read(&self, canonical: &str) -> std::io::Result<String> {
        std::fs::read_to_string(format!("{}.cw", canonical))
    }
}

/// In-memory loader keyed by canonical path, for tests and tooling.
#[derive(Default)]
pub struct MemLoader {
    files: HashMap<String, String>,
}

impl MemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, source: &str) -> &mut Self {
        self.files.insert(path.to_string(), source.to_string());
        self
    }
}

impl ModLoader for MemLoader {
    fn canonical_path(&self, importer: Option<&str>, pathname: &str) -> String {
        resolve_pathname("", importer, pathname)
    }

    fn read(&self, canonical: &str) -> std::io::Result<String> {
        self.files.get(canonical).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such module")
        })
    }
}

// =============================================================================
// Module identity
// =============================================================================

/// Identity of a (possibly specialized) module instance: canonical path
/// plus normalized argument keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModKey {
    pub path: String,
    pub args: Vec<String>,
}

/// A module argument normalized to a stable key plus a display form for
/// the assigned instance name.
struct NormArg {
    key: String,
    display: String,
}

/// Arguments normalize once the non-strict global pass has bound them:
/// primitive-type atoms immediately, id references via their resolved
/// defining node.
fn normalize_mod_arg(ctx: &Ctx, arg: NodeId) -> Option<NormArg> {
    match ctx.ast.kind(arg) {
        NodeKind::TypeBase { kind } => Some(NormArg {
            key: kind.name().to_string(),
            display: kind.name().to_string(),
        }),
        NodeKind::Id { name } => ctx.ast.node(arg).x_symbol.map(|def| NormArg {
            key: format!("sym{}", def.index()),
            display: name.clone(),
        }),
        _ => None,
    }
}

// =============================================================================
// Pool
// =============================================================================

pub struct ModPool<'l> {
    loader: &'l dyn ModLoader,
    all: HashMap<ModKey, ModId>,
    /// Raw generic templates by canonical path; cloned per
    /// specialization, never registered themselves.
    templates: HashMap<String, NodeId>,
    /// Canonical path of each instance, for resolving its relative
    /// imports.
    paths: HashMap<ModId, String>,
}

impl<'l> ModPool<'l> {
    pub fn new(loader: &'l dyn ModLoader) -> Self {
        ModPool {
            loader,
            all: HashMap::new(),
            templates: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    fn import_err(&self, loc: SrcLoc, message: impl Into<String>) -> CompileError {
        CompileError::new(ErrorKind::Import, loc, message)
    }

    /// Parses the single module in `<path>.cw`.
    fn load_defmod(&self, ctx: &mut Ctx, path: &str, loc: SrcLoc) -> Result<NodeId> {
        let source = self.loader.read(path).map_err(|err| {
            self.import_err(loc, format!("cannot load module `{}`: {}", path, err))
        })?;
        let file = ctx.interner.intern(&format!("{}.cw", path));
        let mods = read_modules_from_source(&mut ctx.ast, &source, file)?;
        if mods.len() != 1 {
            return Err(self.import_err(
                loc,
                format!("expected exactly one module in `{}.cw`", path),
            ));
        }
        Ok(mods[0])
    }

    fn register(&mut self, ctx: &mut Ctx, key: ModKey, def: NodeId, name: String) -> Result<ModId> {
        if ctx.modules.iter().any(|m| m.name == name) {
            return Err(self.import_err(
                ctx.ast.loc(def),
                format!("module name `{}` already taken", name),
            ));
        }
        let symtab = extract_symtab(&ctx.ast, def)?;
        let mid = ctx.add_module(Module { def, name, symtab });
        self.paths.insert(mid, key.path.clone());
        self.all.insert(key, mid);
        Ok(mid)
    }

    /// Loads and registers a regular (argument-free) module.
    fn add_mod_simple(&mut self, ctx: &mut Ctx, key: ModKey, loc: SrcLoc) -> Result<ModId> {
        let def = self.load_defmod(ctx, &key.path, loc)?;
        let name = match ctx.ast.kind(def) {
            NodeKind::DefMod { name, params, .. } => {
                if !params.is_empty() {
                    return Err(self.import_err(
                        loc,
                        format!("module `{}` is parameterized and needs arguments", name),
                    ));
                }
                name.clone()
            }
            _ => unreachable!(),
        };
        self.register(ctx, key, def, name)
    }

    /// Clones the cached template, substitutes its parameters with the
    /// normalized arguments, and registers the instance.
    fn add_mod_generic(
        &mut self,
        ctx: &mut Ctx,
        key: ModKey,
        arg_nodes: &[NodeId],
        displays: &[String],
        loc: SrcLoc,
    ) -> Result<ModId> {
        let template = match self.templates.get(&key.path) {
            Some(&t) => t,
            None => {
                let t = self.load_defmod(ctx, &key.path, loc)?;
                self.templates.insert(key.path.clone(), t);
                t
            }
        };
        let def = ctx.ast.clone_subtree(template, false);
        let (base_name, params) = match ctx.ast.kind(def) {
            NodeKind::DefMod { name, params, .. } => (name.clone(), params.clone()),
            _ => unreachable!(),
        };
        if params.len() != arg_nodes.len() {
            return Err(self.import_err(
                loc,
                format!(
                    "module `{}` takes {} parameter(s), got {}",
                    base_name,
                    params.len(),
                    arg_nodes.len()
                ),
            ));
        }
        let substitutions: HashMap<String, NodeId> =
            params.into_iter().zip(arg_nodes.iter().copied()).collect();
        substitute_mod_params(ctx, def, &substitutions);

        let mut name = format!("{}<{}>", base_name, displays.join(","));
        if ctx.modules.iter().any(|m| m.name == name) {
            name = format!("{}#{}", name, ctx.modules.len());
        }
        self.register(ctx, key, def, name)
    }

    /// Loads the seeds and runs the import fixed point until every
    /// import of every loaded module is bound.
    pub fn read_modules_recursively(&mut self, ctx: &mut Ctx, seeds: &[&str]) -> Result<()> {
        let mut active: Vec<ModId> = Vec::new();
        for seed in seeds {
            let path = self.loader.canonical_path(None, seed);
            let key = ModKey {
                path,
                args: Vec::new(),
            };
            if self.all.contains_key(&key) {
                continue;
            }
            let mid = self.add_mod_simple(ctx, key, SrcLoc::unknown())?;
            active.push(mid);
        }

        while !active.is_empty() {
            // Bind whatever global symbols are resolvable so far; module
            // arguments normalize through these bindings.
            resolve_globals(ctx, false)?;

            let mut new_active: Vec<ModId> = Vec::new();
            let mut seen_change = false;
            let mut pending_loc = SrcLoc::unknown();

            for &mid in &active {
                let mut num_unresolved = 0;
                for node in ctx.module_body(mid) {
                    if !matches!(ctx.ast.kind(node), NodeKind::Import { .. }) {
                        continue;
                    }
                    if ctx.ast.node(node).x_module.is_some() {
                        continue;
                    }
                    let loc = ctx.ast.loc(node);
                    let (name, args) = match ctx.ast.kind(node) {
                        NodeKind::Import { name, args, .. } => (name.clone(), args.clone()),
                        _ => unreachable!(),
                    };
                    let importer_path = self.paths[&mid].clone();

                    if !args.is_empty() {
                        let normalized: Vec<Option<NormArg>> =
                            args.iter().map(|&a| normalize_mod_arg(ctx, a)).collect();
                        if normalized.iter().any(|n| n.is_none()) {
                            num_unresolved += 1;
                            pending_loc = loc;
                            continue;
                        }
                        let normalized: Vec<NormArg> =
                            normalized.into_iter().map(|n| n.unwrap()).collect();
                        let key = ModKey {
                            path: self.loader.canonical_path(Some(&importer_path), &name),
                            args: normalized.iter().map(|n| n.key.clone()).collect(),
                        };
                        let displays: Vec<String> =
                            normalized.into_iter().map(|n| n.display).collect();
                        let target = match self.all.get(&key) {
                            Some(&t) => t,
                            None => {
                                let t =
                                    self.add_mod_generic(ctx, key, &args, &displays, loc)?;
                                new_active.push(t);
                                t
                            }
                        };
                        self.bind_import(ctx, mid, node, target, true)?;
                        seen_change = true;
                    } else {
                        let key = ModKey {
                            path: self.loader.canonical_path(Some(&importer_path), &name),
                            args: Vec::new(),
                        };
                        let target = match self.all.get(&key) {
                            Some(&t) => t,
                            None => {
                                let t = self.add_mod_simple(ctx, key, loc)?;
                                new_active.push(t);
                                t
                            }
                        };
                        self.bind_import(ctx, mid, node, target, false)?;
                        seen_change = true;
                    }
                }
                if num_unresolved > 0 {
                    new_active.push(mid);
                }
            }

            if !seen_change && !new_active.is_empty() {
                return Err(self.import_err(pending_loc, "module import does not terminate"));
            }
            active = new_active;
        }
        Ok(())
    }

    fn bind_import(
        &mut self,
        ctx: &mut Ctx,
        importer: ModId,
        import: NodeId,
        target: ModId,
        clear_args: bool,
    ) -> Result<()> {
        ctx.ast.set_module(import, target);
        if clear_args {
            if let NodeKind::Import { args, .. } = &mut ctx.ast.node_mut(import).kind {
                args.clear();
            }
        }
        let Ctx {
            ref ast,
            ref mut modules,
            ..
        } = *ctx;
        modules[importer.index()].symtab.add_import(ast, import, target)
    }
}

/// Replaces every single-component id naming a module parameter with a
/// clone of the normalized argument (annotations kept, so arguments
/// resolved in the importer's namespace stay resolved).
fn substitute_mod_params(ctx: &mut Ctx, node: NodeId, substitutions: &HashMap<String, NodeId>) {
    let mut new_slots = Vec::new();
    for slot in ctx.ast.kind(node).child_slots() {
        match slot {
            ChildSlot::Node { name, id } => {
                let new_id = substitute_one(ctx, id, substitutions);
                new_slots.push(ChildSlot::Node { name, id: new_id });
            }
            ChildSlot::List { name, ids } => {
                let new_ids = ids
                    .into_iter()
                    .map(|id| substitute_one(ctx, id, substitutions))
                    .collect();
                new_slots.push(ChildSlot::List { name, ids: new_ids });
            }
        }
    }
    ctx.ast.node_mut(node).kind.set_child_slots(new_slots);
}

fn substitute_one(ctx: &mut Ctx, id: NodeId, substitutions: &HashMap<String, NodeId>) -> NodeId {
    if let NodeKind::Id { name } = ctx.ast.kind(id) {
        if !name.contains("::") {
            if let Some(&arg) = substitutions.get(name.as_str()) {
                return ctx.ast.clone_subtree(arg, true);
            }
        }
        return id;
    }
    substitute_mod_params(ctx, id, substitutions);
    id
}

// =============================================================================
// Topological order
// =============================================================================

/// Deterministic topological order over the loaded modules: importees
/// before importers, ties broken by a min-heap on the assigned module
/// name. Cycles are import errors.
pub fn modules_in_topological_order(ctx: &Ctx) -> Result<Vec<ModId>> {
    let count = ctx.modules.len();
    let mut deps_in: Vec<Vec<ModId>> = vec![Vec::new(); count];
    let mut deps_out: Vec<Vec<ModId>> = vec![Vec::new(); count];

    for idx in 0..count {
        let mid = ModId(idx as u32);
        for node in ctx.module_body(mid) {
            if !matches!(ctx.ast.kind(node), NodeKind::Import { .. }) {
                continue;
            }
            let importee = ctx
                .ast
                .node(node)
                .x_module
                .expect("unbound import after pool fixed point");
            if importee == mid || deps_in[idx].contains(&importee) {
                continue;
            }
            deps_in[idx].push(importee);
            deps_out[importee.index()].push(mid);
        }
    }

    let mut candidates: BinaryHeap<std::cmp::Reverse<(String, u32)>> = BinaryHeap::new();
    for idx in 0..count {
        if deps_in[idx].is_empty() {
            candidates.push(std::cmp::Reverse((ctx.modules[idx].name.clone(), idx as u32)));
        }
    }

    let mut out: Vec<ModId> = Vec::with_capacity(count);
    while out.len() != count {
        let std::cmp::Reverse((_, idx)) = match candidates.pop() {
            Some(next) => next,
            None => {
                let stuck = (0..count)
                    .map(|i| ModId(i as u32))
                    .find(|m| !out.contains(m))
                    .expect("no candidates yet order incomplete");
                return Err(CompileError::new(
                    ErrorKind::Import,
                    ctx.ast.loc(ctx.module(stuck).def),
                    format!("module dependency cycle involving `{}`", ctx.module(stuck).name),
                ));
            }
        };
        let mid = ModId(idx);
        out.push(mid);
        for &importer in &deps_out[mid.index()] {
            let entry = &mut deps_in[importer.index()];
            entry.retain(|&d| d != mid);
            if entry.is_empty() {
                candidates.push(std::cmp::Reverse((
                    ctx.modules[importer.index()].name.clone(),
                    importer.index() as u32,
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BaseTypeKind;

    #[test]
    fn normalize_path_collapses_dots() {
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_path("/lib//os"), "/lib/os");
        assert_eq!(normalize_path("./main"), "main");
    }

    #[test]
    fn relative_imports_resolve_against_importer_dir() {
        let loader = MemLoader::new();
        assert_eq!(
            loader.canonical_path(Some("game/main"), "./geo"),
            "game/geo"
        );
        assert_eq!(loader.canonical_path(Some("game/main"), "../lib/os"), "lib/os");
        assert_eq!(loader.canonical_path(None, "builtin"), "builtin");
    }

    #[test]
    fn file_loader_prefixes_root_for_bare_names() {
        let loader = FileLoader::new("/lib");
        assert_eq!(loader.canonical_path(None, "os"), "/lib/os");
        assert_eq!(loader.canonical_path(None, "/abs/mod"), "/abs/mod");
        assert_eq!(
            loader.canonical_path(Some("/src/main"), "./util"),
            "/src/util"
        );
    }

    #[test]
    fn mod_keys_distinguish_arg_lists() {
        let a = ModKey {
            path: "vec".into(),
            args: vec!["u32".into()],
        };
        let b = ModKey {
            path: "vec".into(),
            args: vec!["u8".into()],
        };
        let c = ModKey {
            path: "vec".into(),
            args: vec!["u32".into()],
        };
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn fixed_point_loads_transitive_imports() {
        let mut loader = MemLoader::new();
        loader
            .add("main", "(module main [(import util)])")
            .add("util", "(module util [(import leaf)])")
            .add("leaf", "(module leaf [])");
        let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
        let mut pool = ModPool::new(&loader);
        pool.read_modules_recursively(&mut ctx, &["main"]).unwrap();
        assert_eq!(ctx.modules.len(), 3);
        let order = modules_in_topological_order(&ctx).unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|&m| ctx.module(m).name.as_str())
            .collect();
        assert_eq!(names, vec!["leaf", "util", "main"]);
    }

    #[test]
    fn missing_module_is_an_import_error() {
        let mut loader = MemLoader::new();
        loader.add("main", "(module main [(import ghost)])");
        let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
        let mut pool = ModPool::new(&loader);
        let err = pool.read_modules_recursively(&mut ctx, &["main"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn import_cycle_is_detected() {
        let mut loader = MemLoader::new();
        loader
            .add("a", "(module a [(import b)])")
            .add("b", "(module b [(import a)])");
        let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
        let mut pool = ModPool::new(&loader);
        pool.read_modules_recursively(&mut ctx, &["a"]).unwrap();
        let err = modules_in_topological_order(&ctx).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn topo_order_is_name_deterministic_for_independent_modules() {
        let mut loader = MemLoader::new();
        loader
            .add("main", "(module main [(import zeta) (import alpha)])")
            .add("zeta", "(module zeta [])")
            .add("alpha", "(module alpha [])");
        let mut ctx = Ctx::new(BaseTypeKind::U64, BaseTypeKind::S64);
        let mut pool = ModPool::new(&loader);
        pool.read_modules_recursively(&mut ctx, &["main"]).unwrap();
        let order = modules_in_topological_order(&ctx).unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|&m| ctx.module(m).name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta", "main"]);
    }
}
