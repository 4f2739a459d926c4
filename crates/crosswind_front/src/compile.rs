//! Frontend pipeline entry points.
//!
//! Phases run strictly in sequence over one [`Ctx`]: module pool fixed
//! point, topological ordering, symbol resolution (with macro
//! expansion), type inference, final type audit. The first error aborts
//! the phase and surfaces to the caller.

use crate::ast::BaseTypeKind;
use crate::ctx::Ctx;
use crate::pool::{modules_in_topological_order, MemLoader, ModLoader, ModPool};
use crate::symbolize::decorate_ast_with_symbols;
use crate::typify::decorate_ast_with_types;
use crate::verify::verify_types;
use crosswind_base::Result;

/// Machine configuration for a compilation.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Width the `uint` alias resolves to.
    pub uint_kind: BaseTypeKind,
    /// Width the `sint` alias resolves to.
    pub sint_kind: BaseTypeKind,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            uint_kind: BaseTypeKind::U64,
            sint_kind: BaseTypeKind::S64,
        }
    }
}

/// Runs the whole frontend into an existing context. The caller keeps
/// the context either way, so errors can be rendered with its interner.
pub fn run(ctx: &mut Ctx, loader: &dyn ModLoader, seeds: &[&str]) -> Result<()> {
    let mut pool = ModPool::new(loader);
    pool.read_modules_recursively(ctx, seeds)?;
    ctx.topo = modules_in_topological_order(ctx)?;
    decorate_ast_with_symbols(ctx)?;
    decorate_ast_with_types(ctx)?;
    verify_types(ctx)
}

/// Convenience wrapper building a fresh context.
pub fn analyze(loader: &dyn ModLoader, seeds: &[&str], options: Options) -> Result<Ctx> {
    let mut ctx = Ctx::new(options.uint_kind, options.sint_kind);
    run(&mut ctx, loader, seeds)?;
    Ok(ctx)
}

/// Analyzes a single in-memory module with no imports. Handy for tests
/// and tooling.
pub fn analyze_source(source: &str, options: Options) -> Result<Ctx> {
    let mut loader = MemLoader::new();
    loader.add("main", source);
    analyze(&loader, &["main"], options)
}
