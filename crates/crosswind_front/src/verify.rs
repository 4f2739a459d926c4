//! Final verification passes.
//!
//! After resolution and inference every contract is audited once more:
//! no unexpanded macro forms or leaked hygiene ids, every annotation
//! slot filled, assignments targeting proper lhs expressions, and type
//! agreement everywhere the rules promise it. Failures surface as
//! located errors; a failure here means an earlier phase broke its
//! contract or the program slipped through an inference rule.

use crate::ast::{
    AssignKind, BinaryKind, ChildSlot, NodeFlags, NodeId, NodeKind, TypeId,
};
use crate::corpus::TypeShape;
use crate::ctx::Ctx;
use crate::typify::{is_mutable_def, is_proper_lhs};
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc};

fn sym_err(loc: SrcLoc, message: impl Into<String>) -> CompileError {
    CompileError::new(ErrorKind::Symbol, loc, message)
}

fn type_err(loc: SrcLoc, message: impl Into<String>) -> CompileError {
    CompileError::new(ErrorKind::Type, loc, message)
}

fn mismatch(ctx: &Ctx, loc: SrcLoc, what: &str, actual: TypeId, expected: TypeId) -> CompileError {
    type_err(
        loc,
        format!(
            "{}: actual `{}` expected `{}`",
            what,
            ctx.corpus.canon_name(actual),
            ctx.corpus.canon_name(expected)
        ),
    )
}

fn node_ty(ctx: &Ctx, node: NodeId) -> Result<TypeId> {
    ctx.ast.node(node).x_type.ok_or_else(|| {
        type_err(
            ctx.ast.loc(node),
            format!("untyped node `{}`", ctx.ast.kind(node).tag()),
        )
    })
}

// =============================================================================
// Symbol audit
// =============================================================================

/// Runs right after symbol resolution: macro forms are gone, hygiene
/// ids never survive in sigil position, and every symbol-annotated id
/// is bound (polymorphic callees excepted, they bind during typing).
pub fn verify_symbols(ctx: &Ctx) -> Result<()> {
    for module in &ctx.modules {
        verify_symbols_in(ctx, module.def)?;
    }
    Ok(())
}

fn verify_symbols_in(ctx: &Ctx, node: NodeId) -> Result<()> {
    let loc = ctx.ast.loc(node);
    match ctx.ast.kind(node) {
        NodeKind::DefMacro { .. } => return Ok(()),
        NodeKind::MacroId { name } => {
            return Err(sym_err(
                loc,
                format!("macro id `{}` outside of a macro definition", name),
            ))
        }
        NodeKind::Id { name } => {
            if name.starts_with('$') {
                return Err(sym_err(loc, format!("hygiene id `{}` leaked", name)));
            }
        }
        _ => {}
    }
    if ctx.ast.flags(node).contains(NodeFlags::TO_BE_EXPANDED) {
        return Err(CompileError::new(
            ErrorKind::Macro,
            loc,
            format!("unexpanded macro form `{}`", ctx.ast.kind(node).tag()),
        ));
    }
    let poly_call = matches!(ctx.ast.kind(node), NodeKind::ExprCall { poly: true, .. });
    if ctx.ast.flags(node).contains(NodeFlags::SYMBOL_ANNOTATED) {
        match ctx.ast.node(node).x_symbol {
            None => return Err(sym_err(loc, "unresolved symbol")),
            Some(def) => {
                let defining = matches!(
                    ctx.ast.kind(def),
                    NodeKind::DefFun { .. }
                        | NodeKind::DefRec { .. }
                        | NodeKind::DefEnum { .. }
                        | NodeKind::DefType { .. }
                        | NodeKind::DefGlobal { .. }
                        | NodeKind::DefVar { .. }
                        | NodeKind::FunParam { .. }
                        | NodeKind::EnumVal { .. }
                );
                if !defining {
                    return Err(sym_err(
                        loc,
                        format!(
                            "symbol resolves to `{}`, which defines nothing",
                            ctx.ast.kind(def).tag()
                        ),
                    ));
                }
            }
        }
    }
    for slot in ctx.ast.kind(node).child_slots() {
        match slot {
            ChildSlot::Node { name, id } => {
                if poly_call && name == "callee" {
                    continue;
                }
                verify_symbols_in(ctx, id)?;
            }
            ChildSlot::List { ids, .. } => {
                for id in ids {
                    verify_symbols_in(ctx, id)?;
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Type audit
// =============================================================================

pub fn verify_types(ctx: &Ctx) -> Result<()> {
    for module in &ctx.modules {
        verify_types_in(ctx, module.def, None)?;
    }
    Ok(())
}

fn verify_types_in(ctx: &Ctx, node: NodeId, enclosing_fun: Option<NodeId>) -> Result<()> {
    if matches!(
        ctx.ast.kind(node),
        NodeKind::Comment { .. } | NodeKind::DefMacro { .. }
    ) {
        return Ok(());
    }
    let enclosing_fun = match ctx.ast.kind(node) {
        NodeKind::DefFun { .. } => Some(node),
        _ => enclosing_fun,
    };
    let flags = ctx.ast.flags(node);
    let loc = ctx.ast.loc(node);
    if flags.contains(NodeFlags::TYPE_ANNOTATED) && ctx.ast.node(node).x_type.is_none() {
        return Err(type_err(
            loc,
            format!("untyped node `{}`", ctx.ast.kind(node).tag()),
        ));
    }
    if flags.contains(NodeFlags::FIELD_ANNOTATED) && ctx.ast.node(node).x_field.is_none() {
        return Err(type_err(
            loc,
            format!("node `{}` without field annotation", ctx.ast.kind(node).tag()),
        ));
    }
    check_node(ctx, node, enclosing_fun)?;
    for slot in ctx.ast.kind(node).child_slots() {
        match slot {
            ChildSlot::Node { id, .. } => verify_types_in(ctx, id, enclosing_fun)?,
            ChildSlot::List { ids, .. } => {
                for id in ids {
                    verify_types_in(ctx, id, enclosing_fun)?;
                }
            }
        }
    }
    Ok(())
}

fn check_node(ctx: &Ctx, node: NodeId, enclosing_fun: Option<NodeId>) -> Result<()> {
    let loc = ctx.ast.loc(node);
    match ctx.ast.kind(node) {
        NodeKind::StmtAssignment { lhs, expr } => {
            if !is_proper_lhs(ctx, *lhs) {
                return Err(type_err(loc, "left-hand side is not assignable"));
            }
            let lhs_ty = node_ty(ctx, *lhs)?;
            let expr_ty = node_ty(ctx, *expr)?;
            if !ctx
                .corpus
                .is_compatible(expr_ty, lhs_ty, is_mutable_def(ctx, *expr))
            {
                return Err(mismatch(ctx, loc, "incompatible assignment", expr_ty, lhs_ty));
            }
        }
        NodeKind::StmtCompoundAssignment { op, lhs, expr } => {
            if !is_proper_lhs(ctx, *lhs) {
                return Err(type_err(loc, "left-hand side is not assignable"));
            }
            let lhs_ty = node_ty(ctx, *lhs)?;
            let expr_ty = node_ty(ctx, *expr)?;
            if matches!(op, AssignKind::IncP | AssignKind::DecP) {
                if !ctx.corpus.is_int(expr_ty) {
                    return Err(type_err(loc, "pointer step must be an integer"));
                }
            } else if !ctx.corpus.is_compatible(expr_ty, lhs_ty, false) {
                return Err(mismatch(
                    ctx,
                    loc,
                    "incompatible assignment operand",
                    expr_ty,
                    lhs_ty,
                ));
            }
        }
        NodeKind::StmtExpr { discard, expr } => {
            let expr_ty = node_ty(ctx, *expr)?;
            if ctx.corpus.is_void(expr_ty) == *discard {
                return Err(type_err(
                    loc,
                    if *discard {
                        "discard on an expression without a result"
                    } else {
                        "expression result must be used or discarded"
                    },
                ));
            }
        }
        NodeKind::StmtReturn { expr } => {
            let fun = enclosing_fun
                .ok_or_else(|| type_err(loc, "return statement outside of a function"))?;
            let fun_ty = node_ty(ctx, fun)?;
            let result = match ctx.corpus.shape(fun_ty) {
                TypeShape::Fun { result, .. } => *result,
                _ => unreachable!("function without function type"),
            };
            let actual = node_ty(ctx, *expr)?;
            if !ctx.corpus.is_compatible(actual, result, false) {
                return Err(mismatch(ctx, loc, "bad return value", actual, result));
            }
        }
        NodeKind::StmtIf { cond, .. } | NodeKind::Case { cond, .. }
        | NodeKind::StmtStaticAssert { cond } => {
            let cond_ty = node_ty(ctx, *cond)?;
            if !ctx.corpus.is_bool(cond_ty) {
                return Err(type_err(loc, "condition must be boolean"));
            }
        }
        NodeKind::Expr1 { expr, .. } => {
            if node_ty(ctx, node)? != node_ty(ctx, *expr)? {
                return Err(type_err(loc, "unary operator must preserve its operand type"));
            }
        }
        NodeKind::Expr2 { op, expr1, expr2 } => {
            let out = node_ty(ctx, node)?;
            let lhs = node_ty(ctx, *expr1)?;
            let rhs = node_ty(ctx, *expr2)?;
            if op.is_bool_op() {
                if lhs != rhs {
                    return Err(mismatch(ctx, loc, "operand mismatch", rhs, lhs));
                }
                if !ctx.corpus.is_bool(out) {
                    return Err(type_err(loc, "comparison must produce a boolean"));
                }
            } else if matches!(op, BinaryKind::IncP | BinaryKind::DecP) {
                if out != lhs || !ctx.corpus.is_int(rhs) {
                    return Err(type_err(loc, "pointer step must be an integer"));
                }
            } else if *op == BinaryKind::PDelta {
                match (ctx.corpus.shape(lhs), ctx.corpus.shape(rhs)) {
                    (
                        TypeShape::Ptr { pointee: a, .. },
                        TypeShape::Ptr { pointee: b, .. },
                    ) => {
                        if a != b || !ctx.corpus.is_sint(out) {
                            return Err(type_err(loc, "bad pointer-delta operands"));
                        }
                    }
                    (
                        TypeShape::Slice { elem: a, .. },
                        TypeShape::Slice { elem: b, .. },
                    ) => {
                        if a != b || out != lhs {
                            return Err(type_err(loc, "bad pointer-delta operands"));
                        }
                    }
                    _ => return Err(type_err(loc, "bad pointer-delta operands")),
                }
            } else {
                if lhs != rhs {
                    return Err(mismatch(ctx, loc, "operand mismatch", rhs, lhs));
                }
                if out != lhs {
                    return Err(mismatch(ctx, loc, "bad operator result", out, lhs));
                }
            }
        }
        NodeKind::Expr3 {
            cond,
            expr_t,
            expr_f,
        } => {
            if !ctx.corpus.is_bool(node_ty(ctx, *cond)?) {
                return Err(type_err(loc, "condition must be boolean"));
            }
            let out = node_ty(ctx, node)?;
            if node_ty(ctx, *expr_t)? != out || node_ty(ctx, *expr_f)? != out {
                return Err(type_err(loc, "conditional arms must share one type"));
            }
        }
        NodeKind::ExprCall { callee, args, .. } => {
            let fun_ty = node_ty(ctx, *callee)?;
            let (params, result) = match ctx.corpus.shape(fun_ty) {
                TypeShape::Fun { params, result } => (params.clone(), *result),
                _ => return Err(type_err(loc, "called value is not a function")),
            };
            if node_ty(ctx, node)? != result {
                return Err(mismatch(
                    ctx,
                    loc,
                    "bad call result",
                    node_ty(ctx, node)?,
                    result,
                ));
            }
            for (&param, &arg) in params.iter().zip(args.iter()) {
                let arg_ty = node_ty(ctx, arg)?;
                if !ctx
                    .corpus
                    .is_compatible(arg_ty, param, is_mutable_def(ctx, arg))
                {
                    return Err(mismatch(ctx, loc, "incompatible argument", arg_ty, param));
                }
            }
        }
        NodeKind::ExprIndex { container, .. } => {
            let container_ty = node_ty(ctx, *container)?;
            let elem = ctx
                .corpus
                .contained_type(container_ty)
                .ok_or_else(|| type_err(loc, "indexing a non-container"))?;
            if node_ty(ctx, node)? != elem {
                return Err(mismatch(ctx, loc, "bad element type", node_ty(ctx, node)?, elem));
            }
        }
        NodeKind::ExprField { .. } | NodeKind::FieldVal { .. } => {
            let field = ctx.ast.node(node).x_field.expect("field audit ran first");
            if node_ty(ctx, node)? != node_ty(ctx, field)? {
                return Err(mismatch(
                    ctx,
                    loc,
                    "field type mismatch",
                    node_ty(ctx, node)?,
                    node_ty(ctx, field)?,
                ));
            }
        }
        NodeKind::ExprDeref { expr } => {
            let ptr_ty = node_ty(ctx, *expr)?;
            let pointee = ctx
                .corpus
                .pointee_type(ptr_ty)
                .ok_or_else(|| type_err(loc, "dereferencing a non-pointer"))?;
            if node_ty(ctx, node)? != pointee {
                return Err(type_err(loc, "bad dereference type"));
            }
        }
        NodeKind::ExprAddrOf { mutable, expr } => {
            if *mutable && !is_proper_lhs(ctx, *expr) {
                return Err(type_err(
                    loc,
                    "mutable address of an expression that is not assignable",
                ));
            }
            let inner = node_ty(ctx, *expr)?;
            match ctx.corpus.shape(node_ty(ctx, node)?) {
                TypeShape::Ptr { pointee, .. } if *pointee == inner => {}
                _ => return Err(type_err(loc, "address-of must produce a pointer")),
            }
        }
        NodeKind::ExprLen { container } => {
            let container_ty = node_ty(ctx, *container)?;
            if ctx.corpus.contained_type(container_ty).is_none() {
                return Err(type_err(loc, "len of a non-container"));
            }
            if !ctx.corpus.is_uint(node_ty(ctx, node)?) {
                return Err(type_err(loc, "len must produce an unsigned integer"));
            }
        }
        NodeKind::ExprSizeof { .. } | NodeKind::ExprOffsetof { .. } => {
            if !ctx.corpus.is_uint(node_ty(ctx, node)?) {
                return Err(type_err(loc, "size queries produce unsigned integers"));
            }
        }
        NodeKind::ExprIs { .. } => {
            if !ctx.corpus.is_bool(node_ty(ctx, node)?) {
                return Err(type_err(loc, "`is` must produce a boolean"));
            }
        }
        NodeKind::ExprTryAs { expr, ty, default } => {
            let out = node_ty(ctx, node)?;
            if out != node_ty(ctx, *ty)? {
                return Err(type_err(loc, "tryas result must be the target type"));
            }
            if !matches!(ctx.ast.kind(*default), NodeKind::ValUndef)
                && node_ty(ctx, *default)? != out
            {
                return Err(mismatch(
                    ctx,
                    loc,
                    "bad tryas default",
                    node_ty(ctx, *default)?,
                    out,
                ));
            }
            let expr_ty = node_ty(ctx, *expr)?;
            if !ctx.corpus.is_compatible(out, expr_ty, false) {
                return Err(mismatch(ctx, loc, "tryas target not in source", out, expr_ty));
            }
        }
        NodeKind::DefVar {
            ty, initial, ..
        }
        | NodeKind::DefGlobal {
            ty, initial, ..
        } => {
            let var_ty = node_ty(ctx, node)?;
            if !matches!(ctx.ast.kind(*initial), NodeKind::ValUndef) {
                let init_ty = node_ty(ctx, *initial)?;
                if !ctx
                    .corpus
                    .is_compatible(init_ty, var_ty, is_mutable_def(ctx, *initial))
                {
                    return Err(mismatch(ctx, loc, "incompatible initializer", init_ty, var_ty));
                }
            }
            if !matches!(ctx.ast.kind(*ty), NodeKind::TypeAuto) && node_ty(ctx, *ty)? != var_ty {
                return Err(mismatch(
                    ctx,
                    loc,
                    "declared type mismatch",
                    var_ty,
                    node_ty(ctx, *ty)?,
                ));
            }
        }
        NodeKind::RecField { ty, initial, .. } => {
            if !matches!(ctx.ast.kind(*initial), NodeKind::ValUndef) {
                let init_ty = node_ty(ctx, *initial)?;
                let field_ty = node_ty(ctx, *ty)?;
                if !ctx.corpus.is_compatible(init_ty, field_ty, false) {
                    return Err(mismatch(
                        ctx,
                        loc,
                        "incompatible field default",
                        init_ty,
                        field_ty,
                    ));
                }
            }
        }
        NodeKind::ValArray { inits, .. } => {
            let elem = ctx
                .corpus
                .contained_type(node_ty(ctx, node)?)
                .ok_or_else(|| type_err(loc, "array value without array type"))?;
            for &init in inits {
                if node_ty(ctx, init)? != elem {
                    return Err(mismatch(
                        ctx,
                        ctx.ast.loc(init),
                        "array element mismatch",
                        node_ty(ctx, init)?,
                        elem,
                    ));
                }
                if let NodeKind::IndexVal { index, .. } = ctx.ast.kind(init) {
                    if !matches!(ctx.ast.kind(*index), NodeKind::ValAuto)
                        && !ctx.corpus.is_int(node_ty(ctx, *index)?)
                    {
                        return Err(type_err(
                            ctx.ast.loc(*index),
                            "array index must be an integer",
                        ));
                    }
                }
            }
        }
        NodeKind::ValNum { .. } => {
            let out = node_ty(ctx, node)?;
            let ok = matches!(
                ctx.corpus.shape(out),
                TypeShape::Base(_) | TypeShape::Enum { .. }
            );
            if !ok {
                return Err(type_err(
                    loc,
                    format!(
                        "number typed as `{}`, expected a base or enum type",
                        ctx.corpus.canon_name(out)
                    ),
                ));
            }
        }
        NodeKind::ValString { .. } => {
            let out = node_ty(ctx, node)?;
            let ok = match ctx.corpus.shape(out) {
                TypeShape::Array { elem, .. } => {
                    ctx.corpus.canon_name(*elem) == "u8"
                }
                _ => false,
            };
            if !ok {
                return Err(type_err(loc, "string literal must type as array(u8,N)"));
            }
        }
        NodeKind::DefEnum { items, .. } => {
            let base = match ctx.corpus.shape(node_ty(ctx, node)?) {
                TypeShape::Enum { base, .. } => *base,
                _ => return Err(type_err(loc, "enum without enum type")),
            };
            for &item in items {
                if matches!(ctx.ast.kind(item), NodeKind::EnumVal { .. })
                    && node_ty(ctx, item)? != base
                {
                    return Err(mismatch(
                        ctx,
                        ctx.ast.loc(item),
                        "enum value mismatch",
                        node_ty(ctx, item)?,
                        base,
                    ));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
