//! Type inference.
//!
//! Bidirectional: every rule computes a type bottom-up while an
//! expected-type stack supplies the hint for literals and other
//! context-typed expressions (`push`/`pop` are paired through
//! [`Typer::with_target`], so the stack is balanced on every path).
//!
//! Runs in two passes over the topological module order: pass A types
//! all top-level declarations except function bodies and registers
//! polymorphic functions in the [`PolyMap`]; pass B types function
//! bodies, dispatching polymorphic calls on the canonical type of their
//! first argument. Every `TYPE_ANNOTATED` node receives `x_type`
//! exactly once.

use crate::ast::{
    AssignKind, BaseTypeKind, BinaryKind, NodeFlags, NodeId, NodeKind, TypeId,
};
use crate::corpus::{TypeCorpus, TypeShape};
use crate::ctx::Ctx;
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc};
use std::collections::HashMap;

fn type_err(loc: SrcLoc, message: impl Into<String>) -> CompileError {
    CompileError::new(ErrorKind::Type, loc, message)
}

// =============================================================================
// Literal helpers
// =============================================================================

/// Byte length of a string literal (`text` includes the quotes). Raw
/// strings count bytes verbatim; otherwise `\x??` escapes collapse four
/// characters into one byte and any other `\?` collapses two into one.
pub fn compute_string_size(raw: bool, text: &str) -> u64 {
    debug_assert!(text.starts_with('"') && text.ends_with('"'));
    let inner = &text[1..text.len() - 1];
    let mut n = inner.len() as u64;
    if raw {
        return n;
    }
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            escaped = false;
            if c == 'x' {
                n -= 3;
            } else {
                n -= 1;
            }
        } else if c == '\\' {
            escaped = true;
        }
    }
    n
}

fn char_value(text: &str, loc: SrcLoc) -> Result<u64> {
    let inner = &text[1..text.len() - 1];
    let mut chars = inner.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => Ok(10),
            Some('t') => Ok(9),
            Some('r') => Ok(13),
            Some('0') => Ok(0),
            Some('\\') => Ok(92),
            Some('\'') => Ok(39),
            other => Err(type_err(
                loc,
                format!("unsupported escape sequence in char literal `{:?}`", other),
            )),
        },
        Some(c) => Ok(c as u64),
        None => Err(type_err(loc, "empty char literal")),
    }
}

/// Evaluates a numeric literal to an unsigned integer (used for array
/// dimensions). Underscores and integer type suffixes are ignored; char
/// literals evaluate to their code point.
pub fn parse_num(number: &str, loc: SrcLoc) -> Result<u64> {
    if number.starts_with('\'') {
        return char_value(number, loc);
    }
    let cleaned = number.replace('_', "");
    let mut digits = cleaned.as_str();
    for suffix in [
        "uint", "sint", "u16", "u32", "u64", "s16", "s32", "s64", "u8", "s8",
    ] {
        if let Some(stripped) = digits.strip_suffix(suffix) {
            digits = stripped;
            break;
        }
    }
    if digits.ends_with("r32") || digits.ends_with("r64") {
        return Err(type_err(loc, format!("`{}` is not an integer", number)));
    }
    digits
        .parse::<u64>()
        .map_err(|_| type_err(loc, format!("invalid integer literal `{}`", number)))
}

// =============================================================================
// Lhs classification
// =============================================================================

/// A mutable `let`/`global` definition (directly or through an id).
pub fn is_mutable_def(ctx: &Ctx, node: NodeId) -> bool {
    match ctx.ast.kind(node) {
        NodeKind::Id { .. } => match ctx.ast.node(node).x_symbol {
            Some(def) => is_mutable_def(ctx, def),
            None => false,
        },
        NodeKind::DefVar { mutable, .. } | NodeKind::DefGlobal { mutable, .. } => *mutable,
        _ => false,
    }
}

/// An assignable expression: a mutable definition, a deref of a mutable
/// pointer, a field of a proper lhs, or an index into a mutable
/// container.
pub fn is_proper_lhs(ctx: &Ctx, node: NodeId) -> bool {
    if is_mutable_def(ctx, node) {
        return true;
    }
    match ctx.ast.kind(node) {
        NodeKind::ExprDeref { expr } => ctx
            .ast
            .node(*expr)
            .x_type
            .map(|t| matches!(ctx.corpus.shape(t), TypeShape::Ptr { mutable: true, .. }))
            .unwrap_or(false),
        NodeKind::ExprField { container, .. } => is_proper_lhs(ctx, *container),
        NodeKind::ExprIndex { container, .. } => {
            is_mutable_def(ctx, *container)
                || ctx
                    .ast
                    .node(*container)
                    .x_type
                    .map(|t| ctx.corpus.is_mutable_container(t))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

// =============================================================================
// Polymorphic registry
// =============================================================================

/// Registry of polymorphic functions keyed by `(name, canonical name of
/// the first parameter type)`.
#[derive(Default)]
pub struct PolyMap {
    map: HashMap<(String, String), NodeId>,
}

impl PolyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ctx: &Ctx, fun: NodeId) -> Result<()> {
        let loc = ctx.ast.loc(fun);
        let name = match ctx.ast.kind(fun) {
            NodeKind::DefFun { name, .. } => name.clone(),
            _ => unreachable!("registering a non-function"),
        };
        let fun_ty = ctx
            .ast
            .node(fun)
            .x_type
            .expect("polymorphic function registered before typing");
        let first = match ctx.corpus.shape(fun_ty) {
            TypeShape::Fun { params, .. } => params.first().copied().ok_or_else(|| {
                type_err(
                    loc,
                    format!("polymorphic function `{}` needs at least one parameter", name),
                )
            })?,
            _ => unreachable!("function without a function type"),
        };
        let key = (name.clone(), ctx.corpus.canon_name(first).to_string());
        if self.map.insert(key, fun).is_some() {
            return Err(type_err(
                loc,
                format!(
                    "duplicate polymorphic function `{}` for `{}`",
                    name,
                    ctx.corpus.canon_name(first)
                ),
            ));
        }
        Ok(())
    }

    /// Direct hit on the first argument's canonical type, with an
    /// array-to-slice fallback.
    pub fn resolve(
        &self,
        corpus: &mut TypeCorpus,
        name: &str,
        first_arg: TypeId,
    ) -> Option<NodeId> {
        let key = (name.to_string(), corpus.canon_name(first_arg).to_string());
        if let Some(&fun) = self.map.get(&key) {
            return Some(fun);
        }
        if let TypeShape::Array { elem, .. } = *corpus.shape(first_arg) {
            let slice = corpus.insert_slice(false, elem);
            let key = (name.to_string(), corpus.canon_name(slice).to_string());
            return self.map.get(&key).copied();
        }
        None
    }
}

// =============================================================================
// The typer
// =============================================================================

struct Typer<'a> {
    ctx: &'a mut Ctx,
    poly: &'a PolyMap,
    mod_name: String,
    enclosing_fun: Option<NodeId>,
    targets: Vec<Option<TypeId>>,
}

impl<'a> Typer<'a> {
    fn target(&self) -> Option<TypeId> {
        self.targets.last().copied().flatten()
    }

    fn with_target<R>(
        &mut self,
        target: Option<TypeId>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.targets.push(target);
        let out = f(self);
        self.targets.pop();
        out
    }

    fn annotate(&mut self, node: NodeId, ty: TypeId) -> Result<Option<TypeId>> {
        self.ctx.ast.set_type(node, ty);
        Ok(Some(ty))
    }

    /// Typifies a node that must produce a type.
    fn expect_type(&mut self, node: NodeId) -> Result<TypeId> {
        match self.typify(node)? {
            Some(ty) => Ok(ty),
            None => Err(type_err(
                self.ctx.ast.loc(node),
                format!("`{}` has no type here", self.ctx.ast.kind(node).tag()),
            )),
        }
    }

    fn base(&mut self, kind: BaseTypeKind) -> TypeId {
        self.ctx.corpus.insert_base(kind)
    }

    fn compute_array_length(&self, node: NodeId) -> Result<u64> {
        let loc = self.ctx.ast.loc(node);
        match self.ctx.ast.kind(node) {
            NodeKind::ValNum { number } => parse_num(number, loc),
            NodeKind::Id { .. } => {
                let def = self
                    .ctx
                    .ast
                    .node(node)
                    .x_symbol
                    .ok_or_else(|| type_err(loc, "array dimension is not resolved"))?;
                self.compute_array_length(def)
            }
            NodeKind::DefVar {
                mutable: false,
                initial,
                ..
            }
            | NodeKind::DefGlobal {
                mutable: false,
                initial,
                ..
            } => self.compute_array_length(*initial),
            _ => Err(type_err(
                loc,
                "array dimension is not a compile-time constant",
            )),
        }
    }

    fn typify(&mut self, node: NodeId) -> Result<Option<TypeId>> {
        if self
            .ctx
            .ast
            .flags(node)
            .contains(NodeFlags::TYPE_ANNOTATED)
        {
            if let Some(ty) = self.ctx.ast.node(node).x_type {
                return Ok(Some(ty));
            }
        }
        let loc = self.ctx.ast.loc(node);
        let kind = self.ctx.ast.kind(node).clone();
        match kind {
            NodeKind::Comment { .. } | NodeKind::Import { .. } => Ok(None),

            NodeKind::Id { name } => {
                let def = self.ctx.ast.node(node).x_symbol.ok_or_else(|| {
                    type_err(loc, format!("identifier `{}` was never resolved", name))
                })?;
                let ty = self.expect_type(def)?;
                self.annotate(node, ty)
            }

            // ---- type expressions ----------------------------------------
            NodeKind::TypeBase { kind } => {
                let ty = self.base(kind);
                self.annotate(node, ty)
            }
            NodeKind::TypePtr { mutable, ty } => {
                let pointee = self.expect_type(ty)?;
                let out = self.ctx.corpus.insert_ptr(mutable, pointee);
                self.annotate(node, out)
            }
            NodeKind::TypeSlice { mutable, ty } => {
                let elem = self.expect_type(ty)?;
                let out = self.ctx.corpus.insert_slice(mutable, elem);
                self.annotate(node, out)
            }
            NodeKind::TypeArray { size, ty } => {
                let elem = self.expect_type(ty)?;
                let uint = self.base(BaseTypeKind::Uint);
                self.with_target(Some(uint), |s| s.typify(size))?;
                let dim = self.compute_array_length(size)?;
                let out = self.ctx.corpus.insert_array(dim, elem);
                self.annotate(node, out)
            }
            NodeKind::TypeFun { params, result } | NodeKind::DefFun { params, result, .. } => {
                let mut param_types = Vec::with_capacity(params.len());
                for p in params {
                    if matches!(self.ctx.ast.kind(p), NodeKind::Comment { .. }) {
                        continue;
                    }
                    param_types.push(self.expect_type(p)?);
                }
                let result_ty = self.expect_type(result)?;
                let out = self.ctx.corpus.insert_fun(param_types, result_ty);
                // bodies are typed explicitly in pass B
                self.annotate(node, out)
            }
            NodeKind::TypeSum { types } => {
                let mut pieces = Vec::with_capacity(types.len());
                for t in types {
                    pieces.push(self.expect_type(t)?);
                }
                let out = self.ctx.corpus.insert_sum(&pieces);
                self.annotate(node, out)
            }
            NodeKind::TypeAuto | NodeKind::ValAuto => {
                Err(type_err(loc, "`auto` is not allowed here"))
            }
            NodeKind::ValUndef => {
                Err(type_err(loc, "`undef` is only allowed as an initializer"))
            }

            // ---- definitions ----------------------------------------------
            NodeKind::FunParam { ty, .. } => {
                let out = self.expect_type(ty)?;
                self.annotate(node, out)
            }
            NodeKind::RecField { ty, initial, .. } => {
                let out = self.expect_type(ty)?;
                if !matches!(self.ctx.ast.kind(initial), NodeKind::ValUndef) {
                    self.with_target(Some(out), |s| s.typify(initial))?;
                }
                self.annotate(node, out)
            }
            NodeKind::DefRec { name, fields, .. } => {
                // the placeholder goes in first so fields may refer back
                // to the record itself
                let qualified = format!("{}/{}", self.mod_name, name);
                let rec = self.ctx.corpus.insert_rec(&qualified, node);
                self.annotate(node, rec)?;
                for f in fields {
                    self.typify(f)?;
                }
                let Ctx {
                    ref mut ast,
                    ref mut corpus,
                    ..
                } = *self.ctx;
                corpus.set_size_and_offset_for_rec(ast, rec);
                Ok(Some(rec))
            }
            NodeKind::EnumVal { value, .. } => {
                let mut out = self.target().ok_or_else(|| {
                    type_err(loc, "enum entry outside of an enum definition")
                })?;
                if !matches!(self.ctx.ast.kind(value), NodeKind::ValAuto) {
                    out = self.expect_type(value)?;
                }
                self.annotate(node, out)
            }
            NodeKind::DefEnum {
                name, base, items, ..
            } => {
                let base_ty = self.base(base);
                let qualified = format!("{}/{}", self.mod_name, name);
                let out = self.ctx.corpus.insert_enum(&qualified, node, base_ty);
                self.with_target(Some(base_ty), |s| {
                    for item in items {
                        if matches!(s.ctx.ast.kind(item), NodeKind::Comment { .. }) {
                            continue;
                        }
                        s.typify(item)?;
                    }
                    Ok(())
                })?;
                self.annotate(node, out)
            }
            NodeKind::DefType { wrapped, ty, .. } => {
                let mut out = self.expect_type(ty)?;
                if wrapped {
                    out = self.ctx.corpus.insert_wrapped(out);
                }
                self.annotate(node, out)
            }
            NodeKind::DefVar {
                ty, initial, name, ..
            }
            | NodeKind::DefGlobal {
                ty, initial, name, ..
            } => {
                let declared = if matches!(self.ctx.ast.kind(ty), NodeKind::TypeAuto) {
                    None
                } else {
                    Some(self.expect_type(ty)?)
                };
                let mut inferred = None;
                if !matches!(self.ctx.ast.kind(initial), NodeKind::ValUndef) {
                    inferred =
                        Some(self.with_target(declared, |s| s.expect_type(initial))?);
                }
                let out = declared.or(inferred).ok_or_else(|| {
                    type_err(loc, format!("cannot infer a type for `{}`", name))
                })?;
                self.annotate(node, out)
            }

            // ---- values ---------------------------------------------------
            NodeKind::ValTrue | NodeKind::ValFalse => {
                let out = self.base(BaseTypeKind::Bool);
                self.annotate(node, out)
            }
            NodeKind::ValVoid => {
                let out = self.base(BaseTypeKind::Void);
                self.annotate(node, out)
            }
            NodeKind::ValNum { number } => {
                if let Some(ty) = self.ctx.corpus.num_type(&number) {
                    return self.annotate(node, ty);
                }
                let out = self.target().ok_or_else(|| {
                    type_err(
                        loc,
                        format!("cannot determine the type of number `{}`", number),
                    )
                })?;
                self.annotate(node, out)
            }
            NodeKind::ValString { raw, text } => {
                let dim = compute_string_size(raw, &text);
                let u8_ty = self.base(BaseTypeKind::U8);
                let out = self.ctx.corpus.insert_array(dim, u8_ty);
                self.annotate(node, out)
            }
            NodeKind::IndexVal { value, index } => {
                let out = self.target().ok_or_else(|| {
                    type_err(loc, "array element initializer needs an element type")
                })?;
                if !matches!(self.ctx.ast.kind(value), NodeKind::ValUndef) {
                    self.typify(value)?;
                }
                if !matches!(self.ctx.ast.kind(index), NodeKind::ValAuto) {
                    let uint = self.base(BaseTypeKind::Uint);
                    self.with_target(Some(uint), |s| s.typify(index))?;
                }
                self.annotate(node, out)
            }
            NodeKind::ValArray { size, ty, inits } => {
                let elem = self.expect_type(ty)?;
                self.with_target(Some(elem), |s| {
                    for init in inits {
                        s.typify(init)?;
                    }
                    Ok(())
                })?;
                let uint = self.base(BaseTypeKind::Uint);
                self.with_target(Some(uint), |s| s.typify(size))?;
                let dim = self.compute_array_length(size)?;
                let out = self.ctx.corpus.insert_array(dim, elem);
                self.annotate(node, out)
            }
            NodeKind::ValRec { ty, inits } => {
                let rec = self.expect_type(ty)?;
                let def = match self.ctx.corpus.shape(rec) {
                    TypeShape::Rec { def } => *def,
                    _ => {
                        return Err(type_err(
                            loc,
                            format!(
                                "record value needs a record type, got `{}`",
                                self.ctx.corpus.canon_name(rec)
                            ),
                        ))
                    }
                };
                let mut remaining: std::collections::VecDeque<NodeId> =
                    match self.ctx.ast.kind(def) {
                        NodeKind::DefRec { fields, .. } => fields
                            .iter()
                            .copied()
                            .filter(|&f| {
                                matches!(self.ctx.ast.kind(f), NodeKind::RecField { .. })
                            })
                            .collect(),
                        _ => unreachable!(),
                    };
                for init in inits {
                    let (field_name, value) = match self.ctx.ast.kind(init) {
                        NodeKind::Comment { .. } => continue,
                        NodeKind::FieldVal { field, value } => (field.clone(), *value),
                        other => {
                            return Err(type_err(
                                self.ctx.ast.loc(init),
                                format!("expected a field value, got `{}`", other.tag()),
                            ))
                        }
                    };
                    let field_node = if field_name.is_empty() {
                        remaining.pop_front().ok_or_else(|| {
                            type_err(self.ctx.ast.loc(init), "too many field values")
                        })?
                    } else {
                        // named initializers advance the cursor to their field
                        loop {
                            let f = remaining.pop_front().ok_or_else(|| {
                                type_err(
                                    self.ctx.ast.loc(init),
                                    format!("unknown or out-of-order field `{}`", field_name),
                                )
                            })?;
                            let matches_name = matches!(
                                self.ctx.ast.kind(f),
                                NodeKind::RecField { name, .. } if *name == field_name
                            );
                            if matches_name {
                                break f;
                            }
                        }
                    };
                    let field_ty = self
                        .ctx
                        .ast
                        .node(field_node)
                        .x_type
                        .expect("record fields typed before record values");
                    self.ctx.ast.set_field(init, field_node);
                    self.ctx.ast.set_type(init, field_ty);
                    self.with_target(Some(field_ty), |s| s.typify(value))?;
                }
                self.annotate(node, rec)
            }

            // ---- expressions ----------------------------------------------
            NodeKind::Expr1 { expr, .. } => {
                let out = self.expect_type(expr)?;
                self.annotate(node, out)
            }
            NodeKind::Expr2 { op, expr1, expr2 } => {
                let lhs = self.expect_type(expr1)?;
                let rhs = if op.operands_share_type() && self.ctx.corpus.is_number(lhs) {
                    self.with_target(Some(lhs), |s| s.expect_type(expr2))?
                } else if matches!(op, BinaryKind::IncP | BinaryKind::DecP) {
                    let uint = self.base(BaseTypeKind::Uint);
                    self.with_target(Some(uint), |s| s.expect_type(expr2))?
                } else {
                    self.expect_type(expr2)?
                };
                let out = if op.is_bool_op() {
                    self.base(BaseTypeKind::Bool)
                } else if op == BinaryKind::PDelta {
                    match (self.ctx.corpus.shape(lhs), self.ctx.corpus.shape(rhs)) {
                        (TypeShape::Ptr { .. }, TypeShape::Ptr { .. }) => {
                            self.base(BaseTypeKind::Sint)
                        }
                        (TypeShape::Slice { .. }, TypeShape::Slice { .. }) => lhs,
                        _ => {
                            return Err(type_err(
                                loc,
                                "pointer-delta needs two pointers or two slices",
                            ))
                        }
                    }
                } else {
                    lhs
                };
                self.annotate(node, out)
            }
            NodeKind::Expr3 {
                cond,
                expr_t,
                expr_f,
            } => {
                let bool_ty = self.base(BaseTypeKind::Bool);
                self.with_target(Some(bool_ty), |s| s.typify(cond))?;
                let out = self.expect_type(expr_t)?;
                self.with_target(Some(out), |s| s.typify(expr_f))?;
                self.annotate(node, out)
            }
            NodeKind::ExprCall { poly, callee, args } => {
                if poly {
                    let first_arg = *args.first().ok_or_else(|| {
                        type_err(loc, "polymorphic call needs at least one argument")
                    })?;
                    let callee_name = match self.ctx.ast.kind(callee) {
                        NodeKind::Id { name } => {
                            name.rsplit("::").next().unwrap_or(name).to_string()
                        }
                        other => {
                            return Err(type_err(
                                loc,
                                format!("polymorphic callee must be a name, got `{}`", other.tag()),
                            ))
                        }
                    };
                    let first_ty = self.expect_type(first_arg)?;
                    let fun_def = self
                        .poly
                        .resolve(&mut self.ctx.corpus, &callee_name, first_ty)
                        .ok_or_else(|| {
                            type_err(
                                loc,
                                format!(
                                    "cannot resolve polymorphic call `{}` for `{}`",
                                    callee_name,
                                    self.ctx.corpus.canon_name(first_ty)
                                ),
                            )
                        })?;
                    let fun_ty = self
                        .ctx
                        .ast
                        .node(fun_def)
                        .x_type
                        .expect("polymorphic function typed in pass A");
                    self.ctx.ast.set_symbol(callee, fun_def);
                    self.ctx.ast.set_type(callee, fun_ty);
                    let (params, result) = match self.ctx.corpus.shape(fun_ty) {
                        TypeShape::Fun { params, result } => (params.clone(), *result),
                        _ => unreachable!(),
                    };
                    if params.len() != args.len() {
                        return Err(type_err(
                            loc,
                            format!(
                                "call to `{}` expects {} argument(s), got {}",
                                callee_name,
                                params.len(),
                                args.len()
                            ),
                        ));
                    }
                    for (&param, &arg) in params.iter().zip(args.iter()).skip(1) {
                        self.with_target(Some(param), |s| s.typify(arg))?;
                    }
                    return self.annotate(node, result);
                }
                let fun_ty = self.expect_type(callee)?;
                let (params, result) = match self.ctx.corpus.shape(fun_ty) {
                    TypeShape::Fun { params, result } => (params.clone(), *result),
                    _ => {
                        return Err(type_err(
                            loc,
                            format!(
                                "called value has type `{}`, not a function",
                                self.ctx.corpus.canon_name(fun_ty)
                            ),
                        ))
                    }
                };
                if params.len() != args.len() {
                    return Err(type_err(
                        loc,
                        format!(
                            "call expects {} argument(s), got {}",
                            params.len(),
                            args.len()
                        ),
                    ));
                }
                for (&param, &arg) in params.iter().zip(args.iter()) {
                    self.with_target(Some(param), |s| s.typify(arg))?;
                }
                self.annotate(node, result)
            }
            NodeKind::ExprField { container, field } => {
                let rec = self.expect_type(container)?;
                let field_node = self
                    .ctx
                    .corpus
                    .lookup_rec_field(&self.ctx.ast, rec, &field)
                    .ok_or_else(|| {
                        type_err(
                            loc,
                            format!(
                                "`{}` has no field `{}`",
                                self.ctx.corpus.canon_name(rec),
                                field
                            ),
                        )
                    })?;
                let out = self.expect_type(field_node)?;
                self.ctx.ast.set_field(node, field_node);
                self.annotate(node, out)
            }
            NodeKind::ExprIndex { container, index } => {
                let uint = self.base(BaseTypeKind::Uint);
                self.with_target(Some(uint), |s| s.typify(index))?;
                let container_ty = self.expect_type(container)?;
                let out = self.ctx.corpus.contained_type(container_ty).ok_or_else(|| {
                    type_err(
                        loc,
                        format!(
                            "cannot index into `{}`",
                            self.ctx.corpus.canon_name(container_ty)
                        ),
                    )
                })?;
                self.annotate(node, out)
            }
            NodeKind::ExprDeref { expr } => {
                let ptr = self.expect_type(expr)?;
                let out = self.ctx.corpus.pointee_type(ptr).ok_or_else(|| {
                    type_err(
                        loc,
                        format!("cannot dereference `{}`", self.ctx.corpus.canon_name(ptr)),
                    )
                })?;
                self.annotate(node, out)
            }
            NodeKind::ExprAddrOf { mutable, expr } => {
                let inner = self.expect_type(expr)?;
                let out = self.ctx.corpus.insert_ptr(mutable, inner);
                self.annotate(node, out)
            }
            NodeKind::ExprAs { expr, ty }
            | NodeKind::ExprBitCast { expr, ty }
            | NodeKind::ExprUnsafeCast { expr, ty } => {
                let out = self.expect_type(ty)?;
                self.typify(expr)?;
                self.annotate(node, out)
            }
            NodeKind::ExprAsNot { expr, ty } => {
                let removed = self.expect_type(ty)?;
                let union = self.expect_type(expr)?;
                let out = self
                    .ctx
                    .corpus
                    .insert_sum_complement(union, removed)
                    .ok_or_else(|| {
                        type_err(
                            loc,
                            format!(
                                "cannot remove `{}` from `{}`",
                                self.ctx.corpus.canon_name(removed),
                                self.ctx.corpus.canon_name(union)
                            ),
                        )
                    })?;
                self.annotate(node, out)
            }
            NodeKind::ExprIs { expr, ty } => {
                self.typify(ty)?;
                self.typify(expr)?;
                let out = self.base(BaseTypeKind::Bool);
                self.annotate(node, out)
            }
            NodeKind::ExprTryAs { expr, ty, default } => {
                let out = self.expect_type(ty)?;
                self.typify(expr)?;
                if !matches!(self.ctx.ast.kind(default), NodeKind::ValUndef) {
                    self.with_target(Some(out), |s| s.typify(default))?;
                }
                self.annotate(node, out)
            }
            NodeKind::ExprLen { container } => {
                self.typify(container)?;
                let out = self.base(BaseTypeKind::Uint);
                self.annotate(node, out)
            }
            NodeKind::ExprSizeof { ty } => {
                self.typify(ty)?;
                let out = self.base(BaseTypeKind::Uint);
                self.annotate(node, out)
            }
            NodeKind::ExprOffsetof { ty, field } => {
                let rec = self.expect_type(ty)?;
                let field_node = self
                    .ctx
                    .corpus
                    .lookup_rec_field(&self.ctx.ast, rec, &field)
                    .ok_or_else(|| {
                        type_err(
                            loc,
                            format!(
                                "`{}` has no field `{}`",
                                self.ctx.corpus.canon_name(rec),
                                field
                            ),
                        )
                    })?;
                self.ctx.ast.set_field(node, field_node);
                let out = self.base(BaseTypeKind::Uint);
                self.annotate(node, out)
            }

            // ---- statements ----------------------------------------------
            NodeKind::StmtExpr { expr, .. } => {
                self.typify(expr)?;
                Ok(None)
            }
            NodeKind::StmtReturn { expr } => {
                let fun = self.enclosing_fun.ok_or_else(|| {
                    type_err(loc, "return statement outside of a function")
                })?;
                let result_node = match self.ctx.ast.kind(fun) {
                    NodeKind::DefFun { result, .. } => *result,
                    _ => unreachable!(),
                };
                let result_ty = self
                    .ctx
                    .ast
                    .node(result_node)
                    .x_type
                    .expect("function signature typed in pass A");
                self.with_target(Some(result_ty), |s| s.typify(expr))?;
                Ok(None)
            }
            NodeKind::StmtIf {
                cond,
                body_t,
                body_f,
            } => {
                let bool_ty = self.base(BaseTypeKind::Bool);
                self.with_target(Some(bool_ty), |s| s.typify(cond))?;
                for c in body_t.into_iter().chain(body_f) {
                    self.typify(c)?;
                }
                Ok(None)
            }
            NodeKind::Case { cond, body } => {
                let bool_ty = self.base(BaseTypeKind::Bool);
                self.with_target(Some(bool_ty), |s| s.typify(cond))?;
                for c in body {
                    self.typify(c)?;
                }
                Ok(None)
            }
            NodeKind::StmtCond { cases } => {
                for case in cases {
                    self.typify(case)?;
                }
                Ok(None)
            }
            NodeKind::StmtBlock { body } => {
                for c in body {
                    self.typify(c)?;
                }
                Ok(None)
            }
            NodeKind::StmtBreak | NodeKind::StmtContinue | NodeKind::StmtTrap => Ok(None),
            NodeKind::StmtAssignment { lhs, expr } => {
                let lhs_ty = self.expect_type(lhs)?;
                self.with_target(Some(lhs_ty), |s| s.typify(expr))?;
                Ok(None)
            }
            NodeKind::StmtCompoundAssignment { op, lhs, expr } => {
                let lhs_ty = self.expect_type(lhs)?;
                let target = if matches!(op, AssignKind::IncP | AssignKind::DecP) {
                    self.base(BaseTypeKind::Uint)
                } else {
                    lhs_ty
                };
                self.with_target(Some(target), |s| s.typify(expr))?;
                Ok(None)
            }
            NodeKind::StmtStaticAssert { cond } => {
                let bool_ty = self.base(BaseTypeKind::Bool);
                self.with_target(Some(bool_ty), |s| s.typify(cond))?;
                Ok(None)
            }

            other => Err(type_err(
                loc,
                format!("unexpected node `{}` during type inference", other.tag()),
            )),
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Runs both inference passes over the topological module order and
/// returns the populated polymorphic registry (kept for tooling).
pub fn decorate_ast_with_types(ctx: &mut Ctx) -> Result<PolyMap> {
    let order = ctx.topo.clone();
    let mut poly = PolyMap::new();

    // Pass A: top-level declarations, then the polymorphic registry.
    for &mid in &order {
        let mod_name = ctx.module(mid).name.clone();
        for node in ctx.module_body(mid) {
            if matches!(
                ctx.ast.kind(node),
                NodeKind::Comment { .. } | NodeKind::DefMacro { .. }
            ) {
                continue;
            }
            {
                let mut typer = Typer {
                    ctx: &mut *ctx,
                    poly: &poly,
                    mod_name: mod_name.clone(),
                    enclosing_fun: None,
                    targets: Vec::new(),
                };
                typer.typify(node)?;
            }
            if matches!(ctx.ast.kind(node), NodeKind::DefFun { poly: true, .. }) {
                poly.register(ctx, node)?;
            }
        }
    }

    // Pass B: function bodies, with the registry available for dispatch.
    for &mid in &order {
        let mod_name = ctx.module(mid).name.clone();
        for node in ctx.module_body(mid) {
            let body = match ctx.ast.kind(node) {
                NodeKind::DefFun {
                    extern_linkage: false,
                    body,
                    ..
                } => body.clone(),
                _ => continue,
            };
            let mut typer = Typer {
                ctx: &mut *ctx,
                poly: &poly,
                mod_name: mod_name.clone(),
                enclosing_fun: Some(node),
                targets: Vec::new(),
            };
            for c in body {
                typer.typify(c)?;
            }
        }
    }
    Ok(poly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswind_base::Sym;

    #[test]
    fn string_size_empty_is_zero() {
        assert_eq!(compute_string_size(true, "\"\""), 0);
        assert_eq!(compute_string_size(false, "\"\""), 0);
    }

    #[test]
    fn string_size_counts_escapes_once() {
        // two characters raw, one byte cooked
        assert_eq!(compute_string_size(true, "\"\\n\""), 2);
        assert_eq!(compute_string_size(false, "\"\\n\""), 1);
    }

    #[test]
    fn string_size_hex_escape_is_one_byte() {
        assert_eq!(compute_string_size(false, "\"\\x41B\""), 2);
        assert_eq!(compute_string_size(true, "\"\\x41B\""), 5);
    }

    #[test]
    fn parse_num_handles_suffixes_and_underscores() {
        let loc = SrcLoc::new(Sym::NONE, 1);
        assert_eq!(parse_num("10", loc).unwrap(), 10);
        assert_eq!(parse_num("1_000_u32", loc).unwrap(), 1000);
        assert_eq!(parse_num("7_uint", loc).unwrap(), 7);
        assert_eq!(parse_num("8u8", loc).unwrap(), 8);
    }

    #[test]
    fn parse_num_evaluates_char_literals() {
        let loc = SrcLoc::new(Sym::NONE, 1);
        assert_eq!(parse_num("'a'", loc).unwrap(), 97);
        assert_eq!(parse_num("'\\n'", loc).unwrap(), 10);
    }

    #[test]
    fn parse_num_rejects_floats() {
        let loc = SrcLoc::new(Sym::NONE, 1);
        assert!(parse_num("1.5", loc).is_err());
        assert!(parse_num("2_r32", loc).is_err());
    }
}
