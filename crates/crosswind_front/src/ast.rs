//! AST model for the crosswind frontend.
//!
//! All nodes live in a [`Ast`] arena and reference each other through
//! copyable [`NodeId`] indices, so cross-links like `x_symbol` never form
//! ownership cycles. A node is a [`NodeKind`] (the closed set of
//! variants), a [`SrcLoc`], and the annotation slots the later phases
//! fill in exactly once.
//!
//! Node kinds are partitioned into families by [`NodeFlags`]; the
//! reader, macro expander, and verifier introspect nodes through the
//! field schema ([`node_schema`]) and the child-slot API
//! ([`NodeKind::child_slots`]) instead of hand-written per-kind
//! traversals.

use crosswind_base::SrcLoc;

/// Index of a node in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a canonical type in the type corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a module instance in the compilation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModId(pub(crate) u32);

impl ModId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Node flags
// =============================================================================

/// Family membership bits for a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Legal only as a direct child of a module node.
    pub const TOP_LEVEL: NodeFlags = NodeFlags(1 << 0);
    /// May live in the type corpus.
    pub const TYPE_CORPUS: NodeFlags = NodeFlags(1 << 1);
    /// Carries an `x_type` slot.
    pub const TYPE_ANNOTATED: NodeFlags = NodeFlags(1 << 2);
    /// Carries an `x_symbol` slot.
    pub const SYMBOL_ANNOTATED: NodeFlags = NodeFlags(1 << 3);
    /// Carries an `x_field` slot.
    pub const FIELD_ANNOTATED: NodeFlags = NodeFlags(1 << 4);
    /// Pushes a local scope during symbol resolution.
    pub const NEW_SCOPE: NodeFlags = NodeFlags(1 << 5);
    /// Macro-form that the expander rewrites.
    pub const TO_BE_EXPANDED: NodeFlags = NodeFlags(1 << 6);

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

// =============================================================================
// Scalar kinds
// =============================================================================

/// Primitive type kinds. `Uint` and `Sint` are aliases the corpus
/// resolves to a configured machine width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseTypeKind {
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    R32,
    R64,
    Bool,
    Void,
    NoRet,
    Uint,
    Sint,
}

impl BaseTypeKind {
    pub const ALL: [BaseTypeKind; 15] = [
        BaseTypeKind::U8,
        BaseTypeKind::U16,
        BaseTypeKind::U32,
        BaseTypeKind::U64,
        BaseTypeKind::S8,
        BaseTypeKind::S16,
        BaseTypeKind::S32,
        BaseTypeKind::S64,
        BaseTypeKind::R32,
        BaseTypeKind::R64,
        BaseTypeKind::Bool,
        BaseTypeKind::Void,
        BaseTypeKind::NoRet,
        BaseTypeKind::Uint,
        BaseTypeKind::Sint,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BaseTypeKind::U8 => "u8",
            BaseTypeKind::U16 => "u16",
            BaseTypeKind::U32 => "u32",
            BaseTypeKind::U64 => "u64",
            BaseTypeKind::S8 => "s8",
            BaseTypeKind::S16 => "s16",
            BaseTypeKind::S32 => "s32",
            BaseTypeKind::S64 => "s64",
            BaseTypeKind::R32 => "r32",
            BaseTypeKind::R64 => "r64",
            BaseTypeKind::Bool => "bool",
            BaseTypeKind::Void => "void",
            BaseTypeKind::NoRet => "noret",
            BaseTypeKind::Uint => "uint",
            BaseTypeKind::Sint => "sint",
        }
    }

    pub fn from_name(name: &str) -> Option<BaseTypeKind> {
        BaseTypeKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Not,
    Neg,
    Complement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndSc,
    OrSc,
    PDelta,
    IncP,
    DecP,
}

impl BinaryKind {
    /// Operators whose result type is `bool`.
    pub fn is_bool_op(self) -> bool {
        matches!(
            self,
            BinaryKind::Eq
                | BinaryKind::Ne
                | BinaryKind::Lt
                | BinaryKind::Le
                | BinaryKind::Gt
                | BinaryKind::Ge
                | BinaryKind::AndSc
                | BinaryKind::OrSc
        )
    }

    /// Operators whose two operands must share a numeric type; the first
    /// operand's type becomes the expected type of the second.
    pub fn operands_share_type(self) -> bool {
        matches!(
            self,
            BinaryKind::Add
                | BinaryKind::Sub
                | BinaryKind::Mul
                | BinaryKind::Div
                | BinaryKind::Mod
                | BinaryKind::Shl
                | BinaryKind::Shr
                | BinaryKind::BitAnd
                | BinaryKind::BitOr
                | BinaryKind::BitXor
                | BinaryKind::Eq
                | BinaryKind::Ne
                | BinaryKind::Lt
                | BinaryKind::Le
                | BinaryKind::Gt
                | BinaryKind::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    IncP,
    DecP,
}

// =============================================================================
// Node kinds
// =============================================================================

/// The closed set of AST node variants.
///
/// Field names follow the reader schema (see [`node_schema`]); fields of
/// type [`NodeId`]/`Vec<NodeId>` are the child slots visible to the
/// generic traversals.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ---- module level -------------------------------------------------
    DefMod {
        name: String,
        body: Vec<NodeId>,
        params: Vec<String>,
    },
    Import {
        name: String,
        alias: String,
        args: Vec<NodeId>,
    },
    DefFun {
        pub_vis: bool,
        extern_linkage: bool,
        poly: bool,
        name: String,
        params: Vec<NodeId>,
        result: NodeId,
        body: Vec<NodeId>,
    },
    FunParam {
        name: String,
        ty: NodeId,
    },
    DefRec {
        pub_vis: bool,
        name: String,
        fields: Vec<NodeId>,
    },
    RecField {
        name: String,
        ty: NodeId,
        initial: NodeId,
    },
    DefEnum {
        pub_vis: bool,
        name: String,
        base: BaseTypeKind,
        items: Vec<NodeId>,
    },
    EnumVal {
        name: String,
        value: NodeId,
    },
    DefType {
        pub_vis: bool,
        wrapped: bool,
        name: String,
        ty: NodeId,
    },
    DefGlobal {
        pub_vis: bool,
        mutable: bool,
        name: String,
        ty: NodeId,
        initial: NodeId,
    },
    DefVar {
        mutable: bool,
        name: String,
        ty: NodeId,
        initial: NodeId,
    },
    DefMacro {
        pub_vis: bool,
        name: String,
        params: Vec<String>,
        gen_ids: Vec<String>,
        body: Vec<NodeId>,
    },
    Comment {
        text: String,
    },

    // ---- types ---------------------------------------------------------
    TypeBase {
        kind: BaseTypeKind,
    },
    TypePtr {
        mutable: bool,
        ty: NodeId,
    },
    TypeSlice {
        mutable: bool,
        ty: NodeId,
    },
    TypeArray {
        size: NodeId,
        ty: NodeId,
    },
    TypeFun {
        params: Vec<NodeId>,
        result: NodeId,
    },
    TypeSum {
        types: Vec<NodeId>,
    },
    TypeAuto,

    // ---- values --------------------------------------------------------
    ValTrue,
    ValFalse,
    ValVoid,
    ValUndef,
    ValAuto,
    ValNum {
        number: String,
    },
    /// `text` keeps the surrounding quotes; `raw` strings skip escape
    /// processing.
    ValString {
        raw: bool,
        text: String,
    },
    ValArray {
        size: NodeId,
        ty: NodeId,
        inits: Vec<NodeId>,
    },
    IndexVal {
        value: NodeId,
        index: NodeId,
    },
    ValRec {
        ty: NodeId,
        inits: Vec<NodeId>,
    },
    FieldVal {
        value: NodeId,
        field: String,
    },

    // ---- identifiers and macro machinery --------------------------------
    /// Possibly qualified reference `a::b::c`, stored unsplit.
    Id {
        name: String,
    },
    /// `$name` placeholder inside a macro body.
    MacroId {
        name: String,
    },
    /// Unknown tag read as a macro invocation.
    MacroInvoke {
        name: String,
        args: Vec<NodeId>,
    },
    /// Expansion result that splices into the surrounding list.
    MacroListArg {
        args: Vec<NodeId>,
    },
    /// Bracketed macro argument, preserved until expansion.
    EphemeralList {
        args: Vec<NodeId>,
    },

    // ---- expressions ---------------------------------------------------
    Expr1 {
        op: UnaryKind,
        expr: NodeId,
    },
    Expr2 {
        op: BinaryKind,
        expr1: NodeId,
        expr2: NodeId,
    },
    Expr3 {
        cond: NodeId,
        expr_t: NodeId,
        expr_f: NodeId,
    },
    ExprCall {
        poly: bool,
        callee: NodeId,
        args: Vec<NodeId>,
    },
    ExprField {
        container: NodeId,
        field: String,
    },
    ExprIndex {
        container: NodeId,
        index: NodeId,
    },
    ExprDeref {
        expr: NodeId,
    },
    ExprAddrOf {
        mutable: bool,
        expr: NodeId,
    },
    ExprAs {
        expr: NodeId,
        ty: NodeId,
    },
    ExprBitCast {
        expr: NodeId,
        ty: NodeId,
    },
    ExprUnsafeCast {
        expr: NodeId,
        ty: NodeId,
    },
    ExprAsNot {
        expr: NodeId,
        ty: NodeId,
    },
    ExprIs {
        expr: NodeId,
        ty: NodeId,
    },
    ExprTryAs {
        expr: NodeId,
        ty: NodeId,
        default: NodeId,
    },
    ExprLen {
        container: NodeId,
    },
    ExprSizeof {
        ty: NodeId,
    },
    ExprOffsetof {
        ty: NodeId,
        field: String,
    },
    ExprSrcLoc,
    ExprStringify {
        expr: NodeId,
    },

    // ---- statements ----------------------------------------------------
    StmtReturn {
        expr: NodeId,
    },
    StmtIf {
        cond: NodeId,
        body_t: Vec<NodeId>,
        body_f: Vec<NodeId>,
    },
    StmtCond {
        cases: Vec<NodeId>,
    },
    Case {
        cond: NodeId,
        body: Vec<NodeId>,
    },
    StmtBlock {
        body: Vec<NodeId>,
    },
    StmtBreak,
    StmtContinue,
    StmtTrap,
    StmtExpr {
        discard: bool,
        expr: NodeId,
    },
    StmtAssignment {
        lhs: NodeId,
        expr: NodeId,
    },
    StmtCompoundAssignment {
        op: AssignKind,
        lhs: NodeId,
        expr: NodeId,
    },
    StmtStaticAssert {
        cond: NodeId,
    },
}

impl NodeKind {
    /// Short name for diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::DefMod { .. } => "module",
            NodeKind::Import { .. } => "import",
            NodeKind::DefFun { .. } => "fun",
            NodeKind::FunParam { .. } => "param",
            NodeKind::DefRec { .. } => "defrec",
            NodeKind::RecField { .. } => "field",
            NodeKind::DefEnum { .. } => "defenum",
            NodeKind::EnumVal { .. } => "entry",
            NodeKind::DefType { .. } => "deftype",
            NodeKind::DefGlobal { .. } => "global",
            NodeKind::DefVar { .. } => "let",
            NodeKind::DefMacro { .. } => "macro",
            NodeKind::Comment { .. } => "#",
            NodeKind::TypeBase { .. } => "base-type",
            NodeKind::TypePtr { .. } => "ptr",
            NodeKind::TypeSlice { .. } => "slice",
            NodeKind::TypeArray { .. } => "array",
            NodeKind::TypeFun { .. } => "sig",
            NodeKind::TypeSum { .. } => "sum",
            NodeKind::TypeAuto => "auto",
            NodeKind::ValTrue => "true",
            NodeKind::ValFalse => "false",
            NodeKind::ValVoid => "void_val",
            NodeKind::ValUndef => "undef",
            NodeKind::ValAuto => "auto_val",
            NodeKind::ValNum { .. } => "num",
            NodeKind::ValString { .. } => "str",
            NodeKind::ValArray { .. } => "valarray",
            NodeKind::IndexVal { .. } => "idx",
            NodeKind::ValRec { .. } => "valrec",
            NodeKind::FieldVal { .. } => "fieldval",
            NodeKind::Id { .. } => "id",
            NodeKind::MacroId { .. } => "macro-id",
            NodeKind::MacroInvoke { .. } => "macro-invoke",
            NodeKind::MacroListArg { .. } => "macro-list-arg",
            NodeKind::EphemeralList { .. } => "ephemeral-list",
            NodeKind::Expr1 { .. } => "expr1",
            NodeKind::Expr2 { .. } => "expr2",
            NodeKind::Expr3 { .. } => "?",
            NodeKind::ExprCall { .. } => "call",
            NodeKind::ExprField { .. } => ".",
            NodeKind::ExprIndex { .. } => "at",
            NodeKind::ExprDeref { .. } => "deref",
            NodeKind::ExprAddrOf { .. } => "addrof",
            NodeKind::ExprAs { .. } => "as",
            NodeKind::ExprBitCast { .. } => "bitcast",
            NodeKind::ExprUnsafeCast { .. } => "unsafe_as",
            NodeKind::ExprAsNot { .. } => "asnot",
            NodeKind::ExprIs { .. } => "is",
            NodeKind::ExprTryAs { .. } => "tryas",
            NodeKind::ExprLen { .. } => "len",
            NodeKind::ExprSizeof { .. } => "sizeof",
            NodeKind::ExprOffsetof { .. } => "offsetof",
            NodeKind::ExprSrcLoc => "srcloc",
            NodeKind::ExprStringify { .. } => "stringify",
            NodeKind::StmtReturn { .. } => "return",
            NodeKind::StmtIf { .. } => "if",
            NodeKind::StmtCond { .. } => "cond",
            NodeKind::Case { .. } => "case",
            NodeKind::StmtBlock { .. } => "block",
            NodeKind::StmtBreak => "break",
            NodeKind::StmtContinue => "continue",
            NodeKind::StmtTrap => "trap",
            NodeKind::StmtExpr { .. } => "stmt",
            NodeKind::StmtAssignment { .. } => "=",
            NodeKind::StmtCompoundAssignment { .. } => "compound-assign",
            NodeKind::StmtStaticAssert { .. } => "static_assert",
        }
    }

    pub fn flags(&self) -> NodeFlags {
        use NodeKind::*;
        match self {
            Import { .. } => NodeFlags::TOP_LEVEL,
            DefMacro { .. } => NodeFlags::TOP_LEVEL,
            DefFun { .. } => {
                NodeFlags::TOP_LEVEL | NodeFlags::TYPE_ANNOTATED | NodeFlags::NEW_SCOPE
            }
            DefRec { .. } | DefEnum { .. } | DefType { .. } => {
                NodeFlags::TOP_LEVEL | NodeFlags::TYPE_CORPUS | NodeFlags::TYPE_ANNOTATED
            }
            DefGlobal { .. } => NodeFlags::TOP_LEVEL | NodeFlags::TYPE_ANNOTATED,
            DefVar { .. } | FunParam { .. } | RecField { .. } | EnumVal { .. } => {
                NodeFlags::TYPE_ANNOTATED
            }
            TypeBase { .. } | TypePtr { .. } | TypeSlice { .. } | TypeArray { .. }
            | TypeFun { .. } | TypeSum { .. } => {
                NodeFlags::TYPE_CORPUS | NodeFlags::TYPE_ANNOTATED
            }
            ValTrue | ValFalse | ValVoid | ValNum { .. } | ValString { .. }
            | ValArray { .. } | IndexVal { .. } | ValRec { .. } => NodeFlags::TYPE_ANNOTATED,
            FieldVal { .. } => NodeFlags::TYPE_ANNOTATED | NodeFlags::FIELD_ANNOTATED,
            Id { .. } => NodeFlags::TYPE_ANNOTATED | NodeFlags::SYMBOL_ANNOTATED,
            Expr1 { .. } | Expr2 { .. } | Expr3 { .. } | ExprCall { .. } | ExprIndex { .. }
            | ExprDeref { .. } | ExprAddrOf { .. } | ExprAs { .. } | ExprBitCast { .. }
            | ExprUnsafeCast { .. } | ExprAsNot { .. } | ExprIs { .. } | ExprTryAs { .. }
            | ExprLen { .. } | ExprSizeof { .. } => NodeFlags::TYPE_ANNOTATED,
            ExprField { .. } | ExprOffsetof { .. } => {
                NodeFlags::TYPE_ANNOTATED | NodeFlags::FIELD_ANNOTATED
            }
            MacroInvoke { .. } => NodeFlags::TO_BE_EXPANDED,
            ExprSrcLoc | ExprStringify { .. } => NodeFlags::TO_BE_EXPANDED,
            StmtBlock { .. } | Case { .. } => NodeFlags::NEW_SCOPE,
            _ => NodeFlags::NONE,
        }
    }
}

// =============================================================================
// Child-slot introspection
// =============================================================================

/// One child position of a node: either a single nested node or a
/// bracketed list. Slot names match the reader schema so passes can
/// special-case e.g. the `body_t`/`body_f` lists of conditionals.
#[derive(Debug, Clone)]
pub enum ChildSlot {
    Node { name: &'static str, id: NodeId },
    List { name: &'static str, ids: Vec<NodeId> },
}

fn n(name: &'static str, id: NodeId) -> ChildSlot {
    ChildSlot::Node { name, id }
}

fn l(name: &'static str, ids: &[NodeId]) -> ChildSlot {
    ChildSlot::List {
        name,
        ids: ids.to_vec(),
    }
}

fn take_node(it: &mut std::vec::IntoIter<ChildSlot>) -> NodeId {
    match it.next() {
        Some(ChildSlot::Node { id, .. }) => id,
        other => panic!("expected node slot, got {:?}", other),
    }
}

fn take_list(it: &mut std::vec::IntoIter<ChildSlot>) -> Vec<NodeId> {
    match it.next() {
        Some(ChildSlot::List { ids, .. }) => ids,
        other => panic!("expected list slot, got {:?}", other),
    }
}

impl NodeKind {
    /// The child slots of this node in schema order (ids are copied out).
    pub fn child_slots(&self) -> Vec<ChildSlot> {
        use NodeKind::*;
        match self {
            DefMod { body, .. } => vec![l("body", body)],
            Import { args, .. } => vec![l("args", args)],
            DefFun {
                params,
                result,
                body,
                ..
            } => vec![l("params", params), n("result", *result), l("body", body)],
            FunParam { ty, .. } => vec![n("type", *ty)],
            DefRec { fields, .. } => vec![l("fields", fields)],
            RecField { ty, initial, .. } => vec![n("type", *ty), n("initial", *initial)],
            DefEnum { items, .. } => vec![l("items", items)],
            EnumVal { value, .. } => vec![n("value", *value)],
            DefType { ty, .. } => vec![n("type", *ty)],
            DefGlobal { ty, initial, .. } | DefVar { ty, initial, .. } => {
                vec![n("type", *ty), n("initial", *initial)]
            }
            DefMacro { body, .. } => vec![l("body", body)],
            TypePtr { ty, .. } | TypeSlice { ty, .. } => vec![n("type", *ty)],
            TypeArray { size, ty } => vec![n("size", *size), n("type", *ty)],
            TypeFun { params, result } => vec![l("params", params), n("result", *result)],
            TypeSum { types } => vec![l("types", types)],
            ValArray { size, ty, inits } => {
                vec![n("size", *size), n("type", *ty), l("inits", inits)]
            }
            IndexVal { value, index } => vec![n("value", *value), n("index", *index)],
            ValRec { ty, inits } => vec![n("type", *ty), l("inits", inits)],
            FieldVal { value, .. } => vec![n("value", *value)],
            MacroInvoke { args, .. } | MacroListArg { args } | EphemeralList { args } => {
                vec![l("args", args)]
            }
            Expr1 { expr, .. } => vec![n("expr", *expr)],
            Expr2 { expr1, expr2, .. } => vec![n("expr1", *expr1), n("expr2", *expr2)],
            Expr3 {
                cond,
                expr_t,
                expr_f,
            } => vec![n("cond", *cond), n("expr_t", *expr_t), n("expr_f", *expr_f)],
            ExprCall { callee, args, .. } => vec![n("callee", *callee), l("args", args)],
            ExprField { container, .. } | ExprLen { container } => {
                vec![n("container", *container)]
            }
            ExprIndex { container, index } => {
                vec![n("container", *container), n("index", *index)]
            }
            ExprDeref { expr } | ExprAddrOf { expr, .. } | ExprStringify { expr } => {
                vec![n("expr", *expr)]
            }
            ExprAs { expr, ty }
            | ExprBitCast { expr, ty }
            | ExprUnsafeCast { expr, ty }
            | ExprAsNot { expr, ty }
            | ExprIs { expr, ty } => vec![n("expr", *expr), n("type", *ty)],
            ExprTryAs { expr, ty, default } => {
                vec![n("expr", *expr), n("type", *ty), n("default", *default)]
            }
            ExprSizeof { ty } => vec![n("type", *ty)],
            ExprOffsetof { ty, .. } => vec![n("type", *ty)],
            StmtReturn { expr } => vec![n("expr", *expr)],
            StmtIf {
                cond,
                body_t,
                body_f,
            } => vec![n("cond", *cond), l("body_t", body_t), l("body_f", body_f)],
            StmtCond { cases } => vec![l("cases", cases)],
            Case { cond, body } => vec![n("cond", *cond), l("body", body)],
            StmtBlock { body } => vec![l("body", body)],
            StmtExpr { expr, .. } => vec![n("expr", *expr)],
            StmtAssignment { lhs, expr } | StmtCompoundAssignment { lhs, expr, .. } => {
                vec![n("lhs", *lhs), n("expr", *expr)]
            }
            StmtStaticAssert { cond } => vec![n("cond", *cond)],
            _ => Vec::new(),
        }
    }

    /// Writes back child slots produced by [`NodeKind::child_slots`]
    /// (same order and shapes). Used by the macro expander and the
    /// subtree cloner.
    ///
    /// # Panics
    ///
    /// Panics if the slots do not match this kind's schema.
    pub fn set_child_slots(&mut self, slots: Vec<ChildSlot>) {
        use NodeKind::*;
        let mut it = slots.into_iter();
        match self {
            DefMod { body, .. } => *body = take_list(&mut it),
            Import { args, .. } => *args = take_list(&mut it),
            DefFun {
                params,
                result,
                body,
                ..
            } => {
                *params = take_list(&mut it);
                *result = take_node(&mut it);
                *body = take_list(&mut it);
            }
            FunParam { ty, .. } => *ty = take_node(&mut it),
            DefRec { fields, .. } => *fields = take_list(&mut it),
            RecField { ty, initial, .. } => {
                *ty = take_node(&mut it);
                *initial = take_node(&mut it);
            }
            DefEnum { items, .. } => *items = take_list(&mut it),
            EnumVal { value, .. } => *value = take_node(&mut it),
            DefType { ty, .. } => *ty = take_node(&mut it),
            DefGlobal { ty, initial, .. } | DefVar { ty, initial, .. } => {
                *ty = take_node(&mut it);
                *initial = take_node(&mut it);
            }
            DefMacro { body, .. } => *body = take_list(&mut it),
            TypePtr { ty, .. } | TypeSlice { ty, .. } => *ty = take_node(&mut it),
            TypeArray { size, ty } => {
                *size = take_node(&mut it);
                *ty = take_node(&mut it);
            }
            TypeFun { params, result } => {
                *params = take_list(&mut it);
                *result = take_node(&mut it);
            }
            TypeSum { types } => *types = take_list(&mut it),
            ValArray { size, ty, inits } => {
                *size = take_node(&mut it);
                *ty = take_node(&mut it);
                *inits = take_list(&mut it);
            }
            IndexVal { value, index } => {
                *value = take_node(&mut it);
                *index = take_node(&mut it);
            }
            ValRec { ty, inits } => {
                *ty = take_node(&mut it);
                *inits = take_list(&mut it);
            }
            FieldVal { value, .. } => *value = take_node(&mut it),
            MacroInvoke { args, .. } | MacroListArg { args } | EphemeralList { args } => {
                *args = take_list(&mut it)
            }
            Expr1 { expr, .. } => *expr = take_node(&mut it),
            Expr2 { expr1, expr2, .. } => {
                *expr1 = take_node(&mut it);
                *expr2 = take_node(&mut it);
            }
            Expr3 {
                cond,
                expr_t,
                expr_f,
            } => {
                *cond = take_node(&mut it);
                *expr_t = take_node(&mut it);
                *expr_f = take_node(&mut it);
            }
            ExprCall { callee, args, .. } => {
                *callee = take_node(&mut it);
                *args = take_list(&mut it);
            }
            ExprField { container, .. } | ExprLen { container } => {
                *container = take_node(&mut it)
            }
            ExprIndex { container, index } => {
                *container = take_node(&mut it);
                *index = take_node(&mut it);
            }
            ExprDeref { expr } | ExprAddrOf { expr, .. } | ExprStringify { expr } => {
                *expr = take_node(&mut it)
            }
            ExprAs { expr, ty }
            | ExprBitCast { expr, ty }
            | ExprUnsafeCast { expr, ty }
            | ExprAsNot { expr, ty }
            | ExprIs { expr, ty } => {
                *expr = take_node(&mut it);
                *ty = take_node(&mut it);
            }
            ExprTryAs { expr, ty, default } => {
                *expr = take_node(&mut it);
                *ty = take_node(&mut it);
                *default = take_node(&mut it);
            }
            ExprSizeof { ty } => *ty = take_node(&mut it),
            ExprOffsetof { ty, .. } => *ty = take_node(&mut it),
            StmtReturn { expr } => *expr = take_node(&mut it),
            StmtIf {
                cond,
                body_t,
                body_f,
            } => {
                *cond = take_node(&mut it);
                *body_t = take_list(&mut it);
                *body_f = take_list(&mut it);
            }
            StmtCond { cases } => *cases = take_list(&mut it),
            Case { cond, body } => {
                *cond = take_node(&mut it);
                *body = take_list(&mut it);
            }
            StmtBlock { body } => *body = take_list(&mut it),
            StmtExpr { expr, .. } => *expr = take_node(&mut it),
            StmtAssignment { lhs, expr } | StmtCompoundAssignment { lhs, expr, .. } => {
                *lhs = take_node(&mut it);
                *expr = take_node(&mut it);
            }
            StmtStaticAssert { cond } => *cond = take_node(&mut it),
            _ => {}
        }
        assert!(it.next().is_none(), "surplus child slots for {}", self.tag());
    }
}

// =============================================================================
// Reader field schema
// =============================================================================

/// How the reader consumes tokens for one declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Presence of the field's keyword token toggles a boolean.
    Flag,
    /// A single scalar atom (names, numbers-as-text, quoted strings).
    Str,
    /// An atom mapped to a named enum (base type kinds).
    Kind,
    /// A nested node: `(…)` or a shorthand atom.
    Node,
    /// `[ … ]` bracketed sequence of nodes.
    List,
    /// `[ … ]` bracketed sequence of atoms.
    StrList,
}

/// Default for a field missing at the end of a node form.
#[derive(Clone, Copy)]
pub enum FieldDefault {
    /// The field must be present.
    Required,
    /// Empty string/list.
    Empty,
    /// Synthesize a node at the node's location.
    NodeFn(fn(SrcLoc) -> NodeKind),
}

pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

pub struct NodeSchema {
    pub tag: &'static str,
    pub top_level: bool,
    pub fields: &'static [FieldDef],
}

const fn req(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        default: FieldDefault::Required,
    }
}

const fn opt_empty(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        default: FieldDefault::Empty,
    }
}

const fn opt_node(name: &'static str, f: fn(SrcLoc) -> NodeKind) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Node,
        default: FieldDefault::NodeFn(f),
    }
}

fn mk_undef(_: SrcLoc) -> NodeKind {
    NodeKind::ValUndef
}

fn mk_auto_val(_: SrcLoc) -> NodeKind {
    NodeKind::ValAuto
}

fn mk_auto_type(_: SrcLoc) -> NodeKind {
    NodeKind::TypeAuto
}

fn mk_void_val(_: SrcLoc) -> NodeKind {
    NodeKind::ValVoid
}

/// Schema of every tagged node form, in reading order. Operator aliases
/// (`+`, `!`, `+=`, …) are handled separately by the reader.
pub static NODE_SCHEMAS: &[NodeSchema] = &[
    NodeSchema {
        tag: "module",
        top_level: false,
        fields: &[
            req("name", FieldKind::Str),
            req("body", FieldKind::List),
            opt_empty("params", FieldKind::StrList),
        ],
    },
    NodeSchema {
        tag: "import",
        top_level: true,
        fields: &[
            req("name", FieldKind::Str),
            opt_empty("alias", FieldKind::Str),
            opt_empty("args", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "fun",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("extern", FieldKind::Flag),
            req("poly", FieldKind::Flag),
            req("name", FieldKind::Str),
            req("params", FieldKind::List),
            req("result", FieldKind::Node),
            req("body", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "param",
        top_level: false,
        fields: &[req("name", FieldKind::Str), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "defrec",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("name", FieldKind::Str),
            req("fields", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "field",
        top_level: false,
        fields: &[
            req("name", FieldKind::Str),
            req("type", FieldKind::Node),
            opt_node("initial", mk_undef),
        ],
    },
    NodeSchema {
        tag: "defenum",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("name", FieldKind::Str),
            req("base", FieldKind::Kind),
            req("items", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "entry",
        top_level: false,
        fields: &[req("name", FieldKind::Str), opt_node("value", mk_auto_val)],
    },
    NodeSchema {
        tag: "deftype",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("wrapped", FieldKind::Flag),
            req("name", FieldKind::Str),
            req("type", FieldKind::Node),
        ],
    },
    NodeSchema {
        tag: "global",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("mut", FieldKind::Flag),
            req("name", FieldKind::Str),
            opt_node("type", mk_auto_type),
            opt_node("initial", mk_undef),
        ],
    },
    NodeSchema {
        tag: "let",
        top_level: false,
        fields: &[
            req("mut", FieldKind::Flag),
            req("name", FieldKind::Str),
            opt_node("type", mk_auto_type),
            opt_node("initial", mk_undef),
        ],
    },
    NodeSchema {
        tag: "macro",
        top_level: true,
        fields: &[
            req("pub", FieldKind::Flag),
            req("name", FieldKind::Str),
            req("params", FieldKind::StrList),
            req("gen_ids", FieldKind::StrList),
            req("body", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "#",
        top_level: false,
        fields: &[req("text", FieldKind::Str)],
    },
    NodeSchema {
        tag: "ptr",
        top_level: false,
        fields: &[req("mut", FieldKind::Flag), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "slice",
        top_level: false,
        fields: &[req("mut", FieldKind::Flag), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "array",
        top_level: false,
        fields: &[req("size", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "sig",
        top_level: false,
        fields: &[req("params", FieldKind::List), req("result", FieldKind::Node)],
    },
    NodeSchema {
        tag: "sum",
        top_level: false,
        fields: &[req("types", FieldKind::List)],
    },
    NodeSchema {
        tag: "valarray",
        top_level: false,
        fields: &[
            req("size", FieldKind::Node),
            req("type", FieldKind::Node),
            opt_empty("inits", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "idx",
        top_level: false,
        fields: &[req("value", FieldKind::Node), opt_node("index", mk_auto_val)],
    },
    NodeSchema {
        tag: "valrec",
        top_level: false,
        fields: &[req("type", FieldKind::Node), req("inits", FieldKind::List)],
    },
    NodeSchema {
        tag: "fieldval",
        top_level: false,
        fields: &[req("value", FieldKind::Node), opt_empty("field", FieldKind::Str)],
    },
    NodeSchema {
        tag: "call",
        top_level: false,
        fields: &[
            req("poly", FieldKind::Flag),
            req("callee", FieldKind::Node),
            req("args", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: ".",
        top_level: false,
        fields: &[req("container", FieldKind::Node), req("field", FieldKind::Str)],
    },
    NodeSchema {
        tag: "at",
        top_level: false,
        fields: &[req("container", FieldKind::Node), req("index", FieldKind::Node)],
    },
    NodeSchema {
        tag: "deref",
        top_level: false,
        fields: &[req("expr", FieldKind::Node)],
    },
    NodeSchema {
        tag: "addrof",
        top_level: false,
        fields: &[req("mut", FieldKind::Flag), req("expr", FieldKind::Node)],
    },
    NodeSchema {
        tag: "as",
        top_level: false,
        fields: &[req("expr", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "bitcast",
        top_level: false,
        fields: &[req("expr", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "unsafe_as",
        top_level: false,
        fields: &[req("expr", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "asnot",
        top_level: false,
        fields: &[req("expr", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "is",
        top_level: false,
        fields: &[req("expr", FieldKind::Node), req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "tryas",
        top_level: false,
        fields: &[
            req("expr", FieldKind::Node),
            req("type", FieldKind::Node),
            opt_node("default", mk_undef),
        ],
    },
    NodeSchema {
        tag: "len",
        top_level: false,
        fields: &[req("container", FieldKind::Node)],
    },
    NodeSchema {
        tag: "sizeof",
        top_level: false,
        fields: &[req("type", FieldKind::Node)],
    },
    NodeSchema {
        tag: "offsetof",
        top_level: false,
        fields: &[req("type", FieldKind::Node), req("field", FieldKind::Str)],
    },
    NodeSchema {
        tag: "srcloc",
        top_level: false,
        fields: &[],
    },
    NodeSchema {
        tag: "stringify",
        top_level: false,
        fields: &[req("expr", FieldKind::Node)],
    },
    NodeSchema {
        tag: "?",
        top_level: false,
        fields: &[
            req("cond", FieldKind::Node),
            req("expr_t", FieldKind::Node),
            req("expr_f", FieldKind::Node),
        ],
    },
    NodeSchema {
        tag: "return",
        top_level: false,
        fields: &[opt_node("expr", mk_void_val)],
    },
    NodeSchema {
        tag: "if",
        top_level: false,
        fields: &[
            req("cond", FieldKind::Node),
            req("body_t", FieldKind::List),
            opt_empty("body_f", FieldKind::List),
        ],
    },
    NodeSchema {
        tag: "cond",
        top_level: false,
        fields: &[req("cases", FieldKind::List)],
    },
    NodeSchema {
        tag: "case",
        top_level: false,
        fields: &[req("cond", FieldKind::Node), req("body", FieldKind::List)],
    },
    NodeSchema {
        tag: "block",
        top_level: false,
        fields: &[req("body", FieldKind::List)],
    },
    NodeSchema {
        tag: "break",
        top_level: false,
        fields: &[],
    },
    NodeSchema {
        tag: "continue",
        top_level: false,
        fields: &[],
    },
    NodeSchema {
        tag: "trap",
        top_level: false,
        fields: &[],
    },
    NodeSchema {
        tag: "stmt",
        top_level: false,
        fields: &[req("discard", FieldKind::Flag), req("expr", FieldKind::Node)],
    },
    NodeSchema {
        tag: "=",
        top_level: false,
        fields: &[req("lhs", FieldKind::Node), req("expr", FieldKind::Node)],
    },
    NodeSchema {
        tag: "static_assert",
        top_level: false,
        fields: &[req("cond", FieldKind::Node)],
    },
];

pub fn node_schema(tag: &str) -> Option<&'static NodeSchema> {
    NODE_SCHEMAS.iter().find(|s| s.tag == tag)
}

// =============================================================================
// Node arena
// =============================================================================

/// One annotated AST node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: SrcLoc,
    pub x_type: Option<TypeId>,
    pub x_symbol: Option<NodeId>,
    pub x_field: Option<NodeId>,
    pub x_module: Option<ModId>,
    pub x_offset: Option<u64>,
}

/// The node arena for one compilation.
#[derive(Default, Debug)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, loc: SrcLoc) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            loc,
            x_type: None,
            x_symbol: None,
            x_field: None,
            x_module: None,
            x_offset: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in allocation order (which follows reading order).
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn loc(&self, id: NodeId) -> SrcLoc {
        self.nodes[id.index()].loc
    }

    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.nodes[id.index()].kind.flags()
    }

    // Write-once annotation slots. Violations are compiler bugs, not
    // user errors, hence the asserts.

    pub fn set_type(&mut self, id: NodeId, ty: TypeId) {
        let node = &mut self.nodes[id.index()];
        assert!(
            node.kind.flags().contains(NodeFlags::TYPE_ANNOTATED),
            "node {} not meant for type annotation",
            node.kind.tag()
        );
        assert!(node.x_type.is_none(), "duplicate x_type for {}", node.kind.tag());
        node.x_type = Some(ty);
    }

    pub fn set_symbol(&mut self, id: NodeId, def: NodeId) {
        let node = &mut self.nodes[id.index()];
        assert!(
            node.kind.flags().contains(NodeFlags::SYMBOL_ANNOTATED),
            "node {} not meant for symbol annotation",
            node.kind.tag()
        );
        assert!(node.x_symbol.is_none(), "duplicate x_symbol");
        node.x_symbol = Some(def);
    }

    pub fn set_field(&mut self, id: NodeId, field: NodeId) {
        let node = &mut self.nodes[id.index()];
        assert!(
            node.kind.flags().contains(NodeFlags::FIELD_ANNOTATED),
            "node {} not meant for field annotation",
            node.kind.tag()
        );
        assert!(node.x_field.is_none(), "duplicate x_field");
        node.x_field = Some(field);
    }

    pub fn set_module(&mut self, id: NodeId, module: ModId) {
        let node = &mut self.nodes[id.index()];
        assert!(
            matches!(node.kind, NodeKind::Import { .. }),
            "x_module only applies to imports"
        );
        assert!(node.x_module.is_none(), "duplicate x_module");
        node.x_module = Some(module);
    }

    pub fn set_offset(&mut self, id: NodeId, offset: u64) {
        let node = &mut self.nodes[id.index()];
        assert!(node.x_offset.is_none(), "duplicate x_offset");
        node.x_offset = Some(offset);
    }

    /// Deep-clones a subtree, returning the new root. With
    /// `keep_annotations` the `x_*` slots survive (used when splicing
    /// already-resolved module arguments); otherwise the clone starts
    /// blank (macro expansion, generic templates).
    pub fn clone_subtree(&mut self, root: NodeId, keep_annotations: bool) -> NodeId {
        let src = self.nodes[root.index()].clone();
        let mut kind = src.kind;
        let slots = kind
            .child_slots()
            .into_iter()
            .map(|slot| match slot {
                ChildSlot::Node { name, id } => ChildSlot::Node {
                    name,
                    id: self.clone_subtree(id, keep_annotations),
                },
                ChildSlot::List { name, ids } => ChildSlot::List {
                    name,
                    ids: ids
                        .into_iter()
                        .map(|id| self.clone_subtree(id, keep_annotations))
                        .collect(),
                },
            })
            .collect();
        kind.set_child_slots(slots);
        let new_id = self.alloc(kind, src.loc);
        if keep_annotations {
            let dst = &mut self.nodes[new_id.index()];
            dst.x_type = src.x_type;
            dst.x_symbol = src.x_symbol;
            dst.x_field = src.x_field;
            dst.x_module = src.x_module;
            dst.x_offset = src.x_offset;
        }
        new_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(kind: NodeKind) -> (Ast, NodeId) {
        let mut ast = Ast::new();
        let id = ast.alloc(kind, SrcLoc::unknown());
        (ast, id)
    }

    #[test]
    fn top_level_kinds_are_flagged() {
        for kind in [
            NodeKind::Import {
                name: "x".into(),
                alias: String::new(),
                args: vec![],
            },
            NodeKind::DefRec {
                pub_vis: false,
                name: "r".into(),
                fields: vec![],
            },
        ] {
            assert!(kind.flags().contains(NodeFlags::TOP_LEVEL));
        }
        assert!(!NodeKind::StmtBreak.flags().contains(NodeFlags::TOP_LEVEL));
    }

    #[test]
    fn ids_are_symbol_and_type_annotated() {
        let kind = NodeKind::Id { name: "x".into() };
        assert!(kind.flags().contains(NodeFlags::SYMBOL_ANNOTATED));
        assert!(kind.flags().contains(NodeFlags::TYPE_ANNOTATED));
        assert!(!kind.flags().contains(NodeFlags::FIELD_ANNOTATED));
    }

    #[test]
    fn macro_forms_are_marked_for_expansion() {
        assert!(NodeKind::ExprSrcLoc
            .flags()
            .contains(NodeFlags::TO_BE_EXPANDED));
        let invoke = NodeKind::MacroInvoke {
            name: "m".into(),
            args: vec![],
        };
        assert!(invoke.flags().contains(NodeFlags::TO_BE_EXPANDED));
    }

    #[test]
    fn child_slots_round_trip_through_setter() {
        let mut ast = Ast::new();
        let a = ast.alloc(NodeKind::ValTrue, SrcLoc::unknown());
        let b = ast.alloc(NodeKind::ValFalse, SrcLoc::unknown());
        let c = ast.alloc(NodeKind::ValVoid, SrcLoc::unknown());
        let mut kind = NodeKind::StmtIf {
            cond: a,
            body_t: vec![b],
            body_f: vec![c],
        };
        let slots = kind.child_slots();
        assert_eq!(slots.len(), 3);
        kind.set_child_slots(slots);
        match kind {
            NodeKind::StmtIf {
                cond,
                body_t,
                body_f,
            } => {
                assert_eq!(cond, a);
                assert_eq!(body_t, vec![b]);
                assert_eq!(body_f, vec![c]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn clone_subtree_is_deep() {
        let mut ast = Ast::new();
        let inner = ast.alloc(
            NodeKind::ValNum {
                number: "1".into(),
            },
            SrcLoc::unknown(),
        );
        let outer = ast.alloc(
            NodeKind::Expr1 {
                op: UnaryKind::Neg,
                expr: inner,
            },
            SrcLoc::unknown(),
        );
        let copy = ast.clone_subtree(outer, false);
        assert_ne!(copy, outer);
        match *ast.kind(copy) {
            NodeKind::Expr1 { expr, .. } => {
                assert_ne!(expr, inner);
                assert_eq!(
                    ast.kind(expr),
                    &NodeKind::ValNum {
                        number: "1".into()
                    }
                );
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn type_annotation_is_write_once() {
        let (mut ast, id) = arena_with(NodeKind::ValTrue);
        ast.set_type(id, TypeId(0));
        assert_eq!(ast.node(id).x_type, Some(TypeId(0)));
    }

    #[test]
    #[should_panic(expected = "duplicate x_type")]
    fn double_type_annotation_panics() {
        let (mut ast, id) = arena_with(NodeKind::ValTrue);
        ast.set_type(id, TypeId(0));
        ast.set_type(id, TypeId(1));
    }

    #[test]
    fn schema_lookup_by_tag() {
        let schema = node_schema("fun").unwrap();
        assert!(schema.top_level);
        assert_eq!(schema.fields.len(), 7);
        assert!(node_schema("no-such-tag").is_none());
    }

    #[test]
    fn base_type_kind_name_round_trips() {
        for kind in BaseTypeKind::ALL {
            assert_eq!(BaseTypeKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BaseTypeKind::from_name("u128"), None);
    }
}
