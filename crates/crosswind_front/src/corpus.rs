//! Type corpus.
//!
//! Uniquifies types by representing each with a canonical string
//! (`array(ptr(u32),128)`, `sum(u16,u32,u8)`, …) and interning one
//! entry per canonical name. Type identity is then [`TypeId`] equality,
//! and the canonical name round-trips through [`TypeCorpus::lookup`].
//!
//! The corpus also owns the machine-dependent pieces: the widths the
//! `uint`/`sint` aliases resolve to, type sizes and alignments, and
//! record field layout.

use crate::ast::{Ast, BaseTypeKind, NodeId, NodeKind, TypeId};
use std::collections::HashMap;

/// Shape of one canonical type entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    Base(BaseTypeKind),
    Ptr { mutable: bool, pointee: TypeId },
    Slice { mutable: bool, elem: TypeId },
    Array { dim: u64, elem: TypeId },
    Fun { params: Vec<TypeId>, result: TypeId },
    /// Nominal record; `def` is the `DefRec` node.
    Rec { def: NodeId },
    /// Nominal enum; `def` is the `DefEnum` node.
    Enum { def: NodeId, base: TypeId },
    /// Flat, sorted, deduplicated members.
    Sum { members: Vec<TypeId> },
    /// Nominal newtype; a fresh `uid` per wrap site.
    Wrapped { uid: u32, inner: TypeId },
}

#[derive(Debug)]
struct TypeEntry {
    name: String,
    shape: TypeShape,
    /// `(size, align)`; for records only set once layout has run.
    layout: Option<(u64, u64)>,
}

#[derive(Debug)]
pub struct TypeCorpus {
    entries: Vec<TypeEntry>,
    by_name: HashMap<String, TypeId>,
    uint_kind: BaseTypeKind,
    sint_kind: BaseTypeKind,
    wrapped_next: u32,
}

impl TypeCorpus {
    /// `uint_kind`/`sint_kind` configure the machine widths the alias
    /// base kinds resolve to. All concrete base types are pre-interned.
    pub fn new(uint_kind: BaseTypeKind, sint_kind: BaseTypeKind) -> Self {
        let mut corpus = TypeCorpus {
            entries: Vec::new(),
            by_name: HashMap::new(),
            uint_kind,
            sint_kind,
            wrapped_next: 1,
        };
        for kind in BaseTypeKind::ALL {
            if matches!(kind, BaseTypeKind::Uint | BaseTypeKind::Sint) {
                continue;
            }
            corpus.insert_base(kind);
        }
        corpus
    }

    fn insert(&mut self, name: String, shape: TypeShape) -> TypeId {
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let layout = match shape {
            TypeShape::Rec { .. } => None,
            _ => Some((0, 0)), // placeholder; real sizes computed on demand
        };
        let id = TypeId(self.entries.len() as u32);
        self.entries.push(TypeEntry {
            name: name.clone(),
            shape,
            layout,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn canon_name(&self, id: TypeId) -> &str {
        &self.entries[id.index()].name
    }

    pub fn shape(&self, id: TypeId) -> &TypeShape {
        &self.entries[id.index()].shape
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Iterates canonical names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    // -------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------

    pub fn insert_base(&mut self, kind: BaseTypeKind) -> TypeId {
        let kind = match kind {
            BaseTypeKind::Uint => self.uint_kind,
            BaseTypeKind::Sint => self.sint_kind,
            other => other,
        };
        self.insert(kind.name().to_string(), TypeShape::Base(kind))
    }

    pub fn insert_ptr(&mut self, mutable: bool, pointee: TypeId) -> TypeId {
        let name = if mutable {
            format!("ptr-mut({})", self.canon_name(pointee))
        } else {
            format!("ptr({})", self.canon_name(pointee))
        };
        self.insert(name, TypeShape::Ptr { mutable, pointee })
    }

    pub fn insert_slice(&mut self, mutable: bool, elem: TypeId) -> TypeId {
        let name = if mutable {
            format!("slice-mut({})", self.canon_name(elem))
        } else {
            format!("slice({})", self.canon_name(elem))
        };
        self.insert(name, TypeShape::Slice { mutable, elem })
    }

    pub fn insert_array(&mut self, dim: u64, elem: TypeId) -> TypeId {
        let name = format!("array({},{})", self.canon_name(elem), dim);
        self.insert(name, TypeShape::Array { dim, elem })
    }

    pub fn insert_fun(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        let mut pieces: Vec<&str> = params.iter().map(|&p| self.canon_name(p)).collect();
        pieces.push(self.canon_name(result));
        let name = format!("fun({})", pieces.join(","));
        self.insert(name, TypeShape::Fun { params, result })
    }

    /// `qualified` is `ModName/RecName`.
    pub fn insert_rec(&mut self, qualified: &str, def: NodeId) -> TypeId {
        self.insert(format!("rec({})", qualified), TypeShape::Rec { def })
    }

    pub fn insert_enum(&mut self, qualified: &str, def: NodeId, base: TypeId) -> TypeId {
        self.insert(format!("enum({})", qualified), TypeShape::Enum { def, base })
    }

    /// Flattens nested sums, sorts members by canonical name, and drops
    /// duplicates. A single surviving member collapses to that member.
    pub fn insert_sum(&mut self, components: &[TypeId]) -> TypeId {
        let mut members: Vec<TypeId> = Vec::new();
        for &c in components {
            match self.shape(c) {
                TypeShape::Sum { members: inner } => members.extend(inner.iter().copied()),
                _ => members.push(c),
            }
        }
        members.sort_by(|&a, &b| self.canon_name(a).cmp(self.canon_name(b)));
        members.dedup();
        if members.len() == 1 {
            return members[0];
        }
        let name = format!(
            "sum({})",
            members
                .iter()
                .map(|&m| self.canon_name(m))
                .collect::<Vec<_>>()
                .join(",")
        );
        self.insert(name, TypeShape::Sum { members })
    }

    /// Every call mints a distinct nominal type, even over the same
    /// underlying type.
    pub fn insert_wrapped(&mut self, inner: TypeId) -> TypeId {
        let uid = self.wrapped_next;
        self.wrapped_next += 1;
        let name = format!("wrapped({},{})", uid, self.canon_name(inner));
        self.insert(name, TypeShape::Wrapped { uid, inner })
    }

    /// `union \ removed`; `removed` may itself be a sum. Returns `None`
    /// when `union` is not a sum or the difference is empty.
    pub fn insert_sum_complement(&mut self, union: TypeId, removed: TypeId) -> Option<TypeId> {
        let members = match self.shape(union) {
            TypeShape::Sum { members } => members.clone(),
            _ => return None,
        };
        let removed_set: Vec<TypeId> = match self.shape(removed) {
            TypeShape::Sum { members } => members.clone(),
            _ => vec![removed],
        };
        let rest: Vec<TypeId> = members
            .into_iter()
            .filter(|m| !removed_set.contains(m))
            .collect();
        match rest.len() {
            0 => None,
            1 => Some(rest[0]),
            _ => Some(self.insert_sum(&rest)),
        }
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    pub fn base_kind(&self, id: TypeId) -> Option<BaseTypeKind> {
        match self.shape(id) {
            TypeShape::Base(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        self.base_kind(id) == Some(BaseTypeKind::Bool)
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        self.base_kind(id) == Some(BaseTypeKind::Void)
    }

    pub fn is_uint(&self, id: TypeId) -> bool {
        matches!(
            self.base_kind(id),
            Some(BaseTypeKind::U8 | BaseTypeKind::U16 | BaseTypeKind::U32 | BaseTypeKind::U64)
        )
    }

    pub fn is_sint(&self, id: TypeId) -> bool {
        matches!(
            self.base_kind(id),
            Some(BaseTypeKind::S8 | BaseTypeKind::S16 | BaseTypeKind::S32 | BaseTypeKind::S64)
        )
    }

    pub fn is_int(&self, id: TypeId) -> bool {
        self.is_uint(id) || self.is_sint(id)
    }

    pub fn is_real(&self, id: TypeId) -> bool {
        matches!(
            self.base_kind(id),
            Some(BaseTypeKind::R32 | BaseTypeKind::R64)
        )
    }

    /// Numbers include enum values, which carry their base width.
    pub fn is_number(&self, id: TypeId) -> bool {
        self.is_int(id) || self.is_real(id) || matches!(self.shape(id), TypeShape::Enum { .. })
    }

    /// Element type of an array or slice.
    pub fn contained_type(&self, id: TypeId) -> Option<TypeId> {
        match self.shape(id) {
            TypeShape::Array { elem, .. } | TypeShape::Slice { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    pub fn pointee_type(&self, id: TypeId) -> Option<TypeId> {
        match self.shape(id) {
            TypeShape::Ptr { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    /// A `slice-mut` or `ptr-mut` container.
    pub fn is_mutable_container(&self, id: TypeId) -> bool {
        matches!(
            self.shape(id),
            TypeShape::Slice { mutable: true, .. } | TypeShape::Ptr { mutable: true, .. }
        )
    }

    /// Type from a numeric literal's suffix, if it has one.
    pub fn num_type(&mut self, number: &str) -> Option<TypeId> {
        for kind in [
            BaseTypeKind::U16,
            BaseTypeKind::U32,
            BaseTypeKind::U64,
            BaseTypeKind::S16,
            BaseTypeKind::S32,
            BaseTypeKind::S64,
            BaseTypeKind::R32,
            BaseTypeKind::R64,
            BaseTypeKind::U8,
            BaseTypeKind::S8,
            BaseTypeKind::Uint,
            BaseTypeKind::Sint,
        ] {
            if number.ends_with(kind.name()) {
                return Some(self.insert_base(kind));
            }
        }
        None
    }

    // -------------------------------------------------------------------
    // Sizes and record layout
    // -------------------------------------------------------------------

    fn word_size(&self) -> u64 {
        match self.uint_kind {
            BaseTypeKind::U32 => 4,
            _ => 8,
        }
    }

    pub fn size_of(&self, id: TypeId) -> u64 {
        match self.shape(id) {
            TypeShape::Base(kind) => match kind {
                BaseTypeKind::U8 | BaseTypeKind::S8 | BaseTypeKind::Bool => 1,
                BaseTypeKind::U16 | BaseTypeKind::S16 => 2,
                BaseTypeKind::U32 | BaseTypeKind::S32 | BaseTypeKind::R32 => 4,
                BaseTypeKind::U64 | BaseTypeKind::S64 | BaseTypeKind::R64 => 8,
                BaseTypeKind::Void | BaseTypeKind::NoRet => 0,
                BaseTypeKind::Uint | BaseTypeKind::Sint => self.word_size(),
            },
            TypeShape::Ptr { .. } | TypeShape::Fun { .. } => self.word_size(),
            TypeShape::Slice { .. } => 2 * self.word_size(),
            TypeShape::Array { dim, elem } => dim * self.size_of(*elem),
            TypeShape::Enum { base, .. } => self.size_of(*base),
            TypeShape::Wrapped { inner, .. } => self.size_of(*inner),
            TypeShape::Sum { members } => {
                let widest = members.iter().map(|&m| self.size_of(m)).max().unwrap_or(0);
                align_up(self.word_size() + widest, self.align_of(id))
            }
            TypeShape::Rec { .. } => {
                self.entries[id.index()]
                    .layout
                    .expect("record layout queried before set_size_and_offset_for_rec")
                    .0
            }
        }
    }

    pub fn align_of(&self, id: TypeId) -> u64 {
        match self.shape(id) {
            TypeShape::Base(_) => self.size_of(id).max(1),
            TypeShape::Ptr { .. } | TypeShape::Slice { .. } | TypeShape::Fun { .. } => {
                self.word_size()
            }
            TypeShape::Array { elem, .. } => self.align_of(*elem),
            TypeShape::Enum { base, .. } => self.align_of(*base),
            TypeShape::Wrapped { inner, .. } => self.align_of(*inner),
            TypeShape::Sum { members } => members
                .iter()
                .map(|&m| self.align_of(m))
                .max()
                .unwrap_or(1)
                .max(self.word_size()),
            TypeShape::Rec { .. } => {
                self.entries[id.index()]
                    .layout
                    .expect("record layout queried before set_size_and_offset_for_rec")
                    .1
            }
        }
    }

    /// Lays out a record: assigns `x_offset` to each field node and
    /// records the struct size/alignment. Requires all field types to be
    /// annotated already.
    pub fn set_size_and_offset_for_rec(&mut self, ast: &mut Ast, rec: TypeId) {
        let def = match self.shape(rec) {
            TypeShape::Rec { def } => *def,
            _ => panic!("not a record type: {}", self.canon_name(rec)),
        };
        let fields = match ast.kind(def) {
            NodeKind::DefRec { fields, .. } => fields.clone(),
            _ => panic!("rec entry does not point at a DefRec"),
        };
        let mut offset = 0u64;
        let mut align = 1u64;
        for field in fields {
            if !matches!(ast.kind(field), NodeKind::RecField { .. }) {
                continue;
            }
            let field_ty = ast
                .node(field)
                .x_type
                .expect("field typed before record layout");
            let field_align = self.align_of(field_ty);
            offset = align_up(offset, field_align);
            ast.set_offset(field, offset);
            offset += self.size_of(field_ty);
            align = align.max(field_align);
        }
        self.entries[rec.index()].layout = Some((align_up(offset, align), align));
    }

    /// Finds the `RecField` node with the given name in a record type.
    pub fn lookup_rec_field(&self, ast: &Ast, rec: TypeId, field_name: &str) -> Option<NodeId> {
        let def = match self.shape(rec) {
            TypeShape::Rec { def } => *def,
            _ => return None,
        };
        let fields = match ast.kind(def) {
            NodeKind::DefRec { fields, .. } => fields,
            _ => return None,
        };
        fields.iter().copied().find(|&f| {
            matches!(ast.kind(f), NodeKind::RecField { name, .. } if name == field_name)
        })
    }

    // -------------------------------------------------------------------
    // Compatibility
    // -------------------------------------------------------------------

    /// Whether a value of type `actual` may flow where `expected` is
    /// required. `src_mutable` reports whether the source expression is
    /// a mutable definition (needed for `slice-mut` conversions).
    pub fn is_compatible(&self, actual: TypeId, expected: TypeId, src_mutable: bool) -> bool {
        if actual == expected {
            return true;
        }
        match (self.shape(actual), self.shape(expected)) {
            (
                TypeShape::Array { elem: a, .. },
                TypeShape::Slice {
                    mutable: m,
                    elem: e,
                },
            ) => a == e && (!*m || src_mutable),
            (
                TypeShape::Slice {
                    mutable: true,
                    elem: a,
                },
                TypeShape::Slice {
                    mutable: false,
                    elem: e,
                },
            ) => a == e,
            (
                TypeShape::Ptr {
                    mutable: true,
                    pointee: a,
                },
                TypeShape::Ptr {
                    mutable: false,
                    pointee: e,
                },
            ) => a == e,
            (actual_shape, TypeShape::Sum { members }) => {
                let actual_members: Vec<TypeId> = match actual_shape {
                    TypeShape::Sum { members: inner } => inner.clone(),
                    _ => vec![actual],
                };
                actual_members.iter().all(|m| members.contains(m))
            }
            _ => false,
        }
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswind_base::SrcLoc;

    fn corpus() -> TypeCorpus {
        TypeCorpus::new(BaseTypeKind::U64, BaseTypeKind::S64)
    }

    #[test]
    fn base_types_are_preinterned() {
        let c = corpus();
        assert!(c.lookup("u8").is_some());
        assert!(c.lookup("noret").is_some());
        assert!(c.lookup("uint").is_none());
    }

    #[test]
    fn uint_alias_resolves_to_machine_width() {
        let mut c = corpus();
        let t = c.insert_base(BaseTypeKind::Uint);
        assert_eq!(c.canon_name(t), "u64");
    }

    #[test]
    fn ptr_interning_round_trips() {
        let mut c = corpus();
        let u32_t = c.insert_base(BaseTypeKind::U32);
        let p1 = c.insert_ptr(false, u32_t);
        let p2 = c.insert_ptr(false, u32_t);
        assert_eq!(p1, p2);
        assert_eq!(c.canon_name(p1), "ptr(u32)");
        assert_eq!(c.lookup("ptr(u32)"), Some(p1));
    }

    #[test]
    fn canon_names_round_trip_through_lookup() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let ptr_t = c.insert_ptr(false, u8_t);
        let arr = c.insert_array(128, ptr_t);
        for name in ["array(ptr(u8),128)", "ptr(u8)", "u8"] {
            let id = c.lookup(name).unwrap();
            assert_eq!(c.canon_name(id), name);
        }
        assert_eq!(c.canon_name(arr), "array(ptr(u8),128)");
    }

    #[test]
    fn sum_is_flat_sorted_and_deduped() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let u16_t = c.insert_base(BaseTypeKind::U16);
        let u32_t = c.insert_base(BaseTypeKind::U32);
        let inner = c.insert_sum(&[u8_t, u16_t]);
        let outer = c.insert_sum(&[inner, u32_t]);
        assert_eq!(c.canon_name(outer), "sum(u16,u32,u8)");
        let permuted = c.insert_sum(&[u32_t, u8_t, u16_t]);
        assert_eq!(outer, permuted);
        let duped = c.insert_sum(&[u8_t, u8_t, u16_t, u32_t]);
        assert_eq!(outer, duped);
    }

    #[test]
    fn singleton_sum_collapses() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        assert_eq!(c.insert_sum(&[u8_t, u8_t]), u8_t);
    }

    #[test]
    fn wrapped_is_nominal() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let w1 = c.insert_wrapped(u8_t);
        let w2 = c.insert_wrapped(u8_t);
        assert_ne!(w1, w2);
        assert_eq!(c.canon_name(w1), "wrapped(1,u8)");
        assert_eq!(c.canon_name(w2), "wrapped(2,u8)");
    }

    #[test]
    fn sum_complement_removes_members() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let u16_t = c.insert_base(BaseTypeKind::U16);
        let u32_t = c.insert_base(BaseTypeKind::U32);
        let all = c.insert_sum(&[u8_t, u16_t, u32_t]);
        let rest = c.insert_sum_complement(all, u16_t).unwrap();
        assert_eq!(c.canon_name(rest), "sum(u32,u8)");
        let single = c.insert_sum_complement(rest, u32_t).unwrap();
        assert_eq!(single, u8_t);
        assert!(c.insert_sum_complement(u8_t, u8_t).is_none());
    }

    #[test]
    fn num_suffixes_pick_types() {
        let mut c = corpus();
        let t = c.num_type("10_u8").unwrap();
        assert_eq!(c.canon_name(t), "u8");
        let t = c.num_type("3_uint").unwrap();
        assert_eq!(c.canon_name(t), "u64");
        assert!(c.num_type("10").is_none());
    }

    #[test]
    fn array_to_slice_compatibility() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let arr = c.insert_array(10, u8_t);
        let sl = c.insert_slice(false, u8_t);
        let sl_mut = c.insert_slice(true, u8_t);
        assert!(c.is_compatible(arr, sl, false));
        assert!(!c.is_compatible(arr, sl_mut, false));
        assert!(c.is_compatible(arr, sl_mut, true));
        assert!(c.is_compatible(sl_mut, sl, false));
        assert!(!c.is_compatible(sl, sl_mut, false));
    }

    #[test]
    fn member_to_sum_compatibility() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let u16_t = c.insert_base(BaseTypeKind::U16);
        let u32_t = c.insert_base(BaseTypeKind::U32);
        let pair = c.insert_sum(&[u8_t, u16_t]);
        let triple = c.insert_sum(&[u8_t, u16_t, u32_t]);
        assert!(c.is_compatible(u8_t, pair, false));
        assert!(c.is_compatible(pair, triple, false));
        assert!(!c.is_compatible(triple, pair, false));
    }

    #[test]
    fn wrapped_only_matches_itself() {
        let mut c = corpus();
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let w = c.insert_wrapped(u8_t);
        assert!(!c.is_compatible(w, u8_t, false));
        assert!(!c.is_compatible(u8_t, w, false));
        assert!(c.is_compatible(w, w, false));
    }

    #[test]
    fn record_layout_assigns_padded_offsets() {
        let mut c = corpus();
        let mut ast = Ast::new();
        let u8_ty = ast.alloc(
            NodeKind::TypeBase {
                kind: BaseTypeKind::U8,
            },
            SrcLoc::unknown(),
        );
        let u32_ty = ast.alloc(
            NodeKind::TypeBase {
                kind: BaseTypeKind::U32,
            },
            SrcLoc::unknown(),
        );
        let undef1 = ast.alloc(NodeKind::ValUndef, SrcLoc::unknown());
        let undef2 = ast.alloc(NodeKind::ValUndef, SrcLoc::unknown());
        let f1 = ast.alloc(
            NodeKind::RecField {
                name: "tag".into(),
                ty: u8_ty,
                initial: undef1,
            },
            SrcLoc::unknown(),
        );
        let f2 = ast.alloc(
            NodeKind::RecField {
                name: "value".into(),
                ty: u32_ty,
                initial: undef2,
            },
            SrcLoc::unknown(),
        );
        let rec = ast.alloc(
            NodeKind::DefRec {
                pub_vis: false,
                name: "pair".into(),
                fields: vec![f1, f2],
            },
            SrcLoc::unknown(),
        );
        let u8_t = c.insert_base(BaseTypeKind::U8);
        let u32_t = c.insert_base(BaseTypeKind::U32);
        ast.set_type(f1, u8_t);
        ast.set_type(f2, u32_t);
        let rec_t = c.insert_rec("main/pair", rec);
        c.set_size_and_offset_for_rec(&mut ast, rec_t);
        assert_eq!(ast.node(f1).x_offset, Some(0));
        assert_eq!(ast.node(f2).x_offset, Some(4));
        assert_eq!(c.size_of(rec_t), 8);
        assert_eq!(c.align_of(rec_t), 4);
    }

    #[test]
    fn lookup_rec_field_finds_by_name() {
        let mut c = corpus();
        let mut ast = Ast::new();
        let u8_ty = ast.alloc(
            NodeKind::TypeBase {
                kind: BaseTypeKind::U8,
            },
            SrcLoc::unknown(),
        );
        let undef = ast.alloc(NodeKind::ValUndef, SrcLoc::unknown());
        let f = ast.alloc(
            NodeKind::RecField {
                name: "next".into(),
                ty: u8_ty,
                initial: undef,
            },
            SrcLoc::unknown(),
        );
        let rec = ast.alloc(
            NodeKind::DefRec {
                pub_vis: false,
                name: "node".into(),
                fields: vec![f],
            },
            SrcLoc::unknown(),
        );
        let rec_t = c.insert_rec("m/node", rec);
        assert_eq!(c.lookup_rec_field(&ast, rec_t, "next"), Some(f));
        assert_eq!(c.lookup_rec_field(&ast, rec_t, "missing"), None);
    }
}
