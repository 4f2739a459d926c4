//! S-expression reader.
//!
//! Turns the token stream into AST nodes, driven by the per-kind field
//! schema in [`crate::ast`]. Atoms expand through the shorthand table
//! (primitive types, literals, qualified ids, `$macro` ids); unary,
//! binary, and compound-assignment operator tags rewrite to the generic
//! expression nodes; unknown tags are read as macro invocations for the
//! expander to resolve later.

use crate::ast::{
    node_schema, AssignKind, Ast, BaseTypeKind, BinaryKind, FieldDef, FieldDefault, FieldKind,
    NodeId, NodeKind, UnaryKind,
};
use crate::lexer::{tokenize, Token, TokenStream};
use crosswind_base::{CompileError, ErrorKind, Result, SrcLoc, Sym};

// =============================================================================
// Shorthands and operator aliases
// =============================================================================

fn fixed_shorthand(text: &str) -> Option<NodeKind> {
    if let Some(kind) = BaseTypeKind::from_name(text) {
        return Some(NodeKind::TypeBase { kind });
    }
    match text {
        "auto" => Some(NodeKind::TypeAuto),
        "auto_val" => Some(NodeKind::ValAuto),
        "void_val" => Some(NodeKind::ValVoid),
        "undef" => Some(NodeKind::ValUndef),
        "true" => Some(NodeKind::ValTrue),
        "false" => Some(NodeKind::ValFalse),
        _ => None,
    }
}

fn is_id_atom(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | ':'))
}

fn is_num_atom(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.'))
}

/// Expands an atom to a node, or `None` if the atom is not a recognized
/// shorthand.
pub fn expand_shorthand(ast: &mut Ast, text: &str, loc: SrcLoc) -> Option<NodeId> {
    if let Some(kind) = fixed_shorthand(text) {
        return Some(ast.alloc(kind, loc));
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Some(ast.alloc(
            NodeKind::ValString {
                raw: false,
                text: text.to_string(),
            },
            loc,
        ));
    }
    if text.len() >= 3 && text.starts_with("r\"") && text.ends_with('"') {
        return Some(ast.alloc(
            NodeKind::ValString {
                raw: true,
                text: text[1..].to_string(),
            },
            loc,
        ));
    }
    if is_id_atom(text) {
        let kind = if text.starts_with('$') {
            NodeKind::MacroId {
                name: text.to_string(),
            }
        } else {
            NodeKind::Id {
                name: text.to_string(),
            }
        };
        return Some(ast.alloc(kind, loc));
    }
    if is_num_atom(text) || (text.len() >= 3 && text.starts_with('\'') && text.ends_with('\'')) {
        return Some(ast.alloc(
            NodeKind::ValNum {
                number: text.to_string(),
            },
            loc,
        ));
    }
    None
}

fn unary_alias(tag: &str) -> Option<UnaryKind> {
    match tag {
        "!" => Some(UnaryKind::Not),
        "neg" => Some(UnaryKind::Neg),
        "~" => Some(UnaryKind::Complement),
        _ => None,
    }
}

fn binary_alias(tag: &str) -> Option<BinaryKind> {
    match tag {
        "+" => Some(BinaryKind::Add),
        "-" => Some(BinaryKind::Sub),
        "*" => Some(BinaryKind::Mul),
        "/" => Some(BinaryKind::Div),
        "%" => Some(BinaryKind::Mod),
        "<<" => Some(BinaryKind::Shl),
        ">>" => Some(BinaryKind::Shr),
        "&" => Some(BinaryKind::BitAnd),
        "|" => Some(BinaryKind::BitOr),
        "xor" => Some(BinaryKind::BitXor),
        "==" => Some(BinaryKind::Eq),
        "!=" => Some(BinaryKind::Ne),
        "<" => Some(BinaryKind::Lt),
        "<=" => Some(BinaryKind::Le),
        ">" => Some(BinaryKind::Gt),
        ">=" => Some(BinaryKind::Ge),
        "&&" => Some(BinaryKind::AndSc),
        "||" => Some(BinaryKind::OrSc),
        "pdelta" => Some(BinaryKind::PDelta),
        "incp" => Some(BinaryKind::IncP),
        "decp" => Some(BinaryKind::DecP),
        _ => None,
    }
}

fn assign_alias(tag: &str) -> Option<AssignKind> {
    match tag {
        "+=" => Some(AssignKind::Add),
        "-=" => Some(AssignKind::Sub),
        "*=" => Some(AssignKind::Mul),
        "/=" => Some(AssignKind::Div),
        "%=" => Some(AssignKind::Mod),
        "<<=" => Some(AssignKind::Shl),
        ">>=" => Some(AssignKind::Shr),
        "&=" => Some(AssignKind::BitAnd),
        "|=" => Some(AssignKind::BitOr),
        "xor=" => Some(AssignKind::BitXor),
        "incp=" => Some(AssignKind::IncP),
        "decp=" => Some(AssignKind::DecP),
        _ => None,
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Where the node being read sits, for top-level gating.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Parent {
    /// Directly in the file, outside any node.
    Top,
    /// Direct child of a module node.
    Module,
    /// Anywhere deeper.
    Nested,
}

/// A parsed field value, in schema order.
enum Piece {
    Flag(bool),
    Str(String),
    Kind(BaseTypeKind),
    Node(NodeId),
    List(Vec<NodeId>),
    StrList(Vec<String>),
}

struct Pieces(std::vec::IntoIter<Piece>);

impl Pieces {
    fn flag(&mut self) -> bool {
        match self.0.next() {
            Some(Piece::Flag(b)) => b,
            _ => panic!("schema mismatch: expected flag"),
        }
    }
    fn str(&mut self) -> String {
        match self.0.next() {
            Some(Piece::Str(s)) => s,
            _ => panic!("schema mismatch: expected str"),
        }
    }
    fn base_kind(&mut self) -> BaseTypeKind {
        match self.0.next() {
            Some(Piece::Kind(k)) => k,
            _ => panic!("schema mismatch: expected kind"),
        }
    }
    fn node(&mut self) -> NodeId {
        match self.0.next() {
            Some(Piece::Node(n)) => n,
            _ => panic!("schema mismatch: expected node"),
        }
    }
    fn list(&mut self) -> Vec<NodeId> {
        match self.0.next() {
            Some(Piece::List(l)) => l,
            _ => panic!("schema mismatch: expected list"),
        }
    }
    fn str_list(&mut self) -> Vec<String> {
        match self.0.next() {
            Some(Piece::StrList(l)) => l,
            _ => panic!("schema mismatch: expected str list"),
        }
    }
}

pub struct Reader<'a> {
    ast: &'a mut Ast,
    toks: TokenStream,
}

/// Reads every module in `src`. `file` is the interned path used for
/// locations.
pub fn read_modules_from_source(ast: &mut Ast, src: &str, file: Sym) -> Result<Vec<NodeId>> {
    let toks = tokenize(src, file)?;
    let mut reader = Reader { ast, toks };
    reader.read_modules()
}

impl<'a> Reader<'a> {
    fn err(&self, loc: SrcLoc, message: impl Into<String>) -> CompileError {
        CompileError::new(ErrorKind::Parse, loc, message)
    }

    fn read_modules(&mut self) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        while let Some(tok) = self.toks.next() {
            if tok.text != "(" {
                return Err(self.err(
                    tok.loc,
                    format!("expected start of new node, got `{}`", tok.text),
                ));
            }
            let node = self.read_sexpr(Parent::Top)?;
            if !matches!(self.ast.kind(node), NodeKind::DefMod { .. }) {
                return Err(self.err(
                    self.ast.loc(node),
                    format!("expected module, got `{}`", self.ast.kind(node).tag()),
                ));
            }
            out.push(node);
        }
        Ok(out)
    }

    /// Reads one node; the leading `(` has already been consumed.
    fn read_sexpr(&mut self, parent: Parent) -> Result<NodeId> {
        let tag = self.toks.next_required()?;
        if matches!(tag.text.as_str(), "(" | ")" | "[" | "]") {
            return Err(self.err(tag.loc, format!("expected node tag, got `{}`", tag.text)));
        }

        if let Some(op) = unary_alias(&tag.text) {
            let mut pieces = self.read_fields(&tag, EXPR1_FIELDS, Parent::Nested)?;
            return Ok(self.ast.alloc(
                NodeKind::Expr1 {
                    op,
                    expr: pieces.node(),
                },
                tag.loc,
            ));
        }
        if let Some(op) = binary_alias(&tag.text) {
            let mut pieces = self.read_fields(&tag, EXPR2_FIELDS, Parent::Nested)?;
            let expr1 = pieces.node();
            let expr2 = pieces.node();
            return Ok(self
                .ast
                .alloc(NodeKind::Expr2 { op, expr1, expr2 }, tag.loc));
        }
        if let Some(op) = assign_alias(&tag.text) {
            let mut pieces = self.read_fields(&tag, ASSIGN_FIELDS, Parent::Nested)?;
            let lhs = pieces.node();
            let expr = pieces.node();
            return Ok(self
                .ast
                .alloc(NodeKind::StmtCompoundAssignment { op, lhs, expr }, tag.loc));
        }

        let schema = match node_schema(&tag.text) {
            Some(schema) => schema,
            // Unknown tag: assume a macro invocation.
            None => return self.read_macro_invocation(&tag),
        };

        if tag.text == "module" && parent != Parent::Top {
            return Err(self.err(tag.loc, "module nodes are only legal at the top level"));
        }
        if schema.top_level && parent != Parent::Module {
            return Err(self.err(
                tag.loc,
                format!("toplevel node `{}` not allowed here", tag.text),
            ));
        }

        let child_parent = if tag.text == "module" {
            Parent::Module
        } else {
            Parent::Nested
        };
        let pieces = self.read_fields(&tag, schema.fields, child_parent)?;
        let kind = build_node(&tag.text, pieces);
        Ok(self.ast.alloc(kind, tag.loc))
    }

    /// Reads the declared fields of a node and the closing `)`.
    fn read_fields(
        &mut self,
        tag: &Token,
        fields: &'static [FieldDef],
        child_parent: Parent,
    ) -> Result<Pieces> {
        let mut pieces = Vec::with_capacity(fields.len());
        let mut token = self.toks.next_required()?;
        for field in fields {
            if field.kind == FieldKind::Flag {
                if token.text == field.name {
                    pieces.push(Piece::Flag(true));
                    token = self.toks.next_required()?;
                } else {
                    pieces.push(Piece::Flag(false));
                }
                continue;
            }
            if token.text == ")" {
                // End reached before all fields were given; fill defaults.
                pieces.push(self.default_piece(tag, field)?);
                continue;
            }
            pieces.push(self.read_piece(field, &token, child_parent)?);
            token = self.toks.next_required()?;
        }
        if token.text != ")" {
            return Err(self.err(
                token.loc,
                format!(
                    "while parsing `{}` expected node end but got `{}`",
                    tag.text, token.text
                ),
            ));
        }
        Ok(Pieces(pieces.into_iter()))
    }

    fn default_piece(&mut self, tag: &Token, field: &FieldDef) -> Result<Piece> {
        match field.default {
            FieldDefault::Required => Err(self.err(
                tag.loc,
                format!("in `{}` missing field `{}`", tag.text, field.name),
            )),
            FieldDefault::Empty => Ok(match field.kind {
                FieldKind::Str => Piece::Str(String::new()),
                FieldKind::List => Piece::List(Vec::new()),
                FieldKind::StrList => Piece::StrList(Vec::new()),
                _ => unreachable!("no empty default for this field kind"),
            }),
            FieldDefault::NodeFn(make) => {
                let id = self.ast.alloc(make(tag.loc), tag.loc);
                Ok(Piece::Node(id))
            }
        }
    }

    fn read_piece(&mut self, field: &FieldDef, token: &Token, child_parent: Parent) -> Result<Piece> {
        match field.kind {
            FieldKind::Flag => unreachable!("flags handled by the field loop"),
            FieldKind::Str => {
                if matches!(token.text.as_str(), "(" | "[" | "]") {
                    return Err(self.err(
                        token.loc,
                        format!("expected atom for field `{}`, got `{}`", field.name, token.text),
                    ));
                }
                Ok(Piece::Str(token.text.clone()))
            }
            FieldKind::Kind => BaseTypeKind::from_name(&token.text)
                .map(Piece::Kind)
                .ok_or_else(|| {
                    self.err(token.loc, format!("unknown base type `{}`", token.text))
                }),
            FieldKind::Node => {
                if token.text == "(" {
                    return Ok(Piece::Node(self.read_sexpr(child_parent)?));
                }
                match expand_shorthand(self.ast, &token.text, token.loc) {
                    Some(id) => Ok(Piece::Node(id)),
                    None => Err(self.err(
                        token.loc,
                        format!("cannot expand `{}` for field `{}`", token.text, field.name),
                    )),
                }
            }
            FieldKind::List => {
                if token.text != "[" {
                    return Err(self.err(
                        token.loc,
                        format!("expected list start for field `{}`", field.name),
                    ));
                }
                Ok(Piece::List(self.read_node_list(child_parent)?))
            }
            FieldKind::StrList => {
                if token.text != "[" {
                    return Err(self.err(
                        token.loc,
                        format!("expected list start for field `{}`", field.name),
                    ));
                }
                let mut out = Vec::new();
                loop {
                    let tok = self.toks.next_required()?;
                    match tok.text.as_str() {
                        "]" => break,
                        "(" | "[" | ")" => {
                            return Err(self.err(tok.loc, "expected atom in string list"))
                        }
                        _ => out.push(tok.text),
                    }
                }
                Ok(Piece::StrList(out))
            }
        }
    }

    /// Reads `[ … ]` contents; the leading `[` has been consumed.
    fn read_node_list(&mut self, child_parent: Parent) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        loop {
            let tok = self.toks.next_required()?;
            match tok.text.as_str() {
                "]" => return Ok(out),
                "(" => out.push(self.read_sexpr(child_parent)?),
                "[" | ")" => {
                    return Err(self.err(tok.loc, format!("unexpected `{}` in list", tok.text)))
                }
                _ => match expand_shorthand(self.ast, &tok.text, tok.loc) {
                    Some(id) => out.push(id),
                    None => {
                        return Err(self.err(tok.loc, format!("cannot expand `{}`", tok.text)))
                    }
                },
            }
        }
    }

    /// Unknown tag: read arguments until `)`. Bracketed arguments become
    /// ephemeral lists preserved for macro expansion.
    fn read_macro_invocation(&mut self, tag: &Token) -> Result<NodeId> {
        let mut args = Vec::new();
        loop {
            let tok = self.toks.next_required()?;
            match tok.text.as_str() {
                ")" => {
                    return Ok(self.ast.alloc(
                        NodeKind::MacroInvoke {
                            name: tag.text.clone(),
                            args,
                        },
                        tag.loc,
                    ))
                }
                "(" => args.push(self.read_sexpr(Parent::Nested)?),
                "[" => {
                    let items = self.read_node_list(Parent::Nested)?;
                    args.push(
                        self.ast
                            .alloc(NodeKind::EphemeralList { args: items }, tok.loc),
                    );
                }
                "]" => return Err(self.err(tok.loc, "unexpected `]` in macro arguments")),
                _ => match expand_shorthand(self.ast, &tok.text, tok.loc) {
                    Some(id) => args.push(id),
                    None => {
                        return Err(self.err(
                            tok.loc,
                            format!(
                                "while processing `{}` unexpected macro arg `{}`",
                                tag.text, tok.text
                            ),
                        ))
                    }
                },
            }
        }
    }
}

static EXPR1_FIELDS: &[FieldDef] = &[FieldDef {
    name: "expr",
    kind: FieldKind::Node,
    default: FieldDefault::Required,
}];

static EXPR2_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "expr1",
        kind: FieldKind::Node,
        default: FieldDefault::Required,
    },
    FieldDef {
        name: "expr2",
        kind: FieldKind::Node,
        default: FieldDefault::Required,
    },
];

static ASSIGN_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "lhs",
        kind: FieldKind::Node,
        default: FieldDefault::Required,
    },
    FieldDef {
        name: "expr",
        kind: FieldKind::Node,
        default: FieldDefault::Required,
    },
];

/// Assembles a [`NodeKind`] from parsed pieces, in schema order.
fn build_node(tag: &str, mut p: Pieces) -> NodeKind {
    match tag {
        "module" => NodeKind::DefMod {
            name: p.str(),
            body: p.list(),
            params: p.str_list(),
        },
        "import" => NodeKind::Import {
            name: p.str(),
            alias: p.str(),
            args: p.list(),
        },
        "fun" => NodeKind::DefFun {
            pub_vis: p.flag(),
            extern_linkage: p.flag(),
            poly: p.flag(),
            name: p.str(),
            params: p.list(),
            result: p.node(),
            body: p.list(),
        },
        "param" => NodeKind::FunParam {
            name: p.str(),
            ty: p.node(),
        },
        "defrec" => NodeKind::DefRec {
            pub_vis: p.flag(),
            name: p.str(),
            fields: p.list(),
        },
        "field" => NodeKind::RecField {
            name: p.str(),
            ty: p.node(),
            initial: p.node(),
        },
        "defenum" => NodeKind::DefEnum {
            pub_vis: p.flag(),
            name: p.str(),
            base: p.base_kind(),
            items: p.list(),
        },
        "entry" => NodeKind::EnumVal {
            name: p.str(),
            value: p.node(),
        },
        "deftype" => NodeKind::DefType {
            pub_vis: p.flag(),
            wrapped: p.flag(),
            name: p.str(),
            ty: p.node(),
        },
        "global" => NodeKind::DefGlobal {
            pub_vis: p.flag(),
            mutable: p.flag(),
            name: p.str(),
            ty: p.node(),
            initial: p.node(),
        },
        "let" => NodeKind::DefVar {
            mutable: p.flag(),
            name: p.str(),
            ty: p.node(),
            initial: p.node(),
        },
        "macro" => NodeKind::DefMacro {
            pub_vis: p.flag(),
            name: p.str(),
            params: p.str_list(),
            gen_ids: p.str_list(),
            body: p.list(),
        },
        "#" => NodeKind::Comment { text: p.str() },
        "ptr" => NodeKind::TypePtr {
            mutable: p.flag(),
            ty: p.node(),
        },
        "slice" => NodeKind::TypeSlice {
            mutable: p.flag(),
            ty: p.node(),
        },
        "array" => NodeKind::TypeArray {
            size: p.node(),
            ty: p.node(),
        },
        "sig" => NodeKind::TypeFun {
            params: p.list(),
            result: p.node(),
        },
        "sum" => NodeKind::TypeSum { types: p.list() },
        "valarray" => NodeKind::ValArray {
            size: p.node(),
            ty: p.node(),
            inits: p.list(),
        },
        "idx" => NodeKind::IndexVal {
            value: p.node(),
            index: p.node(),
        },
        "valrec" => NodeKind::ValRec {
            ty: p.node(),
            inits: p.list(),
        },
        "fieldval" => NodeKind::FieldVal {
            value: p.node(),
            field: p.str(),
        },
        "call" => NodeKind::ExprCall {
            poly: p.flag(),
            callee: p.node(),
            args: p.list(),
        },
        "." => NodeKind::ExprField {
            container: p.node(),
            field: p.str(),
        },
        "at" => NodeKind::ExprIndex {
            container: p.node(),
            index: p.node(),
        },
        "deref" => NodeKind::ExprDeref { expr: p.node() },
        "addrof" => NodeKind::ExprAddrOf {
            mutable: p.flag(),
            expr: p.node(),
        },
        "as" => NodeKind::ExprAs {
            expr: p.node(),
            ty: p.node(),
        },
        "bitcast" => NodeKind::ExprBitCast {
            expr: p.node(),
            ty: p.node(),
        },
        "unsafe_as" => NodeKind::ExprUnsafeCast {
            expr: p.node(),
            ty: p.node(),
        },
        "asnot" => NodeKind::ExprAsNot {
            expr: p.node(),
            ty: p.node(),
        },
        "is" => NodeKind::ExprIs {
            expr: p.node(),
            ty: p.node(),
        },
        "tryas" => NodeKind::ExprTryAs {
            expr: p.node(),
            ty: p.node(),
            default: p.node(),
        },
        "len" => NodeKind::ExprLen {
            container: p.node(),
        },
        "sizeof" => NodeKind::ExprSizeof { ty: p.node() },
        "offsetof" => NodeKind::ExprOffsetof {
            ty: p.node(),
            field: p.str(),
        },
        "srcloc" => NodeKind::ExprSrcLoc,
        "stringify" => NodeKind::ExprStringify { expr: p.node() },
        "?" => NodeKind::Expr3 {
            cond: p.node(),
            expr_t: p.node(),
            expr_f: p.node(),
        },
        "return" => NodeKind::StmtReturn { expr: p.node() },
        "if" => NodeKind::StmtIf {
            cond: p.node(),
            body_t: p.list(),
            body_f: p.list(),
        },
        "cond" => NodeKind::StmtCond { cases: p.list() },
        "case" => NodeKind::Case {
            cond: p.node(),
            body: p.list(),
        },
        "block" => NodeKind::StmtBlock { body: p.list() },
        "break" => NodeKind::StmtBreak,
        "continue" => NodeKind::StmtContinue,
        "trap" => NodeKind::StmtTrap,
        "stmt" => NodeKind::StmtExpr {
            discard: p.flag(),
            expr: p.node(),
        },
        "=" => NodeKind::StmtAssignment {
            lhs: p.node(),
            expr: p.node(),
        },
        "static_assert" => NodeKind::StmtStaticAssert { cond: p.node() },
        _ => unreachable!("tag `{}` has a schema but no builder", tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswind_base::ErrorKind;

    fn read_one(src: &str) -> (Ast, NodeId) {
        let mut ast = Ast::new();
        let mods = read_modules_from_source(&mut ast, src, Sym::NONE).unwrap();
        assert_eq!(mods.len(), 1);
        (ast, mods[0])
    }

    fn read_err(src: &str) -> crosswind_base::CompileError {
        let mut ast = Ast::new();
        read_modules_from_source(&mut ast, src, Sym::NONE).unwrap_err()
    }

    #[test]
    fn reads_empty_module() {
        let (ast, m) = read_one("(module main [])");
        match ast.kind(m) {
            NodeKind::DefMod { name, body, params } => {
                assert_eq!(name, "main");
                assert!(body.is_empty());
                assert!(params.is_empty());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn reads_fun_with_flags_and_params() {
        let (ast, m) = read_one(
            "(module main [
               (fun pub foo [(param x u32) (param y u32)] u32 [(return (+ x y))])
             ])",
        );
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        match ast.kind(body[0]) {
            NodeKind::DefFun {
                pub_vis,
                extern_linkage,
                poly,
                name,
                params,
                ..
            } => {
                assert!(*pub_vis);
                assert!(!*extern_linkage);
                assert!(!*poly);
                assert_eq!(name, "foo");
                assert_eq!(params.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn binary_alias_builds_expr2() {
        let (ast, m) = read_one("(module main [(global x u32 (+ 1 2))])");
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let initial = match ast.kind(body[0]) {
            NodeKind::DefGlobal { initial, .. } => *initial,
            _ => unreachable!(),
        };
        assert!(matches!(
            ast.kind(initial),
            NodeKind::Expr2 {
                op: BinaryKind::Add,
                ..
            }
        ));
    }

    #[test]
    fn compound_assign_alias() {
        let (ast, m) = read_one("(module main [(fun f [] void [(+= x 1)])])");
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let fun_body = match ast.kind(body[0]) {
            NodeKind::DefFun { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        assert!(matches!(
            ast.kind(fun_body[0]),
            NodeKind::StmtCompoundAssignment {
                op: AssignKind::Add,
                ..
            }
        ));
    }

    #[test]
    fn missing_trailing_fields_take_defaults() {
        let (ast, m) = read_one("(module main [(fun f [] void [(let x u32)])])");
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let fun_body = match ast.kind(body[0]) {
            NodeKind::DefFun { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        match ast.kind(fun_body[0]) {
            NodeKind::DefVar { initial, .. } => {
                assert!(matches!(ast.kind(*initial), NodeKind::ValUndef));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn enum_entry_defaults_to_auto() {
        let (ast, m) = read_one("(module main [(defenum pub color u8 [(entry red)])])");
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let items = match ast.kind(body[0]) {
            NodeKind::DefEnum { items, base, .. } => {
                assert_eq!(*base, BaseTypeKind::U8);
                items.clone()
            }
            _ => unreachable!(),
        };
        match ast.kind(items[0]) {
            NodeKind::EnumVal { value, .. } => {
                assert!(matches!(ast.kind(*value), NodeKind::ValAuto));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn qualified_id_and_macro_id_shorthands() {
        let mut ast = Ast::new();
        let id = expand_shorthand(&mut ast, "os::open", SrcLoc::unknown()).unwrap();
        assert_eq!(
            ast.kind(id),
            &NodeKind::Id {
                name: "os::open".into()
            }
        );
        let mid = expand_shorthand(&mut ast, "$tmp", SrcLoc::unknown()).unwrap();
        assert!(matches!(ast.kind(mid), NodeKind::MacroId { .. }));
    }

    #[test]
    fn raw_string_shorthand_strips_prefix_only() {
        let mut ast = Ast::new();
        let id = expand_shorthand(&mut ast, "r\"\\n\"", SrcLoc::unknown()).unwrap();
        match ast.kind(id) {
            NodeKind::ValString { raw, text } => {
                assert!(*raw);
                assert_eq!(text, "\"\\n\"");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unknown_tag_becomes_macro_invocation() {
        let (ast, m) = read_one("(module main [(fun f [] void [(myloop x [ (trap) ])])])");
        let body = match ast.kind(m) {
            NodeKind::DefMod { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let fun_body = match ast.kind(body[0]) {
            NodeKind::DefFun { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        match ast.kind(fun_body[0]) {
            NodeKind::MacroInvoke { name, args } => {
                assert_eq!(name, "myloop");
                assert_eq!(args.len(), 2);
                assert!(matches!(ast.kind(args[1]), NodeKind::EphemeralList { .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn toplevel_node_nested_is_rejected() {
        let err = read_err("(module main [(fun f [] void [(global x u32)])])");
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("toplevel"));
    }

    #[test]
    fn surplus_tokens_are_rejected() {
        let err = read_err("(module main [(let x u32 0 extra)])");
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("node end"));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let err = read_err("(module main [");
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("truncated"));
    }

    #[test]
    fn char_literal_is_a_number() {
        let mut ast = Ast::new();
        let id = expand_shorthand(&mut ast, "'a'", SrcLoc::unknown()).unwrap();
        assert!(matches!(ast.kind(id), NodeKind::ValNum { .. }));
    }
}
