//! Whole-pipeline tests over in-memory module sources: reading, the
//! import fixed point, symbol resolution, macro expansion, inference,
//! and the final audits, exercised together the way the driver runs
//! them.

use crosswind_base::ErrorKind;
use crosswind_front::{analyze, analyze_source, Ctx, MemLoader, NodeKind, Options};

fn analyze_mem(files: &[(&str, &str)], seeds: &[&str]) -> crosswind_base::Result<Ctx> {
    let mut loader = MemLoader::new();
    for (path, source) in files {
        loader.add(path, source);
    }
    analyze(&loader, seeds, Options::default())
}

fn analyze_err(source: &str) -> crosswind_base::CompileError {
    analyze_source(source, Options::default()).unwrap_err()
}

/// Canonical types of every call's callee, in source order.
fn callee_types(ctx: &Ctx) -> Vec<String> {
    ctx.ast
        .ids()
        .filter_map(|id| match ctx.ast.kind(id) {
            NodeKind::ExprCall { callee, .. } => {
                let ty = ctx.ast.node(*callee).x_type.expect("typed callee");
                Some(ctx.corpus.canon_name(ty).to_string())
            }
            _ => None,
        })
        .collect()
}

#[test]
fn function_bodies_type_end_to_end() {
    let ctx = analyze_source(
        "(module main [
           (fun pub add [(param x u32) (param y u32)] u32 [
             (return (+ x y))
           ])
           (fun pub main [] void [
             (let a u32 1)
             (let mut b u32 2)
             (= b (call add [a b]))
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    assert_eq!(ctx.modules.len(), 1);
    assert!(ctx.corpus.lookup("fun(u32,u32,u32)").is_some());
    assert!(ctx.corpus.lookup("fun(void)").is_some());
}

#[test]
fn record_may_reference_itself_through_a_pointer() {
    let ctx = analyze_source(
        "(module main [
           (defrec pub Node [
             (field next (ptr Node))
             (field value u32)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    let rec = ctx.corpus.lookup("rec(main/Node)").unwrap();
    assert!(ctx.corpus.lookup("ptr(rec(main/Node))").is_some());
    assert_eq!(ctx.corpus.size_of(rec), 16);
    assert_eq!(ctx.corpus.align_of(rec), 8);

    let offsets: Vec<u64> = ctx
        .ast
        .ids()
        .filter(|&id| matches!(ctx.ast.kind(id), NodeKind::RecField { .. }))
        .map(|id| ctx.ast.node(id).x_offset.expect("laid out"))
        .collect();
    assert_eq!(offsets, vec![0, 8]);
}

#[test]
fn polymorphic_calls_dispatch_on_first_argument() {
    let ctx = analyze_source(
        "(module main [
           (fun pub poly size [(param s (slice u8))] uint [
             (return (len s))
           ])
           (fun pub poly size [(param a (array 10 u8))] uint [
             (return 10_uint)
           ])
           (global ARR (array 10 u8))
           (global ARR5 (array 5 u8))
           (global SL (slice u8) ARR)
           (fun pub main [] void [
             (stmt discard (call poly size [ARR]))
             (stmt discard (call poly size [SL]))
             (stmt discard (call poly size [ARR5]))
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    assert_eq!(
        callee_types(&ctx),
        vec![
            "fun(array(u8,10),u64)",
            "fun(slice(u8),u64)",
            // no exact overload for array(u8,5): the slice form wins
            "fun(slice(u8),u64)",
        ]
    );
}

#[test]
fn undispatchable_polymorphic_call_is_a_type_error() {
    let err = analyze_err(
        "(module main [
           (fun pub poly size [(param s (slice u8))] uint [(return 0_uint)])
           (global X u32 7_u32)
           (fun pub main [] void [
             (stmt discard (call poly size [X]))
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("polymorphic"));
}

#[test]
fn generic_modules_specialize_once_per_identity() {
    let files = [
        (
            "vec",
            "(module vec [
               (deftype pub Elem T)
               (defrec pub Box [(field payload T)])
             ] [T])",
        ),
        (
            "a",
            "(module a [
               (import vec v32 [u32])
               (global pub B v32::Box)
             ])",
        ),
        ("c", "(module c [(import vec vv [u32])])"),
        ("main", "(module main [(import a) (import c)])"),
    ];
    let ctx = analyze_mem(&files, &["main"]).unwrap();
    // main, a, c, and exactly one vec<u32>
    assert_eq!(ctx.modules.len(), 4);
    let specialized: Vec<&str> = ctx
        .modules
        .iter()
        .map(|m| m.name.as_str())
        .filter(|n| n.starts_with("vec<"))
        .collect();
    assert_eq!(specialized, vec!["vec<u32>"]);
    assert!(ctx.corpus.lookup("rec(vec<u32>/Box)").is_some());
}

#[test]
fn distinct_arguments_make_distinct_instances() {
    let files = [
        (
            "vec",
            "(module vec [(defrec pub Box [(field payload T)])] [T])",
        ),
        (
            "main",
            "(module main [
               (import vec v8 [u8])
               (import vec v32 [u32])
             ])",
        ),
    ];
    let ctx = analyze_mem(&files, &["main"]).unwrap();
    assert_eq!(ctx.modules.len(), 3);
    assert!(ctx.corpus.lookup("rec(vec<u8>/Box)").is_some());
    assert!(ctx.corpus.lookup("rec(vec<u32>/Box)").is_some());
}

#[test]
fn local_shadowing_is_rejected() {
    let err = analyze_err(
        "(module main [
           (fun pub f [] void [
             (block [
               (let x u32 1)
               (block [(let x u32 2)])
             ])
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Symbol);
    assert!(err.message.contains("x"));
}

#[test]
fn sibling_scopes_may_reuse_a_name() {
    analyze_source(
        "(module main [
           (fun pub f [] void [
             (block [(let y u32 1)])
             (block [(let y u32 2)])
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
}

#[test]
fn then_and_else_release_their_locals() {
    analyze_source(
        "(module main [
           (fun pub f [(param c bool)] void [
             (if c [(let t u32 1)] [(let t u32 2)])
             (let t u32 3)
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
}

#[test]
fn parameter_shadowing_is_rejected() {
    let err = analyze_err(
        "(module main [
           (fun pub f [(param x u32)] void [
             (let x u32 1)
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Symbol);
}

#[test]
fn duplicate_globals_report_both_locations() {
    let err = analyze_err(
        "(module main [
           (global x u32 1_u32)
           (global x u32 2_u32)
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Symbol);
    assert!(err.message.contains("duplicate"));
    assert!(err.message.contains("line"));
}

#[test]
fn cross_module_access_requires_pub() {
    let files = [
        (
            "util",
            "(module util [
               (global secret u32 1_u32)
               (global pub open u32 2_u32)
             ])",
        ),
        (
            "main",
            "(module main [
               (import util)
               (global pub y u32 util::secret)
             ])",
        ),
    ];
    let err = analyze_mem(&files, &["main"]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Symbol);
    assert!(err.message.contains("public"));

    let ok_files = [
        ("util", "(module util [(global pub open u32 2_u32)])"),
        (
            "main",
            "(module main [(import util) (global pub y u32 util::open)])",
        ),
    ];
    analyze_mem(&ok_files, &["main"]).unwrap();
}

#[test]
fn macro_expansion_is_hygienic() {
    let ctx = analyze_source(
        "(module main [
           (macro pub myswap [$a $b] [$tmp] [
             (let $tmp auto $a)
             (= $a $b)
             (= $b $tmp)
           ])
           (fun pub main [] void [
             (let mut tmp u32 1)
             (let mut other u32 2)
             (myswap tmp other)
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    // the expansion introduced a fresh local distinct from the user's
    // `tmp`; the `$tmp` spelling survives only inside the macro
    // definition itself
    let names: Vec<&str> = ctx
        .ast
        .ids()
        .filter_map(|id| match ctx.ast.kind(id) {
            NodeKind::DefVar { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert!(names.iter().any(|n| n.starts_with("tmp$")));
    assert!(names.contains(&"tmp") && names.contains(&"other"));
}

#[test]
fn macro_body_lists_splice() {
    let ctx = analyze_source(
        "(module main [
           (macro pub twice [$body] [] [
             (block [$body])
             (block [$body])
           ])
           (fun pub main [] void [
             (twice [(let z u32 1)])
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    // two blocks in the macro definition plus the two the expansion
    // cloned into the function body
    let blocks = ctx
        .ast
        .ids()
        .filter(|&id| matches!(ctx.ast.kind(id), NodeKind::StmtBlock { .. }))
        .count();
    assert_eq!(blocks, 4);
}

#[test]
fn macro_nesting_limit_is_enforced() {
    let err = analyze_err(
        "(module main [
           (macro pub loopy [] [] [(loopy)])
           (fun pub main [] void [
             (loopy)
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Macro);
    assert!(err.message.contains("nesting"));
}

#[test]
fn unknown_macro_is_a_macro_error() {
    let err = analyze_err(
        "(module main [
           (fun pub main [] void [(ghost 1) (return)])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Macro);
    assert!(err.message.contains("ghost"));
}

#[test]
fn srcloc_and_stringify_expand_to_literals() {
    let ctx = analyze_source(
        "(module main [
           (fun pub main [] void [
             (let line u32 (srcloc))
             (let name (array 4 u8) (stringify main))
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    assert!(ctx.corpus.lookup("array(u8,4)").is_some());
    let has_line_literal = ctx.ast.ids().any(|id| {
        matches!(ctx.ast.kind(id), NodeKind::ValNum { number } if number.ends_with("_u32"))
    });
    assert!(has_line_literal);
}

#[test]
fn enum_members_resolve_and_inherit_the_base_type() {
    let ctx = analyze_source(
        "(module main [
           (defenum pub color u8 [
             (entry red)
             (entry green 2_u8)
           ])
           (global pub c u8 color::green)
         ])",
        Options::default(),
    )
    .unwrap();
    assert!(ctx.corpus.lookup("enum(main/color)").is_some());
    let entry_types: Vec<&str> = ctx
        .ast
        .ids()
        .filter(|&id| matches!(ctx.ast.kind(id), NodeKind::EnumVal { .. }))
        .map(|id| ctx.corpus.canon_name(ctx.ast.node(id).x_type.unwrap()))
        .collect();
    assert_eq!(entry_types, vec!["u8", "u8"]);
}

#[test]
fn enum_value_outside_the_base_type_is_rejected() {
    let err = analyze_err(
        "(module main [
           (defenum pub color u8 [(entry big 300_u16)])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn string_literals_become_byte_arrays() {
    let ctx = analyze_source(
        "(module main [
           (global pub S auto \"ab\\n\")
         ])",
        Options::default(),
    )
    .unwrap();
    // three characters, the escape collapsing to one byte
    assert!(ctx.corpus.lookup("array(u8,3)").is_some());
}

#[test]
fn wrapped_types_are_nominal() {
    let err = analyze_err(
        "(module main [
           (deftype pub wrapped Meters u32)
           (deftype pub wrapped Seconds u32)
           (global pub m Meters (bitcast 1_u32 Meters))
           (global pub s Seconds m)
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("wrapped"));
}

#[test]
fn type_mismatches_print_canonical_names() {
    let err = analyze_err("(module main [(global pub x u32 true)])");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("`bool`"));
    assert!(err.message.contains("`u32`"));
}

#[test]
fn array_dimension_must_be_an_immutable_constant() {
    let ctx = analyze_source(
        "(module main [
           (global N uint 3_uint)
           (global pub A (array N u32))
         ])",
        Options::default(),
    )
    .unwrap();
    assert!(ctx.corpus.lookup("array(u32,3)").is_some());

    let err = analyze_err(
        "(module main [
           (global mut n uint 3_uint)
           (global pub A (array n u32))
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("compile-time"));
}

#[test]
fn sum_types_flatten_in_source_too() {
    let ctx = analyze_source(
        "(module main [
           (deftype pub Num (sum [(sum [u8 u16]) u32]))
         ])",
        Options::default(),
    )
    .unwrap();
    assert!(ctx.corpus.lookup("sum(u16,u32,u8)").is_some());
}

#[test]
fn asnot_produces_the_sum_complement() {
    let ctx = analyze_source(
        "(module main [
           (deftype pub Num (sum [u8 u16 u32]))
           (global pub n Num 1_u8)
           (fun pub main [] void [
             (let rest auto (asnot n u16))
             (return)
           ])
         ])",
        Options::default(),
    )
    .unwrap();
    assert!(ctx.corpus.lookup("sum(u32,u8)").is_some());
}

#[test]
fn discard_must_match_voidness() {
    let err = analyze_err(
        "(module main [
           (fun pub one [] u32 [(return 1_u32)])
           (fun pub main [] void [
             (stmt (call one []))
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn assignment_needs_a_proper_lhs() {
    let err = analyze_err(
        "(module main [
           (fun pub main [] void [
             (let x u32 1)
             (= x 2)
             (return)
           ])
         ])",
    );
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("assignable"));
}

#[test]
fn rerunning_inference_is_a_no_op() {
    let mut loader = MemLoader::new();
    loader.add(
        "main",
        "(module main [
           (defrec pub P [(field a u32)])
           (fun pub main [] void [(return)])
         ])",
    );
    let mut ctx = Ctx::new(
        crosswind_front::BaseTypeKind::U64,
        crosswind_front::BaseTypeKind::S64,
    );
    crosswind_front::run(&mut ctx, &loader, &["main"]).unwrap();
    let types_before = ctx.corpus.len();
    // every slot is written exactly once; a second pass only sees
    // already-annotated nodes
    crosswind_front::typify::decorate_ast_with_types(&mut ctx).unwrap();
    assert_eq!(ctx.corpus.len(), types_before);
}

#[test]
fn builtin_module_is_a_fallback_namespace() {
    let files = [
        (
            "builtin",
            "(module builtin [
               (fun pub extern halt [] noret [])
               (macro pub noop [] [] [(block [])])
             ])",
        ),
        (
            "main",
            "(module main [
               (fun pub main [] void [
                 (noop)
                 (stmt discard (call halt []))
                 (return)
               ])
             ])",
        ),
    ];
    let ctx = analyze_mem(&files, &["builtin", "main"]).unwrap();
    assert_eq!(ctx.modules.len(), 2);
    assert!(ctx.corpus.lookup("fun(noret)").is_some());
}

#[test]
fn bundled_style_loops_expand_within_the_nesting_bound() {
    let files = [
        (
            "builtin",
            "(module builtin [
               (macro pub while [$cond $body] [] [
                 (block [
                   (if $cond [] [(break)])
                   $body
                   (continue)
                 ])
               ])
             ])",
        ),
        (
            "main",
            "(module main [
               (fun pub main [] void [
                 (let mut i u32 0)
                 (while (< i 10) [
                   (+= i 1)
                 ])
                 (return)
               ])
             ])",
        ),
    ];
    analyze_mem(&files, &["builtin", "main"]).unwrap();
}
