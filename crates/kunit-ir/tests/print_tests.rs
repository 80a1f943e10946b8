use kunit_ir::expr::{Expr, Stmt, UnaryOp};
use kunit_ir::parse::{parse_translation_unit, ParseOptions};
use kunit_ir::print::{render_decl, render_expr, render_function, render_test_case, render_translation_unit, render_type};
use kunit_ir::types::{CType, LineSpan, TestCase};

fn body_of(src: &str) -> Vec<Stmt> {
    let unit = parse_translation_unit(src, &ParseOptions::new()).unwrap();
    let body = unit.function_defs().next().unwrap().body.clone();
    body
}

fn first_expr(src: &str) -> Expr {
    match body_of(src).remove(0) {
        Stmt::Expr(expr) => expr,
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn test_render_function_layout() {
    let src = "int f(int x){ int y = x*(x+1); return y; }";
    let unit = parse_translation_unit(src, &ParseOptions::new()).unwrap();
    let text = render_function(unit.function_defs().next().unwrap());
    assert_eq!(text, "int f(int x)\n{\n  int y = x * (x + 1);\n  return y;\n}\n");
}

#[test]
fn test_empty_parameter_list_renders_void() {
    let unit = parse_translation_unit("void kunit_test_f() {}", &ParseOptions::new()).unwrap();
    let text = render_function(unit.function_defs().next().unwrap());
    assert_eq!(text, "void kunit_test_f(void)\n{\n}\n");
}

#[test]
fn test_parentheses_follow_precedence() {
    assert_eq!(render_expr(&first_expr("void g(void) { a = (b + c) + d; }")), "a = b + c + d");
    assert_eq!(render_expr(&first_expr("void g(void) { a = b - (c - d); }")), "a = b - (c - d)");
    assert_eq!(render_expr(&first_expr("void g(void) { a = (b, c); }")), "a = (b, c)");
    assert_eq!(render_expr(&first_expr("void g(void) { f((a, b), c ? d : e); }")), "f((a, b), c ? d : e)");
}

#[test]
fn test_casts_and_sizeof() {
    let options = ParseOptions::with_header("#define SYMBOLIC(type) (*((type *) __symbolic(sizeof (type))))\n").unwrap();
    let unit = parse_translation_unit("void d(void) { x = SYMBOLIC(long); }", &options).unwrap();
    let Stmt::Expr(expr) = &unit.function_defs().next().unwrap().body[0] else {
        panic!("expected expression");
    };
    assert_eq!(render_expr(expr), "x = *(long *) __symbolic(sizeof(long))");
}

#[test]
fn test_declarator_shapes() {
    let unit = parse_translation_unit(
        "void fill(const char *const name, int grid[2][3], int (*cb)(int, ...));",
        &ParseOptions::new(),
    )
    .unwrap();
    let kunit_ir::types::ExternalDecl::Declaration(decl) = &unit.items[0] else {
        panic!("expected prototype");
    };
    assert_eq!(
        render_decl(&decl.decls[0]),
        "void fill(const char *const name, int grid[2][3], int (*cb)(int, ...))"
    );
}

#[test]
fn test_render_abstract_types() {
    assert_eq!(render_type(&CType::pointer_to(CType::builtin("unsigned char"))), "unsigned char *");
    assert_eq!(
        render_type(&CType::array_of(CType::typedef_name("word_t"), Some(Expr::constant("4")))),
        "word_t [4]"
    );
}

#[test]
fn test_negation_does_not_fuse_tokens() {
    let expr = Expr::unary(UnaryOp::Neg, Expr::constant("-3"));
    assert_eq!(render_expr(&expr), "- -3");
}

#[test]
fn test_render_test_case() {
    let case = TestCase {
        span: LineSpan::default(),
        title: "GET_SIGN_NEG".to_string(),
        body: vec![Stmt::Expr(Expr::call(
            "REQUIRE",
            vec![Expr::binary(
                kunit_ir::expr::BinaryOp::Eq,
                Expr::ident("ret"),
                Expr::constant("1"),
            )],
        ))],
    };
    assert_eq!(render_test_case(&case), "TEST_CASE(\"GET_SIGN_NEG\")\n{\n  REQUIRE(ret == 1);\n}\n");
}

#[test]
fn test_rendered_unit_reparses_to_same_tree() {
    let src = include_str!("fixtures/shapes.c");
    let first = parse_translation_unit(src, &ParseOptions::new()).unwrap();
    let rendered = render_translation_unit(&first);
    let second = parse_translation_unit(&rendered, &ParseOptions::new()).unwrap();

    let strip = |unit: &kunit_ir::types::TranslationUnit| {
        unit.function_defs()
            .map(|f| (f.decl.clone(), f.body.len()))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
    assert_eq!(first.typedef_names(), second.typedef_names());
}
