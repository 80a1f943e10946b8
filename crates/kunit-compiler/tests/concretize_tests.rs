use std::collections::BTreeMap;

use kunit_compiler::classify::{classify_function, ArgumentOption, BindingTable};
use kunit_compiler::concretize::{concretize, truncate_to_heading, ConcretizeError};
use kunit_compiler::rewrite::{rewrite_driver, EngineDriver, RewriteOptions};
use kunit_compiler::signature::extract_signatures;
use kunit_compiler::synthesize::{boilerplate, build_driver};
use kunit_ir::expr::{Expr, Stmt};
use kunit_ir::parse::{parse_translation_unit, ParseOptions};
use kunit_ir::print::render_function;

fn engine_driver(src: &str, function: &str, choices: &[(&str, ArgumentOption)]) -> (String, EngineDriver) {
    let unit = parse_translation_unit(src, &ParseOptions::new()).unwrap();
    let table = extract_signatures(&unit);
    let mut bindings = BindingTable::from_analysis(&classify_function(&table, function).unwrap());
    for (param, option) in choices {
        bindings.set_option(param, *option).unwrap();
    }
    let driver = build_driver(&bindings, "kunit_test").unwrap();
    let artifact = format!("{}\n{}", boilerplate(), render_function(&driver));
    let engine = rewrite_driver(&artifact, driver.name(), &RewriteOptions::default()).unwrap();
    (artifact, engine)
}

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn count_calls(stmts: &[Stmt], name: &str) -> usize {
    fn walk(expr: &Expr, name: &str) -> usize {
        let own = usize::from(expr.callee_name() == Some(name));
        match expr {
            Expr::Call { args, .. } => own + args.iter().map(|a| walk(a, name)).sum::<usize>(),
            Expr::InitList(items) => items.iter().map(|i| walk(i, name)).sum(),
            Expr::Unary { operand, .. } => walk(operand, name),
            Expr::Cast { expr, .. } => walk(expr, name),
            _ => own,
        }
    }
    stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::Expr(expr) => walk(expr, name),
            Stmt::Decl(decl) => decl.init.as_ref().map_or(0, |init| walk(init, name)),
            Stmt::Opaque(_) => 0,
        })
        .sum()
}

#[test]
fn test_get_sign_test_case() {
    let (_, engine) = engine_driver("int get_sign(int x);", "get_sign", &[]);
    let text = concretize(&engine.template, "get_sign_1", &values(&[("x", "-3"), ("ret", "1")])).unwrap();
    assert_eq!(
        text,
        "TEST_CASE(\"get_sign_1\")\n{\n  int x = -3;\n  int ret = get_sign(x);\n  REQUIRE(ret == 1);\n}\n"
    );
}

#[test]
fn test_missing_value_names_the_variable() {
    let (_, engine) = engine_driver("int get_sign(int x);", "get_sign", &[]);
    let err = concretize(&engine.template, "t", &values(&[("x", "0")])).unwrap_err();
    assert_eq!(err, ConcretizeError::MissingValue { name: "ret".to_string() });
}

#[test]
fn test_expanded_array_gets_element_values() {
    let (_, engine) = engine_driver(
        "int sum3(int arr[3]);",
        "sum3",
        &[("arr", ArgumentOption::ExpandedArray)],
    );
    let recorded = values(&[("arr[0]", "1"), ("arr[1]", "2"), ("arr[2]", "0x3"), ("ret", "6")]);
    let text = concretize(&engine.template, "sum3_1", &recorded).unwrap();
    assert!(text.contains("  int arr[3] = {1, 2, 0x3};\n"), "{text}");
    assert!(text.contains("  REQUIRE(ret == 6);\n"));
}

#[test]
fn test_whole_array_takes_brace_value() {
    let (_, engine) = engine_driver("int first(int fixed[2], int open[]);", "first", &[]);
    let recorded = values(&[("fixed", "{7, 8}"), ("open", "{1, 2, 3}"), ("ret", "7")]);
    let text = concretize(&engine.template, "first_1", &recorded).unwrap();
    assert!(text.contains("  int fixed[2] = {7, 8};\n"), "{text}");
    assert!(text.contains("  int open[] = {1, 2, 3};\n"), "{text}");
}

#[test]
fn test_uninitialized_argument_is_left_alone() {
    let (_, engine) = engine_driver("int get_sign(int x);", "get_sign", &[("x", ArgumentOption::None)]);
    let text = concretize(&engine.template, "t", &values(&[("ret", "0")])).unwrap();
    assert!(text.contains("  int x = {0};\n"), "{text}");
    assert!(text.contains("  REQUIRE(ret == 0);\n"));
}

#[test]
fn test_assumption_becomes_require() {
    let artifact = format!(
        "{}\nvoid kunit_test_pos(void)\n{{\n  int x = SYMBOLIC(int);\n  LET(x > 0);\n  pos(x);\n}}\n",
        boilerplate()
    );
    let engine = rewrite_driver(&artifact, "kunit_test_pos", &RewriteOptions::default()).unwrap();
    let text = concretize(&engine.template, "pos_1", &values(&[("x", "5")])).unwrap();
    assert!(text.contains("  int x = 5;\n  REQUIRE(x > 0);\n  pos(x);\n"), "{text}");
}

#[test]
fn test_test_case_reparses_without_placeholders() {
    let (_, engine) = engine_driver("long add3(int a, char b, long c);", "add3", &[]);
    let recorded = values(&[("a", "1"), ("b", "2"), ("c", "3"), ("ret", "6")]);
    let text = concretize(&engine.template, "add3_1", &recorded).unwrap();

    let unit = parse_translation_unit(&text, &ParseOptions::new()).unwrap();
    let case = unit.test_cases().next().unwrap();
    assert_eq!(case.title, "add3_1");

    let watch_calls = count_calls(&engine.template.function().body, "__watch");
    assert_eq!(count_calls(&case.body, "REQUIRE"), watch_calls);
    assert_eq!(count_calls(&case.body, "__symbolic"), 0);
    assert_eq!(count_calls(&case.body, "SYMBOLIC"), 0);
}

#[test]
fn test_truncate_to_heading_keeps_lines_above_first_driver() {
    let (artifact, engine) = engine_driver("int get_sign(int x);", "get_sign", &[]);
    let heading = truncate_to_heading(&artifact, engine.heading_end_line);
    assert_eq!(heading, format!("{}\n", boilerplate()));
    assert_eq!(truncate_to_heading(&artifact, 0), "");
}
