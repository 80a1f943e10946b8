use kunit_compiler::classify::{classify_function, ArgumentOption, BindingTable};
use kunit_compiler::signature::extract_signatures;
use kunit_compiler::synthesize::{append_driver, boilerplate, build_driver, SynthesizeError};
use kunit_ir::parse::{parse_translation_unit, ParseOptions};
use kunit_ir::print::render_function;

fn bindings(src: &str, function: &str) -> BindingTable {
    let unit = parse_translation_unit(src, &ParseOptions::new()).unwrap();
    let table = extract_signatures(&unit);
    BindingTable::from_analysis(&classify_function(&table, function).unwrap())
}

#[test]
fn test_get_sign_driver() {
    let bindings = bindings("int get_sign(int x);", "get_sign");
    let driver = render_function(&build_driver(&bindings, "kunit_test").unwrap());
    assert_eq!(
        driver,
        "void kunit_test_get_sign(void)\n{\n  int x = SYMBOLIC(int);\n  int ret = get_sign(x);\n  WATCH(ret);\n}\n"
    );
}

#[test]
fn test_expanded_array_has_one_symbolic_per_element() {
    let mut bindings = bindings("int sum3(int arr[3]);", "sum3");
    bindings.set_option("arr", ArgumentOption::ExpandedArray).unwrap();
    let driver = render_function(&build_driver(&bindings, "kunit_test").unwrap());
    assert!(driver.contains("int arr[3] = {SYMBOLIC(int), SYMBOLIC(int), SYMBOLIC(int)};"));
    assert_eq!(driver.matches("SYMBOLIC(int)").count(), 3);
}

#[test]
fn test_symbolic_array_for_each_shape() {
    let src = "void f(int fixed[4], int open[], char *text, int n);";
    let bindings = bindings(src, "f");
    let driver = render_function(&build_driver(&bindings, "kunit_test").unwrap());
    assert!(driver.contains("int fixed[4] = SYMBOLIC_ARRAY(int, 4);"));
    assert!(driver.contains("int open[] = SYMBOLIC_ARRAY(int, UNKNOWN_LENGTH);"));
    assert!(driver.contains("char text[] = SYMBOLIC_ARRAY(char, UNKNOWN_LENGTH);"));
    assert!(driver.contains("  f(fixed, open, text, n);\n"));
    assert!(!driver.contains("WATCH"));
}

#[test]
fn test_none_option_leaves_placeholder() {
    let mut bindings = bindings("int g(int a, int b);", "g");
    bindings.set_option("b", ArgumentOption::None).unwrap();
    bindings.set_watch_return(false).unwrap();
    let driver = render_function(&build_driver(&bindings, "drv").unwrap());
    assert!(driver.starts_with("void drv_g(void)\n"));
    assert!(driver.contains("int b = UNINITIALIZED;"));
    assert!(driver.contains("  g(a, b);\n"));
}

#[test]
fn test_return_name_avoids_parameter() {
    let bindings = bindings("int h(int ret);", "h");
    let driver = render_function(&build_driver(&bindings, "kunit_test").unwrap());
    assert!(driver.contains("int ret_ = h(ret);"));
    assert!(driver.contains("WATCH(ret_);"));
}

#[test]
fn test_pointer_out_fails_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("drivers.c");
    let mut bindings = bindings("void fill(char *buf);", "fill");
    bindings.set_option("buf", ArgumentOption::PointerOut).unwrap();

    let err = append_driver(&artifact, &bindings, "kunit_test").unwrap_err();
    assert!(matches!(
        err,
        SynthesizeError::NotImplemented { option: ArgumentOption::PointerOut, .. }
    ));
    assert!(!artifact.exists());
}

#[test]
fn test_append_creates_then_appends() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("drivers.c");
    let src = "int get_sign(int x);\nint sum3(int arr[3]);";

    let first = append_driver(&artifact, &bindings(src, "get_sign"), "kunit_test").unwrap();
    let second = append_driver(&artifact, &bindings(src, "sum3"), "kunit_test").unwrap();

    let text = std::fs::read_to_string(&artifact).unwrap();
    assert!(text.starts_with(&boilerplate()));
    assert_eq!(text.matches("#include \"kunit.h\"").count(), 1);
    assert!(text.ends_with(&format!("\n{first}\n{second}")));
}
