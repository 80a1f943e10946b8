use std::path::{Path, PathBuf};

use kunit_engine::{EngineError, Toolchain, ToolchainConfig};

/// A toolchain that runs `script` under `sh`, ahead of the usual flags.
fn sh_toolchain(dir: &Path, script: &str) -> Toolchain {
    let path = dir.join("cc.sh");
    std::fs::write(&path, script).unwrap();
    let mut config = ToolchainConfig {
        compiler: PathBuf::from("sh"),
        ..ToolchainConfig::default()
    };
    config.flags.insert(0, path.display().to_string());
    Toolchain::new(config)
}

const ECHO_AND_WRITE: &str = r#"
out=""
echo "args: $*"
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
echo "warning: from stderr" >&2
: > "$out"
"#;

#[test]
fn test_default_flags_emit_unoptimized_bitcode() {
    let config = ToolchainConfig::default();
    assert_eq!(config.compiler, PathBuf::from("clang"));
    assert_eq!(
        config.flags,
        vec!["-emit-llvm", "-c", "-g", "-O0", "-Xclang", "-disable-O0-optnone"]
    );
}

#[test]
fn test_compile_passes_includes_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tests.c");
    std::fs::write(&source, "int main(void) { return 0; }\n").unwrap();
    let toolchain = sh_toolchain(dir.path(), ECHO_AND_WRITE);

    let output = toolchain
        .compile(&source, &[dir.path().to_path_buf()], &[dir.path().join("kunit.h")])
        .unwrap();

    assert!(output.success());
    assert_eq!(output.bitcode, dir.path().join("tests.bc"));
    assert!(output.bitcode.exists());
    assert!(output.output.contains("-emit-llvm -c -g -O0 -Xclang -disable-O0-optnone"));
    assert!(output.output.contains(&format!("-I {}", dir.path().display())));
    assert!(output.output.contains("-include"));
    assert!(output.output.ends_with("warning: from stderr\n"));
}

#[test]
fn test_failed_compile_reports_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tests.c");
    std::fs::write(&source, "int main(void) {\n").unwrap();
    let toolchain = sh_toolchain(dir.path(), "echo 'tests.c:1: error: expected }' >&2\nexit 1\n");

    let output = toolchain.compile(&source, &[], &[]).unwrap();
    assert!(!output.success());
    assert_eq!(output.exit_code, Some(1));
    assert!(output.output.contains("expected }"));

    match output.into_bitcode() {
        Err(EngineError::CompileFailure { exit_code, output, .. }) => {
            assert_eq!(exit_code, Some(1));
            assert!(output.contains("error"));
        }
        other => panic!("expected compile failure, got {other:?}"),
    }
}

#[test]
fn test_missing_compiler_is_a_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(ToolchainConfig {
        compiler: dir.path().join("no-such-compiler"),
        ..ToolchainConfig::default()
    });
    let err = toolchain.compile(&dir.path().join("tests.c"), &[], &[]).unwrap_err();
    assert!(matches!(err, EngineError::Launch { .. }));
}

#[test]
fn test_config_from_partial_json() {
    let config: ToolchainConfig = serde_json::from_str(r#"{"extra_flags": ["-DNDEBUG"]}"#).unwrap();
    assert_eq!(config.compiler, PathBuf::from("clang"));
    assert_eq!(config.extra_flags, vec!["-DNDEBUG"]);
}
