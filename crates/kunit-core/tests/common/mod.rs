use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kunit_core::SessionConfig;
use kunit_harvest::ktest::{KTest, KTestObject};

pub const GET_SIGN: &str = include_str!("../fixtures/get_sign.c");

/// Records the fake engine copies into its output directory.
pub const RECORDS: [(i32, i32); 3] = [(-3, -1), (0, 0), (5, 1)];

const FAKE_COMPILER: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
: > "$out"
echo "compiled $out"
"#;

pub fn record(x: i32, ret: i32) -> Vec<u8> {
    KTest {
        version: 3,
        args: vec!["kunit_tests.bc".to_string()],
        sym_argvs: 0,
        sym_argv_len: 0,
        objects: vec![
            KTestObject {
                name: "x".to_string(),
                bytes: x.to_le_bytes().to_vec(),
            },
            KTestObject {
                name: "ret".to_string(),
                bytes: ret.to_le_bytes().to_vec(),
            },
        ],
    }
    .encode()
}

fn executable(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Engine stand-in that publishes [`RECORDS`] and exits.
pub fn publishing_engine(dir: &Path) -> String {
    let records: Vec<Vec<u8>> = RECORDS.iter().map(|(x, ret)| record(*x, *ret)).collect();
    copying_engine(dir, &records)
}

/// Engine stand-in that copies `records` into its output directory as
/// `test000001.ktest` onwards and exits.
pub fn copying_engine(dir: &Path, records: &[Vec<u8>]) -> String {
    let staged = dir.join("records");
    std::fs::create_dir_all(&staged).unwrap();
    for (i, bytes) in records.iter().enumerate() {
        std::fs::write(staged.join(format!("test{:06}.ktest", i + 1)), bytes).unwrap();
    }
    format!(
        "dir=\"${{1#--output-dir=}}\"\nmkdir -p \"$dir\"\ncp \"{}\"/*.ktest \"$dir\"/\necho \"KLEE: done: generated tests = {}\"\n",
        staged.display(),
        records.len()
    )
}

/// A session config rooted in `dir` with `sh` stand-ins for both tools.
pub fn config(dir: &Path, engine_body: &str) -> SessionConfig {
    let source = dir.join("get_sign.c");
    std::fs::write(&source, GET_SIGN).unwrap();

    let compiler_script = dir.join("cc.sh");
    std::fs::write(&compiler_script, FAKE_COMPILER).unwrap();
    let engine = dir.join("fake-klee");
    executable(&engine, engine_body);

    let mut config = SessionConfig {
        source,
        artifact: dir.join("kunit_tests.c"),
        build_dir: dir.join("build"),
        ..SessionConfig::default()
    };
    config.toolchain.compiler = PathBuf::from("sh");
    config.toolchain.flags.insert(0, compiler_script.display().to_string());
    config.engine.executable = engine;
    config.engine.output_dir = dir.join("klee-out");
    config
}
