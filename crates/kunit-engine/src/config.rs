//! Launch configuration for the compiler and the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the driver artifact is compiled to LLVM bitcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler executable (default: `clang` from `PATH`).
    pub compiler: PathBuf,
    /// Flags that make the compiler emit unoptimized, debuggable bitcode.
    pub flags: Vec<String>,
    /// Appended after `flags`, e.g. `-DNDEBUG`.
    pub extra_flags: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("clang"),
            flags: ["-emit-llvm", "-c", "-g", "-O0", "-Xclang", "-disable-O0-optnone"]
                .into_iter()
                .map(String::from)
                .collect(),
            extra_flags: Vec::new(),
        }
    }
}

/// How the symbolic execution engine is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable (default: `klee` from `PATH`).
    pub executable: PathBuf,
    /// Directory the engine writes its records to. Removed before each run.
    pub output_dir: PathBuf,
    /// Inserted between `--output-dir` and the bitcode path.
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("klee"),
            output_dir: PathBuf::from("klee-out"),
            extra_args: Vec::new(),
        }
    }
}
