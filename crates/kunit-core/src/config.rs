use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use kunit_engine::{EngineConfig, ToolchainConfig};

/// Everything a session needs to know about files and external tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// C source holding the functions under test.
    pub source: PathBuf,
    /// Driver artifact; drivers and test cases are appended here.
    pub artifact: PathBuf,
    /// Receives the placeholder header.
    pub build_dir: PathBuf,
    /// Drivers are named `<prefix>_<function>`.
    pub driver_prefix: String,
    /// Include spelling of the engine API header.
    pub engine_include: String,
    /// Extra `-I` directories for compiling the artifact.
    pub include_dirs: Vec<PathBuf>,
    pub toolchain: ToolchainConfig,
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            artifact: PathBuf::from("kunit_tests.c"),
            build_dir: PathBuf::from("build"),
            driver_prefix: "kunit_test".to_string(),
            engine_include: "<klee/klee.h>".to_string(),
            include_dirs: Vec::new(),
            toolchain: ToolchainConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
