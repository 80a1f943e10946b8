//! Compilation of a driver artifact to LLVM bitcode.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::ToolchainConfig;
use crate::EngineError;

/// Result of one compiler invocation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// `None` when the compiler was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: String,
    pub bitcode: PathBuf,
}

impl CompileOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The bitcode path, or `CompileFailure` carrying the compiler output.
    pub fn into_bitcode(self) -> Result<PathBuf, EngineError> {
        if self.success() {
            Ok(self.bitcode)
        } else {
            Err(EngineError::CompileFailure {
                path: self.bitcode.display().to_string(),
                exit_code: self.exit_code,
                output: self.output,
            })
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    config: ToolchainConfig,
}

impl Toolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Compile `source` next to itself as `<stem>.bc`. A non-zero exit is
    /// reported through [`CompileOutput`], not as an error.
    pub fn compile(
        &self,
        source: &Path,
        include_dirs: &[PathBuf],
        forced_includes: &[PathBuf],
    ) -> Result<CompileOutput, EngineError> {
        let bitcode = source.with_extension("bc");

        let mut command = Command::new(&self.config.compiler);
        command.args(&self.config.flags).args(&self.config.extra_flags);
        for dir in include_dirs {
            command.arg("-I").arg(dir);
        }
        for header in forced_includes {
            command.arg("-include").arg(header);
        }
        command.arg("-o").arg(&bitcode).arg(source);
        debug!(command = ?command, "invoking compiler");

        let result = command.output().map_err(|error| EngineError::Launch {
            program: self.config.compiler.display().to_string(),
            error,
        })?;

        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&result.stderr));
        let compiled = CompileOutput {
            exit_code: result.status.code(),
            output,
            bitcode,
        };

        if compiled.success() {
            info!(bitcode = %compiled.bitcode.display(), "compiled driver artifact");
        } else {
            warn!(
                source = %source.display(),
                exit_code = ?compiled.exit_code,
                "compilation failed"
            );
        }
        Ok(compiled)
    }
}
