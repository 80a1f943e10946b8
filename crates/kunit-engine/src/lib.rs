pub mod config;
pub mod supervisor;
pub mod toolchain;

pub use config::{EngineConfig, ToolchainConfig};
pub use supervisor::EngineProcess;
pub use toolchain::{CompileOutput, Toolchain};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Compiling {path} failed (exit code {exit_code:?}):\n{output}")]
    CompileFailure {
        path: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Failed to launch '{program}': {error}")]
    Launch {
        program: String,
        #[source]
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
