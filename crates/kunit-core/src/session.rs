//! One pipeline run over a source file and its driver artifact.
//!
//! A [`Session`] owns every piece of mutable state: the signature table, the
//! argument bindings, the engine driver and its template, the running engine
//! and the harvested records. Operations are gated on [`PipelineState`].

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use kunit_compiler::classify::{classify_function, ArgumentOption, BindingTable, ClassifyError, FunctionAnalysis};
use kunit_compiler::concretize::{concretize, truncate_to_heading, ConcretizeError};
use kunit_compiler::rewrite::{rewrite_driver, EngineDriver, RewriteError, RewriteOptions};
use kunit_compiler::signature::{extract_signatures, SignatureTable};
use kunit_compiler::synthesize::{append_driver, build_driver, driver_name, SynthesizeError};
use kunit_compiler::{WatchedVariableSet, PLACEHOLDER_HEADER, PLACEHOLDER_HEADER_NAME};
use kunit_engine::{CompileOutput, EngineError, EngineProcess, Toolchain};
use kunit_harvest::{format_buffer, format_bytes, FormatError, HarvestMode, Harvester, Radix, TestCaseRecord};
use kunit_ir::parse::{parse_translation_unit, ParseError, ParseOptions};

use crate::config::SessionConfig;

/// Pipeline progress. Ordered: an operation requiring a state accepts any
/// later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    Uninitialized,
    SourceAnalyzed,
    FunctionAnalyzed,
    DriverGenerated,
    EngineDriverGenerated,
    Compiled,
    Running,
    Stopped,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {operation} in state {current:?}; requires {required:?}")]
    InvalidState {
        operation: &'static str,
        required: PipelineState,
        current: PipelineState,
    },

    #[error("Cannot {operation} while the engine is running")]
    EngineBusy { operation: &'static str },

    #[error("No function selected")]
    NoFunctionSelected,

    #[error("No harvested record with ordinal {ordinal}")]
    UnknownRecord { ordinal: u32 },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Driver synthesis error: {0}")]
    Synthesize(#[from] SynthesizeError),

    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Concretization error: {0}")]
    Concretize(#[from] ConcretizeError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Value of '{name}' has no C literal form: {source}")]
    Unformattable {
        name: String,
        #[source]
        source: FormatError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one poll of a running engine produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollUpdate {
    pub output: String,
    pub new_records: Vec<TestCaseRecord>,
    /// The engine has exited and its output and records are fully collected.
    pub finished: bool,
    pub exit_code: Option<i32>,
}

impl PollUpdate {
    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.new_records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    pub ordinal: u32,
    pub cells: Vec<String>,
}

/// Harvested records formatted for display; columns follow watched order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordTable {
    pub columns: Vec<String>,
    pub rows: Vec<RecordRow>,
}

/// An engine run and everything harvested from it.
#[derive(Debug)]
struct Run {
    engine: EngineProcess,
    harvester: Harvester,
    watched: WatchedVariableSet,
}

impl Run {
    fn watched_names(&self) -> Vec<String> {
        self.watched.names().map(String::from).collect()
    }

    /// Display cells in watched order. Values without an integer width
    /// fall back to their raw bytes.
    fn cells(&self, record: &TestCaseRecord, radix: Radix) -> Vec<String> {
        self.watched
            .iter()
            .map(|var| {
                let bytes = record.get(&var.name).unwrap_or_default();
                format_buffer(bytes, var.element_size, radix).unwrap_or_else(|_| format_bytes(bytes, radix))
            })
            .collect()
    }

    /// C literals for every watched value, keyed by name.
    fn literals(&self, record: &TestCaseRecord, radix: Radix) -> Result<BTreeMap<String, String>, SessionError> {
        self.watched
            .iter()
            .map(|var| {
                let bytes = record.get(&var.name).unwrap_or_default();
                let value = format_buffer(bytes, var.element_size, radix).map_err(|source| {
                    SessionError::Unformattable {
                        name: var.name.clone(),
                        source,
                    }
                })?;
                Ok((var.name.clone(), value))
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    toolchain: Toolchain,
    state: PipelineState,
    signatures: SignatureTable,
    typedefs: Vec<String>,
    analysis: Option<FunctionAnalysis>,
    bindings: Option<BindingTable>,
    engine_driver: Option<EngineDriver>,
    /// Artifact text from before the engine rewrite.
    symbolic_artifact: Option<String>,
    bitcode: Option<PathBuf>,
    run: Option<Run>,
    heading_truncated: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let toolchain = Toolchain::new(config.toolchain.clone());
        Self {
            config,
            toolchain,
            state: PipelineState::Uninitialized,
            signatures: SignatureTable::default(),
            typedefs: Vec::new(),
            analysis: None,
            bindings: None,
            engine_driver: None,
            symbolic_artifact: None,
            bitcode: None,
            run: None,
            heading_truncated: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    pub fn analysis(&self) -> Option<&FunctionAnalysis> {
        self.analysis.as_ref()
    }

    pub fn bindings(&self) -> Option<&BindingTable> {
        self.bindings.as_ref()
    }

    pub fn engine_driver(&self) -> Option<&EngineDriver> {
        self.engine_driver.as_ref()
    }

    /// Records harvested from the latest engine run.
    pub fn records(&self) -> &[TestCaseRecord] {
        self.run
            .as_ref()
            .map(|run| run.harvester.records())
            .unwrap_or_default()
    }

    // ── Gating ──────────────────────────────────────────────

    fn invalid(&self, operation: &'static str, required: PipelineState) -> SessionError {
        SessionError::InvalidState {
            operation,
            required,
            current: self.state,
        }
    }

    fn require(&self, operation: &'static str, minimum: PipelineState) -> Result<(), SessionError> {
        if self.state < minimum {
            return Err(self.invalid(operation, minimum));
        }
        Ok(())
    }

    /// Reject operations that touch the artifact while the engine runs.
    fn require_idle(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state == PipelineState::Running {
            return Err(SessionError::EngineBusy { operation });
        }
        Ok(())
    }

    fn bindings_mut(&mut self, operation: &'static str) -> Result<&mut BindingTable, SessionError> {
        self.require_idle(operation)?;
        self.require(operation, PipelineState::FunctionAnalyzed)?;
        self.bindings.as_mut().ok_or(SessionError::NoFunctionSelected)
    }

    // ── Analysis ────────────────────────────────────────────

    /// Parse the source file and return every function name with its
    /// rendered declaration.
    pub fn analyze_source(&mut self) -> Result<BTreeMap<String, String>, SessionError> {
        self.require_idle("analyze the source")?;
        let text = fs::read_to_string(&self.config.source)?;
        let unit = parse_translation_unit(&text, &ParseOptions::new())?;

        self.signatures = extract_signatures(&unit);
        self.typedefs = unit.typedef_names();
        self.analysis = None;
        self.bindings = None;
        self.state = PipelineState::SourceAnalyzed;

        info!(
            source = %self.config.source.display(),
            functions = self.signatures.len(),
            "analyzed source"
        );
        Ok(self.signatures.rendered())
    }

    /// Classify the parameters of `name` and bind each to its first legal option.
    pub fn select_function(&mut self, name: &str) -> Result<&FunctionAnalysis, SessionError> {
        const OPERATION: &str = "select a function";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::SourceAnalyzed)?;

        let analysis = classify_function(&self.signatures, name)?;
        self.bindings = Some(BindingTable::from_analysis(&analysis));
        self.state = PipelineState::FunctionAnalyzed;
        debug!(function = name, params = analysis.params.len(), "selected function");
        Ok(self.analysis.insert(analysis))
    }

    pub fn set_option(&mut self, parameter: &str, option: ArgumentOption) -> Result<(), SessionError> {
        self.bindings_mut("change an argument option")?
            .set_option(parameter, option)?;
        Ok(())
    }

    pub fn set_watch_return(&mut self, watch: bool) -> Result<(), SessionError> {
        self.bindings_mut("change the return watch")?
            .set_watch_return(watch)?;
        Ok(())
    }

    // ── Drivers ─────────────────────────────────────────────

    /// Append a driver for the selected function to the artifact. A previous
    /// engine rewrite is undone first.
    pub fn generate_driver(&mut self) -> Result<String, SessionError> {
        const OPERATION: &str = "generate a driver";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::FunctionAnalyzed)?;
        let bindings = self.bindings.clone().ok_or(SessionError::NoFunctionSelected)?;

        // 1. Fail on unsupported options before touching the artifact
        build_driver(&bindings, &self.config.driver_prefix)?;

        // 2. Back to the symbolic artifact
        self.restore_symbolic_artifact()?;

        // 3. Append
        let text = append_driver(&self.config.artifact, &bindings, &self.config.driver_prefix)?;
        self.state = PipelineState::DriverGenerated;
        Ok(text)
    }

    /// Rewrite the selected function's driver into the engine entry point.
    pub fn generate_engine_driver(&mut self) -> Result<&EngineDriver, SessionError> {
        const OPERATION: &str = "generate the engine driver";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::DriverGenerated)?;
        let function = self
            .bindings
            .as_ref()
            .map(|b| b.signature().name.clone())
            .ok_or(SessionError::NoFunctionSelected)?;

        self.restore_symbolic_artifact()?;
        let text = fs::read_to_string(&self.config.artifact)?;
        let name = driver_name(&self.config.driver_prefix, &function);
        let engine_driver = rewrite_driver(&text, &name, &self.rewrite_options())?;
        fs::write(&self.config.artifact, &engine_driver.text)?;

        self.symbolic_artifact = Some(text);
        self.heading_truncated = false;
        self.bitcode = None;
        self.state = PipelineState::EngineDriverGenerated;
        info!(
            driver = %name,
            watched = engine_driver.watched.len(),
            "generated engine driver"
        );
        Ok(self.engine_driver.insert(engine_driver))
    }

    /// Put back the artifact as it was before the engine rewrite. Returns
    /// whether there was anything to restore.
    pub fn revert_engine_driver(&mut self) -> Result<bool, SessionError> {
        self.require_idle("revert the engine driver")?;
        let reverted = self.restore_symbolic_artifact()?;
        if reverted && self.state > PipelineState::DriverGenerated {
            self.state = PipelineState::DriverGenerated;
        }
        Ok(reverted)
    }

    fn restore_symbolic_artifact(&mut self) -> Result<bool, SessionError> {
        let Some(text) = &self.symbolic_artifact else {
            return Ok(false);
        };
        fs::write(&self.config.artifact, text)?;
        self.symbolic_artifact = None;
        self.engine_driver = None;
        self.bitcode = None;
        debug!(artifact = %self.config.artifact.display(), "restored symbolic artifact");
        Ok(true)
    }

    fn rewrite_options(&self) -> RewriteOptions {
        let source = &self.config.source;
        let target_source = source
            .file_name()
            .map_or_else(|| source.display().to_string(), |name| name.to_string_lossy().into_owned());
        RewriteOptions {
            engine_include: self.config.engine_include.clone(),
            target_source,
            driver_prefix: self.config.driver_prefix.clone(),
            typedefs: self.typedefs.clone(),
        }
    }

    // ── Engine ──────────────────────────────────────────────

    /// Write the placeholder header and compile the artifact. A compiler
    /// failure comes back as [`EngineError::CompileFailure`] with its output.
    pub fn compile(&mut self) -> Result<CompileOutput, SessionError> {
        const OPERATION: &str = "compile";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::EngineDriverGenerated)?;
        self.bitcode = None;
        self.state = PipelineState::EngineDriverGenerated;

        fs::create_dir_all(&self.config.build_dir)?;
        fs::write(self.config.build_dir.join(PLACEHOLDER_HEADER_NAME), PLACEHOLDER_HEADER)?;

        let mut include_dirs = vec![self.config.build_dir.clone()];
        if let Some(dir) = self.config.source.parent().filter(|d| !d.as_os_str().is_empty()) {
            include_dirs.push(dir.to_path_buf());
        }
        include_dirs.extend(self.config.include_dirs.iter().cloned());

        let output = self.toolchain.compile(&self.config.artifact, &include_dirs, &[])?;
        self.bitcode = Some(output.clone().into_bitcode()?);
        self.state = PipelineState::Compiled;
        Ok(output)
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        const OPERATION: &str = "start the engine";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::Compiled)?;
        let bitcode = self
            .bitcode
            .clone()
            .ok_or_else(|| self.invalid(OPERATION, PipelineState::Compiled))?;
        let watched = self
            .engine_driver
            .as_ref()
            .map(|driver| driver.watched.clone())
            .ok_or_else(|| self.invalid(OPERATION, PipelineState::EngineDriverGenerated))?;

        let engine = EngineProcess::start(&self.config.engine, &bitcode)?;
        let harvester = Harvester::new(engine.output_dir());
        self.run = Some(Run {
            engine,
            harvester,
            watched,
        });
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Drain engine output and harvest new records without blocking. The
    /// update that reports `finished` includes a final harvesting pass.
    pub fn poll(&mut self) -> Result<PollUpdate, SessionError> {
        self.require("poll the engine", PipelineState::Running)?;
        let running = self.state == PipelineState::Running;
        let Some(run) = self.run.as_mut() else {
            return Ok(PollUpdate {
                finished: true,
                ..PollUpdate::default()
            });
        };
        if !running {
            // Reader threads can still forward lines after a stop.
            return Ok(PollUpdate {
                output: run.engine.poll_output(),
                finished: true,
                exit_code: run.engine.exit_code(),
                ..PollUpdate::default()
            });
        }

        let output = run.engine.poll_output();
        let finished = !run.engine.is_running() && run.engine.output_closed();
        let mode = if finished {
            HarvestMode::Final
        } else {
            HarvestMode::Live
        };
        let names = run.watched_names();
        let new_records = run.harvester.fetch_new_records(&names, mode);
        let exit_code = run.engine.exit_code();

        if finished {
            self.state = PipelineState::Completed;
            info!(?exit_code, records = self.records().len(), "engine run completed");
        }
        Ok(PollUpdate {
            output,
            new_records,
            finished,
            exit_code,
        })
    }

    /// Kill the engine and harvest what it left behind. Once an engine has
    /// been started, calling it again only drains late output.
    pub fn stop(&mut self) -> Result<PollUpdate, SessionError> {
        const OPERATION: &str = "stop the engine";
        self.require(OPERATION, PipelineState::Running)?;
        let running = self.state == PipelineState::Running;
        let Some(run) = self.run.as_mut() else {
            return Err(self.invalid(OPERATION, PipelineState::Running));
        };
        if !running {
            return Ok(PollUpdate {
                output: run.engine.poll_output(),
                finished: true,
                exit_code: run.engine.exit_code(),
                ..PollUpdate::default()
            });
        }

        run.engine.stop();
        let output = run.engine.poll_output();
        let names = run.watched_names();
        let new_records = run.harvester.fetch_new_records(&names, HarvestMode::Final);
        let exit_code = run.engine.exit_code();
        self.state = PipelineState::Stopped;
        Ok(PollUpdate {
            output,
            new_records,
            finished: true,
            exit_code,
        })
    }

    // ── Records ─────────────────────────────────────────────

    fn run(&self, operation: &'static str) -> Result<&Run, SessionError> {
        self.run
            .as_ref()
            .ok_or_else(|| self.invalid(operation, PipelineState::Running))
    }

    pub fn record_table(&self, radix: Radix) -> Result<RecordTable, SessionError> {
        let run = self.run("show records")?;
        let rows = run
            .harvester
            .records()
            .iter()
            .map(|record| RecordRow {
                ordinal: record.ordinal,
                cells: run.cells(record, radix),
            })
            .collect();
        Ok(RecordTable {
            columns: run.watched_names(),
            rows,
        })
    }

    pub fn export_records_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(self.records())?)
    }

    // ── Concrete test cases ─────────────────────────────────

    /// Render a `TEST_CASE` from `values` and append it to the artifact. The
    /// first call cuts the artifact back to the lines above its first driver.
    pub fn concretize(&mut self, case_name: &str, values: &BTreeMap<String, String>) -> Result<String, SessionError> {
        const OPERATION: &str = "concretize a test case";
        self.require_idle(OPERATION)?;
        self.require(OPERATION, PipelineState::EngineDriverGenerated)?;
        let driver = self
            .engine_driver
            .as_ref()
            .ok_or_else(|| self.invalid(OPERATION, PipelineState::EngineDriverGenerated))?;
        let case = concretize(&driver.template, case_name, values)?;
        let heading_end_line = driver.heading_end_line;

        if !self.heading_truncated {
            let text = fs::read_to_string(&self.config.artifact)?;
            fs::write(&self.config.artifact, truncate_to_heading(&text, heading_end_line))?;
            self.symbolic_artifact = None;
            self.heading_truncated = true;
        }
        let mut file = OpenOptions::new().append(true).open(&self.config.artifact)?;
        file.write_all(b"\n")?;
        file.write_all(case.as_bytes())?;

        info!(case = case_name, "appended concrete test case");
        Ok(case)
    }

    /// Concretize the harvested record `ordinal` with its values formatted in `radix`.
    pub fn concretize_record(&mut self, case_name: &str, ordinal: u32, radix: Radix) -> Result<String, SessionError> {
        let run = self.run("concretize a record")?;
        let record = run
            .harvester
            .records()
            .iter()
            .find(|r| r.ordinal == ordinal)
            .ok_or(SessionError::UnknownRecord { ordinal })?;
        let values = run.literals(record, radix)?;
        self.concretize(case_name, &values)
    }
}
