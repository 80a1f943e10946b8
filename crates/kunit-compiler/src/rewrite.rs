use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kunit_ir::expr::{quote, Expr, Stmt};
use kunit_ir::parse::{parse_translation_unit, ParseError, ParseOptions};
use kunit_ir::print::{render_expr, render_function};
use kunit_ir::types::{CType, FunctionDef};

use crate::intrinsic::{decl_name, element_label, Intrinsic, MalformedIntrinsic};
use crate::watch::WatchedVariableSet;
use crate::PLACEHOLDER_HEADER;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Driver '{name}' not found in artifact")]
    DriverNotFound { name: String },

    #[error("Malformed intrinsic: {0}")]
    MalformedIntrinsic(#[from] MalformedIntrinsic),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteOptions {
    /// Include spelling of the engine API header, brackets or quotes included.
    pub engine_include: String,
    /// Path of the analyzed source, included so the driver links against it.
    pub target_source: String,
    /// Prefix shared by every driver in the artifact.
    pub driver_prefix: String,
    /// Typedef names declared by the target source.
    pub typedefs: Vec<String>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            engine_include: "<klee/klee.h>".to_string(),
            target_source: String::new(),
            driver_prefix: "kunit_test".to_string(),
            typedefs: Vec::new(),
        }
    }
}

/// Owned snapshot of a driver taken before it is rewritten for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverTemplate {
    function: FunctionDef,
}

impl DriverTemplate {
    pub fn function(&self) -> &FunctionDef {
        &self.function
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }
}

#[derive(Debug, Clone)]
pub struct EngineDriver {
    /// The artifact with the driver replaced by the engine entry point.
    pub text: String,
    pub watched: WatchedVariableSet,
    pub template: DriverTemplate,
    /// First line of the first driver definition; everything above it is
    /// the artifact's heading.
    pub heading_end_line: usize,
}

const PLACEHOLDER_STUBS: &str = "\
void *__symbolic(unsigned long size) { return 0; }
void __watch(void *ptr) {}
void __let(int cond) {}
";

pub fn rewrite_driver(
    artifact: &str,
    driver_name: &str,
    options: &RewriteOptions,
) -> Result<EngineDriver, RewriteError> {
    // 1. Parse with the placeholders expanded and locate the driver
    let parse_options = ParseOptions::with_header(PLACEHOLDER_HEADER)?.typedefs(options.typedefs.iter().cloned());
    let unit = parse_translation_unit(artifact, &parse_options)?;
    let driver = unit
        .function_defs()
        .filter(|def| def.name() == driver_name)
        .last()
        .ok_or_else(|| RewriteError::DriverNotFound {
            name: driver_name.to_string(),
        })?;
    let prefix = format!("{}_", options.driver_prefix);
    let heading_end_line = unit
        .function_defs()
        .find(|def| def.name().starts_with(&prefix))
        .map_or(driver.span.start_line, |def| def.span.start_line);

    // 2. Snapshot before any rewriting
    let template = DriverTemplate {
        function: driver.clone(),
    };

    // 3. Promote to the engine entry point
    let mut entry = driver.clone();
    entry.decl.name = Some("main".to_string());
    if let CType::Function { ret, .. } = &mut entry.decl.ty {
        **ret = CType::builtin("int");
    }

    // 4. Lower the placeholders
    let (body, watched) = lower_for_engine(&driver.body)?;
    entry.body = body;

    // 5. Splice the entry point over the driver's lines
    let text = splice(artifact, driver.span.start_line, driver.span.end_line, &entry, options);

    info!(
        driver = driver_name,
        watched = watched.len(),
        "rewrote driver for the engine"
    );
    Ok(EngineDriver {
        text,
        watched,
        template,
        heading_end_line,
    })
}

fn lower_for_engine(body: &[Stmt]) -> Result<(Vec<Stmt>, WatchedVariableSet), RewriteError> {
    let mut lowered = Vec::with_capacity(body.len());
    let mut watched = WatchedVariableSet::new();
    let mut declared: HashMap<String, CType> = HashMap::new();

    for stmt in body {
        if let Stmt::Decl(decl) = stmt {
            if let Some(name) = &decl.name {
                declared.insert(name.clone(), decl.ty.clone());
            }
        }
        let Some(intrinsic) = Intrinsic::classify(stmt)? else {
            lowered.push(stmt.clone());
            continue;
        };
        for (name, width) in intrinsic.watched(&declared) {
            debug!(name = %name, ?width, "watching variable");
            watched.push(name, width);
        }
        match intrinsic {
            Intrinsic::SymbolicScalar { decl } | Intrinsic::SymbolicArray { decl } => {
                let name = decl_name(&decl).to_string();
                lowered.push(Stmt::Decl(decl));
                lowered.push(make_symbolic(Expr::ident(&name), &name));
            }
            Intrinsic::ExpandedArray { decl, count } => {
                let name = decl_name(&decl).to_string();
                lowered.push(Stmt::Decl(decl));
                for i in 0..count {
                    let element = Expr::index(Expr::ident(&name), Expr::constant(i.to_string()));
                    lowered.push(make_symbolic(element, &element_label(&name, i)));
                }
            }
            Intrinsic::Watch { target } => {
                let label = render_expr(&target);
                lowered.push(Stmt::Expr(Expr::call(
                    "klee_watch_obj",
                    vec![Expr::addr_of(target), Expr::StringLit(quote(&label))],
                )));
            }
            Intrinsic::Assume { cond } => {
                lowered.push(Stmt::Expr(Expr::call("klee_assume", vec![cond])));
            }
        }
    }
    Ok((lowered, watched))
}

fn make_symbolic(target: Expr, label: &str) -> Stmt {
    Stmt::Expr(Expr::call(
        "klee_make_symbolic",
        vec![
            Expr::addr_of(target.clone()),
            Expr::size_of(target),
            Expr::StringLit(quote(label)),
        ],
    ))
}

fn splice(artifact: &str, start_line: usize, end_line: usize, entry: &FunctionDef, options: &RewriteOptions) -> String {
    let lines: Vec<&str> = artifact.lines().collect();
    let before = &lines[..start_line.saturating_sub(1).min(lines.len())];
    let after = &lines[end_line.min(lines.len())..];

    let mut out = String::new();
    for line in before {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("#include {}\n", options.engine_include));
    out.push_str(&format!("#include {}\n\n", quote(&options.target_source)));
    out.push_str(&render_function(entry));
    out.push('\n');
    out.push_str(PLACEHOLDER_STUBS);
    for line in after {
        out.push_str(line);
        out.push('\n');
    }
    out
}
