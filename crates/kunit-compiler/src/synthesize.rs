use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::info;

use kunit_ir::expr::{Expr, Stmt};
use kunit_ir::print::render_function;
use kunit_ir::types::{CType, Decl, FunctionDef, LineSpan};

use crate::classify::{ArgumentBinding, ArgumentOption, BindingTable, ParameterShape};
use crate::PLACEHOLDER_HEADER_NAME;

#[derive(Debug, thiserror::Error)]
pub enum SynthesizeError {
    #[error("Option '{option}' for parameter '{parameter}' is not implemented")]
    NotImplemented {
        parameter: String,
        option: ArgumentOption,
    },

    #[error("Option '{option}' does not apply to parameter '{parameter}' of shape {shape:?}")]
    ShapeMismatch {
        parameter: String,
        option: ArgumentOption,
        shape: ParameterShape,
    },

    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name used for the placeholder an undefined variable-length input expands to.
pub const UNKNOWN_LENGTH: &str = "UNKNOWN_LENGTH";

/// First lines of a fresh driver artifact.
pub fn boilerplate() -> String {
    format!(
        "/* Symbolic test drivers. Each driver function is rewritten into an engine entry point. */\n#include \"{PLACEHOLDER_HEADER_NAME}\"\n"
    )
}

pub fn driver_name(prefix: &str, function: &str) -> String {
    format!("{prefix}_{function}")
}

/// Build the nullary driver for the bound function.
pub fn build_driver(bindings: &BindingTable, prefix: &str) -> Result<FunctionDef, SynthesizeError> {
    let signature = bindings.signature();
    let mut body = Vec::new();

    // 1. One declaration per argument
    for binding in bindings.bindings() {
        body.push(Stmt::Decl(argument_decl(binding)?));
    }

    // 2. The call, optionally capturing the return value
    let args = signature.param_names().map(Expr::ident).collect();
    let call = Expr::call(signature.name.clone(), args);
    if bindings.watch_return() {
        let ret = return_name(bindings);
        body.push(Stmt::Decl(Decl::new(
            ret.clone(),
            signature.return_type.clone(),
            Some(call),
        )));
        body.push(Stmt::Expr(Expr::call("WATCH", vec![Expr::ident(ret)])));
    } else {
        body.push(Stmt::Expr(call));
    }

    Ok(FunctionDef {
        span: LineSpan::default(),
        decl: Decl::new(
            driver_name(prefix, &signature.name),
            CType::Function {
                ret: Box::new(CType::builtin("void")),
                params: Vec::new(),
                variadic: false,
            },
            None,
        ),
        body,
    })
}

fn argument_decl(binding: &ArgumentBinding) -> Result<Decl, SynthesizeError> {
    let name = binding.name().to_string();
    let ty = binding.param.ty.clone();
    let mismatch = || SynthesizeError::ShapeMismatch {
        parameter: name.clone(),
        option: binding.option,
        shape: binding.shape,
    };

    let decl = match binding.option {
        ArgumentOption::None => Decl::new(name.clone(), ty, Some(Expr::ident("UNINITIALIZED"))),
        ArgumentOption::Symbolic => {
            let init = Expr::call("SYMBOLIC", vec![Expr::TypeName(ty.clone())]);
            Decl::new(name.clone(), ty, Some(init))
        }
        ArgumentOption::SymbolicArray => {
            let (element, dim) = match (&binding.shape, ty) {
                (ParameterShape::FixedArray(_), CType::Array { element, dim }) => (*element, dim.map(|d| *d)),
                (ParameterShape::VariableArray, CType::Array { element, .. }) => (*element, None),
                (ParameterShape::Pointer, CType::Pointer { pointee, .. }) => (*pointee, None),
                _ => return Err(mismatch()),
            };
            let length = dim.clone().unwrap_or_else(|| Expr::ident(UNKNOWN_LENGTH));
            let init = Expr::call(
                "SYMBOLIC_ARRAY",
                vec![Expr::TypeName(element.clone()), length],
            );
            Decl::new(name.clone(), CType::array_of(element, dim), Some(init))
        }
        ArgumentOption::ExpandedArray => {
            let (ParameterShape::FixedArray(count), CType::Array { element, .. }) = (&binding.shape, &ty)
            else {
                return Err(mismatch());
            };
            let items = (0..*count)
                .map(|_| Expr::call("SYMBOLIC", vec![Expr::TypeName(element.as_ref().clone())]))
                .collect();
            Decl::new(name.clone(), ty.clone(), Some(Expr::InitList(items)))
        }
        ArgumentOption::ExpandedStruct | ArgumentOption::PointerOut | ArgumentOption::PointerInOut => {
            return Err(SynthesizeError::NotImplemented {
                parameter: name,
                option: binding.option,
            })
        }
    };
    Ok(decl)
}

/// `ret`, or `ret_` repeated until it no longer collides with a parameter.
fn return_name(bindings: &BindingTable) -> String {
    let mut name = String::from("ret");
    while bindings.signature().param_names().any(|p| p == name) {
        name.push('_');
    }
    name
}

/// Build, render and append the driver to `artifact`, creating the file with
/// the boilerplate header when it is missing or empty. Nothing is written
/// when the driver cannot be built.
pub fn append_driver(artifact: &Path, bindings: &BindingTable, prefix: &str) -> Result<String, SynthesizeError> {
    let driver = build_driver(bindings, prefix)?;
    let text = render_function(&driver);

    let fresh = std::fs::metadata(artifact).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new().create(true).append(true).open(artifact)?;
    if fresh {
        file.write_all(boilerplate().as_bytes())?;
    }
    file.write_all(b"\n")?;
    file.write_all(text.as_bytes())?;

    info!(
        driver = driver.name(),
        artifact = %artifact.display(),
        "appended driver"
    );
    Ok(text)
}
