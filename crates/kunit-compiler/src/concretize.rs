use std::collections::BTreeMap;

use tracing::debug;

use kunit_ir::expr::{BinaryOp, Expr, Stmt};
use kunit_ir::print::{render_expr, render_test_case};
use kunit_ir::types::{CType, Decl, LineSpan, TestCase};

use crate::intrinsic::{decl_name, element_label, Intrinsic, MalformedIntrinsic};
use crate::rewrite::DriverTemplate;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConcretizeError {
    #[error("No value recorded for watched variable '{name}'")]
    MissingValue { name: String },

    #[error("Malformed intrinsic in template: {0}")]
    MalformedIntrinsic(#[from] MalformedIntrinsic),
}

/// Replay one set of recorded values through a fresh copy of the driver as a
/// `TEST_CASE` with literal inputs and `REQUIRE` assertions.
///
/// `values` maps each watched name to a C literal; a brace list such as
/// `{1, 2, 3}` initializes a whole array.
pub fn concretize(
    template: &DriverTemplate,
    case_name: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, ConcretizeError> {
    let function = template.function().clone();
    let mut body = Vec::with_capacity(function.body.len());

    for stmt in function.body {
        let Some(intrinsic) = Intrinsic::classify(&stmt)? else {
            body.push(stmt);
            continue;
        };
        match intrinsic {
            Intrinsic::SymbolicScalar { decl } => {
                let value = lookup(values, decl_name(&decl))?;
                body.push(with_init(decl, literal(value)));
            }
            Intrinsic::SymbolicArray { mut decl } => {
                let value = lookup(values, decl_name(&decl))?;
                // A non-literal length (`UNKNOWN_LENGTH`) is sized by the initializer.
                if let CType::Array { dim, .. } = &mut decl.ty {
                    if dim.as_deref().and_then(Expr::as_integer).is_none() {
                        *dim = None;
                    }
                }
                body.push(with_init(decl, literal(value)));
            }
            Intrinsic::ExpandedArray { decl, count } => {
                let name = decl_name(&decl).to_string();
                let items = (0..count)
                    .map(|i| lookup(values, &element_label(&name, i)).map(literal))
                    .collect::<Result<Vec<_>, _>>()?;
                body.push(with_init(decl, Expr::InitList(items)));
            }
            Intrinsic::Watch { target } => {
                let value = lookup(values, &render_expr(&target))?;
                let check = Expr::binary(BinaryOp::Eq, target, literal(value));
                body.push(Stmt::Expr(Expr::call("REQUIRE", vec![check])));
            }
            Intrinsic::Assume { cond } => {
                body.push(Stmt::Expr(Expr::call("REQUIRE", vec![cond])));
            }
        }
    }

    debug!(case = case_name, driver = template.name(), "concretized test case");
    Ok(render_test_case(&TestCase {
        span: LineSpan::default(),
        title: case_name.to_string(),
        body,
    }))
}

/// The first `heading_end_line - 1` lines of an artifact.
pub fn truncate_to_heading(artifact: &str, heading_end_line: usize) -> String {
    artifact
        .lines()
        .take(heading_end_line.saturating_sub(1))
        .map(|line| format!("{line}\n"))
        .collect()
}

fn lookup<'v>(values: &'v BTreeMap<String, String>, name: &str) -> Result<&'v str, ConcretizeError> {
    values
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ConcretizeError::MissingValue {
            name: name.to_string(),
        })
}

fn with_init(decl: Decl, init: Expr) -> Stmt {
    Stmt::Decl(Decl {
        init: Some(init),
        ..decl
    })
}

/// A formatted value as an expression; `{a, b}` becomes an initializer list.
fn literal(text: &str) -> Expr {
    let trimmed = text.trim();
    match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => Expr::InitList(
            inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(literal)
                .collect(),
        ),
        None => Expr::constant(trimmed),
    }
}
