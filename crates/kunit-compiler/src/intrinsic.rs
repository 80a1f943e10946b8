//! Placeholder shapes recognized in a macro-expanded driver body.
//!
//! `SYMBOLIC`, `SYMBOLIC_ARRAY`, `WATCH` and `LET` lower to calls of
//! `__symbolic`, `__watch` and `__let`. The rewriter and the concretizer both
//! classify statements through [`Intrinsic::classify`] and differ only in how
//! they lower each variant.

use std::collections::HashMap;

use kunit_ir::expr::{BinaryOp, Expr, Stmt, UnaryOp};
use kunit_ir::print::{render_expr, render_stmt};
use kunit_ir::types::{CType, Decl};

pub const SYMBOLIC_FN: &str = "__symbolic";
pub const WATCH_FN: &str = "__watch";
pub const ASSUME_FN: &str = "__let";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed {call} in `{statement}`: {reason}")]
pub struct MalformedIntrinsic {
    pub call: String,
    pub statement: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intrinsic {
    /// `T v = *(T *) __symbolic(sizeof (T));`
    SymbolicScalar { decl: Decl },
    /// `E v[n] = {*(E *) __symbolic(sizeof (E) * n)};` with the dimension
    /// filled in from the size when the declarator omits it.
    SymbolicArray { decl: Decl },
    /// `E v[n] = {*(E *) __symbolic(sizeof (E)), ...};`, one element per entry.
    ExpandedArray { decl: Decl, count: usize },
    /// `__watch((void *) &lvalue);`
    Watch { target: Expr },
    /// `__let(cond);`
    Assume { cond: Expr },
}

impl Intrinsic {
    /// Recognize a placeholder statement. Statements that mention no
    /// placeholder yield `Ok(None)`; a placeholder in any other form is an error.
    pub fn classify(stmt: &Stmt) -> Result<Option<Self>, MalformedIntrinsic> {
        match stmt {
            Stmt::Decl(decl) => match &decl.init {
                Some(init) => classify_decl(stmt, decl, init),
                None => Ok(None),
            },
            Stmt::Expr(expr) => classify_call(stmt, expr),
            Stmt::Opaque(_) => Ok(None),
        }
    }

    /// Declaration with the placeholder initializer removed.
    pub fn declaration(&self) -> Option<&Decl> {
        match self {
            Intrinsic::SymbolicScalar { decl }
            | Intrinsic::SymbolicArray { decl }
            | Intrinsic::ExpandedArray { decl, .. } => Some(decl),
            Intrinsic::Watch { .. } | Intrinsic::Assume { .. } => None,
        }
    }

    /// Engine labels this shape records, in order, with element widths
    /// resolved against the declarations seen so far.
    pub fn watched(&self, declared: &HashMap<String, CType>) -> Vec<(String, Option<usize>)> {
        match self {
            Intrinsic::SymbolicScalar { decl } => {
                vec![(decl_name(decl).to_string(), decl.ty.size_hint())]
            }
            Intrinsic::SymbolicArray { decl } => {
                vec![(decl_name(decl).to_string(), element_type(&decl.ty).size_hint())]
            }
            Intrinsic::ExpandedArray { decl, count } => {
                let width = element_type(&decl.ty).size_hint();
                (0..*count)
                    .map(|i| (element_label(decl_name(decl), i), width))
                    .collect()
            }
            Intrinsic::Watch { target } => {
                let width = match target {
                    Expr::Ident(name) => declared.get(name).and_then(CType::size_hint),
                    _ => None,
                };
                vec![(render_expr(target), width)]
            }
            Intrinsic::Assume { .. } => Vec::new(),
        }
    }
}

pub fn decl_name(decl: &Decl) -> &str {
    decl.name.as_deref().unwrap_or_default()
}

pub fn element_label(array: &str, index: usize) -> String {
    format!("{array}[{index}]")
}

fn element_type(ty: &CType) -> &CType {
    match ty {
        CType::Array { element, .. } => element,
        other => other,
    }
}

fn malformed(call: &str, stmt: &Stmt, reason: impl Into<String>) -> MalformedIntrinsic {
    MalformedIntrinsic {
        call: call.to_string(),
        statement: render_stmt(stmt, 0),
        reason: reason.into(),
    }
}

/// Whether `name` is called anywhere inside `expr`.
fn mentions(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call { callee, args } => {
            expr.callee_name() == Some(name)
                || mentions(callee, name)
                || args.iter().any(|a| mentions(a, name))
        }
        Expr::Ident(_) | Expr::Constant(_) | Expr::StringLit(_) | Expr::TypeName(_) => false,
        Expr::Unary { operand, .. } | Expr::Postfix { operand, .. } => mentions(operand, name),
        Expr::Binary { lhs, rhs, .. } => mentions(lhs, name) || mentions(rhs, name),
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => mentions(cond, name) || mentions(then, name) || mentions(otherwise, name),
        Expr::Cast { expr, .. } => mentions(expr, name),
        Expr::Index { base, index } => mentions(base, name) || mentions(index, name),
        Expr::Member { base, .. } => mentions(base, name),
        Expr::InitList(items) => items.iter().any(|i| mentions(i, name)),
    }
}

fn mentions_placeholder(expr: &Expr) -> Option<&'static str> {
    [SYMBOLIC_FN, WATCH_FN, ASSUME_FN]
        .into_iter()
        .find(|name| mentions(expr, name))
}

/// The size argument of `*(T *) __symbolic(size)`, or `None` when `expr` is
/// not a symbolic construction at all.
fn symbolic_size<'e>(stmt: &Stmt, expr: &'e Expr) -> Result<Option<&'e Expr>, MalformedIntrinsic> {
    let Expr::Unary {
        op: UnaryOp::Deref,
        operand,
    } = expr
    else {
        return Ok(None);
    };
    let Expr::Cast { ty, expr: call } = operand.as_ref() else {
        return Ok(None);
    };
    if call.callee_name() != Some(SYMBOLIC_FN) {
        return Ok(None);
    }
    if !matches!(ty, CType::Pointer { .. }) {
        return Err(malformed(SYMBOLIC_FN, stmt, "result must be cast to a pointer type"));
    }
    match call.as_ref() {
        Expr::Call { args, .. } if args.len() == 1 => Ok(Some(&args[0])),
        Expr::Call { args, .. } => Err(malformed(
            SYMBOLIC_FN,
            stmt,
            format!("expected 1 argument, found {}", args.len()),
        )),
        _ => Ok(None),
    }
}

fn classify_decl(stmt: &Stmt, decl: &Decl, init: &Expr) -> Result<Option<Intrinsic>, MalformedIntrinsic> {
    let Some(placeholder) = mentions_placeholder(init) else {
        return Ok(None);
    };
    let stripped = Decl {
        init: None,
        ..decl.clone()
    };

    if symbolic_size(stmt, init)?.is_some() {
        return Ok(Some(Intrinsic::SymbolicScalar { decl: stripped }));
    }

    let Expr::InitList(items) = init else {
        return Err(malformed(placeholder, stmt, "placeholder is not the whole initializer"));
    };
    let mut sizes = Vec::with_capacity(items.len());
    for item in items {
        match symbolic_size(stmt, item)? {
            Some(size) => sizes.push(size),
            None => {
                return Err(malformed(
                    placeholder,
                    stmt,
                    "every initializer element must be a symbolic construction",
                ))
            }
        }
    }

    let CType::Array { element, dim } = &decl.ty else {
        return Ok(Some(Intrinsic::SymbolicScalar { decl: stripped }));
    };

    // One element sized `sizeof(E) * n` covers the whole array.
    if let [size] = sizes.as_slice() {
        if let Expr::Binary {
            op: BinaryOp::Mul,
            rhs: count,
            ..
        } = size
        {
            let dim = match dim {
                Some(dim) => Some(dim.clone()),
                None => Some(count.clone()),
            };
            return Ok(Some(Intrinsic::SymbolicArray {
                decl: Decl {
                    ty: CType::Array {
                        element: element.clone(),
                        dim,
                    },
                    ..stripped
                },
            }));
        }
    }

    let declared = dim.as_deref().and_then(Expr::as_integer);
    if declared.is_some_and(|n| n != sizes.len() as u64) {
        return Err(malformed(
            SYMBOLIC_FN,
            stmt,
            format!(
                "array of {} elements initialized with {} symbolic values",
                declared.unwrap_or_default(),
                sizes.len()
            ),
        ));
    }
    Ok(Some(Intrinsic::ExpandedArray {
        decl: stripped,
        count: sizes.len(),
    }))
}

fn classify_call(stmt: &Stmt, expr: &Expr) -> Result<Option<Intrinsic>, MalformedIntrinsic> {
    let Some(placeholder) = mentions_placeholder(expr) else {
        return Ok(None);
    };
    let Expr::Call { args, .. } = expr else {
        return Err(malformed(placeholder, stmt, "placeholder must be a statement of its own"));
    };
    match expr.callee_name() {
        Some(WATCH_FN) => {
            let [arg] = args.as_slice() else {
                return Err(malformed(
                    WATCH_FN,
                    stmt,
                    format!("expected 1 argument, found {}", args.len()),
                ));
            };
            let address = match arg {
                Expr::Cast { expr, .. } => expr.as_ref(),
                other => other,
            };
            match address {
                Expr::Unary {
                    op: UnaryOp::AddrOf,
                    operand,
                } if is_lvalue(operand) => Ok(Some(Intrinsic::Watch {
                    target: operand.as_ref().clone(),
                })),
                _ => Err(malformed(WATCH_FN, stmt, "argument must be the address of a variable")),
            }
        }
        Some(ASSUME_FN) => match args.as_slice() {
            [cond] => Ok(Some(Intrinsic::Assume { cond: cond.clone() })),
            _ => Err(malformed(
                ASSUME_FN,
                stmt,
                format!("expected 1 argument, found {}", args.len()),
            )),
        },
        _ => Err(malformed(placeholder, stmt, "placeholder must be a statement of its own")),
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) => true,
        Expr::Index { base, .. } | Expr::Member { base, .. } => is_lvalue(base),
        _ => false,
    }
}
