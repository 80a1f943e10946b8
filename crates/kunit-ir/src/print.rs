//! Serializes trees back to C source.
//!
//! Layout is fixed: two-space indentation, braces of function and test-case
//! bodies on their own lines, one declarator per declaration. Parentheses are
//! emitted from operator precedence, not remembered from the input.

use crate::expr::{quote, BinaryOp, Expr, PostfixOp, Stmt, UnaryOp};
use crate::types::{CType, Decl, ExternalDecl, FunctionDef, TestCase, TranslationUnit, TypeSpec};

const INDENT: &str = "  ";

// Precedence of expression forms that are not binary operators.
const PRIMARY: u8 = 16;
const POSTFIX: u8 = 15;
const UNARY: u8 = 14;
const CONDITIONAL: u8 = 3;
const ASSIGNMENT: u8 = 2;

// ── Types and declarations ───────────────────────────────────────────

/// Abstract type text, e.g. `unsigned int`, `char *`, `int (*)(int)`.
pub fn render_type(ty: &CType) -> String {
    declarator(ty, String::new())
}

/// A declaration without the trailing `;`, e.g. `static const int *p = 0`.
pub fn render_decl(decl: &Decl) -> String {
    let mut out = String::new();
    for storage in &decl.storage {
        out.push_str(storage);
        out.push(' ');
    }
    out.push_str(&declarator(&decl.ty, decl.name.clone().unwrap_or_default()));
    if let Some(init) = &decl.init {
        out.push_str(" = ");
        out.push_str(&render_at(init, ASSIGNMENT));
    }
    out
}

fn declarator(ty: &CType, inner: String) -> String {
    match ty {
        CType::Named { quals, spec } => {
            let mut out = String::new();
            for qual in quals {
                out.push_str(qual);
                out.push(' ');
            }
            out.push_str(&render_spec(spec));
            if !inner.is_empty() {
                out.push(' ');
                out.push_str(&inner);
            }
            out
        }
        CType::Pointer { quals, pointee } => {
            let mut text = String::from("*");
            text.push_str(&quals.join(" "));
            if !quals.is_empty() && !inner.is_empty() {
                text.push(' ');
            }
            text.push_str(&inner);
            if matches!(pointee.as_ref(), CType::Array { .. } | CType::Function { .. }) {
                text = format!("({text})");
            }
            declarator(pointee, text)
        }
        CType::Array { element, dim } => {
            let dim = dim.as_deref().map(render_expr).unwrap_or_default();
            declarator(element, format!("{inner}[{dim}]"))
        }
        CType::Function {
            ret,
            params,
            variadic,
        } => {
            let mut list: Vec<String> = params.iter().map(render_decl).collect();
            if *variadic {
                list.push("...".to_string());
            }
            let list = if list.is_empty() {
                "void".to_string()
            } else {
                list.join(", ")
            };
            declarator(ret, format!("{inner}({list})"))
        }
    }
}

fn render_spec(spec: &TypeSpec) -> String {
    match spec {
        TypeSpec::Builtin(words) => words.join(" "),
        TypeSpec::Typedef(name) => name.clone(),
        TypeSpec::Aggregate { kind, tag, body } => {
            let mut out = kind.keyword().to_string();
            if let Some(tag) = tag {
                out.push(' ');
                out.push_str(tag);
            }
            if let Some(body) = body {
                out.push(' ');
                out.push_str(body);
            }
            out
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────────

pub fn render_expr(expr: &Expr) -> String {
    render_at(expr, 0)
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ident(_) | Expr::Constant(_) | Expr::StringLit(_) | Expr::TypeName(_) | Expr::InitList(_) => {
            PRIMARY
        }
        Expr::Call { .. } | Expr::Index { .. } | Expr::Member { .. } | Expr::Postfix { .. } => POSTFIX,
        Expr::Unary { .. } | Expr::Cast { .. } => UNARY,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Conditional { .. } => CONDITIONAL,
    }
}

/// Render `expr`, parenthesized when it binds looser than `min`.
fn render_at(expr: &Expr, min: u8) -> String {
    let text = render_bare(expr);
    if precedence(expr) < min {
        format!("({text})")
    } else {
        text
    }
}

fn render_bare(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Constant(text) | Expr::StringLit(text) => text.clone(),
        Expr::TypeName(ty) => render_type(ty),
        Expr::Unary {
            op: UnaryOp::Sizeof,
            operand,
        } => format!("sizeof({})", render_expr(operand)),
        Expr::Unary { op, operand } => {
            let symbol = op.symbol();
            let operand = render_at(operand, UNARY);
            // Keep `- -x` and `& &x` from fusing into another token.
            if operand.starts_with(symbol.chars().last().unwrap_or(' ')) {
                format!("{symbol} {operand}")
            } else {
                format!("{symbol}{operand}")
            }
        }
        Expr::Postfix { op, operand } => {
            let symbol = match op {
                PostfixOp::Inc => "++",
                PostfixOp::Dec => "--",
            };
            format!("{}{symbol}", render_at(operand, POSTFIX))
        }
        Expr::Binary { op, lhs, rhs } => {
            let p = op.precedence();
            let (left, right) = if op.is_assignment() {
                (render_at(lhs, p + 1), render_at(rhs, p))
            } else {
                (render_at(lhs, p), render_at(rhs, p + 1))
            };
            if *op == BinaryOp::Comma {
                format!("{left}, {right}")
            } else {
                format!("{left} {} {right}", op.symbol())
            }
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => format!(
            "{} ? {} : {}",
            render_at(cond, CONDITIONAL + 1),
            render_expr(then),
            render_at(otherwise, CONDITIONAL)
        ),
        Expr::Cast { ty, expr } => format!("({}) {}", render_type(ty), render_at(expr, UNARY)),
        Expr::Call { callee, args } => format!(
            "{}({})",
            render_at(callee, POSTFIX),
            render_list(args)
        ),
        Expr::Index { base, index } => {
            format!("{}[{}]", render_at(base, POSTFIX), render_expr(index))
        }
        Expr::Member { base, field, arrow } => format!(
            "{}{}{field}",
            render_at(base, POSTFIX),
            if *arrow { "->" } else { "." }
        ),
        Expr::InitList(items) => format!("{{{}}}", render_list(items)),
    }
}

fn render_list(items: &[Expr]) -> String {
    items
        .iter()
        .map(|item| render_at(item, ASSIGNMENT))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Statements and items ─────────────────────────────────────────────

pub fn render_stmt(stmt: &Stmt, depth: usize) -> String {
    let indent = INDENT.repeat(depth);
    match stmt {
        Stmt::Decl(decl) => format!("{indent}{};", render_decl(decl)),
        Stmt::Expr(expr) => format!("{indent}{};", render_expr(expr)),
        Stmt::Opaque(text) => format!("{indent}{text}"),
    }
}

fn render_body(body: &[Stmt]) -> String {
    let mut out = String::from("{\n");
    for stmt in body {
        out.push_str(&render_stmt(stmt, 1));
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

pub fn render_function(def: &FunctionDef) -> String {
    format!("{}\n{}", render_decl(&def.decl), render_body(&def.body))
}

pub fn render_test_case(case: &TestCase) -> String {
    format!("TEST_CASE({})\n{}", quote(&case.title), render_body(&case.body))
}

pub fn render_item(item: &ExternalDecl) -> String {
    match item {
        ExternalDecl::Declaration(declaration) => declaration
            .decls
            .iter()
            .map(|decl| format!("{};\n", render_decl(decl)))
            .collect(),
        ExternalDecl::FunctionDef(def) => render_function(def),
        ExternalDecl::TestCase(case) => render_test_case(case),
    }
}

/// All items, separated by blank lines.
pub fn render_translation_unit(unit: &TranslationUnit) -> String {
    unit.items
        .iter()
        .map(render_item)
        .collect::<Vec<_>>()
        .join("\n")
}
