use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Stmt};

/// A parsed C translation unit: top-level items in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub items: Vec<ExternalDecl>,
}

impl TranslationUnit {
    /// All function definitions, in source order.
    pub fn function_defs(&self) -> impl Iterator<Item = &FunctionDef> {
        self.items.iter().filter_map(|item| match item {
            ExternalDecl::FunctionDef(def) => Some(def),
            _ => None,
        })
    }

    /// All test cases, in source order.
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.items.iter().filter_map(|item| match item {
            ExternalDecl::TestCase(case) => Some(case),
            _ => None,
        })
    }

    /// Names introduced by top-level `typedef` declarations.
    pub fn typedef_names(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ExternalDecl::Declaration(d) => Some(d),
                _ => None,
            })
            .flat_map(|d| d.decls.iter())
            .filter(|decl| decl.is_typedef())
            .filter_map(|decl| decl.name.clone())
            .collect()
    }
}

// ── Top-level items ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalDecl {
    /// `int a, *b;`, prototypes, typedefs, bare `struct s { ... };`.
    Declaration(Declaration),
    FunctionDef(FunctionDef),
    /// `TEST_CASE("title") { ... }` emitted by concretization.
    TestCase(TestCase),
}

impl ExternalDecl {
    /// Source line of the first token of this item.
    pub fn line(&self) -> usize {
        match self {
            ExternalDecl::Declaration(d) => d.span.start_line,
            ExternalDecl::FunctionDef(d) => d.span.start_line,
            ExternalDecl::TestCase(d) => d.span.start_line,
        }
    }

    /// Source line of the last token of this item.
    pub fn end_line(&self) -> usize {
        match self {
            ExternalDecl::Declaration(d) => d.span.end_line,
            ExternalDecl::FunctionDef(d) => d.span.end_line,
            ExternalDecl::TestCase(d) => d.span.end_line,
        }
    }
}

/// First and last source line (1-based, inclusive) covered by an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub span: LineSpan,
    /// One entry per declarator. A bare tag declaration (`struct s { ... };`)
    /// has a single unnamed entry.
    pub decls: Vec<Decl>,
}

/// A single declarator with its specifiers, e.g. `static const int *p = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub name: Option<String>,
    /// Storage-class and function specifiers (`typedef`, `static`, `inline`, ...).
    #[serde(default)]
    pub storage: Vec<String>,
    pub ty: CType,
    #[serde(default)]
    pub init: Option<Expr>,
}

impl Decl {
    pub fn new(name: impl Into<String>, ty: CType, init: Option<Expr>) -> Self {
        Self {
            name: Some(name.into()),
            storage: Vec::new(),
            ty,
            init,
        }
    }

    pub fn is_typedef(&self) -> bool {
        self.storage.iter().any(|s| s == "typedef")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub span: LineSpan,
    /// Declaration whose type is `CType::Function`.
    pub decl: Decl,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    pub fn name(&self) -> &str {
        self.decl.name.as_deref().unwrap_or_default()
    }

    pub fn return_type(&self) -> Option<&CType> {
        match &self.decl.ty {
            CType::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub span: LineSpan,
    pub title: String,
    pub body: Vec<Stmt>,
}

// ── Types ────────────────────────────────────────────────────────────

/// A C type as written in a declarator, innermost specifier at the leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CType {
    Named {
        #[serde(default)]
        quals: Vec<String>,
        spec: TypeSpec,
    },
    Pointer {
        #[serde(default)]
        quals: Vec<String>,
        pointee: Box<CType>,
    },
    Array {
        element: Box<CType>,
        #[serde(default)]
        dim: Option<Box<Expr>>,
    },
    Function {
        ret: Box<CType>,
        params: Vec<Decl>,
        #[serde(default)]
        variadic: bool,
    },
}

impl CType {
    /// A builtin type from its keywords, e.g. `CType::builtin("unsigned int")`.
    pub fn builtin(words: &str) -> Self {
        CType::Named {
            quals: Vec::new(),
            spec: TypeSpec::Builtin(words.split_whitespace().map(str::to_string).collect()),
        }
    }

    pub fn typedef_name(name: impl Into<String>) -> Self {
        CType::Named {
            quals: Vec::new(),
            spec: TypeSpec::Typedef(name.into()),
        }
    }

    pub fn pointer_to(pointee: CType) -> Self {
        CType::Pointer {
            quals: Vec::new(),
            pointee: Box::new(pointee),
        }
    }

    pub fn array_of(element: CType, dim: Option<Expr>) -> Self {
        CType::Array {
            element: Box::new(element),
            dim: dim.map(Box::new),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(
            self,
            CType::Named { spec: TypeSpec::Builtin(words), .. } if words.len() == 1 && words[0] == "void"
        )
    }

    /// Size in bytes on LP64 for builtin scalars and arrays of them; `None` when
    /// the layout is not derivable from the declaration alone.
    pub fn size_hint(&self) -> Option<usize> {
        match self {
            CType::Named { spec, .. } => spec.size_hint(),
            CType::Pointer { .. } => Some(8),
            CType::Array { element, dim } => {
                let count = dim.as_deref().and_then(Expr::as_integer)?;
                Some(element.size_hint()? * usize::try_from(count).ok()?)
            }
            CType::Function { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSpec {
    /// Builtin keywords in source order, e.g. `["unsigned", "long"]`.
    Builtin(Vec<String>),
    Typedef(String),
    Aggregate {
        kind: AggregateKind,
        #[serde(default)]
        tag: Option<String>,
        /// Raw member list including braces, when the specifier defines the type.
        #[serde(default)]
        body: Option<String>,
    },
}

impl TypeSpec {
    fn size_hint(&self) -> Option<usize> {
        match self {
            TypeSpec::Builtin(words) => builtin_size(words),
            TypeSpec::Typedef(name) => fixed_width_typedef_size(name),
            TypeSpec::Aggregate {
                kind: AggregateKind::Enum,
                ..
            } => Some(4),
            TypeSpec::Aggregate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Struct,
    Union,
    Enum,
}

impl AggregateKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            AggregateKind::Struct => "struct",
            AggregateKind::Union => "union",
            AggregateKind::Enum => "enum",
        }
    }
}

fn builtin_size(words: &[String]) -> Option<usize> {
    let has = |w: &str| words.iter().any(|x| x == w);
    let longs = words.iter().filter(|w| *w == "long").count();
    if has("void") {
        None
    } else if has("char") || has("_Bool") || has("bool") {
        Some(1)
    } else if has("short") {
        Some(2)
    } else if has("float") {
        Some(4)
    } else if has("double") {
        if longs > 0 {
            Some(16)
        } else {
            Some(8)
        }
    } else if longs > 0 {
        Some(8)
    } else {
        Some(4)
    }
}

fn fixed_width_typedef_size(name: &str) -> Option<usize> {
    match name {
        "int8_t" | "uint8_t" => Some(1),
        "int16_t" | "uint16_t" => Some(2),
        "int32_t" | "uint32_t" => Some(4),
        "int64_t" | "uint64_t" | "size_t" | "ssize_t" | "intptr_t" | "uintptr_t" | "ptrdiff_t" => {
            Some(8)
        }
        _ => None,
    }
}
