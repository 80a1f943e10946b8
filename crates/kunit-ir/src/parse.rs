//! Recursive-descent parser for the subset of C the pipeline needs.
//!
//! Top-level declarations and function definitions are parsed structurally;
//! a failure there is fatal. Inside function bodies, declarations and
//! expression statements become typed nodes and anything else (control flow,
//! nested blocks, constructs outside the subset) is kept as `Stmt::Opaque`
//! source text.

use std::collections::HashSet;

use thiserror::Error;

use crate::expr::{BinaryOp, Expr, PostfixOp, Stmt, UnaryOp};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::preprocess::MacroTable;
use crate::types::{
    AggregateKind, CType, Decl, Declaration, ExternalDecl, FunctionDef, LineSpan, TestCase,
    TranslationUnit, TypeSpec,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("Unexpected end of input at line {line} while parsing {context}")]
    UnexpectedEof { line: usize, context: String },
    #[error("Macro error at line {line}: {message}")]
    Macro { line: usize, message: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::UnexpectedEof { line, .. }
            | ParseError::Macro { line, .. } => *line,
        }
    }

    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            ParseError::Syntax { message, .. } => ParseError::Syntax { line, message },
            ParseError::UnexpectedEof { context, .. } => ParseError::UnexpectedEof { line, context },
            ParseError::Macro { message, .. } => ParseError::Macro { line, message },
        }
    }
}

/// Extra context for a parse: macros to expand and typedef names declared
/// outside the parsed text.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub macros: MacroTable,
    pub typedefs: Vec<String>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options expanding every `#define` found in `header`.
    pub fn with_header(header: &str) -> Result<Self, ParseError> {
        Ok(Self {
            macros: MacroTable::from_header(header)?,
            typedefs: Vec::new(),
        })
    }

    pub fn typedefs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.typedefs.extend(names.into_iter().map(Into::into));
        self
    }
}

pub fn parse_translation_unit(
    source: &str,
    options: &ParseOptions,
) -> Result<TranslationUnit, ParseError> {
    let tokens = options.macros.expand(tokenize(source)?)?;
    let mut parser = Parser::new(source, tokens, &options.typedefs);
    let mut items = Vec::new();
    while parser.peek().is_some() {
        if let Some(item) = parser.external_decl()? {
            items.push(item);
        }
    }
    Ok(TranslationUnit { items })
}

// ── Vocabulary ───────────────────────────────────────────────────────

const STORAGE: &[&str] = &[
    "typedef",
    "extern",
    "static",
    "auto",
    "register",
    "inline",
    "__inline",
    "__inline__",
    "_Noreturn",
    "_Thread_local",
];

const QUALIFIERS: &[&str] = &[
    "const",
    "volatile",
    "restrict",
    "__restrict",
    "__restrict__",
    "_Atomic",
];

const BUILTIN_TYPES: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
    "_Complex", "__int128",
];

const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "return", "goto", "break",
    "continue",
];

const WELL_KNOWN_TYPEDEFS: &[&str] = &[
    "size_t", "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "int8_t", "int16_t", "int32_t",
    "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t", "bool", "wchar_t", "FILE",
    "va_list",
];

fn is_reserved(word: &str) -> bool {
    STORAGE.contains(&word)
        || QUALIFIERS.contains(&word)
        || BUILTIN_TYPES.contains(&word)
        || STATEMENT_KEYWORDS.contains(&word)
        || matches!(word, "struct" | "union" | "enum" | "sizeof")
}

fn is_gnu_extension(word: &str) -> bool {
    matches!(
        word,
        "__attribute__" | "__attribute" | "__asm__" | "__asm" | "asm" | "__extension__"
    )
}

/// One step of a declarator, applied to the base type in list order.
enum DeclaratorOp {
    Pointer(Vec<String>),
    Array(Option<Expr>),
    Function(Vec<Decl>, bool),
}

struct Specifiers {
    storage: Vec<String>,
    base: CType,
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    typedefs: HashSet<String>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>, typedefs: &[String]) -> Self {
        let mut known: HashSet<String> = WELL_KNOWN_TYPEDEFS.iter().map(|s| s.to_string()).collect();
        known.extend(typedefs.iter().cloned());
        Self {
            source,
            tokens,
            pos: 0,
            typedefs: known,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is(punct))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.at(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn last_line(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(1, |t| t.line)
    }

    fn error(&self, context: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::Syntax {
                line: tok.line,
                message: format!("unexpected '{}' in {context}", tok.text),
            },
            None => ParseError::UnexpectedEof {
                line: self.line(),
                context: context.to_string(),
            },
        }
    }

    fn expect(&mut self, punct: &str, context: &str) -> Result<(), ParseError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(context))
        }
    }

    fn advance(&mut self, context: &str) -> Result<Token, ParseError> {
        let tok = self.peek().cloned().ok_or_else(|| self.error(context))?;
        self.pos += 1;
        Ok(tok)
    }

    /// Original source text covered by tokens `start..end`.
    fn slice(&self, start: usize, end: usize) -> String {
        match (self.tokens.get(start), end.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if first.span.0 <= last.span.1 => {
                self.source[first.span.0..last.span.1].to_string()
            }
            _ => String::new(),
        }
    }

    // ── Top level ────────────────────────────────────────────────────

    fn external_decl(&mut self) -> Result<Option<ExternalDecl>, ParseError> {
        if self.eat(";") {
            return Ok(None);
        }
        let start_line = self.line();

        if self.at_keyword("TEST_CASE") && self.peek_at(1).is_some_and(|t| t.is("(")) {
            return self.test_case(start_line).map(|case| Some(ExternalDecl::TestCase(case)));
        }

        let specs = self.specifiers()?;
        if self.eat(";") {
            // Bare tag declaration: keep the type as a single unnamed entry.
            return Ok(Some(ExternalDecl::Declaration(Declaration {
                span: LineSpan {
                    start_line,
                    end_line: self.last_line(),
                },
                decls: vec![Decl {
                    name: None,
                    storage: specs.storage,
                    ty: specs.base,
                    init: None,
                }],
            })));
        }

        let (name, ty) = self.declarator(&specs.base)?;
        self.skip_gnu_extensions()?;

        if matches!(ty, CType::Function { .. }) && self.at("{") {
            if name.is_none() {
                return Err(self.error("function definition without a name"));
            }
            let body = self.compound_body()?;
            return Ok(Some(ExternalDecl::FunctionDef(FunctionDef {
                span: LineSpan {
                    start_line,
                    end_line: self.last_line(),
                },
                decl: Decl {
                    name,
                    storage: specs.storage,
                    ty,
                    init: None,
                },
                body,
            })));
        }

        let init = if self.eat("=") {
            Some(self.initializer()?)
        } else {
            None
        };
        let first = Decl {
            name,
            storage: specs.storage.clone(),
            ty,
            init,
        };
        let decls = self.declarator_list(&specs, first)?;
        Ok(Some(ExternalDecl::Declaration(Declaration {
            span: LineSpan {
                start_line,
                end_line: self.last_line(),
            },
            decls,
        })))
    }

    fn test_case(&mut self, start_line: usize) -> Result<TestCase, ParseError> {
        self.pos += 1;
        self.expect("(", "TEST_CASE")?;
        let title = self.advance("TEST_CASE title")?;
        if title.kind != TokenKind::StrLit {
            return Err(ParseError::Syntax {
                line: title.line,
                message: format!("TEST_CASE title must be a string literal, found '{}'", title.text),
            });
        }
        self.expect(")", "TEST_CASE")?;
        let body = self.compound_body()?;
        Ok(TestCase {
            span: LineSpan {
                start_line,
                end_line: self.last_line(),
            },
            title: unquote(&title.text),
            body,
        })
    }

    fn compound_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect("{", "compound statement")?;
        let mut body = Vec::new();
        while !self.eat("}") {
            if self.peek().is_none() {
                return Err(self.error("compound statement"));
            }
            self.statement(&mut body)?;
        }
        Ok(body)
    }

    // ── Declarations ─────────────────────────────────────────────────

    fn specifiers(&mut self) -> Result<Specifiers, ParseError> {
        let mut storage = Vec::new();
        let mut quals = Vec::new();
        let mut builtin: Vec<String> = Vec::new();
        let mut spec: Option<TypeSpec> = None;

        while let Some(tok) = self.peek() {
            if tok.kind != TokenKind::Ident {
                break;
            }
            let word = tok.text.clone();
            if STORAGE.contains(&word.as_str()) {
                storage.push(word);
                self.pos += 1;
            } else if QUALIFIERS.contains(&word.as_str()) {
                quals.push(word);
                self.pos += 1;
            } else if BUILTIN_TYPES.contains(&word.as_str()) {
                builtin.push(word);
                self.pos += 1;
            } else if matches!(word.as_str(), "struct" | "union" | "enum") {
                if spec.is_some() || !builtin.is_empty() {
                    return Err(self.error("declaration specifiers"));
                }
                self.pos += 1;
                spec = Some(self.aggregate(&word)?);
            } else if is_gnu_extension(&word) {
                self.skip_gnu_extensions()?;
            } else if spec.is_none() && builtin.is_empty() && !is_reserved(&word) {
                spec = Some(TypeSpec::Typedef(word));
                self.pos += 1;
            } else {
                break;
            }
        }

        let spec = match (spec, builtin.is_empty()) {
            (Some(spec), true) => spec,
            (None, false) => TypeSpec::Builtin(builtin),
            (Some(_), false) => return Err(self.error("declaration specifiers")),
            (None, true) => return Err(self.error("type specifier")),
        };
        Ok(Specifiers {
            storage,
            base: CType::Named { quals, spec },
        })
    }

    fn aggregate(&mut self, keyword: &str) -> Result<TypeSpec, ParseError> {
        let kind = match keyword {
            "struct" => AggregateKind::Struct,
            "union" => AggregateKind::Union,
            _ => AggregateKind::Enum,
        };
        self.skip_gnu_extensions()?;
        let tag = match self.peek() {
            Some(tok) if tok.is_ident() && !is_reserved(&tok.text) => {
                let tag = tok.text.clone();
                self.pos += 1;
                Some(tag)
            }
            _ => None,
        };
        let body = if self.at("{") {
            let start = self.pos;
            self.skip_balanced("{", "}")?;
            Some(self.slice(start, self.pos))
        } else {
            None
        };
        if tag.is_none() && body.is_none() {
            return Err(self.error(keyword));
        }
        Ok(TypeSpec::Aggregate { kind, tag, body })
    }

    /// Parse a (possibly abstract) declarator and apply it to `base`.
    fn declarator(&mut self, base: &CType) -> Result<(Option<String>, CType), ParseError> {
        let (name, ops) = self.declarator_ops()?;
        let ty = ops.into_iter().fold(base.clone(), |ty, op| match op {
            DeclaratorOp::Pointer(quals) => CType::Pointer {
                quals,
                pointee: Box::new(ty),
            },
            DeclaratorOp::Array(dim) => CType::array_of(ty, dim),
            DeclaratorOp::Function(params, variadic) => CType::Function {
                ret: Box::new(ty),
                params,
                variadic,
            },
        });
        Ok((name, ty))
    }

    fn declarator_ops(&mut self) -> Result<(Option<String>, Vec<DeclaratorOp>), ParseError> {
        let mut ops = Vec::new();
        while self.eat("*") {
            let mut quals = Vec::new();
            while let Some(tok) = self.peek() {
                if tok.is_ident() && QUALIFIERS.contains(&tok.text.as_str()) {
                    quals.push(tok.text.clone());
                    self.pos += 1;
                } else if tok.is_ident() && is_gnu_extension(&tok.text) {
                    self.skip_gnu_extensions()?;
                } else {
                    break;
                }
            }
            ops.push(DeclaratorOp::Pointer(quals));
        }

        let (name, inner) = if self.at("(") && self.peek_at(1).is_some_and(|t| t.is("*")) {
            self.pos += 1;
            let nested = self.declarator_ops()?;
            self.expect(")", "declarator")?;
            nested
        } else {
            match self.peek() {
                Some(tok) if tok.is_ident() && !is_reserved(&tok.text) && !is_gnu_extension(&tok.text) => {
                    let name = tok.text.clone();
                    self.pos += 1;
                    (Some(name), Vec::new())
                }
                _ => (None, Vec::new()),
            }
        };

        let mut suffixes = Vec::new();
        loop {
            if self.eat("[") {
                while self.peek().is_some_and(|t| t.is_keyword("static") || (t.is_ident() && QUALIFIERS.contains(&t.text.as_str()))) {
                    self.pos += 1;
                }
                let dim = if self.at("]") {
                    None
                } else {
                    Some(self.assignment()?)
                };
                self.expect("]", "array declarator")?;
                suffixes.push(DeclaratorOp::Array(dim));
            } else if self.eat("(") {
                let (params, variadic) = self.parameters()?;
                suffixes.push(DeclaratorOp::Function(params, variadic));
            } else {
                break;
            }
        }

        ops.extend(suffixes.into_iter().rev());
        ops.extend(inner);
        Ok((name, ops))
    }

    /// Parameter list after `(`, consuming the closing `)`.
    fn parameters(&mut self) -> Result<(Vec<Decl>, bool), ParseError> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.eat(")") {
            return Ok((params, variadic));
        }
        if self.at_keyword("void") && self.peek_at(1).is_some_and(|t| t.is(")")) {
            self.pos += 2;
            return Ok((params, variadic));
        }
        loop {
            if self.eat("...") {
                variadic = true;
                self.expect(")", "parameter list")?;
                return Ok((params, variadic));
            }
            let specs = self.specifiers()?;
            let (name, ty) = self.declarator(&specs.base)?;
            self.skip_gnu_extensions()?;
            params.push(Decl {
                name,
                storage: specs.storage,
                ty,
                init: None,
            });
            if self.eat(")") {
                return Ok((params, variadic));
            }
            self.expect(",", "parameter list")?;
        }
    }

    /// Remaining `, declarator [= init]` entries and the terminating `;`.
    fn declarator_list(&mut self, specs: &Specifiers, first: Decl) -> Result<Vec<Decl>, ParseError> {
        let mut decls = vec![first];
        while self.eat(",") {
            let (name, ty) = self.declarator(&specs.base)?;
            self.skip_gnu_extensions()?;
            let init = if self.eat("=") {
                Some(self.initializer()?)
            } else {
                None
            };
            decls.push(Decl {
                name,
                storage: specs.storage.clone(),
                ty,
                init,
            });
        }
        self.expect(";", "declaration")?;
        if specs.storage.iter().any(|s| s == "typedef") {
            self.typedefs
                .extend(decls.iter().filter_map(|d| d.name.clone()));
        }
        Ok(decls)
    }

    fn initializer(&mut self) -> Result<Expr, ParseError> {
        if !self.eat("{") {
            return self.assignment();
        }
        let mut items = Vec::new();
        while !self.eat("}") {
            items.push(self.initializer()?);
            if !self.eat(",") {
                self.expect("}", "initializer list")?;
                break;
            }
        }
        Ok(Expr::InitList(items))
    }

    fn type_name(&mut self) -> Result<CType, ParseError> {
        let specs = self.specifiers()?;
        let (name, ty) = self.declarator(&specs.base)?;
        if let Some(name) = name {
            return Err(ParseError::Syntax {
                line: self.last_line(),
                message: format!("unexpected name '{name}' in type name"),
            });
        }
        Ok(ty)
    }

    /// Whether the tokens at `index` begin a type name (used after `(`).
    fn type_name_follows(&self, index: usize) -> bool {
        let Some(tok) = self.tokens.get(index) else {
            return false;
        };
        if !tok.is_ident() {
            return false;
        }
        let word = tok.text.as_str();
        if QUALIFIERS.contains(&word)
            || BUILTIN_TYPES.contains(&word)
            || matches!(word, "struct" | "union" | "enum")
            || self.typedefs.contains(word)
        {
            return true;
        }
        if is_reserved(word) {
            return false;
        }
        // `(name *)` and `(name **)` read as casts to an unknown typedef.
        let mut i = index + 1;
        let mut stars = 0;
        while self.tokens.get(i).is_some_and(|t| t.is("*")) {
            stars += 1;
            i += 1;
        }
        stars > 0 && self.tokens.get(i).is_some_and(|t| t.is(")"))
    }

    fn skip_gnu_extensions(&mut self) -> Result<(), ParseError> {
        while let Some(tok) = self.peek() {
            match tok.text.as_str() {
                "__extension__" if tok.is_ident() => self.pos += 1,
                "__attribute__" | "__attribute" | "__asm__" | "__asm" | "asm" if tok.is_ident() => {
                    self.pos += 1;
                    while self.at_keyword("volatile") || self.at_keyword("__volatile__") {
                        self.pos += 1;
                    }
                    self.skip_balanced("(", ")")?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_balanced(&mut self, open: &str, close: &str) -> Result<(), ParseError> {
        self.expect(open, open)?;
        let mut depth = 1usize;
        while depth > 0 {
            let tok = self.advance(close)?;
            if tok.is(open) {
                depth += 1;
            } else if tok.is(close) {
                depth -= 1;
            }
        }
        Ok(())
    }

    // ── Statements ───────────────────────────────────────────────────

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        let start = self.pos;
        if self.starts_structured_statement() {
            let attempt = if self.starts_declaration() {
                self.declaration_statement()
            } else {
                self.expression_statement()
            };
            match attempt {
                Ok(stmts) => {
                    out.extend(stmts);
                    return Ok(());
                }
                Err(_) => self.pos = start,
            }
        }
        self.skip_statement()?;
        out.push(Stmt::Opaque(self.slice(start, self.pos)));
        Ok(())
    }

    fn starts_structured_statement(&self) -> bool {
        match self.peek() {
            None => false,
            Some(tok) if tok.is("{") || tok.is(";") => false,
            Some(tok) if tok.is_ident() => {
                !STATEMENT_KEYWORDS.contains(&tok.text.as_str())
                    && !self.peek_at(1).is_some_and(|t| t.is(":"))
            }
            Some(_) => true,
        }
    }

    fn starts_declaration(&self) -> bool {
        let Some(tok) = self.peek() else {
            return false;
        };
        if !tok.is_ident() {
            return false;
        }
        let word = tok.text.as_str();
        if STORAGE.contains(&word)
            || QUALIFIERS.contains(&word)
            || BUILTIN_TYPES.contains(&word)
            || matches!(word, "struct" | "union" | "enum" | "__extension__")
            || self.typedefs.contains(word)
        {
            return true;
        }
        if is_reserved(word) {
            return false;
        }
        // `name x ...` or `name *x = ...` with an unknown typedef `name`.
        let mut i = 1;
        while self.peek_at(i).is_some_and(|t| t.is("*")) {
            i += 1;
        }
        let declares = self
            .peek_at(i)
            .is_some_and(|t| t.is_ident() && !is_reserved(&t.text));
        let terminated = self
            .peek_at(i + 1)
            .is_some_and(|t| t.is("=") || t.is(";") || t.is(",") || t.is("["));
        declares && (i == 1 || terminated)
    }

    fn declaration_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let specs = self.specifiers()?;
        let (name, ty) = self.declarator(&specs.base)?;
        self.skip_gnu_extensions()?;
        if name.is_none() {
            return Err(self.error("declaration"));
        }
        let init = if self.eat("=") {
            Some(self.initializer()?)
        } else {
            None
        };
        let first = Decl {
            name,
            storage: specs.storage.clone(),
            ty,
            init,
        };
        let decls = self.declarator_list(&specs, first)?;
        Ok(decls.into_iter().map(Stmt::Decl).collect())
    }

    fn expression_statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let expr = self.expression()?;
        self.expect(";", "expression statement")?;
        Ok(vec![Stmt::Expr(expr)])
    }

    /// Advance over one statement without building a tree.
    fn skip_statement(&mut self) -> Result<(), ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.error("statement"));
        };
        if tok.is("{") {
            return self.skip_balanced("{", "}");
        }
        if tok.is(";") {
            self.pos += 1;
            return Ok(());
        }
        if tok.is_ident() {
            match tok.text.as_str() {
                "if" => {
                    self.pos += 1;
                    self.skip_balanced("(", ")")?;
                    self.skip_statement()?;
                    if self.at_keyword("else") {
                        self.pos += 1;
                        self.skip_statement()?;
                    }
                    return Ok(());
                }
                "for" | "while" | "switch" => {
                    self.pos += 1;
                    self.skip_balanced("(", ")")?;
                    return self.skip_statement();
                }
                "do" => {
                    self.pos += 1;
                    self.skip_statement()?;
                    if !self.at_keyword("while") {
                        return Err(self.error("do statement"));
                    }
                    self.pos += 1;
                    self.skip_balanced("(", ")")?;
                    return self.expect(";", "do statement");
                }
                "case" | "default" => {
                    while !self.eat(":") {
                        self.advance("case label")?;
                    }
                    return self.skip_statement();
                }
                _ if self.peek_at(1).is_some_and(|t| t.is(":")) => {
                    self.pos += 2;
                    return self.skip_statement();
                }
                _ => {}
            }
        }

        let mut depth = 0usize;
        loop {
            let tok = self.advance("statement")?;
            if tok.is("(") || tok.is("[") || tok.is("{") {
                depth += 1;
            } else if tok.is(")") || tok.is("]") || tok.is("}") {
                depth = depth.saturating_sub(1);
            } else if tok.is(";") && depth == 0 {
                return Ok(());
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.assignment()?;
        while self.eat(",") {
            let rhs = self.assignment()?;
            lhs = Expr::binary(BinaryOp::Comma, lhs, rhs);
        }
        Ok(lhs)
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.conditional()?;
        let op = self
            .peek()
            .filter(|t| t.kind == TokenKind::Punct)
            .and_then(|t| BinaryOp::from_assignment(&t.text));
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.assignment()?;
                Ok(Expr::binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.binary(4)?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(":", "conditional expression")?;
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.cast()?;
        loop {
            let op = self
                .peek()
                .filter(|t| t.kind == TokenKind::Punct)
                .and_then(|t| BinaryOp::from_infix(&t.text));
            let Some(op) = op else { break };
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(precedence + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn cast(&mut self) -> Result<Expr, ParseError> {
        if self.at("(") && self.type_name_follows(self.pos + 1) {
            self.pos += 1;
            let ty = self.type_name()?;
            self.expect(")", "cast")?;
            if self.at("{") {
                return Err(self.error("cast (compound literals are not supported)"));
            }
            let expr = self.cast()?;
            return Ok(Expr::Cast {
                ty,
                expr: Box::new(expr),
            });
        }
        self.unary()
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.error("expression"));
        };
        if tok.is_keyword("sizeof") {
            self.pos += 1;
            if self.at("(") && self.type_name_follows(self.pos + 1) {
                self.pos += 1;
                let ty = self.type_name()?;
                self.expect(")", "sizeof")?;
                return Ok(Expr::size_of(Expr::TypeName(ty)));
            }
            let operand = self.unary()?;
            return Ok(Expr::size_of(operand));
        }
        if tok.kind == TokenKind::Punct {
            let op = match tok.text.as_str() {
                "++" => Some((UnaryOp::PreInc, false)),
                "--" => Some((UnaryOp::PreDec, false)),
                "&" => Some((UnaryOp::AddrOf, true)),
                "*" => Some((UnaryOp::Deref, true)),
                "+" => Some((UnaryOp::Plus, true)),
                "-" => Some((UnaryOp::Neg, true)),
                "~" => Some((UnaryOp::BitNot, true)),
                "!" => Some((UnaryOp::Not, true)),
                _ => None,
            };
            if let Some((op, takes_cast)) = op {
                self.pos += 1;
                let operand = if takes_cast {
                    self.cast()?
                } else {
                    self.unary()?
                };
                return Ok(Expr::unary(op, operand));
            }
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat("[") {
                let index = self.expression()?;
                self.expect("]", "subscript")?;
                expr = Expr::index(expr, index);
            } else if self.eat("(") {
                let args = self.call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.at(".") || self.at("->") {
                let arrow = self.at("->");
                self.pos += 1;
                let field = self.advance("member access")?;
                if !field.is_ident() {
                    return Err(ParseError::Syntax {
                        line: field.line,
                        message: format!("expected member name, found '{}'", field.text),
                    });
                }
                expr = Expr::Member {
                    base: Box::new(expr),
                    field: field.text,
                    arrow,
                };
            } else if self.eat("++") {
                expr = Expr::Postfix {
                    op: PostfixOp::Inc,
                    operand: Box::new(expr),
                };
            } else if self.eat("--") {
                expr = Expr::Postfix {
                    op: PostfixOp::Dec,
                    operand: Box::new(expr),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after `(`, consuming the closing `)`. An argument may be a
    /// bare type name, as in unexpanded `SYMBOLIC(int)`.
    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            let start = self.pos;
            let mut arg = None;
            if self.type_name_follows(self.pos) {
                if let Ok(ty) = self.type_name() {
                    if self.at(",") || self.at(")") {
                        arg = Some(Expr::TypeName(ty));
                    }
                }
                if arg.is_none() {
                    self.pos = start;
                }
            }
            let arg = match arg {
                Some(arg) => arg,
                None => self.assignment()?,
            };
            args.push(arg);
            if self.eat(")") {
                return Ok(args);
            }
            self.expect(",", "argument list")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance("expression")?;
        match tok.kind {
            TokenKind::Ident if !is_reserved(&tok.text) => Ok(Expr::Ident(tok.text)),
            TokenKind::Number | TokenKind::CharLit => Ok(Expr::Constant(tok.text)),
            TokenKind::StrLit => {
                let mut text = tok.text;
                while self.peek().is_some_and(|t| t.kind == TokenKind::StrLit) {
                    let next = self.advance("string literal")?;
                    text.push(' ');
                    text.push_str(&next.text);
                }
                Ok(Expr::StringLit(text))
            }
            TokenKind::Punct if tok.text == "(" => {
                let inner = self.expression()?;
                self.expect(")", "parenthesized expression")?;
                Ok(inner)
            }
            _ => Err(ParseError::Syntax {
                line: tok.line,
                message: format!("unexpected '{}' in expression", tok.text),
            }),
        }
    }
}

/// Contents of a plain string literal with `\"` and `\\` unescaped.
fn unquote(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
