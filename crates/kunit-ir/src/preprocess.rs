//! `#define` expansion for a caller-supplied macro table.
//!
//! Only object-like and function-like macros are supported (no `#`/`##`,
//! no conditionals). Expanded tokens inherit the line and span of the
//! invocation so source slicing and line bookkeeping stay on the original text.

use std::collections::HashMap;

use crate::lexer::{tokenize, Token, TokenKind};
use crate::parse::ParseError;

#[derive(Debug, Clone, PartialEq)]
struct Macro {
    params: Option<Vec<String>>,
    body: Vec<Token>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `#define` in a header text.
    pub fn from_header(header: &str) -> Result<Self, ParseError> {
        let mut table = Self::new();
        let mut logical = String::new();
        let mut first_line = 0;
        for (index, raw) in header.lines().enumerate() {
            if logical.is_empty() {
                first_line = index + 1;
            }
            if let Some(head) = raw.strip_suffix('\\') {
                logical.push_str(head);
                logical.push(' ');
                continue;
            }
            logical.push_str(raw);
            let line = std::mem::take(&mut logical);
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                if let Some(definition) = directive.trim_start().strip_prefix("define") {
                    if definition.starts_with(char::is_whitespace) {
                        table
                            .define(definition.trim_start())
                            .map_err(|e| e.at_line(first_line))?;
                    }
                }
            }
        }
        Ok(table)
    }

    /// Define one macro from the text following `#define`, e.g. `MAX(a, b) ((a) > (b) ? (a) : (b))`.
    pub fn define(&mut self, definition: &str) -> Result<(), ParseError> {
        let name_len = definition
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(definition.len());
        if name_len == 0 {
            return Err(ParseError::Macro {
                line: 1,
                message: format!("missing macro name in '{definition}'"),
            });
        }
        let name = definition[..name_len].to_string();
        let rest = &definition[name_len..];

        let (params, body_text) = if let Some(after_paren) = rest.strip_prefix('(') {
            let close = after_paren.find(')').ok_or_else(|| ParseError::Macro {
                line: 1,
                message: format!("unterminated parameter list for macro '{name}'"),
            })?;
            let params: Vec<String> = after_paren[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            (Some(params), &after_paren[close + 1..])
        } else {
            (None, rest)
        };

        let body = tokenize(body_text)?;
        self.macros.insert(name, Macro { params, body });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Expand every macro invocation in `tokens`, rescanning the results.
    pub fn expand(&self, tokens: Vec<Token>) -> Result<Vec<Token>, ParseError> {
        if self.macros.is_empty() {
            return Ok(tokens);
        }
        let mut out = Vec::with_capacity(tokens.len());
        let mut hidden = Vec::new();
        self.expand_into(&tokens, &mut hidden, &mut out)?;
        Ok(out)
    }

    fn expand_into(
        &self,
        tokens: &[Token],
        hidden: &mut Vec<String>,
        out: &mut Vec<Token>,
    ) -> Result<(), ParseError> {
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            let found = if tok.kind == TokenKind::Ident && !hidden.contains(&tok.text) {
                self.macros.get(&tok.text)
            } else {
                None
            };
            let Some(mac) = found else {
                out.push(tok.clone());
                i += 1;
                continue;
            };

            match &mac.params {
                None => {
                    let body = retag(&mac.body, tok.line, tok.span);
                    hidden.push(tok.text.clone());
                    self.expand_into(&body, hidden, out)?;
                    hidden.pop();
                    i += 1;
                }
                Some(params) => {
                    // A function-like macro name without arguments is left alone.
                    if !tokens.get(i + 1).is_some_and(|t| t.is("(")) {
                        out.push(tok.clone());
                        i += 1;
                        continue;
                    }
                    let (mut args, next) = collect_args(tokens, i + 2, tok)?;
                    if params.is_empty() && args.len() == 1 && args[0].is_empty() {
                        args.clear();
                    }
                    if args.len() != params.len() {
                        return Err(ParseError::Macro {
                            line: tok.line,
                            message: format!(
                                "macro '{}' expects {} argument(s), got {}",
                                tok.text,
                                params.len(),
                                args.len()
                            ),
                        });
                    }
                    let span = (tok.span.0, tokens[next - 1].span.1);

                    let mut expanded_args = Vec::with_capacity(args.len());
                    for arg in args {
                        let mut expanded = Vec::new();
                        self.expand_into(arg, hidden, &mut expanded)?;
                        expanded_args.push(expanded);
                    }

                    let mut substituted = Vec::new();
                    for body_tok in &mac.body {
                        let param_index = if body_tok.kind == TokenKind::Ident {
                            params.iter().position(|p| *p == body_tok.text)
                        } else {
                            None
                        };
                        match param_index {
                            Some(index) => substituted.extend(retag(&expanded_args[index], tok.line, span)),
                            None => substituted.extend(retag(std::slice::from_ref(body_tok), tok.line, span)),
                        }
                    }

                    hidden.push(tok.text.clone());
                    self.expand_into(&substituted, hidden, out)?;
                    hidden.pop();
                    i = next;
                }
            }
        }
        Ok(())
    }
}

/// Split a parenthesized argument list starting just after `(`. Returns the
/// arguments and the index just past the closing `)`.
fn collect_args<'a>(
    tokens: &'a [Token],
    start: usize,
    name: &Token,
) -> Result<(Vec<&'a [Token]>, usize), ParseError> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut arg_start = start;
    let mut i = start;
    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is("(") || tok.is("[") || tok.is("{") {
            depth += 1;
        } else if tok.is(")") && depth == 0 {
            args.push(&tokens[arg_start..i]);
            return Ok((args, i + 1));
        } else if tok.is(")") || tok.is("]") || tok.is("}") {
            depth = depth.saturating_sub(1);
        } else if tok.is(",") && depth == 0 {
            args.push(&tokens[arg_start..i]);
            arg_start = i + 1;
        }
        i += 1;
    }
    Err(ParseError::Macro {
        line: name.line,
        message: format!("unterminated invocation of macro '{}'", name.text),
    })
}

fn retag(tokens: &[Token], line: usize, span: (usize, usize)) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| Token {
            kind: t.kind,
            text: t.text.clone(),
            line,
            span,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn test_function_like_macro_substitutes_arguments() {
        let table = MacroTable::from_header("#define TWICE(x) ((x) + (x))\n").unwrap();
        let out = table.expand(tokenize("y = TWICE(a * 2);").unwrap()).unwrap();
        assert_eq!(
            texts(&out).join(" "),
            "y = ( ( a * 2 ) + ( a * 2 ) ) ;"
        );
    }

    #[test]
    fn test_object_like_macro_and_rescan() {
        let mut table = MacroTable::new();
        table.define("ZERO {0}").unwrap();
        table.define("INIT(x) x = ZERO").unwrap();
        let out = table.expand(tokenize("int a INIT(a);").unwrap()).unwrap();
        assert_eq!(texts(&out).join(" "), "int a a = { 0 } ;");
    }

    #[test]
    fn test_expansion_keeps_invocation_line_and_span() {
        let table = MacroTable::from_header("#define ID(x) x\n").unwrap();
        let src = "\n\nint v = ID(3);";
        let out = table.expand(tokenize(src).unwrap()).unwrap();
        let three = out.iter().find(|t| t.text == "3").unwrap();
        assert_eq!(three.line, 3);
        assert_eq!(&src[three.span.0..three.span.1], "ID(3)");
    }

    #[test]
    fn test_wrong_argument_count_is_error() {
        let table = MacroTable::from_header("#define PAIR(a, b) a b\n").unwrap();
        assert!(table.expand(tokenize("PAIR(1)").unwrap()).is_err());
    }

    #[test]
    fn test_self_reference_does_not_loop() {
        let table = MacroTable::from_header("#define foo foo + 1\n").unwrap();
        let out = table.expand(tokenize("foo").unwrap()).unwrap();
        assert_eq!(texts(&out), vec!["foo", "+", "1"]);
    }
}
