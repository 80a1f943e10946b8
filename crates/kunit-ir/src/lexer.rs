//! C tokenizer.
//!
//! Comments are dropped and preprocessor directive lines are skipped whole
//! (including `\` continuations). Every token keeps its 1-based line and byte
//! span so callers can slice the original text back out.

use crate::parse::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    CharLit,
    StrLit,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    /// Byte range in the source this token came from. Tokens produced by macro
    /// expansion carry the span of the whole invocation.
    pub span: (usize, usize),
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == keyword
    }
}

const PUNCTUATORS: &[&str] = &[
    "...", "<<=", ">>=", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "*=",
    "/=", "%=", "+=", "-=", "&=", "^=", "|=", "##",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    let mut at_line_start = true;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c == b'\n' {
            line += 1;
            pos += 1;
            at_line_start = true;
            continue;
        }
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c == b'#' && at_line_start {
            // Directive: skip to the end of the logical line.
            while pos < bytes.len() && bytes[pos] != b'\n' {
                if bytes[pos] == b'\\' && bytes.get(pos + 1) == Some(&b'\n') {
                    line += 1;
                    pos += 2;
                    continue;
                }
                pos += 1;
            }
            continue;
        }
        at_line_start = false;

        if c == b'/' && bytes.get(pos + 1) == Some(&b'/') {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        if c == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            let start_line = line;
            pos += 2;
            loop {
                if pos + 1 >= bytes.len() {
                    return Err(ParseError::Syntax {
                        line: start_line,
                        message: "unterminated block comment".to_string(),
                    });
                }
                if bytes[pos] == b'*' && bytes[pos + 1] == b'/' {
                    pos += 2;
                    break;
                }
                if bytes[pos] == b'\n' {
                    line += 1;
                }
                pos += 1;
            }
            continue;
        }

        let start = pos;

        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let word = &source[start..pos];
            // Encoding prefixes glue onto the literal that follows.
            if matches!(word, "L" | "u" | "U" | "u8") {
                if let Some(&quote @ (b'"' | b'\'')) = bytes.get(pos) {
                    pos = scan_quoted(bytes, pos, quote, line)?;
                    let kind = if quote == b'"' {
                        TokenKind::StrLit
                    } else {
                        TokenKind::CharLit
                    };
                    tokens.push(token(kind, source, start, pos, line));
                    continue;
                }
            }
            tokens.push(token(TokenKind::Ident, source, start, pos, line));
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let is_hex = source[start..].starts_with("0x") || source[start..].starts_with("0X");
            while pos < bytes.len() {
                let b = bytes[pos];
                let prev = if pos > start { bytes[pos - 1] } else { 0 };
                let exponent_sign = (b == b'+' || b == b'-')
                    && ((!is_hex && matches!(prev, b'e' | b'E'))
                        || (is_hex && matches!(prev, b'p' | b'P')));
                if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign {
                    pos += 1;
                } else {
                    break;
                }
            }
            tokens.push(token(TokenKind::Number, source, start, pos, line));
            continue;
        }

        if c == b'"' || c == b'\'' {
            pos = scan_quoted(bytes, pos, c, line)?;
            let kind = if c == b'"' {
                TokenKind::StrLit
            } else {
                TokenKind::CharLit
            };
            tokens.push(token(kind, source, start, pos, line));
            continue;
        }

        if let Some(p) = PUNCTUATORS
            .iter()
            .find(|p| source[pos..].starts_with(**p))
        {
            pos += p.len();
            tokens.push(token(TokenKind::Punct, source, start, pos, line));
            continue;
        }

        if b"{}[]();,:?~!%^&*-+=|<>/.".contains(&c) {
            pos += 1;
            tokens.push(token(TokenKind::Punct, source, start, pos, line));
            continue;
        }

        return Err(ParseError::Syntax {
            line,
            message: format!("unexpected character '{}'", source[pos..].chars().next().unwrap_or('?')),
        });
    }

    Ok(tokens)
}

/// Returns the position just past the closing quote.
fn scan_quoted(bytes: &[u8], open: usize, quote: u8, line: usize) -> Result<usize, ParseError> {
    let mut pos = open + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' => break,
            b if b == quote => return Ok(pos + 1),
            _ => pos += 1,
        }
    }
    Err(ParseError::Syntax {
        line,
        message: "unterminated literal".to_string(),
    })
}

fn token(kind: TokenKind, source: &str, start: usize, end: usize, line: usize) -> Token {
    Token {
        kind,
        text: source[start..end].to_string(),
        line,
        span: (start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_comments_and_directives() {
        let src = "#include <stdio.h>\n#define X \\\n  1\n/* c\n */ int x; // tail\n";
        let tokens = tokenize(src).unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["int", "x", ";"]);
        assert_eq!(tokens[0].line, 5);
    }

    #[test]
    fn test_longest_punctuator_wins() {
        let tokens = tokenize("a <<= b->c ... d").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "<<=", "b", "->", "c", "...", "d"]);
    }

    #[test]
    fn test_numbers_and_literals() {
        let tokens = tokenize(r#"0x1Fu 1.5e-3 'a' "s\"q" L"w""#).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::CharLit,
                TokenKind::StrLit,
                TokenKind::StrLit
            ]
        );
        assert_eq!(tokens[1].text, "1.5e-3");
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(tokenize("int x; /* never closed").is_err());
    }
}
