//! Lua 5.3 tokenizer.
//!
//! Built on `logos`. Long brackets (`[==[ ... ]==]`) and comments cannot be
//! described by a regular expression, so they are matched by their opening
//! delimiter and finished by a callback that scans for the closing one.

use std::ops::Range;

use logos::{Lexer, Logos};

use crate::codec::decode_byte;
use crate::error::{FormatError, Result};
use crate::node::Position;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\x0B\x0C]+")]
pub enum Token {
    #[token("--", comment)]
    Comment,

    // === Keywords ===
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    // === Symbols ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("&")]
    Amp,
    #[token("~")]
    Tilde,
    #[token("|")]
    Pipe,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqEq,
    #[token("~=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("::")]
    DoubleColon,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    Ellipsis,

    // === Literals ===
    #[regex(r"0[xX]([0-9a-fA-F]+(\.[0-9a-fA-F]*)?|\.[0-9a-fA-F]+)([pP][+-]?[0-9]+)?")]
    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    #[regex(r"'([^'\\]|\\(.|\n))*'")]
    String,

    #[regex(r"\[=*\[", long_string)]
    LongString,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name,
}

impl Token {
    /// Token that opens a binary operator, with its Lua spelling.
    pub fn binary_operator(self) -> Option<&'static str> {
        Some(match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Amp => "&",
            Token::Tilde => "~",
            Token::Pipe => "|",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::DotDot => "..",
            Token::EqEq => "==",
            Token::NotEq => "~=",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::And => "and",
            Token::Or => "or",
            _ => return None,
        })
    }

    pub fn unary_operator(self) -> Option<&'static str> {
        Some(match self {
            Token::Not => "not",
            Token::Minus => "-",
            Token::Tilde => "~",
            Token::Hash => "#",
            _ => return None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LONG BRACKETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Level of the long bracket opening `s`, if `s` starts with one.
pub(crate) fn long_bracket_level(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|&&b| b == b'=').count();
    (bytes.get(level + 1) == Some(&b'[')).then_some(level)
}

/// Length of `s` up to and including the long bracket closing `level`.
fn long_bracket_end(s: &str, level: usize) -> Option<usize> {
    let close = format!("]{}]", "=".repeat(level));
    s.find(&close).map(|at| at + close.len())
}

fn long_string(lex: &mut Lexer<Token>) -> bool {
    let level = lex.slice().len() - 2;
    match long_bracket_end(lex.remainder(), level) {
        Some(len) => {
            lex.bump(len);
            true
        }
        None => false,
    }
}

fn comment(lex: &mut Lexer<Token>) -> bool {
    let rest = lex.remainder();
    if let Some(level) = long_bracket_level(rest) {
        let open = level + 2;
        return match long_bracket_end(&rest[open..], level) {
            Some(len) => {
                lex.bump(open + len);
                true
            }
            None => false,
        };
    }
    let len = rest.find('\n').unwrap_or(rest.len());
    lex.bump(len);
    true
}

/// Content of a long bracket token, without delimiters and without the
/// newline that may follow the opening bracket.
pub fn long_bracket_content(raw: &str) -> &str {
    let level = long_bracket_level(raw).unwrap_or(0);
    let open = level + 2;
    let close = level + 2;
    if raw.len() < open + close {
        return "";
    }
    let inner = &raw[open..raw.len() - close];
    inner
        .strip_prefix("\r\n")
        .or_else(|| inner.strip_prefix('\n'))
        .or_else(|| inner.strip_prefix('\r'))
        .unwrap_or(inner)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LITERAL VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Decodes the escapes of a quoted string token, quotes included.
pub fn string_value(raw: &str) -> std::result::Result<String, String> {
    let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            return Err("unfinished escape sequence".to_string());
        };
        match escape {
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'n' | '\n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0B'),
            '\\' | '"' | '\'' => out.push(escape),
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push('\n');
            }
            'z' => {
                while chars.next_if(|c| c.is_ascii_whitespace() || *c == '\x0B').is_some() {}
            }
            'x' => {
                let hex: String = (0..2).filter_map(|_| chars.next_if(char::is_ascii_hexdigit)).collect();
                let byte = u8::from_str_radix(&hex, 16).map_err(|_| format!("invalid hex escape '\\x{hex}'"))?;
                out.push(decode_byte(byte));
            }
            'u' => {
                if chars.next_if_eq(&'{').is_none() {
                    return Err("missing '{' in \\u{xxxx}".to_string());
                }
                let hex: String = std::iter::from_fn(|| chars.next_if(char::is_ascii_hexdigit)).collect();
                if chars.next_if_eq(&'}').is_none() {
                    return Err("missing '}' in \\u{xxxx}".to_string());
                }
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape '\\u{{{hex}}}'"))?;
                let mut buf = [0u8; 4];
                out.extend(code.encode_utf8(&mut buf).bytes().map(decode_byte));
            }
            d if d.is_ascii_digit() => {
                let mut value = d.to_digit(10).unwrap_or(0);
                for _ in 0..2 {
                    match chars.next_if(char::is_ascii_digit) {
                        Some(next) => value = value * 10 + next.to_digit(10).unwrap_or(0),
                        None => break,
                    }
                }
                let byte = u8::try_from(value).map_err(|_| format!("decimal escape too large '\\{value}'"))?;
                out.push(decode_byte(byte));
            }
            other => return Err(format!("invalid escape sequence '\\{other}'")),
        }
    }
    Ok(out)
}

/// Numeric value of a Lua numeral, hexadecimal floats included.
pub fn numeral_value(raw: &str) -> Option<f64> {
    let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
        return raw.parse::<f64>().ok();
    };

    let (mantissa, exponent) = match hex.find(['p', 'P']) {
        Some(at) => (&hex[..at], hex[at + 1..].parse::<i32>().ok()?),
        None => (hex, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0f64;
    for digit in int_part.chars() {
        value = value * 16.0 + digit.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for digit in frac_part.chars() {
        value += digit.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exponent))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN STREAM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Range<usize>,
}

/// Byte offsets of line starts, for turning spans into positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    /// Lines made of ASCII only, where columns are byte distances.
    ascii: Vec<bool>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let starts: Vec<usize> = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        let ascii = starts
            .iter()
            .enumerate()
            .map(|(line, &start)| {
                let end = starts.get(line + 1).copied().unwrap_or(source.len());
                source.as_bytes()[start..end].is_ascii()
            })
            .collect();
        LineIndex { starts, ascii }
    }

    /// 1-based line, 0-based column (in chars) of a byte offset.
    pub fn position(&self, source: &str, offset: usize) -> Position {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let start = self.starts[line - 1];
        let column = if self.ascii[line - 1] {
            offset.saturating_sub(start).min(source.len() - start)
        } else {
            source.get(start..offset).map_or(0, |s| s.chars().count())
        };
        Position {
            line: line as u32,
            column: column as u32,
        }
    }
}

/// Tokenizes `source`; a leading `#!` line is ignored.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>> {
    let skip = if source.starts_with('#') {
        source.find('\n').unwrap_or(source.len())
    } else {
        0
    };

    let mut lexer = Token::lexer(&source[skip..]);
    let mut out = Vec::new();
    while let Some(token) = lexer.next() {
        let span = lexer.span().start + skip..lexer.span().end + skip;
        match token {
            Ok(token) => out.push(Lexeme { token, span }),
            Err(()) => {
                let at = LineIndex::new(source).position(source, span.start);
                let text = source.get(span.clone()).unwrap_or_default();
                return Err(FormatError::syntax(at.line, at.column, format!("unexpected symbol near '{text}'")));
            }
        }
    }
    Ok(out)
}
