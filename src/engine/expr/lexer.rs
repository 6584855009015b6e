use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::time::Duration;

use crate::engine::expr::ExprError;
use crate::util::duration::parse_duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Duration(Duration),
    Bytes(u64),
    String(String),
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Assign,
    Eql,
    Neq,
    RegexMatch,
    RegexNotMatch,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    At,
    Pipe,
    PipeExact,
    PipeRegex,
    PipePattern,
    PatternNotMatch,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "identifier \"{name}\""),
            Self::Number(value) => write!(f, "number \"{value}\""),
            Self::Duration(_) => f.write_str("duration"),
            Self::Bytes(_) => f.write_str("bytes"),
            Self::String(value) => write!(f, "string {value:?}"),
            Self::LeftParen => f.write_str("\"(\""),
            Self::RightParen => f.write_str("\")\""),
            Self::LeftBrace => f.write_str("\"{\""),
            Self::RightBrace => f.write_str("\"}\""),
            Self::LeftBracket => f.write_str("\"[\""),
            Self::RightBracket => f.write_str("\"]\""),
            Self::Comma => f.write_str("\",\""),
            Self::Colon => f.write_str("\":\""),
            Self::Assign => f.write_str("\"=\""),
            Self::Eql => f.write_str("\"==\""),
            Self::Neq => f.write_str("\"!=\""),
            Self::RegexMatch => f.write_str("\"=~\""),
            Self::RegexNotMatch => f.write_str("\"!~\""),
            Self::Lt => f.write_str("\"<\""),
            Self::Lte => f.write_str("\"<=\""),
            Self::Gt => f.write_str("\">\""),
            Self::Gte => f.write_str("\">=\""),
            Self::Add => f.write_str("\"+\""),
            Self::Sub => f.write_str("\"-\""),
            Self::Mul => f.write_str("\"*\""),
            Self::Div => f.write_str("\"/\""),
            Self::Mod => f.write_str("\"%\""),
            Self::Pow => f.write_str("\"^\""),
            Self::At => f.write_str("\"@\""),
            Self::Pipe => f.write_str("\"|\""),
            Self::PipeExact => f.write_str("\"|=\""),
            Self::PipeRegex => f.write_str("\"|~\""),
            Self::PipePattern => f.write_str("\"|>\""),
            Self::PatternNotMatch => f.write_str("\"!>\""),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Splits an expression into tokens, always ending with [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    bracket_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            bracket_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ExprError> {
        while let Some((offset, c)) = self.chars.next() {
            let kind = match c {
                c if c.is_whitespace() => continue,
                '#' => {
                    self.skip_comment();
                    continue;
                }
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                '[' => {
                    self.bracket_depth += 1;
                    TokenKind::LeftBracket
                }
                ']' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    TokenKind::RightBracket
                }
                ',' => TokenKind::Comma,
                ':' if self.bracket_depth > 0 => TokenKind::Colon,
                '+' => TokenKind::Add,
                '-' => TokenKind::Sub,
                '*' => TokenKind::Mul,
                '/' => TokenKind::Div,
                '%' => TokenKind::Mod,
                '^' => TokenKind::Pow,
                '@' => TokenKind::At,
                '=' => {
                    if self.eat('=') {
                        TokenKind::Eql
                    } else if self.eat('~') {
                        TokenKind::RegexMatch
                    } else {
                        TokenKind::Assign
                    }
                }
                '!' => {
                    if self.eat('=') {
                        TokenKind::Neq
                    } else if self.eat('~') {
                        TokenKind::RegexNotMatch
                    } else if self.eat('>') {
                        TokenKind::PatternNotMatch
                    } else {
                        return Err(self.error(offset, "unexpected character after \"!\""));
                    }
                }
                '<' => {
                    if self.eat('=') {
                        TokenKind::Lte
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    if self.eat('=') {
                        TokenKind::Gte
                    } else {
                        TokenKind::Gt
                    }
                }
                '|' => {
                    if self.eat('=') {
                        TokenKind::PipeExact
                    } else if self.eat('~') {
                        TokenKind::PipeRegex
                    } else if self.eat('>') {
                        TokenKind::PipePattern
                    } else {
                        TokenKind::Pipe
                    }
                }
                '"' | '\'' => TokenKind::String(self.quoted_string(offset, c)?),
                '`' => TokenKind::String(self.raw_string(offset)?),
                c if c.is_ascii_digit() => self.number_or_duration(offset)?,
                '.' if self.peek_is(|next| next.is_ascii_digit()) => {
                    self.number_or_duration(offset)?
                }
                c if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
                    TokenKind::Ident(self.identifier(offset))
                }
                other => {
                    return Err(self.error(offset, format!("unexpected character: {other:?}")));
                }
            };
            self.tokens.push(Token { kind, offset });
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.input.len(),
        });
        Ok(self.tokens)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_is(|c| c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn peek_is(&mut self, predicate: impl Fn(char) -> bool) -> bool {
        self.chars.peek().is_some_and(|(_, c)| predicate(*c))
    }

    fn skip_comment(&mut self) {
        while let Some((_, c)) = self.chars.next() {
            if c == '\n' {
                break;
            }
        }
    }

    fn take_while(&mut self, start: usize, predicate: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let mut end = start;
        while let Some(&(offset, c)) = self.chars.peek() {
            if !predicate(c) {
                break;
            }
            end = offset + c.len_utf8();
            self.chars.next();
        }
        &input[start..end]
    }

    fn identifier(&mut self, start: usize) -> String {
        let in_brackets = self.bracket_depth > 0;
        let rest_start = start + 1;
        let rest = self.take_while(rest_start, |c| {
            c.is_ascii_alphanumeric() || c == '_' || (c == ':' && !in_brackets)
        });
        format!("{}{rest}", &self.input[start..rest_start])
    }

    fn number_or_duration(&mut self, start: usize) -> Result<TokenKind, ExprError> {
        let first = &self.input[start..start + 1];
        let rest = self.take_while(start + 1, |c| {
            c.is_ascii_alphanumeric() || c == '.' || c == '_'
        });
        let mut literal = format!("{first}{rest}");

        // exponent sign, e.g. `1e-3`
        if (literal.ends_with('e') || literal.ends_with('E'))
            && !literal.starts_with("0x")
            && self.peek_is(|c| c == '+' || c == '-')
        {
            if let Some((_, sign)) = self.chars.next() {
                literal.push(sign);
                let digits = self.take_while(start + literal.len(), |c| c.is_ascii_digit());
                literal.push_str(digits);
            }
        }

        classify_numeric(&literal).ok_or_else(|| {
            self.error(start, format!("bad number or duration syntax: {literal:?}"))
        })
    }

    fn quoted_string(&mut self, start: usize, quote: char) -> Result<String, ExprError> {
        let mut value = String::new();
        loop {
            let Some((offset, c)) = self.chars.next() else {
                return Err(self.error(start, "unterminated quoted string"));
            };
            match c {
                c if c == quote => return Ok(value),
                '\n' => return Err(self.error(offset, "unterminated quoted string")),
                '\\' => {
                    let Some((escape_offset, escaped)) = self.chars.next() else {
                        return Err(self.error(start, "unterminated quoted string"));
                    };
                    let resolved = match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        'a' => '\u{7}',
                        'b' => '\u{8}',
                        'f' => '\u{c}',
                        'v' => '\u{b}',
                        '\\' | '"' | '\'' | '`' => escaped,
                        // regex escapes like `\d` and `\.` pass through untouched
                        other if other.is_ascii_punctuation() || other.is_ascii_alphabetic() => {
                            value.push('\\');
                            other
                        }
                        other => {
                            return Err(self.error(
                                escape_offset,
                                format!("unknown escape sequence {other:?}"),
                            ));
                        }
                    };
                    value.push(resolved);
                }
                other => value.push(other),
            }
        }
    }

    fn raw_string(&mut self, start: usize) -> Result<String, ExprError> {
        let mut value = String::new();
        for (_, c) in self.chars.by_ref() {
            if c == '`' {
                return Ok(value);
            }
            value.push(c);
        }
        Err(self.error(start, "unterminated raw string"))
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ExprError {
        ExprError::at(self.input, offset, message)
    }
}

fn classify_numeric(literal: &str) -> Option<TokenKind> {
    if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .ok()
            .map(|value| TokenKind::Number(value as f64));
    }

    if literal
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return literal.parse::<f64>().ok().map(TokenKind::Number);
    }

    if let Ok(duration) = parse_duration(literal) {
        return Some(TokenKind::Duration(duration));
    }

    parse_bytes(literal).map(TokenKind::Bytes)
}

fn parse_bytes(literal: &str) -> Option<u64> {
    let split = literal.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (amount, unit) = literal.split_at(split);
    let amount: f64 = amount.parse().ok()?;
    let multiplier: u64 = match unit.to_ascii_lowercase().as_str() {
        "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return None,
    };
    Some((amount * multiplier as f64) as u64)
}
