//! 受限字面量解析器
//!
//! 只接受数据字面量：JSON，以及 Python 风格的映射写法（单引号字符串、True / False / None、尾随逗号）。
//! 不求值、不调用任何代码；输出统一为 serde_json::Value。

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 32;

/// 字面量解析失败
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid escape at {0}")]
    InvalidEscape(usize),

    #[error("mapping keys must be strings (at {0})")]
    NonStringKey(usize),

    #[error("nesting too deep")]
    TooDeep,

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("trailing content after literal")]
    TrailingContent,
}

/// 解析完整字符串为一个字面量（前后允许空白）
pub fn parse_literal(input: &str) -> Result<Value, PayloadError> {
    let (value, consumed) = parse_literal_prefix(input)?;
    if input[consumed..].trim().is_empty() {
        Ok(value)
    } else {
        Err(PayloadError::TrailingContent)
    }
}

/// 从开头解析一个字面量，返回值与消耗的字节数（不含其后的空白）
pub fn parse_literal_prefix(input: &str) -> Result<(Value, usize), PayloadError> {
    let mut p = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    p.skip_ws();
    let value = p.value(0)?;
    let consumed: usize = p.chars[..p.pos].iter().map(|c| c.len_utf8()).sum();
    Ok((value, consumed))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<char, PayloadError> {
        let c = self.peek().ok_or(PayloadError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> Result<(), PayloadError> {
        let pos = self.pos;
        let c = self.bump()?;
        if c == want {
            Ok(())
        } else {
            Err(PayloadError::UnexpectedChar { ch: c, pos })
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, PayloadError> {
        if depth > MAX_DEPTH {
            return Err(PayloadError::TooDeep);
        }
        match self.peek() {
            None => Err(PayloadError::UnexpectedEnd),
            Some('{') => self.mapping(depth),
            Some('[') => self.list(depth),
            Some('"') | Some('\'') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(c) => Err(PayloadError::UnexpectedChar { ch: c, pos: self.pos }),
        }
    }

    fn mapping(&mut self, depth: usize) -> Result<Value, PayloadError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key_pos = self.pos;
            let key = match self.peek() {
                Some('"') | Some('\'') => self.string()?,
                Some(_) => return Err(PayloadError::NonStringKey(key_pos)),
                None => return Err(PayloadError::UnexpectedEnd),
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            self.skip_ws();
            let pos = self.pos;
            match self.bump()? {
                ',' => continue,
                '}' => return Ok(Value::Object(map)),
                ch => return Err(PayloadError::UnexpectedChar { ch, pos }),
            }
        }
    }

    fn list(&mut self, depth: usize) -> Result<Value, PayloadError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            let pos = self.pos;
            match self.bump()? {
                ',' => continue,
                ']' => return Ok(Value::Array(items)),
                ch => return Err(PayloadError::UnexpectedChar { ch, pos }),
            }
        }
    }

    fn string(&mut self) -> Result<String, PayloadError> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            let c = self.bump()?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let esc_pos = self.pos;
            match self.bump()? {
                '"' => out.push('"'),
                '\'' => out.push('\''),
                '\\' => out.push('\\'),
                '/' => out.push('/'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => out.push(self.unicode_escape(esc_pos)?),
                _ => return Err(PayloadError::InvalidEscape(esc_pos)),
            }
        }
    }

    fn hex4(&mut self, esc_pos: usize) -> Result<u32, PayloadError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let d = self
                .bump()?
                .to_digit(16)
                .ok_or(PayloadError::InvalidEscape(esc_pos))?;
            code = code * 16 + d;
        }
        Ok(code)
    }

    fn unicode_escape(&mut self, esc_pos: usize) -> Result<char, PayloadError> {
        let high = self.hex4(esc_pos)?;
        if (0xD800..0xDC00).contains(&high) {
            // 代理对
            if self.bump()? != '\\' || self.bump()? != 'u' {
                return Err(PayloadError::InvalidEscape(esc_pos));
            }
            let low = self.hex4(esc_pos)?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(PayloadError::InvalidEscape(esc_pos));
            }
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(code).ok_or(PayloadError::InvalidEscape(esc_pos));
        }
        char::from_u32(high).ok_or(PayloadError::InvalidEscape(esc_pos))
    }

    fn number(&mut self) -> Result<Value, PayloadError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
        ) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let trimmed = text.strip_prefix('+').unwrap_or(&text);
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(PayloadError::InvalidNumber(text))
    }

    fn identifier(&mut self) -> Result<Value, PayloadError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let ident: String = self.chars[start..self.pos].iter().collect();
        match ident.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(PayloadError::UnknownIdentifier(ident)),
        }
    }
}
