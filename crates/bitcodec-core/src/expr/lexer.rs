//! Tokenizer for the expression language (spec §4.3).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// A quoted string literal, already unescaped of its surrounding quotes.
    StringLit(String),
    Bool(bool),
    /// A bare identifier, or a `#id` / `#protocolId:id` node reference (the
    /// leading `#` is retained so the parser/evaluator can tell references
    /// from environment-variable identifiers apart, per spec §6: "Bare
    /// identifiers resolve as environment variables").
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Not,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Eof,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
}

pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '?' => { tokens.push(Token::Question); i += 1; }
            ':' => { tokens.push(Token::Colon); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    tokens.push(Token::Amp);
                    i += 1;
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    tokens.push(Token::Pipe);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'<') {
                    tokens.push(Token::Shl);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::LtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::Shr);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(LexError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '\'' => {
                let start = i + 1;
                let mut j = start;
                let mut value = String::new();
                loop {
                    if j >= chars.len() {
                        return Err(LexError::UnterminatedString);
                    }
                    if chars[j] == '\'' {
                        break;
                    }
                    if chars[j] == '\\' && chars.get(j + 1) == Some(&'\'') {
                        value.push('\'');
                        j += 2;
                        continue;
                    }
                    value.push(chars[j]);
                    j += 1;
                }
                tokens.push(Token::StringLit(value));
                i = j + 1;
            }
            '#' => {
                // Node reference: '#' then ident chars, optionally ':' then more ident chars.
                let start = i;
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == ':') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                tokens.push(Token::Ident(text));
                i = j;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                if c == '0' && (chars.get(j + 1) == Some(&'x') || chars.get(j + 1) == Some(&'X')) {
                    j += 2;
                    while j < chars.len() && chars[j].is_ascii_hexdigit() {
                        j += 1;
                    }
                    let text: String = chars[start + 2..j].iter().collect();
                    let value = u64::from_str_radix(&text, 16).map_err(|_| LexError::UnexpectedChar('x', start))?;
                    tokens.push(Token::Number(value as f64));
                } else {
                    while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                        j += 1;
                    }
                    let text: String = chars[start..j].iter().collect();
                    let value: f64 = text.parse().map_err(|_| LexError::UnexpectedChar(c, start))?;
                    tokens.push(Token::Number(value));
                }
                i = j;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                match text.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(text)),
                }
                i = j;
            }
            other => return Err(LexError::UnexpectedChar(other, i)),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_hex_literal() {
        let tokens = lex("0xFF").unwrap();
        assert_eq!(tokens[0], Token::Number(255.0));
    }

    #[test]
    fn lexes_node_reference_with_colon() {
        let tokens = lex("#other:flag").unwrap();
        assert_eq!(tokens[0], Token::Ident("#other:flag".to_string()));
    }

    #[test]
    fn lexes_operators() {
        let tokens = lex("a << 2 && b >= 3").unwrap();
        assert!(tokens.contains(&Token::Shl));
        assert!(tokens.contains(&Token::AndAnd));
        assert!(tokens.contains(&Token::GtEq));
    }

    #[test]
    fn lexes_function_call() {
        let tokens = lex("crc16Of(#body)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("crc16Of".to_string()),
                Token::LParen,
                Token::Ident("#body".to_string()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }
}
