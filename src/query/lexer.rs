// src/query/lexer.rs

//! Splits a query expression into [`Lexeme`]s.

use crate::query::QueryError;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Kinds of tokens in a query expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

/// A [`Token`] and the 1-based column (in chars) where it begins.
#[derive(Clone, Debug, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub column: usize,
}

fn syntax_error(column: usize, message: String) -> QueryError {
    QueryError::Syntax { column, message }
}

/// Tokenize `text`. The returned `Vec` always ends with [`Token::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Lexeme>, QueryError> {
    defn!("({:?})", text);
    let chars: Vec<char> = text.chars().collect();
    let mut lexemes: Vec<Lexeme> = Vec::with_capacity(chars.len() / 2 + 1);
    let mut i: usize = 0;
    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let next: Option<char> = chars.get(i + 1).copied();
        let (token, len): (Token, usize) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('-', _) => (Token::Minus, 1),
            ('=', Some('=')) => (Token::Eq, 2),
            ('=', _) => {
                return Err(syntax_error(column, String::from("unexpected '='; use '==' to compare")));
            }
            ('!', Some('=')) => (Token::Ne, 2),
            ('!', _) => (Token::Not, 1),
            ('<', Some('=')) => (Token::Le, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::Ge, 2),
            ('>', _) => (Token::Gt, 1),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('"', _) | ('\'', _) => lex_string(&chars, i)?,
            (c, _) if c.is_ascii_digit() => lex_number(&chars, i)?,
            (c, _) if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                };
                (token, j - i)
            }
            (c, _) => {
                return Err(syntax_error(column, format!("unexpected character {:?}", c)));
            }
        };
        lexemes.push(Lexeme { token, column });
        i += len;
    }
    lexemes.push(Lexeme { token: Token::Eof, column: chars.len() + 1 });
    defx!("{} lexemes", lexemes.len());

    Ok(lexemes)
}

/// Lex a quoted string starting at `chars[start]`.
/// Returns the token and the count of chars consumed including quotes.
fn lex_string(
    chars: &[char],
    start: usize,
) -> Result<(Token, usize), QueryError> {
    let quote = chars[start];
    let mut s = String::new();
    let mut j = start + 1;
    loop {
        let c = match chars.get(j) {
            Some(c) => *c,
            None => {
                return Err(syntax_error(start + 1, String::from("unterminated string")));
            }
        };
        if c == quote {
            break;
        }
        if c == '\\' {
            let escaped = match chars.get(j + 1) {
                Some(c_) => *c_,
                None => {
                    return Err(syntax_error(start + 1, String::from("unterminated string")));
                }
            };
            match escaped {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                '\\' | '"' | '\'' => s.push(escaped),
                _ => {
                    s.push('\\');
                    s.push(escaped);
                }
            }
            j += 2;
            continue;
        }
        s.push(c);
        j += 1;
    }

    Ok((Token::Str(s), j + 1 - start))
}

/// Lex an integer or float starting at `chars[start]`.
fn lex_number(
    chars: &[char],
    start: usize,
) -> Result<(Token, usize), QueryError> {
    let mut j = start;
    let mut is_float = false;
    while j < chars.len() && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j + 1 < chars.len() && chars[j] == '.' && chars[j + 1].is_ascii_digit() {
        is_float = true;
        j += 1;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
    }
    if j < chars.len() && (chars[j] == 'e' || chars[j] == 'E') {
        let mut k = j + 1;
        if k < chars.len() && (chars[k] == '+' || chars[k] == '-') {
            k += 1;
        }
        if k < chars.len() && chars[k].is_ascii_digit() {
            is_float = true;
            j = k;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
        }
    }
    if j < chars.len() && (chars[j].is_alphabetic() || chars[j] == '_') {
        return Err(syntax_error(start + 1, String::from("invalid number literal")));
    }
    let text: String = chars[start..j].iter().collect();
    let token = if is_float {
        match text.parse::<f64>() {
            Ok(f) => Token::Float(f),
            Err(err) => return Err(syntax_error(start + 1, format!("invalid number {:?}: {}", text, err))),
        }
    } else {
        match text.parse::<i64>() {
            Ok(n) => Token::Int(n),
            Err(err) => return Err(syntax_error(start + 1, format!("invalid number {:?}: {}", text, err))),
        }
    };

    Ok((token, j - start))
}
