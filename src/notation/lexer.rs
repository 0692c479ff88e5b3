//! Tokenizer for the model notation.

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Number(String),
    Str(String),
    Ident(String),
    True,
    False,
    Nil,
    If,
    Then,
    Else,
    ForAll,
    Exists,
    In,
    NotIn,
    Subset,
    Union,
    Intersect,
    Backslash,
    IntDiv,
    And,
    Or,
    Not,
    Implies,
    Equiv,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LTuple,
    RTuple,
    Comma,
    Colon,
    Dot,
    DotDot,
    Prime,
    MapsTo,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Ident(i) => format!("identifier '{i}'"),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) offset: usize,
}

fn backslash_word(word: &str) -> Option<TokenKind> {
    Some(match word {
        "A" => TokenKind::ForAll,
        "E" => TokenKind::Exists,
        "in" => TokenKind::In,
        "notin" => TokenKind::NotIn,
        "subseteq" => TokenKind::Subset,
        "union" | "cup" => TokenKind::Union,
        "intersect" | "cap" => TokenKind::Intersect,
        "div" => TokenKind::IntDiv,
        _ => return None,
    })
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "NIL" => TokenKind::Nil,
        "IF" => TokenKind::If,
        "THEN" => TokenKind::Then,
        "ELSE" => TokenKind::Else,
        _ => return None,
    })
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let mut push = |kind: TokenKind, width: usize, i: &mut usize| {
            tokens.push(Token { kind, offset });
            *i += width;
        };

        if c.is_ascii_digit() {
            let start = i;
            while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if peek(i) == Some('.') && peek(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
                while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
            tokens.push(Token {
                kind: TokenKind::Number(text),
                offset,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while peek(i).is_some_and(|c| c.is_alphanumeric() || c == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
            let kind = keyword(&word).unwrap_or(TokenKind::Ident(word));
            tokens.push(Token { kind, offset });
            continue;
        }

        match c {
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match peek(i) {
                        None => return Err(ParseError::UnterminatedString { offset }),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if peek(i + 1).is_some() => {
                            if let Some(escaped) = peek(i + 1) {
                                text.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                            }
                            i += 2;
                        }
                        Some(other) => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    offset,
                });
            }
            '\\' => {
                if peek(i + 1) == Some('/') {
                    push(TokenKind::Or, 2, &mut i);
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while peek(end).is_some_and(char::is_alphabetic) {
                    end += 1;
                }
                let word: String = chars[start..end].iter().map(|(_, c)| *c).collect();
                match backslash_word(&word) {
                    Some(kind) => push(kind, end - i, &mut i),
                    None if word.is_empty() => push(TokenKind::Backslash, 1, &mut i),
                    None => {
                        return Err(ParseError::UnknownOperator {
                            operator: format!("\\{word}"),
                            offset,
                        })
                    }
                }
            }
            '/' => match peek(i + 1) {
                Some('\\') => push(TokenKind::And, 2, &mut i),
                Some('=') => push(TokenKind::NotEq, 2, &mut i),
                _ => push(TokenKind::Slash, 1, &mut i),
            },
            '=' => match peek(i + 1) {
                Some('>') => push(TokenKind::Implies, 2, &mut i),
                Some('<') => push(TokenKind::Le, 2, &mut i),
                Some('=') => push(TokenKind::Eq, 2, &mut i),
                _ => push(TokenKind::Eq, 1, &mut i),
            },
            '<' => match (peek(i + 1), peek(i + 2)) {
                (Some('='), Some('>')) => push(TokenKind::Equiv, 3, &mut i),
                (Some('='), _) => push(TokenKind::Le, 2, &mut i),
                (Some('<'), _) => push(TokenKind::LTuple, 2, &mut i),
                _ => push(TokenKind::Lt, 1, &mut i),
            },
            '>' => match peek(i + 1) {
                Some('=') => push(TokenKind::Ge, 2, &mut i),
                Some('>') => push(TokenKind::RTuple, 2, &mut i),
                _ => push(TokenKind::Gt, 1, &mut i),
            },
            '|' if peek(i + 1) == Some('-') && peek(i + 2) == Some('>') => {
                push(TokenKind::MapsTo, 3, &mut i);
            }
            '.' if peek(i + 1) == Some('.') => push(TokenKind::DotDot, 2, &mut i),
            '.' => push(TokenKind::Dot, 1, &mut i),
            '#' => push(TokenKind::NotEq, 1, &mut i),
            '~' => push(TokenKind::Not, 1, &mut i),
            '+' => push(TokenKind::Plus, 1, &mut i),
            '-' => push(TokenKind::Minus, 1, &mut i),
            '*' => push(TokenKind::Star, 1, &mut i),
            '%' => push(TokenKind::Percent, 1, &mut i),
            '(' => push(TokenKind::LParen, 1, &mut i),
            ')' => push(TokenKind::RParen, 1, &mut i),
            '{' => push(TokenKind::LBrace, 1, &mut i),
            '}' => push(TokenKind::RBrace, 1, &mut i),
            '[' => push(TokenKind::LBracket, 1, &mut i),
            ']' => push(TokenKind::RBracket, 1, &mut i),
            ',' => push(TokenKind::Comma, 1, &mut i),
            ':' => push(TokenKind::Colon, 1, &mut i),
            '\'' => push(TokenKind::Prime, 1, &mut i),
            other => {
                return Err(ParseError::UnexpectedChar { ch: other, offset });
            }
        }
    }

    Ok(tokens)
}
