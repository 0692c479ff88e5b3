//! Precedence-climbing parser for the model notation.

use num::rational::Rational64;

use super::ast::{BinaryOp, Expression, QuantifierKind, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::ParseError;
use crate::value::Value;

const PREC_EQUIV: u8 = 1;
const PREC_IMPLIES: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_COMPARE: u8 = 5;
const PREC_RANGE: u8 = 6;
const PREC_SET: u8 = 7;
const PREC_ADD: u8 = 8;
const PREC_MUL: u8 = 9;

#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Range,
}

/// Parses one expression; trailing input is an error.
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_binary(0)?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(ParseError::TrailingInput {
            found: token.kind.describe(),
            offset: token.offset,
        });
    }
    Ok(expr)
}

fn parse_number(text: &str) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
    };
    match text.split_once('.') {
        None => text.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
        Some((whole, frac)) => {
            let digits = u32::try_from(frac.len()).map_err(|_| invalid())?;
            let denom = 10_i64.checked_pow(digits).ok_or_else(invalid)?;
            let numer = format!("{whole}{frac}").parse::<i64>().map_err(|_| invalid())?;
            Ok(Value::rational(Rational64::new(numer, denom)))
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some(token) if &token.kind == kind => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken {
                found: token.kind.describe(),
                expected,
                offset: token.offset,
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(name),
            Some(token) => Err(ParseError::UnexpectedToken {
                found: token.kind.describe(),
                expected,
                offset: token.offset,
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn peek_infix(&self) -> Option<(Infix, u8)> {
        let op = match self.peek()? {
            TokenKind::Equiv => (Infix::Binary(BinaryOp::Equiv), PREC_EQUIV),
            TokenKind::Implies => (Infix::Binary(BinaryOp::Implies), PREC_IMPLIES),
            TokenKind::Or => (Infix::Binary(BinaryOp::Or), PREC_OR),
            TokenKind::And => (Infix::Binary(BinaryOp::And), PREC_AND),
            TokenKind::Eq => (Infix::Binary(BinaryOp::Eq), PREC_COMPARE),
            TokenKind::NotEq => (Infix::Binary(BinaryOp::NotEq), PREC_COMPARE),
            TokenKind::Lt => (Infix::Binary(BinaryOp::Lt), PREC_COMPARE),
            TokenKind::Le => (Infix::Binary(BinaryOp::Le), PREC_COMPARE),
            TokenKind::Gt => (Infix::Binary(BinaryOp::Gt), PREC_COMPARE),
            TokenKind::Ge => (Infix::Binary(BinaryOp::Ge), PREC_COMPARE),
            TokenKind::In => (Infix::Binary(BinaryOp::In), PREC_COMPARE),
            TokenKind::NotIn => (Infix::Binary(BinaryOp::NotIn), PREC_COMPARE),
            TokenKind::Subset => (Infix::Binary(BinaryOp::Subset), PREC_COMPARE),
            TokenKind::DotDot => (Infix::Range, PREC_RANGE),
            TokenKind::Union => (Infix::Binary(BinaryOp::Union), PREC_SET),
            TokenKind::Intersect => (Infix::Binary(BinaryOp::Intersect), PREC_SET),
            TokenKind::Backslash => (Infix::Binary(BinaryOp::Difference), PREC_SET),
            TokenKind::Plus => (Infix::Binary(BinaryOp::Add), PREC_ADD),
            TokenKind::Minus => (Infix::Binary(BinaryOp::Sub), PREC_ADD),
            TokenKind::Star => (Infix::Binary(BinaryOp::Mul), PREC_MUL),
            TokenKind::Slash => (Infix::Binary(BinaryOp::Div), PREC_MUL),
            TokenKind::IntDiv => (Infix::Binary(BinaryOp::IntDiv), PREC_MUL),
            TokenKind::Percent => (Infix::Binary(BinaryOp::Mod), PREC_MUL),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((infix, prec)) = self.peek_infix() {
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            // Implication associates to the right.
            let next_min = if prec == PREC_IMPLIES { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = match infix {
                Infix::Binary(op) => Expression::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Infix::Range => Expression::Range {
                    low: Box::new(left),
                    high: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        match self.peek() {
            Some(TokenKind::Not) => {
                self.pos += 1;
                let operand = self.parse_binary(PREC_COMPARE)?;
                Ok(Expression::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Some(TokenKind::Minus) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(Expression::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                })
            }
            Some(TokenKind::ForAll) => {
                self.pos += 1;
                self.parse_quantifier(QuantifierKind::ForAll)
            }
            Some(TokenKind::Exists) => {
                self.pos += 1;
                self.parse_quantifier(QuantifierKind::Exists)
            }
            Some(TokenKind::If) => {
                self.pos += 1;
                let condition = self.parse_binary(0)?;
                self.expect(&TokenKind::Then, "THEN")?;
                let then_branch = self.parse_binary(0)?;
                self.expect(&TokenKind::Else, "ELSE")?;
                let else_branch = self.parse_binary(0)?;
                Ok(Expression::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_quantifier(&mut self, kind: QuantifierKind) -> Result<Expression, ParseError> {
        let variable = self.expect_ident("bound variable")?;
        self.expect(&TokenKind::In, "\\in")?;
        let domain = self.parse_binary(PREC_RANGE)?;
        self.expect(&TokenKind::Colon, ":")?;
        let body = self.parse_binary(0)?;
        Ok(Expression::Quantifier {
            kind,
            variable,
            domain: Box::new(domain),
            body: Box::new(body),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let field = self.expect_ident("field name")?;
                    expr = Expression::Field {
                        target: Box::new(expr),
                        field,
                        primed: false,
                    };
                }
                Some(TokenKind::Prime) => {
                    let offset = self.tokens[self.pos].offset;
                    self.pos += 1;
                    expr = match expr {
                        Expression::Identifier {
                            name,
                            primed: false,
                        } => Expression::Identifier { name, primed: true },
                        Expression::Field {
                            target,
                            field,
                            primed: false,
                        } => Expression::Field {
                            target,
                            field,
                            primed: true,
                        },
                        _ => return Err(ParseError::MisplacedPrime { offset }),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_list(
        &mut self,
        close: &TokenKind,
        expected: &'static str,
    ) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_binary(0)?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&TokenKind::Comma, expected)?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::UnexpectedEnd {
                expected: "expression",
            });
        };
        match token.kind {
            TokenKind::Number(text) => Ok(Expression::Literal(parse_number(&text)?)),
            TokenKind::Str(text) => Ok(Expression::Literal(Value::String(text))),
            TokenKind::True => Ok(Expression::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expression::Literal(Value::Bool(false))),
            TokenKind::Nil => Ok(Expression::Literal(Value::Nil)),
            TokenKind::Ident(name) if name == "self" => Ok(Expression::SelfRef),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_list(&TokenKind::RParen, "',' or ')'")?;
                    Ok(Expression::Call {
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expression::Identifier {
                        name,
                        primed: false,
                    })
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_binary(0)?;
                self.expect(&TokenKind::RParen, ")")?;
                Ok(inner)
            }
            TokenKind::LBrace => Ok(Expression::Set(
                self.parse_list(&TokenKind::RBrace, "',' or '}'")?,
            )),
            TokenKind::LTuple => Ok(Expression::Tuple(
                self.parse_list(&TokenKind::RTuple, "',' or '>>'")?,
            )),
            TokenKind::LBracket => {
                let mut fields = Vec::new();
                loop {
                    let name = self.expect_ident("record field")?;
                    self.expect(&TokenKind::MapsTo, "|->")?;
                    fields.push((name, self.parse_binary(0)?));
                    if self.eat(&TokenKind::RBracket) {
                        return Ok(Expression::Record(fields));
                    }
                    self.expect(&TokenKind::Comma, "',' or ']'")?;
                }
            }
            other => Err(ParseError::UnexpectedToken {
                found: other.describe(),
                expected: "expression",
                offset: token.offset,
            }),
        }
    }
}
