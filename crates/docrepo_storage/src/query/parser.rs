//! Textual predicate syntax.
//!
//! Accepts the WHERE-clause subset used by repository queries:
//!
//! ```text
//! expr      := or
//! or        := and ("OR" and)*
//! and       := unary ("AND" unary)*
//! unary     := "NOT" unary | "(" expr ")" | "TRUE" | "FALSE" | predicate
//! predicate := field op literal
//!            | field "IS" ["NOT"] "NULL"
//!            | field ["NOT"] "IN" "(" literal ("," literal)* ")"
//!            | field ["NOT"] "LIKE" string
//!            | field "CONTAINS" literal
//! literal   := string | integer | float | "TRUE" | "FALSE"
//!            | "DATE" string | "REF" string
//! ```
//!
//! Keywords are case-insensitive. Strings are single-quoted, with `''` as
//! an escaped quote. `DATE` takes an RFC 3339 timestamp.

use super::expression::Expression;
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use docrepo_state::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
    In,
    Like,
    Is,
    Null,
    Contains,
    True,
    False,
    Date,
    Ref,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word.to_ascii_uppercase().as_str() {
            "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            "IN" => Self::In,
            "LIKE" => Self::Like,
            "IS" => Self::Is,
            "NULL" => Self::Null,
            "CONTAINS" => Self::Contains,
            "TRUE" => Self::True,
            "FALSE" => Self::False,
            "DATE" => Self::Date,
            "REF" => Self::Ref,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Keyword(Keyword),
    Str(String),
    Long(i64),
    Double(f64),
    Op(Op),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> StorageResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(Op::Eq));
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(StorageError::invalid_expression("expected '=' after '!'"));
                }
                tokens.push(Token::Op(Op::NotEq));
            }
            '<' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    Op::Le
                } else if chars.next_if_eq(&'>').is_some() {
                    Op::NotEq
                } else {
                    Op::Lt
                };
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    Op::Ge
                } else {
                    Op::Gt
                };
                tokens.push(Token::Op(op));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            if chars.next_if_eq(&'\'').is_some() {
                                text.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(StorageError::invalid_expression(
                                "unterminated string literal",
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    number.push(d);
                }
                tokens.push(parse_number(&number)?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(w) =
                    chars.next_if(|w| w.is_alphanumeric() || matches!(*w, '_' | ':' | '.' | '/'))
                {
                    word.push(w);
                }
                match Keyword::lookup(&word) {
                    Some(keyword) => tokens.push(Token::Keyword(keyword)),
                    None => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(StorageError::invalid_expression(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> StorageResult<Token> {
    if text.contains('.') {
        text.parse::<f64>()
            .map(Token::Double)
            .map_err(|_| StorageError::invalid_expression(format!("invalid number '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Token::Long)
            .map_err(|_| StorageError::invalid_expression(format!("invalid number '{text}'")))
    }
}

/// Deepest nesting of groups and `NOT` accepted before parsing fails.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek() == Some(&Token::Keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> StorageResult<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(StorageError::invalid_expression(format!(
                "expected {what}, found {token:?}"
            ))),
            None => Err(StorageError::invalid_expression(format!(
                "expected {what}, found end of input"
            ))),
        }
    }

    fn parse_or(&mut self) -> StorageResult<Expression> {
        let mut operands = vec![self.parse_and()?];
        while self.eat_keyword(Keyword::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(flatten(operands, Expression::Or))
    }

    fn parse_and(&mut self) -> StorageResult<Expression> {
        let mut operands = vec![self.parse_unary()?];
        while self.eat_keyword(Keyword::And) {
            operands.push(self.parse_unary()?);
        }
        Ok(flatten(operands, Expression::And))
    }

    fn descend(&mut self) -> StorageResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(StorageError::invalid_expression(
                "expression nested too deeply",
            ));
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> StorageResult<Expression> {
        if self.eat_keyword(Keyword::Not) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(inner.not());
        }
        match self.next() {
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Keyword(Keyword::True)) => Ok(Expression::Constant(true)),
            Some(Token::Keyword(Keyword::False)) => Ok(Expression::Constant(false)),
            Some(Token::Ident(field)) => self.parse_predicate(field),
            Some(token) => Err(StorageError::invalid_expression(format!(
                "expected a predicate, found {token:?}"
            ))),
            None => Err(StorageError::invalid_expression(
                "expected a predicate, found end of input",
            )),
        }
    }

    fn parse_predicate(&mut self, field: String) -> StorageResult<Expression> {
        match self.next() {
            Some(Token::Op(op)) => {
                let value = self.parse_literal()?;
                Ok(match op {
                    Op::Eq => Expression::Eq(field, value),
                    Op::NotEq => Expression::NotEq(field, value),
                    Op::Lt => Expression::Lt(field, value),
                    Op::Le => Expression::Le(field, value),
                    Op::Gt => Expression::Gt(field, value),
                    Op::Ge => Expression::Ge(field, value),
                })
            }
            Some(Token::Keyword(Keyword::Is)) => {
                let negated = self.eat_keyword(Keyword::Not);
                self.expect(&Token::Keyword(Keyword::Null), "NULL")?;
                Ok(if negated {
                    Expression::IsNotNull(field)
                } else {
                    Expression::IsNull(field)
                })
            }
            Some(Token::Keyword(Keyword::Not)) => match self.next() {
                Some(Token::Keyword(Keyword::In)) => Ok(self.parse_in(field)?.not()),
                Some(Token::Keyword(Keyword::Like)) => Ok(self.parse_like(field)?.not()),
                _ => Err(StorageError::invalid_expression(
                    "expected IN or LIKE after NOT",
                )),
            },
            Some(Token::Keyword(Keyword::In)) => self.parse_in(field),
            Some(Token::Keyword(Keyword::Like)) => self.parse_like(field),
            Some(Token::Keyword(Keyword::Contains)) => {
                let value = self.parse_literal()?;
                Ok(Expression::Contains(field, value))
            }
            other => Err(StorageError::invalid_expression(format!(
                "expected an operator after {field}, found {other:?}"
            ))),
        }
    }

    fn parse_in(&mut self, field: String) -> StorageResult<Expression> {
        self.expect(&Token::LParen, "'('")?;
        let mut values = vec![self.parse_literal()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            values.push(self.parse_literal()?);
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(Expression::In(field, values))
    }

    fn parse_like(&mut self, field: String) -> StorageResult<Expression> {
        match self.next() {
            Some(Token::Str(pattern)) => Ok(Expression::Like(field, pattern)),
            _ => Err(StorageError::invalid_expression(
                "LIKE needs a string pattern",
            )),
        }
    }

    fn parse_literal(&mut self) -> StorageResult<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Long(n)) => Ok(Value::Long(n)),
            Some(Token::Double(n)) => Ok(Value::Double(n)),
            Some(Token::Keyword(Keyword::True)) => Ok(Value::Boolean(true)),
            Some(Token::Keyword(Keyword::False)) => Ok(Value::Boolean(false)),
            Some(Token::Keyword(Keyword::Date)) => match self.next() {
                Some(Token::Str(s)) => DateTime::parse_from_rfc3339(&s)
                    .map(|d| Value::Date(d.with_timezone(&Utc)))
                    .map_err(|e| StorageError::invalid_expression(format!("invalid date '{s}': {e}"))),
                _ => Err(StorageError::invalid_expression("DATE needs a string")),
            },
            Some(Token::Keyword(Keyword::Ref)) => match self.next() {
                Some(Token::Str(s)) => Ok(Value::Reference(s)),
                _ => Err(StorageError::invalid_expression("REF needs a string")),
            },
            Some(token) => Err(StorageError::invalid_expression(format!(
                "expected a literal, found {token:?}"
            ))),
            None => Err(StorageError::invalid_expression(
                "expected a literal, found end of input",
            )),
        }
    }
}

fn flatten(mut operands: Vec<Expression>, join: fn(Vec<Expression>) -> Expression) -> Expression {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        join(operands)
    }
}

impl Expression {
    /// Parses a textual predicate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` on any syntax error.
    ///
    /// # Example
    ///
    /// ```
    /// use docrepo_storage::Expression;
    ///
    /// let e = Expression::parse("primaryType = 'File' AND NOT size > 10").unwrap();
    /// assert!(matches!(e, Expression::And(_)));
    /// ```
    pub fn parse(input: &str) -> StorageResult<Self> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
            depth: 0,
        };
        let expression = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(StorageError::invalid_expression(format!(
                "unexpected trailing {token:?}"
            )));
        }
        Ok(expression)
    }
}
