//! Boolean expressions for `if` and `validate`
//!
//! Grammar (recursive descent, lowest precedence first):
//!
//! ```text
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | comparison
//! comparison := primary (("==" | "=" | "!=" | "<>" | ">" | "<" | ">=" | "<=") primary)?
//! primary    := "(" or ")" | number | 'quoted' | "quoted" | true | false | bareword
//! ```
//!
//! Comparisons are numeric when both sides parse as numbers. Otherwise
//! equality compares booleans case-insensitively and everything else as
//! case-sensitive text; ordering of non-numbers is an error.
//! `NULL` / `NOT-NULL` are ordinary barewords.

use crate::error::{NoxError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Or,
    And,
    Not,
    Op(CmpOp),
    Quoted(String),
    Word(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Bool(bool),
    Text(String),
}

impl Term {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Term::Bool(b) => Some(*b),
            Term::Text(t) if t.eq_ignore_ascii_case("true") => Some(true),
            Term::Text(t) if t.eq_ignore_ascii_case("false") => Some(false),
            Term::Text(_) => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Term::Bool(_) => None,
            Term::Text(t) => t.trim().parse::<f64>().ok(),
        }
    }

    fn text(&self) -> String {
        match self {
            Term::Bool(b) => b.to_string(),
            Term::Text(t) => t.clone(),
        }
    }
}

/// Evaluate an already-substituted expression
pub fn evaluate(expression: &str) -> Result<bool> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        pos: 0,
    };
    let term = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error(format!("unexpected {:?}", parser.tokens[parser.pos])));
    }
    term.as_bool()
        .ok_or_else(|| parser.error(format!("result '{}' is not a boolean", term.text())))
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if next == Some('>') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    _ => (CmpOp::Gt, 1),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '\'' | '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| NoxError::Expression {
                        expression: expression.to_string(),
                        reason: "unterminated string".into(),
                    })?;
                tokens.push(Token::Quoted(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i], chars.get(i + 1).copied()) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "or" => Token::Or,
                    "and" => Token::And,
                    "not" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

fn is_delimiter(c: char, next: Option<char>) -> bool {
    c.is_whitespace()
        || matches!(c, '(' | ')' | '=' | '<' | '>' | '\'' | '"')
        || (c == '!' && next == Some('='))
        || (c == '|' && next == Some('|'))
        || (c == '&' && next == Some('&'))
}

struct Parser<'e> {
    expression: &'e str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: String) -> NoxError {
        NoxError::Expression {
            expression: self.expression.to_string(),
            reason,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn boolean(&self, term: &Term) -> Result<bool> {
        term.as_bool()
            .ok_or_else(|| self.error(format!("'{}' is not a boolean", term.text())))
    }

    fn or(&mut self) -> Result<Term> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            let value = self.boolean(&left)? || self.boolean(&right)?;
            left = Term::Bool(value);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Term> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            let value = self.boolean(&left)? && self.boolean(&right)?;
            left = Term::Bool(value);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Term> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Term::Bool(!self.boolean(&operand)?));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Term> {
        let left = self.primary()?;
        let Some(Token::Op(op)) = self.peek().cloned() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.primary()?;
        Ok(Term::Bool(self.compare(&left, op, &right)?))
    }

    fn compare(&self, left: &Term, op: CmpOp, right: &Term) -> Result<bool> {
        if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
            return Ok(match op {
                CmpOp::Eq => l == r,
                CmpOp::Ne => l != r,
                CmpOp::Gt => l > r,
                CmpOp::Lt => l < r,
                CmpOp::Ge => l >= r,
                CmpOp::Le => l <= r,
            });
        }

        let equal = match (left.as_bool(), right.as_bool()) {
            (Some(l), Some(r)) => l == r,
            _ => left.text() == right.text(),
        };
        match op {
            CmpOp::Eq => Ok(equal),
            CmpOp::Ne => Ok(!equal),
            _ => Err(self.error(format!(
                "cannot order non-numeric values '{}' and '{}'",
                left.text(),
                right.text()
            ))),
        }
    }

    fn primary(&mut self) -> Result<Term> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("missing ')'".into())),
                }
            }
            Some(Token::Quoted(text)) => Ok(Term::Text(text)),
            Some(Token::Word(word)) => Ok(match word.to_ascii_lowercase().as_str() {
                "true" => Term::Bool(true),
                "false" => Term::Bool(false),
                _ => Term::Text(word),
            }),
            Some(other) => Err(self.error(format!("unexpected {:?}", other))),
            None => Err(self.error("unexpected end of expression".into())),
        }
    }
}
