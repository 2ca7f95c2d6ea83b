//! Affine coordinate expressions such as `x2+0.5` or `-2*z4`.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

#[cfg(test)]
#[path = "expression_tests.rs"]
mod expression_tests;

// ================
// Error definition
// ================

/// Error for coordinate expressions that are not well-formed affine forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The text does not parse as an arithmetic expression.
    Syntax(String),

    /// The expression parses but is not affine in its symbols.
    NonAffine(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "Expression syntax error: {msg}."),
            Self::NonAffine(msg) => write!(f, "Non-affine expression: {msg}."),
        }
    }
}

impl Error for ExpressionError {}

// ==================
// Struct definitions
// ==================

/// An affine form $`c + \sum_i k_i p_i`$ over named symbols $`p_i`$.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AffineExpression {
    pub constant: f64,

    /// Non-zero coefficients keyed by symbol name.
    pub coefficients: BTreeMap<String, f64>,
}

impl AffineExpression {
    pub fn constant(value: f64) -> Self {
        Self {
            constant: value,
            coefficients: BTreeMap::new(),
        }
    }

    pub fn symbol(name: &str) -> Self {
        Self {
            constant: 0.0,
            coefficients: [(name.to_string(), 1.0)].into_iter().collect(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Names of the symbols with non-zero coefficients.
    pub fn symbols(&self) -> impl Iterator<Item = &String> + '_ {
        self.coefficients.keys()
    }

    /// Coefficient of a symbol, zero if absent.
    pub fn coefficient(&self, name: &str) -> f64 {
        self.coefficients.get(name).copied().unwrap_or(0.0)
    }

    fn add(mut self, other: Self, sign: f64) -> Self {
        self.constant += sign * other.constant;
        for (name, k) in other.coefficients {
            *self.coefficients.entry(name).or_insert(0.0) += sign * k;
        }
        self.coefficients.retain(|_, k| *k != 0.0);
        self
    }

    fn scale(mut self, factor: f64) -> Self {
        self.constant *= factor;
        self.coefficients.values_mut().for_each(|k| *k *= factor);
        self.coefficients.retain(|_, k| *k != 0.0);
        self
    }

    fn mul(self, other: Self, text: &str) -> Result<Self, ExpressionError> {
        if other.is_constant() {
            Ok(self.scale(other.constant))
        } else if self.is_constant() {
            Ok(other.scale(self.constant))
        } else {
            Err(ExpressionError::NonAffine(format!(
                "`{text}` multiplies two symbolic terms"
            )))
        }
    }

    fn div(self, other: Self, text: &str) -> Result<Self, ExpressionError> {
        if !other.is_constant() {
            Err(ExpressionError::NonAffine(format!(
                "`{text}` divides by a symbolic term"
            )))
        } else if other.constant == 0.0 {
            Err(ExpressionError::Syntax(format!("`{text}` divides by zero")))
        } else {
            Ok(self.scale(1.0 / other.constant))
        }
    }
}

impl FromStr for AffineExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenise(s)?;
        let mut parser = Parser {
            text: s,
            tokens: &tokens,
            pos: 0,
        };
        let expr = parser.expression()?;
        if parser.pos != tokens.len() {
            return Err(ExpressionError::Syntax(format!(
                "unexpected trailing input in `{s}`"
            )));
        }
        Ok(expr)
    }
}

impl fmt::Display for AffineExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self
            .coefficients
            .iter()
            .map(|(name, k)| format!("{k:+}*{name}"))
            .join(" ");
        if terms.is_empty() {
            write!(f, "{}", self.constant)
        } else {
            write!(f, "{terms} {:+}", self.constant)
        }
    }
}

// ======
// Parser
// ======

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Symbol(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenise(text: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars = text.chars().collect_vec();
    let mut tokens = vec![];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent, e.g. `1.5e-3`.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let number: String = chars[start..i].iter().collect();
                let value = number.parse::<f64>().map_err(|_| {
                    ExpressionError::Syntax(format!("invalid number `{number}` in `{text}`"))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Symbol(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(ExpressionError::Syntax(format!(
                    "unexpected character `{c}` in `{text}`"
                )))
            }
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser over `expr := term (('+'|'-') term)*`,
/// `term := unary (('*'|'/') unary)*`, `unary := ('+'|'-') unary | primary`.
struct Parser<'a> {
    text: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self) -> Result<AffineExpression, ExpressionError> {
        let mut lhs = self.term()?;
        while let Some(token) = self.peek() {
            let sign = match token {
                Token::Plus => 1.0,
                Token::Minus => -1.0,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = lhs.add(rhs, sign);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<AffineExpression, ExpressionError> {
        let mut lhs = self.unary()?;
        while let Some(token) = self.peek() {
            let is_mul = match token {
                Token::Star => true,
                Token::Slash => false,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = if is_mul {
                lhs.mul(rhs, self.text)?
            } else {
                lhs.div(rhs, self.text)?
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<AffineExpression, ExpressionError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(self.unary()?.scale(-1.0))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<AffineExpression, ExpressionError> {
        let token = self.peek().cloned().ok_or_else(|| {
            ExpressionError::Syntax(format!("unexpected end of `{}`", self.text))
        })?;
        self.pos += 1;
        match token {
            Token::Number(value) => Ok(AffineExpression::constant(value)),
            Token::Symbol(name) => Ok(AffineExpression::symbol(&name)),
            Token::LParen => {
                let inner = self.expression()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ExpressionError::Syntax(format!(
                        "unbalanced parentheses in `{}`",
                        self.text
                    ))),
                }
            }
            other => Err(ExpressionError::Syntax(format!(
                "unexpected `{other:?}` in `{}`",
                self.text
            ))),
        }
    }
}
