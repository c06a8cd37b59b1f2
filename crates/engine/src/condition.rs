//! Step guard expressions.
//!
//! A condition is a template string; after placeholder substitution it must
//! parse as a small boolean expression language:
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := equality ( "&&" equality )*
//! equality   := relational ( ("==" | "!=" | "===" | "!==") relational )*
//! relational := unary ( ("<" | "<=" | ">" | ">=") unary )*
//! unary      := "!" unary | primary
//! primary    := number | string | true | false | null | undefined | "(" expr ")"
//! ```
//!
//! Comparison, equality and truthiness follow loose scripting semantics
//! (`"3" == 3`, `"" ` is falsy, `null == undefined`). Bare identifiers are
//! rejected; a value substituted without quotes is a template bug, not a
//! variable reference.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::template;

/// What to do with a step whose condition cannot be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionFailurePolicy {
    /// Run the step anyway.
    #[default]
    Run,
    /// Skip the step as if the condition were false.
    Skip,
    /// Fail the step, aborting the run.
    Fail,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unknown identifier '{name}' at offset {pos}")]
    UnknownIdentifier { name: String, pos: usize },

    #[error("unexpected token '{found}' at offset {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression nests deeper than 64 levels at offset {pos}")]
    TooDeep { pos: usize },
}

/// Maximum nesting of parentheses and `!` operators in one expression.
pub const MAX_DEPTH: usize = 64;

/// Decide whether a step should run.
///
/// An absent or blank condition is `true`. Otherwise placeholders are
/// substituted and the result is evaluated; an expression that is empty only
/// after substitution is `false`.
pub fn evaluate_condition(
    condition: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<bool, ConditionError> {
    let Some(condition) = condition.filter(|c| !c.trim().is_empty()) else {
        return Ok(true);
    };
    let resolved = template::resolve_str(condition, ctx);
    evaluate(&resolved)
}

/// Evaluate an already-substituted expression.
pub fn evaluate(expr: &str) -> Result<bool, ConditionError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Ok(false);
    }
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.or()?;
    if let Some((tok, pos)) = parser.tokens.get(parser.pos) {
        return Err(ConditionError::UnexpectedToken {
            found: tok.to_string(),
            pos: *pos,
        });
    }
    Ok(value.truthy())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Null,
    Undefined,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Operand {
    fn truthy(&self) -> bool {
        match self {
            Operand::Null | Operand::Undefined => false,
            Operand::Bool(b) => *b,
            Operand::Num(n) => *n != 0.0 && !n.is_nan(),
            Operand::Str(s) => !s.is_empty(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Operand::Null => 0.0,
            Operand::Undefined => f64::NAN,
            Operand::Bool(b) => f64::from(u8::from(*b)),
            Operand::Num(n) => *n,
            Operand::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    fn strict_eq(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::Num(a), Operand::Num(b)) => a == b,
            (a, b) => a == b,
        }
    }

    fn loose_eq(&self, other: &Operand) -> bool {
        use Operand::*;
        match (self, other) {
            (Null | Undefined, Null | Undefined) => true,
            (Null | Undefined, _) | (_, Null | Undefined) => false,
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }

    fn compare(&self, other: &Operand, op: Op) -> bool {
        let ordering = match (self, other) {
            (Operand::Str(a), Operand::Str(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        };
        let Some(ordering) = ordering else {
            return false;
        };
        match op {
            Op::Lt => ordering.is_lt(),
            Op::Le => ordering.is_le(),
            Op::Gt => ordering.is_gt(),
            Op::Ge => ordering.is_ge(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Lit(Operand),
    Op(Op),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Lit(Operand::Null) => write!(f, "null"),
            Token::Lit(Operand::Undefined) => write!(f, "undefined"),
            Token::Lit(Operand::Bool(b)) => write!(f, "{b}"),
            Token::Lit(Operand::Num(n)) => write!(f, "{n}"),
            Token::Lit(Operand::Str(s)) => write!(f, "{s:?}"),
            Token::Op(op) => write!(f, "{op:?}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);

    while let Some(&(pos, ch)) = chars.get(i) {
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            '&' if peek(i + 1) == Some('&') => {
                tokens.push((Token::Op(Op::And), pos));
                i += 2;
            }
            '|' if peek(i + 1) == Some('|') => {
                tokens.push((Token::Op(Op::Or), pos));
                i += 2;
            }
            '=' if peek(i + 1) == Some('=') => {
                if peek(i + 2) == Some('=') {
                    tokens.push((Token::Op(Op::StrictEq), pos));
                    i += 3;
                } else {
                    tokens.push((Token::Op(Op::Eq), pos));
                    i += 2;
                }
            }
            '!' => {
                if peek(i + 1) == Some('=') {
                    if peek(i + 2) == Some('=') {
                        tokens.push((Token::Op(Op::StrictNe), pos));
                        i += 3;
                    } else {
                        tokens.push((Token::Op(Op::Ne), pos));
                        i += 2;
                    }
                } else {
                    tokens.push((Token::Op(Op::Not), pos));
                    i += 1;
                }
            }
            '<' | '>' => {
                let or_equal = peek(i + 1) == Some('=');
                let op = match (ch, or_equal) {
                    ('<', false) => Op::Lt,
                    ('<', true) => Op::Le,
                    ('>', false) => Op::Gt,
                    _ => Op::Ge,
                };
                tokens.push((Token::Op(op), pos));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = ch;
                let mut s = String::new();
                i += 1;
                loop {
                    match peek(i) {
                        None => return Err(ConditionError::UnterminatedString(pos)),
                        Some(c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = peek(i + 1).ok_or(ConditionError::UnterminatedString(pos))?;
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        Some(c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Lit(Operand::Str(s)), pos));
            }
            c if c.is_ascii_digit()
                || (c == '-' || c == '.') && peek(i + 1).is_some_and(|n| n.is_ascii_digit()) =>
            {
                let start = i;
                i += 1;
                while peek(i).is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    i += 1;
                }
                let end = chars.get(i).map(|&(p, _)| p).unwrap_or(src.len());
                let text = &src[chars[start].0..end];
                let n: f64 = text
                    .parse()
                    .map_err(|_| ConditionError::UnexpectedChar { ch: c, pos })?;
                tokens.push((Token::Lit(Operand::Num(n)), pos));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while peek(i).is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    i += 1;
                }
                let end = chars.get(i).map(|&(p, _)| p).unwrap_or(src.len());
                let word = &src[chars[start].0..end];
                let lit = match word {
                    "true" => Operand::Bool(true),
                    "false" => Operand::Bool(false),
                    "null" => Operand::Null,
                    "undefined" => Operand::Undefined,
                    _ => {
                        return Err(ConditionError::UnknownIdentifier {
                            name: word.to_owned(),
                            pos,
                        })
                    }
                };
                tokens.push((Token::Lit(lit), pos));
            }
            other => return Err(ConditionError::UnexpectedChar { ch: other, pos }),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser / interpreter
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self, pos: usize) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep { pos });
        }
        Ok(())
    }

    fn token_pos(&self) -> usize {
        self.tokens.get(self.pos).map(|&(_, p)| p).unwrap_or(0)
    }

    fn peek_op(&self) -> Option<Op> {
        match self.tokens.get(self.pos) {
            Some((Token::Op(op), _)) => Some(*op),
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Operand, ConditionError> {
        let mut left = self.and()?;
        while self.peek_op() == Some(Op::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = if left.truthy() { left } else { right };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Operand, ConditionError> {
        let mut left = self.equality()?;
        while self.peek_op() == Some(Op::And) {
            self.pos += 1;
            let right = self.equality()?;
            left = if left.truthy() { right } else { left };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Operand, ConditionError> {
        let mut left = self.relational()?;
        while let Some(op @ (Op::Eq | Op::Ne | Op::StrictEq | Op::StrictNe)) = self.peek_op() {
            self.pos += 1;
            let right = self.relational()?;
            let result = match op {
                Op::Eq => left.loose_eq(&right),
                Op::Ne => !left.loose_eq(&right),
                Op::StrictEq => left.strict_eq(&right),
                _ => !left.strict_eq(&right),
            };
            left = Operand::Bool(result);
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Operand, ConditionError> {
        let mut left = self.unary()?;
        while let Some(op @ (Op::Lt | Op::Le | Op::Gt | Op::Ge)) = self.peek_op() {
            self.pos += 1;
            let right = self.unary()?;
            left = Operand::Bool(left.compare(&right, op));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Operand, ConditionError> {
        if self.peek_op() == Some(Op::Not) {
            self.descend(self.token_pos())?;
            self.pos += 1;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Operand::Bool(!inner.truthy()));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Operand, ConditionError> {
        let (token, pos) = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;

        match token {
            Token::Lit(value) => Ok(value),
            Token::LParen => {
                self.descend(pos)?;
                let inner = self.or()?;
                self.depth -= 1;
                match self.tokens.get(self.pos) {
                    Some((Token::RParen, _)) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some((tok, pos)) => Err(ConditionError::UnexpectedToken {
                        found: tok.to_string(),
                        pos: *pos,
                    }),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            other => Err(ConditionError::UnexpectedToken {
                found: other.to_string(),
                pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_blank_condition_runs() {
        let ctx = ExecutionContext::default();
        assert_eq!(evaluate_condition(None, &ctx), Ok(true));
        assert_eq!(evaluate_condition(Some("   "), &ctx), Ok(true));
    }

    #[test]
    fn literals_and_truthiness() {
        assert_eq!(evaluate("true"), Ok(true));
        assert_eq!(evaluate("false"), Ok(false));
        assert_eq!(evaluate("0"), Ok(false));
        assert_eq!(evaluate("-2.5"), Ok(true));
        assert_eq!(evaluate("''"), Ok(false));
        assert_eq!(evaluate("'x'"), Ok(true));
        assert_eq!(evaluate("null"), Ok(false));
    }

    #[test]
    fn comparisons() {
        assert_eq!(evaluate("3 > 2"), Ok(true));
        assert_eq!(evaluate("'10' >= 9"), Ok(true));
        assert_eq!(evaluate("'apple' < 'banana'"), Ok(true));
        assert_eq!(evaluate("'abc' < 5"), Ok(false));
        assert_eq!(evaluate("1 <= 1"), Ok(true));
    }

    #[test]
    fn loose_and_strict_equality() {
        assert_eq!(evaluate("'3' == 3"), Ok(true));
        assert_eq!(evaluate("'3' === 3"), Ok(false));
        assert_eq!(evaluate("null == undefined"), Ok(true));
        assert_eq!(evaluate("null === undefined"), Ok(false));
        assert_eq!(evaluate("true == 1"), Ok(true));
        assert_eq!(evaluate("'ok' != 'ok'"), Ok(false));
        assert_eq!(evaluate("\"a\" !== 'b'"), Ok(true));
    }

    #[test]
    fn boolean_combinators_and_grouping() {
        assert_eq!(evaluate("true && false || true"), Ok(true));
        assert_eq!(evaluate("true && (false || false)"), Ok(false));
        assert_eq!(evaluate("!false && !(1 > 2)"), Ok(true));
        assert_eq!(evaluate("!!'x'"), Ok(true));
    }

    #[test]
    fn malformed_expressions_are_errors() {
        assert!(matches!(evaluate("hello == 'x'"), Err(ConditionError::UnknownIdentifier { .. })));
        assert!(matches!(evaluate("'open"), Err(ConditionError::UnterminatedString(0))));
        assert!(matches!(evaluate("(true"), Err(ConditionError::UnexpectedEnd)));
        assert!(matches!(evaluate("1 2"), Err(ConditionError::UnexpectedToken { .. })));
        assert!(matches!(evaluate("a = 1"), Err(ConditionError::UnknownIdentifier { .. })));
        assert!(matches!(evaluate("1 ; 2"), Err(ConditionError::UnexpectedChar { ch: ';', .. })));
    }

    #[test]
    fn no_host_code_is_reachable() {
        assert!(evaluate("process.exit(1)").is_err());
        assert!(evaluate("require('fs')").is_err());
    }

    #[test]
    fn placeholders_are_substituted_before_evaluation() {
        let mut ctx = ExecutionContext::default();
        ctx.user_inputs.insert("mode".into(), json!("full"));
        ctx.step_outputs.insert("check".into(), json!({ "success": true, "data": { "count": 4 } }));

        assert_eq!(evaluate_condition(Some("'{{mode}}' == 'full'"), &ctx), Ok(true));
        assert_eq!(evaluate_condition(Some("{{check.data.count}} > 5"), &ctx), Ok(false));
        assert_eq!(evaluate_condition(Some("{{check.success}}"), &ctx), Ok(true));
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let mut ctx = ExecutionContext::default();
        let depth = 100_000;
        ctx.user_inputs.insert(
            "flag".into(),
            json!(format!("{}true{}", "(".repeat(depth), ")".repeat(depth))),
        );
        assert!(matches!(
            evaluate_condition(Some("{{flag}}"), &ctx),
            Err(ConditionError::TooDeep { .. })
        ));
        assert!(matches!(
            evaluate(&format!("{}true", "!".repeat(depth))),
            Err(ConditionError::TooDeep { .. })
        ));

        let shallow = format!("{}true{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(evaluate(&shallow), Ok(true));
        assert_eq!(evaluate(&format!("{}true", "!".repeat(MAX_DEPTH))), Ok(true));
    }

    #[test]
    fn expression_empty_after_substitution_is_false() {
        let ctx = ExecutionContext::default();
        assert_eq!(evaluate_condition(Some("{{missing}}"), &ctx), Ok(false));
    }
}
