//! A small built-in expression language.
//!
//! Supports JSON literals, single- or double-quoted strings, dotted variable
//! paths (`order.items.0`), `In('id')`, `!`, `&&`, `||`, comparisons,
//! `+ - * / %` on numbers, `+` on strings and arrays, array and object literals and
//! parentheses. `&&` and `||` short-circuit.
//!
//! Scripts are statements separated by `;` or newlines. A statement is
//! either `location = expr`, written into an already declared variable, or
//! a bare expression evaluated for its errors. Statements run in order and
//! the first failure stops the script; earlier writes stay applied.

use crate::context::{Context, ContextStore, ScopeId};
use crate::eval::{truthy, Evaluator, ExpressionError};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Evaluator for the built-in expression language.
///
/// # Example
///
/// ```rust
/// use stateflow::context::ContextStore;
/// use stateflow::eval::{Evaluator, MinimalEvaluator};
/// use serde_json::json;
///
/// let mut store = ContextStore::new();
/// let scope = store.new_scope(Some(store.system()));
/// store.set_local(scope, "order", json!({ "total": 40, "items": ["a", "b"] })).unwrap();
///
/// let evaluator = MinimalEvaluator::new();
/// let ctx = store.view(scope);
///
/// assert_eq!(evaluator.eval(&ctx, "order.total * 2").unwrap(), json!(80));
/// assert_eq!(evaluator.eval(&ctx, "order.items.1 + '!'").unwrap(), json!("b!"));
/// assert!(evaluator.eval_cond(&ctx, "order.total >= 40 && !false").unwrap());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MinimalEvaluator {
    sources: HashMap<String, Value>,
}

impl MinimalEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value returned by `load_source(name)`.
    pub fn with_source(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sources.insert(name.into(), value);
        self
    }
}

impl Evaluator for MinimalEvaluator {
    fn eval(&self, ctx: &Context<'_>, expr: &str) -> Result<Value, ExpressionError> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            expr,
            tokens,
            pos: 0,
        };
        let ast = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        ast.eval(ctx)
    }

    fn eval_script(
        &self,
        store: &mut ContextStore,
        scope: ScopeId,
        script: &str,
    ) -> Result<(), ExpressionError> {
        for statement in split_statements(script) {
            match split_assignment(statement) {
                Some((location, expr)) => {
                    let value = self.eval(&store.view(scope), expr)?;
                    store.set_location(scope, location, value).map_err(|e| {
                        ExpressionError::Assignment {
                            location: location.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                }
                None => {
                    self.eval(&store.view(scope), statement)?;
                }
            }
        }
        Ok(())
    }

    fn load_source(&self, src: &str) -> Result<Value, ExpressionError> {
        self.sources
            .get(src)
            .cloned()
            .ok_or_else(|| ExpressionError::Unsupported {
                what: format!("unknown source \"{src}\""),
            })
    }
}

/// Split a script on `;` and newlines outside string literals.
fn split_statements(script: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in script.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ';' || c == '\n' => {
                statements.push(&script[start..i]);
                start = i + 1;
            }
            None => {}
        }
    }
    statements.push(&script[start..]);
    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// `location = expr` when the statement starts with a dotted path and a
/// lone `=`.
fn split_assignment(statement: &str) -> Option<(&str, &str)> {
    let bytes = statement.as_bytes();
    let at = bytes.iter().enumerate().position(|(i, b)| {
        *b == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'=' | b'!' | b'<' | b'>'))
    })?;
    let location = statement[..at].trim();
    let is_path = !location.is_empty()
        && location.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
        && !location.starts_with(|c: char| c.is_ascii_digit());
    is_path.then(|| (location, statement[at + 1..].trim()))
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(String),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
}

const OPERATORS: [&str; 15] = [
    "&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "+", "-", "*", "/", "%", "=",
];

fn tokenize(expr: &str) -> Result<Vec<Token>, ExpressionError> {
    let syntax = |message: String| ExpressionError::Syntax {
        expr: expr.to_string(),
        message,
    };
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
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
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax("unterminated string".to_string())),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| syntax("dangling escape".to_string()))?;
                            text.push(match *escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                tokens.push(Token::Num(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..].iter().take(2).collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| syntax(format!("unexpected character '{c}'")))?;
                if *op == "=" {
                    return Err(syntax("assignment is not an expression".to_string()));
                }
                tokens.push(Token::Op(*op));
                i += op.len();
            }
        }
    }
    Ok(tokens)
}

#[derive(Clone, Debug)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    In(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

struct Parser<'e> {
    expr: &'e str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ExpressionError {
        ExpressionError::Syntax {
            expr: self.expr.to_string(),
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: Token, message: &str) -> Result<(), ExpressionError> {
        if self.next() == Some(token) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        while let Some(op) = self.eat_op(ops) {
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["||"], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["&&"], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["==", "!="], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["<=", ">=", "<", ">"], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(&["*", "/", "%"], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.eat_op(&["!", "-"]) {
            Some("!") => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(_) => Ok(Expr::Neg(Box::new(self.parse_unary()?))),
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Num(text)) => parse_number(&text)
                .map(Expr::Literal)
                .ok_or_else(|| self.error("bad number")),
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "expected ')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket, "expected ']'")?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut fields = Vec::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = match self.next() {
                            Some(Token::Str(key)) | Some(Token::Ident(key)) => key,
                            _ => return Err(self.error("expected object key")),
                        };
                        self.expect(Token::Colon, "expected ':'")?;
                        fields.push((key, self.parse_or()?));
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace, "expected '}'")?;
                Ok(Expr::Object(fields))
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "In" if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let id = match self.next() {
                        Some(Token::Str(id)) => id,
                        _ => return Err(self.error("In() expects a quoted id")),
                    };
                    self.expect(Token::RParen, "expected ')'")?;
                    Ok(Expr::In(id))
                }
                _ => self.parse_path(ident.clone()),
            },
            _ => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![root];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(name)) => segments.push(name),
                Some(Token::Num(index)) => {
                    segments.extend(index.split('.').map(str::to_string));
                }
                _ => return Err(self.error("expected a name after '.'")),
            }
        }
        Ok(Expr::Path(segments))
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>().ok().map(number)
}

/// Numbers with no fractional part are kept as integers.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

fn as_number(value: &Value, op: &str) -> Result<f64, ExpressionError> {
    value.as_f64().ok_or_else(|| ExpressionError::Type {
        message: format!("'{op}' expects numbers, found {value}"),
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

impl Expr {
    fn eval(&self, ctx: &Context<'_>) -> Result<Value, ExpressionError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Path(segments) => {
                let path = segments.join(".");
                ctx.get(&path)
                    .cloned()
                    .ok_or(ExpressionError::UnknownVariable { name: path })
            }
            Self::In(id) => Ok(Value::Bool(ctx.is_active(id))),
            Self::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(ctx)?))),
            Self::Neg(inner) => Ok(number(-as_number(&inner.eval(ctx)?, "-")?)),
            Self::Array(items) => items
                .iter()
                .map(|item| item.eval(ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Object(fields) => {
                let mut map = Map::new();
                for (key, expr) in fields {
                    map.insert(key.clone(), expr.eval(ctx)?);
                }
                Ok(Value::Object(map))
            }
            Self::Binary("&&", left, right) => {
                let left = left.eval(ctx)?;
                if truthy(&left) {
                    Ok(Value::Bool(truthy(&right.eval(ctx)?)))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Self::Binary("||", left, right) => {
                let left = left.eval(ctx)?;
                if truthy(&left) {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(truthy(&right.eval(ctx)?)))
                }
            }
            Self::Binary(op, left, right) => {
                let left = left.eval(ctx)?;
                let right = right.eval(ctx)?;
                binary(op, &left, &right)
            }
        }
    }
}

fn binary(op: &str, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match op {
        "==" => Ok(Value::Bool(equals(left, right))),
        "!=" => Ok(Value::Bool(!equals(left, right))),
        "+" if left.is_array() && right.is_array() => {
            let mut items = left.as_array().cloned().unwrap_or_default();
            items.extend(right.as_array().cloned().unwrap_or_default());
            Ok(Value::Array(items))
        }
        "+" if left.is_string() || right.is_string() => Ok(Value::String(format!(
            "{}{}",
            stringify(left),
            stringify(right)
        ))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = match (left, right) {
                (Value::String(l), Value::String(r)) => l.cmp(r),
                _ => as_number(left, op)?
                    .partial_cmp(&as_number(right, op)?)
                    .ok_or_else(|| ExpressionError::Type {
                        message: format!("'{op}' cannot order NaN"),
                    })?,
            };
            Ok(Value::Bool(match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        _ => {
            let l = as_number(left, op)?;
            let r = as_number(right, op)?;
            match op {
                "+" => Ok(number(l + r)),
                "-" => Ok(number(l - r)),
                "*" => Ok(number(l * r)),
                "/" | "%" if r == 0.0 => Err(ExpressionError::DivisionByZero),
                "/" => Ok(number(l / r)),
                "%" => Ok(number(l % r)),
                other => Err(ExpressionError::Type {
                    message: format!("unknown operator '{other}'"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextStore, ScopeId, ALL_STATES};
    use serde_json::json;

    fn store() -> (ContextStore, ScopeId) {
        let mut store = ContextStore::new();
        let scope = store.new_scope(Some(store.system()));
        store.set_local(scope, "n", json!(4)).unwrap();
        store.set_local(scope, "name", json!("ann")).unwrap();
        store
            .set_local(scope, "cart", json!({ "items": [{ "qty": 2 }], "open": true }))
            .unwrap();
        store.set_system(ALL_STATES, json!(["idle"]));
        (store, scope)
    }

    fn eval(expr: &str) -> Result<Value, ExpressionError> {
        let (store, scope) = store();
        MinimalEvaluator::new().eval(&store.view(scope), expr)
    }

    #[test]
    fn script_runs_assignments_in_order() {
        let (mut store, scope) = store();
        MinimalEvaluator::new()
            .eval_script(
                &mut store,
                scope,
                "n = n + 1; name = name + ';x'\ncart.items.0.qty = n * 2; n >= 5",
            )
            .unwrap();
        let ctx = store.view(scope);
        assert_eq!(ctx.get("n"), Some(&json!(5)));
        assert_eq!(ctx.get("name"), Some(&json!("ann;x")));
        assert_eq!(ctx.get("cart.items.0.qty"), Some(&json!(10)));
    }

    #[test]
    fn script_stops_at_first_failing_statement() {
        let (mut store, scope) = store();
        let result = MinimalEvaluator::new().eval_script(&mut store, scope, "n = 1; ghost = 2; n = 3");
        assert!(matches!(
            result,
            Err(ExpressionError::Assignment { ref location, .. }) if location == "ghost"
        ));
        assert_eq!(store.view(scope).get("n"), Some(&json!(1)));
    }

    #[test]
    fn comparisons_are_not_assignments() {
        assert_eq!(split_assignment("n == 4"), None);
        assert_eq!(split_assignment("n <= 4"), None);
        assert_eq!(split_assignment("n != 4"), None);
        assert_eq!(split_assignment("a.b = 'x'"), Some(("a.b", "'x'")));
        assert_eq!(split_assignment("'a' = 1"), None);
    }

    #[test]
    fn literals_evaluate_to_json() {
        assert_eq!(eval("42").unwrap(), json!(42));
        assert_eq!(eval("2.5").unwrap(), json!(2.5));
        assert_eq!(eval("'hi'").unwrap(), json!("hi"));
        assert_eq!(eval("\"hi\"").unwrap(), json!("hi"));
        assert_eq!(eval("null").unwrap(), Value::Null);
        assert_eq!(eval("[1, 'a']").unwrap(), json!([1, "a"]));
        assert_eq!(eval("{ \"a\": 1, b: n }").unwrap(), json!({ "a": 1, "b": 4 }));
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval("n / 8").unwrap(), json!(0.5));
        assert_eq!(eval("-n + 1").unwrap(), json!(-3));
        assert_eq!(eval("7 % 4").unwrap(), json!(3));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("name + '-' + n").unwrap(), json!("ann-4"));
    }

    #[test]
    fn arrays_concatenate() {
        assert_eq!(eval("[1] + [n, 'x']").unwrap(), json!([1, 4, "x"]));
        assert!(eval("[1] + 2").is_err());
    }

    #[test]
    fn dotted_paths_reach_nested_values() {
        assert_eq!(eval("cart.items.0.qty").unwrap(), json!(2));
        assert_eq!(eval("cart.open").unwrap(), json!(true));
    }

    #[test]
    fn logic_short_circuits() {
        assert_eq!(eval("false && missing").unwrap(), json!(false));
        assert_eq!(eval("true || missing").unwrap(), json!(true));
        assert!(eval("true && missing").is_err());
    }

    #[test]
    fn comparisons_on_numbers_and_strings() {
        assert_eq!(eval("n >= 4").unwrap(), json!(true));
        assert_eq!(eval("n == 4.0").unwrap(), json!(true));
        assert_eq!(eval("'a' < 'b'").unwrap(), json!(true));
        assert_eq!(eval("name != 'bob'").unwrap(), json!(true));
    }

    #[test]
    fn in_checks_active_targets() {
        assert_eq!(eval("In('idle')").unwrap(), json!(true));
        assert_eq!(eval("!In('busy')").unwrap(), json!(true));
    }

    #[test]
    fn errors_are_typed() {
        assert!(matches!(
            eval("ghost"),
            Err(ExpressionError::UnknownVariable { name }) if name == "ghost"
        ));
        assert!(matches!(eval("1 / 0"), Err(ExpressionError::DivisionByZero)));
        assert!(matches!(eval("'a' * 2"), Err(ExpressionError::Type { .. })));
        assert!(matches!(eval("1 +"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(eval("a = 1"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(eval("'open"), Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn registered_sources_load() {
        let evaluator = MinimalEvaluator::new().with_source("defaults", json!({ "a": 1 }));
        assert_eq!(evaluator.load_source("defaults").unwrap(), json!({ "a": 1 }));
        assert!(evaluator.load_source("other").is_err());
    }
}
