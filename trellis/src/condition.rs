//! Boolean condition evaluation for `If` attributes
//!
//! Conditions are evaluated after property expansion, so the input here is
//! plain text. The grammar supports quoted string and integer literals,
//! `true`/`false`, `And`/`Or`/`!`, the comparison operators
//! `== != < <= > >=`, and the functions `Exists(path)`,
//! `HasTrailingSlash(s)` and `ContainsItem(list, item, separator)`.
//! Comparisons are string-wise (ignoring case) unless both operands parse as
//! integers, in which case they compare numerically.

use anyhow::{bail, Result};
use std::path::Path;

/// Ambient state a condition can query
pub struct ConditionContext<'a> {
    /// Workspace root; relative `Exists()` paths resolve against it
    pub root_dir: &'a Path,
}

/// Evaluate a condition string to a boolean
pub fn eval_condition(text: &str, ctx: &ConditionContext) -> Result<bool> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        bail!("Empty condition");
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        ctx,
    };
    let value = parser.parse_or()?;
    parser.expect_end()?;
    value.to_bool()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Quoted string or bare number
    Literal(String),
    /// Bare word: true/false, And/Or, function names
    Ident(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    LParen,
    RParen,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    bail!("Unexpected '=' in condition '{text}' (did you mean '==')");
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => bail!("Unterminated string literal in condition '{text}'"),
                    }
                }
                tokens.push(Token::Literal(value));
            }
            _ if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let mut value = String::new();
                value.push(c);
                i += 1;
                while let Some(&d) = chars.get(i) {
                    if d.is_ascii_digit() {
                        value.push(d);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Literal(value));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                word.push(c);
                i += 1;
                while let Some(&d) = chars.get(i) {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        word.push(d);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            }
            _ => bail!("Unexpected character '{c}' in condition '{text}'"),
        }
    }
    Ok(tokens)
}

/// Result of evaluating a subexpression
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Scalar(String),
}

impl Value {
    fn to_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Scalar(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    bail!("Cannot interpret '{s}' as a boolean")
                }
            }
        }
    }

    fn to_scalar(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Scalar(s) => s.clone(),
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a ConditionContext<'a>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => bail!("Expected {token:?} in condition, found {other:?}"),
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        if let Some(token) = self.peek() {
            bail!("Unexpected trailing {token:?} in condition");
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Value> {
        let mut value = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case("or")) {
            self.next();
            let rhs = self.parse_and()?;
            value = Value::Bool(value.to_bool()? || rhs.to_bool()?);
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut value = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case("and")) {
            self.next();
            let rhs = self.parse_comparison()?;
            value = Value::Bool(value.to_bool()? && rhs.to_bool()?);
        }
        Ok(value)
    }

    fn parse_comparison(&mut self) -> Result<Value> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Ok(Value::Bool(compare(&op, &lhs.to_scalar(), &rhs.to_scalar())))
    }

    fn parse_unary(&mut self) -> Result<Value> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.next();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!value.to_bool()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Literal(s)) => Ok(Value::Scalar(s)),
            Some(Token::Ident(word)) => {
                if word.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if word.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_call(&word)
                } else {
                    bail!("Unknown identifier '{word}' in condition");
                }
            }
            other => bail!("Expected a value in condition, found {other:?}"),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Value> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_or()?.to_scalar());
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    other => bail!("Expected ',' or ')' in call to {name}(), found {other:?}"),
                }
            }
        } else {
            self.next();
        }
        self.invoke(name, &args)
    }

    fn invoke(&self, name: &str, args: &[String]) -> Result<Value> {
        match name.to_ascii_lowercase().as_str() {
            "exists" => {
                let [path] = args else {
                    bail!("Exists() takes exactly one argument");
                };
                if path.is_empty() {
                    return Ok(Value::Bool(false));
                }
                let candidate = Path::new(path);
                let resolved = if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    self.ctx.root_dir.join(candidate)
                };
                Ok(Value::Bool(resolved.exists()))
            }
            "hastrailingslash" => {
                let [s] = args else {
                    bail!("HasTrailingSlash() takes exactly one argument");
                };
                Ok(Value::Bool(s.ends_with('/') || s.ends_with('\\')))
            }
            "containsitem" => {
                let [list, item, separator] = args else {
                    bail!("ContainsItem() takes exactly three arguments");
                };
                if separator.is_empty() {
                    bail!("ContainsItem() separator must not be empty");
                }
                let found = list
                    .split(separator.as_str())
                    .any(|entry| entry.trim().eq_ignore_ascii_case(item.trim()));
                Ok(Value::Bool(found))
            }
            _ => bail!("Unknown function '{name}()' in condition"),
        }
    }
}

fn compare(op: &Token, lhs: &str, rhs: &str) -> bool {
    // Numeric when both sides parse as integers, string-wise otherwise
    let ordering = match (lhs.trim().parse::<i64>(), rhs.trim().parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => lhs.to_ascii_lowercase().cmp(&rhs.to_ascii_lowercase()),
    };
    match op {
        Token::Eq => ordering.is_eq(),
        Token::Ne => !ordering.is_eq(),
        Token::Lt => ordering.is_lt(),
        Token::Le => ordering.is_le(),
        Token::Gt => ordering.is_gt(),
        Token::Ge => ordering.is_ge(),
        _ => unreachable!("not a comparison operator"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn eval(text: &str) -> Result<bool> {
        let ctx = ConditionContext {
            root_dir: Path::new("."),
        };
        eval_condition(text, &ctx)
    }

    #[test]
    fn test_boolean_literals() {
        assert!(eval("true").unwrap());
        assert!(!eval("false").unwrap());
        assert!(eval("True").unwrap());
    }

    #[test]
    fn test_string_equality_ignores_case() {
        assert!(eval("'Win64' == 'win64'").unwrap());
        assert!(eval("'Win64' != 'Linux'").unwrap());
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(eval("2 < 10").unwrap());
        assert!(eval("'2' < '10'").unwrap());
        assert!(eval("10 >= 10").unwrap());
        assert!(eval("-1 < 0").unwrap());
    }

    #[test]
    fn test_string_comparison_when_not_numeric() {
        // Lexicographic: "10a" is not an integer so "2" > "10a" string-wise
        assert!(eval("'2' > '10a'").unwrap());
    }

    #[test]
    fn test_and_or_precedence() {
        // And binds tighter than Or
        assert!(eval("true Or false And false").unwrap());
        assert!(!eval("(true Or false) And false").unwrap());
    }

    #[test]
    fn test_not() {
        assert!(eval("!false").unwrap());
        assert!(!eval("!('a' == 'a')").unwrap());
        assert!(eval("!!true").unwrap());
    }

    #[test]
    fn test_empty_condition_fails() {
        assert!(eval("").is_err());
        assert!(eval("   ").is_err());
    }

    #[test]
    fn test_unknown_identifier_fails() {
        assert!(eval("banana").is_err());
    }

    #[test]
    fn test_trailing_tokens_fail() {
        assert!(eval("true true").is_err());
    }

    #[test]
    fn test_exists() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("present.txt"), "x").unwrap();
        let ctx = ConditionContext {
            root_dir: temp.path(),
        };
        assert!(eval_condition("Exists('present.txt')", &ctx).unwrap());
        assert!(!eval_condition("Exists('absent.txt')", &ctx).unwrap());
        assert!(!eval_condition("Exists('')", &ctx).unwrap());
    }

    #[test]
    fn test_has_trailing_slash() {
        assert!(eval("HasTrailingSlash('a/b/')").unwrap());
        assert!(eval("HasTrailingSlash('a\\b\\')").unwrap());
        assert!(!eval("HasTrailingSlash('a/b')").unwrap());
    }

    #[test]
    fn test_contains_item() {
        assert!(eval("ContainsItem('Win64;Linux;Mac', 'linux', ';')").unwrap());
        assert!(!eval("ContainsItem('Win64;Linux', 'Android', ';')").unwrap());
        assert!(eval("ContainsItem('a+b+c', 'b', '+')").unwrap());
    }

    #[test]
    fn test_comparison_of_function_result() {
        assert!(eval("HasTrailingSlash('x/') == true").unwrap());
    }
}
