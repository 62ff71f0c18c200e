//! Arithmetic expression engine used by `calc` and `eval`.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident | ident '(' expr ')' | '(' expr ')'
//! ```

use std::fmt;

use crate::{errors::Error, Result};

const MAX_INPUT: usize = 512;
const MAX_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ln,
    Log,
    Exp,
    Abs,
    Floor,
    Ceil,
    Round,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Func::Sqrt,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "exp" => Func::Exp,
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Sqrt => "sqrt",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Ln => "ln",
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Abs => "abs",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
        }
    }

    fn apply(self, x: f64) -> Result<f64> {
        let domain = |ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidArgument(format!(
                    "math domain error: {}({})",
                    self.name(),
                    format_number(x)
                )))
            }
        };
        Ok(match self {
            Func::Sqrt => {
                domain(x >= 0.0)?;
                x.sqrt()
            }
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => {
                domain((-1.0..=1.0).contains(&x))?;
                x.asin()
            }
            Func::Acos => {
                domain((-1.0..=1.0).contains(&x))?;
                x.acos()
            }
            Func::Atan => x.atan(),
            Func::Ln => {
                domain(x > 0.0)?;
                x.ln()
            }
            Func::Log => {
                domain(x > 0.0)?;
                x.log10()
            }
            Func::Exp => x.exp(),
            Func::Abs => x.abs(),
            Func::Floor => x.floor(),
            Func::Ceil => x.ceil(),
            Func::Round => x.round(),
        })
    }
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Const(&'static str),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn eval(&self) -> Result<f64> {
        match self {
            Expr::Num(n) => Ok(*n),
            Expr::Const("pi") => Ok(std::f64::consts::PI),
            Expr::Const("tau") => Ok(std::f64::consts::TAU),
            Expr::Const(_) => Ok(std::f64::consts::E),
            Expr::Neg(inner) => Ok(-inner.eval()?),
            Expr::Call(func, arg) => func.apply(arg.eval()?),
            Expr::Bin(op, lhs, rhs) => {
                let (a, b) = (lhs.eval()?, rhs.eval()?);
                match op {
                    BinOp::Add => Ok(a + b),
                    BinOp::Sub => Ok(a - b),
                    BinOp::Mul => Ok(a * b),
                    BinOp::Div if b == 0.0 => {
                        Err(Error::InvalidArgument("division by zero".to_string()))
                    }
                    BinOp::Div => Ok(a / b),
                    BinOp::Rem if b == 0.0 => {
                        Err(Error::InvalidArgument("modulo by zero".to_string()))
                    }
                    // Sign follows the divisor.
                    BinOp::Rem => Ok(a - b * (a / b).floor()),
                    BinOp::Pow => Ok(a.powf(b)),
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", format_number(*n)),
            Expr::Const(name) => write!(f, "{name}"),
            Expr::Neg(inner) => write!(f, "-({inner})"),
            Expr::Bin(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Call(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent suffix: 1e3, 2.5E-4
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidArgument(format!("invalid number: {text}")))?;
                out.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                out.push(Token::Ident(ident.to_lowercase()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                out.push(Token::Op(c));
                i += 1;
            }
            '×' => {
                out.push(Token::Op('*'));
                i += 1;
            }
            '÷' => {
                out.push(Token::Op('/'));
                i += 1;
            }
            '−' => {
                out.push(Token::Op('-'));
                i += 1;
            }
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }

    Ok(out)
}

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
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::InvalidArgument("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr> {
        self.descend()?;
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/', '%']) {
            let rhs = self.unary()?;
            let op = match op {
                '*' => BinOp::Mul,
                '/' => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.eat_op(&['-', '+']) {
            Some(op) => {
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(if op == '-' {
                    Expr::Neg(Box::new(inner))
                } else {
                    inner
                })
            }
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            self.descend()?;
            let exp = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if let Some(func) = Func::from_name(&name) {
                    if self.peek() != Some(&Token::LParen) {
                        return Err(Error::InvalidArgument(format!(
                            "{name} needs an argument: {name}(x)"
                        )));
                    }
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    return Ok(Expr::Call(func, Box::new(arg)));
                }
                match name.as_str() {
                    "pi" => Ok(Expr::Const("pi")),
                    "tau" => Ok(Expr::Const("tau")),
                    "e" => Ok(Expr::Const("e")),
                    _ => Err(Error::InvalidArgument(format!("unknown name '{name}'"))),
                }
            }
            Some(Token::Op(c)) => Err(Error::InvalidArgument(format!("unexpected '{c}'"))),
            Some(Token::RParen) => Err(Error::InvalidArgument("unexpected ')'".to_string())),
            None => Err(Error::InvalidArgument("unexpected end of expression".to_string())),
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(Error::InvalidArgument("missing ')'".to_string())),
        }
    }
}

pub fn parse(input: &str) -> Result<Expr> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidArgument("empty expression".to_string()));
    }
    if input.chars().count() > MAX_INPUT {
        return Err(Error::InvalidArgument("expression too long".to_string()));
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(Error::InvalidArgument(format!("unexpected token {tok:?}")));
    }
    Ok(expr)
}

/// Parse and evaluate. Non-finite results are rejected.
pub fn evaluate(input: &str) -> Result<f64> {
    let value = parse(input)?.eval()?;
    if !value.is_finite() {
        return Err(Error::InvalidArgument("result is not a finite number".to_string()));
    }
    Ok(value)
}

/// Integers without a fraction; everything else with up to 10 decimals, trailing zeros trimmed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    if n.abs() >= 1e15 || (n != 0.0 && n.abs() < 1e-6) {
        return format!("{n:e}");
    }
    let s = format!("{n:.10}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> f64 {
        evaluate(s).unwrap()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("2 ** 10"), 1024.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ^ -1"), 0.5);
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("-7 % 3"), 2.0);
        assert_eq!(eval("6 × 7 ÷ 2"), 21.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("sqrt(16)"), 4.0);
        assert!((eval("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert!((eval("ln(e)") - 1.0).abs() < 1e-12);
        assert_eq!(eval("log(1000)"), 3.0);
        assert_eq!(eval("abs(-3) + floor(2.7) + ceil(0.2) + round(1.5)"), 8.0);
        assert_eq!(eval("1.5e3"), 1500.0);
    }

    #[test]
    fn errors_are_invalid_arguments() {
        for bad in ["", "1 +", "(1 + 2", "1 / 0", "5 % 0", "sqrt(-1)", "foo(2)", "2 $ 3", "sqrt 4", "1 2"] {
            let err = evaluate(bad).unwrap_err();
            assert!(err.is_usage(), "{bad}: {err}");
        }
        assert!(evaluate("10 ^ 400").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(evaluate(&deep).is_err());
        let ok = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(eval(&ok), 1.0);
    }

    #[test]
    fn parsed_form_is_fully_parenthesized() {
        let expr = parse("1 + 2 * sqrt(9)").unwrap();
        assert_eq!(expr.to_string(), "(1 + (2 * sqrt(9)))");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(2.5), "2.5");
    }
}
