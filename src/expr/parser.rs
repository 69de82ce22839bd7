//! Tokenizer and recursive-descent parser for correction formulas.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or    := and ( "||" and )*
//! and   := cmp ( "&&" cmp )*
//! cmp   := add ( ( "<" | "<=" | ">" | ">=" | "==" | "!=" ) add )?
//! add   := mul ( ( "+" | "-" ) mul )*
//! mul   := unary ( ( "*" | "/" ) unary )*
//! unary := ( "-" | "+" | "!" ) unary | atom
//! atom  := number | "x" | "[" index "]" | ident "(" or ( "," or )* ")" | "(" or ")"
//! ```

use super::ExprError;

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    /// The free variable `x`.
    Var,
    /// Parameter slot `[i]`.
    Param(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    Log10,
    Log,
    Exp,
    Pow,
    Sqrt,
    Abs,
    Max,
    Min,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        let func = match name {
            "log10" | "TMath::Log10" => Func::Log10,
            "log" | "TMath::Log" => Func::Log,
            "exp" | "TMath::Exp" => Func::Exp,
            "pow" | "TMath::Power" => Func::Pow,
            "sqrt" | "TMath::Sqrt" => Func::Sqrt,
            "abs" | "fabs" | "TMath::Abs" => Func::Abs,
            "max" | "TMath::Max" => Func::Max,
            "min" | "TMath::Min" => Func::Min,
            _ => return None,
        };
        Some(func)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Func::Log10 => "log10",
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Pow => "pow",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Max => "max",
            Func::Min => "min",
        }
    }

    /// Accepted argument counts as `(min, max)`; `None` means variadic.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Pow => (2, Some(2)),
            Func::Max | Func::Min => (1, None),
            _ => (1, Some(1)),
        }
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Placeholder(usize),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if i + 1 < chars.len() {
            let tok = match (c, chars[i + 1]) {
                ('&', '&') => Some(Token::And),
                ('|', '|') => Some(Token::Or),
                ('=', '=') => Some(Token::Eq),
                ('!', '=') => Some(Token::Ne),
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Not),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        match c {
            '[' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start || end >= chars.len() || chars[end] != ']' {
                    return Err(ExprError::Syntax(format!(
                        "malformed placeholder at offset {i}"
                    )));
                }
                let digits: String = chars[start..end].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| ExprError::InvalidNumber(digits.clone()))?;
                tokens.push(Token::Placeholder(index));
                i = end + 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && i > start
                            && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                loop {
                    if i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    } else if i + 1 < chars.len() && chars[i] == ':' && chars[i + 1] == ':' {
                        // Namespaced names such as `TMath::Log10`.
                        i += 2;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(ExprError::UnexpectedChar { ch: c, offset: i });
            }
        }
    }

    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────

pub(crate) fn parse(input: &str) -> Result<Node, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::Syntax("empty expression".to_string()));
    }
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let ast = parser.parse_or()?;
    if let Some(tok) = parser.tokens.get(parser.pos) {
        return Err(ExprError::Syntax(format!(
            "unexpected token after expression: {tok:?}"
        )));
    }
    Ok(ast)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(ExprError::Syntax(format!(
                "expected {expected:?}, got {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Node::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Node, ExprError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        if matches!(
            self.peek(),
            Some(Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge)
        ) {
            return Err(ExprError::Syntax(
                "chained comparisons are not supported; add parentheses".to_string(),
            ));
        }
        Ok(Node::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Node::Neg(Box::new(e)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Node::Not(Box::new(e)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Node, ExprError> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Node::Number(n)),
            Some(Token::Placeholder(i)) => Ok(Node::Param(i)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let func = Func::lookup(&name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    let mut args = vec![self.parse_or()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Token::RParen)?;

                    let (min, max) = func.arity();
                    if args.len() < min || max.is_some_and(|m| args.len() > m) {
                        return Err(ExprError::Arity {
                            func: func.name(),
                            got: args.len(),
                        });
                    }
                    Ok(Node::Call(func, args))
                } else if name == "x" {
                    Ok(Node::Var)
                } else {
                    Err(ExprError::UnknownVariable(name))
                }
            }
            other => Err(ExprError::Syntax(format!(
                "expected number, placeholder, identifier, or '(', got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_placeholders_and_namespaced_names() {
        let tokens = tokenize("TMath::Log10([12]*x)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("TMath::Log10".to_string()),
                Token::LParen,
                Token::Placeholder(12),
                Token::Star,
                Token::Ident("x".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn scientific_literals_keep_their_sign() {
        let tokens = tokenize("1e-05+2.5E+1").unwrap();
        assert_eq!(tokens, vec![Token::Num(1e-5), Token::Plus, Token::Num(25.0)]);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let ast = parse("1+2*x").unwrap();
        assert_eq!(
            ast,
            Node::Binary(
                BinOp::Add,
                Box::new(Node::Number(1.0)),
                Box::new(Node::Binary(
                    BinOp::Mul,
                    Box::new(Node::Number(2.0)),
                    Box::new(Node::Var)
                )),
            )
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse("[a]"), Err(ExprError::Syntax(_))));
        assert!(matches!(parse("[3"), Err(ExprError::Syntax(_))));
        assert!(matches!(parse("1 +"), Err(ExprError::Syntax(_))));
        assert!(matches!(parse("(1"), Err(ExprError::Syntax(_))));
        assert!(matches!(parse("y*2"), Err(ExprError::UnknownVariable(_))));
        assert!(matches!(parse("cosh(x)"), Err(ExprError::UnknownFunction(_))));
        assert!(matches!(parse("pow(x)"), Err(ExprError::Arity { .. })));
        assert!(matches!(parse("x ^ 2"), Err(ExprError::UnexpectedChar { ch: '^', .. })));
        assert!(matches!(parse("1 < x < 3"), Err(ExprError::Syntax(_))));
        assert!(matches!(parse("   "), Err(ExprError::Syntax(_))));
    }
}
