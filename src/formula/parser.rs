use sqleval_core::FreeVariable;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    Var(FreeVariable),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `then if cond else otherwise`
    Conditional {
        then: Box<Expr>,
        cond: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Free variables referenced anywhere in the expression.
    pub fn variables(&self, out: &mut Vec<FreeVariable>) {
        match self {
            Expr::Var(v) => out.push(*v),
            Expr::Neg(e) | Expr::Not(e) => e.variables(out),
            Expr::Binary(_, a, b) | Expr::And(a, b) | Expr::Or(a, b) | Expr::Index(a, b) => {
                a.variables(out);
                b.variables(out);
            }
            Expr::Conditional {
                then,
                cond,
                otherwise,
            } => {
                then.variables(out);
                cond.variables(out);
                otherwise.variables(out);
            }
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

fn lex(src: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                i += 1;
                if i < chars.len() && matches!(chars[i], '+' | '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number literal {:?}", text))?;
            out.push(Tok::Number(value));
        } else if c == '\'' || c == '"' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err("unterminated string literal".into()),
                    Some(q) if *q == c => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).ok_or("unterminated string literal")?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            out.push(Tok::Str(text));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Tok::Name(chars[start..i].iter().collect()));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let (tok, width) = match two.as_str() {
                "**" => (Tok::Op("**"), 2),
                "//" => (Tok::Op("//"), 2),
                "==" => (Tok::Op("=="), 2),
                "!=" => (Tok::Op("!="), 2),
                "<=" => (Tok::Op("<="), 2),
                ">=" => (Tok::Op(">="), 2),
                _ => match c {
                    '+' => (Tok::Op("+"), 1),
                    '-' => (Tok::Op("-"), 1),
                    '*' => (Tok::Op("*"), 1),
                    '/' => (Tok::Op("/"), 1),
                    '%' => (Tok::Op("%"), 1),
                    '<' => (Tok::Op("<"), 1),
                    '>' => (Tok::Op(">"), 1),
                    '(' => (Tok::LParen, 1),
                    ')' => (Tok::RParen, 1),
                    '[' => (Tok::LBracket, 1),
                    ']' => (Tok::RBracket, 1),
                    '.' => return Err("attribute access is not allowed".into()),
                    other => return Err(format!("unexpected character {:?}", other)),
                },
            };
            out.push(tok);
            i += width;
        }
    }
    out.push(Tok::Eof);
    Ok(out)
}

/// Deepest expression tree a formula may build.
pub const MAX_NESTING: usize = 100;

/// Parse a formula. Only the four free variables may be named; calls and
/// attribute access are rejected.
pub fn parse_formula(src: &str) -> Result<Expr, String> {
    let mut parser = Parser {
        tokens: lex(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.conditional()?;
    match parser.peek() {
        Tok::Eof => Ok(expr),
        other => Err(format!("unexpected {:?} after expression", other)),
    }
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
    /// Nesting of the tree under construction; any error aborts the parse,
    /// so it is only unwound on success.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat_name(&mut self, name: &str) -> bool {
        if matches!(self.peek(), Tok::Name(n) if n == name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Tok::Op(op) if ops.contains(op) => {
                let op = *op;
                self.advance();
                Some(op)
            }
            _ => None,
        }
    }

    fn deeper(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nested deeper than {} levels", MAX_NESTING));
        }
        Ok(())
    }

    fn shallower(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn expect(&mut self, tok: Tok) -> Result<(), String> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", tok, self.peek()))
        }
    }

    fn conditional(&mut self) -> Result<Expr, String> {
        let then = self.or()?;
        if !self.eat_name("if") {
            return Ok(then);
        }
        let cond = self.or()?;
        if !self.eat_name("else") {
            return Err("conditional expression is missing `else`".into());
        }
        self.deeper()?;
        let otherwise = self.conditional()?;
        self.shallower(1);
        Ok(Expr::Conditional {
            then: Box::new(then),
            cond: Box::new(cond),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        let mut levels = 0;
        while self.eat_name("or") {
            self.deeper()?;
            levels += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        self.shallower(levels);
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.not()?;
        let mut levels = 0;
        while self.eat_name("and") {
            self.deeper()?;
            levels += 1;
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        self.shallower(levels);
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.eat_name("not") {
            self.deeper()?;
            let inner = self.not()?;
            self.shallower(1);
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    /// `a < b < c` chains into `a < b and b < c`.
    fn comparison(&mut self) -> Result<Expr, String> {
        let first = self.arith()?;
        let mut links = Vec::new();
        let mut right_prev = first.clone();
        let mut levels = 0;
        while let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            self.deeper()?;
            levels += 1;
            let op = match op {
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "<" => BinaryOp::Lt,
                "<=" => BinaryOp::Le,
                ">" => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            };
            let right = self.arith()?;
            links.push(Expr::Binary(op, Box::new(right_prev), Box::new(right.clone())));
            right_prev = right;
        }
        self.shallower(levels);
        let mut links = links.into_iter();
        let Some(head) = links.next() else {
            return Ok(first);
        };
        Ok(links.fold(head, |acc, link| Expr::And(Box::new(acc), Box::new(link))))
    }

    fn arith(&mut self) -> Result<Expr, String> {
        let mut left = self.term()?;
        let mut levels = 0;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            self.deeper()?;
            levels += 1;
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
        self.shallower(levels);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut left = self.factor()?;
        let mut levels = 0;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            self.deeper()?;
            levels += 1;
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "//" => BinaryOp::FloorDiv,
                _ => BinaryOp::Mod,
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.factor()?));
        }
        self.shallower(levels);
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        let Some(op) = self.eat_op(&["-", "+"]) else {
            return self.power();
        };
        self.deeper()?;
        let operand = self.factor()?;
        self.shallower(1);
        Ok(if op == "-" {
            Expr::Neg(Box::new(operand))
        } else {
            operand
        })
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.postfix()?;
        if self.eat_op(&["**"]).is_some() {
            // right associative, and binds tighter than a unary minus on its left
            self.deeper()?;
            let exponent = self.factor()?;
            self.shallower(1);
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        let mut levels = 0;
        loop {
            match self.peek() {
                Tok::LBracket => {
                    self.advance();
                    self.deeper()?;
                    levels += 1;
                    let key = self.conditional()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Tok::LParen => return Err("function calls are not allowed".into()),
                _ => {
                    self.shallower(levels);
                    return Ok(expr);
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Number(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::LParen => {
                self.deeper()?;
                let inner = self.conditional()?;
                self.expect(Tok::RParen)?;
                self.shallower(1);
                Ok(inner)
            }
            Tok::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                _ => FreeVariable::from_str(&name)
                    .map(Expr::Var)
                    .map_err(|_| format!("name '{}' is not defined", name)),
            },
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}
