//! Prefix expression grammar.
//!
//! Descriptor expressions are small S-expressions:
//!
//! ```text
//! expr    := number | form
//! form    := "(" op expr expr ")"
//!          | "(" "fieldref" name integer* ")"
//!          | "(" name expr* ")"            ; opaque call
//! op      := "+" | "-" | "*" | "/"
//! ```
//!
//! Field names resolve against the grid under construction, so offset
//! arity is checked here, before anything reaches the core model.

use gridfuse_core::{BinOp, Expr, Grid};

use crate::error::{FrontendError, FrontendResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Int(i64),
    Float(f32),
    Symbol(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Symbol(s) => s.clone(),
        }
    }
}

fn tokenize(src: &str) -> FrontendResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '(' || c == ')' || c.is_whitespace() {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(classify(word)?);
            }
        }
    }
    Ok(tokens)
}

/// A bare `-` or `+` is an operator symbol; anything starting with a
/// digit (or a sign followed by one) is numeric.
fn classify(word: String) -> FrontendResult<Token> {
    let numeric = match word.as_bytes() {
        [b'-' | b'+', rest @ ..] => !rest.is_empty() && rest[0].is_ascii_digit(),
        [first, ..] => first.is_ascii_digit(),
        [] => false,
    };
    if !numeric {
        return Ok(Token::Symbol(word));
    }
    if let Ok(v) = word.parse::<i64>() {
        return Ok(Token::Int(v));
    }
    if let Ok(v) = word.parse::<f32>() {
        return Ok(Token::Float(v));
    }
    Err(FrontendError::BadNumber(word))
}

/// Parse one expression over `grid`'s fields.
pub fn parse(grid: &Grid, src: &str) -> FrontendResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { grid, tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(FrontendError::UnexpectedToken(
            parser.tokens[parser.pos].describe(),
        ));
    }
    Ok(expr)
}

struct Parser<'g> {
    grid: &'g Grid,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> FrontendResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FrontendError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_rparen(&self) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::RParen))
    }

    fn expect_rparen(&mut self) -> FrontendResult<()> {
        match self.next()? {
            Token::RParen => Ok(()),
            other => Err(FrontendError::UnexpectedToken(other.describe())),
        }
    }

    fn expr(&mut self) -> FrontendResult<Expr> {
        match self.next()? {
            Token::Int(v) => Ok(Expr::IntConst(v)),
            Token::Float(v) => Ok(Expr::F32Const(v)),
            Token::LParen => self.form(),
            other => Err(FrontendError::UnexpectedToken(other.describe())),
        }
    }

    fn form(&mut self) -> FrontendResult<Expr> {
        let head = match self.next()? {
            Token::Symbol(s) => s,
            other => return Err(FrontendError::UnexpectedToken(other.describe())),
        };

        let op = match head.as_str() {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = op {
            let lhs = self.expr()?;
            let rhs = self.expr()?;
            self.expect_rparen()?;
            return Ok(Expr::binary(op, lhs, rhs));
        }

        if head == "fieldref" {
            return self.fieldref();
        }

        // Opaque call
        let mut args = Vec::new();
        while !self.peek_rparen() {
            if self.pos >= self.tokens.len() {
                return Err(FrontendError::UnexpectedEnd);
            }
            args.push(self.expr()?);
        }
        self.expect_rparen()?;
        Ok(Expr::call(head, args))
    }

    fn fieldref(&mut self) -> FrontendResult<Expr> {
        let name = match self.next()? {
            Token::Symbol(s) => s,
            other => return Err(FrontendError::UnexpectedToken(other.describe())),
        };
        let field = self
            .grid
            .field_by_name(&name)
            .ok_or_else(|| FrontendError::UnknownField(name.clone()))?;

        let mut offsets = Vec::new();
        loop {
            if self.peek_rparen() {
                self.expect_rparen()?;
                break;
            }
            match self.next()? {
                Token::Int(v) => offsets.push(v),
                other => return Err(FrontendError::UnexpectedToken(other.describe())),
            }
        }

        if offsets.len() != self.grid.dims() {
            return Err(FrontendError::OffsetCount {
                field: name,
                expected: self.grid.dims(),
                actual: offsets.len(),
            });
        }
        Ok(Expr::field_ref(field, offsets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfuse_core::ElementType;

    fn one_dim_grid() -> Grid {
        let mut grid = Grid::new("g", 1);
        grid.attach_field("A", ElementType::F32).unwrap();
        grid
    }

    #[test]
    fn test_parse_weighted_three_point() {
        let grid = one_dim_grid();
        let expr = parse(
            &grid,
            "(* 0.333 (+ (+ (fieldref A -1) (fieldref A 0)) (fieldref A 1)))",
        )
        .unwrap();
        // One multiply plus two adds.
        assert_eq!(expr.op_count(), 3.0);
        let a = grid.field_by_name("A").unwrap();
        assert!(expr.fields().contains(&a));
    }

    #[test]
    fn test_parse_call() {
        let grid = one_dim_grid();
        let expr = parse(&grid, "(min (fieldref A 0) 4)").unwrap();
        assert!(matches!(expr, Expr::Call { ref name, ref args } if name == "min" && args.len() == 2));
    }

    #[test]
    fn test_negative_literal_vs_subtraction() {
        let grid = one_dim_grid();
        assert!(matches!(parse(&grid, "-4").unwrap(), Expr::IntConst(-4)));
        let expr = parse(&grid, "(- (fieldref A 0) 1)").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn test_float_literal() {
        let grid = one_dim_grid();
        assert!(matches!(parse(&grid, "0.5").unwrap(), Expr::F32Const(v) if v == 0.5));
    }

    #[test]
    fn test_unknown_field() {
        let grid = one_dim_grid();
        assert!(matches!(
            parse(&grid, "(fieldref Q 0)"),
            Err(FrontendError::UnknownField(name)) if name == "Q"
        ));
    }

    #[test]
    fn test_offset_count_mismatch() {
        let grid = one_dim_grid();
        assert!(matches!(
            parse(&grid, "(fieldref A 0 1)"),
            Err(FrontendError::OffsetCount { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_expression() {
        let grid = one_dim_grid();
        assert!(matches!(
            parse(&grid, "(+ 1"),
            Err(FrontendError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let grid = one_dim_grid();
        assert!(matches!(
            parse(&grid, "1 2"),
            Err(FrontendError::UnexpectedToken(t)) if t == "2"
        ));
    }

    #[test]
    fn test_non_integer_offset_rejected() {
        let grid = one_dim_grid();
        assert!(matches!(
            parse(&grid, "(fieldref A 0.5)"),
            Err(FrontendError::UnexpectedToken(_))
        ));
    }
}
