// src/query/parser.rs

//! Recursive-descent parser from [`Lexeme`]s to an [`Expr`] tree.
//!
//! Precedence, lowest first:
//!
//! ```text
//! or_expr    := and_expr ( ("or" | "||") and_expr )*
//! and_expr   := not_expr ( ("and" | "&&") not_expr )*
//! not_expr   := ("not" | "!") not_expr | comparison
//! comparison := unary ( cmp_op unary )*
//! cmp_op     := "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not" "in"
//! unary      := "-" unary | postfix
//! postfix    := atom ( "[" or_expr "]" )*
//! atom       := INT | FLOAT | STRING | "true" | "false" | NAME
//!             | "(" or_expr ")" | "[" ( or_expr ( "," or_expr )* ","? )? "]"
//! ```
//!
//! The resulting tree is at most [`NESTING_MAX`] levels deep; deeper input is
//! a [`QueryError::Syntax`]. Parsing and evaluation recurse once per level.
//!
//! [`Lexeme`]: crate::query::lexer::Lexeme

use crate::query::lexer::{Lexeme, Token};
use crate::query::QueryError;

use ::serde_json::Value;

/// Deepest nesting of parentheses, lists, unary operators, indexing and
/// chained `and`/`or` operands accepted by [`parse`].
pub const NESTING_MAX: usize = 256;

/// Comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

/// Query expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    /// A record field or a level constant.
    Name(String),
    /// `base[key]`
    Index(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `first op1 e1 op2 e2 …`, i.e. `first op1 e1 and e1 op2 e2 …`
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

/// Parse all `lexemes`; they must end with [`Token::Eof`].
pub fn parse(lexemes: &[Lexeme]) -> Result<Expr, QueryError> {
    let mut parser = Parser { lexemes, at: 0, depth: 0 };
    if parser.peek() == &Token::Eof {
        return Err(QueryError::Syntax {
            column: 1,
            message: String::from("empty expression"),
        });
    }
    let expr = parser.or_expr()?;
    if parser.peek() != &Token::Eof {
        return Err(parser.unexpected());
    }

    Ok(expr)
}

struct Parser<'a> {
    lexemes: &'a [Lexeme],
    at: usize,
    /// current nesting, see [`NESTING_MAX`]
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &'a Token {
        // the last lexeme is always `Eof`
        let at = std::cmp::min(self.at, self.lexemes.len() - 1);

        &self.lexemes[at].token
    }

    fn peek2(&self) -> &'a Token {
        let at = std::cmp::min(self.at + 1, self.lexemes.len() - 1);

        &self.lexemes[at].token
    }

    fn column(&self) -> usize {
        let at = std::cmp::min(self.at, self.lexemes.len() - 1);

        self.lexemes[at].column
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if self.at < self.lexemes.len() - 1 {
            self.at += 1;
        }

        token
    }

    fn unexpected(&self) -> QueryError {
        let message = match self.peek() {
            Token::Eof => String::from("unexpected end of expression"),
            token => format!("unexpected {:?}", token),
        };

        QueryError::Syntax { column: self.column(), message }
    }

    /// Enter one more nesting level. Callers restore `depth` on success.
    fn nest(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > NESTING_MAX {
            return Err(QueryError::Syntax {
                column: self.column(),
                message: String::from("expression nested too deeply"),
            });
        }

        Ok(())
    }

    fn expect(
        &mut self,
        token: Token,
    ) -> Result<(), QueryError> {
        if self.peek() != &token {
            return Err(self.unexpected());
        }
        self.advance();

        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expr, QueryError> {
        let depth = self.depth;
        let mut left = self.and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            // each operand deepens the left-leaning tree
            self.nest()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;

        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, QueryError> {
        let depth = self.depth;
        let mut left = self.not_expr()?;
        while self.peek() == &Token::And {
            self.advance();
            self.nest()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;

        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, QueryError> {
        if self.peek() == &Token::Not {
            self.advance();
            self.nest()?;
            let operand = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }

        self.comparison()
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let op = match (self.peek(), self.peek2()) {
            (Token::Eq, _) => CmpOp::Eq,
            (Token::Ne, _) => CmpOp::Ne,
            (Token::Lt, _) => CmpOp::Lt,
            (Token::Le, _) => CmpOp::Le,
            (Token::Gt, _) => CmpOp::Gt,
            (Token::Ge, _) => CmpOp::Ge,
            (Token::In, _) => CmpOp::In,
            (Token::Not, Token::In) => {
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();

        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let depth = self.depth;
        let first = self.unary()?;
        let mut rest: Vec<(CmpOp, Expr)> = Vec::new();
        while let Some(op) = self.cmp_op() {
            if rest.is_empty() {
                self.nest()?;
            }
            let operand = self.unary()?;
            rest.push((op, operand));
        }
        self.depth = depth;
        if rest.is_empty() {
            return Ok(first);
        }

        Ok(Expr::Compare(Box::new(first), rest))
    }

    fn unary(&mut self) -> Result<Expr, QueryError> {
        if self.peek() == &Token::Minus {
            self.advance();
            self.nest()?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(operand)));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, QueryError> {
        let depth = self.depth;
        let mut base = self.atom()?;
        while self.peek() == &Token::LBracket {
            self.advance();
            self.nest()?;
            let key = self.or_expr()?;
            self.expect(Token::RBracket)?;
            base = Expr::Index(Box::new(base), Box::new(key));
        }
        self.depth = depth;

        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, QueryError> {
        let expr = match self.peek() {
            Token::Int(n) => Expr::Literal(Value::from(*n)),
            Token::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Expr::Literal(Value::Number(n)),
                None => return Err(self.unexpected()),
            },
            Token::Str(s) => Expr::Literal(Value::String(s.clone())),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Ident(name) => Expr::Name(name.clone()),
            Token::LParen => {
                self.advance();
                self.nest()?;
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                self.nest()?;
                let mut items: Vec<Expr> = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.or_expr()?);
                    if self.peek() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                self.depth -= 1;
                return Ok(Expr::List(items));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();

        Ok(expr)
    }
}
