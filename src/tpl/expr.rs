use crate::error::ExprError;
use crate::tpl::ast::{ArgList, BinaryOp, Expression, Identifier};
use crate::tpl::token::{Token, TokenKind};

/// Something on the operand stack. Argument lists only live here while a
/// call is being scanned; they never escape as an [`Expression`].
enum Operand<'t> {
    Expr(Expression),
    /// Items folded so far, plus the first `,` for error reporting.
    Args(ArgList, &'t Token),
}

/// Something on the operator stack.
enum Pending<'t> {
    Binary(BinaryOp, &'t Token),
    /// `name(`. Every frame records `depth`, the operand stack height when it
    /// opened; nothing reduced inside it may pop below that.
    Call { name: &'t Token, depth: usize },
    Paren { open: &'t Token, depth: usize },
    Bracket { open: &'t Token, depth: usize },
    Comma(&'t Token),
}

impl Pending<'_> {
    /// Operand floor of a grouping frame, `None` for operators.
    fn depth(&self) -> Option<usize> {
        match self {
            Pending::Call { depth, .. }
            | Pending::Paren { depth, .. }
            | Pending::Bracket { depth, .. } => Some(*depth),
            Pending::Binary(..) | Pending::Comma(_) => None,
        }
    }
}

/// Parses the interior of one tag into an expression tree.
///
/// Shunting-yard over two local stacks. Same-priority operators reduce on
/// `>=`, so they group to the left.
pub fn parse_expr(tokens: &[Token]) -> Result<Expression, ExprError> {
    let mut engine = Engine {
        operands: Vec::new(),
        operators: Vec::new(),
    };
    engine.run(tokens)
}

struct Engine<'t> {
    operands: Vec<Operand<'t>>,
    operators: Vec<Pending<'t>>,
}

impl<'t> Engine<'t> {
    fn run(&mut self, tokens: &'t [Token]) -> Result<Expression, ExprError> {
        let mut iter = tokens.iter().peekable();
        while let Some(token) = iter.next() {
            match token.kind {
                TokenKind::Number => self.operands.push(Operand::Expr(Expression::number(&token.value))),
                TokenKind::String => self.operands.push(Operand::Expr(Expression::string(token.unquote()))),
                TokenKind::Name => {
                    if iter.next_if(|next| next.is_punct("(")).is_some() {
                        self.operators.push(Pending::Call {
                            name: token,
                            depth: self.operands.len(),
                        });
                    } else {
                        self.operands.push(Operand::Expr(Expression::ident(&token.value)));
                    }
                }
                TokenKind::Operator => self.operator(token)?,
                TokenKind::Punctuation => self.punctuation(token)?,
                _ => return Err(unexpected(token)),
            }
        }

        while let Some(pending) = self.operators.pop() {
            match pending {
                Pending::Paren { open: t, .. }
                | Pending::Bracket { open: t, .. }
                | Pending::Call { name: t, .. } => {
                    return Err(unexpected(t));
                }
                other => self.reduce(other)?,
            }
        }

        let line = tokens.first().map_or(1, |t| t.line);
        match self.operands.len() {
            0 => Err(ExprError::EmptyStackUnderflow { line }),
            1 => match self.operands.pop() {
                Some(Operand::Expr(expr)) => Ok(expr),
                Some(Operand::Args(_, comma)) => Err(unexpected(comma)),
                None => Err(ExprError::EmptyStackUnderflow { line }),
            },
            count => Err(ExprError::ResidualOperands { count, line }),
        }
    }

    fn operator(&mut self, token: &'t Token) -> Result<(), ExprError> {
        let op = BinaryOp::from_symbol(&token.value).ok_or_else(|| unexpected(token))?;
        while let Some(Pending::Binary(top, _)) = self.operators.last()
            && top.priority() >= op.priority()
        {
            self.reduce_top()?;
        }
        self.operators.push(Pending::Binary(op, token));
        Ok(())
    }

    fn punctuation(&mut self, token: &'t Token) -> Result<(), ExprError> {
        match token.value.as_str() {
            "(" => self.operators.push(Pending::Paren {
                open: token,
                depth: self.operands.len(),
            }),
            "[" => self.operators.push(Pending::Bracket {
                open: token,
                depth: self.operands.len(),
            }),
            "," => {
                while let Some(Pending::Binary(..) | Pending::Comma(_)) = self.operators.last() {
                    self.reduce_top()?;
                }
                self.operators.push(Pending::Comma(token));
            }
            ")" => loop {
                match self.operators.pop() {
                    Some(Pending::Paren { .. }) => break,
                    Some(Pending::Call { name, depth }) => {
                        self.close_call(name, depth, token)?;
                        break;
                    }
                    Some(pending @ (Pending::Binary(..) | Pending::Comma(_))) => {
                        self.reduce(pending)?
                    }
                    Some(Pending::Bracket { .. }) | None => return Err(unexpected(token)),
                }
            },
            "]" => loop {
                match self.operators.pop() {
                    Some(Pending::Bracket { open, depth }) => {
                        if self.operands.len() <= depth {
                            return Err(ExprError::EmptyStackUnderflow { line: token.line });
                        }
                        let index = self.pop_expr(open)?;
                        let base = self.pop_expr(open)?;
                        self.operands
                            .push(Operand::Expr(Expression::index(base, index)));
                        break;
                    }
                    Some(pending @ (Pending::Binary(..) | Pending::Comma(_))) => {
                        self.reduce(pending)?
                    }
                    Some(Pending::Paren { .. } | Pending::Call { .. }) | None => {
                        return Err(unexpected(token));
                    }
                }
            },
            _ => return Err(unexpected(token)),
        }
        Ok(())
    }

    /// Builds the call closed by `)`: zero operands above `depth` means no
    /// argument list, one is the argument list, more is malformed.
    fn close_call(&mut self, name: &Token, depth: usize, close: &Token) -> Result<(), ExprError> {
        let args = match self.operands.len().saturating_sub(depth) {
            0 => None,
            1 => match self.operands.pop() {
                Some(Operand::Args(args, _)) => Some(args),
                Some(Operand::Expr(expr)) => Some(ArgList { items: vec![expr] }),
                None => None,
            },
            count => {
                return Err(ExprError::ResidualOperands {
                    count,
                    line: close.line,
                });
            }
        };
        self.operands.push(Operand::Expr(Expression::Call {
            function: Identifier::new(&name.value),
            args,
        }));
        Ok(())
    }

    fn reduce_top(&mut self) -> Result<(), ExprError> {
        match self.operators.pop() {
            Some(pending) => self.reduce(pending),
            None => Ok(()),
        }
    }

    /// Operand floor of the innermost open frame, 0 at the top level.
    fn floor(&self) -> usize {
        self.operators
            .iter()
            .rev()
            .find_map(Pending::depth)
            .unwrap_or(0)
    }

    /// Both operands of a binary operator or comma must sit above the floor
    /// of the frame it belongs to.
    fn require_operands(&self, at: &Token) -> Result<(), ExprError> {
        if self.operands.len() < self.floor() + 2 {
            return Err(ExprError::EmptyStackUnderflow { line: at.line });
        }
        Ok(())
    }

    fn reduce(&mut self, pending: Pending<'t>) -> Result<(), ExprError> {
        match pending {
            Pending::Binary(op, token) => {
                self.require_operands(token)?;
                let right = self.pop_expr(token)?;
                let left = self.pop_expr(token)?;
                self.operands
                    .push(Operand::Expr(Expression::binary(op, left, right)));
            }
            Pending::Comma(comma) => {
                self.require_operands(comma)?;
                let right = self.pop_expr(comma)?;
                let folded = match self.pop(comma)? {
                    Operand::Args(mut args, first) => {
                        args.items.push(right);
                        Operand::Args(args, first)
                    }
                    Operand::Expr(left) => Operand::Args(
                        ArgList {
                            items: vec![left, right],
                        },
                        comma,
                    ),
                };
                self.operands.push(folded);
            }
            Pending::Paren { open: t, .. }
            | Pending::Bracket { open: t, .. }
            | Pending::Call { name: t, .. } => {
                return Err(unexpected(t));
            }
        }
        Ok(())
    }

    fn pop(&mut self, at: &Token) -> Result<Operand<'t>, ExprError> {
        self.operands
            .pop()
            .ok_or(ExprError::EmptyStackUnderflow { line: at.line })
    }

    /// Pops an operand that has to be a plain expression.
    fn pop_expr(&mut self, at: &Token) -> Result<Expression, ExprError> {
        match self.pop(at)? {
            Operand::Expr(expr) => Ok(expr),
            Operand::Args(_, comma) => Err(unexpected(comma)),
        }
    }
}

fn unexpected(token: &Token) -> ExprError {
    ExprError::UnexpectedToken {
        found: token.describe(),
        line: token.line,
    }
}
