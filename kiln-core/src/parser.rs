//! Parser for one statement.
//!
//! Primary forms are parsed by recursive descent; binary operators use
//! precedence climbing over the binding powers in `binding_power`.

use crate::ast::{Expr, ExprKind, FunctionArg, Literal, Root};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind};

/// Minimum binding power for a function's return expression, so that an
/// assignment-family operator after it is left for the caller.
const RETURN_MIN_BP: u8 = 12;

/// How deeply expressions may nest outside of blocks.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

/// Parse the tokens of one statement (as produced by `lex_statement`).
///
/// `max_depth` bounds block nesting the same way the analyzer bounds scopes:
/// the statement root plus open blocks may not exceed it. Other nesting
/// (parentheses, unary operators, `if`) is capped at [`MAX_EXPRESSION_DEPTH`].
pub fn parse_tokens<'t>(tokens: &'t [Token], max_depth: usize) -> Result<Root<'t>, CoreError> {
    let Some(first) = tokens.first() else {
        return Err(CoreError::internal(None, "parser received no tokens"));
    };
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
        blocks: 0,
        max_depth,
    };
    let mut expressions = Vec::new();
    while !parser.peek().kind.is_terminator() {
        expressions.push(parser.parse_expression()?);
    }
    Ok(Root {
        token: first,
        expressions,
    })
}

/// Left and right binding power of a binary operator.
pub fn binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    use TokenKind::*;
    let power = match kind {
        PlusPlus | MinusMinus | LParen | LBracket => (35, 36),
        Star | Slash | Percent => (33, 34),
        Plus | Minus => (31, 32),
        Shl | Shr => (29, 30),
        Greater | Less | GreaterEq | LessEq => (27, 28),
        EqEq | NotEq => (25, 26),
        Amp => (23, 24),
        Caret => (21, 22),
        Pipe => (19, 20),
        AndAnd => (17, 18),
        OrOr => (15, 16),
        Equals | PlusEq | MinusEq | StarEq | SlashEq | PercentEq | ShlEq | ShrEq | AmpEq
        | CaretEq | PipeEq => (10, 11),
        _ => return None,
    };
    Some(power)
}

struct Parser<'t> {
    tokens: &'t [Token],
    position: usize,
    /// Active `parse_unary` frames.
    depth: usize,
    /// Open blocks.
    blocks: usize,
    max_depth: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &'t Token {
        let tokens: &'t [Token] = self.tokens;
        &tokens[self.position.min(tokens.len() - 1)]
    }

    /// Return the current token and move past it.
    fn next(&mut self) -> Result<&'t Token, CoreError> {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return Err(CoreError::syntax(token.span, "unexpected end of file"));
        }
        self.position += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: TokenKind) -> Result<&'t Token, CoreError> {
        let token = self.peek();
        if token.kind != expected {
            return Err(CoreError::syntax(
                token.span,
                format!(
                    "unexpected token, expected {}, got {}",
                    expected.describe(),
                    token.kind.describe()
                ),
            ));
        }
        self.next()
    }

    fn parse_expression(&mut self) -> Result<Expr<'t>, CoreError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr<'t>, CoreError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = self.peek();
            let Some((left_bp, right_bp)) = binding_power(op.kind) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.next()?;
            let right = self.parse_binary(right_bp)?;
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    right: Box::new(right),
                    op,
                },
                op,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr<'t>, CoreError> {
        let token = self.peek();
        if self.depth - self.blocks >= MAX_EXPRESSION_DEPTH {
            return Err(CoreError::syntax(
                token.span,
                format!("expression nested more than {MAX_EXPRESSION_DEPTH} levels deep"),
            ));
        }
        self.depth += 1;
        let expr = self.parse_prefix(token);
        self.depth -= 1;
        expr
    }

    fn parse_prefix(&mut self, token: &'t Token) -> Result<Expr<'t>, CoreError> {
        if token.kind == TokenKind::If {
            self.next()?;
            let condition = self.parse_expression()?;
            let then = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::If {
                    condition: Box::new(condition),
                    then: Box::new(then),
                },
                token,
            ));
        }

        let Some(operand) = self.parse_operand()? else {
            return Err(CoreError::syntax(
                token.span,
                format!(
                    "expected operand for expression, got {}",
                    token.kind.describe()
                ),
            ));
        };
        self.parse_atom(operand)
    }

    /// Primary forms. `Ok(None)` means the current token starts no operand.
    fn parse_operand(&mut self) -> Result<Option<Expr<'t>>, CoreError> {
        let token = self.peek();
        let expr = match token.kind {
            TokenKind::Fn => self.parse_func()?,
            TokenKind::Ident => Expr::new(ExprKind::Identifier, self.next()?),
            TokenKind::Char => {
                self.next()?;
                let byte = token.text().bytes().next().unwrap_or(0);
                Expr::new(ExprKind::Literal(Literal::Char(byte)), token)
            }
            TokenKind::Number => {
                self.next()?;
                Expr::new(ExprKind::Literal(parse_number(token)?), token)
            }
            TokenKind::True | TokenKind::False => {
                self.next()?;
                let value = token.kind == TokenKind::True;
                Expr::new(ExprKind::Literal(Literal::Bool(value)), token)
            }
            TokenKind::Str => Expr::new(ExprKind::String, self.next()?),
            TokenKind::LParen => {
                self.next()?;
                let inner = self.parse_expression()?;
                self.eat(TokenKind::RParen)?;
                inner
            }
            TokenKind::LBrace => self.parse_block()?,
            TokenKind::LBracket => {
                return Err(CoreError::unsupported(
                    token.span,
                    "array literals are not implemented",
                ));
            }
            TokenKind::Struct => {
                return Err(CoreError::unsupported(
                    token.span,
                    "struct types are not implemented",
                ));
            }
            _ => return Ok(None),
        };
        Ok(Some(expr))
    }

    fn parse_block(&mut self) -> Result<Expr<'t>, CoreError> {
        let open = self.eat(TokenKind::LBrace)?;
        // The statement root takes one level.
        if self.blocks + 1 >= self.max_depth {
            return Err(CoreError::ScopeOverflow {
                span: open.span,
                limit: self.max_depth,
            });
        }
        self.blocks += 1;
        let children = self.parse_block_children(open);
        self.blocks -= 1;
        Ok(Expr::new(ExprKind::Block(children?), open))
    }

    fn parse_block_children(&mut self, open: &'t Token) -> Result<Vec<Expr<'t>>, CoreError> {
        let mut children = Vec::new();
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next()?;
                    break;
                }
                kind if kind.is_terminator() || kind == TokenKind::Eof => {
                    return Err(CoreError::syntax(
                        open.span.join(token.span),
                        "unterminated block, expected `}`",
                    ));
                }
                _ => children.push(self.parse_expression()?),
            }
        }
        Ok(children)
    }

    /// Trailing call and declaration syntax after an operand.
    fn parse_atom(&mut self, mut operand: Expr<'t>) -> Result<Expr<'t>, CoreError> {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::LParen => {
                    self.next()?;
                    let args = self.parse_call_arguments(token)?;
                    operand = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(operand),
                            args,
                        },
                        token,
                    );
                }
                TokenKind::Colon => {
                    if !matches!(operand.kind, ExprKind::Identifier) {
                        return Err(CoreError::syntax(
                            token.span,
                            "expected identifier before ':' declaration",
                        ));
                    }
                    self.next()?;
                    let annotation = if self.peek().kind == TokenKind::Equals {
                        self.next()?;
                        None
                    } else {
                        let type_token = self.peek();
                        let Some(annotation) = self.parse_operand()? else {
                            return Err(CoreError::syntax(
                                type_token.span,
                                format!(
                                    "expected type after ':', got {}",
                                    type_token.kind.describe()
                                ),
                            ));
                        };
                        self.eat(TokenKind::Equals)?;
                        Some(Box::new(annotation))
                    };
                    let init = self.parse_expression()?;
                    operand = Expr::new(
                        ExprKind::Declaration {
                            name: operand.token,
                            annotation,
                            init: Box::new(init),
                        },
                        token,
                    );
                }
                _ => break,
            }
        }
        Ok(operand)
    }

    fn parse_call_arguments(&mut self, open: &'t Token) -> Result<Vec<Expr<'t>>, CoreError> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.next()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            let token = self.peek();
            match token.kind {
                TokenKind::Comma => {
                    self.next()?;
                }
                TokenKind::RParen => {
                    self.next()?;
                    return Ok(args);
                }
                kind if kind.is_terminator() || kind == TokenKind::Eof => {
                    return Err(CoreError::syntax(
                        open.span.join(token.span),
                        "unterminated call, expected `)`",
                    ));
                }
                other => {
                    return Err(CoreError::syntax(
                        token.span,
                        format!(
                            "unexpected token in call arguments, expected comma or right parenthesis, got {}",
                            other.describe()
                        ),
                    ));
                }
            }
        }
    }

    /// `fn name(args) [-> ret]`
    fn parse_func(&mut self) -> Result<Expr<'t>, CoreError> {
        let token = self.eat(TokenKind::Fn)?;
        let name = self.eat(TokenKind::Ident)?;
        let args = self.parse_func_arguments()?;
        let ret = if self.peek().kind == TokenKind::Arrow {
            self.next()?;
            Some(Box::new(self.parse_binary(RETURN_MIN_BP)?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::FunctionDef { name, args, ret }, token))
    }

    fn parse_func_arguments(&mut self) -> Result<Vec<FunctionArg<'t>>, CoreError> {
        self.eat(TokenKind::LParen)?;
        let mut args = Vec::new();
        loop {
            if self.peek().kind == TokenKind::RParen {
                self.next()?;
                return Ok(args);
            }
            args.push(self.parse_func_arg()?);
            if self.peek().kind == TokenKind::Comma {
                self.next()?;
            } else {
                self.eat(TokenKind::RParen)?;
                return Ok(args);
            }
        }
    }

    fn parse_func_arg(&mut self) -> Result<FunctionArg<'t>, CoreError> {
        let name = self.eat(TokenKind::Ident)?;
        if self.peek().kind != TokenKind::Colon {
            // TODO: default values for function arguments
            return Ok(FunctionArg {
                name,
                type_name: name,
            });
        }
        self.next()?;
        let type_name = self.eat(TokenKind::Ident)?;
        Ok(FunctionArg { name, type_name })
    }
}

fn parse_number(token: &Token) -> Result<Literal, CoreError> {
    let text = token.text();
    if text.contains('.') {
        return text.parse::<f64>().map(Literal::Float).map_err(|_| {
            CoreError::lex(token.span, format!("invalid floating-point literal `{text}`"))
        });
    }
    text.parse::<i64>().map(Literal::Int).map_err(|_| {
        CoreError::lex(
            token.span,
            format!("integer literal `{text}` does not fit in 64 bits"),
        )
    })
}
