//! Expression grammar using chumsky
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, `== !=`, `< > <= >=`,
//! `+ -`, `* / %`, unary `- !`, atoms.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use super::ast::{BinaryOp, Expr, UnaryOp, Value};
use super::lexer::{self, Token};
use crate::error::ExpressionError;

/// Parse the body of a `${...}` span into an AST
pub fn parse_expression(input: &str) -> Result<Expr, ExpressionError> {
    let len = input.len();

    let tokens = lexer::lex(input).map_err(|span| {
        ExpressionError::new(
            input,
            format!("unexpected character '{}'", &input[span.clone()]),
        )
        .with_span(span)
    })?;

    if tokens.is_empty() {
        return Err(ExpressionError::new(input, "empty expression"));
    }

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expression_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| match errs.into_iter().next() {
            Some(err) => rich_to_error(input, err),
            None => ExpressionError::new(input, "malformed expression"),
        })
}

fn rich_to_error(input: &str, err: Rich<'_, Token>) -> ExpressionError {
    let reason = match err.found() {
        Some(tok) => format!("unexpected {}", format_token(tok)),
        None => "unexpected end of expression".to_string(),
    };
    ExpressionError::new(input, reason).with_span(err.span().into_range())
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Str(s) => format!("string '{}'", s),
        Token::Int(n) => format!("number {}", n),
        Token::Float(x) => format!("number {}", x),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Question => "'?'".to_string(),
        Token::Colon => "':'".to_string(),
        other => format!("operator {:?}", other),
    }
}

fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Expr::Literal(Value::Int(n)),
            Token::Float(x) => Expr::Literal(Value::Float(x)),
            Token::Str(s) => Expr::Literal(Value::Str(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
        };

        let variable = select! {
            Token::Ident(name) => name,
        }
        .map_with(|name, e| {
            let span: SimpleSpan = e.span();
            Expr::Var {
                name,
                span: span.start..span.end,
            }
        });

        let atom = choice((
            literal,
            variable,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
        ))
        .repeated()
        .foldr(atom, |op, operand| Expr::unary(op, operand));

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Rem),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let relational = sum.clone().foldl(
            choice((
                just(Token::LessOrEqual).to(BinaryOp::Le),
                just(Token::GreaterOrEqual).to(BinaryOp::Ge),
                just(Token::Less).to(BinaryOp::Lt),
                just(Token::Greater).to(BinaryOp::Gt),
            ))
            .then(sum)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let equality = relational.clone().foldl(
            choice((
                just(Token::EqEq).to(BinaryOp::Eq),
                just(Token::NotEq).to(BinaryOp::Ne),
            ))
            .then(relational)
            .repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let conjunction = equality.clone().foldl(
            just(Token::AndAnd).to(BinaryOp::And).then(equality).repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let disjunction = conjunction.clone().foldl(
            just(Token::OrOr).to(BinaryOp::Or).then(conjunction).repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        // Ternary is right-associative: `a ? b : c ? d : e`
        disjunction
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(cond, branches)| match branches {
                Some((then_branch, else_branch)) => Expr::Ternary {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                None => cond,
            })
    })
}
