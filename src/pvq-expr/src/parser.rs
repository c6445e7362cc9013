//! Parser for the computed-field expression language
//!
//! Converts expression strings into [`Expr`](crate::ast::Expr) trees using nom
//! parser combinators. Precedence, lowest to highest: ternary, `||`, `&&`,
//! comparisons, additive, multiplicative, unary, primary.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char as nom_char, digit1, multispace0, satisfy},
    combinator::{all_consuming, opt, recognize},
    error::ErrorKind,
    multi::separated_list0,
    sequence::{pair, preceded, terminated},
    IResult, Parser,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, Function, Literal, UnaryOp};
use crate::error::{ParseError, Result};

/// Parse a computed-field expression.
///
/// Bare identifiers (other than `true`/`false`/`null`) are a compile error in
/// this mode: record fields must be spelled `{{field}}`.
pub fn parse(input: &str) -> Result<Expr> {
    let expr = parse_formula(input)?;
    if let Some(name) = expr.first_ident() {
        return Err(ParseError::UnknownIdentifier {
            name: name.to_string(),
        });
    }
    Ok(expr)
}

/// Parse a formula-metric expression.
///
/// Bare identifiers are allowed and resolve against the metric scope at
/// evaluation time.
pub fn parse_formula(input: &str) -> Result<Expr> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    match all_consuming(terminated(parse_ternary, multispace0)).parse(trimmed) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(e.custom.unwrap_or_else(|| {
            ParseError::InvalidSyntax {
                message: format!("unexpected input near '{}'", truncate(e.input)),
            }
        })),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::InvalidSyntax {
            message: "incomplete input".to_string(),
        }),
    }
}

/// Builtin functions by source name.
static BUILTIN_FUNCTIONS: Lazy<HashMap<&'static str, Function>> = Lazy::new(|| {
    [
        Function::Date,
        Function::Number,
        Function::Text,
        Function::Len,
        Function::Empty,
        Function::Ts,
        Function::DateDiff,
        Function::HoursBetween,
        Function::DaysBetween,
    ]
    .into_iter()
    .map(|f| (f.as_str(), f))
    .collect()
});

/// Parser error carrying an optional rich [`ParseError`].
#[derive(Debug)]
struct PErr<'a> {
    input: &'a str,
    custom: Option<ParseError>,
}

impl<'a> nom::error::ParseError<&'a str> for PErr<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        PErr {
            input,
            custom: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

fn fail_with(input: &str, error: ParseError) -> nom::Err<PErr<'_>> {
    nom::Err::Failure(PErr {
        input,
        custom: Some(error),
    })
}

type PResult<'a, T> = IResult<&'a str, T, PErr<'a>>;

fn truncate(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(20)
        .map_or_else(|| s.len(), |(idx, _)| idx);
    &s[..end]
}

fn parse_ternary(input: &str) -> PResult<'_, Expr> {
    let (input, cond) = parse_or(input)?;
    let (input, question) = opt(preceded(multispace0, nom_char('?'))).parse(input)?;
    if question.is_none() {
        return Ok((input, cond));
    }
    let (input, then) = parse_ternary(input)?;
    let (input, colon) = opt(preceded(multispace0, nom_char(':'))).parse(input)?;
    if colon.is_none() {
        return Err(fail_with(
            input,
            ParseError::InvalidSyntax {
                message: "expected ':' in conditional expression".to_string(),
            },
        ));
    }
    let (input, otherwise) = parse_ternary(input)?;
    Ok((
        input,
        Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
    ))
}

fn parse_or(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = parse_and(input)?;
    loop {
        match preceded(preceded(multispace0, tag("||")), parse_and).parse(input) {
            Ok((rest, rhs)) => {
                expr = Expr::Binary {
                    op: BinaryOp::Or,
                    left: Box::new(expr),
                    right: Box::new(rhs),
                };
                input = rest;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((input, expr))
}

fn parse_and(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = parse_comparison(input)?;
    loop {
        match preceded(preceded(multispace0, tag("&&")), parse_comparison).parse(input) {
            Ok((rest, rhs)) => {
                expr = Expr::Binary {
                    op: BinaryOp::And,
                    left: Box::new(expr),
                    right: Box::new(rhs),
                };
                input = rest;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((input, expr))
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    preceded(
        multispace0,
        alt((
            tag("==").map(|_| BinaryOp::Eq),
            tag("!=").map(|_| BinaryOp::Ne),
            tag(">=").map(|_| BinaryOp::Ge),
            tag("<=").map(|_| BinaryOp::Le),
            tag(">").map(|_| BinaryOp::Gt),
            tag("<").map(|_| BinaryOp::Lt),
        )),
    )
    .parse(input)
}

fn parse_comparison(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = parse_additive(input)?;
    loop {
        match pair(comparison_op, parse_additive).parse(input) {
            Ok((rest, (op, rhs))) => {
                expr = Expr::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(rhs),
                };
                input = rest;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((input, expr))
}

fn additive_op(input: &str) -> PResult<'_, BinaryOp> {
    preceded(
        multispace0,
        alt((
            nom_char('+').map(|_| BinaryOp::Add),
            nom_char('-').map(|_| BinaryOp::Sub),
        )),
    )
    .parse(input)
}

fn parse_additive(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = parse_multiplicative(input)?;
    loop {
        match pair(additive_op, parse_multiplicative).parse(input) {
            Ok((rest, (op, rhs))) => {
                expr = Expr::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(rhs),
                };
                input = rest;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((input, expr))
}

fn multiplicative_op(input: &str) -> PResult<'_, BinaryOp> {
    preceded(
        multispace0,
        alt((
            nom_char('*').map(|_| BinaryOp::Mul),
            nom_char('/').map(|_| BinaryOp::Div),
            nom_char('%').map(|_| BinaryOp::Mod),
        )),
    )
    .parse(input)
}

fn parse_multiplicative(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = parse_unary(input)?;
    loop {
        match pair(multiplicative_op, parse_unary).parse(input) {
            Ok((rest, (op, rhs))) => {
                expr = Expr::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(rhs),
                };
                input = rest;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((input, expr))
}

fn unary_op(input: &str) -> PResult<'_, UnaryOp> {
    preceded(
        multispace0,
        alt((
            // '!' must not swallow the '!=' operator
            terminated(nom_char('!'), nom::combinator::not(nom_char('='))).map(|_| UnaryOp::Not),
            nom_char('-').map(|_| UnaryOp::Neg),
            nom_char('+').map(|_| UnaryOp::Pos),
        )),
    )
    .parse(input)
}

fn parse_unary(input: &str) -> PResult<'_, Expr> {
    if let Ok((rest, op)) = unary_op(input) {
        let (rest, expr) = parse_unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op,
                expr: Box::new(expr),
            },
        ));
    }
    parse_primary(input)
}

fn parse_primary(input: &str) -> PResult<'_, Expr> {
    preceded(
        multispace0,
        alt((
            parse_paren,
            parse_field_ref,
            parse_string_literal,
            parse_number_literal,
            parse_ident_expr,
        )),
    )
    .parse(input)
}

fn parse_paren(input: &str) -> PResult<'_, Expr> {
    let (input, _) = nom_char('(').parse(input)?;
    let (input, expr) = parse_ternary(input)?;
    let (input, close) = opt(preceded(multispace0, nom_char(')'))).parse(input)?;
    if close.is_none() {
        return Err(fail_with(
            input,
            ParseError::InvalidSyntax {
                message: "expected ')'".to_string(),
            },
        ));
    }
    Ok((input, expr))
}

fn parse_field_ref(input: &str) -> PResult<'_, Expr> {
    let (rest, _) = tag("{{").parse(input)?;
    let (rest, path) = take_while(|c| c != '}').parse(rest)?;
    let (rest, _) = match tag::<_, _, PErr<'_>>("}}").parse(rest) {
        Ok(ok) => ok,
        Err(_) => {
            return Err(fail_with(
                input,
                ParseError::InvalidSyntax {
                    message: "expected '}}' closing a field reference".to_string(),
                },
            ))
        }
    };
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(fail_with(input, ParseError::EmptyFieldRef));
    }
    Ok((rest, Expr::Field(trimmed.to_string())))
}

fn parse_string_literal(input: &str) -> PResult<'_, Expr> {
    let quote = match input.chars().next() {
        Some(c @ ('"' | '\'')) => c,
        _ => {
            return Err(nom::Err::Error(PErr {
                input,
                custom: None,
            }))
        }
    };
    let mut out = String::new();
    let mut escaped = false;
    for (idx, c) in input.char_indices().skip(1) {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            let rest = &input[idx + c.len_utf8()..];
            return Ok((rest, Expr::Literal(Literal::String(out))));
        } else {
            out.push(c);
        }
    }
    Err(fail_with(input, ParseError::UnterminatedString))
}

fn parse_number_literal(input: &str) -> PResult<'_, Expr> {
    let (rest, num_str) = recognize(pair(digit1, opt(pair(nom_char('.'), digit1)))).parse(input)?;
    let literal = if num_str.contains('.') {
        num_str.parse::<f64>().map(Literal::Float)
    } else {
        num_str
            .parse::<i64>()
            .map(Literal::Int)
            .or_else(|_| num_str.parse::<f64>().map(Literal::Float))
    };
    match literal {
        Ok(lit) => Ok((rest, Expr::Literal(lit))),
        Err(_) => Err(fail_with(
            input,
            ParseError::InvalidNumber {
                number: num_str.to_string(),
            },
        )),
    }
}

fn parse_identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn parse_ident_expr(input: &str) -> PResult<'_, Expr> {
    let (rest, name) = parse_identifier(input)?;
    match name {
        "true" => return Ok((rest, Expr::Literal(Literal::Bool(true)))),
        "false" => return Ok((rest, Expr::Literal(Literal::Bool(false)))),
        "null" => return Ok((rest, Expr::Literal(Literal::Null))),
        _ => {}
    }

    let (after_ws, paren) = opt(preceded(multispace0, nom_char('('))).parse(rest)?;
    if paren.is_none() {
        return Ok((rest, Expr::Ident(name.to_string())));
    }

    let function = match BUILTIN_FUNCTIONS.get(name) {
        Some(f) => *f,
        None => {
            return Err(fail_with(
                input,
                ParseError::UnknownFunction {
                    name: name.to_string(),
                },
            ))
        }
    };

    let (after_args, args) =
        separated_list0(preceded(multispace0, nom_char(',')), parse_ternary).parse(after_ws)?;
    let (after_close, close) = opt(preceded(multispace0, nom_char(')'))).parse(after_args)?;
    if close.is_none() {
        return Err(fail_with(
            after_args,
            ParseError::InvalidSyntax {
                message: format!("expected ')' closing call to '{name}'"),
            },
        ));
    }

    let (min, max) = function.arity();
    if args.len() < min || args.len() > max {
        return Err(fail_with(
            input,
            ParseError::WrongArity {
                function: name.to_string(),
                min,
                max,
                actual: args.len(),
            },
        ));
    }

    Ok((after_close, Expr::Call { function, args }))
}

/// Identifier characters, exposed for key validation elsewhere.
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
