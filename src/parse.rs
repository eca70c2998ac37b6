use std::collections::BTreeSet;

use crate::formula::{BinaryOp, Formula, UnaryOp};

use pest::error::ErrorVariant;
use pest::iterators::{Pair, Pairs};
use pest::{Parser, Position};
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct FormulaParser;

pub type ParseError = pest::error::Error<Rule>;

/// Deepest nesting of parentheses, unary signs and `**` exponents accepted
/// in a formula. Parsing, compilation and evaluation all recurse once per
/// level, so deeper input is rejected before it reaches the grammar.
pub const MAX_NESTING: usize = 256;

impl Formula {
    /// Parse a band-math formula.
    ///
    /// Whitespace between tokens is ignored, and the whole input must be
    /// consumed. Identifiers other than the five band names are rejected
    /// here, before any compilation happens.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        check_nesting(input)?;
        let mut pairs = FormulaParser::parse(Rule::formula, input)?;
        let mut inner = next_pair(&mut pairs).into_inner();
        Ok(build_start(next_pair(&mut inner)))
    }

    /// Names of the bands referenced by `input`.
    pub fn band_names(input: &str) -> Result<BTreeSet<String>, ParseError> {
        let formula = Self::parse(input)?;
        let mut names = BTreeSet::new();
        formula.for_each_identifier(&mut |name| {
            names.insert(name.to_string());
        });
        Ok(names)
    }
}

/// Rejects formulas nested deeper than [`MAX_NESTING`].
///
/// Unary signs and `**` open a level that stays open until the next binary
/// `+ - * /` or closing parenthesis of the same parenthesis level.
fn check_nesting(input: &str) -> Result<(), ParseError> {
    // Open unary/power levels per open parenthesis.
    let mut pending = vec![0usize];
    let mut depth = 0;
    let mut after_operand = false;
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let opened = match c {
            '(' => {
                pending.push(0);
                after_operand = false;
                true
            }
            ')' => {
                if pending.len() > 1 {
                    depth -= pending.pop().unwrap_or_default() + 1;
                }
                after_operand = true;
                false
            }
            '*' if chars.next_if(|(_, next)| *next == '*').is_some() => {
                after_operand = false;
                true
            }
            '+' | '-' if !after_operand => true,
            '+' | '-' | '*' | '/' => {
                if let Some(top) = pending.last_mut() {
                    depth -= *top;
                    *top = 0;
                }
                after_operand = false;
                false
            }
            c if c.is_ascii_digit() || c == '.' => {
                skip_number(&mut chars);
                after_operand = true;
                false
            }
            c if c.is_alphanumeric() => {
                while chars.next_if(|(_, next)| next.is_alphanumeric()).is_some() {}
                after_operand = true;
                false
            }
            _ => false,
        };
        if opened {
            if c != '(' {
                if let Some(top) = pending.last_mut() {
                    *top += 1;
                }
            }
            depth += 1;
            if depth > MAX_NESTING {
                let position =
                    Position::new(input, pos).unwrap_or_else(|| Position::from_start(input));
                return Err(ParseError::new_from_pos(
                    ErrorVariant::CustomError {
                        message: format!("formula is nested deeper than {MAX_NESTING} levels"),
                    },
                    position,
                ));
            }
        }
    }
    Ok(())
}

// Consumes the rest of a numeric literal, including a signed exponent, so the
// exponent sign is not mistaken for an operator.
fn skip_number(chars: &mut std::iter::Peekable<std::str::CharIndices>) {
    while chars
        .next_if(|(_, next)| next.is_ascii_digit() || *next == '.')
        .is_some()
    {}
    if chars.next_if(|(_, next)| matches!(next, 'e' | 'E')).is_some() {
        chars.next_if(|(_, next)| matches!(next, '+' | '-'));
        while chars.next_if(|(_, next)| next.is_ascii_digit()).is_some() {}
    }
}

// The grammar fixes the shape of every pair sequence, so running out of
// pairs means the builders disagree with `grammar.pest`.
fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>) -> Pair<'i, Rule> {
    pairs
        .next()
        .expect("Grammar produced fewer pairs than expected")
}

fn build_start(pair: Pair<Rule>) -> Formula {
    debug_assert_eq!(pair.as_rule(), Rule::start);
    fold_left(pair.into_inner(), build_term)
}

fn build_term(pair: Pair<Rule>) -> Formula {
    debug_assert_eq!(pair.as_rule(), Rule::term);
    fold_left(pair.into_inner(), build_factor)
}

fn fold_left(mut inner: Pairs<Rule>, operand: fn(Pair<Rule>) -> Formula) -> Formula {
    let mut acc = operand(next_pair(&mut inner));
    while let Some(op) = inner.next() {
        let op = BinaryOp::from_symbol(op.as_str())
            .unwrap_or_else(|| panic!("Unexpected binary operator {:?}", op.as_str()));
        let rhs = operand(next_pair(&mut inner));
        acc = Formula::binary(acc, op, rhs);
    }
    acc
}

fn build_factor(pair: Pair<Rule>) -> Formula {
    debug_assert_eq!(pair.as_rule(), Rule::factor);
    let only = next_pair(&mut pair.into_inner());
    match only.as_rule() {
        Rule::plusminus => {
            let mut inner = only.into_inner();
            let op = next_pair(&mut inner);
            let op = UnaryOp::from_symbol(op.as_str())
                .unwrap_or_else(|| panic!("Unexpected unary operator {:?}", op.as_str()));
            Formula::unary(op, build_factor(next_pair(&mut inner)))
        }
        Rule::power => {
            let mut inner = only.into_inner();
            let base = build_atom(next_pair(&mut inner));
            match inner.next() {
                Some(exponent) => Formula::power(base, build_factor(exponent)),
                None => base,
            }
        }
        x => panic!("Unexpected factor rule {x:?}"),
    }
}

fn build_atom(pair: Pair<Rule>) -> Formula {
    debug_assert_eq!(pair.as_rule(), Rule::atom);
    let only = next_pair(&mut pair.into_inner());
    match only.as_rule() {
        Rule::parens => Formula::Parens(Box::new(build_start(next_pair(&mut only.into_inner())))),
        Rule::name => Formula::Identifier(only.as_str().to_string()),
        Rule::number => {
            let literal_str = only.as_str();
            match literal_str.parse::<f64>() {
                Ok(value) => Formula::Number(value),
                Err(_) => panic!("Unexpected literal: {}", literal_str),
            }
        }
        x => panic!("Unexpected atom rule {x:?}"),
    }
}
