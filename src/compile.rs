use crate::formula::{Formula, UnaryOp};
use crate::{Band, Error, Result};

impl Formula {
    /// Compiles the tree into a raster-calculator expression.
    ///
    /// Operators and parentheses are emitted verbatim, each band identifier
    /// becomes `asarray(<slot>, dtype=float32)` and every number is written
    /// as a float literal.
    pub fn compile(&self) -> Result<String> {
        let mut output = String::new();
        self.compile_into(&mut output)?;
        Ok(output)
    }

    fn compile_into(&self, output: &mut String) -> Result<()> {
        match self {
            Self::Binary { lhs, op, rhs } => {
                lhs.compile_into(output)?;
                output.push_str(op.symbol());
                rhs.compile_into(output)?;
            }
            Self::Unary { op, operand } => {
                if *op == UnaryOp::Minus {
                    output.push_str("-1.0*");
                }
                operand.compile_into(output)?;
            }
            Self::Power { base, exponent } => {
                base.compile_into(output)?;
                output.push_str("**");
                exponent.compile_into(output)?;
            }
            Self::Parens(inner) => {
                output.push('(');
                inner.compile_into(output)?;
                output.push(')');
            }
            Self::Identifier(name) => {
                let band = Band::from_name(name).ok_or_else(|| Error::Lookup(name.clone()))?;
                output.push_str(&band_array(band));
            }
            Self::Number(value) => output.push_str(&float_literal(*value)),
        }
        Ok(())
    }
}

/// The float32 array cast a band compiles to.
pub fn band_array(band: Band) -> String {
    format!("asarray({}, dtype=float32)", band.slot())
}

/// Renders `value` the way the raster calculator's float literals are
/// written: shortest round-trip digits, always with a decimal point in
/// positional form, scientific form outside `1e-4 <= |value| < 1e16`.
pub fn float_literal(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.25e-3".
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::from(sign);
    if (-4..16).contains(&exponent) {
        if exponent < 0 {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exponent - 1) as usize));
            out.push_str(&digits);
        } else {
            let int_len = exponent as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        out.push_str(&format!("e{exponent_sign}{:02}", exponent.abs()));
    }
    out
}
