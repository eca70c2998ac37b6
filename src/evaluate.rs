use crate::formula::{BinaryOp, Formula, UnaryOp};
use crate::{Band, Error, FloatExt, Result};

#[cfg(feature = "rayon")]
use rayon::prelude::{
    IndexedParallelIterator, IntoParallelRefIterator, ParallelExtend, ParallelIterator,
};

impl Formula {
    /// Calculates the index values of the formula component-wise.
    ///
    /// `bands[i]` holds the pixel values of `Band::ALL[i]`. Bands the formula
    /// does not reference may be omitted by passing a shorter slice, but
    /// every slice that is passed must have `registers.len()` values.
    pub fn evaluate<T: FloatExt, R: AsRef<[T]>>(
        &self,
        bands: &[R],
        registers: &mut Registers<T>,
    ) -> Result<Vec<T>> {
        validate_bindings(bands, registers.register_length)?;
        self.evaluate_recursive(bands, registers)
    }

    pub fn evaluate_without_bands<T: FloatExt>(
        &self,
        registers: &mut Registers<T>,
    ) -> Result<Vec<T>> {
        self.evaluate::<T, [T; 0]>(&[], registers)
    }

    fn evaluate_recursive<T: FloatExt, R: AsRef<[T]>>(
        &self,
        bands: &[R],
        registers: &mut Registers<T>,
    ) -> Result<Vec<T>> {
        match self {
            Self::Binary { lhs, op, rhs } => {
                let op: fn(T, T) -> T = match op {
                    BinaryOp::Add => |lhs, rhs| lhs + rhs,
                    BinaryOp::Sub => |lhs, rhs| lhs - rhs,
                    BinaryOp::Mul => |lhs, rhs| lhs * rhs,
                    BinaryOp::Div => |lhs, rhs| lhs / rhs,
                };
                evaluate_binary_op(op, lhs, rhs, bands, registers)
            }
            Self::Power { base, exponent } => {
                evaluate_binary_op(|lhs, rhs| lhs.powf(rhs), base, exponent, bands, registers)
            }
            Self::Unary {
                op: UnaryOp::Plus,
                operand,
            } => operand.evaluate_recursive(bands, registers),
            Self::Unary {
                op: UnaryOp::Minus,
                operand,
            } => evaluate_unary_op(|only| -only, operand, bands, registers),
            Self::Parens(inner) => inner.evaluate_recursive(bands, registers),
            // A band on its own, possibly inside parentheses. Operators read
            // band operands in place instead of copying them here.
            Self::Identifier(_) => {
                let mut output = registers.allocate();
                output.extend_from_slice(band_values(self, bands)?.unwrap_or_default());
                Ok(output)
            }
            Self::Number(value) => {
                let value = literal::<T>(*value);
                let mut output = registers.allocate();
                output.extend(std::iter::repeat(value).take(registers.register_length));
                Ok(output)
            }
        }
    }
}

fn literal<T: FloatExt>(value: f64) -> T {
    <T as num_traits::NumCast>::from(value).unwrap_or_else(|| {
        if value.is_sign_negative() {
            T::neg_infinity()
        } else {
            T::infinity()
        }
    })
}

fn validate_bindings<T, B: AsRef<[T]>>(bands: &[B], expected: usize) -> Result<()> {
    for (band, values) in Band::ALL.into_iter().zip(bands) {
        let actual = values.as_ref().len();
        if actual != expected {
            return Err(Error::BindingLength {
                band,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Borrows the bound values when `node` is a band identifier.
fn band_values<'a, T, R: AsRef<[T]>>(node: &Formula, bands: &'a [R]) -> Result<Option<&'a [T]>> {
    let Formula::Identifier(name) = node else {
        return Ok(None);
    };
    let band = Band::from_name(name).ok_or_else(|| Error::Lookup(name.clone()))?;
    bands
        .get(band.index())
        .map(|values| Some(values.as_ref()))
        .ok_or(Error::UnboundBand(band))
}

fn evaluate_binary_op<T: FloatExt, R: AsRef<[T]>>(
    op: fn(T, T) -> T,
    lhs: &Formula,
    rhs: &Formula,
    bands: &[R],
    registers: &mut Registers<T>,
) -> Result<Vec<T>> {
    // Before doing recursive evaluation, we check first if we already have
    // input values in our bindings. This avoids unnecessary copies.
    let lhs_reg = match band_values(lhs, bands)? {
        Some(_) => None,
        None => Some(lhs.evaluate_recursive(bands, registers)?),
    };
    let rhs_reg = match band_values(rhs, bands)? {
        Some(_) => None,
        None => Some(rhs.evaluate_recursive(bands, registers)?),
    };
    let lhs_values = match &lhs_reg {
        Some(reg) => reg.as_slice(),
        None => band_values(lhs, bands)?.unwrap_or_default(),
    };
    let rhs_values = match &rhs_reg {
        Some(reg) => reg.as_slice(),
        None => band_values(rhs, bands)?.unwrap_or_default(),
    };
    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(
            lhs_values
                .par_iter()
                .zip(rhs_values.par_iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(
            lhs_values
                .iter()
                .zip(rhs_values.iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }

    if let Some(r) = lhs_reg {
        registers.recycle(r);
    }
    if let Some(r) = rhs_reg {
        registers.recycle(r);
    }
    Ok(output)
}

fn evaluate_unary_op<T: FloatExt, R: AsRef<[T]>>(
    op: fn(T) -> T,
    only: &Formula,
    bands: &[R],
    registers: &mut Registers<T>,
) -> Result<Vec<T>> {
    let only_reg = match band_values(only, bands)? {
        Some(_) => None,
        None => Some(only.evaluate_recursive(bands, registers)?),
    };
    let only_values = match &only_reg {
        Some(reg) => reg.as_slice(),
        None => band_values(only, bands)?.unwrap_or_default(),
    };
    let mut output = registers.allocate();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(only_values.par_iter().map(|only| op(*only)));
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(only_values.iter().map(|only| op(*only)));
    }

    if let Some(r) = only_reg {
        registers.recycle(r);
    }
    Ok(output)
}

/// Scratch vectors reused across the intermediate results of an evaluation.
pub struct Registers<T> {
    num_allocations: usize,
    registers: Vec<Vec<T>>,
    register_length: usize,
}

impl<T> Registers<T> {
    pub fn new(register_length: usize) -> Self {
        Self {
            num_allocations: 0,
            registers: vec![],
            register_length,
        }
    }

    /// Number of values per band (pixels) this register file is sized for.
    pub fn len(&self) -> usize {
        self.register_length
    }

    pub fn is_empty(&self) -> bool {
        self.register_length == 0
    }

    fn recycle(&mut self, mut used: Vec<T>) {
        used.clear();
        self.registers.push(used);
    }

    fn allocate(&mut self) -> Vec<T> {
        self.registers.pop().unwrap_or_else(|| {
            self.num_allocations += 1;
            Vec::with_capacity(self.register_length)
        })
    }

    pub fn num_allocations(&self) -> usize {
        self.num_allocations
    }
}
