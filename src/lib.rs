//! Band-math formula compiler.
//!
//! Users define custom vegetation indices by typing formulas over the bands
//! of a multispectral orthophoto (`blue`, `green`, `red`, `nir`, `rdedge`).
//! A formula is validated, then compiled into a raster-calculator expression
//! where each band becomes a float32 array bound to a positional placeholder
//! (`A` through `E`).
//!
//! # Example
//!
//! ```rust
//! use band_math::*;
//!
//! assert!(is_valid("(nir - red) / (nir + red)"));
//! assert!(!is_valid("(nir - red"));
//!
//! let compiled = compile("nir**2").unwrap();
//! assert_eq!(compiled, "asarray(D, dtype=float32)**2.0");
//!
//! let command = build_external_command("green / blue", "gb").unwrap();
//! assert!(command.contains("--outfile=gb.tif"));
//! ```

mod bands;
mod command;
mod compile;
mod error;
mod evaluate;
mod formula;
mod parse;

/// Uses the [`pest`] parsing expression grammar language.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use bands::Band;
pub use command::*;
pub use compile::{band_array, float_literal};
pub use error::{Error, Result};
pub use evaluate::Registers;
pub use formula::*;
pub use parse::{ParseError, Rule, MAX_NESTING};

/// Whether `formula` is syntactically valid. Never fails.
pub fn is_valid(formula: &str) -> bool {
    Formula::parse(formula).is_ok()
}

/// Parses and compiles `formula` into a raster-calculator expression.
pub fn compile(formula: &str) -> Result<String> {
    Formula::parse(formula)?.compile()
}

/// Builds the raster-calculator command writing `<output_name>.tif`.
///
/// Built-in indices (see [`builtin_index`]) use their precomputed command and
/// ignore `formula`. Any other name compiles `formula` into the default
/// [`CommandTemplate`]. Callers are expected to gate this on [`is_valid`].
pub fn build_external_command(formula: &str, output_name: &str) -> Result<String> {
    let template = CommandTemplate::default();
    match builtin_index(output_name) {
        Some(index) => Ok(template.render_builtin(index, output_name)),
        None => template.render(formula, output_name),
    }
}

pub trait FloatExt: num_traits::Float + Send + Sync {}
impl FloatExt for f32 {}
impl FloatExt for f64 {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compile_bands() {
        for (name, slot) in [
            ("blue", "A"),
            ("green", "B"),
            ("red", "C"),
            ("nir", "D"),
            ("rdedge", "E"),
        ] {
            assert_eq!(
                compile(name).unwrap(),
                format!("asarray({slot}, dtype=float32)")
            );
        }
    }

    #[test]
    fn compile_simple() {
        assert_eq!(
            compile("blue+red").unwrap(),
            "asarray(A, dtype=float32)+asarray(C, dtype=float32)"
        );
    }

    #[test]
    fn compile_parens() {
        assert_eq!(
            compile("((green+nir))").unwrap(),
            "((asarray(B, dtype=float32)+asarray(D, dtype=float32)))"
        );
    }

    #[test]
    fn compile_complex() {
        assert_eq!(
            compile("((nir-red)/(nir+red))").unwrap(),
            "((asarray(D, dtype=float32)-asarray(C, dtype=float32))\
             /(asarray(D, dtype=float32)+asarray(C, dtype=float32)))"
        );
    }

    #[test]
    fn compile_float_conversion() {
        assert_eq!(compile("nir**2").unwrap(), "asarray(D, dtype=float32)**2.0");
    }

    #[test]
    fn compile_ignores_spaces() {
        assert_eq!(
            compile("red +    green").unwrap(),
            "asarray(C, dtype=float32)+asarray(B, dtype=float32)"
        );
        assert_eq!(compile("red +    green").unwrap(), compile("red+green").unwrap());
    }

    #[test]
    fn compile_unary_minus() {
        assert_eq!(compile("-red").unwrap(), "-1.0*asarray(C, dtype=float32)");
        assert_eq!(
            compile("blue/(-red)").unwrap(),
            "asarray(A, dtype=float32)/(-1.0*asarray(C, dtype=float32))"
        );
    }

    #[test]
    fn compile_propagates_syntax_errors() {
        for formula in ["blue+foobar", "((blue+nir)", "red?1", "((blue+)nir)"] {
            match compile(formula) {
                Err(Error::Syntax(_)) => {}
                other => panic!("Expected syntax error for {formula:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn validity() {
        assert!(is_valid("blue"));
        assert!(is_valid("-blue"));
        assert!(!is_valid("blue+"));
        assert!(!is_valid("blue+foobar"));
        assert!(!is_valid("((blue+nir)"));
        assert!(!is_valid("red?1"));
        assert!(!is_valid(""));
    }

    #[test]
    fn validity_is_idempotent() {
        for formula in ["nir/red", "nir/", "rdedge**0.5"] {
            assert_eq!(is_valid(formula), is_valid(formula));
        }
    }

    #[test]
    fn deeply_nested_formula_compiles_quickly() {
        let depth = 200;
        let formula = format!("{}nir-red{}", "(".repeat(depth), ")".repeat(depth));

        let start = std::time::Instant::now();
        assert!(is_valid(&formula));
        let compiled = compile(&formula).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed.as_millis() < 1000, "Took {elapsed:?}");

        assert_eq!(
            compiled,
            format!(
                "{}asarray(D, dtype=float32)-asarray(C, dtype=float32){}",
                "(".repeat(depth),
                ")".repeat(depth)
            )
        );
    }

    #[test]
    fn too_deeply_nested_formula_is_a_syntax_error() {
        let formula = format!("{}nir{}", "(".repeat(20_000), ")".repeat(20_000));
        assert!(!is_valid(&formula));
        match compile(&formula) {
            Err(Error::Syntax(e)) => assert!(e.to_string().contains("nested deeper"), "{e}"),
            other => panic!("Expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn external_command_for_custom_index() {
        let command = build_external_command("green/blue", "gb").unwrap();
        assert!(command.contains(
            "--calc=\"asarray(B, dtype=float32)/asarray(A, dtype=float32)\""
        ));
        assert!(command.contains("-E odm_orthophoto.tif --E_band=5"));
        assert!(command.contains("--outfile=gb.tif"));
    }

    #[test]
    fn external_command_for_builtin_bypasses_parser() {
        let command = build_external_command("not a formula", "ndvi").unwrap();
        assert!(command.contains("--outfile=ndvi.tif"));
        assert!(command.contains("-A odm_orthophoto.tif --A_band=4"));

        assert!(build_external_command("not a formula", "custom").is_err());
    }

    #[test]
    fn concurrent_compilation() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let formula = format!("nir*{i}");
                    compile(&formula).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(
                handle.join().unwrap(),
                format!("asarray(D, dtype=float32)*{i}.0")
            );
        }
    }
}
