//! band-math CLI - validate, compile and preview vegetation index formulas

use anyhow::{bail, Context, Result};
use band_math::{builtin_index, sanitize_index_name, Band, CommandTemplate, Formula, Registers};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "band-math")]
#[command(author, version, about = "Band-math formula compiler for vegetation indices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a formula is valid (exit status 1 if not)
    Check {
        formula: String,
    },

    /// Compile a formula into a raster-calculator expression
    Compile {
        formula: String,
    },

    /// Print the raster-calculator command that creates an index
    Command {
        formula: String,

        /// Index name, also the output file stem
        #[arg(short, long)]
        index: String,

        /// JSON command template (default: multispectral orthophoto)
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Print the default command template as JSON
    Template,

    /// Evaluate a formula over comma-separated pixel values
    Eval {
        formula: String,

        #[command(flatten)]
        bands: BandValues,
    },
}

#[derive(Args)]
struct BandValues {
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    blue: Vec<f32>,
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    green: Vec<f32>,
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    red: Vec<f32>,
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    nir: Vec<f32>,
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    rdedge: Vec<f32>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Check { formula } => Ok(check(&formula)),
        Commands::Compile { formula } => compile(&formula).map(|()| ExitCode::SUCCESS),
        Commands::Command {
            formula,
            index,
            template,
        } => command(&formula, &index, template.as_deref()).map(|()| ExitCode::SUCCESS),
        Commands::Template => template().map(|()| ExitCode::SUCCESS),
        Commands::Eval { formula, bands } => eval(&formula, bands).map(|()| ExitCode::SUCCESS),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn check(formula: &str) -> ExitCode {
    if band_math::is_valid(formula) {
        println!("valid");
        ExitCode::SUCCESS
    } else {
        debug!("Rejected formula {formula:?}");
        println!("invalid");
        ExitCode::FAILURE
    }
}

fn compile(formula: &str) -> Result<()> {
    let compiled = band_math::compile(formula)?;
    println!("{compiled}");
    Ok(())
}

fn command(formula: &str, index: &str, template: Option<&Path>) -> Result<()> {
    let name = sanitize_index_name(index);
    if name.is_empty() {
        bail!("Index name {index:?} has no usable characters (allowed: a-z, 0-9, _ and -)");
    }
    if name != index {
        info!("Using index name {name:?}");
    }

    let template = match template {
        Some(path) => {
            debug!("Reading command template from {}", path.display());
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            CommandTemplate::from_json(&json)?
        }
        None => CommandTemplate::default(),
    };

    let command = match builtin_index(&name) {
        Some(builtin) => {
            info!("{name} is a built-in index, ignoring the formula");
            template.render_builtin(builtin, &name)
        }
        None => {
            if !band_math::is_valid(formula) {
                bail!("Invalid formula: {formula:?}");
            }
            template.render(formula, &name)?
        }
    };
    println!("{command}");
    Ok(())
}

fn template() -> Result<()> {
    println!("{}", CommandTemplate::default().to_json()?);
    Ok(())
}

fn eval(formula: &str, bands: BandValues) -> Result<()> {
    let parsed = Formula::parse(formula)?;
    let values = [bands.blue, bands.green, bands.red, bands.nir, bands.rdedge];
    let (bindings, len) = band_bindings(&parsed, values)?;
    debug!("Evaluating {formula:?} over {len} pixels");

    let mut registers = Registers::<f32>::new(len);
    let output = parsed.evaluate(&bindings, &mut registers)?;
    for value in output {
        println!("{value}");
    }
    Ok(())
}

/// Binds the command line values to `Band::ALL` order and returns them with
/// the pixel count. Bands the formula does not use are padded so every
/// binding has the same length.
fn band_bindings(parsed: &Formula, values: [Vec<f32>; 5]) -> Result<(Vec<Vec<f32>>, usize)> {
    let mut referenced = BTreeSet::new();
    parsed.for_each_identifier(&mut |name| {
        referenced.insert(name);
    });
    let used: Vec<Band> = Band::ALL
        .into_iter()
        .filter(|band| referenced.contains(band.name()))
        .collect();

    let missing: Vec<String> = used
        .iter()
        .filter(|band| values[band.index()].is_empty())
        .map(|band| format!("--{band}"))
        .collect();
    if !missing.is_empty() {
        bail!("Missing values for {}", missing.join(", "));
    }

    let len = used
        .iter()
        .map(|band| values[band.index()].len())
        .max()
        .unwrap_or(1);

    let bindings = Band::ALL
        .iter()
        .zip(values)
        .map(|(band, band_values)| {
            if used.contains(band) {
                band_values
            } else {
                vec![0.0; len]
            }
        })
        .collect();
    Ok((bindings, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(nir: Vec<f32>, red: Vec<f32>) -> [Vec<f32>; 5] {
        [vec![], vec![], red, nir, vec![]]
    }

    #[test]
    fn bindings_pad_unused_bands() {
        let parsed = Formula::parse("(nir - red) / (nir + red)").unwrap();
        let (bindings, len) = band_bindings(&parsed, values(vec![0.75, 0.5], vec![0.25, 0.5])).unwrap();
        assert_eq!(len, 2);
        assert_eq!(bindings.len(), 5);
        assert_eq!(bindings[Band::Nir.index()], vec![0.75, 0.5]);
        assert_eq!(bindings[Band::Blue.index()], vec![0.0, 0.0]);
    }

    #[test]
    fn bindings_without_bands_evaluate_once() {
        let parsed = Formula::parse("2 ** 3").unwrap();
        let (bindings, len) = band_bindings(&parsed, values(vec![], vec![])).unwrap();
        assert_eq!(len, 1);
        assert!(bindings.iter().all(|band| band.len() == 1));
    }

    #[test]
    fn bindings_require_values_for_used_bands() {
        let parsed = Formula::parse("nir").unwrap();
        let err = band_bindings(&parsed, values(vec![], vec![])).unwrap_err();
        assert_eq!(err.to_string(), "Missing values for --nir");

        let parsed = Formula::parse("nir - red").unwrap();
        let err = band_bindings(&parsed, values(vec![], vec![])).unwrap_err();
        assert_eq!(err.to_string(), "Missing values for --red, --nir");

        let parsed = Formula::parse("nir - red").unwrap();
        let err = band_bindings(&parsed, values(vec![1.0], vec![])).unwrap_err();
        assert_eq!(err.to_string(), "Missing values for --red");
    }
}
