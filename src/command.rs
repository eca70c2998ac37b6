use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{Band, Formula, Result};

/// An index whose raster-calculator command is fixed in advance.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinIndex {
    pub name: &'static str,
    /// Placeholder bindings, in placeholder order.
    pub inputs: &'static [(char, Band)],
    /// Calculator expression over the placeholders in `inputs`.
    pub calc: &'static str,
}

static BUILTIN_INDICES: Lazy<HashMap<&'static str, BuiltinIndex>> = Lazy::new(|| {
    [
        BuiltinIndex {
            name: "ndvi",
            inputs: &[('A', Band::Nir), ('B', Band::Red)],
            calc: "(asarray(A, dtype=float32)-asarray(B, dtype=float32))\
                   /(asarray(A, dtype=float32)+asarray(B, dtype=float32))",
        },
        BuiltinIndex {
            name: "ndre",
            inputs: &[('A', Band::Nir), ('B', Band::RedEdge)],
            calc: "(asarray(A, dtype=float32)-asarray(B, dtype=float32))\
                   /(asarray(A, dtype=float32)+asarray(B, dtype=float32))",
        },
    ]
    .into_iter()
    .map(|index| (index.name, index))
    .collect()
});

/// Looks up a built-in index by its exact name.
pub fn builtin_index(name: &str) -> Option<&'static BuiltinIndex> {
    BUILTIN_INDICES.get(name)
}

/// Strips every character outside `[a-z0-9_-]` from a user-supplied index
/// name, so it can be used as an output file stem.
pub fn sanitize_index_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Shape of the raster-calculator invocation that materializes an index.
///
/// Every input placeholder reads one band of the same orthophoto. The
/// default reproduces the command used for multispectral flights.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CommandTemplate {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_input_raster")]
    pub input_raster: String,
    #[serde(default = "default_output_type")]
    pub output_type: String,
    #[serde(default = "default_creation_options")]
    pub creation_options: Vec<String>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub nodata: i64,
}

fn default_program() -> String {
    "gdal_calc.py".to_string()
}

fn default_input_raster() -> String {
    "odm_orthophoto.tif".to_string()
}

fn default_output_type() -> String {
    "Byte".to_string()
}

fn default_creation_options() -> Vec<String> {
    vec!["TILED=YES".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            program: default_program(),
            input_raster: default_input_raster(),
            output_type: default_output_type(),
            creation_options: default_creation_options(),
            overwrite: true,
            nodata: 0,
        }
    }
}

impl CommandTemplate {
    /// Reads a template from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed JSON, suitable as a starting point for a custom
    /// template file.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Command computing `formula` into `<output_name>.tif`, with the five
    /// bands bound to placeholders `A` through `E`.
    pub fn render(&self, formula: &str, output_name: &str) -> Result<String> {
        let calc = Formula::parse(formula)?.compile()?;
        let inputs: Vec<_> = Band::ALL.iter().map(|band| (band.slot(), *band)).collect();
        Ok(self.render_with_inputs(&inputs, &calc, output_name))
    }

    /// Precomputed command for a built-in index, written to
    /// `<output_name>.tif`.
    pub fn render_builtin(&self, index: &BuiltinIndex, output_name: &str) -> String {
        self.render_with_inputs(index.inputs, index.calc, output_name)
    }

    fn render_with_inputs(&self, inputs: &[(char, Band)], calc: &str, output_name: &str) -> String {
        let mut parts = vec![self.program.clone()];
        for (slot, band) in inputs {
            parts.push(format!(
                "-{slot} {} --{slot}_band={}",
                self.input_raster,
                band.raster_band()
            ));
        }
        parts.push(format!("--calc=\"{calc}\""));
        parts.push(format!("--outfile={output_name}.tif"));
        parts.push(format!("--type={}", self.output_type));
        for option in &self.creation_options {
            parts.push(format!("--co=\"{option}\""));
        }
        if self.overwrite {
            parts.push("--overwrite".to_string());
        }
        parts.push(format!("--NoDataValue={}", self.nodata));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_template_command() {
        let command = CommandTemplate::default().render("nir**2", "squared").unwrap();
        assert_eq!(
            command,
            "gdal_calc.py -A odm_orthophoto.tif --A_band=1 -B odm_orthophoto.tif --B_band=2 \
             -C odm_orthophoto.tif --C_band=3 -D odm_orthophoto.tif --D_band=4 \
             -E odm_orthophoto.tif --E_band=5 --calc=\"asarray(D, dtype=float32)**2.0\" \
             --outfile=squared.tif --type=Byte --co=\"TILED=YES\" --overwrite --NoDataValue=0"
        );
    }

    #[test]
    fn builtin_command_uses_fixed_bands() {
        let ndvi = builtin_index("ndvi").unwrap();
        let command = CommandTemplate::default().render_builtin(ndvi, "ndvi");
        assert!(command.starts_with(
            "gdal_calc.py -A odm_orthophoto.tif --A_band=4 -B odm_orthophoto.tif --B_band=3 --calc="
        ));
        assert!(command.contains("--outfile=ndvi.tif"));
        assert!(!command.contains("-C "));

        let ndre = builtin_index("ndre").unwrap();
        assert_eq!(ndre.inputs, &[('A', Band::Nir), ('B', Band::RedEdge)]);
        assert!(builtin_index("NDVI").is_none());
        assert!(builtin_index("custom").is_none());
    }

    #[test]
    fn builtin_calc_matches_compiled_formula() {
        // Placeholders A/B of the precomputed NDVI are nir/red, i.e. D/C.
        let compiled = Formula::parse("(nir-red)/(nir+red)").unwrap().compile().unwrap();
        let renamed = builtin_index("ndvi")
            .unwrap()
            .calc
            .replace("asarray(A", "asarray(D")
            .replace("asarray(B", "asarray(C");
        assert_eq!(renamed, compiled);
    }

    #[test]
    fn invalid_formula_is_rejected() {
        match CommandTemplate::default().render("nir+", "broken") {
            Err(Error::Syntax(_)) => {}
            other => panic!("Expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn template_from_json() {
        let template = CommandTemplate::from_json(
            r#"{ "input_raster": "ortho.tif", "output_type": "Float32", "creation_options": [] }"#,
        )
        .unwrap();
        assert_eq!(template.program, "gdal_calc.py");
        assert!(template.overwrite);
        let command = template.render("red", "r").unwrap();
        assert!(command.contains("-C ortho.tif --C_band=3"));
        assert!(command.ends_with("--outfile=r.tif --type=Float32 --overwrite --NoDataValue=0"));

        assert_eq!(CommandTemplate::from_json("{}").unwrap(), CommandTemplate::default());
        assert!(matches!(
            CommandTemplate::from_json("{ \"nodata\": \"zero\" }"),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn template_to_json() {
        let json = CommandTemplate::default().to_json().unwrap();
        assert!(json.contains("\"program\": \"gdal_calc.py\""));
        assert!(json.contains("\"TILED=YES\""));
        assert_eq!(CommandTemplate::from_json(&json).unwrap(), CommandTemplate::default());

        let custom = CommandTemplate {
            output_type: "Float32".to_string(),
            overwrite: false,
            nodata: -9999,
            ..CommandTemplate::default()
        };
        let json = custom.to_json().unwrap();
        assert_eq!(CommandTemplate::from_json(&json).unwrap(), custom);
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_index_name("my_index-2"), "my_index-2");
        assert_eq!(sanitize_index_name("My Index!.tif"), "yndextif");
        assert_eq!(sanitize_index_name("../../etc"), "etc");
    }
}
