use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::PlotError;

/// Operation types produced by the storage engine harness, in plotting order
pub const DEFAULT_OPERATIONS: &[&str] = &["put", "get", "scan"];
/// Memtable sizes the harness is run with
pub const DEFAULT_VARIANTS: &[&str] = &["1MB", "4MB"];
pub const DEFAULT_LABEL_PREFIX: &str = "Memtable Size";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub operations: Vec<OperationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base path that relative result files are read from
    pub input_dir: PathBuf,
    /// Directory the images (and plot data) are written to
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Also reject series whose category labels differ from the first series
    pub strict_alignment: bool,
    /// Render operation types on the rayon pool
    pub parallel: bool,
    /// Dump the chart specification as json next to the images
    pub write_plot_data: bool,
    /// Fixed number of decimals on the y axis tick labels
    pub y_label_precision: Option<usize>,
    /// Legend prefix used for discovered variants, ie. `Memtable Size (4MB)`
    pub variant_label_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Scan the input dir for `{name}_results_*.txt` instead of listing variants
    #[serde(default)]
    pub discover: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub label: String,
    pub file: PathBuf,
}

fn default_name() -> String {
    "throughput".to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            width: 640,
            height: 480,
            strict_alignment: false,
            parallel: false,
            write_plot_data: false,
            y_label_precision: None,
            variant_label_prefix: DEFAULT_LABEL_PREFIX.to_owned(),
        }
    }
}

impl Settings {
    pub fn resolve_input(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.input_dir.join(file)
        }
    }

    pub fn output_path(&self, operation: &str) -> PathBuf {
        self.output_dir.join(format!("{operation}_throughput.png"))
    }

    pub fn plot_data_path(&self, operation: &str) -> PathBuf {
        self.output_dir
            .join("plot_data")
            .join(format!("{operation}_throughput.json"))
    }

    pub fn variant_label(&self, variant: &str) -> String {
        format!("{} ({variant})", self.variant_label_prefix)
    }
}

impl Variant {
    pub fn new(label: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            file: file.into(),
        }
    }
}

impl OperationConfig {
    /// `{name}_results_{variant}.txt` for each of the given variants
    pub fn with_result_files(name: &str, variants: &[&str], settings: &Settings) -> Self {
        Self {
            name: name.to_owned(),
            variants: variants
                .iter()
                .map(|variant| {
                    Variant::new(
                        settings.variant_label(variant),
                        format!("{name}_results_{variant}.txt"),
                    )
                })
                .collect(),
            discover: false,
        }
    }
}

impl Default for Config {
    /// The reference workload: put, get and scan for 1MB and 4MB memtables
    fn default() -> Self {
        let settings = Settings::default();
        let operations = DEFAULT_OPERATIONS
            .iter()
            .map(|op| OperationConfig::with_result_files(op, DEFAULT_VARIANTS, &settings))
            .collect();
        Self {
            name: default_name(),
            settings,
            operations,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), PlotError> {
        if self.operations.is_empty() {
            return Err(PlotError::Config("no operations configured".to_owned()));
        }
        if self.settings.width == 0 || self.settings.height == 0 {
            return Err(PlotError::Config(format!(
                "image size must be non-zero, got {}x{}",
                self.settings.width, self.settings.height
            )));
        }

        let mut seen = HashSet::new();
        for op in &self.operations {
            if op.name.is_empty() {
                return Err(PlotError::Config("operation with an empty name".to_owned()));
            }
            if op.name.contains(['/', '\\']) || op.name.contains("..") {
                return Err(PlotError::Config(format!(
                    "operation name {:?} must not contain path separators or `..`",
                    op.name
                )));
            }
            if !seen.insert(op.name.as_str()) {
                return Err(PlotError::Config(format!(
                    "operation {} is listed twice",
                    op.name
                )));
            }
            if op.variants.is_empty() && !op.discover {
                return Err(PlotError::Config(format!(
                    "operation {} has no variants and discovery is off",
                    op.name
                )));
            }
        }
        Ok(())
    }
}
