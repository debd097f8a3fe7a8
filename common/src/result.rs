use std::{
    fs::{read, read_dir},
    path::Path,
};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::{Settings, Variant},
    error::PlotError,
};

/// One `label,throughput` line of a result file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    /// Opaque x axis tick, usually the input data size in MB
    pub label: String,
    /// MB/s
    pub throughput: f64,
}

/// Records of one result file, in file order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub variant: String,
    pub records: Vec<MeasurementRecord>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.label.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().map(|r| r.throughput)
    }
}

/// Reads a whole result file into a [`Series`] tagged with `variant`.
///
/// The first malformed line fails the file, there is no skipping.
pub fn load_series(variant: &str, path: &Path) -> Result<Series, PlotError> {
    let bytes = read(path).map_err(|source| PlotError::MissingFile {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        PlotError::MalformedRecord {
            path: path.to_path_buf(),
            line: valid.iter().filter(|b| **b == b'\n').count() + 1,
            reason: "record is not valid utf-8".to_owned(),
        }
    })?;
    let records = parse_records(path, &content)?;
    debug!("Loaded {} records for {variant} from {path:?}", records.len());

    Ok(Series {
        variant: variant.to_owned(),
        records,
    })
}

/// Parses file content, `path` is only used for error reporting
pub fn parse_records(path: &Path, content: &str) -> Result<Vec<MeasurementRecord>, PlotError> {
    content
        .split_terminator('\n')
        .enumerate()
        .map(|(idx, line)| {
            parse_record(line).map_err(|reason| PlotError::MalformedRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

fn parse_record(line: &str) -> Result<MeasurementRecord, String> {
    let (label, value) = line
        .split_once(',')
        .ok_or_else(|| format!("expected `label,throughput`, got {line:?}"))?;
    let throughput: f64 = value
        .trim()
        .parse()
        .map_err(|err| format!("invalid throughput {value:?}: {err}"))?;
    if !throughput.is_finite() || throughput < 0.0 {
        return Err(format!(
            "throughput must be a non-negative number, got {value:?}"
        ));
    }

    Ok(MeasurementRecord {
        label: label.to_owned(),
        throughput,
    })
}

/// Finds `{operation}_results_{variant}.txt` files in the input dir.
///
/// Variants are ordered by their leading number, so `4MB` comes before `16MB`.
pub fn discover_variants(operation: &str, settings: &Settings) -> Result<Vec<Variant>, PlotError> {
    let dir = &settings.input_dir;
    let discovery_err = |reason: String| PlotError::Discovery {
        operation: operation.to_owned(),
        dir: dir.clone(),
        reason,
    };

    let file_regex = Regex::new(&format!(
        r"^{}_results_(\S+)\.txt$",
        regex::escape(operation)
    ))
    .map_err(|err| discovery_err(err.to_string()))?;

    let mut found = Vec::new();
    for entry in read_dir(dir).map_err(|err| discovery_err(err.to_string()))? {
        let entry = entry.map_err(|err| discovery_err(err.to_string()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            warn!("Skipping non utf-8 file name {:?}", entry.path());
            continue;
        };
        if let Some(cap) = file_regex.captures(file_name) {
            found.push((cap[1].to_owned(), file_name.to_owned()));
        }
    }

    if found.is_empty() {
        return Err(discovery_err(format!(
            "no {operation}_results_*.txt files"
        )));
    }

    found.sort_by_cached_key(|(variant, _)| (leading_number(variant), variant.clone()));
    debug!("Discovered {} variants for {operation}", found.len());

    Ok(found
        .into_iter()
        .map(|(variant, file)| Variant::new(settings.variant_label(&variant), file))
        .collect())
}

fn leading_number(variant: &str) -> u64 {
    let digits: String = variant.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(u64::MAX)
}
