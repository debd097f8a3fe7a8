use std::{
    io::Write,
    path::{Path, PathBuf},
};

use common::{
    config::{Config, OperationConfig, Settings, Variant},
    error::PlotError,
    result::{discover_variants, load_series},
};
use eyre::{Context, Result, bail};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use throughput_plot::Chart;
use tokio::{
    fs::{create_dir_all, read_to_string},
    task::spawn_blocking,
};
use tracing::{debug, error, info};

/// Result of plotting a single operation type
#[derive(Debug)]
pub struct Outcome {
    pub operation: String,
    pub result: Result<PathBuf, PlotError>,
}

/// Reads the config file, or falls back to the built-in put/get/scan workload
pub async fn load_config(
    config_file: Option<&Path>,
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<Config> {
    let mut config = match config_file {
        Some(path) => {
            let content = read_to_string(path)
                .await
                .wrap_err_with(|| format!("Read config {path:?}"))?;
            serde_yml::from_str::<Config>(&content)
                .wrap_err_with(|| format!("Parse config {path:?}"))?
        }
        None => Config::default(),
    };

    if let Some(input_dir) = input_dir {
        config.settings.input_dir = input_dir;
    }
    if let Some(output_dir) = output_dir {
        config.settings.output_dir = output_dir;
    }
    config.validate()?;
    Ok(config)
}

pub fn variants(operation: &OperationConfig, settings: &Settings) -> Result<Vec<Variant>, PlotError> {
    if operation.variants.is_empty() && operation.discover {
        discover_variants(&operation.name, settings)
    } else {
        Ok(operation.variants.clone())
    }
}

/// Loads every variant of an operation and lines them up into a [`Chart`]
pub fn compose_operation(
    operation: &OperationConfig,
    settings: &Settings,
) -> Result<Chart, PlotError> {
    let series = variants(operation, settings)?
        .iter()
        .map(|variant| load_series(&variant.label, &settings.resolve_input(&variant.file)))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Loaded {} series for {}", series.len(), operation.name);
    Chart::compose(&operation.name, series, settings)
}

pub fn run_operation(operation: &OperationConfig, settings: &Settings) -> Result<PathBuf, PlotError> {
    let chart = compose_operation(operation, settings)?;
    if settings.write_plot_data {
        chart.write_plot_data(&settings.plot_data_path(&operation.name))?;
    }
    chart.render()
}

fn outcome(operation: &OperationConfig, settings: &Settings) -> Outcome {
    let result = run_operation(operation, settings);
    match &result {
        Ok(path) => info!("Plotted {} to {path:?}", operation.name),
        Err(err) => error!("Plotting {} failed: {err}", operation.name),
    }
    Outcome {
        operation: operation.name.clone(),
        result,
    }
}

/// Plots every operation, a failure only affects its own operation.
///
/// `fail_fast` stops at the first failure and forces sequential rendering.
pub fn run_all(config: &Config, fail_fast: bool) -> Vec<Outcome> {
    let settings = &config.settings;
    if settings.parallel && !fail_fast {
        return config
            .operations
            .par_iter()
            .map(|op| outcome(op, settings))
            .collect();
    }

    let mut outcomes = Vec::with_capacity(config.operations.len());
    for op in &config.operations {
        let outcome = outcome(op, settings);
        let failed = outcome.result.is_err();
        outcomes.push(outcome);
        if failed && fail_fast {
            break;
        }
    }
    outcomes
}

/// Plots every operation and reports the written images, errors if any operation failed
pub async fn plot_all(config: Config, fail_fast: bool, out: &mut impl Write) -> Result<()> {
    create_dir_all(&config.settings.output_dir).await?;
    info!(
        "Plotting {} operations for {}",
        config.operations.len(),
        config.name
    );

    let outcomes = spawn_blocking(move || run_all(&config, fail_fast)).await?;
    for outcome in &outcomes {
        if let Ok(path) = &outcome.result {
            writeln!(out, "{} -> {}", outcome.operation, path.display())?;
        }
    }

    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.operation.as_str())
        .collect();
    if !failed.is_empty() {
        error!("Failed operations: {failed:?}");
        bail!("{} of {} operations failed", failed.len(), outcomes.len());
    }
    Ok(())
}

pub fn list_operations(config: &Config, out: &mut impl Write) -> Result<()> {
    for op in &config.operations {
        writeln!(
            out,
            "{} -> {}",
            op.name,
            config.settings.output_path(&op.name).display()
        )?;
        match variants(op, &config.settings) {
            Ok(variants) => {
                for variant in variants {
                    let path = config.settings.resolve_input(&variant.file);
                    let status = if path.exists() { "" } else { " (missing)" };
                    writeln!(out, "  {}: {}{status}", variant.label, path.display())?;
                }
            }
            Err(err) => writeln!(out, "  {err}")?,
        }
    }
    Ok(())
}

/// Writes the composed chart specifications as a json array, nothing is rendered
pub fn print_charts(config: &Config, out: &mut impl Write) -> Result<()> {
    let charts = config
        .operations
        .iter()
        .map(|op| compose_operation(op, &config.settings))
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_writer_pretty(&mut *out, &charts)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::{read_to_string, write};

    use super::*;

    fn workload_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for op in ["put", "get", "scan"] {
            write(
                dir.path().join(format!("{op}_results_1MB.txt")),
                "10,5.0\n20,9.5\n",
            )
            .unwrap();
            write(
                dir.path().join(format!("{op}_results_4MB.txt")),
                "10,6.2\n20,11.0\n",
            )
            .unwrap();
        }
        dir
    }

    async fn config_in(dir: &Path) -> Config {
        load_config(
            None,
            Some(dir.to_path_buf()),
            Some(dir.to_path_buf()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn composes_reference_scenario() {
        let dir = workload_dir();
        let config = config_in(dir.path()).await;

        let chart = compose_operation(&config.operations[0], &config.settings).unwrap();
        assert_eq!(chart.categories, ["10", "20"]);
        assert_eq!(chart.lines.len(), 2);
        assert_eq!(chart.lines[0].label, "Memtable Size (1MB)");
        assert_eq!(chart.lines[0].values, [5.0, 9.5]);
        assert_eq!(chart.lines[1].label, "Memtable Size (4MB)");
        assert_eq!(chart.lines[1].values, [6.2, 11.0]);
        assert_eq!(chart.path, dir.path().join("put_throughput.png"));
    }

    #[tokio::test]
    async fn malformed_file_produces_no_image() {
        let dir = workload_dir();
        write(dir.path().join("get_results_4MB.txt"), "10,6.2\nabc\n").unwrap();
        let config = config_in(dir.path()).await;

        let err = run_operation(&config.operations[1], &config.settings).unwrap_err();
        assert!(matches!(err, PlotError::MalformedRecord { line: 2, .. }));
        assert!(!config.settings.output_path("get").exists());
    }

    #[tokio::test]
    async fn failures_do_not_stop_other_operations() {
        let dir = workload_dir();
        std::fs::remove_file(dir.path().join("put_results_1MB.txt")).unwrap();
        let config = config_in(dir.path()).await;

        let outcomes = run_all(&config, false);
        let names: Vec<_> = outcomes.iter().map(|o| o.operation.as_str()).collect();
        assert_eq!(names, ["put", "get", "scan"]);
        assert!(matches!(
            outcomes[0].result,
            Err(PlotError::MissingFile { .. })
        ));
        assert!(outcomes[1].result.is_ok());
        assert!(outcomes[2].result.is_ok());
        assert!(!config.settings.output_path("put").exists());
        assert!(config.settings.output_path("scan").exists());
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_failure() {
        let dir = workload_dir();
        write(dir.path().join("put_results_4MB.txt"), "10,6.2\n").unwrap();
        let mut config = config_in(dir.path()).await;
        config.settings.parallel = true;

        let outcomes = run_all(&config, true);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].result,
            Err(PlotError::AlignmentMismatch { .. })
        ));
        assert!(!config.settings.output_path("get").exists());
    }

    #[tokio::test]
    async fn parallel_run_keeps_operation_order() {
        let dir = workload_dir();
        let mut config = config_in(dir.path()).await;
        config.settings.parallel = true;
        config.settings.write_plot_data = true;

        let outcomes = run_all(&config, false);
        let names: Vec<_> = outcomes.iter().map(|o| o.operation.as_str()).collect();
        assert_eq!(names, ["put", "get", "scan"]);
        for op in ["put", "get", "scan"] {
            assert!(config.settings.output_path(op).exists());
            assert!(config.settings.plot_data_path(op).exists());
        }
    }

    #[tokio::test]
    async fn rerun_gives_identical_plot_data() {
        let dir = workload_dir();
        let mut config = config_in(dir.path()).await;
        config.settings.write_plot_data = true;
        let path = config.settings.plot_data_path("scan");

        run_operation(&config.operations[2], &config.settings).unwrap();
        let first = read_to_string(&path).unwrap();
        run_operation(&config.operations[2], &config.settings).unwrap();
        assert_eq!(first, read_to_string(&path).unwrap());
    }

    #[tokio::test]
    async fn yaml_config_with_discovery() {
        let dir = workload_dir();
        write(dir.path().join("scan_results_16MB.txt"), "10,1.0\n20,2.0\n").unwrap();
        let config_path = dir.path().join("config.yaml");
        write(
            &config_path,
            format!(
                r#"
name: memtable-size
settings:
  input_dir: {dir}
  output_dir: {dir}
  strict_alignment: true
operations:
  - name: put
    variants:
      - {{ label: "small", file: put_results_1MB.txt }}
  - name: scan
    discover: true
"#,
                dir = dir.path().display()
            ),
        )
        .unwrap();

        let config = load_config(Some(&config_path), None, None).await.unwrap();
        assert_eq!(config.name, "memtable-size");
        assert!(config.settings.strict_alignment);
        assert_eq!(config.settings.width, 640);

        let chart = compose_operation(&config.operations[1], &config.settings).unwrap();
        let legend: Vec<_> = chart.lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            legend,
            [
                "Memtable Size (1MB)",
                "Memtable Size (4MB)",
                "Memtable Size (16MB)"
            ]
        );
    }

    #[tokio::test]
    async fn cli_dirs_override_config() {
        let config = load_config(None, Some(PathBuf::from("in")), None).await.unwrap();
        assert_eq!(config.settings.input_dir, PathBuf::from("in"));
        assert_eq!(config.settings.output_dir, PathBuf::from("."));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        write(&config_path, "operations: []\n").unwrap();
        assert!(load_config(Some(&config_path), None, None).await.is_err());
    }

    #[tokio::test]
    async fn print_writes_only_json() {
        let dir = workload_dir();
        write(dir.path().join("put_results_1MB.txt"), "10,5.0\n20,9.5\n40,12\n").unwrap();
        write(dir.path().join("put_results_4MB.txt"), "10,6.2\n21,11.0\n40,13\n").unwrap();
        let config = config_in(dir.path()).await;

        let mut out = Vec::new();
        print_charts(&config, &mut out).unwrap();
        let charts: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(charts.as_array().unwrap().len(), 3);
        assert_eq!(charts[0]["operation"], "put");
        assert_eq!(charts[0]["categories"], serde_json::json!(["10", "20", "40"]));
        assert!(!config.settings.output_path("put").exists());
    }

    #[tokio::test]
    async fn print_fails_on_bad_operation() {
        let dir = workload_dir();
        write(dir.path().join("scan_results_1MB.txt"), "x,notanumber\n").unwrap();
        let config = config_in(dir.path()).await;

        let mut out = Vec::new();
        assert!(print_charts(&config, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn ls_flags_missing_files() {
        let dir = workload_dir();
        std::fs::remove_file(dir.path().join("get_results_4MB.txt")).unwrap();
        let config = config_in(dir.path()).await;

        let mut out = Vec::new();
        list_operations(&config, &mut out).unwrap();
        let listing = String::from_utf8(out).unwrap();
        let missing: Vec<_> = listing
            .lines()
            .filter(|line| line.ends_with("(missing)"))
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("Memtable Size (4MB)"));
        assert!(missing[0].contains("get_results_4MB.txt"));
        assert!(listing.starts_with("put -> "));
    }

    #[tokio::test]
    async fn plot_all_reports_written_images() {
        let dir = workload_dir();
        let config = config_in(dir.path()).await;

        let mut out = Vec::new();
        plot_all(config, false, &mut out).await.unwrap();
        let report = String::from_utf8(out).unwrap();
        assert_eq!(report.lines().count(), 3);
        assert!(report.starts_with("put -> "));
    }

    #[tokio::test]
    async fn plot_all_errors_when_an_operation_fails() {
        let dir = workload_dir();
        std::fs::remove_file(dir.path().join("scan_results_1MB.txt")).unwrap();
        let config = config_in(dir.path()).await;
        let settings = config.settings.clone();

        let mut out = Vec::new();
        let err = plot_all(config, false, &mut out).await.unwrap_err();
        assert!(err.to_string().contains("1 of 3 operations failed"));
        let report = String::from_utf8(out).unwrap();
        assert_eq!(report.lines().count(), 2);
        assert!(settings.output_path("get").exists());
        assert!(!settings.output_path("scan").exists());
    }
}
