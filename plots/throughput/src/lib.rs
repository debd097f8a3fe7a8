use std::{
    fmt::Display,
    fs::{create_dir_all, write},
    ops::Range,
    path::{Path, PathBuf},
};

use common::{config::Settings, error::PlotError, result::Series};
use image::{ColorType, ImageEncoder, codecs::png::PngEncoder};
use plotters::{coord::Shift, prelude::*};
use serde::Serialize;
use tracing::{debug, warn};

pub const CAPTION: &str = "Throughput vs. Input Data Size";
pub const X_DESC: &str = "Input Data Size (MB)";
pub const Y_DESC: &str = "Throughput (MB/S)";

const FONT: &str = "sans-serif";

macro_rules! hexcolour {
    ($colour:literal) => {
        RGBColor(
            (($colour & 0xFF0000) >> 16) as u8,
            (($colour & 0x00FF00) >> 8) as u8,
            ($colour & 0x0000FF) as u8,
        )
    };
}

/// Line colours, handed out in series order
pub const COLOURS: &[RGBColor] = &[
    hexcolour!(0x1F77B4),
    hexcolour!(0xFF7F0E),
    hexcolour!(0x2CA02C),
    hexcolour!(0xD62728),
    hexcolour!(0x9467BD),
    hexcolour!(0x8C564B),
    hexcolour!(0xE377C2),
    hexcolour!(0x7F7F7F),
    hexcolour!(0xBCBD22),
    hexcolour!(0x17BECF),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    /// Legend entry
    pub label: String,
    pub values: Vec<f64>,
}

/// Everything needed to draw one operation's throughput chart.
///
/// Built fresh by [`Chart::compose`] for every operation and consumed by [`Chart::render`],
/// so nothing drawn for one operation can end up on another's image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub operation: String,
    pub caption: String,
    pub x_desc: String,
    pub y_desc: String,
    /// X axis ticks, taken from the first series
    pub categories: Vec<String>,
    /// In draw order, which is also legend order
    pub lines: Vec<ChartLine>,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub y_label_precision: Option<usize>,
}

/// Checks that every series can share the first series' x axis.
///
/// Lengths always have to match. Differing labels are only an error when `strict` is set,
/// otherwise the first series' labels win.
pub fn check_alignment(operation: &str, series: &[Series], strict: bool) -> Result<(), PlotError> {
    let Some((first, rest)) = series.split_first() else {
        return Err(PlotError::EmptyChart {
            operation: operation.to_owned(),
        });
    };
    if first.is_empty() {
        return Err(PlotError::EmptyChart {
            operation: operation.to_owned(),
        });
    }

    for other in rest {
        if other.len() != first.len() {
            return Err(PlotError::AlignmentMismatch {
                operation: operation.to_owned(),
                reason: format!(
                    "{} has {} records but {} has {}",
                    first.variant,
                    first.len(),
                    other.variant,
                    other.len()
                ),
            });
        }

        let mismatch = first
            .labels()
            .zip(other.labels())
            .enumerate()
            .find(|(_, (a, b))| a != b);
        if let Some((idx, (a, b))) = mismatch {
            let reason = format!(
                "{} has label {a:?} at position {idx} but {} has {b:?}",
                first.variant, other.variant
            );
            if strict {
                return Err(PlotError::AlignmentMismatch {
                    operation: operation.to_owned(),
                    reason,
                });
            }
            warn!("{operation}: {reason}, using the labels of {}", first.variant);
        }
    }
    Ok(())
}

impl Chart {
    pub fn compose(
        operation: &str,
        series: Vec<Series>,
        settings: &Settings,
    ) -> Result<Self, PlotError> {
        check_alignment(operation, &series, settings.strict_alignment)?;

        let categories = series[0].labels().map(str::to_owned).collect();
        let lines = series
            .into_iter()
            .map(|s| ChartLine {
                values: s.values().collect(),
                label: s.variant,
            })
            .collect();

        Ok(Self {
            operation: operation.to_owned(),
            caption: CAPTION.to_owned(),
            x_desc: X_DESC.to_owned(),
            y_desc: Y_DESC.to_owned(),
            categories,
            lines,
            path: settings.output_path(operation),
            width: settings.width,
            height: settings.height,
            y_label_precision: settings.y_label_precision,
        })
    }

    /// Upper bound of the y axis, with some headroom above the largest value
    pub fn y_max(&self) -> f64 {
        let max = self
            .lines
            .iter()
            .flat_map(|line| line.values.iter().copied())
            .fold(0.0, f64::max);
        if max > 0.0 { max * 1.1 } else { 1.0 }
    }

    pub fn colour(idx: usize) -> RGBColor {
        COLOURS[idx % COLOURS.len()]
    }

    /// Writes the chart specification as pretty json
    pub fn write_plot_data(&self, path: &Path) -> Result<(), PlotError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(|source| PlotError::WriteFailure {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| self.render_error(err))?;
        write(path, json).map_err(|source| PlotError::WriteFailure {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Draws the chart and writes it to [`Chart::path`], replacing any existing file.
    pub fn render(self) -> Result<PathBuf, PlotError> {
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            self.draw(&root)?;
            root.present().map_err(|err| self.render_error(err))?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&buffer, self.width, self.height, ColorType::Rgb8)
            .map_err(|err| self.render_error(err))?;
        write(&self.path, png).map_err(|source| PlotError::WriteFailure {
            path: self.path.clone(),
            source,
        })?;

        debug!("Wrote {} chart to {:?}", self.operation, self.path);
        Ok(self.path)
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> Result<(), PlotError> {
        root.fill(&WHITE).map_err(|err| self.render_error(err))?;

        let mut chart = ChartBuilder::on(root)
            .caption(&self.caption, (FONT, 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                self.x_range().with_key_points(self.tick_positions()),
                0f64..self.y_max(),
            )
            .map_err(|err| self.render_error(err))?;

        let tick_label = |value: &f64| self.tick_label(*value);
        let y_tick = |value: &f64| match self.y_label_precision {
            Some(precision) => format!("{value:.precision$}"),
            None => format!("{value}"),
        };

        let mut mesh = chart.configure_mesh();
        mesh.disable_x_mesh()
            .x_desc(self.x_desc.as_str())
            .y_desc(self.y_desc.as_str())
            .x_label_formatter(&tick_label)
            .axis_desc_style((FONT, 16));
        if self.y_label_precision.is_some() {
            mesh.y_label_formatter(&y_tick);
        }
        mesh.draw().map_err(|err| self.render_error(err))?;

        for (idx, line) in self.lines.iter().enumerate() {
            let colour = Self::colour(idx);
            let points = line
                .values
                .iter()
                .enumerate()
                .map(|(x, y)| (x as f64, *y));

            chart
                .draw_series(LineSeries::new(points, colour.stroke_width(2)))
                .map_err(|err| self.render_error(err))?
                .label(line.label.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], colour.stroke_width(2))
                });
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(|err| self.render_error(err))?;

        Ok(())
    }

    /// One category wide slot per tick, centred on the tick's index
    pub fn x_range(&self) -> Range<f64> {
        -0.5..self.categories.len() as f64 - 0.5
    }

    pub fn tick_positions(&self) -> Vec<f64> {
        (0..self.categories.len()).map(|idx| idx as f64).collect()
    }

    fn tick_label(&self, value: f64) -> String {
        let idx = value.round();
        if idx < 0.0 || (value - idx).abs() > 1e-6 {
            return String::new();
        }
        self.categories
            .get(idx as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn render_error(&self, err: impl Display) -> PlotError {
        PlotError::Render {
            operation: self.operation.clone(),
            reason: err.to_string(),
        }
    }
}
