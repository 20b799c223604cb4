use crate::clip::{ClipBox, ClipSpec};
use crate::config::DecimationConfig;
use crate::progress::ImportProgress;
use crate::result::{DecimationError, DecimationResult};
use crate::source::SourceKind;
use crate::staleness::ReadMode;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

const BAR_SIZE: u64 = 10_000;

#[derive(Parser, Debug)]
#[command(name = "pcdecimate", author, version, about)]
pub struct Cli {
    /// LAS/LAZ file or greyscale heightmap.
    #[arg(required = true)]
    pub input: PathBuf,
    /// plain, classified or raster.
    #[arg(short, long, default_value = "classified")]
    pub kind: SourceKind,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides the configured point budget.
    #[arg(short, long)]
    pub target: Option<u64>,
    #[arg(long)]
    pub min_points: Option<u64>,
    /// Float digits below which double precision is considered.
    #[arg(long)]
    pub min_float_digits: Option<i32>,
    /// Ask before storing low precision data (true or false).
    #[arg(long)]
    pub interactive_precision: Option<bool>,
    #[arg(long)]
    pub origin_shift_ratio: Option<f64>,
    /// Points per piece for plain LAS sources.
    #[arg(long)]
    pub piece_size: Option<u64>,
    /// Rows per piece for rasters.
    #[arg(long)]
    pub raster_rows: Option<u32>,
    /// min_x,max_x,min_y,max_y,min_z,max_z
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub clip: Option<Vec<f64>>,
    /// Keep float coordinates even when precision is low.
    #[arg(long, default_value_t = false)]
    pub force_float: bool,
    /// Leave unreadable pieces out instead of aborting.
    #[arg(long, default_value_t = false)]
    pub skip_failed: bool,
    /// Write the completion report as JSON.
    #[arg(short, long)]
    pub report: Option<PathBuf>,
    /// Write assembled points as xyz text.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write one xyz file per piece next to the output path.
    #[arg(long, default_value_t = false)]
    pub per_piece: bool,
    #[arg(short, long, default_value = "display")]
    pub mode: ReadMode,
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied.
    pub fn config(&self) -> DecimationResult<DecimationConfig> {
        let mut config = match &self.config {
            Some(path) => DecimationConfig::load_file(path)?,
            None => DecimationConfig::default(),
        };
        if let Some(target) = self.target {
            config.target_total_points = target;
        }
        if let Some(min_points) = self.min_points {
            config.min_points_per_piece = min_points;
        }
        if let Some(digits) = self.min_float_digits {
            config.min_float_digits = digits;
        }
        if let Some(interactive) = self.interactive_precision {
            config.interactive_precision = interactive;
        }
        if let Some(ratio) = self.origin_shift_ratio {
            config.origin_shift_ratio = ratio;
        }
        if let Some(size) = self.piece_size {
            config.plain_piece_size = size;
        }
        if let Some(rows) = self.raster_rows {
            config.raster_rows_per_piece = rows;
        }
        Ok(config)
    }

    pub fn clip_spec(&self) -> DecimationResult<ClipSpec> {
        match self.clip.as_deref() {
            Some(&[min_x, max_x, min_y, max_y, min_z, max_z]) => Ok(ClipSpec::enabled(
                ClipBox::from_bounds([min_x, max_x, min_y, max_y, min_z, max_z]),
            )),
            Some(values) => Err(DecimationError::InvalidClip(values.len())),
            None => Ok(ClipSpec::disabled()),
        }
    }
}

/// Terminal progress bar for a single import.
pub struct ImportBar {
    name: String,
    bar: ProgressBar,
}

impl ImportBar {
    pub fn new(name: &str) -> Self {
        let style = ProgressStyle::with_template(
            &(name.to_string() + ": [{bar:40.cyan/blue}] {percent}% {msg}"),
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("▉▊▋▌▍▎▏ ");

        Self {
            name: name.to_string(),
            bar: ProgressBar::new(BAR_SIZE).with_style(style),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        info!("{} took: {:?}", self.name, self.bar.elapsed());
    }
}

impl ImportProgress for ImportBar {
    fn on_progress(&self, message: &str, fraction: f64) {
        self.bar.set_message(message.to_string());
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * BAR_SIZE as f64) as u64);
    }

    fn is_abort_requested(&self) -> bool {
        false
    }
}
