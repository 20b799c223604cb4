/// Point cloud decimation command line entry point
use anyhow::{Context, Result};
use clap::Parser;
use point_cloud_decimation::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Cli::parse();
    let config = args.config().context("failed to load config")?;
    let clip = args.clip_spec().context("invalid --clip")?;

    let mut registry = PieceRegistry::new();
    let source = registry
        .register_source(&args.input, args.kind, &config)
        .with_context(|| format!("failed to open {}", args.input.display()))?;

    let bar = ImportBar::new("Importing");
    let outcome = import_source(
        &mut registry,
        source,
        clip,
        ImportOptions::from_config(&config),
        &bar,
        |request| match request {
            ImportRequest::Precision { min_digits } => {
                warn!(min_digits, "float coordinates would lose precision");
                ImportAnswer::UseDouble(!args.force_float)
            }
            ImportRequest::PieceReadFailed { piece, reason } if args.skip_failed => {
                warn!(%piece, %reason, "skipping piece");
                ImportAnswer::SkipPiece
            }
            ImportRequest::PieceReadFailed { .. } => ImportAnswer::AbortSource,
        },
    )?;
    bar.finish();

    let report = match outcome {
        ImportOutcome::Cached(report) => report,
        ImportOutcome::Aborted => {
            warn!("import aborted");
            return Ok(());
        }
        ImportOutcome::Failed(error) => return Err(error).context("import failed"),
    };
    report.log_summary();

    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!("Saved report to {}", path.display());
    }

    if let Some(path) = &args.output {
        let (pieces, names): (Vec<PieceRef>, Vec<String>) = registry
            .get_pieces(source)?
            .iter()
            .filter(|piece| piece.visible)
            .map(|piece| (PieceRef::new(source, piece.id), piece.name.clone()))
            .unzip();

        let mut assembler = OutputAssembler::new(&registry, clip);
        let geometries = assembler.assemble(&pieces, args.mode, false)?;

        if args.per_piece {
            for (geometry, name) in geometries.iter().zip(&names) {
                let piece_path = piece_output_path(path, name);
                save_xyz(&piece_path, std::slice::from_ref(geometry))?;
            }
        } else {
            save_xyz(path, &geometries)?;
        }
    }

    Ok(())
}

fn save_xyz(path: &Path, geometries: &[Arc<Geometry>]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_xyz(&mut writer, geometries)?;
    writer.flush()?;

    let points: usize = geometries.iter().map(|geometry| geometry.len()).sum();
    info!("Saved {} points to {}", points, path.display());
    Ok(())
}
