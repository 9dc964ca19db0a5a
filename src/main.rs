//! vispipe - command line entry point
//!
//! Runs pipeline description files, prints pipeline information, and shows
//! how a whole extent is decomposed into pieces.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vispipe::pipeline::{
    compute_local_extent_with_ghosts, DirectorySink, EventKind, NodeOutcome, PieceRequest,
    PipelineEvent,
};
use vispipe::{Extent, PipelineConfig, SplitMode};

#[derive(Parser)]
#[command(name = "vispipe", version, about = "Demand-driven visualization pipeline")]
struct Cli {
    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update a pipeline, or write it in pieces when it has a [writer] table
    Run {
        config: PathBuf,
        /// Update only this piece of every terminal node, e.g. "1/4" or "1/4+1"
        #[arg(long)]
        piece: Option<PieceRequest>,
    },
    /// Run the information pass and print what each node can produce
    Info { config: PathBuf },
    /// Print the local extent of every piece of a whole extent
    Translate {
        /// Whole extent, e.g. "0 31 0 31 0 31"
        whole: Extent,
        #[arg(long, default_value_t = 4)]
        pieces: u32,
        #[arg(long, default_value = "block")]
        split: SplitMode,
        #[arg(long, default_value_t = 0)]
        ghost_level: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "vispipe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vispipe=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    match cli.command {
        Command::Run { config, piece } => run(config, piece),
        Command::Info { config } => info(config),
        Command::Translate {
            whole,
            pieces,
            split,
            ghost_level,
        } => translate(whole, pieces, split, ghost_level),
    }
}

fn run(path: PathBuf, piece: Option<PieceRequest>) -> Result<()> {
    let config = PipelineConfig::load(&path)?;
    let mut built = config.build()?;

    if let Some(writer_config) = &config.writer {
        let writer = writer_config.writer()?;
        let input = built.node(&writer_config.input)?;
        let mut sink = DirectorySink::new(&writer_config.directory, &writer_config.prefix)?;
        let events = built.pipeline.subscribe(&[EventKind::PieceWritten]);
        let summary = writer
            .write(&mut built.pipeline, input, &mut sink)
            .with_context(|| format!("Writing pieces of '{}'", writer_config.input))?;
        for event in events.try_iter() {
            if let PipelineEvent::PieceWritten {
                piece,
                num_points,
                num_cells,
            } = event
            {
                println!("piece {:>4}: {} points, {} cells", piece, num_points, num_cells);
            }
        }
        println!(
            "wrote {} pieces: {} points, {} cells",
            summary.written.len(),
            summary.total_points(),
            summary.total_cells()
        );
        if summary.manifest.is_some() {
            println!("manifest: {}", sink.manifest_path().display());
        }
        return Ok(());
    }

    let report = match piece {
        Some(piece) => {
            let mut report = None;
            for target in built.pipeline.terminal_nodes() {
                built.pipeline.set_update_piece(target, piece)?;
                report = Some(built.pipeline.update(target)?);
            }
            report.unwrap_or_default()
        }
        None => built.pipeline.update_all()?,
    };

    for (name, &id) in &built.names {
        let status = match report.outcome(id) {
            Some(NodeOutcome::Executed(reason)) => format!("executed ({})", reason),
            Some(NodeOutcome::Reused) => "reused".to_string(),
            Some(NodeOutcome::Failed(err)) => format!("FAILED: {}", err),
            Some(NodeOutcome::Skipped { failed }) => format!("skipped (upstream {} failed)", failed),
            None => "not updated".to_string(),
        };
        let size = built
            .pipeline
            .output(id.output(0))
            .map(|d| format!(", {} points, {} cells", d.num_points(), d.num_cells()))
            .unwrap_or_default();
        println!("{:<16} {}{}", name, status, size);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    if !report.is_success() {
        anyhow::bail!("{} node(s) failed", report.failed().len());
    }
    Ok(())
}

fn info(path: PathBuf) -> Result<()> {
    let config = PipelineConfig::load(&path)?;
    let mut built = config.build()?;
    let targets = built.pipeline.terminal_nodes();
    let report = built.pipeline.update_information(&targets)?;

    for (name, &id) in &built.names {
        if let Some(NodeOutcome::Failed(err)) = report.outcome(id) {
            println!("{:<16} FAILED: {}", name, err);
            continue;
        }
        let Some(info) = built.pipeline.information(id.output(0)) else {
            println!("{:<16} (no outputs)", name);
            continue;
        };
        let kind = info
            .data_kind()
            .map_or_else(|| "unknown".to_string(), |k| k.to_string());
        let whole = info
            .whole_extent()
            .map_or_else(|| "-".to_string(), |e| e.to_string());
        println!(
            "{:<16} {:<6} whole {} ghost {} steps {:?}",
            name,
            kind,
            whole,
            info.max_ghost_level(),
            info.time_steps()
        );
    }
    Ok(())
}

fn translate(whole: Extent, pieces: u32, split: SplitMode, ghost_level: u32) -> Result<()> {
    println!("{} split into {} pieces ({})", whole, pieces, split);
    for piece in 0..pieces {
        let local = compute_local_extent_with_ghosts(&whole, pieces, piece, ghost_level, split)?;
        println!("{:>4}: {} ({} points)", piece, local, local.num_points());
    }
    Ok(())
}
