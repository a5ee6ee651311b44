use std::{fs::File, io::Write, path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use log::LevelFilter;
use magic_codec::{
    check_catalog::CheckType,
    experiments::{memory_experiment, s_state_preserving, s_state_preserving_with_growth},
    magic::{magic_preparation, MagicConfig},
    qrm::QrmCode,
    stream::InstructionStream,
    CircuitError,
};
use simple_logger::SimpleLogger;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Where to write the circuit text. Defaults to stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the stream summary as JSON instead of the circuit.
    #[arg(short, long)]
    summary: bool,

    /// Turn on debug logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full magic state preparation.
    Magic {
        /// JSON config, or a directory holding magic_config.json.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Overrides the distance the patch grows to.
        #[arg(short, long)]
        distance: Option<usize>,

        /// Overrides the physical error rate.
        #[arg(short = 'p', long)]
        error_rate: Option<f64>,

        /// Writes the resolved config to this file and exits.
        #[arg(long, value_name = "FILE")]
        save_config: Option<PathBuf>,
    },
    /// Rotated surface code memory experiment.
    Memory {
        #[arg(short, long, default_value_t = 3)]
        m: usize,
        #[arg(short, long, default_value_t = 3)]
        n: usize,
        #[arg(short = 'p', long, default_value_t = 0.001)]
        error_rate: f64,
        /// X or Z.
        #[arg(short, long, default_value = "Z")]
        basis: String,
        #[arg(short, long, default_value_t = 3)]
        rounds: usize,
    },
    /// Keeps an encoded S state alive and reads it out in Y.
    SState {
        #[arg(short, long, default_value_t = 3)]
        distance: usize,
        #[arg(short = 'p', long, default_value_t = 0.001)]
        error_rate: f64,
        #[arg(short, long, default_value_t = 3)]
        rounds: usize,
        /// Grow the patch by two at this round.
        #[arg(short, long)]
        grow_at: Option<usize>,
    },
    /// QRM S state preparation followed by a transversal read-out.
    Qrm {
        #[arg(short = 'p', long, default_value_t = 0.001)]
        error_rate: f64,
        /// X or Y.
        #[arg(short, long, default_value = "Y")]
        readout: String,
    },
}

fn qrm_experiment(error_rate: f64, readout: &str) -> magic_codec::Result<InstructionStream> {
    let mut qrm = QrmCode::new(error_rate, 0, 0)?;
    let mut stream = InstructionStream::new();
    qrm.prepare_s_state(&mut stream)?;
    match readout.trim().to_ascii_uppercase().as_str() {
        "X" => qrm.x_measurement(&mut stream, &[])?,
        "Y" => qrm.y_measurement(&mut stream)?,
        other => {
            return Err(CircuitError::config(format!(
                "unknown QRM read-out basis '{other}'"
            )))
        }
    }
    Ok(stream)
}

fn build(command: Commands) -> magic_codec::Result<Option<InstructionStream>> {
    let stream = match command {
        Commands::Magic {
            config,
            distance,
            error_rate,
            save_config,
        } => {
            let mut magic = match config {
                Some(path) => MagicConfig::from_file(path)?,
                None => MagicConfig::default(),
            };
            if let Some(d) = distance {
                magic.distance = d;
            }
            if let Some(p) = error_rate {
                magic.error_rate = p;
            }
            if let Some(path) = save_config {
                magic.save(&path)?;
                log::info!("saved config to {}", path.display());
                return Ok(None);
            }
            magic_preparation(&magic)?
        }
        Commands::Memory {
            m,
            n,
            error_rate,
            basis,
            rounds,
        } => memory_experiment(m, n, error_rate, CheckType::from_str(&basis)?, rounds)?,
        Commands::SState {
            distance,
            error_rate,
            rounds,
            grow_at,
        } => match grow_at {
            Some(t) => s_state_preserving_with_growth(distance, error_rate, t, rounds)?,
            None => s_state_preserving(distance, error_rate, rounds)?,
        },
        Commands::Qrm {
            error_rate,
            readout,
        } => qrm_experiment(error_rate, &readout)?,
    };
    Ok(Some(stream))
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("could not start logger: {e}");
    }

    let stream = match build(cli.command) {
        Ok(Some(stream)) => stream,
        Ok(None) => return,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    let summary = stream.summary();
    log::info!(
        "{} instructions, {} measurements, {} detectors ({} post-selected)",
        summary.instructions,
        summary.measurements,
        summary.detectors,
        summary.postselected_detectors
    );

    let text = if cli.summary {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => s,
            Err(e) => {
                log::error!("cannot serialize summary: {e}");
                std::process::exit(1);
            }
        }
    } else {
        stream.to_string()
    };
    let written = match cli.output {
        Some(path) => File::create(&path).and_then(|mut file| file.write_all(text.as_bytes())),
        None => std::io::stdout().write_all(text.as_bytes()),
    };
    if let Err(e) = written {
        log::error!("could not write circuit: {e}");
        std::process::exit(1);
    }
}
