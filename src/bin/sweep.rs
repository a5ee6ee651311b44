use std::{fs::File, io::Write, path::PathBuf};

use clap::Parser;
use magic_codec::{
    magic::{magic_preparation, MagicConfig},
    sweep::{collect, NullDecoder, SweepConfig, Task, TaskStats, CSV_HEADER},
};
use serde_json::json;
use simple_logger::SimpleLogger;

/// Samples the magic state preparation over a range of post-selected growth
/// rounds and writes one CSV row per point.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base magic config. `t_ps_grow` is overwritten by the sweep.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sweeps `t_ps_grow` over `0..max_ps_grow`.
    #[arg(short, long, default_value_t = 10)]
    max_ps_grow: usize,

    #[arg(long, default_value_t = 10_000)]
    max_shots: usize,

    #[arg(long, default_value_t = 100)]
    max_errors: usize,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// CSV destination. Defaults to stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn build_tasks(base: &MagicConfig, max_ps_grow: usize) -> magic_codec::Result<Vec<Task>> {
    (0..max_ps_grow)
        .map(|t_ps_grow| {
            let config = MagicConfig {
                t_ps_grow,
                ..base.clone()
            };
            Ok(Task {
                stream: magic_preparation(&config)?,
                metadata: json!({
                    "d": config.distance,
                    "p": config.error_rate,
                    "t_ps_grow": t_ps_grow,
                }),
            })
        })
        .collect()
}

fn run(cli: &Cli) -> magic_codec::Result<Vec<TaskStats>> {
    let base = match &cli.config {
        Some(path) => MagicConfig::from_file(path)?,
        None => MagicConfig::default(),
    };
    let tasks = build_tasks(&base, cli.max_ps_grow)?;
    let sweep = SweepConfig {
        max_shots: cli.max_shots,
        max_errors: cli.max_errors,
        seed: cli.seed,
        ..Default::default()
    };
    collect(&tasks, &NullDecoder, &sweep)
}

fn main() {
    let _ = SimpleLogger::new().with_level(log::LevelFilter::Info).init();
    let cli = Cli::parse();
    let stats = match run(&cli) {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for s in stats.iter() {
        let (low, high) = s.error_rate_ci(1.96);
        log::info!(
            "{}: kept {} of {} shots, logical error rate {:.2e} in [{:.2e}, {:.2e}]",
            s.metadata,
            s.kept(),
            s.shots,
            s.error_rate(),
            low,
            high
        );
        csv.push_str(&s.to_csv_line());
        csv.push('\n');
    }
    let written = match &cli.output {
        Some(path) => File::create(path).and_then(|mut file| file.write_all(csv.as_bytes())),
        None => std::io::stdout().write_all(csv.as_bytes()),
    };
    if let Err(e) = written {
        log::error!("could not write results: {e}");
        std::process::exit(1);
    }
}
