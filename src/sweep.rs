use bitvec::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sim::FrameSampler;
use crate::stream::InstructionStream;

pub const CSV_HEADER: &str = "shots,errors,discards,decoder,json_metadata";

/// Predicts observable flips from detector flips. A decoder that cannot
/// find a correction predicts no flip instead of failing.
pub trait Decoder: Sync {
    fn name(&self) -> &str;
    fn decode(&self, detectors: &BitSlice<u64, Lsb0>, num_observables: usize) -> BitVec<u64, Lsb0>;
}

/// Always predicts no flip. Useful for protocols that are fully
/// post-selected, where every kept shot is taken at face value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDecoder;

impl Decoder for NullDecoder {
    fn name(&self) -> &str {
        "null"
    }

    fn decode(&self, _detectors: &BitSlice<u64, Lsb0>, num_observables: usize) -> BitVec<u64, Lsb0> {
        bitvec![u64, Lsb0; 0; num_observables]
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub stream: InstructionStream,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub max_shots: usize,
    pub max_errors: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            max_shots: 10_000,
            max_errors: 100,
            batch_size: 256,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub decoder: String,
    pub shots: usize,
    pub errors: usize,
    pub discards: usize,
    pub metadata: serde_json::Value,
}

impl TaskStats {
    pub fn kept(&self) -> usize {
        self.shots - self.discards
    }

    /// Logical error rate among shots that survived post-selection.
    pub fn error_rate(&self) -> f64 {
        if self.kept() == 0 {
            0.0
        } else {
            self.errors as f64 / self.kept() as f64
        }
    }

    pub fn discard_rate(&self) -> f64 {
        if self.shots == 0 {
            0.0
        } else {
            self.discards as f64 / self.shots as f64
        }
    }

    pub fn error_rate_ci(&self, z: f64) -> (f64, f64) {
        wilson_ci(self.errors, self.kept(), z)
    }

    pub fn to_csv_line(&self) -> String {
        let metadata = self.metadata.to_string().replace('"', "\"\"");
        format!(
            "{},{},{},{},\"{}\"",
            self.shots, self.errors, self.discards, self.decoder, metadata
        )
    }
}

/// Wilson score interval for a binomial proportion at confidence `z`.
pub fn wilson_ci(successes: usize, trials: usize, z: f64) -> (f64, f64) {
    if trials == 0 {
        return (0.0, 1.0);
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let spread = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt() / denom;
    ((center - spread).max(0.0), (center + spread).min(1.0))
}

fn run_task<D: Decoder + ?Sized>(
    task: &Task,
    task_ix: usize,
    decoder: &D,
    config: &SweepConfig,
) -> Result<TaskStats> {
    let sampler = FrameSampler::new(&task.stream);
    let num_observables = task.stream.num_observables();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed.wrapping_add(task_ix as u64));
    let mut stats = TaskStats {
        decoder: decoder.name().to_string(),
        shots: 0,
        errors: 0,
        discards: 0,
        metadata: task.metadata.clone(),
    };
    let batch = config.batch_size.max(1);
    while stats.shots < config.max_shots && stats.errors < config.max_errors {
        let todo = batch.min(config.max_shots - stats.shots);
        for _ in 0..todo {
            let shot = sampler.sample_shot(&mut rng)?;
            stats.shots += 1;
            if shot.is_discarded(sampler.postselection_mask()) {
                stats.discards += 1;
                continue;
            }
            let predicted = decoder.decode(&shot.detectors, num_observables);
            if predicted != shot.observables {
                stats.errors += 1;
            }
        }
        log::trace!(
            "task {task_ix}: {} shots, {} errors, {} discards",
            stats.shots,
            stats.errors,
            stats.discards
        );
    }
    Ok(stats)
}

/// Samples every task in parallel until it hits `max_shots` or
/// `max_errors`. Shots where any post-selected detector fired are counted
/// as discards and never decoded.
pub fn collect<D: Decoder + ?Sized>(
    tasks: &[Task],
    decoder: &D,
    config: &SweepConfig,
) -> Result<Vec<TaskStats>> {
    log::info!("collecting {} tasks with the {} decoder", tasks.len(), decoder.name());
    tasks
        .par_iter()
        .enumerate()
        .map(|(ix, task)| run_task(task, ix, decoder, config))
        .collect()
}
