//! Stabilizer simulation of an [`InstructionStream`](crate::stream::InstructionStream):
//! a noiseless reference run on a tableau and a Pauli-frame sampler for
//! noisy shots.

use bitvec::prelude::*;

use crate::error::{CircuitError, Result};
use crate::stream::MeasIx;

pub mod frame;
pub mod tableau;

pub use frame::{FrameSampler, Shot};
pub use tableau::{reference_sample, ReferenceSample, Tableau};

/// Looks up `rec[offset]` in a record that is still being written.
pub(crate) fn record_bit(record: &BitSlice<u64, Lsb0>, offset: i64) -> Result<bool> {
    let abs = record.len() as i64 + offset;
    if offset >= 0 || abs < 0 {
        return Err(CircuitError::consistency(format!(
            "rec[{offset}] with {} results recorded",
            record.len()
        )));
    }
    Ok(record[abs as MeasIx])
}
