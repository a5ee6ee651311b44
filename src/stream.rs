use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::math::pauli::Pauli;
use crate::position_index::QubitId;

/// Absolute index of a measurement result, counted from the start of the
/// stream across every lattice writing into it.
pub type MeasIx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    QubitCoords,
    R,
    H,
    S,
    SDag,
    X,
    Y,
    Z,
    CX,
    CZ,
    Depolarize1,
    Depolarize2,
    XError,
    M,
    MR,
    MPP,
    Detector,
    ObservableInclude,
    Tick,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::QubitCoords => "QUBIT_COORDS",
            Op::R => "R",
            Op::H => "H",
            Op::S => "S",
            Op::SDag => "S_DAG",
            Op::X => "X",
            Op::Y => "Y",
            Op::Z => "Z",
            Op::CX => "CX",
            Op::CZ => "CZ",
            Op::Depolarize1 => "DEPOLARIZE1",
            Op::Depolarize2 => "DEPOLARIZE2",
            Op::XError => "X_ERROR",
            Op::M => "M",
            Op::MR => "MR",
            Op::MPP => "MPP",
            Op::Detector => "DETECTOR",
            Op::ObservableInclude => "OBSERVABLE_INCLUDE",
            Op::Tick => "TICK",
        }
    }

    pub fn is_measurement(&self) -> bool {
        matches!(self, Op::M | Op::MR | Op::MPP)
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, Op::Depolarize1 | Op::Depolarize2 | Op::XError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Qubit(QubitId),
    /// Backward reference into the measurement record, always negative.
    Rec(i64),
    Pauli(Pauli, QubitId),
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Qubit(q) => write!(f, "{q}"),
            Target::Rec(offset) => write!(f, "rec[{offset}]"),
            Target::Pauli(p, q) => write!(f, "{p}{q}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub targets: Vec<Target>,
    pub args: Vec<f64>,
}

impl Instruction {
    /// Detectors carrying a non-zero fourth coordinate are post-selected.
    pub fn is_postselected(&self) -> bool {
        self.op == Op::Detector && self.args.get(3).is_some_and(|flag| *flag != 0.0)
    }

    pub fn qubits(&self) -> impl Iterator<Item = QubitId> + '_ {
        self.targets.iter().filter_map(|t| match t {
            Target::Qubit(q) | Target::Pauli(_, q) => Some(*q),
            Target::Rec(_) => None,
        })
    }

    pub fn recs(&self) -> impl Iterator<Item = i64> + '_ {
        self.targets.iter().filter_map(|t| match t {
            Target::Rec(offset) => Some(*offset),
            _ => None,
        })
    }

    fn num_results(&self) -> usize {
        match self.op {
            Op::M | Op::MR => self.targets.len(),
            Op::MPP => 1,
            _ => 0,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.op.name())?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            write!(f, "({})", args.join(", "))?;
        }
        let sep = if self.op == Op::MPP { "*" } else { " " };
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        if !targets.is_empty() {
            write!(f, " {}", targets.join(sep))?;
        }
        Ok(())
    }
}

/// Counts describing a finished stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub instructions: usize,
    pub qubits: usize,
    pub measurements: usize,
    pub detectors: usize,
    pub postselected_detectors: usize,
    pub observables: usize,
}

/// Append-only circuit under construction.
///
/// Every detector and observable is built from absolute measurement indices
/// and converted to `rec[-k]` offsets only when it is appended, against the
/// measurement count at that moment. Nothing in the crate writes a relative
/// offset by hand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    /// The qubit behind every measurement result, `None` for products.
    measured: Vec<Option<QubitId>>,
    num_detectors: usize,
    num_observables: usize,
    num_qubits: usize,
}

impl InstructionStream {
    pub fn new() -> Self {
        InstructionStream::default()
    }

    /// The only mutation primitive. Everything else funnels through here.
    pub fn append(&mut self, op: Op, targets: Vec<Target>, args: Vec<f64>) {
        let ins = Instruction { op, targets, args };
        match op {
            Op::M | Op::MR => {
                for q in ins.qubits() {
                    self.measured.push(Some(q));
                }
            }
            Op::MPP => self.measured.push(None),
            Op::Detector => self.num_detectors += 1,
            Op::ObservableInclude => {
                let k = ins.args.first().copied().unwrap_or(0.0) as usize;
                self.num_observables = self.num_observables.max(k + 1);
            }
            _ => {}
        }
        if let Some(max) = ins.qubits().max() {
            self.num_qubits = self.num_qubits.max(max as usize + 1);
        }
        self.instructions.push(ins);
    }

    pub fn current_measurement_count(&self) -> usize {
        self.measured.len()
    }

    pub fn gate(&mut self, op: Op, qubits: &[QubitId]) {
        if !qubits.is_empty() {
            self.append(op, qubits.iter().map(|q| Target::Qubit(*q)).collect(), vec![]);
        }
    }

    pub fn gate_pairs(&mut self, op: Op, pairs: &[(QubitId, QubitId)]) {
        if !pairs.is_empty() {
            let targets = pairs
                .iter()
                .flat_map(|(a, b)| [Target::Qubit(*a), Target::Qubit(*b)])
                .collect();
            self.append(op, targets, vec![]);
        }
    }

    /// Single-qubit noise channel. Skipped entirely when `p` is zero.
    pub fn noise(&mut self, op: Op, qubits: &[QubitId], p: f64) {
        if p > 0.0 && !qubits.is_empty() {
            self.append(op, qubits.iter().map(|q| Target::Qubit(*q)).collect(), vec![p]);
        }
    }

    pub fn noise_pairs(&mut self, pairs: &[(QubitId, QubitId)], p: f64) {
        if p > 0.0 && !pairs.is_empty() {
            let targets = pairs
                .iter()
                .flat_map(|(a, b)| [Target::Qubit(*a), Target::Qubit(*b)])
                .collect();
            self.append(Op::Depolarize2, targets, vec![p]);
        }
    }

    pub fn tick(&mut self) {
        self.append(Op::Tick, vec![], vec![]);
    }

    pub fn qubit_coords(&mut self, qubit: QubitId, coords: &[f64]) {
        self.append(Op::QubitCoords, vec![Target::Qubit(qubit)], coords.to_vec());
    }

    /// Appends a measurement and returns the absolute index of each result.
    pub fn measure(&mut self, op: Op, qubits: &[QubitId]) -> Vec<MeasIx> {
        let start = self.current_measurement_count();
        if !qubits.is_empty() {
            self.append(op, qubits.iter().map(|q| Target::Qubit(*q)).collect(), vec![]);
        }
        (start..self.current_measurement_count()).collect()
    }

    /// `X_ERROR(p)` followed by `MR`, the read-out used by every protocol.
    pub fn measure_reset(&mut self, qubits: &[QubitId], p: f64) -> Vec<MeasIx> {
        self.noise(Op::XError, qubits, p);
        self.measure(Op::MR, qubits)
    }

    /// Measures one Pauli product with a single result.
    pub fn measure_product(&mut self, terms: &[(Pauli, QubitId)]) -> MeasIx {
        let ix = self.current_measurement_count();
        self.append(
            Op::MPP,
            terms.iter().map(|(p, q)| Target::Pauli(*p, *q)).collect(),
            vec![],
        );
        ix
    }

    fn offset(&self, abs: MeasIx) -> Result<i64> {
        let count = self.current_measurement_count();
        if abs >= count {
            return Err(CircuitError::consistency(format!(
                "measurement {abs} referenced with only {count} results recorded"
            )));
        }
        Ok(abs as i64 - count as i64)
    }

    fn rec_targets(&self, abs: &[MeasIx]) -> Result<Vec<Target>> {
        abs.iter().map(|a| self.offset(*a).map(Target::Rec)).collect()
    }

    pub fn detector(&mut self, abs: &[MeasIx], coords: &[f64]) -> Result<()> {
        let targets = self.rec_targets(abs)?;
        self.append(Op::Detector, targets, coords.to_vec());
        Ok(())
    }

    pub fn observable_include(&mut self, abs: &[MeasIx], index: u32) -> Result<()> {
        let targets = self.rec_targets(abs)?;
        self.append(Op::ObservableInclude, targets, vec![index as f64]);
        Ok(())
    }

    /// Classically controlled Z: each pair flips `qubit` when result `abs` is 1.
    pub fn feedback_z(&mut self, pairs: &[(MeasIx, QubitId)]) -> Result<()> {
        let mut targets = Vec::with_capacity(2 * pairs.len());
        for (abs, q) in pairs {
            targets.push(Target::Rec(self.offset(*abs)?));
            targets.push(Target::Qubit(*q));
        }
        if !targets.is_empty() {
            self.append(Op::CZ, targets, vec![]);
        }
        Ok(())
    }

    /// For each qubit, appends a detector comparing its first and second
    /// measurement in the stream. A qubit measured fewer than twice means the
    /// stream is not what the caller thinks it is.
    pub fn detect_between_measurements(&mut self, qubits: &[QubitId]) -> Result<()> {
        let mut pairs = Vec::with_capacity(qubits.len());
        for q in qubits {
            let mut hits = self
                .measured
                .iter()
                .enumerate()
                .filter(|(_, m)| **m == Some(*q))
                .map(|(ix, _)| ix);
            match (hits.next(), hits.next()) {
                (Some(first), Some(second)) => pairs.push((first, second)),
                _ => {
                    return Err(CircuitError::consistency(format!(
                        "qubit {q} does not have two recorded measurements"
                    )))
                }
            }
        }
        for (first, second) in pairs {
            self.detector(&[first, second], &[])?;
        }
        Ok(())
    }

    /// Replays the stream and checks that every `rec[-k]` points inside the
    /// record that existed when it was written.
    pub fn verify_offsets(&self) -> Result<()> {
        let mut count: i64 = 0;
        for (line, ins) in self.instructions.iter().enumerate() {
            for offset in ins.recs() {
                if offset >= 0 || -offset > count {
                    return Err(CircuitError::consistency(format!(
                        "line {line}: rec[{offset}] with {count} results recorded"
                    )));
                }
            }
            count += ins.num_results() as i64;
        }
        Ok(())
    }

    pub fn measured_qubit(&self, abs: MeasIx) -> Option<QubitId> {
        self.measured.get(abs).copied().flatten()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn num_detectors(&self) -> usize {
        self.num_detectors
    }

    pub fn num_observables(&self) -> usize {
        self.num_observables
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            instructions: self.instructions.len(),
            qubits: self.num_qubits,
            measurements: self.current_measurement_count(),
            detectors: self.num_detectors,
            postselected_detectors: self
                .instructions
                .iter()
                .filter(|ins| ins.is_postselected())
                .count(),
            observables: self.num_observables,
        }
    }
}

impl Display for InstructionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for ins in self.instructions.iter() {
            writeln!(f, "{ins}")?;
        }
        Ok(())
    }
}
