use fxhash::FxHashMap;

use crate::error::{CircuitError, Result};
use crate::math::gf2::Gf2Matrix;
use crate::position_index::QubitId;
use crate::stream::{InstructionStream, MeasIx, Op};

pub const NUM_DATA: usize = 15;
pub const NUM_Z_CHECKS: usize = 18;
/// Qubits used above the base. Local index 0 is left empty.
pub const TOTAL_QUBITS: u32 = 51;

/// Four weight-8 X checks, 1-based data indices.
pub const X_CHECKS: [[u32; 8]; 4] = [
    [1, 3, 5, 7, 9, 11, 13, 15],
    [2, 3, 6, 7, 10, 11, 14, 15],
    [4, 5, 6, 7, 12, 13, 14, 15],
    [8, 9, 10, 11, 12, 13, 14, 15],
];

/// Z checks as six CX layers each, 0 for an idle layer. The first ten are
/// independent, the rest are products of them used by the meta-checks.
pub const Z_CHECKS: [[u32; 6]; NUM_Z_CHECKS] = [
    [1, 3, 5, 7, 0, 0],
    [3, 2, 7, 6, 0, 0],
    [2, 6, 14, 10, 0, 0],
    [6, 14, 12, 4, 0, 0],
    [13, 12, 4, 5, 0, 0],
    [12, 8, 0, 13, 9, 0],
    [8, 9, 10, 11, 0, 0],
    [9, 1, 11, 3, 0, 0],
    [5, 7, 13, 15, 0, 0],
    [10, 11, 15, 14, 0, 0],
    [4, 5, 0, 0, 7, 6],
    [14, 0, 8, 0, 10, 12],
    [0, 0, 9, 1, 5, 13],
    [0, 10, 2, 0, 11, 3],
    [0, 15, 6, 0, 14, 7],
    [15, 13, 0, 0, 12, 14],
    [7, 0, 3, 0, 15, 11],
    [11, 0, 0, 9, 13, 15],
];

/// Groups of four Z checks (1-based) whose product is the identity.
pub const META_CHECKS: [[usize; 4]; 8] = [
    [1, 18, 8, 9],
    [1, 18, 13, 17],
    [2, 10, 14, 15],
    [2, 10, 3, 17],
    [5, 15, 4, 9],
    [5, 15, 11, 16],
    [7, 16, 6, 10],
    [7, 16, 12, 18],
];

/// Data columns whose sub-matrix of the first ten Z checks is inverted to
/// build the feedback.
const FEEDBACK_COLUMNS: [usize; 10] = [1, 2, 4, 8, 3, 5, 6, 9, 10, 12];

fn bit(n: u32, i: u32) -> i32 {
    ((n >> i) & 1) as i32
}

/// Maps each of the first ten Z-syndrome bits to a Z correction on the data.
///
/// Rows are data qubits, columns syndrome bits. Columns acting an odd number
/// of times on qubits 1 to 3 get the logical X support (qubits 1 to 7) added
/// so that every correction leaves the logical frame alone.
pub fn feedback_matrix() -> Result<Gf2Matrix> {
    let supports: Vec<Vec<usize>> = Z_CHECKS[..10]
        .iter()
        .map(|row| row.iter().filter(|q| **q != 0).map(|q| *q as usize - 1).collect())
        .collect();
    let h = Gf2Matrix::from_supports(NUM_DATA, &supports);
    let sub: Vec<usize> = FEEDBACK_COLUMNS.iter().map(|c| c - 1).collect();
    let c_sub = h
        .select_columns(&sub)
        .inverse()
        .ok_or_else(|| CircuitError::config("feedback sub-matrix is singular"))?;

    let mut full = Gf2Matrix::zero(NUM_DATA, 10);
    for (sub_row, qubit) in sub.iter().enumerate() {
        for col in 0..10 {
            full.set(*qubit, col, c_sub.get(sub_row, col));
        }
    }
    for col in 0..10 {
        let overlap = (0..3).filter(|row| full.get(*row, col)).count();
        if overlap % 2 == 1 {
            for row in 0..7 {
                full.flip(row, col);
            }
        }
    }
    if h.mul(&full)? != Gf2Matrix::id(10) {
        return Err(CircuitError::config(
            "feedback does not reproduce the syndrome it corrects",
        ));
    }
    log::trace!("QRM feedback matrix:\n{full}");
    Ok(full)
}

/// The [[15, 1, 3]] quantum Reed-Muller code, prepared in the S state with a
/// single flagged round of Z checks and transversal `S_DAG`.
#[derive(Debug, Clone)]
pub struct QrmCode {
    base: QubitId,
    shift: i32,
    error_rate: f64,
    feedback: Gf2Matrix,
    last: FxHashMap<QubitId, MeasIx>,
    prep_syndrome: Vec<MeasIx>,
}

impl QrmCode {
    pub fn new(error_rate: f64, shift: i32, base: QubitId) -> Result<Self> {
        if !(0.0..=1.0).contains(&error_rate) {
            return Err(CircuitError::config(format!(
                "error rate {error_rate} is not a probability"
            )));
        }
        Ok(QrmCode {
            base,
            shift,
            error_rate,
            feedback: feedback_matrix()?,
            last: FxHashMap::default(),
            prep_syndrome: Vec::new(),
        })
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    pub fn shift(&self) -> i32 {
        self.shift
    }

    pub fn feedback(&self) -> &Gf2Matrix {
        &self.feedback
    }

    /// First identity not used by the code.
    pub fn next_free_id(&self) -> QubitId {
        self.base + TOTAL_QUBITS + 1
    }

    /// Data qubit `i`, 1-based.
    pub fn data(&self, i: u32) -> QubitId {
        self.base + i
    }

    pub fn data_qubits(&self) -> Vec<QubitId> {
        (1..=NUM_DATA as u32).map(|i| self.data(i)).collect()
    }

    /// Ancilla of Z check `j`, 0-based.
    pub fn ancilla(&self, j: usize) -> QubitId {
        self.base + 16 + j as u32
    }

    pub fn flag(&self, j: usize) -> QubitId {
        self.base + 34 + j as u32
    }

    pub fn data_position(&self, i: u32) -> [f64; 2] {
        [
            (self.shift + bit(i, 0) + 2 * bit(i, 2)) as f64,
            (bit(i, 1) + 2 * bit(i, 3)) as f64,
        ]
    }

    pub fn ancilla_position(&self, j: usize) -> [f64; 2] {
        [(self.shift + (j % 6) as i32) as f64, (5 + j / 6) as f64]
    }

    pub fn flag_position(&self, j: usize) -> [f64; 2] {
        [(self.shift + (j % 6) as i32) as f64, (8 + j / 6) as f64]
    }

    pub fn last_measurement(&self, qubit: QubitId) -> Option<MeasIx> {
        self.last.get(&qubit).copied()
    }

    pub(crate) fn record(&mut self, qubit: QubitId, ix: MeasIx) {
        self.last.insert(qubit, ix);
    }

    fn all_ancillas(&self) -> Vec<QubitId> {
        (0..NUM_Z_CHECKS).map(|j| self.ancilla(j)).collect()
    }

    fn all_flags(&self) -> Vec<QubitId> {
        (0..NUM_Z_CHECKS).map(|j| self.flag(j)).collect()
    }

    fn flag_layer(&self, stream: &mut InstructionStream) {
        let pairs: Vec<(QubitId, QubitId)> = (0..NUM_Z_CHECKS)
            .map(|j| (self.flag(j), self.ancilla(j)))
            .collect();
        stream.gate_pairs(Op::CX, &pairs);
        stream.noise_pairs(&pairs, self.error_rate);
        stream.tick();
    }

    pub fn prepare_s_state(&mut self, stream: &mut InstructionStream) -> Result<()> {
        let p = self.error_rate;
        for i in 1..=NUM_DATA as u32 {
            stream.qubit_coords(self.data(i), &self.data_position(i));
        }
        for j in 0..NUM_Z_CHECKS {
            stream.qubit_coords(self.ancilla(j), &self.ancilla_position(j));
        }
        for j in 0..NUM_Z_CHECKS {
            stream.qubit_coords(self.flag(j), &self.flag_position(j));
        }

        let data = self.data_qubits();
        let ancillas = self.all_ancillas();
        let flags = self.all_flags();
        let everything: Vec<QubitId> = (1..=TOTAL_QUBITS).map(|q| self.base + q).collect();
        let mut hadamards = data.clone();
        hadamards.extend(flags.iter().copied());
        stream.gate(Op::H, &hadamards);
        stream.noise(Op::Depolarize1, &everything, p);
        stream.tick();

        self.flag_layer(stream);
        for layer in 0..6 {
            let pairs: Vec<(QubitId, QubitId)> = Z_CHECKS
                .iter()
                .enumerate()
                .filter(|(_, row)| row[layer] != 0)
                .map(|(j, row)| (self.data(row[layer]), self.ancilla(j)))
                .collect();
            stream.gate_pairs(Op::CX, &pairs);
            stream.noise_pairs(&pairs, p);
            stream.tick();
        }
        self.flag_layer(stream);
        stream.gate(Op::H, &flags);
        stream.noise(Op::Depolarize1, &flags, p);
        stream.tick();

        let mut measured = ancillas.clone();
        measured.extend(flags.iter().copied());
        let results = stream.measure_reset(&measured, p);
        for (q, ix) in measured.iter().zip(results.iter()) {
            self.record(*q, *ix);
        }
        let (syndrome, flag_results) = results.split_at(NUM_Z_CHECKS);
        self.prep_syndrome = syndrome.to_vec();

        let shift = self.shift as f64;
        for (k, meta) in META_CHECKS.iter().enumerate() {
            let targets: Vec<MeasIx> = meta.iter().map(|c| syndrome[c - 1]).collect();
            stream.detector(&targets, &[shift + k as f64, 0.0, 0.0, 1.0])?;
        }
        for (j, ix) in flag_results.iter().enumerate() {
            let coords = [shift + (j / 4) as f64, (j % 4) as f64, 1.0, 1.0];
            stream.detector(&[*ix], &coords)?;
        }
        stream.tick();

        stream.gate(Op::SDag, &data);
        let mut corrections = Vec::new();
        for i in 0..NUM_DATA {
            for j in 0..10 {
                if self.feedback.get(i, j) {
                    corrections.push((syndrome[j], self.data(i as u32 + 1)));
                }
            }
        }
        stream.feedback_z(&corrections)?;
        stream.noise(Op::Depolarize1, &data, p);
        stream.tick();
        log::trace!(
            "QRM S state prepared with {} feedback terms",
            corrections.len()
        );
        Ok(())
    }

    fn readout(&self, stream: &mut InstructionStream) -> Vec<MeasIx> {
        let data = self.data_qubits();
        stream.noise(Op::Depolarize1, &data, self.error_rate);
        stream.tick();
        let results = stream.measure_reset(&data, self.error_rate);
        stream.tick();
        results
    }

    /// Transversal X read-out. The first X check also folds in `ext`, for
    /// when part of its value was moved elsewhere by a lattice surgery.
    pub fn x_measurement(&mut self, stream: &mut InstructionStream, ext: &[MeasIx]) -> Result<()> {
        stream.gate(Op::H, &self.data_qubits());
        let results = self.readout(stream);
        let shift = self.shift as f64;
        for (k, check) in X_CHECKS.iter().enumerate() {
            let mut targets: Vec<MeasIx> = check.iter().map(|q| results[*q as usize - 1]).collect();
            if k == 0 {
                targets.extend_from_slice(ext);
            }
            stream.detector(&targets, &[shift + k as f64, 0.0, 2.0, 1.0])?;
        }
        stream.observable_include(&results, 0)
    }

    /// Syndrome bits whose feedback hits `qubits` an odd number of times.
    fn feedback_parity(&self, qubits: impl Iterator<Item = u32> + Clone) -> Vec<MeasIx> {
        (0..10)
            .filter(|j| {
                qubits
                    .clone()
                    .filter(|q| self.feedback.get(*q as usize - 1, *j))
                    .count()
                    % 2
                    == 1
            })
            .filter_map(|j| self.prep_syndrome.get(j).copied())
            .collect()
    }

    /// Transversal Y read-out. Each Z correction applied by the preparation
    /// flips the Y outcome of its qubit, so the syndrome bits that drove them
    /// are folded back into the detectors and the observable.
    pub fn y_measurement(&mut self, stream: &mut InstructionStream) -> Result<()> {
        if self.prep_syndrome.is_empty() {
            return Err(CircuitError::consistency(
                "Y read-out of a QRM code that was never prepared",
            ));
        }
        let data = self.data_qubits();
        stream.gate(Op::SDag, &data);
        stream.gate(Op::H, &data);
        let results = self.readout(stream);
        let shift = self.shift as f64;
        for (k, check) in X_CHECKS.iter().enumerate() {
            let mut targets: Vec<MeasIx> = check.iter().map(|q| results[*q as usize - 1]).collect();
            targets.extend(self.feedback_parity(check.iter().copied()));
            stream.detector(&targets, &[shift + k as f64, 0.0, 2.0, 1.0])?;
        }
        let mut logical = results.clone();
        logical.extend(self.feedback_parity(1..=NUM_DATA as u32));
        stream.observable_include(&logical, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z_support(j: usize) -> Vec<usize> {
        Z_CHECKS[j]
            .iter()
            .filter(|q| **q != 0)
            .map(|q| *q as usize - 1)
            .collect()
    }

    #[test]
    fn feedback_inverts_syndrome() {
        let fb = feedback_matrix().unwrap();
        let supports: Vec<Vec<usize>> = (0..10).map(z_support).collect();
        let h = Gf2Matrix::from_supports(NUM_DATA, &supports);
        assert_eq!(h.mul(&fb).unwrap(), Gf2Matrix::id(10));
        for col in 0..10 {
            let overlap = (0..3).filter(|row| fb.get(*row, col)).count();
            assert_eq!(overlap % 2, 0);
        }
    }

    #[test]
    fn meta_checks_multiply_to_identity() {
        for meta in META_CHECKS {
            let mut acc = Gf2Matrix::zero(1, NUM_DATA);
            for c in meta {
                for q in z_support(c - 1) {
                    acc.flip(0, q);
                }
            }
            assert!(!acc.get_row(0).any(), "meta check {meta:?}");
        }
    }

    #[test]
    fn x_checks_commute_with_z_checks() {
        for x in X_CHECKS {
            for j in 0..NUM_Z_CHECKS {
                let overlap = z_support(j)
                    .iter()
                    .filter(|q| x.contains(&(**q as u32 + 1)))
                    .count();
                assert_eq!(overlap % 2, 0, "X check {x:?} and Z check {j}");
            }
        }
    }

    #[test]
    fn layout() {
        let code = QrmCode::new(0.001, -10, 0).unwrap();
        assert_eq!(code.next_free_id(), 52);
        assert_eq!(code.ancilla(0), 16);
        assert_eq!(code.flag(17), 51);
        assert_eq!(code.data_position(7), [-7.0, 1.0]);
        assert_eq!(code.data_position(15), [-7.0, 3.0]);
        assert_eq!(code.ancilla_position(10), [-6.0, 6.0]);
        assert_eq!(code.flag_position(0), [-10.0, 8.0]);
    }

    #[test]
    fn preparation_shape() {
        let mut code = QrmCode::new(0.001, -10, 0).unwrap();
        let mut stream = InstructionStream::new();
        code.prepare_s_state(&mut stream).unwrap();
        assert_eq!(stream.current_measurement_count(), 36);
        assert_eq!(stream.num_detectors(), 8 + 18);
        assert_eq!(stream.summary().postselected_detectors, 26);
        assert_eq!(code.last_measurement(code.ancilla(3)), Some(3));
        let cz = stream
            .instructions()
            .iter()
            .find(|i| i.op == Op::CZ)
            .unwrap();
        assert!(cz.recs().all(|r| (-36..-26).contains(&r)));
        stream.verify_offsets().unwrap();
    }

    #[test]
    fn y_readout_needs_preparation() {
        let mut code = QrmCode::new(0.0, 0, 0).unwrap();
        let mut stream = InstructionStream::new();
        assert!(matches!(
            code.y_measurement(&mut stream),
            Err(CircuitError::Consistency(_))
        ));
    }

    #[test]
    fn x_readout_folds_external_results() {
        let mut code = QrmCode::new(0.0, 0, 0).unwrap();
        let mut stream = InstructionStream::new();
        code.prepare_s_state(&mut stream).unwrap();
        let ext = stream.measure(Op::MR, &[60, 61]);
        code.x_measurement(&mut stream, &ext).unwrap();
        let first = stream
            .instructions()
            .iter()
            .filter(|i| i.op == Op::Detector)
            .nth(26)
            .unwrap();
        assert_eq!(first.targets.len(), 10);
        assert_eq!(stream.num_observables(), 1);
    }
}
