use bitvec::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{CircuitError, Result};
use crate::math::pauli::Pauli;
use crate::sim::record_bit;
use crate::stream::{InstructionStream, Op, Target};

type Row = BitVec<u64, Lsb0>;

/// Phase exponent (mod 4) picked up when multiplying row `a` into row `b`,
/// counted one word at a time.
fn product_phase(ax: &Row, az: &Row, bx: &Row, bz: &Row) -> i64 {
    let mut total: i64 = 0;
    for (((x1, z1), x2), z2) in ax
        .as_raw_slice()
        .iter()
        .zip(az.as_raw_slice())
        .zip(bx.as_raw_slice())
        .zip(bz.as_raw_slice())
    {
        let plus = (x1 & z1 & z2 & !x2) | (x1 & !z1 & z2 & x2) | (!x1 & z1 & x2 & !z2);
        let minus = (x1 & z1 & x2 & !z2) | (x1 & !z1 & z2 & !x2) | (!x1 & z1 & x2 & z2);
        total += plus.count_ones() as i64 - minus.count_ones() as i64;
    }
    total
}

fn xor_into(target: &mut Row, source: &Row) {
    for (t, s) in target.as_raw_mut_slice().iter_mut().zip(source.as_raw_slice()) {
        *t ^= s;
    }
}

/// Stabilizer tableau in the CHP layout: rows `0..n` are destabilizers,
/// `n..2n` stabilizers and row `2n` is scratch space.
#[derive(Debug, Clone)]
pub struct Tableau {
    n: usize,
    xs: Vec<Row>,
    zs: Vec<Row>,
    signs: Row,
    rng: Xoshiro256PlusPlus,
}

impl Tableau {
    /// All qubits in `|0>`.
    pub fn new(n: usize, seed: u64) -> Self {
        let mut xs = vec![bitvec![u64, Lsb0; 0; n]; 2 * n + 1];
        let mut zs = vec![bitvec![u64, Lsb0; 0; n]; 2 * n + 1];
        for q in 0..n {
            xs[q].set(q, true);
            zs[n + q].set(q, true);
        }
        Tableau {
            n,
            xs,
            zs,
            signs: bitvec![u64, Lsb0; 0; 2 * n + 1],
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.n
    }

    fn rows(&self) -> usize {
        2 * self.n
    }

    /// Multiplies row `source` into row `target`.
    fn rowsum(&mut self, target: usize, source: usize) {
        let phase = 2 * self.signs[target] as i64
            + 2 * self.signs[source] as i64
            + product_phase(&self.xs[source], &self.zs[source], &self.xs[target], &self.zs[target]);
        self.signs.set(target, phase.rem_euclid(4) == 2);
        let (sx, sz) = (self.xs[source].clone(), self.zs[source].clone());
        xor_into(&mut self.xs[target], &sx);
        xor_into(&mut self.zs[target], &sz);
    }

    pub fn h(&mut self, q: usize) {
        for row in 0..self.rows() {
            let (x, z) = (self.xs[row][q], self.zs[row][q]);
            if x && z {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
            self.xs[row].set(q, z);
            self.zs[row].set(q, x);
        }
    }

    pub fn s(&mut self, q: usize) {
        for row in 0..self.rows() {
            let (x, z) = (self.xs[row][q], self.zs[row][q]);
            if x && z {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
            self.zs[row].set(q, z ^ x);
        }
    }

    pub fn s_dag(&mut self, q: usize) {
        self.z(q);
        self.s(q);
    }

    pub fn x(&mut self, q: usize) {
        for row in 0..self.rows() {
            if self.zs[row][q] {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
        }
    }

    pub fn z(&mut self, q: usize) {
        for row in 0..self.rows() {
            if self.xs[row][q] {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
        }
    }

    pub fn y(&mut self, q: usize) {
        for row in 0..self.rows() {
            if self.xs[row][q] ^ self.zs[row][q] {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
        }
    }

    pub fn cx(&mut self, control: usize, target: usize) {
        for row in 0..self.rows() {
            let (xc, zc) = (self.xs[row][control], self.zs[row][control]);
            let (xt, zt) = (self.xs[row][target], self.zs[row][target]);
            if xc && zt && (xt == zc) {
                let s = self.signs[row];
                self.signs.set(row, !s);
            }
            self.xs[row].set(target, xt ^ xc);
            self.zs[row].set(control, zc ^ zt);
        }
    }

    pub fn cz(&mut self, a: usize, b: usize) {
        self.h(b);
        self.cx(a, b);
        self.h(b);
    }

    /// Z-basis measurement. Random outcomes come from the tableau's RNG.
    pub fn measure(&mut self, q: usize) -> bool {
        let n = self.n;
        let pivot = (n..2 * n).find(|row| self.xs[*row][q]);
        match pivot {
            Some(p) => {
                for row in 0..2 * n {
                    if row != p && self.xs[row][q] {
                        self.rowsum(row, p);
                    }
                }
                self.xs[p - n] = self.xs[p].clone();
                self.zs[p - n] = self.zs[p].clone();
                let sign = self.signs[p];
                self.signs.set(p - n, sign);
                self.xs[p].fill(false);
                self.zs[p].fill(false);
                self.zs[p].set(q, true);
                let outcome = self.rng.gen_bool(0.5);
                self.signs.set(p, outcome);
                outcome
            }
            None => {
                let scratch = 2 * n;
                self.xs[scratch].fill(false);
                self.zs[scratch].fill(false);
                self.signs.set(scratch, false);
                for row in 0..n {
                    if self.xs[row][q] {
                        self.rowsum(scratch, row + n);
                    }
                }
                self.signs[scratch]
            }
        }
    }

    pub fn reset(&mut self, q: usize) {
        if self.measure(q) {
            self.x(q);
        }
    }

    /// Measures a Pauli product by rotating it onto a single Z and undoing
    /// the rotation afterwards.
    pub fn measure_product(&mut self, terms: &[(Pauli, usize)]) -> bool {
        let Some((_, first)) = terms.first().copied() else {
            return false;
        };
        for (p, q) in terms {
            match p {
                Pauli::X => self.h(*q),
                Pauli::Y => {
                    self.s_dag(*q);
                    self.h(*q);
                }
                Pauli::Z | Pauli::I => {}
            }
        }
        for (_, q) in terms.iter().skip(1) {
            self.cx(*q, first);
        }
        let outcome = self.measure(first);
        for (_, q) in terms.iter().skip(1).rev() {
            self.cx(*q, first);
        }
        for (p, q) in terms {
            match p {
                Pauli::X => self.h(*q),
                Pauli::Y => {
                    self.h(*q);
                    self.s(*q);
                }
                Pauli::Z | Pauli::I => {}
            }
        }
        outcome
    }
}

/// Measurement record and derived values of one noiseless run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSample {
    pub measurements: BitVec<u64, Lsb0>,
    pub detectors: BitVec<u64, Lsb0>,
    pub observables: BitVec<u64, Lsb0>,
}

/// Runs `stream` without noise on a stabilizer tableau. Detectors of a
/// well-formed circuit come out the same for every seed.
pub fn reference_sample(stream: &InstructionStream, seed: u64) -> Result<ReferenceSample> {
    let mut tableau = Tableau::new(stream.num_qubits(), seed);
    let mut record: BitVec<u64, Lsb0> = BitVec::new();
    let mut detectors: BitVec<u64, Lsb0> = BitVec::new();
    let mut observables = bitvec![u64, Lsb0; 0; stream.num_observables()];

    for ins in stream.instructions() {
        let qubits: Vec<usize> = ins.qubits().map(|q| q as usize).collect();
        match ins.op {
            Op::QubitCoords | Op::Tick | Op::Depolarize1 | Op::Depolarize2 | Op::XError => {}
            Op::R => qubits.iter().for_each(|q| tableau.reset(*q)),
            Op::H => qubits.iter().for_each(|q| tableau.h(*q)),
            Op::S => qubits.iter().for_each(|q| tableau.s(*q)),
            Op::SDag => qubits.iter().for_each(|q| tableau.s_dag(*q)),
            Op::X => qubits.iter().for_each(|q| tableau.x(*q)),
            Op::Y => qubits.iter().for_each(|q| tableau.y(*q)),
            Op::Z => qubits.iter().for_each(|q| tableau.z(*q)),
            Op::CX => {
                for pair in qubits.chunks(2) {
                    tableau.cx(pair[0], pair[1]);
                }
            }
            Op::CZ => {
                for pair in ins.targets.chunks(2) {
                    match (pair[0], pair[1]) {
                        (Target::Rec(offset), Target::Qubit(q)) => {
                            if record_bit(&record, offset)? {
                                tableau.z(q as usize);
                            }
                        }
                        (Target::Qubit(a), Target::Qubit(b)) => tableau.cz(a as usize, b as usize),
                        _ => {
                            return Err(CircuitError::consistency(format!(
                                "unsupported CZ targets in '{ins}'"
                            )))
                        }
                    }
                }
            }
            Op::M => {
                for q in qubits {
                    let bit = tableau.measure(q);
                    record.push(bit);
                }
            }
            Op::MR => {
                for q in qubits {
                    let bit = tableau.measure(q);
                    record.push(bit);
                    if bit {
                        tableau.x(q);
                    }
                }
            }
            Op::MPP => {
                let terms: Vec<(Pauli, usize)> = ins
                    .targets
                    .iter()
                    .filter_map(|t| match t {
                        Target::Pauli(p, q) => Some((*p, *q as usize)),
                        _ => None,
                    })
                    .collect();
                record.push(tableau.measure_product(&terms));
            }
            Op::Detector => {
                let mut parity = false;
                for offset in ins.recs() {
                    parity ^= record_bit(&record, offset)?;
                }
                detectors.push(parity);
            }
            Op::ObservableInclude => {
                let k = ins.args.first().copied().unwrap_or(0.0) as usize;
                let mut parity = observables[k];
                for offset in ins.recs() {
                    parity ^= record_bit(&record, offset)?;
                }
                observables.set(k, parity);
            }
        }
    }
    Ok(ReferenceSample {
        measurements: record,
        detectors,
        observables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bell_pair_is_correlated() {
        for seed in 0..8 {
            let mut t = Tableau::new(2, seed);
            t.h(0);
            t.cx(0, 1);
            let a = t.measure(0);
            let b = t.measure(1);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn deterministic_measurements() {
        let mut t = Tableau::new(3, 1);
        t.x(1);
        assert!(!t.measure(0));
        assert!(t.measure(1));
        t.h(2);
        t.s(2);
        t.s(2);
        t.h(2);
        // H Z H = X flips |0> to |1>
        assert!(t.measure(2));
    }

    #[test]
    fn product_measurement() {
        // |S> is the +1 eigenstate of Y
        let mut t = Tableau::new(1, 3);
        t.h(0);
        t.s(0);
        assert!(!t.measure_product(&[(Pauli::Y, 0)]));
        t.s_dag(0);
        t.h(0);
        assert!(!t.measure(0));

        let mut t = Tableau::new(2, 5);
        t.h(0);
        t.cx(0, 1);
        assert!(!t.measure_product(&[(Pauli::X, 0), (Pauli::X, 1)]));
        assert!(!t.measure_product(&[(Pauli::Z, 0), (Pauli::Z, 1)]));
        assert!(t.measure_product(&[(Pauli::Y, 0), (Pauli::Y, 1)]));
    }

    #[test]
    fn record_controlled_z() {
        let mut stream = InstructionStream::new();
        stream.gate(Op::X, &[0]);
        let m = stream.measure(Op::M, &[0]);
        stream.gate(Op::H, &[1]);
        stream.feedback_z(&[(m[0], 1)]).unwrap();
        stream.gate(Op::H, &[1]);
        let r = stream.measure(Op::M, &[1]);
        stream.detector(&[m[0], r[0]], &[]).unwrap();
        let sample = reference_sample(&stream, 0).unwrap();
        assert_eq!(sample.measurements.len(), 2);
        assert!(sample.measurements[1]);
        assert!(!sample.detectors[0]);
    }
}
