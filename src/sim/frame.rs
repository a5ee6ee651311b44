use bitvec::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{CircuitError, Result};
use crate::math::pauli::Pauli;
use crate::sim::record_bit;
use crate::stream::{InstructionStream, Op, Target};

/// Detector and observable flips of one noisy shot, relative to the
/// noiseless reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shot {
    pub detectors: BitVec<u64, Lsb0>,
    pub observables: BitVec<u64, Lsb0>,
}

impl Shot {
    /// True when a detector marked for post-selection fired.
    pub fn is_discarded(&self, postselected: &BitSlice<u64, Lsb0>) -> bool {
        self.detectors
            .iter()
            .by_vals()
            .zip(postselected.iter().by_vals())
            .any(|(d, p)| d && p)
    }
}

struct Frame {
    x: BitVec<u64, Lsb0>,
    z: BitVec<u64, Lsb0>,
}

impl Frame {
    fn new<R: Rng>(n: usize, rng: &mut R) -> Self {
        let mut z = bitvec![u64, Lsb0; 0; n];
        for q in 0..n {
            z.set(q, rng.gen_bool(0.5));
        }
        Frame {
            x: bitvec![u64, Lsb0; 0; n],
            z,
        }
    }

    fn flip_x(&mut self, q: usize) {
        let v = self.x[q];
        self.x.set(q, !v);
    }

    fn flip_z(&mut self, q: usize) {
        let v = self.z[q];
        self.z.set(q, !v);
    }

    fn apply_pauli(&mut self, k: u8, q: usize) {
        // 1 = X, 2 = Y, 3 = Z
        if k == 1 || k == 2 {
            self.flip_x(q);
        }
        if k == 2 || k == 3 {
            self.flip_z(q);
        }
    }

    fn h(&mut self, q: usize) {
        let (x, z) = (self.x[q], self.z[q]);
        self.x.set(q, z);
        self.z.set(q, x);
    }

    fn s(&mut self, q: usize) {
        if self.x[q] {
            self.flip_z(q);
        }
    }

    fn cx(&mut self, c: usize, t: usize) {
        if self.x[c] {
            self.flip_x(t);
        }
        if self.z[t] {
            self.flip_z(c);
        }
    }

    fn reset<R: Rng>(&mut self, q: usize, rng: &mut R) {
        self.x.set(q, false);
        self.z.set(q, rng.gen_bool(0.5));
    }

    /// Flip of a Z measurement. The conjugate component is re-randomized
    /// since the measurement fixes it only up to the unseen outcome.
    fn measure<R: Rng>(&mut self, q: usize, rng: &mut R) -> bool {
        let flip = self.x[q];
        if rng.gen_bool(0.5) {
            self.flip_z(q);
        }
        flip
    }
}

/// Pauli-frame sampler over a finished stream.
pub struct FrameSampler<'a> {
    stream: &'a InstructionStream,
    postselected: BitVec<u64, Lsb0>,
}

impl<'a> FrameSampler<'a> {
    pub fn new(stream: &'a InstructionStream) -> Self {
        let postselected = stream
            .instructions()
            .iter()
            .filter(|ins| ins.op == Op::Detector)
            .map(|ins| ins.is_postselected())
            .collect();
        FrameSampler {
            stream,
            postselected,
        }
    }

    /// One bit per detector, set when that detector is post-selected.
    pub fn postselection_mask(&self) -> &BitSlice<u64, Lsb0> {
        &self.postselected
    }

    pub fn num_detectors(&self) -> usize {
        self.postselected.len()
    }

    pub fn sample_shot<R: Rng>(&self, rng: &mut R) -> Result<Shot> {
        let n = self.stream.num_qubits();
        let mut frame = Frame::new(n, rng);
        let mut flips: BitVec<u64, Lsb0> = BitVec::with_capacity(self.stream.current_measurement_count());
        let mut detectors: BitVec<u64, Lsb0> = BitVec::with_capacity(self.num_detectors());
        let mut observables = bitvec![u64, Lsb0; 0; self.stream.num_observables()];

        for ins in self.stream.instructions() {
            let qubits: Vec<usize> = ins.qubits().map(|q| q as usize).collect();
            let p = ins.args.first().copied().unwrap_or(0.0).clamp(0.0, 1.0);
            match ins.op {
                Op::QubitCoords | Op::Tick | Op::X | Op::Y | Op::Z => {}
                Op::R => qubits.iter().for_each(|q| frame.reset(*q, rng)),
                Op::H => qubits.iter().for_each(|q| frame.h(*q)),
                Op::S | Op::SDag => qubits.iter().for_each(|q| frame.s(*q)),
                Op::CX => {
                    for pair in qubits.chunks(2) {
                        frame.cx(pair[0], pair[1]);
                    }
                }
                Op::CZ => {
                    for pair in ins.targets.chunks(2) {
                        match (pair[0], pair[1]) {
                            (Target::Rec(offset), Target::Qubit(q)) => {
                                if record_bit(&flips, offset)? {
                                    frame.flip_z(q as usize);
                                }
                            }
                            (Target::Qubit(a), Target::Qubit(b)) => {
                                let (a, b) = (a as usize, b as usize);
                                if frame.x[b] {
                                    frame.flip_z(a);
                                }
                                if frame.x[a] {
                                    frame.flip_z(b);
                                }
                            }
                            _ => {
                                return Err(CircuitError::consistency(format!(
                                    "unsupported CZ targets in '{ins}'"
                                )))
                            }
                        }
                    }
                }
                Op::Depolarize1 => {
                    for q in qubits {
                        if rng.gen_bool(p) {
                            let k = rng.gen_range(1..4u8);
                            frame.apply_pauli(k, q);
                        }
                    }
                }
                Op::Depolarize2 => {
                    for pair in qubits.chunks(2) {
                        if rng.gen_bool(p) {
                            let k = rng.gen_range(1..16u8);
                            frame.apply_pauli(k & 3, pair[0]);
                            frame.apply_pauli(k >> 2, pair[1]);
                        }
                    }
                }
                Op::XError => {
                    for q in qubits {
                        if rng.gen_bool(p) {
                            frame.flip_x(q);
                        }
                    }
                }
                Op::M => {
                    for q in qubits {
                        let flip = frame.measure(q, rng);
                        flips.push(flip);
                    }
                }
                Op::MR => {
                    for q in qubits {
                        flips.push(frame.x[q]);
                        frame.reset(q, rng);
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
                    flips.push(measure_product(&mut frame, &terms, rng));
                }
                Op::Detector => {
                    let mut parity = false;
                    for offset in ins.recs() {
                        parity ^= record_bit(&flips, offset)?;
                    }
                    detectors.push(parity);
                }
                Op::ObservableInclude => {
                    let k = ins.args.first().copied().unwrap_or(0.0) as usize;
                    let mut parity = observables[k];
                    for offset in ins.recs() {
                        parity ^= record_bit(&flips, offset)?;
                    }
                    observables.set(k, parity);
                }
            }
        }
        Ok(Shot {
            detectors,
            observables,
        })
    }

    /// `shots` independent shots from one seeded generator.
    pub fn sample(&self, shots: usize, seed: u64) -> Result<Vec<Shot>> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        (0..shots).map(|_| self.sample_shot(&mut rng)).collect()
    }
}

fn measure_product<R: Rng>(frame: &mut Frame, terms: &[(Pauli, usize)], rng: &mut R) -> bool {
    let Some((_, first)) = terms.first().copied() else {
        return false;
    };
    for (p, q) in terms {
        match p {
            Pauli::X => frame.h(*q),
            Pauli::Y => {
                frame.s(*q);
                frame.h(*q);
            }
            Pauli::Z | Pauli::I => {}
        }
    }
    for (_, q) in terms.iter().skip(1) {
        frame.cx(*q, first);
    }
    let flip = frame.measure(first, rng);
    for (_, q) in terms.iter().skip(1).rev() {
        frame.cx(*q, first);
    }
    for (p, q) in terms {
        match p {
            Pauli::X => frame.h(*q),
            Pauli::Y => {
                frame.h(*q);
                frame.s(*q);
            }
            Pauli::Z | Pauli::I => {}
        }
    }
    flip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_stream_never_flips() {
        let mut stream = InstructionStream::new();
        stream.gate(Op::H, &[0]);
        stream.gate_pairs(Op::CX, &[(0, 1)]);
        // both products are fixed on the Bell pair, the single reads only agree
        let xx = stream.measure_product(&[(Pauli::X, 0), (Pauli::X, 1)]);
        stream.detector(&[xx], &[]).unwrap();
        let zz = stream.measure_product(&[(Pauli::Z, 0), (Pauli::Z, 1)]);
        stream.detector(&[zz], &[]).unwrap();
        let a = stream.measure(Op::M, &[0, 1]);
        stream.detector(&a, &[0.0, 0.0, 0.0, 1.0]).unwrap();
        let sampler = FrameSampler::new(&stream);
        for shot in sampler.sample(64, 7).unwrap() {
            assert!(!shot.detectors.any());
            assert!(!shot.is_discarded(sampler.postselection_mask()));
        }
    }

    #[test]
    fn certain_flip_is_seen() {
        let mut stream = InstructionStream::new();
        stream.noise(Op::XError, &[0], 1.0);
        let m = stream.measure(Op::MR, &[0]);
        stream.detector(&m, &[0.0, 0.0, 0.0, 1.0]).unwrap();
        stream.observable_include(&m, 0).unwrap();
        let sampler = FrameSampler::new(&stream);
        let shots = sampler.sample(8, 1).unwrap();
        assert!(shots.iter().all(|s| s.detectors[0] && s.observables[0]));
        assert!(shots[0].is_discarded(sampler.postselection_mask()));
    }

    #[test]
    fn discard_follows_the_mask() {
        // a certain flip on the first detector, only the second is post-selected
        let mut stream = InstructionStream::new();
        stream.noise(Op::XError, &[0], 1.0);
        let m = stream.measure(Op::MR, &[0, 1]);
        stream.detector(&[m[0]], &[0.0, 0.0, 0.0]).unwrap();
        stream.detector(&[m[1]], &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let sampler = FrameSampler::new(&stream);
        let mask = sampler.postselection_mask();
        assert_eq!(mask.len(), 2);
        assert!(!mask[0] && mask[1]);
        for shot in sampler.sample(8, 5).unwrap() {
            assert!(shot.detectors[0] && !shot.detectors[1]);
            assert!(!shot.is_discarded(mask));
            assert!(shot.is_discarded(&shot.detectors));
        }
    }

    #[test]
    fn reset_clears_errors() {
        let mut stream = InstructionStream::new();
        stream.noise(Op::XError, &[0], 1.0);
        stream.gate(Op::R, &[0]);
        let m = stream.measure(Op::M, &[0]);
        stream.detector(&m, &[]).unwrap();
        let sampler = FrameSampler::new(&stream);
        assert!(sampler.sample(8, 2).unwrap().iter().all(|s| !s.detectors[0]));
    }
}
