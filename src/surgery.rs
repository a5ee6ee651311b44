use fxhash::FxHashMap;

use crate::check_catalog::{Check, CheckType};
use crate::error::{CircuitError, Result};
use crate::position_index::{Position, QubitId};
use crate::qrm::QrmCode;
use crate::stream::{InstructionStream, MeasIx, Op};
use crate::surface_code::{DetectorTag, RoundOptions, SurfaceCode};

/// Read access to a patch. Everything the surgery needs to know about the
/// surface code goes through here.
pub trait LatticeView {
    fn list_active_checks(&self) -> &[Check];
    fn identity_of(&self, position: &Position) -> Option<QubitId>;
    fn last_measurement(&self, check: QubitId) -> Option<MeasIx>;
}

/// QRM Z checks merged into the surgery, with their legs in CX order.
const FACE_CHECKS: [(usize, [u32; 4]); 3] = [(0, [1, 5, 3, 7]), (1, [2, 3, 7, 6]), (10, [7, 6, 4, 5])];

/// The X check of the patch whose value is split between the two codes while
/// they are joined.
const SPLIT_CHECK: Position = Position::new(-1, 1);

#[derive(Debug, Clone, PartialEq)]
struct JointCheck {
    coords: [f64; 2],
    id: QubitId,
    legs: [Option<QubitId>; 4],
}

#[derive(Debug, Clone, PartialEq)]
struct Flag {
    coords: [f64; 2],
    id: QubitId,
    ancilla: QubitId,
}

/// Joins a QRM code to the left boundary of a surface-code patch by
/// measuring two linking Z checks, reads the joint logical out into
/// observable 0 and then splits the codes again.
#[derive(Debug, Clone)]
pub struct SurgeryUnit {
    faces: Vec<JointCheck>,
    links: Vec<JointCheck>,
    flags: Vec<Flag>,
    split_check: QubitId,
    error_rate: f64,
    last: FxHashMap<QubitId, MeasIx>,
}

fn data_of(patch: &impl LatticeView, x: i32, y: i32) -> Result<QubitId> {
    let pos = Position::new(x, y);
    patch
        .identity_of(&pos)
        .ok_or_else(|| CircuitError::consistency(format!("patch has no data qubit at {pos}")))
}

impl SurgeryUnit {
    /// Linking ancillas get identities `base` and `base + 1`.
    pub fn attach(qrm: &QrmCode, patch: &impl LatticeView, base: QubitId) -> Result<Self> {
        let links = vec![
            JointCheck {
                coords: [-1.0, -1.0],
                id: base,
                legs: [None, None, Some(qrm.data(1)), Some(data_of(patch, 0, 0)?)],
            },
            JointCheck {
                coords: [-1.0, 3.0],
                id: base + 1,
                legs: [
                    Some(qrm.data(3)),
                    Some(data_of(patch, 0, 2)?),
                    Some(qrm.data(2)),
                    Some(data_of(patch, 0, 4)?),
                ],
            },
        ];
        let faces = FACE_CHECKS
            .iter()
            .map(|(j, legs)| JointCheck {
                coords: qrm.ancilla_position(*j),
                id: qrm.ancilla(*j),
                legs: (*legs).map(|q| Some(qrm.data(q))),
            })
            .collect();
        let flags = FACE_CHECKS
            .iter()
            .map(|(j, _)| Flag {
                coords: qrm.flag_position(*j),
                id: qrm.flag(*j),
                ancilla: qrm.ancilla(*j),
            })
            .collect();
        let split_check = patch
            .list_active_checks()
            .iter()
            .find(|c| c.position == SPLIT_CHECK && c.kind == CheckType::X)
            .map(|c| c.id)
            .ok_or_else(|| {
                CircuitError::consistency(format!("patch has no X check at {SPLIT_CHECK}"))
            })?;
        Ok(SurgeryUnit {
            faces,
            links,
            flags,
            split_check,
            error_rate: qrm.error_rate(),
            last: FxHashMap::default(),
        })
    }

    pub fn link_ids(&self) -> Vec<QubitId> {
        self.links.iter().map(|c| c.id).collect()
    }

    fn joint_checks(&self) -> impl Iterator<Item = &JointCheck> {
        self.faces.iter().chain(self.links.iter())
    }

    fn flag_ids(&self) -> Vec<QubitId> {
        self.flags.iter().map(|f| f.id).collect()
    }

    fn flag_cx(&self, stream: &mut InstructionStream) {
        let pairs: Vec<(QubitId, QubitId)> = self.flags.iter().map(|f| (f.id, f.ancilla)).collect();
        stream.gate_pairs(Op::CX, &pairs);
        stream.noise_pairs(&pairs, self.error_rate);
        stream.tick();
    }

    fn flag_h(&self, stream: &mut InstructionStream) {
        let flags = self.flag_ids();
        stream.gate(Op::H, &flags);
        stream.noise(Op::Depolarize1, &flags, self.error_rate);
        stream.tick();
    }

    /// `rounds` rounds of the joint Z checks, each followed by a Z-only round
    /// on the patch. The first round compares the QRM faces with their values
    /// from the preparation.
    pub fn lattice_surgery(
        &mut self,
        stream: &mut InstructionStream,
        qrm: &mut QrmCode,
        patch: &mut SurfaceCode,
        rounds: usize,
        t0: usize,
    ) -> Result<()> {
        if rounds == 0 {
            return Err(CircuitError::config("lattice surgery needs at least one round"));
        }
        let p = self.error_rate;
        for link in self.links.iter() {
            stream.qubit_coords(link.id, &link.coords);
        }
        stream.gate(Op::R, &self.link_ids());

        for r in 0..rounds {
            let t = t0 + r;
            self.flag_h(stream);
            self.flag_cx(stream);
            for layer in 0..4 {
                let pairs: Vec<(QubitId, QubitId)> = self
                    .joint_checks()
                    .filter_map(|c| c.legs[layer].map(|d| (d, c.id)))
                    .collect();
                stream.gate_pairs(Op::CX, &pairs);
                stream.noise_pairs(&pairs, p);
                stream.tick();
            }
            self.flag_cx(stream);
            self.flag_h(stream);

            let checks: Vec<QubitId> = self.joint_checks().map(|c| c.id).collect();
            let check_results = stream.measure_reset(&checks, p);
            let flags = self.flag_ids();
            let flag_results = stream.measure_reset(&flags, p);
            stream.tick();

            for (check, current) in self.joint_checks().zip(check_results.iter()) {
                let previous = if r == 0 {
                    qrm.last_measurement(check.id)
                } else {
                    self.last.get(&check.id).copied()
                };
                if let Some(prev) = previous {
                    let [x, y] = check.coords;
                    stream.detector(&[*current, prev], &[x, y, t as f64, 1.0])?;
                }
            }
            for (flag, ix) in self.flags.iter().zip(flag_results.iter()) {
                let [x, y] = flag.coords;
                stream.detector(&[*ix], &[x, y, t as f64, 1.0])?;
            }
            for (q, ix) in checks.iter().zip(check_results.iter()) {
                self.last.insert(*q, *ix);
            }
            for (face, ix) in self.faces.iter().zip(check_results.iter()) {
                qrm.record(face.id, *ix);
            }
            for (q, ix) in flags.iter().zip(flag_results) {
                qrm.record(*q, ix);
            }

            patch.z_syndrome_cycle(stream, t, DetectorTag::Surgery)?;
        }

        let joint: Vec<MeasIx> = self
            .links
            .iter()
            .filter_map(|c| self.last.get(&c.id).copied())
            .collect();
        log::debug!("lattice surgery ran {rounds} rounds");
        stream.observable_include(&joint, 0)
    }

    /// One round on the patch with the X boundary restored, then the QRM X
    /// read-out. The split check is compared through the QRM read-out rather
    /// than on its own.
    pub fn decouple_after_surgery(
        &self,
        stream: &mut InstructionStream,
        qrm: &mut QrmCode,
        patch: &mut SurfaceCode,
        t: usize,
    ) -> Result<()> {
        let missing = || {
            CircuitError::consistency(format!("check at {SPLIT_CHECK} has no measurement"))
        };
        let before = patch.last_measurement(self.split_check).ok_or_else(missing)?;
        let opts = RoundOptions {
            tag: DetectorTag::Surgery,
            noiseless: false,
        };
        patch.syndrome_cycle_except(stream, t, opts, &[SPLIT_CHECK])?;
        let after = patch.last_measurement(self.split_check).ok_or_else(missing)?;
        qrm.x_measurement(stream, &[after, before])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (InstructionStream, QrmCode, SurfaceCode) {
        let mut stream = InstructionStream::new();
        let mut qrm = QrmCode::new(0.001, -10, 0).unwrap();
        qrm.prepare_s_state(&mut stream).unwrap();
        let mut patch = SurfaceCode::new(3, 3, 0.001, qrm.next_free_id() + 2).unwrap();
        patch
            .initialize_cycle(&mut stream, CheckType::X, DetectorTag::PostSelected)
            .unwrap();
        (stream, qrm, patch)
    }

    #[test]
    fn attach_wires_linking_checks() {
        let (_, qrm, patch) = setup();
        let unit = SurgeryUnit::attach(&qrm, &patch, qrm.next_free_id()).unwrap();
        assert_eq!(unit.link_ids(), vec![52, 53]);
        assert_eq!(unit.links[0].legs, [None, None, Some(1), Some(54)]);
        assert_eq!(unit.links[1].legs, [Some(3), Some(55), Some(2), Some(56)]);
        assert_eq!(unit.faces[2].id, 26);
        assert_eq!(unit.flags[2].id, 44);
        assert_eq!(unit.split_check, 63);
    }

    #[test]
    fn zero_rounds_is_rejected() {
        let (mut stream, mut qrm, mut patch) = setup();
        let mut unit = SurgeryUnit::attach(&qrm, &patch, qrm.next_free_id()).unwrap();
        let err = unit
            .lattice_surgery(&mut stream, &mut qrm, &mut patch, 0, 1)
            .unwrap_err();
        assert!(matches!(err, CircuitError::Configuration(_)));
    }

    #[test]
    fn rounds_and_decouple() {
        let (mut stream, mut qrm, mut patch) = setup();
        let mut unit = SurgeryUnit::attach(&qrm, &patch, qrm.next_free_id()).unwrap();
        let start_meas = stream.current_measurement_count();
        let start_det = stream.num_detectors();
        unit.lattice_surgery(&mut stream, &mut qrm, &mut patch, 3, 1)
            .unwrap();
        // 5 joint checks, 3 flags and 4 patch Z checks per round
        assert_eq!(stream.current_measurement_count() - start_meas, 3 * 12);
        let first = 3 + 3 + 4;
        let later = 5 + 3 + 4;
        assert_eq!(stream.num_detectors() - start_det, first + 2 * later);
        assert_eq!(stream.num_observables(), 1);

        let before = stream.num_detectors();
        unit.decouple_after_surgery(&mut stream, &mut qrm, &mut patch, 4)
            .unwrap();
        assert_eq!(stream.num_detectors() - before, 7 + 4);
        stream.verify_offsets().unwrap();
    }
}
