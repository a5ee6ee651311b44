use fxhash::FxHashSet;

use crate::check_catalog::CheckType;
use crate::error::{CircuitError, Result};
use crate::position_index::{Position, QubitId};
use crate::stream::{InstructionStream, MeasIx, Op};
use crate::surface_code::{LatticeState, RoundOptions, SurfaceCode};

/// What happens to a check of the grown lattice in the first round after
/// growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckFate {
    /// Measured before at the same position. Compared with its last value.
    Continued,
    /// New, and every data qubit it touches was just prepared in an
    /// eigenstate of the check. Its first value is already deterministic.
    BornDeterministic,
    /// New and touching old data or data prepared in the other basis.
    BornRandom,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrowthReport {
    /// One entry per check of the new catalog, in catalog order.
    pub fates: Vec<(Position, CheckFate)>,
    /// Old check positions missing from the new catalog.
    pub discarded: Vec<Position>,
    pub new_data: Vec<QubitId>,
    /// The subset of `new_data` that enters in `|+>`. The rest enter in `|0>`.
    pub plus_data: Vec<QubitId>,
    pub new_ancillas: Vec<QubitId>,
}

impl GrowthReport {
    pub fn fate_of(&self, position: &Position) -> Option<CheckFate> {
        self.fates
            .iter()
            .find(|(pos, _)| pos == position)
            .map(|(_, fate)| *fate)
    }

    pub fn with_fate(&self, fate: CheckFate) -> impl Iterator<Item = Position> + '_ {
        self.fates
            .iter()
            .filter(move |(_, f)| *f == fate)
            .map(|(pos, _)| *pos)
    }
}

/// Grows `old` to `m x n` without touching it.
///
/// New data in columns to the right of the old patch start in `|+>`, all other
/// new data start in `|0>`. A new check is born deterministic exactly when all
/// of its legs land on new data prepared in its own basis.
pub fn grow(old: &LatticeState, m: usize, n: usize) -> Result<(LatticeState, GrowthReport)> {
    let (old_m, old_n) = old.shape();
    if m < old_m || n < old_n {
        return Err(CircuitError::config(format!(
            "cannot grow a {old_m}x{old_n} patch into {m}x{n}"
        )));
    }
    let next = old.reshaped(m, n)?;
    let old_count = old.index().total_identity_count();
    let plus_column = 2 * (old_m as i32 - 1);

    let mut report = GrowthReport::default();
    let mut zero_set = FxHashSet::default();
    let mut plus_set = FxHashSet::default();
    for (pos, id) in next.index().iter() {
        if id < old_count {
            continue;
        }
        if pos.is_data_site() {
            report.new_data.push(id);
            if pos.x > plus_column {
                report.plus_data.push(id);
                plus_set.insert(id);
            } else {
                zero_set.insert(id);
            }
        } else {
            report.new_ancillas.push(id);
        }
    }

    for check in next.catalog().iter() {
        let fate = if old.catalog().contains(&check.position) {
            CheckFate::Continued
        } else {
            let prepared = match check.kind {
                CheckType::X => &plus_set,
                CheckType::Z => &zero_set,
            };
            if check.live_legs().all(|q| prepared.contains(&q)) {
                CheckFate::BornDeterministic
            } else {
                CheckFate::BornRandom
            }
        };
        report.fates.push((check.position, fate));
    }
    report.discarded = old
        .catalog()
        .iter()
        .map(|c| c.position)
        .filter(|pos| !next.catalog().contains(pos))
        .collect();

    log::debug!(
        "growth {old_m}x{old_n} -> {m}x{n}: {} new data, {} new checks, {} discarded",
        report.new_data.len(),
        report.new_ancillas.len(),
        report.discarded.len()
    );
    Ok((next, report))
}

impl SurfaceCode {
    /// Grows the patch in place and runs its first round, with detectors set
    /// by each check's [`CheckFate`].
    pub fn growth_cycle(
        &mut self,
        stream: &mut InstructionStream,
        m: usize,
        n: usize,
        t: usize,
        opts: RoundOptions,
    ) -> Result<GrowthReport> {
        let (next, report) = grow(&self.state, m, n)?;
        let p = if opts.noiseless { 0.0 } else { self.error_rate() };

        for id in report.new_data.iter().chain(report.new_ancillas.iter()) {
            if let Some(pos) = next.index().position_of(*id) {
                stream.qubit_coords(*id, &pos.coords());
            }
        }
        let fresh: Vec<QubitId> = report
            .new_data
            .iter()
            .chain(report.new_ancillas.iter())
            .copied()
            .collect();
        stream.gate(Op::R, &fresh);
        stream.gate(Op::H, &report.plus_data);
        stream.noise(Op::Depolarize1, &report.plus_data, p);
        stream.tick();

        self.state = next;
        let previous: Vec<Option<MeasIx>> = self
            .state
            .catalog()
            .iter()
            .zip(report.fates.iter())
            .map(|(check, (_, fate))| match fate {
                CheckFate::Continued => self
                    .state
                    .last_measurement(check.id)
                    .map(Some)
                    .ok_or_else(|| {
                        CircuitError::consistency(format!(
                            "continued check at {} has no previous measurement",
                            check.position
                        ))
                    }),
                _ => Ok(None),
            })
            .collect::<Result<_>>()?;

        self.depolarize_all(stream, p);
        self.measure_round(stream, p, None);
        for ((check, (_, fate)), prev) in self
            .state
            .catalog()
            .iter()
            .zip(report.fates.iter())
            .zip(previous)
        {
            let coords = opts.tag.coords(check.position, t);
            let Some(current) = self.state.last_measurement(check.id) else {
                continue;
            };
            match (fate, prev) {
                (CheckFate::Continued, Some(prev)) => stream.detector(&[current, prev], &coords)?,
                (CheckFate::BornDeterministic, _) => stream.detector(&[current], &coords)?,
                _ => {}
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface_code::DetectorTag;

    #[test]
    fn growth_keeps_identities() {
        let old = LatticeState::new(3, 3, 54).unwrap();
        let (next, report) = grow(&old, 7, 7).unwrap();
        for (pos, id) in old.index().iter() {
            assert_eq!(next.index().identity_of(&pos), Some(id));
        }
        assert!(next.index().total_identity_count() > old.index().total_identity_count());
        assert_eq!(report.new_data.len(), 49 - 9);
        assert!(report.discarded.is_empty());
        // new data come before new checks
        let max_data = report.new_data.iter().max().unwrap();
        let min_anc = report.new_ancillas.iter().min().unwrap();
        assert!(max_data < min_anc);
    }

    #[test]
    fn classification_is_complete() {
        let old = LatticeState::new(3, 3, 0).unwrap();
        let (next, report) = grow(&old, 5, 5).unwrap();
        assert_eq!(report.fates.len(), next.catalog().len());
        assert_eq!(report.with_fate(CheckFate::Continued).count(), old.catalog().len());
        for check in old.catalog().iter() {
            assert_eq!(report.fate_of(&check.position), Some(CheckFate::Continued));
        }
    }

    #[test]
    fn edge_rules() {
        let old = LatticeState::new(3, 3, 0).unwrap();
        let (next, report) = grow(&old, 7, 7).unwrap();
        for check in next.catalog().iter() {
            let pos = check.position;
            let fate = report.fate_of(&pos).unwrap();
            if old.catalog().contains(&pos) {
                continue;
            }
            let expected = match check.kind {
                CheckType::Z if pos.x < 4 && pos.y > 6 => CheckFate::BornDeterministic,
                CheckType::X if pos.x > 6 => CheckFate::BornDeterministic,
                _ => CheckFate::BornRandom,
            };
            assert_eq!(fate, expected, "{} check at {pos}", check.kind);
        }
        assert!(report.with_fate(CheckFate::BornRandom).count() > 0);
    }

    #[test]
    fn shrinking_is_rejected() {
        let old = LatticeState::new(5, 5, 0).unwrap();
        assert!(matches!(
            grow(&old, 3, 5),
            Err(CircuitError::Configuration(_))
        ));
        assert!(matches!(
            grow(&old, 5, 4),
            Err(CircuitError::Configuration(_))
        ));
    }

    #[test]
    fn same_shape_is_a_no_op() {
        let old = LatticeState::new(3, 3, 0).unwrap();
        let (next, report) = grow(&old, 3, 3).unwrap();
        assert_eq!(next.index(), old.index());
        assert!(report.new_data.is_empty());
        assert_eq!(report.with_fate(CheckFate::Continued).count(), 8);
    }

    #[test]
    fn growth_cycle_emits_one_detector_per_determined_check() {
        let mut code = SurfaceCode::new(3, 3, 0.001, 0).unwrap();
        let mut stream = InstructionStream::new();
        code.initialize_cycle(&mut stream, CheckType::X, DetectorTag::Plain)
            .unwrap();
        let before = stream.num_detectors();
        let report = code
            .growth_cycle(&mut stream, 5, 5, 1, RoundOptions::postselected())
            .unwrap();
        let determined = report.with_fate(CheckFate::Continued).count()
            + report.with_fate(CheckFate::BornDeterministic).count();
        assert_eq!(stream.num_detectors() - before, determined);
        assert_eq!(code.shape(), (5, 5));
        stream.verify_offsets().unwrap();

        let r = stream
            .instructions()
            .iter()
            .rev()
            .find(|i| i.op == Op::R)
            .unwrap();
        assert_eq!(r.targets.len(), report.new_data.len() + report.new_ancillas.len());
    }
}
