//! Properties of the circuit builders that hold for any valid parameters.
//!
//! Determinism checks run every stream through the noiseless tableau with
//! several seeds: random measurement outcomes must never leak into a
//! detector, nor into an observable once the logical value is fixed.

use magic_codec::check_catalog::{CheckCatalog, CheckType};
use magic_codec::experiments::{memory_experiment, s_state_preserving_with_growth};
use magic_codec::growth::{grow, CheckFate};
use magic_codec::magic::{magic_preparation, MagicConfig};
use magic_codec::position_index::{Position, PositionIndex};
use magic_codec::qrm::QrmCode;
use magic_codec::sim::{reference_sample, FrameSampler};
use magic_codec::stream::InstructionStream;
use magic_codec::surface_code::{DetectorTag, LatticeState, RoundOptions, SurfaceCode};
use magic_codec::surgery::SurgeryUnit;
use proptest::prelude::*;
use simple_logger::SimpleLogger;

/// With `observables` unset only the detectors are compared, for streams that
/// end before the logical value is fixed.
fn assert_seed_independent(stream: &InstructionStream, seeds: u64, observables: bool) {
    let first = reference_sample(stream, 0).unwrap();
    for seed in 1..seeds {
        let other = reference_sample(stream, seed).unwrap();
        assert_eq!(first.detectors, other.detectors, "detectors depend on seed {seed}");
        if observables {
            assert_eq!(
                first.observables, other.observables,
                "observables depend on seed {seed}"
            );
        }
    }
}

proptest! {
    /// Asking for a position twice gives the same identity, and fresh
    /// positions get strictly increasing identities from the base.
    #[test]
    fn prop_identities_are_stable(
        base in 0u32..1000,
        sites in proptest::collection::vec((-20i32..20, -20i32..20), 1..60),
    ) {
        let mut index = PositionIndex::new(base);
        let mut seen: Vec<(Position, u32)> = Vec::new();
        for (x, y) in sites {
            let pos = Position::new(x, y);
            let before = index.total_identity_count();
            let id = index.allocate(pos);
            match seen.iter().find(|(p, _)| *p == pos) {
                Some((_, known)) => {
                    prop_assert_eq!(id, *known);
                    prop_assert_eq!(index.total_identity_count(), before);
                }
                None => {
                    prop_assert_eq!(id, before);
                    seen.push((pos, id));
                }
            }
            prop_assert_eq!(index.position_of(id), Some(pos));
        }
        prop_assert_eq!(index.len(), seen.len());
    }

    /// Every check of the grown lattice gets exactly one fate, and a check is
    /// continued exactly when it existed before.
    #[test]
    fn prop_growth_classification(m in 2usize..6, n in 2usize..6, dm in 0usize..3, dn in 0usize..3) {
        let old = LatticeState::new(m, n, 0).unwrap();
        let (next, report) = grow(&old, m + dm, n + dn).unwrap();
        prop_assert_eq!(report.fates.len(), next.catalog().len());
        prop_assert!(report.discarded.is_empty());
        for check in next.catalog().iter() {
            let fate = report.fate_of(&check.position).unwrap();
            let existed = old.catalog().contains(&check.position);
            prop_assert_eq!(fate == CheckFate::Continued, existed);
            if existed {
                prop_assert_eq!(
                    old.index().identity_of(&check.position),
                    Some(check.id)
                );
            }
        }
        let fresh = CheckCatalog::derive(m + dm, n + dn, &mut PositionIndex::new(0)).unwrap();
        prop_assert_eq!(fresh.len(), next.catalog().len());
    }

    /// Memory experiments of any shape only point backwards into the record.
    #[test]
    fn prop_memory_offsets_resolve(m in 2usize..5, n in 2usize..5, rounds in 1usize..5, x_basis in any::<bool>()) {
        let basis = if x_basis { CheckType::X } else { CheckType::Z };
        let stream = memory_experiment(m, n, 0.001, basis, rounds).unwrap();
        prop_assert!(stream.verify_offsets().is_ok());
        prop_assert_eq!(stream.num_observables(), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Without noise every memory detector reads zero, for any shape and
    /// number of rounds.
    #[test]
    fn prop_noiseless_memory_is_quiet(m in 2usize..5, n in 2usize..5, rounds in 1usize..6, x_basis in any::<bool>()) {
        let basis = if x_basis { CheckType::X } else { CheckType::Z };
        let stream = memory_experiment(m, n, 0.001, basis, rounds).unwrap();
        for seed in 0..3 {
            let sample = reference_sample(&stream, seed).unwrap();
            prop_assert!(!sample.detectors.any(), "{:?} {}x{} fired at seed {}", basis, m, n, seed);
            prop_assert!(!sample.observables.any());
        }
    }

    /// Growing a patch into any larger rectangle keeps every detector quiet
    /// and independent of the random outcomes of the newly born checks.
    #[test]
    fn prop_growth_keeps_detectors_quiet(
        m in 2usize..5,
        n in 2usize..5,
        dm in 0usize..3,
        dn in 0usize..3,
        x_basis in any::<bool>(),
        before in 1usize..3,
        after in 1usize..3,
    ) {
        let basis = if x_basis { CheckType::X } else { CheckType::Z };
        let mut stream = InstructionStream::new();
        let mut patch = SurfaceCode::new(m, n, 0.001, 0).unwrap();
        patch.initialize_cycle(&mut stream, basis, DetectorTag::Plain).unwrap();
        let mut t = 1;
        for _ in 0..before {
            patch.syndrome_cycle(&mut stream, t, RoundOptions::default()).unwrap();
            t += 1;
        }
        patch
            .growth_cycle(&mut stream, m + dm, n + dn, t, RoundOptions::default())
            .unwrap();
        t += 1;
        for _ in 0..after {
            patch.syndrome_cycle(&mut stream, t, RoundOptions::default()).unwrap();
            t += 1;
        }
        patch.logical_measurement(&mut stream, basis, t).unwrap();
        prop_assert!(stream.verify_offsets().is_ok());

        let first = reference_sample(&stream, 0).unwrap();
        prop_assert!(!first.detectors.any(), "{:?} {}x{} -> {}x{} fired", basis, m, n, m + dm, n + dn);
        for seed in 1..3 {
            let other = reference_sample(&stream, seed).unwrap();
            prop_assert_eq!(&first.detectors, &other.detectors);
        }
    }
}

#[test]
fn small_memory_scenario() {
    let _ = SimpleLogger::new().init();
    let stream = memory_experiment(2, 2, 0.001, CheckType::Z, 3).unwrap();
    assert_eq!(stream.num_detectors(), 8);
    assert_eq!(stream.num_observables(), 1);
    let again = memory_experiment(2, 2, 0.001, CheckType::Z, 3).unwrap();
    assert_eq!(stream.to_string(), again.to_string());
}

#[test]
fn noiseless_memory_detectors_are_quiet() {
    for basis in [CheckType::X, CheckType::Z] {
        let stream = memory_experiment(3, 3, 0.001, basis, 4).unwrap();
        for seed in 0..4 {
            let sample = reference_sample(&stream, seed).unwrap();
            assert!(!sample.detectors.any(), "{basis:?} memory fired at seed {seed}");
            assert!(!sample.observables.any());
        }
    }
}

#[test]
fn noiseless_frame_samples_match_reference() {
    let stream = memory_experiment(3, 3, 0.0, CheckType::Z, 3).unwrap();
    let sampler = FrameSampler::new(&stream);
    for shot in sampler.sample(32, 11).unwrap() {
        assert!(!shot.detectors.any());
        assert!(!shot.observables.any());
    }
}

#[test]
fn s_state_with_growth_is_deterministic() {
    let stream = s_state_preserving_with_growth(3, 0.001, 2, 4).unwrap();
    assert_seed_independent(&stream, 4, true);
}

#[test]
fn qrm_readouts_are_deterministic() {
    let mut qrm = QrmCode::new(0.001, 0, 0).unwrap();
    let mut stream = InstructionStream::new();
    qrm.prepare_s_state(&mut stream).unwrap();
    let mut y = stream.clone();
    let mut y_qrm = qrm.clone();
    // X on an S state is a coin flip, only its checks are fixed
    qrm.x_measurement(&mut stream, &[]).unwrap();
    assert_seed_independent(&stream, 4, false);

    y_qrm.y_measurement(&mut y).unwrap();
    assert_seed_independent(&y, 4, true);
}

#[test]
fn surgery_is_deterministic() {
    let mut stream = InstructionStream::new();
    let mut qrm = QrmCode::new(0.001, -10, 0).unwrap();
    let base = qrm.next_free_id();
    let mut patch = SurfaceCode::new(3, 3, 0.001, base + 2).unwrap();
    qrm.prepare_s_state(&mut stream).unwrap();
    patch
        .initialize_cycle(&mut stream, CheckType::X, DetectorTag::PostSelected)
        .unwrap();
    patch
        .syndrome_cycle(&mut stream, 1, RoundOptions::postselected())
        .unwrap();
    let mut unit = SurgeryUnit::attach(&qrm, &patch, base).unwrap();
    unit.lattice_surgery(&mut stream, &mut qrm, &mut patch, 2, 2)
        .unwrap();
    unit.decouple_after_surgery(&mut stream, &mut qrm, &mut patch, 4)
        .unwrap();
    stream.verify_offsets().unwrap();
    // the logical value is only fixed once the patch is read out in Y
    assert_seed_independent(&stream, 4, false);
}

#[test]
fn magic_preparation_is_deterministic() {
    let config = MagicConfig {
        distance: 5,
        ..Default::default()
    };
    let stream = magic_preparation(&config).unwrap();
    assert_seed_independent(&stream, 3, true);
}
