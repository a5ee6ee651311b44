use crate::check_catalog::CheckType;
use crate::error::{CircuitError, Result};
use crate::stream::InstructionStream;
use crate::surface_code::{DetectorTag, EncodingGate, RoundOptions, SurfaceCode};

/// Standard memory experiment: prepare in `basis`, `rounds` noisy rounds with
/// idle noise on every qubit before each, then a logical read-out.
pub fn memory_experiment(
    m: usize,
    n: usize,
    error_rate: f64,
    basis: CheckType,
    rounds: usize,
) -> Result<InstructionStream> {
    if rounds == 0 {
        return Err(CircuitError::config("a memory experiment needs at least one round"));
    }
    let mut code = SurfaceCode::new(m, n, error_rate, 0)?;
    let mut stream = InstructionStream::new();
    code.initialize_cycle(&mut stream, basis, DetectorTag::Plain)?;
    for t in 1..rounds {
        code.depolarize_all(&mut stream, error_rate);
        code.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
    }
    code.logical_measurement(&mut stream, basis, rounds)?;
    Ok(stream)
}

fn s_state_encoding(code: &mut SurfaceCode, stream: &mut InstructionStream) -> Result<()> {
    code.encoding(stream, &[EncodingGate::H, EncodingGate::S])
}

fn finish_with_y(code: &mut SurfaceCode, stream: &mut InstructionStream, t: usize) -> Result<()> {
    code.y_measurement_noiseless(stream, 0)?;
    code.syndrome_cycle(stream, t, RoundOptions::noiseless())
}

/// Encodes `|S>` noiselessly, keeps it for `rounds - 1` noisy rounds and
/// checks it with a noiseless Y read-out.
pub fn s_state_preserving(d: usize, error_rate: f64, rounds: usize) -> Result<InstructionStream> {
    if rounds == 0 {
        return Err(CircuitError::config("S state preservation needs at least one round"));
    }
    let mut code = SurfaceCode::new(d, d, error_rate, 0)?;
    let mut stream = InstructionStream::new();
    s_state_encoding(&mut code, &mut stream)?;
    for t in 1..rounds {
        code.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
    }
    finish_with_y(&mut code, &mut stream, rounds)?;
    Ok(stream)
}

/// Like [`s_state_preserving`], but the patch grows by two in both directions
/// at round `t_grow` when that is before `rounds`.
pub fn s_state_preserving_with_growth(
    d: usize,
    error_rate: f64,
    t_grow: usize,
    rounds: usize,
) -> Result<InstructionStream> {
    if rounds == 0 || t_grow == 0 {
        return Err(CircuitError::config(
            "S state preservation needs at least one round before growth",
        ));
    }
    let mut code = SurfaceCode::new(d, d, error_rate, 0)?;
    let mut stream = InstructionStream::new();
    s_state_encoding(&mut code, &mut stream)?;
    if rounds < t_grow {
        for t in 1..rounds {
            code.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
        }
    } else {
        for t in 1..t_grow {
            code.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
        }
        code.growth_cycle(&mut stream, d + 2, d + 2, t_grow, RoundOptions::default())?;
        for t in t_grow + 1..rounds {
            code.depolarize_all(&mut stream, error_rate);
            code.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
        }
    }
    finish_with_y(&mut code, &mut stream, rounds)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_detector_count() {
        // one-sided Z detectors, two full rounds, then the read-out detectors
        let stream = memory_experiment(2, 2, 0.001, CheckType::Z, 3).unwrap();
        assert_eq!(stream.num_detectors(), 1 + 2 * 3 + 1);
        assert_eq!(stream.num_observables(), 1);

        let stream = memory_experiment(3, 3, 0.001, CheckType::X, 5).unwrap();
        assert_eq!(stream.num_detectors(), 4 + 4 * 8 + 4);
    }

    #[test]
    fn identical_builds_render_identically() {
        let a = memory_experiment(2, 2, 0.001, CheckType::Z, 3).unwrap();
        let b = memory_experiment(2, 2, 0.001, CheckType::Z, 3).unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn zero_rounds_rejected() {
        assert!(memory_experiment(3, 3, 0.001, CheckType::Z, 0).is_err());
        assert!(s_state_preserving(3, 0.001, 0).is_err());
    }

    #[test]
    fn s_state_streams() {
        let stream = s_state_preserving(3, 0.001, 4).unwrap();
        // three noisy rounds and the final noiseless one, all two-sided
        assert_eq!(stream.num_detectors(), 4 * 8);
        stream.verify_offsets().unwrap();

        let grown = s_state_preserving_with_growth(3, 0.001, 2, 4).unwrap();
        grown.verify_offsets().unwrap();
        assert_eq!(grown.num_observables(), 1);
        let not_grown = s_state_preserving_with_growth(3, 0.001, 6, 4).unwrap();
        assert_eq!(not_grown.num_detectors(), stream.num_detectors());
    }
}
