use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::check_catalog::CheckType;
use crate::error::{CircuitError, Result};
use crate::qrm::QrmCode;
use crate::stream::InstructionStream;
use crate::surface_code::{DetectorTag, RoundOptions, SurfaceCode};
use crate::surgery::SurgeryUnit;

pub const MAGIC_CONFIG_FILENAME: &str = "magic_config.json";

/// x coordinate offset of the QRM code, so it sits left of the patch.
const QRM_SHIFT: i32 = -10;

fn default_distance() -> usize {
    7
}

/// Round counts and noise of one magic-state preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicConfig {
    pub t_sc_pre: usize,
    pub t_lat_surg: usize,
    pub t_before_grow: usize,
    pub t_ps_grow: usize,
    pub t_maintain: usize,
    pub error_rate: f64,
    #[serde(default = "default_distance")]
    pub distance: usize,
}

impl Default for MagicConfig {
    fn default() -> Self {
        MagicConfig {
            t_sc_pre: 1,
            t_lat_surg: 2,
            t_before_grow: 1,
            t_ps_grow: 2,
            t_maintain: 2,
            error_rate: 0.001,
            distance: default_distance(),
        }
    }
}

impl MagicConfig {
    /// Reads a config from a JSON file. A directory is searched for
    /// [`MAGIC_CONFIG_FILENAME`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut path = path.as_ref().to_path_buf();
        if path.is_dir() {
            path.push(MAGIC_CONFIG_FILENAME);
        }
        log::trace!("Reading magic config from {}", path.display());
        let mut s = String::new();
        File::open(&path)
            .and_then(|mut file| file.read_to_string(&mut s))
            .map_err(|e| CircuitError::config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str::<MagicConfig>(&s)
            .map_err(|e| CircuitError::config(format!("bad magic config {}: {e}", path.display())))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let s = serde_json::to_string_pretty(self)
            .map_err(|e| CircuitError::config(format!("cannot serialize config: {e}")))?;
        File::create(path)
            .and_then(|mut file| file.write_all(s.as_bytes()))
            .map_err(|e| CircuitError::config(format!("cannot write {}: {e}", path.display())))
    }
}

/// Builds the full preparation: QRM S state, surgery into a 3x3 patch,
/// growth to `distance` and a final noiseless Y read-out.
///
/// Every detector up to the end of the post-selected growth rounds is marked
/// for post-selection. Observable 0 ends up as the product of the patch's Y,
/// the linking checks and the QRM X parity, which is deterministic without
/// noise.
pub fn magic_preparation(config: &MagicConfig) -> Result<InstructionStream> {
    let p = config.error_rate;
    let mut stream = InstructionStream::new();
    let mut qrm = QrmCode::new(p, QRM_SHIFT, 0)?;
    let surgery_base = qrm.next_free_id();
    let mut patch = SurfaceCode::new(3, 3, p, surgery_base + 2)?;

    qrm.prepare_s_state(&mut stream)?;
    patch.initialize_cycle(&mut stream, CheckType::X, DetectorTag::PostSelected)?;
    let mut clock = 1;
    for t in clock..clock + config.t_sc_pre {
        patch.syndrome_cycle(&mut stream, t, RoundOptions::postselected())?;
    }
    clock += config.t_sc_pre;

    let mut unit = SurgeryUnit::attach(&qrm, &patch, surgery_base)?;
    unit.lattice_surgery(&mut stream, &mut qrm, &mut patch, config.t_lat_surg, clock)?;
    clock += config.t_lat_surg;
    unit.decouple_after_surgery(&mut stream, &mut qrm, &mut patch, clock)?;
    clock += 1;

    for t in clock..clock + config.t_before_grow {
        patch.syndrome_cycle(&mut stream, t, RoundOptions::postselected())?;
    }
    clock += config.t_before_grow;
    patch.growth_cycle(
        &mut stream,
        config.distance,
        config.distance,
        clock,
        RoundOptions::postselected(),
    )?;
    clock += 1;
    for t in clock..clock + config.t_ps_grow {
        patch.syndrome_cycle(&mut stream, t, RoundOptions::postselected())?;
    }
    clock += config.t_ps_grow;
    for t in clock..clock + config.t_maintain {
        patch.syndrome_cycle(&mut stream, t, RoundOptions::default())?;
    }
    clock += config.t_maintain;

    patch.y_measurement_noiseless(&mut stream, 0)?;
    patch.syndrome_cycle(&mut stream, clock, RoundOptions::noiseless())?;
    log::info!(
        "magic preparation at d = {}: {} detectors, {} measurements",
        config.distance,
        stream.num_detectors(),
        stream.current_measurement_count()
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn builds_with_offsets_in_range() {
        let config = MagicConfig {
            distance: 5,
            ..Default::default()
        };
        let stream = magic_preparation(&config).unwrap();
        stream.verify_offsets().unwrap();
        assert_eq!(stream.num_observables(), 1);
        let summary = stream.summary();
        assert!(summary.postselected_detectors > 0);
        assert!(summary.postselected_detectors < summary.detectors);
    }

    #[test]
    fn zero_surgery_rounds_is_a_configuration_error() {
        let config = MagicConfig {
            t_lat_surg: 0,
            ..Default::default()
        };
        assert!(matches!(
            magic_preparation(&config),
            Err(CircuitError::Configuration(_))
        ));
    }

    #[test]
    fn distance_below_patch_is_rejected() {
        let config = MagicConfig {
            distance: 2,
            ..Default::default()
        };
        assert!(matches!(
            magic_preparation(&config),
            Err(CircuitError::Configuration(_))
        ));
    }

    #[test]
    fn config_round_trips_through_disk() {
        let mut path = env::temp_dir();
        path.push(format!("magic_config_{}.json", std::process::id()));
        let config = MagicConfig {
            t_ps_grow: 4,
            error_rate: 0.002,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = MagicConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_file(&path).unwrap();

        let partial: MagicConfig = serde_json::from_str(
            r#"{"t_sc_pre":1,"t_lat_surg":1,"t_before_grow":1,"t_ps_grow":1,"t_maintain":1,"error_rate":0.0}"#,
        )
        .unwrap();
        assert_eq!(partial.distance, 7);
    }
}
