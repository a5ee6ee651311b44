use std::str::FromStr;

use fxhash::FxHashMap;

use crate::check_catalog::{data_sites, Check, CheckCatalog, CheckType};
use crate::error::{CircuitError, Result};
use crate::math::pauli::Pauli;
use crate::position_index::{Position, PositionIndex, QubitId};
use crate::stream::{InstructionStream, MeasIx, Op};
use crate::surgery::LatticeView;

fn check_shape(m: usize, n: usize) -> Result<()> {
    if m < 2 || n < 2 {
        return Err(CircuitError::config(format!(
            "a {m}x{n} patch is too small, both sides need at least 2 data qubits"
        )));
    }
    Ok(())
}

/// One shape of a surface-code patch together with everything that must
/// survive a change of shape: the identity index and the last measurement of
/// every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeState {
    m: usize,
    n: usize,
    index: PositionIndex,
    catalog: CheckCatalog,
    data: Vec<QubitId>,
    last: FxHashMap<QubitId, MeasIx>,
}

impl LatticeState {
    pub fn new(m: usize, n: usize, offset: QubitId) -> Result<Self> {
        let empty = LatticeState {
            m: 0,
            n: 0,
            index: PositionIndex::new(offset),
            catalog: CheckCatalog::new(),
            data: Vec::new(),
            last: FxHashMap::default(),
        };
        empty.reshaped(m, n)
    }

    /// A copy of this lattice at shape `m x n`. Data positions are allocated
    /// before the checks, so known positions keep their identities and new
    /// ones are numbered data first.
    pub(crate) fn reshaped(&self, m: usize, n: usize) -> Result<LatticeState> {
        check_shape(m, n)?;
        let mut index = self.index.clone();
        let data = data_sites(m, n)
            .into_iter()
            .map(|pos| index.allocate(pos))
            .collect();
        let catalog = CheckCatalog::derive(m, n, &mut index)?;
        Ok(LatticeState {
            m,
            n,
            index,
            catalog,
            data,
            last: self.last.clone(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    pub fn index(&self) -> &PositionIndex {
        &self.index
    }

    pub fn catalog(&self) -> &CheckCatalog {
        &self.catalog
    }

    pub fn data_qubits(&self) -> &[QubitId] {
        &self.data
    }

    pub fn check_qubits(&self) -> Vec<QubitId> {
        self.catalog.iter().map(|c| c.id).collect()
    }

    pub fn data_at(&self, position: &Position) -> Option<QubitId> {
        if position.is_data_site() {
            self.index.identity_of(position)
        } else {
            None
        }
    }

    pub fn last_measurement(&self, check: QubitId) -> Option<MeasIx> {
        self.last.get(&check).copied()
    }

    pub(crate) fn record(&mut self, check: QubitId, ix: MeasIx) {
        self.last.insert(check, ix);
    }
}

/// Fourth detector coordinate. Anything other than `Plain` is post-selected
/// by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorTag {
    #[default]
    Plain,
    PostSelected,
    Surgery,
}

impl DetectorTag {
    pub fn coords(&self, position: Position, t: usize) -> Vec<f64> {
        let mut coords = vec![position.x as f64, position.y as f64, t as f64];
        match self {
            DetectorTag::Plain => {}
            DetectorTag::PostSelected => coords.push(1.0),
            DetectorTag::Surgery => coords.push(2.0),
        }
        coords
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundOptions {
    pub tag: DetectorTag,
    pub noiseless: bool,
}

impl RoundOptions {
    pub fn postselected() -> Self {
        RoundOptions {
            tag: DetectorTag::PostSelected,
            noiseless: false,
        }
    }

    pub fn noiseless() -> Self {
        RoundOptions {
            tag: DetectorTag::Plain,
            noiseless: true,
        }
    }
}

/// Single-qubit Cliffords accepted by [`SurfaceCode::encoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingGate {
    I,
    X,
    Y,
    Z,
    H,
    S,
}

impl EncodingGate {
    fn op(&self) -> Option<Op> {
        match self {
            EncodingGate::I => None,
            EncodingGate::X => Some(Op::X),
            EncodingGate::Y => Some(Op::Y),
            EncodingGate::Z => Some(Op::Z),
            EncodingGate::H => Some(Op::H),
            EncodingGate::S => Some(Op::S),
        }
    }
}

impl FromStr for EncodingGate {
    type Err = CircuitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match &s.trim().to_ascii_uppercase()[..] {
            "I" | "ID" | "" => Ok(EncodingGate::I),
            "X" => Ok(EncodingGate::X),
            "Y" => Ok(EncodingGate::Y),
            "Z" => Ok(EncodingGate::Z),
            "H" => Ok(EncodingGate::H),
            "S" => Ok(EncodingGate::S),
            other => Err(CircuitError::config(format!(
                "unsupported gate '{other}', use one of I, X, Y, Z, H, S"
            ))),
        }
    }
}

/// A rotated surface-code patch writing into a shared [`InstructionStream`].
#[derive(Debug, Clone)]
pub struct SurfaceCode {
    pub(crate) state: LatticeState,
    error_rate: f64,
}

impl SurfaceCode {
    pub fn new(m: usize, n: usize, error_rate: f64, offset: QubitId) -> Result<Self> {
        if !(0.0..=1.0).contains(&error_rate) {
            return Err(CircuitError::config(format!(
                "error rate {error_rate} is not a probability"
            )));
        }
        Ok(SurfaceCode {
            state: LatticeState::new(m, n, offset)?,
            error_rate,
        })
    }

    pub fn state(&self) -> &LatticeState {
        &self.state
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    pub fn shape(&self) -> (usize, usize) {
        self.state.shape()
    }

    fn rate(&self, opts: RoundOptions) -> f64 {
        if opts.noiseless {
            0.0
        } else {
            self.error_rate
        }
    }

    fn last_or_err(&self, check: &Check) -> Result<MeasIx> {
        self.state.last_measurement(check.id).ok_or_else(|| {
            CircuitError::consistency(format!(
                "check {} at {} has never been measured",
                check.id, check.position
            ))
        })
    }

    fn previous_measurements(&self, only: Option<CheckType>) -> Result<Vec<MeasIx>> {
        self.state
            .catalog
            .iter()
            .filter(|c| only.map_or(true, |kind| c.kind == kind))
            .map(|c| self.last_or_err(c))
            .collect()
    }

    pub fn emit_coords(&self, stream: &mut InstructionStream) {
        let positions = data_sites(self.state.m, self.state.n);
        for (pos, id) in positions.iter().zip(self.state.data.iter()) {
            stream.qubit_coords(*id, &pos.coords());
        }
        for check in self.state.catalog.iter() {
            stream.qubit_coords(check.id, &check.position.coords());
        }
    }

    pub fn depolarize_all(&self, stream: &mut InstructionStream, p: f64) {
        stream.noise(Op::Depolarize1, &self.state.data, p);
        stream.noise(Op::Depolarize1, &self.state.check_qubits(), p);
        stream.tick();
    }

    /// Gates and read-out of one syndrome round. With `only` set, just the
    /// checks of that type are entangled and measured and the Hadamard layers
    /// are left out.
    pub(crate) fn measure_round(
        &mut self,
        stream: &mut InstructionStream,
        p: f64,
        only: Option<CheckType>,
    ) {
        let selected = |c: &&Check| only.map_or(true, |kind| c.kind == kind);
        let x_ancillas: Vec<QubitId> = if only.is_none() {
            self.state.catalog.of_type(CheckType::X).map(|c| c.id).collect()
        } else {
            Vec::new()
        };
        if only.is_none() {
            stream.gate(Op::H, &x_ancillas);
            stream.noise(Op::Depolarize1, &x_ancillas, p);
            stream.tick();
        }
        for layer in 0..4 {
            let pairs: Vec<(QubitId, QubitId)> = self
                .state
                .catalog
                .iter()
                .filter(selected)
                .filter_map(|c| {
                    c.legs[layer].map(|d| match c.kind {
                        CheckType::X => (c.id, d),
                        CheckType::Z => (d, c.id),
                    })
                })
                .collect();
            stream.gate_pairs(Op::CX, &pairs);
            stream.noise_pairs(&pairs, p);
            stream.tick();
        }
        if only.is_none() {
            stream.gate(Op::H, &x_ancillas);
            stream.noise(Op::Depolarize1, &x_ancillas, p);
            stream.tick();
        }
        let measured: Vec<QubitId> = self
            .state
            .catalog
            .iter()
            .filter(selected)
            .map(|c| c.id)
            .collect();
        let results = stream.measure_reset(&measured, p);
        stream.tick();
        for (id, ix) in measured.into_iter().zip(results) {
            self.state.record(id, ix);
        }
    }

    /// Resets the patch into the `basis` product state, measures one round and
    /// emits one-sided detectors on the checks that are deterministic in that
    /// basis.
    pub fn initialize_cycle(
        &mut self,
        stream: &mut InstructionStream,
        basis: CheckType,
        tag: DetectorTag,
    ) -> Result<()> {
        log::trace!("initializing {:?} patch in the {basis} basis", self.shape());
        let p = self.error_rate;
        self.emit_coords(stream);
        stream.gate(Op::R, &self.state.data);
        stream.gate(Op::R, &self.state.check_qubits());
        if basis == CheckType::X {
            stream.gate(Op::H, &self.state.data);
            stream.noise(Op::Depolarize1, &self.state.data, p);
        }
        self.depolarize_all(stream, p);
        self.measure_round(stream, p, None);
        for check in self.state.catalog.of_type(basis) {
            let current = self.last_or_err(check)?;
            stream.detector(&[current], &tag.coords(check.position, 0))?;
        }
        Ok(())
    }

    /// One full round with a two-sided detector on every check.
    pub fn syndrome_cycle(
        &mut self,
        stream: &mut InstructionStream,
        t: usize,
        opts: RoundOptions,
    ) -> Result<()> {
        self.syndrome_cycle_except(stream, t, opts, &[])
    }

    /// Like [`SurfaceCode::syndrome_cycle`], but checks at the `skip`
    /// positions are measured without a detector.
    pub fn syndrome_cycle_except(
        &mut self,
        stream: &mut InstructionStream,
        t: usize,
        opts: RoundOptions,
        skip: &[Position],
    ) -> Result<()> {
        let previous = self.previous_measurements(None)?;
        self.measure_round(stream, self.rate(opts), None);
        for (check, prev) in self.state.catalog.iter().zip(previous) {
            if skip.contains(&check.position) {
                continue;
            }
            let current = self.last_or_err(check)?;
            stream.detector(&[current, prev], &opts.tag.coords(check.position, t))?;
        }
        Ok(())
    }

    /// A round over the Z checks only, as run while the X boundary is merged
    /// into a lattice surgery.
    pub fn z_syndrome_cycle(
        &mut self,
        stream: &mut InstructionStream,
        t: usize,
        tag: DetectorTag,
    ) -> Result<()> {
        let previous = self.previous_measurements(Some(CheckType::Z))?;
        self.measure_round(stream, self.error_rate, Some(CheckType::Z));
        for (check, prev) in self.state.catalog.of_type(CheckType::Z).zip(previous) {
            let current = self.last_or_err(check)?;
            stream.detector(&[current, prev], &tag.coords(check.position, t))?;
        }
        Ok(())
    }

    /// The data qubits along the logical operator of `basis`: the column
    /// `x = 0` for Z, the row `y = 0` for X.
    pub fn logical_operator(&self, basis: CheckType) -> Vec<QubitId> {
        let (m, n) = (self.state.m as i32, self.state.n as i32);
        let line: Vec<Position> = match basis {
            CheckType::Z => (0..n).map(|j| Position::new(0, 2 * j)).collect(),
            CheckType::X => (0..m).map(|i| Position::new(2 * i, 0)).collect(),
        };
        line.iter().filter_map(|pos| self.state.data_at(pos)).collect()
    }

    /// Destructive read-out of every data qubit in `basis`. Each check of that
    /// basis gets a detector against its last syndrome value, and the logical
    /// line enters observable 0.
    pub fn logical_measurement(
        &mut self,
        stream: &mut InstructionStream,
        basis: CheckType,
        t: usize,
    ) -> Result<()> {
        let p = self.error_rate;
        let data = self.state.data.clone();
        if basis == CheckType::X {
            stream.gate(Op::H, &data);
            stream.noise(Op::Depolarize1, &data, p);
            stream.tick();
        }
        let results = stream.measure_reset(&data, p);
        let by_qubit: FxHashMap<QubitId, MeasIx> = data.iter().copied().zip(results).collect();
        let lookup = |q: QubitId| {
            by_qubit.get(&q).copied().ok_or_else(|| {
                CircuitError::consistency(format!("data qubit {q} was not read out"))
            })
        };
        for check in self.state.catalog.of_type(basis) {
            let mut targets = vec![self.last_or_err(check)?];
            for q in check.live_legs() {
                targets.push(lookup(q)?);
            }
            let pos = check.position;
            stream.detector(&targets, &[pos.x as f64, pos.y as f64, t as f64])?;
        }
        let line = self
            .logical_operator(basis)
            .into_iter()
            .map(lookup)
            .collect::<Result<Vec<MeasIx>>>()?;
        stream.observable_include(&line, 0)
    }

    /// Noiseless product measurement of logical Y, `Y` on the corner, `X`
    /// along the bottom row and `Z` up the left column, into observable `k`.
    pub fn y_measurement_noiseless(
        &self,
        stream: &mut InstructionStream,
        k: u32,
    ) -> Result<MeasIx> {
        let (m, n) = (self.state.m as i32, self.state.n as i32);
        let mut sites = vec![(Pauli::Y, Position::new(0, 0))];
        sites.extend((1..m).map(|i| (Pauli::X, Position::new(2 * i, 0))));
        sites.extend((1..n).map(|j| (Pauli::Z, Position::new(0, 2 * j))));
        let terms = sites
            .into_iter()
            .map(|(p, pos)| {
                self.state
                    .data_at(&pos)
                    .map(|q| (p, q))
                    .ok_or_else(|| CircuitError::consistency(format!("no data qubit at {pos}")))
            })
            .collect::<Result<Vec<(Pauli, QubitId)>>>()?;
        let ix = stream.measure_product(&terms);
        stream.observable_include(&[ix], k)?;
        Ok(ix)
    }

    /// Noiseless encoding of the state of the corner qubit into the patch:
    /// `gates` act on the corner, a CX fan-out copies it along the bottom row
    /// and one noiseless round projects onto the code space. No detectors are
    /// emitted since the first syndrome is random.
    pub fn encoding(&mut self, stream: &mut InstructionStream, gates: &[EncodingGate]) -> Result<()> {
        let corner = Position::new(0, 0);
        let src = self
            .state
            .data_at(&corner)
            .ok_or_else(|| CircuitError::consistency(format!("no data qubit at {corner}")))?;
        self.emit_coords(stream);
        stream.gate(Op::R, &self.state.data);
        stream.gate(Op::R, &self.state.check_qubits());
        for op in gates.iter().filter_map(|g| g.op()) {
            stream.gate(op, &[src]);
        }
        let fan_out: Vec<(QubitId, QubitId)> = self
            .logical_operator(CheckType::X)
            .into_iter()
            .filter(|q| *q != src)
            .map(|q| (src, q))
            .collect();
        stream.gate_pairs(Op::CX, &fan_out);
        stream.tick();
        self.measure_round(stream, 0.0, None);
        Ok(())
    }
}

impl LatticeView for SurfaceCode {
    fn list_active_checks(&self) -> &[Check] {
        self.state.catalog.checks()
    }

    fn identity_of(&self, position: &Position) -> Option<QubitId> {
        self.state.index.identity_of(position)
    }

    fn last_measurement(&self, check: QubitId) -> Option<MeasIx> {
        self.state.last_measurement(check)
    }
}
