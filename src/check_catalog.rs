use std::fmt::Display;
use std::str::FromStr;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::position_index::{Position, PositionIndex, QubitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckType {
    X,
    Z,
}

impl CheckType {
    pub fn conjugate(&self) -> CheckType {
        match self {
            CheckType::X => CheckType::Z,
            CheckType::Z => CheckType::X,
        }
    }
}

impl FromStr for CheckType {
    type Err = CircuitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match &s.trim().to_ascii_uppercase()[..] {
            "X" => Ok(CheckType::X),
            "Z" => Ok(CheckType::Z),
            other => Err(CircuitError::config(format!(
                "unsupported basis '{other}', use X or Z"
            ))),
        }
    }
}

impl Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CheckType::X => "X",
            CheckType::Z => "Z",
        })
    }
}

/// A stabilizer check measured through one ancilla. `legs` is in the fixed
/// entangling order; `None` marks a boundary gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub kind: CheckType,
    pub position: Position,
    pub id: QubitId,
    pub legs: [Option<QubitId>; 4],
}

impl Check {
    pub fn live_legs(&self) -> impl Iterator<Item = QubitId> + '_ {
        self.legs.iter().flatten().copied()
    }

    pub fn weight(&self) -> usize {
        self.live_legs().count()
    }
}

/// Leg offsets around a check, in entangling order. The two types use
/// different orders so that hook errors run along the matching boundary.
const X_LEG_ORDER: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const Z_LEG_ORDER: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Check sites of an `m x n` rotated patch, X checks first.
pub fn check_sites(m: usize, n: usize) -> Vec<(CheckType, Position)> {
    let (m, n) = (m as i32, n as i32);
    let mut sites = Vec::new();
    for i in (0..=m).step_by(2) {
        for j in 0..n - 1 {
            let pos = Position::new(2 * i - 1 + 2 * (j % 2), 2 * j + 1);
            if pos.x <= 2 * m - 1 {
                sites.push((CheckType::X, pos));
            }
        }
    }
    for i in 0..m - 1 {
        for j in (0..=n).step_by(2) {
            let pos = Position::new(2 * i + 1, 2 * j + 1 - 2 * (i % 2));
            if pos.y <= 2 * n - 1 {
                sites.push((CheckType::Z, pos));
            }
        }
    }
    sites
}

pub fn data_sites(m: usize, n: usize) -> Vec<Position> {
    let mut sites = Vec::with_capacity(m * n);
    for i in 0..m as i32 {
        for j in 0..n as i32 {
            sites.push(Position::new(2 * i, 2 * j));
        }
    }
    sites
}

fn in_shape(pos: &Position, m: usize, n: usize) -> bool {
    pos.is_data_site()
        && pos.x >= 0
        && pos.y >= 0
        && pos.x <= 2 * (m as i32 - 1)
        && pos.y <= 2 * (n as i32 - 1)
}

/// The checks of one lattice shape in measurement order, with a direct
/// position lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckCatalog {
    checks: Vec<Check>,
    by_position: FxHashMap<Position, usize>,
}

impl CheckCatalog {
    pub fn new() -> Self {
        CheckCatalog::default()
    }

    /// Builds the catalog of an `m x n` patch. Data qubits of the shape must
    /// already be allocated in `index`; check identities are allocated here, so
    /// a check at a position the index already knows keeps its identity.
    pub fn derive(m: usize, n: usize, index: &mut PositionIndex) -> Result<Self> {
        let mut catalog = CheckCatalog::new();
        for (kind, position) in check_sites(m, n) {
            let order = match kind {
                CheckType::X => X_LEG_ORDER,
                CheckType::Z => Z_LEG_ORDER,
            };
            let mut legs = [None; 4];
            for (leg, (dx, dy)) in legs.iter_mut().zip(order) {
                let site = position.offset(dx, dy);
                if in_shape(&site, m, n) {
                    *leg = Some(index.identity_of(&site).ok_or_else(|| {
                        CircuitError::consistency(format!("data qubit at {site} was never allocated"))
                    })?);
                }
            }
            let id = index.allocate(position);
            catalog.push(Check {
                kind,
                position,
                id,
                legs,
            })?;
        }
        Ok(catalog)
    }

    pub fn push(&mut self, check: Check) -> Result<()> {
        if let Some(ix) = self.by_position.get(&check.position) {
            return Err(CircuitError::IdentityCollision {
                position: check.position,
                existing: self.checks[*ix].id,
                incoming: check.id,
            });
        }
        self.by_position.insert(check.position, self.checks.len());
        self.checks.push(check);
        Ok(())
    }

    pub fn get(&self, position: &Position) -> Option<&Check> {
        self.by_position.get(position).map(|ix| &self.checks[*ix])
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.by_position.contains_key(position)
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter()
    }

    pub fn of_type(&self, kind: CheckType) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(move |c| c.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
