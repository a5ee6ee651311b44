use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type QubitId = u32;

/// A site on the lattice. Data qubits of the surface code sit on even/even
/// sites and its checks on odd/odd sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    pub fn is_data_site(&self) -> bool {
        self.x.rem_euclid(2) == 0 && self.y.rem_euclid(2) == 0
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn coords(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

impl From<(i32, i32)> for Position {
    fn from(value: (i32, i32)) -> Self {
        Position::new(value.0, value.1)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Bijection between positions and qubit identities for one lattice.
///
/// Identities are handed out from a running counter that starts at `base`,
/// so several lattices can share one instruction stream without colliding.
/// Nothing is ever removed or renumbered: asking for a known position again
/// returns the identity it already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionIndex {
    base: QubitId,
    next: QubitId,
    ids: IndexMap<Position, QubitId>,
}

impl PositionIndex {
    pub fn new(base: QubitId) -> Self {
        PositionIndex {
            base,
            next: base,
            ids: IndexMap::new(),
        }
    }

    pub fn allocate(&mut self, position: Position) -> QubitId {
        if let Some(id) = self.ids.get(&position) {
            return *id;
        }
        let id = self.next;
        self.ids.insert(position, id);
        self.next += 1;
        id
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.ids.contains_key(position)
    }

    pub fn identity_of(&self, position: &Position) -> Option<QubitId> {
        self.ids.get(position).copied()
    }

    /// Reverse lookup. Identities are dense from `base` in allocation order,
    /// so this is an index into the map rather than a search.
    pub fn position_of(&self, id: QubitId) -> Option<Position> {
        let ix = id.checked_sub(self.base)? as usize;
        self.ids.get_index(ix).map(|(pos, _)| *pos)
    }

    /// The running counter: one past the largest identity handed out so far.
    pub fn total_identity_count(&self) -> QubitId {
        self.next
    }

    pub fn base(&self) -> QubitId {
        self.base
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, QubitId)> + '_ {
        self.ids.iter().map(|(pos, id)| (*pos, *id))
    }
}
