use std::fmt::Display;

/// Single-qubit Pauli, the basis of one factor in a product measurement.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Pauli {
    I,
    X,
    Y,
    Z,
}

impl Display for Pauli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Pauli::I => "I",
            Pauli::X => "X",
            Pauli::Y => "Y",
            Pauli::Z => "Z",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_a_letter() {
        let rendered: Vec<String> = [Pauli::I, Pauli::X, Pauli::Y, Pauli::Z]
            .iter()
            .map(|p| format!("{p}7"))
            .collect();
        assert_eq!(rendered, vec!["I7", "X7", "Y7", "Z7"]);
    }
}
