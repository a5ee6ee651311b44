pub mod gf2;
pub mod pauli;
