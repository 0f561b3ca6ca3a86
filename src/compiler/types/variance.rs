use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    Covariant,     // T_A <: T_B => Generic[T_A] <: Generic[T_B]
    Contravariant, // T_A <: T_B => Generic[T_B] <: Generic[T_A]
    #[default]
    Invariant,
}

impl Variance {
    /// Variance from the `covariant=` / `contravariant=` declaration markers.
    /// Both set at once has no meaning and yields `None`.
    pub fn from_flags(covariant: bool, contravariant: bool) -> Option<Self> {
        match (covariant, contravariant) {
            (true, true) => None,
            (true, false) => Some(Variance::Covariant),
            (false, true) => Some(Variance::Contravariant),
            (false, false) => Some(Variance::Invariant),
        }
    }
}

impl fmt::Display for Variance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variance::Covariant => write!(f, "covariant"),
            Variance::Contravariant => write!(f, "contravariant"),
            Variance::Invariant => write!(f, "invariant"),
        }
    }
}
