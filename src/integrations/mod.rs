//! External service integrations.

pub mod bureaus {
    pub use crate::bureaus::*;
}

pub mod simulation {
    pub use crate::simulation::*;
}

pub mod powerbi {
    pub use crate::powerbi::*;
}
