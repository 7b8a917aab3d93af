//! Domain layer - billing entities and the primitives they are built from.

pub mod billing;
pub mod foundation;
