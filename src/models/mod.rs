//! Species–area model families.
//!
//! The fitting code is written once against [`ModelSpec`]; the built-in
//! families live in [`ModelKind`] and are collected in a [`Registry`].

pub mod families;
pub(crate) mod guess;
pub mod model;
pub mod registry;

pub use families::*;
pub use model::*;
pub use registry::*;
