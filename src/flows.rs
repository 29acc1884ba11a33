//! Authorization-flow building blocks: request parameters, canonicalization and signed state,
//! the per-attempt flow, and the single-flight registry.

pub mod authorization;
pub mod factory;
pub mod params;
pub mod registry;

pub use authorization::*;
pub use factory::*;
pub use params::*;
pub use registry::*;
