//! Token records returned by identity providers and the rules for reusing them.

pub mod record;
pub mod secret;
pub mod validator;

pub use record::*;
pub use secret::*;
pub use validator::*;
