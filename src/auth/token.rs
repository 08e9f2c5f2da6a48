//! Access/refresh credential primitives.

pub mod pair;
pub mod secret;
