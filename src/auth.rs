//! Credential models shared by the store, dispatcher, and refresh coordinator.

pub mod token;

pub use token::{pair::*, secret::*};
