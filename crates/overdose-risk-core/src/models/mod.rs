//! Domain models for the risk scoring pipeline.

mod input;
mod medication;
mod prediction;

pub use input::*;
pub use medication::*;
pub use prediction::*;
