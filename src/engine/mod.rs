//! Core engine: causal diagrams, symbolic probability expressions, and the
//! identification procedures that connect them.

pub mod diagram;
pub mod errors;
pub mod identify;
pub mod probability;
