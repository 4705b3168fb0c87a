//! Host Audit Contracts
//!
//! Records exchanged between the engine and its collaborators: the probe
//! capability, per-probe results, findings and the sealed audit run.

mod audit_run;
mod finding;
mod probe;

pub use audit_run::*;
pub use finding::*;
pub use probe::*;
