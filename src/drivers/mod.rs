//! Drivers to carry out prototype matching functionalities.

use anyhow;

pub mod alignment;
pub mod batch;
pub mod orientation;
pub mod parameter_solver;

// =================
// Trait definitions
// =================

/// Trait defining behaviours of prototype-matching drivers.
pub trait ProtoMatchDriver {
    /// The type of the parameter structure controlling the driver.
    type Params;

    /// The type of the successful outcome when executing the driver.
    type Outcome;

    /// Executes the driver and stores the result internally.
    fn run(&mut self) -> Result<(), anyhow::Error>;

    /// Returns the result of the driver execution.
    fn result(&self) -> Result<&Self::Outcome, anyhow::Error>;
}
