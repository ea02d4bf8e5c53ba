//! Trace data types shared by the framework, the plugins and the replay driver.
//!
//! # Module Organization
//!
//! - [`ids`]: Closed enumerations of the MPI calls a trace can classify
//! - [`records`]: Function event, point-to-point and collective records

pub mod ids;
pub mod records;

pub use ids::*;
pub use records::*;
