//! Domain models for the clinic core.

mod appointment;
mod calendar;
mod forms;
mod identity;
mod snapshot;
mod submission;

pub use appointment::*;
pub use calendar::*;
pub use forms::*;
pub use identity::*;
pub use snapshot::*;
pub use submission::*;
