//! Pure domain logic for the hackathon admissions lifecycle.
//!
//! This crate has no I/O. It defines:
//! - **Status**: where an applicant is in the lifecycle (`status`)
//! - **Machine**: the explicit transition table `(status, action, guards) ->
//!   new status + effects` (`machine`)
//! - **Application**: the applicant-supplied form and its submission
//!   validation (`application`)
//!
//! The server crate interprets effects against real storage and mail
//! transport; everything here is deterministic and directly testable.

pub mod application;
pub mod machine;
pub mod status;

pub use application::*;
pub use machine::*;
pub use status::*;
