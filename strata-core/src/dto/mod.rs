//! Data Transfer Objects
//!
//! Run definitions come in from the caller (e.g. a CI trigger), run reports
//! go out for audit, and the backend/token DTOs describe the wire format of
//! the external collaborators.

pub mod backend;
pub mod run;
pub mod token;
