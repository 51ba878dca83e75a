//! Step definitions for cucumber tests

pub mod given;
pub mod then;
pub mod when;
