//! Cucumber acceptance suite for the Mimic matching engine.

pub mod steps;
pub mod world;
