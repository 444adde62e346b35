/*
 * The application layer. `MergerAppLogic` is the single owner of the session, the
 * project store and any running merge; front ends call into it and read its status.
 * Scenario tests for it live in `handler_tests.rs`.
 */
pub mod handler;

#[cfg(test)]
mod handler_tests;

pub use handler::{AppLogicError, MergerAppLogic};
