//! Test doubles for pipeline runs.
//!
//! `ScriptedInvoker` stands in for the process bridge: each stage answers
//! from a script, every call is logged, and a stage can be told to request
//! cancellation while it "runs".

mod mocks;

pub use mocks::ScriptedInvoker;
