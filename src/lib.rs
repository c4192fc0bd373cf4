//! Bootstrap an evaluation set for a RAG application from reviewer feedback
//! logs, optionally topped up with LLM-generated golden questions.
//!
//! Stages, in pipeline order: [`config`] → [`discovery`] → [`dedup`] →
//! [`synthesize`] → [`generate`] → [`writer`]. [`bootstrap`] wires them together.

pub mod bootstrap;
pub mod config;
pub mod dedup;
pub mod discovery;
pub mod generate;
pub mod logging;
pub mod model;
pub mod records;
pub mod store;
pub mod synthesize;
pub mod writer;
