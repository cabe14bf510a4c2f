// verdant/src/pipeline/mod.rs

//! A small named-step workflow engine.
//!
//! Checkout and gateway callbacks are both multi-step processes where each
//! step may stop the run early or fail with a [`CommerceError`](crate::CommerceError).
//! A [`Pipeline`] holds an ordered list of steps; each step carries `before`,
//! `on` and `after` handlers that operate on a shared [`ContextData`].

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;
pub mod hooks;
pub mod step;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline};
pub use step::{SkipCondition, StepDef};
