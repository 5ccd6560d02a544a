//! Visual question answering over http.
//!
//! An [`InfernumEngine`] owns the vision-language model on a worker thread and the
//! [`server`] module exposes it as a single multipart upload route.

pub mod config;
pub mod decode;
pub mod engine;
pub mod messages;
pub mod model;
pub mod server;

pub use engine::{
    InfernumEngine, InfernumEngineError, InfernumEngineResponse, InfernumEngineState,
    RequestMetadata,
};
pub use model::{InfernumModel, PaligemmaVqa, VqaError, VqaRequest, VqaResponse};
