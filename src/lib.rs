//! Offline translation engine core: layered pipeline, phrase/dictionary
//! matching, and file-backed repositories (spec.md §1).

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod layer;
pub mod model;
pub mod pipeline;
pub mod regex_util;
pub mod repository;
pub mod storage;

pub use cache::CacheKind;
pub use config::{load_config, EngineConfig};
pub use context::Context;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use model::TranslationResult;
