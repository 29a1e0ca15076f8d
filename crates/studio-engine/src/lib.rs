//! Engine behind the studio front-end: request building, providers, image
//! codecs and the state machine that ties them together.

pub mod client;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod providers;

pub use client::GenerationClient;
pub use config::{EnvLayer, GeminiConfig};
pub use controller::{ImageSlot, JobOutcome, PendingJob, Studio, StudioStatus};
pub use error::StudioError;
pub use providers::{
    default_generator_registry, ContentPart, DryrunProvider, GeminiProvider, ImageGenerator,
    ImageGeneratorRegistry,
};
