//! Rendering of model output into presentation panels
//!
//! The pipeline is pure: every call recomputes its output from the full text,
//! so rendering the same input twice yields identical markup.

pub mod blocks;
pub mod classify;
pub mod inline;
pub mod markdown;
pub mod projector;

pub use classify::classify;
pub use projector::{Annotation, ContentProjector, Presentation, ProjectionEffects};
