//! Domain models for datasquad.
//!
//! Canonical definitions for the core entities:
//! - `Turn`: one immutable entry in a request's conversation
//! - `Artifact`: generated pipeline logic or cloud IaC with provenance
//! - `PipelineSpec`: the request handed to the Architect
//! - `SquadError`: configuration, sink and serialization failures

pub mod artifact;
pub mod error;
pub mod spec;
pub mod turn;

pub use artifact::{ApprovedLogic, Artifact, ArtifactKind, TargetPlatform};
pub use error::{Result, SquadError};
pub use spec::{PipelineSpec, ScaleTier, SchemaField};
pub use turn::{Turn, TurnRole};
