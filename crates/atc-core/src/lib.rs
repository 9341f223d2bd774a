//! Pure surveillance and separation logic for the ATC kernel.
//!
//! This crate contains the domain models, geometry, separation math,
//! and ingest parsing, with no runtime or networking dependencies.

pub mod error;
pub mod geometry;
pub mod ingest;
pub mod models;
pub mod resolution;
pub mod rules;
pub mod separation;
pub mod track;

pub use error::AtcError;
pub use geometry::{Airspace, Position, Velocity};
pub use models::{AircraftState, AircraftStatus};
pub use resolution::{ResolutionAction, ResolutionKind};
pub use rules::SeparationRules;
pub use separation::{ViolationInfo, ViolationPrediction};
pub use track::RadarTrack;
