//! pce Core - Foundation types, errors, configuration and events
//!
//! This crate provides the core abstractions shared by the image, namespace
//! and CLI crates.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod size;
pub mod types;

pub use config::{AbsoluteSymlinks, RuntimeConfig};
pub use error::{EnterError, Error, ExtractError, LaunchError, ProviderError, Result};
pub use events::ContainerEvent;
pub use size::ByteSize;
pub use types::{IdMapping, ImageCommand, ImageReference, ProcessId, TerminationState};
