//! # mast-model
//!
//! The addressable configuration model for the mast kernel.
//!
//! ## Design Principles
//!
//! - A [`PathAddress`] identifies at most one [`Resource`]; resolution is
//!   structural equality over the segment sequence, no wildcards
//! - Attribute values are a closed tagged union ([`ModelValue`]) with
//!   exhaustive matching at every boundary
//! - The tree itself has no behavior beyond storage; all change policy lives
//!   in the operation layer
//!
//! ## Address Format
//!
//! Addresses have a canonical string representation: `/{key}={value}` segments,
//! e.g. `/subsystem=http-management` or `/host=primary/server=one`.

mod address;
mod error;
mod tree;
mod value;

pub use address::{PathAddress, PathElement};
pub use error::ModelError;
pub use tree::{ModelTree, ModelTreeSnapshot, Resource};
pub use value::ModelValue;
