//! Marker/alphabet primitives and the linearised population reference graph.
//!
//! This crate owns the PRG data model (§3): the marker alphabet, the validated
//! [`linear::LinearPrg`] sequence, and the human-readable bracket [`grammar`]
//! used to author small PRGs by hand in tests and fixtures.

pub mod alphabet;
pub mod error;
pub mod grammar;
pub mod linear;

pub use alphabet::{Marker, MarkerKind, FIRST_VARIANT_MARKER};
pub use error::MalformedPrgError;
pub use linear::{Endianness, LinearPrg};
