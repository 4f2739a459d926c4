//! # crosswind-base
//!
//! Structural atoms shared by every crosswind crate:
//!
//! - [`Interner`]/[`Sym`] — string interning for O(1) equality
//! - [`SrcLoc`] — file/line source locations
//! - [`CompileError`]/[`Result`] — located errors with a phase taxonomy
//!
//! This crate knows nothing about the crosswind language itself and does
//! no I/O. Higher-level crates (the frontend, the driver) build on these
//! pieces.

pub mod error;
pub mod intern;
pub mod srcloc;

pub use error::{CompileError, ErrorKind, Result};
pub use intern::{Interner, Sym};
pub use srcloc::SrcLoc;
