//! Shared types for the sedge regular expression engine.
//!
//! This crate holds everything the compiler, the study optimizer, and the
//! matcher agree on:
//!
//! - [`CharTables`] — the locale-derived character tables
//! - [`op`] — opcode values and code-stream helpers
//! - [`CompiledPattern`] — the immutable compiled block
//! - [`ExtraInfo`] — optional study output
//! - [`Options`], [`ExecOptions`], [`StudyOptions`] — option bit sets
//! - [`CompileError`], [`ExecError`], [`StudyError`] — error types
//! - [`debug`] — a code-stream disassembler for tests and diagnostics

pub mod debug;
pub mod error;
pub mod extra;
pub mod op;
pub mod options;
pub mod pattern;
pub mod tables;

pub use error::{CompileError, CompileErrorKind, ExecError, StudyError};
pub use extra::ExtraInfo;
pub use options::{ExecOptions, Options, StudyOptions};
pub use pattern::{CompiledPattern, FirstChar, MAGIC, MAX_PATTERN_SIZE};
pub use tables::CharTables;
