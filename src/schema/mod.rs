//! Schema subsystem
//!
//! Static knowledge about the domain tables: which models exist, which
//! columns they carry, and how tables join to one another. Anything that
//! needs live data goes through a [`Directory`].
//!
//! # Design Principles
//!
//! - Table and column metadata is static
//! - Join conditions come from an explicit directed-edge table
//! - Unknown joins are programming errors, never user errors

mod directory;
mod joins;
mod models;

pub use directory::{Directory, MemDirectory, NameRecord, SqlDirectory, UNKNOWN_NAME};
pub use joins::{strip_alias, JoinColumn, JoinError, JoinGraph, JoinTree, ResolvedJoin};
pub use models::ModelKind;
