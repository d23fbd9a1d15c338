//! Types shared between the writers and the exporters.
pub mod trace;

pub use crate::error::ExportError;
