// SPDX-License-Identifier: Apache-2.0
//! Session ingestion: parses on-disk agent transcripts into the normalized
//! data model, indexes them for cheap re-reads, and scans transcript roots
//! for projects.

pub mod error;
pub mod index;
pub mod metadata;
pub mod reader;
pub mod scanner;
pub mod transcript;

pub use error::TranscriptError;
pub use index::SessionIndex;
pub use metadata::SessionMetadataStore;
pub use reader::{Session, SessionReader};
pub use scanner::ProjectScanner;
pub use transcript::AgentFamily;
