// SPDX-License-Identifier: Apache-2.0
//! Agent Adapter contract, registry, and illustrative family implementations.

pub mod adapter;
pub mod error;
pub mod families;
pub mod registry;
pub mod session;
pub mod subprocess;

pub use adapter::{AdapterSession, AgentAdapter, StartOptions};
pub use error::AdapterError;
pub use registry::AdapterRegistry;
pub use session::start_session;
