// SPDX-License-Identifier: Apache-2.0
//! The agent supervision core: data model, Message Queue, Process driver,
//! tool-approval arbitration, Supervisor registry, Worker Queue and Event
//! Bus.

pub mod approval;
pub mod error;
pub mod event_bus;
pub mod model;
pub mod process;
pub mod queue;
pub mod supervisor;
pub mod worker_queue;

pub use error::CoreError;
pub use process::Process;
pub use supervisor::Supervisor;
