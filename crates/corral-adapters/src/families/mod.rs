// SPDX-License-Identifier: Apache-2.0
pub mod acp;
pub mod claude;
pub mod codex;
