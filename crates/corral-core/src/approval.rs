// SPDX-License-Identifier: Apache-2.0
//! Tool-approval arbitration — a pure function of `(mode, toolName)` with
//! no side effects, so it is trivial to test the monotonicity invariant
//! exhaustively.

use crate::model::{PermissionMode, READ_ONLY_TOOLS};

/// A non-read-only tool is classified into one of three categories the
/// arbitration table keys on; everything not otherwise named falls into
/// `EditOrWrite` (the conservative default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    ReadOnly,
    EditOrWrite,
    ArbitraryExec,
    ExitPlanMode,
    AskUserQuestion,
}

impl ToolCategory {
    pub fn classify(tool_name: &str) -> Self {
        if READ_ONLY_TOOLS.contains(&tool_name) {
            ToolCategory::ReadOnly
        } else {
            match tool_name {
                "ExitPlanMode" => ToolCategory::ExitPlanMode,
                "AskUserQuestion" => ToolCategory::AskUserQuestion,
                "Bash" | "Execute" | "Shell" => ToolCategory::ArbitraryExec,
                _ => ToolCategory::EditOrWrite,
            }
        }
    }
}

/// The two outcomes the arbitration table can produce before any live
/// approval dialogue runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Prompt,
}

/// Arbitrate per the mode × tool-category table.
///
/// Pure: does not enqueue a pending request or touch process state — callers
/// (`Process::handle_tool_approval`) own turning a `Prompt` verdict into an
/// actual pending-input round trip.
pub fn arbitrate(mode: PermissionMode, tool_name: &str) -> Verdict {
    let category = ToolCategory::classify(tool_name);
    use PermissionMode::*;
    use ToolCategory::*;
    use Verdict::*;

    match (mode, category) {
        (_, ReadOnly) => Allow,

        (BypassPermissions, _) => Allow,

        (AcceptEdits, EditOrWrite) => Allow,
        (AcceptEdits, _) => Prompt,

        (Default, _) => Prompt,
        (Plan, _) => Prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [PermissionMode; 4] = [
        PermissionMode::Plan,
        PermissionMode::Default,
        PermissionMode::AcceptEdits,
        PermissionMode::BypassPermissions,
    ];

    const ALL_TOOLS: &[&str] = &[
        "Read",
        "Glob",
        "Grep",
        "LSP",
        "WebFetch",
        "WebSearch",
        "Task",
        "TaskOutput",
        "Edit",
        "Write",
        "Bash",
        "ExitPlanMode",
        "AskUserQuestion",
    ];

    #[test]
    fn read_only_tools_always_allow() {
        for tool in READ_ONLY_TOOLS {
            for mode in ALL_MODES {
                assert_eq!(arbitrate(mode, tool), Verdict::Allow, "{tool} under {mode:?}");
            }
        }
    }

    #[test]
    fn bypass_permissions_always_allows_everything() {
        for tool in ALL_TOOLS {
            assert_eq!(arbitrate(PermissionMode::BypassPermissions, tool), Verdict::Allow);
        }
    }

    #[test]
    fn accept_edits_allows_edit_write_but_prompts_exec() {
        assert_eq!(arbitrate(PermissionMode::AcceptEdits, "Edit"), Verdict::Allow);
        assert_eq!(arbitrate(PermissionMode::AcceptEdits, "Bash"), Verdict::Prompt);
        assert_eq!(arbitrate(PermissionMode::AcceptEdits, "ExitPlanMode"), Verdict::Prompt);
        assert_eq!(arbitrate(PermissionMode::AcceptEdits, "AskUserQuestion"), Verdict::Prompt);
    }

    #[test]
    fn default_and_plan_prompt_for_everything_but_reads() {
        for mode in [PermissionMode::Default, PermissionMode::Plan] {
            for tool in ["Edit", "Bash", "ExitPlanMode", "AskUserQuestion"] {
                assert_eq!(arbitrate(mode, tool), Verdict::Prompt, "{tool} under {mode:?}");
            }
        }
    }

    /// Monotonicity invariant: if a tool auto-allows under mode M, it must
    /// auto-allow under every strictly more permissive mode.
    #[test]
    fn monotonicity_holds_across_all_declared_tools() {
        for tool in ALL_TOOLS {
            for i in 0..ALL_MODES.len() {
                for j in (i + 1)..ALL_MODES.len() {
                    let less_permissive = ALL_MODES[i];
                    let more_permissive = ALL_MODES[j];
                    assert!(less_permissive < more_permissive);
                    if arbitrate(less_permissive, tool) == Verdict::Allow {
                        assert_eq!(
                            arbitrate(more_permissive, tool),
                            Verdict::Allow,
                            "{tool} allowed under {less_permissive:?} but not {more_permissive:?}"
                        );
                    }
                }
            }
        }
    }
}
