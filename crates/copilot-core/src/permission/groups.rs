//! Tool capability groups and the canonicalized-name → group mapping.
//!
//! Mirrors the shape of the teacher's `tools::profiles::ToolGroup`
//! (static `tools()` arrays, `from_tool_name` lookup, `Display`/`FromStr`),
//! generalized to the six groups `spec.md` §3 names. Unlike the teacher's
//! `ToolProfile::is_tool_allowed`, an unknown tool name here maps to the
//! safest fallback group rather than being auto-allowed — the teacher's own
//! test `test_unknown_tool_allowed_by_default` documents the opposite
//! default ("backwards compatibility for custom tools"), which is exactly
//! the behavior this crate's invariant forbids.

use serde::{Deserialize, Serialize};

/// A coarse permission bucket assigned to every tool; the unit of user
/// policy (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolGroup {
    Screen,
    Files,
    System,
    Web,
    MemoryRead,
    MemoryWrite,
}

/// The group an unknown tool name falls back to. Must be a group that
/// prompts by default rather than one that is ever implicitly trusted.
pub const FALLBACK_GROUP: ToolGroup = ToolGroup::System;

impl ToolGroup {
    /// Tool names known to belong to this group, already canonicalized
    /// (lowercase, `_` separators).
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            ToolGroup::Screen => &["screen_capture", "screen_read", "screenshot"],
            ToolGroup::Files => &["file_read", "file_write", "file_list", "file_delete"],
            ToolGroup::System => &["shell", "process_spawn", "process_kill", "system_info"],
            ToolGroup::Web => &["web_search", "web_fetch", "web_request"],
            ToolGroup::MemoryRead => &["memory_recall", "memory_retrieve"],
            ToolGroup::MemoryWrite => &["memory_store", "memory_forget"],
        }
    }

    /// All six groups, in a stable order.
    pub fn all() -> &'static [ToolGroup] {
        &[
            ToolGroup::Screen,
            ToolGroup::Files,
            ToolGroup::System,
            ToolGroup::Web,
            ToolGroup::MemoryRead,
            ToolGroup::MemoryWrite,
        ]
    }

    /// True for the four "dangerous" groups the developer override applies
    /// to (`spec.md` §3: "applied only to the first four (dangerous)
    /// groups").
    pub fn is_dangerous(&self) -> bool {
        matches!(
            self,
            ToolGroup::Screen | ToolGroup::Files | ToolGroup::System | ToolGroup::Web
        )
    }

    /// True for either memory group.
    pub fn is_memory(&self) -> bool {
        matches!(self, ToolGroup::MemoryRead | ToolGroup::MemoryWrite)
    }
}

impl std::fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolGroup::Screen => "screen",
            ToolGroup::Files => "files",
            ToolGroup::System => "system",
            ToolGroup::Web => "web",
            ToolGroup::MemoryRead => "memoryRead",
            ToolGroup::MemoryWrite => "memoryWrite",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ToolGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" => Ok(ToolGroup::Screen),
            "files" => Ok(ToolGroup::Files),
            "system" => Ok(ToolGroup::System),
            "web" => Ok(ToolGroup::Web),
            "memoryRead" => Ok(ToolGroup::MemoryRead),
            "memoryWrite" => Ok(ToolGroup::MemoryWrite),
            _ => Err(format!("unknown tool group: {s}")),
        }
    }
}

/// Canonicalize a raw tool name the way the tool server advertises it:
/// lowercase, with `-`/` ` normalized to `_`.
pub fn canonicalize_tool_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
}

/// Static function from a canonicalized tool name to its group
/// (`spec.md` §3's `ToolGroupMapping`). Every tool maps to exactly one
/// group; an unknown tool falls back to [`FALLBACK_GROUP`].
pub struct ToolGroupMapping;

impl ToolGroupMapping {
    /// Resolve the group for a (possibly non-canonical) tool name.
    pub fn resolve(raw_tool_name: &str) -> ToolGroup {
        let canonical = canonicalize_tool_name(raw_tool_name);
        for group in ToolGroup::all() {
            if group.tools().contains(&canonical.as_str()) {
                return *group;
            }
        }
        FALLBACK_GROUP
    }
}
