//! Data models for line diffs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Line-level difference between two versions of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Path of the file
    pub path: PathBuf,
    /// Hunks in file order
    pub hunks: Vec<DiffHunk>,
    /// Statistics about the diff
    pub stats: DiffStats,
}

impl DiffResult {
    /// Returns true if the two versions differ
    pub fn has_changes(&self) -> bool {
        !self.hunks.is_empty()
    }

    /// Short `+N -M lines` summary
    pub fn summary(&self) -> String {
        format!("+{} -{} lines", self.stats.additions, self.stats.deletions)
    }
}

/// A contiguous block of changed lines with surrounding context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// Starting line number in the old text (1-based; the preceding line when `old_count` is 0)
    pub old_start: usize,
    /// Number of old lines covered by the hunk
    pub old_count: usize,
    /// Starting line number in the new text (1-based; the preceding line when `new_count` is 0)
    pub new_start: usize,
    /// Number of new lines covered by the hunk
    pub new_count: usize,
    /// Lines in this hunk
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    /// Unified diff header, e.g. `@@ -10,5 +10,7 @@`
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }

    /// Number of old lines that precede this hunk
    pub fn old_offset(&self) -> usize {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }
}

/// A single line in a diff
///
/// Line text keeps its terminator so hunks replay byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DiffLine {
    /// Context line (unchanged)
    Context(String),
    /// Added line
    Added(String),
    /// Removed line
    Removed(String),
}

impl DiffLine {
    /// Line text including its terminator, if any
    pub fn text(&self) -> &str {
        match self {
            DiffLine::Context(text) | DiffLine::Added(text) | DiffLine::Removed(text) => text,
        }
    }
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = match self {
            DiffLine::Context(_) => ' ',
            DiffLine::Added(_) => '+',
            DiffLine::Removed(_) => '-',
        };
        write!(f, "{} {}", marker, self.text().trim_end_matches(['\n', '\r']))
    }
}

/// Statistics about a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Number of lines added
    pub additions: usize,
    /// Number of lines removed
    pub deletions: usize,
}
