//! Line diffs between two versions of a file
//!
//! Lines are matched with `similar`'s LCS algorithm, so ties resolve
//! towards matching earlier old lines and removals come before additions
//! inside a changed block.

use std::path::PathBuf;

use similar::{Algorithm, ChangeTag, DiffOp, DiffTag, TextDiff};

use crate::error::FileError;
use crate::models::{DiffHunk, DiffLine, DiffResult, DiffStats};

/// Lines of unchanged context kept around each hunk
const CONTEXT_LINES: usize = 3;

/// Generates and replays line diffs
#[derive(Debug, Clone, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Creates a new DiffEngine instance
    pub fn new() -> Self {
        Self
    }

    /// Diffs two texts without a path
    pub fn diff(&self, old: &str, new: &str) -> DiffResult {
        self.diff_file(PathBuf::new(), old, new)
    }

    /// Diffs two versions of the file at `path`
    ///
    /// Identical inputs (including two empty strings) yield no hunks.
    pub fn diff_file(&self, path: impl Into<PathBuf>, old: &str, new: &str) -> DiffResult {
        let text_diff = TextDiff::configure()
            .algorithm(Algorithm::Lcs)
            .diff_lines(old, new);

        let hunks = text_diff
            .grouped_ops(CONTEXT_LINES)
            .iter()
            .filter(|group| group.iter().any(|op| op.tag() != DiffTag::Equal))
            .map(|group| build_hunk(&text_diff, group))
            .collect();

        let mut stats = DiffStats::default();
        for change in text_diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => stats.additions += 1,
                ChangeTag::Delete => stats.deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        DiffResult {
            path: path.into(),
            hunks,
            stats,
        }
    }

    /// Replays a diff against `old`, reproducing the new text
    ///
    /// # Errors
    ///
    /// Returns `FileError::DiffError` if the hunks do not line up with `old`.
    pub fn apply(&self, old: &str, diff: &DiffResult) -> Result<String, FileError> {
        let lines = split_lines(old);
        let mut result = String::with_capacity(old.len());
        let mut cursor = 0;

        for hunk in &diff.hunks {
            let start = hunk.old_offset();
            if start < cursor || start > lines.len() {
                return Err(FileError::DiffError(format!(
                    "hunk {} does not fit the source ({} lines, cursor at {})",
                    hunk.header(),
                    lines.len(),
                    cursor
                )));
            }

            for line in &lines[cursor..start] {
                result.push_str(line);
            }
            cursor = start;

            for line in &hunk.lines {
                match line {
                    DiffLine::Context(text) | DiffLine::Removed(text) => {
                        if lines.get(cursor) != Some(&text.as_str()) {
                            return Err(FileError::DiffError(format!(
                                "hunk {} expected {:?} at line {}",
                                hunk.header(),
                                text,
                                cursor + 1
                            )));
                        }
                        if matches!(line, DiffLine::Context(_)) {
                            result.push_str(text);
                        }
                        cursor += 1;
                    }
                    DiffLine::Added(text) => result.push_str(text),
                }
            }
        }

        for line in &lines[cursor..] {
            result.push_str(line);
        }

        Ok(result)
    }
}

/// Splits text into lines, keeping each line's terminator
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Turns one group of grouped ops into a hunk
fn build_hunk<'old, 'new, 'bufs>(
    text_diff: &TextDiff<'old, 'new, 'bufs, str>,
    group: &[DiffOp],
) -> DiffHunk {
    let mut lines = Vec::new();
    for op in group {
        for change in text_diff.iter_changes(op) {
            let text = change.value().to_string();
            lines.push(match change.tag() {
                ChangeTag::Equal => DiffLine::Context(text),
                ChangeTag::Delete => DiffLine::Removed(text),
                ChangeTag::Insert => DiffLine::Added(text),
            });
        }
    }

    let old_start = group.first().map_or(0, |op| op.old_range().start);
    let new_start = group.first().map_or(0, |op| op.new_range().start);
    let old_count = group.last().map_or(old_start, |op| op.old_range().end) - old_start;
    let new_count = group.last().map_or(new_start, |op| op.new_range().end) - new_start;

    DiffHunk {
        old_start: if old_count == 0 { old_start } else { old_start + 1 },
        old_count,
        new_start: if new_count == 0 { new_start } else { new_start + 1 },
        new_count,
        lines,
    }
}
