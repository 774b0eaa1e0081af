//! Line diff engine.
//!
//! Classic longest-common-subsequence diff over lines. Inputs are snapshots
//! of a single section, so the O(m·n) table is fine.

use serde::{Deserialize, Serialize};

/// Kind of a diff line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Same,
    Add,
    Remove,
}

impl LineKind {
    /// Gutter prefix used when rendering a diff as text.
    pub fn prefix(&self) -> char {
        match self {
            LineKind::Same => ' ',
            LineKind::Add => '+',
            LineKind::Remove => '-',
        }
    }
}

/// One line of a diff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub line: String,
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind.prefix(), self.line)
    }
}

/// Compute the line edit script turning `before` into `after`.
///
/// Lines are split on `\n`, so an empty input is one empty line. Ties in the
/// backtrack prefer emitting an add, which puts removals before additions in
/// forward order.
pub fn diff_lines(before: &str, after: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = before.split('\n').collect();
    let b: Vec<&str> = after.split('\n').collect();
    let (m, n) = (a.len(), b.len());

    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut out = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && a[i - 1] == b[j - 1] {
            out.push(DiffLine { kind: LineKind::Same, line: a[i - 1].to_string() });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            out.push(DiffLine { kind: LineKind::Add, line: b[j - 1].to_string() });
            j -= 1;
        } else {
            out.push(DiffLine { kind: LineKind::Remove, line: a[i - 1].to_string() });
            i -= 1;
        }
    }
    out.reverse();
    out
}

/// Check whether a diff contains any change.
pub fn has_changes(lines: &[DiffLine]) -> bool {
    lines.iter().any(|l| l.kind != LineKind::Same)
}

/// Render a diff as prefixed text lines (`+`, `-`, ` `).
pub fn render(lines: &[DiffLine]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rebuild one side of a diff: the `after` text when `side` is
/// [`LineKind::Add`], the `before` text when it is [`LineKind::Remove`].
pub fn reconstruct(lines: &[DiffLine], side: LineKind) -> String {
    lines
        .iter()
        .filter(|l| l.kind == LineKind::Same || l.kind == side)
        .map(|l| l.line.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(lines: &[DiffLine]) -> Vec<LineKind> {
        lines.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_identical_is_all_same() {
        let text = "{\n  \"title\": \"A\"\n}";
        let lines = diff_lines(text, text);
        assert_eq!(lines.len(), 3);
        assert!(!has_changes(&lines));
    }

    #[test]
    fn test_single_line_change() {
        let lines = diff_lines("a\nb\nc", "a\nx\nc");
        assert_eq!(
            kinds(&lines),
            vec![LineKind::Same, LineKind::Remove, LineKind::Add, LineKind::Same]
        );
        assert_eq!(lines[1].line, "b");
        assert_eq!(lines[2].line, "x");
    }

    #[test]
    fn test_pure_insert_and_delete() {
        assert_eq!(
            kinds(&diff_lines("a\nc", "a\nb\nc")),
            vec![LineKind::Same, LineKind::Add, LineKind::Same]
        );
        assert_eq!(
            kinds(&diff_lines("a\nb\nc", "a\nc")),
            vec![LineKind::Same, LineKind::Remove, LineKind::Same]
        );
    }

    #[test]
    fn test_empty_inputs() {
        let lines = diff_lines("", "x");
        assert_eq!(kinds(&lines), vec![LineKind::Remove, LineKind::Add]);
        assert_eq!(reconstruct(&lines, LineKind::Add), "x");
        assert_eq!(reconstruct(&lines, LineKind::Remove), "");
    }

    #[test]
    fn test_render_prefixes() {
        let rendered = render(&diff_lines("a\nb", "a\nc"));
        assert_eq!(rendered, "  a\n- b\n+ c");
    }
}
