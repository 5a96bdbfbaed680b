//! Line diffing between a baseline and a proposal.
//!
//! Uses `similar` for the edit script and for intraline hints.

use crate::domain::{Opcode, OpcodeKind};
use lazy_static::lazy_static;
use regex::Regex;
use similar::{Algorithm, ChangeTag, DiffTag, TextDiff};
use std::fmt;

const MAX_INLINE_LEN: usize = 600;
const INLINE_SIMILARITY: f32 = 0.3;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"^\s*$").expect("whitespace regex");
    static ref CVS_HEADER_RE: Regex = Regex::new(r"^# .Header:.*$").expect("cvs header regex");
}

/// Minimal edit script turning `baseline` into `proposed`.
///
/// Runs of deletions directly followed by insertions come back as a single
/// `replace`.
pub fn compute_opcodes(baseline: &[String], proposed: &[String]) -> Vec<Opcode> {
    similar::capture_diff_slices(Algorithm::Myers, baseline, proposed)
        .iter()
        .map(|op| {
            let (tag, old, new) = op.as_tag_tuple();
            let kind = match tag {
                DiffTag::Equal => OpcodeKind::Equal,
                DiffTag::Insert => OpcodeKind::Insert,
                DiffTag::Delete => OpcodeKind::Delete,
                DiffTag::Replace => OpcodeKind::Replace,
            };
            Opcode::new(kind, old, new)
        })
        .collect()
}

/// Degrades a pathological diff to a single all-or-nothing change.
///
/// A `threshold` of zero disables collapsing.
pub fn collapse_opcodes(opcodes: Vec<Opcode>, threshold: usize) -> Vec<Opcode> {
    if threshold == 0 || opcodes.len() <= threshold {
        return opcodes;
    }
    let baseline_start = opcodes.iter().map(|op| op.baseline_start).min().unwrap_or(0);
    let baseline_end = opcodes.iter().map(|op| op.baseline_end).max().unwrap_or(0);
    let proposed_start = opcodes.iter().map(|op| op.proposed_start).min().unwrap_or(0);
    let proposed_end = opcodes.iter().map(|op| op.proposed_end).max().unwrap_or(0);
    log::debug!(
        "Collapsing {} opcodes above threshold {} into one change",
        opcodes.len(),
        threshold
    );
    vec![Opcode::new(
        OpcodeKind::Replace,
        baseline_start..baseline_end,
        proposed_start..proposed_end,
    )]
}

pub fn diff_lines(baseline: &[String], proposed: &[String], threshold: usize) -> Vec<Opcode> {
    collapse_opcodes(compute_opcodes(baseline, proposed), threshold)
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn only_matching_lines(re: &Regex, baseline: &[String], proposed: &[String]) -> bool {
    baseline
        .iter()
        .chain(proposed.iter())
        .all(|line| re.is_match(strip_terminator(line)))
}

/// True if both spans consist of blank lines only.
pub fn is_whitespace_only(baseline: &[String], proposed: &[String]) -> bool {
    only_matching_lines(&WHITESPACE_RE, baseline, proposed)
}

/// True if both spans only touch a `# $Header: ... $` line.
pub fn is_cvs_header(baseline: &[String], proposed: &[String]) -> bool {
    only_matching_lines(&CVS_HEADER_RE, baseline, proposed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Context,
    Removed,
    Added,
    /// Caret markers under the changed characters of the line above.
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub tag: LineTag,
    pub text: String,
}

impl RenderedLine {
    fn new(tag: LineTag, text: &str) -> Self {
        Self {
            tag,
            text: strip_terminator(text).to_string(),
        }
    }
}

impl fmt::Display for RenderedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.tag {
            LineTag::Context => ' ',
            LineTag::Removed => '-',
            LineTag::Added => '+',
            LineTag::Hint => '?',
        };
        write!(f, "{} {}", prefix, self.text)
    }
}

fn should_do_inline(old: &str, new: &str) -> bool {
    old.len() <= MAX_INLINE_LEN && new.len() <= MAX_INLINE_LEN
}

/// Marks the characters of `line` that do not survive into `other`.
fn caret_line(line: &str, other: &str, side: ChangeTag) -> Option<String> {
    let diff = TextDiff::from_chars(line, other);
    let mut markers = String::new();
    for change in diff.iter_all_changes() {
        let marker = match change.tag() {
            ChangeTag::Equal => ' ',
            tag if tag == side => '^',
            _ => continue,
        };
        markers.extend(change.value().chars().map(|_| marker));
    }
    let markers = markers.trim_end().to_string();
    markers.contains('^').then_some(markers)
}

fn push_pair(old: &str, new: &str, out: &mut Vec<RenderedLine>) {
    let old = strip_terminator(old);
    let new = strip_terminator(new);
    let similar_enough = should_do_inline(old, new)
        && TextDiff::from_chars(old, new).ratio() > INLINE_SIMILARITY;

    out.push(RenderedLine::new(LineTag::Removed, old));
    if similar_enough && let Some(hint) = caret_line(old, new, ChangeTag::Delete) {
        out.push(RenderedLine::new(LineTag::Hint, &hint));
    }
    out.push(RenderedLine::new(LineTag::Added, new));
    if similar_enough && let Some(hint) = caret_line(new, old, ChangeTag::Delete) {
        out.push(RenderedLine::new(LineTag::Hint, &hint));
    }
}

/// Renders one change for display.
pub fn render_unified(baseline: &[String], proposed: &[String]) -> Vec<RenderedLine> {
    let mut out = Vec::new();
    for op in compute_opcodes(baseline, proposed) {
        let old = &baseline[op.baseline_range()];
        let new = &proposed[op.proposed_range()];
        match op.kind {
            OpcodeKind::Equal => {
                out.extend(old.iter().map(|l| RenderedLine::new(LineTag::Context, l)));
            }
            OpcodeKind::Delete => {
                out.extend(old.iter().map(|l| RenderedLine::new(LineTag::Removed, l)));
            }
            OpcodeKind::Insert => {
                out.extend(new.iter().map(|l| RenderedLine::new(LineTag::Added, l)));
            }
            OpcodeKind::Replace => {
                let paired = old.len().min(new.len());
                for (o, n) in old.iter().zip(new.iter()) {
                    push_pair(o, n, &mut out);
                }
                out.extend(
                    old[paired..]
                        .iter()
                        .map(|l| RenderedLine::new(LineTag::Removed, l)),
                );
                out.extend(
                    new[paired..]
                        .iter()
                        .map(|l| RenderedLine::new(LineTag::Added, l)),
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| format!("{}\n", s)).collect()
    }

    #[test]
    fn test_single_replace_scenario() {
        let opcodes = compute_opcodes(&lines(&["A", "B", "C"]), &lines(&["A", "X", "C"]));
        assert_eq!(
            opcodes,
            vec![
                Opcode::new(OpcodeKind::Equal, 0..1, 0..1),
                Opcode::new(OpcodeKind::Replace, 1..2, 1..2),
                Opcode::new(OpcodeKind::Equal, 2..3, 2..3),
            ]
        );
    }

    #[test]
    fn test_opcodes_partition_both_sides() {
        let baseline = lines(&["a", "b", "c", "d", "e", "f"]);
        let proposed = lines(&["a", "c", "x", "d", "y", "f", "g"]);
        let opcodes = compute_opcodes(&baseline, &proposed);

        let mut b = 0;
        let mut p = 0;
        for op in &opcodes {
            assert_eq!(op.baseline_start, b);
            assert_eq!(op.proposed_start, p);
            b = op.baseline_end;
            p = op.proposed_end;
        }
        assert_eq!(b, baseline.len());
        assert_eq!(p, proposed.len());
    }

    #[test]
    fn test_empty_baseline_is_pure_insert() {
        let opcodes = compute_opcodes(&[], &lines(&["new"]));
        assert_eq!(opcodes, vec![Opcode::new(OpcodeKind::Insert, 0..0, 0..1)]);
        assert!(compute_opcodes(&[], &[]).is_empty());
    }

    #[test]
    fn test_collapse_above_threshold() {
        let baseline = lines(&["a", "1", "b", "2", "c", "3", "d"]);
        let proposed = lines(&["a", "x", "b", "y", "c", "z", "d", "e"]);
        let opcodes = compute_opcodes(&baseline, &proposed);
        assert!(opcodes.len() > 3);

        let collapsed = collapse_opcodes(opcodes.clone(), 3);
        assert_eq!(
            collapsed,
            vec![Opcode::new(OpcodeKind::Replace, 0..7, 0..8)]
        );
        assert_eq!(collapse_opcodes(opcodes.clone(), 0), opcodes);
        assert_eq!(collapse_opcodes(opcodes.clone(), 100), opcodes);
    }

    #[test]
    fn test_whitespace_classification() {
        assert!(is_whitespace_only(&lines(&["", "  "]), &lines(&["\t"])));
        assert!(is_whitespace_only(&[], &lines(&[""])));
        assert!(!is_whitespace_only(&lines(&[""]), &lines(&["x"])));
    }

    #[test]
    fn test_cvs_header_classification() {
        assert!(is_cvs_header(
            &lines(&["# $Header: /var/cvsroot/foo,v 1.1 $"]),
            &lines(&["# $Header: /var/cvsroot/foo,v 1.2 $"])
        ));
        assert!(is_cvs_header(
            &lines(&["#  Header: dkljdfskjjkd"]),
            &lines(&["#  Header: fdskjkljfsdkjdsfkkj"])
        ));
        assert!(!is_cvs_header(
            &lines(&["# $Header: x $"]),
            &lines(&["# $Header: y $", "option=1"])
        ));
    }

    #[test]
    fn test_render_marks_changed_characters() {
        let rendered = render_unified(&lines(&["3 testtesttest"]), &lines(&["3 testte---sttest"]));
        let tags: Vec<LineTag> = rendered.iter().map(|l| l.tag).collect();
        assert_eq!(tags, vec![LineTag::Removed, LineTag::Added, LineTag::Hint]);
        assert_eq!(rendered[1].text, "3 testte---sttest");
        assert_eq!(rendered[2].text.trim(), "^^^");
        assert_eq!(rendered[0].to_string(), "- 3 testtesttest");
    }

    #[test]
    fn test_render_unpaired_lines() {
        let rendered = render_unified(&lines(&["keep", "gone"]), &lines(&["keep"]));
        assert_eq!(rendered[0].tag, LineTag::Context);
        assert_eq!(rendered[1].tag, LineTag::Removed);
        assert_eq!(rendered[1].text, "gone");
    }
}
