//! Minimal unified diff for the comparison log.
//!
//! Diff output is diagnostic only (it never reaches the report or perfdata),
//! so this favors simplicity: common prefix and suffix are trimmed, the
//! middle is aligned with a longest-common-subsequence table, and inputs too
//! large for the table degrade to a single replacement hunk.

use std::fmt::Write as _;

/// Cap on the LCS table size (cells). Content is already bounded by the
/// 1 MiB load cap, so this only guards pathological line counts.
const LCS_CELL_LIMIT: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit<'a> {
    Keep(&'a str),
    Del(&'a str),
    Ins(&'a str),
}

/// Renders a unified diff of `old` against `new` with `context` lines of
/// context per hunk. Returns an empty string when the line sequences are
/// identical.
#[must_use]
pub fn unified_diff(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    context: usize,
) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let edits = diff_lines(&old_lines, &new_lines);
    render(&edits, old_label, new_label, context)
}

fn diff_lines<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mid_old = &old[prefix..old.len() - suffix];
    let mid_new = &new[prefix..new.len() - suffix];

    let mut edits: Vec<Edit<'a>> = Vec::with_capacity(old.len() + new.len());
    edits.extend(old[..prefix].iter().map(|l| Edit::Keep(l)));
    if (mid_old.len() + 1).saturating_mul(mid_new.len() + 1) <= LCS_CELL_LIMIT {
        lcs_edits(mid_old, mid_new, &mut edits);
    } else {
        edits.extend(mid_old.iter().map(|l| Edit::Del(l)));
        edits.extend(mid_new.iter().map(|l| Edit::Ins(l)));
    }
    edits.extend(old[old.len() - suffix..].iter().map(|l| Edit::Keep(l)));
    edits
}

/// Aligns two line slices via an LCS length table over suffixes.
fn lcs_edits<'a>(old: &[&'a str], new: &[&'a str], edits: &mut Vec<Edit<'a>>) {
    let m = old.len();
    let n = new.len();
    // table[i][j] = LCS length of old[i..] and new[j..], flattened.
    let width = n + 1;
    let mut table = vec![0u32; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old[i] == new[j] {
            edits.push(Edit::Keep(old[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            edits.push(Edit::Del(old[i]));
            i += 1;
        } else {
            edits.push(Edit::Ins(new[j]));
            j += 1;
        }
    }
    edits.extend(old[i..].iter().map(|l| Edit::Del(l)));
    edits.extend(new[j..].iter().map(|l| Edit::Ins(l)));
}

fn render(edits: &[Edit<'_>], old_label: &str, new_label: &str, context: usize) -> String {
    let changed: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Edit::Keep(_)))
        .map(|(idx, _)| idx)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    // Lines of each side consumed before edit index i.
    let mut old_before = Vec::with_capacity(edits.len() + 1);
    let mut new_before = Vec::with_capacity(edits.len() + 1);
    let (mut old_count, mut new_count) = (0usize, 0usize);
    for edit in edits {
        old_before.push(old_count);
        new_before.push(new_count);
        match edit {
            Edit::Keep(_) => {
                old_count += 1;
                new_count += 1;
            }
            Edit::Del(_) => old_count += 1,
            Edit::Ins(_) => new_count += 1,
        }
    }
    old_before.push(old_count);
    new_before.push(new_count);

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    let mut cluster_start = 0;
    while cluster_start < changed.len() {
        // Merge changes whose context windows touch into one hunk.
        let mut cluster_end = cluster_start;
        while cluster_end + 1 < changed.len()
            && changed[cluster_end + 1] - changed[cluster_end] <= 2 * context
        {
            cluster_end += 1;
        }

        let first = changed[cluster_start].saturating_sub(context);
        let last = (changed[cluster_end] + context + 1).min(edits.len());

        let old_len = old_before[last] - old_before[first];
        let new_len = new_before[last] - new_before[first];
        let old_start = if old_len == 0 { old_before[first] } else { old_before[first] + 1 };
        let new_start = if new_len == 0 { new_before[first] } else { new_before[first] + 1 };
        let _ = writeln!(out, "@@ -{old_start},{old_len} +{new_start},{new_len} @@");
        for edit in &edits[first..last] {
            let (sign, line) = match edit {
                Edit::Keep(l) => (' ', l),
                Edit::Del(l) => ('-', l),
                Edit::Ins(l) => ('+', l),
            };
            let _ = writeln!(out, "{sign}{line}");
        }

        cluster_start = cluster_end + 1;
    }
    out
}
