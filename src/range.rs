//! The Skip+ range algebra: `pred`, `succ`, `levelPred`, `levelSucc`, `low`,
//! `high`, `skipRange`, `longestCommonPrefixNode`.
//!
//! Transliterated function-by-function from `vaud/skip.py` (see DESIGN.md),
//! operating over `SkipReference` and the `Bound` sentinel wrapper instead
//! of Python's `PseudoNodeReference`.

use std::collections::HashSet;

use crate::reference::{Bound, SkipReference};

/// `pred(v, W) = max({w ∈ W : w < v} ∪ {LOWEST})`.
pub fn pred(v: &SkipReference, w: &HashSet<SkipReference>) -> Bound<SkipReference> {
    w.iter()
        .filter(|candidate| *candidate < v)
        .cloned()
        .map(Bound::Between)
        .max()
        .unwrap_or(Bound::Lowest)
}

/// `succ(v, W) = min({w ∈ W : w > v} ∪ {HIGHEST})`.
pub fn succ(v: &SkipReference, w: &HashSet<SkipReference>) -> Bound<SkipReference> {
    w.iter()
        .filter(|candidate| *candidate > v)
        .cloned()
        .map(Bound::Between)
        .min()
        .unwrap_or(Bound::Highest)
}

/// `{w ∈ N : prefix(i+1, w) = prefix(i, v) ∘ x}`.
fn level_nodes(
    i: usize,
    v: &SkipReference,
    x: bool,
    n: &HashSet<SkipReference>,
) -> HashSet<SkipReference> {
    let target = v.prefix(i).append(x);
    n.iter()
        .filter(|w| w.prefix(i + 1) == target)
        .cloned()
        .collect()
}

/// `levelPred(i, v, x, N) = pred(v, {w ∈ N : prefix(i+1, w) = prefix(i, v) ∘ x})`.
pub fn level_pred(
    i: usize,
    v: &SkipReference,
    x: bool,
    n: &HashSet<SkipReference>,
) -> Bound<SkipReference> {
    pred(v, &level_nodes(i, v, x, n))
}

/// `levelSucc(i, v, x, N) = succ(v, {w ∈ N : prefix(i+1, w) = prefix(i, v) ∘ x})`.
pub fn level_succ(
    i: usize,
    v: &SkipReference,
    x: bool,
    n: &HashSet<SkipReference>,
) -> Bound<SkipReference> {
    succ(v, &level_nodes(i, v, x, n))
}

/// `low(i, v, N) = min(levelPred(i, v, false, N), levelPred(i, v, true, N))`.
pub fn low(i: usize, v: &SkipReference, n: &HashSet<SkipReference>) -> Bound<SkipReference> {
    level_pred(i, v, false, n).min(level_pred(i, v, true, n))
}

/// `high(i, v, N) = max(levelSucc(i, v, false, N), levelSucc(i, v, true, N))`.
///
/// spec.md §9 / Design Notes: the source's docstring says `levelPred`, the
/// source's implementation uses `levelSucc`; the implementation is adopted.
pub fn high(i: usize, v: &SkipReference, n: &HashSet<SkipReference>) -> Bound<SkipReference> {
    level_succ(i, v, false, n).max(level_succ(i, v, true, n))
}

/// `skipRange(i, v, N) = {w ∈ N : prefix(i, w) = prefix(i, v) ∧ low(i,v,N) ≤ w ≤ high(i,v,N)}`.
pub fn skip_range(i: usize, v: &SkipReference, n: &HashSet<SkipReference>) -> HashSet<SkipReference> {
    let v_prefix = v.prefix(i);
    let l = low(i, v, n);
    let h = high(i, v, n);
    n.iter()
        .filter(|w| {
            w.prefix(i) == v_prefix
                && l <= Bound::Between((*w).clone())
                && Bound::Between((*w).clone()) <= h
        })
        .cloned()
        .collect()
}

/// The `x ∈ W` maximising `commonPrefixLength(x.rs, w.rs)`; ties broken by
/// order on `rs`.
///
/// Panics if `w_candidates` is empty — callers only invoke this on the
/// (non-empty, by construction of `linearise`) set `N` after an insertion.
pub fn longest_common_prefix_node<'a>(
    w: &SkipReference,
    w_candidates: impl IntoIterator<Item = &'a SkipReference>,
) -> &'a SkipReference {
    w_candidates
        .into_iter()
        .max_by_key(|x| (x.rs.common_prefix_length(&w.rs), x.rs.clone()))
        .expect("longestCommonPrefixNode requires a non-empty candidate set")
}
