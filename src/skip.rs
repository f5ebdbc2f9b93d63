//! The Skip+ node specialisation: neighbourhood `N`, per-level range cache,
//! and the `linearise`/`timeout` maintenance procedures.
//!
//! Grounded line-for-line on `vaud/skip.py`'s `SkipNode.updateRanges`,
//! `SkipNode.linearise`, `SkipNode.timeout` (see DESIGN.md for the two
//! adopted Open Question resolutions: `nodesInRanges` accumulates, and
//! `high` uses `levelSucc`).

use std::collections::HashSet;

use tokio::task::JoinSet;
use tracing::warn;

use crate::bitstring::RS_BIT_LENGTH;
use crate::node::Extension;
use crate::range::{longest_common_prefix_node, skip_range};
use crate::reference::SkipReference;
use crate::registry::MethodRegistry;
use crate::transport::Dispatcher;
use crate::wire;

/// `ranges[i]` is defined for `i ∈ [0, RS_BIT_LENGTH - 1)` (spec.md §3).
const NUM_LEVELS: usize = RS_BIT_LENGTH - 1;

pub struct SkipState {
    reference: SkipReference,
    n: HashSet<SkipReference>,
    ranges: Vec<HashSet<SkipReference>>,
    nodes_in_ranges: HashSet<SkipReference>,
    dispatcher: Dispatcher,
    /// Fire-and-forget delegated `linearise` calls spawned by
    /// `delegate_linearise`, tracked so `shutdown` can cancel whatever is
    /// still outstanding (spec.md §5: "Shutdown cancels outstanding
    /// deferreds").
    pending: JoinSet<()>,
}

impl SkipState {
    pub fn new(reference: SkipReference, dispatcher: Dispatcher) -> Self {
        Self {
            reference,
            n: HashSet::new(),
            ranges: vec![HashSet::new(); NUM_LEVELS],
            nodes_in_ranges: HashSet::new(),
            dispatcher,
            pending: JoinSet::new(),
        }
    }

    pub fn reference(&self) -> &SkipReference {
        &self.reference
    }

    pub fn neighbours(&self) -> &HashSet<SkipReference> {
        &self.n
    }

    pub fn ranges(&self) -> &[HashSet<SkipReference>] {
        &self.ranges
    }

    /// Pure function of `(self.reference, self.n)`.
    fn update_ranges(&mut self) {
        for i in 0..NUM_LEVELS {
            self.ranges[i] = skip_range(i, &self.reference, &self.n);
        }
        self.nodes_in_ranges = self.ranges.iter().flatten().cloned().collect();
    }

    /// Step 1-2 of spec.md §4.5 `linearise`: idempotent insertion and range
    /// recompute. Steps 3-5 (the corner-case guard, pruning, and
    /// delegation) live in `prune_and_delegate` below.
    pub fn linearise(&mut self, u: SkipReference) {
        if u == self.reference || self.n.contains(&u) {
            return;
        }
        self.n.insert(u);
        self.update_ranges();
        self.prune_and_delegate();
    }

    fn prune_and_delegate(&mut self) {
        if self.nodes_in_ranges.is_empty() {
            // Corner case: no legal neighbour exists yet. Retain N rather
            // than pruning it to the empty set, which would disconnect
            // the graph.
            return;
        }
        let undesirable: Vec<SkipReference> =
            self.n.difference(&self.nodes_in_ranges).cloned().collect();
        self.n = self.nodes_in_ranges.clone();
        for w in undesirable {
            let d = longest_common_prefix_node(&w, &self.n).clone();
            self.delegate_linearise(&d, w);
        }
    }

    /// Fire-and-forget `target.linearise(arg)`, tracked in `self.pending`
    /// so `shutdown` can cancel it (spec.md §5: "Shutdown cancels
    /// outstanding deferreds"). Failures are logged and otherwise ignored
    /// — per spec.md §7, `linearise` treats every failure as edge loss,
    /// and the edge is already gone from `N` by the time this is called.
    fn delegate_linearise(&mut self, target: &SkipReference, arg: SkipReference) {
        let Ok(addr) = target.addr() else {
            warn!(?target, "linearise target has an unparsable address, skipped");
            return;
        };
        let call = self
            .dispatcher
            .call_remote::<SkipReference, ()>(addr, "linearise", arg);
        while self.pending.try_join_next().is_some() {}
        self.pending.spawn(async move {
            if let Err(err) = call.await {
                warn!(%err, "outbound linearise failed, edge dropped");
            }
        });
    }

    /// spec.md §4.5 `timeout`: for every level, linearise each side's
    /// chain and bridge the two sides. Never raises — failures of the
    /// outbound `linearise` calls are logged and swallowed inside
    /// `delegate_linearise` so the periodic firing always completes.
    fn fire_timeout(&mut self) {
        for i in 0..NUM_LEVELS {
            let range = &self.ranges[i];
            let mut left: Vec<SkipReference> = range
                .iter()
                .filter(|x| **x < self.reference)
                .cloned()
                .collect();
            left.sort(); // ascending: closest to self is last

            let mut right: Vec<SkipReference> = range
                .iter()
                .filter(|x| **x > self.reference)
                .cloned()
                .collect();
            right.sort_by(|a, b| b.cmp(a)); // descending, farthest first: closest to self is last

            self.linearise_chain(&left);
            self.linearise_chain(&right);
            self.bridge(i, &left, &right);
            self.bridge(i, &right, &left);
        }
    }

    fn linearise_chain(&mut self, side: &[SkipReference]) {
        let reference = self.reference.clone();
        for pair in side.windows(2) {
            let (target, arg) = (pair[0].clone(), pair[1].clone());
            self.delegate_linearise(&target, arg);
        }
        if let Some(closest) = side.last().cloned() {
            self.delegate_linearise(&closest, reference);
        }
    }

    /// For each `v` in `a`, if `b`'s closest-to-self element is within
    /// `v`'s skip range at this level (computed from this node's own `N`,
    /// a conservative local estimate per spec.md §9), stitch `v` to it.
    fn bridge(&mut self, level: usize, a: &[SkipReference], b: &[SkipReference]) {
        let Some(c) = b.last().cloned() else { return };
        let targets: Vec<SkipReference> = a
            .iter()
            .filter(|v| skip_range(level, v, &self.n).contains(&c))
            .cloned()
            .collect();
        for v in targets {
            self.delegate_linearise(&v, c.clone());
        }
    }
}

impl Extension for SkipState {
    fn on_timeout(&mut self) -> anyhow::Result<()> {
        self.fire_timeout();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.pending.abort_all();
    }
}

pub fn registry() -> MethodRegistry<SkipState> {
    let mut registry = MethodRegistry::new();
    registry.register("linearise", |state, args| {
        let u: SkipReference = wire::decode(&args)?;
        state.linearise(u);
        wire::encode(&())
    });
    registry.register("rs", |state, _args| wire::encode(&state.reference().rs));
    registry.register("neighbours", |state, _args| wire::encode(state.neighbours()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstring::BitString;
    use crate::registry::LocalNodes;

    /// A 16-bit reference whose leading byte is `seed`, useful for building
    /// distinctly-ordered test fixtures without deriving exact bit patterns
    /// by hand.
    fn rs(seed: u8) -> SkipReference {
        let mut bits = vec![false; RS_BIT_LENGTH];
        for (i, bit) in bits.iter_mut().take(8).enumerate() {
            *bit = (seed >> (7 - i)) & 1 != 0;
        }
        SkipReference::new("127.0.0.1", 4000, BitString::from_bits(bits))
    }

    fn state(reference: SkipReference) -> SkipState {
        SkipState::new(reference, Dispatcher::new(LocalNodes::new()))
    }

    #[test]
    fn update_ranges_is_pure_function_of_reference_and_n() {
        let mut s = state(rs(128));
        s.n.insert(rs(64));
        s.update_ranges();
        let first = s.ranges.clone();
        s.update_ranges();
        assert_eq!(s.ranges, first);
    }

    #[test]
    fn self_reference_is_never_added_to_n() {
        let self_ref = rs(10);
        let mut s = state(self_ref.clone());
        s.linearise(self_ref.clone());
        assert!(!s.n.contains(&self_ref));
        assert!(s.n.is_empty());
    }

    #[test]
    fn linearise_same_peer_twice_is_idempotent() {
        let mut s = state(rs(200));
        let peer = rs(50);
        s.linearise(peer.clone());
        let after_first = s.n.clone();
        s.linearise(peer);
        assert_eq!(s.n, after_first);
    }

    proptest::proptest! {
        #[test]
        fn linearise_is_idempotent_for_any_seed_pair(self_seed in 0u8..=255, peer_seed in 0u8..=255) {
            let mut s = state(rs(self_seed));
            let peer = rs(peer_seed);
            s.linearise(peer.clone());
            let after_first = s.n.clone();
            s.linearise(peer);
            assert_eq!(s.n, after_first);
        }
    }

    #[test]
    fn empty_nodes_in_ranges_retains_n() {
        let mut s = state(rs(1));
        s.n.insert(rs(2));
        // Simulate the corner case directly (spec.md §4.5 step 3): no
        // naturally-occurring small N reaches an empty `nodesInRanges`
        // union, since level 0's range always brackets a lone neighbour.
        // The guard is a pure one-line check, so exercise it at the field
        // level instead of deriving sixteen bits that happen to trigger it.
        s.nodes_in_ranges = HashSet::new();
        let before = s.n.clone();
        s.prune_and_delegate();
        assert_eq!(s.n, before);
    }

    #[tokio::test]
    async fn undesirable_neighbour_delegation_does_not_panic() {
        let mut s = state(rs(1));
        s.n.insert(rs(2));
        s.n.insert(rs(3));
        s.update_ranges();
        s.linearise(rs(250));
    }

    #[tokio::test]
    async fn on_timeout_runs_without_panicking_with_empty_state() {
        let mut s = state(rs(5));
        s.on_timeout().unwrap();
    }
}
