//! Precomputed per-tick stage graphs.
//!
//! A pipeline of depth `N` keeps `N` frame slots busy at once. The four
//! stages (Acquire, Record, Render, Present) are split into `N` contiguous
//! [`StageGroup`]s, and on every tick each slot runs exactly one group.
//!
//! With `N` slots there are `N` rotation phases. At phase `p`, group `k` is
//! run by slot `(k + N - p) mod N`:
//!
//! ```text
//! N = 4           group 0    group 1    group 2    group 3
//!                 Acquire    Record     Render     Present
//! phase 0         slot 0     slot 1     slot 2     slot 3
//! phase 1         slot 3     slot 0     slot 1     slot 2
//! phase 2         slot 2     slot 3     slot 0     slot 1
//! phase 3         slot 1     slot 2     slot 3     slot 0
//! ```
//!
//! Reading down a column, the slot that ran group `k` at phase `p` runs group
//! `k + 1` at phase `p + 1`, so a slot walks through every group once per
//! rotation. Reading across a row, every slot is doing something different.
//!
//! With fewer than four slots, stages are fused:
//!
//! ```text
//! N = 2           group 0             group 1
//!                 Acquire + Record    Render + Present
//! ```
//!
//! Graphs are data, built once from the slot count. Phase math does not
//! depend on the surface's image count, so graphs survive a rebuild.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::slot::SlotId;

/// Number of distinct pipeline stages.
pub const STAGE_COUNT: usize = 4;

/// A pipeline stage of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Acquire a presentable image.
    Acquire = 0,
    /// Record the draw list into the slot's recording resource.
    Record = 1,
    /// Submit the recording to the slot's queue.
    Render = 2,
    /// Present the rendered image.
    Present = 3,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; STAGE_COUNT] =
        [Stage::Acquire, Stage::Record, Stage::Render, Stage::Present];

    /// Dense index of the stage.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The stage that follows this one in a rotation.
    pub const fn next(self) -> Stage {
        match self {
            Stage::Acquire => Stage::Record,
            Stage::Record => Stage::Render,
            Stage::Render => Stage::Present,
            Stage::Present => Stage::Acquire,
        }
    }

    /// Lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Record => "record",
            Stage::Render => "render",
            Stage::Present => "present",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per [`Stage`], stored in a fixed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerStage<T>([T; STAGE_COUNT]);

impl<T> PerStage<T> {
    /// Build from a function of the stage.
    pub fn from_fn(mut f: impl FnMut(Stage) -> T) -> Self {
        Self(Stage::ALL.map(&mut f))
    }

    /// Iterate over `(stage, value)` pairs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &T)> {
        Stage::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Stage> for PerStage<T> {
    type Output = T;

    fn index(&self, stage: Stage) -> &T {
        &self.0[stage.index()]
    }
}

impl<T> IndexMut<Stage> for PerStage<T> {
    fn index_mut(&mut self, stage: Stage) -> &mut T {
        &mut self.0[stage.index()]
    }
}

/// A contiguous run of stages executed as one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageGroup {
    first: Stage,
    last: Stage,
}

impl StageGroup {
    fn new(first: Stage, last: Stage) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    /// First stage of the group.
    pub fn first(&self) -> Stage {
        self.first
    }

    /// Last stage of the group.
    pub fn last(&self) -> Stage {
        self.last
    }

    /// Stages of the group in order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> {
        (self.first.index()..=self.last.index()).map(|i| Stage::ALL[i])
    }

    /// Whether `stage` is part of the group.
    pub fn contains(&self, stage: Stage) -> bool {
        self.first <= stage && stage <= self.last
    }

    /// Number of fused stages.
    pub fn stage_count(&self) -> usize {
        self.last.index() - self.first.index() + 1
    }

    /// The group without its first stage, if anything is left.
    pub fn after_first(&self) -> Option<StageGroup> {
        (self.first != self.last).then(|| StageGroup::new(self.first.next(), self.last))
    }
}

/// Split the four stages into `slot_count` contiguous groups.
///
/// Leading groups absorb the remainder, so CPU-side stages fuse first:
/// `N = 3` gives `[Acquire+Record, Render, Present]`.
///
/// # Panics
///
/// Panics if `slot_count` is 0 or greater than [`STAGE_COUNT`].
pub fn stage_groups(slot_count: usize) -> Vec<StageGroup> {
    assert!(
        (1..=STAGE_COUNT).contains(&slot_count),
        "slot count must be between 1 and {STAGE_COUNT}"
    );

    let base = STAGE_COUNT / slot_count;
    let extra = STAGE_COUNT % slot_count;
    let mut groups = Vec::with_capacity(slot_count);
    let mut start = 0;
    for k in 0..slot_count {
        let len = base + usize::from(k < extra);
        groups.push(StageGroup::new(
            Stage::ALL[start],
            Stage::ALL[start + len - 1],
        ));
        start += len;
    }
    groups
}

/// One slot running one stage group during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageOp {
    /// Slot the operation is bound to.
    pub slot: SlotId,
    /// Stages the slot runs this tick.
    pub group: StageGroup,
}

/// The operations of one tick at a given rotation phase.
///
/// No two operations reference the same slot, so they may run concurrently.
/// Each operation depends on the previous tick's operation for the same
/// slot; that ordering comes from ticks being sequential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGraph {
    phase: usize,
    ops: Vec<StageOp>,
}

impl StageGraph {
    /// Rotation phase of this graph.
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Operations in group order (the acquiring operation first).
    pub fn ops(&self) -> &[StageOp] {
        &self.ops
    }

    /// The operation bound to `slot`.
    pub fn op_for_slot(&self, slot: SlotId) -> Option<&StageOp> {
        self.ops.iter().find(|op| op.slot == slot)
    }

    /// The operation whose group starts with Acquire.
    pub fn acquiring_op(&self) -> &StageOp {
        &self.ops[0]
    }
}

/// Build the `slot_count` graphs, one per phase.
///
/// # Panics
///
/// Panics if `slot_count` is 0 or greater than [`STAGE_COUNT`].
pub fn build_graphs(slot_count: usize) -> Vec<StageGraph> {
    let groups = stage_groups(slot_count);
    (0..slot_count)
        .map(|phase| StageGraph {
            phase,
            ops: groups
                .iter()
                .enumerate()
                .map(|(k, &group)| StageOp {
                    slot: SlotId::new((k + slot_count - phase) % slot_count),
                    group,
                })
                .collect(),
        })
        .collect()
}

/// Operations that bring the slots into the state phase 0 assumes.
///
/// At phase 0, slot `s` runs group `s`, so it must already have run groups
/// `0..s`. The steps replay the `N - 1` ticks that would have preceded
/// phase 0, oldest first: slot `N - 1` acquires first and is also the first
/// to present, so images are presented in the order they were acquired.
pub fn prewarm_plan(slot_count: usize) -> Vec<StageOp> {
    let groups = stage_groups(slot_count);
    let groups = groups.as_slice();
    (1..slot_count)
        .rev()
        .flat_map(|ticks_before| {
            (ticks_before..slot_count).map(move |s| StageOp {
                slot: SlotId::new(s),
                group: groups[s - ticks_before],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(groups: &[StageGroup]) -> Vec<Vec<Stage>> {
        groups.iter().map(|g| g.stages().collect()).collect()
    }

    #[test]
    fn test_stage_groups_fusion() {
        use Stage::*;
        assert_eq!(names(&stage_groups(1)), vec![vec![Acquire, Record, Render, Present]]);
        assert_eq!(
            names(&stage_groups(2)),
            vec![vec![Acquire, Record], vec![Render, Present]]
        );
        assert_eq!(
            names(&stage_groups(3)),
            vec![vec![Acquire, Record], vec![Render], vec![Present]]
        );
        assert_eq!(
            names(&stage_groups(4)),
            vec![vec![Acquire], vec![Record], vec![Render], vec![Present]]
        );
    }

    #[test]
    #[should_panic(expected = "slot count must be between 1 and 4")]
    fn test_stage_groups_rejects_five() {
        stage_groups(5);
    }

    #[test]
    fn test_aggressive_tables() {
        // Matches the hand-written four-slot schedule.
        let expected = [[0, 1, 2, 3], [3, 0, 1, 2], [2, 3, 0, 1], [1, 2, 3, 0]];
        let graphs = build_graphs(4);
        for (graph, row) in graphs.iter().zip(expected) {
            let slots: Vec<usize> = graph.ops().iter().map(|op| op.slot.index()).collect();
            assert_eq!(slots, row, "phase {}", graph.phase());
        }
    }

    #[test]
    fn test_conservative_tables() {
        let graphs = build_graphs(2);
        assert_eq!(graphs[0].acquiring_op().slot, SlotId::new(0));
        assert_eq!(graphs[0].ops()[1].slot, SlotId::new(1));
        assert_eq!(graphs[1].acquiring_op().slot, SlotId::new(1));
        assert_eq!(graphs[1].ops()[1].slot, SlotId::new(0));
    }

    #[test]
    fn test_slot_advances_one_group_per_phase() {
        for n in 1..=STAGE_COUNT {
            let graphs = build_graphs(n);
            for phase in 0..n {
                let next = &graphs[(phase + 1) % n];
                for (k, op) in graphs[phase].ops().iter().enumerate() {
                    let following = next.op_for_slot(op.slot).unwrap();
                    assert_eq!(following.group, stage_groups(n)[(k + 1) % n]);
                }
            }
        }
    }

    #[test]
    fn test_prewarm_plan() {
        let plan = prewarm_plan(4);
        let steps: Vec<(usize, Stage)> = plan
            .iter()
            .map(|op| (op.slot.index(), op.group.first()))
            .collect();
        assert_eq!(
            steps,
            vec![
                (3, Stage::Acquire),
                (2, Stage::Acquire),
                (3, Stage::Record),
                (1, Stage::Acquire),
                (2, Stage::Record),
                (3, Stage::Render),
            ]
        );

        let plan = prewarm_plan(3);
        let steps: Vec<(usize, Stage)> = plan
            .iter()
            .map(|op| (op.slot.index(), op.group.first()))
            .collect();
        assert_eq!(
            steps,
            vec![(2, Stage::Acquire), (1, Stage::Acquire), (2, Stage::Render)]
        );

        let plan = prewarm_plan(2);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].slot, SlotId::new(1));
        assert_eq!(plan[0].group.stage_count(), 2);

        assert!(prewarm_plan(1).is_empty());
    }

    #[test]
    fn test_prewarm_runs_leading_groups_in_order() {
        for n in 1..=STAGE_COUNT {
            let groups = stage_groups(n);
            let plan = prewarm_plan(n);
            for s in 0..n {
                let ran: Vec<StageGroup> = plan
                    .iter()
                    .filter(|op| op.slot.index() == s)
                    .map(|op| op.group)
                    .collect();
                assert_eq!(ran, groups[..s], "slot {s} of {n}");
            }
        }
    }

    #[test]
    fn test_prewarm_acquires_in_present_order() {
        // Phase 0 onwards presents slots N-1, N-2, ..., 0.
        for n in 2..=STAGE_COUNT {
            let acquired: Vec<usize> = prewarm_plan(n)
                .iter()
                .filter(|op| op.group.first() == Stage::Acquire)
                .map(|op| op.slot.index())
                .collect();
            let expected: Vec<usize> = (1..n).rev().collect();
            assert_eq!(acquired, expected, "{n} slots");
        }
    }

    #[test]
    fn test_after_first() {
        let groups = stage_groups(2);
        let rest = groups[0].after_first().unwrap();
        assert_eq!(rest.stages().collect::<Vec<_>>(), vec![Stage::Record]);
        assert!(stage_groups(4)[0].after_first().is_none());
        assert_eq!(stage_groups(1)[0].after_first().unwrap().stage_count(), 3);
    }

    #[test]
    fn test_per_stage_indexing() {
        let mut counts = PerStage::from_fn(|_| 0u32);
        counts[Stage::Render] += 2;
        counts[Stage::Present] += 1;
        assert_eq!(counts[Stage::Render], 2);
        let collected: Vec<_> = counts.iter().map(|(s, c)| (s, *c)).collect();
        assert_eq!(collected[0], (Stage::Acquire, 0));
        assert_eq!(collected[3], (Stage::Present, 1));
    }

    #[test]
    fn test_stage_next_wraps() {
        assert_eq!(Stage::Present.next(), Stage::Acquire);
        assert_eq!(Stage::Acquire.next(), Stage::Record);
        assert_eq!(Stage::Render.to_string(), "render");
    }
}
