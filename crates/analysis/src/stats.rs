//! Per-branch execution statistics
//!
//! Aggregation is a single pass over the entry stream into two counters per
//! branch. Counter sets over disjoint parts of a stream can be merged in
//! any order, so a caller may split the work and combine the results.

use crate::error::TraceResult;
use crate::reader::TraceFile;
use brtrace_core::{Branch, BranchType, Entry};
use serde::Serialize;
use tracing::debug;

/// Execution and taken counts per branch index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchCounters {
    executions: Vec<u64>,
    taken: Vec<u64>,
}

impl BranchCounters {
    /// Zeroed counters for `num_branches` branches
    pub fn new(num_branches: usize) -> Self {
        BranchCounters {
            executions: vec![0; num_branches],
            taken: vec![0; num_branches],
        }
    }

    /// Count one entry, growing the counter arrays if needed
    pub fn record(&mut self, entry: Entry) {
        let index = entry.branch_index() as usize;
        if index >= self.executions.len() {
            self.executions.resize(index + 1, 0);
            self.taken.resize(index + 1, 0);
        }
        self.executions[index] += 1;
        if entry.taken() {
            self.taken[index] += 1;
        }
    }

    /// Add `other`'s counts into these
    pub fn merge(&mut self, other: &BranchCounters) {
        if other.executions.len() > self.executions.len() {
            self.executions.resize(other.executions.len(), 0);
            self.taken.resize(other.taken.len(), 0);
        }
        for (mine, theirs) in self.executions.iter_mut().zip(&other.executions) {
            *mine += theirs;
        }
        for (mine, theirs) in self.taken.iter_mut().zip(&other.taken) {
            *mine += theirs;
        }
    }

    /// Executions of branch `index`
    pub fn execution_count(&self, index: usize) -> u64 {
        self.executions.get(index).copied().unwrap_or(0)
    }

    /// Taken executions of branch `index`
    pub fn taken_count(&self, index: usize) -> u64 {
        self.taken.get(index).copied().unwrap_or(0)
    }

    /// Sum of all executions
    pub fn total_entries(&self) -> u64 {
        self.executions.iter().sum()
    }
}

/// Dynamic totals for one branch type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    /// Branch type
    pub branch_type: BranchType,
    /// Executions of branches of this type
    pub executions: u64,
    /// Taken executions
    pub taken: u64,
}

/// One row of the ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchStats {
    /// Index in the branch table
    pub index: u32,
    /// The branch
    pub branch: Branch,
    /// Times executed
    pub execution_count: u64,
    /// Times taken
    pub taken_count: u64,
}

impl BranchStats {
    /// Taken executions as a percentage of all executions
    pub fn taken_percent(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        self.taken_count as f64 * 100.0 / self.execution_count as f64
    }
}

/// Aggregate statistics of a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Entries counted
    pub total_entries: u64,
    /// Totals for every branch type, in tag order
    pub per_type: Vec<TypeTotals>,
    /// Executed branches by descending execution count, ties by ascending index
    pub ranked: Vec<BranchStats>,
}

impl Report {
    /// Build a report from `counters` over `branches` (indexed by position)
    ///
    /// Counters for indices past the end of `branches` are ignored.
    pub fn from_counters<I>(branches: I, counters: &BranchCounters) -> Self
    where
        I: IntoIterator<Item = Branch>,
    {
        let mut per_type: Vec<TypeTotals> = BranchType::ALL
            .iter()
            .map(|&branch_type| TypeTotals {
                branch_type,
                executions: 0,
                taken: 0,
            })
            .collect();
        let mut ranked = Vec::new();

        for (index, branch) in branches.into_iter().enumerate() {
            let execution_count = counters.execution_count(index);
            if execution_count == 0 {
                continue;
            }
            let taken_count = counters.taken_count(index);
            let totals = &mut per_type[branch.branch_type.index()];
            totals.executions += execution_count;
            totals.taken += taken_count;
            ranked.push(BranchStats {
                index: index as u32,
                branch,
                execution_count,
                taken_count,
            });
        }

        ranked.sort_by(|a, b| {
            b.execution_count
                .cmp(&a.execution_count)
                .then(a.index.cmp(&b.index))
        });

        Report {
            total_entries: per_type.iter().map(|t| t.executions).sum(),
            per_type,
            ranked,
        }
    }

    /// The `k` most executed branches
    pub fn top(&self, k: usize) -> &[BranchStats] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    /// Totals for `branch_type`
    pub fn type_totals(&self, branch_type: BranchType) -> TypeTotals {
        self.per_type[branch_type.index()]
    }

    /// Branches executed at least once
    pub fn executed_branches(&self) -> usize {
        self.ranked.len()
    }
}

/// Computes reports from trace files
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsEngine;

impl StatsEngine {
    /// Count every entry of `trace`
    ///
    /// Fails on the first invalid entry; no partial counts are returned.
    pub fn count(trace: &TraceFile) -> TraceResult<BranchCounters> {
        Self::count_with(trace, |_| {})
    }

    /// Count every entry, handing each one to `visit` as well
    ///
    /// Lets extra per-entry passes (instruction counting, progress) share
    /// the single decompression of the entry stream.
    pub fn count_with<F>(trace: &TraceFile, mut visit: F) -> TraceResult<BranchCounters>
    where
        F: FnMut(Entry),
    {
        let mut counters = BranchCounters::new(trace.branches().len());
        for entry in trace.entries()? {
            let entry = entry?;
            counters.record(entry);
            visit(entry);
        }
        debug!(
            total_entries = counters.total_entries(),
            "Counted trace entries"
        );
        Ok(counters)
    }

    /// Count and rank in one go
    pub fn aggregate(trace: &TraceFile) -> TraceResult<Report> {
        let counters = Self::count(trace)?;
        Ok(Report::from_counters(trace.branches().iter(), &counters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(addr: u64, branch_type: BranchType) -> Branch {
        Branch::new(addr, addr + 0x40, 2, branch_type)
    }

    fn counters_for(counts: &[(u32, u64, u64)]) -> BranchCounters {
        let mut c = BranchCounters::default();
        for &(index, execs, taken) in counts {
            for i in 0..execs {
                c.record(Entry::new(index, i < taken).unwrap());
            }
        }
        c
    }

    #[test]
    fn test_ranking_order_and_ties() {
        let branches = vec![
            branch(0x10, BranchType::ConditionalDirectJump),
            branch(0x20, BranchType::ConditionalDirectJump),
            branch(0x30, BranchType::DirectCall),
            branch(0x40, BranchType::Return),
        ];
        // index 3 ties index 1 at five executions
        let counters = counters_for(&[(0, 1, 1), (1, 5, 2), (2, 10, 10), (3, 5, 5)]);

        let report = Report::from_counters(branches, &counters);
        let order: Vec<u32> = report.ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![2, 1, 3, 0]);
        assert_eq!(report.total_entries, 21);
        assert_eq!(report.top(2).len(), 2);
        assert_eq!(report.top(100).len(), 4);
    }

    #[test]
    fn test_type_totals() {
        let branches = vec![
            branch(0x10, BranchType::ConditionalDirectJump),
            branch(0x20, BranchType::ConditionalDirectJump),
            branch(0x30, BranchType::IndirectJump),
        ];
        let counters = counters_for(&[(0, 4, 1), (1, 6, 3), (2, 2, 2)]);
        let report = Report::from_counters(branches, &counters);

        let cond = report.type_totals(BranchType::ConditionalDirectJump);
        assert_eq!((cond.executions, cond.taken), (10, 4));
        let ind = report.type_totals(BranchType::IndirectJump);
        assert_eq!((ind.executions, ind.taken), (2, 2));
        assert_eq!(report.type_totals(BranchType::Return).executions, 0);
        assert_eq!(report.per_type.len(), BranchType::COUNT);
    }

    #[test]
    fn test_unexecuted_branches_not_ranked() {
        let branches = vec![branch(0x10, BranchType::DirectJump), branch(0x20, BranchType::DirectJump)];
        let counters = counters_for(&[(1, 3, 3)]);
        let report = Report::from_counters(branches, &counters);
        assert_eq!(report.executed_branches(), 1);
        assert_eq!(report.ranked[0].index, 1);
    }

    #[test]
    fn test_taken_percent() {
        let row = BranchStats {
            index: 0,
            branch: branch(0, BranchType::ConditionalDirectJump),
            execution_count: 8,
            taken_count: 2,
        };
        assert_eq!(row.taken_percent(), 25.0);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let entries: Vec<Entry> = (0..1000u32)
            .map(|i| Entry::new((i * 7) % 11, i % 3 == 0).unwrap())
            .collect();

        let mut whole = BranchCounters::new(11);
        entries.iter().for_each(|e| whole.record(*e));

        let (left, right) = entries.split_at(377);
        let mut a = BranchCounters::default();
        left.iter().for_each(|e| a.record(*e));
        let mut b = BranchCounters::new(11);
        right.iter().for_each(|e| b.record(*e));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, whole);
        assert_eq!(ba, whole);
        assert_eq!(whole.total_entries(), 1000);
    }

    #[test]
    fn test_report_serializes() {
        let branches = vec![branch(0x10, BranchType::Return)];
        let report = Report::from_counters(branches, &counters_for(&[(0, 2, 2)]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_entries"], 2);
        assert_eq!(json["ranked"][0]["branch"]["branch_type"], "Return");
    }
}
