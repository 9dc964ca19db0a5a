//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use vispipe::pipeline::{Extent, NodeId, Pipeline, UpdateReport};

/// The 32^3 whole extent used by the partitioning scenarios
pub const CUBE_32: Extent = Extent::new(0, 31, 0, 31, 0, 31);

/// Execution counts of `nodes`, in order
pub fn counts(pipeline: &Pipeline, nodes: &[NodeId]) -> Vec<u64> {
    nodes.iter().map(|&n| pipeline.execution_count(n)).collect()
}

/// Assert that exactly `expected` nodes executed in `report`
pub fn assert_executed(report: &UpdateReport, expected: &[NodeId]) {
    let mut got = report.executed();
    got.sort();
    let mut want = expected.to_vec();
    want.sort();
    assert_eq!(got, want, "unexpected set of executed nodes: {:?}", report);
}
