use crate::pipeline::id::NodeId;

/// Execution plan for one set of update targets.
/// Contains only nodes the targets depend on, in topological order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Planned nodes, producers before consumers
    pub order: Vec<NodeId>,

    /// Nodes the plan was compiled for (sorted)
    pub targets: Vec<NodeId>,

    /// Graph generation the plan was compiled against
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Live nodes in the graph
    pub total_nodes: usize,

    /// Nodes included in the plan
    pub planned_nodes: usize,

    /// Planned nodes without input ports
    pub source_nodes: usize,

    /// Live nodes the targets do not depend on
    pub unrelated_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            targets: Vec::new(),
            generation: 0,
            stats: PlanStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.order.contains(&node)
    }

    /// Whether this plan can be reused for `targets` at `generation`.
    pub fn matches(&self, targets: &[NodeId], generation: u64) -> bool {
        self.generation == generation && self.targets == targets
    }
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}
