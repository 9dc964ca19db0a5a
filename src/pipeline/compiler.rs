use super::executive::{Edge, NodeSlot};
use super::id::NodeId;
use super::plan::{ExecutionPlan, PlanStats};
use super::port::PortDirection;
use std::collections::VecDeque;

/// Compiles a pipeline graph into an execution plan for a set of targets
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile the part of the graph that `targets` depend on.
    ///
    /// This performs backward reachability from the targets, then orders the
    /// reached nodes so every producer comes before its consumers.
    ///
    /// # Arguments
    /// * `nodes` - All nodes in the graph (including deleted)
    /// * `edges` - All edges in the graph
    /// * `targets` - Nodes whose outputs are wanted, sorted and deduplicated
    /// * `generation` - Generation counter for cache invalidation
    pub fn compile(
        nodes: &[NodeSlot],
        edges: &[Edge],
        targets: &[NodeId],
        generation: u64,
    ) -> ExecutionPlan {
        let start_time = std::time::Instant::now();

        let n = nodes.len();
        let total_nodes = nodes.iter().filter(|slot| !slot.deleted).count();
        if n == 0 || targets.is_empty() {
            return ExecutionPlan {
                order: Vec::new(),
                targets: targets.to_vec(),
                generation,
                stats: PlanStats {
                    total_nodes,
                    unrelated_nodes: total_nodes,
                    ..PlanStats::default()
                },
            };
        }

        let bwd_adj = Self::build_backward_adjacency(nodes, edges);

        // Everything a target depends on
        let needed = Self::backward_reachability(nodes, targets, &bwd_adj);

        let order = Self::topological_sort(nodes, edges, &needed);

        let source_nodes = order
            .iter()
            .filter(|id| !Self::has_input_port(&nodes[id.index()]))
            .count();

        let compile_time_us = start_time.elapsed().as_micros() as u64;

        let stats = PlanStats {
            total_nodes,
            planned_nodes: order.len(),
            source_nodes,
            unrelated_nodes: total_nodes.saturating_sub(order.len()),
            compile_time_us,
        };

        ExecutionPlan {
            order,
            targets: targets.to_vec(),
            generation,
            stats,
        }
    }

    /// Build backward adjacency lists (consumer -> producers)
    fn build_backward_adjacency(nodes: &[NodeSlot], edges: &[Edge]) -> Vec<Vec<usize>> {
        let n = nodes.len();
        let mut bwd_adj = vec![Vec::new(); n];

        for edge in edges {
            let from = edge.from.node().index();
            let to = edge.to.node().index();

            // Skip edges involving deleted nodes
            if from >= n || to >= n || nodes[from].deleted || nodes[to].deleted {
                continue;
            }

            bwd_adj[to].push(from);
        }

        bwd_adj
    }

    /// A node is a source if it declares no input port.
    fn has_input_port(slot: &NodeSlot) -> bool {
        slot.node
            .ports()
            .iter()
            .any(|p| p.direction == PortDirection::Input)
    }

    /// Perform backward reachability analysis from targets using DFS
    fn backward_reachability(
        nodes: &[NodeSlot],
        targets: &[NodeId],
        bwd_adj: &[Vec<usize>],
    ) -> Vec<bool> {
        let n = nodes.len();
        let mut reachable = vec![false; n];
        let mut stack = Vec::new();

        for target in targets {
            let idx = target.index();
            if idx < n && !nodes[idx].deleted && !reachable[idx] {
                reachable[idx] = true;
                stack.push(idx);
            }
        }

        // DFS backward from targets
        while let Some(node) = stack.pop() {
            for &neighbor in &bwd_adj[node] {
                if !reachable[neighbor] {
                    reachable[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }

        reachable
    }

    /// Topological sort of the selected nodes using Kahn's algorithm.
    ///
    /// Ties are broken by node index so the order is deterministic.
    fn topological_sort(nodes: &[NodeSlot], edges: &[Edge], selected: &[bool]) -> Vec<NodeId> {
        let n = nodes.len();

        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0u32; n];

        for edge in edges {
            let from = edge.from.node().index();
            let to = edge.to.node().index();

            if from >= n || to >= n || nodes[from].deleted || nodes[to].deleted {
                continue;
            }

            if selected[from] && selected[to] {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n)
            .filter(|&i| selected[i] && !nodes[i].deleted && in_degree[i] == 0)
            .collect();
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            result.push(NodeId(node as u32));

            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        let expected = selected.iter().filter(|&&s| s).count();
        if result.len() != expected {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} nodes scheduled.",
                result.len(),
                expected
            );
        }

        result
    }
}
