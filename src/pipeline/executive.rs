//! Pipeline executive: graph ownership and the demand-driven update passes.
//!
//! An update runs three strictly ordered passes over the nodes a target
//! depends on:
//! 1. **Information** (producers first): every node declares what it can produce.
//! 2. **Update-extent propagation** (consumers first): requests are resolved at
//!    each producer port and merged across consumers.
//! 3. **Execution** (producers first): a node recomputes only when it never
//!    ran, its parameters or an upstream output are newer than its last run,
//!    or its cached output does not cover the new request.
//!
//! All timestamps come from the pipeline's own [`ModifiedClock`].

use crate::config::ExecutiveConfig;
use crate::pipeline::clock::{ModifiedClock, Timestamp};
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::data::DataSet;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::events::{EventBus, EventKind, PipelineEvent};
use crate::pipeline::extent::{Extent, PieceRequest};
use crate::pipeline::id::{EdgeId, NodeId, PortId};
use crate::pipeline::information::{PortInformation, UpdateRequest};
use crate::pipeline::node::{AnyNode, ExecuteContext, InformationContext, UpdateExtentContext};
use crate::pipeline::param::ConfigValue;
use crate::pipeline::plan::ExecutionPlan;
use crate::pipeline::port::{ports_in, PortDirection};
use crate::pipeline::translator::SplitMode;
use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::Arc;

/// An edge connecting an output port of one node to an input port of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: PortId,
    pub to: PortId,
}

/// Lifecycle of a node within the executive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    InformationValid,
    Executed,
}

/// How far the pipeline has progressed since the last graph or parameter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Stale,
    InformationValid,
    ExtentsPropagated,
}

/// Why a node was re-executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteReason {
    NeverExecuted,
    ParametersModified,
    UpstreamModified,
    RequestChanged,
    PreviousFailure,
}

impl fmt::Display for ExecuteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecuteReason::NeverExecuted => "never executed",
            ExecuteReason::ParametersModified => "parameters modified",
            ExecuteReason::UpstreamModified => "upstream modified",
            ExecuteReason::RequestChanged => "request changed",
            ExecuteReason::PreviousFailure => "previous failure",
        };
        f.write_str(s)
    }
}

/// What happened to one node during an update.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Executed(ExecuteReason),
    /// Cached output was still valid.
    Reused,
    Failed(PipelineError),
    /// Not run because `failed` (upstream) failed in this update.
    Skipped { failed: NodeId },
}

/// Per-node outcomes of one or more passes, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub outcomes: Vec<(NodeId, NodeOutcome)>,
    pub warnings: Vec<String>,
}

impl UpdateReport {
    fn push(&mut self, node: NodeId, outcome: NodeOutcome) {
        self.outcomes.push((node, outcome));
    }

    fn merge(&mut self, other: UpdateReport) {
        self.outcomes.extend(other.outcomes);
        self.warnings.extend(other.warnings);
    }

    /// The last outcome recorded for `node`.
    pub fn outcome(&self, node: NodeId) -> Option<&NodeOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(id, _)| *id == node)
            .map(|(_, o)| o)
    }

    pub fn executed(&self) -> Vec<NodeId> {
        self.filter(|o| matches!(o, NodeOutcome::Executed(_)))
    }

    pub fn reused(&self) -> Vec<NodeId> {
        self.filter(|o| matches!(o, NodeOutcome::Reused))
    }

    pub fn failed(&self) -> Vec<NodeId> {
        self.filter(|o| matches!(o, NodeOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> Vec<NodeId> {
        self.filter(|o| matches!(o, NodeOutcome::Skipped { .. }))
    }

    pub fn first_error(&self) -> Option<&PipelineError> {
        self.outcomes.iter().find_map(|(_, o)| match o {
            NodeOutcome::Failed(err) => Some(err),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.first_error().is_none()
    }

    fn filter(&self, pred: impl Fn(&NodeOutcome) -> bool) -> Vec<NodeId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(o))
            .map(|(id, _)| *id)
            .collect()
    }
}

struct OutputSlot {
    info: PortInformation,
    data: Option<Arc<DataSet>>,
    data_mtime: Timestamp,
    /// Request the cached data was produced for.
    produced_for: Option<UpdateRequest>,
}

impl OutputSlot {
    fn new(info: PortInformation) -> Self {
        Self {
            info,
            data: None,
            data_mtime: Timestamp::ZERO,
            produced_for: None,
        }
    }
}

/// A slot holding a node and its executive bookkeeping.
pub struct NodeSlot {
    pub node: AnyNode,
    /// Whether this node has been deleted (slot is empty).
    pub deleted: bool,
    state: NodeState,
    params_mtime: Timestamp,
    executed_at: Option<Timestamp>,
    execution_count: u64,
    outputs: Vec<OutputSlot>,
    external_request: Option<UpdateRequest>,
    /// Requests the node's update-extent hook made, per input port and connection.
    input_requests: Vec<Vec<UpdateRequest>>,
    /// The same requests after the producers resolved them.
    resolved_inputs: Vec<Vec<UpdateRequest>>,
    /// Resolved inputs of the last successful run (used for nodes without outputs).
    last_inputs: Option<Vec<Vec<UpdateRequest>>>,
    info_pass: u64,
    /// Root node whose information failure makes this node unusable in the current pass.
    blocked: Option<NodeId>,
    /// Root node whose request propagation failed, cutting this node out of the current update.
    request_failed: Option<NodeId>,
    needs_retry: bool,
    last_error: Option<PipelineError>,
}

impl NodeSlot {
    pub fn new(node: AnyNode) -> Self {
        let outputs = declared_output_information(&node)
            .into_iter()
            .map(OutputSlot::new)
            .collect();
        Self {
            node,
            deleted: false,
            state: NodeState::Uninitialized,
            params_mtime: Timestamp::ZERO,
            executed_at: None,
            execution_count: 0,
            outputs,
            external_request: None,
            input_requests: Vec::new(),
            resolved_inputs: Vec::new(),
            last_inputs: None,
            info_pass: 0,
            blocked: None,
            request_failed: None,
            needs_retry: false,
            last_error: None,
        }
    }

    fn input_count(&self) -> usize {
        ports_in(self.node.ports(), PortDirection::Input).len()
    }
}

/// The pipeline graph and its executive.
pub struct Pipeline {
    nodes: Vec<NodeSlot>,
    edges: Vec<Edge>,
    next_edge_id: u32,
    /// Cached execution plan
    plan: ExecutionPlan,
    /// Generation counter for cache invalidation
    graph_generation: u64,
    clock: ModifiedClock,
    config: ExecutiveConfig,
    events: EventBus,
    phase: PassPhase,
    info_pass: u64,
    extent_pass: u64,
    /// Targets of the last completed update-extent propagation.
    propagated_for: Vec<NodeId>,
}

impl Pipeline {
    pub fn new(config: ExecutiveConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            next_edge_id: 0,
            plan: ExecutionPlan::new(),
            graph_generation: 0,
            clock: ModifiedClock::new(),
            config,
            events,
            phase: PassPhase::Stale,
            info_pass: 0,
            extent_pass: 0,
            propagated_for: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExecutiveConfig {
        &self.config
    }

    pub fn set_split_mode(&mut self, mode: SplitMode) {
        if self.config.split_mode != mode {
            self.config.split_mode = mode;
            self.mark_requests_changed();
        }
    }

    /// Subscribe to executive events of the given kinds.
    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Receiver<PipelineEvent> {
        self.events.subscribe(kinds)
    }

    pub(crate) fn publish(&mut self, event: PipelineEvent) {
        self.events.publish(event);
    }

    // ── Graph building ──

    /// Add a node to the pipeline. Returns its NodeId.
    pub fn add_node(&mut self, node: impl Into<AnyNode>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut slot = NodeSlot::new(node.into());
        slot.params_mtime = self.clock.tick();
        tracing::debug!("Added node {} ({})", id, slot.node.name());
        self.nodes.push(slot);
        self.invalidate_graph();
        id
    }

    /// Remove a node and every edge touching it. Its consumers count as modified.
    pub fn remove_node(&mut self, node: NodeId) -> PipelineResult<()> {
        self.slot(node)?;
        let consumers: Vec<NodeId> = self
            .edges
            .iter()
            .filter(|e| e.from.node() == node)
            .map(|e| e.to.node())
            .collect();
        self.edges
            .retain(|e| e.from.node() != node && e.to.node() != node);

        let slot = &mut self.nodes[node.index()];
        slot.deleted = true;
        for out in &mut slot.outputs {
            out.data = None;
            out.produced_for = None;
        }
        for consumer in consumers {
            self.touch(consumer);
        }
        self.invalidate_graph();
        tracing::info!("Removed node {}", node);
        Ok(())
    }

    /// Connect output port `from` to input port `to`.
    pub fn connect(&mut self, from: PortId, to: PortId) -> PipelineResult<EdgeId> {
        let producer = from.node();
        let consumer = to.node();
        self.slot(producer)?;
        self.slot(consumer)?;
        if producer == consumer {
            return Err(PipelineError::InvalidEdge(
                "cannot connect a node to itself".to_string(),
            ));
        }

        let out_kind = {
            let node = &self.nodes[producer.index()].node;
            ports_in(node.ports(), PortDirection::Output)
                .get(from.port_index() as usize)
                .map(|d| d.kind)
                .ok_or_else(|| {
                    PipelineError::PortMismatch(format!(
                        "{} ({}) has no output port {}",
                        producer,
                        node.name(),
                        from.port_index()
                    ))
                })?
        };
        let (in_kind, repeatable) = {
            let node = &self.nodes[consumer.index()].node;
            ports_in(node.ports(), PortDirection::Input)
                .get(to.port_index() as usize)
                .map(|d| (d.kind, d.repeatable))
                .ok_or_else(|| {
                    PipelineError::PortMismatch(format!(
                        "{} ({}) has no input port {}",
                        consumer,
                        node.name(),
                        to.port_index()
                    ))
                })?
        };

        if !out_kind.compatible_with(in_kind) {
            return Err(PipelineError::PortMismatch(format!(
                "cannot feed {:?} output into {:?} input",
                out_kind, in_kind
            )));
        }
        if self.edges.iter().any(|e| e.from == from && e.to == to) {
            return Err(PipelineError::InvalidEdge(format!(
                "{:?} is already connected to {:?}",
                from, to
            )));
        }
        if !repeatable && self.edges.iter().any(|e| e.to == to) {
            return Err(PipelineError::InvalidEdge(format!(
                "input port {} of {} accepts a single connection",
                to.port_index(),
                consumer
            )));
        }
        if self.would_create_cycle(producer, consumer) {
            return Err(PipelineError::CycleDetected);
        }

        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.edges.push(Edge { id, from, to });
        self.touch(consumer);
        self.invalidate_graph();
        tracing::info!("Added edge {:?}: {:?} -> {:?}", id, from, to);
        Ok(id)
    }

    /// Connect output 0 of `from` to input 0 of `to`.
    pub fn connect_nodes(&mut self, from: NodeId, to: NodeId) -> PipelineResult<EdgeId> {
        self.connect(from.output(0), to.input(0))
    }

    pub fn disconnect(&mut self, edge: EdgeId) -> PipelineResult<()> {
        let pos = self
            .edges
            .iter()
            .position(|e| e.id == edge)
            .ok_or_else(|| PipelineError::InvalidEdge(format!("unknown edge {:?}", edge)))?;
        let removed = self.edges.remove(pos);
        self.touch(removed.to.node());
        self.invalidate_graph();
        tracing::info!("Removed edge {:?}", edge);
        Ok(())
    }

    /// Check if adding an edge from `from` to `to` would create a cycle.
    fn would_create_cycle(&self, from: NodeId, to: NodeId) -> bool {
        // If `to` can reach `from` through existing edges, adding from->to creates a cycle.
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= self.nodes.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for edge in &self.edges {
                if edge.from.node() == current {
                    stack.push(edge.to.node());
                }
            }
        }
        false
    }

    /// Invalidate the cached plan and the pass phase (called when graph topology changes).
    fn invalidate_graph(&mut self) {
        self.graph_generation += 1;
        self.phase = PassPhase::Stale;
    }

    fn mark_requests_changed(&mut self) {
        if self.phase == PassPhase::ExtentsPropagated {
            self.phase = PassPhase::InformationValid;
        }
    }

    /// Bump a node's modification time.
    fn touch(&mut self, node: NodeId) {
        let now = self.clock.tick();
        if let Some(slot) = self.nodes.get_mut(node.index()) {
            slot.params_mtime = now;
        }
        self.phase = PassPhase::Stale;
    }

    // ── Parameters ──

    /// Apply a parameter. Only an actual change bumps the node's modification time.
    pub fn set_parameter(
        &mut self,
        node: NodeId,
        key: &str,
        value: impl Into<ConfigValue>,
    ) -> PipelineResult<bool> {
        let value = value.into();
        let slot = self.slot_mut(node)?;
        let changed = slot.node.set_parameter(key, &value)?;
        if changed {
            self.touch(node);
            tracing::debug!("Node {} parameter '{}' = {:?}", node, key, value);
        }
        Ok(changed)
    }

    /// Mark a node modified without changing anything.
    pub fn modified(&mut self, node: NodeId) -> PipelineResult<()> {
        self.slot(node)?;
        self.touch(node);
        Ok(())
    }

    /// Mutable access to a node. The node counts as modified afterwards.
    pub fn with_node_mut<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut AnyNode) -> R,
    ) -> PipelineResult<R> {
        let slot = self.slot_mut(node)?;
        let result = f(&mut slot.node);
        self.touch(node);
        Ok(result)
    }

    // ── Requests ──

    pub fn set_update_request(&mut self, node: NodeId, request: UpdateRequest) -> PipelineResult<()> {
        request.validate()?;
        self.slot_mut(node)?.external_request = Some(request);
        self.mark_requests_changed();
        Ok(())
    }

    /// Request a structured sub-extent from `node`, replacing any piece request.
    pub fn set_update_extent(&mut self, node: NodeId, extent: Extent) -> PipelineResult<()> {
        let mut request = self.current_request(node)?;
        request.extent = Some(extent);
        request.piece = None;
        self.set_update_request(node, request)
    }

    /// Request one piece from `node`, replacing any extent request.
    pub fn set_update_piece(&mut self, node: NodeId, piece: PieceRequest) -> PipelineResult<()> {
        let mut request = self.current_request(node)?;
        request.piece = Some(piece);
        request.extent = None;
        self.set_update_request(node, request)
    }

    pub fn set_update_time(&mut self, node: NodeId, time: f64) -> PipelineResult<()> {
        let mut request = self.current_request(node)?;
        request.time = Some(time);
        self.set_update_request(node, request)
    }

    pub fn clear_update_request(&mut self, node: NodeId) -> PipelineResult<()> {
        self.slot_mut(node)?.external_request = None;
        self.mark_requests_changed();
        Ok(())
    }

    pub fn update_request(&self, node: NodeId) -> Option<UpdateRequest> {
        self.nodes.get(node.index())?.external_request
    }

    fn current_request(&self, node: NodeId) -> PipelineResult<UpdateRequest> {
        Ok(self.slot(node)?.external_request.unwrap_or_default())
    }

    // ── Passes ──

    fn plan_for(&mut self, targets: &[NodeId]) -> PipelineResult<ExecutionPlan> {
        let mut targets = targets.to_vec();
        targets.sort();
        targets.dedup();
        for &t in &targets {
            self.slot(t)?;
        }

        if !self.plan.matches(&targets, self.graph_generation) {
            self.plan = PipelineCompiler::compile(
                &self.nodes,
                &self.edges,
                &targets,
                self.graph_generation,
            );
            tracing::info!(
                "Pipeline recompiled: {} planned / {} total (gen {})",
                self.plan.stats.planned_nodes,
                self.plan.stats.total_nodes,
                self.plan.generation,
            );
        }
        Ok(self.plan.clone())
    }

    /// Producer ports feeding each input port of `node`, in connection order.
    fn connections(&self, node: NodeId) -> Vec<Vec<Edge>> {
        let count = self.nodes[node.index()].input_count();
        let mut conns = vec![Vec::new(); count];
        for edge in &self.edges {
            if edge.to.node() == node {
                if let Some(port) = conns.get_mut(edge.to.port_index() as usize) {
                    port.push(*edge);
                }
            }
        }
        conns
    }

    fn output_slot(&self, port: PortId) -> &OutputSlot {
        &self.nodes[port.node().index()].outputs[port.port_index() as usize]
    }

    fn input_information(&self, conns: &[Vec<Edge>]) -> Vec<Vec<PortInformation>> {
        conns
            .iter()
            .map(|c| c.iter().map(|e| self.output_slot(e.from).info.clone()).collect())
            .collect()
    }

    /// Run the information pass for everything `targets` depend on.
    ///
    /// A node whose information is inconsistent fails only its own branch;
    /// its dependents are reported as skipped.
    pub fn update_information(&mut self, targets: &[NodeId]) -> PipelineResult<UpdateReport> {
        let plan = self.plan_for(targets)?;
        self.info_pass += 1;
        let pass = self.info_pass;
        let mut report = UpdateReport::default();
        let mut failed = Vec::new();

        for &id in &plan.order {
            let conns = self.connections(id);
            let upstream_failure = conns
                .iter()
                .flatten()
                .find_map(|e| self.nodes[e.from.node().index()].blocked);

            if let Some(root) = upstream_failure {
                let slot = &mut self.nodes[id.index()];
                slot.blocked = Some(root);
                slot.state = NodeState::Uninitialized;
                slot.info_pass = pass;
                tracing::debug!("Node {} skipped: upstream {} has no valid information", id, root);
                report.push(id, NodeOutcome::Skipped { failed: root });
                continue;
            }

            let inputs = self.input_information(&conns);
            let slot = &mut self.nodes[id.index()];
            let fresh = declared_output_information(&slot.node);
            let mut ctx = InformationContext::new(inputs, fresh);

            let result = if slot.node.capabilities().information {
                slot.node.request_information(&mut ctx)
            } else {
                ctx.pass_through();
                Ok(())
            };
            let result = result
                .map_err(|e| information_error(id, e))
                .and_then(|()| {
                    let outputs = ctx.into_outputs();
                    for (port, info) in outputs.iter().enumerate() {
                        info.validate().map_err(|message| PipelineError::Information {
                            node_id: id,
                            message: format!("output {}: {}", port, message),
                        })?;
                    }
                    Ok(outputs)
                });

            slot.info_pass = pass;
            match result {
                Ok(outputs) => {
                    for (out, info) in slot.outputs.iter_mut().zip(outputs) {
                        out.info = info;
                    }
                    slot.blocked = None;
                    if slot.state == NodeState::Uninitialized {
                        slot.state = NodeState::InformationValid;
                    }
                }
                Err(err) => {
                    tracing::warn!("Branch at node {} ({}) disabled: {}", id, slot.node.name(), err);
                    slot.blocked = Some(id);
                    slot.state = NodeState::Uninitialized;
                    slot.last_error = Some(err.clone());
                    failed.push(id);
                    self.events.publish(PipelineEvent::NodeFailed {
                        node_id: id,
                        message: err.to_string(),
                    });
                    report.push(id, NodeOutcome::Failed(err));
                }
            }
        }

        self.phase = PassPhase::InformationValid;
        self.propagated_for.clear();
        tracing::debug!(
            "Information pass {} complete: {} nodes, {} failed",
            pass,
            plan.order.len(),
            failed.len()
        );
        self.events
            .publish(PipelineEvent::InformationComplete { pass, failed });
        Ok(report)
    }

    /// Merge consumer requests into each producer, walking consumers first.
    ///
    /// Requires a complete information pass covering every planned node. A node
    /// whose requests cannot be merged, or whose hook fails, is reported as
    /// failed; it and its downstream are left out of the following execution.
    pub fn propagate_update_extent(&mut self, targets: &[NodeId]) -> PipelineResult<UpdateReport> {
        let plan = self.plan_for(targets)?;
        let covered = plan
            .order
            .iter()
            .all(|id| self.nodes[id.index()].info_pass == self.info_pass);
        if self.phase == PassPhase::Stale || !covered {
            return Err(PipelineError::PassOrder(
                "update extents propagated without a current information pass".to_string(),
            ));
        }

        let mut report = UpdateReport::default();

        for &id in &plan.order {
            let shape: Vec<usize> = self.connections(id).iter().map(Vec::len).collect();
            let slot = &mut self.nodes[id.index()];
            slot.request_failed = None;
            slot.resolved_inputs = shape
                .iter()
                .map(|&n| vec![UpdateRequest::whole(); n])
                .collect();
            for out in &mut slot.outputs {
                out.info.set_requested(None);
            }
        }

        for &id in plan.order.iter().rev() {
            if self.nodes[id.index()].blocked.is_some() {
                continue;
            }
            if let Some(root) = self.abandoned_by(id, &plan) {
                self.nodes[id.index()].request_failed = Some(root);
                tracing::debug!("Node {} gets no request: consumer branch at {} failed", id, root);
                report.push(id, NodeOutcome::Skipped { failed: root });
                continue;
            }
            if let Err(err) = self.propagate_node(id, &plan, &mut report) {
                let slot = &mut self.nodes[id.index()];
                tracing::warn!("Branch at node {} ({}) disabled: {}", id, slot.node.name(), err);
                for out in &mut slot.outputs {
                    out.info.set_requested(None);
                }
                slot.request_failed = Some(id);
                slot.last_error = Some(err.clone());
                self.events.publish(PipelineEvent::NodeFailed {
                    node_id: id,
                    message: err.to_string(),
                });
                report.push(id, NodeOutcome::Failed(err));
            }
        }

        self.extent_pass += 1;
        self.phase = PassPhase::ExtentsPropagated;
        self.propagated_for = plan.targets.clone();
        self.events.publish(PipelineEvent::ExtentsPropagated {
            pass: self.extent_pass,
        });
        Ok(report)
    }

    /// Resolve and merge the requests reaching `id`, then run its update-extent hook.
    fn propagate_node(
        &mut self,
        id: NodeId,
        plan: &ExecutionPlan,
        report: &mut UpdateReport,
    ) -> PipelineResult<()> {
        let split = self.config.split_mode;
        let is_target = plan.targets.contains(&id);
        let external = self.nodes[id.index()].external_request.unwrap_or_default();
        let num_outputs = self.nodes[id.index()].outputs.len();
        let mut requests = Vec::with_capacity(num_outputs.max(1));

        for port in 0..num_outputs {
            let out_port = id.output(port as u16);
            let mut incoming: Vec<(Option<(NodeId, usize, usize)>, UpdateRequest)> = Vec::new();
            for edge in self.edges.iter().filter(|e| e.from == out_port) {
                let consumer = edge.to.node();
                let c = &self.nodes[consumer.index()];
                if !plan.contains(consumer) || c.blocked.is_some() || c.request_failed.is_some() {
                    continue;
                }
                let to_port = edge.to.port_index() as usize;
                let conn = self
                    .edges
                    .iter()
                    .filter(|x| x.to == edge.to)
                    .position(|x| x.id == edge.id)
                    .unwrap_or(0);
                let raw = self.nodes[consumer.index()]
                    .input_requests
                    .get(to_port)
                    .and_then(|c| c.get(conn))
                    .copied()
                    .unwrap_or_default();
                incoming.push((Some((consumer, to_port, conn)), raw));
            }
            if is_target {
                incoming.push((None, external));
            }

            let info = self.nodes[id.index()].outputs[port].info.clone();
            let mut merged: Option<UpdateRequest> = None;
            for (dest, raw) in incoming {
                let resolution = info.resolve(&raw, split)?;
                if let Some(original) = resolution.clamped_from {
                    let clamped = resolution.request.extent.unwrap_or(Extent::EMPTY);
                    tracing::warn!(
                        "Request {} outside whole extent of {:?}, clamped to {}",
                        original,
                        out_port,
                        clamped
                    );
                    report.warnings.push(format!(
                        "{:?}: requested {} clamped to {}",
                        out_port, original, clamped
                    ));
                    self.events.publish(PipelineEvent::ExtentClamped {
                        node_id: id,
                        requested: original,
                        clamped,
                    });
                }
                if let Some((consumer, to_port, conn)) = dest {
                    self.nodes[consumer.index()].resolved_inputs[to_port][conn] =
                        resolution.request;
                }
                merged = Some(match merged {
                    None => resolution.request,
                    Some(m) => m.merge(&resolution.request)?,
                });
            }

            self.nodes[id.index()].outputs[port]
                .info
                .set_requested(merged);
            requests.push(merged.unwrap_or_else(|| whole_request(&info, split)));
        }
        if num_outputs == 0 {
            requests.push(external);
        }

        let conns = self.connections(id);
        let input_info = self.input_information(&conns);
        let mut ctx = UpdateExtentContext::new(requests, input_info);
        let slot = &mut self.nodes[id.index()];
        if slot.node.capabilities().update_extent {
            slot.node
                .request_update_extent(&mut ctx)
                .map_err(|e| execution_error(id, e))?;
        }
        let input_requests = ctx.into_input_requests();
        for request in input_requests.iter().flatten() {
            request.validate()?;
        }
        tracing::trace!("Node {} requests {:?} upstream", id, input_requests);
        slot.input_requests = input_requests;
        Ok(())
    }

    /// Root of the failed branch when every planned consumer of `id` dropped out
    /// of propagation and `id` is not itself a target.
    fn abandoned_by(&self, id: NodeId, plan: &ExecutionPlan) -> Option<NodeId> {
        if plan.targets.contains(&id) {
            return None;
        }
        let mut root = None;
        for edge in self.edges.iter().filter(|e| e.from.node() == id) {
            let consumer = &self.nodes[edge.to.node().index()];
            if !plan.contains(edge.to.node()) || consumer.blocked.is_some() {
                continue;
            }
            match consumer.request_failed {
                Some(r) => root = root.or(Some(r)),
                None => return None,
            }
        }
        root
    }

    /// Execute stale nodes, producers first.
    ///
    /// Requires update extents propagated for the same targets.
    pub fn execute(&mut self, targets: &[NodeId]) -> PipelineResult<UpdateReport> {
        let plan = self.plan_for(targets)?;
        if self.phase != PassPhase::ExtentsPropagated || self.propagated_for != plan.targets {
            return Err(PipelineError::PassOrder(
                "execution requires update extents propagated for the same targets".to_string(),
            ));
        }

        let mut report = UpdateReport::default();
        let mut failed: Vec<Option<NodeId>> = vec![None; self.nodes.len()];

        for &id in &plan.order {
            let slot = &self.nodes[id.index()];
            if slot.blocked.is_some() {
                continue;
            }
            if let Some(root) = slot.request_failed {
                failed[id.index()] = Some(root);
                continue;
            }
            let conns = self.connections(id);
            let upstream_failure = conns
                .iter()
                .flatten()
                .find_map(|e| failed[e.from.node().index()]);
            if let Some(root) = upstream_failure {
                failed[id.index()] = Some(root);
                tracing::debug!("Node {} skipped: upstream {} failed", id, root);
                report.push(id, NodeOutcome::Skipped { failed: root });
                continue;
            }

            let Some(reason) = self.execution_reason(id, &conns) else {
                tracing::debug!("Node {} ({}) reused cached output", id, self.nodes[id.index()].node.name());
                self.events.publish(PipelineEvent::NodeReused { node_id: id });
                report.push(id, NodeOutcome::Reused);
                continue;
            };

            match self.execute_node(id, &conns, reason) {
                Ok(()) => report.push(id, NodeOutcome::Executed(reason)),
                Err(err) => {
                    let slot = &mut self.nodes[id.index()];
                    tracing::error!("Node {} ({}) failed: {}", id, slot.node.name(), err);
                    for out in &mut slot.outputs {
                        out.data = None;
                        out.produced_for = None;
                    }
                    slot.needs_retry = true;
                    slot.last_error = Some(err.clone());
                    failed[id.index()] = Some(id);
                    self.events.publish(PipelineEvent::NodeFailed {
                        node_id: id,
                        message: err.to_string(),
                    });
                    report.push(id, NodeOutcome::Failed(err));
                }
            }
        }

        Ok(report)
    }

    fn execution_reason(&self, id: NodeId, conns: &[Vec<Edge>]) -> Option<ExecuteReason> {
        let slot = &self.nodes[id.index()];
        if slot.needs_retry {
            return Some(ExecuteReason::PreviousFailure);
        }
        let Some(executed_at) = slot.executed_at else {
            return Some(ExecuteReason::NeverExecuted);
        };
        if slot.params_mtime > executed_at {
            return Some(ExecuteReason::ParametersModified);
        }
        if conns
            .iter()
            .flatten()
            .any(|e| self.output_slot(e.from).data_mtime > executed_at)
        {
            return Some(ExecuteReason::UpstreamModified);
        }
        if slot.outputs.is_empty() {
            if slot.last_inputs.as_ref() != Some(&slot.resolved_inputs) {
                return Some(ExecuteReason::RequestChanged);
            }
            return None;
        }
        for out in &slot.outputs {
            let Some(wanted) = out.info.requested() else {
                continue;
            };
            let covered = match (&out.data, &out.produced_for) {
                (Some(_), Some(produced)) => wanted.is_satisfied_by(produced),
                _ => false,
            };
            if !covered {
                return Some(ExecuteReason::RequestChanged);
            }
        }
        None
    }

    fn execute_node(
        &mut self,
        id: NodeId,
        conns: &[Vec<Edge>],
        reason: ExecuteReason,
    ) -> PipelineResult<()> {
        let split = self.config.split_mode;
        let inputs = conns
            .iter()
            .map(|c| {
                c.iter()
                    .map(|e| {
                        self.output_slot(e.from).data.clone().ok_or_else(|| {
                            PipelineError::Execution {
                                node_id: id,
                                message: format!("input from {:?} has no data", e.from),
                            }
                        })
                    })
                    .collect::<PipelineResult<Vec<_>>>()
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        let input_info = self.input_information(conns);

        let slot = &self.nodes[id.index()];
        let input_requests = slot.resolved_inputs.clone();
        let requests: Vec<UpdateRequest> = if slot.outputs.is_empty() {
            vec![slot.external_request.unwrap_or_default()]
        } else {
            slot.outputs
                .iter()
                .map(|o| {
                    o.info
                        .requested()
                        .copied()
                        .unwrap_or_else(|| whole_request(&o.info, split))
                })
                .collect()
        };
        let output_info = slot.outputs.iter().map(|o| o.info.clone()).collect();

        let mut ctx = ExecuteContext::new(
            inputs,
            input_requests.clone(),
            input_info,
            requests.clone(),
            output_info,
        );
        let slot = &mut self.nodes[id.index()];
        let result = if slot.node.capabilities().executes {
            slot.node.execute(&mut ctx)
        } else {
            ctx.pass_through()
        };
        result.map_err(|e| execution_error(id, e))?;

        let produced = ctx.into_outputs();
        for (port, (data, out)) in produced.iter().zip(&slot.outputs).enumerate() {
            let Some(data) = data else {
                return Err(PipelineError::Execution {
                    node_id: id,
                    message: format!("no data produced on output {}", port),
                });
            };
            if let Some(kind) = out.info.data_kind() {
                if data.kind() != kind {
                    return Err(PipelineError::Execution {
                        node_id: id,
                        message: format!(
                            "output {} produced {} data, declared {}",
                            port,
                            data.kind(),
                            kind
                        ),
                    });
                }
            }
            data.validate().map_err(|e| execution_error(id, e))?;
        }

        let now = self.clock.tick();
        let slot = &mut self.nodes[id.index()];
        for ((data, out), request) in produced.into_iter().zip(&mut slot.outputs).zip(&requests) {
            out.data = data;
            out.data_mtime = now;
            out.produced_for = Some(*request);
        }
        slot.executed_at = Some(now);
        slot.execution_count += 1;
        slot.state = NodeState::Executed;
        slot.needs_retry = false;
        slot.last_error = None;
        slot.last_inputs = Some(input_requests);
        tracing::debug!(
            "Executed node {} ({}) at {:?}: {}",
            id,
            slot.node.name(),
            now,
            reason
        );
        self.events.publish(PipelineEvent::NodeExecuted {
            node_id: id,
            reason,
            timestamp: now,
        });
        Ok(())
    }

    fn run_passes(&mut self, targets: &[NodeId], strict: bool) -> PipelineResult<UpdateReport> {
        let mut report = self.update_information(targets)?;
        if strict {
            if let Some(err) = report.first_error() {
                return Err(err.clone());
            }
        }
        report.merge(self.propagate_update_extent(targets)?);
        if strict {
            if let Some(err) = report.first_error() {
                return Err(err.clone());
            }
        }
        report.merge(self.execute(targets)?);
        if strict {
            if let Some(err) = report.first_error() {
                return Err(err.clone());
            }
        }
        tracing::info!(
            "Update of {:?}: {} executed, {} reused, {} failed, {} skipped",
            targets,
            report.executed().len(),
            report.reused().len(),
            report.failed().len(),
            report.skipped().len(),
        );
        Ok(report)
    }

    /// Bring `node` up to date. Any failure in its upstream is returned as an error.
    pub fn update(&mut self, node: NodeId) -> PipelineResult<UpdateReport> {
        self.run_passes(&[node], true)
    }

    /// Update every terminal node. Failures stay confined to their branch and
    /// are recorded in the report.
    pub fn update_all(&mut self) -> PipelineResult<UpdateReport> {
        let targets = self.terminal_nodes();
        if targets.is_empty() {
            return Ok(UpdateReport::default());
        }
        self.run_passes(&targets, false)
    }

    /// Request one piece (with the configured ghost level) and update.
    pub fn update_piece(
        &mut self,
        node: NodeId,
        piece: u32,
        num_pieces: u32,
    ) -> PipelineResult<UpdateReport> {
        let request = PieceRequest::new(piece, num_pieces)?.with_ghost_level(self.config.ghost_level);
        self.set_update_piece(node, request)?;
        self.update(node)
    }

    pub fn update_extent(&mut self, node: NodeId, extent: Extent) -> PipelineResult<UpdateReport> {
        self.set_update_extent(node, extent)?;
        self.update(node)
    }

    pub fn update_time_step(&mut self, node: NodeId, time: f64) -> PipelineResult<UpdateReport> {
        self.set_update_time(node, time)?;
        self.update(node)
    }

    // ── Inspection ──

    fn slot(&self, node: NodeId) -> PipelineResult<&NodeSlot> {
        match self.nodes.get(node.index()) {
            Some(slot) if !slot.deleted => Ok(slot),
            _ => Err(PipelineError::UnknownNode(node)),
        }
    }

    fn slot_mut(&mut self, node: NodeId) -> PipelineResult<&mut NodeSlot> {
        match self.nodes.get_mut(node.index()) {
            Some(slot) if !slot.deleted => Ok(slot),
            _ => Err(PipelineError::UnknownNode(node)),
        }
    }

    pub fn node(&self, node: NodeId) -> Option<&AnyNode> {
        self.slot(node).ok().map(|s| &s.node)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.deleted)
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|s| !s.deleted).count()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Live nodes nothing else consumes.
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .into_iter()
            .filter(|&id| !self.edges.iter().any(|e| e.from.node() == id))
            .collect()
    }

    /// Cached data of an output port.
    pub fn output(&self, port: PortId) -> Option<Arc<DataSet>> {
        let slot = self.slot(port.node()).ok()?;
        slot.outputs.get(port.port_index() as usize)?.data.clone()
    }

    pub fn information(&self, port: PortId) -> Option<&PortInformation> {
        let slot = self.slot(port.node()).ok()?;
        slot.outputs.get(port.port_index() as usize).map(|o| &o.info)
    }

    /// Timestamp of the data cached on an output port.
    pub fn output_time(&self, port: PortId) -> Option<Timestamp> {
        let slot = self.slot(port.node()).ok()?;
        let out = slot.outputs.get(port.port_index() as usize)?;
        out.data.as_ref().map(|_| out.data_mtime)
    }

    pub fn execution_count(&self, node: NodeId) -> u64 {
        self.slot(node).map_or(0, |s| s.execution_count)
    }

    pub fn node_state(&self, node: NodeId) -> Option<NodeState> {
        self.slot(node).ok().map(|s| s.state)
    }

    pub fn modification_time(&self, node: NodeId) -> Option<Timestamp> {
        self.slot(node).ok().map(|s| s.params_mtime)
    }

    pub fn last_executed(&self, node: NodeId) -> Option<Timestamp> {
        self.slot(node).ok().and_then(|s| s.executed_at)
    }

    pub fn last_error(&self, node: NodeId) -> Option<&PipelineError> {
        self.slot(node).ok().and_then(|s| s.last_error.as_ref())
    }

    /// Resolved requests `node` sent upstream during the last propagation.
    pub fn input_requests(&self, node: NodeId) -> Option<&[Vec<UpdateRequest>]> {
        self.slot(node).ok().map(|s| s.resolved_inputs.as_slice())
    }

    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ExecutiveConfig::default())
    }
}

/// Fresh output information carrying only the declared port kinds.
fn declared_output_information(node: &AnyNode) -> Vec<PortInformation> {
    ports_in(node.ports(), PortDirection::Output)
        .iter()
        .map(|d| PortInformation::new(d.kind.data_kind()))
        .collect()
}

fn whole_request(info: &PortInformation, split: SplitMode) -> UpdateRequest {
    info.resolve(&UpdateRequest::whole(), split)
        .map(|r| r.request)
        .unwrap_or_default()
}

fn information_error(node_id: NodeId, err: PipelineError) -> PipelineError {
    match err {
        e @ PipelineError::Information { .. } => e,
        other => PipelineError::Information {
            node_id,
            message: other.to_string(),
        },
    }
}

fn execution_error(node_id: NodeId, err: PipelineError) -> PipelineError {
    match err {
        e @ PipelineError::Execution { .. } => e,
        other => PipelineError::Execution {
            node_id,
            message: other.to_string(),
        },
    }
}
