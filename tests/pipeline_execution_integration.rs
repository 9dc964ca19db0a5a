//! Integration tests for the demand-driven update passes
//!
//! These tests drive whole pipelines through `update`, `update_all` and the
//! individual passes and check what executed, what was reused and which
//! requests reached each node.

mod common;

use common::builders::*;
use common::{assert_executed, counts, CUBE_32};
use std::sync::{Arc, Mutex};
use vispipe::pipeline::{
    compute_local_extent, AnyNode, EventKind, ExecuteReason, Extent, NodeOutcome, PassPhase,
    PieceRequest, Pipeline, PipelineError, PipelineEvent, SplitMode, UpdateRequest,
};
use vispipe::ExecutiveConfig;

const SMALL: Extent = Extent::new(0, 3, 0, 3, 0, 3);

// ============================================================================
// Reuse and modification tracking
// ============================================================================

#[test]
fn test_second_update_reuses_everything() {
    let (mut pipeline, source, crop, log) = source_and_crop(CUBE_32, ExecutiveConfig::default());

    let first = pipeline.update(crop).unwrap();
    assert_executed(&first, &[source, crop]);
    assert_eq!(
        first.outcome(source),
        Some(&NodeOutcome::Executed(ExecuteReason::NeverExecuted))
    );

    let second = pipeline.update(crop).unwrap();
    assert!(second.executed().is_empty());
    assert_eq!(second.reused().len(), 2);
    assert_eq!(counts(&pipeline, &[source, crop]), vec![1, 1]);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_parameter_change_reexecutes_only_downstream() {
    let (mut pipeline, source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    pipeline.update(crop).unwrap();

    assert!(pipeline.set_parameter(crop, "level", 3i64).unwrap());
    let report = pipeline.update(crop).unwrap();
    assert_eq!(report.outcome(source), Some(&NodeOutcome::Reused));
    assert_eq!(
        report.outcome(crop),
        Some(&NodeOutcome::Executed(ExecuteReason::ParametersModified))
    );

    // Setting the same value is not a modification
    assert!(!pipeline.set_parameter(crop, "level", 3i64).unwrap());
    let report = pipeline.update(crop).unwrap();
    assert!(report.executed().is_empty());
}

#[test]
fn test_upstream_modification_propagates() {
    let (mut pipeline, source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    pipeline.update(crop).unwrap();
    let before = pipeline.output_time(crop.output(0)).unwrap();

    pipeline.modified(source).unwrap();
    let report = pipeline.update(crop).unwrap();
    assert_eq!(
        report.outcome(source),
        Some(&NodeOutcome::Executed(ExecuteReason::ParametersModified))
    );
    assert_eq!(
        report.outcome(crop),
        Some(&NodeOutcome::Executed(ExecuteReason::UpstreamModified))
    );
    assert!(pipeline.output_time(crop.output(0)).unwrap() > before);
    assert!(pipeline.last_executed(crop).unwrap() >= pipeline.modification_time(source).unwrap());
}

#[test]
fn test_smaller_request_is_served_from_cache() {
    let (mut pipeline, source, crop, _log) = source_and_crop(CUBE_32, ExecutiveConfig::default());
    pipeline.update(crop).unwrap();

    let sub = Extent::new(2, 5, 2, 5, 2, 5);
    let report = pipeline.update_extent(crop, sub).unwrap();
    assert!(report.executed().is_empty());

    // The cached output covers the request; consumers crop it themselves.
    let data = pipeline.output(crop.output(0)).unwrap();
    let image = data.as_image().unwrap();
    assert!(image.extent.contains(&sub));
    assert_eq!(counts(&pipeline, &[source, crop]), vec![1, 1]);
}

#[test]
fn test_larger_request_reexecutes() {
    let (mut pipeline, source, crop, log) = source_and_crop(CUBE_32, ExecutiveConfig::default());
    pipeline
        .update_extent(crop, Extent::new(0, 7, 0, 7, 0, 7))
        .unwrap();

    let bigger = Extent::new(0, 15, 0, 15, 0, 15);
    let report = pipeline.update_extent(crop, bigger).unwrap();
    assert_eq!(
        report.outcome(source),
        Some(&NodeOutcome::Executed(ExecuteReason::RequestChanged))
    );
    assert_eq!(log.lock().unwrap().last().unwrap().extent, Some(bigger));
    assert_eq!(counts(&pipeline, &[source, crop]), vec![2, 2]);
}

#[test]
fn test_updating_one_branch_leaves_sibling_alone() {
    let mut pipeline = Pipeline::default();
    let source = pipeline.add_node(wavelet(CUBE_32));
    let left = pipeline.add_node(voi(Extent::new(0, 7, 0, 7, 0, 7)));
    let right = pipeline.add_node(voi(Extent::new(8, 15, 0, 7, 0, 7)));
    pipeline.connect_nodes(source, left).unwrap();
    pipeline.connect_nodes(source, right).unwrap();

    pipeline.update(left).unwrap();
    pipeline.update(right).unwrap();
    let right_runs = pipeline.execution_count(right);

    pipeline.modified(left).unwrap();
    pipeline.update(left).unwrap();
    assert_eq!(pipeline.execution_count(right), right_runs);
}

// ============================================================================
// Request merging
// ============================================================================

#[test]
fn test_two_consumers_merge_to_bounding_box() {
    let mut pipeline = Pipeline::default();
    let source = pipeline.add_node(wavelet(CUBE_32));
    let left = pipeline.add_node(voi(Extent::new(0, 7, 0, 7, 0, 7)));
    let right = pipeline.add_node(voi(Extent::new(8, 15, 0, 7, 0, 7)));
    pipeline.connect_nodes(source, left).unwrap();
    pipeline.connect_nodes(source, right).unwrap();

    let report = pipeline.update_all().unwrap();
    assert_executed(&report, &[source, left, right]);
    assert_eq!(pipeline.execution_count(source), 1);

    let requested = pipeline
        .information(source.output(0))
        .and_then(|info| info.requested())
        .copied()
        .unwrap();
    assert_eq!(requested.extent, Some(Extent::new(0, 15, 0, 7, 0, 7)));

    let left_out = pipeline.output(left.output(0)).unwrap();
    assert_eq!(left_out.as_image().unwrap().extent, Extent::new(0, 7, 0, 7, 0, 7));

    let again = pipeline.update_all().unwrap();
    assert!(again.executed().is_empty());
}

#[test]
fn test_diamond_executes_shared_source_once() {
    let mut pipeline = Pipeline::default();
    let source = pipeline.add_node(wavelet(SMALL));
    let a = pipeline.add_node(image_to_points());
    let b = pipeline.add_node(image_to_points());
    let joined = pipeline.add_node(append());
    pipeline.connect_nodes(source, a).unwrap();
    pipeline.connect_nodes(source, b).unwrap();
    pipeline.connect(a.output(0), joined.input(0)).unwrap();
    pipeline.connect(b.output(0), joined.input(0)).unwrap();

    let report = pipeline.update(joined).unwrap();
    assert_executed(&report, &[source, a, b, joined]);
    assert_eq!(counts(&pipeline, &[source, a, b, joined]), vec![1, 1, 1, 1]);

    let out = pipeline.output(joined.output(0)).unwrap();
    assert_eq!(out.num_points(), 2 * SMALL.num_points());
}

#[test]
fn test_conflicting_times_keep_previous_results() {
    let mut pipeline = Pipeline::default();
    let log = request_log();
    let source = pipeline.add_node(wavelet(SMALL));
    let p1 = pipeline.add_node(crop(&log));
    let p2 = pipeline.add_node(crop(&log));
    pipeline.connect_nodes(source, p1).unwrap();
    pipeline.connect_nodes(source, p2).unwrap();
    pipeline.update_all().unwrap();
    let before = counts(&pipeline, &[source, p1, p2]);

    pipeline.set_update_time(p1, 0.5).unwrap();
    pipeline.set_update_time(p2, 1.5).unwrap();
    let report = pipeline.update_all().unwrap();
    assert!(matches!(
        report.outcome(source),
        Some(NodeOutcome::Failed(PipelineError::ConflictingTimeRequests { .. }))
    ));
    assert_eq!(report.outcome(p1), Some(&NodeOutcome::Skipped { failed: source }));
    assert_eq!(report.outcome(p2), Some(&NodeOutcome::Skipped { failed: source }));
    assert_eq!(counts(&pipeline, &[source, p1, p2]), before);
    assert!(pipeline.output(p1.output(0)).is_some());

    pipeline.clear_update_request(p2).unwrap();
    let report = pipeline.update_all().unwrap();
    assert!(report.is_success());
}

#[test]
fn test_invalid_request_is_rejected_without_side_effects() {
    let (mut pipeline, _source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    pipeline.set_update_extent(crop, Extent::new(0, 1, 0, 1, 0, 1)).unwrap();
    let kept = pipeline.update_request(crop);

    let err = pipeline
        .set_update_request(crop, UpdateRequest::whole().at_time(f64::NAN))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidArgument(_)));
    assert_eq!(pipeline.update_request(crop), kept);

    assert!(matches!(
        pipeline.update_extent(crop, Extent::new(3, 1, 0, 1, 0, 1)),
        Err(PipelineError::MalformedExtent(_))
    ));
    assert!(pipeline.update_piece(crop, 4, 4).is_err());
}

// ============================================================================
// Pass ordering
// ============================================================================

#[test]
fn test_passes_must_run_in_order() {
    let (mut pipeline, _source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());

    assert!(matches!(
        pipeline.propagate_update_extent(&[crop]),
        Err(PipelineError::PassOrder(_))
    ));
    assert!(matches!(
        pipeline.execute(&[crop]),
        Err(PipelineError::PassOrder(_))
    ));

    pipeline.update_information(&[crop]).unwrap();
    assert_eq!(pipeline.phase(), PassPhase::InformationValid);
    assert!(matches!(
        pipeline.execute(&[crop]),
        Err(PipelineError::PassOrder(_))
    ));

    pipeline.propagate_update_extent(&[crop]).unwrap();
    assert_eq!(pipeline.phase(), PassPhase::ExtentsPropagated);

    // A parameter change invalidates the information pass
    pipeline.set_parameter(crop, "level", 1i64).unwrap();
    assert_eq!(pipeline.phase(), PassPhase::Stale);
    assert!(matches!(
        pipeline.execute(&[crop]),
        Err(PipelineError::PassOrder(_))
    ));

    pipeline.update_information(&[crop]).unwrap();
    pipeline.propagate_update_extent(&[crop]).unwrap();
    let report = pipeline.execute(&[crop]).unwrap();
    assert!(report.is_success());
}

#[test]
fn test_new_request_requires_new_propagation() {
    let (mut pipeline, _source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    pipeline.update_information(&[crop]).unwrap();
    pipeline.propagate_update_extent(&[crop]).unwrap();

    pipeline
        .set_update_extent(crop, Extent::new(0, 1, 0, 1, 0, 1))
        .unwrap();
    assert!(matches!(
        pipeline.execute(&[crop]),
        Err(PipelineError::PassOrder(_))
    ));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_execution_failure_skips_downstream_and_retries() {
    let (mut pipeline, source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    let tail = pipeline.add_node(voi(SMALL));
    pipeline.connect_nodes(crop, tail).unwrap();
    pipeline.update(tail).unwrap();

    pipeline.set_parameter(crop, "fail", true).unwrap();
    let err = pipeline.update(tail).unwrap_err();
    assert!(matches!(err, PipelineError::Execution { node_id, .. } if node_id == crop));

    let report = pipeline.update_all().unwrap();
    assert_eq!(report.failed(), vec![crop]);
    assert_eq!(
        report.outcome(tail),
        Some(&NodeOutcome::Skipped { failed: crop })
    );
    assert_eq!(report.outcome(source), Some(&NodeOutcome::Reused));
    assert!(pipeline.output(crop.output(0)).is_none());
    assert!(pipeline.last_error(crop).is_some());

    pipeline.set_parameter(crop, "fail", false).unwrap();
    let report = pipeline.update(tail).unwrap();
    assert_eq!(
        report.outcome(crop),
        Some(&NodeOutcome::Executed(ExecuteReason::PreviousFailure))
    );
    assert!(pipeline.last_error(crop).is_none());
    assert!(pipeline.output(tail.output(0)).is_some());
}

#[test]
fn test_update_extent_failure_stays_in_its_branch() {
    let mut pipeline = Pipeline::default();
    let log = request_log();
    let cut_source = pipeline.add_node(wavelet(SMALL));
    let refusing = pipeline.add_node(AnyNode::plugin(RefusingFilter));
    let after_refusing = pipeline.add_node(crop(&log));
    let source = pipeline.add_node(wavelet(SMALL));
    let healthy = pipeline.add_node(crop(&log));
    pipeline.connect_nodes(cut_source, refusing).unwrap();
    pipeline.connect_nodes(refusing, after_refusing).unwrap();
    pipeline.connect_nodes(source, healthy).unwrap();

    let report = pipeline.update_all().unwrap();
    assert_eq!(report.failed(), vec![refusing]);
    assert_eq!(
        report.outcome(cut_source),
        Some(&NodeOutcome::Skipped { failed: refusing })
    );
    assert_eq!(
        report.outcome(after_refusing),
        Some(&NodeOutcome::Skipped { failed: refusing })
    );
    assert_executed(&report, &[source, healthy]);
    assert_eq!(counts(&pipeline, &[cut_source, refusing, after_refusing]), vec![0, 0, 0]);
    assert!(pipeline.last_error(refusing).is_some());

    let err = pipeline.update(after_refusing).unwrap_err();
    assert!(matches!(err, PipelineError::Execution { node_id, .. } if node_id == refusing));
    assert_eq!(counts(&pipeline, &[source, healthy]), vec![1, 1]);
}

#[test]
fn test_information_failure_stays_in_its_branch() {
    let mut pipeline = Pipeline::default();
    let log = request_log();
    let broken = pipeline.add_node(AnyNode::plugin(BrokenSource));
    let after_broken = pipeline.add_node(crop(&log));
    let source = pipeline.add_node(wavelet(SMALL));
    let healthy = pipeline.add_node(crop(&log));
    pipeline.connect_nodes(broken, after_broken).unwrap();
    pipeline.connect_nodes(source, healthy).unwrap();

    let report = pipeline.update_all().unwrap();
    assert_eq!(report.failed(), vec![broken]);
    assert_eq!(
        report.outcome(after_broken),
        Some(&NodeOutcome::Skipped { failed: broken })
    );
    assert_executed(&report, &[source, healthy]);
    assert_eq!(pipeline.execution_count(broken), 0);

    let err = pipeline.update(after_broken).unwrap_err();
    assert!(matches!(err, PipelineError::Information { node_id, .. } if node_id == broken));
}

#[test]
fn test_graph_errors() {
    let mut pipeline = Pipeline::default();
    let source = pipeline.add_node(wavelet(SMALL));
    let cloud = pipeline.add_node(point_cloud(10));
    let a = pipeline.add_node(voi(SMALL));
    let b = pipeline.add_node(voi(SMALL));
    pipeline.connect_nodes(source, a).unwrap();
    pipeline.connect_nodes(a, b).unwrap();

    assert!(matches!(
        pipeline.connect_nodes(b, a),
        Err(PipelineError::CycleDetected) | Err(PipelineError::InvalidEdge(_))
    ));
    assert!(matches!(
        pipeline.connect_nodes(cloud, b),
        Err(PipelineError::PortMismatch(_)) | Err(PipelineError::InvalidEdge(_))
    ));
    assert!(matches!(
        pipeline.connect(source.output(3), b.input(0)),
        Err(PipelineError::PortMismatch(_))
    ));

    pipeline.remove_node(a).unwrap();
    assert!(pipeline.edges().is_empty());
    assert!(matches!(
        pipeline.update(a),
        Err(PipelineError::UnknownNode(_))
    ));
}

// ============================================================================
// Clamping, time and pieces
// ============================================================================

#[test]
fn test_out_of_bounds_request_is_clamped() {
    let (mut pipeline, _source, crop, log) = source_and_crop(CUBE_32, ExecutiveConfig::default());
    let events = pipeline.subscribe(&[EventKind::ExtentClamped]);

    let report = pipeline
        .update_extent(crop, Extent::new(20, 40, 0, 31, 0, 31))
        .unwrap();
    assert_eq!(report.warnings.len(), 1);

    let clamped = Extent::new(20, 31, 0, 31, 0, 31);
    assert_eq!(log.lock().unwrap().last().unwrap().extent, Some(clamped));
    let event = events.try_recv().unwrap();
    assert!(matches!(
        event,
        PipelineEvent::ExtentClamped { clamped: c, .. } if c == clamped
    ));
}

#[test]
fn test_time_request_snaps_to_available_step() {
    let mut pipeline = Pipeline::default();
    let log = request_log();
    let source = pipeline.add_node(vispipe::pipeline::BuiltinNode::WaveletSource(
        vispipe::pipeline::nodes::WaveletSourceNode::new()
            .with_whole_extent(SMALL)
            .with_time_steps(vec![0.0, 1.0, 2.0]),
    ));
    let filter = pipeline.add_node(crop(&log));
    pipeline.connect_nodes(source, filter).unwrap();

    pipeline.update_time_step(filter, 1.5).unwrap();
    assert_eq!(log.lock().unwrap().last().unwrap().time, Some(1.0));
    assert_eq!(
        pipeline.information(filter.output(0)).unwrap().time_steps(),
        &[0.0, 1.0, 2.0]
    );

    // Another time inside the same step is already satisfied
    let report = pipeline.update_time_step(filter, 1.7).unwrap();
    assert!(report.executed().is_empty());

    let report = pipeline.update_time_step(filter, 2.0).unwrap();
    assert_executed(&report, &[source, filter]);
}

#[test]
fn test_z_slab_pieces() {
    let config = ExecutiveConfig::default().with_split_mode(SplitMode::ZSlab);
    let (mut pipeline, _source, crop, log) = source_and_crop(CUBE_32, config);

    pipeline.update_piece(crop, 0, 4).unwrap();
    assert_eq!(
        log.lock().unwrap().last().unwrap().extent,
        Some(Extent::new(0, 31, 0, 31, 0, 7))
    );

    pipeline.update_piece(crop, 3, 4).unwrap();
    let out = pipeline.output(crop.output(0)).unwrap();
    assert_eq!(out.as_image().unwrap().extent, Extent::new(0, 31, 0, 31, 24, 31));
}

#[test]
fn test_ghost_levels_grow_piece_extent() {
    let config = ExecutiveConfig::default()
        .with_split_mode(SplitMode::ZSlab)
        .with_ghost_level(1);
    let (mut pipeline, _source, crop, log) = source_and_crop(CUBE_32, config);

    pipeline.update_piece(crop, 1, 4).unwrap();
    assert_eq!(
        log.lock().unwrap().last().unwrap().extent,
        Some(Extent::new(0, 31, 0, 31, 7, 16))
    );
}

#[test]
fn test_switching_split_mode_changes_pieces() {
    let (mut pipeline, _source, crop, log) = source_and_crop(CUBE_32, ExecutiveConfig::default());
    pipeline.set_split_mode(SplitMode::XSlab);
    pipeline.update_piece(crop, 0, 4).unwrap();
    assert_eq!(
        log.lock().unwrap().last().unwrap().extent,
        Some(Extent::new(0, 7, 0, 31, 0, 31))
    );
}

#[test]
fn test_node_without_outputs_reruns_only_on_new_request() {
    let mut pipeline = Pipeline::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let source = pipeline.add_node(wavelet(SMALL));
    let points = pipeline.add_node(image_to_points());
    let sink = pipeline.add_node(AnyNode::plugin(RecordingSink { seen: seen.clone() }));
    pipeline.connect_nodes(source, points).unwrap();
    pipeline.connect_nodes(points, sink).unwrap();

    pipeline.update(sink).unwrap();
    pipeline.update(sink).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![SMALL.num_points()]);

    pipeline
        .set_update_piece(sink, PieceRequest::new(1, 2).unwrap())
        .unwrap();
    let report = pipeline.update(sink).unwrap();
    assert_executed(&report, &[source, points, sink]);
    let half = compute_local_extent(&SMALL, 2, 1, SplitMode::Block).unwrap();
    assert_eq!(seen.lock().unwrap().last().copied(), Some(half.num_points()));
}

#[test]
fn test_execution_events_carry_reasons() {
    let (mut pipeline, source, crop, _log) = source_and_crop(SMALL, ExecutiveConfig::default());
    let events = pipeline.subscribe(&[EventKind::NodeExecuted, EventKind::NodeReused]);

    pipeline.update(crop).unwrap();
    pipeline.update(crop).unwrap();

    let received: Vec<PipelineEvent> = events.try_iter().collect();
    let executed: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::NodeExecuted { node_id, reason, .. } => Some((*node_id, *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        executed,
        vec![
            (source, ExecuteReason::NeverExecuted),
            (crop, ExecuteReason::NeverExecuted)
        ]
    );
    let reused = received
        .iter()
        .filter(|e| matches!(e, PipelineEvent::NodeReused { .. }))
        .count();
    assert_eq!(reused, 2);
}
