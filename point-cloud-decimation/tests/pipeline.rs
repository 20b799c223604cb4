mod common;

use common::{MockSource, expect_cached, import, options, register};
use point_cloud_decimation::prelude::*;
use std::sync::Arc;

const GROUND: PieceId = PieceId::Classification(2);
const BUILDING: PieceId = PieceId::Classification(6);

fn two_classes() -> Arc<MockSource> {
    Arc::new(MockSource::classified(&[(2, 100_000), (6, 1_000)]))
}

#[test]
fn import_reads_each_piece_at_its_planned_stride() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let report = expect_cached(import(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_100),
        &AbortFlag::new(),
    ));

    assert_eq!(report.total_points, 101_000);
    assert_eq!(report.pieces_read, 2);
    assert_eq!(report.read_points, 10_100);
    assert_eq!(mock.scans(), 1);

    let pieces = registry.get_pieces(source).unwrap();
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0].id, GROUND);
    assert_eq!(pieces[0].name, "ground");
    assert_eq!(pieces[0].read_ratio, 10);
    assert_eq!(pieces[0].display_ratio, 10);
    assert_eq!(pieces[0].save_ratio, 1);
    assert_eq!(pieces[0].read_points(), 10_000);
    assert_eq!(pieces[0].display_estimate, 10_000);
    assert_eq!(pieces[1].read_points(), 100);
    assert!(pieces.iter().all(|piece| piece.visible));
}

#[test]
fn small_piece_keeps_its_floor() {
    let mock = Arc::new(MockSource::classified(&[(2, 100_000), (9, 300)]));
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    expect_cached(import(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_000),
        &AbortFlag::new(),
    ));

    let water = registry.piece(source, PieceId::Classification(9)).unwrap();
    assert_eq!(water.read_ratio, 6);
    assert_eq!(water.read_points(), 50);
}

#[test]
fn second_pass_with_same_parameters_reads_nothing() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    let first = registry.piece(source, GROUND).unwrap().geometry().cloned().unwrap();
    let reads = mock.reads();

    let report = expect_cached(import(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_100),
        &progress,
    ));

    assert_eq!(mock.reads(), reads);
    assert_eq!(mock.scans(), 1);
    assert_eq!(report.pieces_reused, 2);
    assert_eq!(report.pieces_read, 0);
    let second = registry.piece(source, GROUND).unwrap().geometry().cloned().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn force_read_ignores_clean_caches() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    let reads = mock.reads();

    let forced = ImportOptions {
        force_read: true,
        ..options(10_100)
    };
    let report = expect_cached(import(&mut registry, source, ClipSpec::disabled(), forced, &progress));
    assert_eq!(mock.reads(), reads + 2);
    assert_eq!(report.pieces_read, 2);
}

#[test]
fn new_budget_rereads_only_pieces_whose_stride_changed() {
    let mock = Arc::new(MockSource::classified(&[(2, 100_000), (9, 300)]));
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_000), &progress));
    let reads = mock.reads();

    // Class 9 stays at its floor stride of 6.
    let report = expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(15_000), &progress));
    assert_eq!(mock.reads(), reads + 1);
    assert_eq!(report.pieces_reused, 1);
    assert_eq!(registry.piece(source, GROUND).unwrap().read_ratio, 7);
    assert_eq!(registry.piece(source, PieceId::Classification(9)).unwrap().read_ratio, 6);
}

#[test]
fn enabling_clip_rereads_and_clips_every_piece() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    let reads = mock.reads();

    let clip = ClipSpec::enabled(ClipBox::new([0.0, 0.0, -1.0], [499.0, 10.0, 1.0]));
    assert!(registry.update_needed(source, &clip).unwrap());

    let report = expect_cached(import(&mut registry, source, clip, options(10_100), &progress));
    assert_eq!(mock.reads(), reads + 2);
    assert_eq!(report.pieces_read, 2);
    assert!(!registry.update_needed(source, &clip).unwrap());

    for piece in registry.get_pieces(source).unwrap() {
        let geometry = piece.geometry().unwrap();
        assert_eq!(geometry.len(), 50);
        assert!(geometry.iter_points().all(|point| point[0] <= 499.0));
    }
}

#[test]
fn transformed_piece_is_reread_alone() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    registry
        .set_transform(source, BUILDING, PieceTransform::translated([0.0, 0.0, 100.0]))
        .unwrap();
    assert!(registry.update_needed(source, &ClipSpec::disabled()).unwrap());
    let reads = mock.reads();

    let report = expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    assert_eq!(mock.reads(), reads + 1);
    assert_eq!(report.pieces_reused, 1);

    let building = registry.piece(source, BUILDING).unwrap();
    assert!(building.is_transformed());
    assert_eq!(building.geometry().unwrap().point(0), [0.0, 6.0, 100.0]);
}

#[test]
fn invalidated_piece_is_reread() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    registry.invalidate(source, GROUND).unwrap();
    let reads = mock.reads();

    let report = expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    assert_eq!(mock.reads(), reads + 1);
    assert_eq!(report.pieces_read, 1);
    let ground = registry.piece(source, GROUND).unwrap();
    assert!(!ground.materialization.as_ref().unwrap().dirty);
}

#[test]
fn abort_during_reading_leaves_registry_untouched() {
    let flag = AbortFlag::new();
    let mock = Arc::new(
        MockSource::classified(&[(2, 1_000), (6, 1_000), (9, 1_000)]).aborting_after(2, flag.clone()),
    );
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let outcome = import(&mut registry, source, ClipSpec::disabled(), options(1_000), &flag);

    assert!(matches!(outcome, ImportOutcome::Aborted));
    assert_eq!(mock.reads(), 2);
    assert!(registry.get_pieces(source).unwrap().is_empty());
    assert!(registry.source(source).unwrap().scan().is_none());
}

#[test]
fn abort_during_scan_registers_nothing() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let flag = AbortFlag::new();
    flag.request_abort();

    let outcome = import(&mut registry, source, ClipSpec::disabled(), options(10_100), &flag);

    assert!(matches!(outcome, ImportOutcome::Aborted));
    assert_eq!(mock.scans(), 1);
    assert_eq!(mock.reads(), 0);
    assert!(registry.source(source).unwrap().scan().is_none());
    assert!(registry.get_pieces(source).unwrap().is_empty());
}

#[test]
fn aborted_repass_keeps_previous_cache() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    let before: Vec<u64> = registry
        .get_pieces(source)
        .unwrap()
        .iter()
        .map(|piece| piece.read_points())
        .collect();

    progress.request_abort();
    let clip = ClipSpec::enabled(ClipBox::new([0.0; 3], [10.0; 3]));
    let outcome = import(&mut registry, source, clip, options(10_100), &progress);
    assert!(matches!(outcome, ImportOutcome::Aborted));

    let after: Vec<u64> = registry
        .get_pieces(source)
        .unwrap()
        .iter()
        .map(|piece| piece.read_points())
        .collect();
    assert_eq!(before, after);
    assert!(registry.update_needed(source, &clip).unwrap());
}

#[test]
fn failed_piece_with_abort_answer_fails_the_pass() {
    let mock = two_classes();
    mock.fail_piece(BUILDING);
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let outcome = import(&mut registry, source, ClipSpec::disabled(), options(10_100), &AbortFlag::new());

    match outcome {
        ImportOutcome::Failed(DecimationError::PieceReadFailed { piece, .. }) => {
            assert_eq!(piece, BUILDING)
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(registry.get_pieces(source).unwrap().is_empty());
}

#[test]
fn failed_piece_can_be_skipped() {
    let mock = two_classes();
    mock.fail_piece(GROUND);
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let mut requests = Vec::new();
    let outcome = import_source(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_100),
        &AbortFlag::new(),
        |request| {
            requests.push(request.clone());
            ImportAnswer::SkipPiece
        },
    )
    .unwrap();

    let report = expect_cached(outcome);
    assert_eq!(report.skipped, vec![GROUND]);
    assert!(matches!(
        requests.as_slice(),
        [ImportRequest::PieceReadFailed { piece: GROUND, .. }]
    ));

    let pieces = registry.get_pieces(source).unwrap();
    assert_eq!(pieces.len(), 1);
    assert_eq!(pieces[0].id, BUILDING);
}

#[test]
fn skipped_repass_keeps_piece_settings_until_it_reads_again() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    registry
        .set_transform(source, BUILDING, PieceTransform::translated([0.0, 0.0, 100.0]))
        .unwrap();
    registry.set_save_ratio(source, BUILDING, 3).unwrap();

    mock.fail_piece(BUILDING);
    let outcome = import_source(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_100),
        &progress,
        |_| ImportAnswer::SkipPiece,
    )
    .unwrap();
    assert_eq!(expect_cached(outcome).skipped, vec![BUILDING]);

    let building = registry.piece(source, BUILDING).unwrap();
    assert!(building.is_transformed());
    assert_eq!(building.save_ratio, 3);
    assert!(building.materialization.as_ref().unwrap().dirty);
    assert!(registry.update_needed(source, &ClipSpec::disabled()).unwrap());

    mock.heal_piece(BUILDING);
    let reads = mock.reads();
    expect_cached(import(&mut registry, source, ClipSpec::disabled(), options(10_100), &progress));
    assert_eq!(mock.reads(), reads + 1);

    let building = registry.piece(source, BUILDING).unwrap();
    assert!(building.is_transformed());
    assert_eq!(building.save_ratio, 3);
    assert!(!building.materialization.as_ref().unwrap().dirty);
    assert_eq!(building.geometry().unwrap().point(0), [0.0, 6.0, 100.0]);
}

#[test]
fn low_precision_bounds_yield_a_question() {
    let mock = Arc::new(
        MockSource::classified(&[(2, 100)]).with_bounds([100_000.0, 100_001.0, 0.0, 0.0, 0.0, 0.0]),
    );
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    let mut pass = ImportPass::new(&registry, source, ClipSpec::disabled(), options(1_000)).unwrap();
    let request = loop {
        match pass.step(&mut registry, &progress) {
            ImportStep::Continue => {}
            ImportStep::Request(request) => break request,
            other => panic!("unexpected step {:?}", other),
        }
    };
    assert_eq!(request, ImportRequest::Precision { min_digits: 2 });
    assert_eq!(pass.state(), ImportState::Planning);

    // Unanswered requests are yielded again.
    assert!(matches!(
        pass.step(&mut registry, &progress),
        ImportStep::Request(ImportRequest::Precision { .. })
    ));
    assert!(matches!(
        pass.resolve(ImportAnswer::SkipPiece),
        Err(DecimationError::UnexpectedAnswer)
    ));

    pass.resolve(ImportAnswer::UseDouble(true)).unwrap();
    let outcome = loop {
        match pass.step(&mut registry, &progress) {
            ImportStep::Continue => {}
            ImportStep::Finished(outcome) => break outcome,
            other => panic!("unexpected step {:?}", other),
        }
    };

    let report = expect_cached(outcome);
    assert_eq!(report.precision, Precision::Double);
    let geometry = registry.piece(source, GROUND).unwrap().geometry().unwrap();
    assert_eq!(geometry.precision(), Precision::Double);
    assert!(matches!(pass.step(&mut registry, &progress), ImportStep::Done));
}

#[test]
fn float_answer_stores_float_geometry() {
    let mock = Arc::new(
        MockSource::classified(&[(2, 100)]).with_bounds([100_000.0, 100_001.0, 0.0, 0.0, 0.0, 0.0]),
    );
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let outcome = import_source(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(1_000),
        &AbortFlag::new(),
        |_| ImportAnswer::UseDouble(false),
    )
    .unwrap();

    assert_eq!(expect_cached(outcome).precision, Precision::Float);
    let geometry = registry.piece(source, GROUND).unwrap().geometry().unwrap();
    assert_eq!(geometry.precision(), Precision::Float);
}

#[test]
fn non_interactive_advisor_never_asks() {
    let mock = Arc::new(
        MockSource::classified(&[(2, 100)]).with_bounds([100_000.0, 100_001.0, 0.0, 0.0, 0.0, 0.0]),
    );
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let quiet = ImportOptions {
        precision: PrecisionAdvisor::new(4, false),
        ..options(1_000)
    };

    let outcome = import_source(
        &mut registry,
        source,
        ClipSpec::disabled(),
        quiet,
        &AbortFlag::new(),
        |request| panic!("unexpected request {:?}", request),
    )
    .unwrap();
    assert_eq!(expect_cached(outcome).precision, Precision::Double);
}

#[test]
fn empty_source_commits_no_pieces() {
    let mock = Arc::new(MockSource::classified(&[]));
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let report = expect_cached(import(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(1_000),
        &AbortFlag::new(),
    ));

    assert_eq!(report.total_points, 0);
    assert!(report.pieces.is_empty());
    assert!(report.bounds.is_none());
    assert_eq!(mock.reads(), 0);
    assert!(registry.get_pieces(source).unwrap().is_empty());
}

#[test]
fn removing_the_source_mid_pass_fails_the_commit() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);
    let progress = AbortFlag::new();

    let mut pass = ImportPass::new(&registry, source, ClipSpec::disabled(), options(10_100)).unwrap();
    assert!(matches!(pass.step(&mut registry, &progress), ImportStep::Continue));
    assert!(registry.remove_source(source));

    let outcome = pass.run(&mut registry, &progress, |_| ImportAnswer::AbortSource);
    assert!(matches!(
        outcome,
        ImportOutcome::Failed(DecimationError::UnknownSource(_))
    ));
    assert!(!registry.remove_source(source));
}

#[test]
fn report_serialises_to_json() {
    let mock = two_classes();
    let mut registry = PieceRegistry::new();
    let source = register(&mut registry, &mock);

    let report = expect_cached(import(
        &mut registry,
        source,
        ClipSpec::disabled(),
        options(10_100),
        &AbortFlag::new(),
    ));

    let path = std::env::temp_dir().join(format!("decimation-report-{}.json", std::process::id()));
    report.write_json(&path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(json["total_points"], 101_000);
    assert_eq!(json["pieces"].as_array().unwrap().len(), 2);
    assert_eq!(json["pieces"][1]["name"], "building");
}
