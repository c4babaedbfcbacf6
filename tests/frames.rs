//! End-to-end frame scenarios through the workspace.

use glam::DVec2;

use frameboard::config::AppConfig;
use frameboard::error::FrameError;
use frameboard::geometry::{BasisIssue, Rect};
use frameboard::render::{RecordingCanvas, SvgCanvas};
use frameboard::script_runner::{RunOptions, ScriptErrorKind};
use frameboard::transform::screen_to_local;
use frameboard::workspace::{FramePatch, Workspace};

fn approx(a: DVec2, b: DVec2) -> bool {
    (a - b).length() < 1e-9
}

#[tokio::test]
async fn test_click_inside_zoomed_child_selects_child() {
    let mut ws = Workspace::new(AppConfig::default());
    let root = ws.create_frame(DVec2::ZERO, DVec2::X, DVec2::Y, None).unwrap().id;
    let child = ws
        .create_frame_with_bounds(
            DVec2::new(1.0, 1.0),
            DVec2::X,
            DVec2::Y,
            Rect::from_corners(DVec2::ZERO, DVec2::new(2.0, 2.0)),
            Some(root),
        )
        .unwrap()
        .id;
    let patch = FramePatch::from_json(&serde_json::json!({"viewport": {"zoom": 2.0}})).unwrap();
    ws.update_frame(child, patch).unwrap();

    let space = ws.screen_space();
    let inside_child = space.world_to_screen(DVec2::new(1.5, 1.5));
    assert_eq!(ws.select_at(inside_child), Some(child));
    assert_eq!(ws.selected(), Some(child));

    let local = screen_to_local(inside_child, child, ws.registry(), &space).unwrap();
    assert!(approx(local, DVec2::new(0.25, 0.25)), "{:?}", local);

    let root_only = space.world_to_screen(DVec2::new(-3.0, -3.0));
    assert_eq!(ws.select_at(root_only), Some(root));

    let outside = space.world_to_screen(DVec2::new(50.0, 50.0));
    assert_eq!(ws.select_at(outside), None);
    assert_eq!(ws.selected(), None);
}

#[tokio::test]
async fn test_zero_basis_frame_renders_with_warning() {
    let mut ws = Workspace::new(AppConfig::default());
    let flat = ws
        .create_frame(DVec2::ZERO, DVec2::ZERO, DVec2::ZERO, None)
        .unwrap()
        .id;
    let mut canvas = RecordingCanvas::new(800.0, 600.0);
    let report = ws.render(&mut canvas);

    assert_eq!(report.frames_drawn, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].frame, flat);
    assert_eq!(report.warnings[0].issue, BasisIssue::ZeroBasis);
    assert_eq!(report.warnings[0].to_string(), format!("{}: zero basis", flat));
    assert_eq!(canvas.save_depth(), 0);

    // Still selectable.
    let centre = ws.screen_space().world_to_screen(DVec2::ZERO);
    assert_eq!(ws.hit_test(centre), Some(flat));
}

#[tokio::test]
async fn test_draw_run_yields_one_red_vector() {
    let mut ws = Workspace::new(AppConfig::default());
    ws.initialize().await.unwrap();
    let id = ws.create_frame(DVec2::ZERO, DVec2::X, DVec2::Y, None).unwrap().id;

    let result = ws
        .run_frame_code(id, "draw([1, 2], \"#ff0000\");", RunOptions::default())
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.vectors.len(), 1);

    let frame = ws.frame(id).unwrap();
    assert_eq!(frame.vectors.len(), 1);
    assert_eq!(frame.vectors[0].start, DVec2::ZERO);
    assert_eq!(frame.vectors[0].end, DVec2::new(1.0, 2.0));
    assert_eq!(frame.vectors[0].color.to_hex(), "#ff0000");

    let mut svg = SvgCanvas::new(800.0, 600.0);
    ws.render(&mut svg);
    assert!(svg.finish().contains("rgb(255,0,0)"));
}

#[tokio::test]
async fn test_run_before_initialization_is_not_ready() {
    let mut ws = Workspace::new(AppConfig::default());
    let id = ws.create_frame(DVec2::ZERO, DVec2::X, DVec2::Y, None).unwrap().id;
    let result = ws.run_frame_code(id, "draw([1, 2]);", RunOptions::default()).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ScriptErrorKind::NotReady));
    assert!(ws.frame(id).unwrap().vectors.is_empty());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["error"]["kind"], "NotReadyError");
}

#[tokio::test]
async fn test_plots_and_partial_failure() {
    let mut ws = Workspace::new(AppConfig::default());
    ws.initialize().await.unwrap();
    let id = ws.create_frame(DVec2::ZERO, DVec2::X, DVec2::Y, None).unwrap().id;

    let code = "plot(\"x**2 + y**2 = 4\", -3, 3);\nplot(|x| x, -1, 1);\nthrow \"late failure\";";
    let result = ws.run_frame_code(id, code, RunOptions::default()).await;
    assert!(!result.success);
    assert_eq!(result.error.as_ref().unwrap().message, "late failure");

    let plots = &ws.frame(id).unwrap().plots;
    assert_eq!(plots.len(), 2);
    for p in plots[0].polylines.iter().flatten() {
        assert!((p.length() - 2.0).abs() < 0.1);
    }
    assert!(plots[1].point_count() >= 2);
}

#[tokio::test]
async fn test_validation_error_blocks_update() {
    let mut ws = Workspace::new(AppConfig::default());
    let id = ws.create_frame(DVec2::ZERO, DVec2::X, DVec2::Y, None).unwrap().id;
    let err = FramePatch::from_json(&serde_json::json!({"origin": ["one", 2]})).unwrap_err();
    assert!(matches!(err, FrameError::Validation { .. }));
    assert_eq!(ws.frame(id).unwrap().origin, DVec2::ZERO);
}
