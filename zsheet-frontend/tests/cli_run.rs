use tempfile::tempdir;
use zsheet_config::SheetConfig;
use zsheet_core::sheet::GridLocator;
use zsheet_engine::extract::SelectionMode;
use zsheet_engine::pipeline::PipelineState;
use zsheet_frontend::cli::{self, CliOptions};
use zsheet_frontend::errors::FrontendError;
use zsheet_frontend::loader::{DocumentSource, demo_document};
use zsheet_io::{DocumentSaver, JsonFacade};

fn page_names(outcome: &cli::CliOutcome) -> Vec<(GridLocator, String)> {
    outcome
        .report
        .pages
        .iter()
        .map(|page| (page.locator, page.name.clone()))
        .collect()
}

#[test]
fn demo_array_produces_title_and_numbered_sheets() {
    let outcome = cli::run(&CliOptions::default(), &SheetConfig::default()).expect("run");
    assert_eq!(outcome.source, DocumentSource::Demo);
    assert_eq!(outcome.commands, vec!["generate_sheets", "help"]);
    assert_eq!(outcome.report.state, PipelineState::Done);
    assert_eq!(outcome.report.zone_count(), 3);
    assert_eq!(outcome.report.total_sheet_count(), 3);
    assert_eq!(
        page_names(&outcome),
        vec![
            (GridLocator::new(0, 0, 0), "TITLE".to_string()),
            (GridLocator::new(0, 1, 0), "1".to_string()),
            (GridLocator::new(0, 2, 0), "2".to_string()),
        ]
    );
    assert_eq!(outcome.document.layouts().count(), 3);
}

#[test]
fn demo_polylines_read_free_text_numbers() {
    let options = CliOptions {
        mode: SelectionMode::Polyline,
        ..CliOptions::default()
    };
    let outcome = cli::run(&options, &SheetConfig::default()).expect("run");
    assert_eq!(outcome.report.mode, SelectionMode::Polyline);
    let names: Vec<String> = page_names(&outcome)
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(names, vec!["TITLE".to_string(), "3".to_string()]);
}

#[test]
fn scene_file_round_trips_through_the_runner() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("scene.json");
    let output = dir.path().join("result.json");
    JsonFacade::new()
        .save(&demo_document(), &input)
        .expect("save scene");

    let options = CliOptions {
        document: Some(input.clone()),
        output: Some(output.clone()),
        ..CliOptions::default()
    };
    let outcome = cli::run(&options, &SheetConfig::default()).expect("run");
    assert_eq!(outcome.source, DocumentSource::Json(input));
    assert!(output.exists());

    // 已生成的布局会让第二次运行的名称带上序号后缀。
    let rerun = CliOptions {
        document: Some(output),
        output: None,
        ..CliOptions::default()
    };
    let outcome = cli::run(&rerun, &SheetConfig::default()).expect("rerun");
    let names: Vec<String> = page_names(&outcome)
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(names, vec!["TITLE (2)", "1 (2)", "2 (2)"]);
}

#[test]
fn polyline_demo_without_array_aborts_in_array_mode() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("empty.json");
    JsonFacade::new()
        .save(&zsheet_core::document::Document::new(), &input)
        .expect("save scene");

    let options = CliOptions {
        document: Some(input),
        ..CliOptions::default()
    };
    let err = cli::run(&options, &SheetConfig::default()).unwrap_err();
    assert!(matches!(err, FrontendError::Command(ref message) if message.contains("取消")));
}
