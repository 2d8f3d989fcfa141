use zsheet_config::SheetConfig;
use zsheet_core::document::{
    ArrayItem, Attribute, BlockDefinition, BlockReference, Document, DynamicProperty, Entity,
    EntityId, Polyline, PropertyValue, SettingValue, SpaceMode, ViewportScale,
};
use zsheet_core::geometry::{Point2, Transform2, Vector2};
use zsheet_core::sheet::GridLocator;
use zsheet_engine::errors::EngineError;
use zsheet_engine::extract::SelectionMode;
use zsheet_engine::host::{EntityStore, EnvironmentSettings};
use zsheet_engine::pipeline::{Pipeline, PipelineState};
use zsheet_engine::session::{PromptReply, Session};

fn rectangle(x: f64, y: f64, w: f64, h: f64) -> Vec<Point2> {
    vec![
        Point2::new(x, y),
        Point2::new(x + w, y),
        Point2::new(x + w, y + h),
        Point2::new(x, y + h),
    ]
}

fn frame_definition(doc: &mut Document) {
    doc.add_block_definition(BlockDefinition {
        name: "*U3".to_string(),
        base_point: Point2::ORIGIN,
        entities: vec![Entity::Polyline(Polyline {
            vertices: rectangle(0.0, 0.0, 210.0, 297.0),
            is_closed: true,
            layer: "0".to_string(),
        })],
    });
}

fn title_block(doc: &mut Document, at: Point2, variant: &str, attributes: &[(&str, &str)]) -> EntityId {
    doc.add_block_reference(BlockReference {
        name: "*U3".to_string(),
        dynamic_block: Some("SG_Форма".to_string()),
        insert: at,
        scale: Vector2::new(1.0, 1.0),
        rotation: 0.0,
        attributes: attributes
            .iter()
            .map(|(tag, text)| {
                Attribute::new(*tag, *text, Point2::new(at.x() + 180.0, at.y() + 8.0))
            })
            .collect(),
        properties: vec![
            DynamicProperty::new("Штамп", PropertyValue::Text(variant.to_string())),
            DynamicProperty::new("Нумерация", PropertyValue::Bool(true)),
        ],
        layer: "0".to_string(),
    })
}

/// 关联阵列：A4 外框，项目按 (行, 列, 偏移) 摆放。
fn frame_array(doc: &mut Document, cells: &[(i32, i32, f64, f64)]) -> EntityId {
    let items = cells
        .iter()
        .map(|(row, column, dx, dy)| ArrayItem {
            locator: GridLocator::new(*row, *column, 0),
            transform: Transform2::from_translation(Vector2::new(*dx, *dy)),
        })
        .collect();
    doc.add_associative_array(
        Point2::ORIGIN,
        vec![Entity::Polyline(Polyline {
            vertices: rectangle(0.0, 0.0, 210.0, 297.0),
            is_closed: true,
            layer: "0".to_string(),
        })],
        items,
        "FRAMES",
    )
}

fn assert_settings_restored(session: &Session) {
    for (name, value) in [
        ("SAVETIME", 10),
        ("REGENMODE", 1),
        ("FIELDEVAL", 31),
        ("LAYOUTREGENCTL", 2),
        ("LAYOUTCREATEVIEWPORT", 1),
    ] {
        assert_eq!(
            session.get_setting(name),
            Some(SettingValue::Int(value)),
            "{name} not restored"
        );
    }
    assert_eq!(session.document().space(), SpaceMode::Model);
}

#[test]
fn single_array_zone_keeps_existing_sheet_number() {
    let mut doc = Document::new();
    frame_definition(&mut doc);
    let array = frame_array(&mut doc, &[(0, 0, 0.0, 0.0)]);
    let block = title_block(
        &mut doc,
        Point2::ORIGIN,
        "Штамп 2",
        &[("ЛИСТ_2", "5"), ("ЛИСТОВ_1", "9"), ("КОМПАНИЯ_2", "ООО Проект")],
    );

    let mut session = Session::with_document(doc);
    session
        .push_reply(PromptReply::Keyword("Array".into()))
        .push_reply(PromptReply::Pick(vec![array]))
        .push_reply(PromptReply::AcceptDefault);

    let report = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .expect("run");
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.mode, SelectionMode::Array);
    assert!(!report.renumber);
    assert_eq!(report.zone_count(), 1);
    assert_eq!(report.total_sheet_count(), 1);
    assert_eq!(report.numbering.sheet_counter, 1);
    assert_eq!(report.numbering.title_page_counter, 0);
    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].name, "5");
    assert!(report.skipped.is_empty());

    let metadata = report.zones[&GridLocator::new(0, 0, 0)]
        .metadata
        .as_ref()
        .expect("metadata");
    assert_eq!(metadata.fields.company(), Some("ООО Проект"));

    let doc = session.document();
    let layout = doc.layout(report.pages[0].page).expect("layout");
    let viewport = layout
        .viewports
        .iter()
        .find(|viewport| viewport.is_locked)
        .expect("locked viewport");
    assert!(viewport.is_on);
    assert_eq!(viewport.scale, ViewportScale::OneToOne);
    assert_eq!(
        layout.plot.media.as_deref(),
        Some("ISO_full_bleed_A4_(297.00_x_210.00_MM)")
    );

    let fields = session.read_attribute_fields(block).expect("fields");
    assert_eq!(fields[0].text, "5");
    assert_eq!(fields[1].text, "9");
    assert_settings_restored(&session);
    assert_eq!(session.document().regen_count(), 1);
}

#[test]
fn stacked_polylines_form_two_rows() {
    let mut doc = Document::new();
    doc.add_polyline(rectangle(0.0, 0.0, 210.0, 297.0), true, "0");
    doc.add_polyline(rectangle(0.0, 400.0, 210.0, 297.0), true, "0");
    doc.add_text(Point2::new(170.0, 10.0), "Лист", 2.5, "0");
    doc.add_text(Point2::new(190.0, 10.0), "2", 2.5, "0");

    let mut session = Session::with_document(doc);
    session
        .push_reply(PromptReply::Keyword("Polylines".into()))
        .push_reply(PromptReply::PickAll);

    let report = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .expect("run");
    assert_eq!(report.mode, SelectionMode::Polyline);
    let locators: Vec<_> = report.zones.keys().copied().collect();
    assert_eq!(
        locators,
        vec![GridLocator::new(0, 0, 0), GridLocator::new(1, 0, 0)]
    );
    assert_eq!(
        report.zones[&GridLocator::new(0, 0, 0)].extents().min(),
        Point2::new(0.0, 400.0)
    );

    let names: Vec<_> = report
        .pages
        .iter()
        .map(|page| (page.locator.row, page.name.as_str()))
        .collect();
    assert_eq!(names, vec![(0, "TITLE"), (1, "2")]);
    assert_eq!(report.total_sheet_count(), 2);
    assert_settings_restored(&session);
}

#[test]
fn zone_without_title_block_or_number_becomes_title_page() {
    let mut doc = Document::new();
    doc.add_polyline(rectangle(0.0, 0.0, 210.0, 297.0), true, "0");
    doc.add_text(Point2::new(20.0, 20.0), "Примечание", 2.5, "0");

    let mut session = Session::with_document(doc);
    session
        .push_reply(PromptReply::Keyword("Polylines".into()))
        .push_reply(PromptReply::PickAll);

    let report = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .expect("run");
    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].name, "TITLE");
    assert_eq!(report.numbering.title_page_counter, 1);
    assert_eq!(report.numbering.sheet_counter, 0);
}

fn renumber_document() -> (Document, EntityId, [EntityId; 3]) {
    let mut doc = Document::new();
    frame_definition(&mut doc);
    let array = frame_array(
        &mut doc,
        &[(0, 0, 0.0, 0.0), (0, 1, 250.0, 0.0), (1, 0, 0.0, -350.0)],
    );
    let main = title_block(
        &mut doc,
        Point2::ORIGIN,
        "Штамп 2",
        &[("ЛИСТ_2", "7"), ("ЛИСТОВ_1", "1")],
    );
    let second = title_block(&mut doc, Point2::new(250.0, 0.0), "Штамп 1", &[("ЛИСТ_1", "8")]);
    let cover = title_block(
        &mut doc,
        Point2::new(0.0, -350.0),
        "Без штампа",
        &[("ЛИСТ_1", "9")],
    );
    (doc, array, [main, second, cover])
}

#[test]
fn renumbering_rewrites_sheet_and_count_fields() {
    let (doc, array, [main, second, cover]) = renumber_document();
    let mut session = Session::with_document(doc);
    session
        .push_reply(PromptReply::Keyword("Array".into()))
        .push_reply(PromptReply::Pick(vec![array]))
        .push_reply(PromptReply::Keyword("Yes".into()));

    let report = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .expect("run");
    assert!(report.renumber);
    assert_eq!(report.total_sheet_count(), 3);
    let names: Vec<_> = report.pages.iter().map(|page| page.name.as_str()).collect();
    assert_eq!(names, vec!["1", "2", "TITLE"]);

    let texts = |id| -> Vec<String> {
        session
            .read_attribute_fields(id)
            .expect("fields")
            .into_iter()
            .map(|field| field.text)
            .collect()
    };
    assert_eq!(texts(main), vec!["1", "3"]);
    assert_eq!(texts(second), vec!["2"]);
    assert_eq!(texts(cover), vec!["9"]);
}

#[test]
fn failed_page_is_skipped_and_run_continues() {
    let (doc, array, _) = renumber_document();
    let mut session = Session::with_document(doc);
    session.reject_page_name("8");
    session
        .push_reply(PromptReply::Keyword("Array".into()))
        .push_reply(PromptReply::Pick(vec![array]))
        .push_reply(PromptReply::Keyword("No".into()));

    let report = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .expect("run");
    let names: Vec<_> = report.pages.iter().map(|page| page.name.as_str()).collect();
    assert_eq!(names, vec!["7", "TITLE"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].locator, GridLocator::new(0, 1, 0));
    assert!(report.skipped[0].reason.contains("8"));
    assert_eq!(session.document().layouts().count(), 2);
    assert_settings_restored(&session);
}

#[test]
fn transaction_failure_is_fatal_but_restores_environment() {
    let mut doc = Document::new();
    doc.add_polyline(rectangle(0.0, 0.0, 210.0, 297.0), true, "0");
    doc.add_polyline(rectangle(0.0, 400.0, 210.0, 297.0), true, "0");
    let mut session = Session::with_document(doc);
    // 发现 1 次、两次遍历各 2 次，第一次生成布局时提交失败
    session.fail_commits_after(5);
    session
        .push_reply(PromptReply::Keyword("Polylines".into()))
        .push_reply(PromptReply::PickAll);

    let err = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .unwrap_err();
    assert!(matches!(err, EngineError::TransactionFailure(_)));
    assert!(err.is_fatal());
    assert_eq!(session.document().layouts().count(), 0);
    assert_settings_restored(&session);
    assert_eq!(session.document().regen_count(), 1);
}

#[test]
fn rerun_on_fresh_document_targets_same_names() {
    let run = || {
        let (doc, array, _) = renumber_document();
        let mut session = Session::with_document(doc);
        session
            .push_reply(PromptReply::Keyword("Array".into()))
            .push_reply(PromptReply::Pick(vec![array]))
            .push_reply(PromptReply::AcceptDefault);
        Pipeline::new(SheetConfig::default())
            .run(&mut session)
            .expect("run")
            .pages
            .into_iter()
            .map(|page| page.name)
            .collect::<Vec<_>>()
    };
    let first = run();
    assert_eq!(first, vec!["7", "8", "TITLE"]);
    assert_eq!(first, run());
}

#[test]
fn cancelled_renumber_prompt_aborts() {
    let (doc, array, _) = renumber_document();
    let mut session = Session::with_document(doc);
    session
        .push_reply(PromptReply::Keyword("Array".into()))
        .push_reply(PromptReply::Pick(vec![array]))
        .push_reply(PromptReply::Cancel);

    let err = Pipeline::new(SheetConfig::default())
        .run(&mut session)
        .unwrap_err();
    assert!(matches!(err, EngineError::InputAborted(_)));
    assert_eq!(session.document().layouts().count(), 0);
}
