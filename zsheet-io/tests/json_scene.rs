use std::fs;

use tempfile::tempdir;
use zsheet_core::document::{
    ArrayItem, Attribute, BlockReference, Document, DynamicProperty, Entity, Polyline,
    PropertyValue, SettingValue,
};
use zsheet_core::geometry::{Point2, Transform2, Vector2};
use zsheet_core::sheet::GridLocator;
use zsheet_io::{DocumentLoader, DocumentSaver, IoError, JsonFacade};

fn sample_document() -> Document {
    let mut document = Document::new();
    document.add_polyline(
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(210.0, 0.0),
            Point2::new(210.0, 297.0),
            Point2::new(0.0, 297.0),
        ],
        true,
        "frames",
    );
    document.add_text(Point2::new(190.0, 10.0), "Лист", 3.5, "0");
    document.add_mtext(Point2::new(200.0, 10.0), "4", 3.5, None, "0");
    document.add_block_reference(BlockReference {
        name: "*U12".to_string(),
        dynamic_block: Some("SG_Форма".to_string()),
        insert: Point2::new(25.0, 5.0),
        scale: Vector2::new(1.0, 1.0),
        rotation: 0.0,
        attributes: vec![Attribute::new("НОМЕР", "17", Point2::new(180.0, 8.0))],
        properties: vec![
            DynamicProperty::new("Штамп", PropertyValue::Text("Штамп 1".to_string())),
            DynamicProperty::new("Нумерация", PropertyValue::Bool(true)),
        ],
        layer: "stamps".to_string(),
    });
    let contour = Entity::Polyline(Polyline {
        vertices: vec![
            Point2::new(0.0, 0.0),
            Point2::new(420.0, 0.0),
            Point2::new(420.0, 297.0),
            Point2::new(0.0, 297.0),
        ],
        is_closed: true,
        layer: "frames".to_string(),
    });
    document.add_associative_array(
        Point2::new(1000.0, 0.0),
        vec![contour],
        vec![
            ArrayItem {
                locator: GridLocator::new(0, 0, 0),
                transform: Transform2::default(),
            },
            ArrayItem {
                locator: GridLocator::new(0, 1, 0),
                transform: Transform2::from_translation(Vector2::new(450.0, 0.0)),
            },
        ],
        "frames",
    );
    document.set_system_variable("SAVETIME", SettingValue::Int(0));
    document
}

#[test]
fn saved_scene_loads_back_with_same_content() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scene.json");
    let facade = JsonFacade::new();
    let original = sample_document();

    facade.save(&original, &path).expect("save");
    let loaded = facade.load(&path).expect("load");

    assert_eq!(loaded.entities().count(), original.entities().count());
    assert_eq!(loaded.system_variable("SAVETIME"), Some(&SettingValue::Int(0)));
    assert_eq!(loaded.system_variable("REGENMODE"), Some(&SettingValue::Int(1)));
    assert!(loaded.layers().any(|layer| layer.name == "stamps"));

    let reference = loaded
        .entities()
        .find_map(|(_, entity)| match entity {
            Entity::BlockReference(reference) => Some(reference),
            _ => None,
        })
        .expect("title block");
    assert_eq!(reference.effective_name(), "SG_Форма");
    assert_eq!(reference.attributes[0].text, "17");
    assert_eq!(
        reference.properties[0].value,
        PropertyValue::Text("Штамп 1".to_string())
    );

    let (array_id, _) = loaded
        .entities()
        .find(|(_, entity)| matches!(entity, Entity::AssociativeArray(_)))
        .expect("array");
    assert_eq!(
        loaded.entity_bounds(*array_id),
        original.entity_bounds(*array_id)
    );
}

#[test]
fn compact_output_is_single_line() {
    let json = JsonFacade::compact()
        .to_json(&sample_document())
        .expect("serialize");
    assert!(!json.contains('\n'));
    assert!(json.starts_with(r#"{"version":1"#));
}

#[test]
fn missing_file_reports_read_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("absent.json");
    let err = JsonFacade::new().load(&path).unwrap_err();
    assert!(matches!(err, IoError::ReadError { path: ref p, .. } if p == &path));
}

#[test]
fn malformed_json_reports_invalid_document() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"version\": 1, \"document\": [").expect("write");
    let err = JsonFacade::new().load(&path).unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)));
}

#[test]
fn unwritable_target_reports_write_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("missing-dir").join("scene.json");
    let err = JsonFacade::new().save(&Document::new(), &path).unwrap_err();
    assert!(matches!(err, IoError::WriteError { .. }));
}
