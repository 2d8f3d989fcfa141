use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zsheet_core::document::{
    ArrayItem, Attribute, BlockDefinition, BlockReference, Document, DynamicProperty, Entity,
    Polyline, PropertyValue,
};
use zsheet_core::geometry::{Point2, Transform2, Vector2};
use zsheet_core::sheet::GridLocator;
use zsheet_io::{DocumentLoader, JsonFacade};

use crate::errors::FrontendError;

/// 环境变量：未显式给出 `--document` 时读取的场景路径。
pub const DOCUMENT_ENV: &str = "ZSHEET_DOCUMENT";

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Json(PathBuf),
    Demo,
}

#[derive(Debug)]
pub struct LoadedDocument {
    pub document: Document,
    pub source: DocumentSource,
}

/// 显式路径加载失败直接报错；环境变量指定的路径失败时回退到内置示例。
pub fn load_document(explicit: Option<&Path>) -> Result<LoadedDocument, FrontendError> {
    let loader = JsonFacade::new();
    if let Some(path) = explicit {
        let document = loader.load(path).map_err(FrontendError::Load)?;
        info!(path = %path.display(), "从 JSON 加载文档成功");
        return Ok(LoadedDocument {
            document,
            source: DocumentSource::Json(path.to_path_buf()),
        });
    }

    if let Some(path) = env::var_os(DOCUMENT_ENV) {
        let path = PathBuf::from(path);
        match loader.load(&path) {
            Ok(document) => {
                info!(path = %path.display(), "从 JSON 加载文档成功");
                return Ok(LoadedDocument {
                    document,
                    source: DocumentSource::Json(path),
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载场景失败，回退到内置示例");
            }
        }
    }

    Ok(LoadedDocument {
        document: demo_document(),
        source: DocumentSource::Demo,
    })
}

const FRAME_WIDTH: f64 = 210.0;
const FRAME_HEIGHT: f64 = 297.0;
const FRAME_GAP: f64 = 30.0;
/// 多段线示例相对阵列示例的水平偏移。
const POLYLINE_DEMO_OFFSET: f64 = 5000.0;

fn frame(origin: Point2) -> Vec<Point2> {
    vec![
        origin,
        Point2::new(origin.x() + FRAME_WIDTH, origin.y()),
        Point2::new(origin.x() + FRAME_WIDTH, origin.y() + FRAME_HEIGHT),
        Point2::new(origin.x(), origin.y() + FRAME_HEIGHT),
    ]
}

fn stamp(at: Point2, variant: &str, attributes: &[(&str, &str)]) -> BlockReference {
    BlockReference {
        name: "*U1".to_string(),
        dynamic_block: Some("SG_Форма".to_string()),
        insert: at,
        scale: Vector2::new(1.0, 1.0),
        rotation: 0.0,
        attributes: attributes
            .iter()
            .map(|(tag, text)| Attribute::new(*tag, *text, Point2::new(at.x() + 185.0, at.y() + 5.0)))
            .collect(),
        properties: vec![
            DynamicProperty::new("Штамп", PropertyValue::Text(variant.to_string())),
            DynamicProperty::new("Нумерация", PropertyValue::Bool(true)),
            DynamicProperty::new("Выбор стороны края", PropertyValue::Text("Справа".to_string())),
        ],
        layer: "STAMPS".to_string(),
    }
}

/// 内置示例：一行三列的图框阵列（首张为封面）以及两张独立的多段线图框。
pub fn demo_document() -> Document {
    let mut doc = Document::new();
    doc.add_block_definition(BlockDefinition {
        name: "*U1".to_string(),
        base_point: Point2::ORIGIN,
        entities: vec![Entity::Polyline(Polyline {
            vertices: frame(Point2::ORIGIN),
            is_closed: true,
            layer: "0".to_string(),
        })],
    });

    let items = (0..3)
        .map(|column| ArrayItem {
            locator: GridLocator::new(0, column, 0),
            transform: Transform2::from_translation(Vector2::new(
                f64::from(column) * (FRAME_WIDTH + FRAME_GAP),
                0.0,
            )),
        })
        .collect();
    doc.add_associative_array(
        Point2::ORIGIN,
        vec![Entity::Polyline(Polyline {
            vertices: frame(Point2::ORIGIN),
            is_closed: true,
            layer: "FRAMES".to_string(),
        })],
        items,
        "FRAMES",
    );
    let step = FRAME_WIDTH + FRAME_GAP;
    doc.add_block_reference(stamp(
        Point2::new(step, 0.0),
        "Штамп 1",
        &[("КОМПАНИЯ_1", "ООО Проект"), ("НАИМЕНОВАНИЕ_1", "План этажа"), ("ЛИСТ_1", "1")],
    ));
    doc.add_block_reference(stamp(
        Point2::new(2.0 * step, 0.0),
        "Штамп 2",
        &[("КОМПАНИЯ_2", "ООО Проект"), ("ЛИСТОВ_1", "2"), ("ЛИСТ_2", "2")],
    ));

    let base = Point2::new(POLYLINE_DEMO_OFFSET, 0.0);
    doc.add_polyline(frame(base), true, "FRAMES");
    doc.add_polyline(
        frame(Point2::new(base.x() + step, base.y())),
        true,
        "FRAMES",
    );
    doc.add_text(Point2::new(base.x() + step + 160.0, 10.0), "Лист", 2.5, "0");
    doc.add_text(Point2::new(base.x() + step + 185.0, 10.0), "3", 2.5, "0");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use zsheet_core::document::EntityKind;

    #[test]
    fn demo_contains_array_and_loose_frames() {
        let doc = demo_document();
        let kinds: Vec<EntityKind> = doc.entities().map(|(_, entity)| entity.kind()).collect();
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| **kind == EntityKind::AssociativeArray)
                .count(),
            1
        );
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| **kind == EntityKind::Polyline)
                .count(),
            2
        );
        assert!(doc.block("*U1").is_some());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = std::env::temp_dir().join("zsheet-frontend-missing");
        let err = load_document(Some(&dir.join("absent.json"))).unwrap_err();
        assert!(matches!(err, FrontendError::Load(_)));
    }
}
