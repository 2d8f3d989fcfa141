//! 图框元数据读取：动态块图框参照，或区域内“Лист”标签附近的自由文字。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use zsheet_config::TitleBlockConfig;
use zsheet_core::document::{DynamicProperty, EntityId};
use zsheet_core::geometry::{Bounds2D, Point2};
use zsheet_core::sheet::{
    BindingEdge, NumberingContext, TitleBlockFields, TitleBlockMetadata, TitleBlockVariant, Zone,
};

use crate::errors::EngineError;
use crate::extract::ReadPass;
use crate::host::{Host, with_transaction};

const PROP_VARIANT: &str = "Штамп";
const PROP_NUMBERING: &str = "Нумерация";
const PROP_MIRRORED: &str = "Отражение нумерации";
const PROP_EDGE: &str = "Выбор стороны края";
const PROP_INDENT: &str = "Отступ";

const TAG_NUMBER: &str = "НОМЕР";
const TAG_SHEET_COUNT: &str = "ЛИСТОВ_1";

/// 解析“Штамп”参数值。
fn parse_variant(value: &str) -> Option<TitleBlockVariant> {
    match value {
        "Штамп 1" => Some(TitleBlockVariant::Variant1),
        "Штамп 2" => Some(TitleBlockVariant::Variant2),
        "Штамп 3" => Some(TitleBlockVariant::Variant3),
        "Без штампа" => Some(TitleBlockVariant::None),
        _ => None,
    }
}

fn parse_edge(value: &str) -> Option<BindingEdge> {
    match value {
        "Слева" => Some(BindingEdge::Left),
        "Справа" => Some(BindingEdge::Right),
        _ => None,
    }
}

/// 页码所在的属性标签。
fn sheet_tag(variant: TitleBlockVariant) -> Option<&'static str> {
    match variant {
        TitleBlockVariant::Variant1 => Some("ЛИСТ_1"),
        TitleBlockVariant::Variant2 => Some("ЛИСТ_2"),
        TitleBlockVariant::Variant3 => Some("ЛИСТ_3"),
        TitleBlockVariant::None => None,
    }
}

/// 把一个属性值放进对应种类的字段；不属于该种类的标签返回 `false`。
fn assign_field(fields: &mut TitleBlockFields, tag: &str, text: &str) -> bool {
    let text = text.to_string();
    match fields {
        TitleBlockFields::Variant1 {
            company,
            description,
            description2,
        } => match tag {
            "КОМПАНИЯ_1" => *company = text,
            "НАИМЕНОВАНИЕ_1" => *description = text,
            "НАИМЕНОВАНИЕ_2" => *description2 = text,
            _ => return false,
        },
        TitleBlockFields::Variant2(main) => match tag {
            "КОМПАНИЯ_2" => main.company = text,
            "НАИМЕНОВАНИЕ_3" => main.description = text,
            TAG_SHEET_COUNT => main.sheet_count = text,
            "СТАДИЯ_1" => main.stage = text,
            "УСЛОВНЫЕ_ОБОЗНАЧЕНИЯ_1" => main.legend = text,
            _ => {
                let staff_slot = |prefix: &str| {
                    tag.strip_prefix(prefix)
                        .and_then(|index| index.parse::<usize>().ok())
                        .filter(|index| (1..=5).contains(index))
                        .map(|index| index - 1)
                };
                if let Some(slot) = staff_slot("СПЕЦ_") {
                    main.staff[slot].post = text;
                } else if let Some(slot) = staff_slot("ФАМИЛИЯ_") {
                    main.staff[slot].name = text;
                } else {
                    return false;
                }
            }
        },
        TitleBlockFields::Variant3 {
            company,
            description,
        } => match tag {
            "КОМПАНИЯ_3" => *company = text,
            "НАИМЕНОВАНИЕ_4" => *description = text,
            _ => return false,
        },
        TitleBlockFields::None => return false,
    }
    true
}

/// 读取动态块图框参照（模板名默认为 `SG_Форма`）。
#[derive(Debug, Clone)]
pub struct TitleBlockReader {
    template_name: String,
    title_sentinel: String,
}

impl TitleBlockReader {
    pub fn new(template_name: impl Into<String>, title_sentinel: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            title_sentinel: title_sentinel.into(),
        }
    }

    pub fn from_config(config: &TitleBlockConfig) -> Self {
        Self::new(config.template_name.clone(), config.title_sentinel.clone())
    }

    /// 读取区域内第一个被接受的图框参照。一个都没有时按标题页处理，范围留空由区域边界补上。
    pub fn read_zone(
        &self,
        host: &mut dyn Host,
        contents: &[EntityId],
        numbering: &mut NumberingContext,
        pass: ReadPass,
    ) -> Result<TitleBlockMetadata, EngineError> {
        for id in contents {
            match self.read_reference(host, *id, numbering, pass) {
                Ok(metadata) => return Ok(metadata),
                Err(EngineError::MetadataRejected(entity)) => {
                    debug!(entity, "跳过非图框实体");
                }
                Err(err) => return Err(err),
            }
        }

        debug!("区域内没有图框，按标题页处理");
        numbering.advance_title_page();
        Ok(TitleBlockMetadata {
            sheet_label: self.title_sentinel.clone(),
            ..TitleBlockMetadata::default()
        })
    }

    /// 读取单个图框参照并推进计数器。
    ///
    /// 阵列本身或模板名不符时返回 `MetadataRejected`，不改动文档与计数器。
    /// 提交遍历且重新编号时，页码属性改写为当前页号，总页数属性改写为总数（总数大于 0 时）。
    pub fn read_reference(
        &self,
        host: &mut dyn Host,
        id: EntityId,
        numbering: &mut NumberingContext,
        pass: ReadPass,
    ) -> Result<TitleBlockMetadata, EngineError> {
        if host.is_associative_array(id) {
            return Err(EngineError::MetadataRejected(id.get()));
        }
        match host.block_template_name(id) {
            Some(name) if name == self.template_name => {}
            _ => return Err(EngineError::MetadataRejected(id.get())),
        }

        let renumber = pass == ReadPass::Commit && numbering.renumbering();
        let counters = *numbering;
        let mut metadata = with_transaction(host, |host| {
            let mut metadata = TitleBlockMetadata {
                extents: host.entity_extents(id),
                ..TitleBlockMetadata::default()
            };
            let properties = host.read_dynamic_properties(id)?;
            apply_properties(&mut metadata, &properties);

            let variant_sheet_tag = sheet_tag(metadata.fields.variant());
            for field in host.read_attribute_fields(id)? {
                if field.is_constant {
                    continue;
                }
                let mut text = field.text;
                if renumber {
                    let replacement = if Some(field.tag.as_str()) == variant_sheet_tag {
                        Some(counters.sheet_counter)
                    } else if field.tag == TAG_SHEET_COUNT
                        && metadata.variant() == TitleBlockVariant::Variant2
                        && counters.total_sheet_count > 0
                    {
                        Some(counters.total_sheet_count)
                    } else {
                        None
                    };
                    if let Some(value) = replacement {
                        text = value.to_string();
                        host.write_attribute_field(id, &field.tag, &text)?;
                    }
                }

                if Some(field.tag.as_str()) == variant_sheet_tag {
                    metadata.sheet_label = text;
                } else if field.tag == TAG_NUMBER {
                    if metadata.numbering_enabled {
                        metadata.number = text;
                    }
                } else {
                    assign_field(&mut metadata.fields, &field.tag, &text);
                }
            }
            Ok(metadata)
        })?;

        if metadata.variant() == TitleBlockVariant::None {
            metadata.sheet_label = self.title_sentinel.clone();
            numbering.advance_title_page();
        } else {
            numbering.advance_sheet();
        }
        debug!(
            entity = id.get(),
            variant = ?metadata.variant(),
            sheet = %metadata.sheet_label,
            "已读取图框"
        );
        Ok(metadata)
    }
}

fn apply_properties(metadata: &mut TitleBlockMetadata, properties: &[DynamicProperty]) {
    for property in properties {
        match property.name.as_str() {
            PROP_VARIANT => {
                if let Some(variant) = parse_variant(&property.value.as_text()) {
                    metadata.fields = TitleBlockFields::empty(variant);
                }
            }
            PROP_NUMBERING => {
                if let Some(enabled) = property.value.as_bool() {
                    metadata.numbering_enabled = enabled;
                }
            }
            PROP_MIRRORED => {
                if let Some(mirrored) = property.value.as_bool() {
                    metadata.numbering_mirrored = mirrored;
                }
            }
            PROP_EDGE => {
                if let Some(edge) = parse_edge(&property.value.as_text()) {
                    metadata.binding_edge = edge;
                }
            }
            PROP_INDENT => {}
            _ => {}
        }
    }
}

// 已知限制：标签匹配在去掉空格之后进行，被空格拆开的“Л ист”同样算作标签。
static SHEET_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[Лл]ист\s*$").expect("sheet label pattern"));
static SHEET_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*$").expect("sheet number pattern"));

/// 自由文字的分类结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextClass {
    Label,
    Number(String),
    Other,
}

/// 去掉空格后按正则分类。
pub fn classify_text(content: &str) -> TextClass {
    let compact = content.replace(' ', "");
    if SHEET_LABEL.is_match(&compact) {
        TextClass::Label
    } else if SHEET_NUMBER.is_match(&compact) {
        TextClass::Number(compact)
    } else {
        TextClass::Other
    }
}

/// 在“Лист”标签附近寻找页码数字（多段线区域）。
#[derive(Debug, Clone)]
pub struct FreeTextReader {
    title_sentinel: String,
}

impl FreeTextReader {
    pub fn new(title_sentinel: impl Into<String>) -> Self {
        Self {
            title_sentinel: title_sentinel.into(),
        }
    }

    /// 范围取区域边界；取离标签中心最近的数字作为页码，没有数字时按标题页处理。
    pub fn read_zone(
        &self,
        host: &mut dyn Host,
        zone: &Zone,
        contents: &[EntityId],
        numbering: &mut NumberingContext,
    ) -> Result<TitleBlockMetadata, EngineError> {
        let label = with_transaction(host, |host| {
            let mut label_extents = Bounds2D::empty();
            let mut numbers: Vec<(Bounds2D, String)> = Vec::new();
            for id in contents {
                let Some(record) = host.read_text(*id) else {
                    continue;
                };
                match classify_text(&record.content) {
                    TextClass::Label => label_extents = record.extents,
                    TextClass::Number(value) => numbers.push((record.extents, value)),
                    TextClass::Other => {}
                }
            }
            Ok(nearest_number(label_extents.center_or_origin(), &numbers))
        })?;

        let sheet_label = match label {
            Some(value) => {
                numbering.advance_sheet();
                value
            }
            None => {
                numbering.advance_title_page();
                self.title_sentinel.clone()
            }
        };
        debug!(sheet = %sheet_label, "已读取自由文字页码");
        Ok(TitleBlockMetadata {
            extents: Some(zone.extents()),
            sheet_label,
            ..TitleBlockMetadata::default()
        })
    }
}

/// 中心落在原点的候选视为无效。
fn nearest_number(anchor: Point2, numbers: &[(Bounds2D, String)]) -> Option<String> {
    numbers
        .iter()
        .filter_map(|(extents, value)| {
            let center = extents.center_or_origin();
            (center != Point2::ORIGIN).then(|| (center.distance_to(anchor), value))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, value)| value.clone())
}
