//! 区域提取：从关联阵列或手绘闭合多段线得到带网格定位的区域表。

use std::collections::BTreeMap;

use tracing::{debug, warn};
use zsheet_config::SheetConfig;
use zsheet_core::document::{EntityId, EntityKind};
use zsheet_core::geometry::Point2;
use zsheet_core::sheet::{GridLocator, NumberingContext, TitleBlockMetadata, Zone};

use crate::errors::EngineError;
use crate::grid::GridOrder;
use crate::host::{Host, PromptStatus, SelectionOptions};
use crate::title_block::{FreeTextReader, TitleBlockReader};

/// 按网格定位排序的区域表，迭代顺序即访问顺序。
pub type ZoneMap = BTreeMap<GridLocator, Zone>;

/// 元数据读取所处的遍历。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPass {
    /// 只推进计数器，不改写文档。
    Count,
    /// 保留读到的元数据，重新编号时写回图框属性。
    Commit,
}

/// 区域来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Array,
    Polyline,
}

impl SelectionMode {
    pub const ARRAY_KEYWORD: &'static str = "Array";
    pub const POLYLINE_KEYWORD: &'static str = "Polylines";

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            Self::ARRAY_KEYWORD => Some(SelectionMode::Array),
            Self::POLYLINE_KEYWORD => Some(SelectionMode::Polyline),
            _ => None,
        }
    }

    #[inline]
    pub fn keyword(self) -> &'static str {
        match self {
            SelectionMode::Array => Self::ARRAY_KEYWORD,
            SelectionMode::Polyline => Self::POLYLINE_KEYWORD,
        }
    }

    /// 构造本模式的提取策略，运行开始时选定一次。
    pub fn strategy(self, config: &SheetConfig) -> Box<dyn ZoneStrategy> {
        match self {
            SelectionMode::Array => Box::new(ArrayZones::from_config(config)),
            SelectionMode::Polyline => Box::new(PolylineZones::from_config(config)),
        }
    }
}

/// 区域提取策略：发现区域，并按本策略的规则读取区域元数据。
pub trait ZoneStrategy {
    fn mode(&self) -> SelectionMode;

    /// 提示用户选择并返回区域表；选择为空或无效时返回空表。
    fn discover_zones(&self, host: &mut dyn Host) -> Result<ZoneMap, EngineError>;

    /// 读取一个区域的元数据。`contents` 为与区域边界相交的实体。
    fn read_metadata(
        &self,
        host: &mut dyn Host,
        zone: &Zone,
        contents: &[EntityId],
        numbering: &mut NumberingContext,
        pass: ReadPass,
    ) -> Result<TitleBlockMetadata, EngineError>;

    /// 是否询问重新编号。
    fn supports_renumbering(&self) -> bool {
        false
    }
}

/// 关联阵列来源：沿用宿主给出的项目定位，区域为源轮廓经项目变换后的位置。
#[derive(Debug, Clone)]
pub struct ArrayZones {
    inset: f64,
    reader: TitleBlockReader,
}

impl ArrayZones {
    pub fn new(inset: f64, reader: TitleBlockReader) -> Self {
        Self { inset, reader }
    }

    pub fn from_config(config: &SheetConfig) -> Self {
        Self::new(
            config.array.boundary_inset,
            TitleBlockReader::from_config(&config.title_block),
        )
    }
}

/// 源轮廓前四个顶点依次向左上、右上、右下、左下偏移。
fn inset_offset(index: usize, inset: f64) -> (f64, f64) {
    match index {
        0 => (-inset, inset),
        1 => (inset, inset),
        2 => (inset, -inset),
        3 => (-inset, -inset),
        _ => (0.0, 0.0),
    }
}

impl ZoneStrategy for ArrayZones {
    fn mode(&self) -> SelectionMode {
        SelectionMode::Array
    }

    fn discover_zones(&self, host: &mut dyn Host) -> Result<ZoneMap, EngineError> {
        let selection = host.prompt_selection(&SelectionOptions {
            message: "选择关联阵列",
            kind: None,
            single_only: true,
        });
        if selection.status != PromptStatus::Ok {
            warn!(status = ?selection.status, "阵列选择未完成");
            return Ok(ZoneMap::new());
        }

        let mut zones = ZoneMap::new();
        for array in selection.entities {
            if !host.is_associative_array(array) {
                warn!(entity = array.get(), "所选对象不是关联阵列");
                return Ok(ZoneMap::new());
            }
            let position = host.array_position(array)?;
            let locators = host.array_items(array)?;

            for source in host.array_source_entities(array)? {
                let boundary = match host.read_boundary(source) {
                    Ok(boundary) => boundary,
                    Err(err) => {
                        debug!(entity = source.get(), %err, "跳过非多段线阵列源");
                        continue;
                    }
                };
                if !boundary.is_closed {
                    debug!(entity = source.get(), "跳过未闭合的阵列源轮廓");
                    continue;
                }

                for locator in &locators {
                    let transform = host.read_instance_transform(array, *locator)?;
                    let points = boundary
                        .points
                        .iter()
                        .enumerate()
                        .map(|(index, vertex)| {
                            let (dx, dy) = inset_offset(index, self.inset);
                            transform.apply(Point2::new(
                                vertex.x() + position.x() + dx,
                                vertex.y() + position.y() + dy,
                            ))
                        })
                        .collect();
                    if let Some(zone) = Zone::new(points) {
                        zones.insert(*locator, zone);
                    }
                }
            }
        }
        Ok(zones)
    }

    fn read_metadata(
        &self,
        host: &mut dyn Host,
        _zone: &Zone,
        contents: &[EntityId],
        numbering: &mut NumberingContext,
        pass: ReadPass,
    ) -> Result<TitleBlockMetadata, EngineError> {
        self.reader.read_zone(host, contents, numbering, pass)
    }

    fn supports_renumbering(&self) -> bool {
        true
    }
}

/// 手绘多段线来源：只接受闭合的四边形，网格定位由排序推导。
#[derive(Debug, Clone)]
pub struct PolylineZones {
    order: GridOrder,
    reader: FreeTextReader,
}

impl PolylineZones {
    pub fn new(order: GridOrder, reader: FreeTextReader) -> Self {
        Self { order, reader }
    }

    pub fn from_config(config: &SheetConfig) -> Self {
        Self::new(
            GridOrder::from_config(&config.grid),
            FreeTextReader::new(config.title_block.title_sentinel.clone()),
        )
    }
}

/// 多段线区域的中心：最后一个顶点坐标除以 4。
///
/// 并非真正的形心，只对四个顶点中的最后一个取值；排序结果依赖这一近似。
pub fn approximate_center(vertices: &[Point2]) -> Option<Point2> {
    vertices
        .last()
        .map(|last| Point2::from_vec(last.as_vec2() / 4.0))
}

impl ZoneStrategy for PolylineZones {
    fn mode(&self) -> SelectionMode {
        SelectionMode::Polyline
    }

    fn discover_zones(&self, host: &mut dyn Host) -> Result<ZoneMap, EngineError> {
        let selection = host.prompt_selection(&SelectionOptions {
            message: "选择闭合的 A4 多段线",
            kind: Some(EntityKind::Polyline),
            single_only: false,
        });
        if selection.status != PromptStatus::Ok {
            warn!(status = ?selection.status, "多段线选择未完成");
            return Ok(ZoneMap::new());
        }

        let mut candidates = Vec::new();
        for id in selection.entities {
            let Ok(boundary) = host.read_boundary(id) else {
                debug!(entity = id.get(), "跳过非多段线实体");
                continue;
            };
            if !boundary.is_closed || boundary.points.len() != 4 {
                debug!(
                    entity = id.get(),
                    vertices = boundary.points.len(),
                    "跳过非闭合四边形"
                );
                continue;
            }
            if let Some(center) = approximate_center(&boundary.points) {
                candidates.push((center, boundary.points));
            }
        }

        let mut zones = ZoneMap::new();
        for (locator, points) in self.order.arrange(candidates) {
            if let Some(zone) = Zone::new(points) {
                zones.insert(locator, zone);
            }
        }
        Ok(zones)
    }

    fn read_metadata(
        &self,
        host: &mut dyn Host,
        zone: &Zone,
        contents: &[EntityId],
        numbering: &mut NumberingContext,
        _pass: ReadPass,
    ) -> Result<TitleBlockMetadata, EngineError> {
        self.reader.read_zone(host, zone, contents, numbering)
    }
}
