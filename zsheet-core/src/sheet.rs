//! 分页出图的数据模型：网格定位、区域、图框元数据与编号计数。

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2, polygon_area};

/// 区域面积小于该值视为退化多边形。
const MIN_ZONE_AREA: f64 = 1e-9;

/// 区域在网格中的位置。字段顺序即排序键：先行、再列、最后层。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GridLocator {
    pub row: i32,
    pub column: i32,
    pub level: i32,
}

impl GridLocator {
    #[inline]
    pub const fn new(row: i32, column: i32, level: i32) -> Self {
        Self { row, column, level }
    }
}

/// 一个出图单元：闭合多边形边界加上当前遍历写入的元数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    boundary: Vec<Point2>,
    /// 提交遍历读到的元数据；未读取（如区域内为空）时为 `None`。
    pub metadata: Option<TitleBlockMetadata>,
}

impl Zone {
    /// 至少三个顶点且面积非零才构成有效区域。
    pub fn new(boundary: Vec<Point2>) -> Option<Self> {
        if boundary.len() < 3 || polygon_area(&boundary).abs() < MIN_ZONE_AREA {
            return None;
        }
        Some(Self {
            boundary,
            metadata: None,
        })
    }

    #[inline]
    pub fn boundary(&self) -> &[Point2] {
        &self.boundary
    }

    #[inline]
    pub fn extents(&self) -> Bounds2D {
        Bounds2D::from_points(self.boundary.iter().copied())
    }
}

/// 图框（штамп）种类，由动态块参数决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TitleBlockVariant {
    Variant1,
    Variant2,
    Variant3,
    #[default]
    None,
}

/// 装订边。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BindingEdge {
    #[default]
    Left,
    Right,
}

/// 签字栏中的一行：职务与姓名。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffEntry {
    pub post: String,
    pub name: String,
}

/// 主图框（第二种）的完整字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainStampFields {
    pub company: String,
    pub description: String,
    pub sheet_count: String,
    pub stage: String,
    pub legend: String,
    pub staff: [StaffEntry; 5],
}

/// 每种图框只携带自己有意义的文字字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleBlockFields {
    Variant1 {
        company: String,
        description: String,
        description2: String,
    },
    Variant2(Box<MainStampFields>),
    Variant3 {
        company: String,
        description: String,
    },
    #[default]
    None,
}

impl TitleBlockFields {
    /// 按种类生成空字段集。
    pub fn empty(variant: TitleBlockVariant) -> Self {
        match variant {
            TitleBlockVariant::Variant1 => TitleBlockFields::Variant1 {
                company: String::new(),
                description: String::new(),
                description2: String::new(),
            },
            TitleBlockVariant::Variant2 => TitleBlockFields::Variant2(Box::default()),
            TitleBlockVariant::Variant3 => TitleBlockFields::Variant3 {
                company: String::new(),
                description: String::new(),
            },
            TitleBlockVariant::None => TitleBlockFields::None,
        }
    }

    #[inline]
    pub fn variant(&self) -> TitleBlockVariant {
        match self {
            TitleBlockFields::Variant1 { .. } => TitleBlockVariant::Variant1,
            TitleBlockFields::Variant2(_) => TitleBlockVariant::Variant2,
            TitleBlockFields::Variant3 { .. } => TitleBlockVariant::Variant3,
            TitleBlockFields::None => TitleBlockVariant::None,
        }
    }

    pub fn company(&self) -> Option<&str> {
        match self {
            TitleBlockFields::Variant1 { company, .. }
            | TitleBlockFields::Variant3 { company, .. } => Some(company),
            TitleBlockFields::Variant2(fields) => Some(&fields.company),
            TitleBlockFields::None => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TitleBlockFields::Variant1 { description, .. }
            | TitleBlockFields::Variant3 { description, .. } => Some(description),
            TitleBlockFields::Variant2(fields) => Some(&fields.description),
            TitleBlockFields::None => None,
        }
    }
}

/// 一个区域在一次遍历中读到的图框信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleBlockMetadata {
    pub fields: TitleBlockFields,
    pub numbering_enabled: bool,
    pub numbering_mirrored: bool,
    pub binding_edge: BindingEdge,
    pub extents: Option<Bounds2D>,
    /// 页码文字；无图框的页写入标题页哨兵值。
    pub sheet_label: String,
    /// 开启编号时读取的自由编号字段。
    pub number: String,
}

impl Default for TitleBlockMetadata {
    fn default() -> Self {
        Self {
            fields: TitleBlockFields::None,
            numbering_enabled: true,
            numbering_mirrored: false,
            binding_edge: BindingEdge::Left,
            extents: None,
            sheet_label: String::new(),
            number: String::new(),
        }
    }
}

impl TitleBlockMetadata {
    #[inline]
    pub fn variant(&self) -> TitleBlockVariant {
        self.fields.variant()
    }
}

/// 一次运行内的编号计数器，由编排器显式持有并逐区域传入读取器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NumberingContext {
    seed: u32,
    pub sheet_counter: u32,
    pub title_page_counter: u32,
    pub total_sheet_count: u32,
}

impl NumberingContext {
    /// 重新编号时两个计数器从 1 开始，否则从 0 开始。
    pub fn start(renumber: bool) -> Self {
        let seed = u32::from(renumber);
        Self {
            seed,
            sheet_counter: seed,
            title_page_counter: seed,
            total_sheet_count: 0,
        }
    }

    /// 计数遍历结束后开始提交遍历：计数器回到起点，带上已确定的总页数。
    pub fn restart_with_total(&self) -> Self {
        Self {
            seed: self.seed,
            sheet_counter: self.seed,
            title_page_counter: self.seed,
            total_sheet_count: self.counted_total(),
        }
    }

    #[inline]
    pub fn renumbering(&self) -> bool {
        self.seed > 0
    }

    /// 已计数的页数（去掉起始偏移）：编号页加标题页。
    #[inline]
    pub fn counted_total(&self) -> u32 {
        (self.sheet_counter - self.seed) + (self.title_page_counter - self.seed)
    }

    #[inline]
    pub fn advance_sheet(&mut self) {
        self.sheet_counter += 1;
    }

    #[inline]
    pub fn advance_title_page(&mut self) {
        self.title_page_counter += 1;
    }
}

/// 图纸方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// 宽大于高取横向；正方形（含容差内）取纵向。
    pub fn for_extents(extents: &Bounds2D) -> Self {
        if extents.is_wider_than_tall() {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// 生成单页所需的参数，用完即弃。
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub name: String,
    pub extents: Bounds2D,
    pub orientation: Orientation,
}

impl PageRequest {
    /// 从已提交元数据的区域构造请求；未读到元数据时返回 `None`。
    pub fn from_zone(zone: &Zone, title_sentinel: &str) -> Option<Self> {
        let metadata = zone.metadata.as_ref()?;
        let extents = metadata.extents.unwrap_or_else(|| zone.extents());
        let name = if metadata.sheet_label.is_empty() {
            title_sentinel.to_string()
        } else {
            metadata.sheet_label.clone()
        };
        Some(Self {
            name,
            orientation: Orientation::for_extents(&extents),
            extents,
        })
    }
}
