pub mod sheet;

pub mod geometry {
    use glam::{DAffine2, DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 判断宽高是否相等（正方形）时使用的容差。
    pub const SQUARE_EPSILON: f64 = 1e-6;

    /// 容差比较：`|a - b| < epsilon` 时视为相等。
    #[inline]
    pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// 容差内返回 0，否则返回差值绝对值截断后的整数。
    ///
    /// 返回值不带方向，调用方需要根据原始差值自行决定先后顺序。
    #[inline]
    pub fn approx_compare(a: f64, b: f64, epsilon: f64) -> i64 {
        let diff = (a - b).abs();
        if diff < epsilon { 0 } else { diff as i64 }
    }

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        pub const ORIGIN: Point2 = Point2(DVec2::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn distance_to(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维向量，目前只用于视口的观察方向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        pub const UNIT_Z: Vector3 = Vector3(DVec3::Z);
    }

    /// 平面仿射变换，用于阵列项的放置矩阵与块参照的插入变换。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Transform2(pub DAffine2);

    impl Transform2 {
        pub const IDENTITY: Transform2 = Transform2(DAffine2::IDENTITY);

        #[inline]
        pub fn from_translation(offset: Vector2) -> Self {
            Self(DAffine2::from_translation(offset.0))
        }

        #[inline]
        pub fn from_scale_angle_translation(scale: Vector2, angle: f64, offset: Vector2) -> Self {
            Self(DAffine2::from_scale_angle_translation(
                scale.0, angle, offset.0,
            ))
        }

        #[inline]
        pub fn apply(&self, point: Point2) -> Point2 {
            Point2(self.0.transform_point2(point.0))
        }

        /// 先执行 `self`，再执行 `next`。
        #[inline]
        pub fn then(&self, next: &Transform2) -> Transform2 {
            Transform2(next.0 * self.0)
        }
    }

    impl Default for Transform2 {
        fn default() -> Self {
            Self::IDENTITY
        }
    }

    /// 轴对齐边界框（即宿主中的 extents）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }

        /// 与 `center` 相同，但空范围或全零范围返回原点。
        pub fn center_or_origin(&self) -> Point2 {
            if self.is_empty() || (self.min == Point2::ORIGIN && self.max == Point2::ORIGIN) {
                Point2::ORIGIN
            } else {
                self.center()
            }
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        /// 宽大于高时为横向；宽高在 `SQUARE_EPSILON` 内相等时按正方形处理，不算横向。
        #[inline]
        pub fn is_wider_than_tall(&self) -> bool {
            let (width, height) = (self.width(), self.height());
            !approx_eq(width, height, SQUARE_EPSILON) && height < width
        }

        pub fn corners(&self) -> [Point2; 4] {
            [
                self.min,
                Point2::new(self.max.x(), self.min.y()),
                self.max,
                Point2::new(self.min.x(), self.max.y()),
            ]
        }

        /// 对四个角点做变换后重新求包围盒。
        pub fn transformed(&self, transform: &Transform2) -> Bounds2D {
            if self.is_empty() {
                return *self;
            }
            Bounds2D::from_points(self.corners().map(|corner| transform.apply(corner)))
        }
    }

    /// 多边形有向面积（鞋带公式），逆时针为正。
    pub fn polygon_area(points: &[Point2]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let mut twice = 0.0;
        for (index, current) in points.iter().enumerate() {
            let next = points[(index + 1) % points.len()];
            twice += current.x() * next.y() - next.x() * current.y();
        }
        twice * 0.5
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn approx_eq_respects_epsilon() {
            assert!(approx_eq(3.0, 3.0, 1e-9));
            assert!(approx_eq(-7.25, -7.25, 0.5));
            assert!(approx_eq(1.0, 1.09, 0.1));
            assert!(!approx_eq(1.0, 1.1, 0.1));
            assert!(!approx_eq(1.0, 2.0, 1.0));
        }

        #[test]
        fn approx_compare_is_unsigned_magnitude() {
            assert_eq!(approx_compare(10.0, 40.0, 50.0), 0);
            assert_eq!(approx_compare(100.0, 25.5, 50.0), 74);
            assert_eq!(approx_compare(25.5, 100.0, 50.0), 74);
            // 容差以外但不足 1 的差值会被截断为 0
            assert_eq!(approx_compare(0.0, 0.7, 0.5), 0);
        }

        #[test]
        fn empty_bounds_center_is_origin() {
            assert_eq!(Bounds2D::empty().center_or_origin(), Point2::ORIGIN);
            let zero = Bounds2D::new(Point2::ORIGIN, Point2::ORIGIN);
            assert_eq!(zero.center_or_origin(), Point2::ORIGIN);
            let bounds = Bounds2D::new(Point2::new(2.0, 4.0), Point2::new(6.0, 10.0));
            assert_eq!(bounds.center_or_origin(), Point2::new(4.0, 7.0));
        }

        #[test]
        fn orientation_test_pins_square_to_portrait() {
            let wide = Bounds2D::new(Point2::ORIGIN, Point2::new(297.0, 210.0));
            let tall = Bounds2D::new(Point2::ORIGIN, Point2::new(210.0, 297.0));
            let square = Bounds2D::new(Point2::ORIGIN, Point2::new(100.0, 100.0));
            assert!(wide.is_wider_than_tall());
            assert!(!tall.is_wider_than_tall());
            assert!(!square.is_wider_than_tall());

            let nearly_square = Bounds2D::new(Point2::ORIGIN, Point2::new(100.0 + 1e-9, 100.0));
            assert!(!nearly_square.is_wider_than_tall());
            let clearly_wide = Bounds2D::new(Point2::ORIGIN, Point2::new(100.001, 100.0));
            assert!(clearly_wide.is_wider_than_tall());
        }

        #[test]
        fn transformed_bounds_follow_rotation() {
            let bounds = Bounds2D::new(Point2::ORIGIN, Point2::new(4.0, 2.0));
            let rotate = Transform2::from_scale_angle_translation(
                Vector2::new(1.0, 1.0),
                std::f64::consts::FRAC_PI_2,
                Vector2::new(10.0, 0.0),
            );
            let moved = bounds.transformed(&rotate);
            assert!((moved.min().x() - 8.0).abs() < 1e-9);
            assert!((moved.max().x() - 10.0).abs() < 1e-9);
            assert!((moved.max().y() - 4.0).abs() < 1e-9);
        }

        #[test]
        fn polygon_area_of_rectangle() {
            let rect = [
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(4.0, 3.0),
                Point2::new(0.0, 3.0),
            ];
            assert!((polygon_area(&rect) - 12.0).abs() < 1e-9);
            assert_eq!(polygon_area(&rect[..2]), 0.0);
        }
    }
}

pub mod document {
    use std::collections::{BTreeMap, HashMap};

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Transform2, Vector2, Vector3};
    use crate::sheet::GridLocator;

    /// 文字包围盒估算时单个字符宽度与字高之比。
    const GLYPH_WIDTH_FACTOR: f64 = 0.7;
    /// 新建布局未指定图纸时使用的介质尺寸（毫米，纵向）。
    const DEFAULT_MEDIA_SIZE: (f64, f64) = (210.0, 297.0);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 布局（输出页）标识。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PageId(u64);

    impl PageId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ViewportId(u64);

    impl ViewportId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// 选择过滤用的实体类别。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum EntityKind {
        Polyline,
        Text,
        MText,
        BlockReference,
        AssociativeArray,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Polyline(Polyline),
        Text(Text),
        MText(MText),
        BlockReference(BlockReference),
        AssociativeArray(AssociativeArray),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::MText(mtext) => &mtext.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::AssociativeArray(array) => &array.layer,
            }
        }

        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Polyline(_) => EntityKind::Polyline,
                Entity::Text(_) => EntityKind::Text,
                Entity::MText(_) => EntityKind::MText,
                Entity::BlockReference(_) => EntityKind::BlockReference,
                Entity::AssociativeArray(_) => EntityKind::AssociativeArray,
            }
        }

        /// 不依赖文档即可求得的局部范围；块参照与阵列需经 `Document::entity_bounds` 解析。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Polyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                Entity::Text(text) => {
                    bounds.include_bounds(&text_box(text.insert, &text.content, text.height, None));
                }
                Entity::MText(mtext) => {
                    bounds.include_bounds(&text_box(
                        mtext.insert,
                        &mtext.content,
                        mtext.height,
                        mtext.reference_width,
                    ));
                }
                Entity::BlockReference(reference) => {
                    bounds.include_point(reference.insert);
                    for attr in &reference.attributes {
                        bounds.include_point(attr.insert);
                    }
                }
                Entity::AssociativeArray(array) => {
                    bounds.include_point(array.position);
                }
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }

    /// 按插入点在左下角、单行等宽字符估算文字范围。
    fn text_box(insert: Point2, content: &str, height: f64, width: Option<f64>) -> Bounds2D {
        let lines: Vec<&str> = content.lines().collect();
        let line_count = lines.len().max(1) as f64;
        let longest = lines
            .iter()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0) as f64;
        let width = width.unwrap_or(longest * height * GLYPH_WIDTH_FACTOR);
        Bounds2D::new(
            insert,
            Point2::new(insert.x() + width, insert.y() + height * line_count),
        )
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    /// 多行文字，`content` 保存去除格式码后的纯文本。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub reference_width: Option<f64>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
        pub insert: Point2,
        pub height: f64,
        #[serde(default)]
        pub is_constant: bool,
        pub layer: String,
    }

    impl Attribute {
        pub fn new(tag: impl Into<String>, text: impl Into<String>, insert: Point2) -> Self {
            Self {
                tag: tag.into(),
                text: text.into(),
                insert,
                height: 2.5,
                is_constant: false,
                layer: "0".to_string(),
            }
        }
    }

    /// 动态块参数值。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum PropertyValue {
        Bool(bool),
        Int(i64),
        Real(f64),
        Text(String),
    }

    impl PropertyValue {
        pub fn as_text(&self) -> String {
            match self {
                PropertyValue::Bool(value) => value.to_string(),
                PropertyValue::Int(value) => value.to_string(),
                PropertyValue::Real(value) => value.to_string(),
                PropertyValue::Text(value) => value.clone(),
            }
        }

        /// 数值非零即真；文本只识别 `true`/`false`（忽略大小写）。
        pub fn as_bool(&self) -> Option<bool> {
            match self {
                PropertyValue::Bool(value) => Some(*value),
                PropertyValue::Int(value) => Some(*value != 0),
                PropertyValue::Real(value) => Some(*value != 0.0),
                PropertyValue::Text(value) => match value.trim().to_ascii_lowercase().as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                },
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DynamicProperty {
        pub name: String,
        pub value: PropertyValue,
    }

    impl DynamicProperty {
        pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
            Self {
                name: name.into(),
                value,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        /// 动态块实例指向的原始块定义名；普通块为 `None`。
        #[serde(default)]
        pub dynamic_block: Option<String>,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        #[serde(default)]
        pub attributes: Vec<Attribute>,
        #[serde(default)]
        pub properties: Vec<DynamicProperty>,
        pub layer: String,
    }

    impl BlockReference {
        /// 动态块返回原始定义名，否则返回自身块名。
        #[inline]
        pub fn effective_name(&self) -> &str {
            self.dynamic_block.as_deref().unwrap_or(&self.name)
        }

        #[inline]
        pub fn transform(&self) -> Transform2 {
            Transform2::from_scale_angle_translation(
                self.scale,
                self.rotation,
                Vector2(self.insert.as_vec2()),
            )
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    /// 关联阵列中的单个项目。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ArrayItem {
        pub locator: GridLocator,
        pub transform: Transform2,
    }

    /// 关联阵列：源图元在阵列内部空间保存，各项目以变换矩阵重复摆放。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AssociativeArray {
        pub position: Point2,
        pub sources: Vec<EntityId>,
        pub items: Vec<ArrayItem>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum PaperUnits {
        Inches,
        #[default]
        Millimeters,
    }

    /// 视口打印比例标注：要么精确 1:1，要么保留计算出的自定义比例。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum ViewportScale {
        OneToOne,
        Custom(f64),
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct PlotSettings {
        pub device: Option<String>,
        pub media: Option<String>,
        pub style_sheet: Option<String>,
        pub paper_units: PaperUnits,
        pub use_standard_scale: bool,
        pub standard_scale_one_to_one: bool,
        pub window: Option<Bounds2D>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Viewport {
        pub id: ViewportId,
        pub center: Point2,
        pub width: f64,
        pub height: f64,
        pub view_center: Point2,
        pub view_height: f64,
        pub custom_scale: f64,
        pub scale: ViewportScale,
        pub view_direction: Vector3,
        pub is_on: bool,
        pub is_locked: bool,
        pub layer: String,
        pub color_index: i16,
        pub line_weight: i16,
    }

    impl Viewport {
        fn new(id: ViewportId, center: Point2, width: f64, height: f64) -> Self {
            Self {
                id,
                center,
                width,
                height,
                view_center: Point2::ORIGIN,
                view_height: height,
                custom_scale: 1.0,
                scale: ViewportScale::Custom(1.0),
                view_direction: Vector3::UNIT_Z,
                is_on: false,
                is_locked: false,
                layer: "0".to_string(),
                color_index: 256,
                line_weight: -1,
            }
        }

        pub fn bounds(&self) -> Bounds2D {
            let half = Vector2::new(self.width * 0.5, self.height * 0.5);
            Bounds2D::new(
                Point2::new(self.center.x() - half.x(), self.center.y() - half.y()),
                self.center.translate(half),
            )
        }
    }

    /// 布局，即一张可打印的输出页。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layout {
        pub id: PageId,
        pub name: String,
        pub plot: PlotSettings,
        pub viewports: Vec<Viewport>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MediaSize {
        pub name: String,
        pub width: f64,
        pub height: f64,
    }

    /// 宿主可用的打印设备、打印样式表与图纸尺寸。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PlotCatalog {
        pub devices: Vec<String>,
        pub style_sheets: Vec<String>,
        pub media: Vec<MediaSize>,
    }

    impl Default for PlotCatalog {
        fn default() -> Self {
            Self {
                devices: vec!["None".to_string(), "DWG To PDF.pc3".to_string()],
                style_sheets: vec!["acad.ctb".to_string(), "monochrome.ctb".to_string()],
                media: vec![
                    MediaSize {
                        name: "ISO_A4_(210.00_x_297.00_MM)".to_string(),
                        width: 210.0,
                        height: 297.0,
                    },
                    MediaSize {
                        name: "ISO_full_bleed_A4_(210.00_x_297.00_MM)".to_string(),
                        width: 210.0,
                        height: 297.0,
                    },
                    MediaSize {
                        name: "ISO_full_bleed_A4_(297.00_x_210.00_MM)".to_string(),
                        width: 297.0,
                        height: 210.0,
                    },
                ],
            }
        }
    }

    impl PlotCatalog {
        pub fn media_size(&self, name: &str) -> Option<Vector2> {
            self.media
                .iter()
                .find(|media| media.name == name)
                .map(|media| Vector2::new(media.width, media.height))
        }
    }

    /// 系统变量取值。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum SettingValue {
        Int(i64),
        Text(String),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum SpaceMode {
        #[default]
        Model,
        Paper,
    }

    /// 当前屏幕视图。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ViewState {
        pub center: Point2,
        pub width: f64,
        pub height: f64,
    }

    impl Default for ViewState {
        fn default() -> Self {
            Self {
                center: Point2::ORIGIN,
                width: 420.0,
                height: 297.0,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        /// 阵列源图元，不属于模型空间，不参与框选。
        array_sources: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
        layouts: Vec<Layout>,
        next_page_id: u64,
        next_viewport_id: u64,
        plot_catalog: PlotCatalog,
        system_variables: BTreeMap<String, SettingValue>,
        current_layout: Option<String>,
        space: SpaceMode,
        view: ViewState,
        regen_count: u32,
    }

    impl Default for Document {
        fn default() -> Self {
            let system_variables = [
                ("SAVETIME", 10),
                ("REGENMODE", 1),
                ("FIELDEVAL", 31),
                ("LAYOUTREGENCTL", 2),
                ("LAYOUTCREATEVIEWPORT", 1),
            ]
            .into_iter()
            .map(|(name, value)| (name.to_string(), SettingValue::Int(value)))
            .collect();

            let mut doc = Self {
                layers: HashMap::new(),
                entities: Vec::new(),
                array_sources: Vec::new(),
                next_entity_id: 0,
                blocks: HashMap::new(),
                layouts: Vec::new(),
                next_page_id: 1,
                next_viewport_id: 1,
                plot_catalog: PlotCatalog::default(),
                system_variables,
                current_layout: None,
                space: SpaceMode::Model,
                view: ViewState::default(),
                regen_count: 0,
            };
            doc.ensure_layer("0");
            doc
        }
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let layer = layer.into();
            self.add_entity(Entity::Polyline(Polyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                layer,
            }))
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation: 0.0,
                layer: layer.into(),
            }))
        }

        pub fn add_mtext(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            reference_width: Option<f64>,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::MText(MText {
                insert,
                content: content.into(),
                height,
                reference_width,
                layer: layer.into(),
            }))
        }

        pub fn add_block_reference(&mut self, reference: BlockReference) -> EntityId {
            for attribute in &reference.attributes {
                self.ensure_layer(&attribute.layer);
            }
            self.add_entity(Entity::BlockReference(reference))
        }

        /// 创建关联阵列：源图元放入阵列内部空间，返回阵列自身的实体 ID。
        pub fn add_associative_array(
            &mut self,
            position: Point2,
            sources: Vec<Entity>,
            items: Vec<ArrayItem>,
            layer: impl Into<String>,
        ) -> EntityId {
            let mut source_ids = Vec::with_capacity(sources.len());
            for source in sources {
                self.ensure_layer(source.layer_name());
                let id = self.next_id();
                self.array_sources.push((id, source));
                source_ids.push(id);
            }
            self.add_entity(Entity::AssociativeArray(AssociativeArray {
                position,
                sources: source_ids,
                items,
                layer: layer.into(),
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        /// 模型空间中的实体（不含阵列源图元）。
        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name());
            }
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .chain(self.array_sources.iter())
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
            self.entities
                .iter_mut()
                .chain(self.array_sources.iter_mut())
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        /// 解析块定义与阵列后的几何范围。
        pub fn entity_bounds(&self, id: EntityId) -> Option<Bounds2D> {
            let entity = self.entity(id)?;
            self.resolve_bounds(entity)
        }

        fn resolve_bounds(&self, entity: &Entity) -> Option<Bounds2D> {
            match entity {
                Entity::BlockReference(reference) => {
                    let mut bounds = entity.bounds().unwrap_or_else(Bounds2D::empty);
                    if let Some(definition) = self.block(&reference.name) {
                        let local = definition
                            .entities
                            .iter()
                            .filter_map(|child| self.resolve_bounds(child))
                            .fold(Bounds2D::empty(), |mut acc, child| {
                                acc.include_bounds(&child);
                                acc
                            });
                        let to_base = Transform2::from_translation(Vector2::new(
                            -definition.base_point.x(),
                            -definition.base_point.y(),
                        ));
                        bounds.include_bounds(
                            &local.transformed(&to_base.then(&reference.transform())),
                        );
                    }
                    if bounds.is_empty() { None } else { Some(bounds) }
                }
                Entity::AssociativeArray(array) => {
                    let mut bounds = Bounds2D::empty();
                    let offset = Transform2::from_translation(Vector2(array.position.as_vec2()));
                    for source in &array.sources {
                        let Some(local) = self.entity_bounds(*source) else {
                            continue;
                        };
                        for item in &array.items {
                            bounds.include_bounds(
                                &local.transformed(&offset.then(&item.transform)),
                            );
                        }
                    }
                    if bounds.is_empty() { None } else { Some(bounds) }
                }
                other => other.bounds(),
            }
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            let mut has = false;
            for (id, _) in &self.entities {
                if let Some(entity_bounds) = self.entity_bounds(*id) {
                    bounds.include_bounds(&entity_bounds);
                    has = true;
                }
            }
            if has { Some(bounds) } else { None }
        }

        #[inline]
        pub fn layouts(&self) -> impl Iterator<Item = &Layout> {
            self.layouts.iter()
        }

        pub fn layout(&self, id: PageId) -> Option<&Layout> {
            self.layouts.iter().find(|layout| layout.id == id)
        }

        pub fn layout_mut(&mut self, id: PageId) -> Option<&mut Layout> {
            self.layouts.iter_mut().find(|layout| layout.id == id)
        }

        pub fn layout_by_name(&self, name: &str) -> Option<&Layout> {
            self.layouts.iter().find(|layout| layout.name == name)
        }

        /// 以默认页面设置新建布局；名称为空或重名时返回 `None`。
        ///
        /// 新布局总带有一个位于原点的图纸空间视口；
        /// `LAYOUTCREATEVIEWPORT` 非零时额外生成一个默认模型视口。
        pub fn create_layout(&mut self, name: impl Into<String>) -> Option<PageId> {
            let name = name.into();
            if name.is_empty() || self.layout_by_name(&name).is_some() {
                return None;
            }
            let id = PageId(self.next_page_id);
            self.next_page_id += 1;

            let mut viewports = vec![Viewport::new(
                self.next_viewport(),
                Point2::ORIGIN,
                0.0,
                0.0,
            )];
            let auto_viewport = !matches!(
                self.system_variable("LAYOUTCREATEVIEWPORT"),
                Some(SettingValue::Int(0))
            );
            if auto_viewport {
                let (width, height) = DEFAULT_MEDIA_SIZE;
                let mut default_view = Viewport::new(
                    self.next_viewport(),
                    Point2::new(width * 0.5, height * 0.5),
                    width * 0.9,
                    height * 0.9,
                );
                default_view.is_on = true;
                viewports.push(default_view);
            }

            self.layouts.push(Layout {
                id,
                name,
                plot: PlotSettings::default(),
                viewports,
            });
            Some(id)
        }

        pub fn set_current_layout(&mut self, name: &str) -> bool {
            if self.layout_by_name(name).is_none() {
                return false;
            }
            self.current_layout = Some(name.to_string());
            true
        }

        #[inline]
        pub fn current_layout(&self) -> Option<&str> {
            self.current_layout.as_deref()
        }

        /// 布局当前图纸的原始尺寸（介质名中的先后两个尺寸）。
        pub fn layout_media_size(&self, id: PageId) -> Option<Vector2> {
            let layout = self.layout(id)?;
            let size = layout
                .plot
                .media
                .as_deref()
                .and_then(|name| self.plot_catalog.media_size(name))
                .unwrap_or(Vector2::new(DEFAULT_MEDIA_SIZE.0, DEFAULT_MEDIA_SIZE.1));
            Some(size)
        }

        /// 在布局上新建空白视口。
        pub fn add_viewport(&mut self, page: PageId) -> Option<ViewportId> {
            let id = self.next_viewport();
            let layout = self.layout_mut(page)?;
            layout
                .viewports
                .push(Viewport::new(id, Point2::ORIGIN, 0.0, 0.0));
            Some(id)
        }

        pub fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut Viewport> {
            self.layouts
                .iter_mut()
                .flat_map(|layout| layout.viewports.iter_mut())
                .find(|viewport| viewport.id == id)
        }

        pub fn viewport(&self, id: ViewportId) -> Option<&Viewport> {
            self.layouts
                .iter()
                .flat_map(|layout| layout.viewports.iter())
                .find(|viewport| viewport.id == id)
        }

        pub fn erase_viewport(&mut self, page: PageId, id: ViewportId) -> bool {
            let Some(layout) = self.layout_mut(page) else {
                return false;
            };
            let before = layout.viewports.len();
            layout.viewports.retain(|viewport| viewport.id != id);
            layout.viewports.len() != before
        }

        #[inline]
        pub fn plot_catalog(&self) -> &PlotCatalog {
            &self.plot_catalog
        }

        #[inline]
        pub fn plot_catalog_mut(&mut self) -> &mut PlotCatalog {
            &mut self.plot_catalog
        }

        #[inline]
        pub fn system_variable(&self, name: &str) -> Option<&SettingValue> {
            self.system_variables.get(name)
        }

        pub fn set_system_variable(&mut self, name: impl Into<String>, value: SettingValue) {
            self.system_variables.insert(name.into(), value);
        }

        #[inline]
        pub fn space(&self) -> SpaceMode {
            self.space
        }

        #[inline]
        pub fn set_space(&mut self, space: SpaceMode) {
            self.space = space;
        }

        #[inline]
        pub fn view(&self) -> ViewState {
            self.view
        }

        #[inline]
        pub fn set_view(&mut self, view: ViewState) {
            self.view = view;
        }

        #[inline]
        pub fn regen(&mut self) {
            self.regen_count += 1;
        }

        #[inline]
        pub fn regen_count(&self) -> u32 {
            self.regen_count
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }

        #[inline]
        fn next_viewport(&mut self) -> ViewportId {
            let id = self.next_viewport_id;
            self.next_viewport_id += 1;
            ViewportId(id)
        }
    }

}
