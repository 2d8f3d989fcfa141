//! 宿主 CAD 环境的协作接口。核心流程只通过这些 trait 访问文档、交互与打印设置。

use std::ops::{Deref, DerefMut};

use tracing::debug;
use zsheet_core::document::{
    DynamicProperty, EntityId, EntityKind, PageId, PaperUnits, SettingValue, SpaceMode,
    ViewState, ViewportId, ViewportScale,
};
use zsheet_core::geometry::{Bounds2D, Point2, Transform2, Vector2, Vector3};
use zsheet_core::sheet::GridLocator;

use crate::errors::EngineError;

/// 交互提示的返回状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Ok,
    Cancelled,
    Error,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub status: PromptStatus,
    pub entities: Vec<EntityId>,
}

impl SelectionResult {
    pub fn ok(entities: Vec<EntityId>) -> Self {
        Self {
            status: PromptStatus::Ok,
            entities,
        }
    }

    pub fn failed(status: PromptStatus) -> Self {
        Self {
            status,
            entities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeywordResult {
    pub status: PromptStatus,
    pub keyword: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectionOptions<'a> {
    pub message: &'a str,
    pub kind: Option<EntityKind>,
    pub single_only: bool,
}

pub trait SelectionService {
    fn prompt_selection(&mut self, options: &SelectionOptions<'_>) -> SelectionResult;

    fn prompt_keyword(&mut self, message: &str, keywords: &[&str], default: &str)
    -> KeywordResult;

    /// 与多边形相交或位于其内部的模型空间实体。
    fn select_crossing_polygon(&mut self, points: &[Point2]) -> SelectionResult;
}

/// 多段线边界的顶点与闭合标记。
#[derive(Debug, Clone)]
pub struct Boundary {
    pub points: Vec<Point2>,
    pub is_closed: bool,
}

#[derive(Debug, Clone)]
pub struct AttributeField {
    pub tag: String,
    pub text: String,
    pub is_constant: bool,
}

#[derive(Debug, Clone)]
pub struct TextRecord {
    pub content: String,
    pub extents: Bounds2D,
}

pub trait EntityStore {
    fn entity_kind(&self, id: EntityId) -> Option<EntityKind>;

    fn read_boundary(&self, id: EntityId) -> Result<Boundary, EngineError>;

    fn entity_extents(&self, id: EntityId) -> Option<Bounds2D>;

    fn is_associative_array(&self, id: EntityId) -> bool;

    fn array_position(&self, id: EntityId) -> Result<Point2, EngineError>;

    fn array_source_entities(&self, id: EntityId) -> Result<Vec<EntityId>, EngineError>;

    fn array_items(&self, id: EntityId) -> Result<Vec<GridLocator>, EngineError>;

    fn read_instance_transform(
        &self,
        id: EntityId,
        locator: GridLocator,
    ) -> Result<Transform2, EngineError>;

    /// 块参照所属（动态块取原始定义）的块名；非块参照返回 `None`。
    fn block_template_name(&self, id: EntityId) -> Option<String>;

    fn read_attribute_fields(&self, id: EntityId) -> Result<Vec<AttributeField>, EngineError>;

    fn read_dynamic_properties(&self, id: EntityId) -> Result<Vec<DynamicProperty>, EngineError>;

    fn write_attribute_field(
        &mut self,
        id: EntityId,
        tag: &str,
        text: &str,
    ) -> Result<(), EngineError>;

    /// 单行或多行文字的纯文本内容与几何范围；其他实体返回 `None`。
    fn read_text(&self, id: EntityId) -> Option<TextRecord>;
}

/// 需要应用到布局上的打印预设，`None` 表示保持布局原值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperPreset {
    pub media: Option<String>,
    pub style_sheet: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
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

pub trait PageService {
    fn list_existing_page_names(&self) -> Vec<String>;

    fn create_page(&mut self, name: &str) -> Option<PageId>;

    fn set_current_page(&mut self, name: &str) -> bool;

    fn page_viewports(&self, page: PageId) -> Vec<(ViewportId, Bounds2D)>;

    fn erase_viewport(&mut self, page: PageId, viewport: ViewportId) -> bool;

    fn list_available_devices(&self) -> Vec<String>;

    fn list_available_sizes(&self) -> Vec<String>;

    fn list_available_styles(&self) -> Vec<String>;

    fn set_paper_preset(&mut self, page: PageId, preset: &PaperPreset) -> Result<(), EngineError>;

    /// 设置打印窗口，同时启用标准比例 1:1。
    fn set_print_area(
        &mut self,
        page: PageId,
        extents: Bounds2D,
        units: PaperUnits,
    ) -> Result<(), EngineError>;

    /// 布局图纸的原始尺寸（按介质名中的先后顺序）。
    fn media_size(&self, page: PageId) -> Option<Vector2>;

    fn create_viewport(&mut self, page: PageId) -> Option<ViewportId>;

    fn configure_viewport(
        &mut self,
        viewport: ViewportId,
        settings: &ViewportSettings,
    ) -> Result<(), EngineError>;

    fn set_current_view(&mut self, view: ViewState);
}

pub trait EnvironmentSettings {
    fn get_setting(&self, name: &str) -> Option<SettingValue>;

    fn set_setting(&mut self, name: &str, value: SettingValue);

    fn set_display_space(&mut self, space: SpaceMode);

    fn regen(&mut self);
}

/// 文档事务：每个逻辑步骤一次，失败只回滚该步骤。
pub trait Transactional {
    fn begin_transaction(&mut self);

    fn commit_transaction(&mut self) -> Result<(), EngineError>;

    fn abort_transaction(&mut self);
}

pub trait Host:
    SelectionService + EntityStore + PageService + EnvironmentSettings + Transactional
{
}

impl<T> Host for T where
    T: SelectionService + EntityStore + PageService + EnvironmentSettings + Transactional
{
}

/// 在一次事务中执行 `step`：成功则提交，出错则回滚并原样返回错误。
pub fn with_transaction<T>(
    host: &mut dyn Host,
    step: impl FnOnce(&mut dyn Host) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    host.begin_transaction();
    match step(&mut *host) {
        Ok(value) => {
            host.commit_transaction()?;
            Ok(value)
        }
        Err(err) => {
            host.abort_transaction();
            Err(err)
        }
    }
}

/// 生成阶段期间临时改写的系统变量及其目标值。
pub const GENERATION_SETTINGS: [(&str, i64); 5] = [
    ("SAVETIME", 0),
    ("REGENMODE", 0),
    ("FIELDEVAL", 0),
    ("LAYOUTREGENCTL", 1),
    ("LAYOUTCREATEVIEWPORT", 0),
];

/// 保存并改写一组系统变量，析构时按原值恢复（包括提前返回与 panic 展开）。
///
/// 宿主中不存在的变量不改写，也不恢复。
pub struct SettingsBracket<'a> {
    host: &'a mut dyn Host,
    saved: Vec<(String, SettingValue)>,
}

impl<'a> SettingsBracket<'a> {
    pub fn acquire(host: &'a mut dyn Host, overrides: &[(&str, i64)]) -> Self {
        let mut saved = Vec::with_capacity(overrides.len());
        for (name, value) in overrides {
            let Some(previous) = host.get_setting(name) else {
                debug!(name, "宿主没有该系统变量，跳过");
                continue;
            };
            saved.push((name.to_string(), previous));
            host.set_setting(name, SettingValue::Int(*value));
        }
        debug!(count = saved.len(), "已改写生成阶段系统变量");
        Self { host, saved }
    }
}

impl<'a> Deref for SettingsBracket<'a> {
    type Target = dyn Host + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.host
    }
}

impl<'a> DerefMut for SettingsBracket<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.host
    }
}

impl Drop for SettingsBracket<'_> {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..).rev() {
            self.host.set_setting(&name, value);
        }
        debug!("已恢复生成阶段系统变量");
    }
}
