//! 基于内存文档的宿主实现，供 CLI 与测试驱动完整流程。

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use zsheet_core::document::{
    Document, DynamicProperty, Entity, EntityId, EntityKind, PageId, PaperUnits, SettingValue,
    SpaceMode, ViewState, ViewportId,
};
use zsheet_core::geometry::{Bounds2D, Point2, Transform2, Vector2};
use zsheet_core::sheet::GridLocator;

use crate::errors::EngineError;
use crate::host::{
    AttributeField, Boundary, EntityStore, EnvironmentSettings, KeywordResult, PageService,
    PaperPreset, PromptStatus, SelectionOptions, SelectionResult, SelectionService, TextRecord,
    Transactional, ViewportSettings,
};

/// 预先录入的用户应答，按提示出现顺序依次消费。
#[derive(Debug, Clone, PartialEq)]
pub enum PromptReply {
    /// 关键字提示的回答。
    Keyword(String),
    /// 关键字提示直接回车，取默认值。
    AcceptDefault,
    /// 选择提示中点选的实体。
    Pick(Vec<EntityId>),
    /// 选择提示中框选整个模型空间。
    PickAll,
    Cancel,
}

/// 会话持有文档与运行时状态（应答队列、事务快照、故障注入）。
#[derive(Debug, Default)]
pub struct Session {
    document: Document,
    replies: VecDeque<PromptReply>,
    snapshots: Vec<Document>,
    commits_before_failure: Option<usize>,
    rejected_page_names: HashSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn push_reply(&mut self, reply: PromptReply) -> &mut Self {
        self.replies.push_back(reply);
        self
    }

    #[inline]
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// 允许再提交 `count` 次事务，之后的提交全部失败。
    pub fn fail_commits_after(&mut self, count: usize) {
        self.commits_before_failure = Some(count);
    }

    /// 令指定名称的布局创建失败。
    pub fn reject_page_name(&mut self, name: impl Into<String>) {
        self.rejected_page_names.insert(name.into());
    }

    fn filter_selection(
        &self,
        candidates: impl Iterator<Item = EntityId>,
        options: &SelectionOptions<'_>,
    ) -> Vec<EntityId> {
        let mut picked: Vec<EntityId> = candidates
            .filter(|id| match options.kind {
                Some(kind) => self.entity_kind(*id) == Some(kind),
                None => self.document.entity(*id).is_some(),
            })
            .collect();
        if options.single_only {
            picked.truncate(1);
        }
        picked
    }

    fn block_reference(
        &self,
        id: EntityId,
    ) -> Result<&zsheet_core::document::BlockReference, EngineError> {
        match self.document.entity(id) {
            Some(Entity::BlockReference(reference)) => Ok(reference),
            Some(_) => Err(EngineError::MetadataRejected(id.get())),
            None => Err(EngineError::EntityNotFound(id.get())),
        }
    }

    fn array(&self, id: EntityId) -> Result<&zsheet_core::document::AssociativeArray, EngineError> {
        match self.document.entity(id) {
            Some(Entity::AssociativeArray(array)) => Ok(array),
            _ => Err(EngineError::EntityNotFound(id.get())),
        }
    }
}

/// 两个范围有公共面积（仅共享边界不算相交）。
fn overlaps(a: &Bounds2D, b: &Bounds2D) -> bool {
    !a.is_empty()
        && !b.is_empty()
        && a.min().x() < b.max().x()
        && b.min().x() < a.max().x()
        && a.min().y() < b.max().y()
        && b.min().y() < a.max().y()
}

impl SelectionService for Session {
    fn prompt_selection(&mut self, options: &SelectionOptions<'_>) -> SelectionResult {
        debug!(message = options.message, "选择提示");
        match self.replies.pop_front() {
            Some(PromptReply::Pick(ids)) => {
                let picked = self.filter_selection(ids.into_iter(), options);
                if picked.is_empty() {
                    SelectionResult::failed(PromptStatus::Error)
                } else {
                    SelectionResult::ok(picked)
                }
            }
            Some(PromptReply::PickAll) => {
                let all: Vec<EntityId> = self.document.entities().map(|(id, _)| *id).collect();
                let picked = self.filter_selection(all.into_iter(), options);
                if picked.is_empty() {
                    SelectionResult::failed(PromptStatus::Error)
                } else {
                    SelectionResult::ok(picked)
                }
            }
            Some(PromptReply::Cancel) => SelectionResult::failed(PromptStatus::Cancelled),
            Some(other) => {
                warn!(reply = ?other, "选择提示收到不匹配的应答");
                SelectionResult::failed(PromptStatus::Error)
            }
            None => SelectionResult::failed(PromptStatus::Cancelled),
        }
    }

    fn prompt_keyword(
        &mut self,
        message: &str,
        keywords: &[&str],
        default: &str,
    ) -> KeywordResult {
        debug!(message, ?keywords, default, "关键字提示");
        let (status, keyword) = match self.replies.pop_front() {
            Some(PromptReply::Keyword(keyword)) => {
                if keywords.iter().any(|candidate| *candidate == keyword) {
                    (PromptStatus::Ok, keyword)
                } else {
                    (PromptStatus::Error, keyword)
                }
            }
            Some(PromptReply::AcceptDefault) => (PromptStatus::Ok, default.to_string()),
            Some(PromptReply::Cancel) | None => (PromptStatus::Cancelled, String::new()),
            Some(other) => {
                warn!(reply = ?other, "关键字提示收到不匹配的应答");
                (PromptStatus::Error, String::new())
            }
        };
        KeywordResult { status, keyword }
    }

    fn select_crossing_polygon(&mut self, points: &[Point2]) -> SelectionResult {
        let window = Bounds2D::from_points(points.iter().copied());
        let hits: Vec<EntityId> = self
            .document
            .entities()
            .filter_map(|(id, _)| {
                let bounds = self.document.entity_bounds(*id)?;
                overlaps(&window, &bounds).then_some(*id)
            })
            .collect();
        if hits.is_empty() {
            SelectionResult::failed(PromptStatus::Error)
        } else {
            SelectionResult::ok(hits)
        }
    }
}

impl EntityStore for Session {
    fn entity_kind(&self, id: EntityId) -> Option<EntityKind> {
        self.document.entity(id).map(Entity::kind)
    }

    fn read_boundary(&self, id: EntityId) -> Result<Boundary, EngineError> {
        match self.document.entity(id) {
            Some(Entity::Polyline(polyline)) => Ok(Boundary {
                points: polyline.vertices.clone(),
                is_closed: polyline.is_closed,
            }),
            _ => Err(EngineError::EntityNotFound(id.get())),
        }
    }

    fn entity_extents(&self, id: EntityId) -> Option<Bounds2D> {
        self.document.entity_bounds(id)
    }

    fn is_associative_array(&self, id: EntityId) -> bool {
        matches!(
            self.document.entity(id),
            Some(Entity::AssociativeArray(_))
        )
    }

    fn array_position(&self, id: EntityId) -> Result<Point2, EngineError> {
        Ok(self.array(id)?.position)
    }

    fn array_source_entities(&self, id: EntityId) -> Result<Vec<EntityId>, EngineError> {
        Ok(self.array(id)?.sources.clone())
    }

    fn array_items(&self, id: EntityId) -> Result<Vec<GridLocator>, EngineError> {
        Ok(self.array(id)?.items.iter().map(|item| item.locator).collect())
    }

    fn read_instance_transform(
        &self,
        id: EntityId,
        locator: GridLocator,
    ) -> Result<Transform2, EngineError> {
        self.array(id)?
            .items
            .iter()
            .find(|item| item.locator == locator)
            .map(|item| item.transform)
            .ok_or(EngineError::EntityNotFound(id.get()))
    }

    fn block_template_name(&self, id: EntityId) -> Option<String> {
        match self.document.entity(id) {
            Some(Entity::BlockReference(reference)) => Some(reference.effective_name().to_string()),
            _ => None,
        }
    }

    fn read_attribute_fields(&self, id: EntityId) -> Result<Vec<AttributeField>, EngineError> {
        Ok(self
            .block_reference(id)?
            .attributes
            .iter()
            .map(|attribute| AttributeField {
                tag: attribute.tag.clone(),
                text: attribute.text.clone(),
                is_constant: attribute.is_constant,
            })
            .collect())
    }

    fn read_dynamic_properties(&self, id: EntityId) -> Result<Vec<DynamicProperty>, EngineError> {
        Ok(self.block_reference(id)?.properties.clone())
    }

    fn write_attribute_field(
        &mut self,
        id: EntityId,
        tag: &str,
        text: &str,
    ) -> Result<(), EngineError> {
        let Some(Entity::BlockReference(reference)) = self.document.entity_mut(id) else {
            return Err(EngineError::EntityNotFound(id.get()));
        };
        let attribute = reference
            .attributes
            .iter_mut()
            .find(|attribute| attribute.tag == tag && !attribute.is_constant)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        attribute.text = text.to_string();
        Ok(())
    }

    fn read_text(&self, id: EntityId) -> Option<TextRecord> {
        let entity = self.document.entity(id)?;
        let content = match entity {
            Entity::Text(text) => text.content.clone(),
            Entity::MText(mtext) => mtext.content.clone(),
            _ => return None,
        };
        Some(TextRecord {
            content,
            extents: entity.bounds().unwrap_or_else(Bounds2D::empty),
        })
    }
}

impl PageService for Session {
    fn list_existing_page_names(&self) -> Vec<String> {
        self.document
            .layouts()
            .map(|layout| layout.name.clone())
            .collect()
    }

    fn create_page(&mut self, name: &str) -> Option<PageId> {
        if self.rejected_page_names.contains(name) {
            return None;
        }
        self.document.create_layout(name)
    }

    fn set_current_page(&mut self, name: &str) -> bool {
        self.document.set_current_layout(name)
    }

    fn page_viewports(&self, page: PageId) -> Vec<(ViewportId, Bounds2D)> {
        self.document
            .layout(page)
            .map(|layout| {
                layout
                    .viewports
                    .iter()
                    .map(|viewport| (viewport.id, viewport.bounds()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn erase_viewport(&mut self, page: PageId, viewport: ViewportId) -> bool {
        self.document.erase_viewport(page, viewport)
    }

    fn list_available_devices(&self) -> Vec<String> {
        self.document.plot_catalog().devices.clone()
    }

    fn list_available_sizes(&self) -> Vec<String> {
        self.document
            .plot_catalog()
            .media
            .iter()
            .map(|media| media.name.clone())
            .collect()
    }

    fn list_available_styles(&self) -> Vec<String> {
        self.document.plot_catalog().style_sheets.clone()
    }

    fn set_paper_preset(&mut self, page: PageId, preset: &PaperPreset) -> Result<(), EngineError> {
        let layout = self
            .document
            .layout_mut(page)
            .ok_or(EngineError::EntityNotFound(page.get()))?;
        if let Some(device) = &preset.device {
            layout.plot.device = Some(device.clone());
        }
        if let Some(media) = &preset.media {
            layout.plot.media = Some(media.clone());
        }
        if let Some(style) = &preset.style_sheet {
            layout.plot.style_sheet = Some(style.clone());
        }
        Ok(())
    }

    fn set_print_area(
        &mut self,
        page: PageId,
        extents: Bounds2D,
        units: PaperUnits,
    ) -> Result<(), EngineError> {
        let layout = self
            .document
            .layout_mut(page)
            .ok_or(EngineError::EntityNotFound(page.get()))?;
        layout.plot.paper_units = units;
        layout.plot.use_standard_scale = true;
        layout.plot.standard_scale_one_to_one = true;
        layout.plot.window = Some(extents);
        Ok(())
    }

    fn media_size(&self, page: PageId) -> Option<Vector2> {
        self.document.layout_media_size(page)
    }

    fn create_viewport(&mut self, page: PageId) -> Option<ViewportId> {
        self.document.add_viewport(page)
    }

    fn configure_viewport(
        &mut self,
        viewport: ViewportId,
        settings: &ViewportSettings,
    ) -> Result<(), EngineError> {
        self.document.ensure_layer(&settings.layer);
        let target = self
            .document
            .viewport_mut(viewport)
            .ok_or(EngineError::EntityNotFound(viewport.get()))?;
        target.center = settings.center;
        target.width = settings.width;
        target.height = settings.height;
        target.view_center = settings.view_center;
        target.view_height = settings.view_height;
        target.custom_scale = settings.custom_scale;
        target.scale = settings.scale;
        target.view_direction = settings.view_direction;
        target.is_on = settings.is_on;
        target.is_locked = settings.is_locked;
        target.layer = settings.layer.clone();
        target.color_index = settings.color_index;
        target.line_weight = settings.line_weight;
        Ok(())
    }

    fn set_current_view(&mut self, view: ViewState) {
        self.document.set_view(view);
    }
}

impl EnvironmentSettings for Session {
    fn get_setting(&self, name: &str) -> Option<SettingValue> {
        self.document.system_variable(name).cloned()
    }

    fn set_setting(&mut self, name: &str, value: SettingValue) {
        self.document.set_system_variable(name, value);
    }

    fn set_display_space(&mut self, space: SpaceMode) {
        self.document.set_space(space);
    }

    fn regen(&mut self) {
        self.document.regen();
    }
}

impl Transactional for Session {
    fn begin_transaction(&mut self) {
        self.snapshots.push(self.document.clone());
    }

    fn commit_transaction(&mut self) -> Result<(), EngineError> {
        let Some(snapshot) = self.snapshots.pop() else {
            return Err(EngineError::TransactionFailure(
                "no open transaction".to_string(),
            ));
        };
        match self.commits_before_failure {
            Some(0) => {
                self.document = snapshot;
                Err(EngineError::TransactionFailure(
                    "commit rejected by host".to_string(),
                ))
            }
            Some(remaining) => {
                self.commits_before_failure = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn abort_transaction(&mut self) {
        if let Some(snapshot) = self.snapshots.pop() {
            self.document = snapshot;
        }
    }
}
