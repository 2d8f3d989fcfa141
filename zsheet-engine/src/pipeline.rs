//! 分页出图流程：选择模式、发现区域、计数遍历、提交遍历、逐区域生成布局。

use tracing::{debug, error, info, warn};
use zsheet_config::SheetConfig;
use zsheet_core::document::{EntityId, PageId, SpaceMode};
use zsheet_core::sheet::{GridLocator, NumberingContext, PageRequest, Zone};

use crate::errors::EngineError;
use crate::extract::{ReadPass, SelectionMode, ZoneMap};
use crate::host::{GENERATION_SETTINGS, Host, PromptStatus, SettingsBracket, with_transaction};
use crate::page::PageGenerator;

pub const RENUMBER_YES: &str = "Yes";
pub const RENUMBER_NO: &str = "No";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ModeSelected,
    ZonesDiscovered,
    CountPass,
    CounterCommit,
    GeneratePass,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPage {
    pub locator: GridLocator,
    pub name: String,
    pub page: PageId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedZone {
    pub locator: GridLocator,
    pub reason: String,
}

/// 一次运行的结果汇总。
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub mode: SelectionMode,
    pub renumber: bool,
    /// 提交遍历结束时的计数器，`total_sheet_count` 为计数遍历得出的总页数。
    pub numbering: NumberingContext,
    pub zones: ZoneMap,
    pub pages: Vec<CreatedPage>,
    pub skipped: Vec<SkippedZone>,
}

impl PipelineReport {
    #[inline]
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    #[inline]
    pub fn total_sheet_count(&self) -> u32 {
        self.numbering.total_sheet_count
    }
}

struct StateTracker(PipelineState);

impl StateTracker {
    fn advance(&mut self, next: PipelineState) {
        info!(from = ?self.0, to = ?next, "流程状态切换");
        self.0 = next;
    }

    fn abort(&mut self, reason: &str) -> EngineError {
        warn!(from = ?self.0, reason, "流程中止");
        self.0 = PipelineState::Aborted;
        EngineError::InputAborted(reason.to_string())
    }
}

pub struct Pipeline {
    config: SheetConfig,
}

impl Pipeline {
    pub fn new(config: SheetConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, host: &mut dyn Host) -> Result<PipelineReport, EngineError> {
        let mut state = StateTracker(PipelineState::Idle);

        let choice = host.prompt_keyword(
            "选择区域来源",
            &[SelectionMode::ARRAY_KEYWORD, SelectionMode::POLYLINE_KEYWORD],
            SelectionMode::ARRAY_KEYWORD,
        );
        if choice.status != PromptStatus::Ok {
            return Err(state.abort("mode selection cancelled"));
        }
        let Some(mode) = SelectionMode::from_keyword(&choice.keyword) else {
            return Err(state.abort("unknown selection mode"));
        };
        state.advance(PipelineState::ModeSelected);

        let strategy = mode.strategy(&self.config);
        let mut zones = with_transaction(host, |host| strategy.discover_zones(host))?;
        if zones.is_empty() {
            return Err(state.abort("no zones discovered"));
        }
        info!(mode = ?mode, zones = zones.len(), "已发现区域");
        state.advance(PipelineState::ZonesDiscovered);

        let renumber = if strategy.supports_renumbering() {
            let answer =
                host.prompt_keyword("重新编号？", &[RENUMBER_YES, RENUMBER_NO], RENUMBER_NO);
            if answer.status != PromptStatus::Ok {
                return Err(state.abort("renumber prompt cancelled"));
            }
            answer.keyword == RENUMBER_YES
        } else {
            false
        };

        host.set_display_space(SpaceMode::Model);
        state.advance(PipelineState::CountPass);
        let mut numbering = NumberingContext::start(renumber);
        for (locator, zone) in &zones {
            let Some(contents) = zone_contents(host, locator, zone) else {
                continue;
            };
            if let Err(err) =
                strategy.read_metadata(host, zone, &contents, &mut numbering, ReadPass::Count)
            {
                if err.is_fatal() {
                    error!(%err, "计数遍历失败");
                    return Err(err);
                }
                warn!(row = locator.row, column = locator.column, %err, "计数遍历跳过区域");
            }
        }

        state.advance(PipelineState::CounterCommit);
        let mut numbering = numbering.restart_with_total();
        info!(total = numbering.total_sheet_count, renumber, "总页数已确定");

        state.advance(PipelineState::GeneratePass);
        let mut skipped = Vec::new();
        for (locator, zone) in zones.iter_mut() {
            zone.metadata = None;
            let Some(contents) = zone_contents(host, locator, zone) else {
                skipped.push(SkippedZone {
                    locator: *locator,
                    reason: "empty area".to_string(),
                });
                continue;
            };
            match strategy.read_metadata(host, zone, &contents, &mut numbering, ReadPass::Commit) {
                Ok(metadata) => zone.metadata = Some(metadata),
                Err(err) if err.is_fatal() => {
                    error!(%err, "提交遍历失败");
                    return Err(err);
                }
                Err(err) => {
                    warn!(row = locator.row, column = locator.column, %err, "提交遍历跳过区域");
                    skipped.push(SkippedZone {
                        locator: *locator,
                        reason: err.to_string(),
                    });
                }
            }
        }

        host.set_display_space(SpaceMode::Paper);
        let outcome = {
            let mut bracket = SettingsBracket::acquire(&mut *host, &GENERATION_SETTINGS);
            self.generate_pages(&mut *bracket, &zones, &mut skipped)
        };
        host.set_display_space(SpaceMode::Model);
        host.regen();
        let pages = outcome?;

        state.advance(PipelineState::Done);
        info!(
            pages = pages.len(),
            skipped = skipped.len(),
            "分页出图完成"
        );
        Ok(PipelineReport {
            state: state.0,
            mode: strategy.mode(),
            renumber,
            numbering,
            zones,
            pages,
            skipped,
        })
    }

    fn generate_pages(
        &self,
        host: &mut dyn Host,
        zones: &ZoneMap,
        skipped: &mut Vec<SkippedZone>,
    ) -> Result<Vec<CreatedPage>, EngineError> {
        let generator = PageGenerator::new(self.config.plot.clone());
        let mut pages = Vec::new();
        for (locator, zone) in zones {
            let Some(request) = PageRequest::from_zone(zone, &self.config.title_block.title_sentinel)
            else {
                continue;
            };
            match generator.generate(host, &request) {
                Ok(generated) => {
                    debug!(row = locator.row, column = locator.column, name = %generated.name, "区域已出图");
                    pages.push(CreatedPage {
                        locator: *locator,
                        name: generated.name,
                        page: generated.page,
                    });
                }
                Err(err) if err.is_fatal() => {
                    error!(%err, "生成布局时事务失败");
                    return Err(err);
                }
                Err(err) => {
                    warn!(row = locator.row, column = locator.column, %err, "跳过区域");
                    skipped.push(SkippedZone {
                        locator: *locator,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(pages)
    }
}

/// 与区域边界相交的实体；选择为空时视为空白区域。
fn zone_contents(host: &mut dyn Host, locator: &GridLocator, zone: &Zone) -> Option<Vec<EntityId>> {
    let selection = host.select_crossing_polygon(zone.boundary());
    if selection.status != PromptStatus::Ok {
        debug!(row = locator.row, column = locator.column, "空白区域");
        return None;
    }
    Some(selection.entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PromptReply, Session};

    #[test]
    fn cancelled_mode_prompt_aborts_without_mutation() {
        let mut session = Session::new();
        session.push_reply(PromptReply::Cancel);
        let err = Pipeline::new(SheetConfig::default())
            .run(&mut session)
            .unwrap_err();
        assert!(matches!(err, EngineError::InputAborted(_)));
        assert_eq!(session.document().layouts().count(), 0);
        assert_eq!(session.document().regen_count(), 0);
    }

    #[test]
    fn unknown_mode_and_empty_selection_abort() {
        let mut session = Session::new();
        session.push_reply(PromptReply::Keyword("Circles".into()));
        let err = Pipeline::new(SheetConfig::default())
            .run(&mut session)
            .unwrap_err();
        assert!(matches!(err, EngineError::InputAborted(_)));

        session
            .push_reply(PromptReply::Keyword("Polylines".into()))
            .push_reply(PromptReply::PickAll);
        let err = Pipeline::new(SheetConfig::default())
            .run(&mut session)
            .unwrap_err();
        assert!(matches!(err, EngineError::InputAborted(ref reason) if reason.contains("no zones")));
        assert_eq!(session.pending_replies(), 0);
    }
}
