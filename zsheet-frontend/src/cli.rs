use std::path::PathBuf;

use tracing::{info, warn};
use zsheet_config::SheetConfig;
use zsheet_core::document::{Document, EntityKind};
use zsheet_engine::command::{CommandBus, CommandContext, CommandRequest};
use zsheet_engine::extract::SelectionMode;
use zsheet_engine::pipeline::{PipelineReport, RENUMBER_NO, RENUMBER_YES};
use zsheet_engine::session::{PromptReply, Session};
use zsheet_io::{DocumentSaver, JsonFacade};

use crate::errors::FrontendError;
use crate::loader::{DocumentSource, load_document};

const GENERATE_COMMAND: &str = "generate_sheets";

/// 一次 CLI 运行的输入：场景来源与两个提示的预设回答。
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub document: Option<PathBuf>,
    pub mode: SelectionMode,
    pub renumber: bool,
    /// 运行后把文档（含新布局）写回 JSON。
    pub output: Option<PathBuf>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            document: None,
            mode: SelectionMode::Array,
            renumber: false,
            output: None,
        }
    }
}

#[derive(Debug)]
pub struct CliOutcome {
    pub source: DocumentSource,
    pub commands: Vec<&'static str>,
    pub message: String,
    pub report: PipelineReport,
    pub document: Document,
}

/// 按提示顺序准备应答：模式、区域选择，阵列模式下再回答是否重新编号。
pub fn scripted_replies(document: &Document, options: &CliOptions) -> Vec<PromptReply> {
    let mut replies = vec![PromptReply::Keyword(options.mode.keyword().to_string())];
    match options.mode {
        SelectionMode::Array => {
            let array = document
                .entities()
                .find(|(_, entity)| entity.kind() == EntityKind::AssociativeArray)
                .map(|(id, _)| *id);
            match array {
                Some(id) => replies.push(PromptReply::Pick(vec![id])),
                None => {
                    warn!("文档中没有关联阵列");
                    replies.push(PromptReply::Cancel);
                }
            }
            let answer = if options.renumber { RENUMBER_YES } else { RENUMBER_NO };
            replies.push(PromptReply::Keyword(answer.to_string()));
        }
        SelectionMode::Polyline => {
            if options.renumber {
                warn!("多段线模式不支持重新编号，忽略该选项");
            }
            replies.push(PromptReply::PickAll);
        }
    }
    replies
}

/// 加载文档、执行 `generate_sheets` 命令并返回结果，不做任何输出。
pub fn run(options: &CliOptions, config: &SheetConfig) -> Result<CliOutcome, FrontendError> {
    let loaded = load_document(options.document.as_deref())?;
    let mut session = Session::with_document(loaded.document);
    for reply in scripted_replies(session.document(), options) {
        session.push_reply(reply);
    }

    let command_bus = CommandBus::new();
    let mut commands: Vec<&'static str> = command_bus.available_commands().copied().collect();
    commands.sort_unstable();

    let response = {
        let mut context = CommandContext {
            host: &mut session,
            config,
        };
        command_bus.dispatch(&CommandRequest::new(GENERATE_COMMAND), &mut context)
    };
    let message = response.message.unwrap_or_default();
    let Some(report) = response.report.filter(|_| response.success) else {
        return Err(FrontendError::Command(message));
    };
    info!(pages = report.pages.len(), "CLI 命令完成");

    let document = session.into_document();
    if let Some(path) = &options.output {
        JsonFacade::new()
            .save(&document, path)
            .map_err(FrontendError::Save)?;
        info!(path = %path.display(), "已写出结果文档");
    }

    Ok(CliOutcome {
        source: loaded.source,
        commands,
        message,
        report,
        document,
    })
}

pub fn print_outcome(outcome: &CliOutcome) {
    println!("支持的命令: {}", outcome.commands.join(", "));
    match &outcome.source {
        DocumentSource::Json(path) => println!("文档来源: {}", path.display()),
        DocumentSource::Demo => println!("文档来源: 内置示例"),
    }
    let report = &outcome.report;
    println!(
        "模式: {}，重新编号: {}",
        report.mode.keyword(),
        if report.renumber { "是" } else { "否" }
    );
    println!("区域数量: {}", report.zone_count());
    println!("总页数: {}", report.total_sheet_count());
    for page in &report.pages {
        println!(
            "  布局 [{}, {}] -> {}",
            page.locator.row, page.locator.column, page.name
        );
    }
    for skipped in &report.skipped {
        println!(
            "  跳过 [{}, {}]: {}",
            skipped.locator.row, skipped.locator.column, skipped.reason
        );
    }
    println!("{}", outcome.message);
}
