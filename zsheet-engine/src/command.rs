use std::collections::HashMap;

use zsheet_config::SheetConfig;

use crate::errors::EngineError;
use crate::host::Host;
use crate::pipeline::{Pipeline, PipelineReport};

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    pub report: Option<PipelineReport>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            report: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            report: None,
        }
    }

    pub fn with_report(mut self, report: PipelineReport) -> Self {
        self.report = Some(report);
        self
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub host: &'a mut dyn Host,
    pub config: &'a SheetConfig,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(GenerateSheetsCommand);
        let mut commands: Vec<&'static str> = bus.handlers.keys().copied().collect();
        commands.push(HelpCommand::NAME);
        commands.sort_unstable();
        bus.register(HelpCommand { commands });
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct GenerateSheetsCommand;

impl CommandHandler for GenerateSheetsCommand {
    fn name(&self) -> &'static str {
        "generate_sheets"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match Pipeline::new(context.config.clone()).run(&mut *context.host) {
            Ok(report) => {
                let message = format!(
                    "已生成 {} 个布局，跳过 {} 个区域，共 {} 页",
                    report.pages.len(),
                    report.skipped.len(),
                    report.total_sheet_count()
                );
                CommandResponse::ok(message).with_report(report)
            }
            Err(EngineError::InputAborted(reason)) => {
                CommandResponse::err(format!("命令已取消: {reason}"))
            }
            Err(err) => CommandResponse::err(format!("分页出图失败: {err}")),
        }
    }
}

/// 列出构造命令总线时已注册的命令。
struct HelpCommand {
    commands: Vec<&'static str>,
}

impl HelpCommand {
    const NAME: &'static str = "help";
}

impl CommandHandler for HelpCommand {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        _context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        CommandResponse::ok(format!("可用命令: {}", self.commands.join(", ")))
    }
}
