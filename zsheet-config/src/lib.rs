use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sheets: SheetConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ZSHEET_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ZSHEET_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 分页出图相关配置，对应 TOML 中的 `[sheets.*]` 小节。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub title_block: TitleBlockConfig,
    #[serde(default)]
    pub plot: PlotConfig,
    #[serde(default)]
    pub array: ArrayConfig,
}

/// 网格排序容差。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GridConfig {
    #[serde(default = "GridConfig::default_row_epsilon")]
    pub row_epsilon: f64,
    #[serde(default = "GridConfig::default_column_epsilon")]
    pub column_epsilon: f64,
    /// 为真时按精确数值比较，不使用容差。
    #[serde(default)]
    pub exact: bool,
}

impl GridConfig {
    fn default_row_epsilon() -> f64 {
        50.0
    }

    fn default_column_epsilon() -> f64 {
        1.0
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            row_epsilon: Self::default_row_epsilon(),
            column_epsilon: Self::default_column_epsilon(),
            exact: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleBlockConfig {
    #[serde(default = "TitleBlockConfig::default_template_name")]
    pub template_name: String,
    #[serde(default = "TitleBlockConfig::default_title_sentinel")]
    pub title_sentinel: String,
}

impl TitleBlockConfig {
    fn default_template_name() -> String {
        "SG_Форма".to_string()
    }

    fn default_title_sentinel() -> String {
        "TITLE".to_string()
    }
}

impl Default for TitleBlockConfig {
    fn default() -> Self {
        Self {
            template_name: Self::default_template_name(),
            title_sentinel: Self::default_title_sentinel(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "PlotConfig::default_device")]
    pub device: String,
    #[serde(default = "PlotConfig::default_style_sheet")]
    pub style_sheet: String,
    #[serde(default = "PlotConfig::default_landscape_media")]
    pub landscape_media: String,
    #[serde(default = "PlotConfig::default_portrait_media")]
    pub portrait_media: String,
    #[serde(default = "PlotConfig::default_scale_snap_tolerance")]
    pub scale_snap_tolerance: f64,
    #[serde(default = "PlotConfig::default_fit_factor")]
    pub fit_factor: f64,
}

impl PlotConfig {
    fn default_device() -> String {
        "DWG To PDF.pc3".to_string()
    }

    fn default_style_sheet() -> String {
        "monochrome.ctb".to_string()
    }

    fn default_landscape_media() -> String {
        "ISO_full_bleed_A4_(210.00_x_297.00_MM)".to_string()
    }

    fn default_portrait_media() -> String {
        "ISO_full_bleed_A4_(297.00_x_210.00_MM)".to_string()
    }

    fn default_scale_snap_tolerance() -> f64 {
        0.1
    }

    fn default_fit_factor() -> f64 {
        1.0
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            style_sheet: Self::default_style_sheet(),
            landscape_media: Self::default_landscape_media(),
            portrait_media: Self::default_portrait_media(),
            scale_snap_tolerance: Self::default_scale_snap_tolerance(),
            fit_factor: Self::default_fit_factor(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ArrayConfig {
    /// 阵列源轮廓前四个顶点的外扩（正）或内缩（负）距离。
    #[serde(default)]
    pub boundary_inset: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_host_presets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.sheets.grid.row_epsilon, 50.0);
        assert_eq!(cfg.sheets.grid.column_epsilon, 1.0);
        assert!(!cfg.sheets.grid.exact);
        assert_eq!(cfg.sheets.title_block.template_name, "SG_Форма");
        assert_eq!(cfg.sheets.title_block.title_sentinel, "TITLE");
        assert_eq!(cfg.sheets.plot.device, "DWG To PDF.pc3");
        assert_eq!(cfg.sheets.plot.style_sheet, "monochrome.ctb");
        assert!((cfg.sheets.plot.scale_snap_tolerance - 0.1).abs() < f64::EPSILON);
        assert!((cfg.sheets.plot.fit_factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.sheets.array.boundary_inset, 0.0);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [sheets.grid]
            row_epsilon = 10.0
            exact = true

            [sheets.title_block]
            title_sentinel = "ТИТУЛ"

            [sheets.plot]
            device = "PDF.pc3"

            [sheets.array]
            boundary_inset = 2.5
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.sheets.grid.row_epsilon, 10.0);
        assert_eq!(cfg.sheets.grid.column_epsilon, 1.0);
        assert!(cfg.sheets.grid.exact);
        assert_eq!(cfg.sheets.title_block.title_sentinel, "ТИТУЛ");
        assert_eq!(cfg.sheets.title_block.template_name, "SG_Форма");
        assert_eq!(cfg.sheets.plot.device, "PDF.pc3");
        assert_eq!(cfg.sheets.plot.style_sheet, "monochrome.ctb");
        assert_eq!(cfg.sheets.array.boundary_inset, 2.5);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[sheets.grid]\nrow_epsilon = \"wide\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
