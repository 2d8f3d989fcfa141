use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zsheet_core::document::Document;

/// 当前写出的场景格式版本。
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// 磁盘上的场景文件：带版本号的文档包装。
#[derive(Debug, Serialize, Deserialize)]
struct SceneFile {
    version: u32,
    document: Document,
}

/// JSON 场景读写。
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFacade {
    pretty: bool,
}

impl JsonFacade {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// 输出紧凑 JSON。
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn parse_str(&self, data: &str) -> Result<Document, IoError> {
        let scene: SceneFile =
            serde_json::from_str(data).map_err(|err| IoError::InvalidDocument(err.to_string()))?;
        if scene.version > FORMAT_VERSION {
            return Err(IoError::InvalidDocument(format!(
                "unsupported scene version {} (max {FORMAT_VERSION})",
                scene.version
            )));
        }
        Ok(scene.document)
    }

    pub fn to_json(&self, document: &Document) -> Result<String, IoError> {
        let scene = SceneFileRef {
            version: FORMAT_VERSION,
            document,
        };
        let result = if self.pretty {
            serde_json::to_string_pretty(&scene)
        } else {
            serde_json::to_string(&scene)
        };
        result.map_err(|err| IoError::InvalidDocument(err.to_string()))
    }
}

#[derive(Serialize)]
struct SceneFileRef<'a> {
    version: u32,
    document: &'a Document,
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_str(&data)
    }
}

impl DocumentSaver for JsonFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let data = self.to_json(document)?;
        fs::write(path, data).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}
