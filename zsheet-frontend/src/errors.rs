use thiserror::Error;
use zsheet_io::IoError;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取场景文件失败: {0}")]
    Load(#[source] IoError),
    #[error("保存场景文件失败: {0}")]
    Save(#[source] IoError),
    #[error("命令执行失败: {0}")]
    Command(String),
}
