pub mod command;
pub mod extract;
pub mod grid;
pub mod host;
pub mod page;
pub mod pipeline;
pub mod session;
pub mod title_block;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("input aborted: {0}")]
        InputAborted(String),
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("entity {0} is not a recognized title block")]
        MetadataRejected(u64),
        #[error("failed to generate page `{name}`: {reason}")]
        GenerationFailed { name: String, reason: String },
        #[error("document transaction failed: {0}")]
        TransactionFailure(String),
    }

    impl EngineError {
        pub(crate) fn generation(name: &str, reason: impl Into<String>) -> Self {
            EngineError::GenerationFailed {
                name: name.to_string(),
                reason: reason.into(),
            }
        }

        /// 只有事务失败会中止整次运行，其余错误都局限在单个区域或单个实体。
        #[inline]
        pub fn is_fatal(&self) -> bool {
            matches!(self, EngineError::TransactionFailure(_))
        }
    }
}
