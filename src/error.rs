use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

/// shell 核心的错误
///
/// 只影响当前这一行：主循环报告后回到提示符。
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Syntax(String),

    /// 连接管道段时 pipe/fork/dup 失败
    #[error("{op} failed: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("{0}")]
    Job(String),

    #[error("{0}")]
    Variable(String),

    #[error("out of memory: {0}")]
    OutOfMemory(#[from] std::collections::TryReserveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn resource(op: &'static str, source: nix::Error) -> Self {
        ShellError::Resource { op, source }
    }

    /// 该错误中止一行时的退出状态
    pub fn status(&self) -> i32 {
        match self {
            ShellError::Syntax(_) => 2,
            _ => 1,
        }
    }
}
