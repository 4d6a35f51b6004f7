mod executor;
mod job_manager;
mod parser;
mod readline;
mod shell;
mod signals;

pub use shell::Shell;
pub use job_manager::DEFAULT_MAX_JOBS;
