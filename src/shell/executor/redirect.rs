use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::error;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{dup, dup2};

use crate::error::{Result, ShellError};
use crate::shell::parser::{Command, Redirection};

pub const STDIN: RawFd = libc::STDIN_FILENO;
pub const STDOUT: RawFd = libc::STDOUT_FILENO;

fn owned(fd: RawFd) -> OwnedFd {
    // SAFETY: fd 刚由 open/dup 返回，所有权只在这里建立一次
    unsafe { OwnedFd::from_raw_fd(fd) }
}

pub fn open_input(path: &str) -> io::Result<OwnedFd> {
    let fd = open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{path}: {e}")))?;
    Ok(owned(fd))
}

pub fn open_output(redirection: &Redirection) -> io::Result<OwnedFd> {
    let mode = if redirection.append {
        OFlag::O_APPEND
    } else {
        OFlag::O_TRUNC
    };
    let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_CLOEXEC | mode;
    let fd = open(
        redirection.filename.as_str(),
        flags,
        Mode::from_bits_truncate(0o644),
    )
    .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{}: {e}", redirection.filename)))?;
    Ok(owned(fd))
}

/// 命令自带的 `<`/`>` 文件，优先于管道描述符
pub struct FileRedirects {
    pub input: Option<OwnedFd>,
    pub output: Option<OwnedFd>,
}

impl FileRedirects {
    pub fn open(command: &Command) -> io::Result<Self> {
        let input = command.input.as_deref().map(open_input).transpose()?;
        let output = command.output.as_ref().map(open_output).transpose()?;
        Ok(Self { input, output })
    }
}

/// 子进程在 exec 前调用：依次接上管道与文件
///
/// 所有描述符都随本函数的参数一起释放，dup2 失败时也一样。
pub fn apply_child(
    pipe_in: Option<OwnedFd>,
    pipe_out: Option<OwnedFd>,
    command: &Command,
) -> io::Result<()> {
    if let Some(fd) = pipe_in {
        dup2(fd.as_raw_fd(), STDIN).map_err(io::Error::from)?;
    }
    if let Some(fd) = pipe_out {
        dup2(fd.as_raw_fd(), STDOUT).map_err(io::Error::from)?;
    }
    let files = FileRedirects::open(command)?;
    if let Some(fd) = files.input {
        dup2(fd.as_raw_fd(), STDIN).map_err(io::Error::from)?;
    }
    if let Some(fd) = files.output {
        dup2(fd.as_raw_fd(), STDOUT).map_err(io::Error::from)?;
    }
    Ok(())
}

/// 在 shell 进程内临时替换标准输入输出，析构时恢复
pub struct StdioGuard {
    saved_in: Option<OwnedFd>,
    saved_out: Option<OwnedFd>,
}

impl StdioGuard {
    pub fn redirect(input: Option<RawFd>, output: Option<RawFd>) -> Result<Self> {
        let mut guard = StdioGuard {
            saved_in: None,
            saved_out: None,
        };
        if let Some(fd) = input {
            let saved = dup(STDIN).map_err(|e| ShellError::resource("dup", e))?;
            guard.saved_in = Some(owned(saved));
            dup2(fd, STDIN).map_err(|e| ShellError::resource("dup2", e))?;
        }
        if let Some(fd) = output {
            io::stdout().flush()?;
            let saved = dup(STDOUT).map_err(|e| ShellError::resource("dup", e))?;
            guard.saved_out = Some(owned(saved));
            dup2(fd, STDOUT).map_err(|e| ShellError::resource("dup2", e))?;
        }
        Ok(guard)
    }
}

impl Drop for StdioGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved_out.take() {
            if let Err(e) = io::stdout().flush() {
                error!("刷新内建命令输出失败: {}", e);
            }
            if let Err(e) = dup2(saved.as_raw_fd(), STDOUT) {
                error!("恢复标准输出失败: {}", e);
            }
        }
        if let Some(saved) = self.saved_in.take() {
            if let Err(e) = dup2(saved.as_raw_fd(), STDIN) {
                error!("恢复标准输入失败: {}", e);
            }
        }
    }
}
