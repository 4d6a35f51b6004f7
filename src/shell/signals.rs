use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// shell 自身忽略、子进程恢复默认的信号
const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);

// 只允许做异步信号安全的事：置位标志，回收与报告留给主循环
extern "C" fn on_sigchld(_signal: libc::c_int) {
    SIGCHLD_PENDING.store(true, Ordering::SeqCst);
}

/// 忽略 Ctrl-C、Ctrl-\、Ctrl-Z 以及后台读写终端产生的信号
pub fn ignore_block_signals() {
    for sig in JOB_CONTROL_SIGNALS {
        // SAFETY: SIG_IGN 不运行任何用户代码
        if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigIgn) } {
            error!("无法忽略信号 {}: {}", sig, e);
        }
    }
    debug!("已忽略作业控制信号");
}

/// 安装 SIGCHLD 处理函数，子进程状态变化时只记录一个标志
pub fn setup_sigchld_handler() {
    let action = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: 处理函数只写一个原子变量
    match unsafe { signal::sigaction(Signal::SIGCHLD, &action) } {
        Ok(_) => debug!("SIGCHLD 处理函数已安装"),
        Err(e) => error!("无法安装 SIGCHLD 处理函数: {}", e),
    }
}

/// 在 fork 出的子进程里、exec 之前调用
///
/// Rust 运行时启动时忽略了 SIGPIPE，忽略状态会跨 exec 继承，这里一并恢复。
pub fn reset_for_child() {
    for sig in JOB_CONTROL_SIGNALS.into_iter().chain([Signal::SIGPIPE]) {
        // SAFETY: fork 之后只调用异步信号安全的 signal(2)
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
    }
}

/// 读取并清除 SIGCHLD 标志
pub fn take_sigchld() -> bool {
    SIGCHLD_PENDING.swap(false, Ordering::SeqCst)
}
