use log::{debug, error, warn};
use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use nix::unistd::{geteuid, gethostname, User};

use crate::shell::executor::variable::Variable;
use crate::shell::executor::Executor;
use crate::shell::job_manager::JobManager;
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals;
use crate::utils::aliases::Aliases;
use crate::utils::config::Config;
use crate::utils::path::display_dir;
use crate::utils::theme::Theme;

pub struct Shell<'a> {
    config: &'a Config,
    theme: Theme,
    executor: Executor,
    aliases: Aliases,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            theme: Theme::default(),
            executor: Executor::new(
                Variable::new(config.name.clone()),
                JobManager::new(config.max_jobs),
            ),
            aliases: Aliases::default(),
        }
    }

    /// 交互模式，返回 shell 进程的退出码
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        debug!("初始化 ash...");

        // 忽略 Ctrl-C、Ctrl-Z 等，由前台子进程自己接收
        signals::ignore_block_signals();
        // SIGCHLD 只置位标志，回收在主循环里做
        signals::setup_sigchld_handler();

        self.load_aliases();

        let first_run = !self.config.history_file.exists();
        let mut readline = ReadlineManager::new(self.config)?;
        for line in readline.load_history() {
            self.executor.add_history(&line);
        }

        if first_run {
            println!(
                "{}",
                (self.theme.success_style)(self.theme.get_message("welcome"))
            );
            println!("{}\n", self.theme.get_message("first_run"));
        }
        debug!("ash 准备就绪...");

        let status = self.run_loop(&mut readline);
        readline.save_history();

        debug!("退出 ash，状态 {}", status);
        Ok(status)
    }

    fn run_loop(&mut self, readline: &mut ReadlineManager) -> i32 {
        loop {
            self.report_jobs();
            if let Err(e) = io::stdout().flush() {
                error!("刷新标准输出失败: {}", e);
            }

            let prompt = match self.prompt() {
                Ok(prompt) => prompt,
                Err(e) => {
                    error!("无法获取当前目录: {}", e);
                    eprintln!("ash: getcwd failed: {}", e);
                    return 1;
                }
            };

            match readline.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match readline.add_history(&line) {
                        Ok(true) => readline.append_history(),
                        Ok(false) => {}
                        Err(e) => warn!("无法写入历史记录: {}", e),
                    }
                    self.executor.add_history(&line);

                    let status = self.handle_input(&line);
                    if let Some(code) = self.executor.exit_request() {
                        println!(
                            "{}",
                            (self.theme.success_style)(self.theme.get_message("exit"))
                        );
                        return code;
                    }
                    if status != 0 {
                        eprintln!(
                            "{}",
                            (self.theme.error_style)(format!(
                                "{} {}",
                                self.theme.get_message("status_error"),
                                status
                            ))
                        );
                    }
                }
                Err(ReadlineError::Eof) => {
                    warn!("接收到 EOF，退出 ash...");
                    println!(
                        "{}",
                        (self.theme.warning_style)(self.theme.get_message("eof_signal"))
                    );
                    return 0;
                }
                Err(ReadlineError::Interrupted) => {
                    debug!("接收到中断信号...");
                    println!(
                        "{}",
                        (self.theme.warning_style)(self.theme.get_message("interrupt_signal"))
                    );
                }
                Err(err) => {
                    error!("发生错误: {}", err);
                    eprintln!(
                        "{}: {}",
                        (self.theme.error_style)(self.theme.get_message("error")),
                        err
                    );
                    return 1;
                }
            }
        }
    }

    fn handle_input(&mut self, line: &str) -> i32 {
        let line = self.aliases.rewrite(line);
        self.executor.run_line(&line)
    }

    fn load_aliases(&mut self) {
        match Aliases::ensure_and_load(&self.config.rc_file) {
            Ok(aliases) => {
                if !aliases.is_empty() {
                    debug!("加载了 {} 个别名", aliases.len());
                }
                self.aliases = aliases;
            }
            Err(e) => {
                warn!("无法读取 {}: {}", self.config.rc_file.display(), e);
                eprintln!("ash: could not load {}: {}", self.config.rc_file.display(), e);
            }
        }
    }

    /// 打印 SIGCHLD 之后状态有变化的后台作业
    fn report_jobs(&mut self) {
        if !signals::take_sigchld() {
            return;
        }
        for job in self.executor.jobs_mut().reap() {
            println!("{}", job);
        }
    }

    fn prompt(&self) -> io::Result<String> {
        let cwd = env::current_dir()?;
        let dir = display_dir(&cwd.to_string_lossy(), &self.config.home);
        let user = User::from_uid(geteuid())
            .ok()
            .flatten()
            .map(|user| user.name)
            .or_else(|| env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string());
        let host = gethostname()
            .map(|host| host.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        Ok(self.theme.prompt(&user, &host, &dir, geteuid().is_root()))
    }

    /// 逐行执行脚本文件，空行与 `#` 注释行跳过
    pub fn run_script(&mut self, path: &Path) -> Result<i32, Box<dyn Error>> {
        let script = fs::read_to_string(path).map_err(|e| {
            error!("无法打开脚本 {}: {}", path.display(), e);
            format!("{}: {}", path.display(), e)
        })?;
        debug!("执行脚本 {}", path.display());
        signals::setup_sigchld_handler();
        self.load_aliases();

        for line in script.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.report_jobs();
            self.handle_input(line);
            if let Some(code) = self.executor.exit_request() {
                return Ok(code);
            }
        }
        Ok(0)
    }

    /// `-c` 模式：执行一行并返回其状态
    pub fn run_command(&mut self, line: &str) -> i32 {
        self.load_aliases();
        let status = self.handle_input(line);
        self.executor.exit_request().unwrap_or(status)
    }
}
