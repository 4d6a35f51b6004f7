use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{execvp, fork, pipe2, setpgid, ForkResult, Pid};

use super::builtins::Builtin;
use super::redirect::{self, FileRedirects, StdioGuard};
use super::variable::{is_valid_name, split_assignment, Variable};
use crate::error::{Result, ShellError};
use crate::shell::job_manager::{Foreground, JobManager, JobState};
use crate::shell::parser::ast::{segments, Segment};
use crate::shell::parser::{self, Command, Separator};
use crate::shell::signals;

/// 一次执行周期所需的全部 shell 状态
pub struct Executor {
    pub(super) variables: Variable,
    pub(super) jobs: JobManager,
    pub(super) history: Vec<String>,
    pub(super) last_status: i32,
    pub(super) last_duration: Duration,
    pub(super) exit_request: Option<i32>,
}

impl Executor {
    pub fn new(variables: Variable, jobs: JobManager) -> Self {
        Self {
            variables,
            jobs,
            history: Vec::new(),
            last_status: 0,
            last_duration: Duration::ZERO,
            exit_request: None,
        }
    }

    pub fn jobs_mut(&mut self) -> &mut JobManager {
        &mut self.jobs
    }

    pub fn add_history(&mut self, line: &str) {
        self.history.push(line.to_string());
    }

    /// `exit` 内建命令请求的退出码
    pub fn exit_request(&self) -> Option<i32> {
        self.exit_request
    }

    /// 分词、解析并执行一行输入，返回最后一个前台命令的状态
    pub fn run_line(&mut self, line: &str) -> i32 {
        let started = Instant::now();
        let status = match self.parse_line(line) {
            Ok(chain) => self.execute(&chain, line),
            Err(e) => {
                eprintln!("ash: {}", e);
                e.status()
            }
        };
        self.last_duration = started.elapsed();
        self.last_status = status;
        status
    }

    pub fn parse_line(&self, line: &str) -> Result<Vec<Command>> {
        let tokens = parser::tokenize(line)?;
        parser::parse(tokens, &self.variables).into_result()
    }

    pub fn execute(&mut self, chain: &[Command], line: &str) -> i32 {
        if chain.is_empty() {
            return 0;
        }
        if let Some(status) = self.try_assignment(chain, line) {
            return status;
        }

        let mut last_status = 0;
        let mut run_next = true;
        for segment in segments(chain) {
            let is_tail = segment.commands.iter().all(Command::is_empty);
            if run_next && !is_tail {
                match self.execute_segment(segment) {
                    Ok(status) => last_status = status,
                    Err(e) => {
                        error!("执行中止: {}", e);
                        eprintln!("ash: {}", e);
                        return e.status();
                    }
                }
                if self.exit_request.is_some() {
                    break;
                }
            }
            run_next = match segment.separator {
                Separator::And => last_status == 0,
                Separator::Or => last_status != 0,
                _ => true,
            };
        }
        last_status
    }

    /// `NAME=value` 与 `export NAME=value` 行：赋值并导出到环境变量
    fn try_assignment(&mut self, chain: &[Command], line: &str) -> Option<i32> {
        let [command] = chain else {
            return None;
        };
        let program = command.program()?;
        if program == "export" {
            return Some(self.export_redirected(command));
        }

        let (name, value) = split_assignment(program)?;
        // 等号前不能有空白或引号
        if !line.trim_start().starts_with(&format!("{name}=")) {
            return None;
        }
        let mut value = value.to_string();
        for rest in &command.arguments[1..] {
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(rest);
        }
        Some(self.assign(name, &value))
    }

    fn assign(&mut self, name: &str, value: &str) -> i32 {
        match self.variables.export(name, value) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("ash: {}", e);
                1
            }
        }
    }

    /// `export` 在 shell 进程内执行，`export > file` 也要落到文件里
    fn export_redirected(&mut self, command: &Command) -> i32 {
        let files = match FileRedirects::open(command) {
            Ok(files) => files,
            Err(e) => {
                eprintln!("ash: {}", e);
                return 1;
            }
        };
        let out_fd = files.output.as_ref().map(AsRawFd::as_raw_fd);
        let _guard = match StdioGuard::redirect(None, out_fd) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("ash: {}", e);
                return e.status();
            }
        };
        self.export(&command.arguments[1..])
    }

    fn export(&mut self, args: &[String]) -> i32 {
        if args.is_empty() {
            let mut vars: Vec<(String, String)> = std::env::vars().collect();
            vars.sort();
            let mut out = io::stdout().lock();
            for (name, value) in vars {
                if writeln!(out, "export {}=\"{}\"", name, value).is_err() {
                    return 1;
                }
            }
            return 0;
        }

        let mut status = 0;
        for arg in args {
            status = match split_assignment(arg) {
                Some((name, value)) => self.assign(name, value),
                None if is_valid_name(arg) => {
                    let value = self.variables.get(arg).unwrap_or_default();
                    self.assign(arg, &value)
                }
                None => {
                    eprintln!("ash: export: `{}': not a valid identifier", arg);
                    1
                }
            };
        }
        status
    }

    /// 执行一个管道段
    fn execute_segment(&mut self, segment: Segment<'_>) -> Result<i32> {
        let background = segment.separator == Separator::Background;
        let text = describe(segment.commands);
        if background && self.jobs.is_full() {
            return Err(ShellError::Job(format!("job table full, not starting: {}", text)));
        }

        let mut launched = Launched::default();
        let result = self.launch(segment.commands, background, &mut launched);

        if let Err(e) = result {
            // 已经启动的进程不能丢下不管
            if !launched.pids.is_empty() {
                if background {
                    self.track_background(&launched, &text);
                } else {
                    self.jobs.wait_fg_job(&launched.pids, &text);
                }
            }
            return Err(e);
        }

        if background {
            if !launched.pids.is_empty() {
                self.track_background(&launched, &text);
            }
            return Ok(launched.builtin_status.unwrap_or(0));
        }

        let outcome = self.jobs.wait_fg_job(&launched.pids, &text);
        if let Foreground::Stopped {
            job_id: Some(id), ..
        } = outcome
        {
            if let Some(job) = self.jobs.get_job(id) {
                println!("\n{}", job);
            }
        }
        Ok(match launched.builtin_status {
            Some(status) if launched.last_is_builtin => status,
            _ => outcome.status(),
        })
    }

    /// 依次启动段内每条命令，边走边接管道
    fn launch(
        &mut self,
        commands: &[Command],
        background: bool,
        launched: &mut Launched,
    ) -> Result<()> {
        // None 表示 shell 自己的标准输入
        let mut input: Option<OwnedFd> = None;

        for (i, command) in commands.iter().enumerate() {
            let Some(program) = command.program() else {
                return Err(ShellError::Syntax("missing command".to_string()));
            };
            let piping = i + 1 < commands.len();
            let (next_input, output) = if piping {
                let (read, write) =
                    pipe2(OFlag::O_CLOEXEC).map_err(|e| ShellError::resource("pipe", e))?;
                (Some(read), Some(write))
            } else {
                (None, None)
            };

            if let Some(builtin) = Builtin::from_name(program) {
                let status = self.run_builtin_in_segment(builtin, command, input.take(), output)?;
                launched.builtin_status = Some(status);
                launched.last_is_builtin = !piping;
            } else {
                let pid = spawn(command, input.take(), output, background, launched.pgid)?;
                if background && launched.pgid.is_none() {
                    launched.pgid = Some(pid);
                }
                launched.pids.push(pid);
                launched.last_is_builtin = false;
            }
            input = next_input;

            if self.exit_request.is_some() {
                break;
            }
        }
        Ok(())
    }

    fn run_builtin_in_segment(
        &mut self,
        builtin: Builtin,
        command: &Command,
        input: Option<OwnedFd>,
        output: Option<OwnedFd>,
    ) -> Result<i32> {
        let files = match FileRedirects::open(command) {
            Ok(files) => files,
            Err(e) => {
                eprintln!("ash: {}", e);
                return Ok(1);
            }
        };
        let in_fd = files.input.as_ref().or(input.as_ref()).map(AsRawFd::as_raw_fd);
        let out_fd = files
            .output
            .as_ref()
            .or(output.as_ref())
            .map(AsRawFd::as_raw_fd);

        let _guard = StdioGuard::redirect(in_fd, out_fd)?;
        Ok(self.run_builtin(builtin, &command.arguments[1..]))
    }

    fn track_background(&mut self, launched: &Launched, text: &str) {
        match self.jobs.add_job(
            launched.pgid,
            launched.pids.clone(),
            text.to_string(),
            JobState::Running,
        ) {
            Ok(id) => {
                if let Some(job) = self.jobs.get_job(id) {
                    println!("[{}] {}", id, job.process_id());
                }
            }
            Err(e) => {
                warn!("{}", e);
                eprintln!("ash: {}", e);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Launched {
    pids: Vec<Pid>,
    pgid: Option<Pid>,
    builtin_status: Option<i32>,
    last_is_builtin: bool,
}

/// fork 出子进程并 exec；父进程在返回时关闭传入的管道端
fn spawn(
    command: &Command,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
    background: bool,
    pgid: Option<Pid>,
) -> Result<Pid> {
    let argv = command
        .arguments
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ShellError::Syntax("argument contains a NUL byte".to_string()))?;
    debug!("执行外部命令: {:?}", command.arguments);

    // 避免子进程重复输出父进程缓冲区里的内容
    io::stdout().flush()?;

    // SAFETY: 子进程只做 signal/setpgid/dup2/open/exec，随后要么 exec 要么 _exit
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            signals::reset_for_child();
            if background {
                let _ = setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));
            }
            if let Err(e) = redirect::apply_child(input, output, command) {
                eprintln!("ash: {}", e);
                exit_child(1);
            }
            let err = match execvp(&argv[0], &argv) {
                Ok(never) => match never {},
                Err(e) => e,
            };
            if err == Errno::ENOENT {
                eprintln!("ash: {}: command not found", command.arguments[0]);
                exit_child(127);
            }
            eprintln!("ash: {}: {}", command.arguments[0], err);
            exit_child(126)
        }
        Ok(ForkResult::Parent { child }) => {
            if background {
                // 父子两边都设置，谁先运行都不会有竞争
                let _ = setpgid(child, pgid.unwrap_or(child));
            }
            Ok(child)
        }
        Err(e) => Err(ShellError::resource("fork", e)),
    }
}

fn exit_child(status: i32) -> ! {
    // SAFETY: _exit 不运行父进程注册的析构与 atexit
    unsafe { libc::_exit(status) }
}

/// 作业表里显示的命令文本
fn describe(commands: &[Command]) -> String {
    commands
        .iter()
        .map(|command| {
            let mut text = command.arguments.join(" ");
            if let Some(input) = &command.input {
                text.push_str(&format!(" < {}", input));
            }
            if let Some(output) = &command.output {
                let op = if output.append { ">>" } else { ">" };
                text.push_str(&format!(" {} {}", op, output.filename));
            }
            text
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::job_manager::DEFAULT_MAX_JOBS;
    use serial_test::serial;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    fn executor() -> Executor {
        Executor::new(Variable::new("ash"), JobManager::new(DEFAULT_MAX_JOBS))
    }

    fn quoted(path: &Path) -> String {
        format!("'{}'", path.display())
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    #[serial]
    fn test_exit_status_of_external_command() {
        let mut shell = executor();
        assert_eq!(shell.run_line("true"), 0);
        assert_eq!(shell.run_line("false"), 1);
        assert_eq!(shell.run_line("sh -c 'exit 7'"), 7);
        assert_eq!(shell.last_status, 7);
    }

    #[test]
    #[serial]
    fn test_signaled_child_reports_128_plus_signal() {
        let mut shell = executor();
        assert_eq!(shell.run_line("sh -c 'kill -TERM $$'"), 128 + 15);
    }

    #[test]
    #[serial]
    fn test_command_not_found() {
        let mut shell = executor();
        assert_eq!(shell.run_line("ash-no-such-program-xyz"), 127);
    }

    #[test]
    #[serial]
    fn test_and_short_circuits() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();

        let status = shell.run_line(&format!("false && touch {}", quoted(&marker)));
        assert_eq!(status, 1);
        assert!(!marker.exists());

        shell.run_line(&format!("true && touch {}", quoted(&marker)));
        assert!(marker.exists());
    }

    #[test]
    #[serial]
    fn test_or_short_circuits() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();

        assert_eq!(shell.run_line(&format!("true || touch {}", quoted(&marker))), 0);
        assert!(!marker.exists());

        assert_eq!(shell.run_line(&format!("false || touch {}", quoted(&marker))), 0);
        assert!(marker.exists());
    }

    #[test]
    #[serial]
    fn test_skipped_segment_keeps_status_for_next_operator() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();
        let line = format!("false && true || touch {}", quoted(&marker));
        assert_eq!(shell.run_line(&line), 0);
        assert!(marker.exists());
    }

    #[test]
    #[serial]
    fn test_sequence_always_continues() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();
        assert_eq!(shell.run_line(&format!("false ; touch {}", quoted(&marker))), 0);
        assert!(marker.exists());
    }

    #[test]
    #[serial]
    fn test_pipeline_transfers_data() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = executor();
        let status = shell.run_line(&format!(r"printf 'x\ny\nz\n' | grep y > {}", quoted(&out)));
        assert_eq!(status, 0);
        assert_eq!(read(&out), "y\n");
    }

    #[test]
    #[serial]
    fn test_pipeline_status_is_last_stage() {
        let mut shell = executor();
        assert_eq!(shell.run_line("false | true"), 0);
        assert_eq!(shell.run_line("true | false"), 1);
        assert_eq!(shell.run_line(r"printf 'x\n' | grep nothing-here"), 1);
    }

    #[test]
    #[serial]
    fn test_long_pipeline() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let mut shell = executor();
        shell.run_line(&format!(
            r"printf 'b\na\nc\na\n' | sort | uniq | wc -l > {}",
            quoted(&out)
        ));
        assert_eq!(read(&out).trim(), "3");
    }

    #[test]
    #[serial]
    fn test_writer_sees_closed_reader() {
        // yes 只有在读端全部关闭后才会收到 SIGPIPE 退出
        let mut shell = executor();
        assert_eq!(shell.run_line("yes | head -n 1 > /dev/null"), 0);
    }

    #[test]
    #[serial]
    fn test_truncate_redirection_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("f");
        let mut shell = executor();
        shell.run_line(&format!("echo hi > {}", quoted(&out)));
        shell.run_line(&format!("echo hi > {}", quoted(&out)));
        assert_eq!(read(&out), "hi\n");
    }

    #[test]
    #[serial]
    fn test_append_redirection() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("f");
        let mut shell = executor();
        shell.run_line(&format!("echo hi >> {}", quoted(&out)));
        shell.run_line(&format!("echo hi >> {}", quoted(&out)));
        assert_eq!(read(&out), "hi\nhi\n");
    }

    #[test]
    #[serial]
    fn test_input_redirection() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let out = dir.path().join("out");
        fs::write(&input, "c\na\nb\n").unwrap();
        let mut shell = executor();
        shell.run_line(&format!("sort < {} > {}", quoted(&input), quoted(&out)));
        assert_eq!(read(&out), "a\nb\nc\n");
    }

    #[test]
    #[serial]
    fn test_file_redirect_wins_over_pipe() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let out = dir.path().join("out");
        fs::write(&input, "from-file\n").unwrap();
        let mut shell = executor();
        shell.run_line(&format!(
            "echo from-pipe | cat < {} > {}",
            quoted(&input),
            quoted(&out)
        ));
        assert_eq!(read(&out), "from-file\n");
    }

    #[test]
    #[serial]
    fn test_missing_input_file_fails_in_child() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let mut shell = executor();
        assert_eq!(shell.run_line(&format!("cat < {}", quoted(&missing))), 1);
    }

    #[test]
    #[serial]
    fn test_syntax_error_skips_line() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();
        assert_eq!(shell.run_line(&format!("touch {} >", quoted(&marker))), 2);
        assert!(!marker.exists());
        assert_eq!(shell.run_line("ls |"), 2);
    }

    #[test]
    #[serial]
    fn test_variable_round_trip() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut shell = executor();
        assert_eq!(shell.run_line("ASH_EXEC_TEST_X=5"), 0);
        shell.run_line(&format!(
            "echo $ASH_EXEC_TEST_X [$ASH_EXEC_TEST_UNSET] > {}",
            quoted(&out)
        ));
        assert_eq!(read(&out), "5 []\n");
    }

    #[test]
    #[serial]
    fn test_assignment_is_exported_to_children() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut shell = executor();
        shell.run_line("ASH_EXEC_TEST_CHILD=visible");
        shell.run_line(&format!(
            "sh -c 'echo $ASH_EXEC_TEST_CHILD' > {}",
            quoted(&out)
        ));
        assert_eq!(read(&out), "visible\n");
    }

    #[test]
    #[serial]
    fn test_export_forms() {
        let mut shell = executor();
        assert_eq!(shell.run_line("export ASH_EXEC_TEST_A=1 ASH_EXEC_TEST_B=$ASH_EXEC_TEST_A"), 0);
        assert_eq!(std::env::var("ASH_EXEC_TEST_A").as_deref(), Ok("1"));
        assert_eq!(shell.variables.get("ASH_EXEC_TEST_A").as_deref(), Some("1"));
        assert_eq!(shell.run_line("export 1BAD=x"), 1);
    }

    #[test]
    #[serial]
    fn test_bare_export_lists_environment() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("env");
        let mut shell = executor();
        shell.run_line("export ASH_EXEC_TEST_LISTED=yes");
        assert_eq!(shell.run_line("export"), 0);
        assert_eq!(shell.run_line(&format!("export > {}", quoted(&out))), 0);
        assert!(read(&out)
            .lines()
            .any(|line| line == "export ASH_EXEC_TEST_LISTED=\"yes\""));
    }

    #[test]
    #[serial]
    fn test_assignment_value_is_expanded_and_joined() {
        let mut shell = executor();
        shell.run_line("ASH_EXEC_TEST_BASE=base");
        shell.run_line("ASH_EXEC_TEST_JOINED=\"$ASH_EXEC_TEST_BASE and more\"");
        assert_eq!(
            shell.variables.get("ASH_EXEC_TEST_JOINED").as_deref(),
            Some("base and more")
        );
    }

    #[test]
    #[serial]
    fn test_quoted_assignment_is_not_an_assignment() {
        let mut shell = executor();
        assert_eq!(shell.run_line("'ASH_EXEC_TEST_Q=1'"), 127);
        assert_eq!(shell.variables.get("ASH_EXEC_TEST_Q"), None);
    }

    #[test]
    #[serial]
    fn test_builtin_in_the_middle_of_a_pipeline() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut shell = executor();
        let status = shell.run_line(&format!("printf a | version | cat > {}", quoted(&out)));
        assert_eq!(status, 0);
        assert_eq!(
            read(&out),
            format!("ash shell version {}\n", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    #[serial]
    fn test_builtin_output_redirection() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut shell = executor();
        shell.add_history("echo one");
        shell.add_history("echo two");
        shell.run_line(&format!("history > {}", quoted(&out)));
        assert_eq!(read(&out), "    1  echo one\n    2  echo two\n");
    }

    #[test]
    #[serial]
    fn test_status_builtin_reports_previous_status() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut shell = executor();
        shell.run_line("sh -c 'exit 3'");
        shell.run_line(&format!("status > {}", quoted(&out)));
        assert!(read(&out).starts_with("Last exit status: 3\nLast command time: "));
    }

    #[test]
    #[serial]
    fn test_cd_changes_directory() {
        let dir = TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        let mut shell = executor();
        assert_eq!(shell.run_line(&format!("cd {}", quoted(dir.path()))), 0);
        assert_eq!(
            std::env::current_dir().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        assert_eq!(shell.run_line("cd /ash/no/such/dir"), 1);
        std::env::set_current_dir(original).unwrap();
    }

    #[test]
    #[serial]
    fn test_exit_requests_stop_the_chain() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();
        assert_eq!(shell.run_line(&format!("exit 4 ; touch {}", quoted(&marker))), 4);
        assert_eq!(shell.exit_request(), Some(4));
        assert!(!marker.exists());
    }

    #[test]
    #[serial]
    fn test_background_job_lifecycle() {
        let mut shell = executor();
        assert_eq!(shell.run_line("sleep 0 &"), 0);

        let jobs = shell.jobs_mut().get_jobs().to_vec();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Running);
        let first_id = jobs[0].id;

        let mut reports = Vec::new();
        for _ in 0..500 {
            reports.extend(shell.jobs_mut().reap());
            if shell.jobs_mut().get_jobs().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(shell.jobs_mut().get_jobs().is_empty());
        assert_eq!(reports.last().unwrap().state, JobState::Done);

        shell.run_line("sleep 0 &");
        let second_id = shell.jobs_mut().get_jobs()[0].id;
        assert!(second_id > first_id);
    }

    fn stop_foreground(shell: &mut Executor) -> usize {
        // 子进程自己停下，相当于前台按了 Ctrl-Z
        let status = shell.run_line("sh -c 'kill -STOP $$; exit 3'");
        assert_eq!(status, 128 + libc::SIGSTOP);

        let jobs = shell.jobs_mut().get_jobs().to_vec();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Stopped);
        assert!(jobs[0].pgid.is_none());
        jobs[0].id
    }

    #[test]
    #[serial]
    fn test_stopped_foreground_resumes_with_fg() {
        let mut shell = executor();
        let id = stop_foreground(&mut shell);
        assert_eq!(shell.run_line(&format!("fg %{id}")), 3);
        assert!(shell.jobs_mut().get_jobs().is_empty());
    }

    #[test]
    #[serial]
    fn test_stopped_foreground_resumes_with_bg() {
        let mut shell = executor();
        stop_foreground(&mut shell);
        assert_eq!(shell.run_line("bg"), 0);

        let mut reports = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !shell.jobs_mut().get_jobs().is_empty() && Instant::now() < deadline {
            reports.extend(shell.jobs_mut().reap());
            thread::sleep(Duration::from_millis(10));
        }
        assert!(shell.jobs_mut().get_jobs().is_empty());
        let last = reports.last().unwrap();
        assert_eq!(last.state, JobState::Done);
        assert_eq!(last.status, 3);
    }

    #[test]
    #[serial]
    fn test_background_does_not_block_next_command() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let mut shell = executor();
        let started = Instant::now();
        shell.run_line(&format!("sleep 2 & touch {}", quoted(&marker)));
        assert!(marker.exists());
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(shell.jobs_mut().get_jobs().len(), 1);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !shell.jobs_mut().get_jobs().is_empty() && Instant::now() < deadline {
            shell.jobs_mut().reap();
            thread::sleep(Duration::from_millis(20));
        }
        assert!(shell.jobs_mut().get_jobs().is_empty());
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_child_gets_default_sigpipe() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("status");
        let mut shell = executor();
        shell.run_line(&format!("grep SigIgn /proc/self/status > {}", quoted(&out)));

        let text = read(&out);
        let mask = text.trim().trim_start_matches("SigIgn:").trim();
        let ignored = u64::from_str_radix(mask, 16).unwrap();
        let bit = |sig: i32| 1u64 << (sig - 1);
        assert_eq!(ignored & bit(libc::SIGPIPE), 0);
        assert_eq!(ignored & bit(libc::SIGINT), 0);
    }

    #[test]
    fn test_describe_segment() {
        let shell = executor();
        let chain = shell.parse_line("sort < in | uniq -c >> out").unwrap();
        assert_eq!(describe(&chain), "sort < in | uniq -c >> out");
    }
}
