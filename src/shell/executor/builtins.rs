use std::env;
use std::io::{self, Write};

use log::debug;

use super::executor::Executor;
use crate::error::{Result, ShellError};
use crate::shell::job_manager::Foreground;
use crate::utils::path::change_directory;

/// 必须在 shell 进程内执行的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Exit,
    History,
    Help,
    Clear,
    Version,
    Status,
    Jobs,
    Fg,
    Bg,
}

impl Builtin {
    pub const ALL: [Builtin; 10] = [
        Builtin::Cd,
        Builtin::Exit,
        Builtin::History,
        Builtin::Help,
        Builtin::Clear,
        Builtin::Version,
        Builtin::Status,
        Builtin::Jobs,
        Builtin::Fg,
        Builtin::Bg,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Exit => "exit",
            Builtin::History => "history",
            Builtin::Help => "help",
            Builtin::Clear => "clear",
            Builtin::Version => "version",
            Builtin::Status => "status",
            Builtin::Jobs => "jobs",
            Builtin::Fg => "fg",
            Builtin::Bg => "bg",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Builtin::Cd => "cd [dir|-]      change the working directory",
            Builtin::Exit => "exit [n]        leave the shell",
            Builtin::History => "history         list command history",
            Builtin::Help => "help            show this help",
            Builtin::Clear => "clear           clear the screen",
            Builtin::Version => "version         show the shell version",
            Builtin::Status => "status          show last exit status and timing",
            Builtin::Jobs => "jobs            list background jobs",
            Builtin::Fg => "fg [%id]        resume a job in the foreground",
            Builtin::Bg => "bg [%id]        resume a stopped job in the background",
        }
    }
}

impl Executor {
    /// 执行内建命令，标准输入输出已由调用方接好
    pub(super) fn run_builtin(&mut self, builtin: Builtin, args: &[String]) -> i32 {
        debug!("执行内建命令: {} {:?}", builtin.name(), args);
        let mut out = io::stdout().lock();
        let result = match builtin {
            Builtin::Cd => self.builtin_cd(&mut out, args),
            Builtin::Exit => self.builtin_exit(args),
            Builtin::History => self.builtin_history(&mut out),
            Builtin::Help => builtin_help(&mut out),
            Builtin::Clear => write!(out, "\x1b[2J\x1b[H").map(|_| 0).map_err(ShellError::from),
            Builtin::Version => writeln!(out, "ash shell version {}", env!("CARGO_PKG_VERSION"))
                .map(|_| 0)
                .map_err(ShellError::from),
            Builtin::Status => self.builtin_status(&mut out),
            Builtin::Jobs => self.builtin_jobs(&mut out),
            Builtin::Fg => self.builtin_fg(&mut out, args),
            Builtin::Bg => self.builtin_bg(&mut out, args),
        };
        let flushed = out.flush();

        match result.and_then(|status| flushed.map(|_| status).map_err(ShellError::from)) {
            Ok(status) => status,
            Err(e) => {
                eprintln!("ash: {}: {}", builtin.name(), e);
                e.status()
            }
        }
    }

    fn builtin_cd(&mut self, out: &mut impl Write, args: &[String]) -> Result<i32> {
        let target = match args.first().map(String::as_str) {
            None => self
                .variables
                .get("HOME")
                .ok_or_else(|| ShellError::Variable("HOME not set".to_string()))?,
            Some("-") => {
                let previous = self
                    .variables
                    .get("OLDPWD")
                    .ok_or_else(|| ShellError::Variable("OLDPWD not set".to_string()))?;
                writeln!(out, "{}", previous)?;
                previous
            }
            Some(path) => shellexpand::tilde(path).into_owned(),
        };

        let previous = env::current_dir().ok();
        change_directory(&target)?;
        if let Some(previous) = previous {
            env::set_var("OLDPWD", previous);
        }
        if let Ok(current) = env::current_dir() {
            env::set_var("PWD", current);
        }
        Ok(0)
    }

    fn builtin_exit(&mut self, args: &[String]) -> Result<i32> {
        let status = match args.first() {
            Some(arg) => arg
                .parse::<i32>()
                .map_err(|_| ShellError::Syntax(format!("{arg}: numeric argument required")))?,
            None => self.last_status,
        };
        if self.jobs.has_running() {
            eprintln!("ash: there are unfinished jobs");
        }
        self.exit_request = Some(status);
        Ok(status)
    }

    fn builtin_history(&self, out: &mut impl Write) -> Result<i32> {
        for (i, line) in self.history.iter().enumerate() {
            writeln!(out, "{:5}  {}", i + 1, line)?;
        }
        Ok(0)
    }

    fn builtin_status(&self, out: &mut impl Write) -> Result<i32> {
        writeln!(out, "Last exit status: {}", self.last_status)?;
        writeln!(
            out,
            "Last command time: {:.3} seconds",
            self.last_duration.as_secs_f64()
        )?;
        Ok(0)
    }

    fn builtin_jobs(&mut self, out: &mut impl Write) -> Result<i32> {
        for job in self.jobs.reap() {
            writeln!(out, "{}", job)?;
        }
        for job in self.jobs.get_jobs() {
            writeln!(out, "{}", job)?;
        }
        Ok(0)
    }

    fn builtin_fg(&mut self, out: &mut impl Write, args: &[String]) -> Result<i32> {
        let id = parse_job_id(args)?;
        let job = match id {
            Some(id) => self.jobs.get_job(id),
            None => self.jobs.get_jobs().iter().max_by_key(|job| job.id),
        };
        if let Some(job) = job {
            writeln!(out, "{}", job.command)?;
            out.flush()?;
        }

        let (job, outcome) = self.jobs.fg(id)?;
        if let Foreground::Stopped { .. } = outcome {
            writeln!(out, "\n{}", job)?;
        }
        Ok(outcome.status())
    }

    fn builtin_bg(&mut self, out: &mut impl Write, args: &[String]) -> Result<i32> {
        let id = parse_job_id(args)?;
        let job = self.jobs.bg(id)?;
        writeln!(out, "[{}]+ {} &", job.id, job.command)?;
        Ok(0)
    }
}

fn builtin_help(out: &mut impl Write) -> Result<i32> {
    writeln!(out, "ash - a small interactive shell")?;
    writeln!(out)?;
    writeln!(out, "Syntax:")?;
    writeln!(out, "  cmd args        run a program")?;
    writeln!(out, "  a | b           pipe output of a into b")?;
    writeln!(out, "  a && b, a || b  run b only if a succeeded / failed")?;
    writeln!(out, "  a ; b, a &      run in sequence / in the background")?;
    writeln!(out, "  < in, > out, >> out  redirect input / output")?;
    writeln!(out, "  NAME=value, export NAME=value, $NAME, $0")?;
    writeln!(out)?;
    writeln!(out, "Builtins:")?;
    for builtin in Builtin::ALL {
        writeln!(out, "  {}", builtin.summary())?;
    }
    Ok(0)
}

/// 接受 `%2` 或 `2`
fn parse_job_id(args: &[String]) -> Result<Option<usize>> {
    match args.first() {
        None => Ok(None),
        Some(arg) => arg
            .trim_start_matches('%')
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ShellError::Job(format!("{arg}: no such job"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
    }

    #[test]
    fn test_only_exact_names_are_builtins() {
        assert_eq!(Builtin::from_name("cd"), Some(Builtin::Cd));
        assert_eq!(Builtin::from_name("CD"), None);
        assert_eq!(Builtin::from_name("cd "), None);
        assert_eq!(Builtin::from_name("export"), None);
        assert_eq!(Builtin::from_name("ls"), None);
    }

    #[test]
    fn test_parse_job_id() {
        assert_eq!(parse_job_id(&[]).unwrap(), None);
        assert_eq!(parse_job_id(&["%3".to_string()]).unwrap(), Some(3));
        assert_eq!(parse_job_id(&["7".to_string()]).unwrap(), Some(7));
        assert!(parse_job_id(&["x".to_string()]).is_err());
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let mut out = Vec::new();
        builtin_help(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for builtin in Builtin::ALL {
            assert!(text.contains(builtin.name()), "{}", builtin.name());
        }
    }
}
