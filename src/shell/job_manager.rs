use std::fmt;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

use log::{debug, error, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::{getpgrp, tcsetpgrp, Pid};

use crate::error::{Result, ShellError};

pub const DEFAULT_MAX_JOBS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            JobState::Running => "running",
            JobState::Stopped => "stopped",
            JobState::Done => "done",
        };
        f.write_str(state)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    /// 后台段自成进程组；被 Ctrl-Z 停下的前台段仍在 shell 的进程组里
    pub pgid: Option<Pid>,
    pub pids: Vec<Pid>,
    pub command: String,
    pub state: JobState,
    /// 最后一个进程的退出状态，结束后才有意义
    pub status: i32,
    pub is_current: bool,
    pending: Vec<Pid>,
}

impl Job {
    fn new(id: usize, pgid: Option<Pid>, pids: Vec<Pid>, command: String, state: JobState) -> Self {
        Self {
            id,
            pgid,
            pending: pids.clone(),
            pids,
            command,
            state,
            status: 0,
            is_current: false,
        }
    }

    /// 段内最后一个进程
    pub fn process_id(&self) -> Pid {
        self.pids.last().copied().unwrap_or(Pid::from_raw(0))
    }

    fn record(&mut self, ws: WS) -> bool {
        let Some(pid) = ws.pid() else {
            return false;
        };
        match ws {
            WS::Exited(..) | WS::Signaled(..) => {
                self.pending.retain(|p| *p != pid);
                if pid == self.process_id() {
                    self.status = status_of(ws);
                }
                if self.pending.is_empty() {
                    self.state = JobState::Done;
                }
                true
            }
            WS::Stopped(..) => {
                self.state = JobState::Stopped;
                true
            }
            WS::Continued(..) => {
                self.state = JobState::Running;
                true
            }
            _ => false,
        }
    }

    fn signal(&self, sig: Signal) -> nix::Result<()> {
        match self.pgid {
            Some(pgid) => killpg(pgid, sig),
            None => self.pending.iter().try_for_each(|pid| kill(*pid, sig)),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_current { "+" } else { " " };
        write!(
            f,
            "[{}]{} {} {} {}",
            self.id,
            mark,
            self.process_id(),
            self.state,
            self.command
        )
    }
}

/// 前台等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Foreground {
    Finished(i32),
    /// 被停止并已转入作业表
    Stopped { job_id: Option<usize>, status: i32 },
}

impl Foreground {
    pub fn status(&self) -> i32 {
        match self {
            Foreground::Finished(status) => *status,
            Foreground::Stopped { status, .. } => *status,
        }
    }
}

/// 作业表：只由主循环持有和修改，SIGCHLD 处理函数不会碰它
pub struct JobManager {
    jobs: Vec<Job>,
    next_id: usize,
    max_jobs: usize,
}

impl JobManager {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
            max_jobs,
        }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get_job(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// 登记一个作业，id 单调递增且不复用
    pub fn add_job(
        &mut self,
        pgid: Option<Pid>,
        pids: Vec<Pid>,
        command: String,
        state: JobState,
    ) -> Result<usize> {
        if self.is_full() {
            return Err(ShellError::Job(format!(
                "job table full ({} jobs), not tracking: {}",
                self.max_jobs, command
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!("新增作业 [{}] {:?} {}", id, pids, command);
        self.jobs.push(Job::new(id, pgid, pids, command, state));
        self.update_marks();
        Ok(id)
    }

    pub fn remove_job(&mut self, id: usize) -> Option<Job> {
        let pos = self.jobs.iter().position(|job| job.id == id)?;
        let job = self.jobs.remove(pos);
        self.update_marks();
        Some(job)
    }

    fn update_marks(&mut self) {
        let current = self.jobs.iter().map(|job| job.id).max();
        for job in self.jobs.iter_mut() {
            job.is_current = Some(job.id) == current;
        }
    }

    fn position(&self, id: Option<usize>) -> Result<usize> {
        let found = match id {
            Some(id) => self.jobs.iter().position(|job| job.id == id),
            None => self
                .jobs
                .iter()
                .enumerate()
                .max_by_key(|(_, job)| job.id)
                .map(|(pos, _)| pos),
        };
        found.ok_or_else(|| match id {
            Some(id) => ShellError::Job(format!("{id}: no such job")),
            None => ShellError::Job("no current job".to_string()),
        })
    }

    /// 非阻塞地收集所有作业的状态变化
    ///
    /// 返回需要向用户报告的作业快照；结束的作业同时从表中移除。
    pub fn reap(&mut self) -> Vec<Job> {
        let mut reports = Vec::new();
        let options = Some(WF::WNOHANG | WF::WUNTRACED | WF::WCONTINUED);

        for job in self.jobs.iter_mut() {
            let before = job.state;
            for pid in job.pending.clone() {
                match waitpid(pid, options) {
                    Ok(WS::StillAlive) => {}
                    Ok(ws) => {
                        job.record(ws);
                    }
                    Err(Errno::ECHILD) => {
                        // 已被别处回收，视为结束
                        warn!("作业 [{}] 的进程 {} 已不存在", job.id, pid);
                        job.pending.retain(|p| *p != pid);
                        if job.pending.is_empty() {
                            job.state = JobState::Done;
                        }
                    }
                    Err(e) => error!("waitpid {} 失败: {}", pid, e),
                }
            }
            if job.state != before {
                debug!("作业 [{}] {} -> {}", job.id, before, job.state);
                reports.push(job.clone());
            }
        }

        let done: Vec<usize> = self
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Done)
            .map(|job| job.id)
            .collect();
        for id in done {
            self.remove_job(id);
        }
        reports
    }

    /// 阻塞等待前台进程；被停止的前台段转为作业
    pub fn wait_fg_job(&mut self, pids: &[Pid], command: &str) -> Foreground {
        let Some(last) = pids.last().copied() else {
            return Foreground::Finished(0);
        };
        let mut status = 0;
        let mut stopped = Vec::new();
        let mut stop_status = 0;

        for pid in pids {
            match wait_one(*pid) {
                Ok(ws @ WS::Stopped(..)) => {
                    stopped.push(*pid);
                    stop_status = status_of(ws);
                }
                Ok(ws) => {
                    if *pid == last {
                        status = status_of(ws);
                    }
                }
                Err(e) => {
                    error!("等待进程 {} 失败: {}", pid, e);
                    if *pid == last {
                        status = 1;
                    }
                }
            }
        }

        if stopped.is_empty() {
            return Foreground::Finished(status);
        }

        let job_id = match self.add_job(None, pids.to_vec(), command.to_string(), JobState::Stopped)
        {
            Ok(id) => {
                // 只有停下的进程还需要回收
                if let Some(entry) = self.jobs.iter_mut().find(|j| j.id == id) {
                    entry.pending = stopped;
                }
                Some(id)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        Foreground::Stopped {
            job_id,
            status: stop_status,
        }
    }

    /// 继续作业并在前台等待它
    pub fn fg(&mut self, id: Option<usize>) -> Result<(Job, Foreground)> {
        let pos = self.position(id)?;
        let job = self.jobs[pos].clone();

        let has_terminal = job.pgid.is_some_and(give_terminal);
        if let Err(e) = job.signal(Signal::SIGCONT) {
            if has_terminal {
                reclaim_terminal();
            }
            return Err(ShellError::Job(format!("fg: {}: {}", job.id, e)));
        }
        self.jobs[pos].state = JobState::Running;
        debug!("作业 [{}] 转入前台", job.id);

        let mut stop_status = None;
        for pid in job.pending.clone() {
            match wait_one(pid) {
                Ok(ws @ WS::Stopped(..)) => {
                    stop_status = Some(status_of(ws));
                    self.jobs[pos].record(ws);
                }
                Ok(ws) => {
                    self.jobs[pos].record(ws);
                }
                Err(e) => {
                    error!("等待进程 {} 失败: {}", pid, e);
                    self.jobs[pos].pending.retain(|p| *p != pid);
                }
            }
        }
        if has_terminal {
            reclaim_terminal();
        }

        let outcome = match stop_status {
            Some(status) => Foreground::Stopped {
                job_id: Some(job.id),
                status,
            },
            None => {
                self.jobs[pos].state = JobState::Done;
                Foreground::Finished(self.jobs[pos].status)
            }
        };
        let snapshot = self.jobs[pos].clone();
        if snapshot.state == JobState::Done {
            self.remove_job(snapshot.id);
        }
        Ok((snapshot, outcome))
    }

    /// 继续作业但不等待
    pub fn bg(&mut self, id: Option<usize>) -> Result<Job> {
        let pos = self.position(id)?;
        let job = &mut self.jobs[pos];
        job.signal(Signal::SIGCONT)
            .map_err(|e| ShellError::Job(format!("bg: {}: {}", job.id, e)))?;
        job.state = JobState::Running;
        debug!("作业 [{}] 转入后台继续运行", job.id);
        Ok(job.clone())
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.max_jobs
    }

    pub fn has_running(&self) -> bool {
        self.jobs.iter().any(|job| job.state != JobState::Done)
    }
}

fn wait_one(pid: Pid) -> nix::Result<WS> {
    loop {
        match waitpid(pid, Some(WF::WUNTRACED)) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// 正常退出取退出码，被信号终止或停止时取 128 + 信号值
pub fn status_of(ws: WS) -> i32 {
    match ws {
        WS::Exited(_, code) => code,
        WS::Signaled(_, sig, _) => 128 + sig as i32,
        WS::Stopped(_, sig) => 128 + sig as i32,
        _ => 0,
    }
}

fn give_terminal(pgid: Pid) -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return false;
    }
    match tcsetpgrp(stdin.as_fd(), pgid) {
        Ok(()) => true,
        Err(e) => {
            warn!("无法把终端交给进程组 {}: {}", pgid, e);
            false
        }
    }
}

fn reclaim_terminal() {
    let stdin = io::stdin();
    if let Err(e) = tcsetpgrp(stdin.as_fd(), getpgrp()) {
        error!("无法取回终端控制权: {}", e);
    }
}
