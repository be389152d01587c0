use crate::shell::executor::Executor;
use crate::shell::job::Job;
use crate::shell::shell_env::Environment;
use crate::shell::signal_handler::SignalHandler;
use anyhow::{Context, Result};
use libc::STDIN_FILENO;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgrp, getpid, isatty, setpgid, tcgetpgrp, tcsetpgrp, Pid};
use std::os::unix::io::RawFd;

/// Status recorded when a job could not be launched at all.
pub const LAUNCH_FAILED_STATUS: i32 = 1;

const SIGNAL_STATUS_BASE: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    RunningBackground,
    Stopped,
    Done,
}

#[derive(Debug, Clone)]
pub struct JobEntry {
    pub job: Job,
    pub pgid: Pid,
    pub state: JobState,
    pub background: bool,
}

impl JobEntry {
    pub fn new(job: Job, pgid: Pid, state: JobState) -> Self {
        JobEntry {
            job,
            pgid,
            background: state == JobState::RunningBackground,
            state,
        }
    }

    pub fn command(&self) -> &str {
        self.job.command_name()
    }
}

/// Fixed-capacity record of background and stopped jobs.
///
/// Entries are only ever appended, so a slot index never changes and the
/// job number shown to the user is always `index + 1`. Once full, new jobs
/// are simply not tracked.
#[derive(Debug)]
pub struct JobTable {
    entries: Vec<JobEntry>,
    capacity: usize,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        JobTable {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry and returns its job number, or `None` when the
    /// table is full.
    pub fn push(&mut self, entry: JobEntry) -> Option<usize> {
        if self.len() >= self.capacity {
            return None;
        }
        self.entries.push(entry);
        Some(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, number: usize) -> Option<&JobEntry> {
        number.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// The most recently appended entry with its job number.
    pub fn last_mut(&mut self) -> Option<(usize, &mut JobEntry)> {
        let number = self.entries.len();
        self.entries.last_mut().map(|entry| (number, entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &JobEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }

    pub fn find_by_pgid_mut(&mut self, pgid: Pid) -> Option<&mut JobEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.pgid == pgid && e.state != JobState::Done)
    }

    /// Marks the job led by `pgid` as finished. The slot stays in place.
    pub fn mark_done(&mut self, pgid: Pid) -> Option<&JobEntry> {
        let entry = self.find_by_pgid_mut(pgid)?;
        entry.background = false;
        entry.state = JobState::Done;
        Some(entry)
    }

    /// Lines printed by the `jobs` builtin. The label follows the
    /// background flag only.
    pub fn listing(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, e)| e.job.num_stages() > 0)
            .map(|(number, e)| {
                let label = if e.background { "Running" } else { "Done" };
                format!("[{}] {}\t{}", number, label, e.command())
            })
            .collect()
    }
}

pub fn background_notice(number: usize, pid: Pid, command: &str) -> String {
    format!("[{}] {} {}", number, pid, command)
}

pub fn stopped_notice(number: usize, command: &str) -> String {
    format!("[{}] Stopped\t{}", number, command)
}

pub fn running_notice(number: usize, command: &str) -> String {
    format!("[{}] Running\t{}", number, command)
}

pub fn done_notice(command: &str) -> String {
    format!("[Job Done] {}", command)
}

/// Terminal ownership. Every operation is a no-op when standard input is
/// not a terminal.
#[derive(Debug, Clone)]
pub struct TerminalControl {
    fd: RawFd,
    shell_pgid: Pid,
    interactive: bool,
}

impl TerminalControl {
    pub fn detect() -> Self {
        TerminalControl {
            fd: STDIN_FILENO,
            shell_pgid: getpgrp(),
            interactive: isatty(STDIN_FILENO).unwrap_or(false),
        }
    }

    #[cfg(test)]
    pub fn non_interactive() -> Self {
        TerminalControl {
            fd: STDIN_FILENO,
            shell_pgid: getpgrp(),
            interactive: false,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    /// Startup handshake: wait until we are in the foreground, move into our
    /// own process group and take the terminal.
    pub fn claim(&mut self) -> Result<()> {
        if !self.interactive {
            return Ok(());
        }

        loop {
            let foreground = tcgetpgrp(self.fd).context("failed tcgetpgrp")?;
            let own = getpgrp();
            if foreground == own {
                break;
            }
            signal::killpg(own, Signal::SIGTTIN).context("failed to stop in background")?;
        }

        SignalHandler::ignore_job_control_signals()
            .context("failed to ignore job control signals")?;

        let pid = getpid();
        if getpgrp() != pid {
            // Fails for a session leader, which already leads its group.
            if let Err(e) = setpgid(pid, pid) {
                debug!("setpgid for shell: {}", e);
            }
        }
        self.shell_pgid = getpgrp();
        tcsetpgrp(self.fd, self.shell_pgid).context("failed tcsetpgrp")?;
        debug!("shell owns the terminal as group {}", self.shell_pgid);
        Ok(())
    }

    pub fn give_to(&self, pgid: Pid) {
        if !self.interactive {
            return;
        }
        if let Err(e) = tcsetpgrp(self.fd, pgid) {
            warn!("failed to hand terminal to group {}: {}", pgid, e);
        }
    }

    pub fn reclaim(&self) {
        self.give_to(self.shell_pgid);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing ran; the job was empty or a stage could not be started.
    Failed,
    Background,
    Exited(i32),
    Interrupted,
    Stopped,
}

pub struct JobControl {
    table: JobTable,
    terminal: TerminalControl,
    last_status: i32,
}

impl JobControl {
    pub fn new(max_jobs: usize, terminal: TerminalControl) -> Self {
        JobControl {
            table: JobTable::new(max_jobs),
            terminal,
            last_status: 0,
        }
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status;
    }

    #[cfg(test)]
    pub fn table(&self) -> &JobTable {
        &self.table
    }

    /// Launches `job` and either waits for it or records it as a
    /// background job.
    pub fn run(&mut self, mut job: Job, env: &Environment) -> JobOutcome {
        let pids = Executor::execute(&mut job, env);

        let Some(pids) = pids.into_iter().collect::<Option<Vec<Pid>>>() else {
            self.abandon(&job);
            return JobOutcome::Failed;
        };
        if pids.is_empty() {
            self.last_status = LAUNCH_FAILED_STATUS;
            return JobOutcome::Failed;
        }

        let pgid = pids[0];
        if job.background {
            self.track_background(job, pgid);
            return JobOutcome::Background;
        }

        self.terminal.give_to(pgid);
        SignalHandler::set_foreground_job_running(true);

        let outcome = self.wait_foreground(&job, &pids);

        SignalHandler::set_foreground_job_running(false);
        self.terminal.reclaim();
        if let Err(e) = SignalHandler::ignore_job_control_signals() {
            warn!("failed to re-arm signal dispositions: {}", e);
        }

        debug!("foreground job finished: {:?}, status {}", outcome, self.last_status);
        outcome
    }

    /// Some stage never started. Stages that did start are killed so they
    /// cannot linger on a half-built pipeline; the reaper collects them.
    fn abandon(&mut self, job: &Job) {
        warn!("job '{}' failed to launch", job.command_name());
        if let Some(pgid) = job.pgid {
            if let Err(e) = signal::killpg(pgid, Signal::SIGKILL) {
                debug!("killpg({}) after failed launch: {}", pgid, e);
            }
        }
        self.last_status = LAUNCH_FAILED_STATUS;
    }

    fn track_background(&mut self, job: Job, pgid: Pid) {
        let command = job.command_name().to_string();
        match self
            .table
            .push(JobEntry::new(job, pgid, JobState::RunningBackground))
        {
            Some(number) => println!("{}", background_notice(number, pgid, &command)),
            None => eprintln!(
                "mysh: job table full, not tracking {} (pid {})",
                command, pgid
            ),
        }
    }

    fn wait_foreground(&mut self, job: &Job, pids: &[Pid]) -> JobOutcome {
        let last = pids.len() - 1;

        for (index, &pid) in pids.iter().enumerate() {
            loop {
                match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                    Ok(WaitStatus::Exited(_, code)) => {
                        if index == last {
                            self.last_status = code;
                        }
                        break;
                    }
                    Ok(WaitStatus::Signaled(_, Signal::SIGINT, _)) => {
                        self.last_status = SIGNAL_STATUS_BASE + Signal::SIGINT as i32;
                        return JobOutcome::Interrupted;
                    }
                    Ok(WaitStatus::Signaled(_, sig, _)) => {
                        if index == last {
                            self.last_status = SIGNAL_STATUS_BASE + sig as i32;
                        }
                        break;
                    }
                    Ok(WaitStatus::Stopped(_, sig)) => {
                        self.last_status = SIGNAL_STATUS_BASE + sig as i32;
                        self.track_stopped(job.clone(), pids[0]);
                        return JobOutcome::Stopped;
                    }
                    Ok(other) => debug!("ignoring {:?} while waiting on {}", other, pid),
                    Err(Errno::EINTR) => continue,
                    Err(e) => {
                        warn!("waitpid({}) failed: {}", pid, e);
                        break;
                    }
                }
            }
        }

        JobOutcome::Exited(self.last_status)
    }

    fn track_stopped(&mut self, job: Job, pgid: Pid) {
        let command = job.command_name().to_string();
        match self.table.push(JobEntry::new(job, pgid, JobState::Stopped)) {
            Some(number) => println!("{}", stopped_notice(number, &command)),
            None => {
                eprintln!(
                    "mysh: job table full, hanging up stopped job {} (pid {})",
                    command, pgid
                );
                hang_up(pgid);
            }
        }
    }

    /// `fg`: resumes the most recently recorded job in the foreground and
    /// waits for its whole process group.
    pub fn foreground(&mut self) -> Result<()> {
        let Some((number, entry)) = self.table.last_mut() else {
            return Ok(());
        };
        if entry.pgid.as_raw() <= 0 {
            return Ok(());
        }
        let pgid = entry.pgid;
        let command = entry.command().to_string();
        let last_pid = entry.job.pids.last().copied().flatten();
        let is_last = |pid: Pid| last_pid.map_or(true, |last| last == pid);

        self.terminal.give_to(pgid);
        if let Err(e) = signal::killpg(pgid, Signal::SIGCONT) {
            self.terminal.reclaim();
            entry.background = false;
            entry.state = JobState::Done;
            return Err(e).with_context(|| format!("fg: job {} has terminated", number));
        }
        entry.background = false;

        SignalHandler::set_foreground_job_running(true);
        let mut stopped = false;
        loop {
            match waitpid(Pid::from_raw(-pgid.as_raw()), Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Exited(pid, code)) if is_last(pid) => self.last_status = code,
                Ok(WaitStatus::Signaled(pid, sig, _)) if is_last(pid) => {
                    self.last_status = SIGNAL_STATUS_BASE + sig as i32
                }
                Ok(WaitStatus::Stopped(_, sig)) => {
                    self.last_status = SIGNAL_STATUS_BASE + sig as i32;
                    stopped = true;
                    break;
                }
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    warn!("waitpid for group {} failed: {}", pgid, e);
                    break;
                }
            }
        }
        SignalHandler::set_foreground_job_running(false);

        // The terminal goes back to the shell even when the job stopped again.
        self.terminal.reclaim();
        if let Err(e) = SignalHandler::ignore_job_control_signals() {
            warn!("failed to re-arm signal dispositions: {}", e);
        }

        if let Some((_, entry)) = self.table.last_mut() {
            if stopped {
                entry.state = JobState::Stopped;
                println!("{}", stopped_notice(number, &command));
            } else {
                entry.state = JobState::Done;
            }
        }
        Ok(())
    }

    /// `bg`: resumes the most recently recorded job without waiting.
    pub fn background(&mut self) -> Result<()> {
        let Some((number, entry)) = self.table.last_mut() else {
            return Ok(());
        };
        if entry.pgid.as_raw() <= 0 {
            return Ok(());
        }

        signal::killpg(entry.pgid, Signal::SIGCONT)
            .with_context(|| format!("bg: job {} has terminated", number))?;
        entry.background = true;
        entry.state = JobState::RunningBackground;
        println!("{}", running_notice(number, entry.command()));
        Ok(())
    }

    /// `jobs`
    pub fn list_jobs(&self) {
        for line in self.table.listing() {
            println!("{}", line);
        }
    }

    /// Collects finished children and announces finished background jobs.
    pub fn reap(&mut self) {
        for pid in SignalHandler::reap_children() {
            if let Some(entry) = self.table.mark_done(pid) {
                println!("{}", done_notice(entry.command()));
            }
        }
    }
}

/// SIGHUP then SIGCONT, so a stopped group wakes up to the hangup.
fn hang_up(pgid: Pid) {
    let _ = signal::killpg(pgid, Signal::SIGHUP);
    let _ = signal::killpg(pgid, Signal::SIGCONT);
}

impl Drop for JobControl {
    fn drop(&mut self) {
        // Stopped jobs would otherwise stay suspended forever.
        for (_, entry) in self.table.iter() {
            if entry.state == JobState::Stopped {
                hang_up(entry.pgid);
            }
        }
    }
}
