mod command_parser;
mod error;
mod executor;
mod expand;
mod job;
mod job_control;
mod shell_env;
mod signal_handler;

use crate::config::CONFIG;
use crate::terminal::Terminal;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

use self::command_parser::CommandParser;
use self::job::Job;
use self::job_control::{JobControl, TerminalControl};
use self::shell_env::Environment;
use self::signal_handler::SignalHandler;

/// What the main loop does after a builtin ran.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(i32),
}

pub struct Shell {
    terminal: Terminal,
    job_control: JobControl,
    environment: Environment,
}

impl Shell {
    pub fn new() -> Result<Self> {
        let config = CONFIG.clone();

        let mut terminal_control = TerminalControl::detect();
        if let Err(e) = terminal_control.claim() {
            warn!("Job control unavailable: {:#}", e);
        }

        let interactive = terminal_control.is_interactive();
        SignalHandler::initialize(interactive).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to initialize signal handlers: {}", e);
        });

        debug!(
            "starting shell, interactive: {}, pgid: {}",
            interactive,
            terminal_control.shell_pgid()
        );

        let environment = Environment::from_process();
        debug!("inherited {} environment variables", environment.len());

        Ok(Shell {
            terminal: Terminal::new(&config, interactive),
            job_control: JobControl::new(config.max_jobs, terminal_control),
            environment,
        })
    }

    /// Reads and runs command lines until `exit` or end of input. Returns
    /// the status the process should exit with.
    pub fn run(&mut self) -> Result<i32> {
        loop {
            self.job_control.reap();

            let Some(line) = self.terminal.read_line()? else {
                break;
            };

            let mut job = CommandParser::parse(&line);
            if job.is_empty() {
                continue;
            }
            expand::expand_job(&mut job, &self.environment, self.job_control.last_status());

            if let Some(result) = self.handle_builtin_command(&job) {
                match result {
                    Ok(Flow::Exit(status)) => return Ok(status),
                    Ok(Flow::Continue) => {}
                    Err(e) => {
                        eprintln!("{}", e);
                        self.job_control.set_last_status(1);
                    }
                }
                continue;
            }

            self.job_control.run(job, &self.environment);
        }

        Ok(self.job_control.last_status())
    }

    /// Runs `job` in the shell itself if its first word names a builtin.
    fn handle_builtin_command(&mut self, job: &Job) -> Option<Result<Flow>> {
        let argv = &job.stages.first()?.argv;
        let args: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();

        let name = argv.first()?.as_str();
        let result = match name {
            "cd" => self.change_directory(args.first().copied()),
            "export" => self.export(&args),
            "exit" => return Some(self.exit(args.first().copied())),
            "jobs" => {
                self.job_control.list_jobs();
                Ok(())
            }
            "fg" => self.job_control.foreground(),
            "bg" => self.job_control.background(),
            _ => return None,
        };
        // fg leaves the resumed job's status behind.
        if result.is_ok() && name != "fg" {
            self.job_control.set_last_status(0);
        }
        Some(result.map(|_| Flow::Continue))
    }

    fn change_directory(&mut self, dir: Option<&str>) -> Result<()> {
        let target = match dir {
            Some(dir) => dir.to_string(),
            None => self
                .environment
                .get("HOME")
                .map(str::to_string)
                .ok_or_else(|| anyhow!("cd: failed"))?,
        };

        debug!("cd {}", target);
        std::env::set_current_dir(&target).context("cd: failed")?;
        if let Ok(cwd) = std::env::current_dir() {
            self.environment.set("PWD", &cwd.to_string_lossy());
        }
        Ok(())
    }

    fn export(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            for entry in self.environment.to_envp() {
                println!("{}", entry.to_string_lossy());
            }
            return Ok(());
        }
        for assignment in args {
            self.environment.export(assignment)?;
        }
        Ok(())
    }

    fn exit(&mut self, status: Option<&str>) -> Result<Flow> {
        let status = match status {
            None => 0,
            Some(arg) => match arg.parse::<i32>() {
                Ok(status) => status,
                Err(_) => {
                    eprintln!("exit: {}: numeric argument required", arg);
                    2
                }
            },
        };
        debug!("exit requested with status {}", status);
        Ok(Flow::Exit(status))
    }
}

/// Serializes tests that fork or wait, so a wait in one test never collects
/// a child started by another.
#[cfg(test)]
pub(crate) fn child_process_lock() -> std::sync::MutexGuard<'static, ()> {
    lazy_static::lazy_static! {
        static ref LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    }
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
