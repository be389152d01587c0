// src/shell/executor.rs
use crate::shell::error::ShellError;
use crate::shell::job::{Job, Stage};
use crate::shell::shell_env::Environment;
use crate::shell::signal_handler::SignalHandler;
use crate::utils::path_utils;
use libc::{c_char, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use log::{debug, warn};
use nix::fcntl::{fcntl, open, FcntlArg, FdFlag, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2, fork, pipe, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::ptr;

pub const EXIT_NOT_FOUND: i32 = 127;
pub const EXIT_EXEC_FAILED: i32 = 126;
pub const EXIT_REDIRECT_FAILED: i32 = 1;

type PipeFds = Option<(RawFd, RawFd)>;

/// Pointers to each string followed by a null entry, as exec expects.
/// The strings must outlive the returned vector.
fn null_terminated(strs: &[CString]) -> Vec<*const c_char> {
    strs.iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// A file the child opens and moves onto stdin or stdout.
struct Redirect {
    path: CString,
    failure: Vec<u8>,
}

impl Redirect {
    fn new(path: &str, error: ShellError) -> Option<Self> {
        match CString::new(path) {
            Ok(path) => Some(Redirect {
                path,
                failure: error.to_line(),
            }),
            Err(_) => {
                warn!("redirection path contains a NUL byte: {:?}", path);
                None
            }
        }
    }
}

/// Everything one child needs between fork and exec, built in the parent so
/// the child never allocates.
struct StagePlan {
    argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    program: Option<CString>,
    failure: Vec<u8>,
}

impl StagePlan {
    fn new(stage: &Stage, search_path: Option<&str>) -> Option<Self> {
        let name = stage.program()?;
        let argv: Vec<CString> = stage
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<_, _>>()
            .ok()?;
        let argv_ptrs = null_terminated(&argv);

        let program = path_utils::find_executable(name, search_path)
            .and_then(|path| CString::new(path.as_os_str().as_bytes()).ok());
        let failure = match program {
            Some(_) => ShellError::ExecFailed(name.to_string()),
            None => ShellError::CommandNotFound(name.to_string()),
        }
        .to_line();

        Some(StagePlan {
            argv,
            argv_ptrs,
            program,
            failure,
        })
    }
}

/// The shared, read-only view a child gets of the whole pipeline.
struct ChildContext<'a> {
    index: usize,
    num_stages: usize,
    pgid: Option<Pid>,
    infile: Option<&'a Redirect>,
    outfile: Option<&'a Redirect>,
    pipes: &'a [PipeFds],
    envp: &'a [*const c_char],
}

pub struct Executor;

impl Executor {
    /// Launches every stage of `job`, one process per stage, all in one
    /// process group led by the first stage.
    ///
    /// Returns one entry per stage; `None` marks a stage that could not be
    /// launched. The caller must treat any `None` (or an empty result) as a
    /// failure of the whole job. The pids and group id are also recorded on
    /// the job.
    pub fn execute(job: &mut Job, env: &Environment) -> Vec<Option<Pid>> {
        job.pids.clear();
        job.pgid = None;

        if job.is_empty() {
            debug!("refusing to execute an empty job");
            return Vec::new();
        }

        let num_stages = job.num_stages();
        let envp = env.to_envp();
        let envp_ptrs = null_terminated(&envp);
        let search_path = env.get("PATH");

        let mut plans: Vec<Option<StagePlan>> = job
            .stages
            .iter()
            .map(|stage| StagePlan::new(stage, search_path))
            .collect();
        let infile =
            Self::prepare_redirect(job.infile.as_deref(), ShellError::FileNotFound, plans.first_mut());
        let outfile =
            Self::prepare_redirect(job.outfile.as_deref(), ShellError::CannotCreate, plans.last_mut());

        let pipes = Self::create_pipes(num_stages);
        let mut pids: Vec<Option<Pid>> = Vec::with_capacity(num_stages);
        let mut pgid: Option<Pid> = None;

        for (index, plan) in plans.iter().enumerate() {
            let Some(plan) = plan else {
                warn!("stage {} has nothing to execute", index);
                pids.push(None);
                continue;
            };

            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    let ctx = ChildContext {
                        index,
                        num_stages,
                        pgid,
                        infile: infile.as_ref(),
                        outfile: outfile.as_ref(),
                        pipes: &pipes,
                        envp: &envp_ptrs,
                    };
                    Self::exec_stage(&ctx, plan);
                }
                Ok(ForkResult::Parent { child }) => {
                    let group = *pgid.get_or_insert(child);
                    // The child makes the same call; whichever runs first wins.
                    if let Err(e) = setpgid(child, group) {
                        debug!("setpgid({}, {}) in parent: {}", child, group, e);
                    }
                    debug!("stage {} ({:?}) started as pid {}", index, plan.argv, child);
                    pids.push(Some(child));
                }
                Err(e) => {
                    eprintln!("{}", ShellError::ForkFailed);
                    warn!("fork failed for stage {}: {}", index, e);
                    pids.resize(num_stages, None);
                    break;
                }
            }
        }

        // Without this the last reader never sees EOF.
        Self::close_pipes(&pipes);

        job.pgid = pgid;
        job.pids = pids.clone();
        pids
    }

    /// A path that cannot be handed to `open` fails the stage it belongs to
    /// rather than leaving that stage on the inherited descriptor.
    fn prepare_redirect(
        path: Option<&str>,
        error: fn(String) -> ShellError,
        stage: Option<&mut Option<StagePlan>>,
    ) -> Option<Redirect> {
        let path = path?;
        let redirect = Redirect::new(path, error(path.to_string()));
        if redirect.is_none() {
            eprintln!("{}", error(path.to_string()));
            if let Some(stage) = stage {
                *stage = None;
            }
        }
        redirect
    }

    /// `num_stages - 1` pipes. A failed pipe is reported and left as `None`;
    /// the stages on either side of it then read the terminal or write to
    /// it instead.
    fn create_pipes(num_stages: usize) -> Vec<PipeFds> {
        (1..num_stages)
            .map(|_| match pipe() {
                Ok((read, write)) => {
                    // Keep these out of unrelated children forked later.
                    for fd in [read, write] {
                        let _ = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
                    }
                    Some((read, write))
                }
                Err(e) => {
                    eprintln!("{}", ShellError::PipeFailed);
                    warn!("pipe: {}", e);
                    None
                }
            })
            .collect()
    }

    fn close_pipes(pipes: &[PipeFds]) {
        for (read, write) in pipes.iter().flatten() {
            let _ = close(*read);
            let _ = close(*write);
        }
    }

    /// Child side of the fork. Only async-signal-safe calls from here on.
    fn exec_stage(ctx: &ChildContext, plan: &StagePlan) -> ! {
        let _ = setpgid(Pid::from_raw(0), ctx.pgid.unwrap_or(Pid::from_raw(0)));
        SignalHandler::restore_defaults_in_child();

        let is_first = ctx.index == 0;
        let is_last = ctx.index + 1 == ctx.num_stages;

        if is_first {
            if let Some(infile) = ctx.infile {
                Self::redirect(infile, OFlag::O_RDONLY, Mode::empty(), STDIN_FILENO);
            }
        }
        if is_last {
            if let Some(outfile) = ctx.outfile {
                let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
                let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
                Self::redirect(outfile, flags, mode, STDOUT_FILENO);
            }
        }

        if !is_first {
            if let Some((read, _)) = ctx.pipes[ctx.index - 1] {
                let _ = dup2(read, STDIN_FILENO);
            }
        }
        if !is_last {
            if let Some((_, write)) = ctx.pipes[ctx.index] {
                let _ = dup2(write, STDOUT_FILENO);
            }
        }

        Self::close_pipes(ctx.pipes);

        match &plan.program {
            None => Self::child_exit(&plan.failure, EXIT_NOT_FOUND),
            Some(program) => {
                unsafe {
                    libc::execve(program.as_ptr(), plan.argv_ptrs.as_ptr(), ctx.envp.as_ptr());
                }
                Self::child_exit(&plan.failure, EXIT_EXEC_FAILED)
            }
        }
    }

    fn redirect(target: &Redirect, flags: OFlag, mode: Mode, onto: RawFd) {
        match open(target.path.as_c_str(), flags, mode) {
            Ok(fd) => {
                let _ = dup2(fd, onto);
                let _ = close(fd);
            }
            Err(_) => Self::child_exit(&target.failure, EXIT_REDIRECT_FAILED),
        }
    }

    fn child_exit(message: &[u8], status: i32) -> ! {
        unsafe {
            libc::write(
                STDERR_FILENO,
                message.as_ptr() as *const libc::c_void,
                message.len(),
            );
            libc::_exit(status)
        }
    }
}
