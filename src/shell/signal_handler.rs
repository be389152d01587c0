use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use crate::config::CONFIG;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read by the SIGINT handler: set while the shell is blocked on a
/// foreground job.
static FOREGROUND_JOB_RUNNING: AtomicBool = AtomicBool::new(false);

/// Whether an idle SIGINT should redraw the prompt.
static REDRAW_PROMPT: AtomicBool = AtomicBool::new(false);

lazy_static::lazy_static! {
    /// Forced before the handler is installed so the handler never runs the
    /// initializer.
    static ref INTERRUPT_PROMPT: Vec<u8> = format!("\n{}", CONFIG.prompt).into_bytes();
}

/// Signals the shell ignores for itself and children put back to default.
const JOB_CONTROL_SIGNALS: [Signal; 3] = [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU];

pub struct SignalHandler;

impl SignalHandler {
    pub fn initialize(interactive: bool) -> Result<(), nix::Error> {
        debug!("Initializing signal handlers");

        lazy_static::initialize(&INTERRUPT_PROMPT);
        REDRAW_PROMPT.store(interactive, Ordering::SeqCst);

        let sigint_action = SigAction::new(
            SigHandler::Handler(Self::handle_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe { signal::sigaction(Signal::SIGINT, &sigint_action)? };

        Self::ignore_job_control_signals()
    }

    /// Ctrl-Z (and background terminal access) must never stop the shell.
    pub fn ignore_job_control_signals() -> Result<(), nix::Error> {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        for sig in JOB_CONTROL_SIGNALS {
            unsafe { signal::sigaction(sig, &ignore)? };
        }
        Ok(())
    }

    /// Runs in a freshly forked child before exec. Only calls
    /// async-signal-safe primitives.
    pub fn restore_defaults_in_child() {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for sig in [Signal::SIGINT, Signal::SIGQUIT]
            .into_iter()
            .chain(JOB_CONTROL_SIGNALS)
        {
            let _ = unsafe { signal::sigaction(sig, &default) };
        }
    }

    pub fn set_foreground_job_running(running: bool) {
        FOREGROUND_JOB_RUNNING.store(running, Ordering::SeqCst);
    }

    /// What the SIGINT handler writes: a bare newline while a foreground job
    /// runs or when there is no prompt to redraw, else newline and prompt.
    fn interrupt_output() -> &'static [u8] {
        if FOREGROUND_JOB_RUNNING.load(Ordering::SeqCst)
            || !REDRAW_PROMPT.load(Ordering::SeqCst)
        {
            b"\n"
        } else {
            INTERRUPT_PROMPT.as_slice()
        }
    }

    extern "C" fn handle_sigint(_: i32) {
        // The foreground group gets SIGINT from the terminal driver directly;
        // the shell only keeps its own output tidy.
        let bytes = Self::interrupt_output();
        unsafe {
            libc::write(
                libc::STDOUT_FILENO,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            );
        }
    }

    /// Collects every child that has terminated, without blocking.
    ///
    /// Called from the main loop once per command cycle instead of from a
    /// SIGCHLD handler, so job table updates happen in ordinary context.
    pub fn reap_children() -> Vec<Pid> {
        let mut reaped = Vec::new();
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, status)) => {
                    debug!("reaped {} (exit {})", pid, status);
                    reaped.push(pid);
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    debug!("reaped {} (signal {:?})", pid, sig);
                    reaped.push(pid);
                }
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Err(Errno::EINTR) => continue,
                Ok(other) => debug!("reaper ignoring {:?}", other),
                Err(e) => {
                    debug!("reaper waitpid failed: {}", e);
                    break;
                }
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::child_process_lock;

    #[test]
    fn test_interrupt_output() {
        let _guard = child_process_lock();

        REDRAW_PROMPT.store(false, Ordering::SeqCst);
        assert_eq!(SignalHandler::interrupt_output(), b"\n");

        REDRAW_PROMPT.store(true, Ordering::SeqCst);
        let expected = format!("\n{}", CONFIG.prompt);
        assert_eq!(SignalHandler::interrupt_output(), expected.as_bytes());

        SignalHandler::set_foreground_job_running(true);
        assert_eq!(SignalHandler::interrupt_output(), b"\n");
        SignalHandler::set_foreground_job_running(false);
        REDRAW_PROMPT.store(false, Ordering::SeqCst);
    }

    #[test]
    fn test_reap_children_collects_exited_child() {
        let _guard = child_process_lock();

        let child = match unsafe { nix::unistd::fork() }.unwrap() {
            nix::unistd::ForkResult::Child => unsafe { libc::_exit(0) },
            nix::unistd::ForkResult::Parent { child } => child,
        };

        let mut reaped = Vec::new();
        for _ in 0..100 {
            reaped.extend(SignalHandler::reap_children());
            if reaped.contains(&child) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(reaped.contains(&child));
        assert!(SignalHandler::reap_children().iter().all(|pid| *pid != child));
    }
}
