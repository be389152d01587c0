use std::fmt;

/// Diagnostics with a fixed wording, printed to stderr by the shell or by a
/// child before it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    CommandNotFound(String),
    PipeFailed,
    ForkFailed,
    ExecFailed(String),
    FileNotFound(String),
    CannotCreate(String),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::CommandNotFound(cmd) => write!(f, "{}: command not found", cmd),
            ShellError::PipeFailed => write!(f, "Error: pipe creation failed"),
            ShellError::ForkFailed => write!(f, "Error: fork failed"),
            ShellError::ExecFailed(cmd) => write!(f, "{}: Error: execution failed", cmd),
            ShellError::FileNotFound(path) => write!(f, "{}: file not found", path),
            ShellError::CannotCreate(path) => write!(f, "{}: cannot create file", path),
        }
    }
}

impl std::error::Error for ShellError {}

impl ShellError {
    /// The message as a newline-terminated byte string, rendered ahead of
    /// time so a forked child can write it without allocating.
    pub fn to_line(&self) -> Vec<u8> {
        format!("{}\n", self).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ShellError::CommandNotFound("frob".into()).to_line(),
            b"frob: command not found\n"
        );
        assert_eq!(ShellError::PipeFailed.to_string(), "Error: pipe creation failed");
        assert_eq!(
            ShellError::FileNotFound("in.txt".into()).to_string(),
            "in.txt: file not found"
        );
    }
}
