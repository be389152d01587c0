// src/shell/job.rs
use nix::unistd::Pid;

/// One command of a pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub argv: Vec<String>,
}

impl Stage {
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Stage {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// The command name, or `None` for a stage that holds no arguments
    /// (e.g. a dangling redirection operator).
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

/// A parsed command line.
///
/// `infile` only ever applies to the first stage and `outfile` to the last,
/// regardless of where the operator appeared on the line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    pub stages: Vec<Stage>,
    pub infile: Option<String>,
    pub outfile: Option<String>,
    pub background: bool,
    pub pgid: Option<Pid>,
    pub pids: Vec<Option<Pid>>,
}

impl Job {
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// First argument of the first stage; used in every job notice.
    pub fn command_name(&self) -> &str {
        self.stages
            .first()
            .and_then(Stage::program)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        let job = Job {
            stages: vec![Stage::new(["sort", "-u"]), Stage::new(["wc"])],
            ..Default::default()
        };
        assert_eq!(job.num_stages(), 2);
        assert_eq!(job.command_name(), "sort");
        assert_eq!(job.stages[0].argv.len(), 2);
    }

    #[test]
    fn test_empty_stage_has_no_program() {
        let job = Job {
            stages: vec![Stage::default()],
            ..Default::default()
        };
        assert_eq!(job.stages[0].program(), None);
        assert_eq!(job.command_name(), "");
    }
}
