// src/shell/command_parser.rs
use crate::shell::job::{Job, Stage};
use log::{debug, warn};

pub const MAX_PIPELINE_LEN: usize = 10;

const INPUT_TOKEN: &str = "<";
const OUTPUT_TOKEN: &str = ">";
const BACKGROUND_CHAR: char = '&';
const PIPE_CHAR: char = '|';

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

pub struct CommandParser;

impl CommandParser {
    /// Turns one raw input line into a `Job`.
    ///
    /// Never fails: malformed or blank input produces a job with zero
    /// stages, which the caller treats as "nothing to do".
    pub fn parse(input: &str) -> Job {
        let mut job = Job::default();

        let line = input
            .strip_suffix('\n')
            .unwrap_or(input)
            .replace('\n', " ");

        let line = line.trim_start_matches(is_blank);
        if line.is_empty() {
            return job;
        }

        let mut body = line.trim_end_matches(is_blank);
        if let Some(stripped) = body.strip_suffix(BACKGROUND_CHAR) {
            job.background = true;
            body = stripped;
        }

        for stage_str in body.split(PIPE_CHAR) {
            if stage_str.trim_matches(is_blank).is_empty() {
                continue;
            }
            if job.stages.len() == MAX_PIPELINE_LEN {
                warn!(
                    "pipeline longer than {} stages, ignoring the rest",
                    MAX_PIPELINE_LEN
                );
                break;
            }
            let stage = Self::parse_stage(stage_str, &mut job);
            job.stages.push(stage);
        }

        debug!("parsed job: {:?}", job);
        job
    }

    /// Tokenizes a single pipeline stage. Redirections are recorded on the
    /// job itself, overwriting any earlier path.
    fn parse_stage(stage_str: &str, job: &mut Job) -> Stage {
        let mut argv = Vec::new();
        let mut tokens = stage_str.split(is_blank).filter(|t| !t.is_empty());

        while let Some(token) = tokens.next() {
            match token {
                INPUT_TOKEN => {
                    if let Some(path) = tokens.next() {
                        job.infile = Some(path.to_string());
                    }
                }
                OUTPUT_TOKEN => {
                    if let Some(path) = tokens.next() {
                        job.outfile = Some(path.to_string());
                    }
                }
                arg => argv.push(arg),
            }
        }

        Stage::new(argv)
    }
}
