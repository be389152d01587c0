use crate::shell::job::Job;
use crate::shell::shell_env::Environment;

const EXIT_STATUS_VAR: &str = "$?";

/// Expands a single argument. Only whole-word references are recognised:
/// `$?` and `$NAME`. An unset name expands to the empty string; a lone `$`
/// is left alone.
pub fn expand_word(word: &str, env: &Environment, last_status: i32) -> String {
    if word == EXIT_STATUS_VAR {
        return last_status.to_string();
    }
    match word.strip_prefix('$') {
        Some(name) if !name.is_empty() => env.get(name).unwrap_or_default().to_string(),
        _ => word.to_string(),
    }
}

/// Expands every argument of every stage in place. Redirection paths are
/// taken literally.
pub fn expand_job(job: &mut Job, env: &Environment, last_status: i32) {
    for stage in &mut job.stages {
        for arg in &mut stage.argv {
            if arg.starts_with('$') {
                *arg = expand_word(arg, env, last_status);
            }
        }
    }
}
