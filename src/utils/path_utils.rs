// src/utils/path_utils.rs
use crate::config::DEFAULT_SEARCH_PATH;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const OWNER_EXECUTE: u32 = 0o100;

/// Resolves a command name to an executable path.
///
/// Names containing a `/` are taken literally and never searched for.
/// Otherwise each directory of `search_path` (or the built-in default list
/// when there is no `PATH`) is tried in order.
pub fn find_executable(command: &str, search_path: Option<&str>) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }

    if command.contains('/') {
        let path = Path::new(command);
        return is_executable(path).then(|| path.to_path_buf());
    }

    search_path
        .unwrap_or(DEFAULT_SEARCH_PATH)
        .split(':')
        .map(|dir| PathBuf::from(format!("{}/{}", dir, command)))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.permissions().mode() & OWNER_EXECUTE != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn make_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_first_match_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_file(second.path(), "tool", 0o755);
        let expected = make_file(first.path(), "tool", 0o700);

        let search = format!("{}:{}", first.path().display(), second.path().display());
        assert_eq!(find_executable("tool", Some(&search)), Some(expected));
    }

    #[test]
    fn test_skips_non_executable() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_file(first.path(), "tool", 0o644);
        let expected = make_file(second.path(), "tool", 0o755);

        let search = format!("{}:{}", first.path().display(), second.path().display());
        assert_eq!(find_executable("tool", Some(&search)), Some(expected));
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let search = dir.path().display().to_string();
        assert_eq!(find_executable("no-such-command-here", Some(&search)), None);
        assert_eq!(find_executable("", Some(&search)), None);
    }

    #[test]
    fn test_path_lookup_in_bin() {
        if !Path::new("/bin/ls").exists() {
            return;
        }
        assert_eq!(
            find_executable("ls", Some("/bin:/usr/bin")),
            Some(PathBuf::from("/bin/ls"))
        );
    }

    #[test]
    fn test_literal_path_skips_search() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_file(dir.path(), "tool", 0o755);
        let literal = tool.display().to_string();

        // An empty search list would find nothing; the literal still resolves.
        assert_eq!(find_executable(&literal, Some("")), Some(tool.clone()));

        let missing = dir.path().join("missing").display().to_string();
        let search = dir.path().display().to_string();
        assert_eq!(find_executable(&missing, Some(&search)), None);

        let plain = make_file(dir.path(), "plain", 0o644);
        assert_eq!(find_executable(&plain.display().to_string(), None), None);
    }
}
