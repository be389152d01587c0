mod history;

use crate::config::Config;
use anyhow::Result;
use colored::*;
use log::warn;
use nix::errno::Errno;
use nix::unistd::read;
use rustyline::error::ReadlineError;
use rustyline::{Config as EditorConfig, DefaultEditor, EditMode};
use std::io::{self, Write};
use self::history::History;

/// Where command lines come from.
enum Input {
    /// A terminal, read through rustyline.
    Editor(Box<DefaultEditor>),
    /// Anything else. Read one byte at a time so nothing past the newline is
    /// consumed before a child gets to read the same descriptor.
    Raw,
}

pub struct Terminal {
    input: Input,
    prompt: String,
    interactive: bool,
    history: History,
}

impl Terminal {
    pub fn new(config: &Config, interactive: bool) -> Self {
        let history = if interactive {
            History::new(config.history_file.clone(), config.max_history_size).unwrap_or_else(
                |e| {
                    warn!("Failed to load history: {}", e);
                    History::in_memory(config.max_history_size)
                },
            )
        } else {
            History::in_memory(config.max_history_size)
        };

        let input = if interactive {
            Self::editor(&history).map_or(Input::Raw, |editor| Input::Editor(Box::new(editor)))
        } else {
            Input::Raw
        };

        Terminal {
            input,
            prompt: config.prompt.clone(),
            interactive,
            history,
        }
    }

    fn editor(history: &History) -> Option<DefaultEditor> {
        let config = EditorConfig::builder()
            .edit_mode(EditMode::Emacs)
            .auto_add_history(false)
            .build();

        let mut editor = match DefaultEditor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                warn!("Line editor unavailable, falling back to plain input: {}", e);
                return None;
            }
        };
        for entry in history.get_entries() {
            let _ = editor.add_history_entry(entry.as_str());
        }
        Some(editor)
    }

    /// Next command line, or `None` at end of input. An interrupted edit
    /// comes back as an empty line.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let line = match &mut self.input {
            Input::Editor(editor) => match editor.readline(&self.prompt.bright_green().to_string()) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => return Ok(Some(String::new())),
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(anyhow::anyhow!("Error reading input: {}", err)),
            },
            Input::Raw => {
                if self.interactive {
                    print!("{}", self.prompt);
                    let _ = io::stdout().flush();
                }
                match Self::read_raw_line()? {
                    Some(line) => line,
                    None => return Ok(None),
                }
            }
        };

        if self.history.add(&line) {
            if let Input::Editor(editor) = &mut self.input {
                let _ = editor.add_history_entry(line.trim());
            }
        }

        Ok(Some(line))
    }

    fn read_raw_line() -> Result<Option<String>> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match read(libc::STDIN_FILENO, &mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => {
                    bytes.push(b'\n');
                    break;
                }
                Ok(_) => bytes.push(byte[0]),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(anyhow::anyhow!("Error reading input: {}", e)),
            }
        }

        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(e) = self.history.save() {
            eprintln!("Warning: Failed to save history: {}", e);
        }
    }
}
