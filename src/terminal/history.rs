use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

pub struct History {
    history_file: Option<PathBuf>,
    max_history_size: usize,
    entries: Vec<String>,
}

impl History {
    pub fn new(history_file: Option<PathBuf>, max_history_size: usize) -> Result<Self> {
        let mut history = History {
            history_file,
            max_history_size,
            entries: Vec::new(),
        };

        history.load()?;
        Ok(history)
    }

    pub fn in_memory(max_history_size: usize) -> Self {
        History {
            history_file: None,
            max_history_size,
            entries: Vec::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        let Some(path) = &self.history_file else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open history file {}", path.display()))?;
        let reader = BufReader::new(file);

        self.entries.clear();
        for entry in reader.lines().map_while(Result::ok) {
            if !entry.trim().is_empty() {
                self.entries.push(entry);
            }
        }

        self.truncate();
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.history_file else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to write history file {}", path.display()))?;

        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }

        Ok(())
    }

    /// Records a line unless it is blank or repeats the previous entry.
    pub fn add(&mut self, entry: &str) -> bool {
        let entry = entry.trim();
        if entry.is_empty() {
            return false;
        }
        if self.entries.last().map(String::as_str) == Some(entry) {
            return false;
        }

        self.entries.push(entry.to_string());
        self.truncate();
        true
    }

    pub fn get_entries(&self) -> &[String] {
        &self.entries
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.max_history_size {
            let excess = self.entries.len() - self.max_history_size;
            self.entries.drain(..excess);
        }
    }
}
