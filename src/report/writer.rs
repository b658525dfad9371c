use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error_handling::types::ReportError;

/// Report sections, in the only order they may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportSection {
    UserMessage,
    SystemInfo,
    LogExcerpts,
    Captures,
    Science,
    Notes,
}

impl ReportSection {
    pub fn title(&self) -> &'static str {
        match self {
            ReportSection::UserMessage => "Reported Error From User",
            ReportSection::SystemInfo => "System Information",
            ReportSection::LogExcerpts => "Log Excerpts",
            ReportSection::Captures => "Screen Captures",
            ReportSection::Science => "Science Snapshot",
            ReportSection::Notes => "Collection Notes",
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Sole writer of a run's report file.
///
/// Sections are appended and must come in [`ReportSection`] order; a section
/// at or before the last one written is refused. Notes collected along the
/// way are written as the final section by [`ReportWriter::finish`].
pub struct ReportWriter {
    path: PathBuf,
    out: BufWriter<File>,
    last: Option<ReportSection>,
    notes: Vec<String>,
}

impl ReportWriter {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Writing report to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            last: None,
            notes: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_section(&mut self, section: ReportSection, body: &str) -> Result<(), ReportError> {
        if let Some(last) = self.last {
            if section <= last {
                return Err(ReportError::OutOfOrder(format!(
                    "'{}' cannot follow '{}'",
                    section, last
                )));
            }
        }

        writeln!(self.out, "====={}=====", section.title())?;
        self.out.write_all(body.as_bytes())?;
        if !body.is_empty() && !body.ends_with('\n') {
            writeln!(self.out)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;

        debug!("Report section '{}' written", section);
        self.last = Some(section);
        Ok(())
    }

    /// Records a collection note for the final section.
    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        warn!("Report note: {}", note);
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Writes the notes section, if there is anything to say, and closes the
    /// report.
    pub fn finish(mut self) -> Result<PathBuf, ReportError> {
        if !self.notes.is_empty() {
            let body: String = self.notes.iter().map(|n| format!("- {}\n", n)).collect();
            self.write_section(ReportSection::Notes, &body)?;
        }
        self.out.flush()?;
        Ok(self.path)
    }
}
