// Superficie utente: ultimo messaggio + tabella dei risultati
use crate::client::models::events::PollEvent;
use crate::common::payload::{text_of, ResultRow};
use std::io::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMessage {
    pub severity: Severity,
    pub text: String,
}

impl SurfaceMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { severity: Severity::Info, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { severity: Severity::Error, text: text.into() }
    }
}

/// What the user sees: a single message line and an append-only results table.
///
/// Rows are never deduplicated, so a backend that resends everything it has
/// computed will show repeated rows.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    latest: Option<SurfaceMessage>,
    rows: Vec<ResultRow>,
    count_label: String,
}

impl Surface {
    pub fn new(count_label: impl Into<String>) -> Self {
        Self {
            latest: None,
            rows: Vec::new(),
            count_label: count_label.into(),
        }
    }

    /// Applies a poll event; returns how many rows were appended.
    pub fn apply(&mut self, event: &PollEvent) -> usize {
        match event {
            PollEvent::Message(msg) => {
                self.latest = Some(msg.clone());
                0
            }
            PollEvent::Rows(rows) => {
                self.rows.extend(rows.iter().cloned());
                rows.len()
            }
            PollEvent::ControlChanged { .. } | PollEvent::CycleFinished { .. } => 0,
        }
    }

    pub fn latest(&self) -> Option<&SurfaceMessage> {
        self.latest.as_ref()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.latest = None;
        self.rows.clear();
    }

    pub fn write_message<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if let Some(msg) = &self.latest {
            writeln!(out, "{} [{}] {}", msg.severity.emoji(), msg.severity.label(), msg.text)?;
        }
        Ok(())
    }

    pub fn write_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.rows.is_empty() {
            return writeln!(out, "(no results yet)");
        }
        let label = if self.count_label.is_empty() { "count" } else { &self.count_label };
        writeln!(out, "{:<16} {:<16} {}", "from", "to", label)?;
        for row in &self.rows {
            write_row(out, row)?;
        }
        Ok(())
    }
}

pub fn write_row<W: Write>(out: &mut W, row: &ResultRow) -> io::Result<()> {
    writeln!(out, "{:<16} {:<16} {}", text_of(&row.from), text_of(&row.to), row.count)
}
