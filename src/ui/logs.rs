use chrono::{DateTime, Local};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::orchestrator::process::OutputStream;
use crate::ui::buffer::LogBuffer;
use crate::ui::term;

/// Tag used for messages from the orchestrator itself.
pub const SESSION_TAG: &str = "cortex";

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    Session,
}

impl From<OutputStream> for LogStream {
    fn from(stream: OutputStream) -> Self {
        match stream {
            OutputStream::Stdout => LogStream::Stdout,
            OutputStream::Stderr => LogStream::Stderr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    /// `None` for session-level messages.
    pub service: Option<String>,
    pub stream: LogStream,
    pub text: String,
}

impl LogEntry {
    pub fn new(service: Option<String>, stream: LogStream, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            service,
            stream,
            text: text.into(),
        }
    }

    pub fn session(text: impl Into<String>) -> Self {
        Self::new(None, LogStream::Session, text)
    }

    pub fn tag(&self) -> &str {
        self.service.as_deref().unwrap_or(SESSION_TAG)
    }
}

// ---------------------------------------------------------------------------
// LogAggregator
// ---------------------------------------------------------------------------

/// Color palette for service tags (using owo-colors).
const SERVICE_COLORS: &[fn(&str) -> String] = &[
    |s| format!("{}", s.cyan()),
    |s| format!("{}", s.yellow()),
    |s| format!("{}", s.green()),
    |s| format!("{}", s.magenta()),
    |s| format!("{}", s.blue()),
    |s| format!("{}", s.red()),
];

/// Collects output from every supervised service into one bounded buffer
/// and echoes each line as it arrives.
pub struct LogAggregator {
    buffer: LogBuffer,
    services: Vec<String>,
    tag_width: usize,
    use_color: bool,
    quiet: bool,
}

impl LogAggregator {
    pub fn new(capacity: usize, services: Vec<String>) -> Self {
        let tag_width = services
            .iter()
            .map(String::len)
            .chain(std::iter::once(SESSION_TAG.len()))
            .max()
            .unwrap_or(0);
        Self {
            buffer: LogBuffer::new(capacity),
            services,
            tag_width,
            use_color: std::io::stdout().is_terminal(),
            quiet: false,
        }
    }

    /// Stop echoing to the terminal; entries are still buffered.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn append(&mut self, entry: LogEntry) {
        if !self.quiet {
            term::emit(&self.render(&entry, self.use_color));
        }
        self.buffer.push(entry);
    }

    pub fn session(&mut self, text: impl Into<String>) {
        self.append(LogEntry::session(text));
    }

    /// Empty the buffer and clear the terminal.
    pub fn clear(&mut self) {
        self.buffer.clear();
        if !self.quiet {
            term::clear_screen();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// `HH:MM:SS [tag] text`, uncolored. The tag is omitted when only one
    /// service is supervised.
    pub fn format(&self, entry: &LogEntry) -> String {
        self.render(entry, false)
    }

    fn show_tags(&self) -> bool {
        self.services.len() > 1
    }

    fn render(&self, entry: &LogEntry, color: bool) -> String {
        let time = entry.timestamp.format("%H:%M:%S").to_string();
        let mut buf = String::new();

        if color {
            buf.push_str(&format!("{} ", time.dimmed()));
        } else {
            buf.push_str(&time);
            buf.push(' ');
        }

        if self.show_tags() || entry.service.is_none() {
            let tag = entry.tag();
            let padded = format!("{:>width$}", tag, width = self.tag_width);
            if color {
                let colored = match self.services.iter().position(|s| s == tag) {
                    Some(idx) => SERVICE_COLORS[idx % SERVICE_COLORS.len()](&padded),
                    None => format!("{}", padded.bold()),
                };
                buf.push_str(&format!("[{}] ", colored));
            } else {
                buf.push_str(&format!("[{}] ", padded));
            }
        }

        if color && entry.stream == LogStream::Stderr {
            buf.push_str(&format!("{}", entry.text.red()));
        } else {
            buf.push_str(&entry.text);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(services: &[&str], capacity: usize) -> LogAggregator {
        LogAggregator::new(capacity, services.iter().map(|s| s.to_string()).collect()).quiet()
    }

    fn line(service: &str, text: &str) -> LogEntry {
        LogEntry::new(Some(service.to_string()), LogStream::Stdout, text)
    }

    #[test]
    fn keeps_most_recent_entries_in_order() {
        let mut logs = aggregator(&["api", "web"], 5);
        for i in 0..12 {
            logs.append(line("api", &format!("line {}", i)));
            assert!(logs.len() <= 5);
        }
        let texts: Vec<&str> = logs.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["line 7", "line 8", "line 9", "line 10", "line 11"]);
    }

    #[test]
    fn tag_is_left_padded_with_multiple_services() {
        let logs = aggregator(&["api", "local:graph"], 10);
        let formatted = logs.format(&line("api", "hello"));
        assert!(formatted.ends_with("[        api] hello"), "{}", formatted);
        assert_eq!(&formatted[2..3], ":");
        assert_eq!(&formatted[5..6], ":");
    }

    #[test]
    fn single_service_omits_tag() {
        let logs = aggregator(&["api"], 10);
        let formatted = logs.format(&line("api", "hello"));
        assert_eq!(formatted.len(), "HH:MM:SS hello".len());
        assert!(formatted.ends_with(" hello"));
    }

    #[test]
    fn session_entries_use_cortex_tag() {
        let logs = aggregator(&["api"], 10);
        let formatted = logs.format(&LogEntry::session("starting"));
        assert!(formatted.ends_with("[cortex] starting"), "{}", formatted);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut logs = aggregator(&["api", "web"], 10);
        logs.append(line("web", "x"));
        logs.session("y");
        assert_eq!(logs.len(), 2);
        logs.clear();
        assert!(logs.is_empty());
    }
}
