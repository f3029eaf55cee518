// Checklist convention for aggregated todos.
//
// A line counts when, after trimming, it starts with an unchecked or
// checked checkbox immediately followed by a run of `!` markers:
//
//   - [ ] !!call the plumber      -> priority 2, open
//   - [x] !renew passport         -> priority 1, done
//
// The run length is the priority; the rest of the line is rendered in bold
// with the source note's header appended.

use chrono::{DateTime, SecondsFormat, Utc};

pub const UNCHECKED_PREFIX: &str = "- [ ] ";
pub const CHECKED_PREFIX: &str = "- [x] ";
pub const PRIORITY_MARKER: char = '!';

/// Marker line appended after the generated block.
pub const DO_NOT_EDIT_MARKER: &str = "DO NOT EDIT";

/// Checkbox state of an extracted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkbox {
    Open,
    Done,
}

impl Checkbox {
    fn prefix(self) -> &'static str {
        match self {
            Self::Open => UNCHECKED_PREFIX,
            Self::Done => CHECKED_PREFIX,
        }
    }
}

/// A checklist line parsed out of a note body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedLine<'a> {
    pub checkbox: Checkbox,
    pub priority: u32,
    pub text: &'a str,
}

/// One extracted checklist entry, already in display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoEntry {
    pub priority: u32,
    pub rendered_line: String,
}

/// Parse a single body line. Returns `None` unless the trimmed line starts
/// with a checkbox prefix followed by at least one priority marker.
pub fn parse_line(line: &str) -> Option<MarkedLine<'_>> {
    let line = line.trim();

    [Checkbox::Open, Checkbox::Done].into_iter().find_map(|checkbox| {
        let rest = line.strip_prefix(checkbox.prefix())?;
        let text = rest.trim_start_matches(PRIORITY_MARKER);
        let priority = (rest.len() - text.len()) / PRIORITY_MARKER.len_utf8();
        if priority == 0 {
            return None;
        }

        Some(MarkedLine { checkbox, priority: priority as u32, text })
    })
}

/// Render a parsed line as `- [ ] **text** (Source)` with a trailing newline.
pub fn render_line(line: &MarkedLine<'_>, source_header: &str) -> String {
    format!("{}**{}** ({})\n", line.checkbox.prefix(), line.text, source_header)
}

/// Extract every marked line of `body`, in line order.
pub fn extract_entries(source_header: &str, body: &str) -> Vec<TodoEntry> {
    body.split('\n')
        .filter_map(parse_line)
        .map(|line| TodoEntry {
            priority: line.priority,
            rendered_line: render_line(&line, source_header),
        })
        .collect()
}

/// Order entries by priority, highest first. The sort is stable, so equal
/// priorities keep their encounter order.
pub fn merge_entries(mut entries: Vec<TodoEntry>) -> Vec<TodoEntry> {
    entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    entries
}

/// Concatenate rendered lines into the generated block.
pub fn render_entries(entries: &[TodoEntry]) -> String {
    entries.iter().map(|entry| entry.rendered_line.as_str()).collect()
}

/// Trailer appended to every generated write.
pub fn generated_trailer(at: DateTime<Utc>) -> String {
    format!(
        "\n\n{DO_NOT_EDIT_MARKER}\ngenerated at {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}
