/// Document segmentation.
///
/// Splits a document, held as raw lines with their terminators, into:
///   --- header block ---
///   header content
///   ## Lane ^id        (zero or more sections, one may be "Archive")
///   %% kanban:settings (optional JSON block, closed by a line `%%`)
///   footer content
///
/// Everything is expressed as line ranges so the assembler can copy
/// untouched spans back out byte-for-byte.
use std::ops::Range;

use crate::extract::id_marker;

pub const SETTINGS_OPEN: &str = "%% kanban:settings";
pub const SETTINGS_CLOSE: &str = "%%";
pub const HEADING_PREFIX: &str = "## ";
pub const ARCHIVE_TITLE: &str = "archive";
const HEADER_DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Index of the `## ` line.
    pub heading: usize,
    pub title: String,
    pub id: Option<String>,
    pub archive: bool,
    /// Lines after the heading up to the next section or the settings block.
    pub body: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsBlock {
    /// Opening sentinel through closing sentinel, inclusive.
    pub lines: Range<usize>,
    /// JSON payload with fence lines removed.
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub header: Option<Range<usize>>,
    pub header_content: Range<usize>,
    pub sections: Vec<Section>,
    pub settings: Option<SettingsBlock>,
    pub footer: Range<usize>,
}

/// A line without its `\n` / `\r\n` terminator.
pub fn line_body(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Split text into lines that keep their terminators.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

pub fn is_heading(body: &str) -> bool {
    body.starts_with(HEADING_PREFIX)
}

fn is_settings_open(body: &str) -> bool {
    body.trim_end() == SETTINGS_OPEN
}

pub fn segment(lines: &[&str]) -> Segments {
    let header = find_header(lines);
    let body_start = header.as_ref().map_or(0, |r| r.end);

    let settings_start = (body_start..lines.len()).find(|&i| is_settings_open(line_body(lines[i])));
    let limit = settings_start.unwrap_or(lines.len());

    let headings: Vec<usize> = (body_start..limit)
        .filter(|&i| is_heading(line_body(lines[i])))
        .collect();

    let header_content = body_start..headings.first().copied().unwrap_or(limit);

    let sections = headings
        .iter()
        .enumerate()
        .map(|(n, &heading)| {
            let end = headings.get(n + 1).copied().unwrap_or(limit);
            let text = &line_body(lines[heading])[HEADING_PREFIX.len()..];
            let (title, id) = id_marker::split_heading(text);
            Section {
                heading,
                archive: title.eq_ignore_ascii_case(ARCHIVE_TITLE),
                title,
                id,
                body: heading + 1..end,
            }
        })
        .collect();

    let settings = settings_start.map(|start| settings_block(lines, start));
    let footer_start = settings.as_ref().map_or(lines.len(), |s| s.lines.end);

    Segments {
        header,
        header_content,
        sections,
        settings,
        footer: footer_start..lines.len(),
    }
}

/// A leading `---` line closed by another `---` line.
fn find_header(lines: &[&str]) -> Option<Range<usize>> {
    if line_body(lines.first()?).trim_end() != HEADER_DELIMITER {
        return None;
    }
    (1..lines.len())
        .find(|&i| line_body(lines[i]).trim_end() == HEADER_DELIMITER)
        .map(|close| 0..close + 1)
}

fn settings_block(lines: &[&str], start: usize) -> SettingsBlock {
    let close = (start + 1..lines.len()).find(|&i| line_body(lines[i]).trim() == SETTINGS_CLOSE);
    let end = close.map_or(lines.len(), |c| c + 1);
    let payload_end = close.unwrap_or(lines.len());
    let json = lines[start + 1..payload_end]
        .iter()
        .map(|l| line_body(l))
        .filter(|body| !body.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    SettingsBlock {
        lines: start..end,
        json,
    }
}
