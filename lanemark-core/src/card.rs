/// Card lines and their content blocks.
///
/// A card is one checkbox line plus the indented block below it:
///   - [ ] Title #tag [key::value] @2025-03-10 every week ^id
///     > a note line
///     - [x] a subtask
///     anything else indented deeper than the checkbox
///
/// Parsing keeps the raw text next to the decoded fields; writing reuses
/// whatever raw text still matches the model.
use std::collections::HashSet;

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::ParseOptions;
use crate::extract::{self, date, metadata, tags};
use crate::ids::IdAllocator;
use crate::parser::FormatError;
use crate::segment::{line_body, split_lines};
use crate::types::{Card, CardSource, Retained, Subtask};

static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([ \t]*)- \[([ xX])\](?:[ \t]+(.*))?$").unwrap());

/// Indent step for regenerated content blocks.
const BLOCK_INDENT: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkbox<'a> {
    pub indent: &'a str,
    pub completed: bool,
    pub text: &'a str,
}

/// Match `- [ ]` / `- [x]` after optional leading whitespace.
pub fn match_checkbox(body: &str) -> Option<Checkbox<'_>> {
    let caps = CHECKBOX_RE.captures(body)?;
    Some(Checkbox {
        indent: caps.get(1)?.as_str(),
        completed: caps.get(2)?.as_str() != " ",
        text: caps.get(3).map_or("", |m| m.as_str()),
    })
}

pub fn is_card_line(body: &str) -> bool {
    CHECKBOX_RE.is_match(body)
}

/// Column width of leading whitespace; a tab counts as four.
pub fn indent_width(body: &str) -> usize {
    body.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn is_note_line(body: &str) -> bool {
    body.trim_start().starts_with('>')
}

fn note_text(body: &str) -> &str {
    body.trim_start()
        .strip_prefix('>')
        .unwrap_or_default()
        .trim()
}

/// Exclusive end of the content block for a card indented `card_indent`
/// whose line sits just before `start`.
///
/// `end` trails the last committed line while `probe` runs ahead over blank
/// lines; blanks are only committed once deeper content follows them.
pub fn scan_content_block(lines: &[&str], start: usize, card_indent: usize) -> usize {
    let mut end = start;
    let mut probe = start;
    while probe < lines.len() {
        let body = line_body(lines[probe]);
        if body.trim().is_empty() {
            probe += 1;
            continue;
        }
        if !is_note_line(body) && indent_width(body) <= card_indent {
            break;
        }
        probe += 1;
        end = probe;
    }
    end
}

pub struct CardParser<'a> {
    natural_dates: bool,
    today: NaiveDate,
    ids: &'a mut dyn IdAllocator,
}

impl<'a> CardParser<'a> {
    pub fn new(options: &ParseOptions, ids: &'a mut dyn IdAllocator) -> Self {
        Self {
            natural_dates: options.natural_language_dates,
            today: options.today(),
            ids,
        }
    }

    pub(crate) fn ids(&mut self) -> &mut dyn IdAllocator {
        &mut *self.ids
    }

    /// Parse the card whose checkbox is `lines[index]`. Returns the card and
    /// the index of the last line belonging to it.
    pub fn parse(&mut self, lines: &[&str], index: usize) -> Option<(Card, usize)> {
        let raw = *lines.get(index)?;
        let checkbox = match_checkbox(line_body(raw))?;
        let mut fields = extract::extract_line(checkbox.text, self.natural_dates, self.today);
        let id_generated = fields.id.is_none();
        let metadata_tokens = std::mem::take(&mut fields.metadata_tokens);

        let mut card = Card {
            id: fields.id.unwrap_or_else(|| self.ids.allocate()),
            title: fields.title,
            completed: checkbox.completed,
            tags: fields.tags,
            due_date: fields.due_date,
            due_time: fields.due_time,
            recurrence: fields.recurrence,
            reminder: fields.reminder,
            note_path: fields.note_path,
            metadata: fields.metadata,
            ..Default::default()
        };

        let card_indent = indent_width(checkbox.indent);
        let end = scan_content_block(lines, index + 1, card_indent);
        let block = &lines[index + 1..end];

        let mut notes: Vec<&str> = Vec::new();
        let mut subtask_lines = Vec::new();
        for (offset, line) in block.iter().enumerate() {
            let body = line_body(line);
            if is_note_line(body) {
                notes.push(note_text(body));
                continue;
            }
            if let Some(sub) = match_checkbox(body) {
                if indent_width(sub.indent) > card_indent {
                    card.subtasks.push(Subtask {
                        id: self.ids.allocate(),
                        text: sub.text.trim().to_string(),
                        completed: sub.completed,
                    });
                    subtask_lines.push(offset);
                }
            }
        }
        if !notes.is_empty() {
            card.notes = Some(notes.join("\n"));
        }
        if !block.is_empty() {
            card.content = Some(block.concat());
        }

        let snapshot = Box::new(card.clone());
        card.source = Retained::new(CardSource {
            indent: checkbox.indent.to_string(),
            line: raw.to_string(),
            mark_offset: checkbox.indent.len() + 3,
            id_generated,
            metadata_tokens,
            snapshot,
            subtask_lines,
            trailer: String::new(),
        });

        Some((card, end - 1))
    }
}

/// Push `eol` unless `out` is empty or already ends a line.
pub(crate) fn ensure_line_break(out: &mut String, eol: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str(eol);
    }
}

/// Write one card, its content block and any retained trailing text.
pub fn write_card(card: &Card, out: &mut String, eol: &str) -> Result<(), FormatError> {
    if card.id.trim().is_empty() {
        return Err(FormatError::MissingCardId {
            title: card.title.clone(),
        });
    }
    let source = card.source();
    ensure_line_break(out, eol);
    write_line(card, source, out, eol);
    write_block(card, source, out, eol);
    if let Some(src) = source {
        if !src.trailer.is_empty() {
            ensure_line_break(out, eol);
            out.push_str(&src.trailer);
        }
    }
    Ok(())
}

fn line_fields_eq(a: &Card, b: &Card) -> bool {
    a.id == b.id
        && a.title == b.title
        && a.tags == b.tags
        && a.due_date == b.due_date
        && a.due_time == b.due_time
        && a.recurrence == b.recurrence
        && a.reminder == b.reminder
        && a.note_path == b.note_path
        && a.metadata == b.metadata
}

/// Parsed lines keep their own terminator, so a last line without one
/// stays that way.
fn write_line(card: &Card, source: Option<&CardSource>, out: &mut String, eol: &str) {
    let Some(src) = source else {
        out.push_str(&render_line(card, ""));
        out.push_str(eol);
        return;
    };
    let body = line_body(&src.line);
    let terminator = &src.line[body.len()..];

    if line_fields_eq(card, &src.snapshot) {
        let mut line = body.to_string();
        if card.completed != src.snapshot.completed {
            let mark = if card.completed { "x" } else { " " };
            line.replace_range(src.mark_offset..src.mark_offset + 1, mark);
        }
        if src.id_generated {
            line.push_str(" ^");
            line.push_str(&card.id);
        }
        out.push_str(&line);
    } else {
        out.push_str(&render(card, &src.indent, Some(src)));
    }
    out.push_str(terminator);
}

/// Regenerate a card line from the model. Structured fields are appended
/// only when the title does not already carry them.
pub fn render_line(card: &Card, indent: &str) -> String {
    render(card, indent, None)
}

fn render(card: &Card, indent: &str, source: Option<&CardSource>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !card.title.is_empty() {
        parts.push(card.title.clone());
    }
    for tag in &card.tags {
        if !tags::contains_tag(&card.title, tag) {
            parts.push(format!("#{}", tag));
        }
    }
    push_metadata(card, source, &mut parts);
    if let Some(path) = &card.note_path {
        parts.push(format!("[{}::{}]", metadata::NOTE_KEY, path));
    }
    if let Some(due) = date::format_due(card.due_date, card.due_time) {
        parts.push(due);
    }
    if let Some(rule) = &card.recurrence {
        parts.push(rule.to_token());
    }
    if let Some(reminder) = &card.reminder {
        parts.push(format!("[remind::{}]", reminder));
    }
    parts.push(format!("^{}", card.id));

    let mark = if card.completed { 'x' } else { ' ' };
    format!("{}- [{}] {}", indent, mark, parts.join(" "))
}

/// Metadata tokens in their source order. Unchanged keys keep every raw
/// token, repeats included; a changed key is rewritten once at its first
/// position; keys new to the card go last.
fn push_metadata(card: &Card, source: Option<&CardSource>, parts: &mut Vec<String>) {
    let in_title = |key: &str| card.title.contains(&format!("{}::", key));
    let mut written: HashSet<&str> = HashSet::new();

    if let Some(src) = source {
        for (key, raw) in &src.metadata_tokens {
            let Some(value) = card.metadata.get(key) else {
                continue;
            };
            if in_title(key) {
                continue;
            }
            if src.snapshot.metadata.get(key) == Some(value) {
                parts.push(raw.clone());
                written.insert(key);
            } else if written.insert(key) {
                parts.push(format!("[{}::{}]", key, metadata::encode_value(key, value)));
            }
        }
    }

    for (key, value) in &card.metadata {
        if !written.contains(key.as_str()) && !in_title(key) {
            parts.push(format!("[{}::{}]", key, metadata::encode_value(key, value)));
        }
    }
}

fn write_block(card: &Card, source: Option<&CardSource>, out: &mut String, eol: &str) {
    let snapshot = source.map(|src| &*src.snapshot);
    let content_edited = match snapshot {
        Some(snap) => card.content != snap.content,
        None => card.content.is_some(),
    };

    if content_edited {
        if let Some(content) = card.content.as_deref().filter(|c| !c.is_empty()) {
            ensure_line_break(out, eol);
            out.push_str(content);
            ensure_line_break(out, eol);
        }
        return;
    }

    if let (Some(src), Some(snap)) = (source, snapshot) {
        if card.notes == snap.notes {
            if card.subtasks == snap.subtasks {
                if let Some(content) = &card.content {
                    ensure_line_break(out, eol);
                    out.push_str(content);
                }
                return;
            }
            if card.subtasks.len() == snap.subtasks.len() {
                if let Some(content) = &card.content {
                    ensure_line_break(out, eol);
                    out.push_str(&patch_subtasks(content, card, src));
                    return;
                }
            }
        }
    }

    let indent = format!(
        "{}{}",
        source.map_or("", |src| src.indent.as_str()),
        BLOCK_INDENT
    );
    let mut block = String::new();
    if let Some(notes) = &card.notes {
        for line in notes.lines() {
            block.push_str(&format!("{}> {}{}", indent, line, eol));
        }
    }
    for sub in &card.subtasks {
        let mark = if sub.completed { 'x' } else { ' ' };
        block.push_str(&format!("{}- [{}] {}{}", indent, mark, sub.text, eol));
    }
    if !block.is_empty() {
        ensure_line_break(out, eol);
        out.push_str(&block);
    }
}

/// Rewrite only the subtask lines that changed, keeping their indentation
/// and line terminators.
fn patch_subtasks(content: &str, card: &Card, src: &CardSource) -> String {
    let mut lines: Vec<String> = split_lines(content).into_iter().map(String::from).collect();
    for ((current, before), &at) in card
        .subtasks
        .iter()
        .zip(&src.snapshot.subtasks)
        .zip(&src.subtask_lines)
    {
        if current == before {
            continue;
        }
        let Some(line) = lines.get_mut(at) else {
            continue;
        };
        let body = line_body(line);
        let terminator = &line[body.len()..];
        let indent = &body[..body.len() - body.trim_start().len()];
        let mark = if current.completed { 'x' } else { ' ' };
        *line = format!("{}- [{}] {}{}", indent, mark, current.text, terminator);
    }
    lines.concat()
}
