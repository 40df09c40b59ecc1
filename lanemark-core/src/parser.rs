/// Board assembler and serializer.
///
/// Handles the document format:
///   --- header (must contain kanban-plugin: basic) ---
///   ## Lane Title ^laneid
///   - [ ] Card title ^cardid
///     indented content
///   ## Archive
///   %% kanban:settings ... %%
///
/// `parse` never fails; anything it does not recognize is carried as raw
/// text and written back where it was found.
use thiserror::Error;

use crate::card::{self, ensure_line_break, CardParser};
use crate::config::ParseOptions;
use crate::ids::{HashedIds, IdAllocator};
use crate::segment::{self, line_body, split_lines, HEADING_PREFIX, SETTINGS_OPEN};
use crate::types::{
    Board, BoardLayout, BoardSettings, Card, Lane, LaneSource, Retained, MARKER_KEY, MARKER_VALUE,
};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("card {title:?} has no identifier")]
    MissingCardId { title: String },
    #[error("settings encode failed: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Parse with default options and hashed identifiers.
pub fn parse(text: &str) -> Board {
    parse_with(text, &ParseOptions::default(), &mut HashedIds)
}

pub fn parse_with(text: &str, options: &ParseOptions, ids: &mut dyn IdAllocator) -> Board {
    let lines = split_lines(text);
    let seg = segment::segment(&lines);
    let eol = dominant_eol(&lines);

    let mut board = Board::default();
    let mut layout = BoardLayout {
        crlf: eol == "\r\n",
        ..Default::default()
    };

    let header = seg.header.clone().map(|r| lines[r].concat());
    board.header = Some(match header {
        Some(raw) => inject_marker(&raw, eol),
        None => default_header(eol),
    });
    board.header_content = lines[seg.header_content.clone()].concat();

    let mut parser = CardParser::new(options, ids);
    let last = seg.sections.len().checked_sub(1);
    for (n, section) in seg.sections.iter().enumerate() {
        let body = &lines[section.body.clone()];
        let (preamble, cards, mut epilogue) = parse_section(&mut parser, body);
        if Some(n) == last {
            board.pre_settings_content = std::mem::take(&mut epilogue);
        }

        let archive = section.archive && layout.archive.is_none();
        let id = match (&section.id, archive) {
            (Some(id), _) => id.clone(),
            (None, true) => String::new(),
            (None, false) => parser.ids().allocate(),
        };
        let source = LaneSource {
            heading: lines[section.heading].to_string(),
            title: section.title.clone(),
            id: id.clone(),
            id_generated: section.id.is_none() && !archive,
            preamble,
            epilogue,
        };

        if archive {
            board.archive = cards;
            layout.archive_index = board.lanes.len();
            layout.archive = Some(source);
        } else {
            board.lanes.push(Lane {
                id,
                title: section.title.clone(),
                cards,
                source: Retained::new(source),
            });
        }
    }

    if let Some(block) = &seg.settings {
        let raw = lines[block.lines.clone()].concat();
        let settings = decode_settings(&block.json);
        board.settings = settings.clone();
        layout.settings_block = Some((raw, settings));
    }
    board.footer_content = lines[seg.footer.clone()].concat();
    board.layout = Retained::new(layout);

    log::debug!(
        "[lanemark.parser] parsed {} lanes, {} archived cards",
        board.lanes.len(),
        board.archive.len()
    );
    board
}

/// Cards of one section plus the loose text around them: text before the
/// first card, text between cards (kept on the preceding card) and text
/// after the last card.
fn parse_section(parser: &mut CardParser<'_>, body: &[&str]) -> (String, Vec<Card>, String) {
    let mut cards: Vec<Card> = Vec::new();
    let mut preamble = String::new();
    let mut loose_start = 0;
    let mut i = 0;

    while i < body.len() {
        if !card::is_card_line(line_body(body[i])) {
            i += 1;
            continue;
        }
        let Some((card, last)) = parser.parse(body, i) else {
            i += 1;
            continue;
        };
        let loose = body[loose_start..i].concat();
        match cards.last_mut().and_then(|prev| prev.source.get_mut()) {
            Some(prev) => prev.trailer = loose,
            None => preamble = loose,
        }
        cards.push(card);
        i = last + 1;
        loose_start = i;
    }

    let rest = body[loose_start..].concat();
    if cards.is_empty() {
        (rest, cards, String::new())
    } else {
        (preamble, cards, rest)
    }
}

/// Settings JSON; anything unreadable decodes to an empty record.
fn decode_settings(json: &str) -> BoardSettings {
    if json.trim().is_empty() {
        return BoardSettings::default();
    }
    match serde_json::from_str::<BoardSettings>(json) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("[lanemark.parser.settings] Ignoring invalid settings block: {}", e);
            BoardSettings::default()
        }
    }
}

fn dominant_eol(lines: &[&str]) -> &'static str {
    let terminated = lines.iter().filter(|l| l.ends_with('\n')).count();
    let crlf = lines.iter().filter(|l| l.ends_with("\r\n")).count();
    if crlf > 0 && crlf * 2 >= terminated {
        "\r\n"
    } else {
        "\n"
    }
}

fn default_header(eol: &str) -> String {
    format!("---{eol}{MARKER_KEY}: {MARKER_VALUE}{eol}---{eol}")
}

/// Insert the marker line after the opening `---` unless a header line
/// already carries the marker key. Other lines are left untouched.
fn inject_marker(header: &str, eol: &str) -> String {
    let lines = split_lines(header);
    let has_marker = lines.iter().skip(1).any(|line| {
        line_body(line)
            .split_once(':')
            .is_some_and(|(key, _)| key.trim() == MARKER_KEY)
    });
    if has_marker {
        return header.to_string();
    }
    let mut out = String::with_capacity(header.len() + 32);
    if let Some((open, rest)) = lines.split_first() {
        out.push_str(open);
        ensure_line_break(&mut out, eol);
        out.push_str(&format!("{MARKER_KEY}: {MARKER_VALUE}{eol}"));
        out.push_str(&rest.concat());
    }
    out
}

/// Ensure the output ends with an empty line.
fn ensure_blank_line(out: &mut String, eol: &str) {
    ensure_line_break(out, eol);
    if !out.is_empty() && !out.ends_with("\n\n") && !out.ends_with("\n\r\n") {
        out.push_str(eol);
    }
}

/// Generate the document text for a board.
pub fn serialize(board: &Board) -> Result<String, FormatError> {
    let eol = board.eol();
    let layout = board.layout.get();
    let mut out = String::new();

    match &board.header {
        Some(header) => out.push_str(&inject_marker(header, eol)),
        None => out.push_str(&default_header(eol)),
    }
    push_raw(&mut out, &board.header_content, eol);

    let archive_source = layout.and_then(|l| l.archive.as_ref());
    let archive_title = archive_source.map_or("Archive", |src| src.title.as_str());
    let write_archive = !board.archive.is_empty() || archive_source.is_some();
    let archive_at = layout
        .filter(|l| l.archive.is_some())
        .map_or(board.lanes.len(), |l| l.archive_index)
        .min(board.lanes.len());

    for (n, lane) in board.lanes.iter().enumerate() {
        if write_archive && n == archive_at {
            write_section(&mut out, archive_title, None, archive_source, &board.archive, eol)?;
        }
        write_section(
            &mut out,
            &lane.title,
            Some(&lane.id),
            lane.source.get(),
            &lane.cards,
            eol,
        )?;
    }
    if write_archive && archive_at == board.lanes.len() {
        write_section(&mut out, archive_title, None, archive_source, &board.archive, eol)?;
    }

    push_raw(&mut out, &board.pre_settings_content, eol);
    write_settings(&mut out, board, layout, eol)?;
    push_raw(&mut out, &board.footer_content, eol);
    Ok(out)
}

fn push_raw(out: &mut String, raw: &str, eol: &str) {
    if !raw.is_empty() {
        ensure_line_break(out, eol);
        out.push_str(raw);
    }
}

fn write_section(
    out: &mut String,
    title: &str,
    id: Option<&str>,
    source: Option<&LaneSource>,
    cards: &[Card],
    eol: &str,
) -> Result<(), FormatError> {
    let unchanged = source.filter(|src| src.title == title && id.map_or(true, |id| src.id == id));
    match (unchanged, source) {
        (Some(src), _) => {
            ensure_line_break(out, eol);
            match id.filter(|_| src.id_generated) {
                Some(id) => {
                    let body = line_body(&src.heading);
                    out.push_str(&format!("{body} ^{id}"));
                    out.push_str(&src.heading[body.len()..]);
                }
                None => out.push_str(&src.heading),
            }
        }
        (None, Some(src)) => {
            ensure_line_break(out, eol);
            out.push_str(&heading_line(title, id));
            out.push_str(&src.heading[line_body(&src.heading).len()..]);
            ensure_line_break(out, eol);
        }
        (None, None) => {
            ensure_blank_line(out, eol);
            out.push_str(&heading_line(title, id));
            out.push_str(eol);
        }
    }

    match source {
        Some(src) => push_raw(out, &src.preamble, eol),
        None => out.push_str(eol),
    }
    for card in cards {
        card::write_card(card, out, eol)?;
    }
    match source {
        Some(src) => push_raw(out, &src.epilogue, eol),
        None => {
            ensure_line_break(out, eol);
            out.push_str(eol);
        }
    }
    Ok(())
}

fn heading_line(title: &str, id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => format!("{HEADING_PREFIX}{title} ^{id}"),
        _ => format!("{HEADING_PREFIX}{title}"),
    }
}

fn write_settings(
    out: &mut String,
    board: &Board,
    layout: Option<&BoardLayout>,
    eol: &str,
) -> Result<(), FormatError> {
    if let Some((raw, decoded)) = layout.and_then(|l| l.settings_block.as_ref()) {
        if *decoded == board.settings {
            push_raw(out, raw, eol);
            return Ok(());
        }
    }
    if board.settings.is_empty() {
        return Ok(());
    }
    let json = serde_json::to_string(&board.settings)?;
    ensure_blank_line(out, eol);
    out.push_str(&format!(
        "{SETTINGS_OPEN}{eol}```{eol}{json}{eol}```{eol}{close}{eol}",
        close = segment::SETTINGS_CLOSE
    ));
    Ok(())
}
