use std::time::Instant;

use charon_core::citation::{display_name, segments, Segment};
use charon_core::{ChatRole, Citation, Message, Selection};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, InputMode};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_page(app, frame, body_area);
    render_footer(app, frame, footer_area);

    // Palette sits above the chat
    if app.show_chat {
        render_chat(app, frame, body_area);
    }
    if app.show_palette {
        render_palette(app, frame, body_area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let activity = if app.chat.is_typing() {
        " answering"
    } else if app.chat.is_loading() {
        " thinking"
    } else if app.search.is_searching() {
        " searching"
    } else {
        ""
    };

    let title = Line::from(vec![
        Span::styled(" Charon ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(activity, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = if app.show_palette {
        &[("↑↓", "select"), ("Enter", "run"), ("Esc", "close")]
    } else if app.show_chat {
        match app.input_mode {
            InputMode::Editing => &[("Enter", "send"), ("Esc", "browse"), ("^X", "cancel"), ("^L", "clear")],
            InputMode::Normal => &[
                ("i", "type"),
                ("j/k", "refs"),
                ("Enter", "go to ref"),
                ("+/-", "rate"),
                ("Esc", "close"),
            ],
        }
    } else {
        &[("c", "chat"), ("^K", "commands"), ("j/k", "scroll"), ("q", "quit")]
    };

    let mut spans: Vec<Span> = Vec::new();
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {key} "), key_style));
        spans.push(Span::styled(format!(" {label} "), label_style));
    }
    if let Some(status) = &app.status {
        spans.push(Span::styled(format!("  {status}"), Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_page(app: &App, frame: &mut Frame, area: Rect) {
    let now = Instant::now();
    let mut lines: Vec<Line> = Vec::new();

    for section in app.page.sections().iter().skip(app.page.scroll()) {
        let indent = if section.nested { "    " } else { "" };
        let highlighted = app.page.is_highlighted(&section.anchor, now);

        let title_style = if highlighted {
            Style::default().bg(Color::Yellow).fg(Color::Black).add_modifier(Modifier::BOLD)
        } else if section.nested {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        };

        lines.push(Line::from(vec![
            Span::raw(indent),
            Span::styled(section.title.as_str(), title_style),
            Span::styled(format!("  #{}", section.anchor), Style::default().fg(Color::DarkGray)),
        ]));
        for body in &section.body {
            lines.push(Line::from(vec![Span::raw(indent), Span::raw(body.as_str())]));
        }
        lines.push(Line::default());
    }

    let page = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)))
        .wrap(Wrap { trim: false });
    frame.render_widget(page, area);
}

/// Split an answer into display lines, rendering markers as named links.
fn message_lines<'a>(content: &'a str, citations: &'a [Citation]) -> Vec<Line<'a>> {
    let marker_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED);
    let mut lines = Vec::new();
    let mut current: Vec<Span<'a>> = Vec::new();

    for segment in segments(content) {
        match segment {
            Segment::Text(text) => {
                let mut parts = text.split('\n');
                if let Some(first) = parts.next().filter(|p| !p.is_empty()) {
                    current.push(Span::raw(first));
                }
                for part in parts {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    if !part.is_empty() {
                        current.push(Span::raw(part));
                    }
                }
            }
            Segment::Marker { label, anchor } => {
                let name = display_name(&anchor, label, citations);
                current.push(Span::styled(format!("[{name}]"), marker_style));
            }
        }
    }
    lines.push(Line::from(current));
    lines
}

fn transcript_lines<'a>(app: &'a App) -> Vec<Line<'a>> {
    let mut lines: Vec<Line> = Vec::new();
    let revealing = app.chat.revealing_id();

    for message in app.chat.messages() {
        let is_revealing = revealing == Some(message.id.as_str());
        if message.content.is_empty() && !is_revealing {
            // placeholder still waiting for the answer
            continue;
        }
        lines.push(role_line(message));
        let mut body = message_lines(&message.content, message.citations());
        if is_revealing && app.animation_frame != 2 {
            if let Some(last) = body.last_mut() {
                last.spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
            }
        }
        lines.extend(body);
        lines.push(Line::default());
    }

    if app.chat.is_loading() && !app.chat.is_typing() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }
    lines
}

fn role_line(message: &Message) -> Line<'static> {
    let mut spans = match message.role {
        ChatRole::User => vec![Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )],
        ChatRole::Assistant => vec![Span::styled(
            "Charon:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )],
    };
    if message.failed {
        spans.push(Span::styled(" (incomplete)", Style::default().fg(Color::Red)));
    }
    Line::from(spans)
}

fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines.iter().map(|line| line.width().max(1).div_ceil(width)).sum();
    rows.min(u16::MAX as usize) as u16
}

fn centered(area: Rect, width_pct: u16, height_pct: u16) -> Rect {
    let width = area.width * width_pct / 100;
    let height = area.height * height_pct / 100;
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 80, 90);
    frame.render_widget(Clear, popup);

    let references = app.references();
    let refs_height = if references.is_empty() {
        0
    } else {
        (references.len().min(5) + 2) as u16 // +2 for borders
    };

    let [chat_area, refs_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(refs_height),
        Constraint::Length(3),
    ])
    .areas(popup);

    let lines = transcript_lines(app);
    let inner_height = chat_area.height.saturating_sub(2);
    let max_scroll = wrapped_height(&lines, chat_area.width.saturating_sub(2)).saturating_sub(inner_height);
    let scroll = if app.chat.is_loading() {
        max_scroll
    } else {
        app.chat_scroll.min(max_scroll)
    };

    let chat = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Ask Charon "),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(chat, chat_area);
    app.chat_scroll = scroll;

    if refs_height > 0 {
        let items: Vec<ListItem> = references
            .iter()
            .map(|(anchor, label)| {
                let on_page = charon_core::AnchorSurface::has_anchor(&app.page, anchor);
                let style = if on_page {
                    Style::default()
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(format!(" {label} ")).style(style)
            })
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::DarkGray))
                    .title(" References "),
            )
            .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, refs_area, &mut app.references_state);
    }

    let editing = app.input_mode == InputMode::Editing;
    let input_title = if app.chat.is_loading() { " Waiting for answer " } else { " Message " };
    let input = Paragraph::new(app.chat_input.as_str())
        .style(Style::default().fg(if app.chat.is_loading() { Color::DarkGray } else { Color::White }))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
                .title(input_title),
        );
    frame.render_widget(input, input_area);

    if editing {
        frame.set_cursor_position((
            input_area.x + app.chat_input.chars().count() as u16 + 1,
            input_area.y + 1,
        ));
    }
}

fn render_palette(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 60, 70);
    frame.render_widget(Clear, popup);

    let [input_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(popup);

    let title = if app.search.is_searching() { " Search… " } else { " Search " };
    let input = Paragraph::new(app.search.query())
        .style(Style::default().fg(Color::Cyan))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(title),
        );
    frame.render_widget(input, input_area);
    frame.set_cursor_position((
        input_area.x + app.search.query().chars().count() as u16 + 1,
        input_area.y + 1,
    ));

    let selected = match app.search.navigator().selection() {
        Selection::At(index) => Some(index),
        Selection::Empty => None,
    };

    // Group headers take rows too, so map the command index to a row.
    let mut items: Vec<ListItem> = Vec::new();
    let mut selected_row = None;
    let mut index = 0;
    for (category, members) in app.search.grouped() {
        items.push(ListItem::new(Line::from(Span::styled(
            category.title(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
        ))));
        for command in members {
            if selected == Some(index) {
                selected_row = Some(items.len());
            }
            let mut spans = vec![Span::raw(format!(" {} {}", command.icon, command.label))];
            if let Some(preview) = &command.preview {
                spans.push(Span::styled(format!("  {preview}"), Style::default().fg(Color::DarkGray)));
            }
            items.push(ListItem::new(Line::from(spans)));
            index += 1;
        }
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Commands ");

    if items.is_empty() {
        let empty = Paragraph::new(Span::styled("No results", Style::default().fg(Color::DarkGray))).block(block);
        frame.render_widget(empty, list_area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    app.palette_state.select(selected_row);
    frame.render_stateful_widget(list, list_area, &mut app.palette_state);
}
