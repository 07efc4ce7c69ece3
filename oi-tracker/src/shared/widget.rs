//! Ratatui rendering of the tracker: header, search box with match list, card grid

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::cards::Card;
use super::events::SessionEvent;
use super::format::{format_change, format_number, format_price, format_time, format_usdt};
use super::ratio::{classify, Severity, BAR_TICKS};
use super::search::{badge, SearchBox};
use super::session::SessionSnapshot;
use super::types::{CardMetrics, CardState, GlobalStatus};

const C_BUY: Color = Color::Rgb(100, 220, 100);
const C_SELL: Color = Color::Rgb(220, 100, 100);
const C_NEUTRAL: Color = Color::Rgb(180, 180, 100);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);
const C_HIGHLIGHT_BG: Color = Color::Rgb(40, 60, 80);

/// How long a freshly loaded card stays highlighted
pub const FLASH_DURATION: Duration = Duration::from_millis(800);

/// Tick positions under the ratio bar, as bar fractions
const TICK_POSITIONS: [f64; 5] = [0.0, 0.2, 0.4, 0.6, 1.0];

const DROPDOWN_MAX_ROWS: usize = 10;

/// Which part of the screen takes key input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Search,
    Cards,
}

/// Presentation-only state: focus, selected card, load flashes
#[derive(Debug, Clone)]
pub struct ViewState {
    pub focus: Focus,
    pub selected_card: usize,
    flashes: HashMap<String, Instant>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            focus: Focus::Search,
            selected_card: 0,
            flashes: HashMap::new(),
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// React to a session event. Cards that just turned `Loaded` start flashing.
    pub fn observe(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot, now: Instant) {
        match event {
            SessionEvent::CardStateChanged { symbol } => {
                let loaded = snapshot
                    .card(symbol)
                    .map(|card| card.state.is_loaded())
                    .unwrap_or(false);
                if loaded {
                    self.flashes.insert(symbol.clone(), now);
                }
            }
            SessionEvent::TrackedSetChanged { symbols } => {
                self.flashes.retain(|symbol, _| symbols.contains(symbol));
                self.clamp_selection(symbols.len());
            }
            SessionEvent::CountdownTicked { .. } | SessionEvent::GlobalStatusChanged { .. } => {}
        }
    }

    pub fn is_flashing(&self, symbol: &str, now: Instant) -> bool {
        self.flashes
            .get(symbol)
            .map(|at| now.saturating_duration_since(*at) < FLASH_DURATION)
            .unwrap_or(false)
    }

    /// Drop expired flashes
    pub fn prune(&mut self, now: Instant) {
        self.flashes
            .retain(|_, at| now.saturating_duration_since(*at) < FLASH_DURATION);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Search => Focus::Cards,
            Focus::Cards => Focus::Search,
        };
    }

    pub fn select_next(&mut self, card_count: usize) {
        if card_count > 0 && self.selected_card + 1 < card_count {
            self.selected_card += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected_card = self.selected_card.saturating_sub(1);
    }

    pub fn clamp_selection(&mut self, card_count: usize) {
        self.selected_card = self.selected_card.min(card_count.saturating_sub(1));
    }
}

/// Render the whole tracker screen
pub fn render_tracker(
    f: &mut Frame,
    snapshot: &SessionSnapshot,
    search: &SearchBox,
    view: &ViewState,
    now: Instant,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, chunks[0], snapshot);
    render_search(f, chunks[1], search, snapshot, view.focus == Focus::Search);
    render_cards(f, chunks[2], snapshot, view, now);
    render_footer(f, chunks[3], view.focus);

    if search.is_open() {
        render_dropdown(f, chunks[2], search);
    }
}

fn status_color(status: GlobalStatus) -> Color {
    match status {
        GlobalStatus::Active => C_BUY,
        GlobalStatus::Loading => C_NEUTRAL,
        GlobalStatus::Error => C_SELL,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::NotAvailable => C_DIM,
        Severity::Low => C_BUY,
        Severity::Mid => C_NEUTRAL,
        Severity::High => C_SELL,
    }
}

fn render_header(f: &mut Frame, area: Rect, snapshot: &SessionSnapshot) {
    let block = Block::default()
        .title(" OI TRACKER ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let countdown_color = if snapshot.urgent { C_SELL } else { C_BRIGHT };
    let line = Line::from(vec![
        Span::styled("● ", Style::default().fg(status_color(snapshot.status))),
        Span::styled(
            snapshot.status_label(),
            Style::default()
                .fg(status_color(snapshot.status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   NEXT ", Style::default().fg(C_DIM)),
        Span::styled(
            format!("{:>2}s ", snapshot.countdown),
            Style::default()
                .fg(countdown_color)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            ratio_bar(snapshot.fraction, 20),
            Style::default().fg(countdown_color),
        ),
        Span::styled("   SLOTS ", Style::default().fg(C_DIM)),
        Span::styled(
            format!("{}/{}", snapshot.cards.len(), snapshot.capacity),
            Style::default().fg(if snapshot.is_full() { C_NEUTRAL } else { C_BRIGHT }),
        ),
    ]);
    f.render_widget(Paragraph::new(line), inner);
}

fn render_search(
    f: &mut Frame,
    area: Rect,
    search: &SearchBox,
    snapshot: &SessionSnapshot,
    focused: bool,
) {
    let block = Block::default()
        .title(" SEARCH ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { C_ACCENT } else { C_DIM }));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut spans = vec![
        Span::styled("> ", Style::default().fg(C_DIM)),
        Span::styled(search.input().to_string(), Style::default().fg(C_BRIGHT)),
    ];
    if focused {
        spans.push(Span::styled("█", Style::default().fg(C_ACCENT)));
    }

    if let Some(selected) = search.selected() {
        let (hint, color) = if search.can_add(snapshot) {
            ("  [Enter] add", C_BUY)
        } else if snapshot.is_tracked(&selected.symbol) {
            ("  already tracked", C_DIM)
        } else {
            ("  all slots used", C_NEUTRAL)
        };
        spans.push(Span::styled(hint, Style::default().fg(color)));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

fn render_dropdown(f: &mut Frame, body: Rect, search: &SearchBox) {
    let rows = search.matches().len().clamp(1, DROPDOWN_MAX_ROWS);
    let width = body.width.min(40);
    let area = Rect {
        x: body.x + 1,
        y: body.y,
        width: width.saturating_sub(1),
        height: (rows as u16 + 2).min(body.height),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    if search.no_results() {
        let line = Line::from(Span::styled(
            format!("No results: {}", search.query()),
            Style::default().fg(C_DIM),
        ));
        f.render_widget(Paragraph::new(line), inner);
        return;
    }

    // Keep the highlighted match in view
    let offset = search
        .highlighted()
        .map(|i| (i + 1).saturating_sub(rows))
        .unwrap_or(0);

    let lines: Vec<Line> = search
        .matches()
        .iter()
        .enumerate()
        .skip(offset)
        .take(rows)
        .map(|(i, descriptor)| {
            let highlighted = search.highlighted() == Some(i);
            let base = if highlighted {
                Style::default().bg(C_HIGHLIGHT_BG)
            } else {
                Style::default()
            };
            let badge_color = if descriptor.supported { C_ACCENT } else { C_DIM };
            Line::from(vec![
                Span::styled(
                    format!("{:<16}", descriptor.symbol),
                    base.fg(C_BRIGHT).add_modifier(Modifier::BOLD),
                ),
                Span::styled(badge(descriptor), base.fg(badge_color)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_cards(f: &mut Frame, area: Rect, snapshot: &SessionSnapshot, view: &ViewState, now: Instant) {
    if snapshot.cards.is_empty()
        && snapshot.status == GlobalStatus::Loading
        && !snapshot.refreshing
    {
        let hint = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Connecting to the market API...",
                Style::default().fg(C_NEUTRAL).add_modifier(Modifier::BOLD),
            )),
        ];
        f.render_widget(Paragraph::new(hint).alignment(Alignment::Center), area);
        return;
    }

    if snapshot.cards.is_empty() {
        let hint = vec![
            Line::from(""),
            Line::from(Span::styled(
                "No symbols tracked",
                Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!(
                    "Search a futures symbol above and press Enter to add it (up to {})",
                    snapshot.capacity
                ),
                Style::default().fg(C_DIM),
            )),
        ];
        f.render_widget(Paragraph::new(hint).alignment(Alignment::Center), area);
        return;
    }

    // Two per row once there are more than two cards
    let per_row = if snapshot.cards.len() > 2 { 2 } else { snapshot.cards.len() };
    let row_count = snapshot.cards.len().div_ceil(per_row);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, row_count as u32); row_count])
        .split(area);

    for (row_index, row_area) in rows.iter().enumerate() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, per_row as u32); per_row])
            .split(*row_area);

        for (column, cell) in columns.iter().enumerate() {
            let index = row_index * per_row + column;
            if let Some(card) = snapshot.cards.get(index) {
                let selected = view.focus == Focus::Cards && view.selected_card == index;
                let flashing = view.is_flashing(&card.entry.symbol, now);
                render_card(f, *cell, card, selected, flashing);
            }
        }
    }
}

fn render_card(f: &mut Frame, area: Rect, card: &Card, selected: bool, flashing: bool) {
    let border_color = if selected {
        C_ACCENT
    } else if flashing {
        C_BUY
    } else {
        C_DIM
    };

    let block = Block::default()
        .title(Line::from(vec![
            Span::styled(
                format!(" {} ", card.entry.symbol),
                Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
            ),
            Span::styled("FUTURES ", Style::default().fg(C_ACCENT)),
        ]))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines = match &card.state {
        CardState::Loading { previous: None } => vec![Line::from(Span::styled(
            "Loading...",
            Style::default().fg(C_DIM),
        ))],
        CardState::Loading {
            previous: Some(metrics),
        } => metric_lines(metrics, inner.width as usize, true),
        CardState::Loaded(metrics) => metric_lines(metrics, inner.width as usize, false),
        CardState::Error(message) => vec![
            Line::from(Span::styled(
                "No data",
                Style::default().fg(C_SELL).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(message.clone(), Style::default().fg(C_DIM))),
        ],
    };

    let mut paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    if card.state.is_loading() {
        paragraph = paragraph.style(Style::default().add_modifier(Modifier::DIM));
    }
    f.render_widget(paragraph, inner);
}

fn metric_lines(metrics: &CardMetrics, width: usize, refreshing: bool) -> Vec<Line<'static>> {
    let change_color = if metrics.change_pct >= 0.0 { C_BUY } else { C_SELL };
    let signal = classify(metrics.oi_supply_ratio);
    let signal_color = severity_color(signal.severity);
    let bar_width = width.saturating_sub(2).max(10);

    let row = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<11}", label), Style::default().fg(C_DIM)),
            Span::styled(value, Style::default().fg(C_BRIGHT)),
        ])
    };

    let mut updated = format!("UPDATED {}", format_time(metrics.fetched_at));
    if refreshing {
        updated.push_str("  refreshing");
    }

    vec![
        Line::from(vec![
            Span::styled(
                format_price(metrics.price),
                Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", format_change(metrics.change_pct)),
                Style::default().fg(change_color),
            ),
        ]),
        row("OI", format_number(Some(metrics.open_interest))),
        row("OI USDT", format_usdt(Some(metrics.open_interest_usdt))),
        row("SUPPLY", format_number(metrics.circulating_supply)),
        row("VOL 24H", format_usdt(Some(metrics.volume_usdt))),
        Line::from(""),
        Line::from(vec![
            Span::styled(format!("{:<11}", "OI/SUPPLY"), Style::default().fg(C_DIM)),
            Span::styled(
                signal.display_text.clone(),
                Style::default().fg(signal_color).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(
            ratio_bar(signal.bar_fraction, bar_width),
            Style::default().fg(signal_color),
        )),
        Line::from(Span::styled(tick_row(bar_width), Style::default().fg(C_DIM))),
        Line::from(Span::styled(
            signal.severity.signal_text(),
            Style::default().fg(signal_color),
        )),
        Line::from(Span::styled(updated, Style::default().fg(C_DIM))),
    ]
}

fn render_footer(f: &mut Frame, area: Rect, focus: Focus) {
    let hint = match focus {
        Focus::Search => "type to search  ↑/↓ move  Enter select/add  Esc close  Tab cards  Ctrl+C quit",
        Focus::Cards => "←/→ select  r refresh  d remove  Tab search  q quit",
    };
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(hint, Style::default().fg(C_DIM)))),
        area,
    );
}

/// Filled bar of `width` cells for a fraction in [0, 1]
fn ratio_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Tick labels spread under a bar of `width` cells
fn tick_row(width: usize) -> String {
    let mut row = vec![' '; width];
    let mut next_free = 0;

    for (label, fraction) in BAR_TICKS.iter().zip(TICK_POSITIONS) {
        let len = label.chars().count();
        let start = ((fraction * width as f64) as usize)
            .min(width.saturating_sub(len))
            .max(next_free);
        if start + len > width {
            break;
        }
        for (i, ch) in label.chars().enumerate() {
            row[start + i] = ch;
        }
        next_free = start + len + 1;
    }
    row.into_iter().collect()
}
