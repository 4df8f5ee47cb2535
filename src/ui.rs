//! Terminal user interface with ratatui.

use crate::app::{App, Mode};
use crate::config::ColorConfig;
use crate::export::format_price;
use crate::models::{MatchField, MatchSpan, StockChart, Trend};
use num_format::{Locale, ToFormattedString};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Clear, Dataset, GraphType, List, ListItem, ListState,
        Paragraph, Wrap,
    },
};
use std::str::FromStr;

/// Colors for the UI.
pub struct UiColors {
    pub gain: Color,
    pub loss: Color,
    pub neutral: Color,
    pub header_bg: Color,
    pub selected_bg: Color,
    pub border: Color,
}

impl Default for UiColors {
    fn default() -> Self {
        Self {
            gain: Color::Rgb(0x0c, 0xf0, 0xa8),
            loss: Color::Rgb(0xe2, 0x36, 0x6f),
            neutral: Color::Gray,
            header_bg: Color::DarkGray,
            selected_bg: Color::Rgb(40, 40, 60),
            border: Color::DarkGray,
        }
    }
}

impl UiColors {
    /// Colors from config, keeping the default for any value that fails to parse.
    pub fn from_config(config: &ColorConfig) -> Self {
        let defaults = Self::default();
        let parse = |value: &str, fallback: Color| match Color::from_str(value) {
            Ok(color) => color,
            Err(_) => {
                tracing::warn!(value, "invalid color in config");
                fallback
            }
        };

        Self {
            gain: parse(&config.gain, defaults.gain),
            loss: parse(&config.loss, defaults.loss),
            neutral: parse(&config.neutral, defaults.neutral),
            border: parse(&config.border, defaults.border),
            ..defaults
        }
    }

    fn trend(&self, trend: Trend) -> Color {
        match trend {
            Trend::Up => self.gain,
            Trend::Down => self.loss,
            Trend::Flat => self.neutral,
        }
    }
}

/// Render the main UI.
pub fn render(frame: &mut Frame, app: &App, colors: &UiColors) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(3), // Input
            Constraint::Min(8),    // Suggestions or chart
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0], colors);
    render_input(frame, app, chunks[1], colors);

    if app.show_results {
        render_suggestions(frame, app, chunks[2], colors);
    } else {
        render_chart(frame, app, chunks[2], colors);
    }

    render_footer(frame, app, chunks[3], colors);

    if app.show_help {
        render_help_overlay(frame, colors);
    }

    if let Some(ref error) = app.error {
        render_error(frame, error, colors);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let status = match app.pending {
        Some(ref pending) => format!("{}...", pending),
        None => String::new(),
    };

    let header = Line::from(vec![
        Span::styled(
            " KYNOS ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "- {} S&P 500 tickers  ",
            app.catalog_len.to_formatted_string(&Locale::en)
        )),
        Span::styled(status, Style::default().fg(Color::Yellow)),
    ]);

    frame.render_widget(
        Paragraph::new(header).style(Style::default().bg(colors.header_bg)),
        area,
    );
}

fn render_input(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let title = match app.mode {
        Mode::Search => " Search by name or ticker ",
        Mode::Ask => " Ask, e.g. \"Microsoft last 90 days\" ",
    };

    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(colors.border)),
    );
    frame.render_widget(input, area);

    let cursor_x = area.x + 1 + app.input.chars().count() as u16;
    if cursor_x < area.right().saturating_sub(1) {
        frame.set_cursor_position((cursor_x, area.y + 1));
    }
}

/// Render the suggestion list with matched characters in bold.
fn render_suggestions(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let block = Block::default()
        .title(format!(" {} matches ", app.results.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors.border));

    if app.results.is_empty() {
        frame.render_widget(
            Paragraph::new("No matching companies").block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .results
        .iter()
        .map(|candidate| {
            let mut spans = highlighted_spans(
                &format!("{:<6}", candidate.record.symbol),
                candidate.spans(MatchField::Symbol),
                Style::default().fg(Color::Cyan),
            );
            spans.push(Span::raw("  "));
            spans.extend(highlighted_spans(
                &candidate.record.name,
                candidate.spans(MatchField::Name),
                Style::default(),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(colors.selected_bg))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(app.selected));

    frame.render_stateful_widget(list, area, &mut state);
}

fn highlighted_spans(text: &str, spans: &[MatchSpan], base: Style) -> Vec<Span<'static>> {
    highlight_segments(text, spans)
        .into_iter()
        .map(|(segment, matched)| {
            if matched {
                Span::styled(segment, base.add_modifier(Modifier::BOLD | Modifier::UNDERLINED))
            } else {
                Span::styled(segment, base)
            }
        })
        .collect()
}

/// Split `text` into runs, flagging the runs covered by `spans`.
///
/// Spans are inclusive character ranges; anything past the end of the text
/// is ignored.
pub fn highlight_segments(text: &str, spans: &[MatchSpan]) -> Vec<(String, bool)> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments: Vec<(String, bool)> = Vec::new();

    for (i, c) in chars.iter().enumerate() {
        let matched = spans.iter().any(|s| s.start <= i && i <= s.end);
        match segments.last_mut() {
            Some((run, flag)) if *flag == matched => run.push(*c),
            _ => segments.push((c.to_string(), matched)),
        }
    }

    segments
}

/// Render the chart panel: summary line plus a line chart of closes.
fn render_chart(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let Some(chart) = app.chart.as_ref() else {
        let hint = Paragraph::new(vec![
            Line::from(""),
            Line::from("Type a company name or ticker and press Enter to chart it."),
            Line::from("Press Tab to ask in plain English instead."),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.border)),
        )
        .wrap(Wrap { trim: true });
        frame.render_widget(hint, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    frame.render_widget(summary(chart, colors), chunks[0]);

    let Some((low, high)) = chart.close_range() else {
        frame.render_widget(
            Paragraph::new("No price data in this window").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(colors.border)),
            ),
            chunks[1],
        );
        return;
    };

    let points: Vec<(f64, f64)> = chart
        .series
        .iter()
        .enumerate()
        .map(|(i, bar)| (i as f64, bar.close))
        .collect();
    let last_x = points.len().saturating_sub(1) as f64;
    let pad = ((high - low) * 0.05).max(0.01);

    let first_date = chart.series.first().map(|b| b.date.to_string()).unwrap_or_default();
    let last_date = chart.series.last().map(|b| b.date.to_string()).unwrap_or_default();

    let dataset = Dataset::default()
        .name(chart.symbol.as_str())
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(colors.trend(chart.trend())))
        .data(&points);

    let widget = Chart::new(vec![dataset])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.border)),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(colors.neutral))
                .bounds([0.0, last_x.max(1.0)])
                .labels(vec![Span::raw(first_date), Span::raw(last_date)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(colors.neutral))
                .bounds([low - pad, high + pad])
                .labels(vec![
                    Span::raw(format_price(low)),
                    Span::raw(format_price((low + high) / 2.0)),
                    Span::raw(format_price(high)),
                ]),
        );

    frame.render_widget(widget, chunks[1]);
}

fn summary<'a>(chart: &'a StockChart, colors: &UiColors) -> Paragraph<'a> {
    let change = chart.percent_change();
    let change_color = colors.trend(chart.trend());

    let mut line = vec![
        Span::styled(
            format!("{} ", chart.symbol),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{}  ", chart.company_name)),
        Span::raw(format!("{}d  ", chart.days)),
    ];

    if let (Some(first), Some(last)) = (chart.first_close(), chart.last_close()) {
        line.push(Span::raw(format!(
            "{} → {}  ",
            format_price(first),
            format_price(last)
        )));
    }
    line.push(Span::styled(
        format!("{:+.2}%", change),
        Style::default()
            .fg(change_color)
            .add_modifier(Modifier::BOLD),
    ));

    Paragraph::new(Line::from(line)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(colors.border)),
    )
}

/// Render the footer with keybindings.
fn render_footer(frame: &mut Frame, app: &App, area: Rect, colors: &UiColors) {
    let footer = Line::from(vec![
        Span::styled(" Esc", Style::default().fg(Color::Yellow)),
        Span::raw(":quit "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(":mode "),
        Span::styled("↑↓", Style::default().fg(Color::Yellow)),
        Span::raw(":move "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(":select "),
        Span::styled("?", Style::default().fg(Color::Yellow)),
        Span::raw(":help "),
        Span::raw(format!("| {} | limit {}", app.mode.label(), app.limit())),
    ]);

    let footer_widget = Paragraph::new(footer).style(Style::default().bg(colors.header_bg));

    frame.render_widget(footer_widget, area);
}

/// Render help overlay.
fn render_help_overlay(frame: &mut Frame, colors: &UiColors) {
    let area = centered_rect(60, 60, frame.area());

    let help_text = vec![
        Line::from(Span::styled(
            "KYNOS HELP",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Search mode:"),
        Line::from("  type      Fuzzy match symbols and names"),
        Line::from("  ↑/↓       Move through suggestions"),
        Line::from("  Enter     Chart the highlighted company"),
        Line::from(""),
        Line::from("Ask mode:"),
        Line::from("  type      e.g. \"NVIDIA over the last 6 months\""),
        Line::from("  Enter     Send the question"),
        Line::from(""),
        Line::from("Everywhere:"),
        Line::from("  Tab       Switch search / ask"),
        Line::from("  Ctrl-U    Clear the input"),
        Line::from("  Ctrl-R    Reload the ticker catalog"),
        Line::from("  ?         Toggle help (empty input)"),
        Line::from("  Esc/^C    Quit"),
        Line::from(""),
        Line::from("Press any key to close"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.border)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
}

/// Render error message.
fn render_error(frame: &mut Frame, error: &str, colors: &UiColors) {
    let area = centered_rect(50, 20, frame.area());

    let error_widget = Paragraph::new(error)
        .block(
            Block::default()
                .title(" Error ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(colors.loss)),
        )
        .style(Style::default().fg(colors.loss))
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(error_widget, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
