use chrono::Local;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode, StatusLevel};
use crate::model::{ConnectivityState, VCluster};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.context_picker_items().is_some() {
        render_context_picker(frame, app);
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    let mut left = Vec::new();
    push_powerline_segment(&mut left, " vcluster-desk ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut left,
        format!(" ctx {} ", compact_text(&state.extension_context, 28)),
        Color::White,
        PL_B,
        PL_C,
    );
    let host = if state.host_context.is_empty() {
        "?".to_string()
    } else {
        compact_text(&state.host_context, 28)
    };
    push_powerline_segment(
        &mut left,
        format!(" host {host} "),
        Color::White,
        PL_C,
        BG,
    );

    let mut right = Vec::new();
    let (badge_fg, badge_bg) = connectivity_colors(state.connectivity);
    push_powerline_segment_rtl(
        &mut right,
        format!(" {} ", state.connectivity.label()),
        badge_fg,
        badge_bg,
        BG,
    );

    let right_width = spans_width(&right) as u16;
    if area.width < 42 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(Line::from(left)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(left)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right)).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn connectivity_colors(state: ConnectivityState) -> (Color, Color) {
    match state {
        ConnectivityState::Connected => (Color::Black, ACCENT),
        ConnectivityState::Disconnected => (Color::Black, ERROR),
        ConnectivityState::Probing => (Color::Black, WARN),
        ConnectivityState::Unknown => (Color::White, PANEL),
    }
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    if state.connectivity == ConnectivityState::Disconnected {
        let text = format!(
            "Kubernetes is not reachable through context {}.\n\n\
             Start the cluster or press x to pick another context.",
            state.extension_context
        );
        render_message(frame, area, "Unreachable", &text, ERROR);
        return;
    }

    let Some(vclusters) = state.vclusters.as_deref() else {
        render_message(
            frame,
            area,
            "vclusters",
            "Waiting for the first refresh…",
            MUTED,
        );
        return;
    };

    let headers = ["NAME", "NAMESPACE", "STATUS", "AGE"];
    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(*header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let now = Local::now();
    let rows = vclusters.iter().map(|vc| {
        Row::new(vec![
            Cell::from(vc.name.clone()).style(Style::default().fg(Color::White)),
            Cell::from(vc.namespace.clone()).style(Style::default().fg(Color::White)),
            Cell::from(vc.status.clone()).style(Style::default().fg(status_color(vc))),
            Cell::from(vc.age(now)).style(Style::default().fg(MUTED)),
        ])
    });

    let title = match app.last_refresh() {
        Some(at) => format!(
            "vclusters ({})  namespaces: {}  updated {at}",
            vclusters.len(),
            state.namespaces.len()
        ),
        None => format!("vclusters ({})", vclusters.len()),
    };
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Percentage(20),
            Constraint::Percentage(15),
        ],
    )
    .header(header_row)
    .block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(ACCENT))
            .style(Style::default().bg(PANEL)),
    )
    .column_spacing(1)
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(24, 36, 58))
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    let mut table_state = TableState::default();
    table_state.select(app.selected_index());
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn status_color(vc: &VCluster) -> Color {
    if vc.is_paused() {
        WARN
    } else if vc.status.eq_ignore_ascii_case("running") {
        ACCENT
    } else {
        MUTED
    }
}

fn render_message(frame: &mut Frame, area: Rect, title: &str, text: &str, color: Color) {
    let panel = Paragraph::new(Text::from(text.to_string()))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(color));
    frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    if app.mode() == InputMode::Command {
        push_powerline_segment(&mut spans, " cmd ", Color::Black, WARN, BG);
        spans.push(Span::styled(
            format!(" :{}", app.input()),
            Style::default().fg(Color::White).bg(BG),
        ));
        spans.push(Span::styled("█", Style::default().fg(ACCENT).bg(BG)));
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let (status_fg, status_bg) = if app.pending_confirmation_prompt().is_some() {
        (Color::Black, WARN)
    } else {
        match app.status_level() {
            StatusLevel::Info => (Color::White, PL_B),
            StatusLevel::Success => (Color::Black, ACCENT),
            StatusLevel::Error => (Color::Black, ERROR),
        }
    };
    push_powerline_segment(&mut spans, " nrm ", Color::White, PL_A, status_bg);
    let width_hint = area.width.saturating_sub(12) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(app.status(), width_hint.max(16))),
        status_fg,
        status_bg,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_context_picker(frame: &mut Frame, app: &App) {
    let Some((contexts, selected)) = app.context_picker_items() else {
        return;
    };
    let area = centered_rect(50, 50, frame.area());
    frame.render_widget(Clear, area);

    let active = &app.state().extension_context;
    let rows = contexts.iter().map(|context| {
        let marker = if context == active { "●" } else { " " };
        Row::new(vec![
            Cell::from(marker).style(Style::default().fg(ACCENT)),
            Cell::from(context.clone()).style(Style::default().fg(Color::White)),
        ])
    });
    let table = Table::new(rows, [Constraint::Length(2), Constraint::Min(1)])
        .block(
            Block::default()
                .title("Extension context (Enter switch, Esc cancel)")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    state.select(Some(selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "vcluster-desk help  context:{}  connectivity:{}",
            app.state().extension_context,
            app.state().connectivity
        )),
        Line::from(""),
    ];
    for line in help_lines() {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn help_lines() -> [&'static str; 12] {
    [
        "j/k or arrows  move selection      g/G  first/last",
        "p  pause       u  resume           d  delete (asks first)",
        "c  connect     C  disconnect       r  refresh now",
        "a  create      U  upgrade selected x  pick extension context",
        ":  command line                    q  quit",
        "",
        "Commands:",
        "  create <name> [namespace] [--distro D] [--chart-version V] [--values FILE]",
        "  upgrade <name> [namespace] [--chart-version V] [--values FILE]",
        "  ctx [context]       switch context, or list contexts without an argument",
        "  disconnect [namespace]",
        "  refresh | quit",
    ]
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{compact_text, render};
    use crate::app::App;
    use crate::model::{ConnectivityState, Snapshot, VCluster};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).expect("test terminal");
        terminal
            .draw(|frame| render(frame, app))
            .expect("frame renders");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("docker-desktop", 20), "docker-desktop");
        assert_eq!(compact_text("docker-desktop", 7), "docker…");
        assert_eq!(compact_text("abc", 1), "…");
    }

    #[test]
    fn table_lists_vclusters_under_active_context() {
        let mut app = App::new("docker-desktop".to_string());
        app.apply_connectivity("docker-desktop", ConnectivityState::Connected);
        app.apply_refresh(Ok(Some(Snapshot {
            extension_context: "docker-desktop".to_string(),
            host_context: "kind-dev".to_string(),
            vclusters: vec![VCluster {
                name: "demo".to_string(),
                namespace: "vcluster-demo".to_string(),
                status: "Running".to_string(),
                age_seconds: 65,
                ..VCluster::default()
            }],
            namespaces: vec!["default".to_string()],
        })));

        let text = screen(&app);
        assert!(text.contains("docker-desktop"));
        assert!(text.contains("vcluster-demo"));
        assert!(text.contains("1m5s"));
        assert!(text.contains("connected"));
    }

    #[test]
    fn unreachable_cluster_shows_message() {
        let mut app = App::new("kind-dev".to_string());
        app.apply_connectivity("kind-dev", ConnectivityState::Disconnected);
        let text = screen(&app);
        assert!(text.contains("Unreachable"));
        assert!(text.contains("unreachable"));
    }
}
