use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Padding, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::{
    app::{canvas_rows, App, Game, Screen, HELP_BAR_ROWS, PALETTE, TOP_BAR_ROWS},
    canvas::{DrawingSurface, Rgb, CELL_HEIGHT_PX, CELL_WIDTH_PX},
    celebration::Celebration,
    session::{EndReason, SessionSummary},
};

const PANEL: Color = Color::Rgb(60, 63, 65);
const ACCENT: Color = Color::Rgb(0, 180, 255);
const ORANGE: Color = Color::Rgb(255, 140, 0);
const SOFT_RED: Color = Color::Rgb(255, 80, 80);
const GOLD: Color = Color::Rgb(255, 200, 0);
const TEXT: Color = Color::Rgb(220, 220, 220);

fn rgb(c: Rgb) -> Color {
    Color::Rgb(c.0, c.1, c.2)
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match &self.screen {
            Screen::Menu => render_menu(self, area, buf),
            Screen::Playing(game) => render_playing(self, game, area, buf),
            Screen::Ended(summary) => render_ended(self, summary, area, buf),
        }
    }
}

/// Rect of `width` x `height` centred in `area`, clipped to it.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_panel(lines: Vec<Line<'_>>, area: Rect, buf: &mut Buffer) {
    let width = lines.iter().map(|l| l.width()).max().unwrap_or(0) as u16 + 6;
    let height = lines.len() as u16 + 4;
    let panel = centered(area, width, height);

    Clear.render(panel, buf);
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .padding(Padding::vertical(1)),
        )
        .style(Style::default().bg(PANEL))
        .render(panel, buf);
}

fn render_menu(app: &App, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let lines = vec![
        Line::styled("Croquis IA", bold.fg(ACCENT)),
        Line::styled("Dessinez le mot avec la souris.", Style::default().fg(TEXT)),
        Line::styled(
            "[C] Effacer  [N] Noir  [R] Rouge  [V] Vert  [J] Jaune  [B] Bleu  [Q] Quitter",
            Style::default().fg(TEXT),
        ),
        Line::styled(
            format!(
                "Durée : {} secondes  ·  Mots : {} ({})",
                app.config.session_secs,
                app.vocabulary.len(),
                app.vocabulary.name
            ),
            Style::default().fg(TEXT),
        ),
        Line::styled("Appuyez sur [ESPACE] pour commencer", bold.fg(ORANGE)),
    ];
    render_panel(lines, area, buf);
}

fn render_playing(app: &App, game: &Game, area: Rect, buf: &mut Buffer) {
    let (_, canvas_height) = canvas_rows(area.height);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(TOP_BAR_ROWS),
            Constraint::Length(canvas_height),
            Constraint::Length(HELP_BAR_ROWS),
        ])
        .split(area);

    CanvasView {
        surface: &game.surface,
    }
    .render(chunks[1], buf);

    if let Some(celebration) = &game.celebration {
        render_reward(celebration, app, chunks[1], buf);
    }

    render_top_bar(app, game, chunks[0], buf);
    render_help_bar(game, chunks[2], buf);
}

fn render_top_bar(app: &App, game: &Game, area: Rect, buf: &mut Buffer) {
    let session = &game.session;
    let bold = Style::default().add_modifier(Modifier::BOLD);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .style(Style::default().bg(PANEL));
    let inner = block.inner(area);
    block.render(area, buf);

    let word = format!("Mot à dessiner : {}", session.round.target);
    let right = format!(
        "Jokers : {}  Score : {}  ⏰ {}s",
        session.jokers_remaining,
        session.score,
        session.remaining(app.now).as_secs()
    );
    let thinking = if game.guess_pending() { " …" } else { "" };
    let guess = format!("Réponse IA : {}{}", session.round.last_guess, thinking);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(word.width() as u16 + 2),
            Constraint::Min(0),
            Constraint::Length(right.width() as u16 + 2),
        ])
        .split(inner);

    Paragraph::new(Span::styled(word, bold.fg(ACCENT))).render(chunks[0], buf);

    let guess_color = if session.round.guessed { SOFT_RED } else { Color::Yellow };
    Paragraph::new(Span::styled(guess, bold.fg(guess_color)))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let jokers_color = if session.jokers_remaining == 0 { SOFT_RED } else { ACCENT };
    let right_line = Line::from(vec![
        Span::styled(format!("Jokers : {}", session.jokers_remaining), bold.fg(jokers_color)),
        Span::raw("  "),
        Span::styled(format!("Score : {}", session.score), bold.fg(rgb(Rgb::GREEN))),
        Span::raw("  "),
        Span::styled(
            format!("⏰ {}s", session.remaining(app.now).as_secs()),
            bold.fg(ORANGE),
        ),
    ]);
    Paragraph::new(right_line)
        .alignment(Alignment::Right)
        .render(chunks[2], buf);
}

fn render_help_bar(game: &Game, area: Rect, buf: &mut Buffer) {
    let mut spans = Vec::new();
    for (key, color) in PALETTE {
        let selected = game.brush.color == color;
        let label = Style::default().fg(if selected { Color::White } else { TEXT });
        spans.push(Span::styled(
            format!("[{}]", key.to_ascii_uppercase()),
            if selected {
                label.add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                label
            },
        ));
        spans.push(Span::styled("██", Style::default().fg(rgb(color))));
        spans.push(Span::raw("  "));
    }
    spans.push(Span::styled(
        format!(
            "[C] Effacer  [↑/↓] Taille {}  [P] Passer (joker)  [Q] Quitter",
            game.brush.size
        ),
        Style::default().fg(Color::Gray),
    ));

    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .style(Style::default().bg(PANEL)),
        )
        .render(area, buf);
}

/// Draws the raster with two pixel blocks per cell using upper half blocks.
struct CanvasView<'a> {
    surface: &'a DrawingSurface,
}

impl Widget for CanvasView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let half = CELL_HEIGHT_PX / 2;
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                let px = x as u32 * CELL_WIDTH_PX;
                let py = y as u32 * CELL_HEIGHT_PX;
                let top = self.surface.block_color(px, py, CELL_WIDTH_PX, half);
                let bottom = self.surface.block_color(px, py + half, CELL_WIDTH_PX, half);
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_symbol("▀").set_fg(rgb(top)).set_bg(rgb(bottom));
                }
            }
        }
    }
}

fn render_reward(celebration: &Celebration, app: &App, area: Rect, buf: &mut Buffer) {
    for piece in &celebration.confetti {
        if piece.x < 0.0 || piece.y < 0.0 {
            continue;
        }
        let (x, y) = (piece.x as u16, piece.y as u16);
        if x >= area.width || y >= area.height {
            continue;
        }
        if let Some(cell) = buf.cell_mut((area.x + x, area.y + y)) {
            cell.set_symbol(if piece.big { "●" } else { "•" })
                .set_fg(rgb(piece.color));
        }
    }

    if celebration.word_visible(app.now) {
        let text = format!(" {} ", celebration.word);
        let banner = centered(area, text.width() as u16, 1);
        Paragraph::new(Span::styled(
            text,
            Style::default()
                .fg(GOLD)
                .bg(PANEL)
                .add_modifier(Modifier::BOLD),
        ))
        .render(banner, buf);
    }
}

fn render_ended(app: &App, summary: &SessionSummary, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![Line::styled("Partie terminée !", bold.fg(SOFT_RED))];

    lines.push(Line::styled(
        match summary.reason {
            EndReason::Timeout => format!(
                "Votre score : {} mot(s) devinés par l'IA en {} secondes.",
                summary.score, app.config.session_secs
            ),
            EndReason::VocabularyExhausted => format!(
                "Plus aucun mot à dessiner. Votre score : {} mot(s) en {} secondes.",
                summary.score,
                summary.duration.as_secs()
            ),
        },
        bold.fg(TEXT),
    ));

    if summary.score > 0 {
        if summary.guessed_words.is_empty() {
            lines.push(Line::styled("Aucun mot deviné (hors jokers).", bold.fg(SOFT_RED)));
        } else {
            lines.push(Line::styled(
                format!("Mots devinés : {}", summary.guessed_words.join(", ")),
                bold.fg(rgb(Rgb::GREEN)),
            ));
        }
    } else {
        lines.push(Line::styled(
            "L'IA n'a deviné aucun mot. Réessayez !",
            bold.fg(SOFT_RED),
        ));
    }

    lines.push(Line::styled(
        "Appuyez sur [ESPACE] pour revenir au menu",
        bold.fg(ACCENT),
    ));
    render_panel(lines, area, buf);
}
