use std::io::stdout;

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
};
use scrollgate_core::ScrollLockConfig;
use scrollgate_protocol::LockState;
use tracing::info;

use crate::deck::Deck;
use crate::player::{Player, SectionCard};

const WHEEL_ROWS: i64 = 3;

fn state_color(state: LockState, card: &SectionCard) -> Color {
    match state {
        LockState::Locked => Color::Yellow,
        LockState::Unlocked if card.is_complete() => Color::Green,
        LockState::Unlocked => Color::Gray,
    }
}

/// Rows available to one section: the whole terminal minus header and
/// status line.
fn section_rows(height: u16) -> u16 {
    height.saturating_sub(2).max(1)
}

pub fn run(deck: &Deck, config: ScrollLockConfig) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let size = terminal.size()?;
    let mut player = Player::new(deck, config, section_rows(size.height))?;
    info!(sections = deck.sections.len(), "player started");

    let result = event_loop(&mut terminal, &mut player);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    player.shutdown()?;
    info!("player stopped");
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    player: &mut Player,
) -> Result<()> {
    let mut blocked = false;
    loop {
        terminal.draw(|frame| draw(frame, player, blocked))?;

        if !event::poll(std::time::Duration::from_millis(100))? {
            continue;
        }
        let page = i64::from(player.section_height());
        let moved = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Up | KeyCode::Char('k') => Some(player.scroll_by(-1)?),
                KeyCode::Down | KeyCode::Char('j') => Some(player.scroll_by(1)?),
                KeyCode::PageUp => Some(player.scroll_by(-page)?),
                KeyCode::PageDown => Some(player.scroll_by(page)?),
                KeyCode::Char(' ') | KeyCode::Enter => {
                    player.reveal_next()?;
                    None
                }
                _ => None,
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollDown => Some(player.scroll_by(WHEEL_ROWS)?),
                MouseEventKind::ScrollUp => Some(player.scroll_by(-WHEEL_ROWS)?),
                _ => None,
            },
            Event::Resize(_, height) => {
                player.resize(section_rows(height))?;
                None
            }
            _ => None,
        };
        blocked = moved == Some(false);
    }
    Ok(())
}

fn draw(frame: &mut Frame<'_>, player: &Player, blocked: bool) {
    let area = frame.area();

    let header = Block::default()
        .title(format!(
            " scrollgate · {} sections | ↑↓ scroll | space reveal | q quit ",
            player.sections().count()
        ))
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));
    frame.render_widget(header, Rect::new(area.x, area.y, area.width, 1));

    let content = Rect::new(
        area.x,
        area.y + 1,
        area.width,
        area.height.saturating_sub(2),
    );
    let h = i64::from(player.section_height());
    let offset = i64::from(player.offset());

    for (idx, (id, card, state)) in player.sections().enumerate() {
        // Section rows relative to the top of the content area.
        let top = idx as i64 * h - offset;
        let bottom = top + h;
        let visible_top = top.max(0);
        let visible_bottom = bottom.min(i64::from(content.height));
        if visible_bottom <= visible_top {
            continue;
        }
        let (Ok(y), Ok(height)) = (
            u16::try_from(visible_top),
            u16::try_from(visible_bottom - visible_top),
        ) else {
            continue;
        };
        let rect = Rect::new(content.x, content.y + y, content.width, height);

        let color = state_color(state, card);
        let title = if card.title.is_empty() {
            format!(" {id} ")
        } else {
            format!(" {} · {id} ", card.title)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title);

        let mut lines: Vec<Line<'_>> = card
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if i < card.revealed {
                    Line::from(format!("  ✓ {item}"))
                } else {
                    Line::styled("  • • •", Style::default().fg(Color::DarkGray))
                }
            })
            .collect();
        if !card.items.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::styled(
                format!("  {}/{} seen", card.revealed.min(card.items.len()), card.items.len()),
                Style::default().fg(color),
            ));
        }
        // Clip the part of the section scrolled above the viewport.
        let skip = u16::try_from(visible_top - top).unwrap_or(u16::MAX);
        let paragraph = Paragraph::new(lines).block(block).scroll((skip, 0));
        frame.render_widget(paragraph, rect);
    }

    let status = if player.is_locked() {
        let holders: Vec<String> = player.holders().iter().map(ToString::to_string).collect();
        let hint = if blocked { " (reveal to continue)" } else { "" };
        Line::styled(
            format!(" LOCKED by {}{hint}", holders.join(", ")),
            Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD),
        )
    } else {
        Line::styled(" free scroll", Style::default().fg(Color::Black).bg(Color::Green))
    };
    frame.render_widget(
        Paragraph::new(status),
        Rect::new(area.x, area.y + area.height.saturating_sub(1), area.width, 1),
    );
}
