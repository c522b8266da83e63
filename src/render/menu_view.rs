//! Paints one menu frame: prompt row, item window, status bar.

use crate::core::screen::{draw_text, text_width, Color, Overflow, Screen, Style};
use crate::runtime::menu::MenuHost;

/// Row of the first item; row 1 is left blank under the prompt.
pub const FIRST_ITEM_ROW: usize = 2;
/// Blank columns between the line-number gutter and the item text.
pub const GUTTER_SIZE: usize = 1;
/// Drawn at the item column while the view is scrolled right.
pub const SCROLL_LEFT_MARKER: &str = "<";

const SEARCH_HINT: &str = " [search]";

pub fn render<H: MenuHost>(host: &mut H, screen: &mut dyn Screen) {
    screen.clear();
    let (rows, cols) = screen.size();
    if rows == 0 || cols == 0 {
        screen.refresh();
        return;
    }

    let status = host.status_text();
    let mut status_lines: Vec<&str> = status.lines().collect();
    if status_lines.is_empty() {
        status_lines.push("");
    }
    let max_status = rows.saturating_sub(FIRST_ITEM_ROW + 1).max(1);
    if status_lines.len() > max_status {
        status_lines.drain(..status_lines.len() - max_status);
    }
    let status_top = rows.saturating_sub(status_lines.len());
    let items_per_page = status_top.saturating_sub(FIRST_ITEM_ROW).max(1);
    host.menu_mut().set_items_per_page(items_per_page);

    let cursor = draw_prompt(host, screen);
    if status_top > FIRST_ITEM_ROW {
        draw_items(host, screen, status_top - 1);
    }
    draw_status(host, screen, &status_lines, status_top, cols);

    screen.set_cursor(cursor);
    screen.refresh();
}

fn draw_prompt<H: MenuHost>(host: &H, screen: &mut dyn Screen) -> Option<(usize, usize)> {
    let menu = host.menu();
    let prompt = host.prompt_text();
    let mut col = 0;
    if !prompt.is_empty() {
        col = screen.put_str(0, 0, &format!("{prompt}:"), Style::color(Color::White));
        col += 1;
    }
    let input = menu.input();
    let end = screen.put_str(0, col, input.text(), Style::default());
    if menu.options().search_on_enter && menu.has_pending_search() {
        screen.put_str(0, end, SEARCH_HINT, Style::color(Color::Gray));
    }
    menu.options()
        .allow_input
        .then(|| (0, col + input.caret_column()))
}

/// Draws the page holding the selection. When wrapped items push the
/// selected one off the bottom, the window restarts at the selection.
fn draw_items<H: MenuHost>(host: &H, screen: &mut dyn Screen, last_row: usize) {
    let menu = host.menu();
    let matched = menu.matched();
    if matched.is_empty() {
        return;
    }
    let selected = menu.selected_row();
    let window = menu.viewport().window(selected, matched.len());

    let gutter = if menu.options().line_number {
        matched
            .last()
            .and_then(|&index| menu.item(index).map(|item| host.line_number_text(index, item)))
            .map_or(0, |text| text_width(&text))
            + GUTTER_SIZE
    } else {
        0
    };

    if !draw_rows(host, screen, window.start, window.end, gutter, last_row) {
        for row in FIRST_ITEM_ROW..=last_row {
            screen.put_str(row, 0, &" ".repeat(screen.size().1), Style::default());
        }
        let start = usize::try_from(selected).unwrap_or(window.start);
        draw_rows(host, screen, start, window.end, gutter, last_row);
    }
}

/// Returns whether the selected row fit on screen.
fn draw_rows<H: MenuHost>(
    host: &H,
    screen: &mut dyn Screen,
    start: usize,
    end: usize,
    gutter: usize,
    last_row: usize,
) -> bool {
    let menu = host.menu();
    let matched = menu.matched();
    let selected = menu.selected_row();
    let scroll_x = menu.scroll_x();
    let mut selected_visible = selected < 0;
    let mut y = FIRST_ITEM_ROW;

    for row in start..end {
        if y > last_row {
            break;
        }
        let index = matched[row];
        let Some(item) = menu.item(index) else {
            continue;
        };
        let is_selected = menu.is_row_selected(row);
        let text = menu.display_text(item);

        let mut color = host.item_color(item).unwrap_or_default();
        for rule in &menu.options().highlight {
            if rule.pattern.is_match(&text) {
                color = rule.color;
            }
        }
        let style = Style::color(color).selected(is_selected);

        let wrap = host.item_wrap(item);
        let mut col = gutter;
        let visible_text = if wrap || scroll_x == 0 {
            text.as_str()
        } else {
            screen.put_str(y, col, SCROLL_LEFT_MARKER, Style::color(Color::White));
            col += 1;
            skip_chars(&text, scroll_x)
        };
        let overflow = if wrap { Overflow::Wrap } else { Overflow::Crop };
        let bottom = draw_text(screen, y, col, visible_text, style, overflow, last_row);

        if gutter > 0 {
            let number = host.line_number_text(index, item);
            let number_style = if is_selected {
                Style::color(Color::White)
            } else {
                Style::color(Color::Gray)
            };
            let width = gutter - GUTTER_SIZE;
            screen.put_str(y, 0, &format!("{number:>width$}"), number_style);
        }

        if row as isize == selected {
            let avail = screen.size().1.saturating_sub(col).max(1);
            selected_visible = !wrap || y + wrapped_rows(visible_text, avail) <= last_row + 1;
        }
        y = bottom + 1;
    }
    selected_visible
}

/// Rows `text` takes when wrapped at `width` columns.
fn wrapped_rows(text: &str, width: usize) -> usize {
    text.split('\n')
        .map(|line| text_width(line).div_ceil(width).max(1))
        .sum()
}

fn skip_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((offset, _)) => &text[offset..],
        None => "",
    }
}

fn draw_status<H: MenuHost>(
    host: &H,
    screen: &mut dyn Screen,
    lines: &[&str],
    top: usize,
    cols: usize,
) {
    let indicators = host.menu().status_indicators();
    let style = Style::color(Color::Blue);
    let last = lines.len().saturating_sub(1);
    for (offset, line) in lines.iter().enumerate() {
        let row = top + offset;
        draw_text(screen, row, 0, line, style, Overflow::Crop, row);
        if offset == last && !indicators.is_empty() {
            let width = text_width(&indicators);
            if width <= cols {
                screen.put_str(row, cols - width, &indicators, style);
            }
        }
    }
}
