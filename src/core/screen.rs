//! Render contract: a small named palette, cell grids and the text drawing
//! primitive the menu paints with.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::core::terminal::TerminalHandlers;

/// Continuation marker drawn in the last column when text is cropped.
pub const CROP_MARKER: &str = ">";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    Default,
    Red,
    Yellow,
    Green,
    Blue,
    Cyan,
    Magenta,
    White,
    Gray,
}

impl Color {
    /// Looks up a palette entry by its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "default" => Self::Default,
            "red" => Self::Red,
            "yellow" => Self::Yellow,
            "green" => Self::Green,
            "blue" => Self::Blue,
            "cyan" => Self::Cyan,
            "magenta" => Self::Magenta,
            "white" => Self::White,
            "gray" | "grey" => Self::Gray,
            _ => return None,
        };
        Some(color)
    }

    pub(crate) fn sgr_code(self) -> Option<u8> {
        match self {
            Self::Default => None,
            Self::Red => Some(31),
            Self::Green => Some(32),
            Self::Yellow => Some(33),
            Self::Blue => Some(34),
            Self::Magenta => Some(35),
            Self::Cyan => Some(36),
            Self::White => Some(37),
            Self::Gray => Some(90),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub color: Color,
    /// Reverse video.
    pub selected: bool,
    pub bold: bool,
}

impl Style {
    pub fn color(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn selected(self, selected: bool) -> Self {
        Self { selected, ..self }
    }

    pub fn bold(self) -> Self {
        Self { bold: true, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Truncate and mark the last column with [`CROP_MARKER`].
    #[default]
    Crop,
    /// Continue on the following rows at the same column.
    Wrap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub symbol: String,
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            symbol: " ".to_string(),
            style: Style::default(),
        }
    }
}

impl Cell {
    /// Trailing half of a wide grapheme.
    fn spacer(style: Style) -> Self {
        Self {
            symbol: String::new(),
            style,
        }
    }
}

/// Fixed-size grid of cells. Writes outside the grid are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl CellGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows != self.rows || cols != self.cols {
            *self = Self::new(rows, cols);
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        if row >= self.rows {
            return &[];
        }
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Writes `text` starting at `(row, col)`, grapheme by grapheme.
    /// Returns the column after the last written cell.
    pub fn put_str(&mut self, row: usize, col: usize, text: &str, style: Style) -> usize {
        let mut x = col;
        if row >= self.rows {
            return x;
        }
        for grapheme in text.graphemes(true) {
            let width = grapheme_width(grapheme);
            if width == 0 {
                continue;
            }
            if x + width > self.cols {
                break;
            }
            let base = row * self.cols + x;
            self.cells[base] = Cell {
                symbol: grapheme.to_string(),
                style,
            };
            for offset in 1..width {
                self.cells[base + offset] = Cell::spacer(style);
            }
            x += width;
        }
        x
    }

    /// Plain text of a row, trailing blanks trimmed.
    pub fn row_text(&self, row: usize) -> String {
        let text: String = self.row(row).iter().map(|cell| cell.symbol.as_str()).collect();
        text.trim_end().to_string()
    }
}

fn grapheme_width(grapheme: &str) -> usize {
    if grapheme.chars().all(char::is_control) {
        return 0;
    }
    grapheme.width().max(1)
}

/// Display width of `text` in terminal cells.
pub fn text_width(text: &str) -> usize {
    text.graphemes(true).map(grapheme_width).sum()
}

/// A drawing surface for one menu.
pub trait Screen {
    /// `(rows, cols)`.
    fn size(&self) -> (usize, usize);

    fn clear(&mut self);

    /// Writes text on one row. Cells past the right edge are dropped.
    fn put_str(&mut self, row: usize, col: usize, text: &str, style: Style) -> usize;

    /// Hardware cursor position after the next refresh; `None` hides it.
    fn set_cursor(&mut self, position: Option<(usize, usize)>);

    /// Makes everything drawn since the last refresh visible.
    fn refresh(&mut self);

    /// Marks the whole screen as changed, e.g. after a nested menu.
    fn invalidate(&mut self) {}

    /// Picks up a new terminal size.
    fn sync_size(&mut self) {}

    /// Hands the terminal back to the shell while `run` executes, then takes
    /// it over again with `handlers`. In-memory screens just call `run`.
    fn suspend(&mut self, _handlers: TerminalHandlers, run: &mut dyn FnMut()) {
        run();
    }
}

/// Draws `text` at `(row, col)` and returns the last row used.
///
/// Nothing is drawn on rows past `max_row` or outside the screen.
pub fn draw_text(
    screen: &mut dyn Screen,
    row: usize,
    col: usize,
    text: &str,
    style: Style,
    overflow: Overflow,
    max_row: usize,
) -> usize {
    let (rows, cols) = screen.size();
    if row >= rows || row > max_row || col >= cols {
        return row;
    }
    let available = cols - col;
    match overflow {
        Overflow::Crop => {
            let flat = flatten_controls(text);
            if text_width(&flat) <= available {
                screen.put_str(row, col, &flat, style);
            } else {
                let kept = take_width(&flat, available.saturating_sub(1));
                screen.put_str(row, col, kept, style);
                screen.put_str(row, cols - 1, CROP_MARKER, style);
            }
            row
        }
        Overflow::Wrap => {
            let last_row = max_row.min(rows - 1);
            let mut current = row;
            for (index, segment) in text.split('\n').enumerate() {
                if index > 0 {
                    current += 1;
                }
                let mut rest = segment;
                loop {
                    if current > last_row {
                        return last_row;
                    }
                    let chunk = take_width(rest, available);
                    screen.put_str(current, col, chunk, style);
                    rest = &rest[chunk.len()..];
                    if rest.is_empty() {
                        break;
                    }
                    if chunk.is_empty() {
                        // A single grapheme wider than the space left.
                        break;
                    }
                    current += 1;
                }
            }
            current.min(last_row)
        }
    }
}

fn flatten_controls(text: &str) -> std::borrow::Cow<'_, str> {
    if text.chars().any(|ch| ch == '\n' || ch == '\t' || ch == '\r') {
        std::borrow::Cow::Owned(text.replace(['\n', '\t', '\r'], " "))
    } else {
        std::borrow::Cow::Borrowed(text)
    }
}

/// Longest prefix of `text` that fits in `width` cells.
fn take_width(text: &str, width: usize) -> &str {
    let mut used = 0;
    for (offset, grapheme) in text.grapheme_indices(true) {
        let w = grapheme_width(grapheme);
        if used + w > width {
            return &text[..offset];
        }
        used += w;
    }
    text
}

/// In-memory screen. Records refreshes and the cursor for inspection.
#[derive(Debug, Clone)]
pub struct BufferScreen {
    grid: CellGrid,
    cursor: Option<(usize, usize)>,
    refreshes: usize,
}

impl BufferScreen {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            grid: CellGrid::new(rows, cols),
            cursor: None,
            refreshes: 0,
        }
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.grid.resize(rows, cols);
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn row_text(&self, row: usize) -> String {
        self.grid.row_text(row)
    }

    /// Every row as trimmed text.
    pub fn lines(&self) -> Vec<String> {
        (0..self.grid.rows()).map(|row| self.grid.row_text(row)).collect()
    }

    pub fn style_at(&self, row: usize, col: usize) -> Option<Style> {
        self.grid.row(row).get(col).map(|cell| cell.style)
    }

    pub fn cursor(&self) -> Option<(usize, usize)> {
        self.cursor
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }
}

impl Screen for BufferScreen {
    fn size(&self) -> (usize, usize) {
        (self.grid.rows(), self.grid.cols())
    }

    fn clear(&mut self) {
        self.grid.clear();
    }

    fn put_str(&mut self, row: usize, col: usize, text: &str, style: Style) -> usize {
        self.grid.put_str(row, col, text, style)
    }

    fn set_cursor(&mut self, position: Option<(usize, usize)>) {
        self.cursor = position;
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{draw_text, text_width, BufferScreen, Color, Overflow, Screen, Style};

    #[test]
    fn crop_marks_the_last_column() {
        let mut screen = BufferScreen::new(3, 8);
        let last = draw_text(&mut screen, 1, 0, "abcdefghijk", Style::default(), Overflow::Crop, 2);
        assert_eq!(last, 1);
        assert_eq!(screen.row_text(1), "abcdefg>");
    }

    #[test]
    fn text_that_fits_is_not_marked() {
        let mut screen = BufferScreen::new(1, 8);
        draw_text(&mut screen, 0, 2, "abcdef", Style::default(), Overflow::Crop, 0);
        assert_eq!(screen.row_text(0), "  abcdef");
    }

    #[test]
    fn wrap_returns_last_row_used() {
        let mut screen = BufferScreen::new(5, 4);
        let last = draw_text(&mut screen, 0, 0, "abcdefghij", Style::default(), Overflow::Wrap, 4);
        assert_eq!(last, 2);
        assert_eq!(screen.lines(), vec!["abcd", "efgh", "ij", "", ""]);
    }

    #[test]
    fn wrap_stops_at_max_row() {
        let mut screen = BufferScreen::new(5, 4);
        let last = draw_text(&mut screen, 1, 0, "abcdefghijkl", Style::default(), Overflow::Wrap, 2);
        assert_eq!(last, 2);
        assert_eq!(screen.lines(), vec!["", "abcd", "efgh", "", ""]);
    }

    #[test]
    fn wrap_honors_embedded_newlines() {
        let mut screen = BufferScreen::new(4, 10);
        let last = draw_text(&mut screen, 0, 0, "one\ntwo", Style::default(), Overflow::Wrap, 3);
        assert_eq!(last, 1);
        assert_eq!(screen.row_text(0), "one");
        assert_eq!(screen.row_text(1), "two");
    }

    #[test]
    fn draws_outside_the_screen_are_clipped() {
        let mut screen = BufferScreen::new(2, 4);
        assert_eq!(draw_text(&mut screen, 7, 0, "x", Style::default(), Overflow::Crop, 9), 7);
        draw_text(&mut screen, 0, 9, "x", Style::default(), Overflow::Crop, 9);
        assert_eq!(screen.lines(), vec!["", ""]);
    }

    #[test]
    fn wide_characters_take_two_cells() {
        assert_eq!(text_width("日本"), 4);
        let mut screen = BufferScreen::new(1, 5);
        draw_text(&mut screen, 0, 0, "日本語", Style::default(), Overflow::Crop, 0);
        assert_eq!(screen.row_text(0), "日本>");
    }

    #[test]
    fn style_is_recorded_per_cell() {
        let mut screen = BufferScreen::new(1, 4);
        let style = Style::color(Color::Red).selected(true);
        screen.put_str(0, 1, "ab", style);
        assert_eq!(screen.style_at(0, 1), Some(style));
        assert_eq!(screen.style_at(0, 0), Some(Style::default()));
        assert_eq!(Color::from_name("GREY"), Some(Color::Gray));
    }
}
