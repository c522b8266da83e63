//! Page arithmetic for the item list. Independent of rendering.

/// Pages over `matched_count` rows, `items_per_page` at a time.
///
/// The selected row is owned by the caller; the viewport only maps it to a
/// page and clamps movement. `items_per_page` may change between ticks
/// without moving the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    items_per_page: usize,
}

impl Viewport {
    /// A page size of zero is treated as one row.
    pub fn new(items_per_page: usize) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
        }
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    pub fn resize(&mut self, items_per_page: usize) {
        self.items_per_page = items_per_page.max(1);
    }

    /// Clamps `row` to `[0, matched_count - 1]`, or `-1` when nothing matched.
    pub fn clamp(row: isize, matched_count: usize) -> isize {
        if matched_count == 0 {
            return -1;
        }
        row.clamp(0, matched_count as isize - 1)
    }

    pub fn page(&self, selected: isize) -> usize {
        if selected < 0 {
            return 0;
        }
        selected as usize / self.items_per_page
    }

    /// Absolute row range visible on the selected row's page.
    pub fn window(&self, selected: isize, matched_count: usize) -> std::ops::Range<usize> {
        let start = (self.page(selected) * self.items_per_page).min(matched_count);
        let end = (start + self.items_per_page).min(matched_count);
        start..end
    }

    /// Row of `selected` within its page.
    pub fn local_row(&self, selected: isize) -> Option<usize> {
        (selected >= 0).then(|| selected as usize % self.items_per_page)
    }

    pub fn step(selected: isize, delta: isize, matched_count: usize) -> isize {
        Self::clamp(selected.saturating_add(delta), matched_count)
    }

    pub fn page_up(&self, selected: isize, matched_count: usize) -> isize {
        Self::step(selected, -(self.items_per_page as isize), matched_count)
    }

    pub fn page_down(&self, selected: isize, matched_count: usize) -> isize {
        Self::step(selected, self.items_per_page as isize, matched_count)
    }
}
