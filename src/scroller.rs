//! Scroll position and cursor tracking for a list whose contents change
//! under it.
//!
//! The cursor remembers the selected item rather than just its index, so
//! after the list is re-sorted the cursor follows the item. When the item
//! disappears the cursor stays at the same index, clamped to the list.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollKey {
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
}

#[derive(Debug, Clone)]
pub struct Scroller<T> {
    cursor_enabled: bool,
    scroll_loc: usize,
    cursor_loc: usize,
    cursor_selection: Option<T>,
}

impl<T: PartialEq + Clone> Scroller<T> {
    pub fn new(cursor_enabled: bool) -> Self {
        Self {
            cursor_enabled,
            scroll_loc: 0,
            cursor_loc: 0,
            cursor_selection: None,
        }
    }

    /// First visible index for a page of `page_height` rows, keeping the
    /// cursor on screen.
    pub fn scroll_loc(&mut self, content: &[T], page_height: usize) -> usize {
        let page_height = page_height.max(1);

        if self.cursor_enabled {
            self.cursor_selection(content);

            if self.cursor_loc < self.scroll_loc {
                self.scroll_loc = self.cursor_loc;
            } else if self.cursor_loc >= self.scroll_loc + page_height {
                self.scroll_loc = self.cursor_loc + 1 - page_height;
            }
        }

        self.scroll_loc = self
            .scroll_loc
            .min(content.len().saturating_sub(page_height));
        self.scroll_loc
    }

    /// The selected item, re-located in `content`.
    pub fn cursor_selection(&mut self, content: &[T]) -> Option<T> {
        if !self.cursor_enabled || content.is_empty() {
            self.cursor_selection = None;
            self.cursor_loc = 0;
            return None;
        }

        let found = self
            .cursor_selection
            .as_ref()
            .and_then(|selected| content.iter().position(|item| item == selected));

        self.cursor_loc = found.unwrap_or_else(|| self.cursor_loc.min(content.len() - 1));
        self.cursor_selection = Some(content[self.cursor_loc].clone());
        self.cursor_selection.clone()
    }

    /// Moves the cursor (or the view when the cursor is disabled). Returns
    /// whether anything changed.
    pub fn handle_key(&mut self, key: ScrollKey, content: &[T], page_height: usize) -> bool {
        let page_height = page_height.max(1);

        if !self.cursor_enabled {
            let max = content.len().saturating_sub(page_height);
            let new_loc = scroll_position(key, self.scroll_loc, page_height, max);
            let changed = new_loc != self.scroll_loc;
            self.scroll_loc = new_loc;
            return changed;
        }

        if self.cursor_selection(content).is_none() {
            return false;
        }

        let new_loc = scroll_position(key, self.cursor_loc, page_height, content.len() - 1);
        if new_loc == self.cursor_loc {
            return false;
        }

        self.cursor_loc = new_loc;
        self.cursor_selection = Some(content[new_loc].clone());
        self.scroll_loc(content, page_height);
        true
    }
}

fn scroll_position(key: ScrollKey, position: usize, page_height: usize, max: usize) -> usize {
    let target = match key {
        ScrollKey::Up => position.saturating_sub(1),
        ScrollKey::Down => position + 1,
        ScrollKey::PageUp => position.saturating_sub(page_height),
        ScrollKey::PageDown => position + page_height,
        ScrollKey::Home => 0,
        ScrollKey::End => max,
    };
    target.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_moves_and_scrolls() {
        let content: Vec<u32> = (0..10).collect();
        let mut scroller = Scroller::new(true);

        assert_eq!(scroller.cursor_selection(&content), Some(0));
        assert!(!scroller.handle_key(ScrollKey::Up, &content, 3));

        assert!(scroller.handle_key(ScrollKey::Down, &content, 3));
        assert!(scroller.handle_key(ScrollKey::Down, &content, 3));
        assert!(scroller.handle_key(ScrollKey::Down, &content, 3));
        assert_eq!(scroller.cursor_selection(&content), Some(3));
        assert_eq!(scroller.scroll_loc(&content, 3), 1);

        assert!(scroller.handle_key(ScrollKey::End, &content, 3));
        assert_eq!(scroller.cursor_selection(&content), Some(9));
        assert_eq!(scroller.scroll_loc(&content, 3), 7);

        assert!(scroller.handle_key(ScrollKey::PageUp, &content, 3));
        assert_eq!(scroller.cursor_selection(&content), Some(6));
        assert!(scroller.handle_key(ScrollKey::Home, &content, 3));
        assert_eq!(scroller.scroll_loc(&content, 3), 0);
    }

    #[test]
    fn test_cursor_follows_item_after_reorder() {
        let mut scroller = Scroller::new(true);
        let content = vec!["a", "b", "c", "d"];

        scroller.handle_key(ScrollKey::Down, &content, 10);
        assert_eq!(scroller.cursor_selection(&content), Some("b"));

        let reordered = vec!["d", "c", "b", "a"];
        assert_eq!(scroller.cursor_selection(&reordered), Some("b"));
        assert!(scroller.handle_key(ScrollKey::Down, &reordered, 10));
        assert_eq!(scroller.cursor_selection(&reordered), Some("a"));
    }

    #[test]
    fn test_cursor_clamps_when_item_vanishes() {
        let mut scroller = Scroller::new(true);
        let content = vec![1, 2, 3, 4, 5];
        scroller.handle_key(ScrollKey::End, &content, 2);

        assert_eq!(scroller.cursor_selection(&[1, 2]), Some(2));
        assert_eq!(scroller.cursor_selection(&[]), None);
        assert_eq!(scroller.scroll_loc(&[], 2), 0);
    }

    #[test]
    fn test_scroll_without_cursor() {
        let content: Vec<u32> = (0..10).collect();
        let mut scroller = Scroller::new(false);

        assert!(scroller.handle_key(ScrollKey::PageDown, &content, 4));
        assert_eq!(scroller.scroll_loc(&content, 4), 4);
        assert!(scroller.handle_key(ScrollKey::End, &content, 4));
        assert_eq!(scroller.scroll_loc(&content, 4), 6);
        assert!(!scroller.handle_key(ScrollKey::Down, &content, 4));
        assert_eq!(scroller.cursor_selection(&content), None);
    }
}
