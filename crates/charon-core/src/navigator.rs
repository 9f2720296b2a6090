/// Selection over the flattened command list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Empty,
    At(usize),
}

/// Wrapping up/down selection. Any change to the list resets it to the top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardNavigator {
    selection: Selection,
    len: usize,
}

impl KeyboardNavigator {
    pub fn new(len: usize) -> Self {
        let mut nav = Self::default();
        nav.reset(len);
        nav
    }

    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.selection = if len == 0 { Selection::Empty } else { Selection::At(0) };
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn selected(&self) -> Option<usize> {
        match self.selection {
            Selection::At(index) => Some(index),
            Selection::Empty => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next(&mut self) {
        if let Selection::At(index) = self.selection {
            self.selection = Selection::At((index + 1) % self.len);
        }
    }

    pub fn prev(&mut self) {
        if let Selection::At(index) = self.selection {
            self.selection = Selection::At((index + self.len - 1) % self.len);
        }
    }

    /// Select `index` directly, e.g. from a mouse click. Out of range is ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.len {
            self.selection = Selection::At(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_wraps_to_start() {
        let mut nav = KeyboardNavigator::new(3);
        nav.select(2);
        nav.next();
        assert_eq!(nav.selected(), Some(0));
    }

    #[test]
    fn test_prev_wraps_to_end() {
        let mut nav = KeyboardNavigator::new(3);
        nav.prev();
        assert_eq!(nav.selected(), Some(2));
    }

    #[test]
    fn test_empty_list_stays_empty() {
        let mut nav = KeyboardNavigator::new(0);
        nav.next();
        nav.prev();
        nav.select(0);
        assert_eq!(nav.selection(), Selection::Empty);
    }

    #[test]
    fn test_reset_returns_to_top() {
        let mut nav = KeyboardNavigator::new(5);
        nav.select(4);
        nav.reset(2);
        assert_eq!(nav.selected(), Some(0));
        nav.reset(0);
        assert!(nav.selected().is_none());
    }

    #[test]
    fn test_index_stays_in_bounds() {
        let mut nav = KeyboardNavigator::new(4);
        for _ in 0..17 {
            nav.next();
            assert!(nav.selected().unwrap() < nav.len());
        }
        for _ in 0..9 {
            nav.prev();
            assert!(nav.selected().unwrap() < nav.len());
        }
    }
}
