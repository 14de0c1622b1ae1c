/// Ordered images with a wrapping cursor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Carousel<T> {
    items: Vec<T>,
    index: usize,
}

impl<T> Default for Carousel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: 0,
        }
    }
}

impl<T> Carousel<T> {
    /// Appends in arrival order; the cursor stays where it is.
    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub(crate) fn next(&mut self) {
        if self.items.len() > 1 {
            self.index = (self.index + 1) % self.items.len();
        }
    }

    pub(crate) fn previous(&mut self) {
        if self.items.len() > 1 {
            self.index = (self.index + self.items.len() - 1) % self.items.len();
        }
    }

    pub(crate) fn reset(&mut self) {
        self.items.clear();
        self.index = 0;
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.items.get(self.index)
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn shows_navigation(&self) -> bool {
        self.items.len() > 1
    }

    /// `"i / n"`, 1-based, only when navigation is shown.
    pub(crate) fn counter_text(&self) -> Option<String> {
        self.shows_navigation()
            .then(|| format!("{} / {}", self.index + 1, self.items.len()))
    }
}
