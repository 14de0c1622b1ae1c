/// Tracks which area the player occupies and decides when a modal should
/// open. Opening is edge-triggered on a change of occupied area.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct InteractionTracker {
    current: Option<usize>,
    /// Area that was occupied when the modal closed. The next scan that
    /// finds it adopts it without firing.
    reentry_guard: Option<usize>,
}

impl InteractionTracker {
    /// Feeds this tick's first-overlapping area. Returns the area to open.
    pub(crate) fn observe(&mut self, hit: Option<usize>) -> Option<usize> {
        let guard = self.reentry_guard.take();
        let Some(area) = hit else {
            self.current = None;
            return None;
        };

        if guard == Some(area) || self.current == Some(area) {
            self.current = Some(area);
            return None;
        }

        self.current = Some(area);
        Some(area)
    }

    /// Back to idle after the modal closes, remembering the area still
    /// underfoot.
    pub(crate) fn reset_after_close(&mut self) {
        self.reentry_guard = self.current.take();
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<usize> {
        self.current
    }
}
