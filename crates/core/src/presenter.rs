use crate::log::{LogView, ScrollPosition};
use crate::progress::ReconciledState;

/// Renders reconciled state. The core only hands it well-formed values.
pub trait Presenter {
    fn render(&mut self, state: &ReconciledState, log: &LogView<'_>);

    /// Best-effort pulse emitted once per non-terminal poll. Safe to ignore.
    fn render_activity_tick(&mut self) {}

    /// Viewer position just before an update, if the presenter scrolls.
    fn scroll_position(&self) -> Option<ScrollPosition> {
        None
    }
}

impl<P: Presenter + ?Sized> Presenter for &mut P {
    fn render(&mut self, state: &ReconciledState, log: &LogView<'_>) {
        (**self).render(state, log)
    }

    fn render_activity_tick(&mut self) {
        (**self).render_activity_tick()
    }

    fn scroll_position(&self) -> Option<ScrollPosition> {
        (**self).scroll_position()
    }
}
