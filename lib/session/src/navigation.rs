//! Forced navigation after the session ends.

use scholar_index_core::ConditionalSync;

/// Moves the tab to another page.
///
/// In the browser this assigns `window.location`; in tests it records the
/// target.
pub trait Navigator: ConditionalSync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + ConditionalSync,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}
