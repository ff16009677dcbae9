//! Host UI collaborator traits.
//!
//! The subsystem never renders anything itself; it drives these handles,
//! which the embedding application implements against its real UI. All three
//! are mocked in tests.

#[cfg(test)]
use mockall::automock;

/// Focused-panel queries against the host's navigation state.
#[cfg_attr(test, automock)]
pub trait HostPanel: Send + Sync {
    /// Whether the detail panel for `card_id` currently has focus.
    fn is_detail_focused(&self, card_id: &str) -> bool;
}

/// The per-card background layer behind the detail panel.
#[cfg_attr(test, automock)]
pub trait BackgroundMount: Send {
    /// Cross-fade the video layer in over the static artwork.
    fn show_video_layer(&mut self);
    fn hide_video_layer(&mut self);
    fn restore_artwork(&mut self);
    /// Show the preview frame while the countdown runs.
    fn show_preview_thumbnail(&mut self, url: &str);
    /// Countdown fill animation, `0.0..=1.0`.
    fn set_countdown_progress(&mut self, fraction: f32);
    /// Expand into the attention-capturing promoted presentation.
    fn promote(&mut self);
    /// Collapse back to the quiet background presentation.
    fn retreat(&mut self);
}

/// Input-capture scope for promoted playback: directional navigation,
/// enter-to-unmute, back-to-close.
#[cfg_attr(test, automock)]
pub trait InputCapture: Send {
    fn acquire(&mut self);
    fn release(&mut self);
}
