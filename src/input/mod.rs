/// Trigger debouncing
pub mod debounce;
/// Global hotkeys and the enable/disable gate
pub mod hotkey;
/// Synthetic key events (the copy chord)
pub mod keystroke;
