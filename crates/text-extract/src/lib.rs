//! Pure text processing for extracted chat-message fragments.
//!
//! The remote chat UI renders assistant output as HTML that keeps changing
//! while generation is in progress. This crate turns one such fragment into
//! the plain/markdown-ish text the relay streams onward, and re-balances
//! markup runs the UI truncated mid-stream. Both functions are deterministic
//! and never fail; callers treat an empty result as "nothing new".

mod closing;
mod normalize;

pub use closing::closing_symbol;
pub use normalize::normalize_markup;
