//! Loot decision core: parse one item description panel into a structured
//! [`Item`] and evaluate it against the user's filter profiles.
//!
//! One detection cycle: locate the panel separator, read the header, extract
//! affix and aspect paragraphs via OCR, then run [`filter::should_keep`]. All
//! state a cycle needs travels in an explicit [`ParseContext`]; there are no
//! process-wide caches.

mod context;
pub use context::*;
mod item;
pub use item::*;

pub mod filter;
pub mod parser;
