//! Feed assembly
//!
//! Builds the ordered list of posts a wall displays: pinned posts first, then
//! the most recent unpinned posts in chronological order.

pub mod assembler;

pub use assembler::FeedAssembler;
