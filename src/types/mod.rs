//! Basic value types shared across the crate.

pub mod address;
pub mod page;
pub mod size;

pub use address::Address;
pub use page::{check_page_size, page_chunks, PageChunk, PageChunks};
