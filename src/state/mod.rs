//! State module for crawl outcomes
//!
//! - `PageState`: the terminal state recorded on every PageMeta

mod page_state;

pub use page_state::PageState;
