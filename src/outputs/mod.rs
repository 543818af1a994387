//! Feed output: RSS rendering and file writing.
//!
//! # Submodules
//!
//! - [`rss`]: Renders a channel and its items as an RSS 2.0 document
//! - [`file`]: Writes a rendered feed into the output directory atomically
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── capital-market-news.xml
//! ├── dhan-scanx-news.xml
//! ├── scanx_stock_news.xml
//! └── ...                     # one file per configured source
//! ```

pub mod file;
pub mod rss;
