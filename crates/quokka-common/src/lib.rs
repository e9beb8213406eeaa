//! Common utilities for the Quokka browser.
//!
//! This crate provides shared infrastructure used by all browser components:
//! - **Warning System** - deduplicated, colored warnings for unsupported input
//! - **URLs** - parsing, relative resolution and origins
//! - **Networking** - the [`net::Fetcher`] seam and the default network fetcher
//! - **Images** - decoded image data and the broken-image sentinel

pub mod image;
pub mod net;
pub mod url;
pub mod warning;
