//! sift-tools: Built-in research tools for sift
//!
//! - WebSearch: query the Serper search API
//! - WebScraper: fetch a page and extract its readable text

pub mod web;

pub use web::{
    create_web_tools, extract_page_text, validate_url, FetchPageConfig, FetchPageTool,
    WebSearchConfig, WebSearchTool,
};
