#![forbid(unsafe_code)]

pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod content;
pub mod docs;
pub mod document;
pub mod engage;
pub mod error;
pub mod formats;
pub mod forum;
pub mod index;
pub mod logging;
pub mod navigation;
pub mod resolver;
pub mod section;
pub mod site;
pub mod sitemap;
pub mod topic_url;
pub mod tutorials;
pub mod url_map;
