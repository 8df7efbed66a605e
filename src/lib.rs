//! Newsdesk - a headless news reader core
//!
//! This crate fetches headlines from NewsAPI, tracks the feed's loading and
//! error state against network connectivity, and keeps a persisted list of
//! saved articles. A small JSON API exposes both to a presentation layer.

pub mod article;
pub mod config;
pub mod connectivity;
pub mod feed;
pub mod routes;
pub mod source;
pub mod storage;
pub mod store;
