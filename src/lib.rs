//! `mailsink`: a mail capture service for testing.
//!
//! This crate provides the core library for decoding captured MIME messages
//! into text, HTML and attachments, resolving `cid:` references, querying the
//! HTML part with XPath expressions, and serving all of it over HTTP.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod html;
pub mod http;
pub mod model;
pub mod parser;
pub mod sanitizer;
pub mod sender;
pub mod service;
pub mod store;
