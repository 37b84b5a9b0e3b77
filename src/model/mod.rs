//! Core data model types: stored mails, extracted bodies, attachments and
//! HTML query results.

pub mod attachment;
pub mod body;
pub mod html;
pub mod mail;
