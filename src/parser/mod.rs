//! Email parsing: header parameters, the MIME tree adapter, body extraction
//! and capture of new messages.

pub mod body;
pub mod envelope;
pub mod header;
pub mod mime;
