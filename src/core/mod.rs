//! Core scanning pipeline: identifier extraction, scan events, publishing
//! and the input loop.

pub mod event;
pub mod identifier;
pub mod publisher;
pub mod scan_loop;
