//! `drsreport`: fetch DRS load reports from a mailbox and summarize the
//! MP3 objects they describe.
//!
//! The pipeline has two independent stages joined only by a directory of
//! report files: [`retrieve`] downloads `.txt` attachments from messages in
//! a date range, and [`aggregate`] groups MP3 rows from those reports into
//! one CSV written by [`export::csv`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod retrieve;
