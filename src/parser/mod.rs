//! Report parsing: tab-delimited load report reader.

pub mod report;
