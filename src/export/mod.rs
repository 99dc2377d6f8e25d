//! Export functionality: the MP3 summary table.

pub mod csv;
