//! Low-level encoding helpers shared by the table format.

pub mod coding;
