//! Architecture support.

pub mod arm;
