//! Memory setup.

pub mod kheap;
