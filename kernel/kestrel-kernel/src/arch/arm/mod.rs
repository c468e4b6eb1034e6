//! ARMv7-R exception entry and fault decoding.

pub mod fault;
pub mod ifsr;
