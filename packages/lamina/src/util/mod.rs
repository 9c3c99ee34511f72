// internal utilities.

pub(crate) mod atomic_take;
pub(crate) mod signal;
