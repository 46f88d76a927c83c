//! Crate-level test harnesses.

pub(crate) mod support;

mod behaviour;
