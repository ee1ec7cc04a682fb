//! Request handlers.

pub mod check;
