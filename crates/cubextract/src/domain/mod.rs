//! Core domain types shared by resolution and copying.

pub mod errors;
pub mod model;
