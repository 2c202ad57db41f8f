//! Application layer: resolution, copy rules, and the session tying them together.

pub mod bundle;
pub mod copy;
pub mod model_id;
pub mod resolve;
pub mod rules;
pub mod session;
