//! Domain layer - pure types and policies of the orchestration core.

pub mod admission;
pub mod conversation;
pub mod foundation;
pub mod session;
