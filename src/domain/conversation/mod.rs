//! Conversation module - field catalog, questions and input handling for
//! the fact-collection dialogue.

mod fields;
mod input;
mod questions;
mod reply;

pub use fields::{field_label, is_known_field, BOE_OPTIONAL_FIELDS, BOE_REQUIRED_FIELDS};
pub use input::{UserInput, MAX_MESSAGE_LENGTH};
pub use questions::{confirmation_question, next_question, Question};
pub use reply::parse_confirmation_reply;
