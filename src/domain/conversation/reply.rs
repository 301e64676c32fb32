//! Reading a free-text reply to a clarifying question.

use crate::domain::session::ConfirmationAnswer;

const AFFIRMATIVE: [&str; 13] = [
    "yes", "y", "yeah", "yep", "yup", "correct", "right", "confirm", "confirmed", "ok", "okay",
    "sure", "that's right",
];

const NEGATIVE: [&str; 7] = ["no", "n", "nope", "wrong", "incorrect", "reject", "not right"];

/// Classifies a reply: affirmative accepts, negative rejects, anything else is the value itself.
pub fn parse_confirmation_reply(reply: &str) -> ConfirmationAnswer {
    let normalized = reply
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | ','))
        .to_lowercase();

    if AFFIRMATIVE.contains(&normalized.as_str()) {
        ConfirmationAnswer::Accept
    } else if NEGATIVE.contains(&normalized.as_str()) {
        ConfirmationAnswer::Reject
    } else {
        ConfirmationAnswer::Replace(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_replies_accept() {
        for reply in ["yes", "Yes.", "  OK ", "that's right!", "Correct"] {
            assert_eq!(parse_confirmation_reply(reply), ConfirmationAnswer::Accept, "{}", reply);
        }
    }

    #[test]
    fn negative_replies_reject() {
        for reply in ["no", "Nope", "wrong.", "NO!"] {
            assert_eq!(parse_confirmation_reply(reply), ConfirmationAnswer::Reject, "{}", reply);
        }
    }

    #[test]
    fn anything_else_is_taken_literally() {
        assert_eq!(
            parse_confirmation_reply("  Colorado Springs "),
            ConfirmationAnswer::Replace("Colorado Springs".into())
        );
    }
}
