//! Picking the next question to put to the user.

use serde::Serialize;

use crate::domain::session::{ConfirmationReason, PendingConfirmation, Session};

use super::fields::field_label;

/// A question about one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub field: String,
    pub text: String,
}

fn phrasings(field: &str) -> Vec<String> {
    let fixed: &[&str] = match field {
        "traveler_name" => &[
            "Please provide the traveler's full name.",
            "Who will be traveling? I need their full name.",
        ],
        "origin_city" => &[
            "What city will you be departing from?",
            "Where does the trip start?",
        ],
        "destination_city" => &[
            "Where will you be traveling to?",
            "What is the destination city?",
        ],
        "departure_date" => &[
            "When will you be departing?",
            "What date does the trip start?",
        ],
        "return_date" => &["When will you be returning?", "What is the return date?"],
        "transportation_mode" => &[
            "How will you be traveling?",
            "Will you fly, drive, or take the train?",
        ],
        "trip_purpose" => &[
            "What is the purpose of this trip?",
            "How would you justify this trip for the estimate?",
        ],
        _ => &[],
    };
    if fixed.is_empty() {
        let label = field_label(field);
        vec![
            format!("Please provide the {}.", label),
            format!("Could you tell me the {}?", label),
        ]
    } else {
        fixed.iter().map(|s| s.to_string()).collect()
    }
}

/// First phrasing not asked recently, or the first one when all were.
fn pick<'a>(options: &'a [String], recent: &[&str]) -> &'a str {
    options
        .iter()
        .find(|o| !recent.contains(&o.as_str()))
        .or_else(|| options.first())
        .map(String::as_str)
        .unwrap_or_default()
}

/// Question for the first missing required field, in asking order.
pub fn next_question(session: &Session) -> Option<Question> {
    let field = session.missing_in_order().into_iter().next()?;
    let recent: Vec<&str> = session.recent_questions().collect();
    let options = phrasings(field);
    Some(Question {
        field: field.to_string(),
        text: pick(&options, &recent).to_string(),
    })
}

/// Clarifying question for a pending confirmation.
pub fn confirmation_question(pending: &PendingConfirmation) -> Question {
    let label = field_label(&pending.field);
    let text = match &pending.reason {
        ConfirmationReason::LowConfidence => format!(
            "I think the {} is \"{}\", is that right? Reply yes, no, or give the correct value.",
            label, pending.proposed
        ),
        ConfirmationReason::Conflict { existing } => format!(
            "You mentioned \"{}\" for the {} earlier, but now I see \"{}\". Should I use \"{}\"? Reply yes, no, or give the correct value.",
            existing, label, pending.proposed, pending.proposed
        ),
    };
    Question {
        field: pending.field.clone(),
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ClientId, SessionId, Timestamp};
    use crate::domain::session::{ConfidenceBands, FieldSource};

    fn session() -> Session {
        Session::new(
            SessionId::new(),
            ClientId::new("c").unwrap(),
            ["origin_city", "destination_city", "budget_code"],
            3600,
            Timestamp::now(),
        )
    }

    #[test]
    fn asks_first_missing_field_in_order() {
        let q = next_question(&session()).unwrap();
        assert_eq!(q.field, "origin_city");
        assert_eq!(q.text, "What city will you be departing from?");
    }

    #[test]
    fn avoids_repeating_a_recent_question() {
        let mut s = session();
        s.record_question("What city will you be departing from?");

        let q = next_question(&s).unwrap();
        assert_eq!(q.text, "Where does the trip start?");
    }

    #[test]
    fn falls_back_to_first_phrasing_when_all_were_recent() {
        let mut s = session();
        s.record_question("What city will you be departing from?");
        s.record_question("Where does the trip start?");

        let q = next_question(&s).unwrap();
        assert_eq!(q.text, "What city will you be departing from?");
    }

    #[test]
    fn unknown_fields_get_generic_phrasing() {
        let mut s = session();
        let now = Timestamp::now();
        s.record_user_value("origin_city", "Denver", FieldSource::UserStatement, now);
        s.record_user_value("destination_city", "Austin", FieldSource::UserStatement, now);

        let q = next_question(&s).unwrap();
        assert_eq!(q.text, "Please provide the budget code.");
    }

    #[test]
    fn no_question_when_nothing_missing() {
        let mut s = session();
        let now = Timestamp::now();
        for f in ["origin_city", "destination_city", "budget_code"] {
            s.record_user_value(f, "x", FieldSource::UserStatement, now);
        }
        assert!(next_question(&s).is_none());
    }

    #[test]
    fn conflict_question_names_both_values() {
        let mut s = session();
        let now = Timestamp::now();
        let bands = ConfidenceBands::default();
        s.propose_extraction("origin_city", "Denver", 0.8, &bands, now);
        s.propose_extraction("origin_city", "Houston", 0.8, &bands, now);

        let q = confirmation_question(&s.pending_confirmations()[0]);
        assert!(q.text.contains("Denver"));
        assert!(q.text.contains("Houston"));
        assert_eq!(q.field, "origin_city");
    }
}
