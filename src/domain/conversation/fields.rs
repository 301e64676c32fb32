//! The Basis of Estimate field catalog.

/// Fields a travel Basis of Estimate cannot be exported without.
pub const BOE_REQUIRED_FIELDS: [&str; 7] = [
    "traveler_name",
    "origin_city",
    "destination_city",
    "departure_date",
    "return_date",
    "transportation_mode",
    "trip_purpose",
];

/// Fields collected when offered but never asked for.
pub const BOE_OPTIONAL_FIELDS: [&str; 4] = [
    "hotel_nights",
    "estimated_cost",
    "supervisor_approval",
    "contract_number",
];

/// Human-readable name of a field, e.g. `origin_city` -> `origin city`.
pub fn field_label(field: &str) -> String {
    match field {
        "traveler_name" => "traveler's full name".to_string(),
        "trip_purpose" => "trip purpose and justification".to_string(),
        other => other.replace('_', " "),
    }
}

/// True if the field belongs to the catalog (required or optional).
pub fn is_known_field(field: &str) -> bool {
    BOE_REQUIRED_FIELDS.contains(&field) || BOE_OPTIONAL_FIELDS.contains(&field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_replace_underscores() {
        assert_eq!(field_label("origin_city"), "origin city");
        assert_eq!(field_label("traveler_name"), "traveler's full name");
    }

    #[test]
    fn catalog_fields_are_known() {
        assert!(is_known_field("return_date"));
        assert!(is_known_field("hotel_nights"));
        assert!(!is_known_field("favorite_color"));
    }
}
