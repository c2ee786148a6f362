use super::Enricher;
use crate::inference::InferenceError;
use async_trait::async_trait;
use serde_json::Value;

/// Field holding the ISO country code.
const COUNTRY_CODE_FIELD: &str = "country";
/// Field populated with the country's full name.
pub const COUNTRY_NAME_FIELD: &str = "msbm_country_full_name";

const UNKNOWN_COUNTRY: &str = "Unknown";

const COUNTRY_NAMES: [(&str, &str); 26] = [
    ("AG", "Antigua and Barbuda"),
    ("AI", "Anguilla"),
    ("AW", "Aruba"),
    ("BB", "Barbados"),
    ("BM", "Bermuda"),
    ("BQ", "Bonaire"),
    ("BS", "Bahamas"),
    ("BZ", "Belize"),
    ("CU", "Cuba"),
    ("CW", "Curaçao"),
    ("DM", "Dominica"),
    ("DO", "Dominican Republic"),
    ("GD", "Grenada"),
    ("GP", "Guadeloupe"),
    ("HT", "Haiti"),
    ("JM", "Jamaica"),
    ("KN", "Saint Kitts and Nevis"),
    ("KY", "Cayman Islands"),
    ("LC", "Saint Lucia"),
    ("PR", "Puerto Rico"),
    ("SX", "Sint Maarten"),
    ("TC", "Turks and Caicos Islands"),
    ("TT", "Trinidad and Tobago"),
    ("VC", "Saint Vincent and the Grenadines"),
    ("VG", "British Virgin Islands"),
    ("VI", "U.S. Virgin Islands"),
];

/// Full name for a Caribbean ISO code, or `"Unknown"`.
pub fn country_full_name(code: &str) -> &'static str {
    let code = code.trim();
    COUNTRY_NAMES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map_or(UNKNOWN_COUNTRY, |(_, name)| name)
}

/// Deterministic backfill of country names; never calls a model.
pub struct CountryNameBackfill;

#[async_trait]
impl Enricher for CountryNameBackfill {
    fn name(&self) -> &str {
        "country"
    }

    fn input_field(&self) -> &str {
        COUNTRY_CODE_FIELD
    }

    fn target_field(&self) -> &str {
        COUNTRY_NAME_FIELD
    }

    /// Documents without a code are still resolved, to `"Unknown"`.
    fn input_fallback(&self) -> Option<&'static str> {
        Some("")
    }

    async fn enrich(&self, input: &str) -> Result<Value, InferenceError> {
        Ok(Value::String(country_full_name(input).to_string()))
    }
}
