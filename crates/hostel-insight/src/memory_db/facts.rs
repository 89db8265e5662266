//! Session facts pulled out of what the user tells us.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLOCK_FACT: Regex =
        Regex::new(r"\bblocks?\s*(?:no|id|number|#|is|:)?\s*([0-9]{1,4})\b").unwrap();
    static ref ROLL_FACT: Regex =
        Regex::new(r"\broll(?:\s*no\.?|\s*number)?\s*(?:is|[:#])?\s*([a-z0-9][a-z0-9\-]*)\b").unwrap();
    static ref ALLERGY_FACT: Regex =
        Regex::new(r"\ballerg(?:y|ic|ies)\s*(?:to|is|are|:)?\s*([a-z0-9][a-z0-9 ,&\-]*)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub fact_type: &'static str,
    pub value: String,
}

impl Fact {
    fn new(fact_type: &'static str, value: impl Into<String>) -> Self {
        Self { fact_type, value: value.into() }
    }
}

/// First recognised fact in `text`: block number, then roll number, then
/// allergy. Roll numbers must contain a digit so that "my roll number" alone
/// is not mistaken for a value.
pub fn extract_fact(text: &str) -> Option<Fact> {
    let lower = text.to_lowercase();

    if let Some(caps) = BLOCK_FACT.captures(&lower) {
        return Some(Fact::new("block", &caps[1]));
    }

    if let Some(caps) = ROLL_FACT.captures(&lower) {
        let value = &caps[1];
        if value.chars().any(|c| c.is_ascii_digit()) {
            return Some(Fact::new("rollno", value.to_uppercase()));
        }
    }

    if let Some(caps) = ALLERGY_FACT.captures(&lower) {
        let value = caps[1].trim().trim_end_matches(|c: char| c == ',' || c == '&' || c == '-').trim();
        if !value.is_empty() {
            return Some(Fact::new("allergy", value));
        }
    }

    None
}
