//! Phone-derived identity keys.

pub const USER_ID_PREFIX: &str = "91";
pub const SUBSCRIBER_DIGITS: usize = 10;

/// Strip everything but digits and keep the last ten. `None` when fewer remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < SUBSCRIBER_DIGITS {
        return None;
    }
    Some(digits[digits.len() - SUBSCRIBER_DIGITS..].iter().collect())
}

pub fn generate_user_id(raw_phone: &str) -> Option<String> {
    normalize_phone(raw_phone).map(|digits| format!("{USER_ID_PREFIX}{digits}"))
}

pub fn validate_user_id(user_id: &str) -> bool {
    user_id.len() == USER_ID_PREFIX.len() + SUBSCRIBER_DIGITS
        && user_id.starts_with(USER_ID_PREFIX)
        && user_id.bytes().all(|b| b.is_ascii_digit())
}
