use rand::Rng;

/// Short random id used to correlate log lines for one negotiation.
pub fn random_id() -> String {
    format!("{:016x}", rand::rng().random::<u64>())
}

/// Strips display grouping before a code goes on the wire.
pub fn normalize_session_code(code: &str) -> String {
    code.trim().chars().filter(|c| *c != '-').collect()
}

/// Groups a 9-digit session code as 3-3-3 for display.
/// Partial codes are grouped as far as they go.
pub fn format_session_code(code: &str) -> String {
    let clean = normalize_session_code(code);
    if clean.len() <= 3 {
        clean
    } else if clean.len() <= 6 {
        format!("{}-{}", &clean[..3], &clean[3..])
    } else {
        format!("{}-{}-{}", &clean[..3], &clean[3..6], &clean[6..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_full_code_in_groups_of_three() {
        assert_eq!(format_session_code("123456789"), "123-456-789");
    }

    #[test]
    fn formats_partial_codes() {
        assert_eq!(format_session_code("12"), "12");
        assert_eq!(format_session_code("1234"), "123-4");
        assert_eq!(format_session_code("1234567"), "123-456-7");
    }

    #[test]
    fn normalize_strips_dashes_and_whitespace() {
        assert_eq!(normalize_session_code(" 123-456-789 "), "123456789");
        assert_eq!(normalize_session_code("123456789"), "123456789");
    }

    #[test]
    fn random_ids_are_hex_and_distinct() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
