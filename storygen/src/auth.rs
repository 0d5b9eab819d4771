/// Shared-secret check for the generation endpoint: exact, case-sensitive equality.
pub fn key_matches(provided: &str, expected: &str) -> bool {
    provided == expected
}
