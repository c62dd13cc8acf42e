pub const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;
pub const MAX_EXTRACTION_CONCURRENCY: usize = 32;

pub const CONCURRENCY_ENV: &str = "IAM_FINDER_CONCURRENCY";

pub fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_EXTRACTION_CONCURRENCY)
}

/// `IAM_FINDER_CONCURRENCY` when set and numeric, `default_value` otherwise.
pub fn concurrency_from_env(default_value: usize) -> usize {
    let raw = std::env::var(CONCURRENCY_ENV).ok();
    parse_concurrency(raw.as_deref(), default_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_concurrency_defaults_and_clamps() {
        let default_value = DEFAULT_EXTRACTION_CONCURRENCY;
        assert_eq!(parse_concurrency(None, default_value), default_value);
        assert_eq!(parse_concurrency(Some(""), default_value), default_value);
        assert_eq!(parse_concurrency(Some("   "), default_value), default_value);
        assert_eq!(parse_concurrency(Some("2"), default_value), 2);
        assert_eq!(parse_concurrency(Some("0"), default_value), 1);
        assert_eq!(
            parse_concurrency(Some("999"), default_value),
            MAX_EXTRACTION_CONCURRENCY
        );
        assert_eq!(parse_concurrency(Some("abc"), default_value), default_value);
        assert_eq!(parse_concurrency(Some(" 5 "), default_value), 5);
    }
}
