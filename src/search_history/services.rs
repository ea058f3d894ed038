use time::Duration;

pub const MAX_QUERY_CHARS: usize = 255;
pub const MAX_CONTEXT_CHARS: usize = 50;
pub const DEFAULT_CONTEXT: &str = "catalog";
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;

/// Identical searches inside this window are stored once.
pub const DEDUP_WINDOW: Duration = Duration::minutes(10);

pub fn normalize_query(raw: &str) -> Result<String, &'static str> {
    let q = raw.trim();
    if q.is_empty() {
        return Err("Search query is required");
    }
    if q.chars().count() > MAX_QUERY_CHARS {
        return Err("Search query must be at most 255 characters");
    }
    Ok(q.to_string())
}

pub fn normalize_context(raw: Option<&str>) -> Result<String, &'static str> {
    let ctx = raw.map(str::trim).filter(|c| !c.is_empty());
    match ctx {
        None => Ok(DEFAULT_CONTEXT.to_string()),
        Some(c) if c.chars().count() > MAX_CONTEXT_CHARS => {
            Err("Search context must be at most 50 characters")
        }
        Some(c) => Ok(c.to_string()),
    }
}

/// Context filter for reads and clears; blank means every context.
pub fn context_filter(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|c| !c.is_empty())
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_are_trimmed_and_bounded() {
        assert_eq!(normalize_query("  dune  ").unwrap(), "dune");
        assert!(normalize_query("   ").is_err());
        assert!(normalize_query(&"x".repeat(255)).is_ok());
        assert!(normalize_query(&"x".repeat(256)).is_err());
    }

    #[test]
    fn context_defaults_to_catalog() {
        assert_eq!(normalize_context(None).unwrap(), "catalog");
        assert_eq!(normalize_context(Some("  ")).unwrap(), "catalog");
        assert_eq!(normalize_context(Some("authors")).unwrap(), "authors");
        assert!(normalize_context(Some(&"c".repeat(51))).is_err());
        assert_eq!(context_filter(Some(" ")), None);
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(500)), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
    }
}
