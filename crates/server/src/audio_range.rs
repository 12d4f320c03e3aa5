//! RFC 7233 byte-range parsing for the podcast audio endpoint (spec §6).
//! Pure parsing logic, no I/O, so it's unit-testable without a blob store.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No (valid) `Range` header: serve the whole object.
    Full,
    /// Inclusive byte range `[start, end]`.
    Partial { start: u64, end: u64 },
    /// The range cannot be satisfied against `total`.
    Unsatisfiable,
}

/// Parses a single-range `Range: bytes=...` header. Multi-range requests
/// (comma-separated) are not required by spec.md; only the first range is
/// honored, matching the common single-range case real clients send for
/// audio seeking.
pub fn parse_range(header: Option<&str>, total: u64) -> RangeOutcome {
    let Some(header) = header else { return RangeOutcome::Full };
    let Some(spec) = header.strip_prefix("bytes=") else { return RangeOutcome::Full };
    let spec = spec.split(',').next().unwrap_or("").trim();
    if total == 0 || spec.is_empty() {
        return RangeOutcome::Unsatisfiable;
    }

    if let Some(suffix) = spec.strip_prefix('-') {
        return match suffix.parse::<u64>() {
            Ok(0) | Err(_) => RangeOutcome::Unsatisfiable,
            Ok(n) => {
                let n = n.min(total);
                RangeOutcome::Partial { start: total - n, end: total - 1 }
            }
        };
    }

    let mut parts = spec.splitn(2, '-');
    let start_str = parts.next().unwrap_or("");
    let end_str = parts.next().unwrap_or("");

    let Ok(start) = start_str.parse::<u64>() else { return RangeOutcome::Unsatisfiable };
    if start >= total {
        return RangeOutcome::Unsatisfiable;
    }

    let end = if end_str.is_empty() {
        total - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(e) => e.min(total - 1),
            Err(_) => return RangeOutcome::Unsatisfiable,
        }
    };

    if end < start {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Partial { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_serves_full_object() {
        assert_eq!(parse_range(None, 10_000), RangeOutcome::Full);
    }

    #[test]
    fn leading_range_is_honored() {
        assert_eq!(parse_range(Some("bytes=0-999"), 10_000), RangeOutcome::Partial { start: 0, end: 999 });
    }

    #[test]
    fn suffix_range_takes_last_n_bytes() {
        assert_eq!(parse_range(Some("bytes=-500"), 10_000), RangeOutcome::Partial { start: 9_500, end: 9_999 });
    }

    #[test]
    fn open_range_runs_to_the_end() {
        assert_eq!(parse_range(Some("bytes=9000-"), 10_000), RangeOutcome::Partial { start: 9_000, end: 9_999 });
    }

    #[test]
    fn out_of_bounds_range_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=20000-30000"), 10_000), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn suffix_longer_than_object_clamps_to_whole_object() {
        assert_eq!(parse_range(Some("bytes=-50000"), 10_000), RangeOutcome::Partial { start: 0, end: 9_999 });
    }

    #[test]
    fn malformed_unit_is_ignored() {
        assert_eq!(parse_range(Some("items=0-1"), 10_000), RangeOutcome::Full);
    }
}
