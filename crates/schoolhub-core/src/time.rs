use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Formats a timestamp for log fields; falls back to the unix timestamp.
pub fn to_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_to_rfc3339() {
        let ts = datetime!(2019-01-09 08:30:00 UTC);
        assert_eq!(to_rfc3339(ts), "2019-01-09T08:30:00Z");
    }
}
