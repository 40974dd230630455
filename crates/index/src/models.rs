//! Row models and listing parameters for the membership index.

use strata_core::{ContainerType, MemberType};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Container record in the `containers` table.
#[derive(Debug, Clone)]
pub struct ContainerRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub container_type: ContainerType,
    pub title: String,
    pub description: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Containment edge in the `memberships` table.
///
/// Primary key is `(container_id, member_id)`; `member_type` is derived at
/// insertion time by probing container existence.
#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub container_id: String,
    pub member_id: String,
    pub member_type: MemberType,
    pub created_at: OffsetDateTime,
}

/// Filter predicates for member listing.
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    /// Equality filter on the derived member type.
    pub member_type: Option<MemberType>,
    /// Substring filter on the member ID.
    pub name_pattern: Option<String>,
}

impl MemberFilter {
    pub fn is_empty(&self) -> bool {
        self.member_type.is_none() && self.name_pattern.is_none()
    }
}

/// Sort key for member listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    /// Sort by member ID.
    Name,
    /// Sort by edge creation time (insertion order).
    #[default]
    CreatedAt,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort specification for member listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberSort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Aggregate statistics for one container's members.
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    /// Total number of members.
    pub member_count: u64,
    /// Members that are themselves containers.
    pub container_count: u64,
    /// Members that are plain resources.
    pub resource_count: u64,
}

const SQLITE_DATETIME: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const SQLITE_DATETIME_FRAC: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");

// Fixed nine-digit subseconds: RFC 3339 output would drop ".0" entirely for
// whole-second values, and since 'Z' sorts after '.' those rows would order
// after every fractional timestamp in the same second under TEXT ORDER BY.
const STORED_TIMESTAMP: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");

/// Parse a timestamp from its textual database form.
///
/// The two backends serialize timestamps differently, so parsing tries RFC
/// 3339 first, then SQLite's `datetime()` forms (with and without fractional
/// seconds, assumed UTC). An unparseable value falls back to the current time
/// with a warning rather than silently corrupting ordering.
pub fn parse_timestamp(s: &str) -> OffsetDateTime {
    if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
        return t;
    }
    if let Ok(t) = time::PrimitiveDateTime::parse(s, SQLITE_DATETIME_FRAC) {
        return t.assume_utc();
    }
    if let Ok(t) = time::PrimitiveDateTime::parse(s, SQLITE_DATETIME) {
        return t.assume_utc();
    }
    tracing::warn!(value = s, "unparseable timestamp in index row, substituting current time");
    OffsetDateTime::now_utc()
}

/// Format a timestamp for textual storage: UTC, RFC 3339 compatible, with a
/// fixed subsecond width so lexicographic order equals time order.
pub fn format_timestamp(t: OffsetDateTime) -> crate::IndexResult<String> {
    t.to_offset(time::UtcOffset::UTC)
        .format(STORED_TIMESTAMP)
        .map_err(|e| crate::IndexError::Internal(format!("timestamp format: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let t = parse_timestamp("2024-05-01T12:00:00.5Z");
        assert_eq!(t.year(), 2024);
        assert_eq!(t.millisecond(), 500);
    }

    #[test]
    fn test_parse_sqlite_datetime() {
        let t = parse_timestamp("2024-05-01 12:00:00");
        assert_eq!(t.hour(), 12);
        let t = parse_timestamp("2024-05-01 12:00:00.250");
        assert_eq!(t.millisecond(), 250);
    }

    #[test]
    fn test_parse_garbage_falls_back_to_now() {
        let before = OffsetDateTime::now_utc();
        let t = parse_timestamp("not a timestamp");
        assert!(t >= before);
    }

    #[test]
    fn test_format_roundtrip() {
        let now = OffsetDateTime::now_utc();
        let text = format_timestamp(now).unwrap();
        assert_eq!(parse_timestamp(&text), now);
    }

    #[test]
    fn test_text_order_matches_time_order_at_whole_seconds() {
        let whole = time::macros::datetime!(2024-05-01 12:00:00 UTC);
        let frac = time::macros::datetime!(2024-05-01 12:00:00.5 UTC);

        let whole_text = format_timestamp(whole).unwrap();
        let frac_text = format_timestamp(frac).unwrap();
        assert!(whole_text.ends_with(".000000000Z"));
        assert!(whole_text < frac_text);
        assert_eq!(parse_timestamp(&whole_text), whole);
    }
}
