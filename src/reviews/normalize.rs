/// Normalization helpers shared by every source adapter
///
/// Vendors disagree on field names even inside one ecosystem, so adapters
/// describe each field as an ordered list of JSON paths and take the first
/// one that resolves to a usable value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Rating assumed when a vendor item carries none
pub const MISSING_RATING: f64 = 3.0;

/// Author used when a vendor item carries none
pub const ANONYMOUS: &str = "Anonymous";

/// Content used for star-only reviews
pub const RATING_ONLY: &str = "(rating only)";

/// A JSON path such as `&["reviewer", "displayName"]`.
/// Numeric segments index into arrays.
pub type FieldPath = &'static [&'static str];

/// Ratings above 5 are on a 10-point scale
pub fn normalize_rating(raw: f64) -> f64 {
    if raw > 5.0 {
        raw / 2.0
    } else {
        raw
    }
}

/// Force a normalized rating into the stored [1, 5] range
pub fn clamp_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        MISSING_RATING
    } else {
        rating.clamp(1.0, 5.0)
    }
}

fn lookup<'a>(item: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(item, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First non-blank string found along `paths`
pub fn first_text(item: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(item, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// First number (or numeric string) found along `paths`
pub fn first_number(item: &Value, paths: &[FieldPath]) -> Option<f64> {
    paths.iter().find_map(|path| match lookup(item, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    })
}

/// First parseable date found along `paths`
pub fn first_date(item: &Value, paths: &[FieldPath]) -> Option<DateTime<Utc>> {
    paths
        .iter()
        .find_map(|path| lookup(item, path).and_then(parse_date))
}

/// Parse RFC 3339, common SQL-ish layouts, plain dates, or epoch seconds/millis
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => match n.as_i64() {
            Some(raw) => from_epoch(raw as f64),
            None => from_epoch(n.as_f64()?),
        },
        _ => None,
    }
}

/// Epoch seconds or millis, fractional values allowed
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }

    // Anything past year 5138 in seconds is really millis
    if raw.abs() >= 100_000_000_000.0 {
        return Utc.timestamp_millis_opt(raw.round() as i64).single();
    }

    let secs = raw.floor();
    let nanos = (((raw - secs) * 1e9).round() as u32).min(999_999_999);
    Utc.timestamp_opt(secs as i64, nanos).single()
}

/// Digit strings long enough to be an epoch (1973 onwards), not a bare year
fn epoch_str(s: &str) -> Option<f64> {
    let (whole, fraction) = s.split_once('.').unwrap_or((s, "0"));
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if whole.len() < 9 || !digits(whole) || !digits(fraction) {
        return None;
    }
    s.parse().ok()
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    if let Some(raw) = epoch_str(s) {
        return from_epoch(raw);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// One piece of review text
#[derive(Debug, Clone, Copy)]
pub enum ContentPart<'a> {
    Title(&'a str),
    Pros(&'a str),
    Cons(&'a str),
    Text(&'a str),
}

impl ContentPart<'_> {
    fn text(&self) -> &str {
        match self {
            ContentPart::Title(s)
            | ContentPart::Pros(s)
            | ContentPart::Cons(s)
            | ContentPart::Text(s) => s.trim(),
        }
    }

    fn marked(&self) -> String {
        match self {
            ContentPart::Pros(s) => format!("👍 {}", s.trim()),
            ContentPart::Cons(s) => format!("👎 {}", s.trim()),
            ContentPart::Title(s) | ContentPart::Text(s) => s.trim().to_string(),
        }
    }
}

/// Join the non-empty parts into one content string.
/// Markers are only added when more than one part is present.
pub fn compose_content(parts: &[ContentPart<'_>]) -> String {
    let present: Vec<&ContentPart<'_>> = parts.iter().filter(|p| !p.text().is_empty()).collect();

    match present.as_slice() {
        [] => RATING_ONLY.to_string(),
        [only] => only.text().to_string(),
        many => many
            .iter()
            .map(|p| p.marked())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_rating_ten_point_scale() {
        assert_eq!(normalize_rating(8.4), 4.2);
        assert_eq!(normalize_rating(10.0), 5.0);
        assert_eq!(normalize_rating(5.0), 5.0);
        assert_eq!(normalize_rating(3.0), 3.0);
    }

    #[test]
    fn test_first_text_follows_priority_order() {
        let item = json!({
            "name": "",
            "reviewer": { "displayName": "Jordan" },
            "author": "Fallback"
        });

        let author = first_text(
            &item,
            &[&["name"], &["reviewer", "displayName"], &["author"]],
        );
        assert_eq!(author.as_deref(), Some("Jordan"));
        assert_eq!(first_text(&item, &[&["missing"]]), None);
    }

    #[test]
    fn test_first_text_indexes_arrays() {
        let item = json!({ "reviews": [{ "text": "first" }, { "text": "second" }] });
        assert_eq!(
            first_text(&item, &[&["reviews", "1", "text"]]).as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_first_number_accepts_numeric_strings() {
        let item = json!({ "score": "8,5", "stars": 4 });
        assert_eq!(first_number(&item, &[&["score"]]), Some(8.5));
        assert_eq!(first_number(&item, &[&["rating"], &["stars"]]), Some(4.0));
        assert_eq!(first_number(&json!({ "score": "n/a" }), &[&["score"]]), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap();

        assert_eq!(parse_date(&json!("2024-03-05T10:30:00Z")), Some(expected));
        assert_eq!(parse_date(&json!("2024-03-05 10:30:00")), Some(expected));
        assert_eq!(parse_date(&json!(expected.timestamp())), Some(expected));
        assert_eq!(parse_date(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(
            parse_date(&json!("2024-03-05")),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date(&json!("last week")), None);
        assert_eq!(parse_date(&json!("2024")), None);
    }

    #[test]
    fn test_parse_date_fractional_and_string_epochs() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap();
        let secs = expected.timestamp();
        let millis = expected.timestamp_millis();

        let fractional = parse_date(&json!(secs as f64 + 0.5)).unwrap();
        assert_eq!(fractional.timestamp(), secs);
        assert_eq!(fractional.timestamp_subsec_millis(), 500);

        assert_eq!(parse_date(&json!(millis as f64)), Some(expected));
        assert_eq!(parse_date(&json!(secs.to_string())), Some(expected));
        assert_eq!(parse_date(&json!(millis.to_string())), Some(expected));
        assert_eq!(parse_date(&json!(format!("{}.000", secs))), Some(expected));
    }

    #[test]
    fn test_first_date_skips_unparseable_fields() {
        let item = json!({ "date": "yesterday", "publishedAt": "2023-12-31" });
        let date = first_date(&item, &[&["date"], &["publishedAt"]]).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_compose_content_single_part_has_no_markers() {
        assert_eq!(compose_content(&[ContentPart::Pros("Great pool")]), "Great pool");
    }

    #[test]
    fn test_compose_content_marks_multiple_parts() {
        let content = compose_content(&[
            ContentPart::Title("Fantastic"),
            ContentPart::Pros("Great pool"),
            ContentPart::Cons("  "),
            ContentPart::Cons("Noisy street"),
        ]);
        assert_eq!(content, "Fantastic\n👍 Great pool\n👎 Noisy street");
    }

    #[test]
    fn test_compose_content_empty() {
        assert_eq!(compose_content(&[ContentPart::Text("")]), RATING_ONLY);
    }
}
