use time::format_description::FormatItem;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const HTTP_DATE_FORMAT: &[FormatItem<'_>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

const LIST_DATE_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Formats POSIX seconds as an RFC-1123-style GMT string with fixed
/// English weekday and month names.
#[must_use]
pub(crate) fn format_http_datetime(posix: i64) -> String {
    let odt = OffsetDateTime::from_unix_timestamp(posix).expect("POSIX seconds should be in range");

    odt.format(HTTP_DATE_FORMAT).expect("date should be valid")
}

/// Formats POSIX seconds as `YYYY-MM-DD HH:MM:SS` in UTC for listing output.
#[must_use]
pub(crate) fn format_list_datetime(posix: i64) -> String {
    let odt = OffsetDateTime::from_unix_timestamp(posix).expect("POSIX seconds should be in range");

    odt.format(LIST_DATE_FORMAT).expect("date should be valid")
}

/// Parses an HTTP datetime (`Last-Modified` and friends) into POSIX seconds.
#[must_use]
pub(crate) fn parse_http_datetime(value: &str) -> Option<i64> {
    OffsetDateTime::parse(value, &Rfc2822)
        .ok()
        .map(OffsetDateTime::unix_timestamp)
}

#[must_use]
fn month_from_name(name: &str) -> Option<Month> {
    Some(match name {
        "Jan" => Month::January,
        "Feb" => Month::February,
        "Mar" => Month::March,
        "Apr" => Month::April,
        "May" => Month::May,
        "Jun" => Month::June,
        "Jul" => Month::July,
        "Aug" => Month::August,
        "Sep" => Month::September,
        "Oct" => Month::October,
        "Nov" => Month::November,
        "Dec" => Month::December,
        _ => return None,
    })
}

#[must_use]
fn word(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses the value of an `InRelease` `Date:` field into POSIX seconds,
/// treating the timestamp as UTC.
///
/// The accepted grammar is `<weekday>, <day> <month> <year> <h>:<m>:<s>`
/// with single-digit days permitted, only the English three-letter month
/// names recognised, and anything after the seconds ignored. Returns
/// [None] on any mismatch; such a value is unusable for selection.
#[must_use]
pub(crate) fn parse_date_field(value: &str) -> Option<i64> {
    let (weekday, rest) = value.trim_start().split_once(',')?;
    if !word(weekday) {
        return None;
    }

    let mut fields = rest.split_ascii_whitespace();

    let day = fields.next()?.parse::<u8>().ok()?;

    let month = month_from_name(fields.next()?)?;

    let year = fields.next()?.parse::<i32>().ok()?;

    let clock = fields.next()?;
    let (hour, clock_rest) = clock.split_once(':')?;
    let (minute, second_rest) = clock_rest.split_once(':')?;
    /* trailing junk may follow the seconds without separation */
    let second_digits = second_rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(second_rest, |end| &second_rest[..end]);

    let hour = hour.parse::<u8>().ok()?;
    let minute = minute.parse::<u8>().ok()?;
    let second = second_digits.parse::<u8>().ok()?;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;

    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use crate::datetime::{
        format_http_datetime, format_list_datetime, parse_date_field, parse_http_datetime,
    };

    #[test]
    fn format_datetime_test() {
        assert_eq!(format_http_datetime(0), "Thu, 01 Jan 1970 00:00:00 GMT");

        assert_eq!(
            format_http_datetime(12_345_678_909),
            "Tue, 21 Mar 2361 19:15:09 GMT"
        );

        assert_eq!(
            format_http_datetime(1_700_000_000),
            "Tue, 14 Nov 2023 22:13:20 GMT"
        );
    }

    #[test]
    fn format_list_datetime_test() {
        assert_eq!(format_list_datetime(0), "1970-01-01 00:00:00");
        assert_eq!(format_list_datetime(1_700_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn parse_datetime_test() {
        assert_eq!(parse_http_datetime("Thu, 01 Jan 1970 00:00:00 GMT"), Some(0));

        assert_eq!(
            parse_http_datetime("Tue, 21 Mar 2361 19:15:09 GMT"),
            Some(12_345_678_909)
        );

        assert_eq!(parse_http_datetime("not a date"), None);
    }

    #[test]
    fn roundtrip_test() {
        for posix in [0, 1, 59, 1_700_000_000, 1_700_086_400, 12_345_678_909] {
            assert_eq!(parse_http_datetime(&format_http_datetime(posix)), Some(posix));
            assert_eq!(parse_date_field(&format_http_datetime(posix)), Some(posix));
        }
    }

    #[test]
    fn parse_date_field_test() {
        /* valid */

        assert_eq!(
            parse_date_field("Tue, 14 Nov 2023 22:13:20 UTC"),
            Some(1_700_000_000)
        );

        assert_eq!(
            parse_date_field("  Wed, 15 Nov 2023 22:13:20 +0000"),
            Some(1_700_086_400)
        );

        /* single-digit day */
        assert_eq!(parse_date_field("Thu, 1 Jan 1970 00:00:10"), Some(10));

        /* junk directly after the seconds */
        assert_eq!(parse_date_field("Thu, 1 Jan 1970 00:00:10.5Z"), Some(10));

        /* the weekday name itself is not validated */
        assert_eq!(parse_date_field("Di, 14 Nov 2023 22:13:20"), Some(1_700_000_000));

        /* invalid */

        assert_eq!(parse_date_field(""), None);
        assert_eq!(parse_date_field("14 Nov 2023 22:13:20"), None);
        assert_eq!(parse_date_field("Tue, 14 November 2023 22:13:20"), None);
        assert_eq!(parse_date_field("Tue, 14 Nov. 2023 22:13:20"), None);
        assert_eq!(parse_date_field("Tue, 14 Nov 2023 22:13"), None);
        assert_eq!(parse_date_field("Tue, 31 Nov 2023 22:13:20"), None);
        assert_eq!(parse_date_field("Tue, 14 Nov 2023 25:13:20"), None);
        assert_eq!(parse_date_field("Tue; 14 Nov 2023 22:13:20"), None);
    }
}
