//! CSV record parsing for sheet exports.
//!
//! The parser is deliberately lenient: malformed rows never fail the whole
//! payload. Each row goes through [`RowPolicy::evaluate`], which either yields a
//! [`MetricRecord`] or a [`RejectReason`]; rejected rows are collected in the
//! [`ParseReport`] so drop counts stay observable.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};
use std::mem::take;

use crate::models::MetricRecord;

/// Logical columns of a metrics sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Field {
    #[display("member")]
    Member,
    #[display("video_id")]
    VideoId,
    #[display("updated_at")]
    UpdatedAt,
    #[display("view_count")]
    ViewCount,
    #[display("like_count")]
    LikeCount,
    #[display("comment_count")]
    CommentCount,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Member,
        Field::VideoId,
        Field::UpdatedAt,
        Field::ViewCount,
        Field::LikeCount,
        Field::CommentCount,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Header aliases for each logical column.
///
/// Defaults accept the sheet's native headers as well as snake_case English.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    aliases: [Vec<String>; 6],
}

impl Default for ColumnMap {
    fn default() -> Self {
        let aliases = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            aliases: [
                aliases(&["成员", "member"]),
                aliases(&["视频ID", "video_id", "videoId"]),
                aliases(&["更新时间", "updated_at", "updatedAt"]),
                aliases(&["观看次数", "view_count", "viewCount"]),
                aliases(&["点赞数", "like_count", "likeCount"]),
                aliases(&["评论数", "comment_count", "commentCount"]),
            ],
        }
    }
}

impl ColumnMap {
    /// Add an extra header name for a column
    pub fn with_alias(mut self, field: Field, alias: impl Into<String>) -> Self {
        self.aliases[field.index()].push(alias.into());
        self
    }

    fn matches(&self, field: Field, header: &str) -> bool {
        let header = normalize_header(header);
        self.aliases[field.index()]
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(header))
    }

    /// Resolve column indices against a header row
    fn resolve(&self, header: &[String]) -> [Option<usize>; 6] {
        let mut resolved = [None; 6];
        for field in Field::ALL {
            resolved[field.index()] = header.iter().position(|h| self.matches(field, h));
        }
        resolved
    }
}

fn normalize_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

/// Why a row was dropped
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RejectReason {
    #[display("missing required field '{_0}'")]
    MissingField(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based physical line where the row starts (header is line 1)
    pub line: usize,
    pub reason: RejectReason,
}

/// Outcome of parsing one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub records: Vec<MetricRecord>,
    pub rejected: Vec<RejectedRow>,
    /// Rows whose timestamp could not be parsed and fell back to "now"
    pub lenient_timestamps: usize,
}

impl ParseReport {
    pub fn accepted_count(&self) -> usize {
        self.records.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// An accepted row and whether its timestamp was defaulted
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRow {
    pub record: MetricRecord,
    pub lenient_timestamp: bool,
}

/// Row accept/reject policy.
///
/// Member, video ID and update timestamp must be non-empty. Everything else is
/// normalized rather than rejected.
#[derive(Debug, Clone, Copy)]
pub struct RowPolicy {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

impl RowPolicy {
    pub fn evaluate(&self, values: &[&str; 6]) -> Result<AcceptedRow, RejectReason> {
        let get = |field: Field| values[field.index()].trim();

        for field in [Field::Member, Field::VideoId, Field::UpdatedAt] {
            if get(field).is_empty() {
                return Err(RejectReason::MissingField(field));
            }
        }

        let (updated_at, lenient_timestamp) =
            match parse_timestamp(get(Field::UpdatedAt), self.offset) {
                Some(ts) => (ts, false),
                None => (self.now, true),
            };

        Ok(AcceptedRow {
            record: MetricRecord {
                member: get(Field::Member).to_string(),
                video_id: get(Field::VideoId).to_string(),
                updated_at,
                view_count: parse_count(get(Field::ViewCount)),
                like_count: parse_count(get(Field::LikeCount)),
                comment_count: parse_count(get(Field::CommentCount)),
            },
            lenient_timestamp,
        })
    }
}

/// CSV parser for metric sheets
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: char,
    columns: ColumnMap,
    offset: FixedOffset,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self {
            delimiter: ',',
            columns: ColumnMap::default(),
            offset: utc_offset(0),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    /// Offset applied to timestamps that carry no zone information
    pub fn with_utc_offset_hours(mut self, hours: i32) -> Self {
        self.offset = utc_offset(hours);
        self
    }

    /// Parse a whole payload, using `now` for unparseable timestamps.
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> ParseReport {
        let mut rows = split_records(text, self.delimiter).into_iter();
        let mut report = ParseReport::default();

        let Some((_, header)) = rows.next() else {
            return report;
        };
        let columns = self.columns.resolve(&header);
        let policy = RowPolicy {
            now,
            offset: self.offset,
        };

        for (line, fields) in rows {
            let mut values = [""; 6];
            for field in Field::ALL {
                if let Some(value) = columns[field.index()].and_then(|i| fields.get(i)) {
                    values[field.index()] = value.as_str();
                }
            }

            match policy.evaluate(&values) {
                Ok(accepted) => {
                    if accepted.lenient_timestamp {
                        report.lenient_timestamps += 1;
                    }
                    report.records.push(accepted.record);
                }
                Err(reason) => report.rejected.push(RejectedRow { line, reason }),
            }
        }

        report
    }
}

fn utc_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
}

/// Split delimited text into records with a quote-toggle state machine.
///
/// Returns each non-blank record with the 1-based line it starts on. A doubled
/// quote inside a quoted field yields a literal quote; line breaks inside quotes
/// stay part of the field.
pub fn split_records(text: &str, delimiter: char) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut chars = text.chars().peekable();

    let mut flush_row = |row: &mut Vec<String>, start: usize| {
        let blank = row.iter().all(|f: &String| f.trim().is_empty());
        if !blank {
            records.push((start, take(row)));
        } else {
            row.clear();
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            }
            c if c == delimiter && !in_quotes => row.push(take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                flush_row(&mut row, row_start);
                line += 1;
                row_start = line;
            }
            '\n' => {
                field.push(ch);
                line += 1;
            }
            _ => field.push(ch),
        }
    }

    // 末尾の改行がない場合や引用符が閉じていない場合も残りを出力
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        flush_row(&mut row, row_start);
    }

    records
}

/// Normalize a count such as `"1,234"` to an integer.
///
/// Leading digits are honoured (`"12abc"` → 12); anything without digits,
/// or negative, becomes 0.
pub fn parse_count(value: &str) -> u64 {
    let cleaned: String = value.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(cleaned)),
    };
    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() || negative {
        return 0;
    }
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

const NAIVE_DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
];

const NAIVE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Permissive timestamp parsing.
///
/// Zoned values (RFC 3339) keep their zone; naive values are read in `offset`.
pub fn parse_timestamp(value: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize records with the canonical English header
pub fn write_records(records: &[MetricRecord], delimiter: char) -> String {
    let sep = delimiter.to_string();
    let mut out = Field::ALL
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(&sep);
    out.push('\n');

    for record in records {
        let fields = [
            escape_csv_field(&record.member, delimiter),
            escape_csv_field(&record.video_id, delimiter),
            record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.view_count.to_string(),
            record.like_count.to_string(),
            record.comment_count.to_string(),
        ];
        out.push_str(&fields.join(&sep));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_split_records_quotes_and_delimiters() {
        let rows = split_records("a,\"b,c\",d\n\"say \"\"hi\"\"\",2,3\n", ',');
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, vec!["a", "b,c", "d"]);
        assert_eq!(rows[1].1, vec!["say \"hi\"", "2", "3"]);
    }

    #[test]
    fn test_split_records_line_numbers_and_blank_lines() {
        let rows = split_records("h1,h2\r\n\r\nx,\"multi\nline\"\ny,z", ',');
        let lines: Vec<_> = rows.iter().map(|(line, _)| *line).collect();
        assert_eq!(lines, vec![1, 3, 5]);
        assert_eq!(rows[1].1[1], "multi\nline");
        assert_eq!(rows[2].1, vec!["y", "z"]);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count(" 12,345,678 "), 12_345_678);
        assert_eq!(parse_count("12abc"), 12);
        assert_eq!(parse_count("1.9"), 1);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("n/a"), 0);
        assert_eq!(parse_count("-5"), 0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = utc_offset(0);
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:00Z", utc), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:00", utc), Some(expected));
        assert_eq!(parse_timestamp("2024/01/02 03:04", utc), Some(expected));
        assert_eq!(parse_timestamp("2024/1/2 3:04", utc), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-02", utc),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday", utc), None);
    }

    #[test]
    fn test_parse_timestamp_naive_uses_offset() {
        let cst = utc_offset(8);
        assert_eq!(
            parse_timestamp("2024-01-02 08:00:00", cst),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        // 明示的なゾーンはオフセット設定より優先
        assert_eq!(
            parse_timestamp("2024-01-02T08:00:00+00:00", cst),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_native_headers() {
        let text = "成员,视频ID,更新时间,观看次数,点赞数,评论数\n\
                    A,v1,2024-01-01T00:00:00Z,\"1,000\",50,7\n";
        let report = CsvParser::new().parse(text, now());
        assert_eq!(report.accepted_count(), 1);
        let record = &report.records[0];
        assert_eq!(record.member, "A");
        assert_eq!(record.video_id, "v1");
        assert_eq!(record.view_count, 1000);
        assert_eq!(record.like_count, 50);
        assert_eq!(record.comment_count, 7);
    }

    #[test]
    fn test_rows_missing_required_fields_are_rejected() {
        let text = "member,video_id,updated_at,view_count\n\
                    A,v1,2024-01-01T00:00:00Z,1\n\
                    ,v1,2024-01-01T00:00:00Z,1\n\
                    B,,2024-01-01T00:00:00Z,1\n\
                    C,v1,,1\n";
        let report = CsvParser::new().parse(text, now());
        assert_eq!(report.accepted_count(), 1);
        assert_eq!(
            report.rejected,
            vec![
                RejectedRow {
                    line: 3,
                    reason: RejectReason::MissingField(Field::Member),
                },
                RejectedRow {
                    line: 4,
                    reason: RejectReason::MissingField(Field::VideoId),
                },
                RejectedRow {
                    line: 5,
                    reason: RejectReason::MissingField(Field::UpdatedAt),
                },
            ]
        );
    }

    #[test]
    fn test_unparseable_timestamp_defaults_to_now() {
        let text = "member,video_id,updated_at\nA,v1,not a date\n";
        let report = CsvParser::new().parse(text, now());
        assert_eq!(report.records[0].updated_at, now());
        assert_eq!(report.lenient_timestamps, 1);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn test_missing_metric_columns_default_to_zero() {
        let text = "\u{feff}member , video_id,updated_at\nA,v1,2024-01-01\n";
        let report = CsvParser::new().parse(text, now());
        assert_eq!(report.accepted_count(), 1);
        assert_eq!(report.records[0].view_count, 0);
        assert_eq!(report.records[0].comment_count, 0);
    }

    #[test]
    fn test_custom_alias_and_delimiter() {
        let columns = ColumnMap::default().with_alias(Field::Member, "channel");
        let parser = CsvParser::new().with_delimiter('\t').with_columns(columns);
        let report = parser.parse("channel\tvideo_id\tupdated_at\nA\tv\t2024-01-01\n", now());
        assert_eq!(report.records[0].member, "A");
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(CsvParser::new().parse("", now()), ParseReport::default());
        let header_only = CsvParser::new().parse("member,video_id,updated_at\n", now());
        assert_eq!(header_only.accepted_count(), 0);
    }

    #[test]
    fn test_write_then_parse_preserves_values() {
        let text = "member,video_id,updated_at,view_count,like_count,comment_count\n\
                    A,v1,2024-01-01T00:00:00Z,\"1,234\",\"5,678\",9\n\
                    B,v2,2024-01-02T06:30:00Z,10,0,1\n";
        let parser = CsvParser::new();
        let first = parser.parse(text, now());
        let written = write_records(&first.records, ',');
        let second = parser.parse(&written, now());

        assert_eq!(first.records, second.records);
        assert_eq!(second.records[0].view_count, 1234);
        assert_eq!(second.records[0].like_count, 5678);
        assert!(written
            .starts_with("member,video_id,updated_at,view_count,like_count,comment_count\n"));
        assert!(written.contains("A,v1,2024-01-01T00:00:00Z,1234,5678,9"));
    }

    #[test]
    fn test_write_escapes_embedded_delimiters() {
        let record = MetricRecord {
            member: "A, the \"first\"".to_string(),
            video_id: "v".to_string(),
            updated_at: now(),
            view_count: 1,
            like_count: 1,
            comment_count: 1,
        };
        let written = write_records(&[record.clone()], ',');
        let report = CsvParser::new().parse(&written, now());
        assert_eq!(report.records, vec![record]);
    }
}
