//! サマリーシートのパーサー
//!
//! サマリーシートはヘッダー名ではなく列位置で読む:
//! 1 = メンバー, 4 = 動画キー, 5 = 再生回数, 6 = 高評価数, 7 = 高評価率

use super::csv::{parse_count, split_records};
use crate::models::SummaryRecord;

const MEMBER_COLUMN: usize = 1;
const VIDEO_KEY_COLUMN: usize = 4;
const VIEW_COUNT_COLUMN: usize = 5;
const LIKE_COUNT_COLUMN: usize = 6;
const LIKE_RATIO_COLUMN: usize = 7;

/// サマリーCSVを解析（先頭行はヘッダーとして読み飛ばす）
///
/// メンバーまたは動画キーが空の行は除外する。
pub fn parse_summary(text: &str) -> Vec<SummaryRecord> {
    split_records(text, ',')
        .into_iter()
        .skip(1)
        .filter_map(|(_, cols)| {
            let col = |i: usize| cols.get(i).map(|s| s.trim()).unwrap_or_default();

            let member = col(MEMBER_COLUMN);
            let video_key = col(VIDEO_KEY_COLUMN);
            if member.is_empty() || video_key.is_empty() {
                return None;
            }

            Some(SummaryRecord {
                member: member.to_string(),
                video_key: video_key.to_string(),
                view_count: parse_count(col(VIEW_COUNT_COLUMN)),
                like_count: parse_count(col(LIKE_COUNT_COLUMN)),
                like_ratio: col(LIKE_RATIO_COLUMN).to_string(),
                is_top: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "日期,成员,频道,标题,视频,观看次数,点赞数,点赞率\n\
        2024-01-01,A,ch,t,V1,\"1,500\",\"120\",8.0%\n\
        2024-01-01,B,ch,t,V1,900,45,5.0%\n\
        2024-01-01,,ch,t,V2,10,1,10%\n\
        2024-01-01,C,ch,t,,10,1,10%\n";

    #[test]
    fn test_parse_summary_positional_columns() {
        let rows = parse_summary(SAMPLE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].member, "A");
        assert_eq!(rows[0].video_key, "V1");
        assert_eq!(rows[0].view_count, 1500);
        assert_eq!(rows[0].like_count, 120);
        assert_eq!(rows[0].like_ratio, "8.0%");
        assert!(!rows[0].is_top);
    }

    #[test]
    fn test_parse_summary_short_rows() {
        let rows = parse_summary("header\nx,A,y,z,V9\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].view_count, 0);
        assert_eq!(rows[0].like_ratio, "");
    }

    #[test]
    fn test_parse_summary_header_only() {
        assert!(parse_summary("a,b,c,d,e,f,g,h\n").is_empty());
        assert!(parse_summary("").is_empty());
    }
}
