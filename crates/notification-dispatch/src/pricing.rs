//! 短信分段与计费

use serde::Serialize;

/// GSM 单条短信字符上限
pub const GSM_SEGMENT_LIMIT: usize = 160;
/// Unicode 单条短信字符上限
pub const UNICODE_SEGMENT_LIMIT: usize = 70;
/// 多段短信每段可用字符（扣除 UDH 头）
pub const GSM_MULTIPART_LIMIT: usize = 153;
pub const UNICODE_MULTIPART_LIMIT: usize = 67;
/// 单条消息最多允许的分段数
pub const MAX_SEGMENTS: usize = 10;
/// 未指定国家时的单段价格
pub const DEFAULT_SEGMENT_COST: f64 = 0.01;

/// 各国单段价格（美元）
pub static COUNTRY_COSTS: &[(&str, f64)] = &[
    ("US", 0.0075),
    ("UK", 0.0080),
    ("CA", 0.0070),
    ("AU", 0.0085),
    ("DE", 0.0090),
    ("FR", 0.0088),
    ("IN", 0.0050),
    ("BR", 0.0095),
    ("MX", 0.0080),
    ("JP", 0.0120),
    ("KR", 0.0110),
    ("SG", 0.0100),
    ("HK", 0.0095),
    ("TH", 0.0085),
    ("MY", 0.0090),
    ("PH", 0.0085),
];

/// 国家计费信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub cost: f64,
    pub max_length: usize,
    pub supported: bool,
}

/// 对外公布的支持国家列表
pub fn supported_countries() -> Vec<CountryInfo> {
    [
        ("US", "United States", 0.0075),
        ("UK", "United Kingdom", 0.0080),
        ("CA", "Canada", 0.0070),
        ("AU", "Australia", 0.0085),
        ("DE", "Germany", 0.0090),
        ("FR", "France", 0.0088),
        ("IN", "India", 0.0050),
        ("BR", "Brazil", 0.0095),
    ]
    .into_iter()
    .map(|(code, name, cost)| CountryInfo {
        code,
        name,
        cost,
        max_length: GSM_SEGMENT_LIMIT,
        supported: true,
    })
    .collect()
}

/// 单条消息的字符上限
pub fn segment_limit(unicode: bool) -> usize {
    if unicode {
        UNICODE_SEGMENT_LIMIT
    } else {
        GSM_SEGMENT_LIMIT
    }
}

/// 允许的最大消息长度（10 段）
pub fn max_message_length(unicode: bool) -> usize {
    segment_limit(unicode) * MAX_SEGMENTS
}

/// 计算分段数，按字符计数
pub fn calculate_segments(message: &str, unicode: bool) -> u32 {
    let len = message.chars().count();
    if len <= segment_limit(unicode) {
        return 1;
    }
    let per_segment = if unicode {
        UNICODE_MULTIPART_LIMIT
    } else {
        GSM_MULTIPART_LIMIT
    };
    len.div_ceil(per_segment) as u32
}

/// 是否包含非 ASCII 字符
pub fn requires_unicode(message: &str) -> bool {
    message.chars().any(|c| c as u32 > 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment_limits() {
        assert_eq!(calculate_segments(&"a".repeat(160), false), 1);
        assert_eq!(calculate_segments(&"a".repeat(70), true), 1);
        assert_eq!(calculate_segments("", false), 1);
    }

    #[test]
    fn test_multipart_segments() {
        assert_eq!(calculate_segments(&"a".repeat(161), false), 2);
        assert_eq!(calculate_segments(&"a".repeat(306), false), 2);
        assert_eq!(calculate_segments(&"a".repeat(307), false), 3);
        assert_eq!(calculate_segments(&"é".repeat(71), true), 2);
        assert_eq!(calculate_segments(&"é".repeat(135), true), 3);
    }

    #[test]
    fn test_supported_countries() {
        let countries = supported_countries();
        assert_eq!(countries.len(), 8);
        assert!(countries.iter().all(|c| c.supported && c.max_length == 160));
        // 公布的价格与计费表一致
        for c in &countries {
            assert!(COUNTRY_COSTS.contains(&(c.code, c.cost)));
        }
    }

    #[test]
    fn test_unicode_detection_and_limits() {
        assert!(!requires_unicode("Hello world"));
        assert!(requires_unicode("Grüße"));
        assert_eq!(max_message_length(false), 1600);
        assert_eq!(max_message_length(true), 700);
    }
}
