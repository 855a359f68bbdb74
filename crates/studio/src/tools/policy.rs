use regex::Regex;
use std::sync::LazyLock;

static LOOKUP_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"搜索|查一下|联网|最新|新闻|天气|汇率|股票|行情|现在|实时|今天|本周|今年|日期|时间|价格|版本|发布|更新|官网|链接",
        r"|(?i)\b(search|look\s+up|latest|news|weather|exchange\s+rate|stocks?|prices?|today|current(ly)?|now|",
        r"this\s+(week|year)|dates?|versions?|releases?|released|updates?|website|links?)\b"
    ))
    .expect("valid lookup intent pattern")
});

/// Heuristic check for time-sensitive or lookup-style requests
pub fn wants_tools(input: &str) -> bool {
    LOOKUP_INTENT.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_requests_want_tools() {
        assert!(wants_tools("What's the latest Rust version?"));
        assert!(wants_tools("weather in Berlin today"));
        assert!(wants_tools("Please LOOK UP the USD/EUR exchange rate"));
        assert!(wants_tools("帮我查一下明天的天气"));
        assert!(wants_tools("最新的新闻"));
    }

    #[test]
    fn test_plain_requests_do_not() {
        assert!(!wants_tools("Explain ownership in Rust"));
        assert!(!wants_tools("Write a haiku about autumn"));
        // Word boundaries keep substrings from matching
        assert!(!wants_tools("Tell me about snowfall and knowledge"));
    }
}
