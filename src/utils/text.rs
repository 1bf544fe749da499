//! 文本辅助函数
//!
//! 正则在调用处编译，模式都是常量，编译失败时按"未找到"处理。

use regex::{Regex, RegexBuilder};

/// 在文本中查找 DOI
pub fn find_doi(text: &str) -> Option<String> {
    let re = RegexBuilder::new(r"\b(10\.\d{4,9}/[-._;()/:A-Z0-9]+)")
        .case_insensitive(true)
        .build()
        .ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('.').to_string())
}

/// 查找第一个 19xx/20xx 年份
pub fn find_year(text: &str) -> Option<String> {
    let re = Regex::new(r"\b((?:19|20)\d{2})\b").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 文本是否恰好是一个年份
pub fn is_bare_year(text: &str) -> bool {
    Regex::new(r"^(?:19|20)\d{2}$")
        .map(|re| re.is_match(text.trim()))
        .unwrap_or(false)
}

/// 按字符数截断（不追加省略号）
pub fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// 取末尾 `max_chars` 个字符
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((byte_index, _)) => &text[byte_index..],
        None => text,
    }
}

/// 超长时保留首尾各一半，中间用 `\n...\n` 连接
pub fn head_and_tail(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let half = limit / 2;
    format!("{}\n...\n{}", take_chars(text, half), tail_chars(text, half))
}

/// 把文件名中的非常规字符替换为 `_`
pub fn sanitize_file_stem(stem: &str) -> String {
    match Regex::new(r"[^A-Za-z0-9_.\-]+") {
        Ok(re) => re.replace_all(stem, "_").into_owned(),
        Err(_) => stem.to_string(),
    }
}
