//! 章节模型

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 标准章节名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Abstract,
    Introduction,
    Methodology,
    Results,
    Discussion,
    Conclusion,
    References,
}

impl SectionName {
    pub const ALL: [SectionName; 7] = [
        SectionName::Abstract,
        SectionName::Introduction,
        SectionName::Methodology,
        SectionName::Results,
        SectionName::Discussion,
        SectionName::Conclusion,
        SectionName::References,
    ];

    /// 可由 LLM 补全的章节（不含参考文献）
    pub const INFERABLE: [SectionName; 6] = [
        SectionName::Abstract,
        SectionName::Introduction,
        SectionName::Methodology,
        SectionName::Results,
        SectionName::Discussion,
        SectionName::Conclusion,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SectionName::Abstract => "abstract",
            SectionName::Introduction => "introduction",
            SectionName::Methodology => "methodology",
            SectionName::Results => "results",
            SectionName::Discussion => "discussion",
            SectionName::Conclusion => "conclusion",
            SectionName::References => "references",
        }
    }

    /// 提示词中使用的标题
    pub fn heading(&self) -> &'static str {
        match self {
            SectionName::Abstract => "Abstract",
            SectionName::Introduction => "Introduction",
            SectionName::Methodology => "Methodology",
            SectionName::Results => "Results",
            SectionName::Discussion => "Discussion",
            SectionName::Conclusion => "Conclusion",
            SectionName::References => "References",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }
}

/// 章节名 → 文本，抽取完成后只读
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionMap {
    sections: BTreeMap<SectionName, String>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取章节文本，不存在时为空串
    pub fn get(&self, name: SectionName) -> &str {
        self.sections.get(&name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: SectionName, text: impl Into<String>) {
        self.sections.insert(name, text.into());
    }

    /// 追加内容（同一标准章节出现多次时）
    pub fn append(&mut self, name: SectionName, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            self.sections.entry(name).or_default();
            return;
        }
        let entry = self.sections.entry(name).or_default();
        if !entry.is_empty() {
            entry.push_str("\n\n");
        }
        entry.push_str(text);
    }

    /// 已识别出的章节名
    pub fn names(&self) -> Vec<SectionName> {
        self.sections.keys().copied().collect()
    }

    /// 补齐所有标准章节（缺失的置为空串）
    pub fn ensure_all(&mut self) {
        for name in SectionName::ALL {
            self.sections.entry(name).or_default();
        }
    }

    /// 文本不足 `min_chars` 的可补全章节
    pub fn thin_sections(&self, min_chars: usize) -> Vec<SectionName> {
        SectionName::INFERABLE
            .iter()
            .copied()
            .filter(|s| self.get(*s).chars().count() < min_chars)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_joins_repeated_sections() {
        let mut map = SectionMap::new();
        map.append(SectionName::Methodology, "related work");
        map.append(SectionName::Methodology, "  methods  ");
        assert_eq!(map.get(SectionName::Methodology), "related work\n\nmethods");
        assert_eq!(map.get(SectionName::Results), "");
    }

    #[test]
    fn test_thin_sections_excludes_references() {
        let mut map = SectionMap::new();
        map.set(SectionName::Abstract, "a".repeat(150));
        let thin = map.thin_sections(100);
        assert!(!thin.contains(&SectionName::Abstract));
        assert!(thin.contains(&SectionName::Results));
        assert!(!thin.contains(&SectionName::References));
    }

    #[test]
    fn test_from_key_is_case_insensitive() {
        assert_eq!(SectionName::from_key(" Results "), Some(SectionName::Results));
        assert_eq!(SectionName::from_key("appendix"), None);
    }
}
