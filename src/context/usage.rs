//! Token 用量统计
//!
//! 按模型累加；可选 tag（如 "combine"）另立分桶，区分汇总开销与单次工具开销。

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// 单次调用的用量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageMetadata {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl AddAssign for UsageMetadata {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

impl Add for UsageMetadata {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

/// 某个模型的累计用量：总量 + 按 tag 分桶
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub total: UsageMetadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tagged: BTreeMap<String, UsageMetadata>,
}

impl ModelUsage {
    pub fn record(&mut self, delta: UsageMetadata, tag: Option<&str>) {
        self.total += delta;
        if let Some(tag) = tag {
            *self.tagged.entry(tag.to_string()).or_default() += delta;
        }
    }

    pub fn absorb(&mut self, other: &ModelUsage) {
        self.total += other.total;
        for (tag, usage) in &other.tagged {
            *self.tagged.entry(tag.clone()).or_default() += *usage;
        }
    }
}

/// 模型名 -> 累计用量
pub type UsageMap = BTreeMap<String, ModelUsage>;

/// 把 from 累加进 into
pub fn merge_usage_maps(into: &mut UsageMap, from: &UsageMap) {
    for (model, usage) in from {
        into.entry(model.clone()).or_default().absorb(usage);
    }
}

/// 执行轨迹中的单次用量记录（按调用分桶）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub usage: UsageMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_additive() {
        let mut usage = ModelUsage::default();
        usage.record(UsageMetadata::new(10, 5), None);
        usage.record(UsageMetadata::new(3, 2), None);
        assert_eq!(usage.total, UsageMetadata::new(13, 7));
        assert!(usage.tagged.is_empty());
    }

    #[test]
    fn test_tagged_bucket_is_separate() {
        let mut usage = ModelUsage::default();
        usage.record(UsageMetadata::new(10, 5), None);
        usage.record(UsageMetadata::new(4, 4), Some("combine"));
        assert_eq!(usage.total.total_tokens, 23);
        assert_eq!(usage.tagged["combine"], UsageMetadata::new(4, 4));
    }

    #[test]
    fn test_merge_maps() {
        let mut parent = UsageMap::new();
        parent
            .entry("gpt".into())
            .or_default()
            .record(UsageMetadata::new(1, 1), None);

        let mut child = UsageMap::new();
        child
            .entry("gpt".into())
            .or_default()
            .record(UsageMetadata::new(2, 3), Some("combine"));
        child
            .entry("mini".into())
            .or_default()
            .record(UsageMetadata::new(7, 0), None);

        merge_usage_maps(&mut parent, &child);
        assert_eq!(parent["gpt"].total, UsageMetadata::new(3, 4));
        assert_eq!(parent["gpt"].tagged["combine"].total_tokens, 5);
        assert_eq!(parent["mini"].total.input_tokens, 7);
    }
}
