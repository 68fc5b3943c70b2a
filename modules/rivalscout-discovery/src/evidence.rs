//! Keyword evidence: how well a candidate's text footprint covers the brand's
//! peer, business and audience vocabularies.

use std::collections::BTreeSet;

use rivalscout_common::{BrandContext, Candidate};

/// Hits needed for full coverage of a keyword set.
pub const COVERAGE_SATURATION: usize = 4;

/// Keywords shorter than this only match whole tokens, never handle substrings.
const MIN_HANDLE_SUBSTRING_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "your", "you", "our", "are", "was",
    "were", "but", "not", "all", "any", "can", "has", "have", "into", "its", "more", "most",
    "other", "out", "over", "such", "than", "their", "them", "they", "very", "via", "who",
    "will", "about", "like", "also", "just", "account", "accounts", "official", "page",
    "instagram", "tiktok", "brand", "brands", "best", "top",
];

/// Lowercase alphanumeric tokens of length >= 3, minus stopwords.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// The brand's three vocabularies, tokenized once per run.
#[derive(Debug, Clone, Default)]
pub struct KeywordProfile {
    pub peer: BTreeSet<String>,
    pub business: BTreeSet<String>,
    pub audience: BTreeSet<String>,
}

impl KeywordProfile {
    pub fn from_brand(brand: &BrandContext) -> Self {
        let mut peer = tokenize(&brand.niche);
        for kw in &brand.context_keywords {
            peer.extend(tokenize(kw));
        }
        Self {
            peer,
            business: brand.business_keywords.iter().flat_map(|k| tokenize(k)).collect(),
            audience: brand.audience_keywords.iter().flat_map(|k| tokenize(k)).collect(),
        }
    }

    pub fn peer_overlap(&self, evidence: &EvidenceText) -> f64 {
        coverage(&self.peer, evidence)
    }

    /// Mean coverage of the business and audience sets. An empty set does not
    /// drag the mean down; both empty yields 0.
    pub fn rag_affinity(&self, evidence: &EvidenceText) -> f64 {
        let parts: Vec<f64> = [&self.business, &self.audience]
            .into_iter()
            .filter(|set| !set.is_empty())
            .map(|set| coverage(set, evidence))
            .collect();
        if parts.is_empty() {
            return 0.0;
        }
        parts.iter().sum::<f64>() / parts.len() as f64
    }
}

/// What outside sources say about a candidate, in text form.
#[derive(Debug, Clone, Default)]
pub struct EvidenceText {
    pub handle: String,
    pub tokens: BTreeSet<String>,
    pub raw: String,
}

impl EvidenceText {
    /// Titles, snippets and (when the validator returned one) the profile bio.
    /// Reasons are provenance labels and never count.
    pub fn for_candidate(candidate: &Candidate, bio: Option<&str>) -> Self {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(candidate.titles.iter().map(String::as_str));
        parts.extend(candidate.snippets.iter().map(String::as_str));
        parts.extend(bio);
        let raw = parts.join(" | ");
        Self {
            handle: candidate.handle.clone(),
            tokens: tokenize(&raw),
            raw,
        }
    }

    fn mentions(&self, keyword: &str) -> bool {
        self.tokens.contains(keyword)
            || (keyword.len() >= MIN_HANDLE_SUBSTRING_LEN && self.handle.contains(keyword))
    }
}

/// Fraction of `keywords` present in the evidence, saturating at
/// `COVERAGE_SATURATION` hits (or the set size, if smaller).
pub fn coverage(keywords: &BTreeSet<String>, evidence: &EvidenceText) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords.iter().filter(|k| evidence.mentions(k)).count();
    let denom = COVERAGE_SATURATION.min(keywords.len());
    (hits.min(denom) as f64 / denom as f64).clamp(0.0, 1.0)
}
