//! Candidate scoring: which leaf element holds a target number?
//!
//! The pipeline is a chain of small pure functions over a [`DomSnapshot`]:
//!
//! 1. keep leaves that are rendered ([`is_visible`]),
//! 2. classify each leaf's text against the numeral ([`classify`]),
//! 3. score = tier base + [`area_bonus`] + neighbor label bonus,
//! 4. stable sort by descending score and keep the top [`MAX_CANDIDATES`].
//!
//! Tiers are spaced so an exact match beats a partial one whenever the
//! elements are of comparable size; within a tier, the smaller element wins.

use crate::locator;
use crate::snapshot::{DomSnapshot, LeafElement};
use crate::types::{BoundingBox, Candidate, LabelValue, MatchTier};
use std::cmp::Ordering;

/// Candidates returned per target.
pub const MAX_CANDIDATES: usize = 5;

/// Bonus when the parent's text mentions the label.
pub const NEIGHBOR_LABEL_BONUS: f64 = 20.0;

/// What to look for on the page.
#[derive(Debug, Clone, Copy)]
pub struct ScoringTarget<'a> {
    pub numeral: &'a str,
    pub label: &'a str,
    pub unit: Option<&'a str>,
}

impl<'a> ScoringTarget<'a> {
    pub fn new(numeral: &'a str, label: &'a str, unit: Option<&'a str>) -> Self {
        Self {
            numeral,
            label,
            unit: unit.filter(|u| !u.is_empty()),
        }
    }
}

impl<'a> From<&'a LabelValue> for ScoringTarget<'a> {
    fn from(lv: &'a LabelValue) -> Self {
        Self::new(&lv.value_str, &lv.label, lv.unit.as_deref())
    }
}

/// Rendered: not hidden by style and with a non-empty layout box.
pub fn is_visible(leaf: &LeafElement) -> bool {
    if leaf.visibility == "hidden" || leaf.display == "none" {
        return false;
    }
    leaf.bounding_box.width > 0.0 && leaf.bounding_box.height > 0.0
}

/// Match tier of `text` against `numeral`, strongest first.
pub fn classify(text: &str, numeral: &str, unit: Option<&str>) -> Option<MatchTier> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if t == numeral {
        return Some(MatchTier::Exact);
    }
    if let Some(unit) = unit.filter(|u| !u.is_empty()) {
        if t == format!("{numeral}{unit}") || t == format!("{numeral} {unit}") {
            return Some(MatchTier::ExactUnit);
        }
    }
    if t.contains(numeral) {
        return Some(MatchTier::Partial);
    }
    None
}

/// `1000 / sqrt(max(1, area))`: smaller boxes score higher.
pub fn area_bonus(bbox: &BoundingBox) -> f64 {
    1000.0 / bbox.area().max(1.0).sqrt()
}

/// Case-insensitive check that the parent's text mentions `label`.
pub fn has_neighbor_label(parent_text: Option<&str>, label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    parent_text
        .map(|text| text.to_lowercase().contains(&label.to_lowercase()))
        .unwrap_or(false)
}

/// Full score for a leaf matched at `tier`.
pub fn score(tier: MatchTier, leaf: &LeafElement, label: &str) -> f64 {
    let mut score = tier.base_score() + area_bonus(&leaf.bounding_box);
    if has_neighbor_label(leaf.parent_text.as_deref(), label) {
        score += NEIGHBOR_LABEL_BONUS;
    }
    score
}

/// Score every visible leaf against `target` and return the best few,
/// highest first. Equal scores keep document order.
pub fn rank_candidates(snapshot: &DomSnapshot, target: ScoringTarget<'_>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = snapshot
        .leaves
        .iter()
        .filter(|leaf| is_visible(leaf))
        .filter_map(|leaf| {
            let tier = classify(&leaf.text, target.numeral, target.unit)?;
            Some(Candidate {
                text: leaf.text.clone(),
                path: locator::synthesize(leaf).to_string(),
                bounding_box: leaf.bounding_box,
                score: score(tier, leaf, target.label),
                tier,
            })
        })
        .collect();

    // sort_by is stable
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}
