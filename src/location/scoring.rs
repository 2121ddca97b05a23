//! Confidence scoring for reverse-geocoded addresses.
//!
//! Additive weights over sensor accuracy, source trust and address
//! completeness. The sum is clamped to 0..=100.

use super::types::{GeocodedAddress, QualityIssue, ScoredAddress, SourceTrust};

// ─── Weights ─────────────────────────────────────────────────────

const ACCURACY_TIERS: &[(f64, u32)] = &[
    (100.0, 40),
    (500.0, 30),
    (1000.0, 20),
    (5000.0, 10),
];

const W_HIGH_TRUST: u32 = 30;
const W_OPEN_TRUST: u32 = 20;
const W_CITY: u32 = 20;
const W_REGION: u32 = 5;
const W_POSTAL: u32 = 5;

pub const MAX_SCORE: u8 = 100;

/// Which address fields a provider actually filled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completeness {
    pub city: bool,
    pub region: bool,
    pub postal_code: bool,
}

impl Completeness {
    pub fn of(address: &GeocodedAddress) -> Self {
        fn present(field: &Option<String>) -> bool {
            field.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        Self {
            city: present(&address.city),
            region: present(&address.region),
            postal_code: present(&address.postal_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: u8,
    pub issues: Vec<QualityIssue>,
}

/// Score one provider result.
pub fn score(accuracy_m: Option<f64>, trust: SourceTrust, completeness: Completeness) -> ScoreBreakdown {
    let mut issues = Vec::new();
    let mut total: u32 = 0;

    match accuracy_m {
        Some(acc) => match ACCURACY_TIERS.iter().find(|(limit, _)| acc <= *limit) {
            Some((_, points)) => total += points,
            None => issues.push(QualityIssue::LowAccuracy),
        },
        None => issues.push(QualityIssue::AccuracyUnknown),
    }

    total += match trust {
        SourceTrust::High => W_HIGH_TRUST,
        SourceTrust::Open => W_OPEN_TRUST,
        SourceTrust::Unrated => 0,
    };

    if completeness.city {
        total += W_CITY;
    } else {
        issues.push(QualityIssue::MissingCity);
    }
    if completeness.region {
        total += W_REGION;
    }
    if completeness.postal_code {
        total += W_POSTAL;
    }

    ScoreBreakdown {
        score: total.min(MAX_SCORE as u32) as u8,
        issues,
    }
}

/// Score an address against the accuracy of the position it was looked up for.
pub fn score_address(address: GeocodedAddress, accuracy_m: Option<f64>) -> ScoredAddress {
    let breakdown = score(accuracy_m, address.trust, Completeness::of(&address));
    ScoredAddress {
        address,
        confidence: breakdown.score,
        issues: breakdown.issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: Completeness = Completeness { city: true, region: true, postal_code: true };
    const EMPTY: Completeness = Completeness { city: false, region: false, postal_code: false };

    #[test]
    fn test_accuracy_tiers() {
        let s = |acc| score(Some(acc), SourceTrust::Unrated, EMPTY).score;
        assert_eq!(s(50.0), 40);
        assert_eq!(s(100.0), 40);
        assert_eq!(s(101.0), 30);
        assert_eq!(s(500.0), 30);
        assert_eq!(s(900.0), 20);
        assert_eq!(s(5000.0), 10);
        assert_eq!(s(5001.0), 0);
    }

    #[test]
    fn test_low_accuracy_recorded() {
        let b = score(Some(6000.0), SourceTrust::Open, FULL);
        assert!(b.issues.contains(&QualityIssue::LowAccuracy));
        assert_eq!(b.score, 20 + 20 + 5 + 5);
    }

    #[test]
    fn test_unknown_accuracy() {
        let b = score(None, SourceTrust::High, FULL);
        assert_eq!(b.score, 60);
        assert_eq!(b.issues, vec![QualityIssue::AccuracyUnknown]);
    }

    #[test]
    fn test_trust_weights() {
        assert_eq!(score(None, SourceTrust::High, EMPTY).score, 30);
        assert_eq!(score(None, SourceTrust::Open, EMPTY).score, 20);
        assert_eq!(score(None, SourceTrust::Unrated, EMPTY).score, 0);
    }

    #[test]
    fn test_completeness_weights() {
        let city_only = Completeness { city: true, ..EMPTY };
        let region_postal = Completeness { region: true, postal_code: true, ..EMPTY };
        assert_eq!(score(None, SourceTrust::Unrated, city_only).score, 20);
        assert_eq!(score(None, SourceTrust::Unrated, region_postal).score, 10);
    }

    #[test]
    fn test_score_bounded() {
        for acc in [None, Some(0.0), Some(80.0), Some(700.0), Some(4000.0), Some(1e7)] {
            for trust in [SourceTrust::High, SourceTrust::Open, SourceTrust::Unrated] {
                for c in [FULL, EMPTY, Completeness { city: true, ..EMPTY }] {
                    let s = score(acc, trust, c).score;
                    assert!(s <= MAX_SCORE);
                }
            }
        }
        assert_eq!(score(Some(10.0), SourceTrust::High, FULL).score, 100);
    }

    #[test]
    fn test_completeness_ignores_blank_fields() {
        let addr = GeocodedAddress {
            city: Some("  ".into()),
            region: Some("Uttar Pradesh".into()),
            source: "test".into(),
            ..Default::default()
        };
        let c = Completeness::of(&addr);
        assert!(!c.city);
        assert!(c.region);
        assert!(!c.postal_code);
    }

    #[test]
    fn test_score_address_uses_address_trust() {
        let addr = GeocodedAddress {
            city: Some("Lucknow".into()),
            source: "google".into(),
            trust: SourceTrust::High,
            ..Default::default()
        };
        let scored = score_address(addr, Some(80.0));
        assert_eq!(scored.confidence, 40 + 30 + 20);
        assert!(scored.issues.is_empty());
    }
}
