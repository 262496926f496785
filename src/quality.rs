use std::fmt;
use std::str::FromStr;

/// Trades shadow resolution (tile zoom) against network and compute cost.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub fn zoom(&self) -> u8 {
        match self {
            QualityTier::Low => 10,
            QualityTier::Medium => 12,
            QualityTier::High => 13,
        }
    }

    /// The next cheaper tier, `None` when already at the cheapest one.
    pub fn lower(&self) -> Option<QualityTier> {
        match self {
            QualityTier::Low => None,
            QualityTier::Medium => Some(QualityTier::Low),
            QualityTier::High => Some(QualityTier::Medium),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            _ => Err(format!("Unknown quality tier: {}", text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QualityTier;
    use rstest::rstest;

    #[rstest]
    #[case(QualityTier::Low, 10)]
    #[case(QualityTier::Medium, 12)]
    #[case(QualityTier::High, 13)]
    fn tiers_map_to_fixed_zooms(#[case] tier: QualityTier, #[case] zoom: u8) {
        assert_eq!(tier.zoom(), zoom);
    }

    #[test]
    fn lowering_ends_at_low() {
        assert_eq!(QualityTier::High.lower(), Some(QualityTier::Medium));
        assert_eq!(QualityTier::Medium.lower(), Some(QualityTier::Low));
        assert_eq!(QualityTier::Low.lower(), None);
    }

    #[rstest]
    #[case("low", QualityTier::Low)]
    #[case("Medium", QualityTier::Medium)]
    #[case("HIGH", QualityTier::High)]
    fn parsing(#[case] text: &str, #[case] tier: QualityTier) {
        assert_eq!(text.parse::<QualityTier>().unwrap(), tier);
        assert_eq!(tier.to_string().parse::<QualityTier>().unwrap(), tier);
    }

    #[test]
    fn unknown_tier_is_rejected() {
        assert!("ultra".parse::<QualityTier>().is_err());
    }
}
