/// One snapshot of the volume indicator's legend values.
///
/// Values are kept exactly as rendered (sign, percent suffix) minus thousands
/// separators; nothing is parsed into numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VolumeReading {
    pub buyer_volume: String,
    pub seller_volume: String,
    pub delta_percent: String,
}

impl VolumeReading {
    pub fn new(buyer_volume: &str, seller_volume: &str, delta_percent: &str) -> Self {
        Self {
            buyer_volume: strip_separators(buyer_volume),
            seller_volume: strip_separators(seller_volume),
            delta_percent: strip_separators(delta_percent),
        }
    }

    pub fn fields(&self) -> [&str; 3] {
        [&self.buyer_volume, &self.seller_volume, &self.delta_percent]
    }
}

fn strip_separators(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ',').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_thousands_separators_only() {
        let reading = VolumeReading::new("1,234,567", " 98,000 ", "-12.5%");
        assert_eq!(reading.fields(), ["1234567", "98000", "-12.5%"]);
    }

    #[test]
    fn test_value_equality() {
        let a = VolumeReading::new("100", "50", "33%");
        let b = VolumeReading::new("100", "50", "33%");
        let c = VolumeReading::new("100", "51", "33%");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
