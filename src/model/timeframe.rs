use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Timeframe codes understood by the trading terminal's control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[allow(clippy::upper_case_acronyms)]
pub enum Timeframe {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
    /// 1 month
    MN1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    /// Exact text of the entry in the chart's interval menu.
    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1 minute",
            Timeframe::M5 => "5 minutes",
            Timeframe::M15 => "15 minutes",
            Timeframe::M30 => "30 minutes",
            Timeframe::H1 => "1 hour",
            Timeframe::H4 => "4 hours",
            Timeframe::D1 => "1 day",
            Timeframe::W1 => "1 week",
            Timeframe::MN1 => "1 month",
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            "MN1" => Ok(Timeframe::MN1),
            _ => Err(format!("Invalid timeframe: {s}")),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Timeframe::from_str(&s)
    }
}

impl From<Timeframe> for String {
    fn from(timeframe: Timeframe) -> Self {
        timeframe.to_string()
    }
}

/// Position a timeframe occupies in the control file and in the CSV layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeRole {
    Lower,
    Base,
    Higher,
}

impl TimeframeRole {
    /// Row order: lower, base, higher.
    pub const ALL: [TimeframeRole; 3] = [
        TimeframeRole::Lower,
        TimeframeRole::Base,
        TimeframeRole::Higher,
    ];

    pub fn key(self) -> &'static str {
        match self {
            TimeframeRole::Lower => "LowerTF",
            TimeframeRole::Base => "BaseTF",
            TimeframeRole::Higher => "HigherTF",
        }
    }

    pub fn column_prefix(self) -> &'static str {
        match self {
            TimeframeRole::Lower => "Lower",
            TimeframeRole::Base => "Base",
            TimeframeRole::Higher => "Higher",
        }
    }

    pub fn index(self) -> usize {
        match self {
            TimeframeRole::Lower => 0,
            TimeframeRole::Base => 1,
            TimeframeRole::Higher => 2,
        }
    }
}

impl Display for TimeframeRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.column_prefix().to_lowercase())
    }
}

/// The roles that resolved to a known timeframe, kept in role order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredTimeframes {
    entries: Vec<(TimeframeRole, Timeframe)>,
}

impl MonitoredTimeframes {
    /// Build from raw codes looked up per role. Unknown or missing codes drop
    /// the role silently.
    pub fn from_codes<'a>(lookup: impl Fn(TimeframeRole) -> Option<&'a str>) -> Self {
        let entries = TimeframeRole::ALL
            .into_iter()
            .filter_map(|role| {
                let tf = lookup(role)?.parse::<Timeframe>().ok()?;
                Some((role, tf))
            })
            .collect();
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeframeRole, Timeframe)> + '_ {
        self.entries.iter().copied()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(_, tf)| tf.label()).collect()
    }

    /// The change-detection key: first monitored entry in role order.
    pub fn lowest(&self) -> Option<(TimeframeRole, Timeframe)> {
        self.entries.first().copied()
    }

    pub fn get(&self, role: TimeframeRole) -> Option<Timeframe> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, tf)| *tf)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(lower: &'static str, base: &'static str, higher: &'static str) -> MonitoredTimeframes {
        MonitoredTimeframes::from_codes(|role| match role {
            TimeframeRole::Lower => Some(lower),
            TimeframeRole::Base => Some(base),
            TimeframeRole::Higher => Some(higher),
        })
    }

    #[test]
    fn test_code_round_trip_covers_enumeration() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>(), Ok(tf));
        }
        assert!("M2".parse::<Timeframe>().is_err());
        assert!("m5".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_labels_in_role_order() {
        let monitored = codes("M1", "M15", "H1");
        assert_eq!(monitored.labels(), vec!["1 minute", "15 minutes", "1 hour"]);
        assert_eq!(
            monitored.lowest(),
            Some((TimeframeRole::Lower, Timeframe::M1))
        );
    }

    #[test]
    fn test_unknown_codes_are_dropped() {
        let monitored = codes("M2", "M15", "H12");
        assert_eq!(monitored.labels(), vec!["15 minutes"]);
        assert_eq!(monitored.get(TimeframeRole::Lower), None);
        assert_eq!(
            monitored.lowest(),
            Some((TimeframeRole::Base, Timeframe::M15))
        );
    }

    #[test]
    fn test_missing_roles_are_dropped() {
        let monitored = MonitoredTimeframes::from_codes(|role| match role {
            TimeframeRole::Higher => Some("D1"),
            _ => None,
        });
        assert_eq!(monitored.len(), 1);
        assert_eq!(monitored.labels(), vec!["1 day"]);
    }

    #[test]
    fn test_serde_as_code() {
        let json = serde_json::to_string(&Timeframe::MN1).unwrap();
        assert_eq!(json, "\"MN1\"");
        let tf: Timeframe = serde_json::from_str("\"H4\"").unwrap();
        assert_eq!(tf, Timeframe::H4);
    }
}
