use fantoccini::error::CmdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::model::{Timeframe, VolumeReading};

/// Result of one best-effort page interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomOutcome<T> {
    Ok(T),
    /// A bounded wait expired; payload names what was waited for.
    TimedOut(String),
    /// The target is absent or hidden.
    NotFound(String),
    /// Anything else: webdriver errors, a switch that did not take.
    Failed(String),
}

impl<T> DomOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            DomOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, DomOutcome::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DomOutcome<U> {
        match self {
            DomOutcome::Ok(v) => DomOutcome::Ok(f(v)),
            DomOutcome::TimedOut(w) => DomOutcome::TimedOut(w),
            DomOutcome::NotFound(w) => DomOutcome::NotFound(w),
            DomOutcome::Failed(w) => DomOutcome::Failed(w),
        }
    }

    /// Classify a webdriver error raised while acting on `what`.
    pub fn from_cmd_error(what: &str, err: CmdError) -> Self {
        match err {
            CmdError::WaitTimeout => DomOutcome::TimedOut(what.to_string()),
            e if e.is_no_such_element() => DomOutcome::NotFound(what.to_string()),
            e => DomOutcome::Failed(format!("{what}: {e}")),
        }
    }
}

impl<T> Display for DomOutcome<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomOutcome::Ok(_) => write!(f, "ok"),
            DomOutcome::TimedOut(what) => write!(f, "timed out waiting for {what}"),
            DomOutcome::NotFound(what) => write!(f, "{what} not found"),
            DomOutcome::Failed(why) => write!(f, "failed: {why}"),
        }
    }
}

pub trait ChartDriver {
    /// Select `tf` in the interval menu and check the toggle reflects it.
    fn switch_timeframe(&self, tf: Timeframe) -> impl Future<Output = DomOutcome<()>>;

    /// Select the candle style whose menu row reads `style`.
    fn switch_chart_style(&self, style: &str) -> impl Future<Output = DomOutcome<()>>;

    /// Read buyer/seller/delta from the volume indicator's legend.
    fn read_indicator(&self) -> impl Future<Output = DomOutcome<VolumeReading>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantoccini::error::{ErrorStatus, WebDriver};

    #[test]
    fn test_from_cmd_error() {
        assert_eq!(
            DomOutcome::<()>::from_cmd_error("toggle", CmdError::WaitTimeout),
            DomOutcome::TimedOut("toggle".into())
        );
    }

    #[test]
    fn test_from_cmd_error_no_such_element_is_not_found() {
        let err = CmdError::Standard(WebDriver::new(ErrorStatus::NoSuchElement, "x"));
        assert_eq!(
            DomOutcome::<()>::from_cmd_error("indicator legend", err),
            DomOutcome::NotFound("indicator legend".into())
        );
    }

    #[test]
    fn test_from_cmd_error_other_webdriver_errors_fail() {
        let err = CmdError::Standard(WebDriver::new(ErrorStatus::StaleElementReference, "gone"));
        let outcome = DomOutcome::<()>::from_cmd_error("menu row", err);
        assert!(matches!(outcome, DomOutcome::Failed(ref why) if why.starts_with("menu row: ")));
    }

    #[test]
    fn test_map_and_ok() {
        let reading = DomOutcome::Ok(2).map(|v| v * 21);
        assert_eq!(reading.clone().ok(), Some(42));
        let missing: DomOutcome<i32> = DomOutcome::NotFound("legend".into());
        assert!(!missing.is_ok());
        assert_eq!(missing.map(|v| v + 1).ok(), None);
    }

    #[test]
    fn test_display() {
        let outcome: DomOutcome<()> = DomOutcome::TimedOut("interval menu".into());
        assert_eq!(outcome.to_string(), "timed out waiting for interval menu");
    }
}
