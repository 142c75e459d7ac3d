pub mod chart;
pub mod config;
pub mod control;
pub mod ext;
pub mod model;
pub mod monitor;
pub mod poller;
pub mod recorder;
pub mod session;
pub mod symbol;

pub mod prelude {
    pub use crate::chart::{ChartDriver, DomOutcome};
    pub use crate::config::AppConfig;
    pub use crate::control::{ControlRecord, SessionInfo};
    pub use crate::model::*;
    pub use crate::monitor::{ActiveFlagMonitor, MonitorHandle, StopSignal};
    pub use crate::poller::{PollSummary, PollTimings, Poller};
    pub use crate::recorder::VolumeRecorder;
    pub use crate::session::{LoginStatus, restore_or_create_session};
    pub use crate::symbol::{build_chart_url, classify_symbol, clean_symbol};
}
