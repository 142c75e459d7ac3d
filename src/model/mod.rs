mod reading;
mod timeframe;

pub use reading::*;
pub use timeframe::*;
