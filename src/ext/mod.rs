pub mod tradingview;
pub mod webdriver;
