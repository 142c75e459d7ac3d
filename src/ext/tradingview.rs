use core::error::Error;
use core::time::Duration;
use fantoccini::{Client, Locator, elements::Element, error::CmdError};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

use super::webdriver::{ClientActionExt, delay, wait_for_child, xpath_literal};
use crate::chart::{ChartDriver, DomOutcome};
use crate::model::{Timeframe, VolumeReading};
use crate::session::{LoginStatus, persist_session};

pub const SITE_ROOT: &str = "https://www.tradingview.com/";

// Header / login
const LOGGED_IN_MARKER: &str = "button.tv-header__user-menu-button--logged";
const LOGGED_IN_CONFIRMED: &str =
    r#"button.tv-header__user-menu-button--logged[aria-label="Open user menu"]"#;
const USER_MENU_BUTTON: &str = "button.js-header-user-menu-button";
const SIGN_IN_MENU_ITEM: &str = r#"button[data-name="header-user-menu-sign-in"]"#;
const EMAIL_METHOD_BUTTON: &str = r#"button[name="Email"]"#;
const USERNAME_INPUT: &str = "input#id_username";
const PASSWORD_INPUT: &str = "input#id_password";
const SUBMIT_BUTTON: &str = r#"//button[contains(., "Sign in")]"#;

// Chart page
const SYMBOL_SEARCH: &str = "#header-toolbar-symbol-search";
const INTERVAL_TOGGLE: &str = r#"div#header-toolbar-intervals button[aria-haspopup="menu"]"#;
const STYLE_TOGGLE: &str = r#"div#header-toolbar-chart-styles button[aria-haspopup="menu"]"#;
const LEGEND_ITEM: &str = "legend-source-item";
const VALUE_CLASS: &str = "valueValue-l31H9iuA";

const BUYER_TITLE: &str = "Buyer Volume";
const SELLER_TITLE: &str = "Seller Volume";
const DELTA_TITLE: &str = "Delta Volume %";

/// Bounded waits used against the site.
#[derive(Debug, Clone)]
struct Timeouts {
    login_probe: Duration,
    login_step: Duration,
    login_confirm: Duration,
    chart_ready: Duration,
    menu: Duration,
    menu_settle: Duration,
    field_read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_probe: Duration::from_secs(8),
            login_step: Duration::from_secs(15),
            login_confirm: Duration::from_secs(30),
            chart_ready: Duration::from_secs(15),
            menu: Duration::from_secs(5),
            menu_settle: Duration::from_secs(1),
            field_read: Duration::from_secs(3),
        }
    }
}

fn menu_row_xpath(text: &str) -> String {
    format!("//div[@role=\"row\" and contains(., {})]", xpath_literal(text))
}

fn legend_xpath(indicator_name: &str) -> String {
    format!(
        "//div[@data-name=\"{LEGEND_ITEM}\" and contains(., {})]",
        xpath_literal(indicator_name)
    )
}

fn value_css(title: &str) -> String {
    format!("div[data-test-id-value-title='{title}'] .{VALUE_CLASS}")
}

/// Does the toggle's aria-label mention `expected` (case-insensitive)?
fn label_reflects(actual: &str, expected: &str) -> bool {
    actual.to_lowercase().contains(&expected.to_lowercase())
}

#[derive(Debug, Clone)]
pub struct TradingView {
    client: Client,
    indicator_name: String,
    timeouts: Timeouts,
}

impl TradingView {
    pub fn new(client: Client, indicator_name: impl Into<String>) -> Self {
        Self {
            client,
            indicator_name: indicator_name.into(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Never errors: any failure while probing reads as "not logged in".
    #[instrument(skip(self))]
    pub async fn is_logged_in(&self) -> bool {
        info!("Checking login status...");
        if let Err(e) = self.client.goto(SITE_ROOT).await {
            warn!(error = %e, "Could not load {SITE_ROOT}");
            return false;
        }
        match self
            .client
            .wait_for_css(LOGGED_IN_MARKER, self.timeouts.login_probe)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Logged-in marker not present");
                false
            }
        }
    }

    /// Walk the sign-in dialog. Returns whether the logged-in marker showed up;
    /// failures are logged, not raised.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> bool {
        info!("Logging in to TradingView...");
        if let Err(e) = self.submit_credentials(email, password).await {
            error!(error = %e, "Login sequence failed");
            return false;
        }
        match self
            .client
            .wait_for_css(LOGGED_IN_CONFIRMED, self.timeouts.login_confirm)
            .await
        {
            Ok(_) => {
                info!("Login successful.");
                true
            }
            Err(e) => {
                error!(error = %e, "Login failed or timed out.");
                false
            }
        }
    }

    async fn submit_credentials(&self, email: &str, password: &str) -> Result<(), CmdError> {
        let step = self.timeouts.login_step;
        self.client.goto(SITE_ROOT).await?;

        for css in [USER_MENU_BUTTON, SIGN_IN_MENU_ITEM, EMAIL_METHOD_BUTTON] {
            let el = self.client.wait_for_css(css, step).await?;
            self.click(&el).await?;
            debug!(selector = css, "clicked");
        }

        let username = self.client.wait_for_css(USERNAME_INPUT, step).await?;
        username.clear().await?;
        username.send_keys(email).await?;
        let password_input = self.client.find(Locator::Css(PASSWORD_INPUT)).await?;
        password_input.clear().await?;
        password_input.send_keys(password).await?;

        let submit = self.client.wait_for_xpath(SUBMIT_BUTTON, step).await?;
        self.click(&submit).await
    }

    /// Reuse or establish an authenticated session.
    ///
    /// After a sign-in attempt the probe runs once more before giving up. With
    /// `require_login` an unconfirmed sign-in is an error, otherwise the run
    /// carries on unauthenticated. State is saved only once confirmed.
    pub async fn ensure_session(
        &self,
        email: &str,
        password: &str,
        state_path: &Path,
        require_login: bool,
    ) -> Result<LoginStatus, Box<dyn Error + Send + Sync>> {
        if self.is_logged_in().await {
            info!("Already logged in. Skipping login.");
            return Ok(LoginStatus::AlreadyLoggedIn);
        }
        let confirmed = self.login(email, password).await || self.is_logged_in().await;
        if confirmed {
            if let Err(e) = persist_session(&self.client, state_path).await {
                warn!(error = %e, "Could not save session state");
            }
            return Ok(LoginStatus::LoggedIn);
        }
        if require_login {
            return Err("login could not be confirmed".into());
        }
        warn!("Continuing without a confirmed login; chart data may be limited");
        Ok(LoginStatus::Unconfirmed)
    }

    #[instrument(skip(self))]
    pub async fn open_chart(&self, url: &str) -> Result<(), CmdError> {
        info!("Navigating to chart URL: {url}");
        self.client.goto(url).await?;
        self.client
            .wait_for_css(SYMBOL_SEARCH, self.timeouts.chart_ready)
            .await?;
        info!("Chart page loaded.");
        Ok(())
    }

    pub async fn indicator_present(&self) -> bool {
        self.find_legend().await.is_ok()
    }

    async fn click(&self, el: &Element) -> Result<(), CmdError> {
        self.client.scroll_into_view(el).await?;
        self.client.mouse_move_to_element(el).await?;
        if let Err(e) = el.click().await {
            debug!(error = %e, "native click refused, clicking via script");
            self.client.perform_click(el).await?;
        }
        Ok(())
    }

    /// Open the menu behind `toggle_css`, pick the row containing `row_text`,
    /// then confirm the toggle's aria-label mentions it. No retries.
    async fn select_from_menu(&self, toggle_css: &str, row_text: &str) -> DomOutcome<()> {
        let toggle = match self.client.wait_for_css(toggle_css, self.timeouts.menu).await {
            Ok(el) => el,
            Err(e) => return DomOutcome::from_cmd_error("menu toggle", e),
        };
        if let Err(e) = self.click(&toggle).await {
            return DomOutcome::from_cmd_error("menu toggle", e);
        }

        let row_xpath = menu_row_xpath(row_text);
        let row = match self.client.wait_for_xpath(&row_xpath, self.timeouts.menu).await {
            Ok(el) => el,
            Err(e) => return DomOutcome::from_cmd_error(&format!("menu row {row_text:?}"), e),
        };
        if let Err(e) = self.click(&row).await {
            return DomOutcome::from_cmd_error(&format!("menu row {row_text:?}"), e);
        }

        delay(self.timeouts.menu_settle).await;

        let actual = match self.client.find(Locator::Css(toggle_css)).await {
            Ok(el) => el.attr("aria-label").await,
            Err(e) => Err(e),
        };
        match actual {
            Ok(label) => {
                let label = label.unwrap_or_default();
                if label_reflects(&label, row_text) {
                    DomOutcome::Ok(())
                } else {
                    DomOutcome::Failed(format!("toggle reads {label:?}, wanted {row_text:?}"))
                }
            }
            Err(e) => DomOutcome::from_cmd_error("menu toggle label", e),
        }
    }

    async fn find_legend(&self) -> DomOutcome<Element> {
        let container = match self
            .client
            .find(Locator::XPath(&legend_xpath(&self.indicator_name)))
            .await
        {
            Ok(el) => el,
            Err(e) => return DomOutcome::from_cmd_error("indicator legend", e),
        };
        match container.is_displayed().await {
            Ok(true) => DomOutcome::Ok(container),
            Ok(false) => DomOutcome::NotFound("visible indicator legend".into()),
            Err(e) => DomOutcome::from_cmd_error("indicator legend", e),
        }
    }

    async fn read_value(&self, container: &Element, title: &str) -> DomOutcome<String> {
        let css = value_css(title);
        let el = match wait_for_child(container, &css, self.timeouts.field_read).await {
            Ok(el) => el,
            Err(e) => return DomOutcome::from_cmd_error(title, e),
        };
        match el.text().await {
            Ok(text) => DomOutcome::Ok(text),
            Err(e) => DomOutcome::from_cmd_error(title, e),
        }
    }
}

impl ChartDriver for TradingView {
    #[instrument(skip(self), fields(label = tf.label()))]
    async fn switch_timeframe(&self, tf: Timeframe) -> DomOutcome<()> {
        info!("Switching to {}...", tf.label());
        let outcome = self.select_from_menu(INTERVAL_TOGGLE, tf.label()).await;
        match &outcome {
            DomOutcome::Ok(()) => info!("{} activated.", tf.label()),
            other => warn!("Switch to {} incomplete: {other}", tf.label()),
        }
        outcome
    }

    #[instrument(skip(self))]
    async fn switch_chart_style(&self, style: &str) -> DomOutcome<()> {
        info!("Switching to {style} chart type...");
        let outcome = self.select_from_menu(STYLE_TOGGLE, style).await;
        match &outcome {
            DomOutcome::Ok(()) => info!("{style} chart style selected."),
            other => warn!("Chart style switch incomplete: {other}"),
        }
        outcome
    }

    #[instrument(skip(self))]
    async fn read_indicator(&self) -> DomOutcome<VolumeReading> {
        debug!("Extracting volume data...");
        let container = match self.find_legend().await {
            DomOutcome::Ok(el) => el,
            other => return other.map(|_| VolumeReading::default()),
        };

        let mut values = Vec::with_capacity(3);
        for title in [BUYER_TITLE, SELLER_TITLE, DELTA_TITLE] {
            match self.read_value(&container, title).await {
                DomOutcome::Ok(text) => values.push(text),
                other => return other.map(|_| VolumeReading::default()),
            }
        }
        let reading = VolumeReading::new(&values[0], &values[1], &values[2]);
        info!(
            buyer = %reading.buyer_volume,
            seller = %reading.seller_volume,
            delta = %reading.delta_percent,
            "Extracted volume data"
        );
        DomOutcome::Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_row_xpath() {
        assert_eq!(
            menu_row_xpath("15 minutes"),
            r#"//div[@role="row" and contains(., "15 minutes")]"#
        );
    }

    #[test]
    fn test_legend_xpath_matches_indicator_name() {
        assert_eq!(
            legend_xpath("Frank kyakusse Vol VIDYA"),
            r#"//div[@data-name="legend-source-item" and contains(., "Frank kyakusse Vol VIDYA")]"#
        );
    }

    #[test]
    fn test_value_css() {
        assert_eq!(
            value_css(DELTA_TITLE),
            "div[data-test-id-value-title='Delta Volume %'] .valueValue-l31H9iuA"
        );
    }

    #[test]
    fn test_label_reflects_is_case_insensitive() {
        assert!(label_reflects("Heikin Ashi", "Heikin Ashi"));
        assert!(label_reflects("Change interval, 1 HOUR", "1 hour"));
        assert!(!label_reflects("4 hours", "1 hour"));
        assert!(!label_reflects("", "1 minute"));
    }
}
