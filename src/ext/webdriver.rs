use chrono::Utc;
use core::error::Error;
use core::time::Duration;
use fantoccini::{
    Client, ClientBuilder, Locator,
    actions::{InputSource, MouseActions, PointerAction},
    elements::Element,
    error::CmdError,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::{
    fs::File,
    process::{Child, Command, Stdio},
};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

#[cfg(unix)]
unsafe extern "C" {
    // setsid puts the driver in its own process group so that kill(-pid)
    // also reaches the browser it spawns.
    fn setsid() -> i32;
    fn kill(pid: i32, sig: i32) -> i32;
}

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

const DRIVER_PORT_RANGE: std::ops::RangeInclusive<u16> = 4445..=7999;
const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_STEP: Duration = Duration::from_millis(250);

/// Child process that takes its whole process group down when dropped.
#[derive(Debug)]
pub(crate) struct Subprocess(Child);

impl Drop for Subprocess {
    fn drop(&mut self) {
        match self.0.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "driver already exited");
                return;
            }
            Ok(None) => debug!(pid = self.0.id(), "driver still running, terminating"),
            Err(e) => warn!(error = %e, "could not query driver status, terminating anyway"),
        }

        self.signal_group(SIGTERM);
        if let Err(e) = self.0.kill() {
            debug!(error = %e, "kill() on driver failed (may have exited)");
        }
        if self.reaped_within(Duration::from_secs(2)) {
            return;
        }

        debug!(pid = self.0.id(), "driver ignored SIGTERM, escalating");
        self.signal_group(SIGKILL);
        match self.0.wait() {
            Ok(status) => debug!(%status, "driver reaped"),
            Err(e) => warn!(error = %e, "final wait on driver failed"),
        }
    }
}

impl Subprocess {
    pub fn spawn(cmd: &str, args: &[String], logfile: Option<&Path>) -> std::io::Result<Self> {
        let (out, err) = match logfile {
            Some(p) => {
                let out = File::create(p)?;
                let err = out.try_clone()?;
                (Stdio::from(out), Stdio::from(err))
            }
            None => (Stdio::null(), Stdio::null()),
        };
        let mut command = Command::new(cmd);
        command.args(args).stdin(Stdio::null()).stdout(out).stderr(err);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no Rust state.
            unsafe {
                command.pre_exec(|| {
                    setsid();
                    Ok(())
                });
            }
        }

        Ok(Subprocess(command.spawn()?))
    }

    fn signal_group(&self, sig: i32) {
        #[cfg(not(unix))]
        let _ = sig;
        #[cfg(unix)]
        {
            let pid = self.0.id() as i32;
            // SAFETY: plain libc call on our own child's process group.
            let r = unsafe { kill(-pid, sig) };
            if r != 0 {
                warn!(%pid, sig, ret = r, "signalling driver process group failed");
            }
        }
    }

    fn reaped_within(&mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            match self.0.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "driver exited after SIGTERM");
                    return true;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "polling driver failed"),
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        false
    }
}

pub trait WebDriver {
    fn get_port(&self) -> u16;
    fn create_client(
        &self,
        headful: bool,
    ) -> impl Future<Output = Result<Client, Box<dyn Error + Sync + Send>>>;
}

#[derive(Debug)]
pub struct GeckoDriver {
    #[allow(dead_code)]
    proc: Subprocess,
    port: u16,
}

impl GeckoDriver {
    /// Start `binary` on `port` (random when `None`) and wait until it accepts
    /// connections.
    #[instrument]
    pub async fn launch(
        binary: &str,
        port: Option<u16>,
        logfile: Option<&Path>,
    ) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let port = port.unwrap_or_else(random_port);
        let args = vec![
            "-p".to_string(),
            port.to_string(),
            "--log".to_string(),
            "fatal".to_string(),
        ];
        let proc = Subprocess::spawn(binary, &args, logfile)?;
        debug!(%port, "Starting {binary}...");

        let deadline = Instant::now() + DRIVER_READY_TIMEOUT;
        loop {
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                debug!(%port, "{binary} is listening...");
                return Ok(Self { proc, port });
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "{binary} did not listen on port {port} within {}",
                    humantime::format_duration(DRIVER_READY_TIMEOUT)
                )
                .into());
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }
}

impl WebDriver for GeckoDriver {
    fn get_port(&self) -> u16 {
        self.port
    }

    #[instrument]
    async fn create_client(&self, headful: bool) -> Result<Client, Box<dyn Error + Sync + Send>> {
        let mut browser_args: Vec<String> = Vec::new();
        if !headful {
            browser_args.push("-headless".to_string());
        }

        let capabilities = serde_json::json!({
            "browserName": "firefox",
            "setWindowRect": true,
            "moz:firefoxOptions": {
                "prefs": {
                    "intl.accept_languages": "en-GB"
                },
                "args": browser_args,
            },
            "timeouts": {
                "pageLoad": 60_000,
                "implicit": 0,
                "script": 30_000,
            }
        });
        let serde_json::Value::Object(capabilities) = capabilities else {
            unreachable!("capabilities literal is an object");
        };

        let port = self.get_port();
        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(&format!("http://localhost:{port}"))
            .await?;
        client.set_window_size(1280, 1024).await?;
        Ok(client)
    }
}

fn random_port() -> u16 {
    let mut rng = SmallRng::seed_from_u64(Utc::now().timestamp_micros() as u64);
    rng.random_range(DRIVER_PORT_RANGE)
}

/// Short randomized pointer travel time.
fn rand_move_duration() -> Duration {
    let mut rng = SmallRng::seed_from_u64(Utc::now().timestamp_micros() as u64);
    Duration::from_millis(rng.random_range(150..=600))
}

/// Sleep for `duration`, logging how long.
#[instrument]
pub async fn delay(duration: Duration) {
    let duration_str = humantime::format_duration(duration);
    debug!("Sleeping for {duration_str}...");
    tokio::time::sleep(duration).await;
}

/// Poll `parent` for a descendant matching `css` until `timeout` elapses.
/// A miss at the deadline is reported as [`CmdError::WaitTimeout`].
pub async fn wait_for_child(
    parent: &Element,
    css: &str,
    timeout: Duration,
) -> Result<Element, CmdError> {
    let deadline = Instant::now() + timeout;
    loop {
        match parent.find(Locator::Css(css)).await {
            Ok(el) => return Ok(el),
            Err(e) if e.is_no_such_element() => {
                if Instant::now() >= deadline {
                    return Err(CmdError::WaitTimeout);
                }
                tokio::time::sleep(POLL_STEP).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub trait ClientActionExt {
    fn mouse_move_to_element(&self, el: &Element) -> impl Future<Output = Result<(), CmdError>>;
    fn perform_click(&self, el: &Element) -> impl Future<Output = Result<(), CmdError>>;
    fn scroll_into_view(&self, el: &Element) -> impl Future<Output = Result<(), CmdError>>;
    fn wait_for_css(
        &self,
        css: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Element, CmdError>>;
    fn wait_for_xpath(
        &self,
        xpath: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Element, CmdError>>;
}

impl ClientActionExt for Client {
    #[instrument]
    async fn mouse_move_to_element(&self, el: &Element) -> Result<(), CmdError> {
        let move_to = MouseActions::new("mouse".into()).then(PointerAction::MoveToElement {
            element: el.clone(),
            duration: Some(rand_move_duration()),
            x: 0,
            y: 0,
        });
        if let Err(e) = self.perform_actions(move_to).await {
            warn!(error = %e, "failed to move to element");
        }
        Ok(())
    }

    #[instrument]
    async fn perform_click(&self, el: &Element) -> Result<(), CmdError> {
        self.execute("arguments[0].click()", vec![serde_json::to_value(el)?])
            .await?;
        Ok(())
    }

    #[instrument]
    async fn scroll_into_view(&self, el: &Element) -> Result<(), CmdError> {
        self.execute(
            "arguments[0].scrollIntoView({block: 'center', inline: 'nearest'});",
            vec![serde_json::to_value(el)?],
        )
        .await?;
        Ok(())
    }

    #[instrument]
    async fn wait_for_css(&self, css: &str, timeout: Duration) -> Result<Element, CmdError> {
        self.wait().at_most(timeout).for_element(Locator::Css(css)).await
    }

    #[instrument]
    async fn wait_for_xpath(&self, xpath: &str, timeout: Duration) -> Result<Element, CmdError> {
        self.wait()
            .at_most(timeout)
            .for_element(Locator::XPath(xpath))
            .await
    }
}

/// Quote `s` as an XPath string literal, whatever quotes it contains.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        format!("\"{s}\"")
    } else if !s.contains('\'') {
        format!("'{s}'")
    } else {
        let parts: Vec<String> = s.split('"').map(|p| format!("\"{p}\"")).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}
