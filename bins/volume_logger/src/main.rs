use core::error::Error;
use dotenv::dotenv;
use fantoccini::Client;
use std::io::IsTerminal;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use voltrap::ext::tradingview::{SITE_ROOT, TradingView};
use voltrap::ext::webdriver::{GeckoDriver, WebDriver};
use voltrap::poller::describe_lowest;
use voltrap::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Load dotenv
    dotenv().ok();
    setup_tracing();

    if let Err(e) = run().await {
        error!("Script error: {e}");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let conf = AppConfig::from_env()?;

    let base = conf.session_base_dir()?;
    let (session, record) = SessionInfo::discover(&base, &conf.control_file)?;
    info!("Latest session folder: {}", session.folder.display());
    info!("Parsed {}: {record:?}", conf.control_file);

    let (prefix, chart_symbol) = classify_symbol(&clean_symbol(&session.symbol));
    let chart_url = build_chart_url(prefix, &chart_symbol);
    info!("Generated TradingView URL: {chart_url}");

    match describe_lowest(&session.timeframes) {
        Some((role, label)) => info!(
            timeframes = ?session.timeframes.labels(),
            "Rows are written when the {role} timeframe ({label}) changes"
        ),
        None => warn!("No recognised LowerTF/BaseTF/HigherTF in control file"),
    }

    info!("Launching browser...");
    let driver = GeckoDriver::launch(
        &conf.geckodriver,
        conf.webdriver_port,
        conf.driver_log.as_deref(),
    )
    .await?;
    let client = driver.create_client(!conf.headless).await?;

    let monitor = ActiveFlagMonitor::new(&session.control_file, conf.monitor_interval())
        .spawn(StopSignal::new());
    let stop = monitor.stop_signal().clone();

    let result = drive(&conf, &session, &chart_url, client.clone(), stop).await;

    monitor.shutdown().await;
    info!("Closing browser...");
    if let Err(e) = client.close().await {
        warn!(error = %e, "Browser did not close cleanly");
    }
    drop(driver);

    let summary = result?;
    info!(
        sweeps = summary.sweeps,
        rows = summary.rows_written,
        "Done"
    );
    Ok(())
}

async fn drive(
    conf: &AppConfig,
    session: &SessionInfo,
    chart_url: &str,
    client: Client,
    stop: StopSignal,
) -> Result<PollSummary, Box<dyn Error + Send + Sync>> {
    let tv = TradingView::new(client, conf.indicator_name.as_str());

    restore_or_create_session(tv.client(), &conf.auth_state_path, SITE_ROOT).await;
    let status = tv
        .ensure_session(
            &session.email,
            &session.password,
            &conf.auth_state_path,
            conf.require_login,
        )
        .await?;
    info!(?status, "Session ready");

    tv.open_chart(chart_url)
        .await
        .map_err(|e| format!("Navigation error: {e}"))?;

    let _ = tv.switch_chart_style(&conf.chart_style).await;

    info!("Checking if indicator is loaded...");
    if tv.indicator_present().await {
        info!("Indicator detected. Beginning data extraction...");
    } else {
        warn!("Indicator '{}' is NOT loaded.", conf.indicator_name);
    }

    let recorder = VolumeRecorder::open(&session.folder.join(&conf.csv_file))?;
    Poller::new(
        &tv,
        &session.timeframes,
        recorder,
        stop,
        conf.poll_timings(),
    )
    .run()
    .await
}

fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,voltrap=debug,volume_logger=debug")
    });
    let subscriber = tracing_subscriber::Registry::default().with(filter).with(
        // stdout layer, to view everything in the console
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(std::io::stdout().is_terminal())
            .with_file(true)
            .with_line_number(true),
    );
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("tracing already initialised: {e}");
    }
}
