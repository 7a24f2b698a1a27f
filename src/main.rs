use std::process::ExitCode;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tier0_feeder::schedule::{run_cycle, run_polling};
use tier0_feeder::{wiring, AppConfig, AppError};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let once = std::env::args().skip(1).any(|a| a == "--once");
    match run(once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("feeder:fatal err={e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(once: bool) -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    info!("feeder:start once={once} poll_secs={} location={}",
          config.poll_interval.as_secs(),
          config.feed_location);
    let period = config.poll_interval;
    let control = Arc::new(tokio::task::spawn_blocking(move || wiring::build_control_loop(&config)).await??);

    if once {
        let report = run_cycle(control).await?;
        let json = serde_json::to_string_pretty(&report).map_err(|e| AppError::Config(e.to_string()))?;
        println!("{json}");
        return Ok(());
    }

    let cycles = run_polling(period,
                             || {
                                 let control = control.clone();
                                 async move {
                                     let report = run_cycle(control).await?;
                                     debug!("feeder:cycle cycle_id={} fed={}", report.cycle_id, report.files_fed);
                                     Ok(())
                                 }
                             },
                             shutdown_signal()).await;
    info!("feeder:stop cycles={cycles}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("feeder:signal handler unavailable err={e}");
        std::future::pending::<()>().await;
    }
}
