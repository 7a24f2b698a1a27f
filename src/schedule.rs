//! Ejecución periódica del ciclo.
//!
//! El ciclo es sincrónico (Diesel y procesos externos), así que corre en
//! `spawn_blocking`. Un ciclo fallido se registra y el siguiente tick lo
//! reintenta; la señal de apagado sólo se atiende entre ciclos.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use feeder_core::{ControlLoop, CycleReport};
use log::{error, info};
use tokio::time::{interval, MissedTickBehavior};

use crate::errors::AppError;

/// Corre un ciclo completo fuera del runtime async.
pub async fn run_cycle(control: Arc<ControlLoop>) -> Result<CycleReport, AppError> {
    let report = tokio::task::spawn_blocking(move || control.run_cycle()).await??;
    Ok(report)
}

/// Llama a `cycle` cada `period` hasta que `shutdown` se resuelve.
/// Devuelve la cantidad de ciclos ejecutados.
pub async fn run_polling<F, Fut, S>(period: Duration, mut cycle: F, shutdown: S) -> usize
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<(), AppError>>,
          S: Future<Output = ()>
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    let mut cycles = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("schedule:shutdown cycles={cycles}");
                break;
            }
            _ = ticker.tick() => {
                cycles += 1;
                if let Err(e) = cycle().await {
                    error!("schedule:cycle failed n={cycles} err={e}");
                }
            }
        }
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[test]
    fn stops_when_shutdown_fires_after_third_cycle() {
        let count = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(Notify::new());
        let cycles = tokio_test::block_on(async {
            let (c, s) = (count.clone(), stop.clone());
            run_polling(Duration::from_millis(5),
                        move || {
                            let (c, s) = (c.clone(), s.clone());
                            async move {
                                if c.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                                    s.notify_one();
                                }
                                Ok(())
                            }
                        },
                        async move { stop.notified().await })
            .await
        });
        assert_eq!(cycles, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_cycle_does_not_stop_polling() {
        let stop = Arc::new(Notify::new());
        let cycles = tokio_test::block_on(async {
            let s = stop.clone();
            let mut n = 0;
            run_polling(Duration::from_millis(1),
                        move || {
                            n += 1;
                            let s = s.clone();
                            async move {
                                if n == 1 {
                                    return Err(AppError::Config("boom".into()));
                                }
                                s.notify_one();
                                Ok(())
                            }
                        },
                        async move { stop.notified().await })
            .await
        });
        assert_eq!(cycles, 2);
    }

    #[test]
    fn ready_shutdown_runs_no_cycle() {
        let cycles = tokio_test::block_on(run_polling(Duration::from_secs(60), || async { Ok(()) }, async {}));
        assert_eq!(cycles, 0);
    }
}
