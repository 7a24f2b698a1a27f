use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feeder_core::collab::{RecordingClosureTracker, RecordingConfigurator, RecordingNotifier, RecordingUploader,
                          StaticTriggerSource};
use feeder_core::model::RunStreamKey;
use feeder_core::store::{InMemoryFeederStore, InMemoryMonitoringStore};
use feeder_core::{ControlLoop, FeederSettings};
use tier0_feeder::schedule::{run_cycle, run_polling};
use tokio::sync::Notify;

const PIPELINE: &str = r#"{ "global": { "acquisition_era": "Run2026A" } }"#;

fn control_loop(store: Arc<InMemoryFeederStore>, pipeline: &tempfile::NamedTempFile, notifier: Arc<RecordingNotifier>) -> Arc<ControlLoop> {
    let settings = FeederSettings::new(pipeline.path(), "/specs");
    let control = ControlLoop::builder(store.clone(), settings).triggers(Arc::new(StaticTriggerSource::default()))
                                                               .configurator(Arc::new(RecordingConfigurator::with_store(store)))
                                                               .closure(Arc::new(RecordingClosureTracker::default()))
                                                               .monitoring(Arc::new(InMemoryMonitoringStore::default()))
                                                               .notifier(notifier)
                                                               .uploader(Arc::new(RecordingUploader::default()))
                                                               .build()
                                                               .unwrap();
    Arc::new(control)
}

fn pipeline() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PIPELINE.as_bytes()).unwrap();
    file
}

#[test]
fn blocking_cycle_feeds_pending_streamers() {
    let store = Arc::new(InMemoryFeederStore::default());
    store.add_run(500, None);
    store.register_run_stream(RunStreamKey::new(500, "A"));
    store.add_streamer(500, "A", 1, "/store/t0streamer/run500_ls0001_streamA.dat");
    let file = pipeline();
    let control = control_loop(store, &file, Arc::new(RecordingNotifier::default()));

    let report = tokio_test::block_on(run_cycle(control.clone())).unwrap();
    assert!(report.pipeline_config_loaded);
    assert_eq!(report.files_fed, 1);
    assert!(report.finished_at.is_some());

    let report = tokio_test::block_on(run_cycle(control)).unwrap();
    assert_eq!(report.files_fed, 0);
}

#[test]
fn polling_notifies_closed_run_stream_once() {
    let store = Arc::new(InMemoryFeederStore::default());
    store.add_run(501, None);
    let fileset = store.register_run_stream(RunStreamKey::new(501, "A"));
    store.add_streamer(501, "A", 1, "/store/t0streamer/run501_ls0001_streamA.dat");
    let file = pipeline();
    let notifier = Arc::new(RecordingNotifier::default());
    let control = control_loop(store.clone(), &file, notifier.clone());

    let seen = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(Notify::new());
    let cycles = tokio_test::block_on(async {
        let (seen, s) = (seen.clone(), stop.clone());
        run_polling(Duration::from_millis(2),
                    move || {
                        let (control, store, seen, s) = (control.clone(), store.clone(), seen.clone(), s.clone());
                        async move {
                            run_cycle(control).await?;
                            // Tras el primer ciclo (feed) se cierra el fileset.
                            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                                store.close_fileset(fileset);
                            } else if seen.load(Ordering::SeqCst) == 3 {
                                s.notify_one();
                            }
                            Ok(())
                        }
                    },
                    async move { stop.notified().await })
        .await
    });

    assert_eq!(cycles, 3);
    assert_eq!(notifier.chunk_sizes(), vec![1]);
}
