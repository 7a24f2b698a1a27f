//! Notificación al sistema de transferencia de los streamers ya procesados.
//!
//! Los streamers cuyo run/stream cerró se envían en lotes de tamaño fijo,
//! conservando el orden. Cada lote se marca como notificado aunque el
//! notificador haya fallado: el fallo sólo se registra.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use serde::Serialize;

use crate::collab::Notifier;
use crate::errors::FeederError;
use crate::process::{command, run_command, ProcessOutput};
use crate::store::FeederStore;

/// Resultado de un pase de notificación.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub chunks: usize,
    pub marked: usize,
    pub failed_chunks: usize,
}

pub struct NotificationDispatcher {
    store: Arc<dyn FeederStore>,
    notifier: Arc<dyn Notifier>,
    chunk_size: usize,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn FeederStore>, notifier: Arc<dyn Notifier>, chunk_size: usize) -> Self {
        Self { store,
               notifier,
               chunk_size: chunk_size.max(1) }
    }

    pub fn dispatch(&self) -> Result<NotificationReport, FeederError> {
        let finished = self.store.finished_streamers()?;
        let mut report = NotificationReport::default();
        if finished.is_empty() {
            debug!("notify:dispatch nothing to notify");
            return Ok(report);
        }

        for chunk in finished.chunks(self.chunk_size) {
            let names: Vec<&str> = chunk.iter().map(|s| s.basename()).collect();
            debug!("notify:chunk size={}", names.len());
            let failed = match self.notifier.notify(&names) {
                Ok(out) if out.stderr.trim().is_empty() => false,
                Ok(out) => {
                    error!("notify:chunk could not notify transfer system code={:?} err={}", out.code, out.stderr.trim());
                    true
                }
                Err(e) => {
                    error!("notify:chunk could not notify transfer system err={e}");
                    true
                }
            };
            // Se marca siempre, haya fallado o no el notificador.
            let ids: Vec<i64> = chunk.iter().map(|s| s.id).collect();
            self.store.mark_streamers_finished(&ids)?;
            report.chunks += 1;
            report.marked += ids.len();
            if failed {
                report.failed_chunks += 1;
            }
        }
        info!("notify:dispatch chunks={} marked={} failed_chunks={}",
              report.chunks, report.marked, report.failed_chunks);
        Ok(report)
    }
}

/// Notificador productivo: un script bash por stdin que prepara el entorno
/// del sistema de transferencia y llama a `sendRepackedStatus.pl`.
#[derive(Debug, Clone)]
pub struct ScriptNotifier {
    base_dir: PathBuf,
}

impl ScriptNotifier {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn script(&self, basenames: &[&str]) -> String {
        let base = shell_escape::escape(self.base_dir.display().to_string().into());
        let params: Vec<String> = basenames.iter()
                                           .map(|name| format!("-FILENAME {}", shell_escape::escape((*name).into())))
                                           .collect();
        format!("export T0_BASE_DIR={base}\n\
                 export T0ROOT=${{T0_BASE_DIR}}/T0\n\
                 export CONFIG=${{T0_BASE_DIR}}/Config/TransferSystem_CERN.cfg\n\
                 export PERL5LIB=${{T0ROOT}}/perl_lib\n\
                 unset LANGUAGE\n\
                 unset LC_ALL\n\
                 unset LC_CTYPE\n\
                 export LANG=C\n\
                 ${{T0ROOT}}/operations/sendRepackedStatus.pl --config $CONFIG {}\n",
                params.join(" "))
    }
}

impl Notifier for ScriptNotifier {
    fn notify(&self, basenames: &[&str]) -> Result<ProcessOutput, FeederError> {
        run_command(command("/bin/bash", Vec::<&str>::new()), Some(&self.script(basenames)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NotifierBehavior, RecordingNotifier};
    use crate::model::RunStreamKey;
    use crate::store::InMemoryFeederStore;

    /// Run/stream cerrado con `n` streamers ya admitidos.
    fn closed_run_stream(n: usize) -> Arc<InMemoryFeederStore> {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(1, None);
        let fileset = store.register_run_stream(RunStreamKey::new(1, "A"));
        for i in 0..n {
            store.add_streamer(1, "A", i as u32 + 1, &format!("/store/t0streamer/run1_ls{i:04}_streamA.dat"));
        }
        store.feed_streamers().unwrap();
        store.close_fileset(fileset);
        store
    }

    #[test]
    fn chunks_preserve_order_and_basenames() {
        let store = closed_run_stream(3);
        let notifier = Arc::new(RecordingNotifier::default());
        NotificationDispatcher::new(store, notifier.clone(), 2).dispatch().unwrap();
        let chunks = notifier.chunks.lock().unwrap().clone();
        assert_eq!(chunks,
                   vec![vec!["run1_ls0000_streamA.dat".to_string(), "run1_ls0001_streamA.dat".to_string()],
                        vec!["run1_ls0002_streamA.dat".to_string()]]);
    }

    #[test]
    fn failing_notifier_still_marks_every_chunk() {
        for behavior in [NotifierBehavior::ErrorOutput, NotifierBehavior::Unreachable] {
            let store = closed_run_stream(5);
            let notifier = Arc::new(RecordingNotifier::new(behavior));
            let report = NotificationDispatcher::new(store.clone(), notifier, 2).dispatch().unwrap();
            assert_eq!(report, NotificationReport { chunks: 3, marked: 5, failed_chunks: 3 });
            assert!(store.finished_streamers().unwrap().is_empty());
        }
    }

    #[test]
    fn open_run_stream_is_not_notified() {
        let store = Arc::new(InMemoryFeederStore::default());
        store.add_run(1, None);
        store.register_run_stream(RunStreamKey::new(1, "A"));
        store.add_streamer(1, "A", 1, "/store/a.dat");
        store.feed_streamers().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let report = NotificationDispatcher::new(store, notifier.clone(), 50).dispatch().unwrap();
        assert_eq!(report.chunks, 0);
        assert!(notifier.chunk_sizes().is_empty());
    }

    #[test]
    fn script_sets_environment_and_quotes_names() {
        let notifier = ScriptNotifier::new("/data/tier0");
        let script = notifier.script(&["run1_ls0001_streamA.dat", "weird name.dat"]);
        assert!(script.contains("export T0_BASE_DIR=/data/tier0\n"));
        assert!(script.contains("export PERL5LIB=${T0ROOT}/perl_lib\n"));
        assert!(script.contains("export LANG=C\n"));
        assert!(script.contains("sendRepackedStatus.pl --config $CONFIG -FILENAME run1_ls0001_streamA.dat -FILENAME 'weird name.dat'"));
    }

    #[test]
    fn script_runs_through_bash() {
        let dir = tempfile::tempdir().unwrap();
        let ops = dir.path().join("T0/operations");
        std::fs::create_dir_all(&ops).unwrap();
        let tool = ops.join("sendRepackedStatus.pl");
        std::fs::write(&tool, "#!/bin/sh\necho \"$LANG $@\"\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = ScriptNotifier::new(dir.path()).notify(&["a.dat"]).unwrap();
        assert!(out.success());
        assert!(out.stdout.starts_with("C --config "));
        assert!(out.stdout.trim_end().ends_with("-FILENAME a.dat"));
    }
}
