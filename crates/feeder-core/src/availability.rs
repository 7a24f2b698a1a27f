//! Disponibilidad de archivos con conocimiento de lumis.
//!
//! Los archivos de entrada del repack-merge pueden ser varios por lumi (y
//! entonces necesitan la protección de split activo) o un archivo puede
//! contener una o más lumis completas; para este último caso el algoritmo de
//! splitting necesita la primera y la última lumi del archivo.
//!
//! `FileCatalog` guarda las tablas de gestión de jobs en memoria y evalúa la
//! misma consulta que el backend Postgres:
//!
//! 1. archivos marcados disponibles para la suscripción;
//! 2. el stream dueño se resuelve por corrida: fileset de la suscripción ->
//!    workflow que lo produce -> fileset de entrada de ese workflow ->
//!    asociación run/stream/fileset;
//! 3. se descarta el archivo completo si alguna de sus lumis tiene un split
//!    activo para ese stream;
//! 4. rango de lumis = min/max sobre sus asociaciones, una fila por
//!    ubicación.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ActiveSplitLock, AvailableFile, FileId, FileLumi, FilesetId, LumiNumber, RunNumber, RunStreamKey, SubscriptionId,
                   WorkflowId};

/// Metadatos inmutables de un archivo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    pub lfn: String,
    pub filesize: i64,
    pub events: i64,
}

/// Suscripción: fileset de entrada ligado a un workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub fileset: FilesetId,
    pub workflow: WorkflowId,
    pub finished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    pub files: BTreeMap<FileId, FileDetails>,
    pub lumis: BTreeSet<FileLumi>,
    pub locations: BTreeSet<(FileId, String)>,
    pub fileset_files: BTreeSet<(FilesetId, FileId)>,
    pub subscriptions: BTreeMap<SubscriptionId, Subscription>,
    /// (workflow, fileset de salida)
    pub workflow_outputs: BTreeSet<(WorkflowId, FilesetId)>,
    pub sub_files_available: BTreeSet<(SubscriptionId, FileId)>,
    pub run_stream_filesets: BTreeMap<RunStreamKey, FilesetId>,
    pub split_locks: BTreeSet<ActiveSplitLock>,
}

impl FileCatalog {
    /// Streams dueños de la suscripción para una corrida dada.
    fn owning_streams(&self, parent_filesets: &BTreeSet<FilesetId>, run: RunNumber) -> Vec<&str> {
        self.run_stream_filesets
            .iter()
            .filter(|(key, fileset)| key.run == run && parent_filesets.contains(fileset))
            .map(|(key, _)| key.stream.as_str())
            .collect()
    }

    /// Filesets de entrada de los workflows que producen el fileset de la
    /// suscripción.
    fn parent_filesets(&self, fileset: FilesetId) -> BTreeSet<FilesetId> {
        let producers: BTreeSet<WorkflowId> = self.workflow_outputs
                                                  .iter()
                                                  .filter(|(_, out)| *out == fileset)
                                                  .map(|(wf, _)| *wf)
                                                  .collect();
        self.subscriptions
            .values()
            .filter(|s| producers.contains(&s.workflow))
            .map(|s| s.fileset)
            .collect()
    }

    /// Evalúa la consulta de disponibilidad para una suscripción.
    pub fn available_files(&self, subscription: SubscriptionId) -> Vec<AvailableFile> {
        let Some(sub) = self.subscriptions.get(&subscription) else {
            return Vec::new();
        };
        let parents = self.parent_filesets(sub.fileset);

        let mut rows = Vec::new();
        for (_, file) in self.sub_files_available.range((subscription, FileId::MIN)..=(subscription, FileId::MAX)) {
            let Some(details) = self.files.get(file) else { continue };

            let mut range: Option<(LumiNumber, LumiNumber)> = None;
            let mut locked = false;
            for fl in self.lumis.range(FileLumi { file: *file, run: 0, lumi: 0 }..=FileLumi { file: *file,
                                                                                           run: RunNumber::MAX,
                                                                                           lumi: LumiNumber::MAX })
            {
                for stream in self.owning_streams(&parents, fl.run) {
                    let lock = ActiveSplitLock { run: fl.run,
                                                 lumi: fl.lumi,
                                                 stream: stream.to_string() };
                    if self.split_locks.contains(&lock) {
                        locked = true;
                    }
                    range = Some(match range {
                                     None => (fl.lumi, fl.lumi),
                                     Some((lo, hi)) => (lo.min(fl.lumi), hi.max(fl.lumi)),
                                 });
                }
            }
            // Sin asociaciones resolubles no hay fila (join interno).
            let Some((first_lumi, last_lumi)) = range else { continue };
            if locked {
                continue;
            }
            for (_, location) in self.locations.range((*file, String::new())..).take_while(|(f, _)| f == file) {
                rows.push(AvailableFile { id: *file,
                                          filesize: details.filesize,
                                          events: details.events,
                                          lfn: details.lfn.clone(),
                                          location: location.clone(),
                                          first_lumi,
                                          last_lumi });
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: RunNumber = 345_000;

    /// Catálogo mínimo: fileset 1 (run/stream A) -> repack workflow 10
    /// (suscripción 100) -> fileset de salida 2 -> suscripción merge 200.
    fn catalog() -> FileCatalog {
        let mut c = FileCatalog::default();
        c.run_stream_filesets.insert(RunStreamKey::new(RUN, "A"), 1);
        c.subscriptions.insert(100, Subscription { fileset: 1, workflow: 10, finished: false });
        c.workflow_outputs.insert((10, 2));
        c.subscriptions.insert(200, Subscription { fileset: 2, workflow: 20, finished: false });
        c
    }

    fn add_file(c: &mut FileCatalog, id: FileId, lumis: &[LumiNumber], locations: &[&str]) {
        c.files.insert(id, FileDetails { lfn: format!("/store/repack/{id}.root"), filesize: 1000 + id, events: 10 * id });
        for l in lumis {
            c.lumis.insert(FileLumi { file: id, run: RUN, lumi: *l });
        }
        for loc in locations {
            c.locations.insert((id, loc.to_string()));
        }
        c.sub_files_available.insert((200, id));
    }

    #[test]
    fn lumi_range_spans_all_associations() {
        let mut c = catalog();
        add_file(&mut c, 1, &[7, 8, 9], &["T0_CH_CERN_Disk"]);
        add_file(&mut c, 2, &[5], &["T0_CH_CERN_Disk"]);
        let rows = c.available_files(200);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].first_lumi, rows[0].last_lumi), (7, 9));
        assert_eq!((rows[1].first_lumi, rows[1].last_lumi), (5, 5));
        assert!(rows[1].is_single_lumi());
    }

    #[test]
    fn split_lock_on_any_lumi_excludes_whole_file() {
        let mut c = catalog();
        add_file(&mut c, 1, &[10, 11], &["T0_CH_CERN_Disk"]);
        add_file(&mut c, 2, &[12], &["T0_CH_CERN_Disk"]);
        c.split_locks.insert(ActiveSplitLock { run: RUN, lumi: 11, stream: "A".into() });
        let rows = c.available_files(200);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn split_lock_of_other_stream_does_not_exclude() {
        let mut c = catalog();
        add_file(&mut c, 1, &[10, 11], &["T0_CH_CERN_Disk"]);
        c.split_locks.insert(ActiveSplitLock { run: RUN, lumi: 11, stream: "B".into() });
        assert_eq!(c.available_files(200).len(), 1);
    }

    #[test]
    fn one_row_per_location() {
        let mut c = catalog();
        add_file(&mut c, 1, &[3], &["T0_CH_CERN_Disk", "T2_CH_CERN"]);
        let rows = c.available_files(200);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location, "T0_CH_CERN_Disk");
        assert_eq!(rows[1].location, "T2_CH_CERN");
        assert!(rows.iter().all(|r| r.id == 1));
    }

    #[test]
    fn file_without_lumis_or_location_is_not_available() {
        let mut c = catalog();
        add_file(&mut c, 1, &[], &["T0_CH_CERN_Disk"]);
        add_file(&mut c, 2, &[4], &[]);
        assert!(c.available_files(200).is_empty());
        assert!(c.available_files(999).is_empty());
    }
}
