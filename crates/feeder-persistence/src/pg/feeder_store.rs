//! Store primario sobre Postgres.

use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Bool, Integer, Nullable, Text};
use log::{debug, info};

use feeder_core::model::{CloseoutCandidate, DatasetLockRow, ExpressConfigRow, FinishedStreamer, MonitoredWorkflow, NewRun,
                         PrimaryDatasetKey, RecoConfigRow, RecoReleaseMark, RecoReleaseRow, RunNumber, RunStreamKey, WorkflowId,
                         WorkflowKind};
use feeder_core::store::FeederStore;
use feeder_core::FeederError;

use super::{core_run, db_run, db_runs, with_conn, with_tx, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{dataset_locked, run, run_summary, streamer};

/// Store primario. `feed_location` es la ubicación asignada a los
/// archivos admitidos por el feed.
pub struct PgFeederStore<P: ConnectionProvider> {
    pub provider: P,
    feed_location: String,
}

impl<P: ConnectionProvider> PgFeederStore<P> {
    pub fn new(provider: P, feed_location: impl Into<String>) -> Self {
        Self { provider,
               feed_location: feed_location.into() }
    }

    pub fn feed_location(&self) -> &str {
        &self.feed_location
    }
}

#[derive(QueryableByName, Debug)]
struct RunStreamRow {
    #[diesel(sql_type = Integer)]
    run_id: i32,
    #[diesel(sql_type = Text)]
    stream: String,
}

impl TryFrom<RunStreamRow> for RunStreamKey {
    type Error = PersistenceError;

    fn try_from(r: RunStreamRow) -> Result<Self, Self::Error> {
        Ok(RunStreamKey::new(core_run(r.run_id)?, r.stream))
    }
}

#[derive(QueryableByName, Debug)]
struct IdRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(QueryableByName, Debug)]
struct WorkflowRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Integer)]
    run_id: i32,
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName, Debug)]
struct CloseoutRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    fileset: i64,
    #[diesel(sql_type = Bool)]
    fileset_open: bool,
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName, Debug)]
struct FinishedRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    lfn: String,
}

#[derive(QueryableByName, Debug)]
struct ExpressRow {
    #[diesel(sql_type = Integer)]
    run_id: i32,
    #[diesel(sql_type = Text)]
    stream: String,
    #[diesel(sql_type = Text)]
    cmssw: String,
    #[diesel(sql_type = Text)]
    scram_arch: String,
    #[diesel(sql_type = Nullable<Text>)]
    reco_cmssw: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    reco_scram_arch: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    alca_skim: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    dqm_seq: Option<String>,
    #[diesel(sql_type = Text)]
    global_tag: String,
    #[diesel(sql_type = Text)]
    scenario: String,
}

#[derive(QueryableByName, Debug)]
struct RecoRow {
    #[diesel(sql_type = Integer)]
    run_id: i32,
    #[diesel(sql_type = Text)]
    primds: String,
    #[diesel(sql_type = Text)]
    cmssw: String,
    #[diesel(sql_type = Text)]
    scram_arch: String,
    #[diesel(sql_type = Nullable<Text>)]
    alca_skim: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    physics_skim: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    dqm_seq: Option<String>,
    #[diesel(sql_type = Text)]
    global_tag: String,
    #[diesel(sql_type = Text)]
    scenario: String,
}

#[derive(QueryableByName, Debug)]
struct RecoReleaseDbRow {
    #[diesel(sql_type = Integer)]
    run_id: i32,
    #[diesel(sql_type = Text)]
    primds: String,
    #[diesel(sql_type = BigInt)]
    released: i64,
    #[diesel(sql_type = Integer)]
    in_datasvc: i32,
}

const FIND_NEW_RUN_STREAMS: &str = "\
    SELECT DISTINCT s.run_id, st.name AS stream
    FROM streamer s
    JOIN run r ON r.run_id = s.run_id AND r.configured
    JOIN stream st ON st.id = s.stream_id
    WHERE NOT EXISTS (SELECT 1 FROM run_stream_fileset_assoc a
                      WHERE a.run_id = s.run_id AND a.stream_id = s.stream_id)
    ORDER BY s.run_id, st.name";

// Streamers pendientes cuyo run/stream tiene fileset abierto. Se bloquean
// para que todas las inserciones del feed vean el mismo conjunto.
const PENDING_STREAMERS: &str = "\
    SELECT s.streamer_id AS id
    FROM streamer s
    JOIN run_stream_fileset_assoc a ON a.run_id = s.run_id AND a.stream_id = s.stream_id
    JOIN wmbs_fileset f ON f.id = a.fileset AND f.open
    WHERE NOT s.used
    ORDER BY s.streamer_id
    FOR UPDATE OF s";

const FEED_LOCATION: &str = "INSERT INTO wmbs_location (se_name) VALUES ($1) ON CONFLICT (se_name) DO NOTHING";

const FEED_FILE_DETAILS: &str = "\
    INSERT INTO wmbs_file_details (lfn, filesize, events)
    SELECT s.lfn, s.filesize, s.events FROM streamer s WHERE s.streamer_id = ANY($1)
    ON CONFLICT (lfn) DO NOTHING";

const FEED_RUNLUMI: &str = "\
    INSERT INTO wmbs_file_runlumi_map (fileid, run, lumi)
    SELECT d.id, s.run_id, s.lumi_id
    FROM streamer s JOIN wmbs_file_details d ON d.lfn = s.lfn
    WHERE s.streamer_id = ANY($1)
    ON CONFLICT DO NOTHING";

const FEED_FILE_LOCATION: &str = "\
    INSERT INTO wmbs_file_location (fileid, location)
    SELECT d.id, l.id
    FROM streamer s
    JOIN wmbs_file_details d ON d.lfn = s.lfn
    JOIN wmbs_location l ON l.se_name = $2
    WHERE s.streamer_id = ANY($1)
    ON CONFLICT DO NOTHING";

const FEED_FILESET_FILES: &str = "\
    INSERT INTO wmbs_fileset_files (fileid, fileset)
    SELECT d.id, a.fileset
    FROM streamer s
    JOIN wmbs_file_details d ON d.lfn = s.lfn
    JOIN run_stream_fileset_assoc a ON a.run_id = s.run_id AND a.stream_id = s.stream_id
    WHERE s.streamer_id = ANY($1)
    ON CONFLICT DO NOTHING";

const FEED_AVAILABLE: &str = "\
    INSERT INTO wmbs_sub_files_available (subscription, fileid)
    SELECT sub.id, d.id
    FROM streamer s
    JOIN wmbs_file_details d ON d.lfn = s.lfn
    JOIN run_stream_fileset_assoc a ON a.run_id = s.run_id AND a.stream_id = s.stream_id
    JOIN wmbs_subscription sub ON sub.fileset = a.fileset
    WHERE s.streamer_id = ANY($1)
    ON CONFLICT DO NOTHING";

const FEED_TOUCH_FILESETS: &str = "\
    UPDATE wmbs_fileset SET last_update = now()
    WHERE id IN (SELECT a.fileset
                 FROM streamer s
                 JOIN run_stream_fileset_assoc a ON a.run_id = s.run_id AND a.stream_id = s.stream_id
                 WHERE s.streamer_id = ANY($1))";

const MARK_INJECTED: &str = "\
    UPDATE wmbs_workflow w SET injected = TRUE
    WHERE NOT w.injected
      AND w.kind IN ('Repack', 'Express')
      AND EXISTS (SELECT 1
                  FROM wmbs_subscription sub
                  JOIN run_stream_fileset_assoc a ON a.fileset = sub.fileset
                  JOIN wmbs_fileset f ON f.id = sub.fileset AND NOT f.open
                  WHERE sub.workflow = w.id
                    AND ($1 = FALSE
                         OR NOT EXISTS (SELECT 1 FROM streamer s
                                        WHERE s.run_id = a.run_id
                                          AND s.stream_id = a.stream_id
                                          AND NOT s.deleted)))";

const UNTRACKED_WORKFLOWS: &str = "\
    SELECT w.id, w.run_id, w.name
    FROM wmbs_workflow w
    LEFT JOIN workflow_monitoring m ON m.workflow = w.id
    WHERE w.kind = $1 AND NOT COALESCE(m.tracked, FALSE)
    ORDER BY w.id";

const MARK_TRACKED: &str = "\
    INSERT INTO workflow_monitoring (workflow, tracked) VALUES ($1, TRUE)
    ON CONFLICT (workflow) DO UPDATE SET tracked = TRUE";

const NOT_CLOSED_OUT: &str = "\
    SELECT w.id, sub.fileset, f.open AS fileset_open, w.name
    FROM wmbs_workflow w
    JOIN wmbs_subscription sub ON sub.workflow = w.id
    JOIN wmbs_fileset f ON f.id = sub.fileset
    LEFT JOIN workflow_monitoring m ON m.workflow = w.id
    WHERE NOT COALESCE(m.closeout, FALSE)
      AND (COALESCE(m.tracked, FALSE) OR w.kind = 'Express')
    ORDER BY w.id";

const MARK_CLOSED_OUT: &str = "\
    INSERT INTO workflow_monitoring (workflow, closeout) VALUES ($1, TRUE)
    ON CONFLICT (workflow) DO UPDATE SET closeout = TRUE";

const FINISHED_STREAMERS: &str = "\
    SELECT s.streamer_id AS id, s.lfn
    FROM streamer s
    JOIN run_stream_fileset_assoc a ON a.run_id = s.run_id AND a.stream_id = s.stream_id
    JOIN wmbs_fileset f ON f.id = a.fileset AND NOT f.open
    WHERE s.used AND NOT s.deleted
    ORDER BY s.streamer_id";

const PENDING_RUN_STREAM_DONE: &str = "\
    SELECT a.run_id, st.name AS stream
    FROM run_stream_fileset_assoc a
    JOIN stream st ON st.id = a.stream_id
    JOIN wmbs_fileset f ON f.id = a.fileset AND NOT f.open
    WHERE NOT a.in_datasvc
      AND NOT EXISTS (SELECT 1 FROM wmbs_subscription sub
                      WHERE sub.fileset = a.fileset AND NOT sub.finished)
    ORDER BY a.run_id, st.name";

const MARK_RUN_STREAM_DONE: &str = "\
    UPDATE run_stream_fileset_assoc a SET in_datasvc = TRUE
    FROM stream st
    WHERE st.id = a.stream_id AND a.run_id = $1 AND st.name = $2";

const PENDING_EXPRESS_CONFIGS: &str = "\
    SELECT e.run_id, st.name AS stream, e.cmssw, e.scram_arch, e.reco_cmssw, e.reco_scram_arch,
           e.alca_skim, e.dqm_seq, e.global_tag, e.scenario
    FROM express_config e
    JOIN stream st ON st.id = e.stream_id
    WHERE NOT e.in_datasvc
    ORDER BY e.run_id, st.name";

const MARK_EXPRESS_CONFIG: &str = "\
    UPDATE express_config e SET in_datasvc = TRUE
    FROM stream st
    WHERE st.id = e.stream_id AND e.run_id = $1 AND st.name = $2";

const PENDING_RECO_CONFIGS: &str = "\
    SELECT r.run_id, p.name AS primds, r.cmssw, r.scram_arch, r.alca_skim, r.physics_skim,
           r.dqm_seq, r.global_tag, r.scenario
    FROM reco_config r
    JOIN primary_dataset p ON p.id = r.primds_id
    WHERE NOT r.in_datasvc
    ORDER BY r.run_id, p.name";

const MARK_RECO_CONFIG: &str = "\
    UPDATE reco_config r SET in_datasvc = TRUE
    FROM primary_dataset p
    WHERE p.id = r.primds_id AND r.run_id = $1 AND p.name = $2";

const PENDING_RECO_RELEASES: &str = "\
    SELECT r.run_id, p.name AS primds, r.released, r.in_datasvc
    FROM reco_release_config r
    JOIN primary_dataset p ON p.id = r.primds_id
    WHERE r.in_datasvc < 2
    ORDER BY r.run_id, p.name";

// El contador sólo sube.
const MARK_RECO_RELEASE: &str = "\
    UPDATE reco_release_config SET in_datasvc = GREATEST(in_datasvc, $2)
    WHERE run_id = $1";

impl<P: ConnectionProvider> PgFeederStore<P> {
    fn workflows_for_monitoring(&self, kind: WorkflowKind) -> Result<Vec<MonitoredWorkflow>, FeederError> {
        let rows: Vec<WorkflowRow> = with_conn(&self.provider, |conn| {
                                         diesel::sql_query(UNTRACKED_WORKFLOWS).bind::<Text, _>(kind.as_str())
                                                                               .load(conn)
                                     })?;
        let workflows = rows.into_iter()
                            .map(|r| -> Result<_, PersistenceError> {
                                Ok(MonitoredWorkflow { id: r.id,
                                                       run: core_run(r.run_id)?,
                                                       name: r.name })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
        Ok(workflows)
    }

    /// Actualiza cada clave con `sql` (binds run, nombre) en una sola
    /// transacción.
    fn mark_by_name<'a, I>(&self, sql: &str, keys: I) -> Result<(), FeederError>
        where I: IntoIterator<Item = (RunNumber, &'a str)>
    {
        let keys = keys.into_iter()
                       .map(|(run, name)| -> Result<_, PersistenceError> { Ok((db_run(run)?, name)) })
                       .collect::<Result<Vec<_>, _>>()?;
        with_tx(&self.provider, |tx| {
            for (run, name) in &keys {
                diesel::sql_query(sql).bind::<Integer, _>(*run)
                                      .bind::<Text, _>(*name)
                                      .execute(tx)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl<P: ConnectionProvider> FeederStore for PgFeederStore<P> {
    fn find_new_runs(&self) -> Result<Vec<NewRun>, FeederError> {
        let rows: Vec<(i32, Option<String>)> = with_conn(&self.provider, |conn| {
                                                   run::table.filter(run::configured.eq(false))
                                                             .select((run::run_id, run::hltkey))
                                                             .order(run::run_id.asc())
                                                             .load(conn)
                                               })?;
        let runs = rows.into_iter()
                       .map(|(r, key)| -> Result<_, PersistenceError> {
                           Ok(NewRun { run: core_run(r)?,
                                       trigger_key: key })
                       })
                       .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn find_new_run_streams(&self) -> Result<Vec<RunStreamKey>, FeederError> {
        let rows: Vec<RunStreamRow> = with_conn(&self.provider, |conn| diesel::sql_query(FIND_NEW_RUN_STREAMS).load(conn))?;
        let keys = rows.into_iter().map(RunStreamKey::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn find_new_express_runs(&self) -> Result<Vec<RunNumber>, FeederError> {
        let rows: Vec<i32> = with_conn(&self.provider, |conn| {
                                 run::table.inner_join(run_summary::table)
                                           .filter(run::configured.eq(true))
                                           .filter(run::express_released.eq(false))
                                           .select(run::run_id)
                                           .order(run::run_id.asc())
                                           .load(conn)
                             })?;
        let runs = rows.into_iter().map(core_run).collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn release_express(&self, runs: &[RunNumber]) -> Result<(), FeederError> {
        if runs.is_empty() {
            return Ok(());
        }
        let ids = db_runs(runs)?;
        let updated = with_conn(&self.provider, |conn| {
                          diesel::update(run::table.filter(run::run_id.eq_any(ids.clone()))).set(run::express_released.eq(true))
                                                                                             .execute(conn)
                      })?;
        debug!("release_express:done runs={} updated={updated}", runs.len());
        Ok(())
    }

    fn feed_streamers(&self) -> Result<usize, FeederError> {
        let location = self.feed_location.as_str();
        let admitted = with_tx(&self.provider, |tx| {
                           let pending: Vec<IdRow> = diesel::sql_query(PENDING_STREAMERS).load(tx)?;
                           if pending.is_empty() {
                               return Ok(0);
                           }
                           let ids: Vec<i64> = pending.into_iter().map(|r| r.id).collect();
                           diesel::sql_query(FEED_LOCATION).bind::<Text, _>(location).execute(tx)?;
                           diesel::sql_query(FEED_FILE_DETAILS).bind::<Array<BigInt>, _>(ids.clone()).execute(tx)?;
                           diesel::sql_query(FEED_RUNLUMI).bind::<Array<BigInt>, _>(ids.clone()).execute(tx)?;
                           diesel::sql_query(FEED_FILE_LOCATION).bind::<Array<BigInt>, _>(ids.clone())
                                                                .bind::<Text, _>(location)
                                                                .execute(tx)?;
                           diesel::sql_query(FEED_FILESET_FILES).bind::<Array<BigInt>, _>(ids.clone()).execute(tx)?;
                           diesel::sql_query(FEED_AVAILABLE).bind::<Array<BigInt>, _>(ids.clone()).execute(tx)?;
                           diesel::sql_query(FEED_TOUCH_FILESETS).bind::<Array<BigInt>, _>(ids.clone()).execute(tx)?;
                           diesel::update(streamer::table.filter(streamer::streamer_id.eq_any(ids))).set(streamer::used.eq(true))
                                                                                                    .execute(tx)
                       }).map_err(|e| FeederError::Feed(e.to_string()))?;
        if admitted > 0 {
            info!("feed_streamers:done admitted={admitted} location={location}");
        }
        Ok(admitted)
    }

    fn mark_workflows_injected(&self, require_notified: bool) -> Result<usize, FeederError> {
        let n = with_conn(&self.provider, |conn| {
                    diesel::sql_query(MARK_INJECTED).bind::<Bool, _>(require_notified).execute(conn)
                })?;
        debug!("mark_workflows_injected:done count={n} require_notified={require_notified}");
        Ok(n)
    }

    fn streamer_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError> {
        self.workflows_for_monitoring(WorkflowKind::Repack)
    }

    fn prompt_reco_workflows_for_monitoring(&self) -> Result<Vec<MonitoredWorkflow>, FeederError> {
        self.workflows_for_monitoring(WorkflowKind::PromptReco)
    }

    fn mark_workflow_tracked(&self, workflow: WorkflowId) -> Result<(), FeederError> {
        with_conn(&self.provider, |conn| diesel::sql_query(MARK_TRACKED).bind::<BigInt, _>(workflow).execute(conn))?;
        Ok(())
    }

    fn not_closed_out_workflows(&self) -> Result<Vec<CloseoutCandidate>, FeederError> {
        let rows: Vec<CloseoutRow> = with_conn(&self.provider, |conn| diesel::sql_query(NOT_CLOSED_OUT).load(conn))?;
        Ok(rows.into_iter()
               .map(|r| CloseoutCandidate { id: r.id,
                                            fileset: r.fileset,
                                            fileset_open: r.fileset_open,
                                            name: r.name })
               .collect())
    }

    fn mark_workflow_closed_out(&self, workflow: WorkflowId) -> Result<(), FeederError> {
        with_conn(&self.provider, |conn| diesel::sql_query(MARK_CLOSED_OUT).bind::<BigInt, _>(workflow).execute(conn))?;
        Ok(())
    }

    fn finished_streamers(&self) -> Result<Vec<FinishedStreamer>, FeederError> {
        let rows: Vec<FinishedRow> = with_conn(&self.provider, |conn| diesel::sql_query(FINISHED_STREAMERS).load(conn))?;
        Ok(rows.into_iter().map(|r| FinishedStreamer { id: r.id, lfn: r.lfn }).collect())
    }

    fn mark_streamers_finished(&self, streamers: &[i64]) -> Result<(), FeederError> {
        if streamers.is_empty() {
            return Ok(());
        }
        with_conn(&self.provider, |conn| {
            diesel::update(streamer::table.filter(streamer::streamer_id.eq_any(streamers.to_vec()))).set(streamer::deleted.eq(true))
                                                                                                   .execute(conn)
        })?;
        Ok(())
    }

    fn pending_run_stream_done(&self) -> Result<Vec<RunStreamKey>, FeederError> {
        let rows: Vec<RunStreamRow> = with_conn(&self.provider, |conn| diesel::sql_query(PENDING_RUN_STREAM_DONE).load(conn))?;
        let keys = rows.into_iter().map(RunStreamKey::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn mark_run_stream_done_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError> {
        self.mark_by_name(MARK_RUN_STREAM_DONE, keys.iter().map(|k| (k.run, k.stream.as_str())))
    }

    fn pending_express_configs(&self) -> Result<Vec<ExpressConfigRow>, FeederError> {
        let rows: Vec<ExpressRow> = with_conn(&self.provider, |conn| diesel::sql_query(PENDING_EXPRESS_CONFIGS).load(conn))?;
        let rows = rows.into_iter()
                       .map(|r| -> Result<_, PersistenceError> {
                           Ok(ExpressConfigRow { run: core_run(r.run_id)?,
                                                 stream: r.stream,
                                                 cmssw: r.cmssw,
                                                 scram_arch: r.scram_arch,
                                                 reco_cmssw: r.reco_cmssw,
                                                 reco_scram_arch: r.reco_scram_arch,
                                                 alca_skim: r.alca_skim,
                                                 dqm_seq: r.dqm_seq,
                                                 global_tag: r.global_tag,
                                                 scenario: r.scenario })
                       })
                       .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn mark_express_configs_synced(&self, keys: &[RunStreamKey]) -> Result<(), FeederError> {
        self.mark_by_name(MARK_EXPRESS_CONFIG, keys.iter().map(|k| (k.run, k.stream.as_str())))
    }

    fn pending_reco_configs(&self) -> Result<Vec<RecoConfigRow>, FeederError> {
        let rows: Vec<RecoRow> = with_conn(&self.provider, |conn| diesel::sql_query(PENDING_RECO_CONFIGS).load(conn))?;
        let rows = rows.into_iter()
                       .map(|r| -> Result<_, PersistenceError> {
                           Ok(RecoConfigRow { run: core_run(r.run_id)?,
                                              primds: r.primds,
                                              cmssw: r.cmssw,
                                              scram_arch: r.scram_arch,
                                              alca_skim: r.alca_skim,
                                              physics_skim: r.physics_skim,
                                              dqm_seq: r.dqm_seq,
                                              global_tag: r.global_tag,
                                              scenario: r.scenario })
                       })
                       .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn mark_reco_configs_synced(&self, keys: &[PrimaryDatasetKey]) -> Result<(), FeederError> {
        self.mark_by_name(MARK_RECO_CONFIG, keys.iter().map(|k| (k.run, k.primds.as_str())))
    }

    fn pending_reco_releases(&self) -> Result<Vec<RecoReleaseRow>, FeederError> {
        let rows: Vec<RecoReleaseDbRow> = with_conn(&self.provider, |conn| diesel::sql_query(PENDING_RECO_RELEASES).load(conn))?;
        let rows = rows.into_iter()
                       .map(|r| -> Result<_, PersistenceError> {
                           Ok(RecoReleaseRow { run: core_run(r.run_id)?,
                                               primds: r.primds,
                                               released: r.released,
                                               in_datasvc: r.in_datasvc })
                       })
                       .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn mark_reco_releases_synced(&self, marks: &[RecoReleaseMark]) -> Result<(), FeederError> {
        let runs = marks.iter().map(|m| db_run(m.run)).collect::<Result<Vec<_>, _>>()?;
        with_tx(&self.provider, |tx| {
            for (mark, run) in marks.iter().zip(&runs) {
                diesel::sql_query(MARK_RECO_RELEASE).bind::<Integer, _>(*run)
                                                    .bind::<Integer, _>(mark.in_datasvc)
                                                    .execute(tx)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn pending_dataset_locks(&self) -> Result<Vec<DatasetLockRow>, FeederError> {
        let rows: Vec<(i64, String)> = with_conn(&self.provider, |conn| {
                                           dataset_locked::table.filter(dataset_locked::in_datasvc.eq(false))
                                                                .select((dataset_locked::id, dataset_locked::path))
                                                                .order(dataset_locked::id.asc())
                                                                .load(conn)
                                       })?;
        Ok(rows.into_iter().map(|(id, path)| DatasetLockRow { id, path }).collect())
    }

    fn mark_dataset_locks_synced(&self, ids: &[i64]) -> Result<(), FeederError> {
        if ids.is_empty() {
            return Ok(());
        }
        with_conn(&self.provider, |conn| {
            diesel::update(dataset_locked::table.filter(dataset_locked::id.eq_any(ids.to_vec()))).set(dataset_locked::in_datasvc.eq(true))
                                                                                                .execute(conn)
        })?;
        Ok(())
    }
}
