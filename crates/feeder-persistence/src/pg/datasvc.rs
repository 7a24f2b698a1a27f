//! Data service sobre Postgres (schema `datasvc`).
//!
//! Cada lote se inserta en una transacción. Los inserts ignoran filas ya
//! presentes por clave natural; `reco_locked` es un upsert monótono.

use diesel::prelude::*;
use diesel::sql_types::{Bool, Integer};
use log::debug;

use feeder_core::model::{ExpressConfigRow, RecoConfigRow, RecoLockRecord, RunNumber, RunStreamKey};
use feeder_core::store::DataSvcStore;
use feeder_core::FeederError;

use super::{db_run, with_conn, with_tx, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::datasvc::{dataset_locked, express_config, reco_config, reco_locked, run_stream_done};

pub struct PgDataSvcStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgDataSvcStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Estado de bloqueo publicado para un run.
    pub fn reco_lock(&self, run: RunNumber) -> Result<Option<bool>, FeederError> {
        let run = db_run(run)?;
        let locked = with_conn(&self.provider, |conn| {
                         reco_locked::table.filter(reco_locked::run.eq(run))
                                           .select(reco_locked::locked)
                                           .first::<bool>(conn)
                                           .optional()
                     })?;
        Ok(locked)
    }

    pub fn has_run_stream_done(&self, key: &RunStreamKey) -> Result<bool, FeederError> {
        let run = db_run(key.run)?;
        let n: i64 = with_conn(&self.provider, |conn| {
                         run_stream_done::table.filter(run_stream_done::run.eq(run))
                                               .filter(run_stream_done::stream.eq(&key.stream))
                                               .count()
                                               .get_result(conn)
                     })?;
        Ok(n > 0)
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_stream_done)]
struct NewRunStreamDone<'a> {
    run: i32,
    stream: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = express_config)]
struct NewExpressConfig<'a> {
    run: i32,
    stream: &'a str,
    cmssw: &'a str,
    scram_arch: &'a str,
    reco_cmssw: Option<&'a str>,
    reco_scram_arch: Option<&'a str>,
    alca_skim: Option<&'a str>,
    dqm_seq: Option<&'a str>,
    global_tag: &'a str,
    scenario: &'a str,
}

impl<'a> TryFrom<&'a ExpressConfigRow> for NewExpressConfig<'a> {
    type Error = PersistenceError;

    fn try_from(r: &'a ExpressConfigRow) -> Result<Self, Self::Error> {
        Ok(Self { run: db_run(r.run)?,
                  stream: &r.stream,
                  cmssw: &r.cmssw,
                  scram_arch: &r.scram_arch,
                  reco_cmssw: r.reco_cmssw.as_deref(),
                  reco_scram_arch: r.reco_scram_arch.as_deref(),
                  alca_skim: r.alca_skim.as_deref(),
                  dqm_seq: r.dqm_seq.as_deref(),
                  global_tag: &r.global_tag,
                  scenario: &r.scenario })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = reco_config)]
struct NewRecoConfig<'a> {
    run: i32,
    primds: &'a str,
    cmssw: &'a str,
    scram_arch: &'a str,
    alca_skim: Option<&'a str>,
    physics_skim: Option<&'a str>,
    dqm_seq: Option<&'a str>,
    global_tag: &'a str,
    scenario: &'a str,
}

impl<'a> TryFrom<&'a RecoConfigRow> for NewRecoConfig<'a> {
    type Error = PersistenceError;

    fn try_from(r: &'a RecoConfigRow) -> Result<Self, Self::Error> {
        Ok(Self { run: db_run(r.run)?,
                  primds: &r.primds,
                  cmssw: &r.cmssw,
                  scram_arch: &r.scram_arch,
                  alca_skim: r.alca_skim.as_deref(),
                  physics_skim: r.physics_skim.as_deref(),
                  dqm_seq: r.dqm_seq.as_deref(),
                  global_tag: &r.global_tag,
                  scenario: &r.scenario })
    }
}

const UPSERT_RECO_LOCK: &str = "\
    INSERT INTO datasvc.reco_locked AS rl (run, locked) VALUES ($1, $2)
    ON CONFLICT (run) DO UPDATE SET locked = rl.locked OR EXCLUDED.locked";

impl<P: ConnectionProvider> DataSvcStore for PgDataSvcStore<P> {
    fn insert_run_stream_done(&self, rows: &[RunStreamKey]) -> Result<(), FeederError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values = rows.iter()
                         .map(|k| -> Result<_, PersistenceError> { Ok(NewRunStreamDone { run: db_run(k.run)?, stream: &k.stream }) })
                         .collect::<Result<Vec<_>, _>>()?;
        let n = with_tx(&self.provider, |tx| {
                    diesel::insert_into(run_stream_done::table).values(&values)
                                                               .on_conflict_do_nothing()
                                                               .execute(tx)
                })?;
        debug!("datasvc:run_stream_done rows={} inserted={n}", rows.len());
        Ok(())
    }

    fn insert_express_configs(&self, rows: &[ExpressConfigRow]) -> Result<(), FeederError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values = rows.iter().map(NewExpressConfig::try_from).collect::<Result<Vec<_>, _>>()?;
        let n = with_tx(&self.provider, |tx| {
                    diesel::insert_into(express_config::table).values(&values)
                                                              .on_conflict_do_nothing()
                                                              .execute(tx)
                })?;
        debug!("datasvc:express_config rows={} inserted={n}", rows.len());
        Ok(())
    }

    fn insert_reco_configs(&self, rows: &[RecoConfigRow]) -> Result<(), FeederError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values = rows.iter().map(NewRecoConfig::try_from).collect::<Result<Vec<_>, _>>()?;
        let n = with_tx(&self.provider, |tx| {
                    diesel::insert_into(reco_config::table).values(&values)
                                                           .on_conflict_do_nothing()
                                                           .execute(tx)
                })?;
        debug!("datasvc:reco_config rows={} inserted={n}", rows.len());
        Ok(())
    }

    fn insert_reco_locks(&self, rows: &[RecoLockRecord]) -> Result<(), FeederError> {
        let runs = rows.iter().map(|r| db_run(r.run)).collect::<Result<Vec<_>, _>>()?;
        with_tx(&self.provider, |tx| {
            for (r, run) in rows.iter().zip(&runs) {
                diesel::sql_query(UPSERT_RECO_LOCK).bind::<Integer, _>(*run)
                                                   .bind::<Bool, _>(r.locked)
                                                   .execute(tx)?;
            }
            Ok(())
        })?;
        debug!("datasvc:reco_locked rows={}", rows.len());
        Ok(())
    }

    fn insert_dataset_locks(&self, paths: &[String]) -> Result<(), FeederError> {
        if paths.is_empty() {
            return Ok(());
        }
        let values: Vec<_> = paths.iter().map(|p| dataset_locked::path.eq(p.as_str())).collect();
        let n = with_tx(&self.provider, |tx| {
                    diesel::insert_into(dataset_locked::table).values(&values)
                                                              .on_conflict_do_nothing()
                                                              .execute(tx)
                })?;
        debug!("datasvc:dataset_locked rows={} inserted={n}", paths.len());
        Ok(())
    }
}
