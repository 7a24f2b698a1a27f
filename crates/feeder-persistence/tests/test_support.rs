#![allow(dead_code)]

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use feeder_core::model::{RunNumber, WorkflowKind};
use feeder_persistence::config::DbConfig;
use feeder_persistence::migrations::Schema;
use feeder_persistence::pg::{build_pool, build_pool_for, PgFeederStore, PgPool, PoolProvider};
use once_cell::sync::Lazy;
use uuid::Uuid;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

/// El data service comparte la base de test (schema `datasvc`).
pub static DATASVC_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    build_pool_for(&cfg.url, 1, 2, Schema::DataSvc).ok()
});

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    TEST_POOL.as_ref().map(f)
}

#[derive(QueryableByName)]
struct Id {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(QueryableByName)]
struct SmallId {
    #[diesel(sql_type = Integer)]
    id: i32,
}

/// Escenario aislado: corrida con número aleatorio y nombres derivados de
/// ella, para poder compartir la base entre tests concurrentes.
pub struct Fixture {
    pub pool: PgPool,
    pub run: RunNumber,
}

impl Fixture {
    pub fn new() -> Option<Self> {
        let pool = TEST_POOL.as_ref()?.clone();
        let run = (Uuid::new_v4().as_u128() % 2_000_000_000) as u32 + 1;
        Some(Self { pool, run })
    }

    pub fn provider(&self) -> PoolProvider {
        PoolProvider { pool: self.pool.clone() }
    }

    pub fn store(&self) -> PgFeederStore<PoolProvider> {
        PgFeederStore::new(self.provider(), "T0_CH_CERN_Disk")
    }

    pub fn conn(&self) -> diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>> {
        self.pool.get().expect("conn")
    }

    /// Nombre único para este escenario.
    pub fn name(&self, base: &str) -> String {
        format!("{base}_{}", self.run)
    }

    pub fn add_run(&self, run: RunNumber, hltkey: Option<&str>, configured: bool) {
        diesel::sql_query("INSERT INTO run (run_id, hltkey, configured) VALUES ($1, $2, $3)")
            .bind::<Integer, _>(run as i32)
            .bind::<diesel::sql_types::Nullable<Text>, _>(hltkey)
            .bind::<diesel::sql_types::Bool, _>(configured)
            .execute(&mut self.conn())
            .expect("insert run");
    }

    pub fn add_run_summary(&self, run: RunNumber) {
        diesel::sql_query("INSERT INTO run_summary (run_id) VALUES ($1)").bind::<Integer, _>(run as i32)
                                                                         .execute(&mut self.conn())
                                                                         .expect("insert run_summary");
    }

    pub fn stream_id(&self, stream: &str) -> i32 {
        let mut conn = self.conn();
        diesel::sql_query("INSERT INTO stream (name) VALUES ($1) ON CONFLICT (name) DO NOTHING").bind::<Text, _>(stream)
                                                                                            .execute(&mut conn)
                                                                                            .expect("insert stream");
        diesel::sql_query("SELECT id FROM stream WHERE name = $1").bind::<Text, _>(stream)
                                                                  .get_result::<SmallId>(&mut conn)
                                                                  .expect("stream id")
                                                                  .id
    }

    pub fn primds_id(&self, name: &str) -> i32 {
        let mut conn = self.conn();
        diesel::sql_query("INSERT INTO primary_dataset (name) VALUES ($1) ON CONFLICT (name) DO NOTHING").bind::<Text, _>(name)
                                                                                                     .execute(&mut conn)
                                                                                                     .expect("insert primds");
        diesel::sql_query("SELECT id FROM primary_dataset WHERE name = $1").bind::<Text, _>(name)
                                                                           .get_result::<SmallId>(&mut conn)
                                                                           .expect("primds id")
                                                                           .id
    }

    pub fn add_streamer(&self, run: RunNumber, stream: &str, lumi: u32) -> i64 {
        let stream_id = self.stream_id(stream);
        let lfn = format!("/store/t0streamer/run{run}_ls{lumi:04}_stream{stream}.dat");
        diesel::sql_query("INSERT INTO streamer (run_id, stream_id, lumi_id, lfn, filesize, events) \
                           VALUES ($1, $2, $3, $4, 1024, 100) RETURNING streamer_id AS id")
            .bind::<Integer, _>(run as i32)
            .bind::<Integer, _>(stream_id)
            .bind::<Integer, _>(lumi as i32)
            .bind::<Text, _>(lfn)
            .get_result::<Id>(&mut self.conn())
            .expect("insert streamer")
            .id
    }

    pub fn add_fileset(&self, name: &str) -> i64 {
        diesel::sql_query("INSERT INTO wmbs_fileset (name) VALUES ($1) RETURNING id").bind::<Text, _>(self.name(name))
                                                                                     .get_result::<Id>(&mut self.conn())
                                                                                     .expect("insert fileset")
                                                                                     .id
    }

    /// Fileset abierto asociado al run/stream.
    pub fn register_run_stream(&self, run: RunNumber, stream: &str) -> i64 {
        let fileset = self.add_fileset(&format!("Run{run}_Stream{stream}"));
        diesel::sql_query("INSERT INTO run_stream_fileset_assoc (run_id, stream_id, fileset) VALUES ($1, $2, $3)")
            .bind::<Integer, _>(run as i32)
            .bind::<Integer, _>(self.stream_id(stream))
            .bind::<BigInt, _>(fileset)
            .execute(&mut self.conn())
            .expect("insert rsfa");
        fileset
    }

    /// Workflow suscrito a `fileset`; devuelve (workflow, suscripción).
    pub fn add_workflow(&self, name: &str, run: RunNumber, kind: WorkflowKind, fileset: i64) -> (i64, i64) {
        let mut conn = self.conn();
        let workflow = diesel::sql_query("INSERT INTO wmbs_workflow (name, run_id, kind) VALUES ($1, $2, $3) RETURNING id")
            .bind::<Text, _>(self.name(name))
            .bind::<Integer, _>(run as i32)
            .bind::<Text, _>(kind.as_str())
            .get_result::<Id>(&mut conn)
            .expect("insert workflow")
            .id;
        let sub = diesel::sql_query("INSERT INTO wmbs_subscription (fileset, workflow) VALUES ($1, $2) RETURNING id")
            .bind::<BigInt, _>(fileset)
            .bind::<BigInt, _>(workflow)
            .get_result::<Id>(&mut conn)
            .expect("insert subscription")
            .id;
        (workflow, sub)
    }

    pub fn add_workflow_output(&self, workflow: i64, fileset: i64) {
        diesel::sql_query("INSERT INTO wmbs_workflow_output (workflow_id, output_identifier, output_fileset) \
                           VALUES ($1, 'Merged', $2)")
            .bind::<BigInt, _>(workflow)
            .bind::<BigInt, _>(fileset)
            .execute(&mut self.conn())
            .expect("insert workflow output");
    }

    pub fn close_fileset(&self, fileset: i64) {
        diesel::sql_query("UPDATE wmbs_fileset SET open = FALSE WHERE id = $1").bind::<BigInt, _>(fileset)
                                                                               .execute(&mut self.conn())
                                                                               .expect("close fileset");
    }

    pub fn finish_subscription(&self, sub: i64) {
        diesel::sql_query("UPDATE wmbs_subscription SET finished = TRUE WHERE id = $1").bind::<BigInt, _>(sub)
                                                                                       .execute(&mut self.conn())
                                                                                       .expect("finish subscription");
    }

    pub fn count(&self, sql: &str) -> i64 {
        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = BigInt)]
            n: i64,
        }
        diesel::sql_query(sql).get_result::<Count>(&mut self.conn()).expect("count").n
    }
}
