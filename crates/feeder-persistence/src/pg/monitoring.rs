//! Store documental de monitoreo sobre Postgres (`request_monitoring`).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use log::debug;
use serde_json::Value;

use feeder_core::model::RunNumber;
use feeder_core::monitoring::{stable_doc_id, MonitoringDocument, MonitoringStatus};
use feeder_core::store::MonitoringStore;
use feeder_core::FeederError;

use super::{core_run, db_run, with_conn, ConnectionProvider};
use crate::schema::request_monitoring;

pub struct PgMonitoringStore<P: ConnectionProvider> {
    pub provider: P,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = request_monitoring)]
struct NewMonitoringRow<'a> {
    doc_id: &'a str,
    request_name: &'a str,
    run: i32,
    document: Value,
}

/// Documento tal como está guardado.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringRecord {
    pub doc_id: String,
    pub request_name: String,
    /// `None` si el documento se creó al cerrar un workflow desconocido.
    pub run: Option<RunNumber>,
    pub document: Value,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Un workflow nunca publicado (Express) se crea con la corrida real del
// workflow; si no existe en wmbs_workflow, run queda NULL.
const UPSERT_STATUS: &str = "\
    WITH wf AS (SELECT (SELECT w.run_id FROM wmbs_workflow w WHERE w.name = $2) AS run_id)
    INSERT INTO request_monitoring (doc_id, request_name, run, document, status)
    SELECT $1, $2, wf.run_id, jsonb_build_object('_id', $1, 'RequestName', $2, 'Run', wf.run_id), $3
    FROM wf
    ON CONFLICT (request_name) DO UPDATE SET status = EXCLUDED.status, updated_at = now()";

impl<P: ConnectionProvider> PgMonitoringStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn fetch(&self, request_name: &str) -> Result<Option<MonitoringRecord>, FeederError> {
        type Row = (String, String, Option<i32>, Value, Option<String>, DateTime<Utc>);
        let row: Option<Row> = with_conn(&self.provider, |conn| {
                                   request_monitoring::table.filter(request_monitoring::request_name.eq(request_name))
                                                            .select((request_monitoring::doc_id,
                                                                     request_monitoring::request_name,
                                                                     request_monitoring::run,
                                                                     request_monitoring::document,
                                                                     request_monitoring::status,
                                                                     request_monitoring::updated_at))
                                                            .first(conn)
                                                            .optional()
                               })?;
        let Some((doc_id, request_name, run, document, status, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(MonitoringRecord { doc_id,
                                   request_name,
                                   run: run.map(core_run).transpose()?,
                                   document,
                                   status,
                                   updated_at }))
    }
}

impl<P: ConnectionProvider> MonitoringStore for PgMonitoringStore<P> {
    fn insert(&self, document: &MonitoringDocument) -> Result<MonitoringStatus, FeederError> {
        let row = NewMonitoringRow { doc_id: &document.doc_id,
                                     request_name: &document.request_name,
                                     run: db_run(document.run)?,
                                     document: document.to_json() };
        let inserted = with_conn(&self.provider, |conn| {
                           diesel::insert_into(request_monitoring::table).values(&row)
                                                                         .on_conflict_do_nothing()
                                                                         .execute(conn)
                       })?;
        debug!("monitoring:insert request={} inserted={inserted}", document.request_name);
        Ok(if inserted == 1 { MonitoringStatus::Ok } else { MonitoringStatus::Exists })
    }

    fn update_status(&self, request_name: &str, status: &str) -> Result<MonitoringStatus, FeederError> {
        let doc_id = stable_doc_id(request_name);
        with_conn(&self.provider, |conn| {
            diesel::sql_query(UPSERT_STATUS).bind::<Text, _>(&doc_id)
                                            .bind::<Text, _>(request_name)
                                            .bind::<Text, _>(status)
                                            .execute(conn)
        })?;
        debug!("monitoring:update_status request={request_name} status={status}");
        Ok(MonitoringStatus::Ok)
    }
}
