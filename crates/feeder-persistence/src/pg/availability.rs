//! Consulta de disponibilidad repack-merge sobre Postgres.
//!
//! Un archivo se descarta completo si alguna de sus lumis tiene un split
//! activo para el stream dueño de la suscripción. El stream dueño se
//! resuelve por corrida a través del fileset de entrada del workflow que
//! produce el fileset de la suscripción.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use log::debug;

use feeder_core::model::{AvailableFile, SubscriptionId};
use feeder_core::store::FileAvailability;
use feeder_core::FeederError;

use super::{core_lumi, with_conn, ConnectionProvider, PgFeederStore};
use crate::error::PersistenceError;

const AVAILABLE_REPACK_MERGE_FILES: &str = "\
    SELECT d.id, d.filesize, d.events, d.lfn, l.se_name AS location,
           MIN(rl.lumi) AS first_lumi, MAX(rl.lumi) AS last_lumi
    FROM wmbs_sub_files_available sfa
    JOIN wmbs_subscription sub ON sub.id = sfa.subscription
    JOIN wmbs_file_details d ON d.id = sfa.fileid
    JOIN wmbs_file_location fl ON fl.fileid = d.id
    JOIN wmbs_location l ON l.id = fl.location
    JOIN wmbs_file_runlumi_map rl ON rl.fileid = d.id
    JOIN wmbs_workflow_output wo ON wo.output_fileset = sub.fileset
    JOIN wmbs_subscription parent ON parent.workflow = wo.workflow_id
    JOIN run_stream_fileset_assoc a ON a.fileset = parent.fileset AND a.run_id = rl.run
    WHERE sfa.subscription = $1
      AND NOT EXISTS (SELECT 1
                      FROM wmbs_file_runlumi_map lm
                      JOIN lumi_section_split_active lssa ON lssa.run_id = lm.run AND lssa.lumi_id = lm.lumi
                      JOIN run_stream_fileset_assoc a2 ON a2.run_id = lm.run AND a2.stream_id = lssa.stream_id
                      WHERE lm.fileid = d.id AND a2.fileset = parent.fileset)
    GROUP BY d.id, d.filesize, d.events, d.lfn, l.se_name
    ORDER BY d.id, l.se_name";

#[derive(QueryableByName, Debug)]
struct AvailableRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    filesize: i64,
    #[diesel(sql_type = BigInt)]
    events: i64,
    #[diesel(sql_type = Text)]
    lfn: String,
    #[diesel(sql_type = Text)]
    location: String,
    #[diesel(sql_type = Integer)]
    first_lumi: i32,
    #[diesel(sql_type = Integer)]
    last_lumi: i32,
}

impl TryFrom<AvailableRow> for AvailableFile {
    type Error = PersistenceError;

    fn try_from(r: AvailableRow) -> Result<Self, Self::Error> {
        Ok(AvailableFile { id: r.id,
                           filesize: r.filesize,
                           events: r.events,
                           lfn: r.lfn,
                           location: r.location,
                           first_lumi: core_lumi(r.first_lumi)?,
                           last_lumi: core_lumi(r.last_lumi)? })
    }
}

impl<P: ConnectionProvider> FileAvailability for PgFeederStore<P> {
    fn available_repack_merge_files(&self, subscription: SubscriptionId) -> Result<Vec<AvailableFile>, FeederError> {
        let rows: Vec<AvailableRow> = with_conn(&self.provider, |conn| {
                                          diesel::sql_query(AVAILABLE_REPACK_MERGE_FILES).bind::<BigInt, _>(subscription)
                                                                                         .load(conn)
                                      })?;
        debug!("available_repack_merge_files:done subscription={subscription} rows={}", rows.len());
        let files = rows.into_iter().map(AvailableFile::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }
}
