//! Configuración de trigger leída de `hlt_config`.

use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use log::debug;

use feeder_core::collab::{TriggerConfig, TriggerConfigSource, TriggerPath};
use feeder_core::FeederError;

use super::{with_conn, ConnectionProvider};

pub struct PgTriggerConfigSource<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgTriggerConfigSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[derive(QueryableByName, Debug)]
struct HltRow {
    #[diesel(sql_type = Nullable<Text>)]
    process: Option<String>,
    #[diesel(sql_type = Text)]
    stream: String,
    #[diesel(sql_type = Text)]
    primds: String,
    #[diesel(sql_type = Text)]
    path: String,
}

const HLT_CONFIG: &str = "\
    SELECT process, stream, primds, path FROM hlt_config
    WHERE hltkey = $1
    ORDER BY stream, primds, path";

/// Arma la configuración a partir de las filas de una clave. El proceso es
/// el primero no nulo.
fn assemble(rows: Vec<HltRow>) -> TriggerConfig {
    let process = rows.iter().find_map(|r| r.process.clone());
    let mapping = rows.into_iter()
                      .map(|r| TriggerPath { stream: r.stream,
                                             primary_dataset: r.primds,
                                             path: r.path })
                      .collect();
    TriggerConfig { process, mapping }
}

impl<P: ConnectionProvider> TriggerConfigSource for PgTriggerConfigSource<P> {
    fn get_config(&self, trigger_key: &str) -> Result<TriggerConfig, FeederError> {
        let rows: Vec<HltRow> = with_conn(&self.provider, |conn| {
                                    diesel::sql_query(HLT_CONFIG).bind::<Text, _>(trigger_key).load(conn)
                                })?;
        debug!("trigger:get_config key={trigger_key} paths={}", rows.len());
        assemble(rows).validate(trigger_key)
    }
}
