//! Readiness Express: corridas confirmadas en `popcon_express_ready`.

use std::collections::BTreeSet;

use diesel::prelude::*;

use feeder_core::collab::ReadinessSource;
use feeder_core::model::RunNumber;
use feeder_core::FeederError;

use super::{core_run, db_runs, with_conn, ConnectionProvider};
use crate::schema::popcon_express_ready;

pub struct PgReadinessSource<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgReadinessSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> ReadinessSource for PgReadinessSource<P> {
    fn filter_ready(&self, candidates: &[RunNumber]) -> Result<Vec<RunNumber>, FeederError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let ids = db_runs(candidates)?;
        let ready: Vec<i32> = with_conn(&self.provider, |conn| {
                                  popcon_express_ready::table.filter(popcon_express_ready::run.eq_any(ids.clone()))
                                                             .select(popcon_express_ready::run)
                                                             .load(conn)
                              })?;
        let ready = ready.into_iter().map(core_run).collect::<Result<BTreeSet<RunNumber>, _>>()?;
        Ok(candidates.iter().copied().filter(|r| ready.contains(r)).collect())
    }
}
