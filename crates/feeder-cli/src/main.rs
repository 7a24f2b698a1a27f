//! Consultas de operación sobre el store primario.
//!
//! Uso:
//!   feeder-cli available --subscription <ID>
//!   feeder-cli pending-sync
//!   feeder-cli finished
//!   feeder-cli monitoring --workflow <NOMBRE>
//!
//! Códigos de salida: 0 ok, 2 uso, 4 no encontrado, 5 error de backend.

use std::process::exit;

use feeder_core::store::{FeederStore, FileAvailability};
use feeder_persistence::{PgFeederStore, PgMonitoringStore, PoolProvider};
use serde::Serialize;
use serde_json::json;

const USAGE: &str = "Uso: feeder-cli <available --subscription <ID> | pending-sync | finished | monitoring --workflow <NOMBRE>>";

/// Valor que sigue a `flag`, si existe.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).map(String::as_str)
}

fn provider() -> PoolProvider {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[feeder-cli] requiere DATABASE_URL");
        exit(4);
    }
    match feeder_persistence::build_pool_from_env() {
        Ok(pool) => PoolProvider { pool },
        Err(e) => {
            eprintln!("[feeder-cli] pool error: {e}");
            exit(5);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("[feeder-cli] json error: {e}");
            exit(5);
        }
    }
}

fn or_exit<T, E: std::fmt::Display>(cmd: &str, res: Result<T, E>) -> T {
    res.unwrap_or_else(|e| {
           eprintln!("[feeder-cli {cmd}] error: {e}");
           exit(5)
       })
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    let Some(cmd) = args.get(1).map(String::as_str) else {
        eprintln!("{USAGE}");
        exit(2);
    };

    match cmd {
        "available" => {
            let Some(subscription) = flag_value(&args, "--subscription").and_then(|v| v.parse::<i64>().ok()) else {
                eprintln!("Uso: feeder-cli available --subscription <ID>");
                exit(2);
            };
            let store = PgFeederStore::new(provider(), "");
            let files = or_exit(cmd, store.available_repack_merge_files(subscription));
            print_json(&files);
        }
        "pending-sync" => {
            let store = PgFeederStore::new(provider(), "");
            let summary = json!({
                "run_stream_done": or_exit(cmd, store.pending_run_stream_done()).len(),
                "express_config": or_exit(cmd, store.pending_express_configs()).len(),
                "reco_config": or_exit(cmd, store.pending_reco_configs()).len(),
                "reco_release": or_exit(cmd, store.pending_reco_releases()).len(),
                "dataset_lock": or_exit(cmd, store.pending_dataset_locks()).len(),
            });
            print_json(&summary);
        }
        "finished" => {
            let store = PgFeederStore::new(provider(), "");
            let finished = or_exit(cmd, store.finished_streamers());
            for s in &finished {
                println!("{}", s.basename());
            }
            eprintln!("total={}", finished.len());
        }
        "monitoring" => {
            let Some(workflow) = flag_value(&args, "--workflow") else {
                eprintln!("Uso: feeder-cli monitoring --workflow <NOMBRE>");
                exit(2);
            };
            let store = PgMonitoringStore::new(provider());
            match or_exit(cmd, store.fetch(workflow)) {
                Some(record) => print_json(&json!({
                    "doc_id": record.doc_id,
                    "request_name": record.request_name,
                    "run": record.run,
                    "status": record.status,
                    "updated_at": record.updated_at.to_rfc3339(),
                })),
                None => {
                    eprintln!("[feeder-cli monitoring] workflow no encontrado: {workflow}");
                    exit(4);
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_value_reads_following_argument() {
        let args: Vec<String> = ["feeder-cli", "available", "--subscription", "42"].iter().map(|s| s.to_string()).collect();
        assert_eq!(flag_value(&args, "--subscription"), Some("42"));
        assert_eq!(flag_value(&args, "--workflow"), None);
        let dangling: Vec<String> = ["feeder-cli", "monitoring", "--workflow"].iter().map(|s| s.to_string()).collect();
        assert_eq!(flag_value(&dangling, "--workflow"), None);
    }
}
