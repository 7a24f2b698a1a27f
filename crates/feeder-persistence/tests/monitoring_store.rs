mod test_support;

use feeder_core::model::{MonitoredWorkflow, WorkflowKind};
use feeder_core::monitoring::{MonitoringDocument, MonitoringStatus};
use feeder_core::store::MonitoringStore;
use feeder_persistence::pg::PgMonitoringStore;
use test_support::Fixture;

#[test]
fn insert_reports_existing_documents() {
    let Some(fx) = Fixture::new() else {
        eprintln!("skip insert_reports_existing_documents (no DATABASE_URL)");
        return;
    };
    let store = PgMonitoringStore::new(fx.provider());
    let wf = MonitoredWorkflow { id: 1,
                                 run: fx.run,
                                 name: fx.name("Repack_Run_StreamA") };
    let doc = MonitoringDocument::for_workflow(&wf);

    assert_eq!(store.insert(&doc).unwrap(), MonitoringStatus::Ok);
    assert_eq!(store.insert(&doc).unwrap(), MonitoringStatus::Exists);

    let record = store.fetch(&wf.name).unwrap().expect("stored document");
    assert_eq!(record.doc_id, doc.doc_id);
    assert_eq!(record.run, Some(fx.run));
    assert_eq!(record.document["RequestName"], wf.name.as_str());
    assert_eq!(record.status, None);
}

#[test]
fn update_status_upserts_closed_state() {
    let Some(fx) = Fixture::new() else {
        eprintln!("skip update_status_upserts_closed_state (no DATABASE_URL)");
        return;
    };
    let store = PgMonitoringStore::new(fx.provider());
    let name = fx.name("Express_Run_StreamExpress");

    assert_eq!(store.update_status(&name, "Closed").unwrap(), MonitoringStatus::Ok);
    let record = store.fetch(&name).unwrap().expect("upserted document");
    assert_eq!(record.status.as_deref(), Some("Closed"));
    assert_eq!(record.run, None);
    assert!(record.document["Run"].is_null());
    assert!(store.fetch(&fx.name("never_published")).unwrap().is_none());
}

#[test]
fn closing_unpublished_workflow_records_its_real_run() {
    let Some(fx) = Fixture::new() else {
        eprintln!("skip closing_unpublished_workflow_records_its_real_run (no DATABASE_URL)");
        return;
    };
    fx.add_run(fx.run, None, true);
    let fileset = fx.register_run_stream(fx.run, "Express");
    fx.add_workflow("Express_Run_StreamExpress", fx.run, WorkflowKind::Express, fileset);
    let store = PgMonitoringStore::new(fx.provider());
    let name = fx.name("Express_Run_StreamExpress");

    assert_eq!(store.update_status(&name, "Closed").unwrap(), MonitoringStatus::Ok);
    let record = store.fetch(&name).unwrap().expect("upserted document");
    assert_eq!(record.run, Some(fx.run));
    assert_eq!(record.document["Run"], fx.run);
    assert_eq!(record.document["RequestName"], name.as_str());
    assert_eq!(record.doc_id, record.document["_id"].as_str().unwrap_or_default());
}
