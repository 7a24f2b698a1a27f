use feeder_core::model::{ActiveSplitLock, RunStreamKey, WorkflowKind};
use feeder_core::store::{FeederStore, FileAvailability, InMemoryFeederStore};

const RUN: u32 = 345_000;

/// Run/stream `stream` -> repack -> fileset de salida -> suscripción merge.
/// Los archivos de salida del repack se modelan admitiendo streamers en el
/// fileset de salida.
fn merge_subscription(store: &InMemoryFeederStore, stream: &str) -> (i64, i64) {
    let input = store.register_run_stream(RunStreamKey::new(RUN, stream));
    let (repack, _) = store.add_workflow(&format!("Repack_Run{RUN}_Stream{stream}"), RUN, WorkflowKind::Repack, input);
    let output = {
        let mut t = store.tables();
        let id = t.filesets.keys().max().copied().unwrap_or(0) + 1;
        t.filesets.insert(id, true);
        t.catalog.workflow_outputs.insert((repack, id));
        id
    };
    let (_, merge) = store.add_workflow(&format!("RepackMerge_Run{RUN}_Stream{stream}"), RUN, WorkflowKind::Repack, output);
    (output, merge)
}

fn add_repacked_file(store: &InMemoryFeederStore, output: i64, subscription: i64, lfn: &str, lumis: &[u32]) -> i64 {
    let mut t = store.tables();
    let id = t.catalog.files.keys().max().copied().unwrap_or(0) + 1;
    t.catalog.files.insert(id,
                           feeder_core::availability::FileDetails { lfn: lfn.into(),
                                                                    filesize: 2048,
                                                                    events: 500 });
    for lumi in lumis {
        t.catalog.lumis.insert(feeder_core::model::FileLumi { file: id, run: RUN, lumi: *lumi });
    }
    t.catalog.locations.insert((id, "T0_CH_CERN_Disk".into()));
    t.catalog.fileset_files.insert((output, id));
    t.catalog.sub_files_available.insert((subscription, id));
    id
}

#[test]
fn split_lock_excludes_file_for_owning_stream_only() {
    let store = InMemoryFeederStore::default();
    let (out_a, merge_a) = merge_subscription(&store, "A");
    let (out_b, merge_b) = merge_subscription(&store, "B");
    let file_a = add_repacked_file(&store, out_a, merge_a, "/store/repack/a.root", &[10, 11]);
    let file_b = add_repacked_file(&store, out_b, merge_b, "/store/repack/b.root", &[10, 11]);

    store.tables().catalog.split_locks.insert(ActiveSplitLock { run: RUN, lumi: 11, stream: "A".into() });

    assert!(store.available_repack_merge_files(merge_a).unwrap().is_empty());
    let rows = store.available_repack_merge_files(merge_b).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, file_b);
    assert_eq!((rows[0].first_lumi, rows[0].last_lumi), (10, 11));

    // Al liberarse el lock el archivo vuelve a estar disponible.
    store.tables().catalog.split_locks.clear();
    let rows = store.available_repack_merge_files(merge_a).unwrap();
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![file_a]);
}

#[test]
fn lumi_ranges_are_reported_per_file() {
    let store = InMemoryFeederStore::default();
    let (out, merge) = merge_subscription(&store, "A");
    add_repacked_file(&store, out, merge, "/store/repack/multi.root", &[7, 8, 9]);
    add_repacked_file(&store, out, merge, "/store/repack/single.root", &[5]);

    let rows = store.available_repack_merge_files(merge).unwrap();
    let ranges: Vec<_> = rows.iter().map(|r| (r.lfn.as_str(), r.first_lumi, r.last_lumi)).collect();
    assert_eq!(ranges, vec![("/store/repack/multi.root", 7, 9), ("/store/repack/single.root", 5, 5)]);
}

#[test]
fn fed_streamers_become_available_to_repack_subscription() {
    let store = InMemoryFeederStore::default();
    let fileset = store.register_run_stream(RunStreamKey::new(RUN, "A"));
    let (_, sub) = store.add_workflow("Repack_Run345000_StreamA", RUN, WorkflowKind::Repack, fileset);
    store.add_streamer(RUN, "A", 1, "/store/t0streamer/run345000_ls0001_streamA.dat");
    store.add_streamer(RUN, "A", 2, "/store/t0streamer/run345000_ls0002_streamA.dat");
    assert_eq!(store.feed_streamers().unwrap(), 2);
    // El segundo feed no vuelve a admitir lo ya admitido.
    assert_eq!(store.feed_streamers().unwrap(), 0);

    let t = store.snapshot();
    let available: Vec<_> = t.catalog.sub_files_available.iter().filter(|(s, _)| *s == sub).collect();
    assert_eq!(available.len(), 2);
}

#[test]
fn closed_fileset_does_not_receive_new_files() {
    let store = InMemoryFeederStore::default();
    let fileset = store.register_run_stream(RunStreamKey::new(RUN, "A"));
    store.close_fileset(fileset);
    store.add_streamer(RUN, "A", 1, "/store/t0streamer/late.dat");
    assert_eq!(store.feed_streamers().unwrap(), 0);
    assert!(store.snapshot().catalog.files.is_empty());
}
