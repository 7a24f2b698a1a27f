//! Esquema Diesel (escrito a mano) de las tablas que se consultan con el
//! DSL. Las consultas de varias tablas con agregación o `NOT EXISTS` van
//! como SQL con binds en `pg::*`.

diesel::table! {
    run (run_id) {
        run_id -> Integer,
        hltkey -> Nullable<Text>,
        configured -> Bool,
        express_released -> Bool,
        insert_time -> Timestamptz,
    }
}

diesel::table! {
    run_summary (run_id) {
        run_id -> Integer,
        stop_time -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    streamer (streamer_id) {
        streamer_id -> BigInt,
        run_id -> Integer,
        stream_id -> Integer,
        lumi_id -> Integer,
        lfn -> Text,
        filesize -> BigInt,
        events -> BigInt,
        used -> Bool,
        deleted -> Bool,
        insert_time -> Timestamptz,
    }
}

diesel::table! {
    dataset_locked (id) {
        id -> BigInt,
        path -> Text,
        in_datasvc -> Bool,
    }
}

diesel::table! {
    popcon_express_ready (run) {
        run -> Integer,
        insert_time -> Timestamptz,
    }
}

diesel::table! {
    request_monitoring (doc_id) {
        doc_id -> Text,
        request_name -> Text,
        run -> Nullable<Integer>,
        document -> Jsonb,
        status -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(run_summary -> run (run_id));

diesel::allow_tables_to_appear_in_same_query!(run, run_summary, streamer, dataset_locked, popcon_express_ready, request_monitoring,);

/// Tablas del data service (schema `datasvc`).
pub mod datasvc {
    diesel::table! {
        datasvc.run_stream_done (run, stream) {
            run -> Integer,
            stream -> Text,
        }
    }

    diesel::table! {
        datasvc.express_config (run, stream) {
            run -> Integer,
            stream -> Text,
            cmssw -> Text,
            scram_arch -> Text,
            reco_cmssw -> Nullable<Text>,
            reco_scram_arch -> Nullable<Text>,
            alca_skim -> Nullable<Text>,
            dqm_seq -> Nullable<Text>,
            global_tag -> Text,
            scenario -> Text,
        }
    }

    diesel::table! {
        datasvc.reco_config (run, primds) {
            run -> Integer,
            primds -> Text,
            cmssw -> Text,
            scram_arch -> Text,
            alca_skim -> Nullable<Text>,
            physics_skim -> Nullable<Text>,
            dqm_seq -> Nullable<Text>,
            global_tag -> Text,
            scenario -> Text,
        }
    }

    diesel::table! {
        datasvc.reco_locked (run) {
            run -> Integer,
            locked -> Bool,
        }
    }

    diesel::table! {
        datasvc.dataset_locked (path) {
            path -> Text,
        }
    }
}
