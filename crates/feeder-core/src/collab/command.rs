//! Colaboradores respaldados por un programa externo.
//!
//! Cada operación es un subcomando (`configure-run`, `close-runs`, ...). El
//! contexto estructurado viaja como JSON por stdin y las credenciales por
//! variables de entorno, nunca en la línea de comandos.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::json;

use super::{ClosureTracker, ConditionUploader, DropboxCredentials, RunConfigurator, TriggerConfig};
use crate::config::PipelineConfig;
use crate::errors::FeederError;
use crate::model::RunNumber;
use crate::process::{command, run_command};

#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    program: PathBuf,
}

impl CommandCollaborator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn invoke(&self,
              name: &'static str,
              subcommand: &str,
              payload: Option<serde_json::Value>,
              envs: &[(&str, &str)])
              -> Result<(), FeederError> {
        debug!("collaborator:start name={name} subcommand={subcommand}");
        let mut cmd = command(&self.program, [subcommand]);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        let input = payload.map(|p| p.to_string());
        let out = run_command(cmd, input.as_deref())?;
        if !out.success() {
            return Err(FeederError::collaborator(name,
                                                 format!("{subcommand} exited with {:?}: {}", out.code, out.stderr.trim())));
        }
        if !out.stderr.trim().is_empty() {
            warn!("collaborator:stderr name={name} subcommand={subcommand} msg={}", out.stderr.trim());
        }
        Ok(())
    }
}

fn path_arg(p: Option<&Path>) -> Option<String> {
    p.map(|p| p.display().to_string())
}

impl RunConfigurator for CommandCollaborator {
    fn configure_run(&self, config: &PipelineConfig, run: RunNumber, trigger: Option<&TriggerConfig>) -> Result<(), FeederError> {
        let payload = json!({ "run": run, "trigger": trigger, "config": config });
        self.invoke("run-configurator", "configure-run", Some(payload), &[])
    }

    fn configure_run_stream(&self,
                            config: &PipelineConfig,
                            run: RunNumber,
                            stream: &str,
                            spec_dir: &Path,
                            upload_proxy: Option<&Path>)
                            -> Result<(), FeederError> {
        let payload = json!({
            "run": run,
            "stream": stream,
            "spec_dir": spec_dir.display().to_string(),
            "upload_proxy": path_arg(upload_proxy),
            "config": config,
        });
        self.invoke("run-configurator", "configure-run-stream", Some(payload), &[])
    }

    fn release_prompt_reco(&self, config: &PipelineConfig, spec_dir: &Path, upload_proxy: Option<&Path>) -> Result<(), FeederError> {
        let payload = json!({
            "spec_dir": spec_dir.display().to_string(),
            "upload_proxy": path_arg(upload_proxy),
            "config": config,
        });
        self.invoke("run-configurator", "release-prompt-reco", Some(payload), &[])
    }
}

impl ClosureTracker for CommandCollaborator {
    fn stop_runs(&self) -> Result<(), FeederError> {
        self.invoke("closure-tracker", "stop-runs", None, &[])
    }

    fn close_runs(&self) -> Result<(), FeederError> {
        self.invoke("closure-tracker", "close-runs", None, &[])
    }

    fn close_lumi_sections(&self) -> Result<(), FeederError> {
        self.invoke("closure-tracker", "close-lumi-sections", None, &[])
    }

    fn close_run_stream_filesets(&self) -> Result<(), FeederError> {
        self.invoke("closure-tracker", "close-run-stream-filesets", None, &[])
    }

    fn check_active_split_lumis(&self) -> Result<(), FeederError> {
        self.invoke("closure-tracker", "check-active-split-lumis", None, &[])
    }
}

impl ConditionUploader for CommandCollaborator {
    fn upload(&self, credentials: &DropboxCredentials, service_proxy: Option<&Path>) -> Result<(), FeederError> {
        let proxy = path_arg(service_proxy);
        let mut envs = Vec::new();
        if let Some(user) = credentials.user.as_deref() {
            envs.push(("DROPBOX_USER", user));
        }
        if let Some(pass) = credentials.password.as_deref() {
            envs.push(("DROPBOX_PASS", pass));
        }
        if let Some(proxy) = proxy.as_deref() {
            envs.push(("X509_USER_PROXY", proxy));
        }
        self.invoke("condition-uploader", "upload-conditions", None, &envs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Script que registra subcomando, stdin y entorno en `log`.
    fn fake_program(dir: &Path, exit: i32) -> PathBuf {
        let path = dir.join("collab.sh");
        let log = dir.join("log");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        writeln!(f, "echo \"$1\" >> {}", log.display()).unwrap();
        writeln!(f, "cat >> {}", log.display()).unwrap();
        writeln!(f, "echo \"user=$DROPBOX_USER\" >> {}", log.display()).unwrap();
        writeln!(f, "exit {exit}").unwrap();
        drop(f);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config() -> PipelineConfig {
        PipelineConfig::parse(r#"{ "global": { "acquisition_era": "Run2026A" } }"#).unwrap()
    }

    #[test]
    fn passes_subcommand_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let collab = CommandCollaborator::new(fake_program(dir.path(), 0));
        collab.configure_run(&config(), 345_000, None).unwrap();
        let log = fs::read_to_string(dir.path().join("log")).unwrap();
        assert!(log.starts_with("configure-run\n"));
        assert!(log.contains("\"run\":345000"));
        assert!(log.contains("Run2026A"));
    }

    #[test]
    fn credentials_travel_in_environment() {
        let dir = tempfile::tempdir().unwrap();
        let collab = CommandCollaborator::new(fake_program(dir.path(), 0));
        let creds = DropboxCredentials { user: Some("t0user".into()), password: Some("pw".into()) };
        collab.upload(&creds, None).unwrap();
        let log = fs::read_to_string(dir.path().join("log")).unwrap();
        assert!(log.contains("upload-conditions"));
        assert!(log.contains("user=t0user"));
    }

    #[test]
    fn non_zero_exit_is_collaborator_error() {
        let dir = tempfile::tempdir().unwrap();
        let collab = CommandCollaborator::new(fake_program(dir.path(), 2));
        let err = collab.close_runs().unwrap_err();
        assert!(matches!(err, FeederError::Collaborator { name: "closure-tracker", .. }));
    }
}
