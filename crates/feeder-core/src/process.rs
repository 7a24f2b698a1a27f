//! Ejecución de procesos externos con stdin/stdout/stderr en tuberías.

use std::ffi::OsStr;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use log::debug;

use crate::errors::FeederError;

/// Salida capturada de un proceso terminado.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Lanza `command`, escribe `input` en su stdin y espera la salida.
///
/// Un código de salida distinto de cero no es un error aquí: lo decide quien
/// llama. Sólo fallan el arranque y la E/S con el proceso.
pub fn run_command(mut command: Command, input: Option<&str>) -> Result<ProcessOutput, FeederError> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("process:spawn program={program}");
    let mut child = command.stdin(Stdio::piped())
                           .stdout(Stdio::piped())
                           .stderr(Stdio::piped())
                           .spawn()
                           .map_err(|e| FeederError::Process(format!("spawn {program}: {e}")))?;

    let mut stdin = child.stdin
                         .take()
                         .ok_or_else(|| FeederError::Process(format!("failed to open stdin of {program}")))?;
    // stdin se escribe en otro hilo mientras se drenan stdout y stderr.
    let payload = input.map(|i| i.as_bytes().to_vec()).unwrap_or_default();
    let writer = thread::spawn(move || {
        let res = stdin.write_all(&payload);
        drop(stdin);
        res
    });

    let output = child.wait_with_output()
                      .map_err(|e| FeederError::Process(format!("wait {program}: {e}")))?;
    match writer.join() {
        Ok(Ok(())) => {}
        // El proceso puede terminar sin leer toda la entrada.
        Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => debug!("process:stdin closed early program={program}"),
        Ok(Err(e)) => return Err(FeederError::Process(format!("write stdin of {program}: {e}"))),
        Err(_) => return Err(FeederError::Process(format!("stdin writer of {program} panicked"))),
    }
    let result = ProcessOutput { code: output.status.code(),
                                 stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                                 stderr: String::from_utf8_lossy(&output.stderr).into_owned() };
    debug!("process:exit program={program} code={:?}", result.code);
    Ok(result)
}

/// Atajo para `program args...`.
pub fn command<I, S>(program: impl AsRef<OsStr>, args: I) -> Command
    where I: IntoIterator<Item = S>,
          S: AsRef<OsStr>
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}
