//! [`RenderEngine`] backed by an external program.
//!
//! The program is invoked once per call:
//!
//! ```text
//! <command...> measure --owner <id> --requested <id> --format <ext> --profile <name>
//! <command...> render  --owner <id> --requested <id> --format <ext> --profile <name>
//!                      --quality <n> [--selected <ids>] [--flagged <ids>] [--analysis-token <t>]
//! ```
//!
//! `measure` prints `WIDTHxHEIGHT` (or nothing when the size is unknown); `render` writes the
//! artifact to stdout. Exit code 2 means there is nothing to render, 3 that the profile is not
//! supported; any other failure is an engine error carrying the tail of stderr.

use pathex_core::{Decoration, Dimensions, RenderEngine, RenderError, RenderTarget};
use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_NOT_FOUND: i32 = 2;
const EXIT_UNSUPPORTED_PROFILE: i32 = 3;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MAX_STDOUT_BYTES: usize = 512 * 1024 * 1024;
const MAX_STDERR_BYTES: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct CommandRenderEngine {
    program: OsString,
    base_args: Vec<OsString>,
    timeout: Duration,
}

impl CommandRenderEngine {
    /// `command` is the program followed by any fixed leading arguments.
    pub fn new<I, S>(command: I, timeout: Duration) -> io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut parts = command.into_iter().map(Into::into);
        let program = parts
            .next()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "render command is empty")
            })?;
        Ok(Self {
            program,
            base_args: parts.collect(),
            timeout,
        })
    }

    fn run(&self, target: &RenderTarget, args: Vec<OsString>) -> Result<Vec<u8>, RenderError> {
        let outcome = run_with_timeout(&self.program, &self.base_args, &args, self.timeout)
            .map_err(|err| {
                RenderError::Engine(format!(
                    "failed to run {}: {err}",
                    self.program.to_string_lossy()
                ))
            })?;

        if outcome.timed_out {
            return Err(RenderError::Engine(format!(
                "render engine timed out after {:?}",
                self.timeout
            )));
        }
        if outcome.stdout_truncated {
            return Err(RenderError::Engine(format!(
                "render engine output exceeds {MAX_STDOUT_BYTES} bytes"
            )));
        }
        if outcome.status.success() {
            return Ok(outcome.stdout);
        }

        let stderr = String::from_utf8_lossy(&outcome.stderr).trim().to_owned();
        Err(match outcome.status.code() {
            Some(EXIT_NOT_FOUND) => RenderError::NotFound(target.owner.clone()),
            Some(EXIT_UNSUPPORTED_PROFILE) => {
                RenderError::UnsupportedProfile(target.profile.to_string())
            }
            _ if stderr.is_empty() => {
                RenderError::Engine(format!("render engine exited with {}", outcome.status))
            }
            _ => RenderError::Engine(format!(
                "render engine exited with {}: {stderr}",
                outcome.status
            )),
        })
    }
}

impl RenderEngine for CommandRenderEngine {
    fn measure(&self, target: &RenderTarget) -> Result<Option<Dimensions>, RenderError> {
        let stdout = self.run(target, target_args("measure", target))?;
        let text = String::from_utf8_lossy(&stdout);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        parse_dimensions(text)
            .map(Some)
            .ok_or_else(|| RenderError::Engine(format!("unparseable layout size {text:?}")))
    }

    fn render(
        &self,
        target: &RenderTarget,
        decoration: &Decoration,
    ) -> Result<Vec<u8>, RenderError> {
        let mut args = target_args("render", target);
        args.push("--quality".into());
        args.push(target.quality.get().to_string().into());
        if !decoration.selected().is_empty() {
            args.push("--selected".into());
            args.push(join(decoration.selected()).into());
        }
        if !decoration.flagged().is_empty() {
            args.push("--flagged".into());
            args.push(join(decoration.flagged()).into());
        }
        if let Some(token) = decoration.analysis_token() {
            args.push("--analysis-token".into());
            args.push(token.into());
        }

        let bytes = self.run(target, args)?;
        if bytes.is_empty() {
            return Err(RenderError::Engine(
                "render engine produced no output".to_owned(),
            ));
        }
        Ok(bytes)
    }
}

fn target_args(verb: &str, target: &RenderTarget) -> Vec<OsString> {
    vec![
        verb.into(),
        "--owner".into(),
        target.owner.to_string().into(),
        "--requested".into(),
        target.requested.to_string().into(),
        "--format".into(),
        target.format.extension().into(),
        "--profile".into(),
        target.profile.as_str().into(),
    ]
}

fn join(ids: &std::collections::BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn parse_dimensions(text: &str) -> Option<Dimensions> {
    let (width, height) = text.split_once(|c: char| c == 'x' || c == 'X')?;
    Some(Dimensions {
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}

struct Outcome {
    status: ExitStatus,
    stdout: Vec<u8>,
    stdout_truncated: bool,
    stderr: Vec<u8>,
    timed_out: bool,
}

fn run_with_timeout(
    program: &OsString,
    base_args: &[OsString],
    args: &[OsString],
    timeout: Duration,
) -> io::Result<Outcome> {
    let mut child = Command::new(program)
        .args(base_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };
    let stdout_handle = thread::spawn(move || read_bounded(stdout, MAX_STDOUT_BYTES));
    let stderr_handle = thread::spawn(move || read_tail(stderr, MAX_STDERR_BYTES));

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            timed_out = true;
            break kill(&mut child)?;
        }
        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed())));
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle, "stdout")??;
    let stderr = join_reader(stderr_handle, "stderr")??;
    Ok(Outcome {
        status,
        stdout,
        stdout_truncated,
        stderr,
        timed_out,
    })
}

fn kill(child: &mut Child) -> io::Result<ExitStatus> {
    // The child may exit between `try_wait` and `kill`.
    if let Err(err) = child.kill() {
        if err.kind() != io::ErrorKind::InvalidInput {
            return Err(err);
        }
    }
    child.wait()
}

fn join_reader<T>(
    handle: thread::JoinHandle<io::Result<T>>,
    stream: &'static str,
) -> io::Result<io::Result<T>> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))
}

/// Reads everything, keeping at most `max_bytes`. Draining the rest keeps the child from
/// blocking on a full pipe.
fn read_bounded(mut reader: impl Read, max_bytes: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut out = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let to_store = max_bytes.saturating_sub(out.len()).min(n);
        out.extend_from_slice(&buf[..to_store]);
        truncated |= to_store < n;
    }
    Ok((out, truncated))
}

/// Keeps the last `max_bytes`; error messages tend to be at the end.
fn read_tail(mut reader: impl Read, max_bytes: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        if out.len() > max_bytes {
            out.drain(..out.len() - max_bytes);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathex_core::{EntityId, Format, Profile, ProfileSet, QualityRange};

    fn target() -> RenderTarget {
        let profile: Profile = ProfileSet::default().resolve(None).unwrap();
        RenderTarget {
            owner: EntityId::parse("R-HSA-1").unwrap(),
            requested: EntityId::parse("R-HSA-2").unwrap(),
            format: Format::Png,
            profile,
            quality: QualityRange::default().default_quality(),
        }
    }

    fn sh(script: &str) -> CommandRenderEngine {
        CommandRenderEngine::new(["sh", "-c", script, "engine"], Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn parses_dimensions() {
        assert_eq!(
            parse_dimensions("800x600"),
            Some(Dimensions {
                width: 800,
                height: 600
            })
        );
        assert_eq!(parse_dimensions("800 X 600").map(|d| d.height), Some(600));
        assert_eq!(parse_dimensions("800"), None);
        assert_eq!(parse_dimensions("ax1"), None);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandRenderEngine::new(Vec::<String>::new(), Duration::from_secs(1)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn render_passes_target_and_decoration() {
        let engine = sh(r#"printf '%s ' "$@""#);
        let decoration = Decoration::new()
            .with_selected(["b", "a"])
            .with_analysis_token("tok");
        let out = engine.render(&target(), &decoration).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "render --owner R-HSA-1 --requested R-HSA-2 --format png --profile modern \
             --quality 5 --selected a,b --analysis-token tok "
        );
    }

    #[cfg(unix)]
    #[test]
    fn measure_reads_size_or_nothing() {
        assert_eq!(
            sh("echo 120x40").measure(&target()).unwrap(),
            Some(Dimensions {
                width: 120,
                height: 40
            })
        );
        assert_eq!(sh("true").measure(&target()).unwrap(), None);
        assert!(matches!(
            sh("echo huge").measure(&target()),
            Err(RenderError::Engine(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn exit_codes_map_to_render_errors() {
        let decoration = Decoration::new();
        assert_eq!(
            sh("exit 2").render(&target(), &decoration),
            Err(RenderError::NotFound(EntityId::parse("R-HSA-1").unwrap()))
        );
        assert_eq!(
            sh("exit 3").render(&target(), &decoration),
            Err(RenderError::UnsupportedProfile("modern".to_owned()))
        );
        match sh("echo boom >&2; exit 1").render(&target(), &decoration) {
            Err(RenderError::Engine(message)) => assert!(message.ends_with("boom"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_engines_are_killed() {
        let engine = CommandRenderEngine::new(
            ["sh", "-c", "exec sleep 5", "engine"],
            Duration::from_millis(100),
        )
        .unwrap();
        let start = Instant::now();
        let err = engine.render(&target(), &Decoration::new()).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
