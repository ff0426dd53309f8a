//! Tracing subscriber setup
//!
//! Controlled by environment variables:
//!
//! - `LOG_LEVEL`: filter directive, default `info` (`RUST_LOG` wins when set)
//! - `LOG_OUTPUT`: `console`, `file` or `both`
//! - `LOG_FORMAT`: `human` or `json`
//! - `LOG_FILE_PATH`: log file for the `file` and `both` outputs, rotated daily

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/nuget-feed.log";

/// Writes every record to two writers
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write_all(buf);
        let res_b = self.b.write_all(buf);
        res_a.or(res_b).map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

/// Logging settings resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub json: bool,
    pub file_path: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            _ => LogOutput::Console,
        };
        Self {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            output,
            json: lookup("LOG_FORMAT").as_deref() == Some("json"),
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in ["tokio=warn", "hyper=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }

    fn file_writer(&self) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
        let dir = self
            .file_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = self
            .file_path
            .file_name()
            .unwrap_or_else(|| "nuget-feed.log".as_ref());
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
    }
}

/// Install the global subscriber. The returned guard flushes file output on
/// drop and must be held for the lifetime of the process.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(settings.filter());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let (result, guard) = match settings.output {
        LogOutput::Console => {
            let layer = fmt_layer.with_writer(io::stdout);
            let result = if settings.json {
                subscriber.with(layer.json()).try_init()
            } else {
                subscriber.with(layer).try_init()
            };
            (result, None)
        }
        LogOutput::File => {
            let (writer, guard) = settings.file_writer();
            let layer = fmt_layer.with_ansi(false).with_writer(writer);
            let result = if settings.json {
                subscriber.with(layer.json()).try_init()
            } else {
                subscriber.with(layer).try_init()
            };
            (result, Some(guard))
        }
        LogOutput::Both => {
            let (writer, guard) = settings.file_writer();
            let layer = fmt_layer.with_ansi(false).with_writer(MakeTee {
                make_a: io::stdout,
                make_b: writer,
            });
            let result = if settings.json {
                subscriber.with(layer.json()).try_init()
            } else {
                subscriber.with(layer).try_init()
            };
            (result, Some(guard))
        }
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }
    guard
}
