use std::path::{Path, PathBuf};

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt as _};

/// Filter directives for every output, in [`EnvFilter`] syntax such as
/// `tessera_sdk=debug,info`. Unparsable directives are skipped. Defaults to INFO.
pub const LOG_FILTER_ENV: &str = "TESSERA_LOG";

const LOG_FILE_SUFFIX: &str = "log.json";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to open log files in {directory:?}"))]
    OpenLogFiles {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("a global tracing subscriber is already installed"))]
    InstallSubscriber { source: SetGlobalDefaultError },
}

/// Where provider logs go. Flatten it into a clap parser with the `clap` feature.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// Do not log to stderr.
    #[cfg_attr(feature = "clap", arg(long, env = "TESSERA_LOG_QUIET"))]
    pub quiet: bool,

    /// Also write JSON logs into this directory, starting a new file every day.
    #[cfg_attr(
        feature = "clap",
        arg(long, env = "TESSERA_LOG_DIRECTORY", value_name = "DIRECTORY")
    )]
    pub log_directory: Option<PathBuf>,
}

/// Flushes file logs when dropped, so hold it until the provider exits.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LogGuard {
    _file_worker: Option<WorkerGuard>,
}

/// Installs the global subscriber for the provider named `provider`.
pub fn init(provider: &str, options: &TelemetryOptions) -> Result<LogGuard, Error> {
    let console = (!options.quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_filter())
    });

    let (file, file_worker) = match &options.log_directory {
        Some(directory) => {
            let (writer, worker) = tracing_appender::non_blocking(log_files(provider, directory)?);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(log_filter());
            (Some(layer), Some(worker))
        }
        None => (None, None),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(console).with(file),
    )
    .context(InstallSubscriberSnafu)?;

    Ok(LogGuard {
        _file_worker: file_worker,
    })
}

fn log_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(LOG_FILTER_ENV)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

fn log_files(provider: &str, directory: &Path) -> Result<RollingFileAppender, Error> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(provider)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(directory)
        .context(OpenLogFilesSnafu { directory })
}
