use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snafu::{ResultExt, Snafu};
use tessera_sdk::context::Cancellation;
use tessera_telemetry::TelemetryOptions;
use tessera_testing::harness;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing {
        source: tessera_telemetry::Error,
    },

    #[snafu(display("failed to run the harness"))]
    Harness { source: harness::Error },

    #[snafu(display("failed to serialize output"))]
    SerializeOutput { source: serde_json::Error },
}

/// Runs requests against the testing provider.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    telemetry: TelemetryOptions,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the provider schema as JSON.
    Schema,

    /// Execute the JSON list of requests in a file and print the responses as JSON.
    Run {
        #[arg(long, short, value_name = "FILE")]
        request: PathBuf,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let _log_guard =
        tessera_telemetry::init(env!("CARGO_PKG_NAME"), &cli.telemetry).context(InitTracingSnafu)?;

    let output = match cli.command {
        Command::Schema => {
            serde_json::to_string_pretty(&harness::schema().context(HarnessSnafu)?)
        }
        Command::Run { request } => {
            let interrupt = Cancellation::from_future(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            });
            let responses = harness::run_file(&request, interrupt)
                .await
                .context(HarnessSnafu)?;
            serde_json::to_string_pretty(&responses)
        }
    }
    .context(SerializeOutputSnafu)?;

    println!("{output}");
    Ok(())
}
