//! Runs encoded requests against the testing provider.

use std::path::{Path, PathBuf};

use futures::{StreamExt as _, stream};
use snafu::{ResultExt, Snafu};
use tessera_sdk::{
    ProviderServer,
    context::Cancellation,
    server::{GetSchemaResponse, Request, Response},
};
use tracing::{debug, info};

use crate::{Client, provider};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read request file {}", path.display()))]
    ReadRequests {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse request file {}", path.display()))]
    ParseRequests {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to set up the testing provider"))]
    SetUpProvider {
        source: tessera_sdk::provider::Error,
    },
}

pub fn server() -> Result<ProviderServer<Client>, Error> {
    provider().map(ProviderServer::new).context(SetUpProviderSnafu)
}

pub fn schema() -> Result<GetSchemaResponse, Error> {
    Ok(server()?.get_schema())
}

/// Executes `requests` in order against one provider server and collects the responses.
pub async fn run(
    requests: Vec<Request>,
    cancellation: Cancellation,
) -> Result<Vec<Response>, Error> {
    let server = server()?;
    info!(requests = requests.len(), "running requests");

    let responses: Vec<Response> = stream::iter(requests)
        .then(|request| {
            debug!(?request, "handling request");
            server.handle(cancellation.clone(), request)
        })
        .collect()
        .await;

    Ok(responses)
}

/// Reads a JSON list of requests from `path` and executes them.
pub async fn run_file(path: &Path, cancellation: Cancellation) -> Result<Vec<Response>, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(ReadRequestsSnafu { path })?;
    let requests: Vec<Request> =
        serde_json::from_str(&content).context(ParseRequestsSnafu { path })?;

    run(requests, cancellation).await
}
