use std::path::Path;

/// Run the API server until Ctrl-C. The workspace is opened inside the
/// runtime so scheduled publishes have somewhere to run.
pub fn run(root: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let ws = super::open(root)?;
        let host = host.unwrap_or_else(|| ws.config.server.host.clone());
        let port = port.unwrap_or(ws.config.server.port);
        cadence_server::serve(ws, &host, port).await
    })
}
