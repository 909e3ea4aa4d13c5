use std::sync::Arc;

use tokio::net::TcpListener;

use super::ServerContext;

/// Bind `bind_addr` and accept Bricklayer clients until the task is dropped.
pub async fn run(ctx: Arc<ServerContext>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    serve(ctx, listener).await
}

/// Accept loop over an already bound listener.
pub async fn serve(ctx: Arc<ServerContext>, listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::info!("Connection from {}", addr);

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = super::connection::handle(stream, addr, ctx).await {
                tracing::warn!("Connection from {} closed: {:#}", addr, e);
            }
        });
    }
}
