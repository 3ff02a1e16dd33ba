use anyhow::Result;
use clap::Parser;
use termcast::Server;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[clap(
    name = "termcast-server",
    about = "Broadcast a terminal stream to WebSocket clients as styled markup"
)]
struct Args {
    /// Port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// Terminal width the producer renders at
    #[clap(long, default_value = "120")]
    width: u16,

    /// Terminal height the producer renders at
    #[clap(long, default_value = "30")]
    height: u16,

    /// Log filter, e.g. "info" or "termcast=debug"
    #[clap(short, long, default_value = "info")]
    log_level: String,
}

/// Pipe a terminal UI in and serve it out: `btop | termcast-server`.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let server = Server::new(args.port);
    server.set_terminal_size(args.width, args.height).await;
    server.start().await?;

    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        tokio::select! {
            read = stdin.read(&mut buf) => match read? {
                0 => {
                    tracing::info!("input stream ended");
                    break;
                }
                n => server.broadcast(&buf[..n]).await,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    server.stop().await;
    Ok(())
}
