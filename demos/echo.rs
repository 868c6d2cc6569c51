//! Echo - two clients talking over an in-memory stream.
//!
//! This example demonstrates:
//! - Creating clients with the builder pattern
//! - Registering a typed message handler
//! - Making a typed call and sending a notification
//!
//! ```text
//! RUST_LOG=shotsync=debug cargo run --example echo
//! ```

use serde::{Deserialize, Serialize};
use shotsync::{Client, HandlerRef, Message};
use tracing_subscriber::EnvFilter;

const ECHO: u16 = 1;
const PROGRESS: u16 = 2;

/// Input structure for the echo call.
#[derive(Serialize, Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo call.
#[derive(Serialize, Deserialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (a, b) = tokio::io::duplex(64 * 1024);

    let server = Client::builder()
        .message_handler(
            HandlerRef::typed(|data: EchoInput, msg: Message| async move {
                tracing::info!(code = msg.code, "echoing {:?}", data.message);
                Ok(EchoOutput { echo: data.message })
            })
            .with_label("echo"),
        )
        .start(a)
        .await?;

    let client = Client::builder().start(b).await?;

    let out: EchoOutput = client
        .call_typed(
            ECHO,
            &EchoInput {
                message: "hello".to_string(),
            },
        )
        .await?;
    println!("{}", out.echo);

    // Notifications reach the handler too; nothing is sent back.
    client.notify(PROGRESS, Vec::new()).await?;

    client.shutdown().await?;
    server.wait_for_shutdown().await?;
    println!("{:?}", server.stats());

    Ok(())
}
