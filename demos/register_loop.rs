//! Register a message handler twenty times in a row.
//!
//! Each registration supersedes the previous one; only the last handler
//! stays active and the earlier ones are released as they are replaced.
//!
//! ```text
//! RUST_LOG=debug cargo run --example register_loop
//! ```

use bytes::Bytes;
use shotsync::{
    client_dispatch, client_message_handler, client_set_message_handler, DispatchOutcome,
    HandlerRef, Message, Reply,
};
use tracing_subscriber::EnvFilter;

const REGISTRATIONS: u32 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut last = None;
    for i in 1..=REGISTRATIONS {
        tracing::info!("ClientSetMessageHandler No. {}", i);

        let handler = HandlerRef::from_fn(move |_msg: Message| async move {
            Ok(Reply::ok(format!("H{}", i)))
        })
        .with_label(format!("H{}", i));
        last = Some(handler.id());

        client_set_message_handler(handler)?;
    }

    assert_eq!(client_message_handler(), last);

    if let DispatchOutcome::Handled { handler, reply } =
        client_dispatch(Message::request(1, 1, Bytes::new())).await
    {
        println!("{} answered {}", handler, String::from_utf8_lossy(&reply.payload));
    }

    Ok(())
}
