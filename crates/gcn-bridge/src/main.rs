//! Flow bridge: runs the configured Pub/Sub and device-command nodes.
//!
//! JSON lines on stdin are routed to the publish or command node. Messages
//! delivered to the subscribe node are written to stdout as JSON lines.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use gcn_bridge::config::BridgeConfig;
use gcn_bridge::host::TracingHost;
use gcn_bridge::input::{Route, parse_line};
use gcn_bridge::tokens::Tokens;
use gcn_iot_command::{CommandClient, RestCommandClient};
use gcn_nodes::{CommandNode, PublishNode, SubscribeNode};
use gcn_protocol::{FlowMessage, Identity};
use gcn_pubsub_channel::{PubSubClient, PubSubConfig, PubSubResult, RestPubSubClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gcn-bridge starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/gcn/bridge.toml".to_string());

    let config = BridgeConfig::from_file(&config_path)?;
    if !config.has_nodes() {
        anyhow::bail!("{config_path} configures no nodes");
    }
    let credentials = config.credential_store()?;
    let tokens = Tokens::from_env(config.token_env.as_deref())?;
    tracing::info!(
        credentials = config.credentials.len(),
        endpoint = %config.pubsub.endpoint,
        static_token = config.token_env.is_some(),
        "config loaded"
    );

    // ── Start nodes ─────────────────────────────────────────────
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<FlowMessage>();

    let publish = match &config.publish {
        Some(node) => Some(PublishNode::start(
            node.clone(),
            Arc::new(TracingHost::new("publish")),
            &credentials,
            |identity| rest_pubsub(&config.pubsub, identity, &tokens),
        )?),
        None => None,
    };

    let subscribe = match &config.subscribe {
        Some(node) => Some(SubscribeNode::start(
            node.clone(),
            Arc::new(TracingHost::with_output("subscribe", output_tx.clone())),
            &credentials,
            |identity| rest_pubsub(&config.pubsub, identity, &tokens),
        )?),
        None => None,
    };
    drop(output_tx);

    let command = match &config.command {
        Some(node) => {
            let iot = config.iot.clone();
            let tokens = tokens.clone();
            Some(CommandNode::start(
                node.clone(),
                Arc::new(TracingHost::new("command")),
                &credentials,
                move |identity| async move {
                    let tokens = tokens.for_identity(&identity)?;
                    RestCommandClient::connect(&iot, tokens)
                        .await
                        .map(|client| Arc::new(client) as Arc<dyn CommandClient>)
                },
            )?)
        }
        None => None,
    };

    tracing::info!("gcn-bridge ready");

    // ── Route stdin, print subscription output ──────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut reading = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if reading => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match parse_line(&line) {
                    Ok((Route::Publish, message)) => match &publish {
                        Some(node) => node.input(message),
                        None => tracing::warn!("no publish node configured, line dropped"),
                    },
                    Ok((Route::Command, message)) => match &command {
                        Some(node) => node.input(message),
                        None => tracing::warn!("no command node configured, line dropped"),
                    },
                    Err(e) => tracing::warn!(error = %e, "malformed input line"),
                },
                None => {
                    tracing::info!("input closed");
                    reading = false;
                    // Keep running while there is subscription output to print.
                    if subscribe.is_none() {
                        break;
                    }
                }
            },
            Some(message) = output_rx.recv() => {
                let mut line = serde_json::to_string(&message)?;
                line.push('\n');
                stdout.write_all(line.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    // ── Close nodes ─────────────────────────────────────────────
    if let Some(node) = &publish {
        node.close().await;
    }
    if let Some(node) = &subscribe {
        node.close().await;
    }
    if let Some(node) = &command {
        node.close().await;
    }

    tracing::info!("gcn-bridge stopped");
    Ok(())
}

fn rest_pubsub(
    config: &PubSubConfig,
    identity: &Identity,
    tokens: &Tokens,
) -> PubSubResult<Arc<dyn PubSubClient>> {
    let client = RestPubSubClient::new(config, identity, tokens.for_identity(identity)?)?;
    Ok(Arc::new(client))
}
