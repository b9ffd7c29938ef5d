//! Command implementations. Each runs against one started [`Client`] that is
//! stopped again afterwards, whatever the outcome.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use pwire::{ChannelOwner, Client, Error, Payload, Waiter};
use serde_json::Value;

use crate::cli::{CallArgs, Cli, Commands, WaitArgs};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = cli.client_config().context("invalid configuration")?;
	let client = match &cli.ws {
		Some(url) => Client::connect(url, config).await,
		None => Client::launch(config).await,
	}
	.context("failed to start session")?;
	tracing::info!(playwright = client.playwright().guid(), "session started");

	let outcome = match cli.command {
		Commands::Objects => objects(&client),
		Commands::Call(args) => call(&client, args).await,
		Commands::Wait(args) => wait(&client, args).await,
	};

	let stopped = client.stop().await;
	outcome?;
	stopped.context("failed to stop session")?;
	Ok(())
}

fn objects(client: &Client) -> Result<()> {
	let root: Arc<dyn ChannelOwner> = client.root().clone();
	print!("{}", render_tree(root.as_ref()));
	Ok(())
}

/// One line per handle, children indented under their parent and sorted by guid.
pub fn render_tree(root: &dyn ChannelOwner) -> String {
	let mut out = String::new();
	render_node(root, 0, &mut out);
	out
}

fn render_node(node: &dyn ChannelOwner, depth: usize, out: &mut String) {
	let guid = if node.guid().is_empty() { "\"\"" } else { node.guid() };
	let _ = writeln!(out, "{:indent$}{} {}", "", node.type_name(), guid, indent = depth * 2);

	let mut children = node.children();
	children.sort_by(|a, b| a.guid().cmp(b.guid()));
	for child in children {
		render_node(child.as_ref(), depth + 1, out);
	}
}

async fn call(client: &Client, args: CallArgs) -> Result<()> {
	let params = parse_params(&args.params)?;
	let target = client
		.wait_for_object(&args.guid)
		.await
		.with_context(|| format!("no object {:?}", args.guid))?;

	let result = target
		.channel()
		.call(&args.method, params)
		.await
		.with_context(|| format!("{}.{} failed", target.type_name(), args.method))?;
	print_json(result.value())
}

async fn wait(client: &Client, args: WaitArgs) -> Result<()> {
	let target = client
		.wait_for_object(&args.guid)
		.await
		.with_context(|| format!("no object {:?}", args.guid))?;

	let mut waiter = Waiter::<Payload>::new()
		.wait_for_event(target.events(), &args.event)
		.fail_on_timeout(
			args.timeout(),
			format!("waiting for \"{}\" on {}", args.event, args.guid),
		);
	if args.event != "close" {
		waiter = waiter.fail_on_event(
			target.events(),
			"close",
			Error::TargetClosed {
				target_type: target.type_name().to_string(),
				context: format!("while waiting for \"{}\"", args.event),
			},
		);
	}

	let payload = tokio::select! {
		outcome = waiter.wait() => outcome?,
		reason = client.wait_closed() => return Err(reason).context("session ended while waiting"),
	};
	print_json(payload.value())
}

/// Parses a JSON object; anything else is rejected before a round trip.
pub fn parse_params(raw: &str) -> Result<Value> {
	let value: Value = serde_json::from_str(raw).context("params are not valid JSON")?;
	if !value.is_object() {
		bail!("params must be a JSON object, got {value}");
	}
	Ok(value)
}

fn print_json(value: &Value) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
