mod runnables;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use launchpad_core::config::{
    ENV_CHANNEL, ENV_RECALCULATE, ENV_REDIS_URL, ENV_RUNNABLES, ENV_TASKS_HASH,
};
use launchpad_core::domain::{Message, Params};
use launchpad_core::impls::{RedisChannel, RedisHashStore};
use launchpad_core::ports::{MessageChannel, SystemClock, UlidKeyGenerator};
use launchpad_core::{Completion, Launchpad, LaunchpadBuilder, Settings, TaskKey, TaskRecord, TaskStore};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "launchpad", about = "Distributed task dispatcher over Redis")]
struct Cli {
    /// Redis URL
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    redis_url: Option<String>,

    /// Hash that holds task records
    #[arg(long, global = true, env = ENV_TASKS_HASH)]
    tasks_hash: Option<String>,

    /// Channel to publish / listen on
    #[arg(long, global = true, env = ENV_CHANNEL)]
    channel: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct WorkerArgs {
    /// `builtin` or a path to a JSON manifest
    #[arg(env = ENV_RUNNABLES)]
    runnables: Option<String>,

    /// Sweep stored tasks once after subscribing
    #[arg(long, env = ENV_RECALCULATE, value_parser = BoolishValueParser::new())]
    recalculate: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for RUN messages and execute them (default)
    Worker(WorkerArgs),
    /// Store a task and publish RUN for it
    Submit {
        /// Runnable name
        #[arg(long = "type")]
        task_type: String,

        /// JSON object passed to the runnable
        #[arg(long, default_value = "{}")]
        params: String,

        /// Task key; a ULID is generated when omitted
        #[arg(long)]
        key: Option<String>,

        /// Wait up to this many seconds for the COMPLETE message
        #[arg(long)]
        wait: Option<u64>,
    },
    /// Print every stored task as JSON lines
    List,
    /// Delete one task record
    Delete { key: String },
    /// Delete every task record
    Flush,
    /// Re-announce completed tasks and re-run incomplete ones
    Recalculate {
        /// `builtin` or a path to a JSON manifest
        #[arg(env = ENV_RUNNABLES)]
        runnables: Option<String>,
    },
}

impl WorkerArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.runnables {
            settings.runnables = v.clone();
        }
        settings.recalculate_on_start |= self.recalculate;
    }
}

impl Cli {
    /// サブコマンド省略時は末尾に `worker` を足して読み直す（worker 側の env も効かせる）
    fn parse_with_default<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let cli = Self::try_parse_from(&args)?;
        if cli.command.is_some() {
            return Ok(cli);
        }
        Self::try_parse_from(args.into_iter().chain([OsString::from("worker")]))
    }

    /// 既定の Settings にフラグ（未指定なら環境変数）を重ねる
    fn settings(&self, base: Settings) -> Settings {
        let mut settings = base;
        if let Some(v) = &self.redis_url {
            settings.redis_url = v.clone();
        }
        if let Some(v) = &self.tasks_hash {
            settings.tasks_hash = v.clone();
        }
        if let Some(v) = &self.channel {
            settings.channel = v.clone();
        }
        match &self.command {
            Some(Command::Worker(args)) => args.apply(&mut settings),
            Some(Command::Recalculate { runnables: Some(v) }) => {
                settings.runnables = v.clone();
            }
            _ => {}
        }
        settings
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse_with_default(std::env::args_os()).unwrap_or_else(|err| err.exit());
    let settings = cli.settings(Settings::default());

    match cli.command {
        None | Some(Command::Worker(_)) => worker(&settings).await,
        Some(Command::Submit {
            task_type,
            params,
            key,
            wait,
        }) => submit(&settings, task_type, &params, key, wait).await,
        Some(Command::List) => list(&settings).await,
        Some(Command::Delete { key }) => {
            let store = connect_store(&settings).await?;
            store.delete_task(&TaskKey::new(key)).await?;
            Ok(())
        }
        Some(Command::Flush) => {
            let store = connect_store(&settings).await?;
            let removed = store.delete_tasks().await?;
            tracing::info!(removed, hash = %store.hash(), "flushed tasks");
            Ok(())
        }
        Some(Command::Recalculate { .. }) => recalculate(&settings).await,
    }
}

async fn connect_store(settings: &Settings) -> anyhow::Result<TaskStore> {
    let backend = RedisHashStore::new(&settings.redis_url)
        .await
        .with_context(|| format!("connecting to {}", settings.redis_url))?;
    Ok(TaskStore::with_hash(Arc::new(backend), settings.tasks_hash.clone()))
}

async fn build_launchpad(settings: &Settings, with_runnables: bool) -> anyhow::Result<Launchpad> {
    let store = RedisHashStore::new(&settings.redis_url)
        .await
        .with_context(|| format!("connecting to {}", settings.redis_url))?;
    let channel = RedisChannel::new(&settings.redis_url)
        .await
        .with_context(|| format!("opening pub/sub on {}", settings.redis_url))?;

    let mut builder = LaunchpadBuilder::new()
        .store(Arc::new(store))
        .tasks_hash(settings.tasks_hash.clone())
        .channel(Arc::new(channel));
    if with_runnables {
        let source = runnables::source_for(&settings.runnables);
        builder = builder.load_from(source.as_ref())?;
    }
    Ok(builder.build()?)
}

async fn worker(settings: &Settings) -> anyhow::Result<()> {
    let launchpad = build_launchpad(settings, true).await?;
    tracing::info!(
        channel = %settings.channel,
        hash = %settings.tasks_hash,
        runnables = ?launchpad.registry().names(),
        "starting worker"
    );

    launchpad.start().await;
    launchpad.subscribe(&settings.channel).await?;

    if settings.recalculate_on_start {
        let summary = launchpad.recalculate_tasks(&settings.channel).await?;
        tracing::info!(?summary, "startup sweep finished");
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    launchpad.stop().await?;
    Ok(())
}

fn parse_params(raw: &str) -> anyhow::Result<Params> {
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {other}"),
    }
}

async fn submit(
    settings: &Settings,
    task_type: String,
    params: &str,
    key: Option<String>,
    wait: Option<u64>,
) -> anyhow::Result<()> {
    let record = TaskRecord::new(task_type, parse_params(params)?);
    let key = match key {
        Some(k) => TaskKey::new(k),
        None => TaskKey::generate(&UlidKeyGenerator::new(SystemClock)),
    };

    // COMPLETE を取りこぼさないよう、submit 前に購読しておく
    let watcher = match wait {
        Some(_) => {
            let watcher = RedisChannel::new(&settings.redis_url).await?;
            watcher.subscribe(&settings.channel).await?;
            Some(watcher)
        }
        None => None,
    };

    let launchpad = build_launchpad(settings, false).await?;
    launchpad.submit(&settings.channel, &key, &record).await?;
    println!("{key}");

    if let (Some(watcher), Some(secs)) = (watcher, wait) {
        let completion = tokio::time::timeout(Duration::from_secs(secs), wait_for(&watcher, &key))
            .await
            .with_context(|| format!("no completion for {key} within {secs}s"))??;
        println!("{}", serde_json::to_string(&completion)?);
        if !completion.success {
            bail!("task {key} failed");
        }
    }
    Ok(())
}

async fn wait_for(channel: &RedisChannel, key: &TaskKey) -> anyhow::Result<Completion> {
    while let Some(inbound) = channel.recv().await {
        match Message::decode(&inbound.payload) {
            Ok(Message::Complete(completion)) if &completion.task == key => return Ok(completion),
            Ok(_) => {}
            Err(err) => tracing::debug!(error = %err, "ignoring undecodable message"),
        }
    }
    bail!("pub/sub connection closed while waiting for {key}")
}

async fn list(settings: &Settings) -> anyhow::Result<()> {
    let store = connect_store(settings).await?;
    for task in store.get_tasks().await? {
        let line = serde_json::json!({ "key": task.key, "record": task.record });
        println!("{line}");
    }
    Ok(())
}

async fn recalculate(settings: &Settings) -> anyhow::Result<()> {
    let launchpad = build_launchpad(settings, true).await?;
    let summary = launchpad.recalculate_tasks(&settings.channel).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
