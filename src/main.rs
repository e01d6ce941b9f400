//! feedbridge
//!
//! Демонстрация моста брокер → отфильтрованный фид: строки из stdin
//! публикуются в тему, а подписчик печатает только те, что прошли фильтр.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use feedbridge::{
    init_logging, predicate_fn, with_filter, Broker, Feed, FeedError, Settings, SharedContext,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

type LineContext = SharedContext<Option<String>, (), ()>;

#[derive(Parser)]
#[command(name = "feedbridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Publish stdin lines to a topic and print the ones a filtered feed accepts",
    long_about = None
)]
struct Cli {
    /// Тема, в которую публикуются строки
    #[arg(short, long, default_value = "lines", env = "FEEDBRIDGE_TOPIC")]
    topic: String,
    /// Печатать только строки, содержащие подстроку
    #[arg(short, long)]
    contains: Option<String>,
    /// Включить подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,
}

// current_thread: подписчик успевает вычитать фид до чтения следующей строки
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().context("failed to load settings")?;
    if cli.verbose {
        settings.logging.level = "debug".into();
    }
    let logging = init_logging(settings.logging.clone())
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    let broker = Broker::<String>::with_config(settings.broker.clone())
        .context("invalid broker settings")?;

    let factory_broker = broker.clone();
    let factory_topic = cli.topic.clone();
    let handler = with_filter(
        move || factory_broker.async_iterator(&factory_topic),
        predicate_fn(|line: &String, ctx: &LineContext| {
            ctx.args
                .as_deref()
                .map_or(true, |needle| line.contains(needle))
        }),
    );
    let feed = Arc::new(handler.subscribe(cli.contains.clone(), (), ())?);

    let printer = {
        let feed = feed.clone();
        tokio::spawn(async move {
            let mut printed = 0usize;
            while let Some(line) = feed.next().await? {
                println!("{line}");
                printed += 1;
            }
            Ok::<_, FeedError>(printed)
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        broker.publish(&cli.topic, line)?;
        tokio::task::yield_now().await;
    }

    feed.terminate().await;
    let printed = printer.await??;

    info!(printed, stats = ?broker.stats(), "Input exhausted");
    logging.shutdown();
    Ok(())
}
