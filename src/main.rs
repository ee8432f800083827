use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trello_sync::config::{Config, LogConfig};
use trello_sync::trello::{Board, Card, List};
use trello_sync::{Resource, Service};

#[derive(Parser, Debug)]
#[command(name = "trello-sync")]
#[command(about = "Browse and edit Trello boards through the lazily synchronized object model")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/trello-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show a board with its open lists and cards
  Board { id: String },
  /// Show a single card
  Card { id: String },
  /// Rename a card
  RenameCard { id: String, name: String },
  /// Add a card at the bottom of a list
  AddCard { list: String, name: String },
}

fn init_logging(config: &LogConfig) -> Result<WorkerGuard> {
  let directory = config.directory();
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let appender = tracing_appender::rolling::daily(&directory, "trello-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

async fn show_board(service: &Service, id: &str) -> Result<()> {
  let board = service.retrieve::<Board>(id);
  let name = board.name().await?.unwrap_or_default();
  println!("{}", name);

  for list in board.lists().await? {
    println!("  {}", list.name().await?.unwrap_or_default());
    for card in list.cards().await? {
      let id = card.id().unwrap_or_default();
      println!("    [{}] {}", id, card.name().await?.unwrap_or_default());
    }
  }
  Ok(())
}

async fn show_card(service: &Service, id: &str) -> Result<()> {
  let card = service.retrieve::<Card>(id);
  println!("{}", card.name().await?.unwrap_or_default());
  if let Some(list) = card.list().await? {
    println!("list: {}", list.name().await?.unwrap_or_default());
  }
  if let Some(due) = card.due().await? {
    println!("due: {}", due.format("%Y-%m-%d %H:%M"));
  }
  if let Some(description) = card.description().await? {
    println!("\n{}", description);
  }
  for checklist in card.checklists().await? {
    println!("\n{}", checklist.name().await?.unwrap_or_default());
    for item in checklist.check_items().await? {
      println!("  - {}", item.name().await?.unwrap_or_default());
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _guard = init_logging(&config.log)?;

  let service = Service::connect(&config)?;

  match args.command {
    Command::Board { id } => show_board(&service, &id).await?,
    Command::Card { id } => show_card(&service, &id).await?,
    Command::RenameCard { id, name } => {
      let card = service.retrieve::<Card>(&id);
      card.set_name(&name)?;
    }
    Command::AddCard { list, name } => {
      let list = service.retrieve::<List>(&list);
      let card = list.add_card(&name, None).await?;
      println!("{}", card.id().unwrap_or_default());
    }
  }

  // Queued writes go out before exit.
  service.shutdown().await?;

  Ok(())
}
