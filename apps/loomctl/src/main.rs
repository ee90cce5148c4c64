use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ControlPanelController, HttpLoomApi, LoomApi, LoomSession, PanelEvent, PanelView,
};
use shared::domain::{LiftPlan, LiftplanName, Row, WifiInfo};
use tokio::{signal, sync::broadcast::error::RecvError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

#[derive(Parser, Debug)]
#[command(name = "loomctl", about = "Control panel for a networked dobby loom")]
struct Cli {
    /// Base URL of the loom, e.g. http://192.168.4.1
    #[arg(long, global = true)]
    loom_url: Option<String>,
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Loom state and the liftplan it is weaving.
    Status,
    List,
    /// Print a stored liftplan as a grid.
    Show { name: String },
    /// Store a liftplan given as rows (`#.#.....` or `10100000`) or as a
    /// JSON file of hex bytes.
    Save {
        name: String,
        #[arg(long = "row", required_unless_present = "file", conflicts_with = "file")]
        rows: Vec<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Delete { name: String },
    Start {
        name: String,
        /// Zero-based row to begin weaving at.
        #[arg(long, default_value_t = 0)]
        position: u32,
    },
    Pause,
    Continue,
    Stop,
    /// Follow the executing row until the loom stops or Ctrl-C.
    Watch,
    Wifi {
        #[command(subcommand)]
        command: WifiCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WifiCommand {
    Show,
    /// The loom restarts its network after accepting new settings.
    Set {
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = config::load_settings().with_overrides(
        cli.loom_url.clone(),
        cli.poll_interval_ms,
        cli.timeout_ms,
    );
    let options = settings.client_options()?;
    debug!(loom_url = %options.base_url, "using loom");

    let api: Arc<dyn LoomApi> = Arc::new(HttpLoomApi::new(&options)?);
    let session = LoomSession::connect(Arc::clone(&api), options.poll_interval)
        .await
        .with_context(|| format!("could not reach loom at {}", options.base_url))?;
    let panel = ControlPanelController::new(api, Arc::new(session));

    let result = run(cli.command, &panel).await;
    panel.session().shutdown().await;
    result
}

async fn run(command: Command, panel: &Arc<ControlPanelController>) -> Result<()> {
    match command {
        Command::Status => {
            let info = panel.session().refresh().await?;
            println!("{}", render::status_line(&info));
        }
        Command::List => {
            let names = panel.refresh_liftplans().await?;
            if names.is_empty() {
                println!("no liftplans stored");
            }
            for name in names {
                println!("{}", name.display_name());
            }
        }
        Command::Show { name } => {
            let name = panel.store().resolve(&LiftplanName::new(name)?).await?;
            let plan = panel.store().get(&name).await?;
            let info = panel.session().info().await;
            let highlight = info
                .active_liftplan
                .as_ref()
                .filter(|active| info.state.is_active() && active.same_file(&name))
                .and_then(|_| usize::try_from(info.index).ok());
            print!("{}", render::plan_grid(&plan, highlight));
        }
        Command::Save { name, rows, file } => {
            let plan = match file {
                Some(path) => read_plan_file(&path)?,
                None => LiftPlan::new(
                    rows.iter()
                        .map(|row| row.parse::<Row>())
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            let saved = panel.save(&name, &plan).await?;
            println!("saved {} ({} rows)", saved, plan.len());
        }
        Command::Delete { name } => {
            let name = LiftplanName::new(name)?;
            panel.delete(&name).await?;
            println!("deleted {name}");
        }
        Command::Start { name, position } => {
            let name = LiftplanName::new(name)?;
            panel.select(&name).await?;
            let info = panel.start(position).await?;
            println!("{}", render::status_line(&info));
        }
        Command::Pause => println!("{}", render::status_line(&panel.pause().await?)),
        Command::Continue => println!("{}", render::status_line(&panel.resume().await?)),
        Command::Stop => println!("{}", render::status_line(&panel.stop().await?)),
        Command::Watch => watch(panel).await?,
        Command::Wifi { command } => match command {
            WifiCommand::Show => {
                let wifi = panel.load_wifi().await?;
                println!("hostname: {}", wifi.hostname);
                println!("ssid:     {}", wifi.ssid);
                println!("password: {}", "*".repeat(wifi.password.chars().count()));
            }
            WifiCommand::Set {
                hostname,
                ssid,
                password,
            } => {
                let wifi = WifiInfo {
                    hostname,
                    ssid,
                    password,
                };
                panel.save_wifi(&wifi).await?;
                info!(hostname = %wifi.hostname, "loom is restarting its network");
                println!("Restarting...");
            }
        },
    }
    Ok(())
}

/// The loom's own storage format: a JSON array of hex bytes.
fn read_plan_file(path: &Path) -> Result<LiftPlan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let hexes: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of hex strings", path.display()))?;
    Ok(LiftPlan::from_hex(hexes.as_slice())?)
}

async fn watch(panel: &Arc<ControlPanelController>) -> Result<()> {
    let mut events = panel.subscribe_events();
    let view = panel.enter_dashboard().await?;
    println!("{}", render::status_line(&view.loom));
    if !view.loom.state.is_active() {
        return Ok(());
    }
    if let Some(plan) = &view.selected_plan {
        print!("{}", render::plan_grid(plan, view.highlighted_row));
    }

    let pump = panel.spawn_event_pump();
    let mut last_row = view.highlighted_row;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PanelEvent::ViewUpdated(view)) => {
                    if !view.loom.state.is_active() {
                        println!("{}", render::status_line(&view.loom));
                        break;
                    }
                    if view.highlighted_row != last_row {
                        last_row = view.highlighted_row;
                        println!("{}", progress_line(&view));
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "watch skipped panel updates"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    pump.abort();
    Ok(())
}

fn progress_line(view: &PanelView) -> String {
    let row = view
        .highlighted_row
        .zip(view.selected_plan.as_ref())
        .and_then(|(index, plan)| plan.rows().get(index));
    match row {
        Some(row) => format!("{}  {row}", render::status_line(&view.loom)),
        None => render::status_line(&view.loom),
    }
}
