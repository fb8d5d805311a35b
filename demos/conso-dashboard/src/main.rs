//! Consolidation dashboard - bit example
//!
//! Flow:
//! 1. `ConsoWorker` registers the VIP query and publishes its actions
//! 2. `DashboardView` binds to the paths it draws
//! 3. Keys go to the view, which moves the cursor or calls an action
//! 4. `BitRuntime` writes query results back and redraws on change
//!
//! # Usage
//!
//! ```sh
//! cargo run -p conso-dashboard -- \
//!     --edge-url https://<project>.functions.supabase.co --api-key <key> \
//!     --status pending --log /tmp/conso.log
//! ```

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use bit::debug::{MutationLogConfig, MutationLogMiddleware};
use bit::{root_props, BitRuntime, Composer, QueryConfig};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::EnvFilter;

use conso_dashboard::api::EdgeClient;
use conso_dashboard::state::{initial_state, VipFilter, VipState};
use conso_dashboard::view::DashboardView;
use conso_dashboard::worker::ConsoWorker;

/// Consolidation dashboard - bit framework example
#[derive(Parser, Debug)]
#[command(name = "conso-dashboard")]
#[command(about = "Assign consolidators to VIPs from the terminal")]
struct Args {
    /// Edge function base URL
    #[arg(long)]
    edge_url: String,

    /// Key sent as the bearer token
    #[arg(long)]
    api_key: String,

    /// Only list VIPs with this status
    #[arg(long, value_enum)]
    status: Option<VipFilter>,

    /// Seconds before cached query data is refetched
    #[arg(long, default_value = "300")]
    stale_secs: u64,

    /// Write logs to this file (filter with RUST_LOG)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Mutation log include pattern (glob over paths and action names)
    #[arg(long)]
    log_include: Option<String>,

    /// Mutation log exclude pattern
    #[arg(long)]
    log_exclude: Option<String>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.log {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "bit_core=debug,conso_dashboard=debug".into()),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let api = match EdgeClient::new(&args.edge_url, &args.api_key) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // ===== Terminal setup =====
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, api, &args).await;

    // ===== Cleanup =====
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(selected) = root_props(VipState::selected_id().path()).filter(|v| !v.is_null()) {
        println!("Last selected VIP: {selected}");
    }
    result
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    api: EdgeClient,
    args: &Args,
) -> io::Result<()> {
    let mutation_log = MutationLogMiddleware::new(MutationLogConfig::new(
        args.log_include.as_deref(),
        args.log_exclude.as_deref(),
    ));

    let unit = Composer::new(initial_state())
        .worker(ConsoWorker::new(api, args.status))
        .view(DashboardView::new().with_mutation_log(mutation_log.clone()))
        .middleware(mutation_log)
        .query_config(QueryConfig::default().with_stale_time(Duration::from_secs(args.stale_secs)))
        .root()
        .compose()
        .map_err(io::Error::other)?;

    let mut runtime = BitRuntime::new(unit);
    runtime
        .run(terminal, |event| {
            event.is_interrupt() || event.is_key(crossterm::event::KeyCode::Char('q'))
        })
        .await
}
