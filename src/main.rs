//! topograph CLI: task graph with dependency-aware ordering.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::Result;

use topograph::activity::{self, ActivityLog};
use topograph::canvas::{CanvasController, RankLayout};
use topograph::command::CommandInterpreter;
use topograph::config::Config;
use topograph::manager::GraphStateManager;
use topograph::paths::TopoPaths;
use topograph::persist::{DurableStore, KvStore};
use topograph::session::Session;

#[derive(Parser)]
#[command(name = "topograph", version, about = "Task graph with dependency-aware ordering")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and write a default config.
    Init,

    /// Create a node with the given text.
    Add {
        /// Node text.
        value: Vec<String>,
    },

    /// Run a command line (`/delete ab12`, `/done`, plain text adds a node).
    Cmd {
        /// The full line, as typed.
        line: Vec<String>,
    },

    /// List all nodes in ranked order.
    List,

    /// Show details of one node (by id prefix).
    Show {
        /// Node id or unambiguous prefix.
        id: String,
    },

    /// Search node text (case-insensitive substring, min 3 characters).
    Search {
        /// Search query.
        query: String,
    },

    /// Copy the current graph document to a timestamped backup key.
    Backup,

    /// Show store statistics.
    Info,

    /// Track what you are doing right now.
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// Start a new activity (stops nothing; the previous one stays open).
    Start {
        /// Activity text.
        value: Vec<String>,
    },
    /// Stop the current activity.
    Stop,
    /// Show the current activity, if any.
    Status,
}

struct App {
    kv: Arc<dyn KvStore>,
    manager: Arc<GraphStateManager>,
    session: Arc<Session>,
    canvas: Arc<CanvasController>,
}

impl App {
    fn open(data_dir_flag: Option<PathBuf>) -> Result<Self> {
        let paths = TopoPaths::resolve()?;
        let config = Config::load_or_default(&paths.config_file())?;
        let data_dir = data_dir_flag
            .or(config.data_dir.clone())
            .unwrap_or(paths.data_dir);

        let kv: Arc<dyn KvStore> = Arc::new(DurableStore::open(&data_dir)?);
        let manager = Arc::new(GraphStateManager::new(Arc::clone(&kv))?);
        let session = Arc::new(Session::new());
        let canvas = Arc::new(CanvasController::new(
            Box::new(RankLayout {
                rank_sep: config.layout.rank_sep,
                node_sep: config.layout.node_sep,
            }),
            Arc::clone(&session),
            manager.propagation(),
        ));
        tokio::spawn(Arc::clone(&canvas).run(manager.subscribe()));

        Ok(Self {
            kv,
            manager,
            session,
            canvas,
        })
    }

    fn interpreter(&self) -> CommandInterpreter {
        CommandInterpreter::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.canvas),
            Arc::clone(&self.session),
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let paths = TopoPaths::resolve()?;
            paths.ensure_dirs()?;
            let config_file = paths.config_file();
            if !config_file.exists() {
                Config::default().save(&config_file)?;
            }
            let data_dir = cli.data_dir.unwrap_or(paths.data_dir);
            let _ = DurableStore::open(&data_dir)?;
            println!("Initialized topograph at {}", data_dir.display());
        }

        Commands::Add { value } => {
            let app = App::open(cli.data_dir)?;
            let id = app.manager.add_node(value.join(" ")).await?;
            println!("created {}", id.short());
        }

        Commands::Cmd { line } => {
            let app = App::open(cli.data_dir)?;
            let outcome = app.interpreter().execute_line(&line.join(" ")).await?;
            println!("{outcome}");
        }

        Commands::List => {
            let app = App::open(cli.data_dir)?;
            let view = app.manager.view();
            for entry in view.iter() {
                let status = entry.node.status.map_or("-", |s| s.as_str());
                let pin = if entry.node.is_pinned() { "*" } else { " " };
                println!(
                    "{pin}{} p{} [{status}] {}",
                    entry.id.short(),
                    entry.node.priority_rank(),
                    entry.node.value
                );
            }
        }

        Commands::Show { id } => {
            let app = App::open(cli.data_dir)?;
            let id = app.manager.reconcile_id(&id)?;
            let view = app.manager.view();
            let entry = view
                .get(&id)
                .ok_or(topograph::error::GraphError::NotFound {
                    prefix: id.to_string(),
                })?;
            println!("id:        {}", entry.id);
            println!("value:     {}", entry.node.value);
            println!("created:   {}", entry.node.created_at.to_rfc3339());
            println!(
                "status:    {}",
                entry.node.status.map_or("unset", |s| s.as_str())
            );
            println!(
                "type:      {}",
                entry.node.kind.map_or("task", |k| k.as_str())
            );
            println!("priority:  p{}", entry.node.priority_rank());
            println!("pinned:    {}", entry.node.is_pinned());
            if let Some(notes) = &entry.node.notes {
                println!("notes:     {notes}");
            }
            if let Some(estimate) = entry.node.estimate {
                println!("estimate:  {estimate}");
            }
            if let Some(rank) = view.position(&id) {
                println!("rank:      {rank}");
            }
            for child in &entry.node.children {
                println!("child:     {}", child.short());
            }
            for parent in &entry.parents {
                println!("parent:    {}", parent.short());
            }
        }

        Commands::Search { query } => {
            let app = App::open(cli.data_dir)?;
            // The canvas holds the searchable node list; seed it once.
            app.canvas.sync(&app.manager.view());
            for hit in app.canvas.find_nodes(&query) {
                println!("{} {}", hit.id.short(), hit.data.node.value);
            }
        }

        Commands::Backup => {
            let app = App::open(cli.data_dir)?;
            match app.manager.backup()? {
                Some(key) => println!("backup written: {key}"),
                None => println!("nothing to back up"),
            }
        }

        Commands::Info => {
            let app = App::open(cli.data_dir)?;
            let store = app.manager.store();
            let edges: usize = store.iter().map(|(_, node)| node.children.len()).sum();
            println!("nodes: {}", store.len());
            println!("edges: {edges}");
            let log = activity::load_activity(app.kv.as_ref())?;
            println!("activities: {}", log.entries.len());
        }

        Commands::Activity { action } => {
            let app = App::open(cli.data_dir)?;
            let mut log = activity::load_activity(app.kv.as_ref())?;
            match action {
                ActivityAction::Start { value } => {
                    let id = log.begin(value.join(" "));
                    activity::save_activity(app.kv.as_ref(), &log)?;
                    println!("started {id}");
                }
                ActivityAction::Stop => {
                    if log.finish() {
                        activity::save_activity(app.kv.as_ref(), &log)?;
                        println!("stopped");
                    } else {
                        println!("no active activity");
                    }
                }
                ActivityAction::Status => print_activity(&log),
            }
        }
    }

    Ok(())
}

fn print_activity(log: &ActivityLog) {
    match log.active() {
        Some(activity) => {
            let value = activity.value.as_deref().unwrap_or("(untitled)");
            match &activity.start {
                Some(start) => println!("{value} (since {})", start.to_rfc3339()),
                None => println!("{value}"),
            }
        }
        None => println!("no active activity"),
    }
}
