use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use harvest_client::models::{Ack, RegisterRequest, UserRole};
use harvest_client::subscriptions::{join_with_catalog, sort_subscriptions, SortKey, SortState, SUPPORT_HINT};
use harvest_client::{ClientConfig, ClientError, HarvestClient, SessionEvent};

#[derive(Parser)]
#[command(name = "harvest-cli")]
#[command(about = "Browse harvestable APIs and manage polling subscriptions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Credential store directory (overrides HARVEST_STORE_PATH)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Id,
    Container,
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Admin,
    PremiumUser,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        first_name: String,
        #[arg(short, long)]
        last_name: String,
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    Status,
    /// List the API catalog
    Apis,
    /// List your subscriptions
    Subscriptions {
        #[arg(short, long, value_enum)]
        sort: Option<SortArg>,
        #[arg(short, long)]
        desc: bool,
    },
    Subscribe {
        #[arg(short, long)]
        api: i64,
        /// Polling interval in seconds
        #[arg(short, long)]
        interval: i64,
    },
    Unsubscribe {
        #[arg(short, long)]
        id: i64,
    },
    Resubscribe {
        #[arg(short, long)]
        id: i64,
    },
    /// Show normalised telemetry for a subscription
    Data {
        #[arg(short, long)]
        subscription: i64,
        #[arg(short, long)]
        api: i64,
        /// Minutes to look back
        #[arg(short, long, default_value_t = 60)]
        timespan: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    let _guard = harvest_client::logging::init_tracing("harvest_client=warn", cli.log_json || config.log_json, None);

    let client = HarvestClient::open(config)?;
    let mut events = client.session.subscribe_events();

    match cli.command {
        Commands::Register { email, password, first_name, last_name, role } => {
            let role = match role {
                RoleArg::User => UserRole::User,
                RoleArg::Admin => UserRole::Admin,
                RoleArg::PremiumUser => UserRole::PremiumUser,
            };
            let ack = client
                .register(&RegisterRequest { email, password, first_name, last_name, role })
                .await?;
            println!("{}", ack.message.unwrap_or_else(|| "User created".to_string()));
        }
        Commands::Login { email, password } => match client.login(&email, &password).await {
            Ok(resp) => println!("Logged in as user {} ({})", resp.user_id, resp.role),
            Err(e) => println!("Login failed. Please check your credentials and try again. ({})", e),
        },
        Commands::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        Commands::Status => {
            if client.session.is_logged_in() {
                let cred = client.session.credential();
                println!("Logged in as user {} ({})", cred.user_id, cred.role);
            } else {
                println!("Not logged in.");
            }
        }
        Commands::Apis => {
            let state = client.catalog.refresh().await;
            if let Some(err) = state.error {
                println!("{}", err);
            }
            for api in state.entries.iter() {
                println!(
                    "[{}] {} ({}) - {}\n    relevant fields: {}",
                    api.id,
                    api.name,
                    api.subscription_type,
                    api.description,
                    api.relevant_fields.join(", ")
                );
            }
        }
        Commands::Subscriptions { sort, desc } => {
            let catalog = client.catalog.refresh().await;
            let mut state = client.subscriptions.reload().await;
            if let Some(err) = &state.error {
                println!("{}", err);
            }
            let mut sort_state = SortState::default();
            if let Some(key) = sort {
                let key = match key {
                    SortArg::Id => SortKey::SubscriptionId,
                    SortArg::Container => SortKey::Container,
                    SortArg::Status => SortKey::Status,
                };
                sort_state.select(key);
                if desc {
                    sort_state.select(key);
                }
            }
            sort_subscriptions(&mut state.subscriptions, &sort_state);
            for row in join_with_catalog(&state.subscriptions, &catalog) {
                let sub = &row.subscription;
                println!(
                    "#{} {} every {}s [{}] container={}",
                    sub.subscription_id,
                    row.api_label(),
                    sub.interval,
                    sub.status,
                    sub.container
                );
                if sub.status.is_error_family() {
                    println!("    {}", SUPPORT_HINT);
                }
            }
        }
        Commands::Subscribe { api, interval } => {
            let user_id = client.session.user_id();
            match client.subscriptions.subscribe(&user_id, api, interval).await {
                Ok(ack) => println!("{}", ack.message.unwrap_or_else(|| "Subscribed".to_string())),
                Err(e) => println!("{}", e),
            }
        }
        Commands::Unsubscribe { id } => {
            let result = client.subscriptions.unsubscribe(id).await;
            report_transition(&client, result);
        }
        Commands::Resubscribe { id } => {
            let result = client.subscriptions.resubscribe(id).await;
            report_transition(&client, result);
        }
        Commands::Data { subscription, api, timespan } => {
            if let Err(e) = client.telemetry.set_timespan(timespan) {
                println!("{}", e);
                return Ok(());
            }
            client.catalog.refresh().await;
            let entry = client.catalog.find(api);
            let state = client.telemetry.load(subscription, entry.as_ref()).await;
            if let Some(err) = state.error {
                println!("{}", err);
            } else if state.rows.is_empty() {
                println!("No data available for the last {} minutes.", state.timespan_minutes);
            } else {
                println!("time\t{}", state.columns.join("\t"));
                for row in &state.rows {
                    let cells: Vec<String> = state.columns.iter().map(|c| row.cell(c)).collect();
                    println!("{}\t{}", row.time.to_rfc3339(), cells.join("\t"));
                }
            }
        }
    }

    // Forced logouts surface as a message pointing back to login
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Expired { message } = event {
            println!("{} Run `harvest-cli login`.", message);
        }
    }

    Ok(())
}

/// The registry records a status line for every transition that reached the
/// scheduler; anything that failed earlier only has the error.
fn report_transition(client: &HarvestClient, result: Result<Ack, ClientError>) {
    match (result, client.subscriptions.snapshot().status_message) {
        (_, Some(msg)) => println!("{}", msg.text),
        (Err(e), None) => println!("{}", e),
        (Ok(_), None) => {}
    }
}
