use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use modqueue::{
    wire, JsonStore, PostgresStore, ReviewQueue, Reviewer, ReviewableStatus, Store, UserApproval,
    UserRecord,
};

#[derive(Parser)]
#[command(name = "modqueue")]
#[command(about = "Generic moderation review queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON store state file
    #[arg(long, default_value = ".modqueue/queue.json")]
    store_path: PathBuf,

    /// PostgreSQL connection string; uses the JSON store when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a new user signup for approval
    EnqueueUser {
        /// User id
        #[arg(long)]
        id: i64,

        /// Username
        #[arg(long)]
        username: String,

        /// Number of posts the user already has
        #[arg(long, default_value_t = 0)]
        post_count: i64,
    },

    /// List reviewables visible to a reviewer
    Pending {
        #[command(flatten)]
        reviewer: ReviewerArgs,

        /// Status to list (pending, approved, rejected, ignored, deleted)
        #[arg(long, default_value = "pending")]
        status: String,
    },

    /// Show one reviewable with the actions it offers
    Show {
        /// Reviewable id
        id: Uuid,

        #[command(flatten)]
        reviewer: ReviewerArgs,
    },

    /// Perform an action on a reviewable
    Perform {
        /// Reviewable id
        id: Uuid,

        /// Action id (e.g. approve, reject)
        action: String,

        #[command(flatten)]
        reviewer: ReviewerArgs,
    },

    /// Run database migrations (PostgreSQL only)
    Migrate,
}

#[derive(Args)]
struct ReviewerArgs {
    /// Acting reviewer id
    #[arg(long = "as-user")]
    as_user: i64,

    /// Act as an admin
    #[arg(long)]
    admin: bool,

    /// Act as a moderator
    #[arg(long)]
    moderator: bool,

    /// Group memberships (repeatable)
    #[arg(long = "group")]
    groups: Vec<i64>,
}

impl ReviewerArgs {
    fn reviewer(&self) -> Reviewer {
        Reviewer {
            id: self.as_user,
            admin: self.admin,
            moderator: self.moderator,
            groups: self.groups.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("modqueue=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Commands::Migrate = cli.command {
        let url = cli
            .database_url
            .context("migrate requires --database-url or DATABASE_URL")?;
        let store = PostgresStore::new(&url).await?;
        store.migrate().await?;
        println!("Migrations applied.");
        return Ok(());
    }

    let store: Arc<dyn Store> = match &cli.database_url {
        Some(url) => Arc::new(PostgresStore::new(url).await?),
        None => Arc::new(JsonStore::new(&cli.store_path)?),
    };
    let queue = ReviewQueue::new(store);

    match cli.command {
        Commands::EnqueueUser {
            id,
            username,
            post_count,
        } => {
            enqueue_user(&queue, id, &username, post_count).await?;
        }
        Commands::Pending { reviewer, status } => {
            list_pending(&queue, &reviewer.reviewer(), &status).await?;
        }
        Commands::Show { id, reviewer } => {
            show_reviewable(&queue, &reviewer.reviewer(), id).await?;
        }
        Commands::Perform {
            id,
            action,
            reviewer,
        } => {
            perform_action(&queue, &reviewer.reviewer(), id, &action).await?;
        }
        Commands::Migrate => unreachable!("handled above"),
    }

    Ok(())
}

async fn enqueue_user(queue: &ReviewQueue, id: i64, username: &str, post_count: i64) -> Result<()> {
    let mut user = UserRecord::new(id, username);
    user.post_count = post_count;

    queue
        .store()
        .put_subject(&user.target(), user.to_doc()?)
        .await?;

    let reviewable = queue.create(UserApproval::create_for(&user)).await?;

    println!("Queued user {} for approval.", username);
    println!("Reviewable ID: {}", reviewable.id);

    Ok(())
}

async fn list_pending(queue: &ReviewQueue, reviewer: &Reviewer, status: &str) -> Result<()> {
    let status = ReviewableStatus::parse(status)
        .with_context(|| format!("Unknown status: {}", status))?;

    let views = queue.list_for(Some(reviewer), status).await?;

    if views.is_empty() {
        println!("No {} reviewables.", status.as_str());
        return Ok(());
    }

    let body = wire::render_list(&views, queue.registry());
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}

async fn show_reviewable(queue: &ReviewQueue, reviewer: &Reviewer, id: Uuid) -> Result<()> {
    for status in [
        ReviewableStatus::Pending,
        ReviewableStatus::Approved,
        ReviewableStatus::Rejected,
        ReviewableStatus::Ignored,
        ReviewableStatus::Deleted,
    ] {
        let views = queue.list_for(Some(reviewer), status).await?;
        if let Some(view) = views.into_iter().find(|v| v.reviewable.id == id) {
            let body = wire::render_list(&[view], queue.registry());
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(());
        }
    }

    anyhow::bail!("No visible reviewable with id {}", id)
}

async fn perform_action(
    queue: &ReviewQueue,
    reviewer: &Reviewer,
    id: Uuid,
    action: &str,
) -> Result<()> {
    match queue.perform(Some(reviewer), id, action).await {
        Ok(result) => {
            let body = wire::render_perform_result(&result);
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => {
            let status = wire::http_status(&e);
            anyhow::bail!("perform failed ({}): {}", status, e)
        }
    }
}
