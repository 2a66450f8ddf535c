use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use techhub_sync::api::{
    Comment, ContentDraft, ContentId, ContentItem, ContentQuery, ContentType, LoginRequest,
    NewCategory, UserQuery,
};
use techhub_sync::config::{
    DEFAULT_API_BASE_URL, DEFAULT_FEED_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SEC,
    DEFAULT_UNREAD_POLL_INTERVAL_SEC,
};
use techhub_sync::{CliConfig, ClientConfig, FileConfig, Reaction, TechHubClient, UserRole};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_content_type(s: &str) -> Result<ContentType> {
    match serde_json::from_value(serde_json::Value::String(s.to_string()))? {
        ContentType::Unknown => bail!("Unknown content type: {}", s),
        content_type => Ok(content_type),
    }
}

#[derive(Parser, Debug)]
#[command(name = "techhub", version, about = "Command line client for TechHub")]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override command line flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the TechHub API.
    #[clap(long, default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Timeout in seconds for API requests.
    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Interval in seconds between unread notification polls.
    #[clap(long, default_value_t = DEFAULT_UNREAD_POLL_INTERVAL_SEC)]
    pub unread_poll_interval_sec: u64,

    /// Where the auth token is kept between runs. Defaults to ~/.techhub/token.
    #[clap(long, value_parser = parse_path)]
    pub token_path: Option<PathBuf>,

    /// Number of items per feed page.
    #[clap(long, default_value_t = DEFAULT_FEED_PAGE_SIZE)]
    pub feed_page_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Logs in and remembers the session.
    Login {
        #[clap(long, conflicts_with = "username", required_unless_present = "username")]
        email: Option<String>,
        #[clap(long)]
        username: Option<String>,
        #[clap(long)]
        password: String,
    },

    /// Forgets the remembered session.
    Logout,

    /// Shows the logged in user.
    Whoami,

    /// Lists a page of the content feed.
    Feed {
        #[clap(long, default_value_t = 1)]
        page: u32,
        #[clap(long)]
        category: Option<u64>,
        #[clap(long)]
        search: Option<String>,
    },

    /// Likes a content item, or removes the like if already liked.
    Like { content_id: ContentId },

    /// Dislikes a content item, or removes the dislike if already disliked.
    Dislike { content_id: ContentId },

    /// Lists or edits the wishlist.
    Wishlist {
        #[command(subcommand)]
        action: Option<MembershipAction>,
    },

    /// Lists or edits category subscriptions.
    Subscriptions {
        #[command(subcommand)]
        action: Option<MembershipAction>,
    },

    /// Lists notifications or marks them read.
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationAction>,
    },

    /// Shows the comment thread of a content item.
    Comments { content_id: ContentId },

    /// Writes content. Needs a tech writer or admin account.
    Write {
        #[command(subcommand)]
        action: WriteAction,
    },

    /// Works the publish queue and flag reports.
    Moderate {
        #[command(subcommand)]
        action: ModerateAction,
    },

    /// Manages users and categories. Needs an admin account.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum WriteAction {
    /// Creates a draft.
    Create {
        #[clap(long)]
        title: String,
        #[clap(long)]
        text: String,
        #[clap(long)]
        category: u64,
        #[clap(long, default_value = "article", value_parser = parse_content_type)]
        content_type: ContentType,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        media_url: Option<String>,
    },
    /// Sends a draft to the moderators.
    Submit { content_id: ContentId },
    Delete { content_id: ContentId },
}

#[derive(Subcommand, Debug)]
enum ModerateAction {
    /// Lists content waiting for a decision.
    Pending,
    Publish { content_id: ContentId },
    Approve { content_id: ContentId },
    Reject {
        content_id: ContentId,
        #[clap(long)]
        reason: String,
    },
    /// Takes content down whatever its status.
    Remove { content_id: ContentId },
    /// Lists flag reports, open ones unless --all.
    Flags {
        #[clap(long)]
        all: bool,
    },
    Resolve {
        flag_id: u64,
        #[clap(long)]
        notes: String,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Lists users.
    Users {
        #[clap(long)]
        role: Option<UserRole>,
        #[clap(long)]
        inactive: bool,
    },
    Activate { user_id: u64 },
    Deactivate { user_id: u64 },
    /// Changes a user's role: admin, tech_writer or user.
    Role { user_id: u64, role: UserRole },
    /// Creates a content category.
    Category {
        name: String,
        #[clap(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MembershipAction {
    /// Adds the id if missing, removes it otherwise.
    Toggle { id: u64 },
}

#[derive(Subcommand, Debug)]
enum NotificationAction {
    /// Marks one notification read.
    Read { id: u64 },
    /// Marks every notification read.
    ReadAll,
}

impl CliArgs {
    fn cli_config(&self) -> CliConfig {
        CliConfig {
            api_base_url: self.api_base_url.clone(),
            request_timeout_sec: self.request_timeout_sec,
            unread_poll_interval_sec: self.unread_poll_interval_sec,
            token_path: self.token_path.clone(),
            feed_page_size: self.feed_page_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = ClientConfig::resolve(&cli_args.cli_config(), file_config)?;
    let client = TechHubClient::from_config(config)?;

    run(&client, cli_args.command).await
}

async fn run(client: &TechHubClient, command: Command) -> Result<()> {
    match command {
        Command::Login {
            email,
            username,
            password,
        } => {
            if client.restore_session().await.is_some() {
                client.logout();
            }
            let credentials = match (email, username) {
                (Some(email), _) => LoginRequest::with_email(email, password),
                (None, Some(username)) => LoginRequest::with_username(username, password),
                (None, None) => bail!("Either --email or --username is required"),
            };
            let session = client.login(&credentials).await?;
            println!(
                "Logged in as {} ({})",
                session.user.username,
                session.role().as_str()
            );
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
        Command::Whoami => match client.restore_session().await {
            Some(session) => {
                let user = &session.user;
                println!("{} <{}>", user.username, user.email);
                println!("  role: {}", user.role.as_str());
                if let Some(full_name) = &user.full_name {
                    println!("  name: {}", full_name);
                }
                println!("  unread notifications: {}", client.notifications().unread_count());
            }
            None => println!("Not logged in"),
        },
        Command::Feed {
            page,
            category,
            search,
        } => {
            client.restore_session().await;
            let query = ContentQuery {
                category,
                search,
                ..client.feed_query(page)
            };
            let feed = client.fetch_feed(&query).await?;
            for item in &feed.items {
                let saved = if client.wishlist().contains(item.id) { "*" } else { " " };
                println!(
                    "{} {:>6}  {:<60}  +{} -{}{}",
                    saved,
                    item.id,
                    item.title,
                    item.likes_count,
                    item.dislikes_count,
                    match item.user_reaction {
                        Some(true) => "  (liked)",
                        Some(false) => "  (disliked)",
                        None => "",
                    }
                );
            }
            println!(
                "page {}/{} ({} items)",
                feed.pagination.page, feed.pagination.total_pages, feed.pagination.total
            );
        }
        Command::Like { content_id } => react(client, content_id, Reaction::Like).await?,
        Command::Dislike { content_id } => react(client, content_id, Reaction::Dislike).await?,
        Command::Wishlist { action } => {
            require_session(client).await?;
            if let Some(MembershipAction::Toggle { id }) = action {
                let saved = client.toggle_wishlist(id).await?;
                println!(
                    "{} {} wishlist",
                    if saved { "Added to" } else { "Removed from" },
                    id
                );
            }
            print_ids("wishlist", client.wishlist().ids());
        }
        Command::Subscriptions { action } => {
            require_session(client).await?;
            if let Some(MembershipAction::Toggle { id }) = action {
                let subscribed = client.toggle_subscription(id).await?;
                println!(
                    "{} category {}",
                    if subscribed { "Subscribed to" } else { "Unsubscribed from" },
                    id
                );
            }
            let subscribed = client.subscriptions().ids();
            for category in client.list_categories().await? {
                let mark = if subscribed.contains(&category.id) { "*" } else { " " };
                println!("{} {:>4}  {}", mark, category.id, category.name);
            }
        }
        Command::Notifications { action } => {
            require_session(client).await?;
            match action {
                Some(NotificationAction::Read { id }) => client.mark_read(id).await?,
                Some(NotificationAction::ReadAll) => client.mark_all_read().await?,
                None => {}
            }
            for notification in client.notifications().notifications() {
                println!(
                    "{} {:>5}  {}  {}",
                    if notification.is_read { " " } else { "!" },
                    notification.id,
                    notification.created_at.format("%Y-%m-%d %H:%M"),
                    notification.message
                );
            }
            println!("{} unread", client.notifications().unread_count());
        }
        Command::Comments { content_id } => {
            client.restore_session().await;
            let thread = client.fetch_comments(content_id).await?;
            if thread.is_empty() {
                println!("No comments yet");
            }
            print_thread(&thread, 0);
        }
        Command::Write { action } => {
            require_session(client).await?;
            match action {
                WriteAction::Create {
                    title,
                    text,
                    category,
                    content_type,
                    tags,
                    media_url,
                } => {
                    let draft = ContentDraft {
                        title,
                        content_text: text,
                        content_type,
                        category_id: category,
                        tags,
                        media_url,
                    };
                    let item = client.create_content(&draft).await?;
                    print_item(&item);
                }
                WriteAction::Submit { content_id } => {
                    let item = client.submit_for_review(content_id).await?;
                    print_item(&item);
                }
                WriteAction::Delete { content_id } => {
                    client.delete_content(content_id).await?;
                    println!("Deleted {}", content_id);
                }
            }
        }
        Command::Moderate { action } => {
            require_session(client).await?;
            match action {
                ModerateAction::Pending => {
                    let pending = client.fetch_pending_content().await?;
                    if pending.is_empty() {
                        println!("Nothing waiting for review");
                    }
                    pending.iter().for_each(print_item);
                }
                ModerateAction::Publish { content_id } => {
                    let status = client.publish_content(content_id).await?;
                    println!("{} is now {:?}", content_id, status);
                }
                ModerateAction::Approve { content_id } => {
                    let status = client.approve_content(content_id).await?;
                    println!("{} is now {:?}", content_id, status);
                }
                ModerateAction::Reject { content_id, reason } => {
                    let status = client.reject_content(content_id, &reason).await?;
                    println!("{} is now {:?}", content_id, status);
                }
                ModerateAction::Remove { content_id } => {
                    client.remove_content(content_id).await?;
                    println!("Removed {}", content_id);
                }
                ModerateAction::Flags { all } => {
                    let resolved = if all { None } else { Some(false) };
                    for flag in client.fetch_flags(resolved).await? {
                        println!(
                            "{} {:>5}  content {:<6} {:?}  {}",
                            if flag.is_resolved { " " } else { "!" },
                            flag.id,
                            flag.content_id,
                            flag.reason,
                            flag.description.as_deref().unwrap_or("")
                        );
                    }
                }
                ModerateAction::Resolve { flag_id, notes } => {
                    // Only loaded flags can be resolved
                    client.fetch_flags(Some(false)).await?;
                    client.resolve_flag(flag_id, &notes).await?;
                    println!("Resolved flag {}", flag_id);
                }
            }
        }
        Command::Admin { action } => {
            require_session(client).await?;
            match action {
                AdminAction::Users { role, inactive } => {
                    let query = UserQuery {
                        role,
                        is_active: inactive.then_some(false),
                    };
                    for user in client.fetch_users(&query).await? {
                        println!(
                            "{} {:>5}  {:<20} {:<12} {}",
                            if user.is_active { " " } else { "x" },
                            user.id,
                            user.username,
                            user.role,
                            user.email
                        );
                    }
                }
                AdminAction::Activate { user_id } => set_active(client, user_id, true).await?,
                AdminAction::Deactivate { user_id } => set_active(client, user_id, false).await?,
                AdminAction::Role { user_id, role } => {
                    client.fetch_users(&UserQuery::default()).await?;
                    let user = client.update_user_role(user_id, role).await?;
                    println!("{} is now {}", user.username, user.role);
                }
                AdminAction::Category { name, description } => {
                    let category = client
                        .create_category(&NewCategory { name, description })
                        .await?;
                    println!("Created category {} ({})", category.name, category.id);
                }
            }
        }
    }
    Ok(())
}

async fn set_active(client: &TechHubClient, user_id: u64, active: bool) -> Result<()> {
    // The directory has to know the user first
    client.fetch_users(&UserQuery::default()).await?;
    client.set_user_active(user_id, active).await?;
    println!(
        "User {} {}",
        user_id,
        if active { "activated" } else { "deactivated" }
    );
    Ok(())
}

fn print_item(item: &ContentItem) {
    println!(
        "{:>6}  {:<60}  {:?}",
        item.id, item.title, item.status
    );
}

async fn require_session(client: &TechHubClient) -> Result<()> {
    if client.restore_session().await.is_none() {
        bail!("Not logged in, run `techhub login` first");
    }
    Ok(())
}

async fn react(client: &TechHubClient, content_id: ContentId, reaction: Reaction) -> Result<()> {
    require_session(client).await?;
    // Current reaction decides whether this is a toggle off
    client.fetch_content(content_id).await?;
    let state = client.toggle_reaction(content_id, reaction).await?;
    println!(
        "{}: +{} -{}",
        match state.reaction {
            Some(Reaction::Like) => "Liked",
            Some(Reaction::Dislike) => "Disliked",
            None => "No reaction",
        },
        state.likes_count,
        state.dislikes_count
    );
    Ok(())
}

fn print_ids(label: &str, ids: impl IntoIterator<Item = u64>) {
    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    if ids.is_empty() {
        println!("{} is empty", label);
    } else {
        println!("{}: {}", label, ids.join(", "));
    }
}

fn print_thread(comments: &[Comment], depth: usize) {
    for comment in comments {
        println!(
            "{}[{}] {} ({} likes{})",
            "  ".repeat(depth),
            comment.id,
            comment.text,
            comment.likes_count,
            if comment.is_liked { ", liked" } else { "" }
        );
        print_thread(&comment.replies, depth + 1);
    }
}
