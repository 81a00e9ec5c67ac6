use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "bazar")]
#[command(about = "Browse classifieds, publish listings and chat with buyers and sellers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name holding backend and media settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Use the local database at PATH instead of the hosted backend
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Local mode identity (UUID); falls back to BAZAR_USER
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    pub as_user: Option<String>,

    /// Local mode display name stored for the `--as` identity
    #[arg(long, global = true, value_name = "NAME", requires = "as_user")]
    pub name: Option<String>,
}

/// Which backend a command talks to, as chosen by global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub profile: Option<String>,
    pub db_path: Option<PathBuf>,
    pub as_user: Option<String>,
    pub name: Option<String>,
}

impl Cli {
    pub fn target(&self) -> Target {
        Target {
            profile: self.profile.clone(),
            db_path: self.db_path.clone(),
            as_user: self.as_user.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List listings, newest first
    #[command(alias = "ls")]
    List {
        /// Only titles containing this text (case-insensitive)
        #[arg(short, long)]
        q: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one listing with its seller and map link
    Show {
        /// Listing ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the built-in categories
    Categories,
    /// Publish a new listing
    Sell(SellArgs),
    /// Open (or reopen) the conversation with a listing's seller
    Contact {
        /// Listing ID
        listing: String,
    },
    /// List your conversations, most recent activity first
    Inbox {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Chat in a conversation; type a line and press enter to send
    Chat {
        /// Conversation ID
        conversation: String,
        /// Send one message and exit instead of staying interactive
        #[arg(long, value_name = "TEXT")]
        send: Option<String>,
    },
    /// Authenticate a profile against the hosted backend
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SellArgs {
    /// Listing title
    #[arg(long)]
    pub title: String,
    /// Asking price, e.g. 12 or 12,50
    #[arg(long)]
    pub price: String,
    /// Listing description
    #[arg(long)]
    pub description: String,
    /// Category ID (see `bazar categories`)
    #[arg(long, default_value_t = 1)]
    pub category: i64,
    /// Free-form address shown to buyers
    #[arg(long)]
    pub address: Option<String>,
    /// Image file to upload as the listing photo
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Media host cloud name
        #[arg(long, value_name = "NAME")]
        media_cloud_name: Option<String>,
        /// Unsigned media upload preset
        #[arg(long, value_name = "PRESET")]
        media_upload_preset: Option<String>,
        /// Media API base URL
        #[arg(long, value_name = "URL")]
        media_api_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}

/// Hosted account credentials.
#[derive(Args)]
pub struct Credentials {
    #[arg(long, value_name = "EMAIL")]
    pub email: String,
    #[arg(long, value_name = "PASSWORD")]
    pub password: String,
}

/// Account commands; they act on the global `--profile`.
#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and keep the session in the OS keychain
    Login(Credentials),
    /// Create an account, signing in when no e-mail confirmation is needed
    Signup(Credentials),
    /// Report whether the profile has a live session
    Status,
    /// Revoke and forget the stored session
    Logout,
}
