use clap::{Args, Parser, Subcommand};
use jobbox::jobs::Request;
use std::path::PathBuf;

/// `jobbox` - durable job ledger and command dispatcher.
#[derive(Parser, Debug)]
#[command(name = "jobbox")]
#[command(version)]
#[command(about = "Run chat-style commands with a durable job ledger.", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.jobbox/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one command line and print the reply
    Run {
        #[command(flatten)]
        origin: Origin,

        /// Command name followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },

    /// Read command lines from stdin, one invocation per line
    Repl {
        #[command(flatten)]
        origin: Origin,
    },

    /// Run the command stored in an API token
    Replay {
        /// Token id as printed by token-new
        token_id: String,
    },
}

/// Who is invoking and from where.
#[derive(Args, Debug, Clone)]
pub struct Origin {
    /// Invoking username
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Channel name
    #[arg(long, default_value = "cli")]
    pub channel: String,

    /// Treat the invocation as a direct message
    #[arg(long)]
    pub im: bool,
}

impl Origin {
    pub fn request(&self) -> Request {
        Request {
            username: self.user.clone(),
            user_id: self.user.clone(),
            user_link: self.user.clone(),
            channel: self.channel.clone(),
            channel_id: self.channel.clone(),
            channel_link: format!("#{}", self.channel),
            is_im: self.im,
            ..Request::default()
        }
    }
}
