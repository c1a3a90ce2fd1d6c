use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// chatline - talk to game counterparts from the terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "chatline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file (defaults to ~/.chatline/config.yml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Chat surface to use: direct or messenger
    #[arg(short, long, default_value = "direct")]
    pub surface: String,

    /// Authenticated actor id. Without one every call fails closed.
    #[arg(short, long, env = "CHATLINE_ACTOR")]
    pub actor: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List contacts
    Contacts,

    /// Add a contact (kept unchanged if the id already exists)
    AddContact {
        id: String,
        name: String,

        /// Use the scripted counterpart profile instead of the default one
        #[arg(long)]
        scripted: bool,
    },

    /// Show the newest page of a conversation, or the page before a cursor
    History {
        id: String,

        #[arg(long)]
        before: Option<String>,
    },

    /// Send a message and print the reply
    Send { id: String, text: String },

    /// Load the next older page of a conversation already shown
    More { id: String },

    /// Check that the configured provider is reachable
    Check,
}
