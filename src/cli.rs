use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteAction {
    /// Create a note and embed it
    Add {
        /// Note title
        #[clap(short, long)]
        title: String,

        /// Topic slug, e.g. "descriptive-statistics"
        #[clap(long)]
        topic: Option<String>,

        /// Note body
        #[clap(short, long)]
        content: String,

        /// Curated key concepts, embedded in place of the body
        #[clap(short, long)]
        metadata: Option<String>,
    },
    /// Update a note. An empty --topic or --metadata clears it
    Update {
        id: String,

        #[clap(short, long)]
        title: Option<String>,

        #[clap(long)]
        topic: Option<String>,

        #[clap(short, long)]
        content: Option<String>,

        #[clap(short, long)]
        metadata: Option<String>,
    },
    /// Delete a note
    Delete {
        id: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
    /// List notes
    List {
        /// Only notes with this topic
        #[clap(long)]
        topic: Option<String>,
    },
    /// Print a single note
    Show { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Re-embed notes whose text changed since they were last embedded
    Reembed {
        /// Re-embed every note
        #[clap(short, long, default_value = "false")]
        force: bool,
    },

    /// Show raw retrieval scores for a query
    Search {
        query: String,

        /// Topic hint, e.g. "descriptive-statistics"
        #[clap(long)]
        topic: Option<String>,

        /// Number of notes to return
        #[clap(long)]
        top: Option<usize>,
    },

    /// Ask a question
    Ask {
        query: String,

        /// Topic hint, e.g. "descriptive-statistics"
        #[clap(long)]
        topic: Option<String>,

        /// Override the confidence threshold
        #[clap(long)]
        threshold: Option<f32>,

        /// Exercise text the question is about
        #[clap(long)]
        context: Option<String>,
    },

    /// Print recent answered questions
    Log {
        #[clap(short, long, default_value = "20")]
        limit: usize,
    },
}
