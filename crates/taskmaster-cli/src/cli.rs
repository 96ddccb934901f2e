use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "taskmaster")]
#[command(about = "AI assistant for task breakdown and prioritisation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default ~/.taskmaster/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Inference log database (overrides config)")]
    pub database: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "TASKMASTER_USER",
        help = "User the inference log entries belong to"
    )]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Break a task down into subtasks with time estimates")]
    Breakdown {
        #[arg(long, help = "Task title (5-255 characters)")]
        title: String,

        #[arg(long, default_value = "", help = "Task description")]
        description: String,

        #[arg(long, help = "Task the suggestion is for")]
        task_id: Option<Uuid>,
    },

    #[command(about = "Suggest a priority for a task")]
    Priority {
        #[arg(long, help = "Task title (5-255 characters)")]
        title: String,

        #[arg(long, default_value = "", help = "Task description")]
        description: String,

        #[arg(long, help = "Due date as YYYY-MM-DD (default today)")]
        due_date: Option<NaiveDate>,

        #[arg(long, help = "Task the suggestion is for")]
        task_id: Option<Uuid>,
    },

    #[command(about = "Accept or reject a previous suggestion")]
    Feedback {
        #[arg(long, help = "Inference log entry id")]
        id: Uuid,

        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        accept: bool,

        #[arg(long)]
        reject: bool,

        #[arg(long, help = "Free-text comment")]
        comment: Option<String>,
    },

    #[command(about = "Show recent inference log entries")]
    Logs {
        #[arg(long, default_value_t = 20, help = "Maximum number of entries")]
        limit: usize,
    },

    #[command(about = "Manage model versions")]
    Models {
        #[command(subcommand)]
        action: ModelCommands,
    },

    #[command(about = "Manage the configuration file")]
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ModelCommands {
    #[command(about = "Register an inactive model version")]
    Register {
        #[arg(long, help = "Model identifier, e.g. openai/gpt-4o")]
        name: String,

        #[arg(long, help = "Version label")]
        version: String,

        #[arg(long, help = "Configuration snapshot as JSON")]
        model_config: Option<String>,

        #[arg(long, help = "Evaluation metrics as JSON")]
        metrics: Option<String>,
    },

    #[command(about = "Make a version the active one for its model")]
    Activate {
        #[arg(long, help = "Model version id")]
        id: Uuid,
    },

    #[command(about = "List registered versions")]
    List {
        #[arg(long, help = "Only versions of this model")]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Write the default configuration file")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}
