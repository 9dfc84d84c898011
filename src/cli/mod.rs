use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::config::ROOT_ENV;
use crate::constants::database::SUPERUSER;
use crate::constants::engine::ENV_OVERRIDE;
use crate::service::Action;

#[derive(Parser)]
#[command(name = "vires")]
#[command(author, version, about = "Operate a VirES for Swarm deployment", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Container root holding the deployment configuration
    #[arg(long, global = true, env = ROOT_ENV)]
    pub root: Option<PathBuf>,

    /// Container engine (podman, docker or a path to either)
    #[arg(long, global = true, env = ENV_OVERRIDE)]
    pub engine: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the container of an image
    Container {
        /// Image name (a directory of the container root)
        image: String,

        /// Lifecycle action
        #[arg(value_enum)]
        action: Action,

        /// Arguments passed on to logs, exec or run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Create (if needed) and start the container of an image
    Start { image: String },

    /// Stop the container of an image
    Stop { image: String },

    /// Build an image
    Build { image: String },

    /// Pull an image from its registry
    Pull { image: String },

    /// Push an image to its registry
    Push { image: String },

    /// Bring the whole pod up or down
    Pod {
        #[command(subcommand)]
        command: PodCommands,
    },

    /// Print the resolved configuration of an image
    Config {
        image: String,

        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Generate a database credentials file
    Secrets {
        /// Output file
        file: PathBuf,

        /// Database name
        #[arg(long)]
        name: String,

        /// Database owner
        #[arg(long)]
        user: String,

        /// Extensions to create in the database
        #[arg(long, value_delimiter = ',')]
        extensions: Vec<String>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create a database and its owner from credentials read on stdin
    CreateDb {
        /// Drop and recreate an existing database
        #[arg(long)]
        force: bool,

        /// pg_hba.conf to restrict (default $PGDATA/pg_hba.conf)
        #[arg(long)]
        pg_hba: Option<PathBuf>,

        /// psql executable
        #[arg(long, default_value = "psql")]
        psql: PathBuf,

        /// Role psql connects as
        #[arg(long, default_value = SUPERUSER)]
        superuser: String,
    },

    /// Drop a database role and optionally its database
    DropDbUser {
        user: String,

        /// Database to drop with the role
        #[arg(long)]
        database: Option<String>,

        /// pg_hba.conf to update (default $PGDATA/pg_hba.conf)
        #[arg(long)]
        pg_hba: Option<PathBuf>,

        /// psql executable
        #[arg(long, default_value = "psql")]
        psql: PathBuf,

        /// Role psql connects as
        #[arg(long, default_value = SUPERUSER)]
        superuser: String,
    },

    /// Restrict access to a database in a pg_hba.conf file
    PgHba {
        file: PathBuf,

        #[arg(long)]
        database: String,

        /// Owning role; required unless --remove
        #[arg(long, required_unless_present = "remove")]
        user: Option<String>,

        /// Remove the database's access rules instead
        #[arg(long)]
        remove: bool,

        /// Role keeping local access to the database
        #[arg(long, default_value = SUPERUSER)]
        superuser: String,
    },

    /// Split a product status stream: selected files to stdout, the rest to stderr
    FilterStatus,

    /// Register new or updated product files
    Register {
        collection: String,

        /// Product files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// File name pattern (default from the collection settings)
        #[arg(long)]
        pattern: Option<String>,

        /// Only print the files that would be registered
        #[arg(long)]
        dry_run: bool,
    },

    /// Update a cached product from a file
    CachedProduct {
        /// Cached product type
        product_type: String,
        file: PathBuf,
    },

    /// Render a Jinja2 template with the environment and parameter files
    RenderTemplate {
        /// Template file, `-` for stdin
        template: PathBuf,

        /// KEY=VALUE parameter files applied in order, `-` for stdin
        params: Vec<PathBuf>,
    },

    /// Print a systemd unit running the container of an image
    SystemdUnit {
        image: String,

        /// Write the unit to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Images whose units must start first
        #[arg(long)]
        after: Vec<String>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum PodCommands {
    /// Start the database, bootstrap it and start the services
    Up,
    /// Stop the services and the database
    Down,
}
