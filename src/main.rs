use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vires_deploy::{
    cli::{Cli, Commands, PodCommands},
    config::{resolve_root, Deployment},
    database::{hba, Bootstrap, CreateOutcome, Psql},
    engine::{self, CliEngine, ContainerEngine},
    register::{self, Registrar},
    secrets::{self, DbCredentials},
    service::{Action, ImageService, Lifecycle, PodSequencer},
    systemd, template,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging to stderr; stdout carries command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(engine::exit_status(&err))
        }
    }
}

/// Engine and deployment shared by the container commands
struct Target {
    engine: CliEngine,
    deployment: Deployment,
}

impl Target {
    fn open(root: Option<PathBuf>, engine: Option<&str>) -> Result<Self> {
        let engine = CliEngine::detect(engine)?;
        let root = resolve_root(root);
        let deployment = Deployment::load(&root, engine.kind())
            .with_context(|| format!("Failed to load configuration from {}", root.display()))?;
        Ok(Self { engine, deployment })
    }

    fn lifecycle(&self, image: &str, action: Action, args: &[String]) -> Result<()> {
        let image = self.deployment.image(image)?;
        Lifecycle::new(&self.engine, &image).dispatch(action, args)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Cli {
        command,
        root,
        engine,
        ..
    } = cli;
    let open = || Target::open(root.clone(), engine.as_deref());

    match command {
        Commands::Container {
            image,
            action,
            args,
        } => open()?.lifecycle(&image, action, &args)?,
        Commands::Start { image } => open()?.lifecycle(&image, Action::Start, &[])?,
        Commands::Stop { image } => open()?.lifecycle(&image, Action::Stop, &[])?,
        Commands::Build { image } => {
            let target = open()?;
            ImageService::build(&target.engine, &target.deployment.image(&image)?)?;
        }
        Commands::Pull { image } => {
            let target = open()?;
            ImageService::pull(&target.engine, &target.deployment.image(&image)?)?;
        }
        Commands::Push { image } => {
            let target = open()?;
            ImageService::push(&target.engine, &target.deployment.image(&image)?)?;
        }
        Commands::Pod { command } => {
            let target = open()?;
            // engine calls and readiness waits block, keep them off the async workers
            tokio::task::spawn_blocking(move || {
                let sequencer = PodSequencer::new(&target.engine, &target.deployment);
                match command {
                    PodCommands::Up => sequencer.up(),
                    PodCommands::Down => sequencer.down(),
                }
            })
            .await
            .context("Pod sequence task failed")??;
        }
        Commands::Config { image, json } => {
            let target = open()?;
            let descriptor = target.deployment.image(&image)?;
            let output = if json {
                serde_json::to_string_pretty(&descriptor)? + "\n"
            } else {
                toml::to_string(&descriptor).context("Failed to serialize configuration")?
            };
            print!("{}", output);
        }
        Commands::Secrets {
            file,
            name,
            user,
            extensions,
            force,
        } => {
            secrets::ensure_file(&file, &name, &user, extensions, force)?;
        }
        Commands::CreateDb {
            force,
            pg_hba,
            psql,
            superuser,
        } => {
            let credentials = DbCredentials::parse(std::io::stdin().lock())
                .context("Failed to read credentials from stdin")?;
            let runner = Psql::new(psql, &superuser);
            let bootstrap = Bootstrap::new(&runner, pg_hba.or_else(Bootstrap::default_pg_hba));
            if bootstrap.create(&credentials, force)? == CreateOutcome::Created {
                info!("Database {} is ready", credentials.name);
            }
        }
        Commands::DropDbUser {
            user,
            database,
            pg_hba,
            psql,
            superuser,
        } => {
            let runner = Psql::new(psql, &superuser);
            Bootstrap::new(&runner, pg_hba.or_else(Bootstrap::default_pg_hba))
                .drop_user(&user, database.as_deref())?;
        }
        Commands::PgHba {
            file,
            database,
            user,
            remove,
            superuser,
        } => {
            let user = if remove { None } else { user.as_deref() };
            if !hba::edit_file(&file, &database, user, &superuser)? {
                info!("{} is already up to date", file.display());
            }
        }
        Commands::FilterStatus => {
            let stdin = std::io::stdin();
            register::filter_status(
                stdin.lock(),
                &mut std::io::stdout().lock(),
                &mut std::io::stderr().lock(),
            )?;
        }
        Commands::Register {
            collection,
            paths,
            pattern,
            dry_run,
        } => {
            let target = open()?;
            Registrar::new(&target.engine, &target.deployment).register(
                &collection,
                &paths,
                pattern.as_deref(),
                dry_run,
                &mut std::io::stdout().lock(),
                &mut std::io::stderr().lock(),
            )?;
        }
        Commands::CachedProduct { product_type, file } => {
            let target = open()?;
            Registrar::new(&target.engine, &target.deployment).cached_product(&product_type, &file)?;
        }
        Commands::RenderTemplate {
            template: source,
            params,
        } => {
            let context = template::context(template::environment(), &params)?;
            let rendered = template::render(&template::read_template(&source)?, &context)?;
            println!("{}", rendered);
        }
        Commands::SystemdUnit {
            image,
            output,
            after,
        } => {
            let target = open()?;
            let descriptor = target.deployment.image(&image)?;
            let unit = systemd::unit(&descriptor, target.engine.program(), &after)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &unit)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {}", path.display());
                }
                None => std::io::stdout().write_all(unit.as_bytes())?,
            }
        }
        Commands::Version => {
            println!("vires {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
