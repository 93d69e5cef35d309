use std::path::PathBuf;

use clap::Parser;

use deploy_git::config::{PartialOptions, load_stored_options};
use deploy_git::git::auth::{AcceptAnyCertificate, RemoteAuth};
use deploy_git::lock::default_lock_dir;
use deploy_git::{ConsoleReporter, DirectoryBuilder, Level, Pipeline, Reporter};

#[derive(Parser)]
#[command(
    name = "deploy-git",
    version,
    about = "Publish a built site to a branch of a remote git repository"
)]
struct Cli {
    /// Remote repository URL
    #[arg(short, long)]
    remote: Option<String>,

    /// Branch to deploy to
    #[arg(short, long)]
    branch: Option<String>,

    /// Commit message
    #[arg(short, long)]
    message: Option<String>,

    /// Publish into this subdirectory of the repository
    #[arg(short, long)]
    folder: Option<String>,

    /// Commit author name (requires --email)
    #[arg(short, long)]
    name: Option<String>,

    /// Commit author email (requires --name)
    #[arg(short, long)]
    email: Option<String>,

    /// Build output directory, relative to the project directory
    #[arg(long, default_value = "build")]
    source: PathBuf,

    /// Project directory [default: current directory]
    #[arg(short = 'C', long)]
    project_dir: Option<PathBuf>,

    /// Configuration file [default: <project-dir>/deploy-git.json]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Leave the workspace in place after the deployment
    #[arg(long)]
    keep_workspace: bool,

    /// Do not wait for other deployments to the same branch
    #[arg(long)]
    no_lock: bool,

    /// Accept any server certificate. Insecure.
    #[arg(long)]
    insecure_skip_certificate_check: bool,
}

impl Cli {
    fn overrides(&self) -> PartialOptions {
        PartialOptions {
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            message: self.message.clone(),
            folder: self.folder.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            keep_workspace: self.keep_workspace.then_some(true),
            ..PartialOptions::default()
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if run(&cli).is_err() {
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = ConsoleReporter;

    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().inspect_err(|e| {
            reporter.log(&format!("cannot read working directory: {}", e), Level::Error)
        })?,
    };

    let stored = load_stored_options(&project_dir, cli.config.as_deref())
        .inspect_err(|e| reporter.log(&e.to_string(), Level::Error))?;

    let mut auth = RemoteAuth::default();
    if cli.insecure_skip_certificate_check {
        log::warn!("certificate validation is disabled for this deployment");
        auth = auth.with_certificates(AcceptAnyCertificate);
    }

    let lock_dir = if cli.no_lock {
        None
    } else {
        let dir = default_lock_dir();
        if dir.is_none() {
            log::warn!("no cache directory available; deploying without a lock");
        }
        dir
    };

    let builder = DirectoryBuilder::new(&project_dir, &cli.source);
    let pipeline = Pipeline::new(&project_dir, builder, reporter)
        .with_auth(auth)
        .with_lock_dir(lock_dir);

    // Failures are reported by the pipeline itself.
    pipeline.run(&PartialOptions::defaults(), &stored, &cli.overrides())?;
    Ok(())
}
