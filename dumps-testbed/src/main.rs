use anyhow::{Context, Result};
use log::{info, LevelFilter};
use std::{
    env,
    path::{Path, PathBuf},
    process,
};
use structopt::StructOpt;

use backends::DockerBackend;
use components::ComponentType;
use controller::Controller;
use error::Error;
use frontends::YamlConfigFrontend;
use services::ConfigFrontend;

mod artifacts;
mod backends;
mod components;
mod config;
mod containers;
mod controller;
mod error;
mod frontends;
mod images;
mod labels;
mod models;
mod networks;
mod report;
mod services;
#[cfg(test)]
mod testing;

const DEFAULTS_FILE: &str = "default.conf";
const USER_FILE: &str = "docker-dumps.conf";
const CONTEXT_DIR: &str = "docker_helpers";

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dumps-testbed",
    about = "Builds and runs sets of containers for testing the xml/sql dumps."
)]
struct Opt {
    /// User configuration, merged over default.conf. Defaults to
    /// docker-dumps.conf next to default.conf, if present.
    #[structopt(short = "C", long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Show what would be done without touching any image, network or
    /// container.
    #[structopt(short = "D", long)]
    dry_run: bool,

    #[structopt(short, long)]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
struct Target {
    set: String,

    #[structopt(short, long)]
    /// Only act on this container type.
    name: Option<ComponentType>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Lists the containers and images of a set, or of every set.
    List { set: Option<String> },
    /// Builds the base images a set needs.
    Base {
        #[structopt(flatten)]
        target: Target,
    },
    /// Builds the final images of a set, and any missing base images.
    Build {
        #[structopt(flatten)]
        target: Target,
    },
    /// Builds what is missing and creates the containers of a set.
    Create {
        #[structopt(flatten)]
        target: Target,
    },
    /// Creates what is missing and starts the containers of a set.
    Start {
        #[structopt(flatten)]
        target: Target,
    },
    Stop {
        #[structopt(flatten)]
        target: Target,

        #[structopt(long)]
        /// Seconds each container gets to stop before it is killed.
        timeout: Option<u32>,
    },
    /// Stops and removes the containers of a set.
    Destroy {
        #[structopt(flatten)]
        target: Target,

        #[structopt(long)]
        /// Seconds each container gets to stop before it is killed.
        timeout: Option<u32>,
    },
    /// Destroys the containers of a set, then removes its network and final
    /// images.
    Remove {
        #[structopt(flatten)]
        target: Target,

        #[structopt(long)]
        /// Also remove this network if it belongs to the set.
        network: Option<String>,

        #[structopt(long)]
        /// Seconds each container gets to stop before it is killed.
        timeout: Option<u32>,
    },
    /// Removes every container, network, final and base image.
    Purge {
        #[structopt(short, long)]
        /// Remove every container, then only the base image of this
        /// container type.
        name: Option<ComponentType>,

        #[structopt(long)]
        /// Seconds each container gets to stop before it is killed.
        timeout: Option<u32>,
    },
    /// Purges, then removes the foundation image as well.
    PurgeAll {
        #[structopt(long)]
        /// Seconds each container gets to stop before it is killed.
        timeout: Option<u32>,
    },
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();

    match env::var("LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) if verbose => {
            builder.filter_level(LevelFilter::Info);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Error);
        }
    }

    builder.init();
}

fn find_work_directory<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    path.as_ref()
        .ancestors()
        .find(|path| path.join(DEFAULTS_FILE).is_file())
        .map(Path::to_path_buf)
}

fn main() {
    let opt = Opt::from_args();
    init_logging(opt.verbose);

    if let Err(err) = run(opt) {
        report::failure(&format!("{:#}", err));

        let errors = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<Error>())
            .collect::<Vec<_>>();

        for error in errors.iter() {
            if let Error::BuildFailed { log, .. } = error {
                for line in log.iter() {
                    eprintln!("  {}", line);
                }
            }
        }

        let code = if errors.iter().any(|error| error.is_configuration()) {
            2
        } else {
            1
        };
        process::exit(code);
    }
}

fn run(opt: Opt) -> Result<()> {
    let current_dir = env::current_dir()?;
    let work_directory = find_work_directory(&current_dir).ok_or_else(|| {
        Error::Config(format!(
            "couldn't find {} in the current working directory or any of its parents",
            DEFAULTS_FILE
        ))
    })?;
    info!("found work directory {:?}", work_directory);

    env::set_current_dir(&work_directory)?;

    let user_path = match opt.config {
        Some(path) => Some(current_dir.join(path)),
        None => Some(work_directory.join(USER_FILE)).filter(|path| path.is_file()),
    };
    info!("user configuration {:?}", user_path);

    let mut frontend = YamlConfigFrontend::new();
    let configuration =
        frontend.configuration(&work_directory.join(DEFAULTS_FILE), user_path.as_deref())?;
    info!("parsed configuration");

    if opt.dry_run {
        report::info("Dry run: no images or containers will be acted upon");
    }

    let backend = DockerBackend::connect().context("connecting to docker")?;
    info!("connected to docker");

    let mut controller = Controller::init(
        backend,
        configuration,
        work_directory.join(CONTEXT_DIR),
        opt.dry_run,
    );

    match opt.command {
        Command::List { set } => {
            for line in controller.list(set.as_deref())? {
                println!("{}", line);
            }
        }
        Command::Base { target } => controller.base(&target.set, target.name)?,
        Command::Build { target } => controller.build(&target.set, target.name)?,
        Command::Create { target } => controller.create(&target.set, target.name)?,
        Command::Start { target } => controller.start(&target.set, target.name)?,
        Command::Stop { target, timeout } => controller.stop(&target.set, target.name, timeout)?,
        Command::Destroy { target, timeout } => {
            controller.destroy(&target.set, target.name, timeout)?
        }
        Command::Remove {
            target,
            network,
            timeout,
        } => controller.remove(&target.set, target.name, network.as_deref(), timeout)?,
        Command::Purge { name, timeout } => controller.purge(name, timeout)?,
        Command::PurgeAll { timeout } => controller.purge_all(timeout)?,
    }

    Ok(())
}
