mod render;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use bakehouse_core::{BakehouseError, HostPlatform, Manifest};
use bakehouse_installer::{
    default_user_prefix, error_kind, InstallOptions, Lifecycle, OperationReport, PrefixLayout,
    SystemPathProbe, SystemProcessRunner,
};
use bakehouse_registry::RegistryStore;
use clap::{CommandFactory, Parser, Subcommand};

use render::{current_output_style, OutputStyle, ProgressFetch};

#[derive(Parser, Debug)]
#[command(name = "bakehouse")]
#[command(about = "Installs packages from registered bakeries", long_about = None)]
struct Cli {
    /// Override the bakehouse prefix directory
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install packages (a package may be `name` or `name>=minver`)
    Install {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Skip the automatic bakery refresh
        #[arg(long)]
        no_refresh: bool,
        /// Do not install declared dependencies
        #[arg(long)]
        ignore_dependencies: bool,
    },
    /// Update packages; with no arguments, update everything
    Update {
        packages: Vec<String>,
        /// Skip the automatic bakery refresh
        #[arg(long)]
        no_refresh: bool,
    },
    /// Remove installed packages
    #[command(alias = "uninstall")]
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show package details
    Info {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Publish package executables into the shared bin directory
    Link {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Replace links that already exist
        #[arg(long)]
        force: bool,
    },
    /// Retract package executables from the shared bin directory
    Unlink {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Manage registered bakeries
    Bakery {
        #[command(subcommand)]
        command: BakeryCommands,
    },
    /// Refresh all bakeries
    Refresh,
    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand, Debug)]
enum BakeryCommands {
    /// Register bakeries (git URL, `owner/repo` shorthand, or `name:path`)
    Add {
        #[arg(required = true)]
        bakeries: Vec<String>,
    },
    /// Remove registered bakeries
    Remove {
        #[arg(required = true)]
        bakeries: Vec<String>,
    },
    /// Refresh all bakeries
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Install,
    Update,
    Remove,
    Info,
    Link,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let style = current_output_style();
    let cli = Cli::parse();
    match run(cli, style) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            render::error(style, &format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, style: OutputStyle) -> Result<bool> {
    let prefix = match cli.prefix {
        Some(prefix) => prefix,
        None => default_user_prefix()?,
    };
    let layout = PrefixLayout::new(&prefix);
    let store = RegistryStore::new(&prefix);
    let host = HostPlatform::detect();
    let fetch = ProgressFetch::new(style);
    let runner = SystemProcessRunner;
    let probe = SystemPathProbe;
    let lifecycle = Lifecycle::new(&layout, &store, host, &fetch, &runner, &probe);

    match cli.command {
        Commands::Install {
            packages,
            no_refresh,
            ignore_dependencies,
        } => {
            if !no_refresh {
                refresh_bakeries(&store, style, true)?;
            }
            let options = InstallOptions {
                ignore_dependencies,
                force_links: false,
            };

            let mut ok = true;
            for package in &packages {
                render::status(style, &format!("Installing {package}..."));
                match lifecycle.install(package, options) {
                    Ok(report) => {
                        report_details(style, package, &report);
                        render::success(style, &format!("{package} installed!"));
                    }
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Install));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Update {
            packages,
            no_refresh,
        } => {
            let update_everything =
                packages.is_empty() || packages.iter().any(|package| package == "all");
            if update_everything {
                refresh_bakeries(&store, style, false)?;
                render::status(style, "Updating packages...");

                let mut ok = true;
                for outcome in lifecycle.update_all()? {
                    match &outcome.result {
                        Ok(_) => {
                            render::success(style, &format!("{} updated!", outcome.package));
                        }
                        Err(err)
                            if matches!(
                                error_kind(err),
                                Some(BakehouseError::AlreadyInstalled(_))
                            ) =>
                        {
                            render::dim(
                                style,
                                &format!("{} is already up to date.", outcome.package),
                            );
                        }
                        Err(err) => {
                            ok = false;
                            render::error(
                                style,
                                &describe_failure(&outcome.package, err, Verb::Update),
                            );
                        }
                    }
                }
                return Ok(ok);
            }

            if !no_refresh {
                refresh_bakeries(&store, style, true)?;
            }
            let mut ok = true;
            for package in &packages {
                render::status(style, &format!("Updating {package}..."));
                match lifecycle.update(package) {
                    Ok(report) => {
                        report_details(style, package, &report);
                        render::success(style, &format!("{package} updated!"));
                    }
                    Err(err)
                        if matches!(
                            error_kind(&err),
                            Some(BakehouseError::AlreadyInstalled(_))
                        ) =>
                    {
                        render::success(style, &format!("{package} is already up to date."));
                    }
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Update));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Remove { packages } => {
            let mut ok = true;
            for package in &packages {
                render::status(style, &format!("Removing {package}..."));
                match lifecycle.remove(package) {
                    Ok(_) => render::success(style, &format!("Removed {package}!")),
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Remove));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Info { packages } => {
            let mut ok = true;
            for package in &packages {
                match lifecycle.get_info(package) {
                    Ok(manifest) => print_info(style, package, &manifest, host),
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Info));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Link { packages, force } => {
            let mut ok = true;
            for package in &packages {
                render::status(style, &format!("Linking {package}..."));
                match lifecycle.link(package, force) {
                    Ok(report) => {
                        report_skipped_links(style, package, &report.skipped);
                        render::success(style, &format!("Linked {package}!"));
                    }
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Link));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Unlink { packages } => {
            let mut ok = true;
            for package in &packages {
                render::status(style, &format!("Unlinking {package}..."));
                match lifecycle.unlink(package) {
                    Ok(()) => render::success(style, &format!("Unlinked {package}!")),
                    Err(err) => {
                        ok = false;
                        render::error(style, &describe_failure(package, &err, Verb::Link));
                    }
                }
            }
            Ok(ok)
        }
        Commands::Bakery { command } => run_bakery_command(&store, style, command),
        Commands::Refresh => {
            refresh_bakeries(&store, style, false)?;
            Ok(true)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "bakehouse",
                &mut std::io::stdout(),
            );
            Ok(true)
        }
    }
}

fn run_bakery_command(
    store: &RegistryStore,
    style: OutputStyle,
    command: BakeryCommands,
) -> Result<bool> {
    match command {
        BakeryCommands::Add { bakeries } => {
            let mut ok = true;
            for spec in &bakeries {
                let Some((name, location)) = parse_bakery_spec(spec) else {
                    ok = false;
                    render::error(style, &format!("cannot tell how to add '{spec}'"));
                    continue;
                };
                render::status(style, &format!("Adding {name}..."));
                store.add_bakery(&name, &location)?;
                render::success(style, &format!("Bakery {name} added!"));
            }
            Ok(ok)
        }
        BakeryCommands::Remove { bakeries } => {
            let mut ok = true;
            for spec in &bakeries {
                let Some((name, _location)) = parse_bakery_spec(spec) else {
                    ok = false;
                    render::error(style, &format!("cannot tell how to remove '{spec}'"));
                    continue;
                };
                render::status(style, &format!("Removing {name}..."));
                match store.remove_bakery(&name) {
                    Ok(()) => render::success(style, &format!("Bakery {name} removed!")),
                    Err(err)
                        if matches!(error_kind(&err), Some(BakehouseError::NotFound(_))) =>
                    {
                        ok = false;
                        render::error(style, &format!("{name} doesn't exist."));
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(ok)
        }
        BakeryCommands::Refresh => {
            refresh_bakeries(store, style, false)?;
            Ok(true)
        }
    }
}

fn refresh_bakeries(store: &RegistryStore, style: OutputStyle, auto: bool) -> Result<()> {
    let message = if auto {
        "Automatically refreshing bakeries..."
    } else {
        "Refreshing bakeries..."
    };
    render::status(style, message);

    let outcome = store.refresh()?;
    for shadowed in &outcome.shadowed {
        render::dim(
            style,
            &format!(
                "package '{}' in bakery '{}' is shadowed by '{}'",
                shadowed.package, shadowed.shadowed_in, shadowed.winner
            ),
        );
    }
    render::success(style, "Bakeries updated.");
    Ok(())
}

/// Normalize the forms a bakery argument may take: a full git URL, an
/// `owner/repo` GitHub shorthand, or `name:path` pointing at a local
/// repository.
fn parse_bakery_spec(spec: &str) -> Option<(String, String)> {
    let without_scheme = spec
        .strip_prefix("https://")
        .or_else(|| spec.strip_prefix("http://"))
        .or_else(|| spec.strip_prefix("git://"));
    if let Some(rest) = without_scheme {
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return None;
        }
        let name = segments[segments.len() - 2..].join("/");
        return Some((name.replace("bakehouse-", ""), spec.to_string()));
    }

    if !spec.contains(':') && spec.split('/').count() == 2 {
        return Some((
            spec.replace("bakehouse-", ""),
            format!("https://github.com/{spec}"),
        ));
    }

    if let Some((name, path)) = spec.split_once(':') {
        if !name.is_empty() && !path.is_empty() {
            return Some((name.replace("bakehouse-", ""), path.to_string()));
        }
    }

    None
}

fn report_details(style: OutputStyle, package: &str, report: &OperationReport) {
    report_skipped_links(style, package, &report.links.skipped);

    let failed = report
        .scripts
        .iter()
        .filter(|outcome| !outcome.succeeded)
        .count();
    if failed > 0 {
        render::dim(style, &format!("{failed} script(s) reported errors."));
    }
}

fn report_skipped_links(style: OutputStyle, package: &str, skipped: &[String]) {
    if !skipped.is_empty() {
        render::dim(
            style,
            &format!(
                "1 or more links already exist and were not linked. \
                 Use `bakehouse link --force {package}` to replace them."
            ),
        );
    }
}

fn print_info(style: OutputStyle, package: &str, manifest: &Manifest, host: HostPlatform) {
    let name = manifest.display_name().unwrap_or(package);
    let version = manifest.version().unwrap_or_default();
    render::heading(style, &format!("{name} {version}"));
    render::dim(
        style,
        manifest.description().unwrap_or("No description."),
    );
    if let Some(homepage) = manifest.homepage() {
        render::detail(style, &format!("Homepage: {homepage}"));
    }
    render::detail(
        style,
        &format!(
            "Version: {}",
            manifest.version().as_deref().unwrap_or("Unknown")
        ),
    );
    render::detail(
        style,
        &format!(
            "Version type: {}",
            manifest.version_type().unwrap_or("Unknown")
        ),
    );
    render::detail(
        style,
        &format!("License: {}", manifest.license().unwrap_or("Unknown")),
    );

    let architectures = manifest.architectures(host);
    let architectures = if architectures.is_empty() {
        "None".to_string()
    } else {
        architectures.join(", ")
    };
    render::success(style, &format!("Architectures: {architectures}"));
}

fn describe_failure(package: &str, err: &anyhow::Error, verb: Verb) -> String {
    match error_kind(err) {
        Some(BakehouseError::NotFound(what)) => match verb {
            Verb::Remove | Verb::Link => format!("{package} is not installed."),
            _ if what == package => format!("{package} could not be found."),
            _ => format!("{what} could not be found."),
        },
        Some(BakehouseError::AlreadyInstalled(_)) => format!(
            "{package} is already installed. \
             Run `bakehouse remove {package}` first to reinstall."
        ),
        Some(BakehouseError::DependedOn { dependants, .. }) => format!(
            "{package} is depended on by {} package(s): {}",
            dependants.len(),
            dependants.join(", ")
        ),
        Some(BakehouseError::UseNotFound(tool)) => format!(
            "{package} requires the external tool `{tool}`, which could not be found!"
        ),
        Some(BakehouseError::Locked) => format!(
            "{} If you are sure no other bakehouse process is running, delete the lock file.",
            BakehouseError::Locked
        ),
        Some(kind) => kind.to_string(),
        None => format!("{err:#}"),
    }
}
