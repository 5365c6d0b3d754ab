mod output;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};
use clap::{ArgAction, Parser, Subcommand};
use ipk_core::{
    BuildOptions, EntryCollector, Extractor, Listing, Ownership, PackageBuilder, SystemResolver,
};
use output::{CreateOutput, ExtractOutput, OutputFormat, Reporter, ViewOutput};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type Stdio = Reporter<io::Stdout, io::Stderr>;

/// ipk - build, extract and inspect ipk packages
#[derive(Parser)]
#[command(name = "ipk")]
#[command(about = "Build, extract and inspect ipk packages", long_about = None)]
#[command(version)]
struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a package from a directory
    Create {
        /// Package file to write
        output: PathBuf,

        /// Directory to package; its CONTROL subdirectory becomes control.tar.gz
        input: PathBuf,

        /// Override user ID
        #[arg(long)]
        uid: Option<u64>,

        /// Override user name
        #[arg(long)]
        uname: Option<String>,

        /// Override group ID
        #[arg(long)]
        gid: Option<u64>,

        /// Override group name
        #[arg(long)]
        gname: Option<String>,

        /// Archive directory contents in file name order
        #[arg(long)]
        sort: bool,
    },

    /// Extract a package into a directory
    Extract {
        /// Package file to read
        input: PathBuf,

        /// Destination directory (created if missing)
        output: PathBuf,
    },

    /// List the contents of a package
    View {
        /// Package file to read
        input: PathBuf,

        /// Show modification times in UTC instead of local time
        #[arg(long)]
        utc: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::debug!("parsed command: {:?}", cli.command);

    let mut output = Reporter::stdio(OutputFormat::from_flag(cli.json));
    let result = match cli.command {
        Commands::Create {
            output: package,
            input,
            uid,
            uname,
            gid,
            gname,
            sort,
        } => {
            let options = BuildOptions {
                ownership: Ownership {
                    uid,
                    uname,
                    gid,
                    gname,
                },
                sort_entries: sort,
            };
            cmd_create(&mut output, &package, &input, options)
        }
        Commands::Extract {
            input,
            output: dest,
        } => cmd_extract(&mut output, &input, &dest),
        Commands::View { input, utc } => cmd_view(&mut output, &input, utc),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(output.failure(&err)),
    }
}

/// Log to stderr; stdout is reserved for command output.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn cmd_create(
    output: &mut Stdio,
    package: &Path,
    input: &Path,
    options: BuildOptions,
) -> Result<()> {
    let resolver = SystemResolver;
    let builder =
        PackageBuilder::new(options, &resolver).context("Failed to resolve ownership override")?;

    builder
        .build_file(input, package)
        .with_context(|| format!("Failed to create {} from {}", package.display(), input.display()))?;

    let data = CreateOutput {
        success: true,
        result_code: 0,
        package: package.display().to_string(),
        input: input.display().to_string(),
    };
    output.success(&data, String::new)
}

fn cmd_extract(output: &mut Stdio, input: &Path, dest: &Path) -> Result<()> {
    Extractor::new(dest)
        .extract_file(input)
        .with_context(|| format!("Failed to extract {} to {}", input.display(), dest.display()))?;

    let data = ExtractOutput {
        success: true,
        result_code: 0,
        package: input.display().to_string(),
        destination: dest.display().to_string(),
    };
    output.success(&data, String::new)
}

fn cmd_view(output: &mut Stdio, input: &Path, utc: bool) -> Result<()> {
    let open = || -> Result<BufReader<File>> {
        let file =
            File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        Ok(BufReader::new(file))
    };

    if output.format() == OutputFormat::Json {
        let entries = EntryCollector::collect(open()?)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let data = ViewOutput {
            success: true,
            result_code: 0,
            package: input.display().to_string(),
            entries,
        };
        return output.success(&data, String::new);
    }

    let source = open()?;
    let listed = if utc {
        list(source, Utc)
    } else {
        list(source, Local)
    };
    listed.with_context(|| format!("Failed to read {}", input.display()))
}

fn list<Tz>(source: BufReader<File>, tz: Tz) -> ipk_core::Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stdout = io::stdout();
    Listing::new(stdout.lock(), tz).list(source)
}
