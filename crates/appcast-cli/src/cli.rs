//! CLI command definitions and argument parsing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use appcast::codec::{read_file_async, write_file_async};
use appcast::signature::parse_public_key;
use appcast::{
    CodecKind, Configuration, DataDownloader, Ed25519Signer, Ed25519Verifier, FileConfiguration,
    HttpDownloader, InMemoryConfiguration, JsonCodec, LocalFileDownloader, ManifestCodec,
    ReleaseNotesFetcher, SecurityMode, SemVerLike, SignatureVerificationResult, SignatureVerifier,
    UpdateConfig, UpdateResolver, UpdateStatus, XmlCodec,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::config::{self, CliOverrides};
use crate::output::{
    CheckOutput, CompareOutput, ConvertOutput, KeyPairOutput, NotesOutput, OutputFormat,
    OutputFormatter, SignatureOutput, VerifyOutput,
};
use crate::ExitCode;

/// appcast CLI - app cast update client
#[derive(Parser, Debug)]
#[command(name = "appcast")]
#[command(version, about = "appcast CLI - check, convert, sign, and verify app casts")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (per-item filtering decisions)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "APPCAST_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command with the default configuration file
    pub async fn execute(self) -> anyhow::Result<ExitCode> {
        let config = config::load_default().unwrap_or_default();
        self.execute_with_config(config).await
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: UpdateConfig) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output, self.verbose);
        match self.command {
            Commands::Check(args) => args.execute(&formatter, config).await,
            Commands::Convert(args) => args.execute(&formatter).await,
            Commands::Sign(args) => args.execute(&formatter),
            Commands::Verify(args) => args.execute(&formatter),
            Commands::Keygen(args) => args.execute(&formatter),
            Commands::Compare(args) => args.execute(&formatter),
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check an app cast for updates
    Check(CheckArgs),
    /// Convert an app cast between RSS and JSON
    Convert(ConvertArgs),
    /// Sign a file with an Ed25519 secret key
    Sign(SignArgs),
    /// Verify a file signature
    Verify(VerifyArgs),
    /// Generate an Ed25519 key pair
    Keygen(KeygenArgs),
    /// Compare two version strings
    Compare(CompareArgs),
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// App cast URL or path (overrides `appcast_url` from the config)
    #[arg(long)]
    pub url: Option<String>,

    /// Installed version
    #[arg(long)]
    pub installed: String,

    /// Application name used in logs
    #[arg(long, default_value = "appcast")]
    pub app: String,

    /// Channel to search besides stable (can be specified multiple times)
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Version the user chose to skip
    #[arg(long)]
    pub skip: Option<String>,

    /// Security mode: strict, use-if-possible, or unsafe
    #[arg(long)]
    pub mode: Option<SecurityMode>,

    /// Pinned public key (`ed25519:<hex_or_base64>`)
    #[arg(long)]
    pub public_key: Option<String>,

    /// Offer items for every operating system
    #[arg(long)]
    pub all_platforms: bool,

    /// Persist skipped version and check time in this file
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Only check if the configured interval has passed since the last check
    #[arg(long, requires = "state")]
    pub if_due: bool,

    /// Fetch release notes of every candidate
    #[arg(long)]
    pub notes: bool,
}

impl CheckArgs {
    pub async fn execute(self, formatter: &OutputFormatter, config: UpdateConfig) -> anyhow::Result<ExitCode> {
        let overrides = CliOverrides {
            appcast_url: self.url.clone(),
            channels: self.channels.clone(),
            mode: self.mode,
            public_key: self.public_key.clone(),
            all_platforms: self.all_platforms,
        };
        let config = config::with_overrides(config, &overrides);

        if self.installed.trim().is_empty() {
            println!(
                "{}",
                formatter.format_error(ExitCode::InvalidInput, "--installed must not be empty")
            );
            return Ok(ExitCode::InvalidInput);
        }

        let configuration: Arc<dyn Configuration> = match &self.state {
            Some(path) => Arc::new(FileConfiguration::load(path.clone(), &self.app, &self.installed)?),
            None => Arc::new(InMemoryConfiguration::new(&self.app, &self.installed)),
        };
        if let Some(skip) = &self.skip {
            configuration.set_version_to_skip(Some(skip))?;
        }

        if self.if_due && !appcast::is_check_due(&configuration.snapshot(), config.check_interval()) {
            formatter.progress("Last check is recent, skipping");
            info!(app = %self.app, "Update check not due");
            return Ok(ExitCode::Success);
        }

        let resolver = match UpdateResolver::from_config(&config, configuration) {
            Ok(resolver) => resolver,
            Err(e) => {
                println!(
                    "{}",
                    formatter.format_error(ExitCode::InvalidInput, &e.to_string())
                );
                return Ok(ExitCode::InvalidInput);
            }
        };

        // Ctrl-C aborts the running download.
        let token = resolver.cancellation_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        formatter.progress(&format!("Checking {}", resolver.appcast_url()));
        let check = resolver.check_for_updates().await;
        let mut output = CheckOutput::new(&self.installed, &check);

        if self.notes && !check.items.is_empty() {
            formatter.progress("Fetching release notes");
            let fetcher = ReleaseNotesFetcher::new(
                downloader_for(resolver.appcast_url(), &config)?,
                Arc::new(config.security.verifier()?),
            );
            output.release_notes = fetcher
                .fetch_all(&check.items)
                .await
                .iter()
                .map(NotesOutput::from)
                .collect();
        }
        ctrl_c.abort();

        println!("{}", formatter.format_check(&output));
        Ok(match check.status {
            UpdateStatus::CouldNotDetermine => ExitCode::CouldNotDetermine,
            _ => ExitCode::Success,
        })
    }
}

/// Downloader for links found in an app cast loaded from `appcast_url`.
fn downloader_for(appcast_url: &str, config: &UpdateConfig) -> anyhow::Result<Arc<dyn DataDownloader>> {
    if appcast_url.starts_with("http://") || appcast_url.starts_with("https://") {
        Ok(Arc::new(HttpDownloader::with_config(&config.network.downloader_config())?))
    } else {
        Ok(Arc::new(LocalFileDownloader::new()))
    }
}

/// Arguments for the convert command
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Input app cast (format from extension, or detected from content)
    pub input: PathBuf,

    /// Output file (`.xml`, `.rss`, or `.json`)
    pub output: PathBuf,

    /// Write without indentation
    #[arg(long)]
    pub compact: bool,
}

impl ConvertArgs {
    pub async fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let Some(to) = CodecKind::from_path(&self.output) else {
            println!(
                "{}",
                formatter.format_error(
                    ExitCode::InvalidInput,
                    &format!(
                        "Cannot tell output format from {}; use .xml, .rss or .json",
                        self.output.display()
                    )
                )
            );
            return Ok(ExitCode::InvalidInput);
        };

        let from = match CodecKind::from_path(&self.input) {
            Some(kind) => kind,
            None => CodecKind::sniff(&tokio::fs::read(&self.input).await?),
        };
        debug!(%from, %to, input = ?self.input, "Converting app cast");

        let manifest = match read_file_async(from.codec().as_ref(), &self.input).await {
            Ok(manifest) => manifest,
            Err(e) => {
                println!(
                    "{}",
                    formatter.format_error(ExitCode::InvalidInput, &e.to_string())
                );
                return Ok(ExitCode::InvalidInput);
            }
        };

        let writer: Box<dyn ManifestCodec> = match (to, self.compact) {
            (CodecKind::Xml, true) => Box::new(XmlCodec::compact()),
            (CodecKind::Json, true) => Box::new(JsonCodec::compact()),
            (kind, false) => kind.codec(),
        };
        write_file_async(writer.as_ref(), &manifest, &self.output).await?;

        println!(
            "{}",
            formatter.format_conversion(&ConvertOutput {
                input: self.input.display().to_string(),
                output: self.output.display().to_string(),
                from: from.to_string(),
                to: to.to_string(),
                items: manifest.items.len(),
            })
        );
        Ok(ExitCode::Success)
    }
}

/// Arguments for the sign command
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// File to sign
    pub file: PathBuf,

    /// Secret key (`ed25519:<hex_or_base64>`) or a file containing it
    #[arg(long, env = "APPCAST_SECRET_KEY", hide_env_values = true)]
    pub key: String,
}

impl SignArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let signer = match load_signer(&self.key) {
            Ok(signer) => signer,
            Err(e) => {
                println!(
                    "{}",
                    formatter.format_error(ExitCode::InvalidInput, &e.to_string())
                );
                return Ok(ExitCode::InvalidInput);
            }
        };
        let data = std::fs::read(&self.file)?;
        println!(
            "{}",
            formatter.format_signature(&SignatureOutput {
                file: self.file.display().to_string(),
                signature: signer.sign(&data),
            })
        );
        Ok(ExitCode::Success)
    }
}

fn load_signer(key: &str) -> Result<Ed25519Signer, appcast::UpdateError> {
    let path = Path::new(key);
    if path.is_file() {
        Ed25519Signer::from_key_file(path)
    } else {
        Ed25519Signer::from_secret_key_str(key)
    }
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// File to verify
    pub file: PathBuf,

    /// Base64 signature
    #[arg(long)]
    pub signature: Option<String>,

    /// Public key (`ed25519:<hex_or_base64>`)
    #[arg(long)]
    pub public_key: Option<String>,

    /// Security mode: strict, use-if-possible, or unsafe
    #[arg(long, default_value = "strict")]
    pub mode: SecurityMode,
}

impl VerifyArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let verifier = match self.public_key.as_deref().map(parse_public_key).transpose() {
            Ok(Some(key)) => Ed25519Verifier::with_key(self.mode, key),
            Ok(None) => Ed25519Verifier::without_key(self.mode),
            Err(e) => {
                println!(
                    "{}",
                    formatter.format_error(ExitCode::InvalidInput, &e.to_string())
                );
                return Ok(ExitCode::InvalidInput);
            }
        };

        let result = verifier.verify_file(self.signature.as_deref(), &self.file)?;
        println!(
            "{}",
            formatter.format_verification(&VerifyOutput {
                file: self.file.display().to_string(),
                mode: self.mode,
                result,
            })
        );
        Ok(match result {
            SignatureVerificationResult::Invalid => ExitCode::VerificationFailed,
            SignatureVerificationResult::Valid | SignatureVerificationResult::Unchecked => {
                ExitCode::Success
            }
        })
    }
}

/// Arguments for the keygen command
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Write `<name>.pub` and `<name>.key` instead of printing the keys
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl KeygenArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let signer = Ed25519Signer::generate();
        let keys = KeyPairOutput {
            public_key: signer.public_key_string(),
            secret_key: signer.secret_key_string(),
        };

        match self.out {
            Some(base) => {
                let public_path = base.with_extension("pub");
                let secret_path = base.with_extension("key");
                if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&public_path, &keys.public_key)?;
                std::fs::write(&secret_path, &keys.secret_key)?;
                formatter.warning(&format!("Keep {} private", secret_path.display()));
                println!(
                    "{}",
                    formatter.format_key_pair(&KeyPairOutput {
                        public_key: keys.public_key,
                        secret_key: secret_path.display().to_string(),
                    })
                );
            }
            None => println!("{}", formatter.format_key_pair(&keys)),
        }
        Ok(ExitCode::Success)
    }
}

/// Arguments for the compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// First version
    pub a: String,
    /// Second version
    pub b: String,
}

impl CompareArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let ordering = SemVerLike::parse(&self.a).cmp(&SemVerLike::parse(&self.b));
        println!(
            "{}",
            formatter.format_comparison(&CompareOutput::new(&self.a, &self.b, ordering))
        );
        Ok(ExitCode::Success)
    }
}
