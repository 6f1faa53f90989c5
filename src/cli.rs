// Command layer: the clap command tree plus one handler per subcommand.
// Handlers resolve inputs (credentials, default site, dates, format), make
// the remote calls and hand fully resolved records to the renderer.

use crate::api::{ApiClient, SubmissionResult};
use crate::config_store::{ConfigKey, ConfigStore};
use crate::credentials::CredentialStore;
use crate::error::{BwmError, Result, PARTIAL_FAILURE_EXIT_CODE};
use crate::index_status;
use crate::input::{self, DateRange};
use crate::output::{self, OutputFormat, Record};
use crate::paths::Settings;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "bwm", version, about = "Bing Webmaster CLI")]
pub struct Cli {
    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage API key authentication
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Site-level commands
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
    /// Traffic and ranking statistics
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
    /// URL index status and submission
    Url {
        #[command(subcommand)]
        command: UrlCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Store an API key locally for future calls
    Login {
        /// Bing Webmaster API key (prompted for when omitted)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Show which API key source is active
    Whoami {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Remove the locally stored API key
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Set a config value
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
    /// Print a config value
    Get {
        #[arg(value_enum)]
        key: ConfigKey,
    },
}

#[derive(Subcommand, Debug)]
pub enum SiteCommands {
    /// List sites available to this API key
    List {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum StatsCommands {
    /// Site-level rank and traffic statistics
    Site {
        #[command(flatten)]
        site: SiteArg,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Traffic statistics for one URL
    Url {
        #[command(flatten)]
        site: SiteArg,
        /// Page URL
        #[arg(long)]
        url: String,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum UrlCommands {
    /// Check whether a URL is indexed and show known reasons if not
    CheckIndex {
        #[command(flatten)]
        site: SiteArg,
        /// Page URL to inspect
        #[arg(long)]
        url: String,
        /// Add diagnostics derived from the raw URL info
        #[arg(long)]
        explain: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Submit one or more URLs for indexing
    Submit {
        #[command(flatten)]
        site: SiteArg,
        /// URL to submit (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,
        /// Text file with one URL per line
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
pub struct SiteArg {
    /// Site URL (falls back to the configured default-site)
    #[arg(long)]
    pub site: Option<String>,
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    /// Start date, YYYY-MM-DD (defaults to 30 days before the end date)
    #[arg(long)]
    pub start_date: Option<String>,
    /// End date, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub end_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    #[arg(long = "output", value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Destination file when --output=csv
    #[arg(long)]
    pub csv_path: Option<PathBuf>,
}

/// Everything a command needs from outside the argument list.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub today: NaiveDate,
    /// Key that beats every other credential source.
    pub api_key_override: Option<String>,
}

impl Context {
    pub fn from_env() -> Result<Self> {
        Ok(Context {
            settings: Settings::from_env()?,
            today: chrono::Local::now().date_naive(),
            api_key_override: None,
        })
    }

    fn credentials(&self) -> CredentialStore {
        let store = CredentialStore::new(
            &self.settings.credentials_file,
            self.settings.env_api_key.clone(),
        );
        match &self.api_key_override {
            Some(key) => store.with_override(key.clone()),
            None => store,
        }
    }

    fn config(&self) -> ConfigStore {
        ConfigStore::new(&self.settings.app_config_file)
    }

    fn client(&self) -> Result<ApiClient> {
        let (key, source) = self.credentials().resolve()?;
        debug!(%source, "using API key");
        ApiClient::from_settings(key, &self.settings)
    }

    /// `--site` if given, else the configured default site.
    fn site(&self, arg: &SiteArg) -> Result<String> {
        if let Some(site) = arg.site.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            input::parse_http_url(site)?;
            return Ok(site.to_string());
        }
        self.config().get(ConfigKey::DefaultSite)?.ok_or_else(|| {
            BwmError::validation(
                "No site specified. Pass --site or set one with `bwm config set default-site <siteUrl>`.",
            )
        })
    }
}

/// How a successfully completed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Some submitted URLs were rejected; the others went through.
    PartialFailure { rejected: usize },
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::PartialFailure { .. } => PARTIAL_FAILURE_EXIT_CODE,
        }
    }
}

/// Run one parsed invocation, writing command output to `out`.
pub fn run(cli: Cli, ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    match cli.command {
        Commands::Auth { command } => run_auth(command, ctx, out),
        Commands::Config { command } => run_config(command, ctx, out),
        Commands::Site {
            command: SiteCommands::List { output },
        } => {
            let client = ctx.client()?;
            let sites = with_spinner("Fetching sites...", || client.get_user_sites())?;
            emit(out, &sites, &output)
        }
        Commands::Stats { command } => run_stats(command, ctx, out),
        Commands::Url { command } => run_url(command, ctx, out),
    }
}

fn run_auth(command: AuthCommands, ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    let credentials = ctx.credentials();
    match command {
        AuthCommands::Login { api_key } => {
            let key = match api_key {
                Some(key) => key,
                None => prompt_api_key()?,
            };
            let path = credentials.login(&key)?;
            writeln!(out, "Saved API key to {}", path.display())?;
        }
        AuthCommands::Whoami { output } => {
            let status = credentials.whoami()?;
            return emit(out, &[status], &output);
        }
        AuthCommands::Clear => {
            if credentials.clear()? {
                writeln!(out, "Removed local API key file.")?;
            } else {
                writeln!(out, "No local API key file found.")?;
            }
        }
    }
    Ok(Outcome::Success)
}

fn run_config(command: ConfigCommands, ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    let config = ctx.config();
    match command {
        ConfigCommands::Set { key, value } => {
            let path = config.set(key, &value)?;
            writeln!(out, "Set {key} to {}", value.trim())?;
            writeln!(out, "Config file: {}", path.display())?;
        }
        ConfigCommands::Get { key } => match config.get(key)? {
            Some(value) => writeln!(out, "{value}")?,
            None => return Err(BwmError::validation(format!("{key} is not set."))),
        },
    }
    Ok(Outcome::Success)
}

fn run_stats(command: StatsCommands, ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    match command {
        StatsCommands::Site {
            site,
            range,
            output,
        } => {
            let site = ctx.site(&site)?;
            let range = resolve_range(&range, ctx.today)?;
            let client = ctx.client()?;
            let rows = with_spinner("Fetching site statistics...", || {
                client.get_rank_and_traffic_stats(&site, range)
            })?;
            emit(out, &rows, &output)
        }
        StatsCommands::Url {
            site,
            url,
            range,
            output,
        } => {
            let site = ctx.site(&site)?;
            input::parse_http_url(&url)?;
            let range = resolve_range(&range, ctx.today)?;
            let client = ctx.client()?;
            let rows = with_spinner("Fetching URL statistics...", || {
                client.get_url_traffic_info(&site, url.trim(), range)
            })?;
            emit(out, &rows, &output)
        }
    }
}

fn run_url(command: UrlCommands, ctx: &Context, out: &mut dyn Write) -> Result<Outcome> {
    match command {
        UrlCommands::CheckIndex {
            site,
            url,
            explain,
            output,
        } => {
            let site = ctx.site(&site)?;
            input::parse_http_url(&url)?;
            let client = ctx.client()?;
            let status = with_spinner("Checking index status...", || {
                index_status::check_index(&client, &site, url.trim(), explain)
            })?;
            emit(out, &[status], &output)
        }
        UrlCommands::Submit {
            site,
            urls,
            file,
            output,
        } => {
            let site = ctx.site(&site)?;
            let urls = input::collect_urls(&urls, file.as_deref())?;
            if urls.is_empty() {
                return Err(BwmError::validation(
                    "Provide at least one URL via --url or --file.",
                ));
            }
            let results = submit_urls(ctx, &site, &urls)?;
            let rejected = results.iter().filter(|r| !r.is_accepted()).count();
            emit(out, &results, &output)?;
            if rejected > 0 {
                warn!(rejected, total = results.len(), "some URLs were rejected");
                return Ok(Outcome::PartialFailure { rejected });
            }
            Ok(Outcome::Success)
        }
    }
}

/// Submit the well-formed URLs in one call and report every URL in input order.
fn submit_urls(ctx: &Context, site: &str, urls: &[String]) -> Result<Vec<SubmissionResult>> {
    let valid: Vec<String> = urls
        .iter()
        .filter(|u| input::parse_http_url(u).is_ok())
        .cloned()
        .collect();

    let mut by_url: HashMap<String, SubmissionResult> = HashMap::new();
    if !valid.is_empty() {
        let client = ctx.client()?;
        let results = with_spinner("Submitting URLs...", || match valid.as_slice() {
            [single] => client.submit_url(site, single).map(|r| vec![r]),
            many => client.submit_url_batch(site, many),
        })?;
        by_url.extend(results.into_iter().map(|r| (r.url.clone(), r)));
    }

    Ok(urls
        .iter()
        .map(|url| {
            if input::parse_http_url(url).is_err() {
                return SubmissionResult::rejected(site, url, "invalid URL");
            }
            by_url
                .remove(url)
                .unwrap_or_else(|| SubmissionResult::rejected(site, url, "no result returned"))
        })
        .collect())
}

fn resolve_range(args: &RangeArgs, today: NaiveDate) -> Result<DateRange> {
    DateRange::resolve(args.start_date.as_deref(), args.end_date.as_deref(), today)
}

fn emit<R: Record>(out: &mut dyn Write, records: &[R], args: &OutputArgs) -> Result<Outcome> {
    let text = output::render(records, args.format, args.csv_path.as_deref())?;
    writeln!(out, "{text}")?;
    Ok(Outcome::Success)
}

fn prompt_api_key() -> Result<String> {
    Password::new()
        .with_prompt("Bing Webmaster API key")
        .interact()
        .map_err(|e| {
            BwmError::validation(format!("Cannot prompt for an API key ({e}); pass --api-key"))
        })
}

/// Show a spinner on stderr while `call` runs. Hidden when stderr is not
/// a terminal.
fn with_spinner<T>(message: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = call();
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        Context {
            settings: Settings::in_dir(dir.path()),
            today: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            api_key_override: None,
        }
    }

    fn run_args(ctx: &Context, args: &[&str]) -> (Result<Outcome>, String) {
        let cli = Cli::try_parse_from(std::iter::once("bwm").chain(args.iter().copied())).unwrap();
        let mut out = Vec::new();
        let result = run(cli, ctx, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn command_tree_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn config_set_then_get() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let (result, text) = run_args(&ctx, &["config", "set", "default-site", "https://example.com"]);
        assert_eq!(result.unwrap(), Outcome::Success);
        assert!(text.starts_with("Set default-site to https://example.com"));

        let (result, text) = run_args(&ctx, &["config", "get", "default-site"]);
        assert_eq!(result.unwrap(), Outcome::Success);
        assert_eq!(text, "https://example.com\n");
    }

    #[test]
    fn config_get_unset_key_fails() {
        let dir = TempDir::new().unwrap();
        let (result, _) = run_args(&context(&dir), &["config", "get", "default-site"]);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "default-site is not set.");
    }

    #[test]
    fn missing_site_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let (result, _) = run_args(&context(&dir), &["stats", "site"]);
        assert!(matches!(result, Err(BwmError::Validation(m)) if m.starts_with("No site specified")));
    }

    #[test]
    fn bad_dates_fail_before_authentication() {
        let dir = TempDir::new().unwrap();
        let (result, _) = run_args(
            &context(&dir),
            &["stats", "site", "--site", "https://example.com", "--start-date", "yesterday"],
        );
        assert!(matches!(result, Err(BwmError::Validation(_))));
    }

    #[test]
    fn api_commands_require_a_key() {
        let dir = TempDir::new().unwrap();
        let (result, _) = run_args(&context(&dir), &["site", "list"]);
        assert!(matches!(result, Err(BwmError::NotAuthenticated)));
    }

    #[test]
    fn auth_login_whoami_clear() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let (result, text) = run_args(&ctx, &["auth", "login", "--api-key", "0123456789"]);
        result.unwrap();
        assert!(text.starts_with("Saved API key to "));

        let (result, text) = run_args(&ctx, &["auth", "whoami", "--output", "json"]);
        result.unwrap();
        assert!(text.contains("\"apiKeyMasked\": \"0123...6789\""));
        assert!(!text.contains("0123456789"));

        let (_, text) = run_args(&ctx, &["auth", "clear"]);
        assert_eq!(text, "Removed local API key file.\n");
        let (result, _) = run_args(&ctx, &["auth", "whoami"]);
        assert!(matches!(result, Err(BwmError::NotAuthenticated)));
    }

    #[test]
    fn submit_with_only_invalid_urls_skips_the_api() {
        let dir = TempDir::new().unwrap();
        let (result, text) = run_args(
            &context(&dir),
            &[
                "url", "submit", "--site", "https://example.com", "--url", "not-a-url", "--output",
                "json",
            ],
        );
        assert_eq!(result.unwrap(), Outcome::PartialFailure { rejected: 1 });
        assert!(text.contains("\"status\": \"rejected\""));
        assert!(text.contains("invalid URL"));
    }
}
