use std::path::PathBuf;
use std::time::Duration;

mod prompt;
mod render;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use echo_core::api::{Account, EchoApiClient, NewCampaign, NewProxy, ProxyKind};
use echo_core::config::{ConfigLocator, ConsoleConfig};
use echo_core::linking::{LinkController, LinkOutcome};
use echo_core::services::{
    AudienceService, CampaignService, ProxyService, SettingsSync, TagService,
};
use echo_core::state::ConsoleState;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use prompt::{confirm, prompt_for_secret, prompt_line};
use render::{
    render_accounts, render_audience_members, render_audiences, render_campaigns,
    render_proxies, render_settings_form, render_tags,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Operator console for the messaging-automation backend")]
struct Cli {
    /// Backend base URL (overrides ECHO_API_URL and the config file)
    #[arg(long = "api-url", global = true)]
    api_url: Option<Url>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Linked accounts and their settings
    #[command(subcommand)]
    Account(AccountCommand),
    /// Proxy pool
    #[command(subcommand)]
    Proxy(ProxyCommand),
    /// Global tag catalog
    #[command(subcommand)]
    Tag(TagCommand),
    /// Scraped audiences
    #[command(subcommand)]
    Audience(AudienceCommand),
    /// Outreach campaigns
    #[command(subcommand)]
    Campaign(CampaignCommand),
    /// Local console configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// List linked accounts
    List(JsonArgs),
    /// Link a new account (prompts for the verification code / 2FA password)
    Add(AccountAddArgs),
    /// Delete an account and its server-side session
    Delete(AccountDeleteArgs),
    /// Show an account's settings as they would be edited
    Show(AccountShowArgs),
    /// Edit and save an account's settings
    Settings(AccountSettingsArgs),
    /// Push the stored profile to the live messaging account
    ApplyProfile(ApplyProfileArgs),
    /// Upload an avatar image and print its server path
    UploadAvatar(UploadAvatarArgs),
}

#[derive(Args, Debug)]
struct JsonArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AccountAddArgs {
    /// Phone number in international format (prompted for when omitted)
    phone: Option<String>,
}

#[derive(Args, Debug)]
struct AccountDeleteArgs {
    phone: String,
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct AccountShowArgs {
    phone: String,
}

#[derive(Args, Debug)]
struct AccountSettingsArgs {
    phone: String,
    #[arg(long = "first-name")]
    first_name: Option<String>,
    #[arg(long = "last-name")]
    last_name: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    /// Avatar path already stored on the server
    #[arg(long, conflicts_with = "avatar_file")]
    avatar: Option<String>,
    /// Local image to upload and use as avatar
    #[arg(long = "avatar-file")]
    avatar_file: Option<PathBuf>,
    /// Proxy id to route the account through
    #[arg(long, conflicts_with = "no_proxy")]
    proxy: Option<String>,
    /// Remove the account's proxy
    #[arg(long = "no-proxy")]
    no_proxy: bool,
    /// Apply a tag (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Remove a tag (repeatable)
    #[arg(long = "untag")]
    untags: Vec<String>,
    /// Remove every tag before applying --tag
    #[arg(long = "clear-tags")]
    clear_tags: bool,
    /// Operating system used for the user agent (Windows, macOS)
    #[arg(long)]
    os: Option<String>,
    /// Chrome version used for the user agent
    #[arg(long)]
    chrome: Option<String>,
    /// Explicit user-agent string
    #[arg(long = "user-agent", conflicts_with = "generate_user_agent")]
    user_agent: Option<String>,
    /// Rebuild the user-agent string from --os/--chrome
    #[arg(long = "generate-user-agent")]
    generate_user_agent: bool,
}

#[derive(Args, Debug)]
struct ApplyProfileArgs {
    phone: String,
    #[arg(long = "first-name")]
    first_name: Option<String>,
    #[arg(long = "last-name")]
    last_name: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
}

#[derive(Args, Debug)]
struct UploadAvatarArgs {
    file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ProxyCommand {
    /// List proxies
    List(JsonArgs),
    /// Add a proxy
    Add(ProxyAddArgs),
    /// Delete a proxy by id
    Delete(IdArgs),
    /// Ask the backend whether a proxy works
    Check(ProxyCheckArgs),
}

#[derive(Args, Debug)]
struct ProxyAddArgs {
    /// Proxy protocol (http, socks4, socks5)
    #[arg(long = "type", default_value = "socks5")]
    kind: ProxyKind,
    #[arg(long)]
    host: String,
    #[arg(long)]
    port: u16,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    pass: Option<String>,
}

#[derive(Args, Debug)]
struct ProxyCheckArgs {
    id: String,
}

#[derive(Args, Debug)]
struct IdArgs {
    id: String,
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    /// List tags
    List(JsonArgs),
    /// Create a tag
    Add(TagAddArgs),
    /// Delete a tag (also removes it from every account)
    Delete(NameArgs),
}

#[derive(Args, Debug)]
struct TagAddArgs {
    name: String,
}

#[derive(Args, Debug)]
struct NameArgs {
    name: String,
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum AudienceCommand {
    /// List saved audiences
    List(JsonArgs),
    /// Scrape members of a chat through one of the accounts
    Scrape(ScrapeArgs),
    /// Delete a saved audience
    Delete(NameArgs),
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// Account used to read the chat
    #[arg(long)]
    phone: String,
    /// Link to the group or channel
    #[arg(long = "chat-link")]
    chat_link: String,
    /// Save the result under this audience name
    #[arg(long)]
    save: Option<String>,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum CampaignCommand {
    /// List campaigns
    List(JsonArgs),
    /// Queue a new campaign
    Start(CampaignStartArgs),
    /// Delete a campaign
    Delete(IdArgs),
    /// Poll campaign progress until interrupted (Ctrl-C)
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct CampaignStartArgs {
    #[arg(long)]
    name: String,
    /// Saved audience name
    #[arg(long)]
    audience: String,
    #[arg(long)]
    message: String,
    /// Sending account phone (repeatable)
    #[arg(long = "account", required = true)]
    accounts: Vec<String>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Seconds between refreshes (defaults to the configured interval)
    #[arg(long)]
    interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Update the stored configuration
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
struct ConfigSetArgs {
    #[arg(long = "api-url")]
    api_url: Option<Url>,
    #[arg(long = "poll-interval")]
    poll_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.api_url.clone())?;
    match cli.command {
        Commands::Account(cmd) => {
            let client = build_client(&config)?;
            match cmd {
                AccountCommand::List(args) => account_list(&client, args).await?,
                AccountCommand::Add(args) => account_add(client, args).await?,
                AccountCommand::Delete(args) => account_delete(&client, args).await?,
                AccountCommand::Show(args) => account_show(client, args).await?,
                AccountCommand::Settings(args) => account_settings(client, args).await?,
                AccountCommand::ApplyProfile(args) => account_apply_profile(client, args).await?,
                AccountCommand::UploadAvatar(args) => {
                    let path = client
                        .upload_avatar(&args.file)
                        .await
                        .context("avatar upload failed")?;
                    println!("{}", path);
                }
            }
        }
        Commands::Proxy(cmd) => proxy_command(ProxyService::new(build_client(&config)?), cmd).await?,
        Commands::Tag(cmd) => tag_command(TagService::new(build_client(&config)?), cmd).await?,
        Commands::Audience(cmd) => {
            audience_command(AudienceService::new(build_client(&config)?), cmd).await?
        }
        Commands::Campaign(cmd) => {
            let service = CampaignService::new(build_client(&config)?);
            campaign_command(service, cmd, &config).await?
        }
        Commands::Config(cmd) => config_command(cmd, config)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if let Err(err) = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }
}

fn load_config(api_url: Option<Url>) -> Result<ConsoleConfig> {
    let locator = ConfigLocator::new().context("unable to locate configuration directory")?;
    let mut config = ConsoleConfig::load(&locator)
        .context("failed to read configuration")?
        .with_env_overrides()
        .context("invalid ECHO_API_URL")?;
    if let Some(url) = api_url {
        config.api_url = url;
    }
    Ok(config)
}

fn build_client(config: &ConsoleConfig) -> Result<EchoApiClient> {
    EchoApiClient::new(&config.api_url).context("failed to build API client")
}

async fn find_account(client: &EchoApiClient, phone: &str) -> Result<Account> {
    let accounts = client
        .list_accounts()
        .await
        .context("failed to load accounts")?;
    accounts
        .into_iter()
        .find(|account| account.phone == phone.trim())
        .ok_or_else(|| anyhow!("account '{}' not found", phone))
}

async fn account_list(client: &EchoApiClient, args: JsonArgs) -> Result<()> {
    let accounts = client
        .list_accounts()
        .await
        .context("failed to load accounts")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
    } else {
        render_accounts(&accounts);
    }
    Ok(())
}

async fn account_add(client: EchoApiClient, args: AccountAddArgs) -> Result<()> {
    let phone = match args.phone {
        Some(phone) => phone,
        None => prompt_line("Enter phone number (international format, e.g. +1234567890): ")
            .await?
            .unwrap_or_default(),
    };

    let controller = LinkController::new(client);
    let outcome = controller.run(&phone, prompt_for_secret).await?;

    match outcome {
        LinkOutcome::Linked { accounts } => {
            println!("Account {} linked.", phone.trim());
            show_refreshed(accounts.as_deref());
            Ok(())
        }
        LinkOutcome::Failed {
            stage,
            reason,
            accounts,
        } => {
            show_refreshed(accounts.as_deref());
            bail!("linking failed while {stage}: {reason}")
        }
        LinkOutcome::Abandoned { .. } => {
            eprintln!("Cancelled.");
            Ok(())
        }
    }
}

fn show_refreshed(accounts: Option<&[Account]>) {
    match accounts {
        Some(accounts) => {
            println!();
            render_accounts(accounts);
        }
        None => warn!("could not refresh the account list"),
    }
}

async fn account_delete(client: &EchoApiClient, args: AccountDeleteArgs) -> Result<()> {
    let question = format!(
        "Delete account {}? Its server-side session is removed too and this cannot be undone.",
        args.phone
    );
    if !args.yes && !confirm(&question).await? {
        eprintln!("Cancelled.");
        return Ok(());
    }
    let reply = client
        .delete_account(&args.phone)
        .await
        .context("failed to delete account")?;
    print_reply(reply.text(), &format!("Deleted account {}.", args.phone));
    account_list(client, JsonArgs { json: false }).await
}

async fn account_show(client: EchoApiClient, args: AccountShowArgs) -> Result<()> {
    let account = find_account(&client, &args.phone).await?;
    let form = SettingsSync::new(client)
        .load_for_editing(&account)
        .await
        .context("failed to load settings")?;
    render_settings_form(&form);
    Ok(())
}

async fn account_settings(client: EchoApiClient, args: AccountSettingsArgs) -> Result<()> {
    let account = find_account(&client, &args.phone).await?;
    let sync = SettingsSync::new(client);
    let mut state = ConsoleState::new();
    state.open_account(
        sync.load_for_editing(&account)
            .await
            .context("failed to load settings")?,
    );
    let form = state
        .editing_mut()
        .ok_or_else(|| anyhow!("no account open for editing"))?;

    if let Some(first_name) = args.first_name {
        form.profile.first_name = first_name;
    }
    if let Some(last_name) = args.last_name {
        form.profile.last_name = last_name;
    }
    if let Some(bio) = args.bio {
        form.profile.bio = bio;
    }
    if let Some(avatar) = args.avatar {
        form.profile.avatar_path = avatar;
    }
    if let Some(file) = &args.avatar_file {
        let path = sync
            .attach_avatar(form, file)
            .await
            .context("avatar upload failed")?;
        println!("Avatar uploaded as {}.", path);
    }

    if args.no_proxy {
        form.select_proxy(None);
    } else if let Some(proxy) = &args.proxy {
        form.select_proxy(Some(proxy.as_str()));
    }

    if args.clear_tags {
        form.clear_tags();
    }
    for tag in &args.tags {
        if !form.set_tag(tag, true) {
            bail!("tag '{}' does not exist; create it with `echoctl tag add`", tag);
        }
    }
    for tag in &args.untags {
        form.set_tag(tag, false);
    }

    if let Some(os) = args.os {
        form.user_agent.os = os;
    }
    if let Some(chrome) = args.chrome {
        form.user_agent.chrome = chrome;
    }
    if let Some(user_agent) = args.user_agent {
        form.user_agent.full_string = user_agent;
    } else if args.generate_user_agent {
        form.regenerate_user_agent();
    }

    let form = state
        .close_account()
        .ok_or_else(|| anyhow!("no account open for editing"))?;
    let payload = sync.save(&form).await.context("failed to save settings")?;
    println!("Settings saved for {}.", form.phone);
    match payload.proxy {
        Some(proxy) => println!("Proxy: {}", proxy.label()),
        None => println!("Proxy: none"),
    }
    println!("Tags : {}", payload.tags.join(", "));
    Ok(())
}

async fn account_apply_profile(client: EchoApiClient, args: ApplyProfileArgs) -> Result<()> {
    let account = find_account(&client, &args.phone).await?;
    let mut profile = account.settings.profile;
    if let Some(first_name) = args.first_name {
        profile.first_name = first_name;
    }
    if let Some(last_name) = args.last_name {
        profile.last_name = last_name;
    }
    if let Some(bio) = args.bio {
        profile.bio = bio;
    }
    if let Some(avatar) = args.avatar {
        profile.avatar_path = avatar;
    }

    let reply = SettingsSync::new(client)
        .apply_profile(&account.phone, &profile)
        .await
        .context("failed to apply profile")?;
    print_reply(reply.text(), "Profile applied.");
    Ok(())
}

async fn proxy_command(service: ProxyService, cmd: ProxyCommand) -> Result<()> {
    match cmd {
        ProxyCommand::List(args) => {
            let proxies = service.list().await.context("failed to load proxies")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&proxies)?);
            } else {
                render_proxies(&proxies);
            }
        }
        ProxyCommand::Add(args) => {
            let reply = service
                .add(NewProxy {
                    kind: args.kind,
                    host: args.host,
                    port: args.port,
                    user: args.user,
                    pass: args.pass,
                })
                .await
                .context("failed to add proxy")?;
            print_reply(reply.text(), "Proxy added.");
        }
        ProxyCommand::Delete(args) => {
            if !args.yes && !confirm(&format!("Delete proxy {}?", args.id)).await? {
                eprintln!("Cancelled.");
                return Ok(());
            }
            let reply = service
                .delete(&args.id)
                .await
                .context("failed to delete proxy")?;
            print_reply(reply.text(), "Proxy deleted.");
        }
        ProxyCommand::Check(args) => {
            let (proxy, verdict) = service.check(&args.id).await.context("proxy check failed")?;
            println!("{}: {}", proxy.label(), verdict);
        }
    }
    Ok(())
}

async fn tag_command(service: TagService, cmd: TagCommand) -> Result<()> {
    match cmd {
        TagCommand::List(args) => {
            let tags = service.list().await.context("failed to load tags")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                render_tags(&tags);
            }
        }
        TagCommand::Add(args) => {
            let reply = service.add(&args.name).await.context("failed to add tag")?;
            print_reply(reply.text(), "Tag added.");
        }
        TagCommand::Delete(args) => {
            let question = format!(
                "Delete tag \"{}\"? It will be removed from all accounts.",
                args.name
            );
            if !args.yes && !confirm(&question).await? {
                eprintln!("Cancelled.");
                return Ok(());
            }
            let reply = service
                .delete(&args.name)
                .await
                .context("failed to delete tag")?;
            print_reply(reply.text(), "Tag deleted.");
        }
    }
    Ok(())
}

async fn audience_command(service: AudienceService, cmd: AudienceCommand) -> Result<()> {
    match cmd {
        AudienceCommand::List(args) => {
            let files = service.list().await.context("failed to load audiences")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                render_audiences(&files);
            }
        }
        AudienceCommand::Scrape(args) => {
            let mut state = ConsoleState::new();
            eprintln!("Scraping... this may take a while.");
            state.stash_audience(
                service
                    .scrape(&args.phone, &args.chat_link)
                    .await
                    .context("scraping failed")?,
            );

            if args.json {
                println!("{}", serde_json::to_string_pretty(state.scraped())?);
            } else {
                println!("Scraping complete. Found {} users.", state.scraped().len());
                render_audience_members(state.scraped());
            }

            match args.save {
                Some(name) => {
                    let users = state.take_audience();
                    let reply = service
                        .save(&name, &users)
                        .await
                        .context("failed to save audience")?;
                    print_reply(reply.text(), &format!("Saved audience '{}'.", name));
                }
                None => eprintln!("Not saved; re-run with --save <NAME> to keep this audience."),
            }
        }
        AudienceCommand::Delete(args) => {
            let question = format!("Delete the audience \"{}\"?", args.name);
            if !args.yes && !confirm(&question).await? {
                eprintln!("Cancelled.");
                return Ok(());
            }
            let reply = service
                .delete(&args.name)
                .await
                .context("failed to delete audience")?;
            print_reply(reply.text(), "Audience deleted.");
        }
    }
    Ok(())
}

async fn campaign_command(
    service: CampaignService,
    cmd: CampaignCommand,
    config: &ConsoleConfig,
) -> Result<()> {
    match cmd {
        CampaignCommand::List(args) => {
            let campaigns = service.list().await.context("failed to load campaigns")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&campaigns)?);
            } else {
                render_campaigns(&campaigns);
            }
        }
        CampaignCommand::Start(args) => {
            let reply = service
                .start(NewCampaign {
                    name: args.name,
                    audience_file: echo_core::services::audiences::file_name(&args.audience),
                    account_phones: args.accounts,
                    message: args.message,
                })
                .await
                .context("failed to start campaign")?;
            print_reply(reply.text(), "Campaign queued.");
        }
        CampaignCommand::Delete(args) => {
            if !args.yes && !confirm(&format!("Delete campaign {}?", args.id)).await? {
                eprintln!("Cancelled.");
                return Ok(());
            }
            service
                .delete(&args.id)
                .await
                .context("failed to delete campaign")?;
            println!("Campaign deleted.");
        }
        CampaignCommand::Watch(args) => {
            let secs = args.interval.unwrap_or(config.poll_interval_secs).max(1);
            service
                .watch(
                    Duration::from_secs(secs),
                    |update| match update {
                        Ok(campaigns) => {
                            println!();
                            render_campaigns(&campaigns);
                        }
                        Err(err) => eprintln!("refresh failed: {}", err.operator_message()),
                    },
                    async {
                        if let Err(err) = tokio::signal::ctrl_c().await {
                            warn!(error = %err, "unable to listen for Ctrl-C");
                            std::future::pending::<()>().await;
                        }
                    },
                )
                .await;
        }
    }
    Ok(())
}

fn config_command(cmd: ConfigCommand, effective: ConsoleConfig) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        ConfigCommand::Set(args) => {
            let locator = ConfigLocator::new().context("unable to locate configuration directory")?;
            let mut stored = ConsoleConfig::load(&locator).context("failed to read configuration")?;
            if let Some(url) = args.api_url {
                stored.api_url = url;
            }
            if let Some(interval) = args.poll_interval {
                stored.poll_interval_secs = interval.max(1);
            }
            stored
                .save(&locator)
                .context("failed to write configuration")?;
            println!("Saved {}.", locator.config_file().display());
        }
    }
    Ok(())
}

fn print_reply(message: &str, fallback: &str) {
    if message.is_empty() {
        println!("{}", fallback);
    } else {
        println!("{}", message);
    }
}
