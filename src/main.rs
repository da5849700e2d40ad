use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mailfill::{review, Config, Error, Params, Provider, Result, Session};

#[derive(Parser)]
#[command(name = "mailfill")]
#[command(about = "Fill web forms from email text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a job file and print a summary
    Check(JobArgs),

    /// Print the form fields found on the target page
    Scan {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Open every custom dropdown on the target page and print its options
    Options {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Scan, extract values from an email, review them, fill the form
    Run {
        #[command(flatten)]
        job: JobArgs,

        #[command(flatten)]
        page: PageArgs,

        /// Email text file, or "-" for stdin
        #[arg(long, value_name = "FILE", conflicts_with = "inbox")]
        email: Option<PathBuf>,

        /// Take the newest matching email from the configured inbox
        #[arg(long)]
        inbox: bool,

        /// Accept extracted values without review
        #[arg(short, long)]
        yes: bool,

        /// Review in an editor: write rows to this YAML file and read them back
        #[arg(long, value_name = "PATH")]
        review_file: Option<PathBuf>,

        /// Print the raw completion reply
        #[arg(long)]
        raw: bool,

        /// Print the prompt and stop before calling the completion endpoint
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the scan/extract/fill tools over MCP on stdio
    Serve {
        /// Job file supplying browser, timing and completion settings
        config: Option<PathBuf>,

        /// Set a parameter (can be used multiple times)
        #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

#[derive(Args)]
struct JobArgs {
    /// Job file
    config: PathBuf,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Args)]
struct PageArgs {
    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Wait for Enter after the page loads (log in, navigate to the form)
    #[arg(long)]
    pause: bool,
}

fn load_config(path: &Path, params: &[String]) -> Result<Config> {
    let params = Params::from_args(params)?.with_env();
    Config::load_with_params(path, &params)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout carries status lines (and the MCP transport in serve mode)
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    match dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn dispatch(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Check(job) => {
            let config = load_config(&job.config, &job.params)?;
            print_summary(&config);
            Ok(true)
        }
        Command::Scan { job, page } => {
            let config = load_config(&job.config, &job.params)?;
            let mut session = open_session(config, &page).await?;
            let result = session.scan().await.map(|fields| {
                if fields.is_empty() {
                    println!("No form fields found.");
                }
                for field in fields {
                    println!("{}", field);
                }
            });
            session.close().await?;
            result?;
            Ok(true)
        }
        Command::Options { job, page } => {
            let config = load_config(&job.config, &job.params)?;
            println!("Extracting options from dropdowns...");
            let session = open_session(config, &page).await?;
            let result = session.probe_dropdowns().await;
            session.close().await?;
            let dropdowns = result?;
            if dropdowns.is_empty() {
                println!("No dropdown options found.");
            }
            for dropdown in &dropdowns {
                println!("{}:", dropdown.label);
                for option in &dropdown.options {
                    println!("  - {}", option);
                }
            }
            Ok(true)
        }
        Command::Run {
            job,
            page,
            email,
            inbox,
            yes,
            review_file,
            raw,
            dry_run,
        } => {
            let config = load_config(&job.config, &job.params)?;
            let email = read_email(&config, email.as_deref(), inbox).await?;
            let provider = if dry_run {
                None
            } else {
                Some(Provider::from_config(config.completion()?)?)
            };
            let opts = RunOptions {
                yes,
                review_file,
                raw,
            };

            let mut session = open_session(config, &page).await?;
            let result = run_flow(&mut session, provider.as_ref(), &email, &opts).await;
            session.close().await?;
            Ok(result?)
        }
        Command::Serve { config, params } => {
            let config = config
                .map(|path| load_config(&path, &params))
                .transpose()?;
            mailfill::mcp::run_server(config).await?;
            Ok(true)
        }
    }
}

fn print_summary(config: &Config) {
    println!("Config valid: {}", config.name);
    println!("  Target: {}", config.target.url);
    match config.completion {
        Some(ref completion) => {
            println!("  Completion: {:?} at {}", completion.protocol, completion.base_url);
            match completion.assistant_id {
                Some(ref id) => println!("  Assistant: {}", id),
                None => println!("  Model: {}", completion.model),
            }
        }
        None => println!("  Completion: not configured"),
    }
    if let Some(ref inbox) = config.inbox {
        println!("  Inbox: {}@{}/{}", inbox.username, inbox.host, inbox.mailbox);
    }
    if !config.params.is_empty() {
        println!("  Parameters: {}", config.params.len());
        for (name, def) in &config.params {
            let req = if def.required { " (required)" } else { "" };
            let desc = def.description.as_deref().unwrap_or("");
            println!("    - {}{}: {}", name, req, desc);
        }
    }
}

async fn open_session(mut config: Config, page: &PageArgs) -> Result<Session> {
    if page.headless {
        config.browser.headless = true;
    }
    println!("Opening: {}", config.target.url);
    let mut session = Session::launch(&config.browser, config.timing.clone()).await?;
    if let Err(e) = session.open(&config.target.url).await {
        session.close().await?;
        return Err(e);
    }
    if page.pause {
        wait_for_enter("Press Enter when the form is ready...")?;
    }
    Ok(session)
}

async fn read_email(config: &Config, path: Option<&Path>, inbox: bool) -> Result<String> {
    let text = if inbox {
        let inbox = config
            .inbox
            .as_ref()
            .ok_or_else(|| Error::Config("--inbox needs an inbox section in the job file".into()))?;
        info!("Fetching newest matching email from {}", inbox.host);
        let mut client = mailfill_inbox::AsyncImapClient::connect(&inbox.imap()).await?;
        let message = client
            .fetch_latest(&inbox.criteria())
            .await?
            .ok_or(mailfill_inbox::Error::NotFound)?;
        println!(
            "Using email: {}",
            message.subject.as_deref().unwrap_or("(no subject)")
        );
        message.to_text()
    } else {
        match path {
            Some(p) if p == Path::new("-") => std::io::read_to_string(std::io::stdin())?,
            Some(p) => std::fs::read_to_string(p)?,
            None => {
                return Err(Error::Input(
                    "no email source: pass --email FILE, --email - or --inbox".into(),
                ))
            }
        }
    };
    if text.trim().is_empty() {
        return Err(Error::Input("Please provide email content first.".into()));
    }
    Ok(text)
}

struct RunOptions {
    yes: bool,
    review_file: Option<PathBuf>,
    raw: bool,
}

async fn run_flow(
    session: &mut Session,
    provider: Option<&Provider>,
    email: &str,
    opts: &RunOptions,
) -> Result<bool> {
    let fields = session.scan().await?.to_vec();
    if fields.is_empty() {
        return Err(Error::Input("no form fields found on the page".into()));
    }
    println!("Found {} form fields.", fields.len());

    let Some(provider) = provider else {
        println!("{}", mailfill::build_prompt(email, &fields));
        return Ok(true);
    };

    println!("Processing...");
    let extraction = session.extract(provider, email).await?;
    if opts.raw {
        let raw = serde_json::to_string_pretty(extraction.response.raw())
            .unwrap_or_else(|_| extraction.response.raw().to_string());
        println!("{}", raw);
    }

    println!("Fields extracted. Please review and edit if necessary.");
    println!();
    print!("{}", review::render_table(&extraction.rows));
    println!();

    let mut rows = extraction.rows;
    if let Some(ref path) = opts.review_file {
        review::save_rows(path, &rows)?;
        println!("Review file written: {}", path.display());
        if !opts.yes {
            wait_for_enter("Edit the file, then press Enter to fill the form...")?;
        }
        rows = review::load_rows(path)?;
    } else if !opts.yes {
        let stdin = std::io::stdin();
        review::edit_rows(&mut rows, stdin.lock(), std::io::stdout())?;
    }

    let report = session.fill(&review::reviewed_values(&rows)).await?;
    println!();
    if report.is_complete() {
        println!("✓ Form filled successfully: {}", report);
    } else {
        println!("✗ Form partly filled: {}", report);
        for (index, outcome) in report.fields.iter().filter(|(_, o)| !o.is_success()) {
            println!("  [{}] {:?}", index, outcome);
        }
    }
    Ok(report.is_complete())
}

fn wait_for_enter(message: &str) -> Result<()> {
    print!("{} ", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}
