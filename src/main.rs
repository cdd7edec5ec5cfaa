mod cli;

use anyhow::{Context as _, Result};
use clap::Parser;
use dashgate::activity::ActivityLogger;
use dashgate::auth::Authenticator;
use dashgate::config::{AuthConfig, DEFAULT_CONFIG_PATH};
use dashgate::cookie::CookieJar;
use dashgate::credentials;
use dashgate::pages::dashboard::Dataset;
use dashgate::pages::PageRegistry;
use dashgate::session::SessionState;
use dashgate::transcript::Transcript;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dashgate", about = "Login-gated sales dashboard")]
pub struct Args {
    #[arg(long, env = "DASHGATE_CONFIG", default_value = DEFAULT_CONFIG_PATH, help = "Auth config file")]
    pub config: PathBuf,

    #[arg(
        long,
        env = "DASHGATE_STATE_DIR",
        default_value = ".dashgate",
        help = "Directory for the cookie jar, history and audit trail"
    )]
    pub state_dir: PathBuf,

    #[arg(long, help = "Sales data JSON file (defaults to the bundled sample)")]
    pub data: Option<PathBuf>,

    #[arg(short, long, help = "Render one page and exit")]
    pub page: Option<String>,

    #[arg(value_name = "KEY=VALUE", help = "Page parameters for -p mode")]
    pub params: Vec<String>,

    #[arg(long, value_name = "PASSWORD", help = "Print an argon2 hash for a config entry and exit")]
    pub hash_password: Option<String>,

    #[arg(long, help = "Debug output")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(password) = &args.hash_password {
        println!("{}", credentials::hash_password(password)?);
        return Ok(());
    }

    let config = AuthConfig::load(&args.config)
        .with_context(|| format!("cannot start without an auth config ({})", args.config.display()))?;
    let config = Arc::new(config);

    std::fs::create_dir_all(&args.state_dir)?;
    let transcript_path = args.state_dir.join("audit.jsonl");
    let audit = Transcript::open(&transcript_path)?.shared();

    let cookie_jar_path = args.state_dir.join("cookies.json");
    let cookies = CookieJar::load(&cookie_jar_path).unwrap_or_else(|e| {
        eprintln!("Warning: ignoring unreadable cookie jar: {}", e);
        CookieJar::default()
    });
    let session = SessionState::with_cookies(cookies);

    let root = std::env::current_dir()?;
    audit.lock().session_start(&session.id, &root)?;

    let dataset = match &args.data {
        Some(path) => Dataset::load(path)?,
        None => Dataset::sample()?,
    };

    let authenticator = Arc::new(Authenticator::new(config.clone()).with_audit(audit.clone()));
    let logger = Arc::new(ActivityLogger::new().with_audit(audit));
    let registry = PageRegistry::with_default_pages(authenticator.clone(), logger, Arc::new(dataset));

    if args.debug {
        eprintln!("[DEBUG] Config: {}", args.config.display());
        eprintln!("[DEBUG] Users: {:?}", config.credentials.usernames());
        eprintln!("[DEBUG] Cookie: {:?}", config.cookie);
        eprintln!("[DEBUG] Session: {}", session.id);
        eprintln!("[DEBUG] Audit trail: {}", transcript_path.display());
    }

    let ctx = cli::Context {
        registry,
        authenticator,
        session: RefCell::new(session),
        cookie_jar_path,
        history_path: args.state_dir.join("history"),
        transcript_path,
        debug: args.debug,
    };

    if let Some(page) = &args.page {
        let params = cli::parse_params(&args.params)?;
        cli::run_once(&ctx, page, params)
    } else {
        cli::run_repl(ctx)
    }
}
