use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Password};
use dashgate::auth::{Authenticator, LoginForm, LoginInput, LoginPrompt};
use dashgate::gate::{Outcome, Params, Request};
use dashgate::pages::PageRegistry;
use dashgate::session::SessionState;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Context {
    pub registry: PageRegistry,
    pub authenticator: Arc<Authenticator>,
    pub session: RefCell<SessionState>,
    pub cookie_jar_path: PathBuf,
    pub history_path: PathBuf,
    pub transcript_path: PathBuf,
    pub debug: bool,
}

/// Login form rendered on the terminal
struct TerminalPrompt<'a> {
    editor: &'a mut DefaultEditor,
}

impl LoginPrompt for TerminalPrompt<'_> {
    fn render(&mut self, form: &LoginForm) -> Option<LoginInput> {
        println!("== {} ==", form.title);
        if let Some(error) = &form.error {
            println!("{}", error);
        }
        let username = self.editor.readline("Username: ").ok()?;
        let password = Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .ok()?;
        Some(LoginInput::new(username, password))
    }

    fn offer_logout(&mut self, name: &str) {
        println!("Logged in as {} (/logout to sign out)", name);
    }
}

/// Parse `key=value` arguments into page parameters
pub fn parse_params<S: AsRef<str>>(args: &[S]) -> Result<Params> {
    let mut params = Params::new();
    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", arg))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}

pub fn run_once(ctx: &Context, route: &str, params: Params) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    visit(ctx, &mut editor, route, params)
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(&ctx.history_path);

    println!("dashgate - type /help for commands, /exit to quit");

    loop {
        match rl.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                if handle_command(&ctx, &mut rl, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&ctx.history_path) {
        if ctx.debug {
            eprintln!("[DEBUG] Failed to save history: {}", e);
        }
    }
    Ok(())
}

fn handle_command(ctx: &Context, rl: &mut DefaultEditor, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match cmd {
        "/exit" | "/quit" => return true,
        "/help" => {
            println!("Pages:");
            for (route, access) in ctx.registry.routes() {
                println!("  /{:<22} - {} page", route, access.as_str());
            }
            println!("  /dashboard outlet=Texas,Nevada type=.. item=..  - filtered dashboard");
            println!("  /dashboard export=report.csv                     - also write the rows as CSV");
            println!("Session:");
            println!("  /logout         - sign out and drop the session cookie");
            println!("  /activity       - show this session's activity log");
            println!("  /session        - show session info");
            println!("  /help           - show commands");
            println!("  /exit           - quit");
        }
        "/logout" => {
            let mut session = ctx.session.borrow_mut();
            if session.is_authenticated() {
                ctx.authenticator.logout(&mut session);
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
            if let Err(e) = session.cookies.save(&ctx.cookie_jar_path) {
                eprintln!("Error: {}", e);
            }
        }
        "/activity" => {
            let session = ctx.session.borrow();
            if session.activity_log.is_empty() {
                println!("No activity yet");
            }
            for (i, entry) in session.activity_log.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, entry);
            }
        }
        "/session" => {
            let session = ctx.session.borrow();
            println!("Session: {}", session.id);
            println!("Started: {}", session.started_at.to_rfc3339());
            println!("Status: {}", session.authentication_status.as_str());
            if let Some(username) = &session.username {
                println!("User: {}", username);
            }
            println!("Transcript: {:?}", ctx.transcript_path);
        }
        _ => {
            let route = cmd.trim_start_matches('/');
            let result = parse_params(&args).and_then(|params| visit(ctx, rl, route, params));
            if let Err(e) = result {
                eprintln!("Error: {}", e);
            }
        }
    }
    false
}

/// One request cycle: render `route` for the current session
fn visit(ctx: &Context, editor: &mut DefaultEditor, route: &str, params: Params) -> Result<()> {
    let mut session = ctx.session.borrow_mut();
    let mut prompt = TerminalPrompt { editor };
    let outcome = {
        let mut req = Request::new(&mut *session, &mut prompt).with_params(params);
        ctx.registry.render(route, &mut req)
    };

    // The browser keeps whatever cookie the request left behind
    session.cookies.save(&ctx.cookie_jar_path)?;

    if ctx.debug {
        eprintln!(
            "[DEBUG] session={} status={} log_entries={}",
            session.id,
            session.authentication_status.as_str(),
            session.activity_log.len()
        );
    }

    match outcome? {
        Outcome::Rendered(text) => println!("{}", text),
        Outcome::LoginRequired if session.is_authenticated() => {
            println!(
                "Welcome, {}! Open /{} again to continue.",
                session.name.as_deref().unwrap_or_default(),
                route
            );
        }
        Outcome::LoginRequired => println!("Login required to view /{}", route),
    }
    Ok(())
}
