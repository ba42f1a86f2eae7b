//!
//! acadworld CLI binary
//! --------------------
//! Command-line client for the AcadWorld API. Logs in, persists the token pair
//! to a file so later invocations reuse the session, and issues authenticated
//! requests through the refresh-aware client. `repl` keeps one session open
//! for interactive use.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustyline::error::ReadlineError;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use acadworld_client::config::ClientConfig;
use acadworld_client::identity::{Role, SessionContext, SessionSnapshot};
use acadworld_client::transport::ApiRequest;

const DEFAULT_TOKEN_FILE: &str = ".acadworld_tokens.json";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <file>] [--api <url>] [--tokens <file>] <command> [args]\n\nCommands:\n  login <email> <password>   authenticate and persist the session\n  whoami                     show the current account\n  roles                      show roles, permissions and the active mode\n  get <path>                 authenticated GET relative to the API base\n  passwd <old> <new>         change the account password\n  logout                     end the session and forget stored tokens\n  repl                       interactive mode\n\nFlags:\n  --config <file>            JSON config file (env overrides still apply)\n  --api <url>                API base URL (default http://127.0.0.1:8000/api/, env ACADWORLD_API_BASE)\n  --tokens <file>            token file (default {DEFAULT_TOKEN_FILE}, env ACADWORLD_TOKEN_FILE)\n  -h, --help                 show this help\n\nInteractive commands:\n  login <email> <password> | whoami | roles | get <path> | passwd <old> <new> | mode <ROLE> | logout | help | quit"
    );
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut config_file: Option<PathBuf> = None;
    let mut api: Option<String> = None;
    let mut tokens: Option<PathBuf> = None;
    let mut rest: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { eprintln!("--config requires a value"); print_usage(&program); std::process::exit(2); }
                config_file = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--api" => {
                if i + 1 >= args.len() { eprintln!("--api requires a URL"); print_usage(&program); std::process::exit(2); }
                api = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "--tokens" => {
                if i + 1 >= args.len() { eprintln!("--tokens requires a value"); print_usage(&program); std::process::exit(2); }
                tokens = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            other => { rest.push(other.to_string()); i += 1; }
        }
    }
    if rest.is_empty() {
        print_usage(&program);
        std::process::exit(2);
    }

    let mut cfg = match config_file {
        Some(path) => ClientConfig::from_file(&path)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(base) = api {
        cfg.api_base = base;
        cfg = cfg.validate()?;
    }
    if tokens.is_some() {
        cfg.token_file = tokens;
    } else if cfg.token_file.is_none() {
        cfg.token_file = Some(PathBuf::from(DEFAULT_TOKEN_FILE));
    }
    info!(target: "startup", "acadworld cli: api_base='{}', token_file={:?}", cfg.api_base, cfg.token_file);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    let ctx = Arc::new(SessionContext::from_config(&cfg)?);
    rt.block_on(async {
        ctx.spawn_termination_listener();
        if let Err(e) = ctx.bootstrap().await {
            eprintln!("warning: could not restore session: {}", e);
        }
    });

    if rest[0] == "repl" {
        return run_repl(&rt, &ctx);
    }
    rt.block_on(run_command(&ctx, &rest))
}

async fn run_command(ctx: &SessionContext, words: &[String]) -> Result<()> {
    let cmd = words.first().map(String::as_str).unwrap_or_default();
    match cmd {
        "login" => {
            let (email, password) = match (words.get(1), words.get(2)) {
                (Some(e), Some(p)) => (e, p),
                _ => return Err(anyhow!("usage: login <email> <password>")),
            };
            let snap = ctx.login(email, password).await?;
            println!("logged in");
            print_roles(&snap);
        }
        "whoami" => {
            let snap = ctx.snapshot();
            match &snap.user {
                Some(u) => println!("{}", serde_json::to_string_pretty(u)?),
                None => println!("not logged in"),
            }
        }
        "roles" => print_roles(&ctx.snapshot()),
        "mode" => {
            let role: Role = words.get(1).ok_or_else(|| anyhow!("usage: mode <ROLE>"))?.parse()?;
            if ctx.switch_mode(role) { println!("active mode: {}", role); } else { println!("role {} not held", role); }
        }
        "get" => {
            let path = words.get(1).ok_or_else(|| anyhow!("usage: get <path>"))?;
            let resp = ctx.send(ApiRequest::get(path.as_str())).await?;
            let body: serde_json::Value = resp.json().unwrap_or_else(|_| serde_json::Value::String(resp.body.clone()));
            println!("HTTP {}", resp.status);
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        "passwd" => {
            let (old, new) = match (words.get(1), words.get(2)) {
                (Some(o), Some(n)) => (o, n),
                _ => return Err(anyhow!("usage: passwd <old> <new>")),
            };
            ctx.change_password(old, new).await?;
            println!("password changed");
        }
        "logout" => {
            ctx.logout().await;
            println!("logged out");
        }
        other => return Err(anyhow!("unknown command '{}'", other)),
    }
    Ok(())
}

fn print_roles(snap: &SessionSnapshot) {
    if !snap.is_authenticated() {
        println!("not logged in");
        return;
    }
    let roles: Vec<&str> = snap.roles.iter().map(|r| r.as_str()).collect();
    let perms: Vec<&str> = snap.permissions.iter().map(|p| p.as_str()).collect();
    println!("roles: {}", roles.join(", "));
    println!("active mode: {}", snap.active_mode.map(|r| r.as_str()).unwrap_or("-"));
    println!("permissions: {}", perms.join(", "));
}

fn run_repl(rt: &tokio::runtime::Runtime, ctx: &Arc<SessionContext>) -> Result<()> {
    let mut rl = rustyline::DefaultEditor::new().context("Failed to create line editor")?;
    println!("acadworld interpreter. Type 'help' for commands.");
    loop {
        let line = match rl.readline("acadworld> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        let _ = rl.add_history_entry(line);
        let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        match words[0].to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => print_usage("acadworld_cli"),
            _ => {
                if let Err(e) = rt.block_on(run_command(ctx, &words)) { eprintln!("error: {}", e); }
            }
        }
    }
    Ok(())
}
