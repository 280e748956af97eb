// ABOUTME: Entry point for the fastssh CLI application.
// ABOUTME: Parses arguments and dispatches to the library's session operations.

mod cli;

use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands, Target};
use fastssh::config::{Config, EnvValue};
use fastssh::error::{Error, Result};
use fastssh::ssh::{self, ExecutionResult, Session, SessionConfig};
use std::env;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Run the selected command and return the process exit code.
async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { target } => {
            let session_config = session_config(&config, &target)?;
            if ssh::is_valid_connection(&session_config).await? {
                println!("ok");
                Ok(0)
            } else {
                println!("rejected");
                Ok(1)
            }
        }
        Commands::Exec {
            target,
            timeout,
            command,
        } => {
            let line = command.join(" ");
            let code = Session::scoped(session_config(&config, &target)?, async |session| {
                let result = match timeout {
                    Some(timeout) => session.exec_with_timeout(&line, timeout).await?,
                    None => session.exec(&line).await?,
                };
                print_result(&result)?;
                Ok(exit_code(result.exit_code()))
            })
            .await?;
            Ok(code)
        }
        Commands::Stream { target, command } => {
            let line = command.join(" ");
            let code = Session::scoped(session_config(&config, &target)?, async |session| {
                let handle = session
                    .async_exec(&line, |chunk: Bytes| {
                        let mut out = std::io::stdout().lock();
                        let _ = out.write_all(&chunk);
                        let _ = out.flush();
                    })
                    .await?;
                let status = handle.wait().await?;
                Ok(exit_code(status.code))
            })
            .await?;
            Ok(code)
        }
        Commands::Put {
            target,
            local,
            remote,
        } => {
            Session::scoped(session_config(&config, &target)?, async |session| {
                session.send_file(&remote, local.as_path()).await
            })
            .await?;
            Ok(0)
        }
        Commands::Get {
            target,
            remote,
            local,
        } => {
            let data = Session::scoped(session_config(&config, &target)?, async |session| {
                session.download_file(&remote).await
            })
            .await?;
            match local {
                Some(path) => std::fs::write(path, data)?,
                None => std::io::stdout().write_all(&data)?,
            }
            Ok(0)
        }
        Commands::Verify {
            target,
            remote,
            local,
        } => {
            Session::scoped(session_config(&config, &target)?, async |session| {
                session.verify_file_hash(&remote, &local).await
            })
            .await?;
            println!("ok");
            Ok(0)
        }
        Commands::Replace {
            target,
            remote,
            old,
            new,
            regex,
            count,
        } => {
            Session::scoped(session_config(&config, &target)?, async |session| {
                if regex {
                    session
                        .edit_file_regex_replace(&remote, &old, &new, count)
                        .await
                } else {
                    session.edit_file_replace(&remote, &old, &new, count).await
                }
            })
            .await?;
            Ok(0)
        }
    }
}

/// Load the given config file, or discover one in the working directory.
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path);
    }
    let cwd = env::current_dir()?;
    match Config::discover(&cwd) {
        Ok(config) => Ok(config),
        Err(Error::ConfigNotFound(_)) => Ok(Config::default()),
        Err(e) => Err(e),
    }
}

/// Resolve a target into session settings, applying command-line credentials.
fn session_config(config: &Config, target: &Target) -> Result<SessionConfig> {
    let mut host = config.resolve_target(&target.target)?;

    if let Some(identity) = &target.identity {
        host.key_path = Some(identity.clone());
    } else if host.key_path.is_none()
        && host.password.is_none()
        && env::var_os(&target.password_env).is_some()
    {
        host.password = Some(EnvValue::FromEnv {
            var: target.password_env.clone(),
            default: None,
        });
    }

    let user = env::var("USER").unwrap_or_else(|_| "root".to_string());
    host.session_config(&user)
}

fn print_result(result: &ExecutionResult) -> ssh::Result<()> {
    std::io::stdout().write_all(result.stdout_bytes())?;
    std::io::stderr().write_all(result.stderr_bytes())?;
    Ok(())
}

/// Remote exit codes pass through; signals become 1.
fn exit_code(code: i32) -> i32 {
    if code < 0 { 1 } else { code }
}
