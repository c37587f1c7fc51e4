//! Interactive ADMIN console.

use crate::commands::{format_message, format_response};
use crate::config::Config;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as EditorConfig, Editor};
use vatp_client::{AdminClient, Command as DriveCommand, Phase, Session, Transport};

const HELP_TEXT: &str = r#"
Available commands:
  help                Show this help
  status              Show session phase and user

  speed-up, up        Send SPEED_UP
  slow-down, down     Send SLOW_DOWN
  left                Send TURN_LEFT
  right               Send TURN_RIGHT
  send <command>      Send any drive command by name

  users               List connected users
  telemetry, t        Request a telemetry snapshot
  auth                Retry authentication

  quit, exit          Disconnect and exit
"#;

/// Connects, authenticates and runs the console until `quit` or EOF.
pub async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "VATP admin console".bold().cyan());
    println!("Connecting to {}...", config.server.addr);

    let mut client = AdminClient::open(&config.connection_config(), config.admin_config()).await?;
    client.connect().await?;
    println!("{}", "Connected!".green());

    report_auth(&mut client).await;

    // Create readline editor
    let editor_config = EditorConfig::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(editor_config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".vatp_history"))
        .unwrap_or_else(|_| ".vatp_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        if client.session().is_terminal() {
            println!("{}", "Connection lost.".red());
            break;
        }

        match rl.readline(&prompt(client.session())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    client.disconnect().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn report_auth<T: Transport>(client: &mut AdminClient<T>) {
    match client.authenticate().await {
        Ok(_) if client.session().is_authenticated() => println!(
            "{} as {}",
            "Authenticated".green(),
            client.session().username().cyan()
        ),
        Ok(response) => println!(
            "{}: {}\nCommands stay disabled; use 'auth' to retry.",
            "Not authenticated".yellow(),
            format_response(&response)
        ),
        Err(e) => println!("{}: {}", "Authentication failed".red(), e),
    }
}

async fn execute_repl_command<T: Transport>(
    client: &mut AdminClient<T>,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    if let Some(command) = drive_alias(&cmd) {
        let response = client.send_command(command).await?;
        return Ok(Some(format_response(&response)));
    }

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "status" => Ok(Some(status_text(client.session()))),

        "send" => {
            if args.is_empty() {
                return Ok(Some("Usage: send <command>".to_string()));
            }
            let command: DriveCommand = args.join(" ").parse()?;
            let response = client.send_command(command).await?;
            Ok(Some(format_response(&response)))
        }

        "users" => {
            let response = client.list_users().await?;
            Ok(Some(format_response(&response)))
        }

        "telemetry" | "t" => {
            let response = client.get_telemetry().await?;
            Ok(Some(format_message(&response)))
        }

        "auth" => {
            report_auth(client).await;
            Ok(Some(String::new()))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}

fn drive_alias(cmd: &str) -> Option<DriveCommand> {
    match cmd {
        "speed-up" | "up" => Some(DriveCommand::SpeedUp),
        "slow-down" | "down" => Some(DriveCommand::SlowDown),
        "left" => Some(DriveCommand::TurnLeft),
        "right" => Some(DriveCommand::TurnRight),
        _ => None,
    }
}

fn prompt(session: &Session) -> String {
    match session.phase() {
        Phase::Authenticated => format!("{} ", "vatp>".cyan()),
        Phase::ConnectedAdmin => format!("{} ", "vatp (not authenticated)>".yellow()),
        _ => format!("{} ", "vatp (offline)>".red()),
    }
}

fn status_text(session: &Session) -> String {
    let token = match session.token() {
        Some(_) => "held".green().to_string(),
        None => "none".yellow().to_string(),
    };
    let commands = if session.commands_enabled() {
        "enabled".green().to_string()
    } else {
        "disabled".yellow().to_string()
    };

    format!(
        "  User: {} ({})\n  Phase: {}\n  Token: {}\n  Commands: {}",
        session.username().cyan(),
        session.role(),
        session.phase(),
        token,
        commands
    )
}
