//! Command execution.

use crate::config::Config;
use colored::Colorize;
use serde::Serialize;
use tokio::sync::mpsc;
use vatp_client::{
    AdminClient, Command as DriveCommand, ObserverClient, Response, Telemetry, TelemetryEvent,
    Transport,
};
use vatp_protocol::{BatteryLevel, ResponseStatus};

/// One line of `observe --json` output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ObserveLine<'a> {
    Telemetry(&'a Telemetry),
    Message { text: &'a str },
    Closed,
}

/// Streams telemetry to stdout until the server closes or Ctrl+C.
pub async fn observe(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let username = &config.observer.username;
    let mut observer = ObserverClient::open(&config.connection_config(), username.as_str())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    observer.connect(tx).await?;

    eprintln!(
        "{} {} as {}",
        "Observing".green(),
        config.server.addr,
        username.cyan()
    );
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(TelemetryEvent::Data(text)) => {
                        let message = Response::parse(&text);
                        if json {
                            println!("{}", observe_json(&message)?);
                        } else {
                            println!("{}\n", format_message(&message));
                        }
                    }
                    Some(TelemetryEvent::Closed) | None => {
                        if json {
                            println!("{}", serde_json::to_string(&ObserveLine::Closed)?);
                        }
                        eprintln!("{}", "Connection closed".red());
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n{}", "Stopping...".dimmed());
                observer.disconnect().await;
                break;
            }
        }
    }

    observer.wait_closed().await;
    Ok(())
}

/// Connects, authenticates and sends each command in order, then
/// disconnects. Returns the formatted responses.
pub async fn send_commands(
    config: &Config,
    commands: &[DriveCommand],
) -> Result<String, Box<dyn std::error::Error>> {
    let mut client = AdminClient::open(&config.connection_config(), config.admin_config())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    let result = execute(&mut client, commands).await;
    client.disconnect().await;
    result
}

/// Runs the one-shot ADMIN flow on an already open client.
pub async fn execute<T: Transport>(
    client: &mut AdminClient<T>,
    commands: &[DriveCommand],
) -> Result<String, Box<dyn std::error::Error>> {
    let auth = client.login().await?;
    if !client.session().is_authenticated() {
        return Err(format!("authentication failed: {}", auth.body().trim()).into());
    }

    let mut output = String::new();
    for command in commands {
        let response = client.send_command(*command).await?;
        output.push_str(&format!(
            "{} {}\n",
            command.as_str().cyan(),
            format_response(&response)
        ));
    }
    Ok(output.trim_end().to_string())
}

/// Serializes one received message for `observe --json`.
fn observe_json(message: &Response) -> serde_json::Result<String> {
    match Telemetry::parse(message) {
        Some(telemetry) => serde_json::to_string(&ObserveLine::Telemetry(&telemetry)),
        None => serde_json::to_string(&ObserveLine::Message {
            text: message.raw(),
        }),
    }
}

/// Formats a received message, as a telemetry panel when it carries one.
pub fn format_message(message: &Response) -> String {
    match Telemetry::parse(message) {
        Some(telemetry) => format_telemetry(&telemetry),
        None => format_response(message),
    }
}

/// Formats a telemetry snapshot; the battery is colored by charge band.
pub fn format_telemetry(telemetry: &Telemetry) -> String {
    let missing = || "--".dimmed().to_string();
    let number = |value: Option<f64>, unit: &str| match value {
        Some(value) => format!("{value:.2}{unit}"),
        None => missing(),
    };

    let battery = match telemetry.battery_percent {
        Some(percent) => {
            let text = format!("{percent:.2}%");
            match BatteryLevel::from_percent(percent) {
                BatteryLevel::Low => text.red().to_string(),
                BatteryLevel::Medium => text.yellow().to_string(),
                BatteryLevel::Normal => text.green().to_string(),
            }
        }
        None => missing(),
    };
    let status = match telemetry.moving {
        Some(true) => "moving".green().to_string(),
        Some(false) => "stopped".dimmed().to_string(),
        None => missing(),
    };
    let direction = match &telemetry.direction {
        Some(direction) => direction.cyan().to_string(),
        None => missing(),
    };

    format!(
        "  Speed:       {}\n  Battery:     {}\n  Temperature: {}\n  Direction:   {}\n  Status:      {}",
        number(telemetry.speed_kmh, " km/h"),
        battery,
        number(telemetry.temperature_c, " C"),
        direction,
        status
    )
}

/// Formats a server response for the terminal, colored by status.
pub fn format_response(response: &Response) -> String {
    let text = if response.body().trim().is_empty() {
        response.to_string()
    } else {
        response.body().trim_end().to_string()
    };

    match response.status() {
        ResponseStatus::Ok => text.green().to_string(),
        ResponseStatus::Error => text.red().to_string(),
        ResponseStatus::Telemetry => text.cyan().to_string(),
        ResponseStatus::Other(_) | ResponseStatus::Unknown => text,
    }
}
