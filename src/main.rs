use clap::Parser;
use colored::*;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

use harmony_client::cli::{resolve_mode, Args, Mode};
use harmony_client::config::ClientConfig;
use harmony_client::meditation::MeditationClient;
use harmony_client::protocol::{ChatMessage, ChatParticipant, EventKind, RoomEvent, AI_MEDIATOR_ID};
use harmony_client::rooms::{generate_user_id, MediationRoom, ResolutionChat};
use harmony_client::session::SessionManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mode = resolve_mode(&args)?;
    let config = ClientConfig::new(&args.api_url, &args.mediation_url, &args.resolution_url);

    match mode {
        Mode::Mediate { room } => run_mediation(&config, &room, &args.name).await,
        Mode::Chat { resolution } => run_resolution_chat(&config, &resolution, &args.name).await,
        Mode::Meditate => run_meditation(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Mediation room front-end
// ---------------------------------------------------------------------------

async fn run_mediation(
    config: &ClientConfig,
    room_id: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionManager::new();
    let room = MediationRoom::new(session.clone(), &config.mediation_ws_url, room_id, name);

    println!("{}", "HARMONY MEDIATION".bright_cyan().bold());
    println!("{}: {}", "Room".bright_yellow(), room_id);
    println!("{}: {} ({})", "You".bright_yellow(), name, room.user_id());
    println!("{}", "=".repeat(50).bright_blue());

    let _events = room.on_event(|event| print_room_event(&event));

    if room.join().await {
        println!("{}", format!("connected to room {room_id}").bright_green());
    } else {
        eprintln!(
            "{}",
            "could not reach the room, reconnecting in the background".bright_red()
        );
    }

    println!(
        "{}",
        "type a message, /mediate to invite the AI mediator, /quit to leave".bright_black()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match line.as_str() {
            "/quit" => break,
            "/mediate" => {
                if !room.request_mediation() {
                    println!("{}", "not connected; mediation request dropped".bright_red());
                }
            }
            _ => {
                if !room.send_message(&line) {
                    println!("{}", "not connected; message dropped".bright_red());
                }
            }
        }
    }

    room.leave();
    println!("{}", "left the room".bright_black());
    Ok(())
}

fn display_name(event: &RoomEvent) -> String {
    if let Some(name) = &event.user_name {
        return name.clone();
    }
    match event.user_id.as_deref() {
        Some(AI_MEDIATOR_ID) => "Mediator".to_string(),
        Some("system") => "System".to_string(),
        _ => "Unknown".to_string(),
    }
}

fn print_room_event(event: &RoomEvent) {
    let line = format!("[{}] {}", display_name(event), event.content);
    match event.kind {
        EventKind::Ai => println!("{}", line.bright_magenta()),
        EventKind::System => println!("{}", line.bright_black()),
        EventKind::User | EventKind::Unknown => println!("{}", line.normal()),
    }
}

// ---------------------------------------------------------------------------
// Resolution chat front-end
// ---------------------------------------------------------------------------

async fn run_resolution_chat(
    config: &ClientConfig,
    resolution_id: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionManager::new();
    let local = ChatParticipant {
        id: generate_user_id(),
        name: name.to_string(),
    };
    let chat = ResolutionChat::new(
        session.clone(),
        &config.resolution_ws_url,
        resolution_id,
        local,
    );

    println!("{}", "HARMONY RESOLUTION CHAT".bright_cyan().bold());
    println!("{}: {}", "Resolution".bright_yellow(), resolution_id);
    println!("{}", "=".repeat(50).bright_blue());

    let local_id = chat.local_participant().id.clone();
    let _messages = chat.on_message(move |message| print_chat_message(&message, &local_id));

    if chat.open().await {
        println!("{}", "connected".bright_green());
    } else {
        eprintln!(
            "{}",
            "could not reach the chat, reconnecting in the background".bright_red()
        );
    }

    println!("{}", "type a message, /quit to leave".bright_black());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if chat.send(&line).is_none() {
            println!("{}", "not connected; message dropped".bright_red());
        }
    }

    chat.close();
    println!("{}", "chat closed".bright_black());
    Ok(())
}

fn print_chat_message(message: &ChatMessage, local_id: &str) {
    let header = format!("{} · {}", message.sender.name, message.timestamp);
    if message.sender.id == local_id {
        println!("{}", header.bright_cyan());
    } else {
        println!("{}", header.bright_yellow());
    }
    println!("  {}", message.text);
}

// ---------------------------------------------------------------------------
// Meditation front-end
// ---------------------------------------------------------------------------

async fn run_meditation(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = MeditationClient::new(config);

    println!("{}", "HARMONY MEDITATION".bright_cyan().bold());
    println!("{}: {}", "Endpoint".bright_yellow(), client.chat_url());
    println!("{}", "=".repeat(50).bright_blue());
    if let Some(greeting) = client.latest() {
        println!("{}", greeting.text.bright_magenta());
    }
    println!("{}", "share your thoughts, /quit to end the session".bright_black());

    print!("> ");
    let _ = io::stdout().flush();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            print!("> ");
            let _ = io::stdout().flush();
            continue;
        }
        if line == "/quit" {
            break;
        }
        match client.send(&line).await {
            Ok(text) => println!("{}", text.bright_magenta()),
            Err(err) => println!("{}", err.to_string().bright_red()),
        }
        print!("> ");
        let _ = io::stdout().flush();
    }

    println!("{}", "session ended".bright_black());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
