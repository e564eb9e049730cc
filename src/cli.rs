use clap::Parser;

#[derive(Parser)]
#[command(name = "harmony-client")]
#[command(version = "0.3.0")]
#[command(about = "Terminal client for the Harmony mediation and meditation backend")]
pub struct Args {
    /// Display name used in rooms
    #[arg(long, default_value = "User")]
    pub name: String,

    /// Join a conflict-mediation room by id
    #[arg(long)]
    pub room: Option<String>,

    /// Open a resolution chat by id
    #[arg(long)]
    pub resolution: Option<String>,

    /// Start a guided-meditation chat over HTTP
    #[arg(long)]
    pub meditate: bool,

    /// Meditation API base URL
    #[arg(long, default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Mediation room WebSocket base URL
    #[arg(long, default_value = "ws://localhost:8000/ws/conflict")]
    pub mediation_url: String,

    /// Resolution chat WebSocket base URL
    #[arg(long, default_value = "ws://localhost:8000/ws")]
    pub resolution_url: String,
}

/// Which front-end the binary should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Mediate { room: String },
    Chat { resolution: String },
    Meditate,
}

/// Pick the mode from the mutually exclusive selection flags.
pub fn resolve_mode(args: &Args) -> Result<Mode, String> {
    match (&args.room, &args.resolution, args.meditate) {
        (Some(room), None, false) => Ok(Mode::Mediate { room: room.clone() }),
        (None, Some(resolution), false) => Ok(Mode::Chat {
            resolution: resolution.clone(),
        }),
        (None, None, true) => Ok(Mode::Meditate),
        (None, None, false) => {
            Err("pick a mode: --room <id>, --resolution <id>, or --meditate".to_string())
        }
        _ => Err("pick exactly one of --room, --resolution, --meditate".to_string()),
    }
}
