mod walk;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use plaza::{
    ConnectionController, ConnectionState, Credentials, SyncConfig, SyncEvent, WsConnector,
};
use walk::CircleWalk;

const FRAME_TIME: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "plaza-client")]
#[command(about = "Headless plaza sync client")]
struct Args {
    #[arg(short, long, help = "Server WebSocket URL (e.g., ws://127.0.0.1:3001)")]
    endpoint: Option<String>,

    #[arg(short, long, help = "Session token")]
    token: String,

    #[arg(short, long, default_value = "Wanderer")]
    name: String,

    #[arg(long, default_value = "default")]
    skin: String,

    #[arg(short, long, help = "JSON file with sync settings")]
    config: Option<PathBuf>,

    #[arg(long = "chat", help = "Chat line to send once connected (repeatable)")]
    chat: Vec<String>,

    #[arg(short, long, default_value_t = 30, help = "Seconds to stay online, 0 runs forever")]
    duration: u64,

    #[arg(long, default_value_t = 120.0, help = "Radius of the scripted walk")]
    radius: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let connector = WsConnector::new(Duration::from_millis(config.connect_timeout_ms));
    let mut controller = ConnectionController::new(config, connector);

    let credentials = Credentials::new(args.token.clone(), args.name.clone(), args.skin.clone());
    let outcome = controller.connect(credentials)?;
    log::info!("Connect: {:?}", outcome);

    let started = Instant::now();
    let limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let mut walk = CircleWalk::new(args.radius);
    let mut pending_chat = args.chat.clone();
    pending_chat.reverse();

    loop {
        controller.update();
        controller.tick();

        if controller.is_connected() {
            let (position, animation) = walk.step(FRAME_TIME.as_secs_f32());
            controller.publish_position(position, animation);

            if let Some(line) = pending_chat.pop() {
                match controller.send_chat(&line) {
                    Ok(Some(id)) => log::info!("Queued chat {}", id),
                    Ok(None) => log::debug!("Chat suppressed: {}", line),
                    Err(e) => log::warn!("Chat failed: {}", e),
                }
            }
        }

        for event in controller.drain_events() {
            report(&event);
        }

        if controller.state() == ConnectionState::Failed {
            let reason = controller
                .last_error()
                .map(ToString::to_string)
                .unwrap_or_else(|| String::from("unknown error"));
            anyhow::bail!("Could not stay connected: {}", reason);
        }

        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        thread::sleep(FRAME_TIME);
    }

    log::info!("Stats: {:?}", controller.stats());
    controller.disconnect();
    Ok(())
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SyncConfig::from_json_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => SyncConfig::default(),
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    Ok(config)
}

fn report(event: &SyncEvent) {
    match event {
        SyncEvent::StatusChanged(state) => match state.status_text() {
            Some(text) => log::info!("[status] {}", text),
            None => log::info!("[status] {:?}", state),
        },
        SyncEvent::IdentityAssigned { id } => log::info!("Playing as {}", id),
        SyncEvent::AvatarJoined { id, display_name } => {
            log::info!("{} joined ({})", display_name, id)
        }
        SyncEvent::AvatarLeft { id, display_name } => {
            log::info!("{} left", display_name.as_deref().unwrap_or(id))
        }
        SyncEvent::Chat(chat) => log::info!("<{}> {}", chat.sender, chat.content),
        SyncEvent::OnlineCount(count) => log::info!("{} online", count),
    }
}
