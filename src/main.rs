//! chatshot command line
//!
//! Usage:
//!   chatshot capture <HTML> [--last|--selected|--conversation|--message ID [--window prevN]]
//!   chatshot list <HTML>
//!   chatshot settings show|set <KEY> <VALUE>

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, info};

use chatshot::actions::{ActionDispatcher, ActionOutcome, LogNotifier, UserAction};
use chatshot::export::{DirectorySink, Exporter};
use chatshot::progress::{LogProgress, NoopProgress, ProgressReporter};
use chatshot::rendering::BitmapRasterizer;
use chatshot::settings::{PluginSettings, SettingsStore};
use chatshot::{Capturer, Conversation, WindowSpec};

#[derive(Parser)]
#[command(name = "chatshot", about = "Capture chat messages as PNG images", version)]
struct Cli {
    /// Host settings file (JSON object keyed by extension id)
    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture messages from a saved chat page
    Capture {
        /// Saved HTML of the chat page
        html: PathBuf,

        /// Capture the last message (default)
        #[arg(long, conflicts_with_all = ["selected", "conversation", "message"])]
        last: bool,

        /// Capture the selected message
        #[arg(long, conflicts_with_all = ["conversation", "message"])]
        selected: bool,

        /// Capture every message
        #[arg(long, conflicts_with = "message")]
        conversation: bool,

        /// Capture the message with this id
        #[arg(long)]
        message: Option<String>,

        /// Widen a --message capture: prev1..prev4 or next1..next4
        #[arg(long, requires = "message")]
        window: Option<WindowSpec>,

        /// Capture message bodies without the sender header
        #[arg(long)]
        no_header: bool,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Stage width in CSS pixels
        #[arg(long)]
        width: Option<u32>,

        /// Settle delay in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Output scale
        #[arg(long)]
        scale: Option<f32>,

        /// Render through serialized markup (overrides the stored setting)
        #[arg(long, conflicts_with = "direct_render")]
        alt_render: bool,

        /// Render the staged tree directly (overrides the stored setting)
        #[arg(long)]
        direct_render: bool,
    },

    /// List the messages of a saved chat page
    List {
        html: PathBuf,
    },

    /// Show or change the stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings as JSON
    Show,
    /// Set one key (camelCase name as stored)
    Set { key: String, value: String },
}

/// Render-mode flags as an override of the stored setting
fn render_override(alt_render: bool, direct_render: bool) -> Option<bool> {
    match (alt_render, direct_render) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

fn load_conversation(path: &Path) -> anyhow::Result<Conversation> {
    let html = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Conversation::parse(&html)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let store = SettingsStore::new(&cli.settings);

    match cli.command {
        Commands::Capture {
            html,
            last: _,
            selected,
            conversation,
            message,
            window,
            no_header,
            out,
            width,
            delay_ms,
            scale,
            alt_render,
            direct_render,
        } => {
            let action = match (message, window) {
                (Some(message_id), Some(window)) => UserAction::ContextMenu { message_id, window },
                (Some(message_id), None) => UserAction::CaptureMessage { message_id },
                (None, _) if selected => UserAction::CaptureSelected,
                (None, _) if conversation => UserAction::CaptureConversation,
                (None, _) => UserAction::CaptureLast,
            };

            let mut config = store.load()?.to_config();
            if let Some(ms) = delay_ms {
                config.delay_ms = ms;
            }
            if let Some(scale) = scale {
                config.scale = scale;
            }
            if let Some(alt) = render_override(alt_render, direct_render) {
                config.use_alternate_render_mode = alt;
            }
            debug!("capture config: {:?}", config);

            let conversation = load_conversation(&html)?;
            let rasterizer = BitmapRasterizer::new();
            let exporter = Exporter::new(config.file_prefix.clone(), Box::new(DirectorySink::new(&out)));
            let progress: &dyn ProgressReporter = if config.show_progress {
                &LogProgress
            } else {
                &NoopProgress
            };
            let capturer = Capturer::new(&conversation, &rasterizer, &exporter)
                .with_config(config)
                .with_progress(progress)
                .with_sizing_hint(width);

            let notifier = LogNotifier;
            let dispatcher = ActionDispatcher::new(&notifier).with_header(!no_header);
            match dispatcher.dispatch(&capturer, &action).await {
                ActionOutcome::Captured(outcome) => {
                    info!(
                        "saved {} ({}x{}, {} message(s))",
                        out.join(&outcome.filename).display(),
                        outcome.width,
                        outcome.height,
                        outcome.selection.len()
                    );
                    Ok(())
                }
                ActionOutcome::Ignored => Ok(()),
                ActionOutcome::Failed(text) => bail!(text),
            }
        }
        Commands::List { html } => {
            let conversation = load_conversation(&html)?;
            let last = conversation.last_message();
            let selected = conversation.selected_message();
            for message in conversation.messages() {
                let Some(meta) = conversation.meta(message) else { continue };
                let mut flags = Vec::new();
                if meta.is_user {
                    flags.push("user");
                }
                if Some(message) == last {
                    flags.push("last");
                }
                if Some(message) == selected {
                    flags.push("selected");
                }
                println!(
                    "{:>4}  {:<8}  {:<20}  {}",
                    message.ordinal(),
                    meta.id.as_deref().unwrap_or("-"),
                    meta.sender.as_deref().unwrap_or("-"),
                    flags.join(",")
                );
            }
            Ok(())
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = store.load()?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
                Ok(())
            }
            SettingsAction::Set { key, value } => {
                let current = serde_json::to_value(store.load()?)?;
                let mut record = match current {
                    serde_json::Value::Object(map) => map,
                    _ => bail!("settings did not serialize to an object"),
                };
                if !record.contains_key(&key) {
                    let known: Vec<&String> = record.keys().collect();
                    bail!("unknown setting '{}', expected one of {:?}", key, known);
                }
                let parsed = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                record.insert(key, parsed);
                let updated = PluginSettings::from_record(&serde_json::Value::Object(record));
                store.save(&updated)?;
                println!("{}", serde_json::to_string_pretty(&updated)?);
                Ok(())
            }
        },
    }
}
