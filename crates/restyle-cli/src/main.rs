use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::imageops::FilterType;
use serde_json::json;

use restyle_contracts::chat::{ChatMessage, ChatRole};
use restyle_contracts::compare::clamp_percent;
use restyle_contracts::events::EventLog;
use restyle_contracts::styles::default_catalog;
use restyle_engine::gateway::{DesignGateway, GatewayConfig, GeminiGateway, OfflineGateway};
use restyle_engine::{read_upload, Studio};

#[derive(Debug, Parser)]
#[command(name = "restyle", version, about = "AI room restyler shell")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the style catalog.
    Styles,
    /// Upload a room photo and restyle it interactively.
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Room photo to restyle.
    #[arg(long)]
    image: PathBuf,
    /// Output directory for exports and the event log.
    #[arg(long)]
    out: PathBuf,
    /// Event log path (defaults to <out>/events.jsonl).
    #[arg(long)]
    events: Option<PathBuf>,
    /// Run against the deterministic offline gateway (no key, no
    /// network).
    #[arg(long)]
    offline: bool,
    #[arg(long, default_value = "gemini-2.5-flash-image")]
    image_model: String,
    #[arg(long, default_value = "gemini-2.5-flash")]
    text_model: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("restyle error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Styles => {
            for style in default_catalog().iter() {
                println!("{}\n    {}", style.name, style.prompt);
            }
            Ok(())
        }
        Command::Chat(args) => run_chat(args),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventLog::new(&events_path);
    let gateway = build_gateway(&args)?;
    let catalog = default_catalog();
    let mut studio = Studio::new(gateway, catalog, events.clone());

    let source = read_upload(&args.image)?;
    println!("Generating the first style, this can take a moment...");
    if let Err(err) = studio.upload(source) {
        bail!("initial generation failed: {err}");
    }
    let selected = studio.selected_style().unwrap_or_default().to_string();
    println!("{selected} is ready. The remaining styles render in the background.");
    println!("Type a message to chat, or /help for commands.");

    let stdin = io::stdin();
    let mut line = String::new();
    let mut announced: HashSet<String> = studio
        .generated_styles()
        .iter()
        .map(|name| name.to_string())
        .collect();

    loop {
        studio.poll();
        announce_new_styles(&studio, &mut announced);

        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !handle_command(&mut studio, &events, &args.out, command)? {
                break;
            }
            continue;
        }

        let before = studio.transcript().len();
        studio.send_message(input)?;
        wait_for_chat(&mut studio);
        for message in &studio.transcript()[before + 1..] {
            print_message(message);
        }
    }
    Ok(())
}

fn build_gateway(args: &ChatArgs) -> Result<Arc<dyn DesignGateway>> {
    if args.offline {
        return Ok(Arc::new(OfflineGateway));
    }
    let api_key = gemini_api_key()
        .context("GEMINI_API_KEY or GOOGLE_API_KEY not set (use --offline to run without one)")?;
    let mut config = GatewayConfig::new(api_key);
    config.image_model = args.image_model.clone();
    config.text_model = args.text_model.clone();
    if let Some(base) = non_empty_env("GEMINI_API_BASE") {
        config.api_base = base;
    }
    Ok(Arc::new(GeminiGateway::new(config)))
}

/// Returns false when the loop should exit.
fn handle_command(
    studio: &mut Studio,
    events: &EventLog,
    out_dir: &Path,
    command: &str,
) -> Result<bool> {
    let (name, arg) = split_command(command);
    match name {
        "quit" | "exit" => return Ok(false),
        "help" => print_help(),
        "styles" => print_styles(studio),
        "style" => match studio.select_style(arg) {
            Ok(()) => println!("Now showing {arg}."),
            Err(err) => println!("{err}"),
        },
        "save" => save_artifact(studio, events, out_dir)?,
        "compare" => match arg.parse::<f64>() {
            Ok(percent) => write_comparison(studio, out_dir, percent)?,
            Err(_) => println!("Usage: /compare <percent>"),
        },
        other => println!("Unknown command /{other}. Try /help."),
    }
    Ok(true)
}

fn split_command(command: &str) -> (&str, &str) {
    match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    }
}

fn print_help() {
    println!("/styles            list styles and their readiness");
    println!("/style <name>      switch to a generated style");
    println!("/save              export the selected style as a PNG");
    println!("/compare <pct>     write a left/right comparison composite");
    println!("/quit              leave the shell");
    println!("Anything else is sent to the design assistant; messages");
    println!("starting with an edit verb (make, add, change, ...) edit");
    println!("the current image.");
}

fn print_styles(studio: &Studio) {
    let ready: HashSet<&str> = studio.generated_styles().into_iter().collect();
    let selected = studio.selected_style();
    for style in studio.catalog().iter() {
        let marker = if Some(style.name.as_str()) == selected {
            "*"
        } else if ready.contains(style.name.as_str()) {
            "+"
        } else {
            "."
        };
        println!("{marker} {}", style.name);
    }
}

fn announce_new_styles(studio: &Studio, announced: &mut HashSet<String>) {
    for name in studio.generated_styles() {
        if announced.insert(name.to_string()) {
            println!("[{name} is ready; /style {name} to view it]");
        }
    }
}

fn wait_for_chat(studio: &mut Studio) {
    if let Some(caption) = studio.caption() {
        println!("{caption}");
    }
    while studio.chat_pending() > 0 {
        studio.poll();
        thread::sleep(Duration::from_millis(50));
    }
}

fn print_message(message: &ChatMessage) {
    let speaker = match message.role {
        ChatRole::User => "you",
        ChatRole::Model => "assistant",
    };
    println!("{speaker}: {}", message.content);
    for product in &message.products {
        println!(
            "  * {}: {} [{}]",
            product.item_name, product.description, product.purchase_link
        );
    }
}

fn save_artifact(studio: &Studio, events: &EventLog, out_dir: &Path) -> Result<()> {
    let Some(artifact) = studio.export_artifact() else {
        println!("No style selected yet; nothing to save.");
        return Ok(());
    };
    let path = out_dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    if let Some(token) = studio.session_token() {
        let payload = json!({ "file": artifact.file_name })
            .as_object()
            .cloned()
            .unwrap_or_default();
        let _ = events.emit("artifact_exported", &token.to_string(), payload);
    }
    println!("Saved {}", path.display());
    Ok(())
}

/// Writes the comparator's reveal effect as a file: the generated image
/// is clipped to the left `percent` of the frame over the original.
fn write_comparison(studio: &Studio, out_dir: &Path, percent: f64) -> Result<()> {
    let percent = clamp_percent(percent);
    let Some(source) = studio.source() else {
        bail!("no session; upload an image first");
    };
    let Some(generated) = studio.selected_image() else {
        println!("No generated image selected yet.");
        return Ok(());
    };

    let original = image::load_from_memory(&source.bytes)
        .context("original image decode failed")?
        .to_rgba8();
    let generated = image::load_from_memory(generated)
        .context("generated image decode failed")?
        .to_rgba8();
    let generated = image::imageops::resize(
        &generated,
        original.width(),
        original.height(),
        FilterType::Triangle,
    );

    let mut canvas = original;
    let split = ((canvas.width() as f64) * percent / 100.0).round() as u32;
    let split = split.min(canvas.width());
    for y in 0..canvas.height() {
        for x in 0..split {
            canvas.put_pixel(x, y, *generated.get_pixel(x, y));
        }
    }

    let path = out_dir.join(format!("compare-{:03}.png", percent.round() as i64));
    canvas
        .save(&path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn gemini_api_key() -> Option<String> {
    non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
}
