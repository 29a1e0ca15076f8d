use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use studio_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use studio_contracts::events::EventWriter;
use studio_contracts::models::{ModelSelection, ModelSelector};
use studio_contracts::studio::{normalize_color, Mode, PALETTE};
use studio_engine::codec::{media_type_of, read_image_file};
use studio_engine::{
    default_generator_registry, EnvLayer, GeminiConfig, GenerationClient, ImageGeneratorRegistry,
    ImageSlot, Studio, StudioStatus,
};

const EDIT_CAPABILITY: &str = "edit";

#[derive(Debug, Parser)]
#[command(name = "studio", version, about = "E-com Studio AI: product photo transformations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, value_parser = parse_mode)]
    mode: Mode,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    model_image: Option<PathBuf>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    refine: Vec<String>,
    #[command(flatten)]
    session: SessionArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    Mode::parse(raw).ok_or_else(|| {
        let known = Mode::ALL
            .iter()
            .map(|mode| mode.wire_name())
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown mode '{raw}' (expected one of: {known})")
    })
}

/// Everything one chat or run invocation shares.
struct Session {
    studio: Studio,
    events: EventWriter,
    out_dir: PathBuf,
    selector: ModelSelector,
    generators: ImageGeneratorRegistry,
}

impl Session {
    fn open(args: &SessionArgs) -> Result<Self> {
        fs::create_dir_all(&args.out)
            .with_context(|| format!("failed to create {}", args.out.display()))?;
        let events_path = args
            .events
            .clone()
            .unwrap_or_else(|| args.out.join("events.jsonl"));

        let layer = match &args.env_file {
            Some(path) => {
                if !path.is_file() {
                    bail!("env file not found: {}", path.display());
                }
                EnvLayer::with_dotenv_file(path)
            }
            None => EnvLayer::with_dotenv_file(Path::new(".env")),
        };
        let generators = default_generator_registry(GeminiConfig::from_layer(&layer))?;
        let selector = ModelSelector::new(None);
        let requested = args.image_model.clone().unwrap_or_else(|| layer.image_model());
        let (client, selection) = select_client(&selector, &generators, &requested)?;
        if let Some(reason) = &selection.fallback_reason {
            println!("{reason}");
        }

        let events = EventWriter::for_new_session(events_path);
        events.emit(
            "session_started",
            json_object(json!({
                "out_dir": args.out.to_string_lossy(),
                "image_model": selection.model.name,
                "provider": selection.model.provider,
                "requested_model": selection.requested,
                "fallback_reason": selection.fallback_reason,
            })),
        )?;

        Ok(Self {
            studio: Studio::new(client).with_events(events.clone()),
            events,
            out_dir: args.out.clone(),
            selector,
            generators,
        })
    }

    fn switch_model(&mut self, requested: &str) -> Result<ModelSelection> {
        let (client, selection) = select_client(&self.selector, &self.generators, requested)?;
        self.studio.set_client(client);
        Ok(selection)
    }

    fn finish(&self, exit_code: i32) -> Result<()> {
        self.events.emit(
            "session_finished",
            json_object(json!({
                "status": self.studio.status().as_str(),
                "exit_code": exit_code,
            })),
        )?;
        Ok(())
    }
}

fn select_client(
    selector: &ModelSelector,
    generators: &ImageGeneratorRegistry,
    requested: &str,
) -> Result<(GenerationClient, ModelSelection)> {
    let selection = selector
        .select(Some(requested), EDIT_CAPABILITY)
        .map_err(anyhow::Error::msg)?;
    let Some(generator) = generators.get(&selection.model.provider) else {
        bail!(
            "no provider registered for '{}' (model {})",
            selection.model.provider,
            selection.model.name
        );
    };
    Ok((
        GenerationClient::new(generator, selection.model.name.clone()),
        selection,
    ))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut session = Session::open(&args.session)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!("E-com Studio chat started. Type /help for commands.");
    print_mode(&session.studio);

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        if intent.action == "quit" {
            break;
        }
        handle_intent(&mut session, &intent);
    }

    session.finish(0)
}

/// Applies one chat intent. Failures are reported inline; the loop keeps going.
fn handle_intent(session: &mut Session, intent: &Intent) {
    let studio = &mut session.studio;
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            println!("Plain text sets the edit instruction, or refines the current result.");
        }
        "list_modes" => {
            for mode in Mode::ALL {
                let marker = if mode == studio.mode() { "*" } else { " " };
                println!("{marker} {:<14} {}", mode.wire_name(), mode.label());
            }
        }
        "set_mode" => {
            let Some(raw) = intent.arg("mode") else {
                println!("/mode requires a mode (see /modes)");
                return;
            };
            match parse_mode(raw) {
                Ok(mode) => {
                    studio.set_mode(mode);
                    print_mode(studio);
                }
                Err(message) => println!("{message}"),
            }
        }
        "set_main_image" | "set_model_image" => {
            let slot = if intent.action == "set_model_image" {
                ImageSlot::Model
            } else {
                ImageSlot::Main
            };
            if slot == ImageSlot::Model && !studio.mode().needs_model_image() {
                println!("Model photos are only used in tryOn mode.");
                return;
            }
            let Some(path) = intent.arg("path") else {
                println!("{} requires a path", command_name(intent));
                return;
            };
            match read_image_file(Path::new(path)) {
                Ok(image) => {
                    println!(
                        "{}: {} ({})",
                        studio.uploader_label(slot),
                        image.name,
                        image.mime_type
                    );
                    studio.set_image(slot, Some(image));
                }
                Err(err) => println!("Upload failed: {err:#}"),
            }
        }
        "clear_image" => {
            let slot = match intent.arg("target").map(str::to_ascii_lowercase).as_deref() {
                None | Some("main") | Some("garment") | Some("image") => ImageSlot::Main,
                Some("model") | Some("model_photo") => ImageSlot::Model,
                Some(other) => {
                    println!("Unknown image target '{other}' (use main or model)");
                    return;
                }
            };
            studio.set_image(slot, None);
            println!("Cleared {}", studio.uploader_label(slot));
        }
        "set_color" => {
            let Some(raw) = intent.arg("color") else {
                println!("Background color: {}", studio.background_color());
                return;
            };
            let Some(color) = normalize_color(raw) else {
                println!("Colors must be a palette name or #rgb / #rrggbb hex (see /colors)");
                return;
            };
            if !studio.mode().uses_background_color() {
                println!("Note: background color only applies to model and flatlay modes.");
            }
            studio.set_background_color(color);
            println!("Background color set to {}", studio.background_color());
        }
        "list_colors" => {
            for swatch in PALETTE {
                let marker = if swatch.hex.eq_ignore_ascii_case(studio.background_color()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {} {}", swatch.hex, swatch.name);
            }
        }
        "set_prompt" => {
            let text = intent.arg("text").unwrap_or_default();
            studio.set_text_prompt(text);
            if studio.mode() != Mode::AiEdit {
                println!("Note: the edit instruction is only used in aiEdit mode.");
            }
            println!("Edit instruction: {text}");
        }
        "generate" => {
            if studio.is_generate_disabled() {
                println!("{}", generate_hint(studio));
                return;
            }
            println!("{}", studio.mode().loading_text());
            studio.press_generate();
            report(studio);
        }
        "regenerate" => {
            if studio.result_image().is_none() {
                println!("Nothing to regenerate yet; use /generate first.");
                return;
            }
            println!("{}", studio.mode().loading_text());
            studio.regenerate();
            report(studio);
        }
        "refine" => {
            if let Some(text) = intent.arg("text") {
                studio.set_refinement_prompt(text);
            }
            refine(studio);
        }
        "text" => {
            let text = intent.text.as_deref().unwrap_or_default();
            if studio.show_refinement() {
                studio.set_refinement_prompt(text);
                refine(studio);
            } else if studio.mode() == Mode::AiEdit {
                studio.set_text_prompt(text);
                println!("Edit instruction: {text}");
            } else {
                println!("Plain text is an edit instruction in aiEdit mode, or refines a result.");
            }
        }
        "save_result" => {
            let dir = intent
                .arg("path")
                .map(PathBuf::from)
                .unwrap_or_else(|| session.out_dir.clone());
            match session.studio.save_result(&dir) {
                Ok(path) => println!("Saved {}", path.display()),
                Err(err) => println!("Save failed: {err:#}"),
            }
        }
        "set_image_model" => {
            let Some(requested) = intent.arg("model") else {
                let current = studio.client().model();
                for model in session.selector.registry.list() {
                    let marker = if model.name == current { "*" } else { " " };
                    println!("{marker} {} ({})", model.name, model.provider);
                }
                return;
            };
            match session.switch_model(requested) {
                Ok(selection) => {
                    if let Some(reason) = &selection.fallback_reason {
                        println!("{reason}");
                    }
                    println!("Image model set to {}", selection.model.name);
                }
                Err(err) => println!("Model change failed: {err:#}"),
            }
        }
        "status" => print_status(studio),
        "unknown" => {
            let command = intent.arg("command").unwrap_or_default();
            println!("Unknown command: /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action: {other}"),
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut session = Session::open(&args.session)?;
    let studio = &mut session.studio;
    studio.set_mode(args.mode);
    studio.set_main_image(Some(read_image_file(&args.image)?));
    if let Some(path) = &args.model_image {
        studio.set_model_image(Some(read_image_file(path)?));
    }
    if let Some(raw) = &args.color {
        let Some(color) = normalize_color(raw) else {
            bail!("invalid color '{raw}' (expected a palette name or #rgb / #rrggbb)");
        };
        studio.set_background_color(color);
    }
    if let Some(prompt) = &args.prompt {
        studio.set_text_prompt(prompt.clone());
    }

    let mut status = studio.generate();
    for instruction in &args.refine {
        if status != StudioStatus::Succeeded {
            break;
        }
        studio.set_refinement_prompt(instruction.clone());
        status = studio.refine();
    }

    let exit_code = match status {
        StudioStatus::Succeeded => {
            let path = session.studio.save_result(&session.out_dir)?;
            println!("{}", path.display());
            0
        }
        _ => {
            eprintln!("{}", session.studio.error().unwrap_or("Generation did not finish."));
            1
        }
    };
    session.finish(exit_code)?;
    Ok(exit_code)
}

fn refine(studio: &mut Studio) {
    if studio.result_image().is_none() {
        println!("Nothing to refine yet; use /generate first.");
        return;
    }
    if !studio.mode().is_refinable() {
        println!("Converted images cannot be refined.");
        return;
    }
    if studio.is_refine_disabled() {
        println!("Describe the change, {}", studio.mode().refinement_placeholder());
        return;
    }
    println!("Refining...");
    studio.refine();
    report(studio);
}

/// Why the primary action is unavailable right now.
fn generate_hint(studio: &Studio) -> String {
    let mode = studio.mode();
    if studio.is_loading() {
        return format!("{} Please wait.", mode.loading_text());
    }
    let main_missing = studio.main_image().is_none();
    let model_missing = mode.needs_model_image() && studio.model_image().is_none();
    if main_missing || model_missing {
        return mode.missing_image_message().to_string();
    }
    if mode == Mode::AiEdit && studio.text_prompt().trim().is_empty() {
        return "Describe the edit first (plain text or /prompt).".to_string();
    }
    format!("{} is not available.", mode.action_text())
}

fn report(studio: &Studio) {
    match studio.status() {
        StudioStatus::Succeeded => {
            let media = studio
                .result_image()
                .and_then(media_type_of)
                .unwrap_or("image");
            println!("Result ready ({media}). /save to write it to disk.");
            if studio.show_refinement() {
                println!("Refine with plain text, {}", studio.mode().refinement_placeholder());
            }
        }
        StudioStatus::Failed => {
            println!("{}", studio.error().unwrap_or_default());
        }
        StudioStatus::Idle | StudioStatus::Loading => {}
    }
}

fn print_mode(studio: &Studio) {
    let mode = studio.mode();
    if mode.needs_model_image() {
        println!(
            "Mode: {}. /garment for the {}, /model_photo for the {}.",
            mode.label(),
            studio.uploader_label(ImageSlot::Main),
            studio.uploader_label(ImageSlot::Model)
        );
    } else {
        println!("Mode: {}. /upload: {}.", mode.label(), mode.uploader_label());
    }
}

fn print_status(studio: &Studio) {
    let mode = studio.mode();
    println!("Mode: {} ({})", mode.label(), mode.wire_name());
    let image_name = |slot: ImageSlot| {
        let image = match slot {
            ImageSlot::Main => studio.main_image(),
            ImageSlot::Model => studio.model_image(),
        };
        image.map(|file| file.name.as_str()).unwrap_or("(none)")
    };
    println!(
        "{}: {}",
        studio.uploader_label(ImageSlot::Main),
        image_name(ImageSlot::Main)
    );
    if mode.needs_model_image() {
        println!(
            "{}: {}",
            studio.uploader_label(ImageSlot::Model),
            image_name(ImageSlot::Model)
        );
    }
    if mode.uses_background_color() {
        println!("Background color: {}", studio.background_color());
    }
    if mode == Mode::AiEdit {
        println!("Edit instruction: {}", studio.text_prompt());
    }
    println!(
        "Image model: {} ({})",
        studio.client().model(),
        studio.client().provider()
    );
    println!("Status: {}", studio.status().as_str());
    if let Some(error) = studio.error() {
        println!("Error: {error}");
    }
}

fn command_name(intent: &Intent) -> &str {
    intent
        .raw
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
