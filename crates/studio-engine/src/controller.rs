//! The studio state machine: inputs, one outstanding request, one result.
//!
//! A request runs in three steps. `begin_*` validates nothing, clears what the
//! new request replaces and marks the studio as loading; it hands back a
//! [`PendingJob`] that owns everything the request needs. `PendingJob::run`
//! performs the work (validation included) and may run on any thread.
//! `finish` applies the outcome. The blocking helpers `generate`, `refine`
//! and `regenerate` chain the three.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use studio_contracts::events::EventWriter;
use studio_contracts::studio::{ImageFile, Mode, SubjectKind, DEFAULT_BACKGROUND_COLOR};

use crate::client::GenerationClient;
use crate::codec::{self, DEFAULT_WEBP_QUALITY};
use crate::error::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioStatus {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl StudioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    /// The single upload target; the garment in try-on mode.
    Main,
    /// The model photo, used only by try-on.
    Model,
}

impl ImageSlot {
    fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone)]
enum JobKind {
    ConvertToWebP {
        image: ImageFile,
        quality: f32,
    },
    ChangeBackground {
        image: ImageFile,
        color: String,
        subject: SubjectKind,
    },
    TryOn {
        garment: ImageFile,
        model_image: ImageFile,
    },
    Edit {
        image: ImageFile,
        instruction: String,
    },
    Render {
        image: ImageFile,
    },
}

impl JobKind {
    fn label(&self) -> &'static str {
        match self {
            Self::ConvertToWebP { .. } => "convert_to_webp",
            Self::ChangeBackground { .. } => "change_background",
            Self::TryOn { .. } => "virtual_try_on",
            Self::Edit { .. } => "edit_with_text",
            Self::Render { .. } => "render_ghost_mannequin",
        }
    }
}

/// A request detached from the studio. Owns its inputs and a client handle.
pub struct PendingJob {
    ticket: u64,
    refinement: bool,
    work: Result<JobKind, StudioError>,
    client: GenerationClient,
}

/// What a finished [`PendingJob`] hands back to [`Studio::finish`].
#[derive(Debug, Clone)]
pub struct JobOutcome {
    ticket: u64,
    refinement: bool,
    operation: &'static str,
    result: Result<String, StudioError>,
}

impl PendingJob {
    pub fn operation(&self) -> &'static str {
        match &self.work {
            Ok(kind) => kind.label(),
            Err(_) => "invalid",
        }
    }

    /// Runs the request to completion. Only conversion touches the codec;
    /// every other operation goes through the generation client.
    pub fn run(self) -> JobOutcome {
        let operation = self.operation();
        let client = self.client;
        let result = self.work.and_then(|kind| match kind {
            JobKind::ConvertToWebP { image, quality } => {
                codec::convert_to_webp(&image.data_url, quality)
            }
            JobKind::ChangeBackground {
                image,
                color,
                subject,
            } => client
                .change_background(&image, &color, subject)
                .map(|raw| codec::process_final_image(&raw)),
            JobKind::TryOn {
                garment,
                model_image,
            } => client
                .virtual_try_on(&garment, &model_image)
                .map(|raw| codec::process_final_image(&raw)),
            JobKind::Edit { image, instruction } => client
                .edit_with_text(&image, &instruction)
                .map(|raw| codec::process_final_image(&raw)),
            JobKind::Render { image } => client
                .render_ghost_mannequin(&image)
                .map(|raw| codec::process_final_image(&raw)),
        });
        JobOutcome {
            ticket: self.ticket,
            refinement: self.refinement,
            operation,
            result,
        }
    }
}

pub struct Studio {
    mode: Mode,
    main_image: Option<ImageFile>,
    model_image: Option<ImageFile>,
    background_color: String,
    text_prompt: String,
    refinement_prompt: String,
    result_image: Option<String>,
    is_loading: bool,
    error: Option<String>,
    webp_quality: f32,
    ticket: u64,
    /// Ticket of the job handed out and not yet returned through `finish`.
    in_flight: Option<u64>,
    client: GenerationClient,
    events: Option<EventWriter>,
    event_log_failed: Cell<bool>,
}

impl Studio {
    pub fn new(client: GenerationClient) -> Self {
        Self {
            mode: Mode::default(),
            main_image: None,
            model_image: None,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            text_prompt: String::new(),
            refinement_prompt: String::new(),
            result_image: None,
            is_loading: false,
            error: None,
            webp_quality: DEFAULT_WEBP_QUALITY,
            ticket: 0,
            in_flight: None,
            client,
            events: None,
            event_log_failed: Cell::new(false),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_webp_quality(mut self, quality: f32) -> Self {
        self.webp_quality = quality.clamp(0.0, 1.0);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn main_image(&self) -> Option<&ImageFile> {
        self.main_image.as_ref()
    }

    pub fn model_image(&self) -> Option<&ImageFile> {
        self.model_image.as_ref()
    }

    pub fn background_color(&self) -> &str {
        &self.background_color
    }

    pub fn text_prompt(&self) -> &str {
        &self.text_prompt
    }

    pub fn refinement_prompt(&self) -> &str {
        &self.refinement_prompt
    }

    pub fn result_image(&self) -> Option<&str> {
        self.result_image.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    /// Swaps the backend; the current inputs and result are kept.
    pub fn set_client(&mut self, client: GenerationClient) {
        self.client = client;
    }

    pub fn status(&self) -> StudioStatus {
        if self.is_loading {
            StudioStatus::Loading
        } else if self.error.is_some() {
            StudioStatus::Failed
        } else if self.result_image.is_some() {
            StudioStatus::Succeeded
        } else {
            StudioStatus::Idle
        }
    }

    pub fn uploader_label(&self, slot: ImageSlot) -> &'static str {
        match (self.mode, slot) {
            (Mode::TryOn, ImageSlot::Main) => "Upload Garment",
            (Mode::TryOn, ImageSlot::Model) => "Upload Model",
            (mode, _) => mode.uploader_label(),
        }
    }

    pub fn action_text(&self) -> &'static str {
        if self.is_loading {
            self.mode.loading_text()
        } else {
            self.mode.action_text()
        }
    }

    pub fn is_generate_disabled(&self) -> bool {
        if self.in_flight.is_some() {
            return true;
        }
        if self.mode == Mode::TryOn {
            return self.main_image.is_none() || self.model_image.is_none();
        }
        if self.main_image.is_none() {
            return true;
        }
        self.mode == Mode::AiEdit && self.text_prompt.trim().is_empty()
    }

    pub fn is_refine_disabled(&self) -> bool {
        self.result_image.is_none() || self.refinement_prompt.trim().is_empty() || self.is_loading
    }

    pub fn show_refinement(&self) -> bool {
        self.result_image.is_some() && !self.is_loading && self.mode.is_refinable()
    }

    /// Selecting a mode always lands in Idle with every input reset.
    ///
    /// An outstanding request keeps running and its outcome is dropped. No
    /// new request starts until that outcome has been passed to `finish`.
    pub fn set_mode(&mut self, mode: Mode) {
        let previous = self.mode;
        self.mode = mode;
        self.result_image = None;
        self.error = None;
        self.main_image = None;
        self.model_image = None;
        self.text_prompt.clear();
        self.background_color = DEFAULT_BACKGROUND_COLOR.to_string();
        self.refinement_prompt.clear();
        if self.is_loading {
            self.is_loading = false;
            self.ticket += 1;
        }
        self.emit(
            "mode_changed",
            json!({ "from": previous.wire_name(), "mode": mode.wire_name() }),
        );
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: Option<ImageFile>) {
        match &image {
            Some(file) => self.emit(
                "image_loaded",
                json!({
                    "slot": slot.as_str(),
                    "name": file.name,
                    "mime_type": file.mime_type,
                }),
            ),
            None => self.emit("image_cleared", json!({ "slot": slot.as_str() })),
        }
        match slot {
            ImageSlot::Main => self.main_image = image,
            ImageSlot::Model => self.model_image = image,
        }
    }

    pub fn set_main_image(&mut self, image: Option<ImageFile>) {
        self.set_image(ImageSlot::Main, image);
    }

    pub fn set_model_image(&mut self, image: Option<ImageFile>) {
        self.set_image(ImageSlot::Model, image);
    }

    pub fn set_background_color(&mut self, color: impl Into<String>) {
        self.background_color = color.into();
    }

    pub fn set_text_prompt(&mut self, text: impl Into<String>) {
        self.text_prompt = text.into();
    }

    pub fn set_refinement_prompt(&mut self, text: impl Into<String>) {
        self.refinement_prompt = text.into();
    }

    /// Starts the current mode's request. `None` while another is outstanding.
    pub fn begin_generate(&mut self) -> Option<PendingJob> {
        if self.in_flight.is_some() {
            return None;
        }
        self.result_image = None;
        let work = self.build_generate_work();
        Some(self.start(work, false))
    }

    /// Starts an edit of the current result with the refinement instruction.
    /// Conversion results are never refined.
    pub fn begin_refine(&mut self) -> Option<PendingJob> {
        if self.in_flight.is_some() || self.is_refine_disabled() || !self.mode.is_refinable() {
            return None;
        }
        let image = ImageFile::from_result(self.result_image.as_deref().unwrap_or_default());
        let work = Ok(JobKind::Edit {
            image,
            instruction: self.refinement_prompt.clone(),
        });
        Some(self.start(work, true))
    }

    /// Applies a finished job. Outcomes from before a mode change are ignored.
    pub fn finish(&mut self, outcome: JobOutcome) {
        if self.in_flight == Some(outcome.ticket) {
            self.in_flight = None;
        }
        if !self.is_loading || outcome.ticket != self.ticket {
            self.emit(
                "generation_discarded",
                json!({ "operation": outcome.operation }),
            );
            return;
        }
        self.is_loading = false;
        match outcome.result {
            Ok(data_url) => {
                self.emit(
                    "generation_succeeded",
                    json!({
                        "operation": outcome.operation,
                        "refinement": outcome.refinement,
                        "media_type": codec::media_type_of(&data_url),
                    }),
                );
                self.result_image = Some(data_url);
                self.error = None;
                if outcome.refinement {
                    self.refinement_prompt.clear();
                }
            }
            Err(err) => {
                self.emit(
                    "generation_failed",
                    json!({
                        "operation": outcome.operation,
                        "refinement": outcome.refinement,
                        "kind": err.kind(),
                        "message": err.to_string(),
                    }),
                );
                self.result_image = None;
                self.error = Some(err.user_message());
            }
        }
    }

    /// Dispatches the current mode and blocks until it completes.
    ///
    /// Missing inputs surface as the error message rather than being skipped.
    pub fn generate(&mut self) -> StudioStatus {
        if let Some(job) = self.begin_generate() {
            let outcome = job.run();
            self.finish(outcome);
        }
        self.status()
    }

    /// The primary action button: does nothing while it is disabled.
    pub fn press_generate(&mut self) -> StudioStatus {
        if self.is_generate_disabled() {
            return self.status();
        }
        self.generate()
    }

    pub fn regenerate(&mut self) -> StudioStatus {
        self.generate()
    }

    pub fn refine(&mut self) -> StudioStatus {
        if let Some(job) = self.begin_refine() {
            let outcome = job.run();
            self.finish(outcome);
        }
        self.status()
    }

    /// Writes the current result into `dir` under a timestamped name.
    pub fn save_result(&self, dir: &Path) -> Result<PathBuf> {
        let Some(result) = self.result_image.as_deref() else {
            bail!("There is no result to save yet.");
        };
        let bytes = codec::decode_data_url(result)?;
        let name = codec::download_file_name(result, chrono::Utc::now().timestamp_millis());
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(name);
        fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        self.try_emit(
            "result_saved",
            json!({
                "path": path.to_string_lossy(),
                "bytes": bytes.len(),
            }),
        )
        .with_context(|| format!("saved {} but could not log it", path.display()))?;
        Ok(path)
    }

    fn start(&mut self, work: Result<JobKind, StudioError>, refinement: bool) -> PendingJob {
        self.error = None;
        self.is_loading = true;
        self.ticket += 1;
        self.in_flight = Some(self.ticket);
        let job = PendingJob {
            ticket: self.ticket,
            refinement,
            work,
            client: self.client.clone(),
        };
        self.emit(
            "generation_started",
            json!({
                "mode": self.mode.wire_name(),
                "operation": job.operation(),
                "refinement": refinement,
                "provider": self.client.provider(),
                "model": self.client.model(),
            }),
        );
        job
    }

    fn build_generate_work(&self) -> Result<JobKind, StudioError> {
        let missing = || StudioError::Validation(self.mode.missing_image_message().to_string());
        match self.mode {
            Mode::ConvertToWebP => Ok(JobKind::ConvertToWebP {
                image: self.main_image.clone().ok_or_else(missing)?,
                quality: self.webp_quality,
            }),
            Mode::Model | Mode::Flatlay => Ok(JobKind::ChangeBackground {
                image: self.main_image.clone().ok_or_else(missing)?,
                color: self.background_color.clone(),
                subject: self.mode.subject_kind().unwrap_or(SubjectKind::Model),
            }),
            Mode::TryOn => match (&self.main_image, &self.model_image) {
                (Some(garment), Some(model_image)) => Ok(JobKind::TryOn {
                    garment: garment.clone(),
                    model_image: model_image.clone(),
                }),
                _ => Err(missing()),
            },
            Mode::AiEdit => {
                let image = self.main_image.clone().ok_or_else(missing)?;
                if self.text_prompt.trim().is_empty() {
                    return Err(StudioError::Validation(
                        "Please provide an edit instruction.".to_string(),
                    ));
                }
                Ok(JobKind::Edit {
                    image,
                    instruction: self.text_prompt.clone(),
                })
            }
            Mode::Render3D => Ok(JobKind::Render {
                image: self.main_image.clone().ok_or_else(missing)?,
            }),
        }
    }

    fn try_emit(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(events) = &self.events else {
            return Ok(());
        };
        let payload: Map<String, Value> = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        events.emit(event_type, payload)?;
        Ok(())
    }

    /// State transitions go ahead when the log is unwritable; the first
    /// failure is reported on stderr.
    fn emit(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.try_emit(event_type, payload) {
            if !self.event_log_failed.replace(true) {
                eprintln!("studio: event log write failed: {err:#}");
            }
        }
    }

    pub fn event_log_failed(&self) -> bool {
        self.event_log_failed.get()
    }
}
