// Batch image converter: fixed-size canvas with background padding, via ffmpeg
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod archive;
mod batch;
mod color;
mod command;
mod config;
mod engine;
mod error;
mod logging;
mod pipeline;
mod source;

use batch::{BatchOrchestrator, BatchState, FileReport, FileState, Progress};
use color::HexColor;
use command::{ConversionParameters, OutputFormat, ScaleMode};
use config::AppConfig;
use engine::FfmpegEngine;
use error::ValidationError;
use iced::font::{Family, Weight};
use iced::widget::image::{Handle, Image};
use iced::widget::{button, column, container, progress_bar, radio, row, scrollable, text, text_input, Space};
use iced::{executor, subscription, window, Application, Command, Element, Event, Font, Length, Settings, Subscription, Theme};
use pipeline::ConversionResult;
use source::SourceFile;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const THUMBNAILS_PER_ROW: usize = 4;

pub fn main() -> iced::Result {
    logging::init_tracing();

    ImageConverter::run(Settings {
        window: iced::window::Settings {
            size: (600, 780),
            min_size: Some((520, 600)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        ..Default::default()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineStatus {
    Loading,
    Ready,
    Failed(String),
}

struct ImageConverter {
    config: AppConfig,
    config_path: Option<PathBuf>,
    engine_status: EngineStatus,
    batch: Option<BatchOrchestrator<FfmpegEngine>>,
    files: Vec<SourceFile>,
    input_previews: Vec<Handle>,
    // Set by a hover, cleared by the first file of the drop that follows.
    drop_replaces: bool,
    width: String,
    height: String,
    background: String,
    mode: ScaleMode,
    format: OutputFormat,
    progress: f32,
    status_message: String,
    status_is_error: bool,
    // Parallel to the batch outcome's result list.
    output_previews: Vec<Handle>,
}

#[derive(Debug, Clone)]
enum Message {
    EngineLoaded(Result<Arc<FfmpegEngine>, String>),
    SelectFiles,
    SelectFolder,
    FilesSelected(Vec<PathBuf>),
    FileHovered,
    FileDropped(PathBuf),
    FilesDropped { paths: Vec<PathBuf>, replace: bool },
    WidthChanged(String),
    HeightChanged(String),
    BackgroundChanged(String),
    ModeChanged(ScaleMode),
    FormatChanged(OutputFormat),
    Convert,
    FileProcessed(FileReport),
    SaveResult(usize),
    DownloadAll,
    Saved(Result<Option<PathBuf>, String>),
    OpenOutputFolder,
    ClearResults,
}

impl Application for ImageConverter {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = ();

    fn new(_flags: ()) -> (Self, Command<Message>) {
        let config_path = AppConfig::default_path()
            .map_err(|e| warn!(error = %e, "settings will not be persisted"))
            .ok();
        let config = config_path
            .as_deref()
            .map(|path| {
                AppConfig::load(path).unwrap_or_else(|e| {
                    warn!(error = %e, path = %path.display(), "ignoring unreadable settings file");
                    AppConfig::default()
                })
            })
            .unwrap_or_default();

        let app = Self {
            width: config.width.to_string(),
            height: config.height.to_string(),
            background: config.background.clone(),
            mode: config.mode,
            format: config.output_format,
            config_path,
            engine_status: EngineStatus::Loading,
            batch: None,
            files: Vec::new(),
            input_previews: Vec::new(),
            drop_replaces: true,
            progress: 0.0,
            status_message: String::from("Loading FFmpeg..."),
            status_is_error: false,
            output_previews: Vec::new(),
            config,
        };

        let ffmpeg_path = app.config.ffmpeg_path.clone();
        (app, Command::perform(load_engine(ffmpeg_path), Message::EngineLoaded))
    }

    fn title(&self) -> String {
        String::from("Image Batch Converter")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::EngineLoaded(Ok(engine)) => {
                info!(version = engine.version(), "ffmpeg loaded");
                self.batch = Some(BatchOrchestrator::new(engine, self.config.batch_settings()));
                self.engine_status = EngineStatus::Ready;
                self.set_status("Ready to convert images", false);
            }
            Message::EngineLoaded(Err(reason)) => {
                warn!(%reason, "ffmpeg failed to load");
                self.set_status(format!("Error loading FFmpeg: {reason}"), true);
                self.engine_status = EngineStatus::Failed(reason);
            }
            Message::SelectFiles => {
                return Command::perform(select_files(), Message::FilesSelected);
            }
            Message::SelectFolder => {
                return Command::perform(select_folder(), Message::FilesSelected);
            }
            Message::FilesSelected(paths) => {
                self.add_files(paths, true);
            }
            Message::FileHovered => {
                self.drop_replaces = true;
            }
            Message::FileDropped(path) => {
                if self.is_running() {
                    return Command::none();
                }
                // A multi-file drop arrives as one event per path.
                let replace = std::mem::replace(&mut self.drop_replaces, false);
                return Command::perform(expand_dropped(path), move |paths| {
                    Message::FilesDropped { paths, replace }
                });
            }
            Message::FilesDropped { paths, replace } => {
                self.add_files(paths, replace);
            }
            Message::WidthChanged(value) => {
                self.width = value;
            }
            Message::HeightChanged(value) => {
                self.height = value;
            }
            Message::BackgroundChanged(value) => {
                self.background = value;
            }
            Message::ModeChanged(mode) => {
                self.mode = mode;
            }
            Message::FormatChanged(format) => {
                self.format = format;
            }
            Message::Convert => {
                return self.start_conversion();
            }
            Message::FileProcessed(report) => {
                return self.file_processed(report);
            }
            Message::SaveResult(index) => {
                if let Some(result) = self.results().get(index) {
                    let name = format!("{}{}", self.config.archive_prefix, result.display_name);
                    let bytes = Arc::clone(&result.bytes);
                    return Command::perform(
                        save_bytes(name, bytes, self.config.last_output_dir.clone()),
                        Message::Saved,
                    );
                }
            }
            Message::DownloadAll => {
                let results = self.results().to_vec();
                if !results.is_empty() {
                    return Command::perform(
                        save_archive(
                            results,
                            self.config.archive_prefix.clone(),
                            self.config.archive_name.clone(),
                            self.config.last_output_dir.clone(),
                        ),
                        Message::Saved,
                    );
                }
            }
            Message::Saved(Ok(Some(path))) => {
                self.set_status(format!("Saved {}", path.display()), false);
                self.config.last_output_dir = path.parent().map(Path::to_path_buf);
                self.persist_config();
            }
            Message::Saved(Ok(None)) => {}
            Message::Saved(Err(reason)) => {
                self.set_status(format!("Save failed: {reason}"), true);
            }
            Message::OpenOutputFolder => {
                if let Some(dir) = &self.config.last_output_dir {
                    if dir.exists() {
                        if let Err(e) = open::that(dir) {
                            warn!(error = %e, "failed to open output folder");
                        }
                    }
                }
            }
            Message::ClearResults => {
                self.release_results();
                self.status_message.clear();
            }
        }
        Command::none()
    }

    fn view(&self) -> Element<Message> {
        let title = text("Image Batch Converter")
            .size(22)
            .font(HEADING_FONT);

        let selection_label = match self.files.len() {
            0 => String::from("No images selected (or drop images and folders onto the window)"),
            1 => format!("Selected: {}", self.files[0].name()),
            n => format!("Selected: {n} images"),
        };
        let file_selection = column![
            text("Select Images")
                .size(16)
                .font(HEADING_FONT),
            row![
                button("Select Files")
                    .on_press(Message::SelectFiles)
                    .padding([6, 12]),
                button("Select Folder")
                    .on_press(Message::SelectFolder)
                    .padding([6, 12]),
            ].spacing(8),
            text(selection_label)
                .size(12)
                .font(BODY_FONT),
        ].spacing(8);

        let color_hint = if HexColor::is_valid(&self.background) {
            text("")
        } else {
            text("Enter a hex color like #000000").size(12).font(BODY_FONT)
        };

        let parameters = column![
            text("Output")
                .size(16)
                .font(HEADING_FONT),
            row![
                text("Dimensions:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(90),
                text_input("Width", &self.width)
                    .on_input(Message::WidthChanged)
                    .width(Length::Fixed(70.0))
                    .padding(4)
                    .size(13),
                text("×")
                    .size(13)
                    .font(BODY_FONT),
                text_input("Height", &self.height)
                    .on_input(Message::HeightChanged)
                    .width(Length::Fixed(70.0))
                    .padding(4)
                    .size(13),
                text("px")
                    .size(13)
                    .font(BODY_FONT),
            ].spacing(6),
            row![
                text("Background:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(90),
                text_input("#000000", &self.background)
                    .on_input(Message::BackgroundChanged)
                    .width(Length::Fixed(100.0))
                    .padding(4)
                    .size(13),
                color_hint,
            ].spacing(6),
            row![
                text("Scaling:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(90),
                radio(
                    ScaleMode::Fit.to_string(),
                    ScaleMode::Fit,
                    Some(self.mode),
                    Message::ModeChanged,
                ).size(13).spacing(8),
                Space::with_width(12),
                radio(
                    ScaleMode::Fill.to_string(),
                    ScaleMode::Fill,
                    Some(self.mode),
                    Message::ModeChanged,
                ).size(13).spacing(8),
            ].spacing(6),
            row![
                text("Format:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(90),
                radio(
                    OutputFormat::Jpeg.to_string(),
                    OutputFormat::Jpeg,
                    Some(self.format),
                    Message::FormatChanged,
                ).size(13).spacing(8),
                Space::with_width(12),
                radio(
                    OutputFormat::Png.to_string(),
                    OutputFormat::Png,
                    Some(self.format),
                    Message::FormatChanged,
                ).size(13).spacing(8),
            ].spacing(6),
        ].spacing(8);

        let convert_button = match &self.engine_status {
            EngineStatus::Loading => button("Loading FFmpeg...").padding([8, 16]),
            EngineStatus::Failed(_) => button("Error Loading FFmpeg").padding([8, 16]),
            EngineStatus::Ready if self.is_running() => button("Processing...").padding([8, 16]),
            EngineStatus::Ready if self.files.is_empty() => button("Convert Images").padding([8, 16]),
            EngineStatus::Ready => button("Convert Images")
                .on_press(Message::Convert)
                .padding([8, 16]),
        };

        let status: Element<Message> = if self.status_message.is_empty() {
            column![].into()
        } else {
            let prefix = if self.status_is_error { "[ERROR] " } else { "" };
            text(format!("{prefix}{}", self.status_message))
                .size(12)
                .font(if self.status_is_error { HEADING_FONT } else { BODY_FONT })
                .into()
        };

        let progress_section: Element<Message> = if self.is_running() {
            progress_bar(0.0..=1.0, self.progress)
                .height(Length::Fixed(6.0))
                .into()
        } else {
            column![].into()
        };

        let preview_section = if self.results().is_empty() && self.failures_count() == 0 {
            self.input_preview_section()
        } else {
            self.results_section()
        };

        let content = column![
            title,
            Space::with_height(12),
            file_selection,
            Space::with_height(12),
            parameters,
            Space::with_height(12),
            convert_button,
            Space::with_height(8),
            progress_section,
            status,
            Space::with_height(12),
            preview_section,
        ]
        .padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }

    fn subscription(&self) -> Subscription<Message> {
        subscription::events_with(file_drop_message)
    }
}

impl ImageConverter {
    fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status_message = message.into();
        self.status_is_error = is_error;
    }

    /// Filter `paths` down to images and either replace the selection or
    /// extend it. Replacing drops the previous run's results.
    fn add_files(&mut self, paths: Vec<PathBuf>, replace: bool) {
        if paths.is_empty() || self.is_running() {
            return;
        }
        let images: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| source::is_image_file(p))
            .collect();
        if images.is_empty() {
            if replace {
                self.set_status("Please select image files only.", true);
            }
            return;
        }

        if replace {
            self.release_results();
            self.input_previews.clear();
            self.files.clear();
        }
        self.input_previews.extend(images.iter().map(Handle::from_path));
        self.files.extend(images.into_iter().map(SourceFile::from_path));
        self.status_message.clear();
    }

    fn is_running(&self) -> bool {
        self.batch
            .as_ref()
            .is_some_and(|b| b.state() == BatchState::Running)
    }

    fn results(&self) -> &[ConversionResult] {
        self.batch
            .as_ref()
            .map(|b| b.outcome().results.as_slice())
            .unwrap_or(&[])
    }

    fn failures_count(&self) -> usize {
        self.batch
            .as_ref()
            .map(|b| b.outcome().failures.len())
            .unwrap_or(0)
    }

    fn parameters(&self) -> Result<ConversionParameters, ValidationError> {
        ConversionParameters::parse(&self.width, &self.height, &self.background, self.mode)
            .map(|p| p.with_format(self.format).with_jpeg_quality(self.config.jpeg_quality))
    }

    /// Drop output buffers and their preview images.
    fn release_results(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            batch.reset();
        }
        self.output_previews.clear();
        self.progress = 0.0;
    }

    fn persist_config(&self) {
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save(path) {
                warn!(error = %e, "failed to save settings");
            }
        }
    }

    fn start_conversion(&mut self) -> Command<Message> {
        let params = if self.files.is_empty() {
            Err(ValidationError::NoFiles)
        } else {
            self.parameters()
        };
        let params = match params {
            Ok(params) => params,
            Err(e) => {
                self.set_status(e.to_string(), true);
                return Command::none();
            }
        };

        self.output_previews.clear();
        self.config.width = params.width;
        self.config.height = params.height;
        self.config.background = params.background.to_string();
        self.config.mode = params.mode;
        self.config.output_format = params.format;

        let Some(batch) = self.batch.as_mut() else {
            return Command::none();
        };
        let started = batch.start(self.files.clone(), params);
        let job = started.as_ref().ok().and_then(|_| batch.next_job());

        match (started, job) {
            (Ok(progress), Some(job)) => {
                self.persist_config();
                self.progress = 0.0;
                self.set_status(format!("Processing image 1 of {}", progress.total), false);
                Command::perform(job.execute(), Message::FileProcessed)
            }
            (Ok(_), None) => Command::none(),
            (Err(e), _) => {
                self.set_status(e.to_string(), true);
                Command::none()
            }
        }
    }

    fn file_processed(&mut self, report: FileReport) -> Command<Message> {
        let failure = report
            .outcome
            .as_ref()
            .err()
            .map(|f| format!("Error processing {}: {}", f.file.name(), f.reason));
        let preview = report
            .outcome
            .as_ref()
            .ok()
            .map(|r| Handle::from_memory(r.bytes.to_vec()));

        let Some(batch) = self.batch.as_mut() else {
            return Command::none();
        };
        let Some(progress) = batch.record(report) else {
            return Command::none();
        };
        let next = batch.next_job();
        let summary = (batch.state() == BatchState::Completed)
            .then(|| (batch.outcome().summary(), batch.outcome().results.is_empty()));

        if let Some(handle) = preview {
            self.output_previews.push(handle);
        }
        self.progress = progress.fraction();

        let (message, is_error) = status_after_file(progress, failure, summary, next.is_some());
        self.set_status(message, is_error);

        match next {
            Some(job) => Command::perform(job.execute(), Message::FileProcessed),
            None => Command::none(),
        }
    }

    fn input_preview_section(&self) -> Element<Message> {
        if self.input_previews.is_empty() {
            return column![].into();
        }
        let states = self
            .batch
            .as_ref()
            .map(|b| b.file_states())
            .unwrap_or(&[]);
        let thumbnails: Vec<Element<Message>> = self
            .input_previews
            .iter()
            .zip(&self.files)
            .enumerate()
            .map(|(index, (handle, file))| {
                let label = match states.get(index) {
                    Some(FileState::InProgress) => "converting...",
                    Some(FileState::Succeeded) => "done",
                    Some(FileState::Failed) => "failed",
                    Some(FileState::Pending) => "waiting",
                    None => file.name(),
                };
                column![
                    thumbnail(handle),
                    text(label)
                        .size(11)
                        .font(BODY_FONT),
                ].spacing(2).into()
            })
            .collect();

        column![
            text("Preview")
                .size(16)
                .font(HEADING_FONT),
            scrollable(thumbnail_grid(thumbnails)).height(Length::Fixed(220.0)),
        ].spacing(8).into()
    }

    fn results_section(&self) -> Element<Message> {
        let results = self.results();
        let mut cells: Vec<Element<Message>> = results
            .iter()
            .zip(&self.output_previews)
            .enumerate()
            .map(|(index, (result, handle))| {
                let mut details = match result.dimensions {
                    Some((w, h)) => format!("{w}×{h} {}", result.format.mime()),
                    None => result.format.mime().to_string(),
                };
                if result.attempts > 1 {
                    details.push_str(&format!(" (attempt {})", result.attempts));
                }
                column![
                    thumbnail(handle),
                    text(&result.display_name)
                        .size(11)
                        .font(BODY_FONT),
                    text(details)
                        .size(11)
                        .font(BODY_FONT),
                    button("Save")
                        .on_press(Message::SaveResult(index))
                        .padding([2, 8]),
                ].spacing(2).into()
            })
            .collect();

        if let Some(batch) = &self.batch {
            for failure in &batch.outcome().failures {
                cells.push(
                    column![
                        text("[FAIL]")
                            .size(12)
                            .font(HEADING_FONT),
                        text(failure.file.name())
                            .size(11)
                            .font(BODY_FONT),
                        text(format!("{} (after {} attempts)", failure.reason, failure.attempts))
                            .size(11)
                            .font(BODY_FONT),
                    ].spacing(2).width(Length::Fixed(120.0)).into(),
                );
            }
        }

        let download_all = if results.is_empty() || self.is_running() {
            button("Download All").padding([6, 12])
        } else {
            button("Download All")
                .on_press(Message::DownloadAll)
                .padding([6, 12])
        };
        let open_output = match &self.config.last_output_dir {
            Some(_) => button("Open Output")
                .on_press(Message::OpenOutputFolder)
                .padding([6, 12]),
            None => button("Open Output").padding([6, 12]),
        };
        let clear = if self.is_running() {
            button("Clear").padding([6, 12])
        } else {
            button("Clear")
                .on_press(Message::ClearResults)
                .padding([6, 12])
        };

        column![
            text("Results")
                .size(16)
                .font(HEADING_FONT),
            container(
                scrollable(thumbnail_grid(cells))
                    .height(Length::Fixed(260.0))
            )
            .style(iced::theme::Container::Box)
            .padding(8),
            row![download_all, open_output, clear].spacing(8),
        ].spacing(8).into()
    }
}

/// Status line once a file's report is in: the batch summary when done,
/// otherwise the file about to start, prefixed with this file's error.
fn status_after_file(
    progress: Progress,
    failure: Option<String>,
    summary: Option<(String, bool)>,
    has_next: bool,
) -> (String, bool) {
    if let Some((summary, none_converted)) = summary {
        return (summary, none_converted);
    }
    let upcoming = has_next.then(|| {
        format!("Processing image {} of {}", progress.completed + 1, progress.total)
    });
    match (failure, upcoming) {
        (Some(error), Some(upcoming)) => (format!("{error}. {upcoming}"), true),
        (Some(error), None) => (error, true),
        (None, Some(upcoming)) => (upcoming, false),
        (None, None) => (
            format!("Processed {} of {} images", progress.completed, progress.total),
            false,
        ),
    }
}

fn thumbnail(handle: &Handle) -> Image<Handle> {
    Image::new(handle.clone())
        .width(Length::Fixed(120.0))
        .height(Length::Fixed(80.0))
}

fn thumbnail_grid<'a>(mut cells: Vec<Element<'a, Message>>) -> Element<'a, Message> {
    let mut rows: Vec<Element<'a, Message>> = Vec::new();
    while !cells.is_empty() {
        let rest = cells.split_off(cells.len().min(THUMBNAILS_PER_ROW));
        rows.push(iced::widget::row(cells).spacing(8).into());
        cells = rest;
    }
    iced::widget::column(rows).spacing(8).into()
}

// Helper functions
async fn load_engine(ffmpeg_path: Option<PathBuf>) -> Result<Arc<FfmpegEngine>, String> {
    tokio::task::spawn_blocking(move || FfmpegEngine::load(ffmpeg_path.as_deref()))
        .await
        .map_err(|e| e.to_string())?
        .map(Arc::new)
        .map_err(|e| e.to_string())
}

fn file_drop_message(event: Event, _status: iced::event::Status) -> Option<Message> {
    match event {
        Event::Window(window::Event::FileHovered(_)) => Some(Message::FileHovered),
        Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
        _ => None,
    }
}

/// A dropped folder stands for every image below it.
async fn expand_dropped(path: PathBuf) -> Vec<PathBuf> {
    tokio::task::spawn_blocking(move || source::collect_images(&path))
        .await
        .unwrap_or_default()
}

async fn select_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .add_filter("Images", &["jpg", "jpeg", "png", "gif", "bmp", "webp", "avif", "tif", "tiff"])
        .pick_files()
        .await
        .map(|handles| handles.iter().map(|h| h.path().to_path_buf()).collect())
        .unwrap_or_default()
}

async fn select_folder() -> Vec<PathBuf> {
    let Some(folder) = rfd::AsyncFileDialog::new().pick_folder().await else {
        return Vec::new();
    };
    let folder = folder.path().to_path_buf();
    tokio::task::spawn_blocking(move || source::collect_images(&folder))
        .await
        .unwrap_or_default()
}

async fn pick_save_path(file_name: &str, directory: Option<PathBuf>) -> Option<PathBuf> {
    let mut dialog = rfd::AsyncFileDialog::new().set_file_name(file_name);
    if let Some(dir) = directory.filter(|d| d.is_dir()) {
        dialog = dialog.set_directory(dir);
    }
    dialog.save_file().await.map(|h| h.path().to_path_buf())
}

async fn write_file(path: PathBuf, bytes: Arc<[u8]>) -> Result<Option<PathBuf>, String> {
    tokio::task::spawn_blocking(move || fs::write(&path, &bytes[..]).map(|()| Some(path)))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

async fn save_bytes(
    file_name: String,
    bytes: Arc<[u8]>,
    directory: Option<PathBuf>,
) -> Result<Option<PathBuf>, String> {
    match pick_save_path(&file_name, directory).await {
        Some(path) => write_file(path, bytes).await,
        None => Ok(None),
    }
}

async fn save_archive(
    results: Vec<ConversionResult>,
    prefix: String,
    archive_name: String,
    directory: Option<PathBuf>,
) -> Result<Option<PathBuf>, String> {
    let Some(path) = pick_save_path(&archive_name, directory).await else {
        return Ok(None);
    };
    let archive = tokio::task::spawn_blocking(move || archive::export_zip(&results, &prefix))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
    match archive {
        Some(bytes) => write_file(path, bytes.into()).await,
        None => Ok(None),
    }
}
