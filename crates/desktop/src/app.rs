use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::TryRecvError;
use iced::widget::{button, column, container, image, progress_bar, text};
use iced::{event, keyboard, Element, Event, Length, Subscription, Task, Theme};
use rfd::{AsyncFileDialog, AsyncMessageDialog, MessageButtons, MessageLevel};

use faceblur_core::shared::constants::{PHOTO_EXTENSIONS, VIDEO_EXTENSIONS};

use crate::settings::Settings;
use crate::theme;
use crate::workers::blur_worker::{self, Job, JobParams, WorkerHandle, WorkerMessage};
use crate::workers::model_cache::ModelCache;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_HINT: &str = "Press 'q' to stop webcam or video preview";

#[derive(Debug, Clone)]
pub enum Message {
    BlurPhotos,
    PhotosSelected(Vec<PathBuf>),
    BlurVideo,
    VideoSelected(Option<PathBuf>),
    BlurWebcam,
    OpenPhotoFolder,
    OpenVideoFolder,
    Stop,
    Tick,
    DialogClosed,
}

pub struct App {
    settings: Settings,
    model_cache: Arc<ModelCache>,
    model_checked: bool,
    worker: Option<WorkerHandle>,
    progress: u8,
    status: String,
    preview: Option<image::Handle>,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let settings = Settings::load();
        let output = settings.output_config();
        let startup = match output.ensure_dirs() {
            Ok(()) => Task::none(),
            Err(e) => {
                log::error!("Cannot create output folders: {e}");
                show_dialog(
                    MessageLevel::Error,
                    "Error",
                    format!("Cannot create output folders: {e}"),
                )
            }
        };

        (
            Self {
                settings,
                model_cache: ModelCache::new(),
                model_checked: false,
                worker: None,
                progress: 0,
                status: String::new(),
                preview: None,
            },
            startup,
        )
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn start(&mut self, job: Job) {
        if self.is_running() {
            return;
        }
        log::info!("Starting {job:?}");
        self.preview = None;
        self.worker = Some(blur_worker::spawn(JobParams {
            job,
            processing: self.settings.processing_config(),
            output: self.settings.output_config(),
            model_cache: self.model_cache.clone(),
        }));
    }

    fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel();
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::BlurPhotos => {
                return Task::perform(
                    async {
                        AsyncFileDialog::new()
                            .set_title("Select photos")
                            .add_filter("Images", PHOTO_EXTENSIONS)
                            .pick_files()
                            .await
                            .map(|handles| {
                                handles.iter().map(|h| h.path().to_path_buf()).collect()
                            })
                            .unwrap_or_default()
                    },
                    Message::PhotosSelected,
                );
            }
            Message::PhotosSelected(paths) => {
                if !paths.is_empty() {
                    self.start(Job::Photos(paths));
                }
            }
            Message::BlurVideo => {
                return Task::perform(
                    async {
                        AsyncFileDialog::new()
                            .set_title("Select video")
                            .add_filter("Videos", VIDEO_EXTENSIONS)
                            .pick_file()
                            .await
                            .map(|h| h.path().to_path_buf())
                    },
                    Message::VideoSelected,
                );
            }
            Message::VideoSelected(Some(path)) => self.start(Job::VideoFile(path)),
            Message::VideoSelected(None) => {}
            Message::BlurWebcam => self.start(Job::Webcam(self.settings.camera())),
            Message::OpenPhotoFolder => {
                return open_folder(&self.settings.photo_dir, "No blurred photos found yet.")
            }
            Message::OpenVideoFolder => {
                return open_folder(&self.settings.video_dir, "No blurred videos found yet.")
            }
            Message::Stop => self.stop(),
            Message::Tick => return self.poll(),
            Message::DialogClosed => {}
        }
        Task::none()
    }

    /// Drains worker messages; also reports a failed model load once.
    fn poll(&mut self) -> Task<Message> {
        let mut dialogs = Vec::new();

        if !self.model_checked {
            if let Some(result) = self.model_cache.peek() {
                self.model_checked = true;
                if let Err(e) = result {
                    dialogs.push(show_dialog(
                        MessageLevel::Error,
                        "Error",
                        format!("Face model unavailable: {e}"),
                    ));
                }
            }
        }

        let mut finished = false;
        if let Some(worker) = &self.worker {
            loop {
                let message = match worker.rx.try_recv() {
                    Ok(message) => message,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                };
                match message {
                    WorkerMessage::DownloadProgress(dl, total) => {
                        self.progress = (dl * 100 / total.max(1)).min(100) as u8;
                        self.status = "Downloading face model...".into();
                    }
                    WorkerMessage::Progress(percent, status) => {
                        self.progress = percent;
                        self.status = status;
                    }
                    WorkerMessage::Status(status) => self.status = status,
                    WorkerMessage::Preview(handle) => self.preview = Some(handle),
                    WorkerMessage::Finished(message) => {
                        dialogs.push(show_dialog(MessageLevel::Info, "Done", message));
                    }
                    WorkerMessage::Reset => {
                        self.progress = 0;
                        self.status.clear();
                    }
                    WorkerMessage::Error(message) => {
                        dialogs.push(show_dialog(MessageLevel::Error, "Error", message));
                        finished = true;
                    }
                    WorkerMessage::Cancelled => {
                        log::info!("Run cancelled");
                        finished = true;
                    }
                    WorkerMessage::Done => finished = true,
                }
            }
        }

        if finished {
            self.worker = None;
            self.progress = 0;
            self.status.clear();
            self.preview = None;
        }

        Task::batch(dialogs)
    }

    pub fn view(&self) -> Element<'_, Message> {
        let idle = !self.is_running();
        let action = |label: &'static str, message: Message| {
            button(text(label).width(Length::Fill).center())
                .width(Length::Fill)
                .on_press_maybe(idle.then_some(message))
        };

        let mut content = column![
            action("Blur Photos", Message::BlurPhotos),
            action("Blur Video File", Message::BlurVideo),
            action("Blur Webcam", Message::BlurWebcam),
            button(text("Open Blurred Photos Folder").width(Length::Fill).center())
                .width(Length::Fill)
                .style(button::secondary)
                .on_press(Message::OpenPhotoFolder),
            button(text("Open Blurred Videos Folder").width(Length::Fill).center())
                .width(Length::Fill)
                .style(button::secondary)
                .on_press(Message::OpenVideoFolder),
            progress_bar(0.0..=100.0, f32::from(self.progress)),
            text(self.status.as_str()).size(13),
            text(STOP_HINT).size(11),
        ]
        .spacing(8);

        if !idle {
            content = content.push(
                button(text("Stop").width(Length::Fill).center())
                    .width(Length::Fill)
                    .style(button::danger)
                    .on_press(Message::Stop),
            );
        }
        if let Some(handle) = &self.preview {
            content = content.push(image(handle.clone()).width(Length::Fill));
        }

        container(content).padding(16).into()
    }

    pub fn theme(&self) -> Theme {
        theme::resolve_theme(self.settings.appearance)
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let keys = event::listen_with(|event, _status, _window| match event {
            Event::Keyboard(keyboard::Event::KeyPressed { key, .. })
                if key.as_ref() == keyboard::Key::Character("q") =>
            {
                Some(Message::Stop)
            }
            _ => None,
        });
        let needs_poll = self.is_running() || !self.model_checked;
        if needs_poll {
            Subscription::batch([keys, iced::time::every(POLL_INTERVAL).map(|_| Message::Tick)])
        } else {
            keys
        }
    }
}

fn show_dialog(level: MessageLevel, title: &str, description: String) -> Task<Message> {
    let dialog = AsyncMessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(description)
        .set_buttons(MessageButtons::Ok);
    Task::perform(dialog.show(), |_| Message::DialogClosed)
}

fn open_folder(dir: &Path, empty_message: &str) -> Task<Message> {
    if !dir.is_dir() {
        return show_dialog(MessageLevel::Info, "Info", empty_message.to_string());
    }
    if let Err(e) = open::that(dir) {
        log::error!("Cannot open {}: {e}", dir.display());
        return show_dialog(
            MessageLevel::Error,
            "Error",
            format!("Cannot open {}: {e}", dir.display()),
        );
    }
    Task::none()
}
