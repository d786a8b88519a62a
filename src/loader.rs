//! Asynchronous asset loading.
//!
//! Loads run on the platform executor and report back through a channel as
//! [`LoaderMessage`]s. Only plain CPU data ([`ModelData`], [`ImageData`])
//! crosses the channel; the session turns it into scene nodes on its own
//! thread when it polls.

use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        mpsc::{Receiver, Sender, channel},
    },
};

use anyhow::anyhow;
use futures::FutureExt;

use crate::resources::{
    ImageData, LoadProgress, ModelData, environment::load_environment, load_model_data,
};

/// Identifies one model request. Later requests get larger tickets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load #{}", self.0)
    }
}

pub enum LoaderMessage {
    Progress {
        ticket: LoadTicket,
        percent: u8,
    },
    Model {
        ticket: LoadTicket,
        locator: String,
        result: anyhow::Result<ModelData>,
    },
    Environment {
        locator: String,
        result: anyhow::Result<ImageData>,
    },
}

impl fmt::Debug for LoaderMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress { ticket, percent } => f
                .debug_struct("Progress")
                .field("ticket", ticket)
                .field("percent", percent)
                .finish(),
            Self::Model {
                ticket,
                locator,
                result,
            } => f
                .debug_struct("Model")
                .field("ticket", ticket)
                .field("locator", locator)
                .field("ok", &result.is_ok())
                .finish(),
            Self::Environment { locator, result } => f
                .debug_struct("Environment")
                .field("locator", locator)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

/// Where load futures run.
#[derive(Clone, Debug)]
pub enum Spawner {
    /// On the blocking pool of a tokio runtime. File IO and decoding block.
    #[cfg(not(target_arch = "wasm32"))]
    Tokio(tokio::runtime::Handle),
    /// On the browser's event loop via `spawn_local`.
    #[cfg(target_arch = "wasm32")]
    Local,
    /// To completion on the calling thread, before `request` returns.
    Blocking,
}

impl Spawner {
    /// The ambient tokio runtime natively (or blocking without one), `spawn_local` on the web.
    pub fn platform_default() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => Self::Tokio(handle),
                Err(_) => Self::Blocking,
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            Self::Local
        }
    }

    /// Runs the future built by `make`. The future itself is created where it
    /// runs, so it does not have to be `Send`.
    fn spawn<F, Fut>(&self, make: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        match self {
            #[cfg(not(target_arch = "wasm32"))]
            Self::Tokio(handle) => {
                // detached, completion (panics included) is reported through the channel
                let _ = handle.spawn_blocking(move || futures::executor::block_on(make()));
            }
            #[cfg(target_arch = "wasm32")]
            Self::Local => wasm_bindgen_futures::spawn_local(make()),
            Self::Blocking => futures::executor::block_on(make()),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// Percentage of loaded items, rounded. An empty load counts as done.
pub fn percent(loaded: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = loaded.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}

#[derive(Debug)]
pub struct AssetLoader {
    spawner: Spawner,
    sender: Sender<LoaderMessage>,
    receiver: Receiver<LoaderMessage>,
    next_ticket: u64,
    latest: Option<LoadTicket>,
}

impl AssetLoader {
    pub fn new(spawner: Spawner) -> Self {
        let (sender, receiver) = channel();
        Self {
            spawner,
            sender,
            receiver,
            next_ticket: 1,
            latest: None,
        }
    }

    /// Starts loading a model and returns its ticket. The new ticket
    /// supersedes every earlier one.
    pub fn request(&mut self, locator: &str) -> LoadTicket {
        self.request_with(locator, |locator, progress| async move {
            load_model_data(&locator, progress).await
        })
    }

    /// Runs `load` for a new ticket. A panicking load is reported as a
    /// failed load, so every ticket ends with exactly one `Model` message.
    fn request_with<F, Fut>(&mut self, locator: &str, load: F) -> LoadTicket
    where
        F: FnOnce(String, LoadProgress) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<ModelData>> + 'static,
    {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.latest = Some(ticket);
        log::info!("{}: loading '{}'", ticket, locator);

        let sender = self.sender.clone();
        let locator = locator.to_string();
        self.spawner.spawn(move || async move {
            let progress_sender = sender.clone();
            let progress: LoadProgress = Arc::new(move |loaded, total| {
                // the session may be gone already
                let _ = progress_sender.send(LoaderMessage::Progress {
                    ticket,
                    percent: percent(loaded, total),
                });
            });
            let result = AssertUnwindSafe(load(locator.clone(), progress))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("loader panicked: {}", panic_message(&*panic))));
            if sender
                .send(LoaderMessage::Model {
                    ticket,
                    locator,
                    result,
                })
                .is_err()
            {
                log::debug!("{} finished after its session closed", ticket);
            }
        });
        ticket
    }

    pub fn request_environment(&self, locator: &str) {
        log::info!("loading environment map '{}'", locator);
        let sender = self.sender.clone();
        let locator = locator.to_string();
        self.spawner.spawn(move || async move {
            let result = AssertUnwindSafe(load_environment(&locator))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("loader panicked: {}", panic_message(&*panic))));
            if sender
                .send(LoaderMessage::Environment {
                    locator: locator.clone(),
                    result,
                })
                .is_err()
            {
                log::debug!("environment '{}' finished after its session closed", locator);
            }
        });
    }

    pub fn latest(&self) -> Option<LoadTicket> {
        self.latest
    }

    pub fn is_latest(&self, ticket: LoadTicket) -> bool {
        self.latest == Some(ticket)
    }

    /// Takes every message that arrived since the last poll, in order.
    pub fn poll(&self) -> Vec<LoaderMessage> {
        self.receiver.try_iter().collect()
    }
}
