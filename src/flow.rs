//! Render loop and windowed application.
//!
//! [`RenderLoop`] schedules frames for one [`ViewerSession`]: it is started
//! once, then every display refresh calls [`RenderLoop::frame`], which
//! applies finished loads, moves the camera and draws. A stopped loop never
//! draws again.
//!
//! [`run`] opens a window and drives a session with a `winit`
//! [`ApplicationHandler`], redrawing continuously.

use std::sync::Arc;

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::ConfigPatch,
    events::ViewerEvent,
    loader::Spawner,
    render::{RenderBackend, WgpuBackend},
    viewer::ViewerSession,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
pub struct RenderLoop {
    state: LoopState,
    frames: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an idle loop. A stopped loop cannot be restarted.
    pub fn start(&mut self) -> bool {
        if self.state != LoopState::Idle {
            log::warn!("render loop cannot start from {:?}", self.state);
            return false;
        }
        self.state = LoopState::Running;
        true
    }

    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Number of frames drawn so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one frame. Returns `false` without touching the session unless running.
    pub fn frame<B: RenderBackend>(&mut self, session: &mut ViewerSession<B>, dt: Duration) -> bool {
        if !self.is_running() || session.is_closed() {
            return false;
        }
        session.poll_loads();
        session.update(dt.as_secs_f32());
        if let Err(e) = session.draw() {
            log::error!("Unable to render {:#}", e);
        }
        self.frames += 1;
        true
    }
}

/// What the windowed viewer shows on start.
#[derive(Clone, Debug)]
pub struct ViewerOptions {
    pub title: String,
    pub model: Option<String>,
    pub config: ConfigPatch,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            title: "flow-viewer".to_string(),
            model: None,
            config: ConfigPatch::default(),
        }
    }
}

pub(crate) enum AppEvent {
    Initialized(anyhow::Result<WgpuBackend>),
}

type EventHandler = Box<dyn FnMut(&ViewerEvent)>;

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<AppEvent>,
    options: ViewerOptions,
    session: Option<ViewerSession<WgpuBackend>>,
    render_loop: RenderLoop,
    on_event: EventHandler,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<AppEvent>,
        options: ViewerOptions,
        on_event: EventHandler,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            options,
            session: None,
            render_loop: RenderLoop::new(),
            on_event,
            last_time: Instant::now(),
        })
    }

    fn spawner(&self) -> Spawner {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Spawner::Tokio(self.async_runtime.handle().clone())
        }
        #[cfg(target_arch = "wasm32")]
        {
            Spawner::Local
        }
    }

    fn start_session(&mut self, event_loop: &ActiveEventLoop, backend: anyhow::Result<WgpuBackend>) {
        let backend = match backend {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("App initialization failed. Cannot create the main context: {:#}", e);
                event_loop.exit();
                return;
            }
        };
        let window = backend.window().clone();
        let size = window.inner_size();
        let mut session = ViewerSession::with_spawner(
            backend,
            &self.options.config,
            (size.width, size.height),
            self.spawner(),
        );
        if let Some(model) = &self.options.model {
            session.load_model(model);
        }
        self.session = Some(session);
        self.render_loop.start();
        self.last_time = Instant::now();
        window.request_redraw();
    }

    fn dispatch_events(&mut self) {
        if let Some(session) = &mut self.session {
            for event in session.drain_events() {
                (self.on_event)(&event);
            }
        }
    }

    fn shut_down(&mut self, event_loop: &ActiveEventLoop) {
        self.render_loop.stop();
        if let Some(session) = &mut self.session {
            session.teardown();
        }
        event_loop.exit();
    }
}

/// Hands the created backend to the event loop, which starts the session in `user_event`.
fn send_initialized(proxy: &EventLoopProxy<AppEvent>, backend: anyhow::Result<WgpuBackend>) {
    if proxy.send_event(AppEvent::Initialized(backend)).is_err() {
        log::error!("event loop closed before the viewer was initialized");
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() || self.render_loop.state() == LoopState::Stopped {
            return;
        }
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(&self.options.title);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => log::warn!("no element with id '{}', creating a canvas", CANVAS_ID),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let backend = self.async_runtime.block_on(WgpuBackend::new(window));
            send_initialized(&self.proxy, backend);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let backend = WgpuBackend::new(window).await;
                send_initialized(&proxy, backend);
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Initialized(backend) => {
                if self.session.is_some() {
                    log::warn!("viewer already initialized, dropping the second backend");
                    return;
                }
                self.start_session(event_loop, backend)
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(session) = &mut self.session else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => self.shut_down(event_loop),
            WindowEvent::Resized(size) => {
                session.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                self.render_loop.frame(session, dt);
                self.dispatch_events();
            }
            other => {
                session.handle_window_event(&other);
            }
        }
    }
}

/// Opens a window showing `options.model` and blocks until it is closed.
/// `on_event` receives every [`ViewerEvent`] of the session.
pub fn run(options: ViewerOptions, on_event: impl FnMut(&ViewerEvent) + 'static) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, options, Box::new(on_event))?;

    event_loop.run_app(&mut app)?;

    Ok(())
}
