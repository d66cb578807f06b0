//! A minimal native window to show the detection output.
//!
//! The window event loop has to own the main thread on some platforms, so [`run`] takes over the
//! main thread and runs the application on a second one. Images are sent to the event loop with
//! [`show_image`]; each distinct key gets its own window.

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{Condvar, Mutex, OnceLock},
    time::{Duration, Instant},
};

use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::WindowId,
};

use crate::{
    canvas::{Canvas, RenderTarget, Transform},
    image::{Color, Image, Resolution},
    schedule::FrameScheduler,
    termination::Termination,
};

use self::renderer::{Gpu, Renderer, Window};

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new(gpu: Gpu) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        }
    }

    fn get_renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(
        &mut self,
        target: &EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");

            let win = Window::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu.clone())?;
            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }

        let Some(renderer) = self.windows.get_mut(&key) else {
            anyhow::bail!("no window for image '{key}'");
        };
        renderer.update_texture(res, data);
        renderer.window().request_redraw();
        Ok(())
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, &data) {
                        log::error!("failed to show image: {e:#}");
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.get_renderer_mut(window) {
                        if let Err(e) = renderer.redraw() {
                            log::error!("failed to redraw window: {e:#}");
                        }
                    }
                    REPAINTS.notify();
                }
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    window_id,
                } => {
                    log::info!(
                        "window '{}' closed, exiting",
                        self.win_id_to_key
                            .get(&window_id)
                            .map_or("<unknown>", |key| key.as_str())
                    );
                    *flow = ControlFlow::Exit;
                }
                Event::WindowEvent {
                    event: WindowEvent::Resized(_),
                    window_id,
                } => {
                    if let Some(renderer) = self.get_renderer_mut(window_id) {
                        renderer.configure_surface();
                    }
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

static PROXY: OnceLock<Mutex<EventLoopProxy<Msg>>> = OnceLock::new();

/// Returns whether [`run`] has started the window event loop.
pub fn is_running() -> bool {
    PROXY.get().is_some()
}

fn send(msg: Msg) -> anyhow::Result<()> {
    let Some(proxy) = PROXY.get() else {
        anyhow::bail!("GUI is not running (images can only be shown from inside `gui::run`)");
    };
    proxy
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .send_event(msg)
        .map_err(|_closed| anyhow::anyhow!("GUI event loop has exited"))
}

/// Runs `cb` on a new thread while the current thread runs the window event loop.
///
/// This never returns: the process exits when `cb` returns, when it panics, or when a window is
/// closed. The exit status reflects `cb`'s [`Termination`] value.
pub fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            log::error!("failed to open GPU: {e:#}");
            process::exit(1);
        }
    };
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        log::error!("`gui::run` called more than once");
        process::exit(1);
    }

    // Windowing is now initialized; spawn another thread to run the application code.
    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(cb));
        match result {
            Ok(r) => {
                if r.is_success() {
                    process::exit(0);
                } else {
                    r.report(); // may print the error message
                    process::exit(1);
                }
            }
            Err(_payload) => {
                // The panic hook has printed the message already; exit with 101 like libstd.
                process::exit(101);
            }
        }
    });

    Gui::new(gpu).run(event_loop);
}

/// Displays an image in the window identified by `key`.
///
/// The window is created on first use, and resized whenever the image resolution changes.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
    let data = image.data().to_vec();

    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data,
    })
}

/// Counts window repaints, so that other threads can wait for the next one.
struct Repaints {
    count: Mutex<u64>,
    cond: Condvar,
}

static REPAINTS: Repaints = Repaints {
    count: Mutex::new(0),
    cond: Condvar::new(),
};

impl Repaints {
    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> u64 {
        *self.lock()
    }

    fn notify(&self) {
        *self.lock() += 1;
        self.cond.notify_all();
    }

    /// Waits until the count exceeds `seen` or `timeout` elapses. Returns the count.
    fn wait_past(&self, seen: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count <= seen {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            count = match self.cond.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *count
    }
}

/// Default time [`RepaintScheduler`] waits for a repaint before giving up.
pub const DEFAULT_REPAINT_TIMEOUT: Duration = Duration::from_millis(100);

/// A [`FrameScheduler`] synchronized with the GUI's repaints.
///
/// Windows present with FIFO (vsync) presentation, so waiting for a repaint paces the loop to the
/// display refresh rate. If no repaint happens within the timeout (eg. because the window is
/// hidden or was never opened), the wait ends anyway.
#[derive(Debug)]
pub struct RepaintScheduler {
    seen: u64,
    timeout: Duration,
}

impl RepaintScheduler {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REPAINT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            seen: REPAINTS.current(),
            timeout,
        }
    }
}

impl Default for RepaintScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for RepaintScheduler {
    fn next_frame(&mut self) {
        let count = REPAINTS.wait_past(self.seen, self.timeout);
        if count == self.seen {
            log::trace!("no repaint within {:?}", self.timeout);
        }
        self.seen = count;
    }
}

/// A [`RenderTarget`] shown in a GUI window.
///
/// Drawing happens on an in-memory [`Canvas`]; [`RenderTarget::present`] sends the finished
/// image to the window.
pub struct WindowCanvas {
    key: String,
    canvas: Canvas,
    send_failed: bool,
}

impl WindowCanvas {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            canvas: Canvas::default(),
            send_failed: false,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

impl RenderTarget for WindowCanvas {
    fn is_ready(&self) -> bool {
        is_running()
    }

    fn resolution(&self) -> Resolution {
        self.canvas.resolution()
    }

    fn resize(&mut self, res: Resolution) {
        self.canvas.resize(res);
    }

    fn clear(&mut self, width: u32, height: u32) {
        self.canvas.clear(width, height);
    }

    fn set_transform(&mut self, transform: Transform) {
        self.canvas.set_transform(transform);
    }

    fn transform(&self) -> Transform {
        self.canvas.transform()
    }

    fn draw_image(&mut self, image: &Image) {
        self.canvas.draw_image(image);
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        self.canvas.fill_circle(x, y, radius, color);
    }

    fn present(&mut self) {
        match show_image(&self.key, self.canvas.image()) {
            Ok(()) => self.send_failed = false,
            Err(e) => {
                if !self.send_failed {
                    log::warn!("failed to present '{}': {e:#}", self.key);
                }
                self.send_failed = true;
            }
        }
    }
}
