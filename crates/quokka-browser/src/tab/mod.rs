//! A browser tab: a tree of frames, their script runtimes and the task
//! queue that drives them.
//!
//! [§ 7.3.1 Navigables](https://html.spec.whatwg.org/multipage/document-sequences.html#navigables)
//!
//! Everything here runs on the tab's main thread. The tab is shared as an
//! `Rc` so script runtimes can reach it through a weak [`ScriptHost`]
//! pointer; every method takes `&self` because a script may call back into
//! the tab while the tab is running it.

mod input;
mod render;
mod script_host;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use log::{info, warn};
use quokka_common::net::{Fetcher, Request};
use quokka_common::url::{Scheme, Url};
use quokka_css::layout::{IFRAME_HEIGHT_PX, IFRAME_WIDTH_PX};
use quokka_css::{DisplayItem, EffectKey, FontMetrics};
use quokka_dom::{NodeId, WindowId};
use quokka_js::{JsRuntime, ScriptHost};

use crate::accessibility::AccessibilityNode;
use crate::config::{BrowserConfig, ZoomChange};
use crate::error::LoadError;
use crate::frame::{Frame, Loader};
use crate::image_loader::ImageLoaderPipeline;
use crate::task::{Task, TaskRunner, is_discarded};

/// Upper bound on tasks run by one [`Tab::run_pending_tasks`] call, so a
/// page that keeps rescheduling itself cannot spin forever.
const MAX_TASKS_PER_DRAIN: usize = 10_000;

/// Tab-wide rendering and interaction state.
#[derive(Debug)]
struct TabState {
    root: WindowId,
    /// Frame that receives keyboard input.
    focused_frame: WindowId,
    focus: Option<(WindowId, NodeId)>,
    zoom: f32,
    dark_mode: bool,
    history: Vec<Url>,
    needs_paint: bool,
    needs_accessibility: bool,
    /// Scroll or focus changed without a repaint.
    needs_commit: bool,
    needs_animation_frame: bool,
    /// Style or layout ran since the last commit.
    layout_changed: bool,
    /// Frames with pending `requestAnimationFrame` callbacks.
    raf_windows: BTreeSet<WindowId>,
    /// Blend effects whose op changed without a repaint.
    composited_updates: Vec<EffectKey>,
    /// The last painted display list, kept in step with the compositor.
    display_list: Vec<DisplayItem>,
    accessibility: Option<AccessibilityNode>,
}

/// A tab: the root frame, its iframes and their scripts.
pub struct Tab {
    this: Weak<Tab>,
    config: BrowserConfig,
    fetcher: Arc<dyn Fetcher>,
    fonts: Box<dyn FontMetrics>,
    images: ImageLoaderPipeline,
    tasks: Arc<TaskRunner>,
    frames: RefCell<BTreeMap<WindowId, Rc<RefCell<Frame>>>>,
    runtimes: RefCell<HashMap<WindowId, Rc<RefCell<JsRuntime>>>>,
    state: RefCell<TabState>,
}

impl Tab {
    /// A tab showing `about:blank`, with its own task queue.
    #[must_use]
    pub fn new(config: BrowserConfig, fetcher: Arc<dyn Fetcher>, fonts: Box<dyn FontMetrics>) -> Rc<Self> {
        Self::with_task_runner(config, fetcher, fonts, Arc::new(TaskRunner::new()))
    }

    /// A tab fed by an existing task queue, shared with the thread that
    /// delivers input.
    #[must_use]
    pub fn with_task_runner(
        config: BrowserConfig,
        fetcher: Arc<dyn Fetcher>,
        fonts: Box<dyn FontMetrics>,
        tasks: Arc<TaskRunner>,
    ) -> Rc<Self> {
        let root = WindowId::next();
        let root_frame = Frame::new(root, None, config.width, config.height);
        let state = TabState {
            root,
            focused_frame: root,
            focus: None,
            zoom: 1.0,
            dark_mode: config.dark_mode,
            history: Vec::new(),
            needs_paint: true,
            needs_accessibility: true,
            needs_commit: false,
            needs_animation_frame: false,
            layout_changed: false,
            raf_windows: BTreeSet::new(),
            composited_updates: Vec::new(),
            display_list: Vec::new(),
            accessibility: None,
        };
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            fetcher,
            fonts,
            images: ImageLoaderPipeline::new(),
            tasks,
            frames: RefCell::new(BTreeMap::from([(root, Rc::new(RefCell::new(root_frame)))])),
            runtimes: RefCell::new(HashMap::new()),
            state: RefCell::new(state),
        })
    }

    /// The tab's settings.
    #[must_use]
    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// The queue feeding this tab.
    #[must_use]
    pub fn task_runner(&self) -> Arc<TaskRunner> {
        Arc::clone(&self.tasks)
    }

    /// The root frame's window id.
    #[must_use]
    pub fn root_window(&self) -> WindowId {
        self.state.borrow().root
    }

    /// URL of the root document.
    #[must_use]
    pub fn url(&self) -> Url {
        self.with_frame(self.root_window(), |frame| frame.url().clone())
            .unwrap_or_else(Url::blank)
    }

    /// Current zoom factor.
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.state.borrow().zoom
    }

    /// Whether dark mode is on.
    #[must_use]
    pub fn dark_mode(&self) -> bool {
        self.state.borrow().dark_mode
    }

    /// The focused element and its frame.
    #[must_use]
    pub fn focus(&self) -> Option<(WindowId, NodeId)> {
        self.state.borrow().focus
    }

    /// Visited root URLs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Url> {
        self.state.borrow().history.clone()
    }

    /// Window ids of every frame, parents before children.
    #[must_use]
    pub fn windows(&self) -> Vec<WindowId> {
        self.frames.borrow().keys().copied().collect()
    }

    /// Run `f` on a frame.
    pub fn with_frame<R>(&self, window: WindowId, f: impl FnOnce(&Frame) -> R) -> Option<R> {
        let frame = self.frame(window)?;
        let frame = frame.borrow();
        Some(f(&frame))
    }

    /// The last accessibility tree built.
    #[must_use]
    pub fn accessibility_tree(&self) -> Option<AccessibilityNode> {
        self.state.borrow().accessibility.clone()
    }

    fn frame(&self, window: WindowId) -> Option<Rc<RefCell<Frame>>> {
        self.frames.borrow().get(&window).cloned()
    }

    fn runtime(&self, window: WindowId) -> Option<Rc<RefCell<JsRuntime>>> {
        self.runtimes.borrow().get(&window).cloned()
    }

    fn all_frames(&self) -> Vec<Rc<RefCell<Frame>>> {
        self.frames.borrow().values().cloned().collect()
    }

    /// Queue a task for this tab.
    pub fn schedule(&self, task: Task) {
        self.tasks.schedule_task(task);
    }

    /// Run queued tasks until the queue is empty. Returns how many ran.
    pub fn run_pending_tasks(&self) -> usize {
        let mut count = 0;
        while count < MAX_TASKS_PER_DRAIN {
            let Some(task) = self.tasks.try_next() else {
                break;
            };
            self.run_task(task);
            count += 1;
        }
        count
    }

    /// [§ 8.1.7.3 Processing model](https://html.spec.whatwg.org/multipage/webappapis.html#event-loop-processing-model)
    ///
    /// "Let oldestTask be the first runnable task in taskQueue" and run it.
    pub fn run_task(&self, task: Task) {
        match task {
            Task::Navigate { url } => self.navigate(url),
            Task::LoadFrame { window, url, body } => {
                if let Err(e) = self.load_frame(window, url, body) {
                    warn!("load failed: {e}");
                }
            }
            Task::RunScript {
                window,
                label,
                source,
                flag,
            } => {
                if is_discarded(&flag) {
                    return;
                }
                if let Some(runtime) = self.runtime(window) {
                    runtime.borrow_mut().run(&label, &source);
                }
            }
            Task::Timeout { window, handle, flag } => {
                if is_discarded(&flag) {
                    return;
                }
                if let Some(runtime) = self.runtime(window) {
                    runtime.borrow_mut().run_timeout(handle);
                }
            }
            Task::XhrLoad {
                window,
                handle,
                body,
                flag,
            } => {
                if is_discarded(&flag) {
                    return;
                }
                if let Some(runtime) = self.runtime(window) {
                    runtime.borrow_mut().run_xhr_onload(handle, &body);
                }
            }
            Task::PostMessage {
                source,
                target,
                message,
                target_origin,
            } => self.deliver_message(source, target, &message, &target_origin),
            Task::Click { x, y } => self.click(x, y),
            Task::Keypress(ch) => self.keypress(ch),
            Task::Enter => self.enter(),
            Task::AdvanceTab => self.advance_tab(),
            Task::ScrollDown => self.scroll_down(),
            Task::Zoom(change) => self.zoom_by(change),
            Task::ToggleDarkMode => self.toggle_dark_mode(),
            Task::GoBack => self.go_back(),
        }
    }

    // ----- Navigation -----------------------------------------------------

    /// Load `url` into the root frame and record it in history.
    pub fn navigate(&self, url: Url) {
        self.navigate_frame(self.root_window(), url, None);
    }

    /// Parse `address` and navigate to it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Url`] if the address is not a URL.
    pub fn navigate_to(&self, address: &str) -> Result<(), LoadError> {
        let url = Url::parse(address).map_err(|source| LoadError::Url {
            url: address.to_string(),
            source,
        })?;
        self.navigate(url);
        Ok(())
    }

    /// [§ 7.4.2 Traversing the history](https://html.spec.whatwg.org/multipage/browsing-the-web.html#traverse-the-history-by-a-delta)
    ///
    /// Drop the current entry and reload the previous one.
    pub fn go_back(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if state.history.len() < 2 {
                return;
            }
            let _ = state.history.pop();
            state.history.last().cloned()
        };
        if let Some(url) = previous {
            let root = self.root_window();
            if let Err(e) = self.load_frame(root, url, None) {
                warn!("going back failed: {e}");
            }
        }
    }

    /// Follow a link or submit a form in `window`: the root frame records
    /// history, iframes navigate in place.
    fn navigate_frame(&self, window: WindowId, url: Url, body: Option<String>) {
        let is_root = window == self.root_window();
        match self.load_frame(window, url.clone(), body) {
            Ok(()) if is_root => self.state.borrow_mut().history.push(url),
            Ok(()) => {}
            Err(e) => warn!("navigation failed: {e}"),
        }
    }

    /// [§ 7.4.2.2 Beginning navigation](https://html.spec.whatwg.org/multipage/browsing-the-web.html#beginning-navigation)
    ///
    /// Fetch `url` (as a POST if `body` is given) and install it in
    /// `window`, replacing its script runtime and child frames.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the frame no longer exists or the document
    /// cannot be fetched; the frame is left unloaded.
    pub fn load_frame(&self, window: WindowId, url: Url, body: Option<String>) -> Result<(), LoadError> {
        let frame = self.frame(window).ok_or(LoadError::NoSuchFrame(window.0))?;

        // STEP 1: Tear down the old document's runtime and child frames.
        if let Some(runtime) = self.runtimes.borrow_mut().remove(&window) {
            runtime.borrow().discard();
        }
        self.remove_child_frames(window);
        let is_root = {
            let mut state = self.state.borrow_mut();
            if state.focus.is_some_and(|(w, _)| w == window) {
                state.focus = None;
            }
            let is_root = window == state.root;
            if is_root {
                state.zoom = 1.0;
                state.focused_frame = window;
                state.raf_windows.clear();
            }
            is_root
        };
        frame.borrow_mut().begin_load();

        // STEP 2: Fetch.
        let referrer = frame.borrow().url().clone();
        let request = match body {
            Some(body) => Request::post(url.clone(), body),
            None => Request::get(url.clone()),
        }
        .with_referrer((referrer.scheme() != Scheme::About).then_some(&referrer));
        let response = match self.fetcher.fetch(&request) {
            Ok(response) => response,
            Err(e) => {
                frame.borrow_mut().fail_load();
                return Err(e.into());
            }
        };

        // STEP 3: Install the document.
        let subresources = frame.borrow_mut().install(
            url,
            &response,
            Loader {
                fetcher: self.fetcher.as_ref(),
                images: &self.images,
            },
        );

        // STEP 4: A fresh script runtime.
        let host: Weak<dyn ScriptHost> = self.this.clone();
        let flag = match JsRuntime::new(window, host) {
            Ok(runtime) => {
                let flag = runtime.discard_flag();
                let _ = self
                    .runtimes
                    .borrow_mut()
                    .insert(window, Rc::new(RefCell::new(runtime)));
                Some(flag)
            }
            Err(e) => {
                warn!("scripts disabled in window {}: {e}", window.0);
                None
            }
        };
        frame.borrow_mut().set_discard_flag(flag.clone());

        // STEP 5: Child frames load through the queue.
        for (node, child_url) in subresources.iframes {
            let child = WindowId::next();
            let _ = self.frames.borrow_mut().insert(
                child,
                Rc::new(RefCell::new(Frame::new(
                    child,
                    Some(window),
                    IFRAME_WIDTH_PX,
                    IFRAME_HEIGHT_PX,
                ))),
            );
            frame.borrow_mut().attach_child_frame(node, child);
            self.tasks.schedule_task(Task::LoadFrame {
                window: child,
                url: child_url,
                body: None,
            });
        }

        // STEP 6: Scripts run as tasks, in document order.
        if let Some(flag) = flag {
            for script in subresources.scripts {
                self.tasks.schedule_task(Task::RunScript {
                    window,
                    label: script.label,
                    source: script.source,
                    flag: Arc::clone(&flag),
                });
            }
        }

        // STEP 7: The embedding iframe lays out again around the new
        // document.
        let parent = frame.borrow().parent();
        if let Some(parent) = parent.and_then(|parent| self.frame(parent)) {
            parent.borrow_mut().child_frame_loaded(window);
        }
        if is_root {
            for frame in self.all_frames() {
                frame.borrow_mut().needs_layout = true;
            }
        }
        let mut state = self.state.borrow_mut();
        state.needs_paint = true;
        state.needs_accessibility = true;
        Ok(())
    }

    /// Remove every frame nested under `window`, with their runtimes.
    fn remove_child_frames(&self, window: WindowId) {
        let children: Vec<WindowId> = self
            .frames
            .borrow()
            .iter()
            .filter(|(_, frame)| frame.borrow().parent() == Some(window))
            .map(|(&id, _)| id)
            .collect();
        for child in children {
            self.remove_child_frames(child);
            if let Some(runtime) = self.runtimes.borrow_mut().remove(&child) {
                runtime.borrow().discard();
            }
            let _ = self.frames.borrow_mut().remove(&child);
            let mut state = self.state.borrow_mut();
            if state.focus.is_some_and(|(w, _)| w == child) {
                state.focus = None;
            }
            if state.focused_frame == child {
                state.focused_frame = state.root;
            }
            let _ = state.raf_windows.remove(&child);
        }
    }

    // ----- Browser chrome -------------------------------------------------

    /// Change the zoom. Every frame lays out again.
    pub fn zoom_by(&self, change: ZoomChange) {
        {
            let mut state = self.state.borrow_mut();
            state.zoom = change.apply(state.zoom);
            info!("zoom is now {:.3}", state.zoom);
        }
        for frame in self.all_frames() {
            frame.borrow_mut().needs_layout = true;
        }
    }

    /// [Media Queries § 12.5 prefers-color-scheme](https://www.w3.org/TR/mediaqueries-5/#prefers-color-scheme)
    ///
    /// Flip dark mode. Every computed style depends on it.
    pub fn toggle_dark_mode(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.dark_mode = !state.dark_mode;
            state.needs_paint = true;
        }
        for frame in self.all_frames() {
            frame.borrow_mut().invalidate_styles();
        }
    }
}
