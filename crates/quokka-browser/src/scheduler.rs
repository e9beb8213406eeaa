//! The threads of a tab: its main thread and the compositor thread.
//!
//! [§ 8.1.7.3 Processing model](https://html.spec.whatwg.org/multipage/webappapis.html#event-loop-processing-model)
//!
//! The main thread owns the [`Tab`]. It runs tasks as they arrive and, once
//! per refresh interval, an animation frame. Each frame that changed hands
//! a [`CommitData`] to the compositor thread. The handoff is single
//! buffered: a commit waits until the compositor has taken in the last one.

use std::io;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};
use quokka_common::net::Fetcher;
use quokka_common::url::Url;
use tiny_skia::Pixmap;

use crate::accessibility::AccessibilityNode;
use crate::commit::CommitData;
use crate::compositor::Compositor;
use crate::config::BrowserConfig;
use crate::error::CompositorError;
use crate::fonts::SystemFontMetrics;
use crate::tab::Tab;
use crate::task::{Task, TaskRunner};

#[derive(Debug, Default)]
struct Slot {
    pending: Option<CommitData>,
    /// The compositor is applying a commit.
    busy: bool,
    commits: usize,
    last_commit: Option<Instant>,
    quit: bool,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
    compositor: Mutex<Compositor>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compositor(&self) -> MutexGuard<'_, Compositor> {
        self.compositor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The sending end of the commit handoff, given to the main thread.
#[derive(Debug, Clone)]
pub struct CommitSender {
    shared: Arc<Shared>,
}

impl CommitSender {
    /// Hand a commit to the compositor, waiting while it is still busy
    /// with the previous one.
    pub fn submit(&self, commit: CommitData) {
        let slot = self.shared.slot();
        let mut slot = self
            .shared
            .changed
            .wait_while(slot, |s| (s.pending.is_some() || s.busy) && !s.quit)
            .unwrap_or_else(PoisonError::into_inner);
        if slot.quit {
            return;
        }
        slot.pending = Some(commit);
        self.shared.changed.notify_all();
    }
}

/// The compositor thread: takes in commits and rasters them.
#[derive(Debug)]
pub struct CompositorThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CompositorThread {
    /// Start the thread with an empty compositor.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(width: u32, height: u32) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            changed: Condvar::new(),
            compositor: Mutex::new(Compositor::new(width, height)),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("quokka-compositor".to_string())
            .spawn(move || composite_loop(&worker))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// A sender for the main thread.
    #[must_use]
    pub fn sender(&self) -> CommitSender {
        CommitSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Commits taken in so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.shared.slot().commits
    }

    /// Wait until at least one commit arrived and none followed for
    /// `quiet`. Gives up after `limit`. Returns whether the page settled.
    pub fn wait_until_settled(&self, quiet: Duration, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut slot = self.shared.slot();
        loop {
            let now = Instant::now();
            let idle = slot.pending.is_none() && !slot.busy;
            if let Some(last) = slot.last_commit {
                if idle && now.duration_since(last) >= quiet {
                    return true;
                }
            }
            if now >= deadline {
                return false;
            }
            let wait = quiet.min(deadline - now);
            slot = self
                .shared
                .changed
                .wait_timeout(slot, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Run `f` on the compositor.
    pub fn with_compositor<R>(&self, f: impl FnOnce(&Compositor) -> R) -> R {
        f(&self.shared.compositor())
    }

    /// The last composited frame.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Allocation`] if the viewport is empty.
    pub fn screenshot(&self) -> Result<Pixmap, CompositorError> {
        self.shared.compositor().composite()
    }

    /// Save the last composited frame as a PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be drawn or written.
    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        self.shared.compositor().save_png(path)
    }

    /// The last accessibility tree committed.
    #[must_use]
    pub fn accessibility_tree(&self) -> Option<AccessibilityNode> {
        self.shared.compositor().accessibility_tree().cloned()
    }

    /// Stop the thread. Pending commits are dropped.
    pub fn shutdown(&mut self) {
        {
            let mut slot = self.shared.slot();
            slot.quit = true;
            slot.pending = None;
            self.shared.changed.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("compositor thread panicked");
            }
        }
    }
}

impl Drop for CompositorThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn composite_loop(shared: &Shared) {
    loop {
        // STEP 1: Wait for a commit.
        let commit = {
            let slot = shared.slot();
            let mut slot = shared
                .changed
                .wait_while(slot, |s| s.pending.is_none() && !s.quit)
                .unwrap_or_else(PoisonError::into_inner);
            if slot.quit {
                return;
            }
            slot.busy = true;
            slot.pending.take()
        };

        // STEP 2: Raster outside the slot lock so the main thread can
        // keep working.
        if let Some(commit) = commit {
            shared.compositor().commit(commit);
        }

        // STEP 3: Ready for the next one.
        let mut slot = shared.slot();
        slot.busy = false;
        slot.commits += 1;
        slot.last_commit = Some(Instant::now());
        shared.changed.notify_all();
    }
}

/// A tab's main thread.
#[derive(Debug)]
pub struct TabThread {
    tasks: Arc<TaskRunner>,
    handle: Option<JoinHandle<()>>,
}

impl TabThread {
    /// Start a tab on `url`, committing frames through `sender`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(config: BrowserConfig, fetcher: Arc<dyn Fetcher>, url: Url, sender: CommitSender) -> io::Result<Self> {
        let tasks = Arc::new(TaskRunner::new());
        tasks.schedule_task(Task::Navigate { url });
        let runner = Arc::clone(&tasks);
        let handle = thread::Builder::new()
            .name("quokka-main".to_string())
            .spawn(move || {
                let tab = Tab::with_task_runner(config, fetcher, Box::new(SystemFontMetrics), runner);
                event_loop(&tab, &sender);
            })?;
        Ok(Self {
            tasks,
            handle: Some(handle),
        })
    }

    /// Queue input or navigation for the tab.
    pub fn schedule(&self, task: Task) {
        self.tasks.schedule_task(task);
    }

    /// Stop the tab. Queued tasks are dropped.
    pub fn shutdown(&mut self) {
        self.tasks.set_needs_quit();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("tab thread panicked");
            }
        }
    }
}

impl Drop for TabThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run tasks until the next frame is due, then render it.
fn event_loop(tab: &Tab, sender: &CommitSender) {
    let tasks = tab.task_runner();
    let interval = tab.config().refresh_interval;
    let mut next_frame = Instant::now() + interval;
    info!("tab started");
    loop {
        if tasks.needs_quit() {
            break;
        }
        let now = Instant::now();
        if now < next_frame {
            if let Some(task) = tasks.next_timeout(next_frame - now) {
                tab.run_task(task);
            }
            continue;
        }

        next_frame = now + interval;
        if tab.needs_animation_frame() || tab.needs_render() {
            if let Some(commit) = tab.run_animation_frame() {
                debug!("committing frame for {}", commit.url);
                sender.submit(commit);
            }
        }
    }
    info!("tab stopped");
}
