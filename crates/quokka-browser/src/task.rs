//! The per-tab task queue.
//!
//! [§ 8.1.7 Event loops](https://html.spec.whatwg.org/multipage/webappapis.html#event-loops)
//!
//! "An event loop has one or more task queues. A task queue is a set of
//! tasks."
//!
//! Everything that mutates a tab, whether user input, a timer firing, an
//! XHR completing or a message between frames, becomes a [`Task`] and runs
//! on the tab's main thread in FIFO order. Other threads only ever touch
//! the [`TaskRunner`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use quokka_common::url::Url;
use quokka_dom::WindowId;

use crate::config::ZoomChange;

/// A script callback's owner. The callback is dropped if the runtime that
/// registered it was discarded before the task ran.
pub type DiscardFlag = Arc<AtomicBool>;

/// Whether the runtime behind `flag` is gone.
#[must_use]
pub fn is_discarded(flag: &DiscardFlag) -> bool {
    flag.load(Ordering::Acquire)
}

/// A unit of work for the tab's main thread.
#[derive(Debug, Clone)]
pub enum Task {
    /// Navigate the root frame.
    Navigate {
        /// Destination.
        url: Url,
    },
    /// Load a document into a frame, optionally as the response to a POST.
    LoadFrame {
        /// The frame.
        window: WindowId,
        /// Destination.
        url: Url,
        /// Form body for a POST.
        body: Option<String>,
    },
    /// Run a script fetched (or found inline) during a load.
    RunScript {
        /// The frame the script belongs to.
        window: WindowId,
        /// Where the script came from, for error messages.
        label: String,
        /// Script source.
        source: String,
        /// The runtime the script was loaded for.
        flag: DiscardFlag,
    },
    /// A `setTimeout` delay elapsed.
    Timeout {
        /// The frame that called `setTimeout`.
        window: WindowId,
        /// Callback handle in the script runtime.
        handle: u32,
        /// The runtime that registered the callback.
        flag: DiscardFlag,
    },
    /// An asynchronous XHR finished.
    XhrLoad {
        /// The frame that sent the request.
        window: WindowId,
        /// Request handle in the script runtime.
        handle: u32,
        /// Response text.
        body: String,
        /// The runtime that sent the request.
        flag: DiscardFlag,
    },
    /// Deliver a `postMessage`.
    PostMessage {
        /// Sending frame.
        source: WindowId,
        /// Receiving frame.
        target: WindowId,
        /// The message.
        message: String,
        /// `targetOrigin`, or `*`.
        target_origin: String,
    },
    /// A click at viewport coordinates.
    Click {
        /// Horizontal position.
        x: f32,
        /// Vertical position, not including scroll.
        y: f32,
    },
    /// A printable character.
    Keypress(char),
    /// The Enter key.
    Enter,
    /// The Tab key.
    AdvanceTab,
    /// Scroll the root frame down one step.
    ScrollDown,
    /// Change the zoom.
    Zoom(ZoomChange),
    /// Flip dark mode.
    ToggleDarkMode,
    /// Go back in history.
    GoBack,
}

#[derive(Debug, Default)]
struct Queue {
    tasks: VecDeque<Task>,
    needs_quit: bool,
}

/// [§ 8.1.7.3 Processing model](https://html.spec.whatwg.org/multipage/webappapis.html#event-loop-processing-model)
///
/// A FIFO of tasks guarded by a mutex and a condition variable. Cloned
/// freely across threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct TaskRunner {
    queue: Mutex<Queue>,
    condition: Condvar,
}

impl TaskRunner {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // A panic while holding the lock leaves the queue itself intact.
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append a task and wake the main thread. Ignored after
    /// [`TaskRunner::set_needs_quit`].
    pub fn schedule_task(&self, task: Task) {
        let mut queue = self.lock();
        if queue.needs_quit {
            return;
        }
        queue.tasks.push_back(task);
        self.condition.notify_all();
    }

    /// Ask the main thread to stop. Pending tasks are dropped and every
    /// waiter wakes up.
    pub fn set_needs_quit(&self) {
        let mut queue = self.lock();
        queue.needs_quit = true;
        queue.tasks.clear();
        self.condition.notify_all();
    }

    /// Whether [`TaskRunner::set_needs_quit`] was called.
    #[must_use]
    pub fn needs_quit(&self) -> bool {
        self.lock().needs_quit
    }

    /// Take the next task without waiting.
    #[must_use]
    pub fn try_next(&self) -> Option<Task> {
        self.lock().tasks.pop_front()
    }

    /// Take the next task, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout or quit.
    #[must_use]
    pub fn next_timeout(&self, timeout: Duration) -> Option<Task> {
        let queue = self.lock();
        let (mut queue, _) = self
            .condition
            .wait_timeout_while(queue, timeout, |q| q.tasks.is_empty() && !q.needs_quit)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.tasks.pop_front()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let runner = TaskRunner::new();
        runner.schedule_task(Task::Keypress('a'));
        runner.schedule_task(Task::Keypress('b'));
        assert_eq!(runner.len(), 2);
        assert!(matches!(runner.try_next(), Some(Task::Keypress('a'))));
        assert!(matches!(runner.try_next(), Some(Task::Keypress('b'))));
        assert!(runner.try_next().is_none());
    }

    #[test]
    fn test_wakes_on_schedule_from_another_thread() {
        let runner = Arc::new(TaskRunner::new());
        let remote = Arc::clone(&runner);
        let handle = thread::spawn(move || remote.schedule_task(Task::Enter));
        let task = runner.next_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(matches!(task, Some(Task::Enter)));
    }

    #[test]
    fn test_quit_drops_pending_and_wakes_waiters() {
        let runner = Arc::new(TaskRunner::new());
        runner.schedule_task(Task::ScrollDown);
        runner.set_needs_quit();
        assert!(runner.is_empty());
        runner.schedule_task(Task::ScrollDown);
        assert!(runner.is_empty());

        let start = Instant::now();
        assert!(runner.next_timeout(Duration::from_secs(5)).is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(runner.needs_quit());
    }

    #[test]
    fn test_timeout_without_tasks() {
        let runner = TaskRunner::new();
        assert!(runner.next_timeout(Duration::from_millis(10)).is_none());
    }
}
