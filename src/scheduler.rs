//! # Scheduler
//!
//! The kernel context object. Owns every task, the ready structure, the
//! delay queue, the timer list and the arenas of synchronization objects,
//! and implements the pend/resume discipline all primitives share.
//!
//! ## Scheduling Algorithm
//!
//! `pick_next()` walks the ready structure bucket by bucket in ascending
//! priority value and takes the first task that is not PENDING. Ties go to
//! the earliest-enqueued task; a task whose time slice runs out moves to the
//! tail of its bucket, which round-robins its peers.
//!
//! `schedule()` never switches stacks. It records the task that should run
//! and raises a single-bit switch request, which the port layer consumes by
//! pending PendSV. The PendSV handler then calls
//! [`save_current_stack_pointer`](Scheduler::save_current_stack_pointer),
//! [`next_stack_pointer`](Scheduler::next_stack_pointer) and
//! [`commit_switch`](Scheduler::commit_switch).
//!
//! ## Tick
//!
//! At each SysTick interrupt:
//! 1. **Timer list**: age the head entry, expire timeouts and software timers
//! 2. **Time slice**: age the running task; rotate it when the slice is spent
//! 3. **Delays**: age every delayed task; resume those that reach zero
//! 4. **Schedule**: pick the next task and request a switch if it changed

use heapless::Vec;

use crate::config::{MAX_EVENTS, MAX_MUTEXES, MAX_QUEUES, MAX_SEMAPHORES, MAX_SOFT_TIMERS, MAX_TASKS, MAX_TIMERS};
use crate::error::{KernelError, KernelResult};
use crate::ipc::pool::MessagePool;
use crate::ipc::{Event, MessageQueue, Mutex, Semaphore};
use crate::ready::ReadyQueue;
use crate::soft_timer::{SoftTimer, TimerId};
use crate::stack::StackRegion;
use crate::task::{Priority, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskInfo, TaskState};
use crate::timer::{Timeout, TimerList};
use crate::wait::{WaitQueue, WaitTarget};

/// Identifies an entry in the timer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKey {
    /// The timeout embedded in a task, armed by a bounded wait.
    Task(TaskId),
    /// A user software timer.
    Soft(TimerId),
}

/// The central kernel state.
///
/// Stored as a `static` inside a critical-section mutex in `sync.rs`; tests
/// build their own isolated instances.
pub struct Scheduler {
    /// Task arena. Tasks are never removed.
    pub(crate) tasks: Vec<TaskControlBlock, MAX_TASKS>,

    /// Every READY or RUNNING task, bucketed by priority.
    pub(crate) ready: ReadyQueue,

    /// Tasks sleeping in `delay`.
    pub(crate) delayed: WaitQueue,

    /// Armed timeouts and software timers.
    pub(crate) timers: TimerList<TimerKey, MAX_TIMERS>,
    pub(crate) soft_timers: Vec<SoftTimer, MAX_SOFT_TIMERS>,

    /// Synchronization object arenas.
    pub(crate) semaphores: Vec<Semaphore, MAX_SEMAPHORES>,
    pub(crate) mutexes: Vec<Mutex, MAX_MUTEXES>,
    pub(crate) events: Vec<Event, MAX_EVENTS>,
    pub(crate) queues: Vec<MessageQueue, MAX_QUEUES>,
    pub(crate) pool: MessagePool,

    /// Task whose context is loaded on the CPU.
    current: Option<TaskId>,

    /// Task the scheduler picked to run. Equals `current` unless a switch
    /// is outstanding.
    next: Option<TaskId>,

    /// Set when `next` differs from `current`; consumed by the port layer.
    switch_pending: bool,

    /// Monotonic tick counter.
    tick_count: u64,

    started: bool,
}

impl Scheduler {
    /// Create an empty kernel with no tasks and no objects.
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            ready: ReadyQueue::new(),
            delayed: WaitQueue::new(),
            timers: TimerList::new(),
            soft_timers: Vec::new(),
            semaphores: Vec::new(),
            mutexes: Vec::new(),
            events: Vec::new(),
            queues: Vec::new(),
            pool: MessagePool::new(),
            current: None,
            next: None,
            switch_pending: false,
            tick_count: 0,
            started: false,
        }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Register a task whose initial frame is already on its stack.
    ///
    /// The task enters the tail of its priority bucket as READY. Once the
    /// scheduler is running, a more urgent new task preempts the caller.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the handle of the newly created task
    /// - `Err(Fail)`: the task arena is full
    pub fn create_task(
        &mut self,
        name: &str,
        entry: TaskEntry,
        arg: usize,
        config: TaskConfig,
        stack: StackRegion,
        stack_pointer: *mut u32,
    ) -> KernelResult<TaskId> {
        let id = TaskId(self.tasks.len());
        let tcb = TaskControlBlock::new(id, name, entry, arg, config, stack, stack_pointer);
        if self.tasks.push(tcb).is_err() {
            warn!("task table full, cannot create {=str}", name);
            return Err(KernelError::Fail);
        }
        self.ready.insert(id, config.priority);
        debug!("created {} prio {=u8}", id, config.priority);

        self.schedule();
        Ok(id)
    }

    /// Begin scheduling: select the most urgent task and make it current
    /// without a context switch. The port launches it directly.
    pub fn start(&mut self) -> KernelResult<TaskId> {
        if self.started {
            return Err(KernelError::Fail);
        }
        self.started = true;
        let first = self.pick_next().ok_or(KernelError::Fail)?;
        self.commit_switch();
        info!("scheduler started with {}", first);
        Ok(first)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The task whose code is executing.
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks.get(id.0)
    }

    pub fn task_info(&self, id: TaskId) -> KernelResult<TaskInfo> {
        self.task(id).map(TaskControlBlock::info).ok_or(KernelError::Fail)
    }

    /// Tasks in the ready structure, in scheduling order.
    pub fn ready_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.ready.iter()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The calling task, which must exist for any blocking or owning call.
    pub(crate) fn caller(&self) -> KernelResult<TaskId> {
        self.current.ok_or(KernelError::Fail)
    }

    pub(crate) fn tcb_mut(&mut self, id: TaskId) -> &mut TaskControlBlock {
        &mut self.tasks[id.0]
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Select the task that should hold the CPU.
    ///
    /// Returns the picked task. If it is already the running task this is a
    /// no-op; otherwise the previously running task is demoted to READY and
    /// the picked one promoted to RUNNING.
    pub fn pick_next(&mut self) -> Option<TaskId> {
        let tasks = &self.tasks;
        let picked = self.ready.iter().find(|id| tasks[id.0].is_runnable())?;

        let running = self.next.or(self.current);
        if running != Some(picked) {
            if let Some(prev) = running {
                let prev = &mut self.tasks[prev.0];
                if prev.state == TaskState::Running {
                    prev.state = TaskState::Ready;
                }
            }
        }
        self.tasks[picked.0].state = TaskState::Running;
        self.next = Some(picked);
        Some(picked)
    }

    /// Pick the next task and request a context switch if it changed.
    pub fn schedule(&mut self) {
        if !self.started {
            return;
        }
        self.pick_next();
        self.switch_pending = self.next != self.current;
        if self.switch_pending {
            trace!("switch requested {} -> {}", self.current, self.next);
        }
    }

    /// Consume the deferred switch request.
    pub fn take_switch_request(&mut self) -> bool {
        core::mem::replace(&mut self.switch_pending, false)
    }

    /// Store the interrupted task's stack pointer.
    pub fn save_current_stack_pointer(&mut self, sp: *mut u32) {
        if let Some(cur) = self.current {
            self.tasks[cur.0].stack_pointer = sp;
        }
    }

    /// Stack pointer of the task to restore.
    pub fn next_stack_pointer(&self) -> *mut u32 {
        match self.next {
            Some(next) => self.tasks[next.0].stack_pointer,
            None => core::ptr::null_mut(),
        }
    }

    /// Advance "current" to "next" once the hardware switch completed.
    pub fn commit_switch(&mut self) {
        self.current = self.next;
        self.switch_pending = false;
    }

    // -----------------------------------------------------------------------
    // Pend / resume
    // -----------------------------------------------------------------------

    /// The wait queue a target names, if the object exists.
    pub(crate) fn wait_queue_mut(&mut self, target: WaitTarget) -> Option<&mut WaitQueue> {
        match target {
            WaitTarget::Delay => Some(&mut self.delayed),
            WaitTarget::Semaphore(id) => self.semaphores.get_mut(id.0).map(|s| &mut s.waiters),
            WaitTarget::Mutex(id) => self.mutexes.get_mut(id.0).map(|m| &mut m.sem.waiters),
            WaitTarget::Event(id) => self.events.get_mut(id.0).map(|e| &mut e.waiters),
            WaitTarget::Queue(id) => self.queues.get_mut(id.0).map(|q| &mut q.waiters),
        }
    }

    /// Move `task` from the ready structure into the queue named by
    /// `target`, keeping that queue in priority order.
    pub(crate) fn pend(&mut self, task: TaskId, target: WaitTarget) {
        let tcb = &mut self.tasks[task.0];
        let priority = tcb.priority;
        tcb.state = TaskState::Pending;
        tcb.blocked_on = Some(target);
        self.ready.remove(task, priority);
        if let Some(queue) = self.wait_queue_mut(target) {
            queue.insert(task, priority);
        }
        trace!("{} pended on {}", task, target);
    }

    /// Move `task` out of its wait queue back into the ready structure,
    /// recording `result` as the outcome of its wait. The caller must
    /// follow up with `schedule()`.
    pub(crate) fn resume(&mut self, task: TaskId, result: KernelResult<()>) {
        let tcb = &mut self.tasks[task.0];
        let target = tcb.blocked_on.take();
        let priority = tcb.priority;
        tcb.pend_result = result;
        tcb.state = TaskState::Ready;
        if let Some(queue) = target.and_then(|t| self.wait_queue_mut(t)) {
            queue.remove(task);
        }
        self.ready.insert(task, priority);
        trace!("{} resumed", task);
    }

    /// Disarm the task's timeout, then resume it.
    pub(crate) fn wake(&mut self, task: TaskId, result: KernelResult<()>) {
        self.disarm_timeout(task);
        self.resume(task, result);
    }

    pub(crate) fn disarm_timeout(&mut self, task: TaskId) {
        let tcb = &mut self.tasks[task.0];
        if tcb.timeout_armed {
            tcb.timeout_armed = false;
            self.timers.remove(TimerKey::Task(task));
        }
    }

    /// Pend the calling task on `target` and arm its timeout, without
    /// scheduling yet.
    ///
    /// Fails with `Timeout` if the caller asked not to wait.
    pub(crate) fn pend_current(&mut self, target: WaitTarget, timeout: Timeout) -> KernelResult<TaskId> {
        let me = self.caller()?;
        if timeout.is_no_wait() {
            return Err(KernelError::Timeout);
        }
        self.pend(me, target);
        if let Some(ticks) = timeout.ticks() {
            if self.timers.insert(TimerKey::Task(me), ticks).is_err() {
                unreachable!("timer list holds one timeout per task");
            }
            self.tasks[me.0].timeout_armed = true;
        }
        Ok(me)
    }

    /// Pend the calling task, arm its timeout and schedule away from it.
    pub(crate) fn block_current(&mut self, target: WaitTarget, timeout: Timeout) -> KernelResult<()> {
        self.pend_current(target, timeout)?;
        self.schedule();
        Ok(())
    }

    /// The outcome recorded for the calling task by whoever resumed it.
    pub fn wait_result(&self) -> KernelResult<()> {
        let me = self.caller()?;
        self.tasks[me.0].pend_result
    }

    /// Change a task's effective priority, moving it wherever it is queued.
    pub(crate) fn set_priority(&mut self, task: TaskId, priority: Priority) {
        let tcb = &mut self.tasks[task.0];
        let old = tcb.priority;
        if old == priority {
            return;
        }
        tcb.priority = priority;
        let blocked_on = tcb.blocked_on;
        match blocked_on {
            Some(target) => {
                if let Some(queue) = self.wait_queue_mut(target) {
                    queue.reposition(task, priority);
                }
            }
            None => self.ready.reprioritize(task, old, priority),
        }
    }

    // -----------------------------------------------------------------------
    // Delay
    // -----------------------------------------------------------------------

    /// Suspend the calling task for `ticks` ticks. `delay(0)` yields to
    /// peers of equal priority.
    pub fn delay(&mut self, ticks: u32) -> KernelResult<()> {
        let me = self.caller()?;
        let tcb = &mut self.tasks[me.0];
        if ticks == 0 {
            let priority = tcb.priority;
            tcb.state = TaskState::Ready;
            self.ready.requeue(me, priority);
        } else {
            tcb.delay = ticks;
            tcb.delay_left = ticks;
            self.pend(me, WaitTarget::Delay);
        }
        self.schedule();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Tick entry point, called once per SysTick.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        for key in self.timers.check() {
            match key {
                TimerKey::Task(task) => self.expire_timeout(task),
                TimerKey::Soft(timer) => self.fire_soft_timer(timer),
            }
        }

        self.age_time_slice();
        self.age_delays();
        self.schedule();
    }

    /// A bounded wait ran out: resume the task with `Timeout`.
    fn expire_timeout(&mut self, task: TaskId) {
        let tcb = &mut self.tasks[task.0];
        tcb.timeout_armed = false;
        if tcb.state == TaskState::Pending {
            debug!("{} timed out", task);
            let target = tcb.blocked_on;
            self.resume(task, Err(KernelError::Timeout));
            if let Some(WaitTarget::Mutex(id)) = target {
                self.mutex_waiter_left(id);
            }
        }
    }

    fn age_time_slice(&mut self) {
        let Some(cur) = self.current else {
            return;
        };
        let tcb = &mut self.tasks[cur.0];
        if tcb.state != TaskState::Running {
            return;
        }
        tcb.slice_left = tcb.slice_left.saturating_sub(1);
        if tcb.slice_left == 0 {
            tcb.slice_left = tcb.time_slice;
            tcb.state = TaskState::Ready;
            let priority = tcb.priority;
            self.ready.requeue(cur, priority);
        }
    }

    fn age_delays(&mut self) {
        let delayed: Vec<TaskId, MAX_TASKS> = self.delayed.iter().collect();
        for task in delayed {
            let tcb = &mut self.tasks[task.0];
            tcb.delay_left = tcb.delay_left.saturating_sub(1);
            if tcb.delay_left == 0 {
                self.resume(task, Ok(()));
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn entry(_arg: usize) -> ! {
        loop {}
    }

    /// Create a task with a dummy stack.
    pub(crate) fn spawn(k: &mut Scheduler, name: &str, priority: u8, time_slice: u32) -> TaskId {
        k.create_task(
            name,
            entry,
            0,
            TaskConfig {
                priority,
                time_slice,
            },
            StackRegion::empty(),
            core::ptr::null_mut(),
        )
        .unwrap()
    }

    /// Play the context-switch collaborator: complete a requested switch.
    pub(crate) fn switch(k: &mut Scheduler) {
        if k.take_switch_request() {
            k.commit_switch();
        }
    }

    /// A started kernel with an idle task.
    pub(crate) fn kernel() -> Scheduler {
        let mut k = Scheduler::new();
        spawn(&mut k, "idle", crate::config::IDLE_PRIORITY, 1);
        k
    }

    fn ids(k: &Scheduler) -> Vec<usize, MAX_TASKS> {
        k.ready_tasks().map(|t| t.0).collect()
    }

    #[test]
    fn test_start_picks_most_urgent() {
        let mut k = kernel();
        let low = spawn(&mut k, "low", 9, 0);
        let high = spawn(&mut k, "high", 2, 0);

        assert_eq!(k.start(), Ok(high));
        assert_eq!(k.current_task(), Some(high));
        assert_eq!(k.task(high).unwrap().state, TaskState::Running);
        assert_eq!(k.task(low).unwrap().state, TaskState::Ready);
        assert!(!k.take_switch_request());
        assert_eq!(k.start(), Err(KernelError::Fail));
    }

    #[test]
    fn test_start_without_tasks_fails() {
        let mut k = Scheduler::new();
        assert_eq!(k.start(), Err(KernelError::Fail));
    }

    #[test]
    fn test_create_after_start_preempts() {
        let mut k = kernel();
        let low = spawn(&mut k, "low", 9, 0);
        k.start().unwrap();

        let high = spawn(&mut k, "high", 1, 0);
        assert!(k.take_switch_request());
        assert_eq!(k.task(high).unwrap().state, TaskState::Running);
        assert_eq!(k.task(low).unwrap().state, TaskState::Ready);
        k.commit_switch();
        assert_eq!(k.current_task(), Some(high));
    }

    #[test]
    fn test_task_table_full() {
        let mut k = Scheduler::new();
        for i in 0..MAX_TASKS {
            spawn(&mut k, "t", i as u8, 0);
        }
        let r = k.create_task(
            "extra",
            entry,
            0,
            TaskConfig {
                priority: 1,
                time_slice: 0,
            },
            StackRegion::empty(),
            core::ptr::null_mut(),
        );
        assert_eq!(r, Err(KernelError::Fail));
    }

    #[test]
    fn test_time_slice_round_robins_peers() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 4, 2);
        let b = spawn(&mut k, "b", 4, 2);
        k.start().unwrap();
        assert_eq!(k.current_task(), Some(a));

        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(a));

        // Slice spent: a goes to the tail, b runs
        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(b));
        assert_eq!(k.task(a).unwrap().state, TaskState::Ready);
        assert_eq!(k.task(a).unwrap().slice_left, 2);
        assert_eq!(&ids(&k)[..2], &[b.0, a.0]);

        k.tick();
        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(a));
    }

    #[test]
    fn test_lone_task_keeps_running_after_slice() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 4, 1);
        k.start().unwrap();

        k.tick();
        assert!(!k.take_switch_request());
        assert_eq!(k.task(a).unwrap().state, TaskState::Running);
    }

    #[test]
    fn test_delay_pends_and_wakes() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 3, 0);
        k.start().unwrap();

        k.delay(3).unwrap();
        assert_eq!(k.task(a).unwrap().state, TaskState::Pending);
        assert_eq!(k.task(a).unwrap().blocked_on, Some(WaitTarget::Delay));
        assert!(!k.ready.contains(a));
        switch(&mut k);
        assert_ne!(k.current_task(), Some(a));

        k.tick();
        k.tick();
        switch(&mut k);
        assert_eq!(k.task(a).unwrap().state, TaskState::Pending);

        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(a));
        assert!(k.delayed.is_empty());
        assert_eq!(k.wait_result(), Ok(()));
    }

    #[test]
    fn test_delay_zero_yields_to_peer() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 3, 0);
        let b = spawn(&mut k, "b", 3, 0);
        k.start().unwrap();

        k.delay(0).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(b));
        assert_eq!(k.task(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_delay_requires_running_task() {
        let mut k = kernel();
        assert_eq!(k.delay(5), Err(KernelError::Fail));
    }

    #[test]
    fn test_stack_pointer_handoff() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 3, 0);
        let b = spawn(&mut k, "b", 5, 0);
        k.start().unwrap();
        k.tasks[b.0].stack_pointer = 0x2000_0100 as *mut u32;

        k.delay(1).unwrap();
        assert!(k.take_switch_request());
        k.save_current_stack_pointer(0x2000_0040 as *mut u32);
        assert_eq!(k.next_stack_pointer(), 0x2000_0100 as *mut u32);
        k.commit_switch();

        assert_eq!(k.current_task(), Some(b));
        assert_eq!(k.task(a).unwrap().stack_pointer, 0x2000_0040 as *mut u32);
    }

    #[test]
    fn test_ready_structure_never_holds_pending_tasks() {
        let mut k = kernel();
        let a = spawn(&mut k, "a", 1, 0);
        let b = spawn(&mut k, "b", 2, 0);
        k.start().unwrap();

        k.delay(2).unwrap();
        switch(&mut k);
        k.delay(4).unwrap();
        switch(&mut k);

        for id in k.ready_tasks() {
            assert_ne!(k.task(id).unwrap().state, TaskState::Pending);
        }
        assert!(k.delayed.contains(a) && k.delayed.contains(b));
        // Wait queue order follows priority
        assert_eq!(k.delayed.head(), Some(a));
    }

    #[test]
    fn test_task_info_snapshot() {
        let mut k = kernel();
        let a = spawn(&mut k, "sampler", 6, 4);
        let info = k.task_info(a).unwrap();
        assert_eq!(info.name.as_str(), "sampler");
        assert_eq!(info.priority, 6);
        assert_eq!(info.time_slice, 4);
        assert_eq!(info.state, TaskState::Ready);
        assert_eq!(k.task_info(TaskId(7)).unwrap_err(), KernelError::Fail);
    }
}
