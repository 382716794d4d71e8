//! Firmware spinlocks.
//!
//! A [`Lock`] is a single 64-bit cell holding `owner_pir << 32 | 1` while
//! held and `0` while free. Every CPU keeps the list of locks it holds so
//! that panic paths can release them, and records the lock it is spinning
//! on so that the deadlock detector can walk the wait-for graph.
//!
//! Locks are driven through a [`CpuHandle`], the per-CPU view of a
//! [`LockContext`]. Until [`LockContext::init_locks`] runs (and again after
//! any lock error) locks are "busted": every operation succeeds without
//! touching the cell.
//!
//! Misuse is fatal. The context is marked busted, a `LOCK ERROR` line is
//! logged and the CPU panics.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::fmt;
use core::panic::Location;
use core::ptr::{self, NonNull};
use core::sync::atomic::{
    AtomicBool, AtomicPtr, AtomicU8, AtomicU32, AtomicU64, Ordering, fence,
};

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::config::LOCK_TIMEOUT_MS;

/// Deepest lock nesting a CPU may reach.
pub const MAX_LOCKS_HELD: usize = 32;

/// Platform hooks the lock core calls into.
pub trait LockPlatform: Send + Sync {
    /// Milliseconds since boot, `None` while the time base is not valid.
    fn timebase_ms(&self) -> Option<u64>;

    fn flush_console(&self);

    fn disable_fast_reboot(&self, reason: &str);

    /// Drop SMT priority while spinning.
    fn smt_lowest(&self) {
        core::hint::spin_loop();
    }

    fn smt_medium(&self) {}

    fn backtrace(&self) {}
}

pub struct Lock {
    lock_val: AtomicU64,
    /// Taken on the console path; holding it suspends console flushing.
    in_con_path: bool,
    /// Written only by the holder.
    owner: UnsafeCell<Option<&'static Location<'static>>>,
}

unsafe impl Sync for Lock {}

impl Lock {
    pub const fn new() -> Self {
        Self {
            lock_val: AtomicU64::new(0),
            in_con_path: false,
            owner: UnsafeCell::new(None),
        }
    }

    pub const fn new_console() -> Self {
        Self {
            lock_val: AtomicU64::new(0),
            in_con_path: true,
            owner: UnsafeCell::new(None),
        }
    }

    /// Raw cell value.
    pub fn value(&self) -> u64 {
        self.lock_val.load(Ordering::Relaxed)
    }

    pub fn is_locked(&self) -> bool {
        self.value() & 1 != 0
    }

    pub fn owner_pir(&self) -> Option<u32> {
        let v = self.value();
        (v & 1 != 0).then_some((v >> 32) as u32)
    }

    pub fn in_con_path(&self) -> bool {
        self.in_con_path
    }

    /// Call site that acquired the lock.
    pub fn owner(&self) -> Option<&'static Location<'static>> {
        unsafe { *self.owner.get() }
    }

    fn set_owner(&self, owner: Option<&'static Location<'static>>) {
        unsafe { *self.owner.get() = owner }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("lock_val", &format_args!("{:#018x}", self.value()))
            .field("in_con_path", &self.in_con_path)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CpuState {
    NoCpu = 0,
    Present = 1,
    Active = 2,
    Os = 3,
    Disabled = 4,
}

impl CpuState {
    fn from_raw(v: u8) -> Self {
        match v {
            1 => CpuState::Present,
            2 => CpuState::Active,
            3 => CpuState::Os,
            4 => CpuState::Disabled,
            _ => CpuState::NoCpu,
        }
    }
}

struct HeldLock(NonNull<Lock>);

// Entries are only dereferenced by the CPU that holds the lock.
unsafe impl Send for HeldLock {}

pub struct CpuThread {
    pir: u32,
    state: AtomicU8,
    con_suspend: AtomicU32,
    con_need_flush: AtomicBool,
    requested_lock: AtomicPtr<Lock>,
    locks_held: Mutex<ArrayVec<HeldLock, MAX_LOCKS_HELD>>,
}

impl CpuThread {
    fn new(pir: u32) -> Self {
        Self {
            pir,
            state: AtomicU8::new(CpuState::Active as u8),
            con_suspend: AtomicU32::new(0),
            con_need_flush: AtomicBool::new(false),
            requested_lock: AtomicPtr::new(ptr::null_mut()),
            locks_held: Mutex::new(ArrayVec::new()),
        }
    }
}

/// Process-wide lock state: the CPU table, the busted latch and the
/// deadlock detector's own lock.
pub struct LockContext {
    bust_locks: AtomicBool,
    dl_lock: Lock,
    cpus: Box<[CpuThread]>,
    platform: Box<dyn LockPlatform>,
}

impl LockContext {
    /// Creates the CPU table for PIRs `0..=max_pir`. Locks start busted.
    pub fn new(max_pir: u32, platform: Box<dyn LockPlatform>) -> Self {
        let cpus: Vec<CpuThread> = (0..=max_pir).map(CpuThread::new).collect();
        Self {
            bust_locks: AtomicBool::new(true),
            dl_lock: Lock::new(),
            cpus: cpus.into_boxed_slice(),
            platform,
        }
    }

    pub fn init_locks(&self) {
        self.bust_locks.store(false, Ordering::SeqCst);
    }

    pub fn locks_busted(&self) -> bool {
        self.bust_locks.load(Ordering::SeqCst)
    }

    pub fn cpu_max_pir(&self) -> u32 {
        self.cpus.len() as u32 - 1
    }

    pub fn cpu(&self, pir: u32) -> Option<CpuHandle<'_>> {
        self.cpu_thread(pir).map(|cpu| CpuHandle { ctx: self, cpu })
    }

    fn cpu_thread(&self, pir: u32) -> Option<&CpuThread> {
        self.cpus.get(pir as usize)
    }

    #[cold]
    fn lock_error(&self, l: &Lock, reason: &str) -> ! {
        self.bust_locks.store(true, Ordering::SeqCst);
        error!(
            "LOCK ERROR: {} @{:p} (state: 0x{:016x})",
            reason,
            l,
            l.value()
        );
        panic!("LOCK ERROR: {}", reason);
    }
}

/// Lock operations performed on behalf of one CPU.
#[derive(Clone, Copy)]
pub struct CpuHandle<'a> {
    ctx: &'a LockContext,
    cpu: &'a CpuThread,
}

impl<'a> CpuHandle<'a> {
    pub fn pir(&self) -> u32 {
        self.cpu.pir
    }

    pub fn state(&self) -> CpuState {
        CpuState::from_raw(self.cpu.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: CpuState) {
        self.cpu.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn con_suspend(&self) -> u32 {
        self.cpu.con_suspend.load(Ordering::SeqCst)
    }

    pub fn set_con_need_flush(&self, need: bool) {
        self.cpu.con_need_flush.store(need, Ordering::SeqCst);
    }

    /// Lock this CPU is currently spinning on.
    pub fn requested_lock(&self) -> Option<NonNull<Lock>> {
        NonNull::new(self.cpu.requested_lock.load(Ordering::SeqCst))
    }

    pub fn held_count(&self) -> usize {
        self.cpu.locks_held.lock().len()
    }

    fn lock_value(&self) -> u64 {
        ((self.cpu.pir as u64) << 32) | 1
    }

    #[track_caller]
    pub fn try_lock(&self, l: &Lock) -> bool {
        if self.ctx.locks_busted() {
            return true;
        }
        if l
            .lock_val
            .compare_exchange(0, self.lock_value(), Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        fence(Ordering::SeqCst);

        l.set_owner(Some(Location::caller()));
        if l.in_con_path {
            self.cpu.con_suspend.fetch_add(1, Ordering::SeqCst);
        }
        let pushed = self
            .cpu
            .locks_held
            .lock()
            .try_push(HeldLock(NonNull::from(l)));
        if pushed.is_err() {
            self.ctx.lock_error(l, "Too many locks held");
        }
        true
    }

    #[track_caller]
    pub fn lock(&self, l: &Lock) {
        if self.ctx.locks_busted() {
            return;
        }
        self.lock_check(l);

        if self.try_lock(l) {
            return;
        }

        self.add_lock_request(l);
        let start = self.ctx.platform.timebase_ms();
        let mut timeout_warn = false;
        loop {
            if self.try_lock(l) {
                break;
            }
            self.ctx.platform.smt_lowest();
            while l.is_locked() && !self.ctx.locks_busted() {
                core::hint::spin_loop();
            }
            self.ctx.platform.smt_medium();

            if cfg!(feature = "debug-locks") && !timeout_warn {
                timeout_warn = self.lock_timeout(start);
            }
        }
        self.remove_lock_request();
    }

    pub fn unlock(&self, l: &Lock) {
        if self.ctx.locks_busted() {
            return;
        }
        self.unlock_check(l);
        self.release(l);
    }

    /// Takes `l` unless this CPU already holds it. Returns whether it was
    /// taken, so the caller knows whether to unlock.
    #[track_caller]
    pub fn lock_recursive(&self, l: &Lock) -> bool {
        if self.ctx.locks_busted() {
            return false;
        }
        if self.lock_held_by_me(l) {
            return false;
        }
        self.lock(l);
        true
    }

    pub fn lock_held_by_me(&self, l: &Lock) -> bool {
        l.value() == self.lock_value()
    }

    #[track_caller]
    pub fn lock_guard<'l>(&self, l: &'l Lock) -> LockGuard<'a, 'l> {
        self.lock(l);
        LockGuard { cpu: *self, lock: l }
    }

    /// Releases every lock this CPU holds. Used on panic paths.
    pub fn drop_my_locks(&self, warn: bool) {
        self.ctx.platform.disable_fast_reboot("Lock corruption");
        loop {
            let Some(held) = self.cpu.locks_held.lock().pop() else {
                break;
            };
            // SAFETY: a lock outlives its stay on the holder's list.
            let l = unsafe { held.0.as_ref() };
            if warn {
                error!("  {}", OwnerLabel(l.owner()));
            }
            self.release(l);
        }
    }

    pub fn dump_locks_list(&self) {
        let held = self.cpu.locks_held.lock();
        error!("Locks held:");
        for h in held.iter() {
            // SAFETY: see drop_my_locks
            let l = unsafe { h.0.as_ref() };
            error!("  {}", OwnerLabel(l.owner()));
        }
    }

    fn lock_check(&self, l: &Lock) {
        if self.lock_held_by_me(l) {
            self.ctx.lock_error(l, "Invalid recursive lock");
        }
    }

    fn unlock_check(&self, l: &Lock) {
        let v = l.value();
        if v & 1 == 0 {
            self.ctx.lock_error(l, "Unlocking unlocked lock");
        }
        if (v >> 32) as u32 != self.cpu.pir {
            self.ctx.lock_error(l, "Unlocked non-owned lock");
        }
        if l.in_con_path && self.con_suspend() == 0 {
            self.ctx
                .lock_error(l, "Unlock con lock with console not suspended");
        }
        if self.cpu.locks_held.lock().is_empty() {
            self.ctx.lock_error(l, "Releasing lock we don't hold depth");
        }
    }

    fn release(&self, l: &Lock) {
        l.set_owner(None);
        self.cpu
            .locks_held
            .lock()
            .retain(|h| !ptr::eq(h.0.as_ptr(), l));
        fence(Ordering::SeqCst);
        l.lock_val.store(0, Ordering::Release);

        if l.in_con_path {
            let prev = self
                .cpu
                .con_suspend
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_sub(1))
                })
                .unwrap_or(0);
            if prev == 1 && self.cpu.con_need_flush.load(Ordering::SeqCst) {
                self.ctx.platform.flush_console();
            }
        }
    }

    fn lock_timeout(&self, start: Option<u64>) -> bool {
        let (Some(start), Some(now)) = (start, self.ctx.platform.timebase_ms()) else {
            return false;
        };
        let waited = now.saturating_sub(start);
        if waited > LOCK_TIMEOUT_MS {
            warn!("WARNING: Lock has been spinning for {}ms", waited);
            self.ctx.platform.backtrace();
            return true;
        }
        false
    }

    fn add_lock_request(&self, l: &Lock) {
        if !cfg!(feature = "debug-locks")
            || !matches!(self.state(), CpuState::Active | CpuState::Os)
        {
            self.set_lock_request(l);
            return;
        }

        let dl_lock = &self.ctx.dl_lock;
        loop {
            if self.try_lock(dl_lock) {
                break;
            }
            self.ctx.platform.smt_lowest();
            while dl_lock.is_locked() && !self.ctx.locks_busted() {
                core::hint::spin_loop();
            }
            self.ctx.platform.smt_medium();
        }
        // the wait-for graph only changes under dl_lock
        self.set_lock_request(l);
        let dead = self.check_deadlock();
        fence(Ordering::SeqCst);
        self.unlock(dl_lock);

        if dead {
            self.ctx.lock_error(l, "Deadlock detected");
        }
    }

    fn set_lock_request(&self, l: &Lock) {
        self.cpu
            .requested_lock
            .store(ptr::from_ref(l).cast_mut(), Ordering::SeqCst);
    }

    fn remove_lock_request(&self) {
        self.cpu
            .requested_lock
            .store(ptr::null_mut(), Ordering::SeqCst);
    }

    /// Follows requested lock -> owner -> requested lock until it either
    /// comes back to this CPU or runs out of edges.
    fn check_deadlock(&self) -> bool {
        let start = self.cpu.pir;
        let mut next = self.cpu.requested_lock.load(Ordering::SeqCst);

        for _ in 0..=self.ctx.cpu_max_pir() {
            if next.is_null() {
                return false;
            }
            // SAFETY: a requested lock is borrowed by its waiter for the
            // whole wait, and firmware locks are never freed while contended.
            let l = unsafe { &*next };
            let v = l.value();
            if v & 1 == 0 || l.in_con_path {
                return false;
            }
            let owner = (v >> 32) as u32;
            if owner == start {
                return true;
            }
            let Some(cpu) = self.ctx.cpu_thread(owner) else {
                return false;
            };
            next = cpu.requested_lock.load(Ordering::SeqCst);
        }
        false
    }
}

/// Releases its lock when dropped.
pub struct LockGuard<'a, 'l> {
    cpu: CpuHandle<'a>,
    lock: &'l Lock,
}

impl Drop for LockGuard<'_, '_> {
    fn drop(&mut self) {
        self.cpu.unlock(self.lock);
    }
}

struct OwnerLabel(Option<&'static Location<'static>>);

impl fmt::Display for OwnerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(loc) => write!(f, "{}", loc),
            None => f.write_str("<unknown>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPlatform;

    impl LockPlatform for NullPlatform {
        fn timebase_ms(&self) -> Option<u64> {
            None
        }

        fn flush_console(&self) {}

        fn disable_fast_reboot(&self, _reason: &str) {}
    }

    fn context(max_pir: u32) -> LockContext {
        let ctx = LockContext::new(max_pir, Box::new(NullPlatform));
        ctx.init_locks();
        ctx
    }

    #[test]
    fn cell_encodes_owner() {
        let ctx = context(8);
        let cpu = ctx.cpu(5).unwrap();
        let l = Lock::new();

        assert!(cpu.try_lock(&l));
        assert_eq!(l.value(), (5u64 << 32) | 1);
        assert_eq!(l.owner_pir(), Some(5));
        assert!(l.owner().is_some());
        assert_eq!(cpu.held_count(), 1);

        cpu.unlock(&l);
        assert_eq!(l.value(), 0);
        assert!(l.owner().is_none());
        assert!(!cpu.lock_held_by_me(&l));
        assert_eq!(cpu.held_count(), 0);
    }

    #[test]
    fn try_lock_fails_when_held_elsewhere() {
        let ctx = context(2);
        let a = ctx.cpu(0).unwrap();
        let b = ctx.cpu(1).unwrap();
        let l = Lock::new();

        assert!(a.try_lock(&l));
        assert!(!b.try_lock(&l));
        assert_eq!(b.held_count(), 0);
        a.unlock(&l);
        assert!(b.try_lock(&l));
    }

    #[test]
    fn busted_before_init() {
        let ctx = LockContext::new(1, Box::new(NullPlatform));
        let cpu = ctx.cpu(0).unwrap();
        let l = Lock::new();

        assert!(cpu.try_lock(&l));
        cpu.lock(&l);
        assert!(!cpu.lock_recursive(&l));
        cpu.unlock(&l);
        assert_eq!(l.value(), 0);
    }

    #[test]
    fn recursive_lock_reports_already_held() {
        let ctx = context(1);
        let cpu = ctx.cpu(1).unwrap();
        let l = Lock::new();

        assert!(cpu.lock_recursive(&l));
        let before = l.value();
        assert!(!cpu.lock_recursive(&l));
        assert_eq!(l.value(), before);
        cpu.unlock(&l);
    }

    #[test]
    fn guard_releases() {
        let ctx = context(0);
        let cpu = ctx.cpu(0).unwrap();
        let l = Lock::new();
        {
            let _g = cpu.lock_guard(&l);
            assert!(cpu.lock_held_by_me(&l));
        }
        assert!(!l.is_locked());
    }

    #[cfg(feature = "debug-locks")]
    #[test]
    fn request_is_published_under_the_deadlock_lock() {
        let ctx = context(1);
        let owner = ctx.cpu(0).unwrap();
        let l = Lock::new();
        owner.lock(&l);
        owner.lock(&ctx.dl_lock);

        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let cpu = ctx.cpu(1).unwrap();
                cpu.lock(&l);
                cpu.unlock(&l);
            });
            let cpu1 = ctx.cpu(1).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(cpu1.requested_lock().is_none());

            owner.unlock(&ctx.dl_lock);
            while cpu1.requested_lock().is_none() {
                std::thread::yield_now();
            }
            owner.unlock(&l);
            waiter.join().unwrap();
        });
        assert!(!ctx.locks_busted());
    }

    #[test]
    #[should_panic(expected = "Invalid recursive lock")]
    fn relock_is_fatal() {
        let ctx = context(0);
        let cpu = ctx.cpu(0).unwrap();
        let l = Lock::new();
        cpu.lock(&l);
        cpu.lock(&l);
    }

    #[test]
    #[should_panic(expected = "Unlocking unlocked lock")]
    fn unlock_free_lock_is_fatal() {
        let ctx = context(0);
        ctx.cpu(0).unwrap().unlock(&Lock::new());
    }
}
