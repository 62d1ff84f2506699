//! Timer Manager (§4.4)
//!
//! SIP retransmission timers (2xx retransmit, Timer H) and RFC 4028
//! session-expires timers. Each timer is a spawned task the manager can
//! cancel; callers check their own terminal-status guard inside the fire
//! callback (§5: "Timers check status before acting and no-op on
//! terminal states") — the manager itself is status-agnostic.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A zero-argument async callback invoked when a timer fires.
pub type FireCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
pub struct TimerManager {
    retransmit: Option<JoinHandle<()>>,
    ack_wait: Option<JoinHandle<()>>,
    session_refresh: Option<JoinHandle<()>>,
    session_watchdog: Option<JoinHandle<()>>,
    no_answer: Option<JoinHandle<()>>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the 2xx retransmission timer (RFC 3261 §13.3.1.4): first fire
    /// at `t1`, doubling each subsequent fire, capped at `t2`, running
    /// until canceled.
    pub fn arm_retransmit(&mut self, t1: Duration, t2: Duration, on_fire: FireCallback) {
        self.cancel_retransmit();
        let handle = tokio::spawn(async move {
            let mut interval = t1;
            loop {
                tokio::time::sleep(interval).await;
                on_fire().await;
                interval = std::cmp::min(interval * 2, t2);
            }
        });
        self.retransmit = Some(handle);
    }

    pub fn cancel_retransmit(&mut self) {
        if let Some(h) = self.retransmit.take() {
            h.abort();
        }
    }

    /// Arm Timer H: fires once, `timer_h` after the first 2xx.
    pub fn arm_ack_wait(&mut self, timer_h: Duration, on_fire: FireCallback) {
        self.cancel_ack_wait();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timer_h).await;
            on_fire().await;
        });
        self.ack_wait = Some(handle);
    }

    pub fn cancel_ack_wait(&mut self) {
        if let Some(h) = self.ack_wait.take() {
            h.abort();
        }
    }

    /// Arm the RFC 4028 refresher timer: fires once at
    /// `current_expires * 0.5` (§4.4).
    pub fn arm_session_refresh(&mut self, current_expires: Duration, on_fire: FireCallback) {
        self.cancel_session_refresh();
        let delay = current_expires.mul_f64(0.5);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        });
        self.session_refresh = Some(handle);
    }

    pub fn cancel_session_refresh(&mut self) {
        if let Some(h) = self.session_refresh.take() {
            h.abort();
        }
    }

    /// Arm the RFC 4028 non-refresher watchdog: fires once at
    /// `current_expires * 1.1` (§4.4).
    pub fn arm_session_watchdog(&mut self, current_expires: Duration, on_fire: FireCallback) {
        self.cancel_session_watchdog();
        let delay = current_expires.mul_f64(1.1);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        });
        self.session_watchdog = Some(handle);
    }

    pub fn cancel_session_watchdog(&mut self) {
        if let Some(h) = self.session_watchdog.take() {
            h.abort();
        }
    }

    /// Arm the "user no-answer" timeout (§2 Timer Manager breakdown):
    /// fires once, `timeout` after a call starts ringing, if the local
    /// user hasn't answered or rejected it by then.
    pub fn arm_no_answer(&mut self, timeout: Duration, on_fire: FireCallback) {
        self.cancel_no_answer();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_fire().await;
        });
        self.no_answer = Some(handle);
    }

    pub fn cancel_no_answer(&mut self) {
        if let Some(h) = self.no_answer.take() {
            h.abort();
        }
    }

    /// Disarm every timer (§7: "clear all timers before the event
    /// fires").
    pub fn disarm_all(&mut self) {
        self.cancel_retransmit();
        self.cancel_ack_wait();
        self.cancel_session_refresh();
        self.cancel_session_watchdog();
        self.cancel_no_answer();
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
