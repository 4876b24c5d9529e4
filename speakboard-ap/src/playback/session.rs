//! Active session tracking
//!
//! Every playback attempt (single clip or whole sequence) claims a fresh
//! session token. Claiming bumps a monotonic counter published through a
//! `watch` channel, so any in-flight attempt holding an older token wakes up
//! and abandons itself. The most recent claim always wins.

use crate::media::ClipReference;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Captured at claim time and compared after every suspension point
pub type SessionToken = u64;

#[derive(Debug, Default)]
struct SessionState {
    playing: bool,
    current: Option<ClipReference>,
}

/// What should be audible right now
#[derive(Debug)]
pub struct ActiveSession {
    token: watch::Sender<SessionToken>,
    state: Mutex<SessionState>,
}

impl ActiveSession {
    pub fn new() -> Self {
        let (token, _) = watch::channel(0);
        Self {
            token,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self, state: &mut SessionState, playing: bool) -> SessionToken {
        let mut next = 0;
        self.token.send_modify(|token| {
            *token += 1;
            next = *token;
        });
        state.playing = playing;
        state.current = None;
        next
    }

    /// Invalidate the previous session and start a new, playing one
    pub fn claim(&self) -> SessionToken {
        let mut state = self.state();
        self.bump(&mut state, true)
    }

    /// Invalidate the previous session and leave the player idle
    pub fn invalidate(&self) -> SessionToken {
        let mut state = self.state();
        self.bump(&mut state, false)
    }

    /// Token of the session that currently owns the output
    pub fn live(&self) -> SessionToken {
        *self.token.borrow()
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.live() == token
    }

    /// Receiver used to wait for supersession
    pub fn watcher(&self) -> watch::Receiver<SessionToken> {
        self.token.subscribe()
    }

    /// Record the clip now audible; ignored for a stale token
    pub fn set_current(&self, token: SessionToken, reference: Option<ClipReference>) {
        let mut state = self.state();
        if self.is_current(token) {
            state.current = reference;
        }
    }

    /// Mark the session finished; ignored for a stale token
    pub fn finish(&self, token: SessionToken) {
        let mut state = self.state();
        if self.is_current(token) {
            state.playing = false;
            state.current = None;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    /// (playing, current clip, live token) read atomically
    pub fn snapshot(&self) -> (bool, Option<ClipReference>, SessionToken) {
        let state = self.state();
        (state.playing, state.current.clone(), self.live())
    }
}

impl Default for ActiveSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once `token` is no longer the live session
pub async fn superseded(watcher: &mut watch::Receiver<SessionToken>, token: SessionToken) {
    loop {
        if *watcher.borrow_and_update() != token {
            return;
        }
        if watcher.changed().await.is_err() {
            // Session owner dropped: nothing can be current any more
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_claim_is_monotonic() {
        let session = ActiveSession::new();
        let a = session.claim();
        let b = session.claim();
        assert!(b > a);
        assert!(!session.is_current(a));
        assert!(session.is_current(b));
        assert!(session.is_playing());
    }

    #[test]
    fn test_stale_token_cannot_touch_state() {
        let session = ActiveSession::new();
        let old = session.claim();
        let new = session.claim();

        session.set_current(old, Some(ClipReference::new("old").unwrap()));
        assert_eq!(session.snapshot().1, None);

        session.finish(old);
        assert!(session.is_playing());

        session.set_current(new, Some(ClipReference::new("new").unwrap()));
        assert_eq!(session.snapshot().1.unwrap().as_str(), "new");

        session.finish(new);
        assert!(!session.is_playing());
    }

    #[test]
    fn test_invalidate_when_idle_is_safe() {
        let session = ActiveSession::new();
        session.invalidate();
        session.invalidate();
        assert!(!session.is_playing());
        assert_eq!(session.live(), 2);
    }

    #[tokio::test]
    async fn test_superseded_wakes_on_claim() {
        let session = std::sync::Arc::new(ActiveSession::new());
        let token = session.claim();
        let mut watcher = session.watcher();

        let waiter = tokio::spawn(async move { superseded(&mut watcher, token).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        session.invalidate();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("superseded did not wake")
            .unwrap();
    }
}
