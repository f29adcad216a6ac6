//! Background persistence of GPS fixes.
//!
//! The device side pushes [`LocationFix`] values into an mpsc channel. A
//! spawned worker saves each fix as the signed-in user's last-known
//! location while tracking is on. The on/off switch is the `gpsTracking`
//! preference in the settings document.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use geotask_proto::user::LocationFix;

use crate::observe::{ErrorReport, ErrorSink};
use crate::profile::{ProfileError, ProfileStore};
use crate::session::SessionContext;

/// Default capacity of the fix channel.
pub const DEFAULT_FIX_BUFFER: usize = 32;

struct Shared<P, C, K> {
    profiles: P,
    session: C,
    sink: K,
    enabled: AtomicBool,
    saved: watch::Sender<u64>,
}

struct Worker {
    fixes: mpsc::Sender<LocationFix>,
    handle: JoinHandle<()>,
}

/// Saves location fixes for the session user while tracking is enabled.
pub struct LocationTracker<P, C, K> {
    shared: Arc<Shared<P, C, K>>,
    worker: Mutex<Option<Worker>>,
    buffer: usize,
}

impl<P, C, K> LocationTracker<P, C, K>
where
    P: ProfileStore + 'static,
    C: SessionContext + 'static,
    K: ErrorSink + 'static,
{
    /// Creates a stopped tracker.
    pub fn new(profiles: P, session: C, sink: K) -> Self {
        Self::with_buffer(profiles, session, sink, DEFAULT_FIX_BUFFER)
    }

    /// Creates a stopped tracker whose fix channel holds `buffer` fixes.
    pub fn with_buffer(profiles: P, session: C, sink: K, buffer: usize) -> Self {
        let (saved, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                profiles,
                session,
                sink,
                enabled: AtomicBool::new(false),
                saved,
            }),
            worker: Mutex::new(None),
            buffer: buffer.max(1),
        }
    }

    /// Turns tracking on and returns the sender fixes should be pushed to.
    ///
    /// Stores the preference first; the worker is started only if that
    /// succeeds. Calling `start` while running returns another sender to
    /// the same worker.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] without a session, or the store
    /// error from saving the preference.
    pub async fn start(&self) -> Result<mpsc::Sender<LocationFix>, ProfileError> {
        let user = self
            .shared
            .session
            .current_user_id()
            .ok_or(ProfileError::NotAuthenticated)?;
        self.shared.profiles.set_gps_tracking(&user, true).await?;
        tracing::info!(%user, "location tracking started");
        Ok(self.spawn_worker())
    }

    /// Starts the worker if the stored preference says tracking is on.
    ///
    /// Returns `None` when tracking is off.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] without a session, or the store
    /// error from reading the preference.
    pub async fn resume(&self) -> Result<Option<mpsc::Sender<LocationFix>>, ProfileError> {
        let user = self
            .shared
            .session
            .current_user_id()
            .ok_or(ProfileError::NotAuthenticated)?;
        if !self.shared.profiles.preferences(&user).await?.gps_tracking {
            return Ok(None);
        }
        tracing::info!(%user, "location tracking resumed");
        Ok(Some(self.spawn_worker()))
    }

    /// Turns tracking off and stops the worker. Fixes still queued are
    /// dropped.
    ///
    /// The worker is stopped even if saving the preference fails.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotAuthenticated`] without a session, or the store
    /// error from saving the preference.
    pub async fn stop(&self) -> Result<(), ProfileError> {
        self.halt();
        let user = self
            .shared
            .session
            .current_user_id()
            .ok_or(ProfileError::NotAuthenticated)?;
        self.shared.profiles.set_gps_tracking(&user, false).await?;
        tracing::info!(%user, "location tracking stopped");
        Ok(())
    }

    /// Stops the worker without touching the stored preference, as on
    /// sign-out.
    pub fn halt(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            worker.handle.abort();
        }
    }

    /// Returns true while the worker is running.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Watch the number of fixes saved so far.
    #[must_use]
    pub fn saved_count(&self) -> watch::Receiver<u64> {
        self.shared.saved.subscribe()
    }

    fn spawn_worker(&self) -> mpsc::Sender<LocationFix> {
        let mut worker = self.worker.lock();
        if let Some(running) = worker.as_ref().filter(|w| !w.handle.is_finished()) {
            return running.fixes.clone();
        }

        let (fixes, rx) = mpsc::channel(self.buffer);
        self.shared.enabled.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_worker(Arc::clone(&self.shared), rx));
        *worker = Some(Worker {
            fixes: fixes.clone(),
            handle,
        });
        fixes
    }
}

impl<P, C, K> Drop for LocationTracker<P, C, K> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

async fn run_worker<P, C, K>(shared: Arc<Shared<P, C, K>>, mut rx: mpsc::Receiver<LocationFix>)
where
    P: ProfileStore,
    C: SessionContext,
    K: ErrorSink,
{
    while let Some(fix) = rx.recv().await {
        if !shared.enabled.load(Ordering::SeqCst) {
            continue;
        }
        let Some(user) = shared.session.current_user_id() else {
            tracing::trace!("location fix dropped, no session");
            continue;
        };
        match shared.profiles.save_location(&user, &fix).await {
            Ok(()) => {
                shared.saved.send_modify(|n| *n += 1);
                tracing::trace!(%user, latitude = fix.latitude, longitude = fix.longitude, "location saved");
            }
            Err(e) => {
                tracing::warn!(%user, error = %e, "failed to save location");
                shared.sink.report(ErrorReport::new("save_location", &e));
            }
        }
    }
    tracing::debug!("location worker finished");
}
