//! Integration tests for the account flow.
//!
//! Sign-up and sign-in drive the shared session that the task
//! synchronizer, the profile service and the location tracker all read.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use geotask::auth::{AuthController, AuthError, AuthState, InMemoryAuthProvider};
use geotask::location::LocationTracker;
use geotask::observe::ChannelSink;
use geotask::profile::{InMemoryProfileStore, ProfileError, ProfileService, ProfileStore};
use geotask::session::SharedSession;
use geotask::store::memory::InMemoryTaskStore;
use geotask::tasks::{SkipReason, SyncOutcome, TaskSynchronizer};
use geotask_proto::task::Category;
use geotask_proto::user::LocationFix;

struct App {
    auth: AuthController<InMemoryAuthProvider, Arc<InMemoryProfileStore>>,
    profiles: Arc<InMemoryProfileStore>,
    session: SharedSession,
    tasks: TaskSynchronizer<Arc<InMemoryTaskStore>, SharedSession, ChannelSink>,
}

fn app() -> App {
    let session = SharedSession::new();
    let profiles = Arc::new(InMemoryProfileStore::new());
    let auth = AuthController::new(
        InMemoryAuthProvider::new(),
        Arc::clone(&profiles),
        session.clone(),
    );
    let (sink, _reports) = ChannelSink::new(16);
    let tasks = TaskSynchronizer::new(
        Arc::new(InMemoryTaskStore::new()),
        session.clone(),
        sink,
    );
    App {
        auth,
        profiles,
        session,
        tasks,
    }
}

fn fix(latitude: f64, longitude: f64, timestamp: u64) -> LocationFix {
    LocationFix {
        latitude,
        longitude,
        timestamp,
    }
}

#[tokio::test]
async fn tasks_follow_the_signed_in_user() {
    let app = app();

    // Nothing works before sign-in.
    assert_eq!(app.tasks.add("Too early", Category::Work, 1).await.unwrap(), None);

    app.auth.signup("ann@example.com", "hunter22", "ann").await.unwrap();
    app.tasks.add("Ann's task", Category::Work, 1).await.unwrap();

    app.auth.sign_out();
    app.tasks.clear();
    assert!(app.tasks.view().is_empty());
    assert_eq!(
        app.tasks.refresh().await.unwrap(),
        SyncOutcome::Skipped(SkipReason::NotAuthenticated)
    );

    app.auth.signup("ben@example.com", "hunter22", "ben").await.unwrap();
    app.tasks.refresh().await.unwrap();
    assert!(app.tasks.view().is_empty());

    app.auth.sign_out();
    app.auth.login("ann@example.com", "hunter22").await.unwrap();
    app.tasks.refresh().await.unwrap();
    assert_eq!(app.tasks.view().tasks()[0].title, "Ann's task");
}

#[tokio::test]
async fn auth_state_transitions_are_observable() {
    let app = app();
    let mut states = app.auth.subscribe();
    assert_eq!(*states.borrow_and_update(), AuthState::Unauthenticated);

    let user = app.auth.signup("cat@example.com", "hunter22", "cat").await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), AuthState::Authenticated(user));

    app.auth.sign_out();
    assert_eq!(*states.borrow_and_update(), AuthState::Unauthenticated);

    let err = app.auth.login("cat@example.com", "").await.unwrap_err();
    assert_eq!(err, AuthError::Validation("Email or Password cannot be empty"));
    assert_eq!(
        *states.borrow_and_update(),
        AuthState::Error("Email or Password cannot be empty".into())
    );
}

#[tokio::test]
async fn weak_password_leaves_session_empty() {
    let app = app();
    let err = app.auth.signup("dan@example.com", "123", "dan").await.unwrap_err();
    assert_eq!(err, AuthError::WeakPassword);
    assert!(!app.session.is_active());
    assert!(matches!(app.auth.state(), AuthState::Error(_)));
}

#[tokio::test]
async fn login_creates_missing_profile() {
    let app = app();
    let user = app.auth.signup("eve@example.com", "hunter22", "eve").await.unwrap();
    let profile = app.profiles.get_profile(&user).await.unwrap().unwrap();
    assert_eq!(profile.username, "eve");

    // A second sign-in never overwrites the existing profile.
    app.auth.sign_out();
    app.auth.login("eve@example.com", "hunter22").await.unwrap();
    let again = app.profiles.get_profile(&user).await.unwrap().unwrap();
    assert_eq!(again, profile);
}

#[tokio::test]
async fn profile_updates_require_session() {
    let app = app();
    let service = ProfileService::new(Arc::clone(&app.profiles), app.session.clone());
    assert!(matches!(
        service.fetch_profile().await,
        Err(ProfileError::NotAuthenticated)
    ));

    app.auth.signup("fay@example.com", "hunter22", "fay").await.unwrap();
    service.update_username("  Fay F.  ").await.unwrap();
    let profile = service.fetch_profile().await.unwrap();
    assert_eq!(profile.username, "Fay F.");
    assert_eq!(profile.email, "fay@example.com");

    service.set_gps_tracking(true).await.unwrap();
    assert!(service.gps_tracking().await.unwrap());
    // Merging the setting kept the profile document.
    assert_eq!(service.fetch_profile().await.unwrap().username, "Fay F.");
}

#[tokio::test]
async fn location_saved_only_while_tracking() {
    let app = app();
    let user = app.auth.signup("gus@example.com", "hunter22", "gus").await.unwrap();
    let (sink, _reports) = ChannelSink::new(4);
    let tracker = LocationTracker::new(Arc::clone(&app.profiles), app.session.clone(), sink);
    let mut saved = tracker.saved_count();

    let fixes = tracker.start().await.unwrap();
    fixes.send(fix(48.1, 11.5, 1)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), saved.wait_for(|n| *n == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.profiles.last_location(&user).await.unwrap(),
        Some(fix(48.1, 11.5, 1))
    );

    tracker.stop().await.unwrap();
    assert!(!app.profiles.preferences(&user).await.unwrap().gps_tracking);
    assert!(!tracker.is_tracking());
    // Whether or not the aborted worker is gone yet, the fix is not saved.
    let _ = fixes.send(fix(0.0, 0.0, 2)).await;
    tokio::task::yield_now().await;
    assert_eq!(
        app.profiles.last_location(&user).await.unwrap(),
        Some(fix(48.1, 11.5, 1))
    );
}

#[tokio::test]
async fn tracking_resumes_after_sign_in() {
    let app = app();
    let user = app.auth.signup("hal@example.com", "hunter22", "hal").await.unwrap();
    app.profiles.set_gps_tracking(&user, true).await.unwrap();
    app.auth.sign_out();

    let (sink, _reports) = ChannelSink::new(4);
    let tracker = LocationTracker::new(Arc::clone(&app.profiles), app.session.clone(), sink);
    assert!(matches!(
        tracker.resume().await,
        Err(ProfileError::NotAuthenticated)
    ));

    app.auth.login("hal@example.com", "hunter22").await.unwrap();
    let fixes = tracker.resume().await.unwrap().unwrap();
    let mut saved = tracker.saved_count();
    fixes.send(fix(1.0, 2.0, 3)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), saved.wait_for(|n| *n == 1))
        .await
        .unwrap()
        .unwrap();

    app.auth.sign_out();
    tracker.halt();
    assert!(!tracker.is_tracking());
    // Halting keeps the stored preference for the next sign-in.
    assert!(app.profiles.preferences(&user).await.unwrap().gps_tracking);
}
