//! Session lifecycle, isolation and event dispatch, driven through a fake
//! backend so no display is needed.

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{background, foreground, FakeBackend};
use deskpilot::backend::{MouseButton, Point};
use deskpilot::session::KeyInput;
use deskpilot::{AutomationConfig, Error, EventKind, Session, SessionBuilder, SessionEvent};

/// Record every event of every kind as a short string
fn record_events(session: &mut Session) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = log.clone();
        session.on(kind, move |event| {
            let entry = match event {
                SessionEvent::Capture { pid, .. } => format!("capture {:?}", pid),
                SessionEvent::Click {
                    at, clicks, pid, ..
                } => format!("click {} x{} {:?}", at, clicks, pid),
                SessionEvent::Key { input, pid } => match input {
                    KeyInput::Combo(combo) => format!("key {} {:?}", combo, pid),
                    KeyInput::Text(text) => format!("text {} {:?}", text, pid),
                },
                SessionEvent::Move { to } => format!("move {}", to),
                SessionEvent::SessionClosed { id, .. } => format!("closed {}", id),
            };
            sink.lock().unwrap().push(entry);
            Ok(())
        });
    }
    log
}

fn png_count(dir: &std::path::Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "png"))
        .count()
}

fn overlaps(a: &std::path::Path, b: &std::path::Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

// ============================================================================
// Isolation
// ============================================================================

#[test]
fn test_concurrent_sessions_get_distinct_ids_and_dirs() {
    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(|| Session::builder().build_with(foreground).unwrap()))
        .collect();
    let sessions: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ids: HashSet<&str> = sessions.iter().map(|s| s.id()).collect();
    assert_eq!(ids.len(), sessions.len());

    let dirs: Vec<PathBuf> = sessions
        .iter()
        .flat_map(|s| [s.screenshot_dir().to_path_buf(), s.temp_dir().to_path_buf()])
        .collect();
    for (i, a) in dirs.iter().enumerate() {
        assert!(a.is_dir());
        for b in &dirs[i + 1..] {
            assert!(!overlaps(a, b), "{} overlaps {}", a.display(), b.display());
        }
    }
}

#[test]
fn test_back_to_back_sessions_use_different_dirs() {
    let mut first = Session::builder().build_with(foreground).unwrap();
    let first_dir = first.screenshot_dir().to_path_buf();
    first.close();

    let second = Session::builder().build_with(foreground).unwrap();
    assert_ne!(second.screenshot_dir(), first_dir.as_path());
    assert_ne!(second.id(), first.id());
}

#[test]
fn test_overlapping_explicit_dirs_rejected_while_live() {
    let root = tempfile::tempdir().unwrap();
    let shared = root.path().join("shots");

    let mut first = Session::builder()
        .screenshot_dir(&shared)
        .build_with(foreground)
        .unwrap();

    let err = Session::builder()
        .screenshot_dir(shared.join("nested"))
        .build_with(foreground)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains(first.id()));

    first.close();
    let second = Session::builder()
        .screenshot_dir(shared.join("nested"))
        .build_with(foreground)
        .unwrap();
    assert!(!second.is_closed());
}

#[test]
fn test_rejected_session_creates_nothing_inside_live_dir() {
    let root = tempfile::tempdir().unwrap();
    let shared = root.path().join("shots");
    let intruder = shared.join("nested").join("deeper");

    let first = Session::builder()
        .screenshot_dir(&shared)
        .build_with(foreground)
        .unwrap();

    let err = Session::builder()
        .screenshot_dir(&intruder)
        .build_with(foreground)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(!shared.join("nested").exists());
    assert!(first.screenshot_dir().is_dir());
}

#[test]
fn test_failed_backend_removes_created_explicit_dirs_only() {
    let root = tempfile::tempdir().unwrap();
    let existing = root.path().join("existing");
    fs::create_dir_all(&existing).unwrap();
    let fresh = root.path().join("fresh").join("temp");

    let err = Session::builder()
        .screenshot_dir(&existing)
        .temp_dir(&fresh)
        .build_with(|_| Err(Error::Io(std::io::Error::other("backend refused"))))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    assert!(existing.is_dir());
    assert!(!root.path().join("fresh").exists());
}

#[test]
fn test_unknown_backend_fails_before_creating_dirs() {
    let root = tempfile::tempdir().unwrap();
    let shots = root.path().join("never-created");

    let err = Session::builder()
        .backend("not-a-real-backend")
        .screenshot_dir(&shots)
        .build()
        .unwrap_err();

    match &err {
        Error::Configuration { message, .. } => {
            assert!(message.contains("not-a-real-backend"));
            assert!(message.contains("available backends:"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!shots.exists());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_closed_session_rejects_every_primitive() {
    let mut session = Session::builder().build_with(background).unwrap();
    session.mouse_move(1, 1).unwrap();
    session.close();
    assert!(session.is_closed());

    assert!(matches!(session.screenshot(false), Err(Error::ClosedSession(_))));
    assert!(matches!(session.get_screen_size(), Err(Error::ClosedSession(_))));
    assert!(matches!(session.cursor_position(), Err(Error::ClosedSession(_))));
    assert!(matches!(session.left_click(None), Err(Error::ClosedSession(_))));
    assert!(matches!(session.key_press("return"), Err(Error::ClosedSession(_))));
    assert!(matches!(session.type_text("x"), Err(Error::ClosedSession(_))));
    assert!(matches!(
        session.send_key_to_pid(1, "return"),
        Err(Error::ClosedSession(_))
    ));
    assert!(matches!(session.capture_window(1), Err(Error::ClosedSession(_))));
    assert_eq!(session.action_count(), 1);
}

#[test]
fn test_close_is_idempotent() {
    let mut session = Session::builder().build_with(foreground).unwrap();
    let events = record_events(&mut session);
    let id = session.id().to_string();

    session.close();
    session.close();
    drop(session);

    assert_eq!(*events.lock().unwrap(), vec![format!("closed {}", id)]);
}

#[test]
fn test_close_removes_owned_dirs() {
    let mut session = Session::builder().build_with(foreground).unwrap();
    let shots = session.screenshot_dir().to_path_buf();
    let temp = session.temp_dir().to_path_buf();
    session.screenshot(true).unwrap();

    session.close();
    assert!(!shots.exists());
    assert!(!temp.exists());
}

#[test]
fn test_cleanup_disabled_keeps_owned_dirs() {
    let mut session = Session::builder()
        .cleanup_on_close(false)
        .build_with(foreground)
        .unwrap();
    let shots = session.screenshot_dir().to_path_buf();
    let temp = session.temp_dir().to_path_buf();

    session.close();
    assert!(shots.is_dir());
    assert!(temp.is_dir());

    fs::remove_dir_all(&shots).unwrap();
    fs::remove_dir_all(&temp).unwrap();
}

#[test]
fn test_explicit_dir_keeps_exactly_one_screenshot() {
    let root = tempfile::tempdir().unwrap();
    let shots = root.path().join("shots");

    let mut session = Session::builder()
        .screenshot_dir(&shots)
        .build_with(foreground)
        .unwrap();
    let outcome = session.screenshot(true).unwrap();
    let saved = outcome.value.saved_to.clone().unwrap();
    assert!(saved.starts_with(&shots));
    session.close();

    assert!(saved.is_file());
    assert_eq!(png_count(&shots), 1);
}

#[test]
fn test_drop_closes_session() {
    let closed = Arc::new(Mutex::new(0));
    let shots;
    {
        let mut session = Session::builder().build_with(foreground).unwrap();
        shots = session.screenshot_dir().to_path_buf();
        let sink = closed.clone();
        session.on(EventKind::SessionClosed, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
    }
    assert_eq!(*closed.lock().unwrap(), 1);
    assert!(!shots.exists());
}

#[test]
fn test_session_closed_payload_carries_dirs() {
    let mut session = Session::builder().build_with(foreground).unwrap();
    let expected = (
        session.id().to_string(),
        session.screenshot_dir().to_path_buf(),
        session.temp_dir().to_path_buf(),
    );
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    session.on(EventKind::SessionClosed, move |event| {
        if let SessionEvent::SessionClosed {
            id,
            screenshot_dir,
            temp_dir,
        } = event
        {
            // Directories still exist while callbacks run
            assert!(screenshot_dir.is_dir());
            *sink.lock().unwrap() = Some((
                id.to_string(),
                screenshot_dir.to_path_buf(),
                temp_dir.to_path_buf(),
            ));
        }
        Ok(())
    });
    session.close();
    assert_eq!(seen.lock().unwrap().clone(), Some(expected));
}

// ============================================================================
// Counters and events
// ============================================================================

#[test]
fn test_counters_track_successful_actions() {
    let mut session = Session::builder().build_with(foreground).unwrap();

    session.screenshot(false).unwrap();
    session.mouse_move(5, 5).unwrap();
    session.left_click(None).unwrap();
    session.double_click(Some(Point::new(1, 2))).unwrap();
    session.drag(0, 0, 10, 10).unwrap();
    session.scroll(-3, None).unwrap();
    session.key_press("command+s").unwrap();
    session.type_text("hello").unwrap();

    assert_eq!(session.action_count(), 8);
    assert_eq!(session.screenshot_count(), 1);

    let stats = session.stats();
    assert_eq!((stats.action_count, stats.screenshot_count), (8, 1));
}

#[test]
fn test_geometry_queries_are_idempotent_and_uncounted() {
    let mut session = Session::builder().build_with(foreground).unwrap();

    let first = session.get_screen_size().unwrap().value;
    let second = session.get_screen_size().unwrap().value;
    assert_eq!(first, second);
    let cursor = session.cursor_position().unwrap().value;
    assert_eq!(cursor, session.cursor_position().unwrap().value);

    assert_eq!(session.action_count(), 0);
    assert_eq!(session.screenshot_count(), 0);
}

#[test]
fn test_failed_primitive_is_not_counted_and_emits_nothing() {
    let mut session = Session::builder()
        .build_with(|options| Ok(Box::new(FakeBackend::new(options, false).failing("key_press"))))
        .unwrap();
    let events = record_events(&mut session);

    assert!(matches!(session.key_press("return"), Err(Error::Driver(_))));
    assert_eq!(session.action_count(), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_event_mapping() {
    let mut session = Session::builder().build_with(foreground).unwrap();
    let events = record_events(&mut session);

    session.screenshot(false).unwrap();
    session.mouse_move(3, 4).unwrap();
    session.left_click(None).unwrap();
    session.double_click(Some(Point::new(9, 9))).unwrap();
    session.drag(0, 0, 1, 1).unwrap();
    session.scroll(2, None).unwrap();
    session.key_press("return").unwrap();
    session.type_text("hi").unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "capture None".to_string(),
            "move (3, 4)".to_string(),
            // Omitted coordinates resolve to the cursor position
            "click (3, 4) x1 None".to_string(),
            "click (9, 9) x2 None".to_string(),
            "key return None".to_string(),
            "text hi None".to_string(),
        ]
    );
}

#[test]
fn test_callback_errors_do_not_fail_primitive() {
    let mut session = Session::builder().build_with(foreground).unwrap();
    session.on(EventKind::Move, |_| Err(anyhow::anyhow!("listener broke")));
    session.on(EventKind::Move, |_| panic!("listener panicked"));
    let events = record_events(&mut session);

    session.mouse_move(1, 2).unwrap();
    assert_eq!(session.action_count(), 1);
    assert_eq!(*events.lock().unwrap(), vec!["move (1, 2)".to_string()]);
}

// ============================================================================
// Background operations
// ============================================================================

#[test]
fn test_background_operations_with_capability() {
    let mut session = Session::builder().build_with(background).unwrap();
    let events = record_events(&mut session);

    let capture = session.capture_window(42).unwrap();
    assert_eq!(capture.image.dimensions(), (8, 6));

    let report = session.send_text_to_pid(42, "héllo").unwrap().value;
    assert_eq!((report.delivered, report.total), (4, 5));
    assert!(matches!(
        report.into_result(),
        Err(Error::PartialInjection {
            delivered: 4,
            total: 5
        })
    ));

    session
        .send_click_to_pid(42, Point::new(7, 7), MouseButton::Right)
        .unwrap();
    session.send_key_to_pid(42, "command+s").unwrap();

    let raw = session.capture_window_raw(42).unwrap();
    assert_eq!(raw.bits_per_pixel, 32);

    assert_eq!(session.action_count(), 4);
    assert_eq!(session.screenshot_count(), 1);
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "capture Some(42)".to_string(),
            "text héllo Some(42)".to_string(),
            "click (7, 7) x1 Some(42)".to_string(),
            "key command+s Some(42)".to_string(),
        ]
    );
}

#[test]
fn test_background_operations_unsupported_without_capability() {
    let mut session = Session::builder().build_with(foreground).unwrap();

    for result in [
        session.send_text_to_pid(1, "x").map(|_| ()),
        session.send_key_to_pid(1, "return").map(|_| ()),
        session
            .send_click_to_pid(1, Point::new(0, 0), MouseButton::Left)
            .map(|_| ()),
        session.capture_window(1).map(|_| ()),
        session.capture_window_raw(1).map(|_| ()),
    ] {
        assert!(matches!(result, Err(Error::Unsupported { .. })));
    }
    assert_eq!(session.action_count(), 0);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_builder_from_config() {
    let root = tempfile::tempdir().unwrap();
    let config = AutomationConfig {
        backend: None,
        action_delay: Duration::from_millis(10),
        screenshot_dir: Some(root.path().join("cfg-shots")),
        temp_dir: Some(root.path().join("cfg-temp")),
        cleanup_on_close: false,
    };

    let mut session = SessionBuilder::from_config(&config)
        .metadata("run", 7)
        .build_with(foreground)
        .unwrap();
    assert_eq!(session.screenshot_dir(), root.path().join("cfg-shots").as_path());
    assert_eq!(session.metadata()["run"], serde_json::json!(7));

    session.close();
    assert!(root.path().join("cfg-temp").is_dir());
}
