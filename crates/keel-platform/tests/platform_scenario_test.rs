//! End-to-end scenarios across the public platform surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use keel_platform::fs::{PlatformFile, SeekAnchor, temp_path};
use keel_platform::sync::{CriticalSection, Event, Timeout, WaitOutcome};
use keel_platform::thread::{self, ThreadOptions};
use keel_platform::{Platform, PlatformOptions, fmt, fmt_args};

/// The canonical signaling scenario: an unsignaled auto-reset event, two
/// threads waiting with a 1000 ms timeout, one signal. Exactly one
/// thread observes "signaled", the other "timed out".
#[test]
fn one_auto_reset_signal_releases_exactly_one_of_two_threads() {
    let event = Event::new(false, false);
    let signaled = Arc::new(AtomicU32::new(0));
    let timed_out = Arc::new(AtomicU32::new(0));

    let mut workers = Vec::new();
    for _ in 0..2 {
        let event = event.clone();
        let signaled = Arc::clone(&signaled);
        let timed_out = Arc::clone(&timed_out);
        let (handle, _) = thread::spawn(ThreadOptions::default(), move |_| {
            match event.wait(Timeout::Millis(1000)) {
                WaitOutcome::Signaled => signaled.fetch_add(1, Ordering::SeqCst),
                _ => timed_out.fetch_add(1, Ordering::SeqCst),
            };
            0
        })
        .unwrap();
        workers.push(handle);
    }

    thread::sleep(100);
    event.set();
    for handle in workers {
        handle.join().unwrap();
    }

    assert_eq!(signaled.load(Ordering::SeqCst), 1);
    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
}

/// A worker formats a report, writes it to a file, and signals; the
/// coordinator waits on the event and reads the report back.
#[test]
fn worker_produces_a_file_the_coordinator_consumes() {
    let platform = Platform::init(PlatformOptions::default()).unwrap();
    assert!(platform.is_main_thread());

    let path = temp_path().join(format!("keel-scenario-{}", std::process::id()));
    let path_string = path.to_str().unwrap().to_string();
    let ready = Event::new(true, false);

    let worker_ready = ready.clone();
    let worker_path = path_string.clone();
    let (handle, _) = thread::spawn(
        ThreadOptions {
            name: Some(String::from("producer")),
            ..Default::default()
        },
        move |_| {
            let mut report = [0u8; 64];
            let n = fmt::format_to_slice(
                &mut report,
                b"frame %d: %.1f ms",
                &fmt_args![128, 16.6],
            );
            let mut file = PlatformFile::create_narrow(&worker_path).unwrap();
            file.write(&report[..n]).unwrap();
            file.flush().unwrap();
            worker_ready.set();
            0
        },
    )
    .unwrap();

    assert_eq!(ready.wait(Timeout::Millis(5000)), WaitOutcome::Signaled);
    assert_eq!(handle.join().unwrap(), 0);

    let mut file = PlatformFile::open_narrow(&path_string).unwrap();
    let size = file.size().unwrap() as usize;
    let mut contents = vec![0u8; size];
    file.seek(SeekAnchor::Begin, 0).unwrap();
    file.read(&mut contents).unwrap();
    assert_eq!(&contents, b"frame 128: 16.6 ms");

    drop(file);
    std::fs::remove_file(&path).unwrap();
}

/// Reentrant locking from a worker that is suspended and resumed while
/// holding nothing: the gate and the critical section compose.
#[test]
fn suspended_worker_acquires_the_shared_section_after_resume() {
    let section = Arc::new(CriticalSection::new());
    let entered = Event::new(true, false);

    let worker_section = Arc::clone(&section);
    let worker_entered = entered.clone();
    let (handle, _) = thread::spawn(
        ThreadOptions {
            start_suspended: true,
            ..Default::default()
        },
        move |_| {
            let _outer = worker_section.enter();
            let _inner = worker_section.enter(); // reentry must not deadlock
            worker_entered.set();
            0
        },
    )
    .unwrap();

    // While the worker is gated, the section is free for us.
    {
        let _guard = section.enter();
        assert_eq!(entered.wait(Timeout::Millis(50)), WaitOutcome::TimedOut);
    }

    handle.resume();
    assert_eq!(entered.wait(Timeout::Millis(5000)), WaitOutcome::Signaled);
    assert_eq!(handle.join().unwrap(), 0);
}
