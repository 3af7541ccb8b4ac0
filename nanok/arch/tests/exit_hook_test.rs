//! A context whose entry function returns lands in the registered hook.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};

use nanok_arch::{context_exit, set_context_exit_hook};

static HOOK_CALLS: AtomicU32 = AtomicU32::new(0);

fn hook() -> ! {
    HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    panic!("exit hook ran")
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => payload
            .downcast::<&'static str>()
            .map(|msg| msg.to_string())
            .unwrap_or_default(),
    }
}

#[test]
fn returning_entry_runs_the_hook() {
    // nothing registered yet: the fatal path
    let err = panic::catch_unwind(AssertUnwindSafe(|| {
        context_exit();
    }))
    .unwrap_err();
    assert!(panic_message(err).contains("context entry returned"));
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 0);

    set_context_exit_hook(hook);
    let err = panic::catch_unwind(AssertUnwindSafe(|| {
        context_exit();
    }))
    .unwrap_err();
    assert_eq!(panic_message(err), "exit hook ran");
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);

    // the hook stays registered
    assert!(panic::catch_unwind(AssertUnwindSafe(|| {
        context_exit();
    }))
    .is_err());
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 2);
}
