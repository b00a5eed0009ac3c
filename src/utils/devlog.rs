//! Developer traces ("level 6") with a thread-local capture sink.
//!
//! Tests enable the sink on their own thread and assert on what the query and
//! slot machinery emitted, without racing on the global logger.

use std::cell::RefCell;

/// Pseudo-level for developer traces.
pub const DEV_LEVEL: u32 = 6;

/// Log target used when traces are also routed through `log`.
pub const DEV_TARGET: &str = "querylite::dev6";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the thread-local sink on drop.
pub struct DevSinkGuard;

impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Starts capturing on the current thread.
pub fn enable_thread_sink() -> DevSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    DevSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Takes every captured message. Empty when capture is off.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Emits a developer trace: captured by the thread sink if enabled, and
/// logged at TRACE under [`DEV_TARGET`].
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::devlog::write_str(&__s);
        log::log!(target: $crate::utils::devlog::DEV_TARGET, log::Level::Trace, "{}", __s);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourcePath;
    use crate::promise::PromiseFactory;
    use crate::query::{QueryDescriptor, run_query};

    #[test]
    fn captures_slot_lifecycle() {
        let _g = enable_thread_sink();
        let factory = PromiseFactory::<u8>::new();
        let owner = factory.new_owner();
        let _first = owner.begin::<i32>(1).unwrap();
        let _second = owner.begin::<i32>(1).unwrap();
        let logs = drain();
        assert!(logs.iter().any(|s| s.starts_with("slot started")));
        assert!(logs.iter().any(|s| s.starts_with("slot joined")));
        assert!(snapshot().is_empty());
    }

    #[test]
    fn captures_query_runs() {
        let _g = enable_thread_sink();
        let q = QueryDescriptor::for_collection(ResourcePath::parse("users").unwrap()).unwrap();
        let _ = run_query(&q, std::iter::empty());
        assert!(snapshot().iter().any(|s| s.contains("users")));
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = enable_thread_sink();
        crate::dev6!("main-thread");
        let child = std::thread::spawn(|| {
            crate::dev6!("child-thread");
            snapshot()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
        assert_eq!(snapshot(), vec!["main-thread".to_string()]);
    }

    #[test]
    fn nothing_is_kept_without_a_sink() {
        crate::dev6!("dropped");
        assert!(drain().is_empty());
    }
}
