use eventbus::EventBus;
use eventbus_macros::event_handlers;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Greet {
    name: String,
}

#[derive(Default)]
struct Greeter {
    seen: AtomicUsize,
}

#[event_handlers]
impl Greeter {
    #[handles]
    fn greet(&self, event: &Greet) -> String {
        format!("Hello {}", event.name)
    }

    #[handles]
    fn count(&self, _event: &Greet) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }

    // 非处理器方法保持原样
    fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

fn main() {
    let bus = EventBus::default();
    let greeter = Arc::new(Greeter::default());
    bus.subscribe(greeter.clone()).unwrap();

    let out = bus
        .publish_future::<_, String>(Greet { name: "Ada".into() })
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(out.as_deref(), Some("Hello Ada"));
    assert_eq!(greeter.seen(), 1);
}
