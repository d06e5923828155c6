use eventbus::{DispatchError, EventBus};
use eventbus_macros::event_handlers;
use std::sync::Arc;

struct Withdraw {
    amount: u64,
}

#[derive(Debug)]
struct Overdrawn;

impl std::fmt::Display for Overdrawn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("overdrawn")
    }
}

impl std::error::Error for Overdrawn {}

struct Account {
    balance: u64,
}

#[event_handlers]
impl Account {
    #[handles]
    fn withdraw(&self, cmd: &Withdraw) -> Result<u64, Overdrawn> {
        self.balance.checked_sub(cmd.amount).ok_or(Overdrawn)
    }

    #[handles]
    fn audit(&self, _cmd: &Withdraw) -> anyhow::Result<()> {
        Ok(())
    }
}

fn main() {
    let bus = EventBus::default();
    bus.subscribe(Arc::new(Account { balance: 10 })).unwrap();

    let left = bus
        .publish_future::<_, u64>(Withdraw { amount: 4 })
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(left, Some(6));

    let err = bus
        .publish_future::<_, u64>(Withdraw { amount: 40 })
        .unwrap()
        .wait()
        .unwrap_err();
    match err {
        DispatchError::Invocation { handler, .. } => assert_eq!(handler, "Account::withdraw"),
        other => panic!("unexpected error: {other:?}"),
    }
}
