use eventbus::{
    DispatchError, DispatchMode, EventBus, EventBusConfig, HandlerDescriptor, Interceptor,
    LoggingInterceptor,
};
use eventbus_macros::event_handlers;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Deposit {
    account: String,
    amount: i64,
}

#[derive(Debug)]
struct Withdraw {
    account: String,
    amount: i64,
}

#[derive(Debug)]
struct BalanceQuery;

#[derive(Default)]
struct Ledger {
    balance: AtomicI64,
}

#[event_handlers]
impl Ledger {
    #[handles]
    fn deposit(&self, cmd: &Deposit) -> i64 {
        self.balance.fetch_add(cmd.amount, Ordering::SeqCst) + cmd.amount
    }

    #[handles]
    fn withdraw(&self, cmd: &Withdraw) -> anyhow::Result<i64> {
        let current = self.balance.load(Ordering::SeqCst);
        if current < cmd.amount {
            anyhow::bail!(
                "insufficient funds on {}: balance={current}, requested={}",
                cmd.account,
                cmd.amount
            );
        }
        Ok(self.balance.fetch_sub(cmd.amount, Ordering::SeqCst) - cmd.amount)
    }

    #[handles]
    fn balance(&self, _query: &BalanceQuery) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already initialized");
    }
}

/// 读取 `EVENTBUS_CONFIG`（JSON），缺省时使用默认配置
fn load_config(mode: DispatchMode) -> anyhow::Result<EventBusConfig> {
    let config = match std::env::var("EVENTBUS_CONFIG") {
        Ok(raw) => serde_json::from_str(&raw)?,
        Err(_) => EventBusConfig::default(),
    };
    Ok(EventBusConfig { mode, ..config })
}

fn build_bus(mode: DispatchMode) -> anyhow::Result<(EventBus, Arc<Ledger>)> {
    let interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(LoggingInterceptor)];
    let bus = EventBus::builder()
        .interceptors(interceptors)
        .config(load_config(mode)?)
        .build()?;

    let ledger = Arc::new(Ledger::default());
    bus.subscribe(ledger.clone())?;

    // 闭包形式注册的审计处理器
    bus.register(HandlerDescriptor::void::<Withdraw, _>("audit", |cmd| {
        tracing::info!(account = %cmd.account, amount = cmd.amount, "withdrawal audited");
        Ok(())
    }))?;

    Ok((bus, ledger))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    // 同步分发
    let (bus, _ledger) = build_bus(DispatchMode::Synchronous)?;
    let balance = bus
        .publish_future::<_, i64>(Deposit {
            account: "acc-1".into(),
            amount: 100,
        })?
        .await?;
    tracing::info!(?balance, "deposit handled synchronously");

    match bus.publish(Withdraw {
        account: "acc-1".into(),
        amount: 500,
    }) {
        Err(DispatchError::Invocation { handler, source, .. }) => {
            tracing::warn!(%handler, error = %source, "withdrawal refused");
        }
        other => tracing::info!(?other, "withdrawal finished"),
    }

    // 整体异步分发：publish 立即返回，结果经由 future 取回
    let (bus, ledger) = build_bus(DispatchMode::FullPublishAsync)?;
    let pending: Vec<_> = (1..=5)
        .map(|i| {
            bus.publish_future::<_, i64>(Deposit {
                account: "acc-2".into(),
                amount: i * 10,
            })
        })
        .collect::<Result<_, _>>()?;
    for fut in pending {
        fut.await?;
    }

    let total = bus.publish_future::<_, i64>(BalanceQuery)?.await?;
    tracing::info!(
        ?total,
        direct = ledger.balance.load(Ordering::SeqCst),
        "asynchronous deposits settled"
    );

    // 默认回调在异步模式下只记录失败
    bus.publish(Withdraw {
        account: "acc-2".into(),
        amount: 1_000,
    })?;

    bus.shutdown();
    Ok(())
}
