use modstrap::prelude::*;
use modstrap::{ModuleState, ResolutionWarning};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> LifecycleConfig {
    LifecycleConfig {
        default_hook_timeout: Duration::from_secs(2),
        hook_abandon_grace: Duration::from_millis(50),
        graceful_shutdown_timeout: Duration::from_secs(2),
        force_shutdown_timeout: Duration::from_secs(1),
        default_forced_entry_timeout: Duration::from_millis(200),
    }
}

struct Counter {
    hits: AtomicUsize,
}

#[async_trait]
impl OnModuleInit for Counter {
    async fn on_module_init(&self, _ctx: HookContext) -> anyhow::Result<()> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl OnModuleDestroy for Counter {
    async fn on_module_destroy(&self) -> anyhow::Result<()> {
        self.hits.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[module(id = "a")]
struct ModuleA;

impl Module for ModuleA {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
        });
        registrar.register_service_arc("counter", Arc::clone(&counter))?;
        registrar.register_hook(HookDescriptor::from_init("a.init", Arc::clone(&counter)).priority(10))?;
        registrar.register_destroy("a.destroy", Duration::from_secs(1), counter);
        Ok(())
    }
}

#[module(id = "b", dependencies = ["a"])]
struct ModuleB;

impl Module for ModuleB {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        anyhow::ensure!(registrar.has("counter"), "module a must load first");
        registrar.register_hook(
            HookDescriptor::new("b.init", |ctx| async move {
                let counter = ctx.container().get::<Counter>("counter")?;
                anyhow::ensure!(counter.hits.load(Ordering::SeqCst) == 1);
                Ok(())
            })
            .depends_on("a.init")
            .critical(),
        )?;
        Ok(())
    }
}

#[module(id = "c", dependencies = ["b", "missing"])]
struct ModuleC;

impl Module for ModuleC {
    fn register(&self, registrar: &mut Registrar<'_>) -> anyhow::Result<()> {
        registrar.register_hook(
            HookDescriptor::new("c.init", |ctx| async move {
                ctx.defer_hook(HookDescriptor::new("c.late", |_| async { Ok(()) }).depends_on("c.init"))?;
                Ok(())
            })
            .depends_on("b.init"),
        )?;
        Ok(())
    }
}

#[tokio::test]
async fn test_modules_start_in_dependency_order() {
    init_tracing();

    let app = Application::builder()
        .config(config())
        .module(ModuleDescriptor::of(ModuleC))
        .module(ModuleDescriptor::of(ModuleB))
        .module(ModuleDescriptor::of(ModuleA))
        .start()
        .await
        .unwrap();

    let modules = app.get_module_status();
    assert_eq!(modules.load_order, vec!["a", "b", "c"]);
    assert!(modules.module("a").unwrap().is_ready());
    assert!(modules.module("b").unwrap().is_ready());
    assert_eq!(modules.module("c").unwrap().state, ModuleState::Degraded);
    assert_eq!(
        modules.warnings,
        vec![ResolutionWarning::MissingDependency {
            module: "c".into(),
            dependency: "missing".into(),
        }]
    );

    let report = app.get_phase2_report();
    assert_eq!(
        report.waves,
        vec![vec!["a.init"], vec!["b.init"], vec!["c.init"], vec!["c.late"]]
    );
    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(app.hook_statuses().state("c.late"), Some(HookState::Succeeded));

    let counter = app.container().get::<Counter>("counter").unwrap();
    assert_eq!(counter.hits.load(Ordering::SeqCst), 1);

    let outcome = app.shutdown().await;
    assert_eq!(outcome.graceful.unwrap().completed, vec!["a.destroy"]);
    assert_eq!(counter.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_module_cycle_degrades_but_starts() {
    init_tracing();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let module = |id: &'static str, dep: &'static str| {
        let calls = Arc::clone(&calls);
        ModuleDescriptor::new(id, [dep], move |_| {
            calls.lock().unwrap().push(id);
            Ok(())
        })
    };

    let app = Application::builder()
        .config(config())
        .modules([module("x", "y"), module("y", "x")])
        .start()
        .await
        .unwrap();

    // Dropping (y, x) leaves x -> y, so y loads first.
    assert_eq!(*calls.lock().unwrap(), vec!["y", "x"]);
    assert!(matches!(
        app.get_module_status().warnings[..],
        [ResolutionWarning::CircularDependency { .. }]
    ));
    assert_eq!(app.get_module_status().degraded(), vec!["y"]);
}

#[tokio::test]
async fn test_timed_out_hook_never_reports_success() {
    init_tracing();

    let app = Application::builder()
        .config(config())
        .module(ModuleDescriptor::new("slow", Vec::<String>::new(), |r| {
            r.register_hook(
                HookDescriptor::new("slow.init", |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .timeout(Duration::from_millis(50)),
            )?;
            r.register_hook(
                HookDescriptor::new("after", |ctx| async move {
                    anyhow::ensure!(ctx.status_of("slow.init") == Some(HookState::TimedOut));
                    Ok(())
                })
                .depends_on("slow.init"),
            )?;
            Ok(())
        }))
        .start()
        .await
        .unwrap();

    let report = app.get_phase2_report();
    assert_eq!(report.timed_out, vec!["slow.init"]);
    assert_eq!(report.succeeded, vec!["after"]);
    assert!(app.is_degraded());
}

#[tokio::test]
async fn test_skipped_critical_hook_fails_startup() {
    init_tracing();

    let result = Application::builder()
        .config(config())
        .module(ModuleDescriptor::new("m", Vec::<String>::new(), |r| {
            r.register_hook(
                HookDescriptor::new("needs.ghost", |_| async { Ok(()) })
                    .depends_on("ghost")
                    .critical(),
            )?;
            Ok(())
        }))
        .start()
        .await;

    match result {
        Err(ModstrapError::CriticalHookFailed { hooks }) => assert_eq!(hooks, vec!["needs.ghost"]),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("startup should have failed"),
    }
}
