//! Dispatch behaviour of the hook layer.
//!
//! Uses an in-memory hook source and a recording forwarder, so every test
//! can count loads, observe what hooks received and check exactly what
//! reached the next handler.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vfs_hook::diagnostics::{DiagnosticEvent, MemorySink};
use vfs_hook::hooks::{
    HookArgs, HookCallable, HookError, HookHandle, HookLoader, HookSource, InvokeError,
    ModuleCache, ReloadPolicy, Resolution, ReturnValue, Verdict,
};
use vfs_hook::vfs::{
    CreateAction, CreateDisposition, CreateFileRequest, FileHandle, HookLayer, LayerSettings,
    NtStatus, Operation, SmbFilename, VfsError, VfsHandler, VfsResult,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect(String, String),
    Disconnect,
    Mkdir(String, u32),
    Rmdir(String),
    CreateFile(CreateFileRequest),
    Rename(SmbFilename, SmbFilename),
    Unlink(SmbFilename),
}

/// Next handler in the chain. Records every call and answers with
/// `fail_with` when set.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    fail_with: Option<NtStatus>,
}

impl Recorder {
    fn failing(status: NtStatus) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(status),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn answer<T>(&self, call: Call, ok: T) -> VfsResult<T> {
        self.calls.lock().push(call);
        match self.fail_with {
            Some(status) => Err(VfsError::Status(status)),
            None => Ok(ok),
        }
    }
}

#[async_trait]
impl VfsHandler for Recorder {
    async fn connect(&self, service: &str, user: &str) -> VfsResult<()> {
        self.answer(Call::Connect(service.into(), user.into()), ())
    }

    async fn disconnect(&self) {
        self.calls.lock().push(Call::Disconnect);
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.answer(Call::Mkdir(path.into(), mode), ())
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.answer(Call::Rmdir(path.into()), ())
    }

    async fn create_file(&self, request: &CreateFileRequest) -> VfsResult<FileHandle> {
        let handle = FileHandle {
            path: PathBuf::from(&request.fname.base_name),
            is_directory: false,
            action: CreateAction::Created,
        };
        self.answer(Call::CreateFile(request.clone()), handle)
    }

    async fn rename(&self, src: &SmbFilename, dst: &SmbFilename) -> VfsResult<()> {
        self.answer(Call::Rename(src.clone(), dst.clone()), ())
    }

    async fn unlink(&self, fname: &SmbFilename) -> VfsResult<()> {
        self.answer(Call::Unlink(fname.clone()), ())
    }
}

type HookFn = Arc<dyn Fn(&[String]) -> ReturnValue + Send + Sync>;
type Seen = Arc<Mutex<Vec<(String, Vec<String>)>>>;

struct TableFunction {
    name: String,
    body: HookFn,
    seen: Seen,
}

#[async_trait]
impl HookCallable for TableFunction {
    async fn call(&self, args: &HookArgs) -> Result<ReturnValue, InvokeError> {
        self.seen
            .lock()
            .push((self.name.clone(), args.as_slice().to_vec()));
        Ok((self.body)(args.as_slice()))
    }
}

struct PanickingFunction;

#[async_trait]
impl HookCallable for PanickingFunction {
    async fn call(&self, _args: &HookArgs) -> Result<ReturnValue, InvokeError> {
        panic!("hook blew up");
    }
}

/// Hook source whose functions are plain closures.
struct TableSource {
    path: PathBuf,
    hooks: HashMap<String, HookFn>,
    panics: Vec<String>,
    seen: Seen,
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HookSource for TableSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str) -> Resolution {
        if self.panics.iter().any(|p| p == name) {
            return Resolution::Found(HookHandle::new(name, Box::new(PanickingFunction)));
        }
        match self.hooks.get(name) {
            Some(body) => Resolution::Found(HookHandle::new(
                name,
                Box::new(TableFunction {
                    name: name.to_string(),
                    body: Arc::clone(body),
                    seen: Arc::clone(&self.seen),
                }),
            )),
            None => Resolution::Missing,
        }
    }
}

#[derive(Default, Clone)]
struct TableLoader {
    hooks: HashMap<String, HookFn>,
    panics: Vec<String>,
    seen: Seen,
}

impl TableLoader {
    fn hook(mut self, name: &str, body: impl Fn(&[String]) -> Value + Send + Sync + 'static) -> Self {
        self.hooks.insert(name.to_string(), Arc::new(body));
        self
    }

    fn constant(self, name: &str, value: Value) -> Self {
        self.hook(name, move |_| value.clone())
    }

    fn panicking(mut self, name: &str) -> Self {
        self.panics.push(name.to_string());
        self
    }

    fn seen(&self) -> Vec<(String, Vec<String>)> {
        self.seen.lock().clone()
    }
}

impl HookLoader for TableLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn HookSource>, HookError> {
        Ok(Arc::new(TableSource {
            path: path.to_path_buf(),
            hooks: self.hooks.clone(),
            panics: self.panics.clone(),
            seen: Arc::clone(&self.seen),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

const SCRIPT: &str = "/etc/vfs-hook/hooks.toml";

struct Harness {
    layer: HookLayer<Arc<Recorder>>,
    next: Arc<Recorder>,
    sink: Arc<MemorySink>,
}

fn harness_with(
    loader: TableLoader,
    next: Recorder,
    policy: ReloadPolicy,
    settings: LayerSettings,
) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let cache = ModuleCache::new(Arc::new(loader), policy).with_diagnostics(sink.clone());
    let next = Arc::new(next);
    let layer = HookLayer::new(Arc::clone(&next), Arc::new(cache), settings)
        .with_diagnostics(sink.clone());
    Harness { layer, next, sink }
}

fn scripted() -> LayerSettings {
    LayerSettings {
        script: Some(PathBuf::from(SCRIPT)),
        ..LayerSettings::default()
    }
}

fn harness(loader: TableLoader) -> Harness {
    harness_with(loader, Recorder::default(), ReloadPolicy::LoadOnce, scripted())
}

fn create_request() -> CreateFileRequest {
    let mut request = CreateFileRequest::new(
        SmbFilename::with_stream("/reports/q3.txt", "Zone.Identifier"),
        CreateDisposition::OverwriteIf,
    );
    request.access_mask = 0x0012_019F;
    request.share_access = 0x7;
    request.create_options = 0x40;
    request.file_attributes = 0x80;
    request.allocation_size = 4096;
    request
}

/// The call each operation makes, as the forwarder should see it.
fn expected_call(op: Operation) -> Call {
    match op {
        Operation::Connect => Call::Connect("projects".into(), "alice".into()),
        Operation::Mkdir => Call::Mkdir("/reports".into(), 0o750),
        Operation::Rmdir => Call::Rmdir("/old".into()),
        Operation::CreateFile => Call::CreateFile(create_request()),
        Operation::Rename => Call::Rename(
            SmbFilename::with_stream("/a.txt", "meta"),
            SmbFilename::new("/b.txt"),
        ),
        Operation::Unlink => Call::Unlink(SmbFilename::new("/tmp.txt")),
    }
}

async fn dispatch(handler: &impl VfsHandler, op: Operation) -> VfsResult<()> {
    match expected_call(op) {
        Call::Connect(service, user) => handler.connect(&service, &user).await,
        Call::Mkdir(path, mode) => handler.mkdir(&path, mode).await,
        Call::Rmdir(path) => handler.rmdir(&path).await,
        Call::CreateFile(request) => handler.create_file(&request).await.map(|_| ()),
        Call::Rename(src, dst) => handler.rename(&src, &dst).await,
        Call::Unlink(fname) => handler.unlink(&fname).await,
        Call::Disconnect => {
            handler.disconnect().await;
            Ok(())
        }
    }
}

fn same_outcome(a: &VfsResult<()>, b: &VfsResult<()>) -> bool {
    match (a, b) {
        (Ok(()), Ok(())) => true,
        (Err(VfsError::Status(x)), Err(VfsError::Status(y))) => x == y,
        (Err(VfsError::NotPermitted), Err(VfsError::NotPermitted)) => true,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implicit allow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_script_forwards_every_operation_verbatim() {
    for fail_with in [None, Some(NtStatus(0xC000_0123))] {
        for op in Operation::ALL {
            let next = match fail_with {
                Some(status) => Recorder::failing(status),
                None => Recorder::default(),
            };
            let direct = dispatch(&next, op).await;
            let h = harness_with(
                TableLoader::default(),
                next,
                ReloadPolicy::LoadOnce,
                LayerSettings::default(),
            );

            let layered = dispatch(&h.layer, op).await;
            assert!(same_outcome(&layered, &direct), "{op}: {layered:?}");
            // One call from the direct dispatch, one through the layer.
            assert_eq!(h.next.calls(), vec![expected_call(op); 2], "{op}");
            assert_eq!(h.layer.cache().load_count(), 0);
            assert_eq!(
                h.sink
                    .count(|e| matches!(e, DiagnosticEvent::NoScriptConfigured)),
                1
            );
        }
    }
}

#[tokio::test]
async fn script_without_matching_hook_behaves_like_no_script() {
    for op in Operation::ALL {
        // Every other hook denies; the one for `op` is absent.
        let mut loader = TableLoader::default();
        for other in Operation::ALL.into_iter().filter(|o| *o != op) {
            loader = loader.constant(other.hook_name(), json!(false));
        }
        let h = harness(loader);

        dispatch(&h.layer, op).await.unwrap();
        assert_eq!(h.next.calls(), vec![expected_call(op)], "{op}");
        assert_eq!(
            h.sink.events().last(),
            Some(&DiagnosticEvent::HookAbsent {
                hook: op.hook_name().to_string()
            })
        );
    }
}

#[tokio::test]
async fn unlink_without_hook_always_forwards() {
    let h = harness(TableLoader::default().constant("mkdir", json!(false)));
    for name in ["/a", "/b", "/forbidden"] {
        h.layer.unlink(&SmbFilename::new(name)).await.unwrap();
    }
    assert_eq!(h.next.calls().len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Verdicts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn falsy_hook_rejects_without_forwarding() {
    for falsy in [json!(false), json!(0), json!(""), json!(null), json!([]), json!({})] {
        for op in Operation::ALL {
            let h = harness(TableLoader::default().constant(op.hook_name(), falsy.clone()));
            let err = dispatch(&h.layer, op).await.unwrap_err();
            match op {
                Operation::CreateFile => {
                    assert!(matches!(err, VfsError::Status(NtStatus::UNSUCCESSFUL)))
                }
                _ => assert!(err.is_not_permitted(), "{op} with {falsy}"),
            }
            assert!(h.next.calls().is_empty(), "{op} with {falsy}");
        }
    }
}

#[tokio::test]
async fn truthy_hook_forwards_original_arguments_once() {
    for truthy in [json!(true), json!(1), json!("yes"), json!([0])] {
        for op in Operation::ALL {
            let h = harness(TableLoader::default().constant(op.hook_name(), truthy.clone()));
            dispatch(&h.layer, op).await.unwrap();
            assert_eq!(h.next.calls(), vec![expected_call(op)], "{op} with {truthy}");
            assert_eq!(
                h.sink.events().last(),
                Some(&DiagnosticEvent::Decided {
                    hook: op.hook_name().to_string(),
                    verdict: Verdict::Allow,
                })
            );
        }
    }
}

#[tokio::test]
async fn allowed_forwarder_failure_is_returned_verbatim() {
    let h = harness_with(
        TableLoader::default().constant("rmdir", json!(true)),
        Recorder::failing(NtStatus::ACCESS_DENIED),
        ReloadPolicy::LoadOnce,
        scripted(),
    );
    let err = h.layer.rmdir("/locked").await.unwrap_err();
    assert!(matches!(err, VfsError::Status(NtStatus::ACCESS_DENIED)));
    assert_eq!(h.next.calls().len(), 1);
}

#[tokio::test]
async fn mkdir_scenario_forbidden_and_ok() {
    let loader = TableLoader::default().hook("mkdir", |args| json!(args[0] != "/forbidden"));
    let h = harness(loader.clone());

    let err = h.layer.mkdir("/forbidden", 0o755).await.unwrap_err();
    assert!(err.is_not_permitted());
    assert!(h.next.calls().is_empty());

    h.layer.mkdir("/ok", 0o755).await.unwrap();
    assert_eq!(h.next.calls(), vec![Call::Mkdir("/ok".into(), 0o755)]);

    assert_eq!(
        loader.seen(),
        vec![
            ("mkdir".to_string(), vec!["/forbidden".to_string()]),
            ("mkdir".to_string(), vec!["/ok".to_string()]),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument projection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hooks_receive_projected_arguments() {
    let mut loader = TableLoader::default();
    for op in Operation::ALL {
        loader = loader.constant(op.hook_name(), json!(true));
    }
    let h = harness(loader.clone());
    for op in Operation::ALL {
        dispatch(&h.layer, op).await.unwrap();
    }

    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(
        loader.seen(),
        vec![
            ("connect".to_string(), strings(&["projects", "alice"])),
            ("mkdir".to_string(), strings(&["/reports"])),
            ("rmdir".to_string(), strings(&["/old"])),
            ("create_file".to_string(), strings(&["/reports/q3.txt"])),
            ("rename".to_string(), strings(&["/a.txt", "/b.txt"])),
            ("unlink".to_string(), strings(&["/tmp.txt"])),
        ]
    );
}

#[tokio::test]
async fn rename_projection_ignores_other_context() {
    let loader = TableLoader::default().constant("rename", json!(true));
    let h = harness(loader.clone());

    let src = SmbFilename::with_stream("/docs/plan.md", "summary");
    let dst = SmbFilename::with_stream("/archive/plan.md", "other");
    h.layer.rename(&src, &dst).await.unwrap();

    assert_eq!(
        loader.seen(),
        vec![(
            "rename".to_string(),
            vec!["/docs/plan.md".to_string(), "/archive/plan.md".to_string()]
        )]
    );
    assert_eq!(h.next.calls(), vec![Call::Rename(src, dst)]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reload policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn load_once_loads_a_single_time() {
    let h = harness_with(
        TableLoader::default().constant("mkdir", json!(true)),
        Recorder::default(),
        ReloadPolicy::LoadOnce,
        scripted(),
    );
    for op in Operation::ALL {
        dispatch(&h.layer, op).await.unwrap();
    }
    assert_eq!(h.layer.cache().load_count(), 1);
    assert_eq!(
        h.sink
            .count(|e| matches!(e, DiagnosticEvent::SourceLoaded { .. })),
        1
    );
}

#[tokio::test]
async fn always_reload_loads_per_dispatch() {
    let h = harness_with(
        TableLoader::default(),
        Recorder::default(),
        ReloadPolicy::AlwaysReload,
        scripted(),
    );
    for op in Operation::ALL {
        dispatch(&h.layer, op).await.unwrap();
    }
    assert_eq!(h.layer.cache().load_count(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatch_shares_one_load() {
    let h = harness(TableLoader::default().constant("unlink", json!(true)));
    let layer = Arc::new(h.layer);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let layer = Arc::clone(&layer);
            tokio::spawn(async move { layer.unlink(&SmbFilename::new(format!("/f{i}"))).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(layer.cache().load_count(), 1);
    assert_eq!(h.next.calls().len(), 32);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure policy
// ─────────────────────────────────────────────────────────────────────────────

struct BrokenLoader;

impl HookLoader for BrokenLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn HookSource>, HookError> {
        Err(HookError::Parse {
            path: path.to_path_buf(),
            reason: "unexpected end of input".into(),
        })
    }
}

#[tokio::test]
async fn load_failure_allows_by_default_and_rejects_when_strict() {
    let sink = Arc::new(MemorySink::new());
    let cache = Arc::new(
        ModuleCache::new(Arc::new(BrokenLoader), ReloadPolicy::LoadOnce)
            .with_diagnostics(sink.clone()),
    );

    let next = Arc::new(Recorder::default());
    let lenient = HookLayer::new(Arc::clone(&next), Arc::clone(&cache), scripted());
    lenient.mkdir("/a", 0o755).await.unwrap();
    assert_eq!(next.calls().len(), 1);

    let strict = HookLayer::new(
        Arc::clone(&next),
        Arc::clone(&cache),
        LayerSettings {
            load_failure: Verdict::Deny,
            ..scripted()
        },
    );
    let err = strict
        .create_file(&create_request())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Status(NtStatus::UNSUCCESSFUL)));
    assert_eq!(next.calls().len(), 1);

    // A failed load is retried on the next dispatch, never served stale.
    assert_eq!(cache.load_count(), 2);
    assert_eq!(
        sink.count(|e| matches!(e, DiagnosticEvent::LoadFailed { .. })),
        2
    );
}

#[tokio::test]
async fn panicking_hook_is_contained() {
    let h = harness(TableLoader::default().panicking("rmdir"));
    let err = h.layer.rmdir("/a").await.unwrap_err();
    assert!(err.is_not_permitted());
    assert!(h.next.calls().is_empty());
    assert_eq!(
        h.sink
            .count(|e| matches!(e, DiagnosticEvent::InvokeFailed { .. })),
        1
    );

    let lenient = harness_with(
        TableLoader::default().panicking("rmdir"),
        Recorder::default(),
        ReloadPolicy::LoadOnce,
        LayerSettings {
            invoke_failure: Verdict::Allow,
            ..scripted()
        },
    );
    lenient.layer.rmdir("/a").await.unwrap();
    assert_eq!(lenient.next.calls().len(), 1);
}

struct PanickingLoader;

impl HookLoader for PanickingLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn HookSource>, HookError> {
        panic!("loader blew up");
    }
}

#[tokio::test]
async fn panicking_loader_follows_load_failure_policy() {
    let sink = Arc::new(MemorySink::new());
    let cache = Arc::new(ModuleCache::new(Arc::new(PanickingLoader), ReloadPolicy::LoadOnce));
    let next = Arc::new(Recorder::default());

    let lenient = HookLayer::new(Arc::clone(&next), Arc::clone(&cache), scripted())
        .with_diagnostics(sink.clone());
    lenient.rmdir("/a").await.unwrap();
    assert_eq!(next.calls().len(), 1);
    assert_eq!(
        sink.count(|e| matches!(e, DiagnosticEvent::LoadFailed { .. })),
        1
    );

    let strict = HookLayer::new(
        Arc::clone(&next),
        cache,
        LayerSettings {
            load_failure: Verdict::Deny,
            ..scripted()
        },
    );
    assert!(strict.rmdir("/a").await.unwrap_err().is_not_permitted());
    assert_eq!(next.calls().len(), 1);
}

/// Loads slowly and notes when it finished.
struct SlowLoader {
    inner: TableLoader,
    delay: Duration,
    finished: Arc<Mutex<Option<Instant>>>,
}

impl HookLoader for SlowLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn HookSource>, HookError> {
        std::thread::sleep(self.delay);
        *self.finished.lock() = Some(Instant::now());
        self.inner.load(path)
    }
}

#[tokio::test]
async fn slow_load_does_not_stall_the_runtime() {
    let finished = Arc::new(Mutex::new(None));
    let loader = SlowLoader {
        inner: TableLoader::default().constant("mkdir", json!(true)),
        delay: Duration::from_millis(300),
        finished: Arc::clone(&finished),
    };
    let next = Arc::new(Recorder::default());
    let layer = HookLayer::new(
        Arc::clone(&next),
        Arc::new(ModuleCache::new(Arc::new(loader), ReloadPolicy::LoadOnce)),
        scripted(),
    );

    // Single-threaded runtime: the timer only fires if the load is not
    // running on this thread.
    let (result, ticked) = tokio::join!(layer.mkdir("/a", 0o755), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Instant::now()
    });
    result.unwrap();
    let loaded_at = (*finished.lock()).unwrap();
    assert!(ticked < loaded_at);
    assert_eq!(next.calls().len(), 1);
}

#[tokio::test]
async fn disconnect_is_never_gated() {
    let h = harness_with(
        TableLoader::default().constant("connect", json!(false)),
        Recorder::default(),
        ReloadPolicy::LoadOnce,
        LayerSettings {
            load_failure: Verdict::Deny,
            ..LayerSettings::default()
        },
    );
    assert!(h.layer.connect("projects", "alice").await.is_err());
    h.layer.disconnect().await;
    assert_eq!(h.next.calls(), vec![Call::Disconnect]);
    assert_eq!(h.layer.cache().load_count(), 0);
}
