// src/scripting/engine.rs — ScriptEngine: one runtime, its capabilities and its cache
//
// Lifecycle: Created -> Ready (capabilities registered) -> Loaded (a script
// ran) -> Closed. Closed is terminal. A timed-out supervised call closes the
// engine because its runtime is abandoned on the worker thread.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rhai::Dynamic;
use uuid::Uuid;

use crate::scripting::cache_store::{self, CacheStore, SharedCacheStore};
use crate::scripting::capabilities::{CapabilityContext, ExposedCapabilities, HttpSettings, PluginRoot};
use crate::scripting::error::ScriptError;
use crate::scripting::runtime::{Runtime, RuntimeLimits};
use crate::scripting::supervisor::{self, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Ready,
    Loaded,
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Created => "created",
            EngineState::Ready => "ready",
            EngineState::Loaded => "loaded",
            EngineState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Everything needed to build an engine.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Directory for the `<id>.json` cache file. `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,
    pub http: HttpSettings,
    pub limits: RuntimeLimits,
    pub capabilities: ExposedCapabilities,
    /// The plugin's own files, readable through `io::read_plugin_file`.
    pub root: Option<PluginRoot>,
}

pub struct ScriptEngine {
    id: Uuid,
    state: EngineState,
    runtime: Option<Runtime>,
    cache: SharedCacheStore,
    cache_path: Option<PathBuf>,
    options: EngineOptions,
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("cache_path", &self.cache_path)
            .finish()
    }
}

impl ScriptEngine {
    /// Create and set up an engine in one step.
    pub fn new(id: Uuid, options: EngineOptions) -> Result<Self, ScriptError> {
        let mut engine = Self::created(id, options);
        engine.setup()?;
        Ok(engine)
    }

    /// An engine with no runtime yet. Call [`setup`](Self::setup) before use.
    pub fn created(id: Uuid, options: EngineOptions) -> Self {
        let cache_path = options
            .cache_dir
            .as_ref()
            .map(|dir| cache_store::cache_file_path(dir, &id));
        Self {
            id,
            state: EngineState::Created,
            runtime: None,
            cache: CacheStore::new().into_shared(),
            cache_path,
            options,
        }
    }

    /// Load the cache and register every capability on a fresh runtime.
    /// A nil identity leaves the engine closed.
    pub fn setup(&mut self) -> Result<(), ScriptError> {
        match self.state {
            EngineState::Created => {}
            EngineState::Closed => return Err(ScriptError::Closed),
            EngineState::Ready | EngineState::Loaded => return Ok(()),
        }

        if self.id.is_nil() {
            self.state = EngineState::Closed;
            return Err(ScriptError::NilIdentity);
        }

        if let Some(path) = &self.cache_path {
            cache_store::lock(&self.cache).load(path);
        }

        let ctx = CapabilityContext {
            engine_id: self.id,
            cache: self.cache.clone(),
            http: self.options.http.clone(),
            root: self.options.root.clone(),
            exposed: self.options.capabilities.clone(),
        };
        self.runtime = Some(Runtime::new(&ctx, &self.options.limits));
        self.state = EngineState::Ready;
        tracing::debug!(engine = %self.id, "Script engine ready");
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == EngineState::Closed
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The engine's private cache store.
    pub fn cache(&self) -> &SharedCacheStore {
        &self.cache
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    fn runtime(&self) -> Result<&Runtime, ScriptError> {
        match self.state {
            EngineState::Created => Err(ScriptError::NotReady {
                state: self.state.to_string(),
            }),
            EngineState::Closed => Err(ScriptError::Closed),
            EngineState::Ready | EngineState::Loaded => {
                self.runtime.as_ref().ok_or(ScriptError::Closed)
            }
        }
    }

    fn runtime_mut(&mut self) -> Result<&mut Runtime, ScriptError> {
        match self.state {
            EngineState::Created => Err(ScriptError::NotReady {
                state: self.state.to_string(),
            }),
            EngineState::Closed => Err(ScriptError::Closed),
            EngineState::Ready | EngineState::Loaded => {
                self.runtime.as_mut().ok_or(ScriptError::Closed)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Run an inline script body.
    pub fn load_script(&mut self, text: &str) -> Result<Dynamic, ScriptError> {
        self.load_source("inline", text)
    }

    /// Run a script file; errors and log locations carry its file name.
    pub fn load_file(&mut self, path: &Path) -> Result<Dynamic, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("script")
            .to_string();
        self.load_source(&name, &text)
    }

    /// Run a script body under `name` and return the value it evaluates to.
    pub fn load_source(&mut self, name: &str, text: &str) -> Result<Dynamic, ScriptError> {
        let value = self.runtime_mut()?.eval(name, text)?;
        self.state = EngineState::Loaded;
        tracing::debug!(engine = %self.id, script = name, "Script loaded");
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Lookup and calls
    // -----------------------------------------------------------------------

    pub fn has_function(&self, name: &str) -> bool {
        self.runtime().map(|rt| rt.has_function(name)).unwrap_or(false)
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.runtime().map(|rt| rt.has_object(name)).unwrap_or(false)
    }

    pub fn has_method(&self, object: &str, method: &str) -> bool {
        self.runtime()
            .map(|rt| rt.has_method(object, method))
            .unwrap_or(false)
    }

    /// Current value of a top-level script variable.
    pub fn object(&self, name: &str) -> Option<Dynamic> {
        self.runtime().ok().and_then(|rt| rt.object(name))
    }

    /// Make `value` reachable from scripts as the top-level variable `name`.
    pub fn bind_object(&mut self, name: &str, value: Dynamic) -> Result<(), ScriptError> {
        self.runtime_mut()?.bind_object(name, value);
        Ok(())
    }

    pub fn call_global(&mut self, name: &str, args: Vec<Dynamic>) -> Result<Dynamic, ScriptError> {
        self.runtime_mut()?.call_function(name, args)
    }

    pub fn call_method(
        &mut self,
        object: &str,
        method: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, ScriptError> {
        self.runtime_mut()?.call_method(object, method, args)
    }

    // -----------------------------------------------------------------------
    // Supervised calls
    // -----------------------------------------------------------------------

    /// Run a script body on a worker thread. If `timeout` passes first the
    /// runtime is abandoned, the cache is flushed and the engine is closed.
    pub fn eval_with_timeout(
        &mut self,
        script: &str,
        timeout: Duration,
    ) -> Result<Dynamic, ScriptError> {
        let text = script.to_string();
        let value = self.supervise(timeout, "eval", move |rt| rt.eval("supervised", &text))?;
        self.state = EngineState::Loaded;
        Ok(value)
    }

    /// Like `load_source`, but under a deadline. A script that does not
    /// finish in time closes the engine without writing its cache.
    pub fn load_source_with_timeout(
        &mut self,
        name: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<Dynamic, ScriptError> {
        let script = name.to_string();
        let body = text.to_string();
        let value = self.run_supervised(timeout, name, false, move |rt| rt.eval(&script, &body))?;
        self.state = EngineState::Loaded;
        tracing::debug!(engine = %self.id, script = name, "Script loaded");
        Ok(value)
    }

    pub fn call_global_with_timeout(
        &mut self,
        name: &str,
        args: Vec<Dynamic>,
        timeout: Duration,
    ) -> Result<Dynamic, ScriptError> {
        let function = name.to_string();
        self.supervise(timeout, name, move |rt| rt.call_function(&function, args))
    }

    pub fn call_method_with_timeout(
        &mut self,
        object: &str,
        method: &str,
        args: Vec<Dynamic>,
        timeout: Duration,
    ) -> Result<Dynamic, ScriptError> {
        let target = object.to_string();
        let function = method.to_string();
        self.supervise(timeout, method, move |rt| {
            rt.call_method(&target, &function, args)
        })
    }

    fn supervise<F>(&mut self, timeout: Duration, label: &str, job: F) -> Result<Dynamic, ScriptError>
    where
        F: FnOnce(&mut Runtime) -> Result<Dynamic, ScriptError> + Send + 'static,
    {
        self.run_supervised(timeout, label, true, job)
    }

    fn run_supervised<F>(
        &mut self,
        timeout: Duration,
        label: &str,
        persist_on_loss: bool,
        job: F,
    ) -> Result<Dynamic, ScriptError>
    where
        F: FnOnce(&mut Runtime) -> Result<Dynamic, ScriptError> + Send + 'static,
    {
        self.runtime()?;
        let runtime = self.runtime.take().ok_or(ScriptError::Closed)?;

        match supervisor::run(runtime, timeout, label, job) {
            Outcome::Finished { runtime, result } => {
                self.runtime = Some(runtime);
                result
            }
            Outcome::TimedOut => {
                if persist_on_loss {
                    self.persist_cache();
                }
                self.state = EngineState::Closed;
                Err(ScriptError::Timeout(timeout))
            }
            Outcome::Lost(err) => {
                if persist_on_loss {
                    self.persist_cache();
                }
                self.state = EngineState::Closed;
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Persist the cache and release the runtime. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.is_closed() {
            return;
        }
        self.persist_cache();
        self.runtime = None;
        self.state = EngineState::Closed;
        tracing::debug!(engine = %self.id, "Script engine shut down");
    }

    /// Release the runtime without writing the cache.
    pub fn discard(&mut self) {
        self.runtime = None;
        self.state = EngineState::Closed;
    }

    /// Best-effort write of the cache file.
    fn persist_cache(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        if let Err(e) = cache_store::lock(&self.cache).save(path) {
            tracing::warn!(
                engine = %self.id,
                "Failed to persist cache {}: {}",
                path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine() -> ScriptEngine {
        ScriptEngine::new(Uuid::new_v4(), EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_lifecycle_states() {
        let mut engine = ScriptEngine::created(Uuid::new_v4(), EngineOptions::default());
        assert_eq!(engine.state(), EngineState::Created);
        assert!(matches!(
            engine.load_script("1"),
            Err(ScriptError::NotReady { .. })
        ));

        engine.setup().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);

        engine.load_script("let x = 1;").unwrap();
        assert_eq!(engine.state(), EngineState::Loaded);

        engine.shutdown();
        assert_eq!(engine.state(), EngineState::Closed);
        assert!(matches!(engine.load_script("1"), Err(ScriptError::Closed)));
    }

    #[test]
    fn test_nil_identity_is_rejected() {
        let err = ScriptEngine::new(Uuid::nil(), EngineOptions::default()).unwrap_err();
        assert!(matches!(err, ScriptError::NilIdentity));

        let mut engine = ScriptEngine::created(Uuid::nil(), EngineOptions::default());
        assert!(engine.setup().is_err());
        assert!(engine.is_closed());
        assert!(matches!(engine.setup(), Err(ScriptError::Closed)));
    }

    #[test]
    fn test_load_file_names_script_in_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rhai");
        std::fs::write(&path, "let x = ;").unwrap();

        let mut engine = engine();
        let err = engine.load_file(&path).unwrap_err();
        assert!(err.to_string().contains("main.rhai"), "{err}");

        let missing = engine.load_file(&dir.path().join("missing.rhai")).unwrap_err();
        assert!(matches!(missing, ScriptError::Io(_)));
    }

    #[test]
    fn test_call_global_and_has_function() {
        let mut engine = engine();
        engine
            .load_script("fn add(a, b) { a + b } fn boom() { throw \"raised\"; }")
            .unwrap();

        assert!(engine.has_function("add"));
        assert!(!engine.has_function("sub"));

        let value = engine
            .call_global("add", vec![Dynamic::from(2_i64), Dynamic::from(3_i64)])
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 5);

        assert!(engine.call_global("sub", vec![]).unwrap_err().is_not_found());
        let raised = engine.call_global("boom", vec![]).unwrap_err();
        assert!(!raised.is_not_found());
    }

    #[test]
    fn test_call_method_and_has_method() {
        let mut engine = engine();
        engine
            .load_script(r#"let plugin = #{ Name: || "demo", data: 1 };"#)
            .unwrap();

        assert!(engine.has_object("plugin"));
        assert!(engine.has_method("plugin", "Name"));
        assert!(!engine.has_method("plugin", "data"));

        let value = engine.call_method("plugin", "Name", vec![]).unwrap();
        assert_eq!(value.into_string().unwrap(), "demo");
    }

    #[test]
    fn test_closed_engine_reports_nothing() {
        let mut engine = engine();
        engine.load_script("fn f() { 1 }").unwrap();
        engine.shutdown();
        assert!(!engine.has_function("f"));
        assert!(matches!(engine.call_global("f", vec![]), Err(ScriptError::Closed)));
    }

    #[test]
    fn test_timeout_closes_engine() {
        let mut engine = engine();
        engine.load_script("fn spin() { loop { } }").unwrap();

        let err = engine
            .eval_with_timeout("spin()", Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout(_)));
        assert!(engine.is_closed());
        assert!(matches!(
            engine.call_global("spin", vec![]),
            Err(ScriptError::Closed)
        ));
    }

    #[test]
    fn test_timeout_shorter_than_script_sleep() {
        let mut engine = engine();
        // Busy wait for roughly two seconds.
        let script = r#"
let start = timestamp();
while start.elapsed < 2.0 { }
"done"
"#;
        let err = engine
            .eval_with_timeout(script, Duration::from_millis(200))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(engine.load_script("1").is_err());
    }

    #[test]
    fn test_supervised_call_in_time_keeps_engine() {
        let mut engine = engine();
        engine.load_script("fn answer() { 42 }").unwrap();

        let value = engine
            .call_global_with_timeout("answer", vec![], Duration::from_secs(5))
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 42);
        assert_eq!(engine.state(), EngineState::Loaded);

        let value = engine
            .eval_with_timeout("answer() + 1", Duration::from_secs(5))
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 43);
    }

    #[test]
    fn test_supervised_method_call() {
        let mut engine = engine();
        engine
            .load_script("let plugin = #{ n: 1, Inc: || { this.n += 1; this.n } };")
            .unwrap();
        let value = engine
            .call_method_with_timeout("plugin", "Inc", vec![], Duration::from_secs(5))
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 2);
        // The mutation happened on the engine's own object.
        let value = engine.call_method("plugin", "Inc", vec![]).unwrap();
        assert_eq!(value.as_int().unwrap(), 3);
    }

    #[test]
    fn test_shutdown_persists_cache_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let options = EngineOptions {
            cache_dir: Some(dir.path().to_path_buf()),
            ..EngineOptions::default()
        };

        let mut engine = ScriptEngine::new(id, options.clone()).unwrap();
        engine.load_script(r#"cache::set("token", "abc");"#).unwrap();
        engine.shutdown();
        engine.shutdown();

        let path = dir.path().join(format!("{id}.json"));
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["token"], json!({"value": "abc", "expiration": 0}));

        // A new engine with the same identity sees the persisted entry.
        let mut reopened = ScriptEngine::new(id, options).unwrap();
        let value = reopened.load_script(r#"cache::get("token")"#).unwrap();
        assert_eq!(value.into_string().unwrap(), "abc");
    }

    #[test]
    fn test_discard_does_not_write_cache() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let options = EngineOptions {
            cache_dir: Some(dir.path().to_path_buf()),
            ..EngineOptions::default()
        };
        let mut engine = ScriptEngine::new(id, options).unwrap();
        engine.load_script(r#"cache::set("k", 1);"#).unwrap();
        engine.discard();

        assert!(engine.is_closed());
        assert!(!dir.path().join(format!("{id}.json")).exists());
    }

    #[test]
    fn test_supervised_load_keeps_script_name() {
        let mut engine = engine();
        engine
            .load_source_with_timeout("main.rhai", "fn ready() { true }", Duration::from_secs(5))
            .unwrap();
        assert_eq!(engine.state(), EngineState::Loaded);
        assert!(engine.has_function("ready"));

        let err = engine
            .load_source_with_timeout("broken.rhai", "let x = ;", Duration::from_secs(5))
            .unwrap_err();
        assert!(err.to_string().contains("broken.rhai"), "{err}");
        assert!(!engine.is_closed());
    }

    #[test]
    fn test_supervised_load_timeout_writes_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let options = EngineOptions {
            cache_dir: Some(dir.path().to_path_buf()),
            ..EngineOptions::default()
        };
        let mut engine = ScriptEngine::new(id, options).unwrap();

        let err = engine
            .load_source_with_timeout(
                "main.rhai",
                r#"cache::set("k", 1); loop { }"#,
                Duration::from_millis(100),
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout(_)));
        assert!(engine.is_closed());
        assert!(!dir.path().join(format!("{id}.json")).exists());
    }

    #[test]
    fn test_engines_do_not_share_caches() {
        let mut a = engine();
        let mut b = engine();
        a.load_script(r#"cache::set("k", "from a");"#).unwrap();
        let seen = b.load_script(r#"cache::get("k")"#).unwrap();
        assert!(seen.is_unit());
    }

    #[test]
    fn test_engines_run_on_separate_threads() {
        let handles: Vec<_> = (0..4_i64)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut engine = ScriptEngine::new(Uuid::new_v4(), EngineOptions::default())
                        .unwrap();
                    engine.load_script("fn square(x) { x * x }").unwrap();
                    engine
                        .call_global("square", vec![Dynamic::from(i)])
                        .unwrap()
                        .as_int()
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![0, 1, 4, 9]);
    }
}
